//! OpenAI adapter (voice transcription + chat completion).
//!
//! Talks to any OpenAI-compatible base URL: `audio/transcriptions` for voice
//! notes, `chat/completions` for replies. Retries live in the core's
//! `RetryingAi` decorator; this client only classifies failures.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{json, Value};

use relay_core::{
    errors::Error,
    ports::{AiService, CompletionRequest},
    Result,
};

#[derive(Clone, Debug)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub completion_model: String,
    pub transcription_model: String,
    /// Client-level ceiling; per-attempt timeouts are enforced by the retry policy.
    pub timeout: Duration,
}

#[derive(Clone, Debug)]
pub struct OpenAiClient {
    cfg: OpenAiConfig,
    http: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(cfg: OpenAiConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(cfg.timeout)
            .build()
            .map_err(|e| Error::Config(format!("http client build failed: {e}")))?;
        Ok(Self { cfg, http })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.cfg.base_url.trim_end_matches('/'))
    }

    async fn post_checked(
        &self,
        req: reqwest::RequestBuilder,
        what: &str,
        permanent: fn(String) -> Error,
    ) -> Result<Value> {
        let resp = req
            .bearer_auth(&self.cfg.api_key)
            .send()
            .await
            .map_err(|e| classify_transport_error(what, e, permanent))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let msg = format!(
                "openai {what} failed: {status} {}",
                body.chars().take(200).collect::<String>()
            );
            return Err(if is_retryable_status(status) {
                Error::Unavailable(msg)
            } else {
                permanent(msg)
            });
        }

        resp.json::<Value>()
            .await
            .map_err(|e| permanent(format!("openai {what} json error: {e}")))
    }
}

#[async_trait]
impl AiService for OpenAiClient {
    async fn transcribe(&self, audio: Vec<u8>) -> Result<String> {
        let form = reqwest::multipart::Form::new()
            .text("model", self.cfg.transcription_model.clone())
            .part(
                "file",
                reqwest::multipart::Part::bytes(audio)
                    .file_name("voice.ogg")
                    .mime_str("audio/ogg")
                    .map_err(|e| Error::Transcription(format!("multipart error: {e}")))?,
            );

        let req = self
            .http
            .post(self.url("audio/transcriptions"))
            .multipart(form);
        let v = self
            .post_checked(req, "transcription", Error::Transcription)
            .await?;

        // An empty transcript is a valid answer; the pipeline decides what it means.
        Ok(parse_transcription(&v))
    }

    async fn complete(&self, req: CompletionRequest) -> Result<String> {
        let body = completion_body(&self.cfg.completion_model, &req);
        let http_req = self.http.post(self.url("chat/completions")).json(&body);
        let v = self
            .post_checked(http_req, "completion", Error::Completion)
            .await?;

        parse_completion(&v)
            .ok_or_else(|| Error::Completion("openai completion had no message content".to_string()))
    }
}

fn completion_body(model: &str, req: &CompletionRequest) -> Value {
    json!({
        "model": model,
        "messages": [{ "role": "user", "content": req.prompt }],
        "max_tokens": req.max_tokens,
        "temperature": req.temperature,
    })
}

fn parse_transcription(v: &Value) -> String {
    v.get("text")
        .and_then(|t| t.as_str())
        .unwrap_or("")
        .to_string()
}

fn parse_completion(v: &Value) -> Option<String> {
    v.get("choices")?
        .get(0)?
        .get("message")?
        .get("content")?
        .as_str()
        .map(|s| s.to_string())
}

fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

fn classify_transport_error(what: &str, e: reqwest::Error, permanent: fn(String) -> Error) -> Error {
    let msg = format!("openai {what} request error: {e}");
    if e.is_timeout() || e.is_connect() || e.is_request() {
        Error::Unavailable(msg)
    } else {
        permanent(msg)
    }
}
