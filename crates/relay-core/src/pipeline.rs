//! Governed message pipeline.
//!
//! One call to [`Pipeline::process`] per inbound message:
//!
//! 1. admission through the per-user [`RateLimiter`] (throttled messages stop here)
//! 2. [`Fingerprint`] of the payload and a [`ResponseCache`] lookup
//! 3. on a miss: local size checks, voice download + transcription, completion
//! 4. cache store, metrics, and exactly one reply text for the caller to send
//!
//! The limiter, cache and metrics are only touched between awaits, never across
//! one. Two concurrent misses on the same fingerprint both go upstream and the
//! last write wins.

use std::{
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use tracing::{debug, info, warn};

use crate::{
    cache::{ContentTag, Fingerprint, ResponseCache},
    domain::{UserId, VoiceFile},
    errors::{InputKind, MessageError, MessageErrorKind},
    messaging::types::{InboundMessage, Payload},
    metrics::MetricsCollector,
    ports::{AiService, CompletionRequest, FileSource},
    rate_limit::RateLimiter,
    replies,
};

/// Governance tunables consumed by the pipeline.
#[derive(Clone, Copy, Debug)]
pub struct PipelineSettings {
    pub rate_limit_requests: usize,
    pub rate_limit_window: Duration,
    pub cache_ttl: Duration,
    pub max_voice_file_bytes: u64,
    pub max_text_chars: usize,
    pub max_output_tokens: u32,
    pub temperature: f32,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            rate_limit_requests: 10,
            rate_limit_window: Duration::from_secs(60),
            cache_ttl: Duration::from_secs(300),
            max_voice_file_bytes: 20 * 1024 * 1024,
            max_text_chars: 4000,
            max_output_tokens: 1000,
            temperature: 0.7,
        }
    }
}

/// Terminal state of one message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    Delivered { cached: bool },
    Failed(MessageErrorKind),
}

/// What to send back for one inbound message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub status: Status,
}

impl Payload {
    pub fn input_kind(&self) -> InputKind {
        match self {
            Payload::Text(_) => InputKind::Text,
            Payload::Voice(_) => InputKind::Voice,
        }
    }

    pub fn fingerprint(&self) -> Fingerprint {
        match self {
            Payload::Text(text) => Fingerprint::new(ContentTag::Text, text),
            Payload::Voice(voice) => Fingerprint::new(ContentTag::Voice, &voice.file_id),
        }
    }
}

pub struct Pipeline {
    settings: PipelineSettings,
    limiter: Mutex<RateLimiter>,
    cache: Arc<ResponseCache>,
    metrics: Arc<MetricsCollector>,
    ai: Arc<dyn AiService>,
    files: Arc<dyn FileSource>,
}

impl Pipeline {
    pub fn new(
        settings: PipelineSettings,
        ai: Arc<dyn AiService>,
        files: Arc<dyn FileSource>,
    ) -> Self {
        Self {
            settings,
            limiter: Mutex::new(RateLimiter::new(
                settings.rate_limit_requests,
                settings.rate_limit_window,
            )),
            cache: Arc::new(ResponseCache::new(settings.cache_ttl)),
            metrics: Arc::new(MetricsCollector::new()),
            ai,
            files,
        }
    }

    pub fn cache(&self) -> Arc<ResponseCache> {
        self.cache.clone()
    }

    pub fn metrics(&self) -> Arc<MetricsCollector> {
        self.metrics.clone()
    }

    /// Rate-limit gate. Rejections are counted as rate-limit hits.
    pub fn admit(&self, user_id: UserId) -> Result<(), MessageError> {
        let now = Instant::now();
        let (admitted, retry_after) = {
            let mut limiter = self.limiter.lock().unwrap_or_else(|e| e.into_inner());
            if limiter.admit_at(user_id, now) {
                (true, None)
            } else {
                (false, limiter.retry_after_at(user_id, now))
            }
        };

        if admitted {
            return Ok(());
        }

        self.metrics.record_rate_limit_hit();
        info!(
            user_id = user_id.0,
            retry_after_ms = retry_after.map(|d| d.as_millis() as u64),
            "rate limited"
        );
        Err(MessageError::Throttled)
    }

    pub async fn process(&self, msg: &InboundMessage) -> Reply {
        let input = msg.payload.input_kind();

        if let Err(e) = self.admit(msg.user_id) {
            return Reply {
                text: replies::for_failure(&e, input),
                status: Status::Failed(e.kind()),
            };
        }

        let started = Instant::now();
        let outcome = self.serve(&msg.payload).await;
        let elapsed = started.elapsed();

        match outcome {
            Ok((text, cached)) => {
                self.metrics.record_request(elapsed);
                debug!(
                    user_id = msg.user_id.0,
                    input = ?input,
                    cached,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "reply delivered"
                );
                Reply {
                    text,
                    status: Status::Delivered { cached },
                }
            }
            Err(e) => {
                self.metrics.record_error();
                self.metrics.record_request(elapsed);
                warn!(
                    user_id = msg.user_id.0,
                    input = ?input,
                    elapsed_ms = elapsed.as_millis() as u64,
                    error = %e,
                    "message failed"
                );
                Reply {
                    text: replies::for_failure(&e, input),
                    status: Status::Failed(e.kind()),
                }
            }
        }
    }

    /// Cache lookup, then the upstream round trip on a miss.
    async fn serve(&self, payload: &Payload) -> Result<(String, bool), MessageError> {
        let key = payload.fingerprint();

        if let Some(reply) = self.cache.get(&key) {
            self.metrics.record_cache_hit();
            debug!(fingerprint = %key, "cache hit");
            return Ok((reply, true));
        }

        let prompt = match payload {
            Payload::Text(text) => {
                self.check_text(text)?;
                text.clone()
            }
            Payload::Voice(voice) => self.transcribe_voice(voice).await?,
        };

        let completion = self
            .ai
            .complete(CompletionRequest {
                prompt,
                max_tokens: self.settings.max_output_tokens,
                temperature: self.settings.temperature,
            })
            .await?;

        let reply = completion.trim().to_string();
        if reply.is_empty() {
            return Err(crate::Error::Completion("completion returned no text".to_string()).into());
        }

        self.cache.put(key, reply.clone());
        Ok((reply, false))
    }

    fn check_text(&self, text: &str) -> Result<(), MessageError> {
        let len = text.chars().count();
        if len > self.settings.max_text_chars {
            return Err(MessageError::InputTooLarge {
                input: InputKind::Text,
                actual: len as u64,
                limit: self.settings.max_text_chars as u64,
            });
        }
        Ok(())
    }

    async fn transcribe_voice(&self, voice: &VoiceFile) -> Result<String, MessageError> {
        if voice.size_bytes > self.settings.max_voice_file_bytes {
            return Err(MessageError::InputTooLarge {
                input: InputKind::Voice,
                actual: voice.size_bytes,
                limit: self.settings.max_voice_file_bytes,
            });
        }

        let audio = self.files.fetch(&voice.file_id).await?;
        let transcript = self.ai.transcribe(audio).await?;
        let transcript = transcript.trim();
        if transcript.is_empty() {
            return Err(MessageError::EmptyTranscription);
        }
        Ok(transcript.to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;

    use super::*;
    use crate::{domain::ChatId, errors::Error, Result};

    #[derive(Default)]
    struct FakeAi {
        transcript: StdMutex<Option<String>>,
        fail_completion: StdMutex<bool>,
        transcribe_calls: StdMutex<Vec<usize>>,
        complete_calls: StdMutex<Vec<CompletionRequest>>,
    }

    impl FakeAi {
        fn with_transcript(t: &str) -> Self {
            let ai = Self::default();
            *ai.transcript.lock().unwrap() = Some(t.to_string());
            ai
        }

        fn transcribe_calls(&self) -> usize {
            self.transcribe_calls.lock().unwrap().len()
        }

        fn complete_calls(&self) -> Vec<CompletionRequest> {
            self.complete_calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AiService for FakeAi {
        async fn transcribe(&self, audio: Vec<u8>) -> Result<String> {
            self.transcribe_calls.lock().unwrap().push(audio.len());
            Ok(self.transcript.lock().unwrap().clone().unwrap_or_default())
        }

        async fn complete(&self, req: CompletionRequest) -> Result<String> {
            self.complete_calls.lock().unwrap().push(req.clone());
            // Suspend like a real network call so concurrent messages interleave.
            tokio::task::yield_now().await;
            if *self.fail_completion.lock().unwrap() {
                return Err(Error::Completion("500 internal: secret detail".to_string()));
            }
            Ok(format!("  reply to: {}  \n", req.prompt))
        }
    }

    #[derive(Default)]
    struct FakeFiles {
        fetched: StdMutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl FileSource for FakeFiles {
        async fn fetch(&self, file_id: &str) -> Result<Vec<u8>> {
            self.fetched.lock().unwrap().push(file_id.to_string());
            if self.fail {
                return Err(Error::FileRetrieval("404".to_string()));
            }
            Ok(vec![0u8; 64])
        }
    }

    fn pipeline(ai: Arc<FakeAi>, files: Arc<FakeFiles>) -> Pipeline {
        Pipeline::new(PipelineSettings::default(), ai, files)
    }

    fn text(user: i64, body: &str) -> InboundMessage {
        InboundMessage {
            chat_id: ChatId(user),
            user_id: UserId(user),
            payload: Payload::Text(body.to_string()),
        }
    }

    fn voice(user: i64, file_id: &str, size_bytes: u64) -> InboundMessage {
        InboundMessage {
            chat_id: ChatId(user),
            user_id: UserId(user),
            payload: Payload::Voice(VoiceFile {
                file_id: file_id.to_string(),
                size_bytes,
            }),
        }
    }

    #[tokio::test]
    async fn repeated_text_is_served_from_cache() {
        let ai = Arc::new(FakeAi::default());
        let p = pipeline(ai.clone(), Arc::new(FakeFiles::default()));
        let body = "x".repeat(50);

        let first = p.process(&text(1, &body)).await;
        let second = p.process(&text(1, &body)).await;

        assert_eq!(first.status, Status::Delivered { cached: false });
        assert_eq!(second.status, Status::Delivered { cached: true });
        assert_eq!(first.text, second.text);
        assert_eq!(first.text, format!("reply to: {body}"));
        assert_eq!(ai.complete_calls().len(), 1);

        let s = p.metrics().snapshot();
        assert_eq!(s.total_requests, 2);
        assert_eq!(s.cache_hits, 1);
        assert_eq!(s.errors, 0);
    }

    #[tokio::test]
    async fn concurrent_misses_on_one_fingerprint_both_go_upstream() {
        let ai = Arc::new(FakeAi::default());
        let p = pipeline(ai.clone(), Arc::new(FakeFiles::default()));
        let msg = text(1, "same");

        let (a, b) = tokio::join!(p.process(&msg), p.process(&msg));

        assert_eq!(a.status, Status::Delivered { cached: false });
        assert_eq!(b.status, Status::Delivered { cached: false });
        assert_eq!(a.text, "reply to: same");
        assert_eq!(b.text, a.text);
        assert_eq!(ai.complete_calls().len(), 2);
        assert_eq!(p.cache().len(), 1);

        let s = p.metrics().snapshot();
        assert_eq!(s.total_requests, 2);
        assert_eq!(s.cache_hits, 0);

        // The surviving entry serves later repeats.
        let third = p.process(&msg).await;
        assert_eq!(third.status, Status::Delivered { cached: true });
        assert_eq!(ai.complete_calls().len(), 2);
    }

    #[tokio::test]
    async fn completion_uses_configured_limits() {
        let ai = Arc::new(FakeAi::default());
        let p = pipeline(ai.clone(), Arc::new(FakeFiles::default()));

        p.process(&text(1, "hello")).await;

        let calls = ai.complete_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].prompt, "hello");
        assert_eq!(calls[0].max_tokens, 1000);
        assert!((calls[0].temperature - 0.7).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn overlong_text_is_rejected_without_upstream_call() {
        let ai = Arc::new(FakeAi::default());
        let p = pipeline(ai.clone(), Arc::new(FakeFiles::default()));

        let reply = p.process(&text(1, &"a".repeat(5000))).await;

        assert_eq!(reply.status, Status::Failed(MessageErrorKind::InputTooLarge));
        assert_eq!(
            reply.text,
            "Сообщение слишком длинное. Максимальная длина: 4000 символов."
        );
        assert!(ai.complete_calls().is_empty());

        let s = p.metrics().snapshot();
        assert_eq!(s.errors, 1);
        assert_eq!(s.total_requests, 1);
    }

    #[tokio::test]
    async fn text_limit_counts_characters_not_bytes() {
        let ai = Arc::new(FakeAi::default());
        let p = pipeline(ai.clone(), Arc::new(FakeFiles::default()));

        // 4000 Cyrillic characters are 8000 bytes.
        let reply = p.process(&text(1, &"я".repeat(4000))).await;
        assert_eq!(reply.status, Status::Delivered { cached: false });
    }

    #[tokio::test]
    async fn eleventh_request_in_window_is_throttled() {
        let ai = Arc::new(FakeAi::default());
        let p = pipeline(ai.clone(), Arc::new(FakeFiles::default()));

        for i in 0..10 {
            let reply = p.process(&text(1, &format!("message {i}"))).await;
            assert_ne!(reply.text, replies::THROTTLED, "request {i} was throttled");
        }
        let eleventh = p.process(&text(1, "message 10")).await;

        assert_eq!(eleventh.status, Status::Failed(MessageErrorKind::Throttled));
        assert_eq!(eleventh.text, replies::THROTTLED);
        assert_eq!(ai.complete_calls().len(), 10);

        let s = p.metrics().snapshot();
        assert_eq!(s.rate_limit_hits, 1);
        assert_eq!(s.total_requests, 10);
        assert_eq!(s.errors, 0);

        // Other users are unaffected.
        let other = p.process(&text(2, "message 9")).await;
        assert_eq!(other.status, Status::Delivered { cached: true });
    }

    #[tokio::test]
    async fn throttled_message_skips_the_cache() {
        let ai = Arc::new(FakeAi::default());
        let p = Pipeline::new(
            PipelineSettings {
                rate_limit_requests: 1,
                ..PipelineSettings::default()
            },
            ai.clone(),
            Arc::new(FakeFiles::default()),
        );

        p.process(&text(1, "same")).await;
        let reply = p.process(&text(1, "same")).await;

        assert_eq!(reply.status, Status::Failed(MessageErrorKind::Throttled));
        assert_eq!(p.metrics().snapshot().cache_hits, 0);
    }

    #[tokio::test]
    async fn oversized_voice_is_rejected_before_download() {
        let ai = Arc::new(FakeAi::with_transcript("hello"));
        let files = Arc::new(FakeFiles::default());
        let p = pipeline(ai.clone(), files.clone());

        let reply = p.process(&voice(1, "big", 25 * 1024 * 1024)).await;

        assert_eq!(reply.status, Status::Failed(MessageErrorKind::InputTooLarge));
        assert_eq!(
            reply.text,
            "Голосовое сообщение слишком большое. Максимальный размер: 20MB."
        );
        assert_eq!(ai.transcribe_calls(), 0);
        assert!(files.fetched.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn voice_is_transcribed_then_completed_and_cached_by_file_id() {
        let ai = Arc::new(FakeAi::with_transcript("  what time is it  "));
        let files = Arc::new(FakeFiles::default());
        let p = pipeline(ai.clone(), files.clone());

        let first = p.process(&voice(1, "file-1", 1024)).await;
        let second = p.process(&voice(1, "file-1", 1024)).await;

        assert_eq!(first.status, Status::Delivered { cached: false });
        assert_eq!(first.text, "reply to: what time is it");
        assert_eq!(second.status, Status::Delivered { cached: true });
        assert_eq!(second.text, first.text);
        assert_eq!(ai.transcribe_calls(), 1);
        assert_eq!(*files.fetched.lock().unwrap(), vec!["file-1".to_string()]);
    }

    #[tokio::test]
    async fn voice_and_text_with_same_content_do_not_collide() {
        let ai = Arc::new(FakeAi::with_transcript("spoken"));
        let p = pipeline(ai.clone(), Arc::new(FakeFiles::default()));

        p.process(&text(1, "abc")).await;
        let reply = p.process(&voice(1, "abc", 10)).await;

        assert_eq!(reply.status, Status::Delivered { cached: false });
        assert_eq!(reply.text, "reply to: spoken");
    }

    #[tokio::test]
    async fn blank_transcription_is_reported_as_such() {
        let ai = Arc::new(FakeAi::with_transcript("   "));
        let p = pipeline(ai.clone(), Arc::new(FakeFiles::default()));

        let reply = p.process(&voice(1, "quiet", 10)).await;

        assert_eq!(
            reply.status,
            Status::Failed(MessageErrorKind::EmptyTranscription)
        );
        assert_eq!(reply.text, replies::EMPTY_TRANSCRIPTION);
        assert!(ai.complete_calls().is_empty());
        assert_eq!(p.metrics().snapshot().errors, 1);
    }

    #[tokio::test]
    async fn download_failure_is_a_generic_voice_failure() {
        let ai = Arc::new(FakeAi::with_transcript("x"));
        let files = Arc::new(FakeFiles {
            fail: true,
            ..FakeFiles::default()
        });
        let p = pipeline(ai.clone(), files);

        let reply = p.process(&voice(1, "gone", 10)).await;

        assert_eq!(reply.status, Status::Failed(MessageErrorKind::Upstream));
        assert_eq!(reply.text, replies::VOICE_FAILED);
        assert_eq!(ai.transcribe_calls(), 0);
    }

    #[tokio::test]
    async fn upstream_failure_is_counted_and_not_cached() {
        let ai = Arc::new(FakeAi::default());
        *ai.fail_completion.lock().unwrap() = true;
        let p = pipeline(ai.clone(), Arc::new(FakeFiles::default()));

        let reply = p.process(&text(1, "hi")).await;
        assert_eq!(reply.status, Status::Failed(MessageErrorKind::Upstream));
        assert_eq!(reply.text, replies::TEXT_FAILED);
        assert!(!reply.text.contains("secret"));
        assert!(p.cache().is_empty());

        *ai.fail_completion.lock().unwrap() = false;
        let retry = p.process(&text(1, "hi")).await;
        assert_eq!(retry.status, Status::Delivered { cached: false });

        let s = p.metrics().snapshot();
        assert_eq!(s.errors, 1);
        assert_eq!(s.total_requests, 2);
    }
}
