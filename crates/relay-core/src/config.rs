use std::{env, fs, path::Path, time::Duration};

use tracing::warn;

use crate::{domain::UserId, errors::Error, pipeline::PipelineSettings, retry::RetryPolicy, Result};

const DEFAULT_AI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_COMPLETION_MODEL: &str = "gpt-4o-mini";
const DEFAULT_TRANSCRIPTION_MODEL: &str = "whisper-1";

/// Typed configuration for the relay.
#[derive(Clone, Debug)]
pub struct Config {
    // Credentials
    pub bot_token: String,
    pub ai_api_key: String,
    pub admin_user_id: Option<UserId>,

    // Upstream AI service
    pub ai_base_url: String,
    pub completion_model: String,
    pub transcription_model: String,
    pub max_output_tokens: u32,
    pub temperature: f32,
    pub upstream_timeout: Duration,
    pub upstream_max_retries: u32,

    // Rate limiting
    pub rate_limit_requests: usize,
    pub rate_limit_window: Duration,

    // Cache
    pub cache_ttl: Duration,
    pub janitor_interval: Duration,

    // Input ceilings
    pub max_voice_file_bytes: u64,
    pub max_text_chars: usize,
}

impl Config {
    /// Load from `.env` (if present) and the process environment.
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).and_then(non_empty);

        // Required
        let bot_token = get("BOT_TOKEN").ok_or_else(|| {
            Error::Config("BOT_TOKEN environment variable is required".to_string())
        })?;
        let ai_api_key = get("AI_API_KEY")
            .or_else(|| get("OPENAI_API_KEY"))
            .ok_or_else(|| {
                Error::Config("AI_API_KEY environment variable is required".to_string())
            })?;

        // Operator gate for /stats
        let admin_user_id = match get("ADMIN_USER_ID") {
            None => None,
            Some(raw) => match raw.trim().parse::<i64>() {
                Ok(id) => Some(UserId(id)),
                Err(_) => {
                    warn!(value = %raw, "ignoring unparsable ADMIN_USER_ID");
                    None
                }
            },
        };

        let num = |key: &str| get(key).map(|s| s.trim().to_string());
        let u64_or = |key: &str, default: u64| {
            num(key)
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(default)
        };

        let ai_base_url = get("AI_BASE_URL")
            .unwrap_or_else(|| DEFAULT_AI_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        let completion_model =
            get("COMPLETION_MODEL").unwrap_or_else(|| DEFAULT_COMPLETION_MODEL.to_string());
        let transcription_model =
            get("TRANSCRIPTION_MODEL").unwrap_or_else(|| DEFAULT_TRANSCRIPTION_MODEL.to_string());

        let max_output_tokens = num("MAX_OUTPUT_TOKENS")
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(1000);
        let temperature = num("TEMPERATURE")
            .and_then(|s| s.parse::<f32>().ok())
            .filter(|t| t.is_finite() && *t >= 0.0)
            .unwrap_or(0.7);
        let upstream_timeout = Duration::from_millis(u64_or("UPSTREAM_TIMEOUT_MS", 30_000));
        let upstream_max_retries = num("UPSTREAM_MAX_RETRIES")
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(2);

        let rate_limit_requests = num("RATE_LIMIT_REQUESTS")
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(10);
        let rate_limit_window = Duration::from_secs(u64_or("RATE_LIMIT_WINDOW", 60));

        let cache_ttl = Duration::from_secs(u64_or("CACHE_TTL", 300));
        let janitor_interval = Duration::from_secs(u64_or("JANITOR_INTERVAL", 300).max(1));

        let max_voice_file_bytes = u64_or("MAX_VOICE_FILE_BYTES", 20 * 1024 * 1024);
        let max_text_chars = num("MAX_TEXT_CHARS")
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(4000);

        Ok(Self {
            bot_token,
            ai_api_key,
            admin_user_id,
            ai_base_url,
            completion_model,
            transcription_model,
            max_output_tokens,
            temperature,
            upstream_timeout,
            upstream_max_retries,
            rate_limit_requests,
            rate_limit_window,
            cache_ttl,
            janitor_interval,
            max_voice_file_bytes,
            max_text_chars,
        })
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            rate_limit_requests: self.rate_limit_requests,
            rate_limit_window: self.rate_limit_window,
            cache_ttl: self.cache_ttl,
            max_voice_file_bytes: self.max_voice_file_bytes,
            max_text_chars: self.max_text_chars,
            max_output_tokens: self.max_output_tokens,
            temperature: self.temperature,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            timeout: self.upstream_timeout,
            max_retries: self.upstream_max_retries,
            ..RetryPolicy::default()
        }
    }

    pub fn is_operator(&self, user_id: UserId) -> bool {
        self.admin_user_id == Some(user_id)
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        env::set_var(key, unquote(v.trim()));
    }
}

fn unquote(val: &str) -> &str {
    if val.len() >= 2
        && ((val.starts_with('"') && val.ends_with('"'))
            || (val.starts_with('\'') && val.ends_with('\'')))
    {
        &val[1..val.len() - 1]
    } else {
        val
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
