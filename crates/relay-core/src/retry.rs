//! Timeout and retry governance for upstream AI calls.

use std::{future::Future, time::Duration};

use async_trait::async_trait;
use tracing::warn;

use crate::{
    errors::Error,
    ports::{AiService, CompletionRequest},
    Result,
};

#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    /// Upper bound for a single attempt.
    pub timeout: Duration,
    /// Extra attempts after the first one fails transiently.
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 2,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff before retry number `attempt` (0-indexed), capped.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.initial_backoff
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_backoff)
    }
}

/// Run `op` under `policy`: each attempt is time-boxed, transient failures are
/// retried, permanent ones are returned as-is.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, operation: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        let outcome = match tokio::time::timeout(policy.timeout, op()).await {
            Ok(res) => res,
            Err(_) => Err(Error::Timeout(policy.timeout)),
        };

        match outcome {
            Ok(v) => return Ok(v),
            Err(e) if e.is_transient() && attempt < policy.max_retries => {
                let delay = policy.backoff_for(attempt);
                attempt += 1;
                warn!(
                    operation,
                    attempt,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "retrying upstream call"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// [`AiService`] decorator applying a [`RetryPolicy`] to both calls.
pub struct RetryingAi<A> {
    inner: A,
    policy: RetryPolicy,
}

impl<A> RetryingAi<A> {
    pub fn new(inner: A, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<A: AiService> AiService for RetryingAi<A> {
    async fn transcribe(&self, audio: Vec<u8>) -> Result<String> {
        with_retry(&self.policy, "transcribe", || self.inner.transcribe(audio.clone())).await
    }

    async fn complete(&self, req: CompletionRequest) -> Result<String> {
        with_retry(&self.policy, "complete", || self.inner.complete(req.clone())).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicU32, Ordering},
        Mutex,
    };

    use super::*;

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_millis(200),
            max_retries,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    struct ScriptedAi {
        script: Mutex<Vec<Result<String>>>,
        calls: AtomicU32,
        hang: bool,
    }

    impl ScriptedAi {
        fn new(mut script: Vec<Result<String>>) -> Self {
            script.reverse();
            Self {
                script: Mutex::new(script),
                calls: AtomicU32::new(0),
                hang: false,
            }
        }

        fn hanging() -> Self {
            Self {
                hang: true,
                ..Self::new(vec![])
            }
        }

        fn next(&self) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(Error::External("script exhausted".to_string())))
        }
    }

    #[async_trait]
    impl AiService for ScriptedAi {
        async fn transcribe(&self, _audio: Vec<u8>) -> Result<String> {
            self.next()
        }

        async fn complete(&self, _req: CompletionRequest) -> Result<String> {
            if self.hang {
                self.calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            self.next()
        }
    }

    fn req() -> CompletionRequest {
        CompletionRequest {
            prompt: "hi".to_string(),
            max_tokens: 10,
            temperature: 0.7,
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let p = RetryPolicy::default();
        assert_eq!(p.backoff_for(0), Duration::from_millis(500));
        assert_eq!(p.backoff_for(1), Duration::from_millis(1000));
        assert_eq!(p.backoff_for(2), Duration::from_millis(2000));
        assert_eq!(p.backoff_for(10), Duration::from_secs(8));
    }

    #[tokio::test]
    async fn transient_failures_are_retried_until_success() {
        let ai = RetryingAi::new(
            ScriptedAi::new(vec![
                Err(Error::Unavailable("503".to_string())),
                Err(Error::Unavailable("429".to_string())),
                Ok("done".to_string()),
            ]),
            fast_policy(2),
        );

        assert_eq!(ai.complete(req()).await.unwrap(), "done");
        assert_eq!(ai.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let ai = RetryingAi::new(
            ScriptedAi::new(vec![
                Err(Error::Unavailable("1".to_string())),
                Err(Error::Unavailable("2".to_string())),
                Err(Error::Unavailable("3".to_string())),
                Ok("too late".to_string()),
            ]),
            fast_policy(2),
        );

        let err = ai.transcribe(vec![1, 2, 3]).await.unwrap_err();
        assert!(matches!(err, Error::Unavailable(ref m) if m == "3"));
        assert_eq!(ai.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_failures_are_not_retried() {
        let ai = RetryingAi::new(
            ScriptedAi::new(vec![
                Err(Error::Completion("401 unauthorized".to_string())),
                Ok("unreachable".to_string()),
            ]),
            fast_policy(2),
        );

        let err = ai.complete(req()).await.unwrap_err();
        assert!(matches!(err, Error::Completion(_)));
        assert_eq!(ai.inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn slow_attempts_time_out_and_count_as_transient() {
        let ai = RetryingAi::new(ScriptedAi::hanging(), fast_policy(1));

        let err = ai.complete(req()).await.unwrap_err();
        assert!(matches!(err, Error::Timeout(d) if d == Duration::from_millis(200)));
        assert_eq!(ai.inner.calls.load(Ordering::SeqCst), 2);
    }
}
