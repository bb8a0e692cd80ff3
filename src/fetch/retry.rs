use crate::config::RetryConfig;
use crate::fetch::{FetchError, FetchRequest, FetchResponse, Fetcher};
use rand::Rng;
use std::time::Duration;
use thiserror::Error;

/// Jitter applied to backoff waits, as a fraction of the wait
const JITTER_FRACTION: f64 = 0.2;

/// How many times a request may be attempted and how long to wait in between
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_retries: u32,
    /// Base wait in seconds
    pub backoff_factor: f64,
    pub jitter: bool,
    /// Budget for the whole call including waits
    pub total_timeout: Option<Duration>,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries.max(1),
            backoff_factor: config.backoff_factor,
            jitter: config.jitter,
            total_timeout: config.total_timeout(),
        }
    }

    /// Wait before the given 1-based attempt, without jitter
    ///
    /// The first attempt is immediate; attempt `n` waits
    /// `backoff_factor * 2^(n-2)` seconds.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let exponent = (attempt - 2).min(30) as i32;
        let secs = self.backoff_factor * 2f64.powi(exponent);
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO)
    }

    fn jittered_delay_before(&self, attempt: u32) -> Duration {
        let base = self.delay_before(attempt);
        if !self.jitter || base.is_zero() {
            return base;
        }
        let factor = rand::thread_rng().gen_range((1.0 - JITTER_FRACTION)..=(1.0 + JITTER_FRACTION));
        base.mul_f64(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// A value together with the number of attempts it took
#[derive(Debug, Clone, PartialEq)]
pub struct RetryOutcome<T> {
    pub value: T,
    pub attempts: u32,
}

impl<T> RetryOutcome<T> {
    /// Attempts beyond the first
    pub fn retries(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }
}

/// Raised once a request can no longer succeed
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{last_error} (after {attempts} attempt(s))")]
pub struct RetryExhausted {
    pub last_error: FetchError,
    pub attempts: u32,
}

impl RetryExhausted {
    pub fn retries(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }
}

/// Runs `request` through `fetcher` until it succeeds or the policy gives up
///
/// Non-retryable errors end the loop immediately. Retryable errors are retried
/// until `max_retries` attempts have been made, after which the last error is
/// returned. When the total timeout expires first, the last error seen is
/// returned with the timeout added to its reason.
pub async fn execute(
    fetcher: &dyn Fetcher,
    request: &FetchRequest,
    policy: &RetryPolicy,
) -> Result<RetryOutcome<FetchResponse>, RetryExhausted> {
    let mut attempts = 0u32;
    let mut last_error = None;

    let Some(budget) = policy.total_timeout else {
        return attempt_loop(fetcher, request, policy, &mut attempts, &mut last_error).await;
    };

    let outcome = tokio::time::timeout(
        budget,
        attempt_loop(fetcher, request, policy, &mut attempts, &mut last_error),
    )
    .await;

    match outcome {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(
                "Giving up on {} after {:?} ({} attempt(s))",
                request.url,
                budget,
                attempts
            );
            let note = format!("total timeout of {:?} exceeded", budget);
            let last_error = match last_error {
                Some(error) => with_note(error, &note),
                None => FetchError::Transient {
                    url: request.url.to_string(),
                    reason: note,
                    status: None,
                },
            };
            Err(RetryExhausted {
                last_error,
                attempts,
            })
        }
    }
}

fn with_note(error: FetchError, note: &str) -> FetchError {
    match error {
        FetchError::Transient { url, reason, status } => FetchError::Transient {
            url,
            reason: format!("{}; {}", reason, note),
            status,
        },
        FetchError::Permanent { url, reason, status } => FetchError::Permanent {
            url,
            reason: format!("{}; {}", reason, note),
            status,
        },
        FetchError::Parse { url, message } => FetchError::Parse {
            url,
            message: format!("{}; {}", message, note),
        },
    }
}

async fn attempt_loop(
    fetcher: &dyn Fetcher,
    request: &FetchRequest,
    policy: &RetryPolicy,
    attempts: &mut u32,
    last_error: &mut Option<FetchError>,
) -> Result<RetryOutcome<FetchResponse>, RetryExhausted> {
    let max_attempts = policy.max_retries.max(1);

    loop {
        *attempts += 1;
        let attempt = *attempts;

        let delay = policy.jittered_delay_before(attempt);
        if !delay.is_zero() {
            tracing::debug!(
                "Retrying {} {} in {:?} (attempt {}/{})",
                request.method,
                request.url,
                delay,
                attempt,
                max_attempts
            );
            tokio::time::sleep(delay).await;
        }

        match fetcher.fetch(request).await {
            Ok(value) => {
                return Ok(RetryOutcome {
                    value,
                    attempts: attempt,
                })
            }
            Err(err) if err.is_retryable() && attempt < max_attempts => {
                tracing::warn!("Attempt {}/{} failed: {}", attempt, max_attempts, err);
                *last_error = Some(err);
            }
            Err(err) => {
                return Err(RetryExhausted {
                    last_error: err,
                    attempts: attempt,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use url::Url;

    /// Replays a fixed sequence of results, then repeats the last one
    struct ScriptedFetcher {
        script: Mutex<VecDeque<Result<FetchResponse, FetchError>>>,
        calls: AtomicU32,
        delay: Duration,
    }

    impl ScriptedFetcher {
        fn new(script: Vec<Result<FetchResponse, FetchError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: AtomicU32::new(0),
                delay: Duration::ZERO,
            }
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Fetcher for ScriptedFetcher {
        async fn fetch(&self, _request: &FetchRequest) -> Result<FetchResponse, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                script.pop_front().unwrap()
            } else {
                script.front().cloned().unwrap()
            }
        }
    }

    fn ok() -> Result<FetchResponse, FetchError> {
        Ok(FetchResponse {
            status: 200,
            final_url: "https://example.com/".to_string(),
            content_type: Some("text/html".to_string()),
            body: "<html></html>".to_string(),
            byte_len: 13,
            parsed: None,
        })
    }

    fn transient() -> Result<FetchResponse, FetchError> {
        Err(FetchError::from_status("https://example.com/", 503))
    }

    fn permanent() -> Result<FetchResponse, FetchError> {
        Err(FetchError::from_status("https://example.com/", 404))
    }

    fn request() -> FetchRequest {
        FetchRequest::get(Url::parse("https://example.com/").unwrap())
    }

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            backoff_factor: 0.0,
            jitter: false,
            total_timeout: None,
        }
    }

    #[test]
    fn test_delay_schedule() {
        let policy = RetryPolicy {
            max_retries: 4,
            backoff_factor: 0.5,
            jitter: false,
            total_timeout: None,
        };
        assert_eq!(policy.delay_before(1), Duration::ZERO);
        assert_eq!(policy.delay_before(2), Duration::from_millis(500));
        assert_eq!(policy.delay_before(3), Duration::from_secs(1));
        assert_eq!(policy.delay_before(4), Duration::from_secs(2));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let policy = RetryPolicy {
            max_retries: 3,
            backoff_factor: 1.0,
            jitter: true,
            total_timeout: None,
        };
        for _ in 0..100 {
            let delay = policy.jittered_delay_before(2);
            assert!(delay >= Duration::from_millis(800));
            assert!(delay <= Duration::from_millis(1200));
        }
    }

    #[tokio::test]
    async fn test_first_attempt_success() {
        let fetcher = ScriptedFetcher::new(vec![ok()]);
        let outcome = execute(&fetcher, &request(), &fast_policy(3)).await.unwrap();
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.retries(), 0);
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failures() {
        let fetcher = ScriptedFetcher::new(vec![transient(), transient(), ok()]);
        let outcome = execute(&fetcher, &request(), &fast_policy(3)).await.unwrap();
        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.retries(), 2);
    }

    #[tokio::test]
    async fn test_exhausts_budget() {
        let fetcher = ScriptedFetcher::new(vec![transient()]);
        let err = execute(&fetcher, &request(), &fast_policy(3)).await.unwrap_err();
        assert_eq!(err.attempts, 3);
        assert_eq!(fetcher.calls(), 3);
        assert_eq!(err.last_error.status(), Some(503));
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let fetcher = ScriptedFetcher::new(vec![permanent()]);
        let err = execute(&fetcher, &request(), &fast_policy(5)).await.unwrap_err();
        assert_eq!(err.attempts, 1);
        assert_eq!(fetcher.calls(), 1);
        assert!(!err.last_error.is_retryable());
    }

    #[tokio::test]
    async fn test_single_attempt_budget() {
        let fetcher = ScriptedFetcher::new(vec![transient(), ok()]);
        let err = execute(&fetcher, &request(), &fast_policy(1)).await.unwrap_err();
        assert_eq!(err.attempts, 1);
    }

    #[tokio::test]
    async fn test_total_timeout() {
        let fetcher =
            ScriptedFetcher::new(vec![transient()]).with_delay(Duration::from_millis(50));
        let policy = RetryPolicy {
            max_retries: 10,
            backoff_factor: 0.0,
            jitter: false,
            total_timeout: Some(Duration::from_millis(120)),
        };

        let err = execute(&fetcher, &request(), &policy).await.unwrap_err();
        assert!(err.attempts < 10);
        assert!(err.last_error.is_retryable());
        // The 503 of the last finished attempt, not a made-up error
        assert_eq!(err.last_error.status(), Some(503));
        let message = err.last_error.to_string();
        assert!(message.contains("HTTP 503"));
        assert!(message.contains("total timeout"));
    }

    #[tokio::test]
    async fn test_total_timeout_before_any_answer() {
        let fetcher = ScriptedFetcher::new(vec![ok()]).with_delay(Duration::from_millis(200));
        let policy = RetryPolicy {
            max_retries: 3,
            backoff_factor: 0.0,
            jitter: false,
            total_timeout: Some(Duration::from_millis(50)),
        };

        let err = execute(&fetcher, &request(), &policy).await.unwrap_err();
        assert_eq!(err.attempts, 1);
        assert_eq!(err.last_error.status(), None);
        assert!(err.last_error.to_string().contains("total timeout"));
    }
}
