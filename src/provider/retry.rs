//! Retry and model-fallback policy for quota-constrained providers.
//!
//! Two nested loops, kept separate so each is testable without HTTP:
//!
//! * [`try_models`] walks an ordered model list. A model-unavailable error
//!   moves on to the next model; any other error stops the walk.
//! * [`retry_rate_limited`] re-issues a call on the same model while it keeps
//!   failing with rate-limit errors, sleeping between attempts.
//!
//! Backoff is not exponential: providers that rate-limit per minute usually
//! say how long to wait (`Please retry in 2.5s.`), and that hint is honoured
//! up to a cap.

use crate::error::ProviderError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

static RE_RETRY_IN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)retry in ([0-9]*\.?[0-9]+)\s*s").unwrap());

/// Parse a `retry in X s` hint into whole milliseconds, rounded up.
///
/// A zero hint is treated as no hint.
pub fn parse_retry_hint(message: &str) -> Option<u64> {
    let caps = RE_RETRY_IN.captures(message)?;
    let secs: f64 = caps[1].parse().ok()?;
    let ms = (secs * 1000.0).ceil();
    (ms.is_finite() && ms > 0.0).then_some(ms as u64)
}

/// Attempt cap and backoff bounds for one model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub default_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            default_backoff: Duration::from_millis(4000),
            max_backoff: Duration::from_millis(5000),
        }
    }
}

impl RetryPolicy {
    /// Sleep before retrying after `err`: the provider's hint, else the
    /// default, never more than `max_backoff`.
    pub fn backoff_for(&self, err: &ProviderError) -> Duration {
        let hinted = match err {
            ProviderError::RateLimited { retry_after_ms, .. } => {
                retry_after_ms.map(Duration::from_millis)
            }
            _ => None,
        };
        hinted.unwrap_or(self.default_backoff).min(self.max_backoff)
    }
}

/// Run `call` until it succeeds, fails with a non-rate-limit error, or
/// `policy.max_attempts` attempts have been made.
///
/// The final attempt's error is returned without sleeping.
pub async fn retry_rate_limited<F, Fut, T>(
    policy: &RetryPolicy,
    label: &str,
    mut call: F,
) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match call().await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_rate_limited() && attempt < attempts => {
                let backoff = policy.backoff_for(&e);
                warn!(
                    "{}: rate limited (attempt {}/{}), retrying in {}ms — {}",
                    label,
                    attempt,
                    attempts,
                    backoff.as_millis(),
                    e
                );
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Try `models` in order; returns the first success with the model that
/// produced it.
///
/// # Errors
/// The first error that is not model-unavailable, or the last
/// model-unavailable error once every model has been tried.
pub async fn try_models<F, Fut, T>(
    provider: &str,
    models: &[String],
    mut call: F,
) -> Result<(String, T), ProviderError>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut last_err = None;
    for model in models {
        match call(model.clone()).await {
            Ok(v) => return Ok((model.clone(), v)),
            Err(e) if e.is_model_unavailable() => {
                warn!("{provider}: model '{model}' unavailable, trying next — {e}");
                last_err = Some(e);
            }
            Err(e) => return Err(e),
        }
    }
    Err(last_err.unwrap_or_else(|| ProviderError::NoModels {
        provider: provider.to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use tokio::time::Instant;

    fn rate_limited(message: &str) -> ProviderError {
        ProviderError::RateLimited {
            provider: "Gemini".into(),
            status: 429,
            message: message.into(),
            retry_after_ms: parse_retry_hint(message),
        }
    }

    fn not_found(model: &str) -> ProviderError {
        ProviderError::ModelUnavailable {
            provider: "Gemini".into(),
            model: model.into(),
            status: 404,
            message: "not found".into(),
        }
    }

    fn assert_about(actual: Duration, expected_ms: u64) {
        let expected = Duration::from_millis(expected_ms);
        assert!(
            actual >= expected && actual < expected + Duration::from_millis(50),
            "expected ~{expected_ms}ms, got {actual:?}"
        );
    }

    fn api(status: u16) -> ProviderError {
        ProviderError::Api {
            provider: "Gemini".into(),
            status,
            body: "bad request".into(),
        }
    }

    #[test]
    fn hint_parsing() {
        assert_eq!(parse_retry_hint("Please retry in 2.5s."), Some(2500));
        assert_eq!(parse_retry_hint("RETRY IN 3 s"), Some(3000));
        assert_eq!(parse_retry_hint("retry in 1.2345s"), Some(1235));
        assert_eq!(parse_retry_hint("retry in .5s"), Some(500));
        assert_eq!(parse_retry_hint("retry in 0s"), None);
        assert_eq!(parse_retry_hint("quota exceeded"), None);
    }

    #[test]
    fn backoff_uses_hint_default_and_cap() {
        let p = RetryPolicy::default();
        assert_eq!(
            p.backoff_for(&rate_limited("retry in 2.5s")),
            Duration::from_millis(2500)
        );
        assert_eq!(
            p.backoff_for(&rate_limited("quota exceeded")),
            Duration::from_millis(4000)
        );
        assert_eq!(
            p.backoff_for(&rate_limited("retry in 42s")),
            Duration::from_millis(5000)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_sleeps_hinted_delay_then_succeeds() {
        let script = RefCell::new(VecDeque::from(vec![
            Err(rate_limited("Please retry in 2.5s.")),
            Ok("explained"),
        ]));
        let calls = RefCell::new(Vec::new());

        let result = retry_rate_limited(&RetryPolicy::default(), "test", || {
            calls.borrow_mut().push(Instant::now());
            let next = script.borrow_mut().pop_front().unwrap();
            async move { next }
        })
        .await;

        assert_eq!(result.unwrap(), "explained");
        let calls = calls.borrow();
        assert_eq!(calls.len(), 2);
        assert_about(calls[1] - calls[0], 2500);
    }

    #[tokio::test(start_paused = true)]
    async fn unhinted_rate_limit_sleeps_default() {
        let script = RefCell::new(VecDeque::from(vec![
            Err(rate_limited("429 Too Many Requests")),
            Ok(()),
        ]));
        let calls = RefCell::new(Vec::new());

        retry_rate_limited(&RetryPolicy::default(), "test", || {
            calls.borrow_mut().push(Instant::now());
            let next = script.borrow_mut().pop_front().unwrap();
            async move { next }
        })
        .await
        .unwrap();

        let calls = calls.borrow();
        assert_about(calls[1] - calls[0], 4000);
    }

    #[tokio::test(start_paused = true)]
    async fn final_attempt_propagates_without_sleeping() {
        let count = RefCell::new(0u32);
        let start = Instant::now();

        let err = retry_rate_limited(&RetryPolicy::default(), "test", || {
            *count.borrow_mut() += 1;
            async { Err::<(), _>(rate_limited("retry in 1s")) }
        })
        .await
        .unwrap_err();

        assert!(err.is_rate_limited());
        assert_eq!(*count.borrow(), 3);
        // Two sleeps between three attempts, none after the last.
        assert_about(start.elapsed(), 2000);
    }

    #[tokio::test(start_paused = true)]
    async fn other_errors_are_not_retried() {
        let count = RefCell::new(0u32);
        let err = retry_rate_limited(&RetryPolicy::default(), "test", || {
            *count.borrow_mut() += 1;
            async { Err::<(), _>(api(400)) }
        })
        .await
        .unwrap_err();
        assert_eq!(err, api(400));
        assert_eq!(*count.borrow(), 1);
    }

    #[tokio::test]
    async fn unavailable_models_are_skipped() {
        let models: Vec<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        let tried = RefCell::new(Vec::new());

        let (model, text) = try_models("Gemini", &models, |m| {
            tried.borrow_mut().push(m.clone());
            async move {
                if m == "c" {
                    Ok("from c")
                } else {
                    Err(not_found(&m))
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(model, "c");
        assert_eq!(text, "from c");
        assert_eq!(*tried.borrow(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn other_error_stops_the_model_walk() {
        let models: Vec<String> = ["a", "b"].iter().map(|s| s.to_string()).collect();
        let tried = RefCell::new(Vec::new());

        let err = try_models("Gemini", &models, |m| {
            tried.borrow_mut().push(m);
            async { Err::<(), _>(api(500)) }
        })
        .await
        .unwrap_err();

        assert_eq!(err, api(500));
        assert_eq!(*tried.borrow(), vec!["a"]);
    }

    #[tokio::test]
    async fn exhausted_models_return_last_error() {
        let models: Vec<String> = ["a", "b"].iter().map(|s| s.to_string()).collect();
        let err = try_models("Gemini", &models, |m| async move { Err::<(), _>(not_found(&m)) })
            .await
            .unwrap_err();
        assert_eq!(err, not_found("b"));

        let err = try_models("Gemini", &[], |_| async { Ok(()) })
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::NoModels { .. }));
    }
}
