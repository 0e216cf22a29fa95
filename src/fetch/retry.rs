//! Retry logic with exponential backoff for transient fetch failures.
//!
//! This module provides the [`RetryPolicy`] and [`FailureType`] types for
//! classifying fetch errors and determining retry behavior, plus
//! [`fetch_with_retry`], the loop that drives a [`PageFetcher`] through the
//! policy.
//!
//! # Overview
//!
//! When a fetch fails, the error is classified into a [`FailureType`]:
//! - [`FailureType::Transient`] - temporary failures that may succeed on retry
//!   (timeouts, connection resets, 5xx)
//! - [`FailureType::RateLimited`] - HTTP 429, retried with backoff
//! - [`FailureType::Fatal`] - failures that won't succeed regardless of
//!   retries (malformed URL, 4xx other than 429)
//!
//! The [`RetryPolicy`] then decides whether to retry based on failure type and
//! the retries already consumed, calculating exponential backoff delays with
//! jitter. With `max_retries = N`, a page that always fails transiently is
//! fetched exactly N+1 times before the terminal [`PageFetchFailed`] is
//! surfaced. Fatal failures never consume retry budget.

use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use super::client::{PageFetcher, RawPage};
use super::error::FetchError;

/// Default number of retries after the initial attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default base delay for exponential backoff (1 second).
const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Default maximum delay cap (32 seconds).
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(32);

/// Default backoff multiplier (doubles each retry).
const DEFAULT_BACKOFF_MULTIPLIER: f32 = 2.0;

/// Maximum jitter added to delays (500ms).
const MAX_JITTER: Duration = Duration::from_millis(500);

/// Classification of fetch failure types.
///
/// Used to determine whether a failed page fetch should be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Temporary failure that may succeed on retry.
    ///
    /// Examples: request timeout, connection reset, 5xx server errors.
    Transient,

    /// Server rate limiting (HTTP 429). Retried with backoff.
    RateLimited,

    /// Failure that won't succeed regardless of retries.
    ///
    /// Examples: 404 Not Found, 400 Bad Request, malformed URL.
    Fatal,
}

/// Decision on whether to retry a failed fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry the fetch after the specified delay.
    Retry {
        /// How long to wait before retrying.
        delay: Duration,
        /// Which retry this will be (1-indexed).
        retry: u32,
    },

    /// Do not retry the fetch.
    DoNotRetry {
        /// Human-readable reason why retry is not attempted.
        reason: String,
    },
}

/// Terminal failure for one page: the retry budget is spent or the error was
/// fatal on arrival. Recorded in the run's error list; the walk continues.
#[derive(Debug, Clone, Error)]
#[error("page fetch failed for {url} after {attempts} attempt(s): {last_reason}")]
pub struct PageFetchFailed {
    /// The page that could not be fetched.
    pub url: String,
    /// Total attempts issued (initial attempt plus retries).
    pub attempts: u32,
    /// Description of the last error observed.
    pub last_reason: String,
}

/// Configuration for retry behavior with exponential backoff.
///
/// # Default Values
///
/// - `max_retries`: 3 (so 4 attempts total)
/// - `base_delay`: 1 second
/// - `max_delay`: 32 seconds
/// - `backoff_multiplier`: 2.0
///
/// # Delay Calculation
///
/// ```text
/// delay = min(base_delay * multiplier^retries_used, max_delay) + jitter
/// ```
///
/// With defaults, retry delays are approximately 1s, 2s, 4s.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum retries after the initial attempt.
    max_retries: u32,

    /// Base delay for the first retry.
    base_delay: Duration,

    /// Maximum delay cap.
    max_delay: Duration,

    /// Multiplier applied each retry (typically 2.0 for doubling).
    backoff_multiplier: f32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }
}

impl RetryPolicy {
    /// Creates a new retry policy with custom settings.
    #[must_use]
    pub fn new(
        max_retries: u32,
        base_delay: Duration,
        max_delay: Duration,
        backoff_multiplier: f32,
    ) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
            backoff_multiplier,
        }
    }

    /// Creates a policy with a custom retry cap, using defaults otherwise.
    #[must_use]
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    /// Returns the configured retry cap.
    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Determines whether to retry a failed fetch.
    ///
    /// # Arguments
    ///
    /// * `failure_type` - classification of the failure
    /// * `retries_used` - retries already consumed for this page (0 after the
    ///   initial attempt fails)
    #[instrument(skip(self), fields(max_retries = self.max_retries))]
    pub fn should_retry(&self, failure_type: FailureType, retries_used: u32) -> RetryDecision {
        // Fatal failures never consume retry budget.
        if failure_type == FailureType::Fatal {
            return RetryDecision::DoNotRetry {
                reason: "fatal failure - retry would not help".to_string(),
            };
        }

        if retries_used >= self.max_retries {
            debug!(retries_used, max = self.max_retries, "retry budget spent");
            return RetryDecision::DoNotRetry {
                reason: format!("retry budget ({}) exhausted", self.max_retries),
            };
        }

        let delay = self.calculate_delay(retries_used);

        debug!(
            retry = retries_used + 1,
            delay_ms = delay.as_millis(),
            "will retry"
        );

        RetryDecision::Retry {
            delay,
            retry: retries_used + 1,
        }
    }

    /// Calculates the delay before the next retry.
    ///
    /// Formula: `min(base_delay * multiplier^retries_used, max_delay) + jitter`
    fn calculate_delay(&self, retries_used: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as f64;
        let multiplier = f64::from(self.backoff_multiplier);

        let delay_ms = base_ms * multiplier.powf(f64::from(retries_used));
        let capped_ms = delay_ms.min(self.max_delay.as_millis() as f64);

        Duration::from_millis(capped_ms as u64) + self.calculate_jitter()
    }

    /// Generates random jitter between 0 and `MAX_JITTER`.
    ///
    /// Jitter spreads retries out when several pages fail at the same moment.
    fn calculate_jitter(&self) -> Duration {
        let mut rng = rand::thread_rng();
        let jitter_ms = rng.gen_range(0..=MAX_JITTER.as_millis() as u64);
        Duration::from_millis(jitter_ms)
    }
}

/// Classifies a fetch error into a failure type for retry decisions.
///
/// # HTTP Status Code Classification
///
/// | Status | Type | Rationale |
/// |--------|------|-----------|
/// | 408 | Transient | Request timeout - may succeed |
/// | 429 | RateLimited | Rate limited - retry with backoff |
/// | other 4xx | Fatal | Client error - won't succeed on retry |
/// | 5xx | Transient | Server error - may be temporary |
///
/// # Non-HTTP Errors
///
/// | Error | Type | Rationale |
/// |-------|------|-----------|
/// | Timeout | Transient | Network may recover |
/// | Network | Transient | Connection reset, server may come back |
/// | InvalidUrl | Fatal | Won't succeed |
#[instrument]
pub fn classify_error(error: &FetchError) -> FailureType {
    match error {
        FetchError::HttpStatus { status, .. } => classify_http_status(*status),
        FetchError::Timeout { .. } | FetchError::Network { .. } => FailureType::Transient,
        FetchError::InvalidUrl { .. } => FailureType::Fatal,
    }
}

/// Classifies an HTTP status code into a failure type.
fn classify_http_status(status: u16) -> FailureType {
    match status {
        408 => FailureType::Transient,
        429 => FailureType::RateLimited,
        status if (400..500).contains(&status) => FailureType::Fatal,
        status if (500..600).contains(&status) => FailureType::Transient,
        // Anything else is unexpected, treat as fatal.
        _ => FailureType::Fatal,
    }
}

/// Fetches one page through the retry policy.
///
/// Issues the initial attempt, then retries per [`RetryPolicy::should_retry`],
/// sleeping the calculated backoff delay between attempts. Fatal errors fail
/// immediately without consuming retry budget.
///
/// # Errors
///
/// Returns [`PageFetchFailed`] once the policy declines to retry, carrying the
/// last observed error and the total attempt count.
pub async fn fetch_with_retry(
    fetcher: &dyn PageFetcher,
    policy: &RetryPolicy,
    url: &str,
) -> Result<RawPage, PageFetchFailed> {
    let mut retries_used: u32 = 0;

    loop {
        match fetcher.fetch(url).await {
            Ok(page) => return Ok(page),
            Err(error) => {
                let failure_type = classify_error(&error);
                match policy.should_retry(failure_type, retries_used) {
                    RetryDecision::Retry { delay, retry } => {
                        warn!(url, retry, ?failure_type, error = %error, "fetch failed, retrying");
                        tokio::time::sleep(delay).await;
                        retries_used += 1;
                    }
                    RetryDecision::DoNotRetry { reason } => {
                        warn!(url, %reason, error = %error, "giving up on page");
                        return Err(PageFetchFailed {
                            url: url.to_string(),
                            attempts: retries_used + 1,
                            last_reason: error.to_string(),
                        });
                    }
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;

    // ==================== RetryPolicy Tests ====================

    #[test]
    fn test_retry_policy_default_values() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.base_delay, Duration::from_secs(1));
        assert_eq!(policy.max_delay, Duration::from_secs(32));
        assert!((policy.backoff_multiplier - 2.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_retry_policy_with_max_retries() {
        let policy = RetryPolicy::with_max_retries(5);
        assert_eq!(policy.max_retries(), 5);
        assert_eq!(policy.base_delay, Duration::from_secs(1));
    }

    #[test]
    fn test_zero_retries_means_single_attempt() {
        let policy = RetryPolicy::with_max_retries(0);
        let decision = policy.should_retry(FailureType::Transient, 0);
        assert!(matches!(decision, RetryDecision::DoNotRetry { .. }));
    }

    // ==================== Delay Calculation Tests ====================

    #[test]
    fn test_delay_calculation_first_retry() {
        let policy = RetryPolicy::new(5, Duration::from_secs(1), Duration::from_secs(32), 2.0);
        // First retry: base * 2^0 = 1s + jitter
        let delay = policy.calculate_delay(0);
        assert!(delay >= Duration::from_secs(1));
        assert!(delay <= Duration::from_millis(1500));
    }

    #[test]
    fn test_delay_calculation_second_retry() {
        let policy = RetryPolicy::new(5, Duration::from_secs(1), Duration::from_secs(32), 2.0);
        // Second retry: base * 2^1 = 2s + jitter
        let delay = policy.calculate_delay(1);
        assert!(delay >= Duration::from_secs(2));
        assert!(delay <= Duration::from_millis(2500));
    }

    #[test]
    fn test_delay_calculation_respects_max_delay() {
        let policy = RetryPolicy::new(10, Duration::from_secs(1), Duration::from_secs(5), 2.0);
        // 6th retry would be 1 * 2^5 = 32s, but capped at 5s
        let delay = policy.calculate_delay(5);
        assert!(delay >= Duration::from_secs(5));
        assert!(delay <= Duration::from_millis(5500));
    }

    #[test]
    fn test_jitter_within_bounds() {
        let policy = RetryPolicy::default();
        for _ in 0..100 {
            let jitter = policy.calculate_jitter();
            assert!(
                jitter <= MAX_JITTER,
                "Jitter {} exceeds max",
                jitter.as_millis()
            );
        }
    }

    // ==================== Error Classification Tests ====================

    #[test]
    fn test_classify_http_404_fatal() {
        let error = FetchError::http_status("http://example.com", 404);
        assert_eq!(classify_error(&error), FailureType::Fatal);
    }

    #[test]
    fn test_classify_http_400_fatal() {
        let error = FetchError::http_status("http://example.com", 400);
        assert_eq!(classify_error(&error), FailureType::Fatal);
    }

    #[test]
    fn test_classify_http_408_transient() {
        let error = FetchError::http_status("http://example.com", 408);
        assert_eq!(classify_error(&error), FailureType::Transient);
    }

    #[test]
    fn test_classify_http_429_rate_limited() {
        let error = FetchError::http_status("http://example.com", 429);
        assert_eq!(classify_error(&error), FailureType::RateLimited);
    }

    #[test]
    fn test_classify_http_500_transient() {
        let error = FetchError::http_status("http://example.com", 500);
        assert_eq!(classify_error(&error), FailureType::Transient);
    }

    #[test]
    fn test_classify_http_503_transient() {
        let error = FetchError::http_status("http://example.com", 503);
        assert_eq!(classify_error(&error), FailureType::Transient);
    }

    #[test]
    fn test_classify_timeout_transient() {
        let error = FetchError::timeout("http://example.com");
        assert_eq!(classify_error(&error), FailureType::Transient);
    }

    #[test]
    fn test_classify_invalid_url_fatal() {
        let error = FetchError::invalid_url("not-a-url");
        assert_eq!(classify_error(&error), FailureType::Fatal);
    }

    // ==================== Should Retry Decision Tests ====================

    #[test]
    fn test_should_retry_fatal_does_not_retry() {
        let policy = RetryPolicy::default();
        let decision = policy.should_retry(FailureType::Fatal, 0);
        assert!(matches!(decision, RetryDecision::DoNotRetry { .. }));
        if let RetryDecision::DoNotRetry { reason } = decision {
            assert!(reason.contains("fatal"));
        }
    }

    #[test]
    fn test_should_retry_transient_retries() {
        let policy = RetryPolicy::default();
        let decision = policy.should_retry(FailureType::Transient, 0);
        assert!(matches!(decision, RetryDecision::Retry { retry: 1, .. }));
    }

    #[test]
    fn test_should_retry_rate_limited_retries() {
        let policy = RetryPolicy::default();
        let decision = policy.should_retry(FailureType::RateLimited, 0);
        assert!(matches!(decision, RetryDecision::Retry { .. }));
    }

    #[test]
    fn test_should_retry_respects_budget() {
        let policy = RetryPolicy::with_max_retries(2);

        assert!(matches!(
            policy.should_retry(FailureType::Transient, 0),
            RetryDecision::Retry { .. }
        ));
        assert!(matches!(
            policy.should_retry(FailureType::Transient, 1),
            RetryDecision::Retry { .. }
        ));

        let decision = policy.should_retry(FailureType::Transient, 2);
        assert!(matches!(decision, RetryDecision::DoNotRetry { .. }));
        if let RetryDecision::DoNotRetry { reason } = decision {
            assert!(reason.contains("exhausted"));
        }
    }

    // ==================== fetch_with_retry Tests ====================

    /// Fetcher that always fails with a given status, counting attempts.
    struct AlwaysFails {
        status: u16,
        attempts: AtomicU32,
    }

    #[async_trait]
    impl PageFetcher for AlwaysFails {
        async fn fetch(&self, url: &str) -> Result<RawPage, FetchError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(FetchError::http_status(url, self.status))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_page_fetched_max_retries_plus_one_times() {
        let fetcher = AlwaysFails {
            status: 503,
            attempts: AtomicU32::new(0),
        };
        let policy = RetryPolicy::with_max_retries(3);

        let result = fetch_with_retry(&fetcher, &policy, "http://example.com/page").await;

        let err = result.unwrap_err();
        assert_eq!(fetcher.attempts.load(Ordering::SeqCst), 4);
        assert_eq!(err.attempts, 4);
        assert!(err.last_reason.contains("503"));
    }

    #[tokio::test]
    async fn test_fatal_page_fails_after_single_attempt() {
        let fetcher = AlwaysFails {
            status: 404,
            attempts: AtomicU32::new(0),
        };
        let policy = RetryPolicy::with_max_retries(3);

        let result = fetch_with_retry(&fetcher, &policy, "http://example.com/gone").await;

        let err = result.unwrap_err();
        assert_eq!(fetcher.attempts.load(Ordering::SeqCst), 1);
        assert_eq!(err.attempts, 1);
        assert!(err.last_reason.contains("404"));
    }

    /// Fetcher that fails transiently a fixed number of times, then succeeds.
    struct FailsThenSucceeds {
        failures: u32,
        attempts: AtomicU32,
    }

    #[async_trait]
    impl PageFetcher for FailsThenSucceeds {
        async fn fetch(&self, url: &str) -> Result<RawPage, FetchError> {
            let n = self.attempts.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(FetchError::http_status(url, 502))
            } else {
                Ok(RawPage {
                    url: url.to_string(),
                    body: "<html></html>".to_string(),
                })
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_within_budget() {
        let fetcher = FailsThenSucceeds {
            failures: 2,
            attempts: AtomicU32::new(0),
        };
        let policy = RetryPolicy::with_max_retries(3);

        let page = fetch_with_retry(&fetcher, &policy, "http://example.com/flaky")
            .await
            .unwrap();
        assert_eq!(page.url, "http://example.com/flaky");
        assert_eq!(fetcher.attempts.load(Ordering::SeqCst), 3);
    }
}
