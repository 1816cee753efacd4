//! Nango client configuration.

use std::time::Duration;

use reqwest::header::RETRY_AFTER;
use reqwest::StatusCode;

use super::ApiResponse;

/// Default timeout for a single HTTP request: 30 seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default lower bound between two attempts.
pub const DEFAULT_MIN_WAIT: Duration = Duration::from_secs(1);

/// Default upper bound between two attempts.
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(5);

/// How transient failures are retried.
///
/// The wait before retry `n` (zero-based) is `min_wait * 2^n`, capped at
/// `max_wait`. A `Retry-After` header on 429/503 responses replaces the
/// computed wait and is capped the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; `0` disables retrying.
    pub max_retries: u32,
    /// Wait before the first retry.
    pub min_wait: Duration,
    /// Upper bound for any single wait.
    pub max_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            min_wait: DEFAULT_MIN_WAIT,
            max_wait: DEFAULT_MAX_WAIT,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Set the number of retries.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the wait bounds.
    #[must_use]
    pub fn with_wait(mut self, min_wait: Duration, max_wait: Duration) -> Self {
        self.min_wait = min_wait;
        self.max_wait = max_wait.max(min_wait);
        self
    }

    /// Total number of attempts, the first one included.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Exponential backoff before retry `attempt` (zero-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.min_wait.saturating_mul(factor).min(self.max_wait)
    }

    /// Server-requested wait, honored for 429 and 503 responses.
    pub fn retry_after(&self, response: &ApiResponse) -> Option<Duration> {
        if !matches!(
            response.status,
            StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE
        ) {
            return None;
        }
        let seconds: u64 = response
            .headers
            .get(RETRY_AFTER)?
            .to_str()
            .ok()?
            .trim()
            .parse()
            .ok()?;
        Some(Duration::from_secs(seconds).min(self.max_wait))
    }

    /// Wait before retrying after `response` on retry `attempt`.
    pub fn wait_for(&self, attempt: u32, response: Option<&ApiResponse>) -> Duration {
        response
            .and_then(|r| self.retry_after(r))
            .unwrap_or_else(|| self.backoff(attempt))
    }
}

/// Whether a response status is worth retrying: 429 and 5xx except 501.
pub fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || (status.is_server_error() && status != StatusCode::NOT_IMPLEMENTED)
}

/// Configuration for the Nango HTTP client stack.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Per-request timeout in seconds.
    pub http_timeout: u64,
    /// Retry behavior for transient failures.
    pub retry: RetryPolicy,
    /// Install the request logging layer.
    pub log_requests: bool,
    /// Log request and response bodies (secrets redacted).
    pub log_http_bodies: bool,
    /// User-Agent header to send with requests.
    pub user_agent: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            http_timeout: DEFAULT_TIMEOUT_SECS,
            retry: RetryPolicy::default(),
            log_requests: true,
            log_http_bodies: false,
            user_agent: None,
        }
    }
}

impl ClientConfig {
    /// Returns the effective timeout, using the default if zero.
    pub fn effective_timeout(&self) -> Duration {
        if self.http_timeout == 0 {
            Duration::from_secs(DEFAULT_TIMEOUT_SECS)
        } else {
            Duration::from_secs(self.http_timeout)
        }
    }

    /// Returns the effective user agent, using the default if not set.
    pub fn effective_user_agent(&self) -> String {
        self.user_agent
            .clone()
            .unwrap_or_else(|| format!("hemmer-provider-nango/{}", env!("CARGO_PKG_VERSION")))
    }

    /// Set the timeout in seconds.
    #[must_use]
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.http_timeout = timeout_secs;
        self
    }

    /// Set the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Enable or disable the request logging layer.
    #[must_use]
    pub fn with_request_logging(mut self, enabled: bool) -> Self {
        self.log_requests = enabled;
        self
    }

    /// Enable or disable body logging.
    #[must_use]
    pub fn with_body_logging(mut self, enabled: bool) -> Self {
        self.log_http_bodies = enabled;
        self
    }

    /// Set the user agent.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderMap, HeaderValue};

    fn response(status: StatusCode, retry_after: Option<&'static str>) -> ApiResponse {
        let mut headers = HeaderMap::new();
        if let Some(value) = retry_after {
            headers.insert(RETRY_AFTER, HeaderValue::from_static(value));
        }
        ApiResponse {
            status,
            headers,
            body: Vec::new(),
        }
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.max_attempts(), 4);
        assert_eq!(policy.min_wait, Duration::from_secs(1));
        assert_eq!(policy.max_wait, Duration::from_secs(5));
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(0), Duration::from_secs(1));
        assert_eq!(policy.backoff(1), Duration::from_secs(2));
        assert_eq!(policy.backoff(2), Duration::from_secs(4));
        assert_eq!(policy.backoff(3), Duration::from_secs(5));
        assert_eq!(policy.backoff(40), Duration::from_secs(5));
    }

    #[test]
    fn test_retry_after_honored_for_429_and_503() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.retry_after(&response(StatusCode::TOO_MANY_REQUESTS, Some("2"))),
            Some(Duration::from_secs(2))
        );
        assert_eq!(
            policy.retry_after(&response(StatusCode::SERVICE_UNAVAILABLE, Some("60"))),
            Some(Duration::from_secs(5))
        );
        assert_eq!(
            policy.retry_after(&response(StatusCode::BAD_GATEWAY, Some("2"))),
            None
        );
        assert_eq!(
            policy.retry_after(&response(StatusCode::TOO_MANY_REQUESTS, Some("soon"))),
            None
        );
    }

    #[test]
    fn test_wait_for_falls_back_to_backoff() {
        let policy = RetryPolicy::default();
        let resp = response(StatusCode::INTERNAL_SERVER_ERROR, None);
        assert_eq!(policy.wait_for(1, Some(&resp)), Duration::from_secs(2));
        assert_eq!(policy.wait_for(0, None), Duration::from_secs(1));
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable_status(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(is_retryable_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(!is_retryable_status(StatusCode::NOT_IMPLEMENTED));
        assert!(!is_retryable_status(StatusCode::BAD_REQUEST));
        assert!(!is_retryable_status(StatusCode::NOT_FOUND));
        assert!(!is_retryable_status(StatusCode::OK));
    }

    #[test]
    fn test_client_config_builder() {
        let config = ClientConfig::default()
            .with_timeout(0)
            .with_retry(RetryPolicy::disabled())
            .with_body_logging(true)
            .with_user_agent("custom/1.0");

        assert_eq!(config.effective_timeout(), Duration::from_secs(30));
        assert_eq!(config.retry.max_attempts(), 1);
        assert!(config.log_requests);
        assert!(config.log_http_bodies);
        assert_eq!(config.effective_user_agent(), "custom/1.0");
    }

    #[test]
    fn test_default_user_agent() {
        assert!(ClientConfig::default()
            .effective_user_agent()
            .starts_with("hemmer-provider-nango/"));
    }
}
