//! Retry policy for failed request attempts.

use crate::error::RequestError;
use std::time::Duration;

use super::options::RetryOptions;

/// Status codes retried when the caller does not supply its own set.
pub const DEFAULT_RETRY_STATUS_CODES: [u16; 6] = [408, 429, 500, 502, 503, 504];
/// Base delay used when retry options omit `delay_ms`.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1000);
/// Bounds applied to server-provided `Retry-After` hints.
const RETRY_AFTER_MIN_SECS: u64 = 1;
const RETRY_AFTER_MAX_SECS: u64 = 300;

/// Bounded retry policy resolved from per-request options.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries allowed after the initial attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Double the delay on each further retry.
    pub exponential: bool,
    pub retryable_statuses: Vec<u16>,
    /// Upper bound on any computed delay.
    pub max_delay: Option<Duration>,
    /// Prefer the server's `Retry-After` hint over the computed delay. Off
    /// unless requested; the hint is still bounded by `max_delay`.
    pub respect_retry_after: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            base_delay: DEFAULT_RETRY_DELAY,
            exponential: false,
            retryable_statuses: DEFAULT_RETRY_STATUS_CODES.to_vec(),
            max_delay: None,
            respect_retry_after: false,
        }
    }
}

impl From<&RetryOptions> for RetryPolicy {
    fn from(options: &RetryOptions) -> Self {
        Self {
            max_retries: options.count,
            base_delay: options
                .delay_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_RETRY_DELAY),
            exponential: options.exponential_backoff,
            retryable_statuses: options
                .status_codes
                .clone()
                .unwrap_or_else(|| DEFAULT_RETRY_STATUS_CODES.to_vec()),
            max_delay: options.max_delay_ms.map(Duration::from_millis),
            respect_retry_after: options.respect_retry_after,
        }
    }
}

impl RetryPolicy {
    /// Decide whether the failure after `attempt` prior retries earns another try.
    pub fn should_retry(&self, err: &RequestError, attempt: u32) -> bool {
        if attempt >= self.max_retries {
            return false;
        }
        match err {
            RequestError::Network { .. } => true,
            RequestError::Status { code, .. } => self.retryable_statuses.contains(code),
            RequestError::Cancelled
            | RequestError::Authorization(_)
            | RequestError::Business { .. }
            | RequestError::InvalidResponse(_)
            | RequestError::InvalidRequest(_) => false,
        }
    }

    /// Delay before retry number `attempt` (zero-based).
    pub fn retry_delay_for(&self, attempt: u32, err: &RequestError) -> Duration {
        let hinted = err
            .retry_after_secs()
            .filter(|_| self.respect_retry_after)
            .map(|seconds| {
                Duration::from_secs(seconds.clamp(RETRY_AFTER_MIN_SECS, RETRY_AFTER_MAX_SECS))
            });
        let delay = match hinted {
            Some(hinted) => hinted,
            None if self.exponential => self.base_delay.saturating_mul(2u32.saturating_pow(attempt)),
            None => self.base_delay,
        };
        match self.max_delay {
            Some(max) => delay.min(max),
            None => delay,
        }
    }
}

/// Per-execution retry bookkeeping.
#[derive(Clone, Debug, Default)]
pub struct RetryState {
    pub attempt_count: u32,
    policy: Option<RetryPolicy>,
}

impl RetryState {
    pub fn new(options: Option<&RetryOptions>) -> Self {
        Self {
            attempt_count: 0,
            policy: options.map(RetryPolicy::from),
        }
    }

    /// False when no retry policy is configured.
    pub fn should_retry(&self, err: &RequestError) -> bool {
        self.policy
            .as_ref()
            .is_some_and(|policy| policy.should_retry(err, self.attempt_count))
    }

    pub fn compute_delay(&self, err: &RequestError) -> Duration {
        self.policy
            .as_ref()
            .map(|policy| policy.retry_delay_for(self.attempt_count, err))
            .unwrap_or_default()
    }

    /// Count one retry and return the delay to wait before it.
    pub fn next_delay(&mut self, err: &RequestError) -> Duration {
        let delay = self.compute_delay(err);
        self.attempt_count = self.attempt_count.saturating_add(1);
        delay
    }
}

/// Parse a `Retry-After` header given either as delay-seconds or an HTTP date.
pub fn parse_retry_after(value: &str) -> Option<u64> {
    let trimmed = value.trim();
    if let Ok(seconds) = trimmed.parse::<u64>() {
        return Some(seconds);
    }
    let at = httpdate::parse_http_date(trimmed).ok()?;
    let wait = at
        .duration_since(std::time::SystemTime::now())
        .unwrap_or_default();
    Some(wait.as_secs())
}
