//! Retry policy with exponential backoff and jitter.

use std::collections::BTreeSet;
use std::time::Duration;

/// Retries triggered by a 429 or any server error by default.
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Base delay for the exponential backoff schedule.
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(500);
/// Fraction of extra random delay added on top of each backoff step.
pub const DEFAULT_JITTER_FRACTION: f64 = 0.1;
/// Ceiling on any single backoff delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(60);

/// Decides whether and when a failed fetch is re-attempted.
///
/// Only idempotent read-only fetches go through this policy; mutating
/// operations are never retried by this layer.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub retryable_statuses: BTreeSet<u16>,
    /// Jitter fraction in `[0, 1]`; each delay is scaled by
    /// `1 + uniform(0, jitter_fraction)` to avoid synchronized retry storms.
    pub jitter_fraction: f64,
    /// Ceiling applied after jitter; keeps the doubling schedule finite for
    /// high attempt counts.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_base: DEFAULT_BACKOFF_BASE,
            retryable_statuses: default_retryable_statuses(),
            jitter_fraction: DEFAULT_JITTER_FRACTION,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

/// Too-many-requests plus the whole server-error range.
fn default_retryable_statuses() -> BTreeSet<u16> {
    let mut statuses: BTreeSet<u16> = (500..=599).collect();
    statuses.insert(429);
    statuses
}

impl RetryPolicy {
    /// Exponential backoff policy with the default retryable status set.
    pub fn new(max_retries: u32, backoff_base: Duration) -> Self {
        Self {
            max_retries,
            backoff_base,
            ..Self::default()
        }
    }

    /// Disable retries entirely.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Replace the retryable status set.
    pub fn with_retryable_statuses(mut self, statuses: impl IntoIterator<Item = u16>) -> Self {
        self.retryable_statuses = statuses.into_iter().collect();
        self
    }

    /// Set the jitter fraction, clamped to `[0, 1]`.
    pub fn with_jitter_fraction(mut self, fraction: f64) -> Self {
        self.jitter_fraction = fraction.clamp(0.0, 1.0);
        self
    }

    /// Cap every computed delay at `max_delay`.
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// True iff another attempt is allowed for this status.
    ///
    /// `attempt` is 0-based: with `max_retries = 3` attempts 0, 1 and 2 may
    /// be retried, giving four transport calls in total.
    pub fn should_retry(&self, status: u16, attempt: u32) -> bool {
        attempt < self.max_retries && self.retryable_statuses.contains(&status)
    }

    /// Backoff delay before re-running `attempt` (0-based):
    /// `backoff_base * 2^attempt`, scaled by `1 + uniform(0, jitter)` and
    /// capped at `max_delay`.
    pub fn delay(&self, attempt: u32) -> Duration {
        // Clamp the exponent so the u32 -> i32 conversion cannot wrap;
        // anything this large saturates to infinity and hits the cap anyway.
        let scale = 2f64.powi(attempt.min(1 << 12) as i32);
        let base = self.backoff_base.as_secs_f64() * scale;
        let jitter = 1.0 + fastrand::f64() * self.jitter_fraction;
        // The product can reach infinity for large attempt counts; the cap
        // keeps it finite and representable.
        let capped = (base * jitter).min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_statuses_cover_429_and_server_errors() {
        let policy = RetryPolicy::default();

        for status in [429, 500, 502, 503, 504, 599] {
            assert!(policy.should_retry(status, 0), "{status} should retry");
        }
        for status in [400, 401, 403, 404, 418] {
            assert!(!policy.should_retry(status, 0), "{status} should not retry");
        }
    }

    #[test]
    fn test_attempt_budget_is_exhausted_at_max_retries() {
        let policy = RetryPolicy::new(3, Duration::from_millis(100));

        assert!(policy.should_retry(503, 0));
        assert!(policy.should_retry(503, 2));
        assert!(!policy.should_retry(503, 3));
        assert!(!policy.should_retry(503, 10));
    }

    #[test]
    fn test_no_retry_policy_rejects_everything() {
        let policy = RetryPolicy::no_retry();
        assert!(!policy.should_retry(503, 0));
    }

    #[test]
    fn test_backoff_doubles_without_jitter() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100)).with_jitter_fraction(0.0);

        assert_eq!(policy.delay(0), Duration::from_millis(100));
        assert_eq!(policy.delay(1), Duration::from_millis(200));
        assert_eq!(policy.delay(2), Duration::from_millis(400));
        assert_eq!(policy.delay(3), Duration::from_millis(800));
    }

    #[test]
    fn test_jitter_only_stretches_the_delay() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100)).with_jitter_fraction(0.5);

        for _ in 0..50 {
            let delay = policy.delay(1).as_secs_f64();
            assert!(delay >= 0.2, "jitter must never shorten the delay: {delay}");
            assert!(delay <= 0.3 + 1e-9, "jitter above the fraction: {delay}");
        }
    }

    #[test]
    fn test_delay_is_capped_even_when_the_schedule_overflows() {
        let policy = RetryPolicy::new(u32::MAX, Duration::from_secs(1))
            .with_jitter_fraction(0.5)
            .with_max_delay(Duration::from_secs(30));

        // 2^1000 seconds is far beyond any representable Duration; the cap
        // must kick in instead of a panic.
        assert_eq!(policy.delay(1000), Duration::from_secs(30));
        assert_eq!(policy.delay(u32::MAX), Duration::from_secs(30));
        assert!(policy.delay(0).as_secs_f64() <= 1.5 + 1e-9);
    }

    #[test]
    fn test_custom_status_set_replaces_the_default() {
        let policy = RetryPolicy::default().with_retryable_statuses([503]);

        assert!(policy.should_retry(503, 0));
        assert!(!policy.should_retry(429, 0));
    }
}
