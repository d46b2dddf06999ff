use std::time::Duration;

/// In-request retry policy for transient webhook processing failures.
///
/// Exponential backoff clamped to `max_delay`; with the defaults the delays
/// are 1s, 2s, 4s... capped at 5s, for at most `max_attempts` total tries.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Initial delay before the first retry.
    pub base_delay: Duration,
    /// Factor applied on each successive attempt.
    pub multiplier: f64,
    /// Upper bound on the computed delay.
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Compute the delay before retry number `attempt` (zero-based: the
    /// delay after the first failed attempt is `delay_for(0)`).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base_secs = self.base_delay.as_secs_f64();
        // In practice `attempt` is a small retry count, so wrapping from
        // u32 to i32 cannot occur.
        #[allow(clippy::cast_possible_wrap)]
        let raw = base_secs * self.multiplier.powi(attempt as i32);
        let clamped = raw.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(clamped)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(5),
        }
    }
}
