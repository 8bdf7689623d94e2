//! Retry policy: exponential backoff between failed attempts.

use std::time::Duration;

/// Decides the fate of a failed job and how long to wait before retrying.
///
/// The dispatcher consults this after every failure report; backoff math
/// lives here and nowhere else.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(base_delay: Duration) -> Self {
        Self { base_delay }
    }

    /// Whether another attempt should be scheduled.
    pub fn should_retry(&self, attempts: u32, max_attempts: u32) -> bool {
        attempts < max_attempts
    }

    /// Delay before the next attempt: `base * 2^(attempts - 1)`.
    ///
    /// `attempts` counts attempts already made, so the first retry waits
    /// the base delay, the second twice that, and so on. The exponent is
    /// capped so large attempt counts cannot overflow.
    pub fn backoff(&self, attempts: u32) -> Duration {
        let exp = attempts.saturating_sub(1).min(31);
        self.base_delay.saturating_mul(1u32 << exp)
    }
}
