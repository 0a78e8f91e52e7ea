use std::time::Duration;

pub const DEFAULT_MAX_RETRIES: u32 = 5;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(500);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(10);

/// Exponential backoff for re-establishing the real-time connection.
///
/// Attempt `n` (zero-based) waits `min(base_delay * 2^n, max_delay)`.
/// Once `max_retries` consecutive attempts have failed the manager stops
/// trying until the credential changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

impl ReconnectPolicy {
    /// Policy that never retries after a failure.
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt`, or `None` once retries are
    /// exhausted.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_retries {
            return None;
        }

        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        let delay = self
            .base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay);

        Some(delay.min(self.max_delay))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_retries: u32, base_ms: u64, max_ms: u64) -> ReconnectPolicy {
        ReconnectPolicy {
            max_retries,
            base_delay: Duration::from_millis(base_ms),
            max_delay: Duration::from_millis(max_ms),
        }
    }

    #[test]
    fn test_delays_double() {
        let p = policy(4, 100, 10_000);
        assert_eq!(p.delay_for(0), Some(Duration::from_millis(100)));
        assert_eq!(p.delay_for(1), Some(Duration::from_millis(200)));
        assert_eq!(p.delay_for(2), Some(Duration::from_millis(400)));
        assert_eq!(p.delay_for(3), Some(Duration::from_millis(800)));
    }

    #[test]
    fn test_delays_are_capped() {
        let p = policy(10, 500, 2_000);
        assert_eq!(p.delay_for(2), Some(Duration::from_millis(2_000)));
        assert_eq!(p.delay_for(9), Some(Duration::from_millis(2_000)));
    }

    #[test]
    fn test_retries_stop_at_max() {
        let p = policy(2, 100, 1_000);
        assert!(p.delay_for(1).is_some());
        assert_eq!(p.delay_for(2), None);
        assert_eq!(p.delay_for(50), None);
    }

    #[test]
    fn test_large_attempt_does_not_overflow() {
        let p = policy(u32::MAX, 1_000, 30_000);
        assert_eq!(p.delay_for(40), Some(Duration::from_millis(30_000)));
    }

    #[test]
    fn test_disabled_policy() {
        assert_eq!(ReconnectPolicy::disabled().delay_for(0), None);
    }
}
