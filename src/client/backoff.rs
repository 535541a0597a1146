//! Capped exponential retry delay.

use std::time::Duration;

/// Retry schedule `min(base * 2^attempt, cap)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
}

impl Backoff {
    /// Creates a schedule starting at `base` and never exceeding `cap`.
    #[must_use]
    pub const fn new(base: Duration, cap: Duration) -> Self {
        Self { base, cap }
    }

    /// Delay for the given zero-based attempt number.
    ///
    /// Non-decreasing in `attempt` and never greater than the cap.
    #[must_use]
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let factor = 1_u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base
            .checked_mul(factor)
            .map_or(self.cap, |delay| delay.min(self.cap))
    }

    /// Upper bound on any delay.
    #[must_use]
    pub const fn cap(&self) -> Duration {
        self.cap
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(5))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_until_cap() {
        let backoff = Backoff::default();
        let delays: Vec<u64> = (0..6).map(|n| backoff.next_delay(n).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 5, 5, 5]);
    }

    #[test]
    fn monotone_and_bounded_for_large_attempts() {
        let backoff = Backoff::new(Duration::from_millis(250), Duration::from_secs(30));
        let mut previous = Duration::ZERO;
        for attempt in 0..200 {
            let delay = backoff.next_delay(attempt);
            assert!(delay >= previous);
            assert!(delay <= backoff.cap());
            previous = delay;
        }
        assert_eq!(backoff.next_delay(u32::MAX), backoff.cap());
    }

    #[test]
    fn cap_below_base_wins() {
        let backoff = Backoff::new(Duration::from_secs(10), Duration::from_secs(3));
        assert_eq!(backoff.next_delay(0), Duration::from_secs(3));
    }
}
