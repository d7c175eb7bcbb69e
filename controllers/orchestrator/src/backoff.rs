//! # Fibonacci Backoff
//!
//! Requeue delays for the status watcher. The delay grows along the Fibonacci
//! sequence, more slowly than exponential backoff, so a store outage does not push
//! status updates minutes into the future after a couple of failures.
//!
//! Sequence with the watcher defaults: 5s, 5s, 10s, 15s, 25s, 40s, 65s, 105s, 120s (max).

use std::time::Duration;

/// Fibonacci backoff calculator, in whole seconds
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    min_secs: u64,
    prev_secs: u64,
    current_secs: u64,
    max_secs: u64,
}

impl FibonacciBackoff {
    /// Create a backoff starting at `min` and capped at `max`
    ///
    /// Sub-second durations are rounded down; a zero minimum is raised to one second
    /// so the sequence always advances.
    #[must_use]
    pub fn new(min: Duration, max: Duration) -> Self {
        let min_secs = min.as_secs().max(1);
        Self {
            min_secs,
            prev_secs: 0,
            current_secs: min_secs,
            max_secs: max.as_secs().max(min_secs),
        }
    }

    /// Get the next delay in seconds and advance the sequence
    pub fn next_backoff_seconds(&mut self) -> u64 {
        let result = self.current_secs;
        let next = self.prev_secs + self.current_secs;
        self.prev_secs = self.current_secs;
        self.current_secs = next.min(self.max_secs);
        result
    }

    /// Get the next delay as a `Duration` and advance the sequence
    #[must_use]
    pub fn next_backoff(&mut self) -> Duration {
        Duration::from_secs(self.next_backoff_seconds())
    }

    /// Reset to the initial state
    pub fn reset(&mut self) {
        self.prev_secs = 0;
        self.current_secs = self.min_secs;
    }

    /// Delay for the `error_count`-th consecutive failure (stateless, 0-indexed)
    #[must_use]
    pub fn calculate_for_error_count(error_count: u32, min: Duration, max: Duration) -> Duration {
        let mut backoff = Self::new(min, max);
        let mut delay = backoff.next_backoff();
        for _ in 0..error_count {
            delay = backoff.next_backoff();
            if delay.as_secs() >= backoff.max_secs {
                break;
            }
        }
        delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn test_fibonacci_backoff_sequence() {
        let mut backoff = FibonacciBackoff::new(secs(5), secs(120));
        let seq: Vec<u64> = (0..10).map(|_| backoff.next_backoff_seconds()).collect();
        assert_eq!(seq, vec![5, 5, 10, 15, 25, 40, 65, 105, 120, 120]);
    }

    #[test]
    fn test_reset() {
        let mut backoff = FibonacciBackoff::new(secs(5), secs(120));
        for _ in 0..5 {
            backoff.next_backoff();
        }
        backoff.reset();
        assert_eq!(backoff.next_backoff(), secs(5));
        assert_eq!(backoff.next_backoff(), secs(5));
        assert_eq!(backoff.next_backoff(), secs(10));
    }

    #[test]
    fn test_zero_minimum_still_advances() {
        let mut backoff = FibonacciBackoff::new(Duration::ZERO, secs(3));
        assert_eq!(backoff.next_backoff_seconds(), 1);
        assert_eq!(backoff.next_backoff_seconds(), 1);
        assert_eq!(backoff.next_backoff_seconds(), 2);
        assert_eq!(backoff.next_backoff_seconds(), 3);
        assert_eq!(backoff.next_backoff_seconds(), 3);
    }

    #[test]
    fn test_calculate_for_error_count_matches_sequence() {
        let min = secs(5);
        let max = secs(120);
        assert_eq!(FibonacciBackoff::calculate_for_error_count(0, min, max), secs(5));
        assert_eq!(FibonacciBackoff::calculate_for_error_count(1, min, max), secs(5));
        assert_eq!(FibonacciBackoff::calculate_for_error_count(2, min, max), secs(10));
        assert_eq!(FibonacciBackoff::calculate_for_error_count(5, min, max), secs(40));
        assert_eq!(FibonacciBackoff::calculate_for_error_count(50, min, max), secs(120));
    }
}
