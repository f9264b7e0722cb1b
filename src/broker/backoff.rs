//! Bounded exponential backoff for broker reconnection.
//!
//! Pure bookkeeping, no timers: the session loop asks for the next
//! delay, sleeps it, and reports success (reset) or failure (advance).

use std::time::Duration;

/// Maximum number of consecutive reconnect attempts before giving up.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 12;

/// Ceiling for the delay between attempts.
pub const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(60);

/// Reconnection attempt counter and delay schedule.
///
/// The delay before attempt `n` (zero-based) is `min(60s, 2^n * 1s)`:
/// 1, 2, 4, 8, 16, 32, then 60 for the remaining attempts. Reset on
/// every successful (re)connect.
#[derive(Debug, Clone, Default)]
pub struct ReconnectState {
    attempt: u32,
}

impl ReconnectState {
    /// Fresh state with no failed attempts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay to wait before the next attempt, or `None` once the
    /// attempt allowance is used up and the session must fail.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempt >= MAX_RECONNECT_ATTEMPTS {
            return None;
        }
        let exp = Duration::from_secs(1u64 << self.attempt.min(32));
        self.attempt += 1;
        Some(exp.min(MAX_RECONNECT_DELAY))
    }

    /// Attempts consumed so far.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Reset after a successful (re)connect.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_sequence_capped_at_sixty() {
        let mut state = ReconnectState::new();
        let delays: Vec<u64> = std::iter::from_fn(|| state.next_delay())
            .map(|d| d.as_secs())
            .collect();

        assert_eq!(delays, vec![1, 2, 4, 8, 16, 32, 60, 60, 60, 60, 60, 60]);
    }

    #[test]
    fn test_exhaustion_after_twelve_attempts() {
        let mut state = ReconnectState::new();
        for _ in 0..MAX_RECONNECT_ATTEMPTS {
            assert!(state.next_delay().is_some());
        }
        assert_eq!(state.attempt(), MAX_RECONNECT_ATTEMPTS);
        assert!(state.next_delay().is_none());
        assert!(state.next_delay().is_none());
    }

    #[test]
    fn test_reset_restarts_schedule() {
        let mut state = ReconnectState::new();
        state.next_delay();
        state.next_delay();
        state.next_delay();
        assert_eq!(state.attempt(), 3);

        state.reset();
        assert_eq!(state.attempt(), 0);
        assert_eq!(state.next_delay(), Some(Duration::from_secs(1)));
    }
}
