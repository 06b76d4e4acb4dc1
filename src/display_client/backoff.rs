//! Reconnect backoff

use std::time::Duration;

/// `min(base * 2^attempt, max)`, attempt incremented per call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    attempt: u32,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            attempt: 0,
        }
    }

    /// Delay for the current attempt, then bump the attempt counter
    pub fn next_delay(&mut self) -> Duration {
        let delay = 2u32
            .checked_pow(self.attempt)
            .and_then(|factor| self.base.checked_mul(factor))
            .map_or(self.max, |d| d.min(self.max));
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    /// Successful subscription
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backoff() -> Backoff {
        Backoff::new(Duration::from_millis(1000), Duration::from_millis(30000))
    }

    #[test]
    fn test_doubles_then_caps() {
        let mut b = backoff();
        let delays: Vec<u64> = (0..7).map(|_| b.next_delay().as_millis() as u64).collect();
        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 16000, 30000, 30000]);
    }

    #[test]
    fn test_reset() {
        let mut b = backoff();
        b.next_delay();
        b.next_delay();
        b.next_delay();
        b.reset();
        assert_eq!(b.attempt(), 0);
        assert_eq!(b.next_delay(), Duration::from_millis(1000));
    }

    #[test]
    fn test_huge_attempt_stays_capped() {
        let mut b = backoff();
        for _ in 0..100 {
            assert!(b.next_delay() <= Duration::from_millis(30000));
        }
    }
}
