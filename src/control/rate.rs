use std::time::{Duration, Instant};

/// Minimum spacing between two occurrences of a step.
///
/// `mark` records when the step ran; `remaining` tells the loop how long to
/// wait before it may run again.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    last: Option<Instant>,
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    /// Time left before the next attempt, zero for the first one.
    pub fn remaining(&self, now: Instant) -> Duration {
        match self.last {
            Some(last) => self.interval.saturating_sub(now.saturating_duration_since(last)),
            None => Duration::ZERO,
        }
    }

    pub fn mark(&mut self, now: Instant) {
        self.last = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_attempt_is_immediate() {
        let limiter = RateLimiter::new(Duration::from_millis(100));
        assert_eq!(limiter.remaining(Instant::now()), Duration::ZERO);
    }

    #[test]
    fn remaining_counts_down_from_mark() {
        let mut limiter = RateLimiter::new(Duration::from_millis(100));
        let t0 = Instant::now();
        limiter.mark(t0);
        assert_eq!(limiter.remaining(t0), Duration::from_millis(100));
        assert_eq!(
            limiter.remaining(t0 + Duration::from_millis(40)),
            Duration::from_millis(60)
        );
        assert_eq!(limiter.remaining(t0 + Duration::from_millis(250)), Duration::ZERO);
    }

    #[test]
    fn zero_interval_never_waits() {
        let mut limiter = RateLimiter::new(Duration::ZERO);
        let t0 = Instant::now();
        limiter.mark(t0);
        assert_eq!(limiter.remaining(t0), Duration::ZERO);
    }
}
