//! Capped exponential delays with proportional jitter.

use std::time::Duration;

use rand::Rng;

/// `base × factor^(attempt-1)`, capped at `max`, then spread by `±jitter`.
#[derive(Clone, Debug, PartialEq)]
pub struct ExponentialBackoff {
    base: Duration,
    max: Duration,
    factor: f64,
    jitter: f64,
}

impl ExponentialBackoff {
    pub fn new(base: Duration, max: Duration, factor: f64) -> Self {
        Self {
            base,
            max,
            factor: factor.max(1.0),
            jitter: 0.2,
        }
    }

    /// Fraction of the delay used as the jitter half-width, clamped to `0..=1`.
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    /// Delay after the given (1-based) failed attempt, before jitter.
    pub fn base_delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let scaled = self.base.as_secs_f64() * self.factor.powi(exponent);
        if !scaled.is_finite() || scaled >= self.max.as_secs_f64() {
            return self.max;
        }
        Duration::from_secs_f64(scaled).min(self.max)
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.base_delay_for(attempt);
        if self.jitter == 0.0 {
            return base;
        }
        let spread = rand::rng().random_range(-self.jitter..=self.jitter);
        let secs = (base.as_secs_f64() * (1.0 + spread)).clamp(0.0, self.max.as_secs_f64());
        Duration::from_secs_f64(secs)
    }

    /// Delay before retrying a throttled call: never below `floor` or the
    /// server's hint, never above the configured maximum.
    pub fn rate_limit_delay(
        &self,
        attempt: u32,
        floor: Duration,
        retry_after: Option<Duration>,
    ) -> Duration {
        self.delay_for(attempt)
            .max(floor)
            .max(retry_after.unwrap_or_default())
            .min(self.max)
    }
}

/// 1s doubling up to 10s.
impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(10), 2.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doubling_sequence_without_jitter() {
        let backoff = ExponentialBackoff::default().with_jitter(0.0);
        let delays: Vec<u128> = (1..=5).map(|a| backoff.delay_for(a).as_millis()).collect();
        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 10000]);
    }

    #[test]
    fn test_large_attempts_saturate_at_max() {
        let backoff =
            ExponentialBackoff::new(Duration::from_millis(100), Duration::from_millis(500), 2.0)
                .with_jitter(0.0);

        assert_eq!(backoff.delay_for(10), Duration::from_millis(500));
        assert_eq!(backoff.delay_for(u32::MAX), Duration::from_millis(500));
    }

    #[test]
    fn test_delays_monotonic_and_bounded() {
        let backoff = ExponentialBackoff::default();
        let mut previous = Duration::ZERO;
        for attempt in 1..=12 {
            let base = backoff.base_delay_for(attempt);
            assert!(base >= previous);
            assert!(base <= backoff.max());
            previous = base;
        }
    }

    #[test]
    fn test_jitter_stays_within_twenty_percent() {
        let backoff = ExponentialBackoff::default();
        for _ in 0..200 {
            let delay = backoff.delay_for(2).as_millis();
            assert!((1600..=2400).contains(&delay), "delay {delay} out of range");
        }
        for _ in 0..200 {
            assert!(backoff.delay_for(8) <= backoff.max());
        }
    }

    #[test]
    fn test_rate_limit_floor() {
        let backoff = ExponentialBackoff::default();
        let floor = Duration::from_secs(8);

        let delay = backoff.rate_limit_delay(1, floor, None);
        assert!(delay >= floor && delay <= backoff.max());

        let delay = backoff.rate_limit_delay(1, floor, Some(Duration::from_secs(60)));
        assert_eq!(delay, backoff.max());

        let short =
            ExponentialBackoff::new(Duration::from_millis(1), Duration::from_millis(20), 2.0);
        assert_eq!(short.rate_limit_delay(1, floor, None), Duration::from_millis(20));
    }
}
