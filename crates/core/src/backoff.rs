//! Delay sequence for retrying a failing store operation.
//!
//! The dispatcher keeps one [`Backoff`] for its claim loop and one per
//! outcome write. Each failure lengthens the wait; a success resets it.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct BackoffConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Growth factor per consecutive failure. Values below 1 (or not finite)
    /// are treated as 1.
    pub multiplier: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl BackoffConfig {
    /// Same growth, but never waiting longer than `ceiling`.
    pub fn capped_at(&self, ceiling: Duration) -> Self {
        Self {
            initial_delay: self.initial_delay.min(ceiling),
            max_delay: self.max_delay.min(ceiling),
            multiplier: self.multiplier,
        }
    }

    fn factor(&self) -> f64 {
        if self.multiplier.is_finite() && self.multiplier >= 1.0 {
            self.multiplier
        } else {
            1.0
        }
    }
}

/// State of one run of consecutive failures.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    current: Option<Duration>,
    failures: u32,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            current: None,
            failures: 0,
        }
    }

    /// Record a failure and return how long to wait before retrying.
    pub fn fail(&mut self) -> Duration {
        let ceiling = self.config.max_delay;
        let delay = match self.current {
            None => self.config.initial_delay,
            Some(previous) => previous.mul_f64(self.config.factor()),
        }
        .min(ceiling);

        self.current = Some(delay);
        self.failures = self.failures.saturating_add(1);
        delay
    }

    /// Forget past failures after a success.
    pub fn reset(&mut self) {
        self.current = None;
        self.failures = 0;
    }

    /// Consecutive failures since the last reset.
    pub fn failures(&self) -> u32 {
        self.failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(initial_ms: u64, max_ms: u64) -> BackoffConfig {
        BackoffConfig {
            initial_delay: Duration::from_millis(initial_ms),
            max_delay: Duration::from_millis(max_ms),
            multiplier: 2.0,
        }
    }

    #[test]
    fn delays_grow_until_the_ceiling() {
        let mut backoff = Backoff::new(config(100, 500));
        let delays: Vec<u64> = (0..5).map(|_| backoff.fail().as_millis() as u64).collect();
        assert_eq!(delays, vec![100, 200, 400, 500, 500]);
        assert_eq!(backoff.failures(), 5);
    }

    #[test]
    fn reset_starts_over() {
        let mut backoff = Backoff::new(config(100, 10_000));
        backoff.fail();
        backoff.fail();
        backoff.reset();
        assert_eq!(backoff.failures(), 0);
        assert_eq!(backoff.fail(), Duration::from_millis(100));
    }

    #[test]
    fn shrinking_multiplier_holds_delay_steady() {
        let mut backoff = Backoff::new(BackoffConfig {
            multiplier: 0.5,
            ..config(300, 1_000)
        });
        assert_eq!(backoff.fail(), Duration::from_millis(300));
        assert_eq!(backoff.fail(), Duration::from_millis(300));

        let mut backoff = Backoff::new(BackoffConfig {
            multiplier: f64::NAN,
            ..config(300, 1_000)
        });
        backoff.fail();
        assert_eq!(backoff.fail(), Duration::from_millis(300));
    }

    #[test]
    fn initial_delay_above_ceiling_is_clamped() {
        let mut backoff = Backoff::new(config(5_000, 1_000));
        assert_eq!(backoff.fail(), Duration::from_secs(1));
    }

    #[test]
    fn capped_config_never_exceeds_ceiling() {
        let capped = config(2_000, 30_000).capped_at(Duration::from_millis(300));
        assert_eq!(capped.initial_delay, Duration::from_millis(300));
        assert_eq!(capped.max_delay, Duration::from_millis(300));
    }
}
