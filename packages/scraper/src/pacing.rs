//! Randomized request pacing.
//!
//! Callers await [`Pacer::wait`] before every request, retries included, and
//! [`Pacer::cool_down`] between top-level runs. Delays are drawn uniformly
//! from the configured bounds, with a small chance of an extra long pause
//! so the timing does not look machine-regular.

use std::time::Duration;

use accident_harvest_models::config::{CoolDownConfig, DelayConfig};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng as _};

/// Delay policy plus the random source it draws from.
#[derive(Debug)]
pub struct Pacer {
    delay: DelayConfig,
    cool_down: CoolDownConfig,
    rng: StdRng,
}

impl Pacer {
    #[must_use]
    pub fn new(delay: DelayConfig, cool_down: CoolDownConfig) -> Self {
        Self {
            delay,
            cool_down,
            rng: StdRng::from_entropy(),
        }
    }

    /// Creates a pacer with a deterministic random source.
    #[must_use]
    pub fn with_seed(delay: DelayConfig, cool_down: CoolDownConfig, seed: u64) -> Self {
        Self {
            delay,
            cool_down,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// A pacer that never sleeps.
    #[must_use]
    pub fn disabled() -> Self {
        Self::with_seed(
            DelayConfig::none(),
            CoolDownConfig {
                min_ms: 0,
                max_ms: 0,
            },
            0,
        )
    }

    /// Draws the next per-request delay.
    pub fn next_delay(&mut self) -> Duration {
        let mut ms = uniform_ms(&mut self.rng, self.delay.min_ms, self.delay.max_ms);

        let probability = self.delay.long_pause_probability.clamp(0.0, 1.0);
        if probability > 0.0 && self.rng.gen_bool(probability) {
            ms += uniform_ms(
                &mut self.rng,
                self.delay.long_pause_min_ms,
                self.delay.long_pause_max_ms,
            );
        }

        Duration::from_millis(ms)
    }

    /// Draws the next cool-down between runs.
    pub fn next_cool_down(&mut self) -> Duration {
        Duration::from_millis(uniform_ms(
            &mut self.rng,
            self.cool_down.min_ms,
            self.cool_down.max_ms,
        ))
    }

    /// Sleeps for the next per-request delay.
    pub async fn wait(&mut self) {
        let delay = self.next_delay();
        if !delay.is_zero() {
            log::debug!("Waiting {:.2}s before next request", delay.as_secs_f64());
            tokio::time::sleep(delay).await;
        }
    }

    /// Sleeps for the next cool-down.
    pub async fn cool_down(&mut self) {
        let delay = self.next_cool_down();
        if !delay.is_zero() {
            log::info!("Cooling down for {:.2}s before next run", delay.as_secs_f64());
            tokio::time::sleep(delay).await;
        }
    }
}

fn uniform_ms(rng: &mut impl Rng, min: u64, max: u64) -> u64 {
    if max <= min {
        min
    } else {
        rng.gen_range(min..=max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_stay_within_bounds() {
        let delay = DelayConfig {
            min_ms: 200,
            max_ms: 500,
            long_pause_probability: 0.0,
            long_pause_min_ms: 0,
            long_pause_max_ms: 0,
        };
        let mut pacer = Pacer::with_seed(delay, CoolDownConfig::default(), 3);

        for _ in 0..500 {
            let d = pacer.next_delay();
            assert!(d >= Duration::from_millis(200) && d <= Duration::from_millis(500));
        }
    }

    #[test]
    fn long_pause_is_added_on_top_of_base_delay() {
        let delay = DelayConfig {
            min_ms: 100,
            max_ms: 100,
            long_pause_probability: 1.0,
            long_pause_min_ms: 1_000,
            long_pause_max_ms: 1_000,
        };
        let mut pacer = Pacer::with_seed(delay, CoolDownConfig::default(), 3);

        assert_eq!(pacer.next_delay(), Duration::from_millis(1_100));
    }

    #[test]
    fn occasional_long_pauses_happen() {
        let mut pacer = Pacer::with_seed(DelayConfig::default(), CoolDownConfig::default(), 11);
        let long = (0..1_000)
            .map(|_| pacer.next_delay())
            .filter(|d| *d > Duration::from_millis(500))
            .count();
        assert!(long > 0 && long < 500);
    }

    #[test]
    fn cool_down_within_bounds() {
        let mut pacer = Pacer::with_seed(DelayConfig::none(), CoolDownConfig::default(), 5);
        let d = pacer.next_cool_down();
        assert!(d >= Duration::from_secs(10) && d <= Duration::from_secs(20));
    }

    #[test]
    fn inverted_bounds_use_the_minimum() {
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(uniform_ms(&mut rng, 300, 100), 300);
    }

    #[tokio::test]
    async fn disabled_pacer_does_not_sleep() {
        let mut pacer = Pacer::disabled();
        assert_eq!(pacer.next_delay(), Duration::ZERO);
        pacer.wait().await;
        pacer.cool_down().await;
    }
}
