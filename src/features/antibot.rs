use crate::core::config::{TimingConfig, MAX_TIMING_SECONDS};
use rand::distr::{Distribution, Uniform};
use std::time::Duration;

/// Jittered waits between portal interactions.
///
/// Every wait is `base + uniform(min_jitter, max_jitter)` seconds so the
/// request pattern never settles into a fixed interval.
#[derive(Debug, Clone, Copy)]
pub struct JitterDelay {
    pub min_jitter: f64,
    pub max_jitter: f64,
}

impl JitterDelay {
    pub fn new(min_jitter: f64, max_jitter: f64) -> Self {
        let (min_jitter, max_jitter) = if min_jitter > max_jitter {
            (max_jitter, min_jitter)
        } else {
            (min_jitter, max_jitter)
        };
        Self {
            min_jitter: min_jitter.max(0.0),
            max_jitter: max_jitter.max(0.0),
        }
    }

    pub fn from_timing(timing: &TimingConfig) -> Self {
        Self::new(timing.min_jitter, timing.max_jitter)
    }

    /// Random jitter in seconds within the configured bounds.
    pub fn sample_jitter(&self) -> f64 {
        let mut rng = rand::rng();
        Uniform::new_inclusive(self.min_jitter, self.max_jitter)
            .map(|dist| dist.sample(&mut rng))
            .unwrap_or(self.min_jitter)
    }

    /// Totals above [`MAX_TIMING_SECONDS`] are clamped to it.
    pub fn duration_for(&self, base_seconds: f64) -> Duration {
        let secs = (base_seconds.max(0.0) + self.sample_jitter()).clamp(0.0, MAX_TIMING_SECONDS);
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::from_secs_f64(MAX_TIMING_SECONDS))
    }

    pub async fn wait(&self, base_seconds: f64) {
        let delay = self.duration_for(base_seconds);
        if !delay.is_zero() {
            tracing::debug!("Waiting {}ms (jittered)", delay.as_millis());
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_stays_within_base_plus_jitter_bounds() {
        let delay = JitterDelay::new(1.0, 3.0);
        for _ in 0..200 {
            let secs = delay.duration_for(5.0).as_secs_f64();
            assert!((6.0..=8.0).contains(&secs), "out of range: {secs}");
        }
    }

    #[test]
    fn zero_jitter_is_exact() {
        let delay = JitterDelay::new(0.0, 0.0);
        assert_eq!(delay.duration_for(2.5), Duration::from_secs_f64(2.5));
        assert!(delay.duration_for(0.0).is_zero());
    }

    #[test]
    fn oversized_base_is_clamped_instead_of_panicking() {
        let delay = JitterDelay::new(0.0, 0.0);
        assert_eq!(
            delay.duration_for(1e20),
            Duration::from_secs_f64(MAX_TIMING_SECONDS)
        );
        assert_eq!(delay.duration_for(f64::NAN), Duration::ZERO);
    }

    #[test]
    fn inverted_bounds_are_swapped() {
        let delay = JitterDelay::new(3.0, 1.0);
        assert_eq!(delay.min_jitter, 1.0);
        assert_eq!(delay.max_jitter, 3.0);
    }

    #[tokio::test]
    async fn wait_sleeps_at_least_the_base() {
        let delay = JitterDelay::new(0.0, 0.01);
        let start = std::time::Instant::now();
        delay.wait(0.05).await;
        assert!(start.elapsed().as_millis() >= 45);
    }
}
