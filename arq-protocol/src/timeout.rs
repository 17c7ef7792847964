//! Adaptive retransmission timeout
//!
//! The timeout is an exponentially weighted moving average of the time
//! between constructing a segment and receiving its acknowledgment:
//!
//! ```text
//! timeout = timeout * (1 - alpha) + alpha * sample
//! ```
//!
//! clamped to an upper bound so a latency spike cannot stall the sender for
//! longer than the cap.

use std::time::Duration;

/// Default smoothing factor
pub const DEFAULT_ALPHA: f64 = 0.125;

/// Default timeout before any sample has been taken
pub const DEFAULT_INITIAL_TIMEOUT: Duration = Duration::from_millis(500);

/// Default upper bound for the timeout
pub const DEFAULT_MAX_TIMEOUT: Duration = Duration::from_secs(10);

/// EWMA retransmission timeout estimator
#[derive(Debug, Clone)]
pub struct TimeoutEstimator {
    /// Current estimate (seconds)
    timeout: f64,
    /// Smoothing factor in (0, 1]
    alpha: f64,
    /// Upper bound (seconds)
    max: f64,
    /// Number of samples
    sample_count: u64,
}

impl TimeoutEstimator {
    /// Create a new estimator
    ///
    /// `alpha` is clamped into (0, 1]; a NaN falls back to [`DEFAULT_ALPHA`].
    pub fn new(initial: Duration, alpha: f64, max: Duration) -> Self {
        let max = max.as_secs_f64();
        let alpha = if alpha.is_nan() {
            DEFAULT_ALPHA
        } else {
            alpha.clamp(f64::MIN_POSITIVE, 1.0)
        };
        TimeoutEstimator {
            timeout: initial.as_secs_f64().min(max),
            alpha,
            max,
            sample_count: 0,
        }
    }

    /// Update with a new round-trip sample
    pub fn update(&mut self, sample: Duration) {
        let sample = sample.as_secs_f64();
        self.timeout =
            (self.timeout * (1.0 - self.alpha) + self.alpha * sample).clamp(0.0, self.max);
        self.sample_count += 1;
    }

    /// Get the current timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout)
    }

    /// Get the upper bound
    pub fn max_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.max)
    }

    /// Number of samples taken
    pub fn sample_count(&self) -> u64 {
        self.sample_count
    }
}

impl Default for TimeoutEstimator {
    fn default() -> Self {
        Self::new(DEFAULT_INITIAL_TIMEOUT, DEFAULT_ALPHA, DEFAULT_MAX_TIMEOUT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_timeout() {
        let estimator = TimeoutEstimator::default();
        assert_eq!(estimator.timeout(), Duration::from_millis(500));
        assert_eq!(estimator.sample_count(), 0);
    }

    #[test]
    fn test_single_update() {
        let mut estimator = TimeoutEstimator::default();
        estimator.update(Duration::from_millis(100));

        // 0.5 * 0.875 + 0.1 * 0.125 = 0.45
        let timeout = estimator.timeout().as_secs_f64();
        assert!((timeout - 0.45).abs() < 1e-9);
    }

    #[test]
    fn test_converges_to_constant_latency() {
        let mut estimator = TimeoutEstimator::default();
        for _ in 0..200 {
            estimator.update(Duration::from_millis(20));
        }
        let timeout = estimator.timeout().as_secs_f64();
        assert!((timeout - 0.020).abs() < 1e-4, "timeout = {}", timeout);
    }

    #[test]
    fn test_clamped_to_max() {
        let mut estimator = TimeoutEstimator::default();
        for _ in 0..100 {
            estimator.update(Duration::from_secs(3600));
        }
        assert_eq!(estimator.timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_initial_above_max() {
        let estimator =
            TimeoutEstimator::new(Duration::from_secs(30), 0.125, Duration::from_secs(2));
        assert_eq!(estimator.timeout(), Duration::from_secs(2));
    }

    #[test]
    fn test_alpha_out_of_range_is_clamped() {
        let initial = Duration::from_millis(500);
        let max = Duration::from_secs(10);

        // clamped to 1: the estimate follows the latest sample
        let mut estimator = TimeoutEstimator::new(initial, 3.0, max);
        for sample in [1u64, 9_000, 1, 0] {
            estimator.update(Duration::from_millis(sample));
        }
        assert_eq!(estimator.timeout(), Duration::ZERO);

        for alpha in [0.0, -2.0, f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let mut estimator = TimeoutEstimator::new(initial, alpha, max);
            for _ in 0..50 {
                estimator.update(Duration::from_millis(20));
                let timeout = estimator.timeout();
                assert!(timeout <= max, "alpha {}: {:?}", alpha, timeout);
            }
        }
    }
}
