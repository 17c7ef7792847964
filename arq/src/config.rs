//! Transport configuration

use crate::error::TransportError;
use arq_protocol::timeout::{DEFAULT_ALPHA, DEFAULT_INITIAL_TIMEOUT, DEFAULT_MAX_TIMEOUT};
use arq_protocol::TimeoutEstimator;
use std::time::Duration;

/// Default window size, in segments
pub const DEFAULT_WINDOW_SIZE: u64 = 2000;

/// Default interval at which blocked threads re-check for shutdown
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Default capacity of the event channel
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Settings shared by [`ArqSender`](crate::ArqSender) and
/// [`ArqReceiver`](crate::ArqReceiver)
#[derive(Debug, Clone, PartialEq)]
pub struct ArqConfig {
    /// Number of sequence numbers in flight (sender) or accepted (receiver)
    pub window_size: u64,
    /// Retransmission timeout before the first sample
    pub initial_timeout: Duration,
    /// Upper bound of the retransmission timeout
    pub max_timeout: Duration,
    /// EWMA smoothing factor
    pub smoothing: f64,
    /// Socket read timeout and shutdown polling interval
    pub poll_interval: Duration,
    /// Events buffered before new ones are dropped
    pub event_capacity: usize,
}

impl Default for ArqConfig {
    fn default() -> Self {
        ArqConfig {
            window_size: DEFAULT_WINDOW_SIZE,
            initial_timeout: DEFAULT_INITIAL_TIMEOUT,
            max_timeout: DEFAULT_MAX_TIMEOUT,
            smoothing: DEFAULT_ALPHA,
            poll_interval: DEFAULT_POLL_INTERVAL,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl ArqConfig {
    /// Set the window size
    pub fn with_window_size(mut self, window_size: u64) -> Self {
        self.window_size = window_size;
        self
    }

    /// Set the initial retransmission timeout
    pub fn with_initial_timeout(mut self, timeout: Duration) -> Self {
        self.initial_timeout = timeout;
        self
    }

    /// Set the retransmission timeout cap
    pub fn with_max_timeout(mut self, timeout: Duration) -> Self {
        self.max_timeout = timeout;
        self
    }

    /// Set the polling interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Check the configuration for values the transport cannot run with
    pub fn validate(&self) -> Result<(), TransportError> {
        if self.window_size == 0 {
            return Err(TransportError::InvalidConfig(
                "window_size must be at least 1".to_string(),
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(TransportError::InvalidConfig(
                "poll_interval must be non-zero".to_string(),
            ));
        }
        if !(self.smoothing > 0.0 && self.smoothing <= 1.0) {
            return Err(TransportError::InvalidConfig(format!(
                "smoothing must be in (0, 1], got {}",
                self.smoothing
            )));
        }
        if self.initial_timeout > self.max_timeout {
            return Err(TransportError::InvalidConfig(format!(
                "initial_timeout {:?} exceeds max_timeout {:?}",
                self.initial_timeout, self.max_timeout
            )));
        }
        Ok(())
    }

    /// Build the timeout estimator these settings describe
    pub fn estimator(&self) -> TimeoutEstimator {
        TimeoutEstimator::new(self.initial_timeout, self.smoothing, self.max_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ArqConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.window_size, 2000);
        assert_eq!(config.estimator().timeout(), Duration::from_millis(500));
    }

    #[test]
    fn test_rejects_zero_window() {
        let config = ArqConfig::default().with_window_size(0);
        assert!(matches!(
            config.validate(),
            Err(TransportError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_rejects_bad_smoothing() {
        for smoothing in [0.0, -0.5, 1.5, f64::NAN] {
            let config = ArqConfig {
                smoothing,
                ..ArqConfig::default()
            };
            assert!(config.validate().is_err(), "accepted {}", smoothing);
        }

        let config = ArqConfig {
            smoothing: 1.0,
            ..ArqConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_initial_above_max() {
        let config = ArqConfig::default()
            .with_initial_timeout(Duration::from_secs(20))
            .with_max_timeout(Duration::from_secs(10));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_poll_interval() {
        let config = ArqConfig::default().with_poll_interval(Duration::ZERO);
        assert!(config.validate().is_err());
    }
}
