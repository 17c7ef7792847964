//! Configuration file support for the ARQ command-line tools

use arq::ArqConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Sender configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SenderConfig {
    /// Receiver address
    pub peer: SocketAddr,
    /// Local bind address
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,
    /// Files to send, one resource each
    #[serde(default)]
    pub inputs: Vec<PathBuf>,
    /// Window size in segments
    #[serde(default = "default_window_size")]
    pub window_size: u64,
    /// Retransmission timeout before the first sample, in milliseconds
    #[serde(default = "default_initial_timeout_ms")]
    pub initial_timeout_ms: u64,
    /// Retransmission timeout cap, in milliseconds
    #[serde(default = "default_max_timeout_ms")]
    pub max_timeout_ms: u64,
    /// How long to wait for outstanding acknowledgments before giving up
    #[serde(default = "default_drain_timeout_secs")]
    pub drain_timeout_secs: u64,
    /// Statistics interval in seconds
    #[serde(default = "default_stats_interval")]
    pub stats_interval_secs: u64,
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 0))
}

fn default_window_size() -> u64 {
    arq::config::DEFAULT_WINDOW_SIZE
}

fn default_initial_timeout_ms() -> u64 {
    500
}

fn default_max_timeout_ms() -> u64 {
    10_000
}

fn default_drain_timeout_secs() -> u64 {
    60
}

fn default_stats_interval() -> u64 {
    1
}

/// Receiver configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiverConfig {
    /// Listen address
    pub listen: SocketAddr,
    /// Directory reassembled resources are written to
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Stop after this many resources
    #[serde(default)]
    pub expect: Option<usize>,
    /// Window size in segments
    #[serde(default = "default_window_size")]
    pub window_size: u64,
    /// Statistics interval in seconds
    #[serde(default = "default_stats_interval")]
    pub stats_interval_secs: u64,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

/// Combined configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Sender configuration
    pub sender: Option<SenderConfig>,
    /// Receiver configuration
    pub receiver: Option<ReceiverConfig>,
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Create example sender configuration
    pub fn example_sender() -> Self {
        Config {
            sender: Some(SenderConfig {
                peer: SocketAddr::from(([127, 0, 0, 1], 9000)),
                bind: default_bind(),
                inputs: vec![PathBuf::from("small_01.txt"), PathBuf::from("large_01.bin")],
                window_size: default_window_size(),
                initial_timeout_ms: default_initial_timeout_ms(),
                max_timeout_ms: default_max_timeout_ms(),
                drain_timeout_secs: default_drain_timeout_secs(),
                stats_interval_secs: default_stats_interval(),
            }),
            receiver: None,
        }
    }

    /// Create example receiver configuration
    pub fn example_receiver() -> Self {
        Config {
            sender: None,
            receiver: Some(ReceiverConfig {
                listen: SocketAddr::from(([0, 0, 0, 0], 9000)),
                output_dir: PathBuf::from("received"),
                expect: Some(2),
                window_size: default_window_size(),
                stats_interval_secs: default_stats_interval(),
            }),
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl SenderConfig {
    /// Create a sender configuration with defaults for everything but the peer
    pub fn new(peer: SocketAddr) -> Self {
        SenderConfig {
            peer,
            bind: default_bind(),
            inputs: Vec::new(),
            window_size: default_window_size(),
            initial_timeout_ms: default_initial_timeout_ms(),
            max_timeout_ms: default_max_timeout_ms(),
            drain_timeout_secs: default_drain_timeout_secs(),
            stats_interval_secs: default_stats_interval(),
        }
    }

    /// Transport settings described by this configuration
    pub fn arq_config(&self) -> Result<ArqConfig, ConfigError> {
        let config = ArqConfig::default()
            .with_window_size(self.window_size)
            .with_initial_timeout(Duration::from_millis(self.initial_timeout_ms))
            .with_max_timeout(Duration::from_millis(self.max_timeout_ms));
        config
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        Ok(config)
    }

    /// Get drain timeout as Duration
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }

    /// Get statistics interval as Duration
    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_secs)
    }
}

impl ReceiverConfig {
    /// Create a receiver configuration with defaults for everything but the address
    pub fn new(listen: SocketAddr) -> Self {
        ReceiverConfig {
            listen,
            output_dir: default_output_dir(),
            expect: None,
            window_size: default_window_size(),
            stats_interval_secs: default_stats_interval(),
        }
    }

    /// Transport settings described by this configuration
    pub fn arq_config(&self) -> Result<ArqConfig, ConfigError> {
        let config = ArqConfig::default().with_window_size(self.window_size);
        config
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        Ok(config)
    }

    /// Get statistics interval as Duration
    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_example_configs() {
        let sender_config = Config::example_sender();
        assert!(sender_config.sender.is_some());

        let receiver_config = Config::example_receiver();
        assert!(receiver_config.receiver.is_some());
    }

    #[test]
    fn test_serialize_deserialize() {
        let config = Config::example_sender();
        let toml = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml).unwrap();

        assert_eq!(parsed, config);
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let parsed: Config = toml::from_str(
            r#"
            [receiver]
            listen = "127.0.0.1:7000"
            "#,
        )
        .unwrap();

        let receiver = parsed.receiver.unwrap();
        assert_eq!(receiver.window_size, 2000);
        assert_eq!(receiver.output_dir, PathBuf::from("."));
        assert_eq!(receiver.expect, None);
        assert!(parsed.sender.is_none());
    }

    #[test]
    fn test_sender_arq_config() {
        let mut sender = SenderConfig::new("127.0.0.1:7000".parse().unwrap());
        sender.initial_timeout_ms = 200;

        let config = sender.arq_config().unwrap();
        assert_eq!(config.initial_timeout, Duration::from_millis(200));
        assert_eq!(config.max_timeout, Duration::from_secs(10));

        sender.window_size = 0;
        assert!(matches!(sender.arq_config(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_file_round_trip() {
        let path = std::env::temp_dir().join(format!("arq-cli-config-{}.toml", std::process::id()));
        let config = Config::example_receiver();
        config.to_file(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        let _ = fs::remove_file(&path);
        assert_eq!(loaded, config);
    }
}
