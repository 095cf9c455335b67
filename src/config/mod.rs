//! Application configuration.
//!
//! Built once at startup from YAML files and environment variables, then
//! passed by reference to each component.

mod broker;

pub use broker::{
    BrokerConfig, DEFAULT_BROKER_ADDRESS, DEFAULT_PASSWORD, DEFAULT_USERNAME, DEFAULT_VHOST,
};

use std::time::Duration;

use serde::Deserialize;

use crate::utils::retry::RetryPolicy;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "topicbus";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "TOPICBUS_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "TOPICBUS";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "TOPICBUS_LOG";
/// Environment variable overriding the broker `host:port`.
pub const BROKER_ADDRESS_ENV_VAR: &str = "RABBITMQ_URL";

/// Upper bound (exclusive) of the publisher's random pause, in milliseconds.
pub const DEFAULT_MAX_DELAY_MS: u64 = 1000;

/// Errors loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),
}

/// Publisher pacing.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PublisherConfig {
    /// Pause between messages is uniform in `[0, max_delay_ms)`. Zero
    /// disables pausing.
    pub max_delay_ms: u64,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
        }
    }
}

impl PublisherConfig {
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Broker connection.
    pub broker: BrokerConfig,
    /// Publisher pacing.
    pub publisher: PublisherConfig,
    /// Retry policy for opening the broker session.
    pub retry: RetryPolicy,
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `topicbus.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix and `__` separator
    /// 5. `BROKER_ADDRESS_ENV_VAR`, when set and non-empty
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let broker_address = std::env::var(BROKER_ADDRESS_ENV_VAR)
            .ok()
            .filter(|address| !address.is_empty());

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("broker.address", broker_address)?
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Create config for testing.
    pub fn for_test() -> Self {
        Self {
            publisher: PublisherConfig { max_delay_ms: 0 },
            ..Self::default()
        }
    }
}
