//! Configuration for the postline command.

use std::{path::Path, time::Duration};

use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use postline_delivery::{ClientConfig, DeliveryConfig, RetryPolicy};
use serde::{Deserialize, Serialize};

/// Default configuration file, read from the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "postline.toml";

/// Command configuration with defaults, file, and environment overrides.
///
/// Configuration is loaded in priority order:
/// 1. Environment variables prefixed with `POSTLINE_` (and `RUST_LOG`)
/// 2. Configuration file (`postline.toml` unless overridden)
/// 3. Built-in defaults
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Destination URL.
    ///
    /// Environment variable: `POSTLINE_URL`
    #[serde(default = "default_url")]
    pub url: String,

    /// Maximum concurrent retry workers.
    ///
    /// Environment variable: `POSTLINE_MAX_WORKERS`
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Maximum records waiting for retry.
    ///
    /// Environment variable: `POSTLINE_QUEUE_CAPACITY`
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Attempts per send, first attempt included.
    ///
    /// Environment variable: `POSTLINE_MAX_ATTEMPTS`
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    ///
    /// Environment variable: `POSTLINE_BASE_DELAY_MS`
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// HTTP request timeout in seconds.
    ///
    /// Environment variable: `POSTLINE_TIMEOUT_SECONDS`
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Log filter directives.
    ///
    /// Environment variable: `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub rust_log: String,
}

impl Config {
    /// Loads configuration from defaults, `path`, and the environment.
    ///
    /// A missing file is not an error; its values fall back to defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let config: Self = Self::figment(path.as_ref())
            .extract()
            .context("failed to load configuration")?;
        config.validate()?;
        Ok(config)
    }

    fn figment(path: &Path) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("POSTLINE_"))
            .merge(Env::raw().only(&["RUST_LOG"]))
    }

    /// Converts to the delivery crate's configuration.
    pub fn to_delivery_config(&self) -> DeliveryConfig {
        DeliveryConfig {
            max_workers: self.max_workers,
            queue_capacity: self.queue_capacity,
            retry_policy: RetryPolicy {
                max_attempts: self.max_attempts,
                base_delay: Duration::from_millis(self.base_delay_ms),
            },
            client_config: ClientConfig {
                timeout: Duration::from_secs(self.timeout_seconds),
                ..ClientConfig::default()
            },
        }
    }

    fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            anyhow::bail!("url must not be empty");
        }

        if self.max_workers == 0 {
            anyhow::bail!("max_workers must be greater than 0");
        }

        if self.queue_capacity == 0 {
            anyhow::bail!("queue_capacity must be greater than 0");
        }

        if self.max_attempts == 0 {
            anyhow::bail!("max_attempts must be greater than 0");
        }

        if self.timeout_seconds == 0 {
            anyhow::bail!("timeout_seconds must be greater than 0");
        }

        self.to_delivery_config().validate().context("invalid delivery bounds")?;

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            url: default_url(),
            max_workers: default_max_workers(),
            queue_capacity: default_queue_capacity(),
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            timeout_seconds: default_timeout_seconds(),
            rust_log: default_log_level(),
        }
    }
}

fn default_url() -> String {
    "http://localhost:8080/".to_string()
}

fn default_max_workers() -> usize {
    postline_delivery::DEFAULT_MAX_WORKERS
}

fn default_queue_capacity() -> usize {
    postline_delivery::DEFAULT_QUEUE_CAPACITY
}

fn default_max_attempts() -> u32 {
    postline_delivery::DEFAULT_MAX_ATTEMPTS
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_timeout_seconds() -> u64 {
    postline_delivery::DEFAULT_TIMEOUT_SECONDS
}

fn default_log_level() -> String {
    "info,postline=debug".to_string()
}
