//! Configuration System using Figment
//!
//! Strongly-typed configuration for the queue scheduler. Configuration is
//! loaded from (in order of precedence, highest first):
//! 1. Environment variables prefixed with `AISH_`
//! 2. A TOML configuration file (default: `config/aish.toml`)
//! 3. Built-in defaults
//!
//! # Environment Variable Overrides
//!
//! Nested keys are separated by a double underscore:
//!
//! ```text
//! AISH_GATEWAY__BASE_URL=http://10.0.0.12:8000
//! AISH_SCHEDULER__POLL_INTERVAL_MS=5000
//! AISH_APPLICATION__LOG_LEVEL=debug
//! ```
//!
//! # Example
//!
//! ```no_run
//! use aish_queue::config::AishConfig;
//!
//! let config = AishConfig::load_from("config/aish.toml")?;
//! println!("Polling {} every {:?}", config.gateway.base_url, config.scheduler.poll_interval());
//! # Ok::<(), aish_queue::error::ConfigError>(())
//! ```

use crate::error::ConfigError;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "config/aish.toml";

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "AISH_";

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AishConfig {
    /// Application settings
    pub application: ApplicationConfig,
    /// Remote instrument service
    pub gateway: GatewayConfig,
    /// Poll loop and actor settings
    pub scheduler: SchedulerConfig,
    /// Sample tray
    pub samples: SampleConfig,
    /// Simulated instrument used by `--mock`
    pub mock: MockConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
}

/// Remote instrument service configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Base URL of the AISH service
    pub base_url: String,
    /// Per-request timeout in milliseconds
    pub request_timeout_ms: u64,
}

/// Scheduler configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Interval between status polls in milliseconds
    pub poll_interval_ms: u64,
    /// Upper bound on a single status query in milliseconds
    pub poll_timeout_ms: u64,
    /// Capacity of the scheduler command channel
    pub mailbox_capacity: usize,
}

/// Sample tray configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SampleConfig {
    /// Number of sample slots, numbered from 0
    pub slots: u32,
}

/// Simulated instrument configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MockConfig {
    /// How long a simulated experiment stays active, in milliseconds
    pub experiment_duration_ms: u64,
}

// ============================================================================
// Default values
// ============================================================================

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            request_timeout_ms: 5000,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2000,
            poll_timeout_ms: 10_000,
            mailbox_capacity: 64,
        }
    }
}

impl Default for SampleConfig {
    fn default() -> Self {
        Self { slots: 10 }
    }
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            experiment_duration_ms: 10_000,
        }
    }
}

impl GatewayConfig {
    /// Per-request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl SchedulerConfig {
    /// Interval between status polls.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Upper bound on a single status query.
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}

impl MockConfig {
    /// Simulated experiment duration.
    pub fn experiment_duration(&self) -> Duration {
        Duration::from_millis(self.experiment_duration_ms)
    }
}

// ============================================================================
// Configuration Loading and Validation
// ============================================================================

impl AishConfig {
    /// Load configuration from the default location and environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path.
    ///
    /// A missing file is not an error; defaults and environment overrides
    /// still apply. After loading, configuration is validated.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: Self = Self::figment(path.as_ref()).extract()?;
        config.validate()?;
        Ok(config)
    }

    fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(AishConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading
    ///
    /// Checks:
    /// - Log level is valid (trace, debug, info, warn, error)
    /// - Gateway base URL is an http(s) URL
    /// - Intervals, timeouts, mailbox capacity and slot count are non-zero
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        let base_url = reqwest::Url::parse(&self.gateway.base_url).map_err(|e| {
            ConfigError::ValidationError(format!(
                "Invalid gateway base_url '{}': {}",
                self.gateway.base_url, e
            ))
        })?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(ConfigError::ValidationError(format!(
                "Gateway base_url '{}' must use http or https",
                self.gateway.base_url
            )));
        }

        let non_zero = [
            ("gateway.request_timeout_ms", self.gateway.request_timeout_ms),
            ("scheduler.poll_interval_ms", self.scheduler.poll_interval_ms),
            ("scheduler.poll_timeout_ms", self.scheduler.poll_timeout_ms),
            ("scheduler.mailbox_capacity", self.scheduler.mailbox_capacity as u64),
            ("samples.slots", u64::from(self.samples.slots)),
        ];
        for (key, value) in non_zero {
            if value == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "{} must be > 0",
                    key
                )));
            }
        }

        Ok(())
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self)
            .map_err(|e| ConfigError::ValidationError(format!("Cannot render config: {}", e)))
    }
}
