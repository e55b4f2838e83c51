//! Application configuration.
//!
//! Loaded from a YAML file; every field has a serde default so a partial
//! (or empty) file is valid. `validate` rejects settings that would stall
//! the engine, like a zero sweep interval.

mod reconciliation;
mod retention;

pub use reconciliation::ReconciliationConfig;
pub use retention::RetentionConfig;

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// Path that was attempted.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The file is not valid YAML for this schema.
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml_bw::Error),

    /// A field value is out of range.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Observability settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Default log filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Whether to start the Prometheus exporter.
    #[serde(default)]
    pub metrics_enabled: bool,

    /// Listen address for the metrics HTTP endpoint.
    #[serde(default = "default_metrics_listen_addr")]
    pub metrics_listen_addr: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            metrics_enabled: false,
            metrics_listen_addr: default_metrics_listen_addr(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_listen_addr() -> String {
    "0.0.0.0:9090".to_string()
}

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Reconciliation sweep settings.
    #[serde(default)]
    pub reconciliation: ReconciliationConfig,

    /// Terminal-record retention.
    #[serde(default)]
    pub retention: RetentionConfig,

    /// Logging and metrics.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Load and validate configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read, parsed, or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        let config: Self = serde_yaml_bw::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check field values for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.reconciliation.enabled && self.reconciliation.interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "reconciliation.interval_secs must be positive".to_string(),
            ));
        }
        if self.reconciliation.call_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "reconciliation.call_timeout_secs must be positive".to_string(),
            ));
        }
        if self.observability.metrics_enabled
            && self
                .observability
                .metrics_listen_addr
                .parse::<std::net::SocketAddr>()
                .is_err()
        {
            return Err(ConfigError::Invalid(format!(
                "observability.metrics_listen_addr is not a socket address: {}",
                self.observability.metrics_listen_addr
            )));
        }
        Ok(())
    }
}
