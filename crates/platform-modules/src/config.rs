//! Service configuration for the module lifecycle manager.
//!
//! Configuration is loaded from environment variables with defaults
//! suitable for local development.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::retry::RetryConfig;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Invalid configuration value.
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue {
        /// Configuration key.
        key: String,
        /// Error message.
        message: String,
    },
}

/// Module lifecycle configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleServiceConfig {
    /// Deadline for a single lifecycle operation, in milliseconds.
    pub operation_timeout_ms: u64,

    /// Attempts the API layer makes for retryable failures.
    pub max_retries: u32,

    /// Delay before the first retry, in milliseconds.
    pub retry_initial_delay_ms: u64,

    /// Re-check required dependencies and conflicts when re-enabling.
    pub revalidate_on_enable: bool,

    /// Publish lifecycle events after commit.
    pub publish_events: bool,
}

impl Default for ModuleServiceConfig {
    fn default() -> Self {
        Self {
            operation_timeout_ms: 5_000,
            max_retries: 3,
            retry_initial_delay_ms: 50,
            revalidate_on_enable: true,
            publish_events: true,
        }
    }
}

impl ModuleServiceConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `MODULES_OPERATION_TIMEOUT_MS`: Operation deadline (default: 5000)
    /// - `MODULES_MAX_RETRIES`: Attempts for retryable failures (default: 3)
    /// - `MODULES_RETRY_INITIAL_DELAY_MS`: First retry delay (default: 50)
    /// - `MODULES_REVALIDATE_ON_ENABLE`: Re-check dependencies on enable (default: true)
    /// - `MODULES_PUBLISH_EVENTS`: Publish lifecycle events (default: true)
    ///
    /// Unset variables take their default. A set but unparsable value, or a
    /// result that fails [`validate`](Self::validate), is an error.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env), reading values through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let default = Self::default();

        let config = Self {
            operation_timeout_ms: parse_var(&lookup, "MODULES_OPERATION_TIMEOUT_MS")?
                .unwrap_or(default.operation_timeout_ms),
            max_retries: parse_var(&lookup, "MODULES_MAX_RETRIES")?.unwrap_or(default.max_retries),
            retry_initial_delay_ms: parse_var(&lookup, "MODULES_RETRY_INITIAL_DELAY_MS")?
                .unwrap_or(default.retry_initial_delay_ms),
            revalidate_on_enable: flag_var(&lookup, "MODULES_REVALIDATE_ON_ENABLE")?
                .unwrap_or(default.revalidate_on_enable),
            publish_events: flag_var(&lookup, "MODULES_PUBLISH_EVENTS")?
                .unwrap_or(default.publish_events),
        };
        config.validate()?;
        Ok(config)
    }

    /// Operation deadline as a Duration.
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }

    /// Retry policy for retryable lifecycle failures.
    pub fn retry(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_retries,
            initial_delay: Duration::from_millis(self.retry_initial_delay_ms),
            ..RetryConfig::default()
        }
    }

    /// Reject values that would make every operation fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.operation_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "MODULES_OPERATION_TIMEOUT_MS".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        if self.max_retries == 0 {
            return Err(ConfigError::InvalidValue {
                key: "MODULES_MAX_RETRIES".to_string(),
                message: "at least one attempt is required".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, ConfigError> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("expected a non-negative integer, got {raw:?}"),
            }),
    }
}

fn flag_var(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<bool>, ConfigError> {
    match lookup(key).as_deref().map(str::trim) {
        None => Ok(None),
        Some("true" | "1") => Ok(Some(true)),
        Some("false" | "0") => Ok(Some(false)),
        Some(other) => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected true or false, got {other:?}"),
        }),
    }
}
