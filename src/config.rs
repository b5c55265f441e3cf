//! Dispatcher configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Queue used for queued commands when neither the builder nor the config
/// names one.
pub(crate) const DEFAULT_COMMAND_QUEUE: &str = "commands";

/// Errors raised while loading or validating a [`DispatchConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid dispatch config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("default_attempts must be at least 1, got {0}")]
    InvalidAttempts(u32),
    #[error("command_queue must not be empty")]
    EmptyQueueName,
}

/// Tunables shared by the dispatcher and its unit of work.
///
/// Every field has a default, so `{}` is a valid config:
///
/// ```
/// use sourced_dispatch::DispatchConfig;
///
/// let config = DispatchConfig::from_json(r#"{ "default_attempts": 3 }"#).unwrap();
/// assert_eq!(config.default_attempts, 3);
/// assert_eq!(config.command_queue, None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Attempts for units of work run without an explicit count.
    pub default_attempts: u32,
    /// Pause between retry attempts, in milliseconds.
    pub retry_delay_ms: u64,
    /// Queue name queued commands are sent to. When unset, the name given to
    /// the builder (or `"commands"`) is kept.
    pub command_queue: Option<String>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            default_attempts: 1,
            retry_delay_ms: 0,
            command_queue: None,
        }
    }
}

impl DispatchConfig {
    /// Parse and validate a JSON config.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: DispatchConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_attempts == 0 {
            return Err(ConfigError::InvalidAttempts(self.default_attempts));
        }
        if let Some(queue) = &self.command_queue {
            if queue.trim().is_empty() {
                return Err(ConfigError::EmptyQueueName);
            }
        }
        Ok(())
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}
