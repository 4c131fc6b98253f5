//! Engine configuration.
//!
//! Consolidates the environment variable reads for engine-wide timing and
//! capacity settings.

use std::time::Duration;

use crate::game::constants::{
    DEFAULT_COUNTDOWN_SECS, DEFAULT_EVENT_LOG_CAPACITY, DEFAULT_LEVEL_DURATION_SECS,
    DEFAULT_NEXT_HAND_DELAY_MS, DEFAULT_TABLE_INBOX_CAPACITY,
};

/// Engine-wide settings loaded from environment variables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Default sit-n-go countdown (`COUNTDOWN_SECS`)
    pub countdown_secs: u64,
    /// Default blind level length (`LEVEL_DURATION_SECS`)
    pub level_duration_secs: u64,
    /// Events kept per table for polling (`EVENT_LOG_CAPACITY`)
    pub event_log_capacity: usize,
    /// Pause before auto-dealing the next hand (`NEXT_HAND_DELAY_MS`)
    pub next_hand_delay_ms: u64,
    /// Bounded mailbox size per table actor (`TABLE_INBOX_CAPACITY`)
    pub table_inbox_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            countdown_secs: DEFAULT_COUNTDOWN_SECS,
            level_duration_secs: DEFAULT_LEVEL_DURATION_SECS,
            event_log_capacity: DEFAULT_EVENT_LOG_CAPACITY,
            next_hand_delay_ms: DEFAULT_NEXT_HAND_DELAY_MS,
            table_inbox_capacity: DEFAULT_TABLE_INBOX_CAPACITY,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset or unparsable.
    ///
    /// # Errors
    ///
    /// Returns error if the resulting configuration fails validation
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            countdown_secs: parse_env_or("COUNTDOWN_SECS", DEFAULT_COUNTDOWN_SECS),
            level_duration_secs: parse_env_or("LEVEL_DURATION_SECS", DEFAULT_LEVEL_DURATION_SECS),
            event_log_capacity: parse_env_or("EVENT_LOG_CAPACITY", DEFAULT_EVENT_LOG_CAPACITY),
            next_hand_delay_ms: parse_env_or("NEXT_HAND_DELAY_MS", DEFAULT_NEXT_HAND_DELAY_MS),
            table_inbox_capacity: parse_env_or(
                "TABLE_INBOX_CAPACITY",
                DEFAULT_TABLE_INBOX_CAPACITY,
            ),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.countdown_secs == 0 {
            return Err(ConfigError::Invalid {
                var: "COUNTDOWN_SECS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.level_duration_secs == 0 {
            return Err(ConfigError::Invalid {
                var: "LEVEL_DURATION_SECS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.event_log_capacity < 16 {
            return Err(ConfigError::Invalid {
                var: "EVENT_LOG_CAPACITY".to_string(),
                reason: "Must be at least 16".to_string(),
            });
        }

        if self.table_inbox_capacity == 0 {
            return Err(ConfigError::Invalid {
                var: "TABLE_INBOX_CAPACITY".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        Ok(())
    }

    pub fn countdown(&self) -> Duration {
        Duration::from_secs(self.countdown_secs)
    }

    pub fn level_duration(&self) -> Duration {
        Duration::from_secs(self.level_duration_secs)
    }

    pub fn next_hand_delay(&self) -> Duration {
        Duration::from_millis(self.next_hand_delay_ms)
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {var}\nHint: {hint}")]
    MissingRequired { var: String, hint: String },

    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

/// Helper to parse environment variable with default fallback
pub(crate) fn parse_env_or<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
