//! Connection lifecycle configuration
//!
//! Timing and retry budget for the push connection. Values are stored in
//! milliseconds so the TOML file stays readable, and exposed as [`Duration`]s.

use crate::push::{PushError, PushResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Timing and retry settings for the connection manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Delay between an `authorized` signal and the reconnect it triggers
    pub authorization_settle_delay_ms: u64,
    /// Delay before retrying a failed connect
    pub retry_interval_ms: u64,
    /// Consecutive connect failures tolerated before giving up
    pub max_retry_attempts: u32,
    /// Proactive reconnect period for a healthy connection
    pub idle_reconnect_interval_ms: u64,
    /// Window in which reconnect triggers collapse into one
    pub reconnect_debounce_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            authorization_settle_delay_ms: 1_000,
            retry_interval_ms: 10 * 1_000,
            max_retry_attempts: 3,
            idle_reconnect_interval_ms: 2 * 60 * 1_000,
            reconnect_debounce_ms: 500,
        }
    }
}

impl ConnectionConfig {
    pub fn authorization_settle_delay(&self) -> Duration {
        Duration::from_millis(self.authorization_settle_delay_ms)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn idle_reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.idle_reconnect_interval_ms)
    }

    pub fn reconnect_debounce(&self) -> Duration {
        Duration::from_millis(self.reconnect_debounce_ms)
    }

    /// Check the settings are usable by the manager
    pub fn validate(&self) -> PushResult<()> {
        if self.max_retry_attempts == 0 {
            return Err(PushError::invalid_config(
                "max_retry_attempts must be at least 1",
            ));
        }
        if self.retry_interval_ms == 0 {
            return Err(PushError::invalid_config("retry_interval_ms must be > 0"));
        }
        if self.idle_reconnect_interval_ms == 0 {
            return Err(PushError::invalid_config(
                "idle_reconnect_interval_ms must be > 0",
            ));
        }
        Ok(())
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> PushResult<Self> {
        let config: ConnectionConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Default location: `<config dir>/mailpulse/connection.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("mailpulse").join("connection.toml"))
    }

    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> PushResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;

        debug!("Loaded connection configuration from {}", path.display());
        Ok(config)
    }

    /// Load configuration, falling back to defaults when the file is absent
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> PushResult<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            info!(
                "No connection config at {}, using defaults",
                path.display()
            );
            Ok(Self::default())
        }
    }

    /// Save configuration to file, creating the parent directory
    pub fn save<P: AsRef<Path>>(&self, path: P) -> PushResult<()> {
        let path = path.as_ref();
        self.validate()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;

        debug!("Saved connection configuration to {}", path.display());
        Ok(())
    }
}
