//! Console configuration
//!
//! Read from `$XDG_CONFIG_HOME/birdactyl/console.toml`. Every field has a
//! default so a partial or missing file is fine; command-line flags and
//! environment variables are layered on top by the caller.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use birdactyl_utils::{config_file, ConsoleError, Result};

use crate::connection::ReconnectPolicy;
use crate::session::log_buffer::DEFAULT_CAPACITY;

/// Root configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConsoleConfig {
    pub panel: PanelConfig,
    pub console: ConsoleSettings,
    pub reconnect: ReconnectConfig,
}

/// Where the panel lives and how to authenticate
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PanelConfig {
    /// Base URL, e.g. `https://panel.example.com`
    pub url: Option<String>,
    /// API token sent as bearer and as the socket `token` parameter
    pub token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConsoleSettings {
    /// Lines kept in the console buffer
    pub scrollback_lines: usize,
    /// Deadline for each power request
    pub power_timeout_secs: u64,
}

impl Default for ConsoleSettings {
    fn default() -> Self {
        Self {
            scrollback_lines: DEFAULT_CAPACITY,
            power_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReconnectConfig {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 500,
            max_delay_ms: 15_000,
            max_attempts: 10,
        }
    }
}

impl ReconnectConfig {
    pub fn policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            max_attempts: self.max_attempts,
        }
    }
}

impl ConsoleConfig {
    /// Parsed panel URL; required to do anything useful
    pub fn panel_url(&self) -> Result<Url> {
        let raw = self
            .panel
            .url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| {
                ConsoleError::config("panel URL not set (use --panel-url or [panel] url)")
            })?;
        Url::parse(raw).map_err(|e| ConsoleError::config(format!("invalid panel URL '{}': {}", raw, e)))
    }

    pub fn token(&self) -> Result<&str> {
        self.panel
            .token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ConsoleError::config("API token not set (use --token or [panel] token)"))
    }

    pub fn power_timeout(&self) -> Duration {
        Duration::from_secs(self.console.power_timeout_secs)
    }
}

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load from the default location, falling back to defaults
    pub fn load() -> Result<ConsoleConfig> {
        let path = config_file();
        if path.exists() {
            Self::load_from_path(&path)
        } else {
            Ok(ConsoleConfig::default())
        }
    }

    pub fn load_from_path(path: &Path) -> Result<ConsoleConfig> {
        let content = std::fs::read_to_string(path).map_err(|e| ConsoleError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;

        Self::parse(&content, path)
    }

    pub fn parse(content: &str, path: &Path) -> Result<ConsoleConfig> {
        toml::from_str(content).map_err(|e| ConsoleError::ConfigInvalid {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    pub fn validate(config: &ConsoleConfig) -> Result<()> {
        if config.console.scrollback_lines == 0 {
            return Err(ConsoleError::config("scrollback_lines must be at least 1"));
        }

        if config.console.power_timeout_secs == 0 {
            return Err(ConsoleError::config("power_timeout_secs must be at least 1"));
        }

        if config.reconnect.initial_delay_ms == 0 {
            return Err(ConsoleError::config("initial_delay_ms must be at least 1"));
        }

        if config.reconnect.max_delay_ms < config.reconnect.initial_delay_ms {
            return Err(ConsoleError::config(
                "max_delay_ms must not be below initial_delay_ms",
            ));
        }

        Ok(())
    }
}
