use crate::Result;
use cgbridge_rpc::{DEFAULT_ACK_TIMEOUT, DEFAULT_CONNECT_TIMEOUT, ReconnectionPolicy};
use cgbridge_types::BridgeConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Settings file of the bridge daemon
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// `url` and `token` live at the top level of the file
    #[serde(flatten)]
    pub bridge: BridgeConfig,

    #[serde(default)]
    pub transport: TransportConfig,
}

impl Settings {
    /// Load settings from file, or the defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or contains invalid JSON.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        super::validation::warn_unknown_fields(&content, "config.json");
        let settings = serde_json::from_str(&content)?;
        Ok(settings)
    }

    /// Save settings to file.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails or the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Replace the URL and token with command line values where given.
    #[must_use]
    pub fn with_overrides(mut self, url: Option<String>, token: Option<String>) -> Self {
        if url.is_some() {
            self.bridge.url = url;
        }
        if token.is_some() {
            self.bridge.token = token;
        }
        self
    }
}

/// Socket.IO connection tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportConfig {
    #[serde(default = "default_reconnection")]
    pub reconnection: bool,

    /// Unlimited when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconnection_attempts: Option<u32>,

    #[serde(default = "default_reconnection_delay")]
    pub reconnection_delay_ms: u64,

    #[serde(default = "default_reconnection_delay_max")]
    pub reconnection_delay_max_ms: u64,

    #[serde(default = "default_randomization_factor")]
    pub randomization_factor: f64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    #[serde(default = "default_ack_timeout")]
    pub ack_timeout_ms: u64,
}

fn default_reconnection() -> bool {
    true
}
fn default_reconnection_delay() -> u64 {
    1000
}
fn default_reconnection_delay_max() -> u64 {
    5000
}
fn default_randomization_factor() -> f64 {
    0.5
}
#[allow(clippy::cast_possible_truncation)] // 20 s fits in u64 millis
fn default_connect_timeout() -> u64 {
    DEFAULT_CONNECT_TIMEOUT.as_millis() as u64
}
#[allow(clippy::cast_possible_truncation)] // 30 s fits in u64 millis
fn default_ack_timeout() -> u64 {
    DEFAULT_ACK_TIMEOUT.as_millis() as u64
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            reconnection: default_reconnection(),
            reconnection_attempts: None,
            reconnection_delay_ms: default_reconnection_delay(),
            reconnection_delay_max_ms: default_reconnection_delay_max(),
            randomization_factor: default_randomization_factor(),
            connect_timeout_ms: default_connect_timeout(),
            ack_timeout_ms: default_ack_timeout(),
        }
    }
}

impl TransportConfig {
    #[must_use]
    pub fn reconnection_policy(&self) -> ReconnectionPolicy {
        ReconnectionPolicy {
            enabled: self.reconnection,
            attempts: self.reconnection_attempts,
            delay: Duration::from_millis(self.reconnection_delay_ms),
            delay_max: Duration::from_millis(
                self.reconnection_delay_max_ms.max(self.reconnection_delay_ms),
            ),
            randomization_factor: self.randomization_factor,
        }
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    #[must_use]
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }
}
