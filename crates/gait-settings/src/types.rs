//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]`, so a partial
//! JSON file only needs the keys it overrides. Each type implements
//! [`Default`] with the production default values.

use gait_core::{BackoffPolicy, LogFormat, init_subscriber};
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings for the live dashboard channel.
///
/// # JSON Format
///
/// ```json
/// {
///   "endpoint": { "host": "git.internal:8443", "secure": true },
///   "reconnect": { "maxAttempts": 8 }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LiveSettings {
    /// Where the push service lives.
    pub endpoint: EndpointSettings,
    /// Automatic reconnect policy.
    pub reconnect: ReconnectSettings,
    /// Buffer sizes for the internal channels.
    pub channels: ChannelSettings,
    /// Log output configuration.
    pub logging: LoggingSettings,
}

impl LiveSettings {
    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.host.trim().is_empty() {
            return Err(SettingsError::InvalidValue("endpoint.host is empty".into()));
        }
        if !self.endpoint.path.starts_with('/') {
            return Err(SettingsError::InvalidValue(format!(
                "endpoint.path must start with '/': {}",
                self.endpoint.path
            )));
        }
        if self.reconnect.base_delay_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "reconnect.baseDelayMs must be > 0".into(),
            ));
        }
        if self.reconnect.max_delay_ms < self.reconnect.base_delay_ms {
            return Err(SettingsError::InvalidValue(
                "reconnect.maxDelayMs must be >= reconnect.baseDelayMs".into(),
            ));
        }
        let ChannelSettings {
            frame_buffer,
            notification_buffer,
            command_buffer,
        } = self.channels;
        if frame_buffer == 0 || notification_buffer == 0 || command_buffer == 0 {
            return Err(SettingsError::InvalidValue(
                "channel buffer sizes must be > 0".into(),
            ));
        }
        Ok(())
    }
}

/// Push service location.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EndpointSettings {
    /// Host and optional port serving the dashboard.
    pub host: String,
    /// Whether the dashboard is served over TLS (selects `wss`).
    pub secure: bool,
    /// Fixed channel path on the host.
    pub path: String,
}

impl Default for EndpointSettings {
    fn default() -> Self {
        Self {
            host: "localhost:8080".to_string(),
            secure: false,
            path: "/ws/dashboard".to_string(),
        }
    }
}

/// Reconnect attempt ceiling and delays.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReconnectSettings {
    /// Automatic attempts before giving up.
    pub max_attempts: u32,
    /// First retry delay in milliseconds.
    pub base_delay_ms: u64,
    /// Delay cap in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        let policy = BackoffPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            base_delay_ms: policy.base_delay_ms,
            max_delay_ms: policy.max_delay_ms,
        }
    }
}

impl From<ReconnectSettings> for BackoffPolicy {
    fn from(s: ReconnectSettings) -> Self {
        Self {
            max_attempts: s.max_attempts,
            base_delay_ms: s.base_delay_ms,
            max_delay_ms: s.max_delay_ms,
        }
    }
}

/// Internal channel capacities.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChannelSettings {
    /// Frame broadcast capacity per subscriber.
    pub frame_buffer: usize,
    /// Pending notifications held for a slow consumer.
    pub notification_buffer: usize,
    /// Pending client commands.
    pub command_buffer: usize,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            frame_buffer: 64,
            notification_buffer: 64,
            command_buffer: 32,
        }
    }
}

/// Log output configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Filter directive used when `RUST_LOG` is unset.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl LoggingSettings {
    /// Install the global stderr subscriber with this level and format.
    pub fn init(&self) {
        init_subscriber(&self.level, self.format);
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}
