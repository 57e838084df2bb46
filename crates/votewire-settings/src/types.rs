//! Settings types.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use votewire_core::constants::{
    DEFAULT_API_BASE, MAX_RECONNECT_ATTEMPTS, RECONNECT_DELAY_MS, SUPERVISOR_INTERVAL_MS,
};

use crate::errors::{Result, SettingsError};

/// Root settings document.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VotewireSettings {
    /// Live update client.
    pub client: ClientSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl VotewireSettings {
    /// Reject values the client cannot run with.
    pub fn validate(&self) -> Result<()> {
        self.client.validate()
    }
}

/// Connection and retry parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientSettings {
    /// REST API base; the broker endpoint is derived from it.
    pub api_base: String,
    /// Automatic reconnection attempts before giving up.
    pub max_reconnect_attempts: u32,
    /// Fixed delay between reconnection attempts.
    pub reconnect_delay_ms: u64,
    /// Liveness supervisor poll interval.
    pub supervisor_interval_ms: u64,
    /// Upper bound on the transport handshake.
    pub connect_timeout_ms: u64,
    /// Upper bound on waiting for a graceful close receipt.
    pub disconnect_timeout_ms: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_owned(),
            max_reconnect_attempts: MAX_RECONNECT_ATTEMPTS,
            reconnect_delay_ms: RECONNECT_DELAY_MS,
            supervisor_interval_ms: SUPERVISOR_INTERVAL_MS,
            connect_timeout_ms: 10_000,
            disconnect_timeout_ms: 3_000,
        }
    }
}

impl ClientSettings {
    /// Reconnect delay as a [`Duration`].
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Supervisor interval as a [`Duration`].
    pub fn supervisor_interval(&self) -> Duration {
        Duration::from_millis(self.supervisor_interval_ms)
    }

    /// Handshake timeout as a [`Duration`].
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Disconnect receipt timeout as a [`Duration`].
    pub fn disconnect_timeout(&self) -> Duration {
        Duration::from_millis(self.disconnect_timeout_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.reconnect_delay_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "reconnectDelayMs must be greater than 0".into(),
            ));
        }
        if self.supervisor_interval_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "supervisorIntervalMs must be greater than 0".into(),
            ));
        }
        if self.connect_timeout_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "connectTimeoutMs must be greater than 0".into(),
            ));
        }
        if self.disconnect_timeout_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "disconnectTimeoutMs must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

/// Log output settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
        }
    }
}

/// Resolve the API base in priority order: explicit override, settings
/// value, compiled default. Blank values are skipped.
pub fn resolve_api_base(explicit: Option<&str>, settings: &ClientSettings) -> String {
    explicit
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .or_else(|| Some(settings.api_base.trim()).filter(|s| !s.is_empty()))
        .unwrap_or(DEFAULT_API_BASE)
        .to_owned()
}
