//! Client configuration.

use std::time::Duration;

use url::Url;
use votewire_core::{ClientError, derive_endpoint};
use votewire_settings::ClientSettings;

/// Resolved configuration for one [`ConnectionManager`](crate::ConnectionManager).
///
/// Built from an already-resolved API base; the client performs no lookup of
/// its own.
#[derive(Clone, Debug, PartialEq)]
pub struct ClientConfig {
    /// Broker endpoint derived from the API base.
    pub endpoint: Url,
    /// Automatic reconnection attempts before giving up.
    pub max_reconnect_attempts: u32,
    /// Fixed delay before each reconnection attempt.
    pub reconnect_delay: Duration,
    /// Upper bound on one transport open + handshake.
    pub connect_timeout: Duration,
    /// Upper bound on a graceful close.
    pub disconnect_timeout: Duration,
}

impl ClientConfig {
    /// Default policy against the broker next to `api_base`.
    pub fn new(api_base: &str) -> Result<Self, ClientError> {
        Self::from_settings(api_base, &ClientSettings::default())
    }

    /// Policy from loaded settings against the broker next to `api_base`.
    pub fn from_settings(api_base: &str, settings: &ClientSettings) -> Result<Self, ClientError> {
        Ok(Self {
            endpoint: derive_endpoint(api_base)?,
            max_reconnect_attempts: settings.max_reconnect_attempts,
            reconnect_delay: settings.reconnect_delay(),
            connect_timeout: settings.connect_timeout(),
            disconnect_timeout: settings.disconnect_timeout(),
        })
    }
}
