//! Connection state machine labels.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ids::ResourceId;

/// State of the single live session.
///
/// `Disconnected` → `Connecting` → `Connected` → `Disconnected` on clean
/// shutdown, or `Connecting`/`Connected` → `Error` → `Connecting` on retry.
/// After the retry budget is spent the status stays `Error` until an
/// explicit `connect()`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionStatus {
    /// No session. Initial state.
    #[default]
    Disconnected,
    /// Transport open / handshake in flight.
    Connecting,
    /// Session established and subscribed.
    Connected,
    /// Last attempt failed or the session dropped.
    Error,
}

impl ConnectionStatus {
    /// Wire-style label (`"CONNECTED"` etc).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "DISCONNECTED",
            Self::Connecting => "CONNECTING",
            Self::Connected => "CONNECTED",
            Self::Error => "ERROR",
        }
    }

    /// Whether a session is in flight or established.
    ///
    /// `connect()` is a no-op in these states.
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(self, Self::Connecting | Self::Connected)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of the session owned by the connection manager.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    /// Current state.
    pub status: ConnectionStatus,
    /// Consecutive failed attempts since the last successful connect.
    pub attempt_count: u32,
    /// Resource of the current (or last) session.
    pub resource_id: Option<ResourceId>,
}
