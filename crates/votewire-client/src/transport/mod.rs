//! Transport seam between the connection manager and the wire.
//!
//! A [`Transport`] opens sessions; a [`TransportSession`] subscribes, sends
//! and closes. Inbound traffic arrives on the [`TransportEvent`] channel
//! returned alongside the session, in the order the wire delivered it.

pub mod frame;
pub mod stomp;

use async_trait::async_trait;
use tokio::sync::mpsc;
use url::Url;
use votewire_core::TransportError;

pub use frame::{Frame, FrameError, StompCommand};
pub use stomp::StompTransport;

/// Inbound traffic from an established session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    /// A frame published to one of this session's subscriptions.
    Message {
        /// Subscription ID the broker delivered it for.
        subscription: String,
        /// Destination the frame was published to.
        destination: String,
        /// Raw body.
        body: Vec<u8>,
    },
    /// The session ended without a local close (broker error, socket drop).
    Closed(TransportError),
}

/// Receiving half of a session's inbound traffic.
pub type TransportEvents = mpsc::UnboundedReceiver<TransportEvent>;

/// A freshly established session and its inbound event stream.
pub struct OpenedSession {
    /// Command half.
    pub session: Box<dyn TransportSession>,
    /// Inbound half.
    pub events: TransportEvents,
}

impl std::fmt::Debug for OpenedSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenedSession").finish_non_exhaustive()
    }
}

/// Opens broker sessions.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open a session to `endpoint`, completing the broker handshake.
    async fn open(&self, endpoint: &Url) -> Result<OpenedSession, TransportError>;
}

/// Commands on one established session.
#[async_trait]
pub trait TransportSession: Send + Sync {
    /// Subscribe to `topic` under `subscription_id`.
    async fn subscribe(&self, subscription_id: &str, topic: &str) -> Result<(), TransportError>;

    /// Drop the subscription `subscription_id`.
    async fn unsubscribe(&self, subscription_id: &str) -> Result<(), TransportError>;

    /// Publish `body` (already serialized JSON) to `destination`.
    async fn send(&self, destination: &str, body: Vec<u8>) -> Result<(), TransportError>;

    /// Graceful close. Resolves once the broker acknowledged or the socket is gone.
    async fn close(&self) -> Result<(), TransportError>;
}
