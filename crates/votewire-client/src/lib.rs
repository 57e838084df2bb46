//! # votewire-client
//!
//! Reconnecting client for live vote-count updates over STOMP/WebSocket.
//!
//! - [`ConnectionManager`]: connection lifecycle, retry, send
//! - [`router`]: one subscription per session, JSON decode, handler dispatch
//! - [`Supervisor`]: periodic watchdog that restarts a dead connection
//! - [`transport`]: the wire seam and its STOMP implementation
//! - [`testing`]: scripted in-memory transport

#![deny(unsafe_code)]

pub mod config;
pub mod manager;
pub mod router;
pub mod supervisor;
pub mod testing;
pub mod transport;

pub use config::ClientConfig;
pub use manager::{ConnectOutcome, ConnectionManager};
pub use router::{Dispatch, Subscription, SubscriptionRouter};
pub use supervisor::Supervisor;
pub use transport::{StompTransport, Transport, TransportEvent, TransportSession};
pub use votewire_core::{ClientError, ConnectionStatus, ResourceId, SessionSnapshot, VoteUpdate};
