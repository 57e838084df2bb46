//! # votewire-core
//!
//! Shared vocabulary for the votewire live vote-count client.
//!
//! - **Status**: [`ConnectionStatus`] state machine labels and the [`SessionSnapshot`]
//! - **IDs**: [`ResourceId`] newtype for the event being watched
//! - **Routing**: topic path and broker endpoint derivation ([`topic`], [`endpoint`])
//! - **Payloads**: typed [`VoteUpdate`] view over the opaque inbound JSON
//! - **Errors**: [`ClientError`] hierarchy via `thiserror`
//! - **Logging**: `tracing` subscriber setup and in-memory capture for tests

#![deny(unsafe_code)]

pub mod constants;
pub mod endpoint;
pub mod errors;
pub mod ids;
pub mod logging;
pub mod status;
pub mod topic;
pub mod vote;

pub use endpoint::{derive_endpoint, socket_candidates};
pub use errors::{ClientError, DecodeError, ErrorKind, TransportError};
pub use ids::ResourceId;
pub use status::{ConnectionStatus, SessionSnapshot};
pub use topic::topic_path;
pub use vote::{VoteAction, VoteUpdate};
