//! Package-level constants.

/// Current version of votewire (sourced from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Fallback API base used when neither an override nor settings provide one.
pub const DEFAULT_API_BASE: &str = "http://localhost:8080/api";

/// API suffix stripped from the base address before deriving the broker endpoint.
pub const API_SUFFIX: &str = "/api";

/// Well-known path segment of the broker endpoint.
pub const TRANSPORT_PATH: &str = "/ws";

/// Prefix of the per-event topic. The event identifier is appended.
pub const TOPIC_PREFIX: &str = "/topic/event/";

/// Destination the server maps to its vote broadcast handler.
pub const VOTE_DESTINATION: &str = "/app/vote";

/// Maximum automatic reconnection attempts before the client gives up.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 10;

/// Fixed delay between reconnection attempts in milliseconds.
pub const RECONNECT_DELAY_MS: u64 = 5_000;

/// Interval of the external liveness supervisor in milliseconds.
pub const SUPERVISOR_INTERVAL_MS: u64 = 10_000;
