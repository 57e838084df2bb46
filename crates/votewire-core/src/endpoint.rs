//! Broker endpoint derivation.
//!
//! The broker lives next to the REST API: a base of `http://host:8080/api`
//! yields `http://host:8080/ws`. Derivation is pure so it can be unit tested
//! and called on every attempt without side effects.

use url::Url;

use crate::constants::{API_SUFFIX, TRANSPORT_PATH};
use crate::errors::ClientError;

/// Derive the broker endpoint from a resolved API base address.
///
/// A trailing `/api` (or `/api/`) is stripped first; the transport path is
/// then appended to the origin of what remains.
pub fn derive_endpoint(api_base: &str) -> Result<Url, ClientError> {
    let trimmed = api_base.trim();
    let cleaned = strip_api_suffix(trimmed);

    let base = Url::parse(cleaned).map_err(|e| {
        ClientError::Configuration(format!("invalid API base {trimmed:?}: {e}"))
    })?;

    if !matches!(base.scheme(), "http" | "https" | "ws" | "wss") || base.host_str().is_none() {
        return Err(ClientError::Configuration(format!(
            "API base {trimmed:?} must be an absolute http(s) or ws(s) address"
        )));
    }

    let origin = base.origin().ascii_serialization();
    Url::parse(&format!("{origin}{TRANSPORT_PATH}"))
        .map_err(|e| ClientError::Configuration(format!("invalid broker endpoint: {e}")))
}

/// Socket URLs to try, in order, for a derived endpoint.
///
/// The SockJS raw-WebSocket path comes first; the bare endpoint is the
/// fallback for brokers that expose plain WebSocket only.
pub fn socket_candidates(endpoint: &Url) -> Vec<String> {
    let raw = endpoint.as_str().trim_end_matches('/');
    let ws = if let Some(rest) = raw.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = raw.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        raw.to_owned()
    };
    vec![format!("{ws}/websocket"), ws]
}

fn strip_api_suffix(base: &str) -> &str {
    let without_slash = base.strip_suffix('/').unwrap_or(base);
    without_slash.strip_suffix(API_SUFFIX).unwrap_or(base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn strips_api_suffix() {
        let url = derive_endpoint("http://localhost:8080/api").unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/ws");
    }

    #[test]
    fn strips_api_suffix_with_trailing_slash() {
        let url = derive_endpoint("https://votes.example.com/api/").unwrap();
        assert_eq!(url.as_str(), "https://votes.example.com/ws");
    }

    #[test]
    fn appends_to_origin_without_suffix() {
        let url = derive_endpoint("http://10.0.0.5:9000/v2/rest").unwrap();
        assert_eq!(url.as_str(), "http://10.0.0.5:9000/ws");
    }

    #[test]
    fn bare_origin() {
        let url = derive_endpoint("http://localhost:8080").unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/ws");
    }

    #[test]
    fn suffix_only_matches_whole_segment_end() {
        // "/apis" is not the API suffix; origin is used either way.
        let url = derive_endpoint("http://host/apis").unwrap();
        assert_eq!(url.as_str(), "http://host/ws");
    }

    #[test]
    fn deterministic() {
        let a = derive_endpoint("http://h:1/api").unwrap();
        let b = derive_endpoint("http://h:1/api").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn relative_base_is_configuration_error() {
        assert_matches!(derive_endpoint("/api"), Err(ClientError::Configuration(_)));
    }

    #[test]
    fn unsupported_scheme_is_configuration_error() {
        assert_matches!(
            derive_endpoint("ftp://host/api"),
            Err(ClientError::Configuration(_))
        );
    }

    #[test]
    fn candidates_upgrade_scheme() {
        let url = derive_endpoint("http://localhost:8080/api").unwrap();
        assert_eq!(
            socket_candidates(&url),
            vec![
                "ws://localhost:8080/ws/websocket".to_owned(),
                "ws://localhost:8080/ws".to_owned(),
            ]
        );
    }

    #[test]
    fn candidates_secure() {
        let url = derive_endpoint("https://votes.example.com/api").unwrap();
        assert_eq!(socket_candidates(&url)[0], "wss://votes.example.com/ws/websocket");
    }
}
