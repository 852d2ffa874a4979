use std::collections::HashMap;

use serde::Serialize;
use thiserror::Error;
use url::Url;

use crate::domain::{SessionId, WireVariant};

/// Default path of the realtime endpoint on the remote host.
pub const DEFAULT_ENDPOINT_PATH: &str = "/api/ws";

/// Metadata keys recognized by the wire encoding.
pub const METADATA_IP: &str = "ip";
pub const METADATA_MAC: &str = "mac";

/// Placeholder reported when no MAC address is known.
pub const PLACEHOLDER_MAC: &str = "00:00:00:00:00:00";

/// One chat message queued for transmission. `metadata` carries the ip/mac
/// placeholder pair; unknown keys are ignored by the wire encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub message: String,
    pub sender_id: SessionId,
    pub metadata: HashMap<String, String>,
}

impl OutboundMessage {
    pub fn new(message: impl Into<String>, sender_id: SessionId) -> Self {
        Self {
            message: message.into(),
            sender_id,
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Serialize to the UTF-8 text frame expected by the remote side. The
    /// shape depends on the deployment variant; there is no versioning or
    /// schema negotiation.
    pub fn to_wire(&self, variant: WireVariant) -> serde_json::Result<String> {
        let frame = WireFrame {
            username: match variant {
                WireVariant::SessionId => None,
                WireVariant::Username => Some(self.sender_id.as_str()),
            },
            message: &self.message,
            ip: self.metadata_value(METADATA_IP, ""),
            mac: self.metadata_value(METADATA_MAC, PLACEHOLDER_MAC),
        };
        serde_json::to_string(&frame)
    }

    fn metadata_value<'a>(&'a self, key: &str, fallback: &'a str) -> &'a str {
        self.metadata.get(key).map(String::as_str).unwrap_or(fallback)
    }
}

#[derive(Debug, Serialize)]
struct WireFrame<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<&'a str>,
    message: &'a str,
    ip: &'a str,
    mac: &'a str,
}

#[derive(Debug, Error)]
pub enum EndpointError {
    #[error("server url must start with http://, https://, ws:// or wss://, got '{0}'")]
    UnsupportedScheme(String),
    #[error("invalid server url: {0}")]
    Parse(#[from] url::ParseError),
}

/// Build the realtime connection target: rewrite an http(s) base to ws(s),
/// mount `path` and embed the identifier as the variant's single query
/// parameter, percent-encoded.
pub fn build_endpoint_url(
    server_url: &str,
    path: &str,
    session: &SessionId,
    variant: WireVariant,
) -> Result<Url, EndpointError> {
    let ws_base = if let Some(rest) = server_url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = server_url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else if server_url.starts_with("wss://") || server_url.starts_with("ws://") {
        server_url.to_string()
    } else {
        return Err(EndpointError::UnsupportedScheme(server_url.to_string()));
    };

    let mut url = Url::parse(&ws_base)?;
    url.set_path(path);
    url.query_pairs_mut()
        .clear()
        .append_pair(variant.query_param(), session.as_str());
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrites_https_base_to_wss() {
        let url = build_endpoint_url(
            "https://chat.example.org",
            DEFAULT_ENDPOINT_PATH,
            &SessionId::from("abc"),
            WireVariant::SessionId,
        )
        .expect("endpoint");
        assert_eq!(url.as_str(), "wss://chat.example.org/api/ws?session_id=abc");
    }

    #[test]
    fn rewrites_http_base_to_ws_and_keeps_port() {
        let url = build_endpoint_url(
            "http://127.0.0.1:8443",
            DEFAULT_ENDPOINT_PATH,
            &SessionId::from("abc"),
            WireVariant::SessionId,
        )
        .expect("endpoint");
        assert_eq!(url.as_str(), "ws://127.0.0.1:8443/api/ws?session_id=abc");
    }

    #[test]
    fn passes_ws_base_through_unchanged() {
        let url = build_endpoint_url(
            "wss://chat.example.org",
            DEFAULT_ENDPOINT_PATH,
            &SessionId::from("abc"),
            WireVariant::Username,
        )
        .expect("endpoint");
        assert_eq!(url.as_str(), "wss://chat.example.org/api/ws?username=abc");
    }

    #[test]
    fn rejects_unknown_scheme() {
        let err = build_endpoint_url(
            "ftp://chat.example.org",
            DEFAULT_ENDPOINT_PATH,
            &SessionId::from("abc"),
            WireVariant::SessionId,
        )
        .expect_err("scheme must be rejected");
        assert!(matches!(err, EndpointError::UnsupportedScheme(_)));
    }

    #[test]
    fn percent_encodes_identifier() {
        let url = build_endpoint_url(
            "https://chat.example.org",
            DEFAULT_ENDPOINT_PATH,
            &SessionId::from("a&b=c"),
            WireVariant::SessionId,
        )
        .expect("endpoint");
        assert_eq!(
            url.query(),
            Some("session_id=a%26b%3Dc"),
            "identifier must survive as a single parameter"
        );
    }

    #[test]
    fn session_variant_frame_has_no_username() {
        let msg = OutboundMessage::new("hi there", SessionId::from("abc"))
            .with_metadata(METADATA_IP, "203.0.113.7");
        let frame = msg.to_wire(WireVariant::SessionId).expect("frame");
        let value: serde_json::Value = serde_json::from_str(&frame).expect("json");
        assert_eq!(value["message"], "hi there");
        assert_eq!(value["ip"], "203.0.113.7");
        assert_eq!(value["mac"], PLACEHOLDER_MAC);
        assert!(value.get("username").is_none());
    }

    #[test]
    fn username_variant_frame_carries_identifier() {
        let msg = OutboundMessage::new("hi there", SessionId::from("alice"));
        let frame = msg.to_wire(WireVariant::Username).expect("frame");
        let value: serde_json::Value = serde_json::from_str(&frame).expect("json");
        assert_eq!(value["username"], "alice");
        assert_eq!(value["message"], "hi there");
        assert_eq!(value["ip"], "");
    }
}
