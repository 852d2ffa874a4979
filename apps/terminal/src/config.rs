use std::{collections::HashMap, fs};

use serde::Deserialize;
use shared::{domain::WireVariant, protocol::DEFAULT_ENDPOINT_PATH};

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub server_url: String,
    pub session_id: Option<String>,
    pub wire_variant: WireVariant,
    pub endpoint_path: String,
    pub reconnect_delay_seconds: u64,
    /// Advertised in outbound message metadata. Live lookup is out of scope;
    /// empty means "unknown".
    pub client_ip: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_url: "https://127.0.0.1:8443".into(),
            session_id: None,
            wire_variant: WireVariant::SessionId,
            endpoint_path: DEFAULT_ENDPOINT_PATH.into(),
            reconnect_delay_seconds: 5,
            client_ip: String::new(),
        }
    }
}

pub fn load_settings() -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string("wireline.toml") {
        if let Ok(file_cfg) = toml::from_str::<HashMap<String, String>>(&raw) {
            if let Some(v) = file_cfg.get("server_url") {
                settings.server_url = v.clone();
            }
            if let Some(v) = file_cfg.get("session_id") {
                settings.session_id = Some(v.clone());
            }
            if let Some(v) = file_cfg.get("wire_variant") {
                if let Some(parsed) = parse_wire_variant(v) {
                    settings.wire_variant = parsed;
                }
            }
            if let Some(v) = file_cfg.get("endpoint_path") {
                settings.endpoint_path = v.clone();
            }
            if let Some(v) = file_cfg.get("reconnect_delay_seconds") {
                if let Ok(parsed) = v.parse::<u64>() {
                    settings.reconnect_delay_seconds = parsed;
                }
            }
            if let Some(v) = file_cfg.get("client_ip") {
                settings.client_ip = v.clone();
            }
        }
    }

    if let Ok(v) = std::env::var("SERVER_URL") {
        settings.server_url = v;
    }
    if let Ok(v) = std::env::var("APP__SERVER_URL") {
        settings.server_url = v;
    }

    if let Ok(v) = std::env::var("SESSION_ID") {
        settings.session_id = Some(v);
    }
    if let Ok(v) = std::env::var("APP__SESSION_ID") {
        settings.session_id = Some(v);
    }

    if let Ok(v) = std::env::var("APP__WIRE_VARIANT") {
        if let Some(parsed) = parse_wire_variant(&v) {
            settings.wire_variant = parsed;
        }
    }

    if let Ok(v) = std::env::var("APP__ENDPOINT_PATH") {
        settings.endpoint_path = v;
    }

    if let Ok(v) = std::env::var("APP__RECONNECT_DELAY_SECONDS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.reconnect_delay_seconds = parsed;
        }
    }

    if let Ok(v) = std::env::var("APP__CLIENT_IP") {
        settings.client_ip = v;
    }

    settings
}

pub fn parse_wire_variant(raw: &str) -> Option<WireVariant> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "session_id" => Some(WireVariant::SessionId),
        "username" => Some(WireVariant::Username),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_keep_the_source_reconnect_delay() {
        let settings = Settings::default();
        assert_eq!(settings.reconnect_delay_seconds, 5);
        assert_eq!(settings.endpoint_path, "/api/ws");
        assert_eq!(settings.wire_variant, WireVariant::SessionId);
        assert!(settings.session_id.is_none());
    }

    #[test]
    fn parses_known_wire_variants() {
        assert_eq!(
            parse_wire_variant("session_id"),
            Some(WireVariant::SessionId)
        );
        assert_eq!(parse_wire_variant("username"), Some(WireVariant::Username));
        assert_eq!(parse_wire_variant(" Username "), Some(WireVariant::Username));
    }

    #[test]
    fn rejects_unknown_wire_variant() {
        assert_eq!(parse_wire_variant("mqtt"), None);
        assert_eq!(parse_wire_variant(""), None);
    }
}
