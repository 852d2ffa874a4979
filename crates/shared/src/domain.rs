use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque identifier correlating a channel to a user/session on the remote
/// side. Supplied externally; never inspected, only embedded into the
/// connection target and the outbound wire shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

/// Deployment variant. Selects both the query parameter carrying the
/// identifier on connect and the outbound message shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireVariant {
    /// `?session_id=<id>` and `{message, ip, mac}` frames.
    #[default]
    SessionId,
    /// `?username=<id>` and `{username, message, ip, mac}` frames.
    Username,
}

impl WireVariant {
    pub fn query_param(self) -> &'static str {
        match self {
            WireVariant::SessionId => "session_id",
            WireVariant::Username => "username",
        }
    }
}
