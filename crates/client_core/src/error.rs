use shared::protocol::EndpointError;
use thiserror::Error;

/// Failures surfaced to callers of the channel manager. Transport errors and
/// clean closes are not part of this taxonomy: both are recovered internally
/// by the reconnect loop and reported on the event stream.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The session provider has no current identifier. Fatal: the connect
    /// attempt aborts and no reconnect is scheduled.
    #[error("no session identifier available")]
    MissingIdentifier,
    /// The configured server url cannot be turned into a realtime endpoint.
    #[error("invalid channel endpoint: {0}")]
    InvalidEndpoint(#[from] EndpointError),
    /// Send attempted while the channel is not connected. The message is
    /// dropped; nothing is queued or retried.
    #[error("cannot send while disconnected")]
    NotConnected,
    #[error("failed to encode outbound message: {0}")]
    Encode(#[from] serde_json::Error),
}
