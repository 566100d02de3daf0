use thiserror::Error;

/// Errors that can occur while encoding or decoding protocol messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Serialization failed.
    #[cfg(feature = "json")]
    #[error("failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),

    /// Deserialization failed. The bytes were malformed, truncated, or
    /// didn't match the expected message shape.
    #[cfg(feature = "json")]
    #[error("failed to decode message: {0}")]
    Decode(#[source] serde_json::Error),

    /// A structurally valid message arrived at a point in the connection
    /// lifecycle where it isn't allowed (e.g. events before the handshake).
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
