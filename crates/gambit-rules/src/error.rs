//! Error types for the rules layer.

/// Reasons the oracle can refuse a request.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RulesError {
    /// The move is not legal in the given position. The message is the
    /// oracle's human-readable reason, forwarded to the offending client.
    #[error("illegal move: {0}")]
    IllegalMove(String),

    /// The position encoding could not be interpreted.
    #[error("invalid position: {0}")]
    InvalidPosition(String),
}
