use gambit_protocol::{ErrorCode, GameId};
use gambit_store::StoreError;
use thiserror::Error;

/// Errors from the session engine.
///
/// Each variant maps to exactly one wire [`ErrorCode`] via
/// [`SessionError::wire_code`], so gameplay rejections reach the client in
/// machine-readable form.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The game id doesn't name a live or stored session.
    #[error("{0} not found")]
    NotFound(GameId),

    /// A move was submitted out of turn, by a non-player, or before the
    /// game started.
    #[error("turn violation: {0}")]
    TurnViolation(String),

    /// The Rules Oracle refused the move.
    #[error("illegal move: {0}")]
    IllegalMove(String),

    /// A mutation arrived after the session reached a terminal status.
    /// Never silently dropped — the caller always learns the game is over.
    #[error("{0} is over")]
    SessionClosed(GameId),

    /// Draw accept/decline with no matching offer pending.
    #[error("no pending draw offer")]
    NoDrawOffer,

    /// The durable store failed. Fatal for hydration; checkpoint writes
    /// are retried instead of surfacing this.
    #[error("persistence failure: {0}")]
    Persistence(#[from] StoreError),

    /// The session actor is gone (channel closed). A registry sweep will
    /// prune the stale handle.
    #[error("{0} is unavailable")]
    Unavailable(GameId),

    /// Two mutations raced on the same session. Per-session serialization
    /// makes this unreachable; if it is ever constructed, that is a bug
    /// worth a loud log line, not a client-facing condition.
    #[error("conflicting concurrent mutation: {0}")]
    ConcurrencyConflict(String),
}

impl SessionError {
    /// The wire error code for this rejection.
    pub fn wire_code(&self) -> ErrorCode {
        match self {
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::TurnViolation(_) => ErrorCode::TurnViolation,
            Self::IllegalMove(_) => ErrorCode::IllegalMove,
            Self::SessionClosed(_) => ErrorCode::SessionClosed,
            Self::NoDrawOffer => ErrorCode::NoDrawOffer,
            Self::Persistence(_) => ErrorCode::Persistence,
            Self::Unavailable(_) => ErrorCode::Unavailable,
            Self::ConcurrencyConflict(_) => ErrorCode::Unavailable,
        }
    }
}
