//! Unified error type for the Gambit service.

use gambit_protocol::ProtocolError;
use gambit_session::SessionError;
use gambit_transport::TransportError;

use crate::auth::AuthError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `gambit` meta-crate, you deal with this single error
/// type instead of importing errors from each sub-crate. The `#[from]`
/// attribute on each variant auto-generates `From` impls, so the `?`
/// operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum GambitError {
    /// A transport-level error (connection, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, invalid message).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (turn violations, closed games, hydration).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Handshake authentication failure.
    #[error(transparent)]
    Auth(#[from] AuthError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_transport_error() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone");
        let err = TransportError::SendFailed(io);
        let gambit_err: GambitError = err.into();
        assert!(matches!(gambit_err, GambitError::Transport(_)));
        assert!(gambit_err.to_string().contains("send failed"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::InvalidMessage("bad".into());
        let gambit_err: GambitError = err.into();
        assert!(matches!(gambit_err, GambitError::Protocol(_)));
    }

    #[test]
    fn test_from_session_error() {
        let err = SessionError::NoDrawOffer;
        let gambit_err: GambitError = err.into();
        assert!(matches!(gambit_err, GambitError::Session(_)));
    }

    #[test]
    fn test_from_auth_error() {
        let err = AuthError("bad token".into());
        let gambit_err: GambitError = err.into();
        assert!(matches!(gambit_err, GambitError::Auth(_)));
        assert!(gambit_err.to_string().contains("bad token"));
    }
}
