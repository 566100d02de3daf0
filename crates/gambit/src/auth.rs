//! Authentication hook for resolving client identity.
//!
//! Gambit doesn't implement authentication itself — that's your auth
//! provider's job (JWT validation, a session-cookie lookup, an API call).
//! The service defines the [`Authenticator`] trait: one async method that
//! takes the handshake token and returns a [`UserId`] or an error. The
//! gateway calls it before any other event on a connection is processed.
//!
//! Swapping implementations — strict JWT in production, accept-everyone
//! in development, a fixture map in tests — requires no gateway changes.

use gambit_protocol::UserId;

/// A rejected handshake token.
#[derive(Debug, Clone, thiserror::Error)]
#[error("authentication failed: {0}")]
pub struct AuthError(pub String);

/// Resolves a client's handshake token to an identity.
///
/// `Send + Sync + 'static` because the authenticator is shared across
/// connection handler tasks for the lifetime of the server; the returned
/// future is `Send` because it is awaited inside those spawned tasks.
///
/// # Example
///
/// ```rust
/// use gambit::{AuthError, Authenticator};
/// use gambit_protocol::UserId;
///
/// /// Accepts any non-empty token and uses it as the identity.
/// /// Development only.
/// struct DevAuth;
///
/// impl Authenticator for DevAuth {
///     async fn authenticate(
///         &self,
///         token: &str,
///     ) -> Result<UserId, AuthError> {
///         if token.is_empty() {
///             return Err(AuthError("empty token".into()));
///         }
///         Ok(UserId::new(token))
///     }
/// }
/// ```
pub trait Authenticator: Send + Sync + 'static {
    /// Validates `token` and returns who the client is.
    ///
    /// The same identity may authenticate on several concurrent
    /// connections.
    fn authenticate(
        &self,
        token: &str,
    ) -> impl std::future::Future<Output = Result<UserId, AuthError>> + Send;
}
