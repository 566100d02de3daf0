//! The `RulesOracle` trait — the seam between the session engine and an
//! actual chess rules implementation.
//!
//! The session engine never inspects a [`Position`]; it hands positions
//! and [`MoveIntent`]s to the oracle and acts on the verdict. This keeps
//! rule semantics swappable: a full rules library in production, a
//! scripted fake in tests.

use crate::{MoveIntent, MoveOutcome, Position, RulesError};

/// Provides move legality and termination detection.
///
/// # Trait bounds
///
/// - `Send + Sync` — the oracle is shared across session actor tasks
///   behind an `Arc`.
/// - `'static` — it owns its data and lives as long as the server.
///
/// All methods are synchronous: legality checking is CPU work, not I/O.
pub trait RulesOracle: Send + Sync + 'static {
    /// The canonical starting position for a fresh game.
    fn initial_position(&self) -> Position;

    /// Judges a move intent against a position.
    ///
    /// # Errors
    /// Returns [`RulesError::IllegalMove`] when the intent is not a legal
    /// move in `position`, or [`RulesError::InvalidPosition`] when the
    /// position itself cannot be interpreted.
    fn legal_move(
        &self,
        position: &Position,
        intent: &MoveIntent,
    ) -> Result<MoveOutcome, RulesError>;

    /// Reconstructs a position from its serialized checkpoint form.
    ///
    /// # Errors
    /// Returns [`RulesError::InvalidPosition`] when the stored encoding
    /// is corrupt or from an incompatible oracle.
    fn position_from_snapshot(
        &self,
        serialized: &str,
    ) -> Result<Position, RulesError>;
}
