//! Durable game snapshot storage for Gambit.
//!
//! The session engine keeps the authoritative game state in memory and
//! periodically writes it down through the [`GameStore`] trait. Anything
//! that can persist a [`GameSnapshot`] by [`GameId`] can back a Gambit
//! server: an in-process map for development, a database in production.
//!
//! Two operations, deliberately minimal:
//!
//! - [`GameStore::load`] — fetch the latest snapshot for a game, if any.
//!   Used to hydrate a session when the first client joins a game that
//!   isn't live in memory.
//! - [`GameStore::save`] — write the full snapshot. Called on the
//!   checkpoint cadence and once more when a game reaches a terminal
//!   status. Saves are full overwrites; the store never sees deltas.
//!
//! The bundled [`MemoryStore`] is suitable for tests and single-process
//! deployments without durability requirements.

mod error;
mod memory;

pub use error::StoreError;
pub use memory::MemoryStore;

use std::future::Future;

use gambit_protocol::{GameId, GameSnapshot};

/// Backend for durable game snapshots.
///
/// Implementations must be cheaply cloneable (`Clone`) — the server hands
/// a copy to every live session actor. Methods return `Send` futures
/// because they are awaited inside spawned tasks.
///
/// Implementations should treat `save` as an upsert keyed by
/// `snapshot.game_id` and must make a completed `save` visible to a
/// subsequent `load`.
pub trait GameStore: Clone + Send + Sync + 'static {
    /// Fetches the most recent snapshot for `game_id`.
    ///
    /// Returns `Ok(None)` when no snapshot exists — a fresh game, not an
    /// error.
    fn load(
        &self,
        game_id: &GameId,
    ) -> impl Future<Output = Result<Option<GameSnapshot>, StoreError>> + Send;

    /// Writes `snapshot`, replacing any previous snapshot for the same
    /// game.
    fn save(
        &self,
        snapshot: &GameSnapshot,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}
