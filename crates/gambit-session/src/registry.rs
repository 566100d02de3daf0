//! Session registry: at most one live actor per game id.
//!
//! The registry is the single place sessions are created, so the
//! "one authoritative writer per game" invariant reduces to "callers go
//! through `get_or_create`". The server keeps the registry behind one
//! async mutex; `get_or_create` takes `&mut self` and performs hydration
//! while the caller holds that lock, which makes concurrent first-joins
//! for the same id collapse onto a single actor.

use std::collections::HashMap;
use std::sync::Arc;

use gambit_protocol::{GameId, GameSnapshot, GameStatus};
use gambit_rules::RulesOracle;
use gambit_store::{GameStore, StoreError};
use tracing::{debug, info, warn};

use crate::session::{spawn_session, SessionHandle, SessionInfo};
use crate::{SessionConfig, SessionError};

/// Tracks all live sessions and hydrates missing ones from the store.
pub struct SessionRegistry<R: RulesOracle, S: GameStore> {
    sessions: HashMap<GameId, SessionHandle>,
    oracle: Arc<R>,
    store: S,
    config: SessionConfig,
}

impl<R: RulesOracle, S: GameStore> SessionRegistry<R, S> {
    pub fn new(oracle: Arc<R>, store: S, config: SessionConfig) -> Self {
        Self {
            sessions: HashMap::new(),
            oracle,
            store,
            config,
        }
    }

    /// Returns the live handle for `game_id`, creating the session if it
    /// isn't in memory: a stored snapshot is hydrated (its position
    /// re-validated by the oracle), otherwise a fresh Waiting session
    /// starts from the initial position.
    pub async fn get_or_create(
        &mut self,
        game_id: &GameId,
    ) -> Result<SessionHandle, SessionError> {
        if let Some(handle) = self.sessions.get(game_id) {
            if !handle.is_closed() {
                return Ok(handle.clone());
            }
            // The actor died without an eviction; replace it.
            warn!(%game_id, "pruning dead session handle");
            self.sessions.remove(game_id);
        }

        let snapshot = match self.store.load(game_id).await? {
            Some(mut stored) => {
                let position = self
                    .oracle
                    .position_from_snapshot(stored.position.as_str())
                    .map_err(|e| {
                        StoreError::LoadFailed(format!(
                            "stored position rejected by oracle: {e}"
                        ))
                    })?;
                stored.position = position;
                info!(
                    %game_id,
                    status = ?stored.status,
                    moves = stored.history.len(),
                    "hydrated session from store"
                );
                stored
            }
            None => {
                debug!(%game_id, "creating fresh session");
                GameSnapshot::fresh(
                    game_id.clone(),
                    self.oracle.initial_position(),
                    crate::session::now_ms(),
                )
            }
        };

        let handle = spawn_session(
            snapshot,
            Arc::clone(&self.oracle),
            self.store.clone(),
            self.config.clone(),
        );
        self.sessions.insert(game_id.clone(), handle.clone());
        Ok(handle)
    }

    /// Evicts sessions that no longer need to be resident:
    ///
    /// - terminal, terminal checkpoint settled, zero subscribers;
    /// - Waiting, zero subscribers, idle past `idle_timeout`.
    ///
    /// An Active session is never evicted here, with or without
    /// subscribers — grace windows and clocks decide its fate. Dead
    /// actors are pruned regardless.
    ///
    /// Returns the ids that were evicted.
    pub async fn sweep(&mut self) -> Vec<GameId> {
        let mut evicted = Vec::new();

        let handles: Vec<SessionHandle> =
            self.sessions.values().cloned().collect();
        for handle in handles {
            let game_id = handle.game_id().clone();
            let info = match handle.info().await {
                Ok(info) => info,
                Err(_) => {
                    debug!(%game_id, "pruning dead session");
                    self.sessions.remove(&game_id);
                    continue;
                }
            };

            let evict = match info.status {
                GameStatus::Active => false,
                GameStatus::Finished | GameStatus::Aborted => {
                    info.subscribers == 0 && info.checkpoint_settled
                }
                GameStatus::Waiting => {
                    info.subscribers == 0
                        && info.idle_for >= self.config.idle_timeout
                }
            };

            if evict {
                info!(
                    %game_id,
                    status = ?info.status,
                    idle_ms = info.idle_for.as_millis() as u64,
                    "evicting session"
                );
                handle.shutdown().await;
                self.sessions.remove(&game_id);
                evicted.push(game_id);
            }
        }

        evicted
    }

    /// Shuts down every session for server teardown. Non-terminal
    /// sessions abort and attempt a final checkpoint.
    pub async fn shutdown_all(&mut self) {
        info!(sessions = self.sessions.len(), "shutting down all sessions");
        for handle in self.sessions.values() {
            handle.shutdown().await;
        }
        self.sessions.clear();
    }

    /// A live (not yet swept) session's metadata, if the id is resident.
    pub async fn session_info(
        &self,
        game_id: &GameId,
    ) -> Option<SessionInfo> {
        let handle = self.sessions.get(game_id)?;
        handle.info().await.ok()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn game_ids(&self) -> Vec<GameId> {
        self.sessions.keys().cloned().collect()
    }
}
