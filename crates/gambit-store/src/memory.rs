//! In-memory snapshot store.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use gambit_protocol::{GameId, GameSnapshot};

use crate::{GameStore, StoreError};

/// A [`GameStore`] backed by a process-local `HashMap`.
///
/// Snapshots survive session eviction but not process restart. Good for
/// development, tests, and deployments where losing in-flight games on
/// restart is acceptable.
///
/// Cloning is cheap and all clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    games: Arc<Mutex<HashMap<GameId, GameSnapshot>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of snapshots currently held. Mostly useful in tests.
    pub async fn len(&self) -> usize {
        self.games.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.games.lock().await.is_empty()
    }
}

impl GameStore for MemoryStore {
    async fn load(
        &self,
        game_id: &GameId,
    ) -> Result<Option<GameSnapshot>, StoreError> {
        Ok(self.games.lock().await.get(game_id).cloned())
    }

    async fn save(&self, snapshot: &GameSnapshot) -> Result<(), StoreError> {
        debug!(
            game_id = %snapshot.game_id,
            status = ?snapshot.status,
            moves = snapshot.history.len(),
            "saving snapshot"
        );
        self.games
            .lock()
            .await
            .insert(snapshot.game_id.clone(), snapshot.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gambit_protocol::GameStatus;
    use gambit_rules::Position;

    fn snapshot(id: &str, moves: usize) -> GameSnapshot {
        let mut snap = GameSnapshot::fresh(
            GameId::new(id),
            Position::new("startpos"),
            1_000,
        );
        snap.status = GameStatus::Active;
        for ply in 1..=moves {
            snap.history.push(dummy_move(ply as u32));
        }
        snap
    }

    fn dummy_move(ply: u32) -> gambit_protocol::MoveRecord {
        use gambit_rules::{Color, MoveIntent};
        gambit_protocol::MoveRecord {
            ply,
            color: Color::side_to_move((ply - 1) as usize),
            intent: MoveIntent {
                from: "e2".into(),
                to: "e4".into(),
                promotion: None,
            },
            position: Position::new(format!("pos-{ply}")),
        }
    }

    #[tokio::test]
    async fn load_missing_game_returns_none() {
        let store = MemoryStore::new();
        let loaded = store.load(&GameId::new("nope")).await.unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let store = MemoryStore::new();
        let snap = snapshot("g1", 3);
        store.save(&snap).await.unwrap();

        let loaded = store.load(&GameId::new("g1")).await.unwrap().unwrap();
        assert_eq!(loaded.game_id, snap.game_id);
        assert_eq!(loaded.history.len(), 3);
        assert_eq!(loaded.status, GameStatus::Active);
    }

    #[tokio::test]
    async fn save_overwrites_previous_snapshot() {
        let store = MemoryStore::new();
        store.save(&snapshot("g1", 2)).await.unwrap();
        store.save(&snapshot("g1", 7)).await.unwrap();

        let loaded = store.load(&GameId::new("g1")).await.unwrap().unwrap();
        assert_eq!(loaded.history.len(), 7);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn clones_share_the_same_map() {
        let store = MemoryStore::new();
        let clone = store.clone();
        store.save(&snapshot("g1", 0)).await.unwrap();

        assert!(clone.load(&GameId::new("g1")).await.unwrap().is_some());
    }
}
