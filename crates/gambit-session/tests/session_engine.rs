//! End-to-end tests for the session engine: role assignment, turn
//! enforcement, fan-out, checkpointing, reconnection, and eviction.
//!
//! The oracle is scripted (any move is legal unless told otherwise; named
//! moves deliver checkmate) and the store counts and optionally fails
//! writes, so every property can be asserted deterministically.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time;

use gambit_protocol::{
    GameId, GameSnapshot, GameStatus, ParticipantKind, Role, ServerEvent,
    UserId,
};
use gambit_rules::{
    Color, MoveIntent, MoveOutcome, OutcomeReason, Position, RulesError,
    RulesOracle,
};
use gambit_session::{
    DisconnectPolicy, RetryPolicy, SessionConfig, SessionError,
    SessionRegistry, SubscriberSender,
};
use gambit_store::{GameStore, MemoryStore, StoreError};
use gambit_transport::ConnectionId;

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

/// Oracle where every move is legal unless scripted otherwise, and the
/// position is the concatenation of moves played (easy to assert on).
#[derive(Default)]
struct ScriptOracle {
    illegal: HashSet<String>,
    mates: HashSet<String>,
    reject_snapshots: bool,
}

impl ScriptOracle {
    fn with_mate(mv: &str) -> Self {
        Self {
            mates: [mv.to_string()].into(),
            ..Self::default()
        }
    }

    fn with_illegal(mv: &str) -> Self {
        Self {
            illegal: [mv.to_string()].into(),
            ..Self::default()
        }
    }
}

impl RulesOracle for ScriptOracle {
    fn initial_position(&self) -> Position {
        Position::new("start")
    }

    fn legal_move(
        &self,
        position: &Position,
        intent: &MoveIntent,
    ) -> Result<MoveOutcome, RulesError> {
        let key = format!("{}{}", intent.from, intent.to);
        if self.illegal.contains(&key) {
            return Err(RulesError::IllegalMove(format!(
                "{key} is scripted as illegal"
            )));
        }
        let next = Position::new(format!("{}/{}", position.as_str(), key));
        let mut outcome = MoveOutcome::ongoing(next);
        if self.mates.contains(&key) {
            outcome.is_check = true;
            outcome.is_checkmate = true;
        }
        Ok(outcome)
    }

    fn position_from_snapshot(
        &self,
        serialized: &str,
    ) -> Result<Position, RulesError> {
        if self.reject_snapshots {
            return Err(RulesError::InvalidPosition(
                "scripted rejection".into(),
            ));
        }
        Ok(Position::new(serialized))
    }
}

/// Store that counts saves and fails the first `fail_remaining` of them.
#[derive(Clone, Default)]
struct CountingStore {
    inner: MemoryStore,
    saves: Arc<AtomicU32>,
    fail_remaining: Arc<AtomicU32>,
}

impl CountingStore {
    fn failing_first(n: u32) -> Self {
        let store = Self::default();
        store.fail_remaining.store(n, Ordering::SeqCst);
        store
    }

    fn save_count(&self) -> u32 {
        self.saves.load(Ordering::SeqCst)
    }
}

impl GameStore for CountingStore {
    async fn load(
        &self,
        game_id: &GameId,
    ) -> Result<Option<GameSnapshot>, StoreError> {
        self.inner.load(game_id).await
    }

    async fn save(&self, snapshot: &GameSnapshot) -> Result<(), StoreError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        let remaining = self.fail_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_remaining.store(remaining - 1, Ordering::SeqCst);
            return Err(StoreError::SaveFailed("injected failure".into()));
        }
        self.inner.save(snapshot).await
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 4,
        base_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(10),
        jitter: Duration::ZERO,
    }
}

fn test_config() -> SessionConfig {
    SessionConfig {
        retry: fast_retry(),
        ..SessionConfig::default()
    }
}

fn registry_with(
    oracle: ScriptOracle,
    store: CountingStore,
    config: SessionConfig,
) -> SessionRegistry<ScriptOracle, CountingStore> {
    SessionRegistry::new(Arc::new(oracle), store, config)
}

fn subscriber() -> (SubscriberSender, mpsc::UnboundedReceiver<ServerEvent>) {
    mpsc::unbounded_channel()
}

fn drain(rx: &mut mpsc::UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn deltas(events: &[ServerEvent]) -> Vec<&ServerEvent> {
    events
        .iter()
        .filter(|e| matches!(e, ServerEvent::Delta { .. }))
        .collect()
}

fn user(id: &str) -> UserId {
    UserId::new(id)
}

fn mv(from: &str, to: &str) -> MoveIntent {
    MoveIntent::new(from, to)
}

/// Lets spawned checkpoint tasks run to completion.
async fn settle() {
    time::sleep(Duration::from_millis(50)).await;
}

// ---------------------------------------------------------------------------
// Roles and activation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn first_two_identities_claim_colors_third_spectates() {
    let mut registry = registry_with(
        ScriptOracle::default(),
        CountingStore::default(),
        test_config(),
    );
    let handle = registry.get_or_create(&GameId::new("g1")).await.unwrap();

    let (tx1, mut rx1) = subscriber();
    let sub1 = handle
        .subscribe(ConnectionId::new(1), user("u1"), tx1)
        .await
        .unwrap();
    assert_eq!(
        sub1.role,
        Role::Player {
            color: Color::White
        }
    );
    assert_eq!(sub1.snapshot.status, GameStatus::Waiting);

    let (tx2, _rx2) = subscriber();
    let sub2 = handle
        .subscribe(ConnectionId::new(2), user("u2"), tx2)
        .await
        .unwrap();
    assert_eq!(
        sub2.role,
        Role::Player {
            color: Color::Black
        }
    );
    // Both colors bound — the join reply already reflects the live game.
    assert_eq!(sub2.snapshot.status, GameStatus::Active);

    let (tx3, mut rx3) = subscriber();
    let sub3 = handle
        .subscribe(ConnectionId::new(3), user("u3"), tx3)
        .await
        .unwrap();
    assert_eq!(sub3.role, Role::Spectator);
    // One snapshot, no delta replay for the new joiner.
    assert!(deltas(&drain(&mut rx3)).is_empty());

    // The first player watched the second join and the activation delta.
    let events = drain(&mut rx1);
    assert!(events.iter().any(|e| matches!(
        e,
        ServerEvent::Participant {
            kind: ParticipantKind::Joined,
            ..
        }
    )));
    assert!(events.iter().any(|e| matches!(
        e,
        ServerEvent::Delta { delta, .. } if delta.status == GameStatus::Active
    )));
}

#[tokio::test]
async fn same_identity_on_two_connections_keeps_one_color() {
    let mut registry = registry_with(
        ScriptOracle::default(),
        CountingStore::default(),
        test_config(),
    );
    let handle = registry.get_or_create(&GameId::new("g1")).await.unwrap();

    let (tx1, _rx1) = subscriber();
    let sub1 = handle
        .subscribe(ConnectionId::new(1), user("u1"), tx1)
        .await
        .unwrap();
    let (tx2, _rx2) = subscriber();
    let sub2 = handle
        .subscribe(ConnectionId::new(2), user("u1"), tx2)
        .await
        .unwrap();

    // Second connection of the same identity is the same player, not
    // black.
    assert_eq!(sub1.role, sub2.role);
    assert_eq!(sub2.snapshot.status, GameStatus::Waiting);
}

// ---------------------------------------------------------------------------
// Turn enforcement and moves
// ---------------------------------------------------------------------------

#[tokio::test]
async fn move_before_start_is_a_turn_violation() {
    let mut registry = registry_with(
        ScriptOracle::default(),
        CountingStore::default(),
        test_config(),
    );
    let handle = registry.get_or_create(&GameId::new("g1")).await.unwrap();

    let (tx1, _rx1) = subscriber();
    handle
        .subscribe(ConnectionId::new(1), user("u1"), tx1)
        .await
        .unwrap();

    let err = handle
        .submit_move(user("u1"), mv("e2", "e4"))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::TurnViolation(_)));
}

#[tokio::test]
async fn turns_alternate_white_first() {
    let mut registry = registry_with(
        ScriptOracle::default(),
        CountingStore::default(),
        test_config(),
    );
    let handle = registry.get_or_create(&GameId::new("g1")).await.unwrap();

    let (tx1, mut rx1) = subscriber();
    handle
        .subscribe(ConnectionId::new(1), user("u1"), tx1)
        .await
        .unwrap();
    let (tx2, mut rx2) = subscriber();
    handle
        .subscribe(ConnectionId::new(2), user("u2"), tx2)
        .await
        .unwrap();
    drain(&mut rx1);
    drain(&mut rx2);

    // Black may not open.
    let err = handle
        .submit_move(user("u2"), mv("e7", "e5"))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::TurnViolation(_)));

    handle.submit_move(user("u1"), mv("e2", "e4")).await.unwrap();

    // White may not move twice.
    let err = handle
        .submit_move(user("u1"), mv("d2", "d4"))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::TurnViolation(_)));

    handle.submit_move(user("u2"), mv("e7", "e5")).await.unwrap();

    // Both players saw both deltas, in order.
    for rx in [&mut rx1, &mut rx2] {
        let events = drain(rx);
        let seen = deltas(&events);
        assert_eq!(seen.len(), 2);
        if let ServerEvent::Delta { delta, .. } = seen[0] {
            assert_eq!(delta.history_len, 1);
            assert_eq!(delta.turn, Color::Black);
        }
        if let ServerEvent::Delta { delta, .. } = seen[1] {
            assert_eq!(delta.history_len, 2);
            assert_eq!(delta.turn, Color::White);
        }
    }
}

#[tokio::test]
async fn spectator_cannot_move() {
    let mut registry = registry_with(
        ScriptOracle::default(),
        CountingStore::default(),
        test_config(),
    );
    let handle = registry.get_or_create(&GameId::new("g1")).await.unwrap();

    for (n, u) in ["u1", "u2", "u3"].iter().enumerate() {
        let (tx, _rx) = subscriber();
        handle
            .subscribe(ConnectionId::new(n as u64 + 1), user(u), tx)
            .await
            .unwrap();
    }

    let err = handle
        .submit_move(user("u3"), mv("e2", "e4"))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::TurnViolation(_)));
}

#[tokio::test]
async fn illegal_move_rejected_without_state_change_or_broadcast() {
    let mut registry = registry_with(
        ScriptOracle::with_illegal("e2e5"),
        CountingStore::default(),
        test_config(),
    );
    let handle = registry.get_or_create(&GameId::new("g1")).await.unwrap();

    let (tx1, mut rx1) = subscriber();
    handle
        .subscribe(ConnectionId::new(1), user("u1"), tx1)
        .await
        .unwrap();
    let (tx2, _rx2) = subscriber();
    handle
        .subscribe(ConnectionId::new(2), user("u2"), tx2)
        .await
        .unwrap();
    drain(&mut rx1);

    let err = handle
        .submit_move(user("u1"), mv("e2", "e5"))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::IllegalMove(_)));

    let info = handle.info().await.unwrap();
    assert_eq!(info.history_len, 0);
    // Rejections are replies, never broadcasts.
    assert!(deltas(&drain(&mut rx1)).is_empty());

    // Still white's turn.
    handle.submit_move(user("u1"), mv("e2", "e4")).await.unwrap();
}

// ---------------------------------------------------------------------------
// Checkpointing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn checkpoints_every_fifth_half_move() {
    let store = CountingStore::default();
    let mut registry = registry_with(
        ScriptOracle::default(),
        store.clone(),
        test_config(),
    );
    let handle = registry.get_or_create(&GameId::new("g1")).await.unwrap();

    let (tx1, _rx1) = subscriber();
    handle
        .subscribe(ConnectionId::new(1), user("u1"), tx1)
        .await
        .unwrap();
    let (tx2, _rx2) = subscriber();
    handle
        .subscribe(ConnectionId::new(2), user("u2"), tx2)
        .await
        .unwrap();

    let users = [user("u1"), user("u2")];
    for ply in 0..9u32 {
        let who = users[(ply % 2) as usize].clone();
        handle
            .submit_move(who, mv("a1", &format!("b{ply}")))
            .await
            .unwrap();
    }
    settle().await;
    // One checkpoint at move 5, none since.
    assert_eq!(store.save_count(), 1);

    handle
        .submit_move(user("u2"), mv("a1", "b9"))
        .await
        .unwrap();
    settle().await;
    assert_eq!(store.save_count(), 2);

    let saved = store
        .load(&GameId::new("g1"))
        .await
        .unwrap()
        .expect("checkpoint persisted");
    assert_eq!(saved.history.len(), 10);
    assert_eq!(saved.status, GameStatus::Active);
}

#[tokio::test]
async fn checkpoint_retries_through_transient_store_failures() {
    let store = CountingStore::failing_first(2);
    let mut registry = registry_with(
        ScriptOracle::default(),
        store.clone(),
        test_config(),
    );
    let handle = registry.get_or_create(&GameId::new("g1")).await.unwrap();

    let (tx1, _rx1) = subscriber();
    handle
        .subscribe(ConnectionId::new(1), user("u1"), tx1)
        .await
        .unwrap();
    let (tx2, _rx2) = subscriber();
    handle
        .subscribe(ConnectionId::new(2), user("u2"), tx2)
        .await
        .unwrap();

    let users = [user("u1"), user("u2")];
    for ply in 0..5u32 {
        let who = users[(ply % 2) as usize].clone();
        handle
            .submit_move(who, mv("a1", &format!("b{ply}")))
            .await
            .unwrap();
    }
    settle().await;

    // Two injected failures, then success on the third attempt.
    assert_eq!(store.save_count(), 3);
    assert!(store
        .load(&GameId::new("g1"))
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn terminal_checkpoint_settles_after_exhausting_retries() {
    let store = CountingStore::failing_first(u32::MAX);
    let mut registry = registry_with(
        ScriptOracle::with_mate("f3g4"),
        store.clone(),
        test_config(),
    );
    let (handle, _rx1, _rx2) = active_pair(&mut registry, "g1").await;

    handle.submit_move(user("u1"), mv("f3", "g4")).await.unwrap();
    settle().await;

    // Every attempt failed; the session gives up and settles anyway.
    assert_eq!(store.save_count(), fast_retry().max_attempts);
    assert!(handle.info().await.unwrap().checkpoint_settled);

    // An unwatched session with an exhausted checkpoint still gets
    // evicted rather than pinning the registry forever.
    handle.unsubscribe(ConnectionId::new(1)).await.unwrap();
    handle.unsubscribe(ConnectionId::new(2)).await.unwrap();
    let evicted = registry.sweep().await;
    assert_eq!(evicted, vec![GameId::new("g1")]);
    assert!(store.load(&GameId::new("g1")).await.unwrap().is_none());
}

#[tokio::test]
async fn checkmate_finishes_game_and_writes_terminal_checkpoint() {
    let store = CountingStore::default();
    let mut registry = registry_with(
        ScriptOracle::with_mate("f3g4"),
        store.clone(),
        test_config(),
    );
    let handle = registry.get_or_create(&GameId::new("g1")).await.unwrap();

    let (tx1, mut rx1) = subscriber();
    handle
        .subscribe(ConnectionId::new(1), user("u1"), tx1)
        .await
        .unwrap();
    let (tx2, _rx2) = subscriber();
    handle
        .subscribe(ConnectionId::new(2), user("u2"), tx2)
        .await
        .unwrap();
    drain(&mut rx1);

    handle.submit_move(user("u1"), mv("f3", "g4")).await.unwrap();
    settle().await;

    let events = drain(&mut rx1);
    let seen = deltas(&events);
    assert_eq!(seen.len(), 1);
    if let ServerEvent::Delta { delta, .. } = seen[0] {
        assert_eq!(delta.status, GameStatus::Finished);
        let outcome = delta.outcome.expect("terminal delta carries outcome");
        assert_eq!(outcome.winner, Some(Color::White));
        assert_eq!(outcome.reason, OutcomeReason::Checkmate);
        assert!(delta.last_move.is_some());
    }

    let saved = store
        .load(&GameId::new("g1"))
        .await
        .unwrap()
        .expect("terminal checkpoint persisted");
    assert_eq!(saved.status, GameStatus::Finished);
    assert!(handle.info().await.unwrap().checkpoint_settled);

    // Game over: further mutations are refused, not dropped.
    let err = handle
        .submit_move(user("u2"), mv("e7", "e5"))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::SessionClosed(_)));
}

// ---------------------------------------------------------------------------
// Draw offers and resignation
// ---------------------------------------------------------------------------

async fn active_pair(
    registry: &mut SessionRegistry<ScriptOracle, CountingStore>,
    id: &str,
) -> (
    gambit_session::SessionHandle,
    mpsc::UnboundedReceiver<ServerEvent>,
    mpsc::UnboundedReceiver<ServerEvent>,
) {
    let handle = registry.get_or_create(&GameId::new(id)).await.unwrap();
    let (tx1, mut rx1) = subscriber();
    handle
        .subscribe(ConnectionId::new(1), user("u1"), tx1)
        .await
        .unwrap();
    let (tx2, mut rx2) = subscriber();
    handle
        .subscribe(ConnectionId::new(2), user("u2"), tx2)
        .await
        .unwrap();
    drain(&mut rx1);
    drain(&mut rx2);
    (handle, rx1, rx2)
}

#[tokio::test]
async fn draw_offer_accept_ends_in_agreement() {
    let mut registry = registry_with(
        ScriptOracle::default(),
        CountingStore::default(),
        test_config(),
    );
    let (handle, _rx1, mut rx2) = active_pair(&mut registry, "g1").await;

    handle.offer_draw(user("u1")).await.unwrap();
    assert!(drain(&mut rx2).iter().any(|e| matches!(
        e,
        ServerEvent::DrawOffered {
            by: Color::White,
            ..
        }
    )));

    // The offerer cannot accept their own offer.
    let err = handle.accept_draw(user("u1")).await.unwrap_err();
    assert!(matches!(err, SessionError::NoDrawOffer));

    handle.accept_draw(user("u2")).await.unwrap();
    let info = handle.info().await.unwrap();
    assert_eq!(info.status, GameStatus::Finished);

    let events = drain(&mut rx2);
    let seen = deltas(&events);
    if let ServerEvent::Delta { delta, .. } = seen[0] {
        let outcome = delta.outcome.expect("drawn outcome");
        assert_eq!(outcome.winner, None);
        assert_eq!(outcome.reason, OutcomeReason::Agreement);
    }
}

#[tokio::test]
async fn draw_decline_clears_the_offer() {
    let mut registry = registry_with(
        ScriptOracle::default(),
        CountingStore::default(),
        test_config(),
    );
    let (handle, mut rx1, _rx2) = active_pair(&mut registry, "g1").await;

    handle.offer_draw(user("u1")).await.unwrap();
    handle.decline_draw(user("u2")).await.unwrap();

    assert!(drain(&mut rx1).iter().any(|e| matches!(
        e,
        ServerEvent::DrawDeclined {
            by: Color::Black,
            ..
        }
    )));

    // Nothing left to accept.
    let err = handle.accept_draw(user("u2")).await.unwrap_err();
    assert!(matches!(err, SessionError::NoDrawOffer));

    let info = handle.info().await.unwrap();
    assert_eq!(info.status, GameStatus::Active);
}

#[tokio::test]
async fn accepted_move_clears_pending_draw_offer() {
    let mut registry = registry_with(
        ScriptOracle::default(),
        CountingStore::default(),
        test_config(),
    );
    let (handle, _rx1, _rx2) = active_pair(&mut registry, "g1").await;

    handle.offer_draw(user("u1")).await.unwrap();
    handle.submit_move(user("u1"), mv("e2", "e4")).await.unwrap();

    let err = handle.accept_draw(user("u2")).await.unwrap_err();
    assert!(matches!(err, SessionError::NoDrawOffer));
}

#[tokio::test]
async fn accept_without_offer_is_rejected() {
    let mut registry = registry_with(
        ScriptOracle::default(),
        CountingStore::default(),
        test_config(),
    );
    let (handle, _rx1, _rx2) = active_pair(&mut registry, "g1").await;

    let err = handle.accept_draw(user("u2")).await.unwrap_err();
    assert!(matches!(err, SessionError::NoDrawOffer));
    let err = handle.decline_draw(user("u2")).await.unwrap_err();
    assert!(matches!(err, SessionError::NoDrawOffer));
}

#[tokio::test]
async fn resignation_ends_the_game_immediately() {
    let mut registry = registry_with(
        ScriptOracle::default(),
        CountingStore::default(),
        test_config(),
    );
    let (handle, mut rx1, _rx2) = active_pair(&mut registry, "g1").await;

    handle.resign(user("u2")).await.unwrap();

    let events = drain(&mut rx1);
    let seen = deltas(&events);
    assert_eq!(seen.len(), 1);
    if let ServerEvent::Delta { delta, .. } = seen[0] {
        assert_eq!(delta.status, GameStatus::Finished);
        let outcome = delta.outcome.expect("resignation outcome");
        assert_eq!(outcome.winner, Some(Color::White));
        assert_eq!(outcome.reason, OutcomeReason::Resignation);
    }

    let err = handle.resign(user("u1")).await.unwrap_err();
    assert!(matches!(err, SessionError::SessionClosed(_)));
}

// ---------------------------------------------------------------------------
// Disconnects, grace windows, reconnection
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn grace_expiry_forfeits_under_forfeit_policy() {
    let mut registry = registry_with(
        ScriptOracle::default(),
        CountingStore::default(),
        SessionConfig {
            reconnect_grace: Duration::from_secs(30),
            retry: fast_retry(),
            ..SessionConfig::default()
        },
    );
    let (handle, mut rx1, _rx2) = active_pair(&mut registry, "g1").await;

    handle.disconnect(ConnectionId::new(2)).await;
    // Round-trip to make sure the disconnect was processed.
    let info = handle.info().await.unwrap();
    assert_eq!(info.status, GameStatus::Active);
    assert!(drain(&mut rx1).iter().any(|e| matches!(
        e,
        ServerEvent::Participant {
            kind: ParticipantKind::Disconnected,
            ..
        }
    )));

    time::advance(Duration::from_secs(31)).await;
    settle().await;

    let info = handle.info().await.unwrap();
    assert_eq!(info.status, GameStatus::Finished);

    let events = drain(&mut rx1);
    let seen = deltas(&events);
    if let ServerEvent::Delta { delta, .. } = seen[0] {
        let outcome = delta.outcome.expect("forfeit outcome");
        assert_eq!(outcome.winner, Some(Color::White));
        assert_eq!(outcome.reason, OutcomeReason::Abandonment);
    }
}

#[tokio::test(start_paused = true)]
async fn reconnection_within_grace_keeps_the_game_alive() {
    let mut registry = registry_with(
        ScriptOracle::default(),
        CountingStore::default(),
        SessionConfig {
            reconnect_grace: Duration::from_secs(30),
            retry: fast_retry(),
            ..SessionConfig::default()
        },
    );
    let (handle, mut rx1, _rx2) = active_pair(&mut registry, "g1").await;

    handle.submit_move(user("u1"), mv("e2", "e4")).await.unwrap();
    handle.disconnect(ConnectionId::new(2)).await;
    handle.info().await.unwrap();
    drain(&mut rx1);

    time::advance(Duration::from_secs(15)).await;

    // Same identity, fresh connection: same color, full history.
    let (tx3, mut rx3) = subscriber();
    let sub = handle
        .subscribe(ConnectionId::new(3), user("u2"), tx3)
        .await
        .unwrap();
    assert_eq!(
        sub.role,
        Role::Player {
            color: Color::Black
        }
    );
    assert_eq!(sub.snapshot.status, GameStatus::Active);
    assert_eq!(sub.snapshot.history.len(), 1);
    assert!(deltas(&drain(&mut rx3)).is_empty());

    assert!(drain(&mut rx1).iter().any(|e| matches!(
        e,
        ServerEvent::Participant {
            kind: ParticipantKind::Reconnected,
            ..
        }
    )));

    // The old grace deadline must not fire after the reconnect.
    time::advance(Duration::from_secs(60)).await;
    settle().await;
    assert_eq!(handle.info().await.unwrap().status, GameStatus::Active);

    // Play continues where it left off.
    handle.submit_move(user("u2"), mv("e7", "e5")).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn leave_open_policy_never_forfeits() {
    let mut registry = registry_with(
        ScriptOracle::default(),
        CountingStore::default(),
        SessionConfig {
            disconnect_policy: DisconnectPolicy::LeaveOpen,
            reconnect_grace: Duration::from_secs(30),
            retry: fast_retry(),
            ..SessionConfig::default()
        },
    );
    let (handle, _rx1, _rx2) = active_pair(&mut registry, "g1").await;

    handle.disconnect(ConnectionId::new(2)).await;
    handle.info().await.unwrap();

    time::advance(Duration::from_secs(3600)).await;
    settle().await;

    assert_eq!(handle.info().await.unwrap().status, GameStatus::Active);
}

// ---------------------------------------------------------------------------
// Clocks
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn flag_fall_loses_on_time() {
    let mut registry = registry_with(
        ScriptOracle::default(),
        CountingStore::default(),
        SessionConfig {
            clock: Some(gambit_clock::ClockConfig::minutes_plus_seconds(
                1, 0,
            )),
            retry: fast_retry(),
            ..SessionConfig::default()
        },
    );
    let (handle, mut rx1, _rx2) = active_pair(&mut registry, "g1").await;

    // White burns the whole minute without moving.
    time::advance(Duration::from_secs(61)).await;
    settle().await;

    let info = handle.info().await.unwrap();
    assert_eq!(info.status, GameStatus::Finished);

    let events = drain(&mut rx1);
    let seen = deltas(&events);
    if let ServerEvent::Delta { delta, .. } = seen[0] {
        let outcome = delta.outcome.expect("timeout outcome");
        assert_eq!(outcome.winner, Some(Color::Black));
        assert_eq!(outcome.reason, OutcomeReason::Timeout);
    }
}

#[tokio::test(start_paused = true)]
async fn moving_hands_the_clock_to_the_opponent() {
    let mut registry = registry_with(
        ScriptOracle::default(),
        CountingStore::default(),
        SessionConfig {
            clock: Some(gambit_clock::ClockConfig::minutes_plus_seconds(
                1, 0,
            )),
            retry: fast_retry(),
            ..SessionConfig::default()
        },
    );
    let (handle, _rx1, mut rx2) = active_pair(&mut registry, "g1").await;

    time::advance(Duration::from_secs(30)).await;
    handle.submit_move(user("u1"), mv("e2", "e4")).await.unwrap();

    // White's remaining 30s pass — black's clock is running, white's is
    // not, so nothing flags.
    time::advance(Duration::from_secs(45)).await;
    settle().await;
    assert_eq!(handle.info().await.unwrap().status, GameStatus::Active);

    // Black's minute expires.
    time::advance(Duration::from_secs(16)).await;
    settle().await;
    assert_eq!(handle.info().await.unwrap().status, GameStatus::Finished);

    let events = drain(&mut rx2);
    let terminal = deltas(&events);
    let last = terminal.last().expect("terminal delta");
    if let ServerEvent::Delta { delta, .. } = last {
        assert_eq!(delta.outcome.unwrap().winner, Some(Color::White));
    }
}

// ---------------------------------------------------------------------------
// Registry: hydration, sweep, shutdown
// ---------------------------------------------------------------------------

#[tokio::test]
async fn get_or_create_returns_the_same_live_session() {
    let mut registry = registry_with(
        ScriptOracle::default(),
        CountingStore::default(),
        test_config(),
    );
    let a = registry.get_or_create(&GameId::new("g1")).await.unwrap();
    let b = registry.get_or_create(&GameId::new("g1")).await.unwrap();

    let (tx, _rx) = subscriber();
    a.subscribe(ConnectionId::new(1), user("u1"), tx)
        .await
        .unwrap();
    // The second handle sees the first handle's subscriber.
    assert_eq!(b.info().await.unwrap().subscribers, 1);
    assert_eq!(registry.session_count(), 1);
}

#[tokio::test]
async fn hydrates_stored_game_with_roles_and_history() {
    let store = CountingStore::default();
    let mut stored = GameSnapshot::fresh(
        GameId::new("g1"),
        Position::new("start/e2e4/e7e5"),
        1_000,
    );
    stored.status = GameStatus::Active;
    stored.white = Some(user("u1"));
    stored.black = Some(user("u2"));
    stored.history = vec![
        gambit_protocol::MoveRecord {
            ply: 1,
            color: Color::White,
            intent: mv("e2", "e4"),
            position: Position::new("start/e2e4"),
        },
        gambit_protocol::MoveRecord {
            ply: 2,
            color: Color::Black,
            intent: mv("e7", "e5"),
            position: Position::new("start/e2e4/e7e5"),
        },
    ];
    store.inner.save(&stored).await.unwrap();

    let mut registry =
        registry_with(ScriptOracle::default(), store, test_config());
    let handle = registry.get_or_create(&GameId::new("g1")).await.unwrap();

    // A stranger to the stored game can only spectate.
    let (tx, _rx) = subscriber();
    let spectator = handle
        .subscribe(ConnectionId::new(9), user("u9"), tx)
        .await
        .unwrap();
    assert_eq!(spectator.role, Role::Spectator);

    // The original players keep their colors.
    let (tx, _rx) = subscriber();
    let sub = handle
        .subscribe(ConnectionId::new(1), user("u2"), tx)
        .await
        .unwrap();
    assert_eq!(
        sub.role,
        Role::Player {
            color: Color::Black
        }
    );
    assert_eq!(sub.snapshot.history.len(), 2);
    assert_eq!(sub.snapshot.status, GameStatus::Active);

    // White to move (two half-moves played).
    let err = handle
        .submit_move(user("u2"), mv("d7", "d5"))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::TurnViolation(_)));
    handle.submit_move(user("u1"), mv("d2", "d4")).await.unwrap();
}

#[tokio::test]
async fn corrupt_stored_position_fails_hydration() {
    let store = CountingStore::default();
    let stored = GameSnapshot::fresh(
        GameId::new("g1"),
        Position::new("garbage"),
        1_000,
    );
    store.inner.save(&stored).await.unwrap();

    let oracle = ScriptOracle {
        reject_snapshots: true,
        ..ScriptOracle::default()
    };
    let mut registry = registry_with(oracle, store, test_config());

    let err = registry
        .get_or_create(&GameId::new("g1"))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Persistence(_)));
    assert_eq!(registry.session_count(), 0);
}

#[tokio::test]
async fn sweep_evicts_finished_unwatched_sessions_only() {
    let store = CountingStore::default();
    let mut registry = registry_with(
        ScriptOracle::default(),
        store.clone(),
        test_config(),
    );
    let (handle, _rx1, _rx2) = active_pair(&mut registry, "g1").await;

    // A second, still-active game must survive the sweep.
    let (other, _orx1, _orx2) = active_pair(&mut registry, "g2").await;

    handle.resign(user("u2")).await.unwrap();
    settle().await;

    // Still watched — not evicted.
    assert!(registry.sweep().await.is_empty());

    handle.unsubscribe(ConnectionId::new(1)).await.unwrap();
    handle.unsubscribe(ConnectionId::new(2)).await.unwrap();

    let evicted = registry.sweep().await;
    assert_eq!(evicted, vec![GameId::new("g1")]);
    assert_eq!(registry.session_count(), 1);
    assert!(other.info().await.is_ok());

    // The result survived eviction.
    let saved = store.load(&GameId::new("g1")).await.unwrap().unwrap();
    assert_eq!(saved.status, GameStatus::Finished);
}

#[tokio::test(start_paused = true)]
async fn sweep_evicts_idle_waiting_sessions() {
    let mut registry = registry_with(
        ScriptOracle::default(),
        CountingStore::default(),
        SessionConfig {
            idle_timeout: Duration::from_secs(600),
            retry: fast_retry(),
            ..SessionConfig::default()
        },
    );
    let handle = registry.get_or_create(&GameId::new("g1")).await.unwrap();

    let (tx, _rx) = subscriber();
    handle
        .subscribe(ConnectionId::new(1), user("u1"), tx)
        .await
        .unwrap();
    handle.unsubscribe(ConnectionId::new(1)).await.unwrap();

    time::advance(Duration::from_secs(300)).await;
    assert!(registry.sweep().await.is_empty());

    time::advance(Duration::from_secs(301)).await;
    let evicted = registry.sweep().await;
    assert_eq!(evicted, vec![GameId::new("g1")]);
}

#[tokio::test]
async fn shutdown_aborts_live_games_with_a_final_checkpoint() {
    let store = CountingStore::default();
    let mut registry = registry_with(
        ScriptOracle::default(),
        store.clone(),
        test_config(),
    );
    let (handle, mut rx1, _rx2) = active_pair(&mut registry, "g1").await;

    registry.shutdown_all().await;
    settle().await;

    assert_eq!(registry.session_count(), 0);
    assert!(handle.info().await.is_err());

    let saved = store.load(&GameId::new("g1")).await.unwrap().unwrap();
    assert_eq!(saved.status, GameStatus::Aborted);

    // Subscribers were told before the actor exited.
    let events = drain(&mut rx1);
    assert!(events.iter().any(|e| matches!(
        e,
        ServerEvent::Delta { delta, .. }
            if delta.status == GameStatus::Aborted
    )));
}
