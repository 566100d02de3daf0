//! Session actor: an isolated Tokio task that owns one game.
//!
//! Each live game runs in its own task and communicates with the outside
//! world through an mpsc command channel. Every mutation — moves, draw
//! offers, resignations, timer expiries — is applied by this single task
//! in receipt order, which is what makes the state authoritative without
//! any locking.
//!
//! The actor loop selects over three sources:
//!
//! 1. commands from [`SessionHandle`]s,
//! 2. the reconnection grace deadline of a disconnected player,
//! 3. the chess clock's flag deadline (when a time control is set).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use gambit_clock::ChessClock;
use gambit_protocol::{
    GameId, GameSnapshot, GameStatus, MoveRecord, ParticipantKind, Role,
    ServerEvent, StateDelta, UserId,
};
use gambit_rules::{
    Color, GameOutcome, MoveIntent, OutcomeReason, Position, RulesError,
    RulesOracle,
};
use gambit_store::GameStore;
use gambit_transport::ConnectionId;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Instant};
use tracing::{debug, error, info, warn};

use crate::checkpoint;
use crate::{
    DisconnectPolicy, DrawOfferVisibility, SessionConfig, SessionError,
};

/// Channel sender for delivering session events to one subscriber.
///
/// Unbounded on purpose: fan-out must never block the actor. The network
/// write happens in a per-connection writer task on the other end, so a
/// slow client backs up its own channel, not the game.
pub type SubscriberSender = mpsc::UnboundedSender<ServerEvent>;

/// Successful reply to a subscribe: the assigned role and one full
/// snapshot. Joiners always get a snapshot, never a replay of deltas.
#[derive(Debug, Clone)]
pub struct Subscription {
    pub role: Role,
    pub snapshot: GameSnapshot,
}

/// Session metadata for the registry's sweep and for introspection.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub game_id: GameId,
    pub status: GameStatus,
    pub subscribers: usize,
    pub history_len: usize,
    /// `false` while a terminal checkpoint is still in flight. The
    /// registry will not evict until this settles.
    pub checkpoint_settled: bool,
    /// Time since the last command touched this session.
    pub idle_for: Duration,
}

type Reply<T> = oneshot::Sender<T>;

/// Commands sent to a session actor through its channel.
pub(crate) enum SessionCommand {
    Subscribe {
        conn: ConnectionId,
        user: UserId,
        sender: SubscriberSender,
        reply: Reply<Result<Subscription, SessionError>>,
    },
    Unsubscribe {
        conn: ConnectionId,
        reply: Reply<Result<(), SessionError>>,
    },
    /// Transport-level drop; fire-and-forget because the connection that
    /// would read a reply is already gone.
    Disconnect { conn: ConnectionId },
    SubmitMove {
        user: UserId,
        intent: MoveIntent,
        reply: Reply<Result<(), SessionError>>,
    },
    OfferDraw {
        user: UserId,
        reply: Reply<Result<(), SessionError>>,
    },
    AcceptDraw {
        user: UserId,
        reply: Reply<Result<(), SessionError>>,
    },
    DeclineDraw {
        user: UserId,
        reply: Reply<Result<(), SessionError>>,
    },
    Resign {
        user: UserId,
        reply: Reply<Result<(), SessionError>>,
    },
    Info { reply: Reply<SessionInfo> },
    /// From the terminal checkpoint task once its retries conclude.
    CheckpointSettled,
    Shutdown,
}

/// Handle to a running session actor. Cheap to clone.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    game_id: GameId,
    sender: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    pub fn game_id(&self) -> &GameId {
        &self.game_id
    }

    /// Whether the actor task has exited.
    pub(crate) fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    fn unavailable(&self) -> SessionError {
        SessionError::Unavailable(self.game_id.clone())
    }

    async fn request<T>(
        &self,
        cmd: SessionCommand,
        rx: oneshot::Receiver<T>,
    ) -> Result<T, SessionError> {
        self.sender
            .send(cmd)
            .await
            .map_err(|_| self.unavailable())?;
        rx.await.map_err(|_| self.unavailable())
    }

    /// Subscribes a connection, binding it as player or spectator.
    pub async fn subscribe(
        &self,
        conn: ConnectionId,
        user: UserId,
        sender: SubscriberSender,
    ) -> Result<Subscription, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.request(
            SessionCommand::Subscribe {
                conn,
                user,
                sender,
                reply: tx,
            },
            rx,
        )
        .await?
    }

    /// Deliberate unsubscribe (client sent `Leave`).
    pub async fn unsubscribe(
        &self,
        conn: ConnectionId,
    ) -> Result<(), SessionError> {
        let (tx, rx) = oneshot::channel();
        self.request(SessionCommand::Unsubscribe { conn, reply: tx }, rx)
            .await?
    }

    /// Transport-level disconnect. Best effort.
    pub async fn disconnect(&self, conn: ConnectionId) {
        let _ = self.sender.send(SessionCommand::Disconnect { conn }).await;
    }

    pub async fn submit_move(
        &self,
        user: UserId,
        intent: MoveIntent,
    ) -> Result<(), SessionError> {
        let (tx, rx) = oneshot::channel();
        self.request(
            SessionCommand::SubmitMove {
                user,
                intent,
                reply: tx,
            },
            rx,
        )
        .await?
    }

    pub async fn offer_draw(&self, user: UserId) -> Result<(), SessionError> {
        let (tx, rx) = oneshot::channel();
        self.request(SessionCommand::OfferDraw { user, reply: tx }, rx)
            .await?
    }

    pub async fn accept_draw(&self, user: UserId) -> Result<(), SessionError> {
        let (tx, rx) = oneshot::channel();
        self.request(SessionCommand::AcceptDraw { user, reply: tx }, rx)
            .await?
    }

    pub async fn decline_draw(
        &self,
        user: UserId,
    ) -> Result<(), SessionError> {
        let (tx, rx) = oneshot::channel();
        self.request(SessionCommand::DeclineDraw { user, reply: tx }, rx)
            .await?
    }

    pub async fn resign(&self, user: UserId) -> Result<(), SessionError> {
        let (tx, rx) = oneshot::channel();
        self.request(SessionCommand::Resign { user, reply: tx }, rx)
            .await?
    }

    pub async fn info(&self) -> Result<SessionInfo, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.request(SessionCommand::Info { reply: tx }, rx).await
    }

    /// Tells the session to shut down. Non-terminal sessions abort and
    /// attempt a final checkpoint before the actor exits.
    pub async fn shutdown(&self) {
        let _ = self.sender.send(SessionCommand::Shutdown).await;
    }
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

struct Subscriber {
    user: UserId,
    role: Role,
    sender: SubscriberSender,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CheckpointState {
    /// No terminal checkpoint required yet.
    Clean,
    /// Terminal checkpoint task running; eviction must wait.
    InFlight,
    /// Terminal checkpoint concluded (durably written, or escalated and
    /// abandoned).
    Settled,
}

fn color_index(color: Color) -> usize {
    match color {
        Color::White => 0,
        Color::Black => 1,
    }
}

pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Sleeps until `deadline`, or forever when there is none. The forever
/// case keeps the `select!` branch inert without special-casing.
async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

struct SessionActor<R: RulesOracle, S: GameStore> {
    game_id: GameId,
    oracle: Arc<R>,
    store: S,
    config: SessionConfig,

    position: Position,
    history: Vec<MoveRecord>,
    status: GameStatus,
    white: Option<UserId>,
    black: Option<UserId>,
    outcome: Option<GameOutcome>,
    pending_draw: Option<Color>,
    created_at_ms: u64,
    updated_at_ms: u64,

    subscribers: HashMap<ConnectionId, Subscriber>,
    clock: Option<ChessClock>,
    /// Grace deadlines for disconnected players, indexed by color.
    grace: [Option<Instant>; 2],
    checkpoint: CheckpointState,
    last_activity: Instant,

    receiver: mpsc::Receiver<SessionCommand>,
    /// For the terminal checkpoint task to report settlement. Weak so the
    /// actor doesn't hold its own channel open after all handles drop.
    self_tx: mpsc::WeakSender<SessionCommand>,
}

impl<R: RulesOracle, S: GameStore> SessionActor<R, S> {
    async fn run(mut self) {
        info!(
            game_id = %self.game_id,
            status = ?self.status,
            moves = self.history.len(),
            "session started"
        );

        loop {
            let grace_deadline = self.grace.iter().flatten().copied().min();
            let clock_deadline = match self.status {
                GameStatus::Active => {
                    self.clock.as_ref().and_then(|c| c.deadline())
                }
                _ => None,
            };

            tokio::select! {
                cmd = self.receiver.recv() => match cmd {
                    Some(SessionCommand::Shutdown) => {
                        self.handle_shutdown().await;
                        break;
                    }
                    Some(cmd) => self.handle_command(cmd),
                    // All handles dropped.
                    None => break,
                },
                _ = sleep_until_opt(grace_deadline) => self.on_grace_expired(),
                _ = sleep_until_opt(clock_deadline) => self.on_flag_fall(),
            }
        }

        info!(game_id = %self.game_id, status = ?self.status, "session stopped");
    }

    fn handle_command(&mut self, cmd: SessionCommand) {
        match cmd {
            SessionCommand::Subscribe {
                conn,
                user,
                sender,
                reply,
            } => {
                let result = self.handle_subscribe(conn, user, sender);
                let _ = reply.send(result);
            }
            SessionCommand::Unsubscribe { conn, reply } => {
                self.handle_remove(conn, ParticipantKind::Left);
                let _ = reply.send(Ok(()));
            }
            SessionCommand::Disconnect { conn } => {
                self.handle_remove(conn, ParticipantKind::Disconnected);
            }
            SessionCommand::SubmitMove {
                user,
                intent,
                reply,
            } => {
                let result = self.handle_submit_move(user, intent);
                let _ = reply.send(result);
            }
            SessionCommand::OfferDraw { user, reply } => {
                let _ = reply.send(self.handle_offer_draw(user));
            }
            SessionCommand::AcceptDraw { user, reply } => {
                let _ = reply.send(self.handle_accept_draw(user));
            }
            SessionCommand::DeclineDraw { user, reply } => {
                let _ = reply.send(self.handle_decline_draw(user));
            }
            SessionCommand::Resign { user, reply } => {
                let _ = reply.send(self.handle_resign(user));
            }
            SessionCommand::Info { reply } => {
                let _ = reply.send(self.info());
            }
            SessionCommand::CheckpointSettled => {
                self.checkpoint = CheckpointState::Settled;
            }
            // Handled in the loop.
            SessionCommand::Shutdown => {}
        }
    }

    // -- subscribe / leave --------------------------------------------------

    fn handle_subscribe(
        &mut self,
        conn: ConnectionId,
        user: UserId,
        sender: SubscriberSender,
    ) -> Result<Subscription, SessionError> {
        let role = self.assign_role(&user);

        // A bound player returning inside their grace window.
        let reconnected = match role.color() {
            Some(color) => self.grace[color_index(color)].take().is_some(),
            None => false,
        };

        self.subscribers.insert(
            conn,
            Subscriber {
                user: user.clone(),
                role,
                sender,
            },
        );
        self.touch();

        info!(
            game_id = %self.game_id,
            user_id = %user,
            %conn,
            ?role,
            reconnected,
            subscribers = self.subscribers.len(),
            "subscribed"
        );

        let kind = if reconnected {
            ParticipantKind::Reconnected
        } else {
            ParticipantKind::Joined
        };
        self.broadcast_except(
            conn,
            ServerEvent::Participant {
                game_id: self.game_id.clone(),
                user_id: user,
                role,
                kind,
            },
        );

        // Both colors bound while Waiting: the game begins.
        if self.status == GameStatus::Waiting
            && self.white.is_some()
            && self.black.is_some()
        {
            self.activate();
        }

        Ok(Subscription {
            role,
            snapshot: self.snapshot(),
        })
    }

    /// Matches a pre-assigned color, claims a vacant one while Waiting,
    /// or falls back to spectator.
    fn assign_role(&mut self, user: &UserId) -> Role {
        if self.white.as_ref() == Some(user) {
            return Role::Player {
                color: Color::White,
            };
        }
        if self.black.as_ref() == Some(user) {
            return Role::Player {
                color: Color::Black,
            };
        }
        if self.status == GameStatus::Waiting {
            if self.white.is_none() {
                self.white = Some(user.clone());
                return Role::Player {
                    color: Color::White,
                };
            }
            if self.black.is_none() {
                self.black = Some(user.clone());
                return Role::Player {
                    color: Color::Black,
                };
            }
        }
        Role::Spectator
    }

    fn activate(&mut self) {
        self.set_status(GameStatus::Active);
        if let Some(time_control) = self.config.clock {
            let mut clock = ChessClock::new(time_control);
            clock.start(self.side_to_move());
            self.clock = Some(clock);
        }
        info!(game_id = %self.game_id, "game started");
        self.broadcast_delta(None);
    }

    fn handle_remove(&mut self, conn: ConnectionId, kind: ParticipantKind) {
        // Idempotent: double-removal happens when a Leave races the
        // connection teardown.
        let Some(sub) = self.subscribers.remove(&conn) else {
            return;
        };
        self.touch();

        // The identity is still present through another connection.
        if self.subscribers.values().any(|s| s.user == sub.user) {
            return;
        }

        debug!(
            game_id = %self.game_id,
            user_id = %sub.user,
            ?kind,
            subscribers = self.subscribers.len(),
            "participant gone"
        );
        self.broadcast(ServerEvent::Participant {
            game_id: self.game_id.clone(),
            user_id: sub.user,
            role: sub.role,
            kind,
        });

        if let (Role::Player { color }, GameStatus::Active) =
            (sub.role, self.status)
        {
            match self.config.disconnect_policy {
                DisconnectPolicy::Forfeit => {
                    let deadline =
                        Instant::now() + self.config.reconnect_grace;
                    self.grace[color_index(color)] = Some(deadline);
                    info!(
                        game_id = %self.game_id,
                        %color,
                        grace_ms =
                            self.config.reconnect_grace.as_millis() as u64,
                        "grace window started"
                    );
                }
                DisconnectPolicy::LeaveOpen => {}
            }
        }
    }

    // -- gameplay -----------------------------------------------------------

    /// Mutations require an Active game and a bound player.
    fn require_player(&self, user: &UserId) -> Result<Color, SessionError> {
        if self.status.is_terminal() {
            return Err(SessionError::SessionClosed(self.game_id.clone()));
        }
        if self.status == GameStatus::Waiting {
            return Err(SessionError::TurnViolation(
                "game has not started".into(),
            ));
        }
        self.player_color(user).ok_or_else(|| {
            SessionError::TurnViolation(format!(
                "{user} is not a player in this game"
            ))
        })
    }

    fn player_color(&self, user: &UserId) -> Option<Color> {
        if self.white.as_ref() == Some(user) {
            Some(Color::White)
        } else if self.black.as_ref() == Some(user) {
            Some(Color::Black)
        } else {
            None
        }
    }

    fn side_to_move(&self) -> Color {
        Color::side_to_move(self.history.len())
    }

    fn handle_submit_move(
        &mut self,
        user: UserId,
        intent: MoveIntent,
    ) -> Result<(), SessionError> {
        let color = self.require_player(&user)?;
        let to_move = self.side_to_move();
        if color != to_move {
            return Err(SessionError::TurnViolation(format!(
                "it is {to_move}'s turn"
            )));
        }

        let move_outcome = self
            .oracle
            .legal_move(&self.position, &intent)
            .map_err(|e| match e {
                RulesError::IllegalMove(reason)
                | RulesError::InvalidPosition(reason) => {
                    SessionError::IllegalMove(reason)
                }
            })?;

        // From here the mutation is committed: offer cleared, record
        // appended, position adopted, then one delta for everyone.
        self.pending_draw = None;
        let record = MoveRecord {
            ply: self.history.len() as u32 + 1,
            color,
            intent,
            position: move_outcome.position.clone(),
        };
        self.position = move_outcome.position.clone();
        self.history.push(record.clone());
        self.touch();

        debug!(
            game_id = %self.game_id,
            ply = record.ply,
            %color,
            from = %record.intent.from,
            to = %record.intent.to,
            "move applied"
        );

        if let Some(result) = move_outcome.terminal_outcome(color) {
            self.finish(result, Some(record));
        } else {
            if let Some(clock) = &mut self.clock {
                clock.press();
            }
            self.broadcast_delta(Some(record));
            self.maybe_periodic_checkpoint();
        }
        Ok(())
    }

    fn handle_offer_draw(&mut self, user: UserId) -> Result<(), SessionError> {
        let color = self.require_player(&user)?;
        // Repeating your own standing offer is a no-op.
        if self.pending_draw == Some(color) {
            return Ok(());
        }
        self.pending_draw = Some(color);
        self.touch();
        info!(game_id = %self.game_id, by = %color, "draw offered");
        self.broadcast_draw(ServerEvent::DrawOffered {
            game_id: self.game_id.clone(),
            by: color,
        });
        Ok(())
    }

    fn handle_accept_draw(
        &mut self,
        user: UserId,
    ) -> Result<(), SessionError> {
        let color = self.require_player(&user)?;
        match self.pending_draw {
            Some(by) if by == color.opposite() => {
                info!(game_id = %self.game_id, "draw agreed");
                self.finish(
                    GameOutcome::draw(OutcomeReason::Agreement),
                    None,
                );
                Ok(())
            }
            _ => Err(SessionError::NoDrawOffer),
        }
    }

    fn handle_decline_draw(
        &mut self,
        user: UserId,
    ) -> Result<(), SessionError> {
        let color = self.require_player(&user)?;
        match self.pending_draw {
            Some(by) if by == color.opposite() => {
                self.pending_draw = None;
                self.touch();
                debug!(game_id = %self.game_id, by = %color, "draw declined");
                self.broadcast_draw(ServerEvent::DrawDeclined {
                    game_id: self.game_id.clone(),
                    by: color,
                });
                Ok(())
            }
            _ => Err(SessionError::NoDrawOffer),
        }
    }

    fn handle_resign(&mut self, user: UserId) -> Result<(), SessionError> {
        let color = self.require_player(&user)?;
        info!(game_id = %self.game_id, %color, "resignation");
        self.finish(
            GameOutcome::win(color.opposite(), OutcomeReason::Resignation),
            None,
        );
        Ok(())
    }

    // -- timers -------------------------------------------------------------

    fn on_grace_expired(&mut self) {
        let now = Instant::now();
        for color in [Color::White, Color::Black] {
            let slot = &mut self.grace[color_index(color)];
            if slot.is_some_and(|deadline| deadline <= now) {
                *slot = None;
                if self.status == GameStatus::Active {
                    warn!(
                        game_id = %self.game_id,
                        %color,
                        "grace window expired, forfeiting"
                    );
                    self.finish(
                        GameOutcome::win(
                            color.opposite(),
                            OutcomeReason::Abandonment,
                        ),
                        None,
                    );
                }
            }
        }
    }

    fn on_flag_fall(&mut self) {
        let Some(flagged) = self.clock.as_ref().and_then(|c| c.flagged())
        else {
            return;
        };
        if self.status != GameStatus::Active {
            return;
        }
        info!(game_id = %self.game_id, %flagged, "flag fell");
        self.finish(
            GameOutcome::win(flagged.opposite(), OutcomeReason::Timeout),
            None,
        );
    }

    // -- terminal transitions & checkpoints ---------------------------------

    fn finish(&mut self, result: GameOutcome, last_move: Option<MoveRecord>) {
        info!(game_id = %self.game_id, outcome = %result, "game finished");
        self.set_status(GameStatus::Finished);
        self.outcome = Some(result);
        self.pending_draw = None;
        self.grace = [None, None];
        if let Some(clock) = &mut self.clock {
            clock.stop();
        }
        self.touch();
        self.broadcast_delta(last_move);
        self.spawn_terminal_checkpoint();
    }

    async fn handle_shutdown(&mut self) {
        if self.status.is_terminal() {
            return;
        }
        info!(game_id = %self.game_id, "aborting session on shutdown");
        self.set_status(GameStatus::Aborted);
        self.pending_draw = None;
        self.grace = [None, None];
        if let Some(clock) = &mut self.clock {
            clock.stop();
        }
        self.touch();
        self.broadcast_delta(None);

        // Final checkpoint runs inline — the actor is exiting, so there
        // is no settlement round-trip to wait on.
        let snapshot = self.snapshot();
        if let Err(err) = checkpoint::save_with_retry(
            &self.store,
            &snapshot,
            &self.config.retry,
        )
        .await
        {
            error!(
                game_id = %self.game_id,
                error = %err,
                "final checkpoint lost after exhausting retries"
            );
        }
        self.checkpoint = CheckpointState::Settled;
    }

    fn spawn_terminal_checkpoint(&mut self) {
        self.checkpoint = CheckpointState::InFlight;
        let snapshot = self.snapshot();
        let store = self.store.clone();
        let policy = self.config.retry.clone();
        let notify = self.self_tx.clone();
        tokio::spawn(async move {
            if let Err(err) =
                checkpoint::save_with_retry(&store, &snapshot, &policy).await
            {
                // Operational alert: the result is lost to the store.
                // Settlement still proceeds so the session can be evicted.
                error!(
                    game_id = %snapshot.game_id,
                    error = %err,
                    "terminal checkpoint lost after exhausting retries"
                );
            }
            if let Some(tx) = notify.upgrade() {
                let _ = tx.send(SessionCommand::CheckpointSettled).await;
            }
        });
    }

    fn maybe_periodic_checkpoint(&self) {
        let every = self.config.checkpoint_every_moves;
        if every == 0 || self.history.len() as u32 % every != 0 {
            return;
        }
        debug!(
            game_id = %self.game_id,
            moves = self.history.len(),
            "periodic checkpoint"
        );
        let snapshot = self.snapshot();
        let store = self.store.clone();
        let policy = self.config.retry.clone();
        tokio::spawn(async move {
            if let Err(err) =
                checkpoint::save_with_retry(&store, &snapshot, &policy).await
            {
                warn!(
                    game_id = %snapshot.game_id,
                    error = %err,
                    "periodic checkpoint dropped after exhausting retries"
                );
            }
        });
    }

    // -- fan-out ------------------------------------------------------------

    fn broadcast(&self, event: ServerEvent) {
        for sub in self.subscribers.values() {
            let _ = sub.sender.send(event.clone());
        }
    }

    fn broadcast_except(&self, skip: ConnectionId, event: ServerEvent) {
        for (conn, sub) in &self.subscribers {
            if *conn != skip {
                let _ = sub.sender.send(event.clone());
            }
        }
    }

    fn broadcast_draw(&self, event: ServerEvent) {
        match self.config.draw_offer_visibility {
            DrawOfferVisibility::Everyone => self.broadcast(event),
            DrawOfferVisibility::PlayersOnly => {
                for sub in self.subscribers.values() {
                    if sub.role.is_player() {
                        let _ = sub.sender.send(event.clone());
                    }
                }
            }
        }
    }

    /// One canonical delta per accepted mutation, to every subscriber in
    /// mutation order.
    fn broadcast_delta(&self, last_move: Option<MoveRecord>) {
        let delta = StateDelta {
            position: self.position.clone(),
            last_move,
            status: self.status,
            turn: self.side_to_move(),
            history_len: self.history.len() as u32,
            outcome: self.outcome,
        };
        self.broadcast(ServerEvent::Delta {
            game_id: self.game_id.clone(),
            delta,
        });
    }

    // -- bookkeeping --------------------------------------------------------

    fn set_status(&mut self, next: GameStatus) {
        if !self.status.can_transition_to(next) {
            error!(
                game_id = %self.game_id,
                from = ?self.status,
                to = ?next,
                "refusing invalid status transition"
            );
            return;
        }
        self.status = next;
    }

    fn touch(&mut self) {
        self.last_activity = Instant::now();
        self.updated_at_ms = now_ms();
    }

    fn snapshot(&self) -> GameSnapshot {
        GameSnapshot {
            game_id: self.game_id.clone(),
            position: self.position.clone(),
            history: self.history.clone(),
            status: self.status,
            turn: self.side_to_move(),
            white: self.white.clone(),
            black: self.black.clone(),
            outcome: self.outcome,
            pending_draw: self.pending_draw,
            created_at_ms: self.created_at_ms,
            updated_at_ms: self.updated_at_ms,
        }
    }

    fn info(&self) -> SessionInfo {
        SessionInfo {
            game_id: self.game_id.clone(),
            status: self.status,
            subscribers: self.subscribers.len(),
            history_len: self.history.len(),
            checkpoint_settled: self.checkpoint != CheckpointState::InFlight,
            idle_for: self.last_activity.elapsed(),
        }
    }
}

/// Spawns a session actor from a snapshot (fresh or hydrated) and returns
/// a handle to it.
pub(crate) fn spawn_session<R: RulesOracle, S: GameStore>(
    snapshot: GameSnapshot,
    oracle: Arc<R>,
    store: S,
    config: SessionConfig,
) -> SessionHandle {
    let (tx, rx) = mpsc::channel(config.command_buffer.max(1));

    let checkpoint = if snapshot.status.is_terminal() {
        // A hydrated terminal snapshot is already durable.
        CheckpointState::Settled
    } else {
        CheckpointState::Clean
    };

    // Clock state isn't persisted; a hydrated Active game restarts its
    // time control from scratch for the side to move.
    let clock = match (snapshot.status, config.clock) {
        (GameStatus::Active, Some(time_control)) => {
            let mut clock = ChessClock::new(time_control);
            clock.start(Color::side_to_move(snapshot.history.len()));
            Some(clock)
        }
        _ => None,
    };

    let actor = SessionActor {
        game_id: snapshot.game_id.clone(),
        oracle,
        store,
        config,
        position: snapshot.position,
        history: snapshot.history,
        status: snapshot.status,
        white: snapshot.white,
        black: snapshot.black,
        outcome: snapshot.outcome,
        pending_draw: snapshot.pending_draw,
        created_at_ms: snapshot.created_at_ms,
        updated_at_ms: snapshot.updated_at_ms,
        subscribers: HashMap::new(),
        clock,
        grace: [None, None],
        checkpoint,
        last_activity: Instant::now(),
        receiver: rx,
        self_tx: tx.downgrade(),
    };

    tokio::spawn(actor.run());

    SessionHandle {
        game_id: snapshot.game_id,
        sender: tx,
    }
}
