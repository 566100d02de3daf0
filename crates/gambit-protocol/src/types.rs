//! Core protocol types for Gambit's wire format.
//!
//! This module defines every type that travels "on the wire" — the
//! structures that get serialized to bytes, sent over the network, and
//! deserialized on the other side — plus the session-lifecycle and
//! snapshot types they carry, which double as the durable checkpoint
//! format.

use std::fmt;

use gambit_rules::{Color, GameOutcome, MoveIntent, Position};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A unique identifier for a game session.
///
/// Game ids are minted by whatever created the game record (matchmaking,
/// a tournament bracket, an invite link) — the service itself only resolves
/// them. They are opaque strings so external id schemes pass through
/// unchanged.
///
/// `#[serde(transparent)]` serializes the id as a bare string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameId(pub String);

impl GameId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "game:{}", self.0)
    }
}

/// A unique identifier for an authenticated player or spectator.
///
/// Minted by the [`Authenticator`] during the handshake; opaque to the
/// rest of the stack. One identity may hold several live connections.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "user:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// GameStatus — the session lifecycle state machine
// ---------------------------------------------------------------------------

/// The lifecycle state of a game session.
///
/// Transitions are monotonic — a session never moves backwards:
///
/// ```text
/// Waiting ──→ Active ──→ Finished
///    │           │
///    └───────────┴─────→ Aborted
/// ```
///
/// - **Waiting**: fewer than two bound players; moves are rejected.
/// - **Active**: both colors bound, game in progress.
/// - **Finished**: terminal with a recorded [`GameOutcome`].
/// - **Aborted**: terminal without a result (e.g. abandoned before the
///   game ever started).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum GameStatus {
    Waiting,
    Active,
    Finished,
    Aborted,
}

impl GameStatus {
    /// Returns `true` once the session can never mutate again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Aborted)
    }

    /// Returns `true` while a game is actually being played.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    /// Returns `true` if transitioning to `target` preserves monotonicity.
    pub fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Waiting, Self::Active)
                | (Self::Waiting, Self::Aborted)
                | (Self::Active, Self::Finished)
                | (Self::Active, Self::Aborted)
        )
    }
}

impl fmt::Display for GameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Waiting => write!(f, "waiting"),
            Self::Active => write!(f, "active"),
            Self::Finished => write!(f, "finished"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

// ---------------------------------------------------------------------------
// Role — what a subscriber is to one session
// ---------------------------------------------------------------------------

/// A subscriber's role within one session.
///
/// An identity binds at most one color per session, but may spectate any
/// number of sessions concurrently.
///
/// `#[serde(tag = "type", ...)]` produces `{ "type": "player", "color":
/// "white" }` or `{ "type": "spectator" }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Role {
    /// Bound to a color; may submit moves for that color.
    Player { color: Color },
    /// Read-only viewer.
    Spectator,
}

impl Role {
    /// The bound color, if this role is a player.
    pub fn color(&self) -> Option<Color> {
        match self {
            Self::Player { color } => Some(*color),
            Self::Spectator => None,
        }
    }

    pub fn is_player(&self) -> bool {
        matches!(self, Self::Player { .. })
    }
}

// ---------------------------------------------------------------------------
// MoveRecord — one applied half-move
// ---------------------------------------------------------------------------

/// One accepted half-move, immutable once appended to a session's history.
///
/// The intent fields are flattened, so the JSON is flat:
/// `{ "ply": 1, "color": "white", "from": "e2", "to": "e4",
///    "position": "..." }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRecord {
    /// Half-move number, starting at 1.
    pub ply: u32,
    /// The color that played this move.
    pub color: Color,
    /// From/to/promotion as submitted.
    #[serde(flatten)]
    pub intent: MoveIntent,
    /// Canonical position after the move was applied.
    pub position: Position,
}

// ---------------------------------------------------------------------------
// GameSnapshot — the full-state / durable form of a session
// ---------------------------------------------------------------------------

/// A complete, self-contained copy of a session's state.
///
/// Serves two purposes with one representation:
/// - sent to a newly joining subscriber instead of a replay of deltas;
/// - written to the durable store by the checkpointer and read back when
///   the registry hydrates a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSnapshot {
    pub game_id: GameId,
    /// Canonical position (oracle-managed encoding).
    pub position: Position,
    /// Ordered, append-only move history from the initial position.
    pub history: Vec<MoveRecord>,
    pub status: GameStatus,
    /// The side to move.
    pub turn: Color,
    /// Bound players; `None` while a role is unclaimed (Waiting).
    pub white: Option<UserId>,
    pub black: Option<UserId>,
    /// Recorded result when `status` is Finished.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<GameOutcome>,
    /// A draw offer awaiting an answer, by offering color.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_draw: Option<Color>,
    /// Unix milliseconds.
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
}

impl GameSnapshot {
    /// A brand-new game at the starting position, waiting for players.
    pub fn fresh(game_id: GameId, position: Position, now_ms: u64) -> Self {
        Self {
            game_id,
            position,
            history: Vec::new(),
            status: GameStatus::Waiting,
            turn: Color::White,
            white: None,
            black: None,
            outcome: None,
            pending_draw: None,
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
        }
    }
}

// ---------------------------------------------------------------------------
// StateDelta — broadcast after every accepted mutation
// ---------------------------------------------------------------------------

/// The canonical per-mutation update fanned out to every subscriber.
///
/// Deltas are delivered in mutation order and to all current subscribers
/// or none — never a strict subset. A new joiner receives one
/// [`GameSnapshot`] instead of a replay of deltas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateDelta {
    pub position: Position,
    /// `None` for non-move mutations (activation, resignation, flag fall).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_move: Option<MoveRecord>,
    pub status: GameStatus,
    pub turn: Color,
    /// History length after this mutation — lets clients detect gaps.
    pub history_len: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<GameOutcome>,
}

// ---------------------------------------------------------------------------
// Participant updates
// ---------------------------------------------------------------------------

/// What happened to a participant in a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantKind {
    /// Subscribed for the first time.
    Joined,
    /// Unsubscribed deliberately.
    Left,
    /// Transport dropped; a bound player may return within the grace
    /// window.
    Disconnected,
    /// A previously disconnected player resubscribed.
    Reconnected,
}

// ---------------------------------------------------------------------------
// ClientEvent — inbound messages
// ---------------------------------------------------------------------------

/// Messages a client sends to the service.
///
/// `#[serde(tag = "type")]` produces internally tagged JSON:
/// `{ "type": "Join", "game_id": "g1" }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// First message on every connection. `token` is resolved to an
    /// identity before anything else is processed.
    Handshake { version: u32, token: String },

    /// Keep-alive; `client_time` is echoed back for RTT calculation.
    Heartbeat { client_time: u64 },

    /// Subscribe to a game — as a player when the identity matches (or
    /// claims) a color, otherwise as a spectator.
    Join { game_id: GameId },

    /// Submit a move for legality checking and application.
    Move {
        game_id: GameId,
        #[serde(rename = "move")]
        intent: MoveIntent,
    },

    /// Offer the opponent a draw.
    OfferDraw { game_id: GameId },

    /// Accept the opponent's pending draw offer.
    AcceptDraw { game_id: GameId },

    /// Decline the opponent's pending draw offer.
    DeclineDraw { game_id: GameId },

    /// Resign the game.
    Resign { game_id: GameId },

    /// Unsubscribe from a game without closing the connection.
    Leave { game_id: GameId },

    /// Clean shutdown with a human-readable reason.
    Disconnect { reason: String },
}

// ---------------------------------------------------------------------------
// ServerEvent — outbound messages
// ---------------------------------------------------------------------------

/// Machine-readable error categories, mirrored from the session error
/// taxonomy so clients can branch without parsing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Handshake refused — bad token or bad first message.
    Auth,
    /// Unknown game id.
    NotFound,
    /// Out-of-turn submission, or submission by a non-player.
    TurnViolation,
    /// The Rules Oracle refused the move.
    IllegalMove,
    /// Mutation attempted on a finished/aborted session.
    SessionClosed,
    /// Draw accept/decline with no offer pending.
    NoDrawOffer,
    /// Durable store failure surfaced to the client (hydration only —
    /// checkpoint failures are retried server-side).
    Persistence,
    /// The session actor is unreachable.
    Unavailable,
    /// Malformed or unexpected request.
    BadRequest,
}

/// Messages the service sends to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// Handshake accepted; the connection is now bound to `user_id`.
    HandshakeAck { user_id: UserId, server_time: u64 },

    /// Heartbeat echo with both timestamps for RTT/offset calculation.
    HeartbeatAck { client_time: u64, server_time: u64 },

    /// Reply to `Join`: the assigned role plus one full snapshot.
    Joined {
        game_id: GameId,
        role: Role,
        snapshot: GameSnapshot,
    },

    /// Broadcast after every accepted mutation.
    Delta { game_id: GameId, delta: StateDelta },

    /// Broadcast when someone joins/leaves/drops/returns.
    Participant {
        game_id: GameId,
        user_id: UserId,
        role: Role,
        kind: ParticipantKind,
    },

    /// A draw offer is pending; visibility is policy-controlled.
    DrawOffered { game_id: GameId, by: Color },

    /// A pending draw offer was declined.
    DrawDeclined { game_id: GameId, by: Color },

    /// Positive reply to a mutation that has no richer payload.
    Ack,

    /// Negative reply, delivered only to the originating connection.
    Error { code: ErrorCode, message: String },
}

// ---------------------------------------------------------------------------
// Envelopes — the top-level wire format
// ---------------------------------------------------------------------------

/// The top-level wrapper for every client→server message.
///
/// `seq` is chosen by the client (monotonically increasing) and echoed in
/// the correlated reply's `reply_to`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientEnvelope {
    pub seq: u64,
    pub event: ClientEvent,
}

/// The top-level wrapper for every server→client message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerEnvelope {
    /// Server-side sequence number; each connection gets its own ordered
    /// stream.
    pub seq: u64,
    /// The client `seq` this message answers, if it is a reply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<u64>,
    /// Milliseconds since the server started.
    pub timestamp: u64,
    pub event: ServerEvent,
}

// =========================================================================
// Tests
// =========================================================================
