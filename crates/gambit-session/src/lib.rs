//! Authoritative game session engine for Gambit.
//!
//! The in-memory copy of a game is the single source of truth while the
//! game is live. This crate owns that copy:
//!
//! 1. **Session actor** ([`SessionHandle`]) — one Tokio task per game;
//!    every mutation (move, draw offer, resignation, timer) is applied in
//!    receipt order by that task. Turn order and game-over are enforced
//!    here.
//! 2. **Registry** ([`SessionRegistry`]) — at most one live actor per
//!    game id; hydrates from the durable store on first join, evicts on
//!    sweep.
//! 3. **Fan-out** — after each accepted mutation the actor pushes one
//!    canonical delta to every subscriber's channel; delivery happens in
//!    per-connection tasks so a slow client never stalls the game.
//! 4. **Checkpointing** — snapshots written every Nth half-move and on
//!    every terminal transition, with retry and backoff; eviction waits
//!    for the terminal write to settle.
//! 5. **Reconnection** — a dropped player keeps their color; the game
//!    stays live for a configurable grace window before the
//!    [`DisconnectPolicy`] applies.
//!
//! # How it fits in the stack
//!
//! ```text
//! Gateway (above)   ← translates wire events into handle calls
//!     ↕
//! Session Layer (this crate)  ← owns game state, turn order, fan-out
//!     ↕
//! Rules / Store (below)  ← RulesOracle legality, GameStore durability
//! ```

mod checkpoint;
mod config;
mod error;
mod registry;
mod session;

pub use config::{
    DisconnectPolicy, DrawOfferVisibility, RetryPolicy, SessionConfig,
};
pub use error::SessionError;
pub use registry::SessionRegistry;
pub use session::{
    SessionHandle, SessionInfo, SubscriberSender, Subscription,
};
