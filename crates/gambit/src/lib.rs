//! Gambit: an authoritative server for real-time multiplayer chess.
//!
//! The server owns every game. Clients connect over WebSocket, complete
//! a handshake, and join games by id; from then on every move, draw
//! offer, and resignation is validated server-side and the resulting
//! state is broadcast to everyone watching. Game state survives process
//! restarts through periodic and terminal checkpoints to a [`GameStore`].
//!
//! # Quick start
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use gambit::prelude::*;
//! use gambit_store::MemoryStore;
//!
//! # use gambit_protocol::UserId;
//! # use gambit_rules::{MoveIntent, MoveOutcome, Position, RulesError, RulesOracle};
//! # #[derive(Clone)]
//! # struct MyRules;
//! # impl RulesOracle for MyRules {
//! #     fn initial_position(&self) -> Position { Position::new("start") }
//! #     fn legal_move(
//! #         &self,
//! #         position: &Position,
//! #         intent: &MoveIntent,
//! #     ) -> Result<MoveOutcome, RulesError> {
//! #         let next = Position::new(format!("{position}/{intent}"));
//! #         Ok(MoveOutcome::ongoing(next))
//! #     }
//! #     fn position_from_snapshot(
//! #         &self,
//! #         encoded: &str,
//! #     ) -> Result<Position, RulesError> {
//! #         Ok(Position::new(encoded))
//! #     }
//! # }
//! # #[derive(Clone)]
//! # struct MyAuth;
//! # impl Authenticator for MyAuth {
//! #     fn authenticate(
//! #         &self,
//! #         token: &str,
//! #     ) -> impl Future<Output = Result<UserId, AuthError>> + Send {
//! #         let token = token.to_string();
//! #         async move { Ok(UserId::new(token)) }
//! #     }
//! # }
//! #[tokio::main]
//! async fn main() -> Result<(), GambitError> {
//!     let server = GambitServerBuilder::new()
//!         .bind("127.0.0.1:9000")
//!         .recv_timeout(Duration::from_secs(120))
//!         .build(MyRules, MemoryStore::new(), MyAuth)
//!         .await?;
//!     server.run().await
//! }
//! ```
//!
//! # Crate layout
//!
//! - [`gambit_protocol`] — wire types, envelope framing, codec
//! - [`gambit_rules`] — the [`RulesOracle`](gambit_rules::RulesOracle)
//!   seam for move legality
//! - [`gambit_session`] — per-game actors, the registry, checkpointing
//! - [`gambit_store`] — the [`GameStore`] persistence seam
//! - [`gambit_transport`] — WebSocket listener and connections
//! - [`gambit_clock`] — optional per-game chess clocks
//!
//! This crate adds the connection gateway on top: handshake and
//! authentication, request/reply correlation, and the per-connection
//! writer that serializes broadcasts and replies onto the socket.

mod auth;
mod error;
mod handler;
mod server;

pub use auth::{AuthError, Authenticator};
pub use error::GambitError;
pub use server::{GambitServer, GambitServerBuilder, PROTOCOL_VERSION};

pub use gambit_clock::ClockConfig;
pub use gambit_store::GameStore;

/// Commonly used types, re-exported for `use gambit::prelude::*`.
pub mod prelude {
    pub use crate::auth::{AuthError, Authenticator};
    pub use crate::error::GambitError;
    pub use crate::server::{GambitServer, GambitServerBuilder};

    pub use gambit_protocol::{
        ClientEnvelope, ClientEvent, GameId, GameSnapshot, GameStatus,
        Role, ServerEnvelope, ServerEvent, UserId,
    };
    pub use gambit_clock::ClockConfig;
    pub use gambit_rules::{Color, MoveIntent, RulesOracle};
    pub use gambit_session::{
        DisconnectPolicy, DrawOfferVisibility, SessionConfig,
    };
    pub use gambit_store::GameStore;
}
