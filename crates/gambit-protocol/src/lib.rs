//! Wire protocol for Gambit.
//!
//! This crate defines the "language" that clients and the game service
//! speak:
//!
//! - **Types** ([`ClientEvent`], [`ServerEvent`], [`GameSnapshot`],
//!   [`StateDelta`], etc.) — the message structures that travel on the
//!   wire.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]) — how those messages
//!   are converted to/from bytes.
//! - **Errors** ([`ProtocolError`]) — what can go wrong during
//!   encoding/decoding.
//!
//! # Architecture
//!
//! The protocol layer sits between transport (raw byte frames) and the
//! session engine (authoritative game state). It doesn't know about
//! connections or sessions — it only knows how to serialize and
//! deserialize messages.
//!
//! ```text
//! Transport (bytes) → Protocol (envelopes) → Session (game state)
//! ```
//!
//! # Request/reply correlation
//!
//! Every failable inbound event carries a client-chosen `seq`; the server
//! answers with a [`ServerEnvelope`] whose `reply_to` echoes that seq —
//! an ack, a join snapshot, or an error. Broadcast events (deltas,
//! participant updates) have no `reply_to`.

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{
    ClientEnvelope, ClientEvent, ErrorCode, GameId, GameSnapshot,
    GameStatus, MoveRecord, ParticipantKind, Role, ServerEnvelope,
    ServerEvent, StateDelta, UserId,
};
