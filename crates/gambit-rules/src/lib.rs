//! Rules Oracle capability for Gambit.
//!
//! Gambit does not implement chess rules. Move legality, check detection,
//! and termination detection are delegated to an external capability — the
//! [`RulesOracle`] trait — so the session engine can be driven by a real
//! rules library in production and by a minimal scripted fake in tests.
//!
//! This crate defines:
//!
//! - **Domain types** ([`Color`], [`Position`], [`MoveIntent`],
//!   [`MoveOutcome`], [`GameOutcome`]) — the vocabulary shared by the
//!   session engine, the wire protocol, and the durable store.
//! - **The oracle trait** ([`RulesOracle`]) — legality and termination.
//! - **Errors** ([`RulesError`]) — why the oracle refused.

mod error;
mod oracle;
mod types;

pub use error::RulesError;
pub use oracle::RulesOracle;
pub use types::{
    Color, GameOutcome, MoveIntent, MoveOutcome, OutcomeReason, Position,
};
