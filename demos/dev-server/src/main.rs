//! A development Gambit server with a coordinate-checking rules oracle.
//!
//! The oracle validates square syntax and promotion letters but not
//! chess legality, so any client can drive full games through the
//! protocol without a rules library wired in. Games end by resignation,
//! draw agreement, or abandonment.
//!
//! Run with `RUST_LOG=gambit=debug cargo run -p dev-server`; connect to
//! `ws://127.0.0.1:8080` and handshake with any non-empty token, which
//! becomes the user id.

use gambit::prelude::*;
use gambit::AuthError;
use gambit_rules::{MoveOutcome, Position, RulesError};
use gambit_store::MemoryStore;
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// Rules oracle
// ---------------------------------------------------------------------------

/// Checks coordinates, not chess. Positions are the slash-joined move
/// list, so a stored game replays cleanly into the same oracle.
#[derive(Clone)]
struct DevRules;

fn valid_square(square: &str) -> bool {
    let mut chars = square.chars();
    matches!(
        (chars.next(), chars.next(), chars.next()),
        (Some('a'..='h'), Some('1'..='8'), None)
    )
}

impl RulesOracle for DevRules {
    fn initial_position(&self) -> Position {
        Position::new("start")
    }

    fn legal_move(
        &self,
        position: &Position,
        intent: &MoveIntent,
    ) -> Result<MoveOutcome, RulesError> {
        if !valid_square(&intent.from) || !valid_square(&intent.to) {
            return Err(RulesError::IllegalMove(format!(
                "{intent} is not algebraic coordinates"
            )));
        }
        if intent.from == intent.to {
            return Err(RulesError::IllegalMove(format!(
                "{intent} goes nowhere"
            )));
        }
        if let Some(piece) = intent.promotion {
            if !matches!(piece, 'q' | 'r' | 'b' | 'n') {
                return Err(RulesError::IllegalMove(format!(
                    "cannot promote to {piece}"
                )));
            }
        }
        Ok(MoveOutcome::ongoing(Position::new(format!(
            "{position}/{intent}"
        ))))
    }

    fn position_from_snapshot(
        &self,
        serialized: &str,
    ) -> Result<Position, RulesError> {
        if serialized.is_empty() {
            return Err(RulesError::InvalidPosition(
                "empty position".into(),
            ));
        }
        Ok(Position::new(serialized))
    }
}

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

/// Any non-empty token is accepted as the user id.
struct DevAuth;

impl Authenticator for DevAuth {
    async fn authenticate(&self, token: &str) -> Result<UserId, AuthError> {
        if token.is_empty() {
            return Err(AuthError("empty token".into()));
        }
        Ok(UserId::new(token))
    }
}

// ---------------------------------------------------------------------------
// Server bootstrap
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let addr = std::env::var("GAMBIT_ADDR")
        .unwrap_or_else(|_| "127.0.0.1:8080".into());

    let server = GambitServerBuilder::new()
        .bind(&addr)
        .build(DevRules, MemoryStore::new(), DevAuth)
        .await?;

    tracing::info!(%addr, "dev server listening");
    server.run().await?;
    Ok(())
}
