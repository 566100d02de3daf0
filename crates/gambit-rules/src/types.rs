//! Chess domain types shared across the Gambit stack.
//!
//! These types travel on the wire and into the durable store, so their
//! serde representations are part of the protocol contract.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Color
// ---------------------------------------------------------------------------

/// The two sides of a chess game.
///
/// `#[serde(rename_all = "lowercase")]` gives `"white"` / `"black"` on the
/// wire, matching what client code expects.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    White,
    Black,
}

impl Color {
    /// Returns the opposing color.
    pub fn opposite(self) -> Self {
        match self {
            Self::White => Self::Black,
            Self::Black => Self::White,
        }
    }

    /// The side to move after `ply` half-moves from the initial position.
    /// White moves first, so even ply counts mean white to move.
    pub fn side_to_move(ply: usize) -> Self {
        if ply % 2 == 0 {
            Self::White
        } else {
            Self::Black
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::White => write!(f, "white"),
            Self::Black => write!(f, "black"),
        }
    }
}

// ---------------------------------------------------------------------------
// Position
// ---------------------------------------------------------------------------

/// The canonical board-state encoding.
///
/// The session engine treats positions as opaque strings — only the
/// [`RulesOracle`](crate::RulesOracle) interprets them. In practice this is
/// a FEN string, but nothing outside the oracle depends on that.
///
/// `#[serde(transparent)]` serializes the position as a bare string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Position(String);

impl Position {
    /// Wraps an oracle-produced encoding.
    pub fn new(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    /// The serialized encoding, as stored in checkpoints.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// MoveIntent
// ---------------------------------------------------------------------------

/// A move as submitted by a player, before legality checking.
///
/// Coordinates are algebraic squares (`"e2"`, `"e4"`); `promotion` is the
/// piece letter (`q`, `r`, `b`, `n`) when a pawn reaches the last rank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveIntent {
    pub from: String,
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promotion: Option<char>,
}

impl MoveIntent {
    /// Convenience constructor for plain (non-promotion) moves.
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            promotion: None,
        }
    }
}

impl fmt::Display for MoveIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.promotion {
            Some(p) => write!(f, "{}{}={}", self.from, self.to, p),
            None => write!(f, "{}{}", self.from, self.to),
        }
    }
}

// ---------------------------------------------------------------------------
// MoveOutcome
// ---------------------------------------------------------------------------

/// What the oracle reports for an accepted move: the resulting position
/// plus the termination flags the session engine needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveOutcome {
    /// The canonical position after the move is applied.
    pub position: Position,
    /// The opposing king is in check.
    pub is_check: bool,
    /// The opposing side is checkmated — the mover wins.
    pub is_checkmate: bool,
    /// The opposing side has no legal moves but is not in check.
    pub is_stalemate: bool,
    /// Drawn by rule (e.g. the fifty-move rule).
    pub is_draw: bool,
    /// Neither side can deliver mate.
    pub is_insufficient_material: bool,
    /// The same position occurred three times.
    pub is_threefold_repetition: bool,
}

impl MoveOutcome {
    /// An outcome with no termination flags set.
    pub fn ongoing(position: Position) -> Self {
        Self {
            position,
            is_check: false,
            is_checkmate: false,
            is_stalemate: false,
            is_draw: false,
            is_insufficient_material: false,
            is_threefold_repetition: false,
        }
    }

    /// Maps the termination flags to a game outcome, if the move ended
    /// the game. `mover` is the color that just played.
    ///
    /// Checkmate is checked first — a mating move may also set `is_check`,
    /// and some rule libraries set `is_draw` alongside the specific draw
    /// flags, so the more specific reasons win.
    pub fn terminal_outcome(&self, mover: Color) -> Option<GameOutcome> {
        if self.is_checkmate {
            Some(GameOutcome::win(mover, OutcomeReason::Checkmate))
        } else if self.is_stalemate {
            Some(GameOutcome::draw(OutcomeReason::Stalemate))
        } else if self.is_insufficient_material {
            Some(GameOutcome::draw(OutcomeReason::InsufficientMaterial))
        } else if self.is_threefold_repetition {
            Some(GameOutcome::draw(OutcomeReason::ThreefoldRepetition))
        } else if self.is_draw {
            Some(GameOutcome::draw(OutcomeReason::DrawRule))
        } else {
            None
        }
    }
}

// ---------------------------------------------------------------------------
// GameOutcome
// ---------------------------------------------------------------------------

/// Why a finished game ended the way it did.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeReason {
    Checkmate,
    Stalemate,
    InsufficientMaterial,
    ThreefoldRepetition,
    /// A draw by rule without a more specific flag (e.g. fifty moves).
    DrawRule,
    /// Players agreed to a draw.
    Agreement,
    Resignation,
    /// The losing side's clock ran out.
    Timeout,
    /// A player failed to return within the reconnection grace window.
    Abandonment,
}

impl fmt::Display for OutcomeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Checkmate => "checkmate",
            Self::Stalemate => "stalemate",
            Self::InsufficientMaterial => "insufficient material",
            Self::ThreefoldRepetition => "threefold repetition",
            Self::DrawRule => "draw rule",
            Self::Agreement => "agreement",
            Self::Resignation => "resignation",
            Self::Timeout => "timeout",
            Self::Abandonment => "abandonment",
        };
        f.write_str(s)
    }
}

/// The recorded result of a finished game.
///
/// `winner: None` means a draw. Displays as e.g. `"black wins by
/// resignation"` or `"draw by stalemate"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameOutcome {
    pub winner: Option<Color>,
    pub reason: OutcomeReason,
}

impl GameOutcome {
    /// A decisive result.
    pub fn win(winner: Color, reason: OutcomeReason) -> Self {
        Self {
            winner: Some(winner),
            reason,
        }
    }

    /// A drawn result.
    pub fn draw(reason: OutcomeReason) -> Self {
        Self {
            winner: None,
            reason,
        }
    }
}

impl fmt::Display for GameOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.winner {
            Some(color) => {
                write!(f, "{} wins by {}", color, self.reason)
            }
            None => write!(f, "draw by {}", self.reason),
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
