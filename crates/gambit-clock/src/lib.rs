//! Chess clock for Gambit sessions.
//!
//! Tracks remaining thinking time per side with an optional per-move
//! increment (Fischer timing). The clock is passive: it never spawns a
//! task or fires a callback. Instead it exposes the deadline at which the
//! running side's flag falls, and the session actor arms that deadline in
//! its `tokio::select!` loop:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         Some(cmd) = cmd_rx.recv() => { /* handle commands */ }
//!         _ = clock_deadline(clock.as_ref()) => {
//!             // the side to move ran out of time
//!         }
//!     }
//! }
//! ```
//!
//! Deadlines use [`tokio::time::Instant`], so tests can drive the clock
//! deterministically with `start_paused` and `time::advance`.

use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use gambit_rules::Color;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Time control for one game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockConfig {
    /// Thinking time each side starts with.
    pub initial: Duration,
    /// Added to a side's remaining time after each of their moves
    /// (Fischer increment). `Duration::ZERO` for sudden death.
    pub increment: Duration,
}

impl ClockConfig {
    /// Classic "N+M" shorthand: N minutes initial, M seconds increment.
    pub fn minutes_plus_seconds(minutes: u64, seconds: u64) -> Self {
        Self {
            initial: Duration::from_secs(minutes * 60),
            increment: Duration::from_secs(seconds),
        }
    }
}

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// A two-sided chess clock.
///
/// At most one side's clock runs at a time. The clock starts stopped;
/// [`ChessClock::start`] begins counting down for the given side, and
/// [`ChessClock::press`] banks the increment and hands the turn to the
/// opponent.
#[derive(Debug, Clone)]
pub struct ChessClock {
    remaining: [Duration; 2],
    increment: Duration,
    /// The side currently on the move and when their turn started.
    running: Option<(Color, Instant)>,
}

impl ChessClock {
    pub fn new(config: ClockConfig) -> Self {
        Self {
            remaining: [config.initial, config.initial],
            increment: config.increment,
            running: None,
        }
    }

    fn idx(color: Color) -> usize {
        match color {
            Color::White => 0,
            Color::Black => 1,
        }
    }

    /// Starts (or restarts) the countdown for `side`.
    ///
    /// If another side was running, its elapsed time is settled first.
    pub fn start(&mut self, side: Color) {
        self.settle();
        self.running = Some((side, Instant::now()));
        debug!(?side, remaining = ?self.remaining(side), "clock started");
    }

    /// The running side completes their move: elapsed time is deducted,
    /// the increment is banked, and the opponent's clock starts.
    ///
    /// No-op when the clock is stopped.
    pub fn press(&mut self) {
        let Some((side, _)) = self.running else {
            return;
        };
        self.settle();
        let i = Self::idx(side);
        self.remaining[i] = self.remaining[i].saturating_add(self.increment);
        self.running = Some((side.opposite(), Instant::now()));
    }

    /// Stops the countdown without switching sides. Elapsed time for the
    /// running side is deducted first. Called when the game ends.
    pub fn stop(&mut self) {
        self.settle();
        self.running = None;
    }

    /// Remaining time for `side`, accounting for an in-progress turn.
    pub fn remaining(&self, side: Color) -> Duration {
        let base = self.remaining[Self::idx(side)];
        match self.running {
            Some((running, since)) if running == side => {
                base.saturating_sub(since.elapsed())
            }
            _ => base,
        }
    }

    /// The side whose clock is counting down, if any.
    pub fn running_side(&self) -> Option<Color> {
        self.running.map(|(side, _)| side)
    }

    /// The instant at which the running side's flag falls.
    ///
    /// `None` when the clock is stopped — callers arm a never-completing
    /// branch in that case.
    pub fn deadline(&self) -> Option<Instant> {
        let (side, since) = self.running?;
        Some(since + self.remaining[Self::idx(side)])
    }

    /// Returns the side whose time has run out, if any.
    pub fn flagged(&self) -> Option<Color> {
        let (side, _) = self.running?;
        (self.remaining(side) == Duration::ZERO).then_some(side)
    }

    /// Deducts elapsed time from the running side and resets its turn
    /// start to now. Remaining time saturates at zero.
    fn settle(&mut self) {
        if let Some((side, since)) = self.running {
            let i = Self::idx(side);
            self.remaining[i] = self.remaining[i].saturating_sub(since.elapsed());
            self.running = Some((side, Instant::now()));
        }
    }
}
