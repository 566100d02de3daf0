//! Session engine configuration.

use std::time::Duration;

use gambit_clock::ClockConfig;
use rand::Rng;

/// What happens when a bound player's grace window expires without a
/// reconnection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectPolicy {
    /// The absent player forfeits; their opponent wins by abandonment.
    Forfeit,
    /// The session stays open indefinitely; the player can return at any
    /// point (correspondence-style play).
    LeaveOpen,
}

/// Who sees a pending draw offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawOfferVisibility {
    /// Only the two bound players.
    PlayersOnly,
    /// Players and spectators alike.
    Everyone,
}

/// Tuning knobs for one session (shared by all sessions of a registry).
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Checkpoint the snapshot after every Nth accepted half-move.
    /// 0 disables periodic checkpoints (terminal checkpoints still run).
    pub checkpoint_every_moves: u32,
    /// How long a disconnected player has to return before
    /// `disconnect_policy` applies.
    pub reconnect_grace: Duration,
    pub disconnect_policy: DisconnectPolicy,
    pub draw_offer_visibility: DrawOfferVisibility,
    /// A non-active session with no subscribers is evicted after sitting
    /// idle this long.
    pub idle_timeout: Duration,
    /// Retry schedule for checkpoint writes.
    pub retry: RetryPolicy,
    /// Time control; `None` plays without clocks.
    pub clock: Option<ClockConfig>,
    /// Command channel capacity of the session actor.
    pub command_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            checkpoint_every_moves: 5,
            reconnect_grace: Duration::from_secs(30),
            disconnect_policy: DisconnectPolicy::Forfeit,
            draw_offer_visibility: DrawOfferVisibility::Everyone,
            idle_timeout: Duration::from_secs(10 * 60),
            retry: RetryPolicy::default(),
            clock: None,
            command_buffer: 64,
        }
    }
}

/// Bounded exponential backoff with random jitter.
///
/// Jitter desynchronizes retries from many sessions hitting a recovering
/// store at the same instant.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles each retry.
    pub base_backoff: Duration,
    /// Cap on the doubled delay.
    pub max_backoff: Duration,
    /// Uniform random 0..=jitter added to each delay.
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
            jitter: Duration::from_millis(50),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based count of failures so
    /// far), jitter included.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let base = self
            .base_backoff
            .saturating_mul(1u32 << exp)
            .min(self.max_backoff);
        let jitter_ms = self.jitter.as_millis() as u64;
        if jitter_ms == 0 {
            base
        } else {
            base + Duration::from_millis(rand::rng().random_range(0..=jitter_ms))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(400),
            jitter: Duration::ZERO,
        };
        assert_eq!(policy.backoff_for(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(400));
        // Capped from here on.
        assert_eq!(policy.backoff_for(4), Duration::from_millis(400));
        assert_eq!(policy.backoff_for(9), Duration::from_millis(400));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(1),
            jitter: Duration::from_millis(50),
        };
        for _ in 0..100 {
            let d = policy.backoff_for(1);
            assert!(d >= Duration::from_millis(100));
            assert!(d <= Duration::from_millis(150));
        }
    }

    #[test]
    fn default_config_matches_documented_values() {
        let config = SessionConfig::default();
        assert_eq!(config.checkpoint_every_moves, 5);
        assert_eq!(config.disconnect_policy, DisconnectPolicy::Forfeit);
        assert!(config.clock.is_none());
    }
}
