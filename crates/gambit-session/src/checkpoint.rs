//! Checkpoint writes with retry.
//!
//! Two call sites, one routine:
//!
//! - **Periodic** checkpoints (every Nth half-move) run fire-and-forget in
//!   a spawned task. Exhausted retries are logged at `warn` and forgotten;
//!   the next cadence checkpoint carries a superset of the lost data.
//! - **Terminal** checkpoints (game over, session aborted) also run in a
//!   spawned task, but the actor tracks their settlement and the registry
//!   refuses to evict until they settle. Exhausted retries here are
//!   escalated at `error` as an operational alert, and eviction proceeds
//!   anyway — the session result is lost to the store but the process
//!   keeps its memory bounded.

use gambit_protocol::GameSnapshot;
use gambit_store::{GameStore, StoreError};
use tokio::time;
use tracing::{debug, warn};

use crate::RetryPolicy;

/// Writes `snapshot`, retrying per `policy`. Returns the last error when
/// the attempt budget is exhausted.
pub(crate) async fn save_with_retry<S: GameStore>(
    store: &S,
    snapshot: &GameSnapshot,
    policy: &RetryPolicy,
) -> Result<(), StoreError> {
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match store.save(snapshot).await {
            Ok(()) => {
                if attempt > 1 {
                    debug!(
                        game_id = %snapshot.game_id,
                        attempt,
                        "checkpoint succeeded after retry"
                    );
                }
                return Ok(());
            }
            Err(error) if attempt >= attempts => return Err(error),
            Err(error) => {
                let backoff = policy.backoff_for(attempt);
                warn!(
                    game_id = %snapshot.game_id,
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    %error,
                    "checkpoint write failed, retrying"
                );
                time::sleep(backoff).await;
            }
        }
    }
}
