//! Idle-room sweep: background reclamation of empty rooms.
//!
//! Runs every `ROOM_SWEEP_INTERVAL_SECS` and retires rooms that have had no
//! members for `ROOM_IDLE_TTL_SECS`. Stops when shutdown is signalled.

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::state::AppState;

/// Spawn the background sweep task. Returns a handle for shutdown.
pub fn spawn_sweep_task(state: AppState) -> JoinHandle<()> {
    let interval = state.config.room_sweep_interval;
    let ttl = state.config.room_idle_ttl;
    info!(interval_secs = interval.as_secs(), ttl_secs = ttl.as_secs(), "idle room sweep configured");

    let mut shutdown = state.subscribe_shutdown();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = state.rooms.sweep_idle(ttl).await;
                    if removed.is_empty() {
                        debug!("sweep: nothing to retire");
                    } else {
                        let live = state.rooms.len().await;
                        info!(removed = removed.len(), live, "sweep: retired idle rooms");
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
        debug!("sweep: stopped");
    })
}

#[cfg(test)]
#[path = "sweep_test.rs"]
mod tests;
