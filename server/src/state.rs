//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor.
//! It holds the parsed config, the room registry, and a shutdown signal that
//! every websocket task and the sweep task subscribe to.

use std::sync::Arc;

use tokio::sync::watch;

use crate::config::ServerConfig;
use crate::services::registry::RoomRegistry;

/// Shared application state, injected into Axum handlers via State extractor.
/// Clone is required by Axum; all inner fields are Arc-wrapped or Clone.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub rooms: RoomRegistry,
    shutdown: Arc<watch::Sender<bool>>,
}

impl AppState {
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        let rooms = RoomRegistry::new(config.max_rooms, config.max_history_per_room);
        let (shutdown, _) = watch::channel(false);
        Self { config: Arc::new(config), rooms, shutdown: Arc::new(shutdown) }
    }

    /// Receiver that flips to `true` when the server begins shutting down.
    #[must_use]
    pub fn subscribe_shutdown(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    pub fn trigger_shutdown(&self) {
        self.shutdown.send_replace(true);
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================

#[cfg(test)]
pub mod test_helpers {
    use super::*;

    /// Create a test `AppState` with default config.
    #[must_use]
    pub fn test_app_state() -> AppState {
        AppState::new(ServerConfig::default())
    }

    /// Create a test `AppState` with a custom config.
    #[must_use]
    pub fn test_app_state_with(config: ServerConfig) -> AppState {
        AppState::new(config)
    }
}
