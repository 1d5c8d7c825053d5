//! Room registry: live rooms keyed by id, bounded by `MAX_ROOMS`.
//!
//! DESIGN
//! ======
//! The map holds one `RoomHandle` per live room behind an `RwLock`. Lookups
//! take the read lock; creation and removal take the write lock. Check-and-
//! insert happens under a single write guard, so two concurrent creates can
//! never both pass the capacity check.
//!
//! LIFECYCLE
//! =========
//! Rooms are created explicitly (`create_room`) or on first connect to an
//! unknown id (`ensure_room`). The idle sweep retires rooms that have had no
//! members for the configured TTL and removes their handles. A handle that
//! lost a race with the sweep reports `RoomClosed`; `ensure_room` replaces it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::SyncError;
use crate::services::room::{RoomHandle, RoomId};

#[derive(Clone)]
pub struct RoomRegistry {
    rooms: Arc<RwLock<HashMap<RoomId, RoomHandle>>>,
    max_rooms: usize,
    max_history: usize,
}

impl RoomRegistry {
    #[must_use]
    pub fn new(max_rooms: usize, max_history: usize) -> Self {
        Self { rooms: Arc::new(RwLock::new(HashMap::new())), max_rooms, max_history }
    }

    /// Allocate a fresh room with a generated id.
    ///
    /// # Errors
    ///
    /// Returns `ResourceExhausted` when `MAX_ROOMS` rooms are live.
    pub async fn create_room(&self) -> Result<RoomId, SyncError> {
        let mut rooms = self.rooms.write().await;
        if rooms.len() >= self.max_rooms {
            warn!(max_rooms = self.max_rooms, "registry: room limit reached");
            return Err(SyncError::ResourceExhausted { max_rooms: self.max_rooms });
        }
        let mut room_id = RoomId::generate();
        while rooms.contains_key(&room_id) {
            room_id = RoomId::generate();
        }
        rooms.insert(room_id.clone(), RoomHandle::spawn(room_id.clone(), self.max_history));
        info!(%room_id, live = rooms.len(), "registry: room created");
        Ok(room_id)
    }

    /// Look up a live room.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for unknown ids.
    pub async fn get_room(&self, room_id: &RoomId) -> Result<RoomHandle, SyncError> {
        self.rooms
            .read()
            .await
            .get(room_id)
            .filter(|handle| !handle.is_closed())
            .cloned()
            .ok_or_else(|| SyncError::NotFound(room_id.clone()))
    }

    /// Return the room for `room_id`, creating it when absent or retired.
    ///
    /// # Errors
    ///
    /// Returns `ResourceExhausted` when a new room is needed but the limit is reached.
    pub async fn ensure_room(&self, room_id: &RoomId) -> Result<RoomHandle, SyncError> {
        if let Ok(handle) = self.get_room(room_id).await {
            return Ok(handle);
        }

        let mut rooms = self.rooms.write().await;
        if let Some(handle) = rooms.get(room_id) {
            if !handle.is_closed() {
                return Ok(handle.clone());
            }
            rooms.remove(room_id);
        }
        if rooms.len() >= self.max_rooms {
            warn!(%room_id, max_rooms = self.max_rooms, "registry: room limit reached");
            return Err(SyncError::ResourceExhausted { max_rooms: self.max_rooms });
        }
        let handle = RoomHandle::spawn(room_id.clone(), self.max_history);
        rooms.insert(room_id.clone(), handle.clone());
        info!(%room_id, live = rooms.len(), "registry: room created on connect");
        Ok(handle)
    }

    pub async fn len(&self) -> usize {
        self.rooms.read().await.len()
    }

    /// Retire every room that has been empty for at least `ttl`.
    /// Returns the ids removed from the map.
    pub async fn sweep_idle(&self, ttl: Duration) -> Vec<RoomId> {
        let snapshot: Vec<RoomHandle> = self.rooms.read().await.values().cloned().collect();

        let mut retired = Vec::new();
        for handle in snapshot {
            if handle.try_retire(ttl).await {
                retired.push(handle);
            }
        }
        if retired.is_empty() {
            return Vec::new();
        }

        let mut rooms = self.rooms.write().await;
        let mut removed = Vec::with_capacity(retired.len());
        for handle in retired {
            // Only remove the exact actor we retired; `ensure_room` may have replaced it.
            if rooms.get(handle.id()).is_some_and(|current| current.same_room(&handle)) {
                rooms.remove(handle.id());
                info!(room_id = %handle.id(), "registry: idle room retired");
                removed.push(handle.id().clone());
            }
        }
        removed
    }
}

#[cfg(test)]
#[path = "registry_test.rs"]
mod tests;
