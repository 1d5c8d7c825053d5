//! Room allocation and inspection routes.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::Serialize;
use tracing::warn;

use crate::error::SyncError;
use crate::services::room::{RoomId, RoomStats, epoch_ms};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct CreateRoomResponse {
    pub room_id: RoomId,
}

#[derive(Debug, Serialize)]
pub struct RoomStatsResponse {
    pub room_id: RoomId,
    pub members: usize,
    pub history_len: usize,
    /// Milliseconds since the Unix epoch.
    pub created_at: i64,
    /// Seconds since the last member left; absent while occupied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idle_secs: Option<u64>,
}

impl From<RoomStats> for RoomStatsResponse {
    fn from(stats: RoomStats) -> Self {
        Self {
            room_id: stats.room_id,
            members: stats.members,
            history_len: stats.history_len,
            created_at: epoch_ms(stats.created_at),
            idle_secs: stats.idle_for.map(|d| d.as_secs()),
        }
    }
}

/// `POST /rooms`: allocate a fresh room.
pub async fn create_room(State(state): State<AppState>) -> Result<(StatusCode, Json<CreateRoomResponse>), SyncError> {
    let room_id = state.rooms.create_room().await?;
    Ok((StatusCode::CREATED, Json(CreateRoomResponse { room_id })))
}

/// `GET /create-room`: deprecated alias kept for older clients.
pub async fn create_room_legacy(State(state): State<AppState>) -> Result<Json<CreateRoomResponse>, SyncError> {
    warn!("rooms: GET /create-room is deprecated; use POST /rooms");
    let room_id = state.rooms.create_room().await?;
    Ok(Json(CreateRoomResponse { room_id }))
}

/// `GET /rooms/{room_id}`: live stats for one room.
pub async fn get_room(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Result<Json<RoomStatsResponse>, SyncError> {
    let room_id = RoomId::parse(&room_id)?;
    let stats = state.rooms.get_room(&room_id).await?.stats().await?;
    Ok(Json(stats.into()))
}

#[cfg(test)]
#[path = "rooms_test.rs"]
mod tests;
