//! Error taxonomy for the synchronization server.
//!
//! Every error is scoped to one request, connection, or room; none of them
//! terminates the process. HTTP handlers return [`SyncError`] directly and
//! rely on the `IntoResponse` impl for status mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use uuid::Uuid;

use crate::services::room::RoomId;

/// Grepable error code and retryable flag for structured error bodies.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("room limit reached (max {max_rooms})")]
    ResourceExhausted { max_rooms: usize },
    #[error("room not found: {0}")]
    NotFound(RoomId),
    #[error("room closed: {0}")]
    RoomClosed(RoomId),
    #[error("invalid room id: {0:?}")]
    InvalidRoomId(String),
    #[error("missing or invalid shared secret")]
    Unauthorized,
    #[error("origin not allowed: {0}")]
    Forbidden(String),
    #[error("malformed message: {0}")]
    MalformedMessage(String),
    #[error("connection {0} is not a member of the room")]
    NotMember(Uuid),
}

impl ErrorCode for SyncError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::ResourceExhausted { .. } => "E_RESOURCE_EXHAUSTED",
            Self::NotFound(_) => "E_ROOM_NOT_FOUND",
            Self::RoomClosed(_) => "E_ROOM_CLOSED",
            Self::InvalidRoomId(_) => "E_INVALID_ROOM_ID",
            Self::Unauthorized => "E_UNAUTHORIZED",
            Self::Forbidden(_) => "E_FORBIDDEN",
            Self::MalformedMessage(_) => "E_MALFORMED_MESSAGE",
            Self::NotMember(_) => "E_NOT_MEMBER",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::ResourceExhausted { .. } | Self::RoomClosed(_))
    }
}

impl SyncError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::ResourceExhausted { .. } | Self::RoomClosed(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidRoomId(_) | Self::MalformedMessage(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotMember(_) => StatusCode::CONFLICT,
        }
    }
}

impl From<actions::CodecError> for SyncError {
    fn from(err: actions::CodecError) -> Self {
        Self::MalformedMessage(err.to_string())
    }
}

impl IntoResponse for SyncError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "code": self.error_code(),
            "message": self.to_string(),
            "retryable": self.retryable(),
        });
        (self.status(), Json(body)).into_response()
    }
}
