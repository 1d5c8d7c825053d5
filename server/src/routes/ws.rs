//! WebSocket handler: per-room action relay.
//!
//! DESIGN
//! ======
//! On upgrade, generates a connection ID, joins the room actor, and enters a
//! `select!` loop:
//! - Incoming client text → validate as an action → publish the text to the room
//! - Text broadcast by the room → forward to the client as received
//! - Server shutdown → close 1001
//!
//! `process_inbound_text` holds the per-message logic and never touches the
//! socket, so it can be tested against a bare `RoomHandle`.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade (origin + shared secret checked before the 101)
//! 2. Join → send `history` with the room log, if any
//! 3. Relay until close, error, idle timeout, eviction by the room, or shutdown
//! 4. Leave

use std::collections::HashMap;
use std::time::Duration;

use actions::ActionKind;
use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket, WebSocketUpgrade, close_code};
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::http::header::{AUTHORIZATION, ORIGIN};
use axum::response::{IntoResponse, Response};
use sha2::{Digest, Sha256};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::error::SyncError;
use crate::services::room::{ConnectionId, MemberSender, RelayedAction, RoomHandle, RoomId, history_message};
use crate::state::AppState;

// =============================================================================
// OUTCOME
// =============================================================================

/// What happened to one inbound text message.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum InboundOutcome {
    /// Accepted by the room and fanned out to `delivered` peers.
    Published { kind: ActionKind, delivered: usize },
    /// Malformed, rejected, or otherwise discarded; connection stays open.
    Dropped,
    /// Exceeds `MAX_MESSAGE_BYTES`; connection must close with 1009.
    TooLarge,
    /// The room no longer counts this connection as a member; close with 1001.
    Evicted,
}

enum Inbound {
    Message(Message),
    Closed,
    IdleTimeout,
}

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_ws(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let room_id = match RoomId::parse(&room_id) {
        Ok(room_id) => room_id,
        Err(e) => return e.into_response(),
    };

    if let Err(e) = authorize(&state.config, &headers, &params) {
        warn!(%room_id, error = %e, "ws: upgrade refused");
        return e.into_response();
    }

    ws.on_upgrade(move |socket| run_ws(socket, state, room_id))
}

/// Check the `Origin` header and, when configured, the shared secret.
pub(crate) fn authorize(
    config: &ServerConfig,
    headers: &HeaderMap,
    params: &HashMap<String, String>,
) -> Result<(), SyncError> {
    match headers.get(ORIGIN) {
        Some(origin) => {
            let origin = origin
                .to_str()
                .map_err(|_| SyncError::Forbidden("<non-ascii origin>".into()))?;
            if !config.origin_allowed(origin) {
                return Err(SyncError::Forbidden(origin.to_owned()));
            }
        }
        None if !config.allow_missing_origin => return Err(SyncError::Forbidden("<missing origin>".into())),
        None => {}
    }

    let Some(secret) = config.shared_secret.as_deref() else {
        return Ok(());
    };
    let presented = params
        .get("token")
        .map(String::as_str)
        .or_else(|| bearer_token(headers))
        .ok_or(SyncError::Unauthorized)?;
    if Sha256::digest(presented.as_bytes()) == Sha256::digest(secret.as_bytes()) {
        Ok(())
    } else {
        Err(SyncError::Unauthorized)
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(mut socket: WebSocket, state: AppState, room_id: RoomId) {
    let conn_id = Uuid::new_v4();

    // Per-connection queue for actions broadcast by the room.
    let (member_tx, mut member_rx) = mpsc::channel::<RelayedAction>(state.config.outbound_queue_capacity);

    let (room, history) = match join_room(&state, &room_id, conn_id, member_tx).await {
        Ok(joined) => joined,
        Err(e) => {
            warn!(%room_id, %conn_id, error = %e, "ws: join failed");
            close_with(&mut socket, close_code::AGAIN, "room unavailable").await;
            return;
        }
    };

    info!(%room_id, %conn_id, replay = history.len(), "ws: client connected");

    let send_timeout = state.config.broadcast_send_timeout;
    if !history.is_empty() && send_text(&mut socket, history_message(&history).into(), send_timeout).await.is_err() {
        room.leave(conn_id).await;
        return;
    }

    let mut shutdown = state.subscribe_shutdown();
    let idle_timeout = state.config.idle_timeout;
    let mut idle_deadline = idle_timeout.map(|window| Instant::now() + window);
    let max_bytes = state.config.max_message_bytes;

    loop {
        if *shutdown.borrow_and_update() {
            close_with(&mut socket, close_code::AWAY, "server shutting down").await;
            break;
        }

        tokio::select! {
            inbound = next_message(&mut socket, idle_deadline) => match inbound {
                Inbound::Message(Message::Text(text)) => {
                    idle_deadline = idle_timeout.map(|window| Instant::now() + window);
                    match process_inbound_text(&room, conn_id, max_bytes, text).await {
                        InboundOutcome::TooLarge => {
                            close_with(&mut socket, close_code::SIZE, "message too large").await;
                            break;
                        }
                        InboundOutcome::Evicted => {
                            warn!(%room_id, %conn_id, "ws: evicted by room");
                            close_with(&mut socket, close_code::AWAY, "too slow").await;
                            break;
                        }
                        InboundOutcome::Published { .. } | InboundOutcome::Dropped => {}
                    }
                }
                Inbound::Message(Message::Binary(bytes)) => {
                    idle_deadline = idle_timeout.map(|window| Instant::now() + window);
                    debug!(%conn_id, len = bytes.len(), "ws: ignoring binary message");
                }
                Inbound::Message(Message::Close(_)) | Inbound::Closed => break,
                Inbound::Message(_) => {}
                Inbound::IdleTimeout => {
                    info!(%room_id, %conn_id, "ws: idle timeout");
                    close_with(&mut socket, close_code::AWAY, "idle timeout").await;
                    break;
                }
            },
            action = member_rx.recv() => {
                let Some(action) = action else {
                    // The room removed us (queue overflow); there is nothing to resume.
                    warn!(%room_id, %conn_id, "ws: dropped by room");
                    close_with(&mut socket, close_code::AWAY, "too slow").await;
                    break;
                };
                debug!(%conn_id, kind = %action.kind(), "ws: forward action");
                if send_text(&mut socket, action.text().clone(), send_timeout).await.is_err() {
                    break;
                }
            }
            _ = shutdown.changed() => {}
        }
    }

    room.leave(conn_id).await;
    info!(%room_id, %conn_id, "ws: client disconnected");
}

/// Ensure the room exists and join it. A room retired between lookup and
/// join is recreated once.
async fn join_room(
    state: &AppState,
    room_id: &RoomId,
    conn_id: ConnectionId,
    member_tx: MemberSender,
) -> Result<(RoomHandle, Vec<RelayedAction>), SyncError> {
    let room = state.rooms.ensure_room(room_id).await?;
    match room.join(conn_id, member_tx.clone()).await {
        Ok(history) => Ok((room, history)),
        Err(SyncError::RoomClosed(_)) => {
            let room = state.rooms.ensure_room(room_id).await?;
            let history = room.join(conn_id, member_tx).await?;
            Ok((room, history))
        }
        Err(e) => Err(e),
    }
}

/// Next frame from the client, or `IdleTimeout` once `deadline` passes.
/// Only inbound traffic moves the deadline.
async fn next_message(socket: &mut WebSocket, deadline: Option<Instant>) -> Inbound {
    let recv = async {
        match socket.recv().await {
            Some(Ok(msg)) => Inbound::Message(msg),
            Some(Err(e)) => {
                debug!(error = %e, "ws: receive error");
                Inbound::Closed
            }
            None => Inbound::Closed,
        }
    };
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, recv).await.unwrap_or(Inbound::IdleTimeout),
        None => recv.await,
    }
}

// =============================================================================
// INBOUND
// =============================================================================

/// Validate one text message and publish it, unchanged, to the room.
pub(crate) async fn process_inbound_text(
    room: &RoomHandle,
    conn_id: ConnectionId,
    max_bytes: usize,
    text: Utf8Bytes,
) -> InboundOutcome {
    let len = text.as_str().len();
    if len > max_bytes {
        warn!(%conn_id, len, max_bytes, "ws: message too large");
        return InboundOutcome::TooLarge;
    }

    let action = match RelayedAction::decode(text) {
        Ok(action) => action,
        Err(e) => {
            warn!(%conn_id, error = %e, "ws: dropping malformed message");
            return InboundOutcome::Dropped;
        }
    };

    let kind = action.kind();
    match room.publish(conn_id, action).await {
        Ok(delivery) => InboundOutcome::Published { kind, delivered: delivery.delivered },
        Err(SyncError::NotMember(_)) => {
            warn!(%conn_id, %kind, "ws: publish after eviction");
            InboundOutcome::Evicted
        }
        Err(e) => {
            warn!(%conn_id, %kind, error = %e, "ws: publish rejected");
            InboundOutcome::Dropped
        }
    }
}

// =============================================================================
// OUTBOUND
// =============================================================================

async fn send_text(socket: &mut WebSocket, text: Utf8Bytes, send_timeout: Duration) -> Result<(), ()> {
    match tokio::time::timeout(send_timeout, socket.send(Message::Text(text))).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            debug!(error = %e, "ws: send failed");
            Err(())
        }
        Err(_) => {
            warn!(timeout_ms = send_timeout.as_millis(), "ws: send timed out");
            Err(())
        }
    }
}

async fn close_with(socket: &mut WebSocket, code: u16, reason: &'static str) {
    let frame = CloseFrame { code, reason: Utf8Bytes::from_static(reason) };
    let _ = socket.send(Message::Close(Some(frame))).await;
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
