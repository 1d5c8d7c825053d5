//! Room session: members and the bounded action log, owned by one actor.
//!
//! DESIGN
//! ======
//! Each room is owned by one actor task. `RoomHandle` methods enqueue a
//! `RoomCommand` on the actor's mpsc queue and await a oneshot reply, so all
//! join/publish/leave calls on a room are applied in arrival order by a
//! single writer. Log mutation and fan-out for one publish happen inside one
//! actor step: members never observe two actions out of server order.
//!
//! `RoomSession` holds the state and is plain synchronous code; the actor is a
//! thin loop around it.
//!
//! Actions are relayed as received. The room decodes each message once to
//! check it and learn its kind, then logs and fans out the client's original
//! text, so payload fields the server does not model reach peers and late
//! joiners untouched.
//!
//! TRADE-OFFS
//! ==========
//! Fan-out uses `try_send` into each member's bounded queue. A member whose
//! queue is full or closed is removed on the spot. There is no flow control
//! and no resend: a slow consumer loses its connection rather than stalling
//! the room.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use actions::{ActionKind, CodecError};
use axum::extract::ws::Utf8Bytes;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::SyncError;

const ROOM_COMMAND_QUEUE_CAPACITY: usize = 1024;
const MAX_ROOM_ID_LEN: usize = 128;

// =============================================================================
// TYPES
// =============================================================================

/// Server-side identity of one websocket connection.
pub type ConnectionId = Uuid;

/// Sender half of a member's outbound queue.
pub type MemberSender = mpsc::Sender<RelayedAction>;

/// A client action that passed validation, kept as the exact text received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayedAction {
    kind: ActionKind,
    text: Utf8Bytes,
}

impl RelayedAction {
    /// Validate `text` as an action and keep it verbatim.
    ///
    /// # Errors
    ///
    /// Returns the codec error when `text` is not a well-formed action.
    pub fn decode(text: Utf8Bytes) -> Result<Self, CodecError> {
        let kind = actions::decode_action(text.as_str())?.kind();
        Ok(Self { kind, text })
    }

    #[must_use]
    pub fn kind(&self) -> ActionKind {
        self.kind
    }

    #[must_use]
    pub fn text(&self) -> &Utf8Bytes {
        &self.text
    }
}

/// Build the `history` message for a late joiner by splicing each logged
/// entry's original text into the payload array.
#[must_use]
pub fn history_message(entries: &[RelayedAction]) -> String {
    let body: usize = entries.iter().map(|e| e.text.as_str().len() + 1).sum();
    let mut out = String::with_capacity(body + 32);
    out.push_str(r#"{"type":"history","payload":["#);
    for (i, entry) in entries.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(entry.text.as_str());
    }
    out.push_str("]}");
    out
}

/// Opaque room identifier. Generated rooms use a UUID v4 string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Validate an id taken from a request path.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRoomId` for empty, overlong, or non `[A-Za-z0-9_-]` ids.
    pub fn parse(raw: &str) -> Result<Self, SyncError> {
        let valid = !raw.is_empty()
            && raw.len() <= MAX_ROOM_ID_LEN
            && raw
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if valid { Ok(Self(raw.to_owned())) } else { Err(SyncError::InvalidRoomId(raw.to_owned())) }
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoomId {
    fn from(raw: &str) -> Self {
        Self(raw.to_owned())
    }
}

/// Result of fanning one action out to the room.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Members that accepted the action into their queue.
    pub delivered: usize,
    /// Members removed because their queue was full or closed.
    pub dropped: Vec<ConnectionId>,
}

/// Point-in-time view of a room.
#[derive(Debug, Clone)]
pub struct RoomStats {
    pub room_id: RoomId,
    pub members: usize,
    pub history_len: usize,
    pub created_at: SystemTime,
    /// How long the room has had no members; `None` while occupied.
    pub idle_for: Option<Duration>,
}

// =============================================================================
// SESSION STATE
// =============================================================================

/// Per-room state. Only ever touched by the room's actor.
pub struct RoomSession {
    id: RoomId,
    members: HashMap<ConnectionId, MemberSender>,
    log: VecDeque<RelayedAction>,
    max_history: usize,
    created_at: SystemTime,
    /// Set whenever the member set becomes empty.
    empty_since: Option<Instant>,
}

impl RoomSession {
    #[must_use]
    pub fn new(id: RoomId, max_history: usize) -> Self {
        Self {
            id,
            members: HashMap::new(),
            log: VecDeque::with_capacity(max_history.min(64)),
            max_history,
            created_at: SystemTime::now(),
            empty_since: Some(Instant::now()),
        }
    }

    /// Register a member and return the log, in order, for replay to it alone.
    pub fn join(&mut self, conn_id: ConnectionId, tx: MemberSender) -> Vec<RelayedAction> {
        self.members.insert(conn_id, tx);
        self.empty_since = None;
        self.log.iter().cloned().collect()
    }

    /// Apply `action` to the log and fan it out to every member except the sender.
    ///
    /// # Errors
    ///
    /// Returns `NotMember` if `from` has not joined (or was dropped), and
    /// `MalformedMessage` for `history`, which only the server may send.
    pub fn publish(&mut self, from: ConnectionId, action: RelayedAction) -> Result<Delivery, SyncError> {
        if !self.members.contains_key(&from) {
            return Err(SyncError::NotMember(from));
        }

        match action.kind {
            ActionKind::History => {
                return Err(SyncError::MalformedMessage("history is server-to-client only".into()));
            }
            ActionKind::Clear => self.log.clear(),
            kind if kind.is_logged() => self.append(action.clone()),
            _ => {}
        }

        Ok(self.broadcast(&action, Some(from)))
    }

    /// Remove a member. Returns false if it was not present.
    pub fn leave(&mut self, conn_id: ConnectionId) -> bool {
        let removed = self.members.remove(&conn_id).is_some();
        if removed && self.members.is_empty() {
            self.empty_since = Some(Instant::now());
        }
        removed
    }

    #[must_use]
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    #[must_use]
    pub fn stats(&self, now: Instant) -> RoomStats {
        RoomStats {
            room_id: self.id.clone(),
            members: self.members.len(),
            history_len: self.log.len(),
            created_at: self.created_at,
            idle_for: self.empty_since.map(|since| now.saturating_duration_since(since)),
        }
    }

    /// True when the room has had no members for at least `ttl`.
    #[must_use]
    pub fn is_idle_for(&self, ttl: Duration, now: Instant) -> bool {
        self.empty_since
            .is_some_and(|since| now.saturating_duration_since(since) >= ttl)
    }

    fn append(&mut self, action: RelayedAction) {
        if self.max_history == 0 {
            return;
        }
        self.log.push_back(action);
        while self.log.len() > self.max_history {
            self.log.pop_front();
        }
    }

    fn broadcast(&mut self, action: &RelayedAction, exclude: Option<ConnectionId>) -> Delivery {
        let mut delivery = Delivery::default();
        for (conn_id, tx) in &self.members {
            if exclude == Some(*conn_id) {
                continue;
            }
            match tx.try_send(action.clone()) {
                Ok(()) => delivery.delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(room_id = %self.id, %conn_id, "room: member queue full; dropping member");
                    delivery.dropped.push(*conn_id);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!(room_id = %self.id, %conn_id, "room: member queue closed; dropping member");
                    delivery.dropped.push(*conn_id);
                }
            }
        }
        for conn_id in &delivery.dropped {
            self.leave(*conn_id);
        }
        delivery
    }
}

// =============================================================================
// ACTOR
// =============================================================================

enum RoomCommand {
    Join { conn_id: ConnectionId, tx: MemberSender, reply: oneshot::Sender<Vec<RelayedAction>> },
    Publish { conn_id: ConnectionId, action: RelayedAction, reply: oneshot::Sender<Result<Delivery, SyncError>> },
    Leave { conn_id: ConnectionId },
    Stats { reply: oneshot::Sender<RoomStats> },
    Retire { ttl: Duration, reply: oneshot::Sender<bool> },
}

/// Cloneable address of a room actor.
#[derive(Clone)]
pub struct RoomHandle {
    id: RoomId,
    commands: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    /// Spawn the actor for a new, empty room.
    #[must_use]
    pub fn spawn(id: RoomId, max_history: usize) -> Self {
        let (commands, rx) = mpsc::channel(ROOM_COMMAND_QUEUE_CAPACITY);
        let session = RoomSession::new(id.clone(), max_history);
        tokio::spawn(run_room(session, rx));
        Self { id, commands }
    }

    #[must_use]
    pub fn id(&self) -> &RoomId {
        &self.id
    }

    /// True once the actor has stopped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    /// True if both handles address the same actor instance.
    #[must_use]
    pub fn same_room(&self, other: &Self) -> bool {
        self.commands.same_channel(&other.commands)
    }

    /// Join the room; returns the log to replay to this connection only.
    ///
    /// # Errors
    ///
    /// Returns `RoomClosed` if the actor has stopped.
    pub async fn join(&self, conn_id: ConnectionId, tx: MemberSender) -> Result<Vec<RelayedAction>, SyncError> {
        let (reply, rx) = oneshot::channel();
        self.send(RoomCommand::Join { conn_id, tx, reply }).await?;
        rx.await.map_err(|_| self.closed())
    }

    /// Publish an action from `conn_id` to the room.
    ///
    /// # Errors
    ///
    /// Returns `RoomClosed` if the actor has stopped, otherwise whatever the
    /// session rejects the action with.
    pub async fn publish(&self, conn_id: ConnectionId, action: RelayedAction) -> Result<Delivery, SyncError> {
        let (reply, rx) = oneshot::channel();
        self.send(RoomCommand::Publish { conn_id, action, reply }).await?;
        rx.await.map_err(|_| self.closed())?
    }

    /// Leave the room. Best effort: a stopped actor has no members to remove.
    pub async fn leave(&self, conn_id: ConnectionId) {
        let _ = self.send(RoomCommand::Leave { conn_id }).await;
    }

    /// # Errors
    ///
    /// Returns `RoomClosed` if the actor has stopped.
    pub async fn stats(&self) -> Result<RoomStats, SyncError> {
        let (reply, rx) = oneshot::channel();
        self.send(RoomCommand::Stats { reply }).await?;
        rx.await.map_err(|_| self.closed())
    }

    /// Stop the actor if the room has been empty for at least `ttl`.
    /// Returns true if the actor is (now) stopped.
    pub async fn try_retire(&self, ttl: Duration) -> bool {
        let (reply, rx) = oneshot::channel();
        if self.send(RoomCommand::Retire { ttl, reply }).await.is_err() {
            return true;
        }
        rx.await.unwrap_or(true)
    }

    async fn send(&self, command: RoomCommand) -> Result<(), SyncError> {
        self.commands.send(command).await.map_err(|_| self.closed())
    }

    fn closed(&self) -> SyncError {
        SyncError::RoomClosed(self.id.clone())
    }
}

async fn run_room(mut session: RoomSession, mut commands: mpsc::Receiver<RoomCommand>) {
    info!(room_id = %session.id, "room: actor started");
    while let Some(command) = commands.recv().await {
        match command {
            RoomCommand::Join { conn_id, tx, reply } => {
                let history = session.join(conn_id, tx);
                info!(
                    room_id = %session.id,
                    %conn_id,
                    members = session.member_count(),
                    replay = history.len(),
                    "room: member joined"
                );
                let _ = reply.send(history);
            }
            RoomCommand::Publish { conn_id, action, reply } => {
                let kind = action.kind();
                let result = session.publish(conn_id, action);
                if let Ok(delivery) = &result {
                    debug!(
                        room_id = %session.id,
                        %conn_id,
                        %kind,
                        delivered = delivery.delivered,
                        dropped = delivery.dropped.len(),
                        "room: broadcast"
                    );
                }
                let _ = reply.send(result);
            }
            RoomCommand::Leave { conn_id } => {
                if session.leave(conn_id) {
                    info!(room_id = %session.id, %conn_id, members = session.member_count(), "room: member left");
                }
            }
            RoomCommand::Stats { reply } => {
                let _ = reply.send(session.stats(Instant::now()));
            }
            RoomCommand::Retire { ttl, reply } => {
                let retire = session.is_idle_for(ttl, Instant::now());
                let _ = reply.send(retire);
                if retire {
                    break;
                }
            }
        }
    }
    info!(room_id = %session.id, "room: actor stopped");
}

/// Milliseconds since the Unix epoch for `at`.
#[must_use]
pub fn epoch_ms(at: SystemTime) -> i64 {
    let Ok(dur) = at.duration_since(UNIX_EPOCH) else {
        return 0;
    };
    i64::try_from(dur.as_millis()).unwrap_or(0)
}

#[cfg(test)]
#[path = "room_test.rs"]
mod tests;
