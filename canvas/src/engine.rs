//! Reconciliation engine: local gestures in, wire actions out; remote actions in,
//! canvas events out.
//!
//! DESIGN
//! ======
//! `EngineCore` has two disjoint entry families:
//! - Local input (`pointer_*`, `commit_transform`, `clear`, `undo`, `redo`)
//!   mutates the document, pushes one undo snapshot, and queues outbound
//!   actions in the outbox.
//! - Remote input (`apply_remote`, `handle_inbound_text`) mutates the
//!   document and records events, but never touches the outbox.
//!
//! That split is the echo-suppression rule: nothing received is ever sent.
//!
//! UNDO
//! ====
//! Undo and redo restore a full snapshot locally, then publish compensating
//! actions (`clear` followed by one creation per surviving object) so peers
//! and late joiners converge, and finally the bare `undo`/`redo` signal.

#[cfg(test)]
#[path = "engine_test.rs"]
mod engine_test;

use actions::{Action, CanvasObject, ObjectId, ObjectModifiedPayload, Point, TransformPatch};

use crate::doc::DocStore;
use crate::history::{DEFAULT_MAX_UNDO_DEPTH, UndoStack};
use crate::ids::IdGenerator;
use crate::input::{InputState, Tool, ToolSettings};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("snapshot encoding failed: {0}")]
    Snapshot(#[from] serde_json::Error),
    #[error("invalid inbound message: {0}")]
    Codec(#[from] actions::CodecError),
    #[error("no such object: {0}")]
    UnknownObject(ObjectId),
    #[error("object {0} belongs to another participant")]
    NotInteractive(ObjectId),
}

/// Engine tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Snapshots retained by the undo stack, baseline included.
    pub max_undo_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { max_undo_depth: DEFAULT_MAX_UNDO_DEPTH }
    }
}

/// Notifications for the rendering layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CanvasEvent {
    /// An object was added or replaced.
    ObjectCreated(ObjectId),
    /// An object's transform changed.
    ObjectModified(ObjectId),
    /// Every object was removed.
    Cleared,
    /// The whole document was replaced by a local undo or redo.
    Restored,
    /// A peer undid something; informational only.
    PeerUndo,
    /// A peer redid something; informational only.
    PeerRedo,
}

/// Core engine state. Holds no transport; the host drains `take_outbound`
/// into its socket and feeds received text to `handle_inbound_text`.
pub struct EngineCore {
    doc: DocStore,
    ids: IdGenerator,
    settings: ToolSettings,
    input: InputState,
    history: UndoStack,
    outbox: Vec<Action>,
    events: Vec<CanvasEvent>,
}

impl EngineCore {
    /// Engine with a random session token.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Snapshot`] if the empty baseline cannot be encoded.
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        Self::with_ids(config, IdGenerator::new())
    }

    /// Engine with a caller-supplied id generator.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Snapshot`] if the empty baseline cannot be encoded.
    pub fn with_ids(config: EngineConfig, ids: IdGenerator) -> Result<Self, EngineError> {
        let doc = DocStore::new();
        let baseline = doc.to_snapshot()?;
        Ok(Self {
            doc,
            ids,
            settings: ToolSettings::default(),
            input: InputState::Idle,
            history: UndoStack::new(config.max_undo_depth, baseline),
            outbox: Vec::new(),
            events: Vec::new(),
        })
    }

    // --- Commands ---

    /// Switch tools. Any gesture in progress is abandoned.
    pub fn set_tool(&mut self, tool: Tool) {
        self.settings.tool = tool;
        self.input = InputState::Idle;
    }

    pub fn set_color(&mut self, color: impl Into<String>) {
        self.settings.color = color.into();
    }

    /// Set the stroke width. Non-finite or non-positive widths are ignored.
    pub fn set_width(&mut self, width: f64) {
        if width.is_finite() && width > 0.0 {
            self.settings.width = width;
        }
    }

    /// Remove every object and tell peers to do the same.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Snapshot`] if the snapshot cannot be encoded.
    pub fn clear(&mut self) -> Result<(), EngineError> {
        self.doc.clear();
        self.events.push(CanvasEvent::Cleared);
        self.outbox.push(Action::Clear);
        self.record_snapshot()
    }

    /// Step back one local edit. Returns false when there is nothing to undo.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Snapshot`] if the stored snapshot is corrupt.
    /// The canvas and the undo pointer are left unchanged in that case.
    pub fn undo(&mut self) -> Result<bool, EngineError> {
        let Some(snapshot) = self.history.peek_undo().map(str::to_owned) else {
            return Ok(false);
        };
        // The pointer only moves once the snapshot has been applied.
        self.restore(&snapshot, Action::Undo)?;
        self.history.undo();
        Ok(true)
    }

    /// Step forward one local edit. Returns false when there is nothing to redo.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Snapshot`] if the stored snapshot is corrupt.
    /// The canvas and the undo pointer are left unchanged in that case.
    pub fn redo(&mut self) -> Result<bool, EngineError> {
        let Some(snapshot) = self.history.peek_redo().map(str::to_owned) else {
            return Ok(false);
        };
        self.restore(&snapshot, Action::Redo)?;
        self.history.redo();
        Ok(true)
    }

    // --- Local gestures ---

    /// Start a gesture with the current tool.
    pub fn pointer_down(&mut self, at: Point) {
        self.input = InputState::begin(&self.settings, at);
    }

    pub fn pointer_move(&mut self, at: Point) {
        self.input.extend(at);
    }

    /// Finish the gesture. Commits the object, queues one `path`/`shape`
    /// action, and pushes one snapshot. Returns the new object's id, or
    /// `None` if no object resulted.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Snapshot`] if the snapshot cannot be encoded.
    pub fn pointer_up(&mut self, at: Point) -> Result<Option<ObjectId>, EngineError> {
        self.input.extend(at);
        let gesture = std::mem::take(&mut self.input);
        if !gesture.is_active() {
            return Ok(None);
        }
        let Some(object) = gesture.finish(self.ids.next_id()) else {
            return Ok(None);
        };
        let id = object.id.clone();
        self.outbox.push(Action::create(&object));
        self.doc.insert(object);
        self.events.push(CanvasEvent::ObjectCreated(id.clone()));
        self.record_snapshot()?;
        Ok(Some(id))
    }

    /// Apply a committed transform to one of this participant's objects and
    /// queue one `object:modified`. An empty patch changes nothing.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownObject`] for missing ids and
    /// [`EngineError::NotInteractive`] for objects received from peers.
    pub fn commit_transform(&mut self, id: &ObjectId, patch: TransformPatch) -> Result<(), EngineError> {
        match self.doc.get(id) {
            None => return Err(EngineError::UnknownObject(id.clone())),
            Some(obj) if !obj.interactive => return Err(EngineError::NotInteractive(id.clone())),
            Some(_) => {}
        }
        if patch.is_empty() {
            return Ok(());
        }
        self.doc.apply_patch(id, &patch);
        self.events.push(CanvasEvent::ObjectModified(id.clone()));
        self.outbox.push(Action::ObjectModified(ObjectModifiedPayload { id: id.clone(), patch }));
        self.record_snapshot()
    }

    // --- Remote input ---

    /// Decode a server message and apply it.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Codec`] for malformed messages; the document is
    /// unchanged in that case.
    pub fn handle_inbound_text(&mut self, text: &str) -> Result<(), EngineError> {
        let action = actions::decode_action(text)?;
        self.apply_remote(action)
    }

    /// Apply an action received from the room. Never queues outbound actions.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Snapshot`] if the post-replay baseline cannot be encoded.
    pub fn apply_remote(&mut self, action: Action) -> Result<(), EngineError> {
        match action {
            Action::History(entries) => {
                for entry in entries {
                    // Nested batches are not part of the protocol.
                    if !matches!(entry, Action::History(_)) {
                        self.apply_remote_one(entry);
                    }
                }
                let baseline = self.doc.to_snapshot()?;
                self.history.reset(baseline);
            }
            other => self.apply_remote_one(other),
        }
        Ok(())
    }

    fn apply_remote_one(&mut self, action: Action) {
        match action {
            Action::Path(mut payload) => {
                let (id, interactive) = self.remote_identity(payload.id.take());
                self.insert_remote(payload.into_object(id, interactive));
            }
            Action::Shape(mut payload) => {
                let (id, interactive) = self.remote_identity(payload.id.take());
                self.insert_remote(payload.into_object(id, interactive));
            }
            Action::ObjectModified(payload) => {
                // Absent target: lost update after a racing clear.
                if self.doc.apply_patch(&payload.id, &payload.patch) {
                    self.events.push(CanvasEvent::ObjectModified(payload.id));
                }
            }
            Action::Clear => {
                self.doc.clear();
                self.events.push(CanvasEvent::Cleared);
            }
            Action::Undo => self.events.push(CanvasEvent::PeerUndo),
            Action::Redo => self.events.push(CanvasEvent::PeerRedo),
            Action::History(_) => {}
        }
    }

    /// Objects stay editable only when their id carries this session's token
    /// (our own actions replayed from history). Ids minted here are never ours.
    fn remote_identity(&mut self, id: Option<ObjectId>) -> (ObjectId, bool) {
        match id {
            Some(id) => {
                let own = self.ids.is_own(&id);
                (id, own)
            }
            None => (self.ids.next_id(), false),
        }
    }

    fn insert_remote(&mut self, object: CanvasObject) {
        let id = object.id.clone();
        self.doc.insert(object);
        self.events.push(CanvasEvent::ObjectCreated(id));
    }

    // --- Observer boundary ---

    /// Events recorded since the last call, oldest first.
    pub fn drain_events(&mut self) -> Vec<CanvasEvent> {
        std::mem::take(&mut self.events)
    }

    /// Actions queued for the server since the last call, oldest first.
    pub fn take_outbound(&mut self) -> Vec<Action> {
        std::mem::take(&mut self.outbox)
    }

    // --- Queries ---

    #[must_use]
    pub fn object(&self, id: &ObjectId) -> Option<&CanvasObject> {
        self.doc.get(id)
    }

    /// Objects in draw order.
    #[must_use]
    pub fn objects(&self) -> &[CanvasObject] {
        self.doc.objects()
    }

    #[must_use]
    pub fn settings(&self) -> &ToolSettings {
        &self.settings
    }

    #[must_use]
    pub fn session_token(&self) -> &str {
        self.ids.token()
    }

    /// The object being drawn, for live preview. Never part of the document.
    #[must_use]
    pub fn in_progress(&self) -> Option<CanvasObject> {
        self.input.preview(ObjectId::from("preview"))
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// Serialized document, as stored by the undo stack.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Snapshot`] if encoding fails.
    pub fn snapshot(&self) -> Result<String, EngineError> {
        Ok(self.doc.to_snapshot()?)
    }

    // --- Internals ---

    fn record_snapshot(&mut self) -> Result<(), EngineError> {
        let snapshot = self.doc.to_snapshot()?;
        self.history.push(snapshot);
        Ok(())
    }

    fn restore(&mut self, snapshot: &str, signal: Action) -> Result<(), EngineError> {
        self.doc.restore_snapshot(snapshot)?;
        self.events.push(CanvasEvent::Restored);
        self.outbox.push(Action::Clear);
        self.outbox.extend(self.doc.objects().iter().map(Action::create));
        self.outbox.push(signal);
        Ok(())
    }
}
