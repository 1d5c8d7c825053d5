//! Local undo/redo stack of full-canvas snapshots.
//!
//! The stack always holds at least one entry: the baseline (the empty canvas
//! at startup, or the state replayed from a `history` batch). Each local edit
//! pushes the resulting snapshot. `pointer` indexes the entry the canvas
//! currently shows.
//!
//! Pushing while the pointer is below the top discards the redo branch.
//! Pushing past `max_depth` evicts the oldest entry, which shifts the pointer
//! down by one.

#[cfg(test)]
#[path = "history_test.rs"]
mod history_test;

/// Default bound on retained snapshots, baseline included.
pub const DEFAULT_MAX_UNDO_DEPTH: usize = 50;

#[derive(Debug, Clone)]
pub struct UndoStack {
    entries: Vec<String>,
    pointer: usize,
    max_depth: usize,
}

impl UndoStack {
    /// A stack holding only `baseline`. `max_depth` is raised to at least 1.
    #[must_use]
    pub fn new(max_depth: usize, baseline: String) -> Self {
        Self { entries: vec![baseline], pointer: 0, max_depth: max_depth.max(1) }
    }

    /// Record the snapshot after a local edit.
    pub fn push(&mut self, snapshot: String) {
        self.entries.truncate(self.pointer + 1);
        self.entries.push(snapshot);
        if self.entries.len() > self.max_depth {
            self.entries.remove(0);
        }
        self.pointer = self.entries.len() - 1;
    }

    /// The snapshot `undo` would restore, without moving the pointer.
    #[must_use]
    pub fn peek_undo(&self) -> Option<&str> {
        let below = self.pointer.checked_sub(1)?;
        self.entries.get(below).map(String::as_str)
    }

    /// The snapshot `redo` would restore, without moving the pointer.
    #[must_use]
    pub fn peek_redo(&self) -> Option<&str> {
        self.entries.get(self.pointer + 1).map(String::as_str)
    }

    /// Step back; returns the snapshot to restore, or `None` at the bottom.
    pub fn undo(&mut self) -> Option<&str> {
        if self.pointer == 0 {
            return None;
        }
        self.pointer -= 1;
        Some(&self.entries[self.pointer])
    }

    /// Step forward; returns the snapshot to restore, or `None` at the top.
    pub fn redo(&mut self) -> Option<&str> {
        if self.pointer + 1 >= self.entries.len() {
            return None;
        }
        self.pointer += 1;
        Some(&self.entries[self.pointer])
    }

    /// Drop all entries and start over from `baseline`.
    pub fn reset(&mut self, baseline: String) {
        self.entries.clear();
        self.entries.push(baseline);
        self.pointer = 0;
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        self.pointer > 0
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        self.pointer + 1 < self.entries.len()
    }

    /// The snapshot the canvas currently shows.
    #[must_use]
    pub fn current(&self) -> &str {
        &self.entries[self.pointer]
    }

    #[must_use]
    pub fn pointer(&self) -> usize {
        self.pointer
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
