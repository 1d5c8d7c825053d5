//! Document model: the in-memory store of canvas objects.
//!
//! Objects keep their insertion order, which is also draw order: later
//! objects paint over earlier ones. Re-inserting an existing id replaces the
//! object in place without moving it.
//!
//! Data flows into this layer from the network (remote actions, history
//! replay) and from the input engine (completed gestures, transforms). The
//! whole store serializes to a JSON snapshot for the undo stack.

#[cfg(test)]
#[path = "doc_test.rs"]
mod doc_test;

use std::collections::HashMap;

use actions::{CanvasObject, ObjectId, TransformPatch};

/// In-memory store of canvas objects.
#[derive(Debug, Default)]
pub struct DocStore {
    objects: Vec<CanvasObject>,
    index: HashMap<ObjectId, usize>,
}

impl DocStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an object, or replace the existing one with the same id.
    /// Returns true if an object was replaced.
    pub fn insert(&mut self, obj: CanvasObject) -> bool {
        if let Some(&slot) = self.index.get(&obj.id) {
            self.objects[slot] = obj;
            return true;
        }
        self.index.insert(obj.id.clone(), self.objects.len());
        self.objects.push(obj);
        false
    }

    /// Return a reference to an object by id.
    #[must_use]
    pub fn get(&self, id: &ObjectId) -> Option<&CanvasObject> {
        self.index.get(id).map(|&slot| &self.objects[slot])
    }

    /// Merge a transform patch into an existing object. Returns false if the
    /// object doesn't exist.
    pub fn apply_patch(&mut self, id: &ObjectId, patch: &TransformPatch) -> bool {
        let Some(&slot) = self.index.get(id) else {
            return false;
        };
        self.objects[slot].transform.apply(patch);
        true
    }

    /// Remove every object.
    pub fn clear(&mut self) {
        self.objects.clear();
        self.index.clear();
    }

    /// Replace all objects with `objects`, in order. Duplicate ids keep the
    /// last occurrence at the first occurrence's position.
    pub fn load_snapshot(&mut self, objects: Vec<CanvasObject>) {
        self.clear();
        for obj in objects {
            self.insert(obj);
        }
    }

    /// Objects in draw order.
    #[must_use]
    pub fn objects(&self) -> &[CanvasObject] {
        &self.objects
    }

    /// Serialize the store as a JSON array.
    ///
    /// # Errors
    ///
    /// Returns the serializer error; plain data never fails in practice.
    pub fn to_snapshot(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.objects)
    }

    /// Replace the store with a snapshot produced by [`Self::to_snapshot`].
    ///
    /// # Errors
    ///
    /// Returns the deserializer error; the store is left untouched on failure.
    pub fn restore_snapshot(&mut self, snapshot: &str) -> Result<(), serde_json::Error> {
        let objects: Vec<CanvasObject> = serde_json::from_str(snapshot)?;
        self.load_snapshot(objects);
        Ok(())
    }

    /// Number of objects currently in the store.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Returns `true` if the store contains no objects.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}
