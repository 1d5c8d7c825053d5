//! Shared action model and JSON codec for the realtime drawing channel.
//!
//! This crate owns the wire representation used by both `server` and the
//! client engine in `canvas`. Every socket message is an envelope
//! `{ "type": ..., "payload"?: ... }` that maps onto one [`Action`] variant.
//! The server never inspects payload geometry; it only needs the variant to
//! decide whether an action is logged, clears the log, or is a bare signal.

mod object;

pub use object::{
    CanvasObject, Geometry, ObjectId, Point, ShapeKind, Style, Transform, TransformPatch, bounds_origin,
};

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Error returned by [`decode_action`] and [`encode_action`].
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The text is not valid JSON, or the payload does not match its type.
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    /// The envelope has no string `type` field.
    #[error("missing or non-string message type")]
    MissingType,
    /// The envelope `type` is not part of the protocol.
    #[error("unknown message type: {0}")]
    UnknownType(String),
    /// The envelope `type` is known but the payload is malformed.
    #[error("malformed {kind} payload: {source}")]
    Payload {
        kind: ActionKind,
        #[source]
        source: serde_json::Error,
    },
}

// =============================================================================
// PAYLOADS
// =============================================================================

/// A finished freehand stroke.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathPayload {
    /// Absent only for senders that predate client-assigned ids.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub points: Vec<Point>,
    #[serde(flatten)]
    pub style: Style,
    #[serde(flatten)]
    pub transform: Transform,
}

/// A finished primitive shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    #[serde(rename = "type")]
    pub kind: ShapeKind,
    #[serde(default)]
    pub width: f64,
    #[serde(default)]
    pub height: f64,
    #[serde(flatten)]
    pub style: Style,
    #[serde(flatten)]
    pub transform: Transform,
}

/// A committed transform of an existing object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectModifiedPayload {
    pub id: ObjectId,
    #[serde(flatten)]
    pub patch: TransformPatch,
}

impl PathPayload {
    /// Materialize the stroke as a document object under `id`.
    #[must_use]
    pub fn into_object(self, id: ObjectId, interactive: bool) -> CanvasObject {
        CanvasObject {
            id,
            geometry: Geometry::Path { points: self.points },
            style: self.style,
            transform: self.transform,
            interactive,
        }
    }
}

impl ShapePayload {
    /// Materialize the shape as a document object under `id`.
    #[must_use]
    pub fn into_object(self, id: ObjectId, interactive: bool) -> CanvasObject {
        CanvasObject {
            id,
            geometry: Geometry::Shape { shape: self.kind, width: self.width, height: self.height },
            style: self.style,
            transform: self.transform,
            interactive,
        }
    }
}

// =============================================================================
// ACTION
// =============================================================================

/// One discrete edit or control event exchanged between client and server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Action {
    #[serde(rename = "path")]
    Path(PathPayload),
    #[serde(rename = "shape")]
    Shape(ShapePayload),
    #[serde(rename = "object:modified")]
    ObjectModified(ObjectModifiedPayload),
    #[serde(rename = "clear")]
    Clear,
    #[serde(rename = "undo")]
    Undo,
    #[serde(rename = "redo")]
    Redo,
    /// Server → client only: the room log replayed on join.
    #[serde(rename = "history")]
    History(Vec<Action>),
}

/// Payload-free discriminant of [`Action`], used for routing and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Path,
    Shape,
    ObjectModified,
    Clear,
    Undo,
    Redo,
    History,
}

impl ActionKind {
    /// Wire name carried in the envelope `type` field.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Path => "path",
            Self::Shape => "shape",
            Self::ObjectModified => "object:modified",
            Self::Clear => "clear",
            Self::Undo => "undo",
            Self::Redo => "redo",
            Self::History => "history",
        }
    }

    /// Parse a wire name.
    #[must_use]
    pub fn from_wire(raw: &str) -> Option<Self> {
        match raw {
            "path" => Some(Self::Path),
            "shape" => Some(Self::Shape),
            "object:modified" => Some(Self::ObjectModified),
            "clear" => Some(Self::Clear),
            "undo" => Some(Self::Undo),
            "redo" => Some(Self::Redo),
            "history" => Some(Self::History),
            _ => None,
        }
    }

    /// Actions appended to a room log and replayed to late joiners.
    #[must_use]
    pub fn is_logged(self) -> bool {
        matches!(self, Self::Path | Self::Shape | Self::ObjectModified)
    }

    /// Transient notifications that carry no state.
    #[must_use]
    pub fn is_signal(self) -> bool {
        matches!(self, Self::Undo | Self::Redo)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Action {
    #[must_use]
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::Path(_) => ActionKind::Path,
            Self::Shape(_) => ActionKind::Shape,
            Self::ObjectModified(_) => ActionKind::ObjectModified,
            Self::Clear => ActionKind::Clear,
            Self::Undo => ActionKind::Undo,
            Self::Redo => ActionKind::Redo,
            Self::History(_) => ActionKind::History,
        }
    }

    /// The object this action creates or modifies, if it names one.
    #[must_use]
    pub fn object_id(&self) -> Option<&ObjectId> {
        match self {
            Self::Path(p) => p.id.as_ref(),
            Self::Shape(s) => s.id.as_ref(),
            Self::ObjectModified(m) => Some(&m.id),
            _ => None,
        }
    }

    /// Build the creation action that reproduces `object` on another client,
    /// including its current transform.
    #[must_use]
    pub fn create(object: &CanvasObject) -> Self {
        match &object.geometry {
            Geometry::Path { points } => Self::Path(PathPayload {
                id: Some(object.id.clone()),
                points: points.clone(),
                style: object.style.clone(),
                transform: object.transform,
            }),
            Geometry::Shape { shape, width, height } => Self::Shape(ShapePayload {
                id: Some(object.id.clone()),
                kind: *shape,
                width: *width,
                height: *height,
                style: object.style.clone(),
                transform: object.transform,
            }),
        }
    }
}

// =============================================================================
// CODEC
// =============================================================================

/// Encode an action as a JSON envelope.
///
/// # Errors
///
/// Returns [`CodecError::Json`] if serialization fails.
pub fn encode_action(action: &Action) -> Result<String, CodecError> {
    Ok(serde_json::to_string(action)?)
}

/// Decode a JSON envelope into an action.
///
/// The envelope is inspected before the payload so callers can tell a
/// foreign message type apart from a broken payload.
///
/// # Errors
///
/// Returns [`CodecError::Json`] for non-JSON text, [`CodecError::MissingType`]
/// when `type` is absent or not a string, [`CodecError::UnknownType`] for
/// types outside the protocol and [`CodecError::Payload`] when the payload
/// does not match its type.
pub fn decode_action(text: &str) -> Result<Action, CodecError> {
    let value: Value = serde_json::from_str(text)?;
    let Some(raw_kind) = value.get("type").and_then(Value::as_str) else {
        return Err(CodecError::MissingType);
    };
    let Some(kind) = ActionKind::from_wire(raw_kind) else {
        return Err(CodecError::UnknownType(raw_kind.to_owned()));
    };
    serde_json::from_value(value).map_err(|source| CodecError::Payload { kind, source })
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
