//! Canvas object vocabulary shared by the server log and the client engine.
//!
//! Objects are addressed by a client-assigned [`ObjectId`]. Their placement
//! lives in a [`Transform`] and incremental edits travel as a sparse
//! [`TransformPatch`]: only present fields are applied.

use std::fmt;

use serde::{Deserialize, Serialize};

#[cfg(test)]
#[path = "object_test.rs"]
mod tests;

/// Client-assigned object identifier, e.g. `obj_1718000000000_3f9a12c0_7`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(String);

impl ObjectId {
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ObjectId {
    fn from(raw: &str) -> Self {
        Self(raw.to_owned())
    }
}

impl From<String> for ObjectId {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

/// A point in canvas coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Primitive shape kinds offered by the shape tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeKind {
    Rectangle,
    Circle,
    Triangle,
    /// Segment from `(left, top)` to `(left + width, top + height)`.
    Line,
}

/// Stroke and fill styling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Style {
    /// Stroke color as a CSS color string.
    pub stroke: String,
    /// Stroke width in canvas units.
    pub stroke_width: f64,
    /// Fill color; `None` renders the shape hollow.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fill: Option<String>,
}

impl Default for Style {
    fn default() -> Self {
        Self { stroke: "#000000".into(), stroke_width: 2.0, fill: None }
    }
}

/// Placement of an object: position, scale, rotation and mirroring.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Transform {
    pub left: f64,
    pub top: f64,
    pub scale_x: f64,
    pub scale_y: f64,
    /// Clockwise rotation in degrees.
    pub angle: f64,
    pub flip_x: bool,
    pub flip_y: bool,
}

impl Default for Transform {
    fn default() -> Self {
        Self { left: 0.0, top: 0.0, scale_x: 1.0, scale_y: 1.0, angle: 0.0, flip_x: false, flip_y: false }
    }
}

impl Transform {
    /// Identity transform positioned at `(left, top)`.
    #[must_use]
    pub fn at(left: f64, top: f64) -> Self {
        Self { left, top, ..Self::default() }
    }

    /// Merge the present fields of `patch` into this transform.
    pub fn apply(&mut self, patch: &TransformPatch) {
        if let Some(left) = patch.left {
            self.left = left;
        }
        if let Some(top) = patch.top {
            self.top = top;
        }
        if let Some(sx) = patch.scale_x {
            self.scale_x = sx;
        }
        if let Some(sy) = patch.scale_y {
            self.scale_y = sy;
        }
        if let Some(angle) = patch.angle {
            self.angle = angle;
        }
        if let Some(fx) = patch.flip_x {
            self.flip_x = fx;
        }
        if let Some(fy) = patch.flip_y {
            self.flip_y = fy;
        }
    }
}

/// Sparse transform update. Only present fields are applied.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TransformPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub angle: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flip_x: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flip_y: Option<bool>,
}

impl TransformPatch {
    /// A patch that only moves the object.
    #[must_use]
    pub fn moved_to(left: f64, top: f64) -> Self {
        Self { left: Some(left), top: Some(top), ..Self::default() }
    }

    /// True when no field is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Geometry of a drawable object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Geometry {
    /// Freehand stroke through `points`.
    Path { points: Vec<Point> },
    /// Primitive shape with a bounding size; origin comes from the transform.
    Shape { shape: ShapeKind, width: f64, height: f64 },
}

/// A drawable object as held by a client document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanvasObject {
    pub id: ObjectId,
    pub geometry: Geometry,
    pub style: Style,
    pub transform: Transform,
    /// Locally created objects can be selected and edited; remote ones cannot.
    pub interactive: bool,
}

impl CanvasObject {
    /// The shape kind, or `None` for freehand paths.
    #[must_use]
    pub fn shape_kind(&self) -> Option<ShapeKind> {
        match self.geometry {
            Geometry::Shape { shape, .. } => Some(shape),
            Geometry::Path { .. } => None,
        }
    }
}

/// Top-left corner of the axis-aligned box around `points`.
#[must_use]
pub fn bounds_origin(points: &[Point]) -> Point {
    let mut iter = points.iter();
    let Some(first) = iter.next() else {
        return Point::default();
    };
    iter.fold(*first, |acc, p| Point::new(acc.x.min(p.x), acc.y.min(p.y)))
}
