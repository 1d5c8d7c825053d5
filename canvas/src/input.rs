//! Input model: tools, tool settings, and the in-progress gesture.
//!
//! `InputState` is the active gesture tracked between pointer-down and
//! pointer-up. It lives outside the document, so remote actions applied
//! mid-gesture can never touch the object being drawn. Only `finish` turns a
//! gesture into a document object.

#[cfg(test)]
#[path = "input_test.rs"]
mod input_test;

use actions::{CanvasObject, Geometry, ObjectId, Point, ShapeKind, Style, Transform, bounds_origin};

/// Which tool is currently active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tool {
    /// Freehand pen (default).
    #[default]
    Pen,
    /// Pointer tool: pointer gestures draw nothing; objects are edited via
    /// `commit_transform`.
    Select,
    Rectangle,
    Circle,
    Triangle,
    Line,
}

impl Tool {
    /// The shape this tool draws, if it is a shape tool.
    #[must_use]
    pub fn shape_kind(self) -> Option<ShapeKind> {
        match self {
            Self::Rectangle => Some(ShapeKind::Rectangle),
            Self::Circle => Some(ShapeKind::Circle),
            Self::Triangle => Some(ShapeKind::Triangle),
            Self::Line => Some(ShapeKind::Line),
            Self::Pen | Self::Select => None,
        }
    }

    /// Parse a toolbar name (`pen`, `select`, `rectangle`, ...).
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "pen" => Some(Self::Pen),
            "select" => Some(Self::Select),
            "rectangle" | "rect" => Some(Self::Rectangle),
            "circle" => Some(Self::Circle),
            "triangle" => Some(Self::Triangle),
            "line" => Some(Self::Line),
            _ => None,
        }
    }
}

/// Toolbar state applied to newly drawn objects.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSettings {
    pub tool: Tool,
    /// Stroke color as a CSS color string.
    pub color: String,
    /// Stroke width in canvas units.
    pub width: f64,
}

impl Default for ToolSettings {
    fn default() -> Self {
        let style = Style::default();
        Self { tool: Tool::default(), color: style.stroke, width: style.stroke_width }
    }
}

impl ToolSettings {
    #[must_use]
    pub fn style(&self) -> Style {
        Style { stroke: self.color.clone(), stroke_width: self.width, fill: None }
    }
}

/// The gesture in progress, if any.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum InputState {
    /// No gesture in progress; waiting for the next pointer-down.
    #[default]
    Idle,
    /// Freehand stroke collecting points.
    Stroking { points: Vec<Point>, style: Style },
    /// Shape drag from `anchor` to `current`.
    DrawingShape { shape: ShapeKind, anchor: Point, current: Point, style: Style },
}

impl InputState {
    /// Begin a gesture for `settings.tool` at `at`.
    #[must_use]
    pub fn begin(settings: &ToolSettings, at: Point) -> Self {
        let style = settings.style();
        match settings.tool {
            Tool::Pen => Self::Stroking { points: vec![at], style },
            Tool::Select => Self::Idle,
            tool => match tool.shape_kind() {
                Some(shape) => Self::DrawingShape { shape, anchor: at, current: at, style },
                None => Self::Idle,
            },
        }
    }

    /// Extend the gesture to `at`.
    pub fn extend(&mut self, at: Point) {
        match self {
            Self::Idle => {}
            Self::Stroking { points, .. } => {
                if points.last() != Some(&at) {
                    points.push(at);
                }
            }
            Self::DrawingShape { current, .. } => *current = at,
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Idle)
    }

    /// The object this gesture would produce right now, for live preview.
    #[must_use]
    pub fn preview(&self, id: ObjectId) -> Option<CanvasObject> {
        match self {
            Self::Idle => None,
            Self::Stroking { points, style } => {
                let origin = bounds_origin(points);
                Some(CanvasObject {
                    id,
                    geometry: Geometry::Path { points: points.clone() },
                    style: style.clone(),
                    transform: Transform::at(origin.x, origin.y),
                    interactive: true,
                })
            }
            Self::DrawingShape { shape, anchor, current, style } => {
                Some(shape_from_drag(id, *shape, *anchor, *current, style.clone()))
            }
        }
    }

    /// Consume the gesture and build its object. Degenerate shapes (zero
    /// width and height) produce nothing.
    #[must_use]
    pub fn finish(self, id: ObjectId) -> Option<CanvasObject> {
        let object = self.preview(id)?;
        match object.geometry {
            Geometry::Shape { width, height, .. } if width < f64::EPSILON && height < f64::EPSILON => None,
            _ => Some(object),
        }
    }
}

/// Build a shape whose bounding box spans `anchor` and `current`.
///
/// Lines keep their direction through `flip_x`/`flip_y`: an unflipped line
/// runs from the top-left to the bottom-right corner of its box.
#[must_use]
pub fn shape_from_drag(id: ObjectId, shape: ShapeKind, anchor: Point, current: Point, style: Style) -> CanvasObject {
    let mut transform = Transform::at(anchor.x.min(current.x), anchor.y.min(current.y));
    if shape == ShapeKind::Line {
        transform.flip_x = current.x < anchor.x;
        transform.flip_y = current.y < anchor.y;
    }
    CanvasObject {
        id,
        geometry: Geometry::Shape {
            shape,
            width: (current.x - anchor.x).abs(),
            height: (current.y - anchor.y).abs(),
        },
        style,
        transform,
        interactive: true,
    }
}
