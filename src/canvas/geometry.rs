//! Edge geometry: anchor selection, bezier paths and arrowheads.
//!
//! Anchor points are computed from task positions and the fixed node size
//! rather than read back from rendered elements. During a CSS transition
//! the drawn edge can therefore be off by a sub-pixel amount from the
//! painted connection dot.

use serde::{Deserialize, Serialize};

use super::bounds::Bounds;
use super::transform::CanvasTransform;
use crate::domain::connection::{Connection, ConnectionType};
use crate::domain::task::{Position, Task};

pub const CONTROL_OFFSET_RATIO: f64 = 0.3;
pub const MAX_CONTROL_OFFSET: f64 = 100.0;
pub const ARROW_DISTANCE: f64 = 20.0;
pub const ARROW_SIZE: f64 = 8.0;
pub const ARROW_WING_ANGLE: f64 = std::f64::consts::PI / 6.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Top,
    Right,
    Bottom,
    Left,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnchorSides {
    pub from: Side,
    pub to: Side,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BezierPath {
    pub start: Position,
    pub control1: Position,
    pub control2: Position,
    pub end: Position,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Arrowhead {
    pub tip: Position,
    pub left: Position,
    pub right: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StrokeStyle {
    pub width: f64,
    pub opacity: f64,
    pub dash_array: Option<String>,
    pub color: Option<String>,
}

/// Everything the renderer needs to draw one connection, in screen space.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeGeometry {
    pub connection_id: String,
    pub sides: AnchorSides,
    pub path: BezierPath,
    pub arrow: Option<Arrowhead>,
    pub stroke: StrokeStyle,
}

/// Midpoint of the given edge of a box.
pub fn anchor_point(bounds: &Bounds, side: Side) -> Position {
    let center = bounds.center();
    match side {
        Side::Top => Position::new(center.x, bounds.top),
        Side::Right => Position::new(bounds.right, center.y),
        Side::Bottom => Position::new(center.x, bounds.bottom),
        Side::Left => Position::new(bounds.left, center.y),
    }
}

pub fn task_anchor_point(task: &Task, side: Side) -> Position {
    anchor_point(&task.bounds(), side)
}

/// Pick facing sides: right/left when the horizontal centre distance
/// dominates, bottom/top otherwise, oriented in the direction of travel.
pub fn best_connection_points(from: &Bounds, to: &Bounds) -> AnchorSides {
    let from_center = from.center();
    let to_center = to.center();
    let dx = to_center.x - from_center.x;
    let dy = to_center.y - from_center.y;

    if dx.abs() > dy.abs() {
        if dx > 0.0 {
            AnchorSides { from: Side::Right, to: Side::Left }
        } else {
            AnchorSides { from: Side::Left, to: Side::Right }
        }
    } else if dy > 0.0 {
        AnchorSides { from: Side::Bottom, to: Side::Top }
    } else {
        AnchorSides { from: Side::Top, to: Side::Bottom }
    }
}

/// Cubic bezier whose control points sit horizontally outward from each
/// end, `min(distance * 0.3, 100)` away.
pub fn bezier_path(start: Position, end: Position) -> BezierPath {
    let offset = (start.distance_to(end) * CONTROL_OFFSET_RATIO).min(MAX_CONTROL_OFFSET);
    BezierPath {
        start,
        control1: Position::new(start.x + offset, start.y),
        control2: Position::new(end.x - offset, end.y),
        end,
    }
}

impl BezierPath {
    /// SVG path data: `M x y C c1x c1y, c2x c2y, x y`.
    pub fn to_svg(&self) -> String {
        format!(
            "M {} {} C {} {}, {} {}, {} {}",
            self.start.x,
            self.start.y,
            self.control1.x,
            self.control1.y,
            self.control2.x,
            self.control2.y,
            self.end.x,
            self.end.y
        )
    }

    /// Point on the curve at `t` in [0, 1].
    pub fn point_at(&self, t: f64) -> Position {
        let u = 1.0 - t;
        let (a, b, c, d) = (u * u * u, 3.0 * u * u * t, 3.0 * u * t * t, t * t * t);
        Position::new(
            a * self.start.x + b * self.control1.x + c * self.control2.x + d * self.end.x,
            a * self.start.y + b * self.control1.y + c * self.control2.y + d * self.end.y,
        )
    }
}

/// Arrowhead pointing from `start` towards `end`, its tip `distance_back`
/// short of `end`, with two wings of length `size` at ±30°.
pub fn arrowhead(start: Position, end: Position, distance_back: f64, size: f64) -> Option<Arrowhead> {
    let dx = end.x - start.x;
    let dy = end.y - start.y;
    if dx == 0.0 && dy == 0.0 {
        return None;
    }

    let angle = dy.atan2(dx);
    let tip = Position::new(end.x - angle.cos() * distance_back, end.y - angle.sin() * distance_back);
    let wing = |a: f64| Position::new(tip.x - size * a.cos(), tip.y - size * a.sin());

    Some(Arrowhead {
        tip,
        left: wing(angle - ARROW_WING_ANGLE),
        right: wing(angle + ARROW_WING_ANGLE),
    })
}

impl Arrowhead {
    /// SVG polygon `points` attribute.
    pub fn to_svg_points(&self) -> String {
        format!(
            "{},{} {},{} {},{}",
            self.tip.x, self.tip.y, self.left.x, self.left.y, self.right.x, self.right.y
        )
    }
}

/// Default stroke per connection type, overridden by an explicit style.
pub fn stroke_style(connection: &Connection) -> StrokeStyle {
    let mut stroke = match connection.kind {
        ConnectionType::Strong => StrokeStyle { width: 3.0, opacity: 0.8, dash_array: None, color: None },
        ConnectionType::Weak => StrokeStyle {
            width: 2.0,
            opacity: 0.5,
            dash_array: Some("5,5".to_string()),
            color: None,
        },
        ConnectionType::Related => StrokeStyle {
            width: 2.0,
            opacity: 0.4,
            dash_array: Some("2,3".to_string()),
            color: None,
        },
    };

    if let Some(style) = &connection.style {
        if let Some(width) = style.width {
            stroke.width = width;
        }
        if style.dash_array.is_some() {
            stroke.dash_array = style.dash_array.clone();
        }
        stroke.color = style.color.clone();
    }
    stroke
}

/// Screen-space geometry for a connection, or `None` when either endpoint
/// task cannot be found. A missing endpoint is not an error: the edge is
/// just not drawn this frame.
pub fn edge_geometry(
    connection: &Connection,
    tasks: &[Task],
    transform: &CanvasTransform,
    arrow_distance: f64,
    arrow_size: f64,
) -> Option<EdgeGeometry> {
    let from = tasks.iter().find(|t| t.id == connection.from)?;
    let to = tasks.iter().find(|t| t.id == connection.to)?;

    let (from_box, to_box) = (from.bounds(), to.bounds());
    let sides = best_connection_points(&from_box, &to_box);
    let start = transform.to_screen(anchor_point(&from_box, sides.from));
    let end = transform.to_screen(anchor_point(&to_box, sides.to));

    Some(EdgeGeometry {
        connection_id: connection.id.clone(),
        sides,
        path: bezier_path(start, end),
        arrow: arrowhead(start, end, arrow_distance, arrow_size),
        stroke: stroke_style(connection),
    })
}

/// Live preview while dragging out a new connection, in screen space.
pub fn preview_path(anchor: Position, pointer: Position) -> BezierPath {
    bezier_path(anchor, pointer)
}
