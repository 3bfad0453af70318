use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};

use super::bounds::Bounds;
use super::geometry::{task_anchor_point, Side};
use super::transform::CanvasTransform;
use crate::domain::task::{Position, Task, TaskId};
use crate::services::history::HistoryOutcome;
use crate::services::task_service::ConnectOutcome;

/// Screen-space radius of a connection point handle.
pub const CONNECTION_POINT_RADIUS: f64 = 8.0;

/// Offset from the pointer to the top-left of a task created by
/// double-click, so the new node appears centred under the cursor.
pub const NEW_TASK_OFFSET: Position = Position { x: 100.0, y: 60.0 };

#[derive(Debug, Clone, PartialEq)]
pub enum InteractionState {
    Idle,
    Panning {
        start_pointer: Position,
        start_pan: Position,
    },
    DraggingTask {
        task_id: TaskId,
        start_pointer: Position,
        start_position: Position,
        start_updated_at: DateTime<Utc>,
        moved: bool,
    },
    /// Both corners in screen space.
    BoxSelecting {
        start: Position,
        current: Position,
    },
    /// `anchor` and `pointer` in screen space.
    Connecting {
        source: TaskId,
        side: Side,
        anchor: Position,
        pointer: Position,
    },
}

impl InteractionState {
    pub fn name(&self) -> &'static str {
        match self {
            InteractionState::Idle => "idle",
            InteractionState::Panning { .. } => "panning",
            InteractionState::DraggingTask { .. } => "dragging_task",
            InteractionState::BoxSelecting { .. } => "box_selecting",
            InteractionState::Connecting { .. } => "connecting",
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, InteractionState::Idle)
    }
}

/// What the pointer is over, as reported by the renderer or computed by
/// `CanvasSession::hit_test`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HitTarget {
    Canvas,
    TaskBody(TaskId),
    ConnectionPoint { task_id: TaskId, side: Side },
}

/// Observable result of feeding one input event to the session.
#[derive(Debug, Clone, PartialEq)]
pub enum InteractionEvent {
    Ignored,
    StateChanged,
    SelectionChanged,
    PanChanged,
    ZoomChanged,
    TaskMoved(TaskId),
    MoveCommitted(TaskId),
    TasksSelected(usize),
    TaskCreated(TaskId),
    TasksDeleted(usize),
    TasksUpdated(usize),
    ConnectionCreated(ConnectOutcome),
    ConnectionRejected(String),
    Cancelled,
    History(HistoryOutcome),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSeverity {
    Info,
    Warning,
    Error,
}

/// A short-lived notice for the user, e.g. why a connection was refused.
#[derive(Debug, Clone, PartialEq)]
pub struct TransientMessage {
    pub severity: MessageSeverity,
    pub text: String,
    pub shown_at: Instant,
    pub duration: Duration,
}

impl TransientMessage {
    pub fn new(severity: MessageSeverity, text: impl Into<String>, duration: Duration) -> Self {
        Self {
            severity,
            text: text.into(),
            shown_at: Instant::now(),
            duration,
        }
    }

    pub fn is_expired_at(&self, now: Instant) -> bool {
        now.duration_since(self.shown_at) >= self.duration
    }
}

/// Task position after dragging the pointer from `start_pointer` to
/// `pointer` at the given zoom.
pub fn drag_position(start_position: Position, start_pointer: Position, pointer: Position, zoom: f64) -> Position {
    Position {
        x: start_position.x + (pointer.x - start_pointer.x) / zoom,
        y: start_position.y + (pointer.y - start_pointer.y) / zoom,
    }
}

pub fn snap_to_grid(position: Position, grid_size: f64) -> Position {
    if grid_size <= 0.0 {
        return position;
    }
    Position {
        x: (position.x / grid_size).round() * grid_size,
        y: (position.y / grid_size).round() * grid_size,
    }
}

/// Selection rectangle in canvas space from two screen corners.
pub fn selection_rect(start: Position, current: Position, transform: &CanvasTransform) -> Bounds {
    Bounds::from_corners(transform.to_canvas(start), transform.to_canvas(current))
}

/// Ids of tasks whose centre lies inside `rect` (canvas space).
pub fn tasks_with_center_in(tasks: &[Task], rect: &Bounds) -> Vec<TaskId> {
    tasks
        .iter()
        .filter(|t| rect.contains_point(t.center()))
        .map(|t| t.id.clone())
        .collect()
}

/// Side whose connection point handle is under `screen`, if any.
pub fn connection_point_at(task: &Task, screen: Position, transform: &CanvasTransform) -> Option<Side> {
    [Side::Top, Side::Right, Side::Bottom, Side::Left]
        .into_iter()
        .find(|side| transform.to_screen(task_anchor_point(task, *side)).distance_to(screen) <= CONNECTION_POINT_RADIUS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drag_position_divides_by_zoom() {
        let moved = drag_position(Position::new(100.0, 100.0), Position::new(10.0, 10.0), Position::new(60.0, -40.0), 2.0);
        assert_eq!(moved, Position::new(125.0, 75.0));
    }

    #[test]
    fn test_snap_to_grid() {
        assert_eq!(snap_to_grid(Position::new(29.0, 31.0), 20.0), Position::new(20.0, 40.0));
        assert_eq!(snap_to_grid(Position::new(29.0, 31.0), 0.0), Position::new(29.0, 31.0));
    }

    #[test]
    fn test_box_selection_uses_centres() {
        let tasks = vec![
            Task::with_id("in", "in", Position::new(0.0, 0.0)),
            Task::with_id("partly", "partly", Position::new(200.0, 0.0)),
        ];
        let transform = CanvasTransform::default();
        let rect = selection_rect(Position::new(300.0, 200.0), Position::new(-10.0, -10.0), &transform);
        assert_eq!(tasks_with_center_in(&tasks, &rect), vec!["in"]);
    }

    #[test]
    fn test_connection_point_hit() {
        let task = Task::with_id("a", "a", Position::new(0.0, 0.0));
        let transform = CanvasTransform::new(Position::new(50.0, 0.0), 1.0);
        // Right anchor at canvas (280, 60), screen (330, 60).
        assert_eq!(connection_point_at(&task, Position::new(333.0, 62.0), &transform), Some(Side::Right));
        assert_eq!(connection_point_at(&task, Position::new(200.0, 60.0), &transform), None);
    }

    #[test]
    fn test_message_expiry() {
        let message = TransientMessage::new(MessageSeverity::Error, "nope", Duration::from_millis(3000));
        assert!(!message.is_expired_at(message.shown_at + Duration::from_millis(2999)));
        assert!(message.is_expired_at(message.shown_at + Duration::from_millis(3000)));
    }
}
