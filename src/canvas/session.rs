use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::bounds::Bounds;
use super::culling::{RenderStats, ViewportCuller};
use super::geometry::{edge_geometry, preview_path, task_anchor_point, BezierPath, EdgeGeometry};
use super::interaction::{
    connection_point_at, drag_position, selection_rect, snap_to_grid, tasks_with_center_in, HitTarget,
    InteractionEvent, InteractionState, MessageSeverity, TransientMessage, NEW_TASK_OFFSET,
};
use super::shortcuts::{resolve, Key, KeyModifiers, ShortcutAction};
use super::spatial_index::SpatialIndex;
use super::transform::{CanvasTransform, ContainerSize};
use crate::config::CanvasConfig;
use crate::domain::connection::ConnectionType;
use crate::domain::task::{Position, Task, TaskId};
use crate::services::error_handling::{CanvasError, UserErrorFormatter};
use crate::services::history::HistoryOutcome;
use crate::services::task_service::TaskService;

pub const DEFAULT_TASK_TITLE: &str = "New Task";

/// Everything the renderer needs for one frame.
#[derive(Debug, Clone)]
pub struct Frame<'a> {
    pub transform: CanvasTransform,
    pub tasks: Vec<&'a Task>,
    pub edges: Vec<EdgeGeometry>,
    /// Rubber-band curve while a connection is being dragged out.
    pub preview: Option<BezierPath>,
    /// Box-selection rectangle in screen space.
    pub selection_box: Option<Bounds>,
    pub selection: &'a [TaskId],
    pub stats: RenderStats,
}

/// One canvas: its tasks and connections, view transform, spatial index,
/// gesture state and user-facing message. Input handlers never panic and
/// every rejected gesture leaves the session idle.
#[derive(Debug)]
pub struct CanvasSession {
    config: CanvasConfig,
    service: TaskService,
    transform: CanvasTransform,
    culler: ViewportCuller,
    index: SpatialIndex,
    index_revision: Option<u64>,
    container: Option<ContainerSize>,
    connection_kind: ConnectionType,
    state: InteractionState,
    message: Option<TransientMessage>,
}

impl Default for CanvasSession {
    fn default() -> Self {
        Self::new(CanvasConfig::default())
    }
}

impl CanvasSession {
    pub fn new(config: CanvasConfig) -> Self {
        let service = TaskService::new(config.max_history);
        Self::with_service(config, service)
    }

    /// An invalid config (for example `min_zoom > max_zoom`) is replaced by
    /// the defaults.
    pub fn with_service(config: CanvasConfig, service: TaskService) -> Self {
        let config = match config.validate() {
            Ok(()) => config,
            Err(error) => {
                warn!(error = %error, "Invalid canvas config, using defaults");
                CanvasConfig::default()
            }
        };
        Self {
            transform: CanvasTransform::default().with_limits(config.min_zoom, config.max_zoom),
            culler: ViewportCuller::from_config(&config),
            service,
            index: SpatialIndex::new(),
            index_revision: None,
            container: None,
            connection_kind: ConnectionType::Strong,
            state: InteractionState::Idle,
            message: None,
            config,
        }
    }

    pub fn config(&self) -> &CanvasConfig {
        &self.config
    }

    pub fn service(&self) -> &TaskService {
        &self.service
    }

    pub fn service_mut(&mut self) -> &mut TaskService {
        &mut self.service
    }

    pub fn transform(&self) -> &CanvasTransform {
        &self.transform
    }

    pub fn state(&self) -> &InteractionState {
        &self.state
    }

    pub fn connection_kind(&self) -> ConnectionType {
        self.connection_kind
    }

    /// Type used for connections created by dragging between tasks.
    pub fn set_connection_kind(&mut self, kind: ConnectionType) {
        self.connection_kind = kind;
    }

    pub fn set_culling_enabled(&mut self, enabled: bool) {
        self.culler.set_enabled(enabled);
    }

    /// Current message, unless it has expired.
    pub fn message(&self) -> Option<&TransientMessage> {
        self.message.as_ref().filter(|m| !m.is_expired_at(Instant::now()))
    }

    pub fn dismiss_message(&mut self) {
        self.message = None;
    }

    fn show_message(&mut self, severity: MessageSeverity, text: impl Into<String>) {
        let millis = match severity {
            MessageSeverity::Error => self.config.error_message_ms,
            MessageSeverity::Warning | MessageSeverity::Info => self.config.warning_message_ms,
        };
        self.message = Some(TransientMessage::new(severity, text, Duration::from_millis(millis)));
    }

    fn report(&mut self, context: &str, error: &CanvasError) -> String {
        let text = UserErrorFormatter::log_and_format(context, error);
        self.show_message(MessageSeverity::Error, text.clone());
        text
    }

    // View

    /// Container size as measured by the renderer. `None` until layout.
    pub fn set_container_size(&mut self, size: Option<ContainerSize>) {
        self.container = size;
    }

    pub fn viewport(&self) -> Bounds {
        self.transform.viewport(self.container)
    }

    fn container_center(&self) -> Option<Position> {
        self.container.map(|c| Position::new(c.width / 2.0, c.height / 2.0))
    }

    pub fn zoom_in(&mut self) -> bool {
        let anchor = self.container_center();
        self.transform.zoom_by(self.config.zoom_step, anchor)
    }

    pub fn zoom_out(&mut self) -> bool {
        let anchor = self.container_center();
        self.transform.zoom_by(-self.config.zoom_step, anchor)
    }

    /// Wheel zoom about the cursor (screen space).
    pub fn wheel(&mut self, delta_y: f64, cursor: Position) -> bool {
        self.transform
            .zoom_wheel(delta_y, cursor, self.config.wheel_zoom_sensitivity)
    }

    /// Fit every task into the container. No-op without tasks or before the
    /// container has been measured.
    pub fn fit_to_content(&mut self) -> bool {
        let Some(container) = self.container else {
            debug!("Fit skipped, container not measured");
            return false;
        };
        self.ensure_index();
        let content = self.index.global_bounds(self.service.tasks());
        self.transform.fit_to(content, container, self.config.fit_padding)
    }

    pub fn reset_view(&mut self) {
        self.transform.reset();
    }

    // Spatial index

    /// Rebuild the index if tasks or connections changed since the last
    /// build.
    pub fn ensure_index(&mut self) {
        let revision = self.service.revision();
        if self.index_revision != Some(revision) {
            self.index.build(self.service.tasks(), self.service.connections());
            self.index_revision = Some(revision);
        }
    }

    pub fn index(&self) -> &SpatialIndex {
        &self.index
    }

    /// Topmost thing under a screen point. Connection points win over task
    /// bodies; later tasks are drawn above earlier ones.
    pub fn hit_test(&mut self, screen: Position) -> HitTarget {
        self.ensure_index();
        let canvas = self.transform.to_canvas(screen);
        let radius = self.config.near_point_radius / self.transform.zoom;
        let candidates = self.index.query_near_point(canvas, radius, self.service.tasks());

        let tasks = self.service.tasks();
        let ordered = tasks.iter().rev().filter(|t| candidates.contains(&t.id));

        for task in ordered.clone() {
            if let Some(side) = connection_point_at(task, screen, &self.transform) {
                return HitTarget::ConnectionPoint {
                    task_id: task.id.clone(),
                    side,
                };
            }
        }
        for task in ordered {
            if task.bounds().contains_point(canvas) {
                return HitTarget::TaskBody(task.id.clone());
            }
        }
        HitTarget::Canvas
    }

    // Pointer input

    pub fn pointer_down(&mut self, screen: Position, target: HitTarget, modifiers: KeyModifiers) -> InteractionEvent {
        if !self.state.is_idle() {
            return InteractionEvent::Ignored;
        }

        match target {
            HitTarget::TaskBody(task_id) => {
                if modifiers.is_command() {
                    self.service.toggle_selection(&task_id);
                    return InteractionEvent::SelectionChanged;
                }
                let Some(task) = self.service.task(&task_id) else {
                    return InteractionEvent::Ignored;
                };
                let (start_position, start_updated_at) = (task.position, task.updated_at);
                if !self.service.store().is_selected(&task_id) {
                    self.service.set_selection([task_id.as_str()]);
                }
                self.state = InteractionState::DraggingTask {
                    task_id,
                    start_pointer: screen,
                    start_position,
                    start_updated_at,
                    moved: false,
                };
            }
            HitTarget::ConnectionPoint { task_id, side } => {
                let Some(task) = self.service.task(&task_id) else {
                    return InteractionEvent::Ignored;
                };
                let anchor = self.transform.to_screen(task_anchor_point(task, side));
                self.state = InteractionState::Connecting {
                    source: task_id,
                    side,
                    anchor,
                    pointer: screen,
                };
            }
            HitTarget::Canvas if modifiers.shift => {
                self.state = InteractionState::BoxSelecting {
                    start: screen,
                    current: screen,
                };
            }
            HitTarget::Canvas => {
                self.service.clear_selection();
                self.state = InteractionState::Panning {
                    start_pointer: screen,
                    start_pan: self.transform.pan,
                };
            }
        }

        debug!(state = self.state.name(), "Gesture started");
        InteractionEvent::StateChanged
    }

    /// `hover` is what the pointer is currently over, if the renderer knows.
    pub fn pointer_move(&mut self, screen: Position, hover: Option<HitTarget>) -> InteractionEvent {
        match &mut self.state {
            InteractionState::Idle => InteractionEvent::Ignored,
            InteractionState::Panning {
                start_pointer,
                start_pan,
            } => {
                self.transform.pan = start_pan.offset(screen.x - start_pointer.x, screen.y - start_pointer.y);
                InteractionEvent::PanChanged
            }
            InteractionState::DraggingTask {
                task_id,
                start_pointer,
                start_position,
                moved,
                ..
            } => {
                let mut position = drag_position(*start_position, *start_pointer, screen, self.transform.zoom);
                if self.config.snap_to_grid {
                    position = snap_to_grid(position, self.config.grid_size);
                }
                let task_id = task_id.clone();
                *moved = true;
                match self.service.preview_move(&task_id, position) {
                    Ok(()) => InteractionEvent::TaskMoved(task_id),
                    Err(error) => {
                        warn!(task_id = %task_id, error = %error, "Dragged task disappeared");
                        self.state = InteractionState::Idle;
                        InteractionEvent::Cancelled
                    }
                }
            }
            InteractionState::BoxSelecting { current, .. } => {
                *current = screen;
                InteractionEvent::StateChanged
            }
            InteractionState::Connecting { source, pointer, .. } => {
                *pointer = screen;
                match hover {
                    Some(HitTarget::ConnectionPoint { task_id, .. }) if task_id != *source => {
                        let source = source.clone();
                        self.finish_connection(&source, &task_id)
                    }
                    _ => InteractionEvent::StateChanged,
                }
            }
        }
    }

    pub fn pointer_up(&mut self, screen: Position, target: HitTarget) -> InteractionEvent {
        let state = std::mem::replace(&mut self.state, InteractionState::Idle);
        match state {
            InteractionState::Idle => InteractionEvent::Ignored,
            InteractionState::Panning { .. } => InteractionEvent::StateChanged,
            InteractionState::DraggingTask {
                task_id,
                start_position,
                start_updated_at,
                moved,
                ..
            } => {
                if !moved {
                    return InteractionEvent::StateChanged;
                }
                match self.service.commit_move(&task_id, start_position, start_updated_at) {
                    Ok(true) => InteractionEvent::MoveCommitted(task_id),
                    Ok(false) => InteractionEvent::StateChanged,
                    Err(error) => {
                        self.report("commit move", &error);
                        InteractionEvent::Cancelled
                    }
                }
            }
            InteractionState::BoxSelecting { start, .. } => {
                let rect = selection_rect(start, screen, &self.transform);
                let ids = tasks_with_center_in(self.service.tasks(), &rect);
                let count = ids.len();
                self.service.set_selection(ids);
                debug!(count, "Box selection finished");
                InteractionEvent::TasksSelected(count)
            }
            InteractionState::Connecting { source, .. } => match target {
                HitTarget::ConnectionPoint { task_id, .. } if task_id != source => {
                    self.finish_connection(&source, &task_id)
                }
                _ => {
                    debug!(source = %source, "Connection cancelled");
                    InteractionEvent::Cancelled
                }
            },
        }
    }

    fn finish_connection(&mut self, from: &str, to: &str) -> InteractionEvent {
        self.state = InteractionState::Idle;
        match self.service.connect(from, to, self.connection_kind) {
            Ok(outcome) => {
                if let Some(warning) = &outcome.warning {
                    self.show_message(MessageSeverity::Warning, warning.to_string());
                }
                InteractionEvent::ConnectionCreated(outcome)
            }
            Err(error) => InteractionEvent::ConnectionRejected(self.report("connect", &error)),
        }
    }

    /// Double-click on empty canvas creates a task centred on the pointer.
    pub fn double_click(&mut self, screen: Position, target: HitTarget) -> Option<TaskId> {
        if target != HitTarget::Canvas || !self.state.is_idle() {
            return None;
        }
        let canvas = self.transform.to_canvas(screen);
        let mut position = canvas.offset(-NEW_TASK_OFFSET.x, -NEW_TASK_OFFSET.y);
        if self.config.snap_to_grid {
            position = snap_to_grid(position, self.config.grid_size);
        }
        let id = self.service.create_task(DEFAULT_TASK_TITLE, position);
        self.service.set_selection([id.as_str()]);
        info!(task_id = %id, x = position.x, y = position.y, "Task created from canvas");
        Some(id)
    }

    // Keyboard input

    pub fn key_down(&mut self, key: Key, modifiers: KeyModifiers) -> InteractionEvent {
        let has_selection = !self.service.selection().is_empty();
        let Some(action) = resolve(key, modifiers, has_selection) else {
            return InteractionEvent::Ignored;
        };
        if !self.state.is_idle() && action.edits_canvas() {
            debug!(?action, state = self.state.name(), "Shortcut ignored during gesture");
            return InteractionEvent::Ignored;
        }
        debug!(?action, "Shortcut");

        match action {
            ShortcutAction::Undo => self.undo(),
            ShortcutAction::Redo => self.redo(),
            ShortcutAction::ZoomIn => self.zoom_event(true),
            ShortcutAction::ZoomOut => self.zoom_event(false),
            ShortcutAction::FitToView => {
                if self.fit_to_content() {
                    InteractionEvent::ZoomChanged
                } else {
                    InteractionEvent::Ignored
                }
            }
            ShortcutAction::DeleteSelection => InteractionEvent::TasksDeleted(self.service.delete_selection()),
            ShortcutAction::Cancel => self.cancel(),
            ShortcutAction::SetStatus(status) => {
                InteractionEvent::TasksUpdated(self.service.set_status_for_selection(status))
            }
            ShortcutAction::SetPriority(priority) => {
                InteractionEvent::TasksUpdated(self.service.set_priority_for_selection(priority))
            }
        }
    }

    fn zoom_event(&mut self, zoom_in: bool) -> InteractionEvent {
        let changed = if zoom_in { self.zoom_in() } else { self.zoom_out() };
        if changed {
            InteractionEvent::ZoomChanged
        } else {
            InteractionEvent::Ignored
        }
    }

    /// Abort box selection or connecting. When idle, clear the selection.
    /// Drags and pans only end on pointer-up.
    pub fn cancel(&mut self) -> InteractionEvent {
        match self.state {
            InteractionState::BoxSelecting { .. } | InteractionState::Connecting { .. } => {
                debug!(state = self.state.name(), "Gesture cancelled");
                self.state = InteractionState::Idle;
                InteractionEvent::Cancelled
            }
            InteractionState::Idle => {
                self.service.clear_selection();
                InteractionEvent::SelectionChanged
            }
            _ => InteractionEvent::Ignored,
        }
    }

    /// History replay is only allowed between gestures.
    pub fn undo(&mut self) -> InteractionEvent {
        if !self.state.is_idle() {
            return InteractionEvent::Ignored;
        }
        match self.service.undo() {
            Ok(HistoryOutcome::Empty) => InteractionEvent::Ignored,
            Ok(outcome) => InteractionEvent::History(outcome),
            Err(error) => {
                self.report("undo", &error);
                InteractionEvent::Cancelled
            }
        }
    }

    pub fn redo(&mut self) -> InteractionEvent {
        if !self.state.is_idle() {
            return InteractionEvent::Ignored;
        }
        match self.service.redo() {
            Ok(HistoryOutcome::Empty) => InteractionEvent::Ignored,
            Ok(outcome) => InteractionEvent::History(outcome),
            Err(error) => {
                self.report("redo", &error);
                InteractionEvent::Cancelled
            }
        }
    }

    // Rendering

    pub fn render_frame(&mut self) -> Frame<'_> {
        self.ensure_index();
        let viewport = self.viewport();
        let culled = self.culler.cull_indexed(
            &self.index,
            self.service.tasks(),
            self.service.connections(),
            &viewport,
            self.transform.zoom,
        );

        let edges = culled
            .connections
            .iter()
            .filter_map(|c| {
                edge_geometry(
                    c,
                    self.service.tasks(),
                    &self.transform,
                    self.config.arrow_distance,
                    self.config.arrow_size,
                )
            })
            .collect();

        let (preview, selection_box) = match &self.state {
            InteractionState::Connecting { anchor, pointer, .. } => (Some(preview_path(*anchor, *pointer)), None),
            InteractionState::BoxSelecting { start, current } => (None, Some(Bounds::from_corners(*start, *current))),
            _ => (None, None),
        };

        Frame {
            transform: self.transform,
            tasks: culled.tasks,
            edges,
            preview,
            selection_box,
            selection: self.service.selection(),
            stats: culled.stats,
        }
    }

    /// Drop every task, connection and history entry and return the view
    /// to its initial state.
    pub fn reset(&mut self) {
        self.service.clear_all();
        self.transform.reset();
        self.index.clear();
        self.index_revision = None;
        self.state = InteractionState::Idle;
        self.message = None;
        info!("Canvas session reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::task::TaskStatus;

    fn session_with(tasks: &[(&str, f64, f64)]) -> CanvasSession {
        let mut session = CanvasSession::default();
        session.set_container_size(Some(ContainerSize { width: 1200.0, height: 800.0 }));
        for (id, x, y) in tasks {
            session
                .service_mut()
                .add_task(Task::with_id(*id, *id, Position::new(*x, *y)))
                .unwrap();
        }
        session
    }

    #[test]
    fn test_hit_test_prefers_connection_points() {
        let mut session = session_with(&[("a", 0.0, 0.0), ("b", 100.0, 50.0)]);
        assert_eq!(
            session.hit_test(Position::new(280.0, 60.0)),
            HitTarget::ConnectionPoint { task_id: "a".into(), side: crate::canvas::geometry::Side::Right }
        );
        // Overlap: "b" was added last and is on top.
        assert_eq!(session.hit_test(Position::new(150.0, 100.0)), HitTarget::TaskBody("b".into()));
        assert_eq!(session.hit_test(Position::new(900.0, 700.0)), HitTarget::Canvas);
    }

    #[test]
    fn test_escape_clears_selection_when_idle() {
        let mut session = session_with(&[("a", 0.0, 0.0)]);
        session.service_mut().select("a");
        session.key_down(Key::Escape, KeyModifiers::NONE);
        assert!(session.service().selection().is_empty());
    }

    #[test]
    fn test_status_shortcut() {
        let mut session = session_with(&[("a", 0.0, 0.0)]);
        session.service_mut().select("a");
        assert_eq!(session.key_down(Key::Digit(4), KeyModifiers::NONE), InteractionEvent::TasksUpdated(1));
        assert_eq!(session.service().task("a").unwrap().status, TaskStatus::Done);
    }

    #[test]
    fn test_edit_shortcuts_ignored_while_dragging() {
        let mut session = session_with(&[("a", 0.0, 0.0)]);
        session.service_mut().select("a");
        session.pointer_down(Position::new(10.0, 10.0), HitTarget::TaskBody("a".into()), KeyModifiers::NONE);
        session.pointer_move(Position::new(110.0, 60.0), None);

        assert_eq!(session.key_down(Key::Char('z'), KeyModifiers::command()), InteractionEvent::Ignored);
        assert_eq!(session.key_down(Key::Delete, KeyModifiers::NONE), InteractionEvent::Ignored);
        assert_eq!(session.key_down(Key::Digit(4), KeyModifiers::NONE), InteractionEvent::Ignored);
        assert_eq!(session.undo(), InteractionEvent::Ignored);
        assert_eq!(session.key_down(Key::Equals, KeyModifiers::command()), InteractionEvent::ZoomChanged);

        session.pointer_up(Position::new(110.0, 60.0), HitTarget::Canvas);
        assert!(session.state().is_idle());
        assert!(session.message().is_none());
        assert_eq!(session.service().task("a").unwrap().status, TaskStatus::Todo);
        assert_ne!(session.service().task("a").unwrap().position, Position::new(0.0, 0.0));

        assert!(matches!(session.undo(), InteractionEvent::History(HistoryOutcome::Undone(_))));
        assert_eq!(session.service().task("a").unwrap().position, Position::new(0.0, 0.0));
    }

    #[test]
    fn test_invalid_zoom_limits_fall_back_to_defaults() {
        let config = CanvasConfig { min_zoom: 3.0, max_zoom: 1.0, ..CanvasConfig::default() };
        let mut session = CanvasSession::new(config);
        assert_eq!(session.config().min_zoom, CanvasConfig::default().min_zoom);
        assert_eq!(session.config().max_zoom, CanvasConfig::default().max_zoom);
        assert_eq!(session.transform().zoom, 1.0);

        session.wheel(-10_000.0, Position::new(0.0, 0.0));
        assert_eq!(session.transform().zoom, CanvasConfig::default().max_zoom);
    }

    #[test]
    fn test_keyboard_zoom_is_additive_and_clamped() {
        let mut session = CanvasSession::default();
        session.key_down(Key::Equals, KeyModifiers::command());
        assert!((session.transform().zoom - 1.1).abs() < 1e-9);
        for _ in 0..100 {
            session.key_down(Key::Minus, KeyModifiers::command());
        }
        assert_eq!(session.transform().zoom, session.config().min_zoom);
    }

    #[test]
    fn test_fit_requires_measured_container() {
        let mut session = session_with(&[("a", 0.0, 0.0), ("b", 3000.0, 2000.0)]);
        assert!(session.fit_to_content());
        let viewport = session.viewport();
        assert!(viewport.left <= 0.0 && viewport.right >= 3280.0);

        session.set_container_size(None);
        assert!(!session.fit_to_content());
    }

    #[test]
    fn test_render_frame_reports_culling() {
        let mut session = session_with(&[("a", 0.0, 0.0), ("b", 9000.0, 0.0)]);
        session.service_mut().connect("a", "b", ConnectionType::Strong).unwrap();
        let frame = session.render_frame();
        assert_eq!(frame.tasks.len(), 1);
        assert_eq!(frame.edges.len(), 1);
        assert_eq!(frame.stats.culled_tasks, 1);
        assert!(frame.preview.is_none());
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut session = session_with(&[("a", 0.0, 0.0)]);
        session.wheel(-200.0, Position::new(10.0, 10.0));
        session.reset();
        assert!(session.service().tasks().is_empty());
        assert!(!session.service().can_undo());
        assert_eq!(session.transform().zoom, 1.0);
        assert!(session.state().is_idle());
    }
}
