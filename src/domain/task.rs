use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::canvas::bounds::Bounds;

/// Logical width of every task node on the canvas.
pub const TASK_NODE_WIDTH: f64 = 280.0;
/// Logical height of every task node on the canvas.
pub const TASK_NODE_HEIGHT: f64 = 120.0;

pub type TaskId = String;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: Priority,
    pub position: Position, // Top-left anchor
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subtasks: Vec<SubTask>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubTask {
    pub id: String,
    pub title: String,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "camelCase")]
pub enum TaskStatus {
    #[default]
    Todo,
    InProgress,
    Waiting,
    Done,
    Blocked,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

/// Whole-field replacement of a task. Every `Some` field overwrites the
/// current value; `updated_at` is bumped on apply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    pub position: Option<Position>,
    pub tags: Option<BTreeSet<String>>,
    pub due_date: Option<Option<DateTime<Utc>>>,
    pub progress: Option<Option<u8>>,
    pub subtasks: Option<Vec<SubTask>>,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: f64, dy: f64) -> Self {
        Self { x: self.x + dx, y: self.y + dy }
    }

    pub fn distance_to(self, other: Position) -> f64 {
        ((other.x - self.x).powi(2) + (other.y - self.y).powi(2)).sqrt()
    }
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 5] = [
        TaskStatus::Todo,
        TaskStatus::InProgress,
        TaskStatus::Waiting,
        TaskStatus::Done,
        TaskStatus::Blocked,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Todo => "todo",
            TaskStatus::InProgress => "inProgress",
            TaskStatus::Waiting => "waiting",
            TaskStatus::Done => "done",
            TaskStatus::Blocked => "blocked",
        }
    }
}

impl Priority {
    pub const ALL: [Priority; 4] = [Priority::Low, Priority::Medium, Priority::High, Priority::Urgent];

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }
}

pub fn generate_task_id() -> TaskId {
    format!("task-{}", Uuid::new_v4())
}

impl Task {
    pub fn new(title: impl Into<String>, position: Position) -> Self {
        let now = Utc::now();
        Self {
            id: generate_task_id(),
            title: title.into(),
            description: None,
            status: TaskStatus::Todo,
            priority: Priority::Medium,
            position,
            tags: BTreeSet::new(),
            due_date: None,
            created_at: now,
            updated_at: now,
            progress: None,
            subtasks: Vec::new(),
        }
    }

    pub fn with_id(id: impl Into<String>, title: impl Into<String>, position: Position) -> Self {
        Self { id: id.into(), ..Self::new(title, position) }
    }

    /// Logical bounding box using the fixed node size.
    pub fn bounds(&self) -> Bounds {
        Bounds::from_origin_size(self.position, TASK_NODE_WIDTH, TASK_NODE_HEIGHT)
    }

    pub fn center(&self) -> Position {
        Position {
            x: self.position.x + TASK_NODE_WIDTH / 2.0,
            y: self.position.y + TASK_NODE_HEIGHT / 2.0,
        }
    }

    pub fn apply(&mut self, patch: TaskPatch) {
        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(description) = patch.description {
            self.description = description;
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
        if let Some(position) = patch.position {
            self.position = position;
        }
        if let Some(tags) = patch.tags {
            self.tags = tags;
        }
        if let Some(due_date) = patch.due_date {
            self.due_date = due_date;
        }
        if let Some(progress) = patch.progress {
            self.progress = progress.map(|p| p.min(100));
        }
        if let Some(subtasks) = patch.subtasks {
            self.subtasks = subtasks;
        }
        self.updated_at = Utc::now();
    }

    pub fn set_position(&mut self, position: Position) {
        self.position = position;
        self.updated_at = Utc::now();
    }

    pub fn add_subtask(&mut self, title: impl Into<String>) -> String {
        let subtask = SubTask {
            id: format!("subtask-{}", Uuid::new_v4()),
            title: title.into(),
            completed: false,
            created_at: Utc::now(),
        };
        let id = subtask.id.clone();
        self.subtasks.push(subtask);
        self.updated_at = Utc::now();
        id
    }

    pub fn toggle_subtask(&mut self, subtask_id: &str) -> Result<bool, String> {
        let subtask = self
            .subtasks
            .iter_mut()
            .find(|s| s.id == subtask_id)
            .ok_or_else(|| "Subtask not found".to_string())?;
        subtask.completed = !subtask.completed;
        let completed = subtask.completed;
        self.updated_at = Utc::now();
        Ok(completed)
    }

    pub fn subtask_progress(&self) -> (usize, usize) {
        let total = self.subtasks.len();
        let completed = self.subtasks.iter().filter(|s| s.completed).count();
        (completed, total)
    }

    pub fn add_tag(&mut self, tag: impl Into<String>) {
        self.tags.insert(tag.into());
        self.updated_at = Utc::now();
    }

    pub fn remove_tag(&mut self, tag: &str) -> bool {
        let removed = self.tags.remove(tag);
        if removed {
            self.updated_at = Utc::now();
        }
        removed
    }

    pub fn is_overdue(&self) -> bool {
        match self.due_date {
            Some(due) => due < Utc::now() && self.status != TaskStatus::Done,
            None => false,
        }
    }
}

impl TaskPatch {
    pub fn status(status: TaskStatus) -> Self {
        Self { status: Some(status), ..Default::default() }
    }

    pub fn priority(priority: Priority) -> Self {
        Self { priority: Some(priority), ..Default::default() }
    }

    pub fn title(title: impl Into<String>) -> Self {
        Self { title: Some(title.into()), ..Default::default() }
    }

    pub fn is_empty(&self) -> bool {
        *self == TaskPatch::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_task() {
        let task = Task::new("Test Task", Position::new(10.0, 20.0));
        assert_eq!(task.title, "Test Task");
        assert_eq!(task.status, TaskStatus::Todo);
        assert_eq!(task.priority, Priority::Medium);
        assert!(task.id.starts_with("task-"));
        assert!(task.tags.is_empty());
        assert!(task.subtasks.is_empty());
        assert_eq!(task.created_at, task.updated_at);
    }

    #[test]
    fn test_bounds_and_center_use_fixed_node_size() {
        let task = Task::new("Box", Position::new(100.0, 50.0));
        let bounds = task.bounds();
        assert_eq!(bounds.left, 100.0);
        assert_eq!(bounds.top, 50.0);
        assert_eq!(bounds.right, 380.0);
        assert_eq!(bounds.bottom, 170.0);
        assert_eq!(task.center(), Position::new(240.0, 110.0));
    }

    #[test]
    fn test_apply_patch_bumps_updated_at() {
        let mut task = Task::new("Task", Position::default());
        let before = task.updated_at;
        std::thread::sleep(std::time::Duration::from_millis(2));

        task.apply(TaskPatch {
            status: Some(TaskStatus::Waiting),
            progress: Some(Some(140)),
            description: Some(Some("notes".into())),
            ..Default::default()
        });

        assert_eq!(task.status, TaskStatus::Waiting);
        assert_eq!(task.progress, Some(100));
        assert_eq!(task.description.as_deref(), Some("notes"));
        assert!(task.updated_at > before);
    }

    #[test]
    fn test_subtask_toggle_and_progress() {
        let mut task = Task::new("Main Task", Position::default());
        let id1 = task.add_subtask("Subtask 1");
        task.add_subtask("Subtask 2");
        assert_eq!(task.subtask_progress(), (0, 2));

        assert_eq!(task.toggle_subtask(&id1), Ok(true));
        assert_eq!(task.subtask_progress(), (1, 2));
        assert_eq!(task.toggle_subtask(&id1), Ok(false));
        assert!(task.toggle_subtask("missing").is_err());
    }

    #[test]
    fn test_tag_operations() {
        let mut task = Task::new("Task", Position::default());
        task.add_tag("urgent");
        task.add_tag("bug");
        task.add_tag("bug");
        assert_eq!(task.tags.len(), 2);
        assert!(task.remove_tag("bug"));
        assert!(!task.remove_tag("bug"));
    }

    #[test]
    fn test_json_field_names() {
        let task = Task::with_id("t1", "Write docs", Position::new(1.0, 2.0));
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["status"], "todo");
        assert_eq!(json["priority"], "medium");
        assert!(json.get("createdAt").is_some());
        assert!(json.get("dueDate").is_none());

        let mut in_progress = task.clone();
        in_progress.status = TaskStatus::InProgress;
        let json = serde_json::to_value(&in_progress).unwrap();
        assert_eq!(json["status"], "inProgress");
    }
}
