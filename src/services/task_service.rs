use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::error_handling::{CanvasError, CanvasResult};
use super::history::{History, HistoryOutcome, Operation, OperationKind};
use super::task_store::{RemovedTask, TaskStore};
use crate::domain::connection::{Connection, ConnectionId, ConnectionPatch, ConnectionType};
use crate::domain::connection_validation::{validate_connection, ValidationWarning};
use crate::domain::dependency::DependencyGraph;
use crate::domain::task::{Position, Priority, Task, TaskId, TaskPatch, TaskStatus};

/// What a successful `connect` did.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectOutcome {
    pub connection_id: ConnectionId,
    /// True when an existing connection between the same endpoints had its
    /// type replaced instead of a new connection being inserted.
    pub replaced: bool,
    pub warning: Option<ValidationWarning>,
}

/// Owns the task store and the undo/redo log. Every mutation that goes
/// through here is recorded, and bumps `revision` so dependants such as
/// the spatial index know to rebuild.
#[derive(Debug, Clone, Default)]
pub struct TaskService {
    store: TaskStore,
    history: History,
    revision: u64,
}

impl TaskService {
    pub fn new(max_history: usize) -> Self {
        Self {
            store: TaskStore::new(),
            history: History::new(max_history),
            revision: 0,
        }
    }

    pub fn with_store(store: TaskStore, max_history: usize) -> Self {
        Self {
            store,
            history: History::new(max_history),
            revision: 0,
        }
    }

    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    pub fn tasks(&self) -> &[Task] {
        self.store.tasks()
    }

    pub fn connections(&self) -> &[Connection] {
        self.store.connections()
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.store.task(id)
    }

    pub fn selection(&self) -> &[TaskId] {
        self.store.selection()
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// Monotonic counter bumped on every task or connection change.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn touch(&mut self) {
        self.revision += 1;
    }

    fn require_task(&self, id: &str) -> CanvasResult<&Task> {
        self.store
            .task(id)
            .ok_or_else(|| CanvasError::TaskNotFound { id: id.to_string() })
    }

    // Tasks

    pub fn create_task(&mut self, title: impl Into<String>, position: Position) -> TaskId {
        let task = Task::new(title, position);
        let id = task.id.clone();
        self.insert_task(task);
        id
    }

    /// Add a fully built task. Fails if a task with the same id exists.
    pub fn add_task(&mut self, task: Task) -> CanvasResult<TaskId> {
        if self.store.contains_task(&task.id) {
            return Err(CanvasError::DuplicateTaskId { id: task.id });
        }
        let id = task.id.clone();
        self.insert_task(task);
        Ok(id)
    }

    fn insert_task(&mut self, task: Task) {
        let description = format!("Create task \"{}\"", task.title);
        let index = self.store.insert_task(None, task.clone());
        debug!(task_id = %task.id, index, "Task created");
        self.history
            .record(Operation::new(OperationKind::CreateTask { task, index }, description));
        self.touch();
    }

    pub fn update_task(&mut self, id: &str, patch: TaskPatch) -> CanvasResult<()> {
        if patch.is_empty() {
            return Ok(());
        }
        let before = self.require_task(id)?.clone();
        let mut after = before.clone();
        after.apply(patch);

        let description = format!("Update task \"{}\"", after.title);
        self.store.replace_task(after.clone());
        self.history
            .record(Operation::new(OperationKind::UpdateTask { before, after }, description));
        self.touch();
        Ok(())
    }

    /// Move a task and record the move as one operation.
    pub fn move_task(&mut self, id: &str, position: Position) -> CanvasResult<()> {
        let task = self.require_task(id)?;
        let (start, start_updated_at) = (task.position, task.updated_at);
        self.preview_move(id, position)?;
        self.commit_move(id, start, start_updated_at)?;
        Ok(())
    }

    /// Reposition a task without recording history. Used while a drag is
    /// in progress; `commit_move` records the whole gesture.
    pub fn preview_move(&mut self, id: &str, position: Position) -> CanvasResult<()> {
        let task = self
            .store
            .task_mut(id)
            .ok_or_else(|| CanvasError::TaskNotFound { id: id.to_string() })?;
        task.set_position(position);
        self.touch();
        Ok(())
    }

    /// Record a finished drag from `start` to the task's current position.
    /// Returns false, recording nothing, if the task did not move.
    pub fn commit_move(
        &mut self,
        id: &str,
        start: Position,
        start_updated_at: DateTime<Utc>,
    ) -> CanvasResult<bool> {
        let task = self.require_task(id)?;
        if task.position == start {
            return Ok(false);
        }

        let operation = Operation::new(
            OperationKind::MoveTask {
                task_id: id.to_string(),
                from: start,
                to: task.position,
                before_updated_at: start_updated_at,
                after_updated_at: task.updated_at,
            },
            format!("Move task \"{}\"", task.title),
        );
        debug!(task_id = %id, x = task.position.x, y = task.position.y, "Move committed");
        self.history.record(operation);
        Ok(true)
    }

    pub fn remove_task(&mut self, id: &str) -> CanvasResult<RemovedTask> {
        let removed = self
            .store
            .remove_task(id)
            .ok_or_else(|| CanvasError::TaskNotFound { id: id.to_string() })?;
        let description = format!("Delete task \"{}\"", removed.task.title);
        self.history
            .record(Operation::new(OperationKind::DeleteTask(removed.clone()), description));
        self.touch();
        Ok(removed)
    }

    /// Remove several tasks as a single undoable step. Unknown ids are
    /// skipped. Returns how many tasks were removed.
    pub fn remove_tasks(&mut self, ids: &[TaskId]) -> usize {
        self.history.begin_batch();
        let removed = ids
            .iter()
            .filter(|id| self.remove_task(id).is_ok())
            .count();
        self.history.end_batch(format!("Delete {} tasks", removed));
        if removed > 0 {
            info!(count = removed, "Tasks deleted");
        }
        removed
    }

    pub fn delete_selection(&mut self) -> usize {
        let ids = self.store.selection().to_vec();
        self.remove_tasks(&ids)
    }

    fn patch_selection(&mut self, patch: TaskPatch, description: String) -> usize {
        let ids = self.store.selection().to_vec();
        self.history.begin_batch();
        let updated = ids
            .iter()
            .filter(|id| self.update_task(id, patch.clone()).is_ok())
            .count();
        self.history.end_batch(description);
        updated
    }

    pub fn set_status_for_selection(&mut self, status: TaskStatus) -> usize {
        self.patch_selection(TaskPatch::status(status), format!("Set status to {}", status.as_str()))
    }

    pub fn set_priority_for_selection(&mut self, priority: Priority) -> usize {
        self.patch_selection(
            TaskPatch::priority(priority),
            format!("Set priority to {}", priority.as_str()),
        )
    }

    // Connections

    /// Validate and add a `from -> to` connection. A same-endpoint,
    /// different-type request replaces the type of the existing
    /// connection. Rejections leave the store untouched.
    pub fn connect(&mut self, from: &str, to: &str, kind: ConnectionType) -> CanvasResult<ConnectOutcome> {
        let outcome = validate_connection(from, to, kind, self.store.connections(), self.store.tasks())?;
        let warning = outcome.warning().cloned();

        if let Some(ValidationWarning::ReplaceType { connection_id, .. }) = &warning {
            self.update_connection(connection_id, ConnectionPatch { kind: Some(kind), style: None })?;
            return Ok(ConnectOutcome {
                connection_id: connection_id.clone(),
                replaced: true,
                warning,
            });
        }

        let connection = Connection::new(from, to, kind);
        let connection_id = connection.id.clone();
        let index = self.store.insert_connection(None, connection.clone());
        info!(connection_id = %connection_id, from, to, kind = kind.as_str(), "Connection created");
        self.history.record(Operation::new(
            OperationKind::CreateConnection { connection, index },
            format!("Create {} connection", kind.label()),
        ));
        self.touch();

        Ok(ConnectOutcome {
            connection_id,
            replaced: false,
            warning,
        })
    }

    pub fn update_connection(&mut self, id: &str, patch: ConnectionPatch) -> CanvasResult<()> {
        let before = self
            .store
            .connection(id)
            .cloned()
            .ok_or_else(|| CanvasError::ConnectionNotFound { id: id.to_string() })?;
        let mut after = before.clone();
        after.apply(patch);
        if after == before {
            return Ok(());
        }

        let description = format!("Change connection to {}", after.kind.label());
        self.store.replace_connection(after.clone());
        self.history
            .record(Operation::new(OperationKind::UpdateConnection { before, after }, description));
        self.touch();
        Ok(())
    }

    pub fn remove_connection(&mut self, id: &str) -> CanvasResult<Connection> {
        let (index, connection) = self
            .store
            .remove_connection(id)
            .ok_or_else(|| CanvasError::ConnectionNotFound { id: id.to_string() })?;
        self.history.record(Operation::new(
            OperationKind::DeleteConnection { connection: connection.clone(), index },
            format!("Delete {} connection", connection.kind.label()),
        ));
        self.touch();
        Ok(connection)
    }

    pub fn dependency_graph(&self) -> DependencyGraph {
        let mut graph = DependencyGraph::from_connections(self.store.connections());
        for task in self.store.tasks() {
            graph.add_task(&task.id);
        }
        graph
    }

    // Undo / redo

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn undo(&mut self) -> CanvasResult<HistoryOutcome> {
        let Some(operation) = self.history.pop_undo() else {
            return Ok(HistoryOutcome::Empty);
        };

        self.history.pause();
        let result = operation.revert(&mut self.store);
        self.history.resume();
        self.touch();

        if let Err(error) = result {
            warn!(operation = %operation.description, error = %error, "Undo failed");
            return Err(error);
        }

        debug!(operation = %operation.description, "Undone");
        let description = operation.description.clone();
        self.history.push_redo(operation);
        Ok(HistoryOutcome::Undone(description))
    }

    pub fn redo(&mut self) -> CanvasResult<HistoryOutcome> {
        let Some(operation) = self.history.pop_redo() else {
            return Ok(HistoryOutcome::Empty);
        };

        self.history.pause();
        let result = operation.apply(&mut self.store);
        self.history.resume();
        self.touch();

        if let Err(error) = result {
            warn!(operation = %operation.description, error = %error, "Redo failed");
            return Err(error);
        }

        debug!(operation = %operation.description, "Redone");
        let description = operation.description.clone();
        self.history.push_undo(operation);
        Ok(HistoryOutcome::Redone(description))
    }

    // Selection

    pub fn select(&mut self, id: &str) -> bool {
        self.store.select(id)
    }

    pub fn toggle_selection(&mut self, id: &str) -> bool {
        self.store.toggle_selection(id)
    }

    pub fn set_selection<I, S>(&mut self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.store.set_selection(ids);
    }

    pub fn clear_selection(&mut self) {
        self.store.clear_selection();
    }

    // Bulk

    /// Replace every task and connection, e.g. after an import. History is
    /// cleared since its entries no longer describe the new contents.
    pub fn replace_all(&mut self, tasks: Vec<Task>, connections: Vec<Connection>) {
        info!(tasks = tasks.len(), connections = connections.len(), "Canvas contents replaced");
        self.store.replace_all(tasks, connections);
        self.history.clear();
        self.touch();
    }

    /// Append tasks and connections as one undoable step. Entities whose id
    /// already exists are skipped.
    pub fn merge(&mut self, tasks: Vec<Task>, connections: Vec<Connection>) -> (usize, usize) {
        self.history.begin_batch();
        let added_tasks = tasks
            .into_iter()
            .filter(|task| self.add_task(task.clone()).is_ok())
            .count();

        let mut added_connections = 0;
        for connection in connections {
            if self.store.connection(&connection.id).is_some() {
                continue;
            }
            let index = self.store.insert_connection(None, connection.clone());
            self.history.record(Operation::new(
                OperationKind::CreateConnection { connection, index },
                "Import connection",
            ));
            added_connections += 1;
        }
        self.history
            .end_batch(format!("Import {} tasks and {} connections", added_tasks, added_connections));
        self.touch();
        (added_tasks, added_connections)
    }

    pub fn clear_all(&mut self) {
        info!("All tasks and connections cleared");
        self.store.clear();
        self.history.clear();
        self.touch();
    }
}
