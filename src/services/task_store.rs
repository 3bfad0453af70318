use chrono::{DateTime, Utc};
use tracing::debug;

use crate::domain::connection::{Connection, ConnectionId};
use crate::domain::task::{Position, Task, TaskId};

/// A task taken out of the store together with everything the removal
/// cascaded to, so it can be put back exactly where it was.
#[derive(Debug, Clone, PartialEq)]
pub struct RemovedTask {
    pub task: Task,
    pub index: usize,
    /// Removed connections with their original indices, ascending.
    pub connections: Vec<(usize, Connection)>,
    pub was_selected: bool,
}

/// In-memory task and connection collections plus the current selection.
///
/// The store performs raw mutations only. It does not validate
/// connections and does not record history; `TaskService` layers both on
/// top of it.
#[derive(Debug, Clone, Default)]
pub struct TaskStore {
    tasks: Vec<Task>,
    connections: Vec<Connection>,
    selection: Vec<TaskId>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_parts(tasks: Vec<Task>, connections: Vec<Connection>) -> Self {
        Self {
            tasks,
            connections,
            selection: Vec::new(),
        }
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn task_mut(&mut self, id: &str) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }

    pub fn contains_task(&self, id: &str) -> bool {
        self.task(id).is_some()
    }

    pub fn connection(&self, id: &str) -> Option<&Connection> {
        self.connections.iter().find(|c| c.id == id)
    }

    pub fn find_connection(&self, from: &str, to: &str) -> Option<&Connection> {
        self.connections.iter().find(|c| c.from == from && c.to == to)
    }

    pub fn connections_of(&self, task_id: &str) -> Vec<&Connection> {
        self.connections.iter().filter(|c| c.touches(task_id)).collect()
    }

    /// Insert a task at `index` (clamped to the collection length), or at
    /// the end. Returns the index actually used.
    pub fn insert_task(&mut self, index: Option<usize>, task: Task) -> usize {
        let index = index.unwrap_or(self.tasks.len()).min(self.tasks.len());
        self.tasks.insert(index, task);
        index
    }

    /// Remove a task, cascading to every connection that references it and
    /// dropping it from the selection.
    pub fn remove_task(&mut self, id: &str) -> Option<RemovedTask> {
        let index = self.tasks.iter().position(|t| t.id == id)?;
        let task = self.tasks.remove(index);

        let mut connections = Vec::new();
        let mut position = 0;
        let mut kept = Vec::with_capacity(self.connections.len());
        for connection in self.connections.drain(..) {
            if connection.touches(id) {
                connections.push((position, connection));
            } else {
                kept.push(connection);
            }
            position += 1;
        }
        self.connections = kept;

        let was_selected = self.deselect(id);

        debug!(
            task_id = %id,
            index,
            cascaded_connections = connections.len(),
            "Task removed"
        );

        Some(RemovedTask {
            task,
            index,
            connections,
            was_selected,
        })
    }

    /// Put a removed task and its cascaded connections back at their
    /// original indices.
    pub fn restore_task(&mut self, removed: RemovedTask) {
        let task_id = removed.task.id.clone();
        self.insert_task(Some(removed.index), removed.task);
        for (index, connection) in removed.connections {
            self.insert_connection(Some(index), connection);
        }
        if removed.was_selected {
            self.select(&task_id);
        }
    }

    /// Replace the task with the same id. Returns the previous value.
    pub fn replace_task(&mut self, task: Task) -> Option<Task> {
        let slot = self.task_mut(&task.id)?;
        Some(std::mem::replace(slot, task))
    }

    /// Set a task's position and its `updated_at` stamp verbatim.
    pub fn place_task(&mut self, id: &str, position: Position, updated_at: DateTime<Utc>) -> bool {
        match self.task_mut(id) {
            Some(task) => {
                task.position = position;
                task.updated_at = updated_at;
                true
            }
            None => false,
        }
    }

    pub fn insert_connection(&mut self, index: Option<usize>, connection: Connection) -> usize {
        let index = index
            .unwrap_or(self.connections.len())
            .min(self.connections.len());
        self.connections.insert(index, connection);
        index
    }

    pub fn remove_connection(&mut self, id: &str) -> Option<(usize, Connection)> {
        let index = self.connections.iter().position(|c| c.id == id)?;
        Some((index, self.connections.remove(index)))
    }

    pub fn replace_connection(&mut self, connection: Connection) -> Option<Connection> {
        let slot = self.connections.iter_mut().find(|c| c.id == connection.id)?;
        Some(std::mem::replace(slot, connection))
    }

    pub fn replace_all(&mut self, tasks: Vec<Task>, connections: Vec<Connection>) {
        self.tasks = tasks;
        self.connections = connections;
        self.selection.clear();
    }

    pub fn clear(&mut self) {
        self.replace_all(Vec::new(), Vec::new());
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty() && self.connections.is_empty()
    }

    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.connections.iter().map(|c| c.id.clone()).collect()
    }

    // Selection

    pub fn selection(&self) -> &[TaskId] {
        &self.selection
    }

    pub fn is_selected(&self, id: &str) -> bool {
        self.selection.iter().any(|s| s == id)
    }

    /// Add to the selection. Unknown ids and duplicates are ignored.
    pub fn select(&mut self, id: &str) -> bool {
        if self.is_selected(id) || !self.contains_task(id) {
            return false;
        }
        self.selection.push(id.to_string());
        true
    }

    pub fn deselect(&mut self, id: &str) -> bool {
        let before = self.selection.len();
        self.selection.retain(|s| s != id);
        self.selection.len() != before
    }

    pub fn toggle_selection(&mut self, id: &str) -> bool {
        if self.is_selected(id) {
            self.deselect(id);
            false
        } else {
            self.select(id)
        }
    }

    pub fn set_selection<I, S>(&mut self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.selection.clear();
        for id in ids {
            self.select(id.as_ref());
        }
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }
}
