use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use tracing::{debug, warn};
use uuid::Uuid;

use super::error_handling::{CanvasError, CanvasResult};
use super::task_store::{RemovedTask, TaskStore};
use crate::domain::connection::Connection;
use crate::domain::task::{Position, Task, TaskId};

pub const DEFAULT_MAX_HISTORY: usize = 50;

/// One recorded, invertible mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub kind: OperationKind,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OperationKind {
    CreateTask {
        task: Task,
        index: usize,
    },
    UpdateTask {
        before: Task,
        after: Task,
    },
    DeleteTask(RemovedTask),
    MoveTask {
        task_id: TaskId,
        from: Position,
        to: Position,
        before_updated_at: DateTime<Utc>,
        after_updated_at: DateTime<Utc>,
    },
    CreateConnection {
        connection: Connection,
        index: usize,
    },
    UpdateConnection {
        before: Connection,
        after: Connection,
    },
    DeleteConnection {
        connection: Connection,
        index: usize,
    },
    Batch(Vec<Operation>),
}

/// Result of an undo or redo request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum HistoryOutcome {
    Undone(String),
    Redone(String),
    /// The relevant stack was empty; nothing changed.
    Empty,
}

impl Operation {
    pub fn new(kind: OperationKind, description: impl Into<String>) -> Self {
        Self {
            id: format!("op-{}", Uuid::new_v4()),
            timestamp: Utc::now(),
            kind,
            description: description.into(),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            OperationKind::CreateTask { .. } => "create_task",
            OperationKind::UpdateTask { .. } => "update_task",
            OperationKind::DeleteTask(_) => "delete_task",
            OperationKind::MoveTask { .. } => "move_task",
            OperationKind::CreateConnection { .. } => "create_connection",
            OperationKind::UpdateConnection { .. } => "update_connection",
            OperationKind::DeleteConnection { .. } => "delete_connection",
            OperationKind::Batch(_) => "batch",
        }
    }

    /// Replay the operation forwards.
    pub fn apply(&self, store: &mut TaskStore) -> CanvasResult<()> {
        match &self.kind {
            OperationKind::CreateTask { task, index } => {
                store.insert_task(Some(*index), task.clone());
            }
            OperationKind::UpdateTask { after, .. } => {
                store
                    .replace_task(after.clone())
                    .ok_or_else(|| CanvasError::TaskNotFound { id: after.id.clone() })?;
            }
            OperationKind::DeleteTask(removed) => {
                store
                    .remove_task(&removed.task.id)
                    .ok_or_else(|| CanvasError::TaskNotFound { id: removed.task.id.clone() })?;
            }
            OperationKind::MoveTask {
                task_id,
                to,
                after_updated_at,
                ..
            } => {
                if !store.place_task(task_id, *to, *after_updated_at) {
                    return Err(CanvasError::TaskNotFound { id: task_id.clone() });
                }
            }
            OperationKind::CreateConnection { connection, index } => {
                store.insert_connection(Some(*index), connection.clone());
            }
            OperationKind::UpdateConnection { after, .. } => {
                store
                    .replace_connection(after.clone())
                    .ok_or_else(|| CanvasError::ConnectionNotFound { id: after.id.clone() })?;
            }
            OperationKind::DeleteConnection { connection, .. } => {
                store
                    .remove_connection(&connection.id)
                    .ok_or_else(|| CanvasError::ConnectionNotFound { id: connection.id.clone() })?;
            }
            OperationKind::Batch(operations) => {
                for operation in operations {
                    operation.apply(store)?;
                }
            }
        }
        Ok(())
    }

    /// Apply the exact inverse of the operation.
    pub fn revert(&self, store: &mut TaskStore) -> CanvasResult<()> {
        match &self.kind {
            OperationKind::CreateTask { task, .. } => {
                store
                    .remove_task(&task.id)
                    .ok_or_else(|| CanvasError::TaskNotFound { id: task.id.clone() })?;
            }
            OperationKind::UpdateTask { before, .. } => {
                store
                    .replace_task(before.clone())
                    .ok_or_else(|| CanvasError::TaskNotFound { id: before.id.clone() })?;
            }
            OperationKind::DeleteTask(removed) => {
                store.restore_task(removed.clone());
            }
            OperationKind::MoveTask {
                task_id,
                from,
                before_updated_at,
                ..
            } => {
                if !store.place_task(task_id, *from, *before_updated_at) {
                    return Err(CanvasError::TaskNotFound { id: task_id.clone() });
                }
            }
            OperationKind::CreateConnection { connection, .. } => {
                store
                    .remove_connection(&connection.id)
                    .ok_or_else(|| CanvasError::ConnectionNotFound { id: connection.id.clone() })?;
            }
            OperationKind::UpdateConnection { before, .. } => {
                store
                    .replace_connection(before.clone())
                    .ok_or_else(|| CanvasError::ConnectionNotFound { id: before.id.clone() })?;
            }
            OperationKind::DeleteConnection { connection, index } => {
                store.insert_connection(Some(*index), connection.clone());
            }
            OperationKind::Batch(operations) => {
                for operation in operations.iter().rev() {
                    operation.revert(store)?;
                }
            }
        }
        Ok(())
    }
}

/// Bounded undo/redo log.
///
/// Recording a new operation clears the redo stack. When the undo stack is
/// full the oldest entry is dropped. While a batch is open, recorded
/// operations are collected and pushed as a single `Batch` entry by
/// `end_batch`.
#[derive(Debug, Clone)]
pub struct History {
    undo_stack: VecDeque<Operation>,
    redo_stack: Vec<Operation>,
    max_size: usize,
    recording: bool,
    batch: Option<Vec<Operation>>,
}

impl Default for History {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HISTORY)
    }
}

impl History {
    pub fn new(max_size: usize) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: Vec::new(),
            max_size: max_size.max(1),
            recording: true,
            batch: None,
        }
    }

    pub fn record(&mut self, operation: Operation) {
        if !self.recording {
            debug!(kind = operation.kind_name(), "Recording paused, operation dropped");
            return;
        }
        if let Some(batch) = self.batch.as_mut() {
            batch.push(operation);
            return;
        }
        debug!(
            kind = operation.kind_name(),
            description = %operation.description,
            "Operation recorded"
        );
        self.push_undo(operation);
        self.redo_stack.clear();
    }

    pub fn begin_batch(&mut self) {
        if self.batch.is_some() {
            warn!("Batch already open; nested batches are flattened");
            return;
        }
        self.batch = Some(Vec::new());
    }

    /// Close the open batch. An empty batch records nothing.
    pub fn end_batch(&mut self, description: impl Into<String>) {
        let Some(operations) = self.batch.take() else {
            return;
        };
        if operations.is_empty() {
            return;
        }
        self.record(Operation::new(OperationKind::Batch(operations), description));
    }

    pub fn is_batching(&self) -> bool {
        self.batch.is_some()
    }

    pub fn pause(&mut self) {
        self.recording = false;
    }

    pub fn resume(&mut self) {
        self.recording = true;
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_description(&self) -> Option<&str> {
        self.undo_stack.back().map(|op| op.description.as_str())
    }

    pub fn redo_description(&self) -> Option<&str> {
        self.redo_stack.last().map(|op| op.description.as_str())
    }

    pub fn undo_len(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub(crate) fn pop_undo(&mut self) -> Option<Operation> {
        self.undo_stack.pop_back()
    }

    pub(crate) fn pop_redo(&mut self) -> Option<Operation> {
        self.redo_stack.pop()
    }

    pub(crate) fn push_redo(&mut self, operation: Operation) {
        self.redo_stack.push(operation);
    }

    /// Push onto the undo stack without touching the redo stack.
    pub(crate) fn push_undo(&mut self, operation: Operation) {
        self.undo_stack.push_back(operation);
        while self.undo_stack.len() > self.max_size {
            self.undo_stack.pop_front();
        }
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.batch = None;
    }
}
