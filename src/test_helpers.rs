// Test helpers for integration testing

use crate::canvas::session::CanvasSession;
use crate::canvas::transform::ContainerSize;
use crate::config::CanvasConfig;
use crate::domain::connection::{Connection, ConnectionType};
use crate::domain::task::{Position, Task};

pub const TEST_CONTAINER: ContainerSize = ContainerSize {
    width: 1200.0,
    height: 800.0,
};

pub fn task_at(id: &str, x: f64, y: f64) -> Task {
    Task::with_id(id, format!("Task {}", id), Position::new(x, y))
}

pub fn connection(id: &str, from: &str, to: &str, kind: ConnectionType) -> Connection {
    Connection::with_id(id, from, to, kind)
}

/// Tasks laid out left to right, 400 units apart.
pub fn row_of_tasks(ids: &[&str]) -> Vec<Task> {
    ids.iter()
        .enumerate()
        .map(|(i, id)| task_at(id, i as f64 * 400.0, 0.0))
        .collect()
}

pub struct TestContext {
    pub session: CanvasSession,
}

impl TestContext {
    pub fn new_for_test() -> Self {
        Self::with_config(CanvasConfig::default())
    }

    pub fn with_config(config: CanvasConfig) -> Self {
        let mut session = CanvasSession::new(config);
        session.set_container_size(Some(TEST_CONTAINER));
        Self { session }
    }

    /// Add tasks directly, without going through undo history.
    pub fn with_tasks(mut self, tasks: Vec<Task>) -> Self {
        self.session.service_mut().replace_all(tasks, Vec::new());
        self
    }

    pub fn task_ids(&self) -> Vec<String> {
        self.session
            .service()
            .tasks()
            .iter()
            .map(|t| t.id.clone())
            .collect()
    }
}
