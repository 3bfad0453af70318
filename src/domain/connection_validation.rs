use std::collections::{HashMap, HashSet};

use thiserror::Error;
use tracing::debug;

use super::connection::{Connection, ConnectionId, ConnectionType};
use super::task::{Task, TaskId};

/// Reasons a proposed connection is refused. No state is mutated when one
/// of these is returned.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("A task cannot be connected to itself")]
    SelfConnection,

    #[error("Task not found: {id}")]
    TaskNotFound { id: TaskId },

    #[error("This connection would create a cyclic dependency")]
    WouldCreateCycle,

    #[error("A {kind} connection already exists between these tasks")]
    DuplicateConnection { kind: ConnectionType },
}

/// Informational results: the connection is accepted but the caller should
/// tell the user something.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationWarning {
    /// Same endpoints, different type. The caller replaces the type of the
    /// existing connection instead of inserting a new one.
    ReplaceType {
        connection_id: ConnectionId,
        existing: ConnectionType,
        requested: ConnectionType,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ValidationOutcome {
    Valid,
    ValidWithWarning(ValidationWarning),
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationWarning::ReplaceType { existing, requested, .. } => {
                write!(f, "A {} connection already exists and will be replaced by a {} connection", existing, requested)
            }
        }
    }
}

impl ValidationOutcome {
    pub fn warning(&self) -> Option<&ValidationWarning> {
        match self {
            ValidationOutcome::Valid => None,
            ValidationOutcome::ValidWithWarning(warning) => Some(warning),
        }
    }
}

/// Validate a proposed `from -> to` connection of the given type against
/// the current graph. Checks run in order and stop at the first failure:
/// self-connection, missing task, cycle, duplicate.
///
/// An existing `to -> from` edge closes a two-node cycle, so a reverse edge
/// is always rejected with [`ValidationError::WouldCreateCycle`].
pub fn validate_connection(
    from: &str,
    to: &str,
    kind: ConnectionType,
    connections: &[Connection],
    tasks: &[Task],
) -> Result<ValidationOutcome, ValidationError> {
    let result = run_checks(from, to, kind, connections, tasks);
    match &result {
        Ok(ValidationOutcome::Valid) => debug!(from, to, kind = kind.as_str(), "Connection accepted"),
        Ok(ValidationOutcome::ValidWithWarning(warning)) => {
            debug!(from, to, kind = kind.as_str(), warning = %warning, "Connection accepted with warning")
        }
        Err(error) => debug!(from, to, kind = kind.as_str(), error = %error, "Connection rejected"),
    }
    result
}

fn run_checks(
    from: &str,
    to: &str,
    kind: ConnectionType,
    connections: &[Connection],
    tasks: &[Task],
) -> Result<ValidationOutcome, ValidationError> {
    if from == to {
        return Err(ValidationError::SelfConnection);
    }

    for id in [from, to] {
        if !tasks.iter().any(|t| t.id == id) {
            return Err(ValidationError::TaskNotFound { id: id.to_string() });
        }
    }

    if would_create_cycle(from, to, connections) {
        return Err(ValidationError::WouldCreateCycle);
    }

    check_duplicates(from, to, kind, connections)
}

/// Adds `from -> to` to the adjacency of the existing edges and walks the
/// graph from `to`. Reaching a node that is still on the DFS stack means
/// the graph would contain a cycle. Iterative so deep chains cannot
/// overflow the call stack.
pub fn would_create_cycle(from: &str, to: &str, connections: &[Connection]) -> bool {
    let mut graph: HashMap<&str, Vec<&str>> = HashMap::new();
    for conn in connections {
        graph.entry(conn.from.as_str()).or_default().push(conn.to.as_str());
    }
    graph.entry(from).or_default().push(to);

    let mut visited: HashSet<&str> = HashSet::new();
    let mut on_stack: HashSet<&str> = HashSet::new();
    let mut stack: Vec<(&str, usize)> = vec![(to, 0)];
    visited.insert(to);
    on_stack.insert(to);

    while let Some(top) = stack.last_mut() {
        let node = top.0;
        let next = graph.get(node).and_then(|n| n.get(top.1)).copied();
        top.1 += 1;

        match next {
            Some(next) => {
                if on_stack.contains(next) {
                    return true;
                }
                if visited.insert(next) {
                    on_stack.insert(next);
                    stack.push((next, 0));
                }
            }
            None => {
                on_stack.remove(node);
                stack.pop();
            }
        }
    }

    false
}

fn check_duplicates(
    from: &str,
    to: &str,
    kind: ConnectionType,
    connections: &[Connection],
) -> Result<ValidationOutcome, ValidationError> {
    if let Some(existing) = connections.iter().find(|c| c.from == from && c.to == to) {
        if existing.kind == kind {
            return Err(ValidationError::DuplicateConnection { kind });
        }
        return Ok(ValidationOutcome::ValidWithWarning(ValidationWarning::ReplaceType {
            connection_id: existing.id.clone(),
            existing: existing.kind,
            requested: kind,
        }));
    }

    Ok(ValidationOutcome::Valid)
}
