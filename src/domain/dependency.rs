use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Dfs, EdgeRef};
use std::collections::HashMap;

use super::connection::{Connection, ConnectionType};
use super::task::TaskId;

/// Read-only view of the connection set as a directed graph, used for
/// dependency analysis. Built on demand; never kept in sync with edits.
pub struct DependencyGraph {
    graph: DiGraph<TaskId, ConnectionType>,
    node_map: HashMap<TaskId, NodeIndex>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DependencyAnalysis {
    /// Tasks this task points at.
    pub dependencies: Vec<TaskId>,
    /// Tasks pointing at this task.
    pub dependents: Vec<TaskId>,
    /// Length of the longest outgoing path.
    pub depth: usize,
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            node_map: HashMap::new(),
        }
    }

    pub fn from_connections(connections: &[Connection]) -> Self {
        let mut graph = Self::new();
        for conn in connections {
            graph.add_connection(conn);
        }
        graph
    }

    pub fn add_task(&mut self, task_id: &str) -> NodeIndex {
        if let Some(&node) = self.node_map.get(task_id) {
            return node;
        }
        let node = self.graph.add_node(task_id.to_string());
        self.node_map.insert(task_id.to_string(), node);
        node
    }

    pub fn add_connection(&mut self, connection: &Connection) {
        let from = self.add_task(&connection.from);
        let to = self.add_task(&connection.to);
        self.graph.add_edge(from, to, connection.kind);
    }

    pub fn has_cycle(&self) -> bool {
        toposort(&self.graph, None).is_err()
    }

    pub fn topological_sort(&self) -> Result<Vec<TaskId>, String> {
        match toposort(&self.graph, None) {
            Ok(sorted_nodes) => Ok(sorted_nodes
                .into_iter()
                .map(|node| self.graph[node].clone())
                .collect()),
            Err(_) => Err("Graph contains a cycle".to_string()),
        }
    }

    pub fn get_dependencies(&self, task_id: &str) -> Vec<(TaskId, ConnectionType)> {
        self.neighbors(task_id, petgraph::Direction::Outgoing)
    }

    pub fn get_dependents(&self, task_id: &str) -> Vec<(TaskId, ConnectionType)> {
        self.neighbors(task_id, petgraph::Direction::Incoming)
    }

    fn neighbors(&self, task_id: &str, direction: petgraph::Direction) -> Vec<(TaskId, ConnectionType)> {
        let Some(&node) = self.node_map.get(task_id) else {
            return Vec::new();
        };
        let mut result: Vec<(TaskId, ConnectionType)> = self
            .graph
            .edges_directed(node, direction)
            .map(|edge| {
                let other = match direction {
                    petgraph::Direction::Outgoing => edge.target(),
                    petgraph::Direction::Incoming => edge.source(),
                };
                (self.graph[other].clone(), *edge.weight())
            })
            .collect();
        // petgraph yields the most recently added edge first
        result.reverse();
        result
    }

    /// Longest outgoing path from `task_id`, counted in edges. Nodes already
    /// on the current path are skipped so a cyclic graph still terminates.
    pub fn depth(&self, task_id: &str) -> usize {
        let Some(&start) = self.node_map.get(task_id) else {
            return 0;
        };
        let mut memo: HashMap<NodeIndex, usize> = HashMap::new();
        if let Ok(order) = toposort(&self.graph, None) {
            for node in order.into_iter().rev() {
                let best = self
                    .graph
                    .neighbors(node)
                    .map(|n| memo.get(&n).copied().unwrap_or(0) + 1)
                    .max()
                    .unwrap_or(0);
                memo.insert(node, best);
            }
            return memo.get(&start).copied().unwrap_or(0);
        }
        let mut on_path = Vec::new();
        self.depth_with_path(start, &mut on_path)
    }

    fn depth_with_path(&self, node: NodeIndex, on_path: &mut Vec<NodeIndex>) -> usize {
        if on_path.contains(&node) {
            return 0;
        }
        on_path.push(node);
        let mut best = 0;
        for next in self.graph.neighbors(node) {
            if on_path.contains(&next) {
                continue;
            }
            best = best.max(self.depth_with_path(next, on_path) + 1);
        }
        on_path.pop();
        best
    }

    /// Every task reachable from `task_id` (itself first), in DFS order.
    pub fn dependency_chain(&self, task_id: &str) -> Vec<TaskId> {
        let Some(&start) = self.node_map.get(task_id) else {
            return Vec::new();
        };
        let mut dfs = Dfs::new(&self.graph, start);
        let mut chain = Vec::new();
        while let Some(node) = dfs.next(&self.graph) {
            chain.push(self.graph[node].clone());
        }
        chain
    }

    pub fn analyze(&self, task_id: &str) -> DependencyAnalysis {
        DependencyAnalysis {
            dependencies: self.get_dependencies(task_id).into_iter().map(|(id, _)| id).collect(),
            dependents: self.get_dependents(task_id).into_iter().map(|(id, _)| id).collect(),
            depth: self.depth(task_id),
        }
    }
}
