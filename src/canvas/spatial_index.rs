use rstar::{AABB, RTree, RTreeObject};
use std::collections::HashMap;
use tracing::debug;

use super::bounds::Bounds;
use crate::domain::connection::{Connection, ConnectionId};
use crate::domain::task::{Position, Task, TaskId};

/// One indexed box and the id of the entity that owns it.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub id: String,
    pub bounds: Bounds,
}

impl RTreeObject for IndexEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(
            [self.bounds.left, self.bounds.top],
            [self.bounds.right, self.bounds.bottom],
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegionHits {
    pub tasks: Vec<TaskId>,
    pub connections: Vec<ConnectionId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexStats {
    pub task_count: usize,
    pub connection_count: usize,
    pub is_ready: bool,
    pub generation: u64,
}

/// R-tree over task and connection bounding boxes.
///
/// The index is rebuilt wholesale whenever tasks or connections change;
/// entries from an older generation are never patched. Until the first
/// build (or after `clear`) the index is not ready, and every query falls
/// back to a linear scan over the collections passed in by the caller.
#[derive(Default)]
pub struct SpatialIndex {
    tasks: RTree<IndexEntry>,
    connections: RTree<IndexEntry>,
    ready: bool,
    generation: u64,
}

impl std::fmt::Debug for SpatialIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpatialIndex")
            .field("tasks", &self.tasks.size())
            .field("connections", &self.connections.size())
            .field("ready", &self.ready)
            .field("generation", &self.generation)
            .finish()
    }
}

/// Box covering both endpoint tasks, or `None` if either is missing.
pub fn connection_bounds(connection: &Connection, task_bounds: &HashMap<&str, Bounds>) -> Option<Bounds> {
    let from = task_bounds.get(connection.from.as_str())?;
    let to = task_bounds.get(connection.to.as_str())?;
    Some(from.union(to))
}

fn bounds_by_id(tasks: &[Task]) -> HashMap<&str, Bounds> {
    tasks.iter().map(|t| (t.id.as_str(), t.bounds())).collect()
}

fn to_envelope(bounds: &Bounds) -> AABB<[f64; 2]> {
    AABB::from_corners([bounds.left, bounds.top], [bounds.right, bounds.bottom])
}

impl SpatialIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bulk-load the index, replacing whatever it held before.
    pub fn build(&mut self, tasks: &[Task], connections: &[Connection]) {
        let task_bounds = bounds_by_id(tasks);

        let task_entries: Vec<IndexEntry> = tasks
            .iter()
            .map(|t| IndexEntry { id: t.id.clone(), bounds: t.bounds() })
            .collect();
        let connection_entries: Vec<IndexEntry> = connections
            .iter()
            .filter_map(|c| {
                connection_bounds(c, &task_bounds).map(|bounds| IndexEntry { id: c.id.clone(), bounds })
            })
            .collect();

        self.tasks = RTree::bulk_load(task_entries);
        self.connections = RTree::bulk_load(connection_entries);
        self.ready = true;
        self.generation += 1;

        debug!(
            generation = self.generation,
            tasks = self.tasks.size(),
            connections = self.connections.size(),
            skipped_connections = connections.len() - self.connections.size(),
            "Spatial index rebuilt"
        );
    }

    pub fn clear(&mut self) {
        self.tasks = RTree::new();
        self.connections = RTree::new();
        self.ready = false;
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            task_count: self.tasks.size(),
            connection_count: self.connections.size(),
            is_ready: self.ready,
            generation: self.generation,
        }
    }

    /// Tasks and connections whose boxes intersect `region`.
    pub fn query_region(&self, region: &Bounds, tasks: &[Task], connections: &[Connection]) -> RegionHits {
        if !self.ready {
            let task_bounds = bounds_by_id(tasks);
            return RegionHits {
                tasks: tasks
                    .iter()
                    .filter(|t| t.bounds().intersects(region))
                    .map(|t| t.id.clone())
                    .collect(),
                connections: connections
                    .iter()
                    .filter(|c| connection_bounds(c, &task_bounds).is_some_and(|b| b.intersects(region)))
                    .map(|c| c.id.clone())
                    .collect(),
            };
        }

        let envelope = to_envelope(region);
        RegionHits {
            tasks: self
                .tasks
                .locate_in_envelope_intersecting(&envelope)
                .map(|e| e.id.clone())
                .collect(),
            connections: self
                .connections
                .locate_in_envelope_intersecting(&envelope)
                .map(|e| e.id.clone())
                .collect(),
        }
    }

    pub fn query_tasks(&self, region: &Bounds, tasks: &[Task]) -> Vec<TaskId> {
        if !self.ready {
            return tasks
                .iter()
                .filter(|t| t.bounds().intersects(region))
                .map(|t| t.id.clone())
                .collect();
        }
        self.tasks
            .locate_in_envelope_intersecting(&to_envelope(region))
            .map(|e| e.id.clone())
            .collect()
    }

    /// Tasks whose box intersects the square `point ± radius`.
    pub fn query_near_point(&self, point: Position, radius: f64, tasks: &[Task]) -> Vec<TaskId> {
        self.query_tasks(&Bounds::around_point(point, radius), tasks)
    }

    /// Other tasks whose box overlaps `task`'s box.
    pub fn query_intersecting(&self, task: &Task, tasks: &[Task]) -> Vec<TaskId> {
        self.query_tasks(&task.bounds(), tasks)
            .into_iter()
            .filter(|id| *id != task.id)
            .collect()
    }

    /// Box enclosing every task, or `None` when there are no tasks.
    pub fn global_bounds(&self, tasks: &[Task]) -> Option<Bounds> {
        if !self.ready {
            return tasks.iter().map(Task::bounds).reduce(|acc, b| acc.union(&b));
        }
        if self.tasks.size() == 0 {
            return None;
        }
        let envelope = self.tasks.root().envelope();
        let (lower, upper) = (envelope.lower(), envelope.upper());
        Some(Bounds::new(lower[0], lower[1], upper[0], upper[1]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::connection::ConnectionType;

    fn task(id: &str, x: f64, y: f64) -> Task {
        Task::with_id(id, id, Position::new(x, y))
    }

    fn sorted(mut ids: Vec<String>) -> Vec<String> {
        ids.sort();
        ids
    }

    fn sample() -> (Vec<Task>, Vec<Connection>) {
        let tasks = vec![task("a", 0.0, 0.0), task("b", 1000.0, 0.0), task("c", 0.0, 1000.0)];
        let connections = vec![
            Connection::with_id("ab", "a", "b", ConnectionType::Strong),
            Connection::with_id("a-ghost", "a", "ghost", ConnectionType::Weak),
        ];
        (tasks, connections)
    }

    #[test]
    fn test_unready_is_distinct_from_empty() {
        let mut index = SpatialIndex::new();
        assert!(!index.is_ready());
        index.build(&[], &[]);
        assert!(index.is_ready());
        assert_eq!(index.global_bounds(&[]), None);
        assert_eq!(index.stats().generation, 1);
    }

    #[test]
    fn test_region_query_touching_counts() {
        let (tasks, connections) = sample();
        let mut index = SpatialIndex::new();
        index.build(&tasks, &connections);

        // Touches the right edge of "a" exactly.
        let region = Bounds::new(280.0, 50.0, 300.0, 60.0);
        let hits = index.query_region(&region, &tasks, &connections);
        assert_eq!(hits.tasks, vec!["a"]);
        // Connection box spans a..b.
        assert_eq!(hits.connections, vec!["ab"]);
    }

    #[test]
    fn test_connection_with_missing_task_is_not_indexed() {
        let (tasks, connections) = sample();
        let mut index = SpatialIndex::new();
        index.build(&tasks, &connections);
        assert_eq!(index.stats().connection_count, 1);
    }

    #[test]
    fn test_fallback_matches_index() {
        let (tasks, connections) = sample();
        let region = Bounds::new(-10.0, -10.0, 1100.0, 50.0);

        let unready = SpatialIndex::new();
        let fallback = unready.query_region(&region, &tasks, &connections);

        let mut index = SpatialIndex::new();
        index.build(&tasks, &connections);
        let indexed = index.query_region(&region, &tasks, &connections);

        assert_eq!(sorted(fallback.tasks), sorted(indexed.tasks));
        assert_eq!(fallback.connections, indexed.connections);
        assert_eq!(unready.global_bounds(&tasks), index.global_bounds(&tasks));
    }

    #[test]
    fn test_near_point_and_intersecting() {
        let tasks = vec![task("a", 0.0, 0.0), task("b", 200.0, 100.0), task("c", 600.0, 600.0)];
        let mut index = SpatialIndex::new();
        index.build(&tasks, &[]);

        assert_eq!(sorted(index.query_near_point(Position::new(240.0, 110.0), 50.0, &tasks)), vec!["a", "b"]);
        assert!(index.query_near_point(Position::new(500.0, 500.0), 50.0, &tasks).is_empty());
        assert_eq!(index.query_intersecting(&tasks[0], &tasks), vec!["b"]);
        assert!(index.query_intersecting(&tasks[2], &tasks).is_empty());
    }

    #[test]
    fn test_global_bounds() {
        let (tasks, connections) = sample();
        let mut index = SpatialIndex::new();
        index.build(&tasks, &connections);
        assert_eq!(index.global_bounds(&tasks), Some(Bounds::new(0.0, 0.0, 1280.0, 1120.0)));
    }

    #[test]
    fn test_clear_returns_to_unready() {
        let (tasks, connections) = sample();
        let mut index = SpatialIndex::new();
        index.build(&tasks, &connections);
        index.clear();
        assert!(!index.is_ready());
        assert_eq!(index.stats().task_count, 0);
        // Fallback still answers queries.
        assert_eq!(index.query_tasks(&Bounds::new(0.0, 0.0, 1.0, 1.0), &tasks), vec!["a"]);
    }
}
