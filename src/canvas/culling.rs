use std::collections::HashSet;
use tracing::debug;

use super::bounds::Bounds;
use super::spatial_index::SpatialIndex;
use super::transform::UNMEASURED_VIEWPORT;
use crate::config::CanvasConfig;
use crate::domain::connection::Connection;
use crate::domain::task::Task;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RenderStats {
    pub total_tasks: usize,
    pub visible_tasks: usize,
    pub culled_tasks: usize,
    pub culling_ratio: f64,
}

/// Filters tasks and connections down to what the renderer should draw.
/// Remembers the last visible count so it only logs when that changes.
#[derive(Debug, Clone)]
pub struct ViewportCuller {
    enabled: bool,
    min_buffer: f64,
    max_buffer: f64,
    last_visible_count: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct CullResult<'a> {
    pub tasks: Vec<&'a Task>,
    pub connections: Vec<&'a Connection>,
    pub extended_viewport: Option<Bounds>,
    pub stats: RenderStats,
}

/// Render buffer around the viewport: larger when zoomed out.
pub fn culling_buffer(zoom: f64, min_buffer: f64, max_buffer: f64) -> f64 {
    (1000.0 / zoom).clamp(min_buffer, max_buffer)
}

pub fn extended_viewport(viewport: &Bounds, zoom: f64, min_buffer: f64, max_buffer: f64) -> Bounds {
    viewport.expand(culling_buffer(zoom, min_buffer, max_buffer))
}

pub fn is_unmeasured(viewport: &Bounds) -> bool {
    viewport.left == UNMEASURED_VIEWPORT.left && viewport.top == UNMEASURED_VIEWPORT.top
}

/// Tasks intersecting `region`, using the fixed node size.
pub fn tasks_in_region<'a>(tasks: &'a [Task], region: &Bounds) -> Vec<&'a Task> {
    tasks.iter().filter(|t| t.bounds().intersects(region)).collect()
}

/// Whether the task intersects the plain (unbuffered) viewport.
pub fn is_task_visible(task: &Task, viewport: &Bounds) -> bool {
    task.bounds().intersects(viewport)
}

impl Default for ViewportCuller {
    fn default() -> Self {
        Self::from_config(&CanvasConfig::default())
    }
}

impl ViewportCuller {
    pub fn from_config(config: &CanvasConfig) -> Self {
        Self {
            enabled: config.culling_enabled,
            min_buffer: config.culling_min_buffer,
            max_buffer: config.culling_max_buffer,
            last_visible_count: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn extended_viewport(&self, viewport: &Bounds, zoom: f64) -> Bounds {
        extended_viewport(viewport, zoom, self.min_buffer, self.max_buffer)
    }

    pub fn visible_tasks<'a>(&self, tasks: &'a [Task], viewport: &Bounds, zoom: f64) -> Vec<&'a Task> {
        if !self.enabled || is_unmeasured(viewport) {
            return tasks.iter().collect();
        }
        tasks_in_region(tasks, &self.extended_viewport(viewport, zoom))
    }

    /// A connection is drawn when both endpoints exist and, with culling
    /// on, at least one endpoint is visible.
    pub fn visible_connections<'a>(
        &self,
        connections: &'a [Connection],
        tasks: &[Task],
        visible_tasks: &[&Task],
    ) -> Vec<&'a Connection> {
        let existing: HashSet<&str> = tasks.iter().map(|t| t.id.as_str()).collect();
        let visible: HashSet<&str> = visible_tasks.iter().map(|t| t.id.as_str()).collect();

        connections
            .iter()
            .filter(|c| existing.contains(c.from.as_str()) && existing.contains(c.to.as_str()))
            .filter(|c| !self.enabled || visible.contains(c.from.as_str()) || visible.contains(c.to.as_str()))
            .collect()
    }

    pub fn cull<'a>(
        &mut self,
        tasks: &'a [Task],
        connections: &'a [Connection],
        viewport: &Bounds,
        zoom: f64,
    ) -> CullResult<'a> {
        let visible_tasks = self.visible_tasks(tasks, viewport, zoom);
        self.finish(tasks, connections, visible_tasks, viewport, zoom)
    }

    /// Same result as `cull`, answering the region query from the spatial
    /// index. Falls back to the linear scan while the index is not ready.
    pub fn cull_indexed<'a>(
        &mut self,
        index: &SpatialIndex,
        tasks: &'a [Task],
        connections: &'a [Connection],
        viewport: &Bounds,
        zoom: f64,
    ) -> CullResult<'a> {
        let visible_tasks = if !self.enabled || is_unmeasured(viewport) || !index.is_ready() {
            self.visible_tasks(tasks, viewport, zoom)
        } else {
            let hits: HashSet<String> = index
                .query_tasks(&self.extended_viewport(viewport, zoom), tasks)
                .into_iter()
                .collect();
            tasks.iter().filter(|t| hits.contains(&t.id)).collect()
        };
        self.finish(tasks, connections, visible_tasks, viewport, zoom)
    }

    fn finish<'a>(
        &mut self,
        tasks: &'a [Task],
        connections: &'a [Connection],
        visible_tasks: Vec<&'a Task>,
        viewport: &Bounds,
        zoom: f64,
    ) -> CullResult<'a> {
        let visible_connections = self.visible_connections(connections, tasks, &visible_tasks);

        let total = tasks.len();
        let visible = visible_tasks.len();
        let stats = RenderStats {
            total_tasks: total,
            visible_tasks: visible,
            culled_tasks: total - visible,
            culling_ratio: if total > 0 { (total - visible) as f64 / total as f64 } else { 0.0 },
        };

        if self.last_visible_count != Some(visible) {
            debug!(
                total_tasks = total,
                visible_tasks = visible,
                culled_tasks = stats.culled_tasks,
                visible_connections = visible_connections.len(),
                "Visible task set changed"
            );
            self.last_visible_count = Some(visible);
        }

        CullResult {
            tasks: visible_tasks,
            connections: visible_connections,
            extended_viewport: (self.enabled && !is_unmeasured(viewport))
                .then(|| self.extended_viewport(viewport, zoom)),
            stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::connection::ConnectionType;
    use crate::domain::task::Position;
    use rstest::rstest;

    fn task(id: &str, x: f64, y: f64) -> Task {
        Task::with_id(id, id, Position::new(x, y))
    }

    fn ids(tasks: &[&Task]) -> Vec<String> {
        tasks.iter().map(|t| t.id.clone()).collect()
    }

    #[rstest]
    #[case(1.0, 1000.0)]
    #[case(5.0, 1000.0)]
    #[case(0.75, 1000.0 / 0.75)]
    #[case(0.5, 2000.0)]
    #[case(0.1, 2000.0)]
    fn test_buffer_depends_on_zoom(#[case] zoom: f64, #[case] expected: f64) {
        assert!((culling_buffer(zoom, 1000.0, 2000.0) - expected).abs() < 1e-9);
    }

    #[test]
    fn test_far_task_culled_until_moved_in() {
        let culler = ViewportCuller::default();
        let viewport = Bounds::new(0.0, 0.0, 800.0, 600.0);
        let mut tasks = vec![task("near", 100.0, 100.0), task("far", 5000.0, 0.0)];

        assert_eq!(ids(&culler.visible_tasks(&tasks, &viewport, 1.0)), vec!["near"]);

        tasks[1].position = Position::new(1700.0, 0.0);
        assert_eq!(ids(&culler.visible_tasks(&tasks, &viewport, 1.0)), vec!["near", "far"]);
    }

    #[test]
    fn test_boundary_touch_is_visible() {
        let culler = ViewportCuller::default();
        let viewport = Bounds::new(0.0, 0.0, 800.0, 600.0);
        // Left edge exactly on the extended right edge (800 + 1000).
        let tasks = vec![task("edge", 1800.0, 0.0), task("past", 1800.5, 0.0)];
        assert_eq!(ids(&culler.visible_tasks(&tasks, &viewport, 1.0)), vec!["edge"]);
    }

    #[test]
    fn test_unmeasured_viewport_shows_everything() {
        let culler = ViewportCuller::default();
        let tasks = vec![task("a", 0.0, 0.0), task("b", 90_000.0, 90_000.0)];
        assert_eq!(culler.visible_tasks(&tasks, &UNMEASURED_VIEWPORT, 1.0).len(), 2);
    }

    #[test]
    fn test_connection_visibility() {
        let mut culler = ViewportCuller::default();
        let viewport = Bounds::new(0.0, 0.0, 800.0, 600.0);
        let tasks = vec![task("a", 0.0, 0.0), task("b", 9000.0, 0.0), task("c", 9500.0, 0.0)];
        let connections = vec![
            Connection::with_id("ab", "a", "b", ConnectionType::Strong),
            Connection::with_id("bc", "b", "c", ConnectionType::Strong),
            Connection::with_id("a-ghost", "a", "ghost", ConnectionType::Strong),
        ];

        let result = culler.cull(&tasks, &connections, &viewport, 1.0);
        let visible: Vec<&str> = result.connections.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(visible, vec!["ab"]);
        assert_eq!(result.stats.visible_tasks, 1);
        assert_eq!(result.stats.culled_tasks, 2);

        culler.set_enabled(false);
        let result = culler.cull(&tasks, &connections, &viewport, 1.0);
        let visible: Vec<&str> = result.connections.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(visible, vec!["ab", "bc"]);
        assert_eq!(result.stats.culling_ratio, 0.0);
        assert!(result.extended_viewport.is_none());
    }

    #[test]
    fn test_indexed_cull_matches_linear() {
        let tasks: Vec<Task> = (0..50)
            .map(|i| task(&format!("t{}", i), (i % 10) as f64 * 900.0, (i / 10) as f64 * 700.0))
            .collect();
        let connections = vec![
            Connection::with_id("near", "t0", "t1", ConnectionType::Strong),
            Connection::with_id("far", "t8", "t49", ConnectionType::Weak),
        ];
        let viewport = Bounds::new(0.0, 0.0, 800.0, 600.0);

        let mut linear = ViewportCuller::default();
        let mut indexed = ViewportCuller::default();
        let mut index = SpatialIndex::new();
        index.build(&tasks, &connections);

        let expected = linear.cull(&tasks, &connections, &viewport, 0.8);
        let actual = indexed.cull_indexed(&index, &tasks, &connections, &viewport, 0.8);
        assert_eq!(ids(&actual.tasks), ids(&expected.tasks));
        assert_eq!(actual.connections, expected.connections);
        assert_eq!(actual.stats, expected.stats);
    }

    #[test]
    fn test_is_task_visible_uses_plain_viewport() {
        let viewport = Bounds::new(0.0, 0.0, 800.0, 600.0);
        assert!(is_task_visible(&task("a", 700.0, 500.0), &viewport));
        assert!(!is_task_visible(&task("b", 900.0, 0.0), &viewport));
    }
}
