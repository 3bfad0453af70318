use entropy_canvas::domain::connection::ConnectionType;
use entropy_canvas::domain::connection_validation::{validate_connection, would_create_cycle, ValidationError};
use entropy_canvas::domain::task::Position;
use entropy_canvas::services::{CanvasError, TaskService};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;

#[cfg(test)]
mod connection_graph_tests {
    use super::*;

    const KINDS: [ConnectionType; 3] = [ConnectionType::Strong, ConnectionType::Weak, ConnectionType::Related];

    fn service_with_tasks(count: usize) -> (TaskService, Vec<String>) {
        let mut service = TaskService::default();
        let ids = (0..count)
            .map(|i| service.create_task(format!("Task {}", i), Position::new(i as f64 * 300.0, 0.0)))
            .collect();
        (service, ids)
    }

    /// Random connection attempts never leave the graph cyclic, and never
    /// produce self-loops or two connections between the same ordered pair.
    #[test]
    fn test_random_insertions_keep_graph_acyclic() {
        let mut rng = StdRng::seed_from_u64(7);
        let (mut service, ids) = service_with_tasks(30);
        let mut rejected_cycles = 0;

        for _ in 0..600 {
            let from = &ids[rng.gen_range(0..ids.len())];
            let to = &ids[rng.gen_range(0..ids.len())];
            let kind = KINDS[rng.gen_range(0..KINDS.len())];

            match service.connect(from, to, kind) {
                Ok(_) => {}
                Err(CanvasError::Validation(ValidationError::WouldCreateCycle)) => rejected_cycles += 1,
                Err(CanvasError::Validation(_)) => {}
                Err(other) => panic!("unexpected error {}", other),
            }

            assert!(!service.dependency_graph().has_cycle());
        }

        let connections = service.connections();
        assert!(connections.iter().all(|c| c.from != c.to));
        let pairs: HashSet<(&str, &str)> = connections.iter().map(|c| (c.from.as_str(), c.to.as_str())).collect();
        assert_eq!(pairs.len(), connections.len());
        assert!(rejected_cycles > 0);

        // Every accepted edge is consistent with a topological order.
        let order = service.dependency_graph().topological_sort().unwrap();
        let rank = |id: &str| order.iter().position(|o| o == id).unwrap();
        assert!(connections.iter().all(|c| rank(&c.from) < rank(&c.to)));
    }

    #[test]
    fn test_validator_agrees_with_petgraph() {
        let mut rng = StdRng::seed_from_u64(42);
        let (mut service, ids) = service_with_tasks(12);
        for _ in 0..40 {
            let from = &ids[rng.gen_range(0..ids.len())];
            let to = &ids[rng.gen_range(0..ids.len())];
            let _ = service.connect(from, to, ConnectionType::Strong);
        }

        for from in &ids {
            for to in &ids {
                if from == to {
                    continue;
                }
                let mut graph = service.dependency_graph();
                graph.add_connection(&entropy_canvas::domain::connection::Connection::new(
                    from.as_str(),
                    to.as_str(),
                    ConnectionType::Strong,
                ));
                assert_eq!(would_create_cycle(from, to, service.connections()), graph.has_cycle());
            }
        }
    }

    #[test]
    fn test_rejections_in_check_order() {
        let (mut service, ids) = service_with_tasks(3);
        let (a, b, c) = (&ids[0], &ids[1], &ids[2]);
        service.connect(a, b, ConnectionType::Strong).unwrap();
        service.connect(b, c, ConnectionType::Strong).unwrap();

        let check = |from: &str, to: &str, kind| validate_connection(from, to, kind, service.connections(), service.tasks());

        assert_eq!(check(a, a, ConnectionType::Strong), Err(ValidationError::SelfConnection));
        assert_eq!(check(a, "ghost", ConnectionType::Strong), Err(ValidationError::TaskNotFound { id: "ghost".into() }));
        assert_eq!(check(c, a, ConnectionType::Weak), Err(ValidationError::WouldCreateCycle));
        assert_eq!(
            check(a, b, ConnectionType::Strong),
            Err(ValidationError::DuplicateConnection { kind: ConnectionType::Strong })
        );
        assert!(check(a, b, ConnectionType::Weak).unwrap().warning().is_some());
        // Transitive shortcut is allowed.
        assert!(check(a, c, ConnectionType::Related).unwrap().warning().is_none());
    }

    #[test]
    fn test_long_chain_cycle_check() {
        let (mut service, ids) = service_with_tasks(5000);
        for pair in ids.windows(2) {
            service.connect(&pair[0], &pair[1], ConnectionType::Strong).unwrap();
        }
        let last = ids.last().unwrap();
        assert!(would_create_cycle(last, &ids[0], service.connections()));
        assert!(!would_create_cycle(&ids[0], last, service.connections()));
    }
}
