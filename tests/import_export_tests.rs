use entropy_canvas::domain::connection::ConnectionType;
use entropy_canvas::domain::task::{Position, TaskPatch, TaskStatus};
use entropy_canvas::services::export_service::{ExportFormat, ExportService, ImportOptions};
use entropy_canvas::services::persistence::PersistedStore;
use entropy_canvas::services::{CanvasError, ImportError, TaskService};
use tempfile::TempDir;

#[cfg(test)]
mod import_export_tests {
    use super::*;

    fn sample_service() -> TaskService {
        let mut service = TaskService::default();
        let design = service.create_task("Design", Position::new(0.0, 0.0));
        let build = service.create_task("Build, test", Position::new(400.0, 0.0));
        service
            .update_task(
                &design,
                TaskPatch {
                    status: Some(TaskStatus::Done),
                    description: Some(Some("Covers \"auth\"\nand billing".into())),
                    progress: Some(Some(100)),
                    ..Default::default()
                },
            )
            .unwrap();
        service.connect(&design, &build, ConnectionType::Strong).unwrap();
        service
    }

    #[test]
    fn test_export_import_round_trip() {
        let source = sample_service();
        let json = ExportService::export_to_json(source.tasks(), source.connections()).unwrap();

        let data = ExportService::import_from_json(&json, ImportOptions::default()).unwrap();
        let mut target = TaskService::default();
        target.replace_all(data.tasks, data.connections);

        assert_eq!(target.tasks(), source.tasks());
        assert_eq!(target.connections(), source.connections());
        assert!(!target.can_undo());
    }

    #[test]
    fn test_failed_import_leaves_canvas_untouched() {
        let mut service = sample_service();
        let tasks = service.tasks().to_vec();

        let json = r#"{"tasks": [
            {"id": "ok", "title": "Fine", "position": {"x": 0, "y": 0}},
            {"id": "bad", "title": "", "position": {"x": 0, "y": 0}}
        ], "connections": []}"#;
        let result = ExportService::import_from_json(json, ImportOptions::default());
        assert_eq!(
            result.unwrap_err(),
            ImportError::InvalidTask { index: 1, reason: "missing title".into() }
        );

        if let Ok(data) = ExportService::import_from_json(json, ImportOptions::default()) {
            service.replace_all(data.tasks, data.connections);
        }
        assert_eq!(service.tasks(), tasks.as_slice());
    }

    #[test]
    fn test_merge_with_regenerated_ids() {
        let mut service = sample_service();
        let json = ExportService::export_to_json(service.tasks(), service.connections()).unwrap();
        let data = ExportService::import_from_json(&json, ImportOptions { regenerate_ids: true }).unwrap();

        assert_eq!(service.merge(data.tasks, data.connections), (2, 1));
        assert_eq!(service.tasks().len(), 4);
        assert_eq!(service.connections().len(), 2);

        let merged = &service.connections()[1];
        assert!(service.task(&merged.from).is_some());
        assert!(service.task(&merged.to).is_some());
        assert!(!service.dependency_graph().has_cycle());

        service.undo().unwrap();
        assert_eq!(service.tasks().len(), 2);
    }

    #[test]
    fn test_files_through_every_format() {
        let dir = TempDir::new().unwrap();
        let service = sample_service();

        let json_path = dir.path().join("export.json");
        let csv_path = dir.path().join("export.csv");
        let store_path = dir.path().join("store").join("canvas.json");

        ExportService::export_to_file(service.tasks(), service.connections(), ExportFormat::Json, &json_path).unwrap();
        ExportService::export_to_file(service.tasks(), service.connections(), ExportFormat::Csv, &csv_path).unwrap();

        let csv = std::fs::read_to_string(&csv_path).unwrap();
        let mut reader = csv::Reader::from_path(&csv_path).unwrap();
        assert_eq!(reader.records().count(), 2);
        assert!(csv.contains("\"Build, test\""));

        let data = ExportService::import_from_file(&json_path, ImportOptions::default()).unwrap();
        PersistedStore::new(data.tasks, data.connections).save(&store_path).unwrap();

        let raw = std::fs::read_to_string(&store_path).unwrap();
        assert!(raw.contains(r#""__type":"Date""#));

        let store = PersistedStore::load(&store_path).unwrap().unwrap();
        assert_eq!(store.state.tasks, service.tasks());
        assert_eq!(store.state.connections, service.connections());
    }

    #[test]
    fn test_import_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let result = ExportService::import_from_file(&dir.path().join("absent.json"), ImportOptions::default());
        assert!(matches!(result, Err(CanvasError::Io(_))));
    }
}
