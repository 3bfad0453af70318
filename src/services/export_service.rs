use chrono::{DateTime, Utc};
use csv::Writer;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use tracing::{debug, info};

use super::error_handling::{CanvasError, CanvasResult, ImportError};
use crate::domain::connection::{generate_connection_id, Connection, ConnectionStyle, ConnectionType};
use crate::domain::task::{generate_task_id, Position, Priority, SubTask, Task, TaskStatus};

pub const EXPORT_VERSION: &str = "1.0.0";

pub const CSV_HEADERS: [&str; 12] = [
    "ID",
    "Title",
    "Description",
    "Status",
    "Priority",
    "Position X",
    "Position Y",
    "Tags",
    "Progress",
    "Created At",
    "Updated At",
    "Due Date",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    pub version: String,
    pub export_date: DateTime<Utc>,
    pub tasks: Vec<Task>,
    pub connections: Vec<Connection>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportOptions {
    /// Give every imported task and connection a fresh id, remapping
    /// connection endpoints to match. Used when merging into a canvas that
    /// may already hold the same ids.
    pub regenerate_ids: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportedData {
    pub tasks: Vec<Task>,
    pub connections: Vec<Connection>,
}

// Lenient shapes for incoming data: only id, title and position are
// required for a task; everything else falls back to defaults.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IncomingTask {
    id: String,
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    status: TaskStatus,
    #[serde(default)]
    priority: Priority,
    position: Position,
    #[serde(default)]
    tags: BTreeSet<String>,
    #[serde(default)]
    due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    progress: Option<f64>,
    #[serde(default)]
    subtasks: Vec<SubTask>,
}

#[derive(Deserialize)]
struct IncomingConnection {
    #[serde(default)]
    id: Option<String>,
    from: String,
    to: String,
    #[serde(default, rename = "type")]
    kind: ConnectionType,
    #[serde(default)]
    style: Option<ConnectionStyle>,
}

impl IncomingTask {
    fn into_task(self, now: DateTime<Utc>) -> Task {
        let created_at = self.created_at.unwrap_or(now);
        Task {
            id: self.id,
            title: self.title,
            description: self.description,
            status: self.status,
            priority: self.priority,
            position: self.position,
            tags: self.tags,
            due_date: self.due_date,
            created_at,
            updated_at: self.updated_at.unwrap_or(created_at),
            progress: self.progress.map(|p| p.clamp(0.0, 100.0).round() as u8),
            subtasks: self.subtasks,
        }
    }
}

pub struct ExportService;

impl ExportService {
    /// Export tasks and connections as a pretty-printed JSON document
    pub fn export_to_json(tasks: &[Task], connections: &[Connection]) -> CanvasResult<String> {
        let document = ExportDocument {
            version: EXPORT_VERSION.to_string(),
            export_date: Utc::now(),
            tasks: tasks.to_vec(),
            connections: connections.to_vec(),
        };
        let json = serde_json::to_string_pretty(&document)?;
        info!(tasks = tasks.len(), connections = connections.len(), "Exported JSON document");
        Ok(json)
    }

    /// Export tasks to CSV format
    pub fn export_to_csv(tasks: &[Task]) -> CanvasResult<String> {
        let mut wtr = Writer::from_writer(vec![]);
        wtr.write_record(CSV_HEADERS)?;

        for task in tasks {
            wtr.write_record([
                task.id.clone(),
                task.title.clone(),
                task.description.clone().unwrap_or_default(),
                task.status.as_str().to_string(),
                task.priority.as_str().to_string(),
                task.position.x.to_string(),
                task.position.y.to_string(),
                task.tags.iter().cloned().collect::<Vec<_>>().join(";"),
                task.progress.unwrap_or(0).to_string(),
                task.created_at.to_rfc3339(),
                task.updated_at.to_rfc3339(),
                task.due_date.map(|d| d.to_rfc3339()).unwrap_or_default(),
            ])?;
        }

        let data = wtr
            .into_inner()
            .map_err(|e| CanvasError::Io(e.into_error()))?;
        info!(tasks = tasks.len(), "Exported CSV");
        Ok(String::from_utf8_lossy(&data).into_owned())
    }

    pub fn export_to_file(
        tasks: &[Task],
        connections: &[Connection],
        format: ExportFormat,
        path: &Path,
    ) -> CanvasResult<()> {
        let content = match format {
            ExportFormat::Json => Self::export_to_json(tasks, connections)?,
            ExportFormat::Csv => Self::export_to_csv(tasks)?,
        };
        std::fs::write(path, content)?;
        debug!(path = %path.display(), ?format, "Export written");
        Ok(())
    }

    /// Parse and validate an export document. Validation is all-or-nothing:
    /// any bad entry rejects the whole document.
    pub fn import_from_json(json: &str, options: ImportOptions) -> Result<ImportedData, ImportError> {
        let value: Value = serde_json::from_str(json).map_err(|e| ImportError::MalformedJson(e.to_string()))?;

        let tasks = value
            .get("tasks")
            .and_then(Value::as_array)
            .ok_or(ImportError::MissingTasks)?;
        let connections = value
            .get("connections")
            .and_then(Value::as_array)
            .ok_or(ImportError::MissingConnections)?;

        let now = Utc::now();
        let mut imported = ImportedData {
            tasks: Vec::with_capacity(tasks.len()),
            connections: Vec::with_capacity(connections.len()),
        };

        for (index, raw) in tasks.iter().enumerate() {
            check_task_fields(raw).map_err(|reason| ImportError::InvalidTask { index, reason })?;
            let incoming: IncomingTask = serde_json::from_value(raw.clone())
                .map_err(|e| ImportError::InvalidTask { index, reason: e.to_string() })?;
            imported.tasks.push(incoming.into_task(now));
        }

        for (index, raw) in connections.iter().enumerate() {
            let incoming: IncomingConnection = serde_json::from_value(raw.clone())
                .map_err(|e| ImportError::InvalidConnection { index, reason: e.to_string() })?;
            imported.connections.push(Connection {
                id: incoming.id.unwrap_or_else(generate_connection_id),
                from: incoming.from,
                to: incoming.to,
                kind: incoming.kind,
                style: incoming.style,
            });
        }

        if options.regenerate_ids {
            regenerate_ids(&mut imported);
        }

        info!(
            tasks = imported.tasks.len(),
            connections = imported.connections.len(),
            regenerated_ids = options.regenerate_ids,
            "Imported JSON document"
        );
        Ok(imported)
    }

    pub fn import_from_file(path: &Path, options: ImportOptions) -> CanvasResult<ImportedData> {
        let json = std::fs::read_to_string(path)?;
        Ok(Self::import_from_json(&json, options)?)
    }
}

fn check_task_fields(raw: &Value) -> Result<(), String> {
    let object = raw.as_object().ok_or("task is not an object")?;
    match object.get("id").and_then(Value::as_str) {
        Some(id) if !id.is_empty() => {}
        _ => return Err("missing id".to_string()),
    }
    match object.get("title").and_then(Value::as_str) {
        Some(title) if !title.is_empty() => {}
        _ => return Err("missing title".to_string()),
    }
    if !object.get("position").is_some_and(Value::is_object) {
        return Err("missing position".to_string());
    }
    Ok(())
}

fn regenerate_ids(data: &mut ImportedData) {
    let mut mapping: HashMap<String, String> = HashMap::new();
    for task in &mut data.tasks {
        let new_id = generate_task_id();
        mapping.insert(std::mem::replace(&mut task.id, new_id.clone()), new_id);
    }
    for connection in &mut data.connections {
        connection.id = generate_connection_id();
        if let Some(id) = mapping.get(&connection.from) {
            connection.from = id.clone();
        }
        if let Some(id) = mapping.get(&connection.to) {
            connection.to = id.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::tempdir;

    fn sample() -> (Vec<Task>, Vec<Connection>) {
        let mut design = Task::with_id("t1", "Design, review", Position::new(10.0, 20.0));
        design.description = Some("Line one\n\"quoted\"".into());
        design.add_tag("ux");
        design.add_tag("api");
        design.progress = Some(40);
        let build = Task::with_id("t2", "Build", Position::new(400.0, 20.0));
        (
            vec![design, build],
            vec![Connection::with_id("c1", "t1", "t2", ConnectionType::Strong)],
        )
    }

    #[test]
    fn test_json_round_trip() {
        let (tasks, connections) = sample();
        let json = ExportService::export_to_json(&tasks, &connections).unwrap();
        assert!(json.contains("\"version\": \"1.0.0\""));
        assert!(json.contains("\"exportDate\""));

        let imported = ExportService::import_from_json(&json, ImportOptions::default()).unwrap();
        assert_eq!(imported.tasks, tasks);
        assert_eq!(imported.connections, connections);
    }

    #[test]
    fn test_csv_export() {
        let (tasks, _) = sample();
        let csv = ExportService::export_to_csv(&tasks).unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next().unwrap(),
            "ID,Title,Description,Status,Priority,Position X,Position Y,Tags,Progress,Created At,Updated At,Due Date"
        );

        let mut reader = csv::Reader::from_reader(csv.as_bytes());
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[0][1], "Design, review");
        assert_eq!(&rows[0][2], "Line one\n\"quoted\"");
        assert_eq!(&rows[0][7], "api;ux");
        assert_eq!(&rows[0][8], "40");
        assert_eq!(&rows[1][8], "0");
        assert_eq!(&rows[1][11], "");
    }

    #[rstest]
    #[case("not json", "Invalid JSON")]
    #[case(r#"{"connections": []}"#, "missing tasks array")]
    #[case(r#"{"tasks": []}"#, "missing connections array")]
    #[case(r#"{"tasks": [{"id": "a", "position": {"x": 0, "y": 0}}], "connections": []}"#, "missing title")]
    #[case(r#"{"tasks": [{"id": "a", "title": "A"}], "connections": []}"#, "missing position")]
    #[case(r#"{"tasks": [{"title": "A", "position": {"x": 0, "y": 0}}], "connections": []}"#, "missing id")]
    fn test_import_rejects(#[case] json: &str, #[case] message: &str) {
        let error = ExportService::import_from_json(json, ImportOptions::default()).unwrap_err();
        assert!(error.to_string().contains(message), "{} does not mention {}", error, message);
    }

    #[test]
    fn test_import_fills_defaults() {
        let json = r#"{
            "tasks": [{"id": "a", "title": "A", "position": {"x": 5, "y": 6}, "progress": 250}],
            "connections": [{"from": "a", "to": "b"}]
        }"#;
        let imported = ExportService::import_from_json(json, ImportOptions::default()).unwrap();
        let task = &imported.tasks[0];
        assert_eq!(task.status, TaskStatus::Todo);
        assert_eq!(task.priority, Priority::Medium);
        assert_eq!(task.progress, Some(100));
        assert_eq!(task.created_at, task.updated_at);
        assert_eq!(imported.connections[0].kind, ConnectionType::Strong);
        assert!(imported.connections[0].id.starts_with("conn-"));
    }

    #[test]
    fn test_regenerate_ids_remaps_endpoints() {
        let (tasks, connections) = sample();
        let json = ExportService::export_to_json(&tasks, &connections).unwrap();
        let imported = ExportService::import_from_json(&json, ImportOptions { regenerate_ids: true }).unwrap();

        assert!(imported.tasks.iter().all(|t| t.id.starts_with("task-")));
        let connection = &imported.connections[0];
        assert_ne!(connection.id, "c1");
        assert_eq!(connection.from, imported.tasks[0].id);
        assert_eq!(connection.to, imported.tasks[1].id);
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("canvas.json");
        let (tasks, connections) = sample();

        ExportService::export_to_file(&tasks, &connections, ExportFormat::Json, &path).unwrap();
        let imported = ExportService::import_from_file(&path, ImportOptions::default()).unwrap();
        assert_eq!(imported.tasks.len(), 2);

        let missing = ExportService::import_from_file(&dir.path().join("nope.json"), ImportOptions::default());
        assert!(matches!(missing, Err(CanvasError::Io(_))));
    }
}
