//! Persisted-store layout.
//!
//! State is written as `{"state": {"tasks": [...], "connections": [...]},
//! "version": 0}`. Dates are wrapped as `{"__type": "Date", "value":
//! "<RFC 3339>"}` so they can be told apart from ordinary strings when the
//! store is read back.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use tracing::{debug, info};

use super::error_handling::CanvasResult;
use crate::domain::connection::Connection;
use crate::domain::task::Task;

pub const STORE_VERSION: u32 = 0;

const DATE_TAG: &str = "Date";
const DATE_FIELDS: [&str; 3] = ["createdAt", "updatedAt", "dueDate"];

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CanvasState {
    pub tasks: Vec<Task>,
    pub connections: Vec<Connection>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersistedStore {
    pub state: CanvasState,
    pub version: u32,
}

impl PersistedStore {
    pub fn new(tasks: Vec<Task>, connections: Vec<Connection>) -> Self {
        Self {
            state: CanvasState { tasks, connections },
            version: STORE_VERSION,
        }
    }

    pub fn to_json(&self) -> CanvasResult<String> {
        let mut value = serde_json::to_value(self)?;
        tag_dates(&mut value);
        Ok(serde_json::to_string(&value)?)
    }

    pub fn from_json(json: &str) -> CanvasResult<Self> {
        let mut value: Value = serde_json::from_str(json)?;
        untag_dates(&mut value);
        Ok(serde_json::from_value(value)?)
    }

    pub fn save(&self, path: &Path) -> CanvasResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json()?)?;
        debug!(
            path = %path.display(),
            tasks = self.state.tasks.len(),
            connections = self.state.connections.len(),
            "Store saved"
        );
        Ok(())
    }

    /// Load the store at `path`. A missing file is not an error.
    pub fn load(path: &Path) -> CanvasResult<Option<Self>> {
        if !path.exists() {
            debug!(path = %path.display(), "No persisted store");
            return Ok(None);
        }
        let store = Self::from_json(&std::fs::read_to_string(path)?)?;
        info!(
            path = %path.display(),
            version = store.version,
            tasks = store.state.tasks.len(),
            "Store loaded"
        );
        Ok(Some(store))
    }
}

fn tag_dates(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, field) in map.iter_mut() {
                if DATE_FIELDS.contains(&key.as_str()) && field.is_string() {
                    let mut tagged = Map::new();
                    tagged.insert("__type".into(), Value::String(DATE_TAG.into()));
                    tagged.insert("value".into(), field.take());
                    *field = Value::Object(tagged);
                } else {
                    tag_dates(field);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(tag_dates),
        _ => {}
    }
}

fn untag_dates(value: &mut Value) {
    let unwrapped = match value {
        Value::Object(map) if map.get("__type").and_then(Value::as_str) == Some(DATE_TAG) => map.remove("value"),
        _ => None,
    };
    if let Some(inner) = unwrapped {
        *value = inner;
        return;
    }

    match value {
        Value::Object(map) => map.values_mut().for_each(untag_dates),
        Value::Array(items) => items.iter_mut().for_each(untag_dates),
        _ => {}
    }
}
