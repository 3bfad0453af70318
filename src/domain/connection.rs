use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::task::TaskId;

pub type ConnectionId = String;

/// A directed, typed edge between two tasks. `from` and `to` are weak
/// references: a connection whose endpoint no longer resolves is simply
/// not rendered.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub id: ConnectionId,
    pub from: TaskId,
    pub to: TaskId,
    #[serde(rename = "type")]
    pub kind: ConnectionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<ConnectionStyle>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionType {
    #[default]
    Strong,
    Weak,
    Related,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStyle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dash_array: Option<String>,
}

/// Partial update of a connection; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectionPatch {
    pub kind: Option<ConnectionType>,
    pub style: Option<Option<ConnectionStyle>>,
}

pub fn generate_connection_id() -> ConnectionId {
    format!("conn-{}", Uuid::new_v4())
}

impl Connection {
    pub fn new(from: impl Into<TaskId>, to: impl Into<TaskId>, kind: ConnectionType) -> Self {
        Self {
            id: generate_connection_id(),
            from: from.into(),
            to: to.into(),
            kind,
            style: None,
        }
    }

    pub fn with_id(
        id: impl Into<String>,
        from: impl Into<TaskId>,
        to: impl Into<TaskId>,
        kind: ConnectionType,
    ) -> Self {
        Self { id: id.into(), ..Self::new(from, to, kind) }
    }

    pub fn touches(&self, task_id: &str) -> bool {
        self.from == task_id || self.to == task_id
    }

    pub fn apply(&mut self, patch: ConnectionPatch) {
        if let Some(kind) = patch.kind {
            self.kind = kind;
        }
        if let Some(style) = patch.style {
            self.style = style;
        }
    }
}

impl ConnectionType {
    pub fn label(self) -> &'static str {
        match self {
            ConnectionType::Strong => "strong dependency",
            ConnectionType::Weak => "weak dependency",
            ConnectionType::Related => "related",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionType::Strong => "strong",
            ConnectionType::Weak => "weak",
            ConnectionType::Related => "related",
        }
    }
}

impl std::fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
