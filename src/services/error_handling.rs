use thiserror::Error;
use tracing::warn;

use crate::domain::connection_validation::ValidationError;

/// Crate-level error type returned by the task service and the
/// import/export layer.
#[derive(Error, Debug)]
pub enum CanvasError {
    #[error("Task not found: {id}")]
    TaskNotFound { id: String },

    #[error("Connection not found: {id}")]
    ConnectionNotFound { id: String },

    #[error("Task already exists: {id}")]
    DuplicateTaskId { id: String },

    #[error("Connection rejected: {0}")]
    Validation(#[from] ValidationError),

    #[error("Import failed: {0}")]
    Import(#[from] ImportError),

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("CSV export failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why an import document was refused. Imports are all-or-nothing, so any
/// of these leaves the canvas untouched.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ImportError {
    #[error("Invalid JSON: {0}")]
    MalformedJson(String),

    #[error("Invalid data format: missing tasks array")]
    MissingTasks,

    #[error("Invalid data format: missing connections array")]
    MissingConnections,

    #[error("Invalid task data at index {index}: {reason}")]
    InvalidTask { index: usize, reason: String },

    #[error("Invalid connection data at index {index}: {reason}")]
    InvalidConnection { index: usize, reason: String },
}

pub type CanvasResult<T> = Result<T, CanvasError>;

/// User-friendly error messages
pub struct UserErrorFormatter;

impl UserErrorFormatter {
    pub fn format_for_ui(error: &CanvasError) -> String {
        match error {
            CanvasError::TaskNotFound { .. } => "The requested task could not be found.".to_string(),
            CanvasError::ConnectionNotFound { .. } => {
                "The requested connection could not be found.".to_string()
            }
            CanvasError::Validation(validation) => Self::format_validation(validation),
            CanvasError::Import(import) => format!("The file could not be imported: {}", import),
            CanvasError::Io(_) => "The file could not be read or written.".to_string(),
            _ => error.to_string(),
        }
    }

    pub fn format_validation(error: &ValidationError) -> String {
        match error {
            ValidationError::SelfConnection => "A task cannot be connected to itself.".to_string(),
            ValidationError::TaskNotFound { .. } => "One of the tasks no longer exists.".to_string(),
            ValidationError::WouldCreateCycle => {
                "This connection would form a dependency cycle. Check the task relationships.".to_string()
            }
            ValidationError::DuplicateConnection { kind } => {
                format!("A {} connection already exists.", kind)
            }
        }
    }

    pub fn log_and_format(context: &str, error: &CanvasError) -> String {
        warn!(context = %context, error = %error, "Operation failed");
        Self::format_for_ui(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::connection::ConnectionType;

    #[test]
    fn test_error_formatting() {
        let error = CanvasError::TaskNotFound { id: "t1".into() };
        assert!(UserErrorFormatter::format_for_ui(&error).contains("could not be found"));
        assert_eq!(error.to_string(), "Task not found: t1");
    }

    #[test]
    fn test_validation_errors_convert() {
        let error: CanvasError = ValidationError::WouldCreateCycle.into();
        assert!(UserErrorFormatter::format_for_ui(&error).contains("cycle"));

        let error: CanvasError = ValidationError::DuplicateConnection { kind: ConnectionType::Weak }.into();
        assert!(UserErrorFormatter::format_for_ui(&error).contains("weak dependency"));
    }

    #[test]
    fn test_import_error_message() {
        let error: CanvasError = ImportError::InvalidTask { index: 2, reason: "missing title".into() }.into();
        assert_eq!(error.to_string(), "Import failed: Invalid task data at index 2: missing title");
    }
}
