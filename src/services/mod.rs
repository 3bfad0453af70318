pub mod error_handling;
pub mod export_service;
pub mod history;
pub mod persistence;
pub mod task_service;
pub mod task_store;

pub use error_handling::{CanvasError, CanvasResult, ImportError};
pub use export_service::ExportService;
pub use history::{History, HistoryOutcome};
pub use task_service::TaskService;
pub use task_store::TaskStore;
