mod error;

pub use error::ExportError;

/// Result type for export operations
pub type ExportOutcome<T> = Result<T, ExportError>;
