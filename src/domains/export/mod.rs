pub mod formatter;
pub mod render;
pub mod service;
pub mod template;
pub mod types;
pub mod writers;

pub use service::{ExportService, ExportServiceImpl};
pub use types::{ExportFormat, ExportMetadata, ExportOptions, ExportResult, ExportWarning, FieldValue, Record};
pub use writers::{CsvExporter, ExcelExporter, PdfExporter};
