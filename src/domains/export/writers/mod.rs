pub mod csv_writer;
pub mod excel_writer;
pub mod pdf_writer;
pub mod xlsx;

pub use csv_writer::CsvExporter;
pub use excel_writer::{ExcelExporter, ExcelOutput};
pub use pdf_writer::{PdfExporter, PdfOutput};
