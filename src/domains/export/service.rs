use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task;
use uuid::Uuid;

use crate::config::ExportConfig;
use crate::domains::export::render::EngineLauncher;
use crate::domains::export::types::{
    ExportFormat, ExportMetadata, ExportOptions, ExportResult, ExportWarning, Record,
};
use crate::domains::export::writers::{CsvExporter, ExcelExporter, PdfExporter};
use crate::errors::{ExportError, ExportOutcome};

/// Entry point for report exports: one call, one exporter, one file
#[async_trait]
pub trait ExportService: Send + Sync {
    /// Encode `records` as `format` and describe the produced file
    async fn export(&self, records: Vec<Record>, format: ExportFormat, options: ExportOptions) -> ExportOutcome<ExportResult>;

    /// Header-only import template for CSV or Excel
    async fn create_template(&self, format: ExportFormat, fields: Vec<String>, options: ExportOptions) -> ExportOutcome<Vec<u8>>;

    /// Release the PDF rendering engine
    async fn shutdown(&self);
}

pub struct ExportServiceImpl {
    csv: CsvExporter,
    excel: ExcelExporter,
    pdf: Arc<PdfExporter>,
}

impl ExportServiceImpl {
    pub fn new(config: &ExportConfig) -> Self {
        Self::with_pdf_exporter(Arc::new(PdfExporter::new(config)), config)
    }

    /// Service whose PDF exporter uses a specific rendering engine
    pub fn with_launcher(launcher: Arc<dyn EngineLauncher>, config: &ExportConfig) -> Self {
        Self::with_pdf_exporter(Arc::new(PdfExporter::with_launcher(launcher, config)), config)
    }

    pub fn with_pdf_exporter(pdf: Arc<PdfExporter>, config: &ExportConfig) -> Self {
        Self {
            csv: CsvExporter::with_batch_size(config.csv_batch_size),
            excel: ExcelExporter::new(),
            pdf,
        }
    }

    pub fn pdf_exporter(&self) -> Arc<PdfExporter> {
        self.pdf.clone()
    }

    async fn encode(
        &self,
        records: Vec<Record>,
        format: ExportFormat,
        options: ExportOptions,
    ) -> ExportOutcome<(Vec<u8>, Vec<ExportWarning>)> {
        match format {
            ExportFormat::Csv => {
                let data = self
                    .csv
                    .export_to_csv_stream(&records, &options, |done, total| {
                        log::trace!("CSV export progress: {}/{}", done, total);
                    })
                    .await?;
                Ok((data, Vec::new()))
            }
            ExportFormat::Excel => {
                let excel = self.excel.clone();
                let sheet_name = options.excel.sheet_name.clone();
                let output = task::spawn_blocking(move || excel.export_with_warnings(&records, &options))
                    .await
                    .map_err(|e| {
                        ExportError::failure(
                            ExportFormat::Excel,
                            ExportError::Io(format!("Excel build task failed: {}", e)),
                            BTreeMap::from([("sheetName".to_string(), sheet_name)]),
                        )
                    })??;
                Ok((output.data, output.warnings))
            }
            ExportFormat::Pdf => {
                let output = self.pdf.export_with_warnings(&records, &options).await?;
                Ok((output.data, output.warnings))
            }
        }
    }
}

#[async_trait]
impl ExportService for ExportServiceImpl {
    async fn export(&self, records: Vec<Record>, format: ExportFormat, options: ExportOptions) -> ExportOutcome<ExportResult> {
        let export_id = Uuid::new_v4();
        let created_at = Utc::now();
        let record_count = records.len();
        log::info!("Export {} started: {} records as {}", export_id, record_count, format);

        let (data, warnings) = match self.encode(records, format, options).await {
            Ok(encoded) => encoded,
            Err(e) => {
                log::error!("Export {} failed [{}]: {}", export_id, e.code(), e);
                return Err(e);
            }
        };

        for warning in &warnings {
            log::warn!("Export {}: {}", export_id, warning);
        }

        let metadata = ExportMetadata {
            export_id,
            file_name: file_name(format, &created_at),
            size: data.len(),
            format,
            mime_type: format.mime_type().to_string(),
            record_count,
            checksum: checksum(&data),
            created_at,
            warnings,
        };
        log::info!(
            "Export {} finished: {} ({} bytes)",
            export_id,
            metadata.file_name,
            metadata.size
        );
        Ok(ExportResult { data, metadata })
    }

    async fn create_template(&self, format: ExportFormat, fields: Vec<String>, options: ExportOptions) -> ExportOutcome<Vec<u8>> {
        match format {
            ExportFormat::Csv => self.csv.create_template(&fields, &options),
            ExportFormat::Excel => {
                let name = options.excel.sheet_name.clone();
                let options = ExportOptions {
                    fields: Some(fields),
                    ..options
                };
                self.excel.create_template(&name, &options)
            }
            ExportFormat::Pdf => Err(ExportError::invalid_config("Templates are only available for CSV and Excel")),
        }
    }

    async fn shutdown(&self) {
        log::info!("Shutting down export service");
        self.pdf.close().await;
    }
}

/// `report_<YYYYMMDD_HHMMSS>.<ext>`
pub fn file_name(format: ExportFormat, at: &DateTime<Utc>) -> String {
    format!("report_{}.{}", at.format("%Y%m%d_%H%M%S"), format.file_extension())
}

/// Lowercase hex SHA-256 of the file contents
pub fn checksum(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}
