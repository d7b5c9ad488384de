use crate::config::DEFAULT_CSV_BATCH_SIZE;
use crate::domains::export::formatter::{format_csv_value, title_case};
use crate::domains::export::types::*;
use crate::errors::{ExportError, ExportOutcome};
use csv::{QuoteStyle, Terminator, WriterBuilder};
use std::time::Instant;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// CSV exporter for query result sets. Holds no state between calls.
#[derive(Debug, Clone)]
pub struct CsvExporter {
    default_batch_size: usize,
}

impl Default for CsvExporter {
    fn default() -> Self {
        Self::new()
    }
}

impl CsvExporter {
    pub fn new() -> Self {
        Self::with_batch_size(DEFAULT_CSV_BATCH_SIZE)
    }

    /// Batch size used by the streaming variant when the options leave it unset
    pub fn with_batch_size(default_batch_size: usize) -> Self {
        Self {
            default_batch_size: default_batch_size.max(1),
        }
    }

    /// Synchronous option check, run before any encoding work
    pub fn validate_options(&self, options: &ExportOptions) -> ExportOutcome<()> {
        options.validate_fields()?;
        delimiter_byte(&options.csv.delimiter)?;
        if options.csv.batch_size == Some(0) {
            return Err(ExportError::invalid_config("batchSize must be greater than zero"));
        }
        Ok(())
    }

    /// Encode all records in one pass
    pub fn export_to_csv(&self, records: &[Record], options: &ExportOptions) -> ExportOutcome<Vec<u8>> {
        if records.is_empty() {
            return Err(ExportError::no_data(ExportFormat::Csv));
        }
        self.validate_options(options)?;

        let start_time = Instant::now();
        let fields = options.resolve_fields(records);
        let mut buffer = self.start_document(&fields, &options.csv)?;
        self.write_rows(&mut buffer, records, &fields, &options.csv)?;

        log::debug!(
            "CSV export completed. Records written: {}, bytes: {}, took {}ms",
            records.len(),
            buffer.len(),
            start_time.elapsed().as_millis()
        );
        Ok(buffer)
    }

    /// Encode in batches of `batch_size`, reporting `(processed, total)` after each
    /// batch and yielding to the runtime in between. Produces the same bytes as
    /// [`CsvExporter::export_to_csv`].
    pub async fn export_to_csv_stream<F>(
        &self,
        records: &[Record],
        options: &ExportOptions,
        mut on_progress: F,
    ) -> ExportOutcome<Vec<u8>>
    where
        F: FnMut(usize, usize) + Send,
    {
        if records.is_empty() {
            return Err(ExportError::no_data(ExportFormat::Csv));
        }
        self.validate_options(options)?;

        let total = records.len();
        let batch_size = options.csv.batch_size.unwrap_or(self.default_batch_size);
        let fields = options.resolve_fields(records);
        let mut buffer = self.start_document(&fields, &options.csv)?;

        log::debug!("Streaming CSV export: {} records, batch_size={}", total, batch_size);

        let mut processed = 0;
        for batch in records.chunks(batch_size) {
            self.write_rows(&mut buffer, batch, &fields, &options.csv)?;
            processed += batch.len();
            on_progress(processed, total);

            if processed < total {
                tokio::task::yield_now().await;
            }
        }

        log::debug!("Streaming CSV export completed: {} records, {} bytes", processed, buffer.len());
        Ok(buffer)
    }

    /// Header-only CSV followed by a blank line, for use as an import template
    pub fn create_template(&self, fields: &[String], options: &ExportOptions) -> ExportOutcome<Vec<u8>> {
        if fields.is_empty() {
            return Err(ExportError::invalid_config("At least one field is required for a CSV template"));
        }
        validate_field_names(fields)?;
        let delimiter = delimiter_byte(&options.csv.delimiter)?;
        let mut buffer = Vec::new();
        if options.csv.include_bom {
            buffer.extend_from_slice(UTF8_BOM);
        }
        write_record(&mut buffer, delimiter, fields.iter().map(|f| title_case(f)))?;
        buffer.push(b'\n');
        Ok(buffer)
    }

    fn start_document(&self, fields: &[String], options: &CsvOptions) -> ExportOutcome<Vec<u8>> {
        let delimiter = delimiter_byte(&options.delimiter)?;
        let mut buffer = Vec::new();
        if options.include_bom {
            buffer.extend_from_slice(UTF8_BOM);
        }
        write_record(&mut buffer, delimiter, fields.iter().map(|f| title_case(f)))?;
        Ok(buffer)
    }

    fn write_rows(
        &self,
        buffer: &mut Vec<u8>,
        records: &[Record],
        fields: &[String],
        options: &CsvOptions,
    ) -> ExportOutcome<()> {
        let delimiter = delimiter_byte(&options.delimiter)?;
        let mut wtr = writer_builder(delimiter).from_writer(buffer);
        for record in records {
            let row = fields.iter().map(|field| format_csv_value(record.value(field), options));
            wtr.write_record(row).map_err(|e| ExportError::Io(e.to_string()))?;
        }
        wtr.flush().map_err(|e| ExportError::Io(e.to_string()))?;
        Ok(())
    }
}

fn writer_builder(delimiter: u8) -> WriterBuilder {
    let mut builder = WriterBuilder::new();
    builder
        .delimiter(delimiter)
        .quote(b'"')
        .double_quote(true)
        .quote_style(QuoteStyle::Necessary)
        .terminator(Terminator::Any(b'\n'));
    builder
}

fn write_record<I>(buffer: &mut Vec<u8>, delimiter: u8, row: I) -> ExportOutcome<()>
where
    I: IntoIterator<Item = String>,
{
    let mut wtr = writer_builder(delimiter).from_writer(buffer);
    wtr.write_record(row).map_err(|e| ExportError::Io(e.to_string()))?;
    wtr.flush().map_err(|e| ExportError::Io(e.to_string()))?;
    Ok(())
}

/// The delimiter must be a single ASCII character other than the quote or a line break
fn delimiter_byte(delimiter: &str) -> ExportOutcome<u8> {
    let mut chars = delimiter.chars();
    match (chars.next(), chars.next()) {
        (Some(ch), None) if ch.is_ascii() && !matches!(ch, '"' | '\r' | '\n') => Ok(ch as u8),
        (Some(_), None) => Err(ExportError::invalid_config(format!(
            "Delimiter '{}' is not supported",
            delimiter.escape_default()
        ))),
        _ => Err(ExportError::invalid_config(format!(
            "Delimiter must be a single character, got '{}'",
            delimiter
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    fn vpc_records() -> Vec<Record> {
        vec![Record::new().with("id", 1).with("name", "VPC-001").with("region", "us-east-1")]
    }

    fn to_string(bytes: Vec<u8>) -> String {
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_basic_export() {
        let csv = to_string(CsvExporter::new().export_to_csv(&vpc_records(), &ExportOptions::default()).unwrap());
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines, vec!["Id,Name,Region", "1,VPC-001,us-east-1"]);
    }

    #[test]
    fn test_custom_delimiter() {
        let mut options = ExportOptions::default();
        options.csv.delimiter = ";".into();
        let records = vec![
            Record::new().with("id", 1).with("name", "VPC-001").with("region", "us-east-1"),
            Record::new().with("id", 2).with("name", "VPC-002").with("region", "eu-west-1"),
        ];
        let csv = to_string(CsvExporter::new().export_to_csv(&records, &options).unwrap());
        for line in csv.lines() {
            assert_eq!(line.matches(';').count(), 2);
            assert!(!line.contains(','));
        }
        assert!(csv.contains("2;VPC-002;eu-west-1"));
    }

    #[test]
    fn test_custom_delimiter_inside_value_is_quoted() {
        let mut options = ExportOptions::default();
        options.csv.delimiter = ";".into();
        let records = vec![Record::new().with("name", "a;b").with("cidr", "10.0.0.0/16")];
        let text = to_string(CsvExporter::new().export_to_csv(&records, &options).unwrap());
        assert_eq!(text, "Name;Cidr\n\"a;b\";10.0.0.0/16\n");

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b';')
            .from_reader(text.as_bytes());
        let row = reader.records().next().unwrap().unwrap();
        assert_eq!(row.get(0), Some("a;b"));
        assert_eq!(row.len(), 2);
    }

    #[test]
    fn test_empty_records_fail() {
        let err = CsvExporter::new().export_to_csv(&[], &ExportOptions::default()).unwrap_err();
        assert_eq!(err, ExportError::no_data(ExportFormat::Csv));
        assert_eq!(err.to_string(), "No data provided for CSV export");
    }

    #[test]
    fn test_multi_character_delimiter_rejected() {
        let mut options = ExportOptions::default();
        options.csv.delimiter = "||".into();
        let err = CsvExporter::new().validate_options(&options).unwrap_err();
        assert_eq!(err.code(), "INVALID_CONFIGURATION");

        let err = CsvExporter::new().export_to_csv(&vpc_records(), &options).unwrap_err();
        assert_eq!(err.code(), "INVALID_CONFIGURATION");

        options.csv.delimiter = String::new();
        assert!(CsvExporter::new().validate_options(&options).is_err());
    }

    #[test]
    fn test_quoting_round_trip() {
        let records = vec![
            Record::new()
                .with("name", "web, public")
                .with("description", "says \"hello\"")
                .with("notes", "line one\nline two"),
            Record::new().with("name", "plain").with("description", "").with("notes", FieldValue::Null),
        ];
        let bytes = CsvExporter::new().export_to_csv(&records, &ExportOptions::default()).unwrap();

        let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(bytes.as_slice());
        let headers: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
        assert_eq!(headers, vec!["Name", "Description", "Notes"]);

        let rows: Vec<Vec<String>> = reader
            .records()
            .map(|r| r.unwrap().iter().map(String::from).collect())
            .collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], vec!["web, public", "says \"hello\"", "line one\nline two"]);
        assert_eq!(rows[1], vec!["plain", "", ""]);
    }

    #[test]
    fn test_field_projection_and_order() {
        let records = vec![
            Record::new().with("id", 1).with("name", "a").with("region", "r1"),
            Record::new().with("id", 2).with("name", "b").with("region", "r2"),
            Record::new().with("id", 3).with("name", "c").with("region", "r3"),
        ];
        let options = ExportOptions::default().with_fields(&["region", "id"]);
        let csv = to_string(CsvExporter::new().export_to_csv(&records, &options).unwrap());
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines, vec!["Region,Id", "r1,1", "r2,2", "r3,3"]);
    }

    #[test]
    fn test_boolean_relabel_and_nested_values() {
        let mut options = ExportOptions::default();
        options.csv.true_value = "Y".into();
        options.csv.false_value = "N".into();
        let records = vec![
            Record::from_json(json!({"isDefault": true, "tags": {"env": "prod"}})).unwrap(),
            Record::from_json(json!({"isDefault": false, "tags": null})).unwrap(),
        ];
        let csv = to_string(CsvExporter::new().export_to_csv(&records, &options).unwrap());
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "Is Default,Tags");
        assert_eq!(lines[1], r#"Y,"{""env"":""prod""}""#);
        assert_eq!(lines[2], "N,");
    }

    #[test]
    fn test_bom_prefix() {
        let mut options = ExportOptions::default();
        options.csv.include_bom = true;
        let bytes = CsvExporter::new().export_to_csv(&vpc_records(), &options).unwrap();
        assert!(bytes.starts_with(UTF8_BOM));
    }

    #[test]
    fn test_idempotent_output() {
        let exporter = CsvExporter::new();
        let options = ExportOptions::default();
        let first = exporter.export_to_csv(&vpc_records(), &options).unwrap();
        let second = exporter.export_to_csv(&vpc_records(), &options).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_create_template() {
        let fields = vec!["vpcId".to_string(), "cidr_block".to_string()];
        let csv = to_string(CsvExporter::new().create_template(&fields, &ExportOptions::default()).unwrap());
        assert_eq!(csv, "Vpc Id,Cidr Block\n\n");

        assert!(CsvExporter::new().create_template(&[], &ExportOptions::default()).is_err());

        let blank = vec![String::new(), "x".to_string()];
        let err = CsvExporter::new().create_template(&blank, &ExportOptions::default()).unwrap_err();
        assert_eq!(err.code(), "INVALID_CONFIGURATION");
        assert!(err.to_string().contains("fields[0]"));
    }

    #[tokio::test]
    async fn test_stream_matches_batch_output_and_reports_progress() {
        let records: Vec<Record> = (0..250)
            .map(|i| Record::new().with("id", i).with("name", format!("subnet-{}", i)))
            .collect();
        let options = ExportOptions::default();
        let exporter = CsvExporter::new();

        let progress = Arc::new(Mutex::new(Vec::new()));
        let sink = progress.clone();
        let streamed = exporter
            .export_to_csv_stream(&records, &options, move |done, total| {
                sink.lock().unwrap().push((done, total));
            })
            .await
            .unwrap();

        assert_eq!(streamed, exporter.export_to_csv(&records, &options).unwrap());
        assert_eq!(*progress.lock().unwrap(), vec![(100, 250), (200, 250), (250, 250)]);
        assert_eq!(to_string(streamed).lines().count(), 251);
    }

    #[tokio::test]
    async fn test_stream_batch_size_sources() {
        let records: Vec<Record> = (0..10).map(|i| Record::new().with("id", i)).collect();
        let mut batches = Vec::new();
        CsvExporter::with_batch_size(4)
            .export_to_csv_stream(&records, &ExportOptions::default(), |done, _| batches.push(done))
            .await
            .unwrap();
        assert_eq!(batches, vec![4, 8, 10]);

        let mut options = ExportOptions::default();
        options.csv.batch_size = Some(5);
        let mut batches = Vec::new();
        CsvExporter::with_batch_size(4)
            .export_to_csv_stream(&records, &options, |done, _| batches.push(done))
            .await
            .unwrap();
        assert_eq!(batches, vec![5, 10]);
    }

    #[tokio::test]
    async fn test_stream_rejects_bad_options_before_progress() {
        let mut options = ExportOptions::default();
        options.csv.batch_size = Some(0);
        let mut calls = 0;
        let result = CsvExporter::new()
            .export_to_csv_stream(&vpc_records(), &options, |_, _| calls += 1)
            .await;
        assert!(result.is_err());
        assert_eq!(calls, 0);

        let empty = CsvExporter::new()
            .export_to_csv_stream(&[], &ExportOptions::default(), |_, _| {})
            .await;
        assert_eq!(empty.unwrap_err().code(), "NO_DATA");
    }
}
