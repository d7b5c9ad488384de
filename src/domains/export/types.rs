use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::errors::{ExportError, ExportOutcome};

/// Export formats supported by the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Csv,
    #[serde(alias = "xlsx")]
    Excel,
    Pdf,
}

impl ExportFormat {
    /// Get file extension for this format
    pub fn file_extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Excel => "xlsx",
            ExportFormat::Pdf => "pdf",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv; charset=utf-8",
            ExportFormat::Excel => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            ExportFormat::Pdf => "application/pdf",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportFormat::Csv => write!(f, "CSV"),
            ExportFormat::Excel => write!(f, "Excel"),
            ExportFormat::Pdf => write!(f, "PDF"),
        }
    }
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "excel" | "xlsx" => Ok(ExportFormat::Excel),
            "pdf" => Ok(ExportFormat::Pdf),
            other => Err(ExportError::invalid_config(format!("Unsupported export format: {}", other))),
        }
    }
}

/// A single field value of a record
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    String(String),
    Number(f64),
    Boolean(bool),
    Date(DateTime<Utc>),
    Null,
    /// Nested object or array, kept as-is
    Json(serde_json::Value),
}

impl FieldValue {
    /// Null and empty strings count as empty
    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Null => true,
            FieldValue::String(s) => s.is_empty(),
            _ => false,
        }
    }
}

impl From<serde_json::Value> for FieldValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => FieldValue::Null,
            serde_json::Value::Bool(b) => FieldValue::Boolean(b),
            serde_json::Value::Number(n) => n
                .as_f64()
                .map(FieldValue::Number)
                .unwrap_or_else(|| FieldValue::String(n.to_string())),
            serde_json::Value::String(s) => FieldValue::String(s),
            nested => FieldValue::Json(nested),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::String(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::String(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Number(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Number(value as f64)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Number(value as f64)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Boolean(value)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        FieldValue::Date(value)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(FieldValue::Null)
    }
}

/// One row of exported data: field names in insertion order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, FieldValue)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert. Replaces the value if the field already exists.
    pub fn with(mut self, field: &str, value: impl Into<FieldValue>) -> Self {
        self.insert(field, value);
        self
    }

    pub fn insert(&mut self, field: &str, value: impl Into<FieldValue>) {
        let value = value.into();
        match self.fields.iter_mut().find(|(name, _)| name == field) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((field.to_string(), value)),
        }
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(name, _)| name == field).map(|(_, v)| v)
    }

    /// Missing fields read as null
    pub fn value(&self, field: &str) -> &FieldValue {
        static NULL: FieldValue = FieldValue::Null;
        self.get(field).unwrap_or(&NULL)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Convert a JSON object into a record, keeping key order
    pub fn from_json(value: serde_json::Value) -> ExportOutcome<Self> {
        match value {
            serde_json::Value::Object(map) => Ok(map.into_iter().map(|(k, v)| (k, FieldValue::from(v))).collect()),
            other => Err(ExportError::invalid_config(format!(
                "Expected a JSON object per record, got: {}",
                other
            ))),
        }
    }
}

impl FromIterator<(String, FieldValue)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, FieldValue)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (name, value) in iter {
            record.insert(&name, value);
        }
        record
    }
}

impl<'de> Deserialize<'de> for Record {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let map = serde_json::Map::<String, serde_json::Value>::deserialize(deserializer)?;
        Ok(map.into_iter().map(|(k, v)| (k, FieldValue::from(v))).collect())
    }
}

/// Options shared by every exporter plus the per-format groups
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExportOptions {
    /// Label of the exported resource, e.g. "VPC"
    pub resource_type: Option<String>,
    /// Ordered projection. Defaults to the first record's keys.
    pub fields: Option<Vec<String>>,
    /// Filters applied upstream, shown for display only
    pub filters: serde_json::Map<String, serde_json::Value>,
    pub include_metadata: bool,
    pub csv: CsvOptions,
    pub excel: ExcelOptions,
    pub pdf: PdfOptions,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            resource_type: None,
            fields: None,
            filters: serde_json::Map::new(),
            include_metadata: true,
            csv: CsvOptions::default(),
            excel: ExcelOptions::default(),
            pdf: PdfOptions::default(),
        }
    }
}

impl ExportOptions {
    pub fn with_fields(mut self, fields: &[&str]) -> Self {
        self.fields = Some(fields.iter().map(|f| f.to_string()).collect());
        self
    }

    pub fn with_resource_type(mut self, resource_type: &str) -> Self {
        self.resource_type = Some(resource_type.to_string());
        self
    }

    /// `fields`, when given, must be a non-empty list of non-empty names
    pub fn validate_fields(&self) -> ExportOutcome<()> {
        match &self.fields {
            Some(fields) => validate_field_names(fields),
            None => Ok(()),
        }
    }

    /// Resolve the projection once per export call
    pub fn resolve_fields(&self, records: &[Record]) -> Vec<String> {
        match &self.fields {
            Some(fields) if !fields.is_empty() => fields.clone(),
            _ => records
                .first()
                .map(|r| r.keys().map(str::to_string).collect())
                .unwrap_or_default(),
        }
    }

    /// Filters flattened as "key: value; ..." for display
    pub fn filters_summary(&self) -> Option<String> {
        if self.filters.is_empty() {
            return None;
        }
        let parts: Vec<String> = self
            .filters
            .iter()
            .map(|(key, value)| match value {
                serde_json::Value::String(s) => format!("{}: {}", key, s),
                other => format!("{}: {}", key, other),
            })
            .collect();
        Some(parts.join("; "))
    }
}

/// A projection must name at least one field and every name must be non-blank
pub fn validate_field_names(fields: &[String]) -> ExportOutcome<()> {
    if fields.is_empty() {
        return Err(ExportError::invalid_config("fields must not be empty when provided"));
    }
    if let Some(pos) = fields.iter().position(|f| f.trim().is_empty()) {
        return Err(ExportError::invalid_config(format!(
            "fields[{}] must be a non-empty field name",
            pos
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CsvOptions {
    /// Must be exactly one character
    pub delimiter: String,
    pub true_value: String,
    pub false_value: String,
    /// Records per batch for the streaming variant; the exporter default when unset
    pub batch_size: Option<usize>,
    /// Prefix the output with a UTF-8 byte order mark
    pub include_bom: bool,
    /// chrono format string for date values, ISO-8601 otherwise
    pub date_format: Option<String>,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: ",".to_string(),
            true_value: "true".to_string(),
            false_value: "false".to_string(),
            batch_size: None,
            include_bom: false,
            date_format: None,
        }
    }
}

/// Cell styling supplied by the caller. Colors are RRGGBB hex, with or without '#'.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CellStyleOptions {
    pub bold: Option<bool>,
    pub italic: Option<bool>,
    pub font_color: Option<String>,
    pub fill_color: Option<String>,
    pub font_size: Option<f64>,
}

/// Number of frozen rows and columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FreezePanes {
    pub row: u32,
    pub column: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartPosition {
    pub row: u32,
    pub column: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartSpec {
    #[serde(rename = "type", default)]
    pub chart_type: String,
    #[serde(default)]
    pub title: String,
    pub position: ChartPosition,
    #[serde(default)]
    pub data_range: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExcelOptions {
    pub sheet_name: String,
    pub summary_sheet: bool,
    pub auto_filter: bool,
    /// Defaults to freezing the header row
    pub freeze_panes: Option<FreezePanes>,
    /// Per-field width overrides, in characters
    pub column_widths: BTreeMap<String, f64>,
    pub header_style: Option<CellStyleOptions>,
    pub alternating_row_style: Option<CellStyleOptions>,
    pub charts: Vec<ChartSpec>,
    pub protect_workbook: bool,
    pub password: Option<String>,
    pub creator: Option<String>,
}

impl Default for ExcelOptions {
    fn default() -> Self {
        Self {
            sheet_name: "Data".to_string(),
            summary_sheet: false,
            auto_filter: true,
            freeze_panes: None,
            column_widths: BTreeMap::new(),
            header_style: None,
            alternating_row_style: None,
            charts: Vec::new(),
            protect_workbook: false,
            password: None,
            creator: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PageFormat {
    A3,
    #[default]
    A4,
    A5,
    Letter,
    Legal,
    Tabloid,
}

impl PageFormat {
    /// Portrait width and height in millimetres
    pub fn dimensions_mm(&self) -> (f64, f64) {
        match self {
            PageFormat::A3 => (297.0, 420.0),
            PageFormat::A4 => (210.0, 297.0),
            PageFormat::A5 => (148.0, 210.0),
            PageFormat::Letter => (215.9, 279.4),
            PageFormat::Legal => (215.9, 355.6),
            PageFormat::Tabloid => (279.4, 431.8),
        }
    }
}

impl fmt::Display for PageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    #[default]
    Portrait,
    Landscape,
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Orientation::Portrait => write!(f, "portrait"),
            Orientation::Landscape => write!(f, "landscape"),
        }
    }
}

/// CSS lengths, e.g. "2cm"
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageMargins {
    pub top: String,
    pub right: String,
    pub bottom: String,
    pub left: String,
}

impl Default for PageMargins {
    fn default() -> Self {
        Self {
            top: "2cm".to_string(),
            right: "1.5cm".to_string(),
            bottom: "2cm".to_string(),
            left: "1.5cm".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PdfLayout {
    Table,
    Cards,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PdfCustomOptions {
    pub layout: Option<PdfLayout>,
    pub title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PdfOptions {
    pub template: String,
    pub format: PageFormat,
    pub orientation: Orientation,
    pub margins: PageMargins,
    pub print_background: bool,
    /// Restricted to [0.1, 2.0]
    pub scale: Option<f64>,
    /// e.g. "1-3, 5"
    pub page_ranges: Option<String>,
    pub display_header_footer: bool,
    pub custom_options: PdfCustomOptions,
}

impl Default for PdfOptions {
    fn default() -> Self {
        Self {
            template: "default".to_string(),
            format: PageFormat::A4,
            orientation: Orientation::Portrait,
            margins: PageMargins::default(),
            print_background: true,
            scale: None,
            page_ranges: None,
            display_header_footer: false,
            custom_options: PdfCustomOptions::default(),
        }
    }
}

/// Degraded-mode branches taken during an export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ExportWarning {
    /// The requested PDF template was missing and the default one was used
    TemplateFallback { requested: String, used: String },
    /// A chart was rendered as a labelled cell instead of a native chart
    ChartPlaceholder { index: usize, title: String, row: u32, column: u32 },
}

impl fmt::Display for ExportWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportWarning::TemplateFallback { requested, used } => {
                write!(f, "Template '{}' not found, used '{}'", requested, used)
            }
            ExportWarning::ChartPlaceholder { index, title, row, column } => {
                write!(
                    f,
                    "Chart {} ('{}') rendered as a placeholder at row {}, column {}",
                    index, title, row, column
                )
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Date,
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::String => write!(f, "string"),
            FieldType::Number => write!(f, "number"),
            FieldType::Boolean => write!(f, "boolean"),
            FieldType::Date => write!(f, "date"),
        }
    }
}

/// Per-field aggregate shown on the Excel summary sheet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldStatistic {
    pub field: String,
    pub non_empty_count: usize,
    pub distinct_count: usize,
    pub inferred_type: FieldType,
}

/// Metadata of a completed export
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportMetadata {
    pub export_id: Uuid,
    pub file_name: String,
    pub size: usize,
    pub format: ExportFormat,
    pub mime_type: String,
    pub record_count: usize,
    pub checksum: String,
    pub created_at: DateTime<Utc>,
    pub warnings: Vec<ExportWarning>,
}

/// Encoded file plus its metadata
#[derive(Debug, Clone)]
pub struct ExportResult {
    pub data: Vec<u8>,
    pub metadata: ExportMetadata,
}

impl ExportResult {
    pub fn file_name(&self) -> &str {
        &self.metadata.file_name
    }

    pub fn size(&self) -> usize {
        self.metadata.size
    }

    pub fn warnings(&self) -> &[ExportWarning] {
        &self.metadata.warnings
    }
}
