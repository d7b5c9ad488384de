use chrono::{Timelike, Utc};
use std::collections::{BTreeMap, HashSet};

use crate::domains::export::formatter::{
    display_length, format_excel_value, parse_date_string, title_case, value_key, CellValue,
};
use crate::domains::export::types::{
    CellStyleOptions, ChartPosition, ChartSpec, ExcelOptions, ExportFormat, ExportOptions, ExportWarning, FieldStatistic,
    FieldType, FieldValue, Record,
};
use crate::domains::export::writers::xlsx::{cell_ref, normalize_color, CellStyle, NumberFormat, Workbook, Worksheet};
use crate::errors::{ExportError, ExportOutcome};

pub const DEFAULT_CREATOR: &str = "CMDB Export";
pub const SUMMARY_SHEET_NAME: &str = "Summary";

const MIN_COLUMN_WIDTH: f64 = 8.0;
const MAX_COLUMN_WIDTH: f64 = 50.0;
const WIDTH_SAMPLE_SIZE: usize = 100;
const STATS_SAMPLE_SIZE: usize = 1000;
const MAX_SHEET_NAME_LEN: usize = 31;
/// Worksheet limits of the xlsx format
pub const MAX_ROWS: u32 = 1_048_576;
pub const MAX_COLUMNS: u32 = 16_384;
const INVALID_SHEET_CHARS: [char; 7] = ['[', ']', ':', '*', '?', '/', '\\'];

const HEADER_FILL: &str = "FF4472C4";
const HEADER_FONT: &str = "FFFFFFFF";
const BANNER_FILL: &str = "FF1F4E78";
const ALTERNATE_FILL: &str = "FFF2F2F2";
const PLACEHOLDER_FILL: &str = "FFFFF2CC";

/// Workbook plus the warnings collected while building it
#[derive(Debug)]
pub struct ExcelOutput {
    pub data: Vec<u8>,
    pub warnings: Vec<ExportWarning>,
}

/// Styles registered once per workbook
struct SheetStyles {
    header: CellStyle,
    plain: CellStyle,
    alternate: Option<CellStyle>,
}

/// Builds .xlsx workbooks: an optional summary sheet followed by the data sheet
#[derive(Debug, Clone, Default)]
pub struct ExcelExporter;

impl ExcelExporter {
    pub fn new() -> Self {
        Self
    }

    /// Check chart definitions, protection and sheet naming without building anything
    pub fn validate_options(&self, options: &ExportOptions) -> ExportOutcome<()> {
        options.validate_fields()?;
        let excel = &options.excel;

        validate_sheet_name(&excel.sheet_name)?;
        if excel.summary_sheet && excel.sheet_name.eq_ignore_ascii_case(SUMMARY_SHEET_NAME) {
            return Err(ExportError::invalid_config(format!(
                "Sheet name '{}' is reserved for the summary sheet",
                excel.sheet_name
            )));
        }

        for (i, chart) in excel.charts.iter().enumerate() {
            validate_chart(i + 1, chart)?;
        }

        if let Some(freeze) = &excel.freeze_panes {
            if freeze.row >= MAX_ROWS || freeze.column >= MAX_COLUMNS {
                return Err(ExportError::invalid_config(format!(
                    "freezePanes ({}, {}) must leave at least one unfrozen cell (rows < {}, columns < {})",
                    freeze.row, freeze.column, MAX_ROWS, MAX_COLUMNS
                )));
            }
        }

        if excel.protect_workbook && excel.password.as_deref().map_or(true, |p| p.is_empty()) {
            return Err(ExportError::invalid_config(
                "A password is required when workbook protection is enabled",
            ));
        }

        for (label, style) in [
            ("headerStyle", &excel.header_style),
            ("alternatingRowStyle", &excel.alternating_row_style),
        ] {
            if let Some(style) = style {
                validate_style(label, style)?;
            }
        }

        for (field, width) in &excel.column_widths {
            if !width.is_finite() || *width <= 0.0 {
                return Err(ExportError::invalid_config(format!(
                    "Column width for '{}' must be a positive number",
                    field
                )));
            }
        }

        Ok(())
    }

    pub fn export_to_excel(&self, records: &[Record], options: &ExportOptions) -> ExportOutcome<Vec<u8>> {
        self.export_with_warnings(records, options).map(|output| output.data)
    }

    pub fn export_with_warnings(&self, records: &[Record], options: &ExportOptions) -> ExportOutcome<ExcelOutput> {
        if records.is_empty() {
            return Err(ExportError::no_data(ExportFormat::Excel));
        }
        self.validate_options(options)?;

        let fields = options.resolve_fields(records);
        validate_sheet_size(records.len(), fields.len())?;
        validate_chart_placement(&options.excel.charts, records.len() as u32 + 1, fields.len() as u32)?;
        log::debug!(
            "Building Excel export: {} records, {} fields, sheet '{}'",
            records.len(),
            fields.len(),
            options.excel.sheet_name
        );

        let output = self
            .build_workbook(records, &fields, options)
            .map_err(|e| ExportError::failure(ExportFormat::Excel, e, failure_context(&options.excel)))?;

        log::info!(
            "Excel export complete: {} records, {} bytes, {} warnings",
            records.len(),
            output.data.len(),
            output.warnings.len()
        );
        Ok(output)
    }

    /// Header-only workbook with a single sheet called `name`
    pub fn create_template(&self, name: &str, options: &ExportOptions) -> ExportOutcome<Vec<u8>> {
        validate_sheet_name(name)?;
        let fields = match &options.fields {
            Some(fields) if !fields.is_empty() => fields.clone(),
            _ => {
                return Err(ExportError::invalid_config(
                    "An Excel template needs at least one field",
                ))
            }
        };
        options.validate_fields()?;
        if let Some(style) = &options.excel.header_style {
            validate_style("headerStyle", style)?;
        }

        let mut workbook = Workbook::new(options.excel.creator.as_deref().unwrap_or(DEFAULT_CREATOR));
        let header_style = header_style(options.excel.header_style.as_ref());
        let header = workbook.register_style(&header_style);

        let mut sheet = Worksheet::new(name);
        for (i, field) in fields.iter().enumerate() {
            let column = i as u32 + 1;
            sheet.set_cell(1, column, CellValue::Text(title_case(field)), header);
            let width = options
                .excel
                .column_widths
                .get(field)
                .copied()
                .unwrap_or_else(|| clamp_width(field.chars().count() as f64));
            sheet.set_column_width(column, width);
        }
        sheet.freeze(1, 0);
        workbook.add_sheet(sheet)?;
        workbook.save_to_bytes()
    }

    /// Non-empty and distinct counts plus the inferred type, over the first 1000 records
    pub fn field_statistics(records: &[Record], fields: &[String]) -> Vec<FieldStatistic> {
        let sample = &records[..records.len().min(STATS_SAMPLE_SIZE)];
        fields
            .iter()
            .map(|field| {
                let mut non_empty_count = 0;
                let mut distinct = HashSet::new();
                let mut inferred_type = None;

                for record in sample {
                    let value = record.value(field);
                    if value.is_empty() {
                        continue;
                    }
                    non_empty_count += 1;
                    distinct.insert(value_key(value));
                    if inferred_type.is_none() {
                        inferred_type = Some(infer_type(value));
                    }
                }

                FieldStatistic {
                    field: field.clone(),
                    non_empty_count,
                    distinct_count: distinct.len(),
                    inferred_type: inferred_type.unwrap_or(FieldType::String),
                }
            })
            .collect()
    }

    fn build_workbook(&self, records: &[Record], fields: &[String], options: &ExportOptions) -> ExportOutcome<ExcelOutput> {
        let excel = &options.excel;
        let mut workbook = Workbook::new(excel.creator.as_deref().unwrap_or(DEFAULT_CREATOR));

        if excel.summary_sheet {
            let summary = build_summary_sheet(&mut workbook, records, fields, options);
            workbook.add_sheet(summary)?;
        }

        let styles = SheetStyles {
            header: header_style(excel.header_style.as_ref()),
            plain: CellStyle::default(),
            alternate: excel.alternating_row_style.as_ref().map(alternate_style),
        };
        let mut sheet = build_data_sheet(&mut workbook, records, fields, excel, &styles);
        let warnings = place_chart_placeholders(&mut workbook, &mut sheet, &excel.charts);
        workbook.add_sheet(sheet)?;

        if excel.protect_workbook {
            if let Some(password) = &excel.password {
                workbook.protect_structure(password);
            }
        }

        let data = workbook.save_to_bytes()?;
        Ok(ExcelOutput { data, warnings })
    }
}

fn build_data_sheet(
    workbook: &mut Workbook,
    records: &[Record],
    fields: &[String],
    excel: &ExcelOptions,
    styles: &SheetStyles,
) -> Worksheet {
    let mut sheet = Worksheet::new(&excel.sheet_name);
    let header = workbook.register_style(&styles.header);

    for (i, field) in fields.iter().enumerate() {
        let column = i as u32 + 1;
        sheet.set_cell(1, column, CellValue::Text(title_case(field)), header);
        let width = match excel.column_widths.get(field) {
            Some(width) => *width,
            None => estimate_width(records, field),
        };
        sheet.set_column_width(column, width);
    }

    for (i, record) in records.iter().enumerate() {
        let row = i as u32 + 2;
        let base = match &styles.alternate {
            Some(alternate) if i % 2 == 0 => alternate,
            _ => &styles.plain,
        };
        for (j, field) in fields.iter().enumerate() {
            let value = format_excel_value(record.value(field));
            let style = match &value {
                CellValue::Date(dt) if dt.num_seconds_from_midnight() == 0 && dt.nanosecond() == 0 => base.with_number_format(NumberFormat::Date),
                CellValue::Date(_) => base.with_number_format(NumberFormat::DateTime),
                _ => base.clone(),
            };
            let style_id = workbook.register_style(&style);
            if value == CellValue::Blank && style_id == 0 {
                continue;
            }
            sheet.set_cell(row, j as u32 + 1, value, style_id);
        }
    }

    let last_row = records.len() as u32 + 1;
    let last_col = fields.len() as u32;
    if excel.auto_filter && last_col > 0 {
        sheet.set_auto_filter(1, 1, last_row, last_col);
    }

    match &excel.freeze_panes {
        Some(freeze) => sheet.freeze(freeze.row, freeze.column),
        None => sheet.freeze(1, 0),
    }

    sheet
}

fn build_summary_sheet(workbook: &mut Workbook, records: &[Record], fields: &[String], options: &ExportOptions) -> Worksheet {
    let mut sheet = Worksheet::new(SUMMARY_SHEET_NAME);

    let banner = workbook.register_style(&CellStyle {
        bold: true,
        font_size: Some(160),
        font_color: Some(HEADER_FONT.to_string()),
        fill_color: Some(BANNER_FILL.to_string()),
        center: true,
        ..CellStyle::default()
    });
    let label = workbook.register_style(&CellStyle {
        bold: true,
        ..CellStyle::default()
    });
    let section = workbook.register_style(&CellStyle {
        bold: true,
        font_size: Some(130),
        ..CellStyle::default()
    });
    let header = workbook.register_style(&header_style(None));
    let timestamp = workbook.register_style(&CellStyle::default().with_number_format(NumberFormat::DateTime));

    sheet.set_cell(1, 1, CellValue::Text("CMDB Export Summary".to_string()), banner);
    sheet.merge(1, 1, 1, 4);

    // export metadata rows are skipped when the caller opts out of metadata
    let mut row = 2;
    if options.include_metadata {
        let resource_type = options
            .resource_type
            .clone()
            .unwrap_or_else(|| "All Resources".to_string());
        let filters = options.filters_summary().unwrap_or_else(|| "None".to_string());

        let metadata: [(&str, CellValue, u32); 6] = [
            ("Export Date", CellValue::Date(Utc::now().naive_utc()), timestamp),
            ("Resource Type", CellValue::Text(resource_type), 0),
            ("Record Count", CellValue::Number(records.len() as f64), 0),
            ("Field Count", CellValue::Number(fields.len() as f64), 0),
            ("Format", CellValue::Text(ExportFormat::Excel.to_string()), 0),
            ("Applied Filters", CellValue::Text(filters), 0),
        ];
        row = 3;
        for (name, value, style) in metadata {
            sheet.set_cell(row, 1, CellValue::Text(name.to_string()), label);
            sheet.set_cell(row, 2, value, style);
            row += 1;
        }
    }

    row += 1;
    sheet.set_cell(row, 1, CellValue::Text("Field Statistics".to_string()), section);
    row += 1;
    for (i, title) in ["Field", "Type", "Non-Empty", "Distinct"].iter().enumerate() {
        sheet.set_cell(row, i as u32 + 1, CellValue::Text(title.to_string()), header);
    }

    for stat in ExcelExporter::field_statistics(records, fields) {
        row += 1;
        sheet.set_cell(row, 1, CellValue::Text(stat.field.clone()), 0);
        sheet.set_cell(row, 2, CellValue::Text(stat.inferred_type.to_string()), 0);
        sheet.set_cell(row, 3, CellValue::Number(stat.non_empty_count as f64), 0);
        sheet.set_cell(row, 4, CellValue::Number(stat.distinct_count as f64), 0);
    }

    sheet.set_column_width(1, 24.0);
    sheet.set_column_width(2, 40.0);
    sheet.set_column_width(3, 12.0);
    sheet.set_column_width(4, 12.0);
    sheet
}

/// Native charts are not produced; each chart becomes a labelled cell at its
/// requested position. Positions are checked by `validate_chart_placement`.
fn place_chart_placeholders(workbook: &mut Workbook, sheet: &mut Worksheet, charts: &[ChartSpec]) -> Vec<ExportWarning> {
    if charts.is_empty() {
        return Vec::new();
    }

    let style = workbook.register_style(&CellStyle {
        italic: true,
        fill_color: Some(PLACEHOLDER_FILL.to_string()),
        border: true,
        center: true,
        ..CellStyle::default()
    });

    charts
        .iter()
        .enumerate()
        .map(|(i, chart)| {
            let ChartPosition { row, column } = chart.position;
            let label = format!("[Chart: {} ({})]", chart.title, chart.chart_type);
            log::warn!(
                "Chart {} '{}' rendered as a placeholder at row {}, column {}",
                i + 1,
                chart.title,
                row,
                column
            );
            if sheet.column_width(column).is_none() {
                sheet.set_column_width(column, clamp_width(label.chars().count() as f64));
            }
            sheet.set_cell(row, column, CellValue::Text(label), style);

            ExportWarning::ChartPlaceholder {
                index: i + 1,
                title: chart.title.clone(),
                row,
                column,
            }
        })
        .collect()
}

/// `max(field name length, longest sampled value, 8)`, capped at 50
fn estimate_width(records: &[Record], field: &str) -> f64 {
    let longest = records
        .iter()
        .take(WIDTH_SAMPLE_SIZE)
        .map(|record| display_length(record.value(field)))
        .max()
        .unwrap_or(0);
    clamp_width(field.chars().count().max(longest) as f64)
}

fn clamp_width(width: f64) -> f64 {
    width.clamp(MIN_COLUMN_WIDTH, MAX_COLUMN_WIDTH)
}

fn infer_type(value: &FieldValue) -> FieldType {
    match value {
        FieldValue::Number(_) => FieldType::Number,
        FieldValue::Boolean(_) => FieldType::Boolean,
        FieldValue::Date(_) => FieldType::Date,
        FieldValue::String(s) if parse_date_string(s).is_some() => FieldType::Date,
        _ => FieldType::String,
    }
}

fn header_style(options: Option<&CellStyleOptions>) -> CellStyle {
    let fill = options.and_then(|o| o.fill_color.as_deref()).and_then(normalize_color);
    let font = options.and_then(|o| o.font_color.as_deref()).and_then(normalize_color);
    CellStyle {
        bold: options.and_then(|o| o.bold).unwrap_or(true),
        italic: options.and_then(|o| o.italic).unwrap_or(false),
        font_size: options.and_then(|o| o.font_size).map(points_to_tenths),
        font_color: Some(font.unwrap_or_else(|| HEADER_FONT.to_string())),
        fill_color: Some(fill.unwrap_or_else(|| HEADER_FILL.to_string())),
        border: true,
        center: true,
        number_format: NumberFormat::General,
    }
}

fn alternate_style(options: &CellStyleOptions) -> CellStyle {
    CellStyle {
        bold: options.bold.unwrap_or(false),
        italic: options.italic.unwrap_or(false),
        font_size: options.font_size.map(points_to_tenths),
        font_color: options.font_color.as_deref().and_then(normalize_color),
        fill_color: Some(
            options
                .fill_color
                .as_deref()
                .and_then(normalize_color)
                .unwrap_or_else(|| ALTERNATE_FILL.to_string()),
        ),
        ..CellStyle::default()
    }
}

fn points_to_tenths(points: f64) -> u32 {
    (points * 10.0).round().clamp(10.0, 4090.0) as u32
}

fn validate_style(label: &str, style: &CellStyleOptions) -> ExportOutcome<()> {
    for (name, color) in [("fillColor", &style.fill_color), ("fontColor", &style.font_color)] {
        if let Some(color) = color {
            if normalize_color(color).is_none() {
                return Err(ExportError::invalid_config(format!(
                    "{}.{} '{}' is not a hex color",
                    label, name, color
                )));
            }
        }
    }
    if let Some(size) = style.font_size {
        if !(1.0..=409.0).contains(&size) {
            return Err(ExportError::invalid_config(format!(
                "{}.fontSize must be between 1 and 409",
                label
            )));
        }
    }
    Ok(())
}

fn validate_sheet_name(name: &str) -> ExportOutcome<()> {
    let len = name.chars().count();
    if len == 0 || len > MAX_SHEET_NAME_LEN {
        return Err(ExportError::invalid_config(format!(
            "Sheet name must be 1-{} characters, got {}",
            MAX_SHEET_NAME_LEN, len
        )));
    }
    if let Some(ch) = name.chars().find(|c| INVALID_SHEET_CHARS.contains(c)) {
        return Err(ExportError::invalid_config(format!(
            "Sheet name '{}' contains invalid character '{}'",
            name, ch
        )));
    }
    Ok(())
}

fn validate_chart(index: usize, chart: &ChartSpec) -> ExportOutcome<()> {
    if chart.chart_type.trim().is_empty() {
        return Err(ExportError::invalid_chart(index, "type is required"));
    }
    if chart.title.trim().is_empty() {
        return Err(ExportError::invalid_chart(index, "title is required"));
    }
    if chart.position.row < 1 || chart.position.column < 1 {
        return Err(ExportError::invalid_chart(
            index,
            "position row and column must be at least 1",
        ));
    }
    if chart.position.row > MAX_ROWS || chart.position.column > MAX_COLUMNS {
        return Err(ExportError::invalid_chart(
            index,
            &format!("position must be within {} rows and {} columns", MAX_ROWS, MAX_COLUMNS),
        ));
    }
    Ok(())
}

/// One header row plus one row per record, one column per field
fn validate_sheet_size(record_count: usize, field_count: usize) -> ExportOutcome<()> {
    if record_count >= MAX_ROWS as usize {
        return Err(ExportError::invalid_config(format!(
            "{} records exceed the worksheet limit of {} data rows",
            record_count,
            MAX_ROWS - 1
        )));
    }
    if field_count > MAX_COLUMNS as usize {
        return Err(ExportError::invalid_config(format!(
            "{} fields exceed the worksheet limit of {} columns",
            field_count, MAX_COLUMNS
        )));
    }
    Ok(())
}

/// Placeholders keep their requested cell, so a position inside the header and
/// data block (`last_row` x `last_col`) or shared with another chart is rejected.
fn validate_chart_placement(charts: &[ChartSpec], last_row: u32, last_col: u32) -> ExportOutcome<()> {
    let mut taken = HashSet::new();
    for (i, chart) in charts.iter().enumerate() {
        let ChartPosition { row, column } = chart.position;
        if row <= last_row && column <= last_col {
            return Err(ExportError::invalid_chart(
                i + 1,
                &format!(
                    "position ({}, {}) overlaps the data range A1:{}",
                    row,
                    column,
                    cell_ref(last_row, last_col)
                ),
            ));
        }
        if !taken.insert((row, column)) {
            return Err(ExportError::invalid_chart(
                i + 1,
                &format!("position ({}, {}) is already used by another chart", row, column),
            ));
        }
    }
    Ok(())
}

fn failure_context(excel: &ExcelOptions) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("sheetName".to_string(), excel.sheet_name.clone()),
        ("autoFilter".to_string(), excel.auto_filter.to_string()),
        ("summarySheet".to_string(), excel.summary_sheet.to_string()),
    ])
}
