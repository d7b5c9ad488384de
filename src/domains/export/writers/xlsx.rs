//! Minimal SpreadsheetML (.xlsx) package writer.
//!
//! Produces the parts an Office Open XML workbook needs: content types,
//! package relationships, document properties, the workbook, one part per
//! worksheet and a deduplicated style sheet. Strings are written inline so no
//! shared-string table is required.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::io::{Cursor, Write};
use zip::write::FileOptions;
use zip::ZipWriter;

use crate::domains::export::formatter::CellValue;
use crate::errors::{ExportError, ExportOutcome};

const XML_HEADER: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;
const MAIN_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

const DATE_FORMAT_ID: u32 = 164;
const DATETIME_FORMAT_ID: u32 = 165;

/// Maximum column width Excel accepts, in characters
pub const MAX_COLUMN_WIDTH: f64 = 255.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NumberFormat {
    #[default]
    General,
    Date,
    DateTime,
}

impl NumberFormat {
    fn id(&self) -> u32 {
        match self {
            NumberFormat::General => 0,
            NumberFormat::Date => DATE_FORMAT_ID,
            NumberFormat::DateTime => DATETIME_FORMAT_ID,
        }
    }
}

/// Visual style of a cell. Colors are ARGB hex ("FF4472C4").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct CellStyle {
    pub bold: bool,
    pub italic: bool,
    /// Tenths of a point; None keeps the 11pt default
    pub font_size: Option<u32>,
    pub font_color: Option<String>,
    pub fill_color: Option<String>,
    pub border: bool,
    pub center: bool,
    pub number_format: NumberFormat,
}

impl CellStyle {
    pub fn with_number_format(&self, number_format: NumberFormat) -> Self {
        Self {
            number_format,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FontKey {
    bold: bool,
    italic: bool,
    size: u32,
    color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct XfKey {
    num_fmt_id: u32,
    font_id: usize,
    fill_id: usize,
    border_id: usize,
    center: bool,
}

/// Deduplicating registry behind `xl/styles.xml`. Index 0 is the default style.
#[derive(Debug)]
pub struct StyleRegistry {
    fonts: Vec<FontKey>,
    fills: Vec<Option<String>>,
    xfs: Vec<XfKey>,
    lookup: HashMap<CellStyle, u32>,
}

impl StyleRegistry {
    fn new() -> Self {
        let mut registry = Self {
            fonts: Vec::new(),
            // fills 0 and 1 are reserved by the format (none, gray125)
            fills: vec![None, None],
            xfs: Vec::new(),
            lookup: HashMap::new(),
        };
        registry.register(&CellStyle::default());
        registry
    }

    pub fn register(&mut self, style: &CellStyle) -> u32 {
        if let Some(id) = self.lookup.get(style) {
            return *id;
        }

        let font = FontKey {
            bold: style.bold,
            italic: style.italic,
            size: style.font_size.unwrap_or(110),
            color: style.font_color.clone(),
        };
        let font_id = match self.fonts.iter().position(|f| *f == font) {
            Some(id) => id,
            None => {
                self.fonts.push(font);
                self.fonts.len() - 1
            }
        };

        let fill_id = match &style.fill_color {
            None => 0,
            Some(color) => match self.fills.iter().skip(2).position(|f| f.as_deref() == Some(color.as_str())) {
                Some(pos) => pos + 2,
                None => {
                    self.fills.push(Some(color.clone()));
                    self.fills.len() - 1
                }
            },
        };

        self.xfs.push(XfKey {
            num_fmt_id: style.number_format.id(),
            font_id,
            fill_id,
            border_id: usize::from(style.border),
            center: style.center,
        });
        let id = (self.xfs.len() - 1) as u32;
        self.lookup.insert(style.clone(), id);
        id
    }

    fn to_xml(&self) -> String {
        let mut xml = String::with_capacity(2048);
        xml.push_str(XML_HEADER);
        let _ = write!(xml, r#"<styleSheet xmlns="{}">"#, MAIN_NS);

        let _ = write!(
            xml,
            r#"<numFmts count="2"><numFmt numFmtId="{}" formatCode="yyyy-mm-dd"/><numFmt numFmtId="{}" formatCode="yyyy-mm-dd hh:mm:ss"/></numFmts>"#,
            DATE_FORMAT_ID, DATETIME_FORMAT_ID
        );

        let _ = write!(xml, r#"<fonts count="{}">"#, self.fonts.len());
        for font in &self.fonts {
            xml.push_str("<font>");
            if font.bold {
                xml.push_str("<b/>");
            }
            if font.italic {
                xml.push_str("<i/>");
            }
            let _ = write!(xml, r#"<sz val="{}"/>"#, format_font_size(font.size));
            match &font.color {
                Some(color) => {
                    let _ = write!(xml, r#"<color rgb="{}"/>"#, color);
                }
                None => xml.push_str(r#"<color theme="1"/>"#),
            }
            xml.push_str(r#"<name val="Calibri"/><family val="2"/></font>"#);
        }
        xml.push_str("</fonts>");

        let _ = write!(xml, r#"<fills count="{}">"#, self.fills.len());
        xml.push_str(r#"<fill><patternFill patternType="none"/></fill>"#);
        xml.push_str(r#"<fill><patternFill patternType="gray125"/></fill>"#);
        for color in self.fills.iter().skip(2).flatten() {
            let _ = write!(
                xml,
                r#"<fill><patternFill patternType="solid"><fgColor rgb="{}"/><bgColor indexed="64"/></patternFill></fill>"#,
                color
            );
        }
        xml.push_str("</fills>");

        xml.push_str(r#"<borders count="2">"#);
        xml.push_str("<border><left/><right/><top/><bottom/><diagonal/></border>");
        xml.push_str("<border>");
        for side in ["left", "right", "top", "bottom"] {
            let _ = write!(xml, r#"<{side} style="thin"><color auto="1"/></{side}>"#, side = side);
        }
        xml.push_str("<diagonal/></border></borders>");

        xml.push_str(r#"<cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs>"#);

        let _ = write!(xml, r#"<cellXfs count="{}">"#, self.xfs.len());
        for xf in &self.xfs {
            let _ = write!(
                xml,
                r#"<xf numFmtId="{}" fontId="{}" fillId="{}" borderId="{}" xfId="0""#,
                xf.num_fmt_id, xf.font_id, xf.fill_id, xf.border_id
            );
            if xf.num_fmt_id != 0 {
                xml.push_str(r#" applyNumberFormat="1""#);
            }
            if xf.font_id != 0 {
                xml.push_str(r#" applyFont="1""#);
            }
            if xf.fill_id != 0 {
                xml.push_str(r#" applyFill="1""#);
            }
            if xf.border_id != 0 {
                xml.push_str(r#" applyBorder="1""#);
            }
            if xf.center {
                xml.push_str(r#" applyAlignment="1"><alignment horizontal="center" vertical="center"/></xf>"#);
            } else {
                xml.push_str("/>");
            }
        }
        xml.push_str("</cellXfs>");

        xml.push_str(r#"<cellStyles count="1"><cellStyle name="Normal" xfId="0" builtinId="0"/></cellStyles>"#);
        xml.push_str("</styleSheet>");
        xml
    }
}

fn format_font_size(tenths: u32) -> String {
    if tenths % 10 == 0 {
        (tenths / 10).to_string()
    } else {
        format!("{}.{}", tenths / 10, tenths % 10)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub value: CellValue,
    pub style: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Freeze {
    pub rows: u32,
    pub columns: u32,
}

/// A worksheet addressed with 1-based rows and columns
#[derive(Debug, Clone)]
pub struct Worksheet {
    name: String,
    rows: BTreeMap<u32, BTreeMap<u32, Cell>>,
    column_widths: BTreeMap<u32, f64>,
    freeze: Option<Freeze>,
    auto_filter: Option<(u32, u32, u32, u32)>,
    merges: Vec<(u32, u32, u32, u32)>,
}

impl Worksheet {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            rows: BTreeMap::new(),
            column_widths: BTreeMap::new(),
            freeze: None,
            auto_filter: None,
            merges: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_cell(&mut self, row: u32, column: u32, value: CellValue, style: u32) {
        self.rows.entry(row).or_default().insert(column, Cell { value, style });
    }

    pub fn cell(&self, row: u32, column: u32) -> Option<&Cell> {
        self.rows.get(&row).and_then(|cells| cells.get(&column))
    }

    pub fn set_column_width(&mut self, column: u32, width: f64) {
        self.column_widths.insert(column, width.clamp(0.0, MAX_COLUMN_WIDTH));
    }

    pub fn column_width(&self, column: u32) -> Option<f64> {
        self.column_widths.get(&column).copied()
    }

    pub fn freeze(&mut self, rows: u32, columns: u32) {
        self.freeze = if rows == 0 && columns == 0 {
            None
        } else {
            Some(Freeze { rows, columns })
        };
    }

    pub fn set_auto_filter(&mut self, first_row: u32, first_col: u32, last_row: u32, last_col: u32) {
        self.auto_filter = Some((first_row, first_col, last_row, last_col));
    }

    pub fn merge(&mut self, first_row: u32, first_col: u32, last_row: u32, last_col: u32) {
        self.merges.push((first_row, first_col, last_row, last_col));
    }

    pub fn last_row(&self) -> u32 {
        self.rows.keys().next_back().copied().unwrap_or(0)
    }

    pub fn last_column(&self) -> u32 {
        self.rows
            .values()
            .filter_map(|cells| cells.keys().next_back().copied())
            .max()
            .unwrap_or(0)
    }

    fn to_xml(&self, selected: bool) -> String {
        let mut xml = String::with_capacity(4096 + self.rows.len() * 128);
        xml.push_str(XML_HEADER);
        let _ = write!(xml, r#"<worksheet xmlns="{}" xmlns:r="{}">"#, MAIN_NS, REL_NS);

        let last_row = self.last_row().max(1);
        let last_col = self.last_column().max(1);
        let _ = write!(xml, r#"<dimension ref="A1:{}"/>"#, cell_ref(last_row, last_col));

        xml.push_str("<sheetViews>");
        let _ = write!(
            xml,
            r#"<sheetView {}workbookViewId="0">"#,
            if selected { r#"tabSelected="1" "# } else { "" }
        );
        if let Some(freeze) = self.freeze {
            let pane = match (freeze.rows > 0, freeze.columns > 0) {
                (true, true) => "bottomRight",
                (true, false) => "bottomLeft",
                _ => "topRight",
            };
            let top_left = cell_ref(freeze.rows + 1, freeze.columns + 1);
            xml.push_str("<pane");
            if freeze.columns > 0 {
                let _ = write!(xml, r#" xSplit="{}""#, freeze.columns);
            }
            if freeze.rows > 0 {
                let _ = write!(xml, r#" ySplit="{}""#, freeze.rows);
            }
            let _ = write!(
                xml,
                r#" topLeftCell="{tl}" activePane="{pane}" state="frozen"/><selection pane="{pane}" activeCell="{tl}" sqref="{tl}"/>"#,
                tl = top_left,
                pane = pane
            );
        }
        xml.push_str("</sheetView></sheetViews>");
        xml.push_str(r#"<sheetFormatPr defaultRowHeight="15"/>"#);

        if !self.column_widths.is_empty() {
            xml.push_str("<cols>");
            for (column, width) in &self.column_widths {
                let _ = write!(
                    xml,
                    r#"<col min="{c}" max="{c}" width="{w}" customWidth="1"/>"#,
                    c = column,
                    w = width
                );
            }
            xml.push_str("</cols>");
        }

        xml.push_str("<sheetData>");
        for (row, cells) in &self.rows {
            let _ = write!(xml, r#"<row r="{}">"#, row);
            for (column, cell) in cells {
                write_cell(&mut xml, *row, *column, cell);
            }
            xml.push_str("</row>");
        }
        xml.push_str("</sheetData>");

        if let Some((r1, c1, r2, c2)) = self.auto_filter {
            let _ = write!(xml, r#"<autoFilter ref="{}:{}"/>"#, cell_ref(r1, c1), cell_ref(r2, c2));
        }

        if !self.merges.is_empty() {
            let _ = write!(xml, r#"<mergeCells count="{}">"#, self.merges.len());
            for (r1, c1, r2, c2) in &self.merges {
                let _ = write!(xml, r#"<mergeCell ref="{}:{}"/>"#, cell_ref(*r1, *c1), cell_ref(*r2, *c2));
            }
            xml.push_str("</mergeCells>");
        }

        xml.push_str(r#"<pageMargins left="0.7" right="0.7" top="0.75" bottom="0.75" header="0.3" footer="0.3"/>"#);
        xml.push_str("</worksheet>");
        xml
    }
}

fn write_cell(xml: &mut String, row: u32, column: u32, cell: &Cell) {
    let reference = cell_ref(row, column);
    let style = if cell.style != 0 {
        format!(r#" s="{}""#, cell.style)
    } else {
        String::new()
    };
    match &cell.value {
        CellValue::Blank => {
            if cell.style != 0 {
                let _ = write!(xml, r#"<c r="{}"{}/>"#, reference, style);
            }
        }
        CellValue::Text(text) => {
            let escaped = xml_escape(text);
            let space = if text.trim() != text { r#" xml:space="preserve""# } else { "" };
            let _ = write!(
                xml,
                r#"<c r="{}"{} t="inlineStr"><is><t{}>{}</t></is></c>"#,
                reference, style, space, escaped
            );
        }
        CellValue::Number(n) => {
            let _ = write!(xml, r#"<c r="{}"{}><v>{}</v></c>"#, reference, style, n);
        }
        CellValue::Boolean(b) => {
            let _ = write!(xml, r#"<c r="{}"{} t="b"><v>{}</v></c>"#, reference, style, u8::from(*b));
        }
        CellValue::Date(dt) => {
            let _ = write!(xml, r#"<c r="{}"{}><v>{}</v></c>"#, reference, style, excel_serial(dt));
        }
    }
}

/// A workbook assembled in memory and packaged on [`Workbook::save_to_bytes`]
#[derive(Debug)]
pub struct Workbook {
    sheets: Vec<Worksheet>,
    styles: StyleRegistry,
    creator: String,
    created: DateTime<Utc>,
    protection_hash: Option<String>,
}

impl Workbook {
    pub fn new(creator: &str) -> Self {
        Self {
            sheets: Vec::new(),
            styles: StyleRegistry::new(),
            creator: creator.to_string(),
            created: Utc::now(),
            protection_hash: None,
        }
    }

    pub fn register_style(&mut self, style: &CellStyle) -> u32 {
        self.styles.register(style)
    }

    pub fn add_sheet(&mut self, sheet: Worksheet) -> ExportOutcome<()> {
        if self.sheets.iter().any(|s| s.name.eq_ignore_ascii_case(&sheet.name)) {
            return Err(ExportError::invalid_config(format!("Duplicate sheet name '{}'", sheet.name)));
        }
        self.sheets.push(sheet);
        Ok(())
    }

    pub fn sheets(&self) -> &[Worksheet] {
        &self.sheets
    }

    /// Lock the workbook structure with the legacy password hash
    pub fn protect_structure(&mut self, password: &str) {
        self.protection_hash = Some(format!("{:04X}", legacy_password_hash(password)));
    }

    pub fn save_to_bytes(&self) -> ExportOutcome<Vec<u8>> {
        if self.sheets.is_empty() {
            return Err(ExportError::invalid_config("A workbook needs at least one worksheet"));
        }

        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);

        let mut add = |name: &str, content: &str| -> ExportOutcome<()> {
            zip.start_file(name, options)
                .map_err(|e| ExportError::Io(format!("Failed to create {} in workbook: {}", name, e)))?;
            zip.write_all(content.as_bytes())
                .map_err(|e| ExportError::Io(format!("Failed to write {} to workbook: {}", name, e)))?;
            Ok(())
        };

        add("[Content_Types].xml", &self.content_types_xml())?;
        add("_rels/.rels", &root_rels_xml())?;
        add("docProps/core.xml", &self.core_xml())?;
        add("docProps/app.xml", &self.app_xml())?;
        add("xl/workbook.xml", &self.workbook_xml())?;
        add("xl/_rels/workbook.xml.rels", &self.workbook_rels_xml())?;
        add("xl/styles.xml", &self.styles.to_xml())?;
        for (index, sheet) in self.sheets.iter().enumerate() {
            add(&format!("xl/worksheets/sheet{}.xml", index + 1), &sheet.to_xml(index == 0))?;
        }

        let cursor = zip
            .finish()
            .map_err(|e| ExportError::Io(format!("Failed to finalize workbook: {}", e)))?;
        Ok(cursor.into_inner())
    }

    fn content_types_xml(&self) -> String {
        let mut xml = String::from(XML_HEADER);
        xml.push_str(r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#);
        xml.push_str(r#"<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>"#);
        xml.push_str(r#"<Default Extension="xml" ContentType="application/xml"/>"#);
        xml.push_str(r#"<Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>"#);
        for index in 1..=self.sheets.len() {
            let _ = write!(
                xml,
                r#"<Override PartName="/xl/worksheets/sheet{}.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#,
                index
            );
        }
        xml.push_str(r#"<Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/>"#);
        xml.push_str(r#"<Override PartName="/docProps/core.xml" ContentType="application/vnd.openxmlformats-package.core-properties+xml"/>"#);
        xml.push_str(r#"<Override PartName="/docProps/app.xml" ContentType="application/vnd.openxmlformats-officedocument.extended-properties+xml"/>"#);
        xml.push_str("</Types>");
        xml
    }

    fn core_xml(&self) -> String {
        let timestamp = self.created.to_rfc3339_opts(SecondsFormat::Secs, true);
        let creator = xml_escape(&self.creator);
        format!(
            concat!(
                "{header}",
                r#"<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" "#,
                r#"xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:dcterms="http://purl.org/dc/terms/" "#,
                r#"xmlns:dcmitype="http://purl.org/dc/dcmitype/" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">"#,
                "<dc:creator>{creator}</dc:creator>",
                "<cp:lastModifiedBy>{creator}</cp:lastModifiedBy>",
                r#"<dcterms:created xsi:type="dcterms:W3CDTF">{ts}</dcterms:created>"#,
                r#"<dcterms:modified xsi:type="dcterms:W3CDTF">{ts}</dcterms:modified>"#,
                "</cp:coreProperties>"
            ),
            header = XML_HEADER,
            creator = creator,
            ts = timestamp
        )
    }

    fn app_xml(&self) -> String {
        format!(
            concat!(
                "{}",
                r#"<Properties xmlns="http://schemas.openxmlformats.org/officeDocument/2006/extended-properties" "#,
                r#"xmlns:vt="http://schemas.openxmlformats.org/officeDocument/2006/docPropsVTypes">"#,
                "<Application>CMDB Report Export</Application><DocSecurity>0</DocSecurity></Properties>"
            ),
            XML_HEADER
        )
    }

    fn workbook_xml(&self) -> String {
        let mut xml = String::from(XML_HEADER);
        let _ = write!(xml, r#"<workbook xmlns="{}" xmlns:r="{}">"#, MAIN_NS, REL_NS);
        xml.push_str(r#"<workbookPr/>"#);
        if let Some(hash) = &self.protection_hash {
            let _ = write!(xml, r#"<workbookProtection workbookPassword="{}" lockStructure="1"/>"#, hash);
        }
        xml.push_str(r#"<bookViews><workbookView activeTab="0"/></bookViews>"#);

        xml.push_str("<sheets>");
        for (index, sheet) in self.sheets.iter().enumerate() {
            let _ = write!(
                xml,
                r#"<sheet name="{}" sheetId="{}" r:id="rId{}"/>"#,
                xml_escape(&sheet.name),
                index + 1,
                index + 1
            );
        }
        xml.push_str("</sheets>");

        let filters: Vec<String> = self
            .sheets
            .iter()
            .enumerate()
            .filter_map(|(index, sheet)| {
                sheet.auto_filter.map(|(r1, c1, r2, c2)| {
                    format!(
                        r#"<definedName name="_xlnm._FilterDatabase" localSheetId="{}" hidden="1">'{}'!{}:{}</definedName>"#,
                        index,
                        xml_escape(&sheet.name.replace('\'', "''")),
                        absolute_ref(r1, c1),
                        absolute_ref(r2, c2)
                    )
                })
            })
            .collect();
        if !filters.is_empty() {
            xml.push_str("<definedNames>");
            for name in filters {
                xml.push_str(&name);
            }
            xml.push_str("</definedNames>");
        }

        xml.push_str("</workbook>");
        xml
    }

    fn workbook_rels_xml(&self) -> String {
        let mut xml = String::from(XML_HEADER);
        xml.push_str(r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#);
        for index in 1..=self.sheets.len() {
            let _ = write!(
                xml,
                r#"<Relationship Id="rId{i}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet{i}.xml"/>"#,
                i = index
            );
        }
        let _ = write!(
            xml,
            r#"<Relationship Id="rId{}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/>"#,
            self.sheets.len() + 1
        );
        xml.push_str("</Relationships>");
        xml
    }
}

fn root_rels_xml() -> String {
    format!(
        concat!(
            "{}",
            r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
            r#"<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/>"#,
            r#"<Relationship Id="rId2" Type="http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties" Target="docProps/core.xml"/>"#,
            r#"<Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/extended-properties" Target="docProps/app.xml"/>"#,
            "</Relationships>"
        ),
        XML_HEADER
    )
}

/// 1 -> A, 27 -> AA
pub fn column_letter(mut column: u32) -> String {
    let mut letters = Vec::new();
    while column > 0 {
        let rem = ((column - 1) % 26) as u8;
        letters.push((b'A' + rem) as char);
        column = (column - 1) / 26;
    }
    letters.iter().rev().collect()
}

pub fn cell_ref(row: u32, column: u32) -> String {
    format!("{}{}", column_letter(column), row)
}

fn absolute_ref(row: u32, column: u32) -> String {
    format!("${}${}", column_letter(column), row)
}

/// Days since 1899-12-30, the 1900 date system epoch as Excel counts it
pub fn excel_serial(value: &NaiveDateTime) -> f64 {
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default();
    (*value - epoch).num_milliseconds() as f64 / 86_400_000.0
}

/// Escape XML text and drop control characters the format cannot carry
pub fn xml_escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            '\t' | '\n' | '\r' => escaped.push(ch),
            c if (c as u32) < 0x20 => {}
            c => escaped.push(c),
        }
    }
    escaped
}

/// Legacy 16-bit workbook password verifier (ECMA-376 Part 4)
pub fn legacy_password_hash(password: &str) -> u16 {
    let bytes: Vec<u8> = password.bytes().take(15).collect();
    let mut hash: u16 = 0;
    for byte in bytes.iter().rev() {
        hash = ((hash >> 14) & 0x01) | ((hash << 1) & 0x7FFF);
        hash ^= *byte as u16;
    }
    hash = ((hash >> 14) & 0x01) | ((hash << 1) & 0x7FFF);
    hash ^= bytes.len() as u16;
    hash ^= 0xCE4B;
    hash
}

/// Normalize "#4472C4" / "4472c4" / "FF4472C4" to ARGB "FF4472C4"
pub fn normalize_color(color: &str) -> Option<String> {
    let hex = color.trim().trim_start_matches('#');
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    match hex.len() {
        6 => Some(format!("FF{}", hex.to_ascii_uppercase())),
        8 => Some(hex.to_ascii_uppercase()),
        _ => None,
    }
}
