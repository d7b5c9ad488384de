use chrono::Utc;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::config::ExportConfig;
use crate::domains::export::formatter::{format_locale_date, format_pdf_value, title_case};
use crate::domains::export::render::{
    select_page_ranges, validate_page_ranges, ChromeLauncher, EngineHandle, EngineLauncher, PdfPageOptions,
    RenderPage, Viewport, MAX_SCALE, MIN_SCALE,
};
use crate::domains::export::template::{render_template, TemplateValue};
use crate::domains::export::types::{ExportFormat, ExportOptions, ExportWarning, PdfLayout, Record};
use crate::errors::{ExportError, ExportOutcome};

pub const DEFAULT_TEMPLATE: &str = "default";
pub const STYLESHEET: &str = "report.css";

/// Field count up to which the table layout is used
const TABLE_LAYOUT_MAX_FIELDS: usize = 8;

/// Rendered PDF plus degraded-mode warnings
#[derive(Debug)]
pub struct PdfOutput {
    pub data: Vec<u8>,
    pub warnings: Vec<ExportWarning>,
}

/// Template source after fallback resolution
struct ResolvedTemplate {
    name: String,
    source: String,
    warning: Option<ExportWarning>,
}

/// Renders records into an HTML report and prints it through the rendering engine.
/// The engine is launched on first use and shared by later exports.
#[derive(Debug)]
pub struct PdfExporter {
    engine: EngineHandle,
    template_dir: PathBuf,
    viewport: Viewport,
    content_timeout: Duration,
    pdf_timeout: Duration,
}

impl PdfExporter {
    /// Exporter backed by headless Chromium
    pub fn new(config: &ExportConfig) -> Self {
        Self::with_launcher(Arc::new(ChromeLauncher::from_config(config)), config)
    }

    pub fn with_launcher(launcher: Arc<dyn EngineLauncher>, config: &ExportConfig) -> Self {
        Self {
            engine: EngineHandle::new(launcher, config.launch_timeout),
            template_dir: config.template_dir.clone(),
            viewport: Viewport {
                width: config.viewport_width,
                height: config.viewport_height,
            },
            content_timeout: config.content_timeout,
            pdf_timeout: config.pdf_timeout,
        }
    }

    pub fn template_dir(&self) -> &Path {
        &self.template_dir
    }

    pub fn validate_options(&self, options: &ExportOptions) -> ExportOutcome<()> {
        options.validate_fields()?;
        let pdf = &options.pdf;

        validate_template_name(&pdf.template)?;

        if let Some(scale) = pdf.scale {
            if !(MIN_SCALE..=MAX_SCALE).contains(&scale) {
                return Err(ExportError::invalid_config(format!(
                    "scale must be between {} and {}, got {}",
                    MIN_SCALE, MAX_SCALE, scale
                )));
            }
        }

        if let Some(ranges) = &pdf.page_ranges {
            validate_page_ranges(ranges)?;
        }

        for (side, value) in [
            ("top", &pdf.margins.top),
            ("right", &pdf.margins.right),
            ("bottom", &pdf.margins.bottom),
            ("left", &pdf.margins.left),
        ] {
            let valid = !value.trim().is_empty()
                && value
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == ' ');
            if !valid {
                return Err(ExportError::invalid_config(format!(
                    "margins.{} '{}' is not a CSS length",
                    side, value
                )));
            }
        }
        Ok(())
    }

    pub async fn export_to_pdf(&self, records: &[Record], options: &ExportOptions) -> ExportOutcome<Vec<u8>> {
        self.export_with_warnings(records, options).await.map(|output| output.data)
    }

    pub async fn export_with_warnings(&self, records: &[Record], options: &ExportOptions) -> ExportOutcome<PdfOutput> {
        if records.is_empty() {
            return Err(ExportError::no_data(ExportFormat::Pdf));
        }
        self.validate_options(options)?;

        let fields = options.resolve_fields(records);
        log::debug!(
            "Building PDF export: {} records, {} fields, template '{}'",
            records.len(),
            fields.len(),
            options.pdf.template
        );

        let engine = self.engine.acquire().await?;
        let mut page = engine
            .new_page()
            .await
            .map_err(|e| ExportError::failure(ExportFormat::Pdf, e, failure_context(options)))?;

        let page_options = PdfPageOptions::from_options(&options.pdf, self.pdf_timeout);
        let rendered = self.render_on_page(page.as_mut(), records, &fields, options, &page_options).await;

        if let Err(e) = page.close().await {
            log::warn!("Failed to close render page: {}", e);
        }

        let (mut data, warnings) =
            rendered.map_err(|e| ExportError::failure(ExportFormat::Pdf, e, failure_context(options)))?;

        if let Some(ranges) = &options.pdf.page_ranges {
            if !engine.supports_page_ranges() {
                data = select_page_ranges(&data, ranges)
                    .map_err(|e| ExportError::failure(ExportFormat::Pdf, e, failure_context(options)))?;
            }
        }

        log::info!(
            "PDF export complete: {} records, {} bytes, {} warnings",
            records.len(),
            data.len(),
            warnings.len()
        );
        Ok(PdfOutput { data, warnings })
    }

    async fn render_on_page(
        &self,
        page: &mut dyn RenderPage,
        records: &[Record],
        fields: &[String],
        options: &ExportOptions,
        page_options: &PdfPageOptions,
    ) -> ExportOutcome<(Vec<u8>, Vec<ExportWarning>)> {
        page.set_viewport(self.viewport).await?;
        let (html, warnings) = self.generate_html(records, fields, options, page_options).await?;
        page.set_content(&html, self.content_timeout).await?;
        let data = page.print_pdf(page_options).await?;
        Ok((data, warnings))
    }

    /// Report HTML for `records`, with the template resolved and the stylesheet inlined
    pub async fn render_html(&self, records: &[Record], options: &ExportOptions) -> ExportOutcome<String> {
        if records.is_empty() {
            return Err(ExportError::no_data(ExportFormat::Pdf));
        }
        self.validate_options(options)?;
        let fields = options.resolve_fields(records);
        let page_options = PdfPageOptions::from_options(&options.pdf, self.pdf_timeout);
        self.generate_html(records, &fields, options, &page_options)
            .await
            .map(|(html, _)| html)
    }

    async fn generate_html(
        &self,
        records: &[Record],
        fields: &[String],
        options: &ExportOptions,
        page_options: &PdfPageOptions,
    ) -> ExportOutcome<(String, Vec<ExportWarning>)> {
        let template = self.resolve_template(&options.pdf.template).await?;
        let css = self.load_stylesheet().await?;
        let layout = choose_layout(fields.len(), options.pdf.custom_options.layout);
        log::debug!("Rendering template '{}' with {:?} layout", template.name, layout);

        let data = build_template_data(records, fields, options, layout, css, page_options.page_css());
        let html = render_template(&template.source, &data)?;
        Ok((html, template.warning.into_iter().collect()))
    }

    async fn resolve_template(&self, name: &str) -> ExportOutcome<ResolvedTemplate> {
        let path = self.template_dir.join(format!("{}.html", name));
        match tokio::fs::read_to_string(&path).await {
            Ok(source) => Ok(ResolvedTemplate {
                name: name.to_string(),
                source,
                warning: None,
            }),
            Err(e) if e.kind() == ErrorKind::NotFound && name != DEFAULT_TEMPLATE => {
                log::warn!(
                    "Template '{}' not found at {}, falling back to '{}'",
                    name,
                    path.display(),
                    DEFAULT_TEMPLATE
                );
                let default_path = self.template_dir.join(format!("{}.html", DEFAULT_TEMPLATE));
                let source = tokio::fs::read_to_string(&default_path)
                    .await
                    .map_err(|e| template_read_error(&default_path, e))?;
                Ok(ResolvedTemplate {
                    name: DEFAULT_TEMPLATE.to_string(),
                    source,
                    warning: Some(ExportWarning::TemplateFallback {
                        requested: name.to_string(),
                        used: DEFAULT_TEMPLATE.to_string(),
                    }),
                })
            }
            Err(e) => Err(template_read_error(&path, e)),
        }
    }

    async fn load_stylesheet(&self) -> ExportOutcome<String> {
        let path = self.template_dir.join(STYLESHEET);
        tokio::fs::read_to_string(&path).await.map_err(|e| {
            ExportError::HtmlGeneration(format!("Failed to read stylesheet {}: {}", path.display(), e))
        })
    }

    /// Launch the engine if needed, then open and close a throwaway page
    pub async fn health_check(&self) -> ExportOutcome<()> {
        let engine = self.engine.acquire().await?;
        let mut page = engine.new_page().await?;
        page.close().await?;
        log::debug!("PDF engine health check passed");
        Ok(())
    }

    /// Release the rendering engine; later exports fail with a render initialization error
    pub async fn close(&self) {
        self.engine.close().await;
    }

    pub async fn is_closed(&self) -> bool {
        self.engine.is_closed().await
    }
}

fn template_read_error(path: &Path, err: std::io::Error) -> ExportError {
    ExportError::HtmlGeneration(format!("Failed to read template {}: {}", path.display(), err))
}

fn validate_template_name(name: &str) -> ExportOutcome<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(ExportError::invalid_config(format!("Invalid template name '{}'", name)))
    }
}

/// Table for narrow data, cards when there are too many columns to fit
pub fn choose_layout(field_count: usize, requested: Option<PdfLayout>) -> PdfLayout {
    requested.unwrap_or(if field_count <= TABLE_LAYOUT_MAX_FIELDS {
        PdfLayout::Table
    } else {
        PdfLayout::Cards
    })
}

fn build_template_data(
    records: &[Record],
    fields: &[String],
    options: &ExportOptions,
    layout: PdfLayout,
    css: String,
    page_css: String,
) -> TemplateValue {
    let headers: Vec<String> = fields.iter().map(|f| title_case(f)).collect();
    let title = options
        .pdf
        .custom_options
        .title
        .clone()
        .or_else(|| options.resource_type.as_ref().map(|r| format!("{} Report", r)))
        .unwrap_or_else(|| "CMDB Export Report".to_string());

    let mut data = TemplateValue::map()
        .with("title", title)
        .with("resourceType", options.resource_type.clone())
        .with("includeMetadata", options.include_metadata)
        .with("generatedAt", format!("{} {}", format_locale_date(&Utc::now()), Utc::now().format("%H:%M UTC")))
        .with("recordCount", records.len())
        .with("fieldCount", fields.len())
        .with("headers", headers.clone())
        .with("layoutTable", layout == PdfLayout::Table)
        .with("layoutCards", layout == PdfLayout::Cards)
        .with("css", TemplateValue::Safe(css))
        .with("pageCss", TemplateValue::Safe(page_css));

    if let Some(filters) = options.filters_summary() {
        data = data.with("filters", filters);
    }

    match layout {
        PdfLayout::Table => {
            let rows: Vec<TemplateValue> = records
                .iter()
                .map(|record| {
                    TemplateValue::List(
                        fields
                            .iter()
                            .map(|field| TemplateValue::Str(format_pdf_value(record.value(field))))
                            .collect(),
                    )
                })
                .collect();
            data.with("rows", TemplateValue::List(rows))
        }
        PdfLayout::Cards => {
            let cards: Vec<TemplateValue> = records
                .iter()
                .enumerate()
                .map(|(i, record)| {
                    let entries = headers
                        .iter()
                        .zip(fields)
                        .map(|(header, field)| {
                            (header.clone(), TemplateValue::Str(format_pdf_value(record.value(field))))
                        })
                        .collect();
                    TemplateValue::map()
                        .with("number", i + 1)
                        .with("fields", TemplateValue::Map(entries))
                })
                .collect();
            data.with("cards", TemplateValue::List(cards))
        }
    }
}

fn failure_context(options: &ExportOptions) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("template".to_string(), options.pdf.template.clone()),
        ("orientation".to_string(), options.pdf.orientation.to_string()),
        ("format".to_string(), options.pdf.format.to_string()),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::export::render::stub::{page_count, StubLauncher, StubState};
    use crate::domains::export::types::FieldValue;
    use chrono::TimeZone;
    use serde_json::json;
    use std::sync::atomic::Ordering;
    use tempfile::TempDir;

    const TEST_TEMPLATE: &str = concat!(
        "<html><head><style>{{pageCss}}{{css}}</style></head><body>",
        "<h1>{{title}}</h1>",
        "{{#if layoutTable}}<table class=\"report-table\"><tr>{{#each headers}}<th>{{this}}</th>{{/each}}</tr>",
        "{{#each rows}}<tr>{{#each this}}<td>{{this}}</td>{{/each}}</tr>{{/each}}</table>{{/if}}",
        "{{#if layoutCards}}{{#each cards}}<div class=\"card\">#{{number}}",
        "{{#each fields}}<b>{{@key}}</b>={{this}};{{/each}}</div>{{/each}}{{/if}}",
        "</body></html>"
    );

    fn template_dir(with_css: bool) -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("default.html"), TEST_TEMPLATE).unwrap();
        if with_css {
            std::fs::write(dir.path().join("report.css"), "td { color: #333; }").unwrap();
        }
        dir
    }

    fn exporter(dir: &TempDir, launcher: StubLauncher) -> (PdfExporter, Arc<StubState>) {
        let config = ExportConfig {
            template_dir: dir.path().to_path_buf(),
            ..ExportConfig::default()
        };
        let state = launcher.state();
        (PdfExporter::with_launcher(Arc::new(launcher), &config), state)
    }

    fn records(field_count: usize) -> Vec<Record> {
        (0..3)
            .map(|i| {
                (0..field_count)
                    .map(|f| (format!("field_{}", f), FieldValue::from(format!("r{}f{}", i, f))))
                    .collect()
            })
            .collect()
    }

    fn last_html(state: &StubState) -> String {
        state.html.lock().unwrap().last().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_pdf_signature_and_content() {
        let dir = template_dir(true);
        let (exporter, state) = exporter(&dir, StubLauncher::new());
        let records = vec![
            Record::from_json(json!({"name": "VPC-001", "active": true, "cost": 1234.5, "note": "<script>"})).unwrap(),
            Record::new()
                .with("name", "VPC-002")
                .with("active", false)
                .with("cost", FieldValue::Null)
                .with("note", Utc.with_ymd_and_hms(2024, 1, 15, 8, 0, 0).unwrap()),
        ];
        let options = ExportOptions::default().with_resource_type("VPC");

        let bytes = exporter.export_to_pdf(&records, &options).await.unwrap();
        assert!(bytes.starts_with(b"%PDF"));

        let html = last_html(&state);
        assert!(html.contains("<h1>VPC Report</h1>"));
        assert!(html.contains("<th>Name</th><th>Active</th><th>Cost</th><th>Note</th>"));
        assert!(html.contains("<td>VPC-001</td><td>Yes</td><td>1,234.5</td><td>&lt;script&gt;</td>"));
        assert!(html.contains("<td>VPC-002</td><td>No</td><td></td><td>1/15/2024</td>"));
        assert!(html.contains("td { color: #333; }"));
        assert!(html.contains("@page { size: 210mm 297mm; margin: 2cm 1.5cm 2cm 1.5cm; }"));

        assert_eq!(*state.viewports.lock().unwrap(), vec![Viewport { width: 1200, height: 800 }]);
        assert_eq!(state.pages_opened.load(Ordering::SeqCst), 1);
        assert_eq!(state.pages_closed.load(Ordering::SeqCst), 1);
        let print = state.print_options.lock().unwrap()[0].clone();
        assert_eq!(print.timeout, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_empty_records_is_no_data() {
        let dir = template_dir(true);
        let launcher = StubLauncher::new();
        let (exporter, state) = exporter(&dir, launcher);
        let err = exporter
            .export_to_pdf(&[], &ExportOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "No data provided for PDF export");
        assert_eq!(state.launches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_layout_heuristic_and_overrides() {
        let dir = template_dir(true);
        let (exporter, state) = exporter(&dir, StubLauncher::new());

        exporter.export_to_pdf(&records(8), &ExportOptions::default()).await.unwrap();
        assert!(last_html(&state).contains("report-table"));

        exporter.export_to_pdf(&records(9), &ExportOptions::default()).await.unwrap();
        let html = last_html(&state);
        assert!(!html.contains("report-table"));
        assert!(html.contains("<div class=\"card\">#1<b>Field 0</b>=r0f0;"));

        let mut options = ExportOptions::default();
        options.pdf.custom_options.layout = Some(PdfLayout::Cards);
        exporter.export_to_pdf(&records(3), &options).await.unwrap();
        assert!(last_html(&state).contains("class=\"card\""));

        options.pdf.custom_options.layout = Some(PdfLayout::Table);
        exporter.export_to_pdf(&records(12), &options).await.unwrap();
        assert!(last_html(&state).contains("report-table"));

        // one engine serves every export
        assert_eq!(state.launches.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_choose_layout() {
        assert_eq!(choose_layout(1, None), PdfLayout::Table);
        assert_eq!(choose_layout(8, None), PdfLayout::Table);
        assert_eq!(choose_layout(9, None), PdfLayout::Cards);
        assert_eq!(choose_layout(2, Some(PdfLayout::Cards)), PdfLayout::Cards);
    }

    #[tokio::test]
    async fn test_template_fallback_warning() {
        let dir = template_dir(true);
        let (exporter, _) = exporter(&dir, StubLauncher::new());
        let mut options = ExportOptions::default();
        options.pdf.template = "quarterly".to_string();

        let output = exporter.export_with_warnings(&records(2), &options).await.unwrap();
        assert!(output.data.starts_with(b"%PDF"));
        assert_eq!(
            output.warnings,
            vec![ExportWarning::TemplateFallback {
                requested: "quarterly".into(),
                used: "default".into()
            }]
        );
    }

    #[tokio::test]
    async fn test_named_template_is_used() {
        let dir = template_dir(true);
        std::fs::write(dir.path().join("compact.html"), "<p>{{recordCount}} items</p>").unwrap();
        let (exporter, state) = exporter(&dir, StubLauncher::new());
        let mut options = ExportOptions::default();
        options.pdf.template = "compact".to_string();

        let output = exporter.export_with_warnings(&records(2), &options).await.unwrap();
        assert!(output.warnings.is_empty());
        assert_eq!(last_html(&state), "<p>3 items</p>");
    }

    #[tokio::test]
    async fn test_missing_stylesheet_fails_and_closes_page() {
        let dir = template_dir(false);
        let (exporter, state) = exporter(&dir, StubLauncher::new());
        let err = exporter
            .export_to_pdf(&records(2), &ExportOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "EXPORT_FAILURE");
        assert!(err.to_string().contains("report.css"));
        let context = err.context().unwrap();
        assert_eq!(context["template"], "default");
        assert_eq!(context["orientation"], "portrait");
        assert_eq!(context["format"], "A4");
        assert_eq!(state.pages_opened.load(Ordering::SeqCst), 1);
        assert_eq!(state.pages_closed.load(Ordering::SeqCst), 1);
        assert!(state.print_options.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_default_template() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("report.css"), "").unwrap();
        let (exporter, _) = exporter(&dir, StubLauncher::new());
        let err = exporter
            .render_html(&records(1), &ExportOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ExportError::HtmlGeneration(_)));
    }

    #[tokio::test]
    async fn test_print_failure_is_wrapped_and_page_closed() {
        let dir = template_dir(true);
        let (exporter, state) = exporter(&dir, StubLauncher::failing_print());
        let mut options = ExportOptions::default();
        options.pdf.orientation = crate::domains::export::types::Orientation::Landscape;
        let err = exporter.export_to_pdf(&records(2), &options).await.unwrap_err();
        match err {
            ExportError::ExportFailure { format, context, .. } => {
                assert_eq!(format, ExportFormat::Pdf);
                assert_eq!(context["orientation"], "landscape");
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(state.pages_closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_launch_failure() {
        let dir = template_dir(true);
        let (exporter, _) = exporter(&dir, StubLauncher::failing());
        let err = exporter
            .export_to_pdf(&records(2), &ExportOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "RENDER_INITIALIZATION");
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_final() {
        let dir = template_dir(true);
        let (exporter, state) = exporter(&dir, StubLauncher::new());
        exporter.health_check().await.unwrap();
        assert_eq!(state.pages_opened.load(Ordering::SeqCst), 1);
        assert_eq!(state.pages_closed.load(Ordering::SeqCst), 1);

        exporter.close().await;
        exporter.close().await;
        assert!(exporter.is_closed().await);
        assert_eq!(state.engine_closes.load(Ordering::SeqCst), 1);

        let err = exporter
            .export_to_pdf(&records(2), &ExportOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ExportError::RenderInitialization(_)));
    }

    #[tokio::test]
    async fn test_page_ranges_are_selected() {
        let dir = template_dir(true);
        let (exporter, _) = exporter(&dir, StubLauncher::new().with_pages(5));
        let mut options = ExportOptions::default();
        options.pdf.page_ranges = Some("1-2, 4".to_string());
        let bytes = exporter.export_to_pdf(&records(2), &options).await.unwrap();
        assert_eq!(page_count(&bytes), 3);
    }

    #[tokio::test]
    async fn test_invalid_page_options() {
        let dir = template_dir(true);
        let (exporter, state) = exporter(&dir, StubLauncher::new());

        let mut options = ExportOptions::default();
        options.pdf.scale = Some(2.5);
        assert!(matches!(
            exporter.export_to_pdf(&records(1), &options).await,
            Err(ExportError::InvalidConfiguration(_))
        ));

        let mut options = ExportOptions::default();
        options.pdf.page_ranges = Some("3-1".into());
        assert!(exporter.validate_options(&options).is_err());

        let mut options = ExportOptions::default();
        options.pdf.template = "../secret".into();
        assert!(exporter.validate_options(&options).is_err());

        let mut options = ExportOptions::default();
        options.pdf.margins.top = "1cm; color: red".into();
        assert!(exporter.validate_options(&options).is_err());

        assert_eq!(state.launches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_page_geometry_reaches_html() {
        let dir = template_dir(true);
        let (exporter, state) = exporter(&dir, StubLauncher::new());
        let mut options = ExportOptions::default();
        options.pdf.format = crate::domains::export::types::PageFormat::A3;
        options.pdf.orientation = crate::domains::export::types::Orientation::Landscape;
        options.pdf.scale = Some(0.8);
        exporter.export_to_pdf(&records(1), &options).await.unwrap();
        let html = last_html(&state);
        assert!(html.contains("size: 420mm 297mm"));
        assert!(html.contains("zoom: 0.8"));
    }

    #[tokio::test]
    async fn test_shipped_templates_render() {
        let config = ExportConfig {
            template_dir: PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("templates/export/pdf"),
            ..ExportConfig::default()
        };
        let exporter = PdfExporter::with_launcher(Arc::new(StubLauncher::new()), &config);
        let mut options = ExportOptions::default().with_resource_type("VPC");
        options.filters.insert("region".into(), json!("us-east-1"));

        let html = exporter.render_html(&records(3), &options).await.unwrap();
        assert!(html.contains("VPC Report"));
        assert!(html.contains("region: us-east-1"));
        assert!(html.contains("r2f2"));

        let cards = exporter.render_html(&records(10), &options).await.unwrap();
        assert!(cards.contains("r2f9"));
    }
}
