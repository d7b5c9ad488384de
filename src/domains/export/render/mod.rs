//! Rendering-engine seam for the PDF exporter.
//!
//! An engine hands out independent pages; each page takes HTML and prints it
//! to PDF. [`EngineHandle`] owns the lazily launched engine shared by every
//! export of one exporter.

pub mod chrome;
#[cfg(test)]
pub(crate) mod stub;

pub use chrome::{ChromeEngine, ChromeLauncher};

use async_trait::async_trait;
use lopdf::Document;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::domains::export::types::{Orientation, PageFormat, PageMargins, PdfOptions};
use crate::errors::{ExportError, ExportOutcome};

pub const MIN_SCALE: f64 = 0.1;
pub const MAX_SCALE: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1200,
            height: 800,
        }
    }
}

/// Print settings for a single page
#[derive(Debug, Clone, PartialEq)]
pub struct PdfPageOptions {
    pub format: PageFormat,
    pub orientation: Orientation,
    pub margins: PageMargins,
    pub print_background: bool,
    pub scale: f64,
    pub page_ranges: Option<String>,
    pub display_header_footer: bool,
    pub timeout: Duration,
}

impl PdfPageOptions {
    pub fn from_options(options: &PdfOptions, timeout: Duration) -> Self {
        Self {
            format: options.format,
            orientation: options.orientation,
            margins: options.margins.clone(),
            print_background: options.print_background,
            scale: options.scale.unwrap_or(1.0),
            page_ranges: options.page_ranges.clone(),
            display_header_footer: options.display_header_footer,
            timeout,
        }
    }

    /// Page width and height in millimetres after orientation
    pub fn page_size_mm(&self) -> (f64, f64) {
        let (width, height) = self.format.dimensions_mm();
        match self.orientation {
            Orientation::Portrait => (width, height),
            Orientation::Landscape => (height, width),
        }
    }

    /// `@page` rule plus print adjustments carrying the page geometry
    pub fn page_css(&self) -> String {
        let (width, height) = self.page_size_mm();
        let mut css = format!(
            "@page {{ size: {}mm {}mm; margin: {} {} {} {}; }}\n",
            width, height, self.margins.top, self.margins.right, self.margins.bottom, self.margins.left
        );
        if self.print_background {
            css.push_str("html, body { -webkit-print-color-adjust: exact; print-color-adjust: exact; }\n");
        } else {
            css.push_str(
                "html, body { -webkit-print-color-adjust: economy; print-color-adjust: economy; }\n",
            );
        }
        if (self.scale - 1.0).abs() > f64::EPSILON {
            css.push_str(&format!("body {{ zoom: {}; }}\n", self.scale));
        }
        css
    }
}

#[async_trait]
pub trait RenderPage: Send {
    async fn set_viewport(&mut self, viewport: Viewport) -> ExportOutcome<()>;

    /// Load the document, waiting at most `timeout`
    async fn set_content(&mut self, html: &str, timeout: Duration) -> ExportOutcome<()>;

    async fn print_pdf(&mut self, options: &PdfPageOptions) -> ExportOutcome<Vec<u8>>;

    async fn close(&mut self) -> ExportOutcome<()>;
}

#[async_trait]
pub trait RenderEngine: Send + Sync {
    async fn new_page(&self) -> ExportOutcome<Box<dyn RenderPage>>;

    async fn close(&self) -> ExportOutcome<()>;

    /// Whether `print_pdf` applies `page_ranges` itself
    fn supports_page_ranges(&self) -> bool {
        false
    }

    fn name(&self) -> String;
}

#[async_trait]
pub trait EngineLauncher: Send + Sync {
    async fn launch(&self) -> ExportOutcome<Arc<dyn RenderEngine>>;
}

enum EngineState {
    Uninitialized,
    Ready(Arc<dyn RenderEngine>),
    Closed,
}

impl fmt::Debug for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineState::Uninitialized => write!(f, "Uninitialized"),
            EngineState::Ready(engine) => write!(f, "Ready({})", engine.name()),
            EngineState::Closed => write!(f, "Closed"),
        }
    }
}

/// Lazily launched engine: `Uninitialized -> Ready -> Closed`.
/// The lock only guards state transitions; pages are used outside of it.
pub struct EngineHandle {
    launcher: Arc<dyn EngineLauncher>,
    launch_timeout: Duration,
    state: Mutex<EngineState>,
}

impl EngineHandle {
    pub fn new(launcher: Arc<dyn EngineLauncher>, launch_timeout: Duration) -> Self {
        Self {
            launcher,
            launch_timeout,
            state: Mutex::new(EngineState::Uninitialized),
        }
    }

    /// Running engine, launching it on first use
    pub async fn acquire(&self) -> ExportOutcome<Arc<dyn RenderEngine>> {
        let mut state = self.state.lock().await;
        match &*state {
            EngineState::Ready(engine) => Ok(engine.clone()),
            EngineState::Closed => Err(ExportError::RenderInitialization(
                "Rendering engine has been closed".to_string(),
            )),
            EngineState::Uninitialized => {
                log::info!("Launching rendering engine");
                let engine = tokio::time::timeout(self.launch_timeout, self.launcher.launch())
                    .await
                    .map_err(|_| {
                        ExportError::RenderInitialization(format!(
                            "Engine launch timed out after {}s",
                            self.launch_timeout.as_secs()
                        ))
                    })?
                    .map_err(|e| match e {
                        ExportError::RenderInitialization(_) => e,
                        other => ExportError::RenderInitialization(other.to_string()),
                    })?;
                log::info!("Rendering engine ready: {}", engine.name());
                *state = EngineState::Ready(engine.clone());
                Ok(engine)
            }
        }
    }

    /// Release the engine. Safe to call repeatedly; close errors are logged.
    pub async fn close(&self) {
        let mut state = self.state.lock().await;
        let previous = std::mem::replace(&mut *state, EngineState::Closed);
        match previous {
            EngineState::Ready(engine) => {
                if let Err(e) = engine.close().await {
                    log::warn!("Failed to close rendering engine {}: {}", engine.name(), e);
                } else {
                    log::info!("Rendering engine closed");
                }
            }
            EngineState::Uninitialized => log::debug!("Rendering engine closed before first use"),
            EngineState::Closed => log::debug!("Rendering engine already closed"),
        }
    }

    pub async fn is_ready(&self) -> bool {
        matches!(&*self.state.lock().await, EngineState::Ready(_))
    }

    pub async fn is_closed(&self) -> bool {
        matches!(&*self.state.lock().await, EngineState::Closed)
    }
}

impl fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineHandle")
            .field("launch_timeout", &self.launch_timeout)
            .finish_non_exhaustive()
    }
}

/// Parse `"1-3, 5, 8-"` into sorted 1-based page numbers within `1..=page_count`
pub fn parse_page_ranges(ranges: &str, page_count: u32) -> ExportOutcome<Vec<u32>> {
    let invalid = |part: &str| ExportError::invalid_config(format!("Invalid page range '{}'", part.trim()));
    let mut pages = BTreeSet::new();

    for part in ranges.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let (start, end) = match part.split_once('-') {
            Some((start, end)) => {
                let start = match start.trim() {
                    "" => 1,
                    s => s.parse::<u32>().map_err(|_| invalid(part))?,
                };
                let end = match end.trim() {
                    "" => page_count,
                    s => s.parse::<u32>().map_err(|_| invalid(part))?,
                };
                (start, end)
            }
            None => {
                let page = part.parse::<u32>().map_err(|_| invalid(part))?;
                (page, page)
            }
        };
        if start == 0 || start > end {
            return Err(invalid(part));
        }
        pages.extend(start..=end.min(page_count));
    }

    if pages.is_empty() {
        return Err(ExportError::invalid_config(format!(
            "Page range '{}' selects no pages of {}",
            ranges, page_count
        )));
    }
    Ok(pages.into_iter().collect())
}

/// Check a page range expression before rendering
pub fn validate_page_ranges(ranges: &str) -> ExportOutcome<()> {
    parse_page_ranges(ranges, u32::MAX).map(|_| ())
}

/// Keep only the pages named by `ranges`
pub fn select_page_ranges(pdf: &[u8], ranges: &str) -> ExportOutcome<Vec<u8>> {
    let mut document = Document::load_mem(pdf)
        .map_err(|e| ExportError::Io(format!("Failed to parse rendered PDF: {}", e)))?;
    let total = document.get_pages().len() as u32;
    let keep = parse_page_ranges(ranges, total)?;

    let remove: Vec<u32> = (1..=total).filter(|page| keep.binary_search(page).is_err()).collect();
    if remove.is_empty() {
        return Ok(pdf.to_vec());
    }
    log::debug!("Keeping pages {:?} of {}", keep, total);

    document.delete_pages(&remove);
    document.prune_objects();
    let mut output = Vec::new();
    document
        .save_to(&mut output)
        .map_err(|e| ExportError::Io(format!("Failed to write selected pages: {}", e)))?;
    Ok(output)
}
