//! Headless Chromium kept alive over the DevTools protocol.
//!
//! One browser process is launched per engine and shared by every export; each
//! [`RenderPage`] is a browser tab that is opened for one report and closed again.

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::PrintToPdfParams;
use chromiumoxide::Page;
use futures::StreamExt;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use super::{EngineLauncher, PdfPageOptions, RenderEngine, RenderPage, Viewport};
use crate::config::ExportConfig;
use crate::domains::export::types::Orientation;
use crate::errors::{ExportError, ExportOutcome};

const BINARY_CANDIDATES: [&str; 6] = [
    "chromium",
    "chromium-browser",
    "google-chrome",
    "google-chrome-stable",
    "chrome",
    "headless_shell",
];

const MM_PER_INCH: f64 = 25.4;

/// Locates Chromium and starts a headless browser session
#[derive(Debug, Clone)]
pub struct ChromeLauncher {
    binary: Option<PathBuf>,
    extra_args: Vec<String>,
    viewport: Viewport,
}

impl ChromeLauncher {
    pub fn new(binary: Option<PathBuf>) -> Self {
        Self {
            binary,
            extra_args: Vec::new(),
            viewport: Viewport::default(),
        }
    }

    pub fn from_config(config: &ExportConfig) -> Self {
        Self::new(config.chromium_path.clone())
            .with_args(config.chromium_args.clone())
            .with_viewport(Viewport {
                width: config.viewport_width,
                height: config.viewport_height,
            })
    }

    /// Extra command-line switches for the browser process, e.g. `--no-sandbox`
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    pub fn with_viewport(mut self, viewport: Viewport) -> Self {
        self.viewport = viewport;
        self
    }

    fn find_binary(&self) -> ExportOutcome<PathBuf> {
        if let Some(binary) = &self.binary {
            if binary.is_file() {
                return Ok(binary.clone());
            }
            return Err(ExportError::RenderInitialization(format!(
                "Configured Chromium binary not found: {}",
                binary.display()
            )));
        }

        let path = env::var_os("PATH").unwrap_or_default();
        env::split_paths(&path)
            .flat_map(|dir| BINARY_CANDIDATES.iter().map(move |name| dir.join(name)))
            .find(|candidate| candidate.is_file())
            .ok_or_else(|| {
                ExportError::RenderInitialization(format!(
                    "No Chromium binary found on PATH (tried {})",
                    BINARY_CANDIDATES.join(", ")
                ))
            })
    }

    fn browser_config(&self, binary: &Path, profile: &TempDir) -> ExportOutcome<BrowserConfig> {
        BrowserConfig::builder()
            .chrome_executable(binary)
            .user_data_dir(profile.path())
            .window_size(self.viewport.width, self.viewport.height)
            .args(self.extra_args.iter().map(String::as_str))
            .build()
            .map_err(|e| ExportError::RenderInitialization(format!("Invalid browser configuration: {}", e)))
    }
}

#[async_trait]
impl EngineLauncher for ChromeLauncher {
    async fn launch(&self) -> ExportOutcome<Arc<dyn RenderEngine>> {
        let binary = self.find_binary()?;
        let profile = tempfile::Builder::new()
            .prefix("cmdb-export-profile-")
            .tempdir()
            .map_err(|e| ExportError::RenderInitialization(format!("Failed to create browser profile: {}", e)))?;
        let config = self.browser_config(&binary, &profile)?;
        log::debug!("Starting Chromium {}", binary.display());

        let (mut browser, mut events) = Browser::launch(config).await.map_err(|e| {
            ExportError::RenderInitialization(format!("Failed to start {}: {}", binary.display(), e))
        })?;

        // the protocol connection only makes progress while its event stream is polled
        let handler = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if let Err(e) = event {
                    log::debug!("Chromium event stream error: {}", e);
                }
            }
            log::debug!("Chromium event stream ended");
        });

        let version = match browser.version().await {
            Ok(version) => version.product,
            Err(e) => {
                if let Err(close_err) = browser.close().await {
                    log::debug!("Failed to close unresponsive browser: {}", close_err);
                }
                let _ = browser.wait().await;
                handler.abort();
                return Err(ExportError::RenderInitialization(format!(
                    "Chromium did not answer on the DevTools protocol: {}",
                    e
                )));
            }
        };
        log::info!("Chromium session started: {}", version);

        Ok(Arc::new(ChromeEngine {
            browser: Mutex::new(Some(browser)),
            handler: std::sync::Mutex::new(Some(handler)),
            version,
            _profile: profile,
        }))
    }
}

/// A running browser shared by every export of one exporter
pub struct ChromeEngine {
    browser: Mutex<Option<Browser>>,
    handler: std::sync::Mutex<Option<JoinHandle<()>>>,
    version: String,
    _profile: TempDir,
}

impl ChromeEngine {
    pub fn version(&self) -> &str {
        &self.version
    }
}

impl std::fmt::Debug for ChromeEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChromeEngine").field("version", &self.version).finish_non_exhaustive()
    }
}

#[async_trait]
impl RenderEngine for ChromeEngine {
    async fn new_page(&self) -> ExportOutcome<Box<dyn RenderPage>> {
        let browser = self.browser.lock().await;
        let browser = browser
            .as_ref()
            .ok_or_else(|| ExportError::RenderInitialization("Chromium engine is closed".to_string()))?;
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| ExportError::Io(format!("Failed to open browser tab: {}", e)))?;
        Ok(Box::new(ChromePage { page: Some(page) }))
    }

    async fn close(&self) -> ExportOutcome<()> {
        let browser = self.browser.lock().await.take();
        let result = match browser {
            Some(mut browser) => {
                let closed = browser
                    .close()
                    .await
                    .map(|_| ())
                    .map_err(|e| ExportError::Io(format!("Failed to close Chromium: {}", e)));
                if let Err(e) = browser.wait().await {
                    log::debug!("Waiting for Chromium to exit failed: {}", e);
                }
                closed
            }
            None => Ok(()),
        };

        if let Some(handler) = self.handler.lock().ok().and_then(|mut h| h.take()) {
            handler.abort();
        }
        result
    }

    fn name(&self) -> String {
        self.version.clone()
    }
}

/// One browser tab
struct ChromePage {
    page: Option<Page>,
}

impl ChromePage {
    fn page(&self) -> ExportOutcome<&Page> {
        self.page
            .as_ref()
            .ok_or_else(|| ExportError::Io("Page is closed".to_string()))
    }
}

#[async_trait]
impl RenderPage for ChromePage {
    async fn set_viewport(&mut self, viewport: Viewport) -> ExportOutcome<()> {
        let params = SetDeviceMetricsOverrideParams::new(viewport.width as i64, viewport.height as i64, 1.0, false);
        self.page()?
            .execute(params)
            .await
            .map(|_| ())
            .map_err(|e| ExportError::Io(format!("Failed to set viewport: {}", e)))
    }

    async fn set_content(&mut self, html: &str, timeout: Duration) -> ExportOutcome<()> {
        let page = self.page()?;
        tokio::time::timeout(timeout, page.set_content(html))
            .await
            .map_err(|_| ExportError::Io(format!("Loading content timed out after {}s", timeout.as_secs())))?
            .map(|_| ())
            .map_err(|e| ExportError::Io(format!("Failed to load report HTML: {}", e)))
    }

    async fn print_pdf(&mut self, options: &PdfPageOptions) -> ExportOutcome<Vec<u8>> {
        let page = self.page()?;
        let bytes = tokio::time::timeout(options.timeout, page.pdf(print_params(options)))
            .await
            .map_err(|_| ExportError::Io(format!("PDF generation timed out after {}s", options.timeout.as_secs())))?
            .map_err(|e| ExportError::Io(format!("Chromium failed to print: {}", e)))?;

        if !bytes.starts_with(b"%PDF") {
            return Err(ExportError::Io("Chromium produced an invalid PDF".to_string()));
        }
        Ok(bytes)
    }

    async fn close(&mut self) -> ExportOutcome<()> {
        match self.page.take() {
            Some(page) => page
                .close()
                .await
                .map_err(|e| ExportError::Io(format!("Failed to close browser tab: {}", e))),
            None => Ok(()),
        }
    }
}

/// `Page.printToPDF` parameters. The `@page` rule in the document carries the
/// same geometry, so the CSS size wins where the two disagree.
fn print_params(options: &PdfPageOptions) -> PrintToPdfParams {
    let (width, height) = options.format.dimensions_mm();
    PrintToPdfParams {
        landscape: Some(options.orientation == Orientation::Landscape),
        display_header_footer: Some(options.display_header_footer),
        print_background: Some(options.print_background),
        scale: Some(options.scale),
        paper_width: Some(width / MM_PER_INCH),
        paper_height: Some(height / MM_PER_INCH),
        margin_top: css_length_inches(&options.margins.top),
        margin_bottom: css_length_inches(&options.margins.bottom),
        margin_left: css_length_inches(&options.margins.left),
        margin_right: css_length_inches(&options.margins.right),
        prefer_css_page_size: Some(true),
        ..Default::default()
    }
}

/// Convert a CSS length (`mm`, `cm`, `in`, `pt`, `px`) to inches
fn css_length_inches(value: &str) -> Option<f64> {
    let value = value.trim();
    let split = value
        .find(|c: char| c.is_ascii_alphabetic())
        .unwrap_or(value.len());
    let (number, unit) = value.split_at(split);
    let number: f64 = number.trim().parse().ok()?;
    let inches = match unit.trim() {
        "mm" => number / MM_PER_INCH,
        "cm" => number * 10.0 / MM_PER_INCH,
        "in" => number,
        "pt" => number / 72.0,
        "px" | "" => number / 96.0,
        _ => return None,
    };
    Some(inches)
}
