//! In-process rendering engine for tests. Pages produce real PDFs via lopdf.

use async_trait::async_trait;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{EngineLauncher, PdfPageOptions, RenderEngine, RenderPage, Viewport};
use crate::errors::{ExportError, ExportOutcome};

/// A PDF with `pages` pages, each carrying its page number as text
pub fn blank_pdf(pages: u32) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for page in 1..=pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 24.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(format!("Page {}", page))]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let pages_dict = dictionary! {
        "Type" => "Pages",
        "Kids" => kids,
        "Count" => pages as i64,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages_dict));
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).unwrap();
    buffer
}

pub fn page_count(pdf: &[u8]) -> usize {
    Document::load_mem(pdf).unwrap().get_pages().len()
}

/// Shared counters and captured input, inspected by tests
#[derive(Debug, Default)]
pub struct StubState {
    pub launches: AtomicUsize,
    pub engine_closes: AtomicUsize,
    pub pages_opened: AtomicUsize,
    pub pages_closed: AtomicUsize,
    pub html: Mutex<Vec<String>>,
    pub print_options: Mutex<Vec<PdfPageOptions>>,
    pub viewports: Mutex<Vec<Viewport>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Behavior {
    Normal,
    FailLaunch,
    FailPrint,
}

pub struct StubLauncher {
    state: Arc<StubState>,
    behavior: Behavior,
    delay: Option<Duration>,
    pages_per_document: u32,
}

impl StubLauncher {
    pub fn new() -> Self {
        Self {
            state: Arc::new(StubState::default()),
            behavior: Behavior::Normal,
            delay: None,
            pages_per_document: 1,
        }
    }

    pub fn failing() -> Self {
        Self {
            behavior: Behavior::FailLaunch,
            ..Self::new()
        }
    }

    pub fn failing_print() -> Self {
        Self {
            behavior: Behavior::FailPrint,
            ..Self::new()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new()
        }
    }

    pub fn with_pages(mut self, pages: u32) -> Self {
        self.pages_per_document = pages;
        self
    }

    pub fn state(&self) -> Arc<StubState> {
        self.state.clone()
    }

    pub fn launch_count(&self) -> usize {
        self.state.launches.load(Ordering::SeqCst)
    }

    pub fn engine_closes(&self) -> usize {
        self.state.engine_closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EngineLauncher for StubLauncher {
    async fn launch(&self) -> ExportOutcome<Arc<dyn RenderEngine>> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.behavior == Behavior::FailLaunch {
            return Err(ExportError::RenderInitialization("stub launch failure".to_string()));
        }
        self.state.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(StubEngine {
            state: self.state.clone(),
            fail_print: self.behavior == Behavior::FailPrint,
            pages_per_document: self.pages_per_document,
        }))
    }
}

pub struct StubEngine {
    state: Arc<StubState>,
    fail_print: bool,
    pages_per_document: u32,
}

#[async_trait]
impl RenderEngine for StubEngine {
    async fn new_page(&self) -> ExportOutcome<Box<dyn RenderPage>> {
        self.state.pages_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(StubPage {
            state: self.state.clone(),
            fail_print: self.fail_print,
            pages: self.pages_per_document,
            loaded: false,
        }))
    }

    async fn close(&self) -> ExportOutcome<()> {
        self.state.engine_closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> String {
        "stub".to_string()
    }
}

struct StubPage {
    state: Arc<StubState>,
    fail_print: bool,
    pages: u32,
    loaded: bool,
}

#[async_trait]
impl RenderPage for StubPage {
    async fn set_viewport(&mut self, viewport: Viewport) -> ExportOutcome<()> {
        self.state.viewports.lock().unwrap().push(viewport);
        Ok(())
    }

    async fn set_content(&mut self, html: &str, _timeout: Duration) -> ExportOutcome<()> {
        self.state.html.lock().unwrap().push(html.to_string());
        self.loaded = true;
        Ok(())
    }

    async fn print_pdf(&mut self, options: &PdfPageOptions) -> ExportOutcome<Vec<u8>> {
        self.state.print_options.lock().unwrap().push(options.clone());
        if self.fail_print {
            return Err(ExportError::Io("stub print failure".to_string()));
        }
        if !self.loaded {
            return Err(ExportError::HtmlGeneration("no content loaded".to_string()));
        }
        Ok(blank_pdf(self.pages))
    }

    async fn close(&mut self) -> ExportOutcome<()> {
        self.state.pages_closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
