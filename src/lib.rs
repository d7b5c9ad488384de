//! Report export core for the CMDB: turns lists of resource records into
//! CSV, Excel (.xlsx) or PDF files.

pub mod config;
pub mod domains;
pub mod errors;
pub mod ffi;

pub use domains::export::{ExportService, ExportServiceImpl};
pub use errors::{ExportError, ExportOutcome};

/// Initialize logging. `RUST_LOG` defaults to `debug` in debug builds and
/// `info` in release builds. Safe to call more than once.
pub fn init_logging() {
    if std::env::var("RUST_LOG").is_err() {
        #[cfg(debug_assertions)]
        std::env::set_var("RUST_LOG", "debug");
        #[cfg(not(debug_assertions))]
        std::env::set_var("RUST_LOG", "info");
    }

    // Initialize env_logger if not already initialized
    let _ = env_logger::try_init();
}

/// Initialize logging and load the export configuration from the environment.
/// This should be called once before the first export.
pub fn initialize() -> ExportOutcome<&'static config::ExportConfig> {
    init_logging();
    let config = config::load()?;
    log::info!("Export core initialized (templates: {})", config.template_dir.display());
    Ok(config)
}
