//! Runtime configuration loaded from the environment (`CMDB_EXPORT_*`).

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;

use crate::errors::{ExportError, ExportOutcome};

pub const DEFAULT_TEMPLATE_DIR: &str = "templates/export/pdf";
pub const DEFAULT_LAUNCH_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONTENT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_PDF_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_VIEWPORT_WIDTH: u32 = 1200;
pub const DEFAULT_VIEWPORT_HEIGHT: u32 = 800;
pub const DEFAULT_CSV_BATCH_SIZE: usize = 100;

static CONFIG: OnceLock<ExportConfig> = OnceLock::new();

#[derive(Debug, Clone, PartialEq)]
pub struct ExportConfig {
    /// Directory holding `<name>.html` templates and `report.css`
    pub template_dir: PathBuf,
    /// Chromium binary; searched on PATH when unset
    pub chromium_path: Option<PathBuf>,
    /// Extra switches for every Chromium run, e.g. `--no-sandbox`
    pub chromium_args: Vec<String>,
    pub launch_timeout: Duration,
    pub content_timeout: Duration,
    pub pdf_timeout: Duration,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub csv_batch_size: usize,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            template_dir: PathBuf::from(DEFAULT_TEMPLATE_DIR),
            chromium_path: None,
            chromium_args: Vec::new(),
            launch_timeout: Duration::from_secs(DEFAULT_LAUNCH_TIMEOUT_SECS),
            content_timeout: Duration::from_secs(DEFAULT_CONTENT_TIMEOUT_SECS),
            pdf_timeout: Duration::from_secs(DEFAULT_PDF_TIMEOUT_SECS),
            viewport_width: DEFAULT_VIEWPORT_WIDTH,
            viewport_height: DEFAULT_VIEWPORT_HEIGHT,
            csv_batch_size: DEFAULT_CSV_BATCH_SIZE,
        }
    }
}

impl ExportConfig {
    /// Read `CMDB_EXPORT_*` variables, falling back to defaults for unset ones
    pub fn from_env() -> ExportOutcome<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> ExportOutcome<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let config = Self {
            template_dir: get("CMDB_EXPORT_TEMPLATE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.template_dir),
            chromium_path: get("CMDB_EXPORT_CHROMIUM_PATH").map(PathBuf::from),
            chromium_args: get("CMDB_EXPORT_CHROMIUM_ARGS")
                .map(|args| args.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
            launch_timeout: parse_var(&get, "CMDB_EXPORT_LAUNCH_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.launch_timeout),
            content_timeout: parse_var(&get, "CMDB_EXPORT_CONTENT_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.content_timeout),
            pdf_timeout: parse_var(&get, "CMDB_EXPORT_PDF_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.pdf_timeout),
            viewport_width: parse_var(&get, "CMDB_EXPORT_VIEWPORT_WIDTH")?.unwrap_or(defaults.viewport_width),
            viewport_height: parse_var(&get, "CMDB_EXPORT_VIEWPORT_HEIGHT")?.unwrap_or(defaults.viewport_height),
            csv_batch_size: parse_var(&get, "CMDB_EXPORT_CSV_BATCH_SIZE")?.unwrap_or(defaults.csv_batch_size),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ExportOutcome<()> {
        if self.viewport_width == 0 || self.viewport_height == 0 {
            return Err(ExportError::invalid_config("Viewport dimensions must be positive"));
        }
        if self.csv_batch_size == 0 {
            return Err(ExportError::invalid_config("CSV batch size must be positive"));
        }
        for (name, timeout) in [
            ("launch", self.launch_timeout),
            ("content", self.content_timeout),
            ("pdf", self.pdf_timeout),
        ] {
            if timeout.is_zero() {
                return Err(ExportError::invalid_config(format!("The {} timeout must be positive", name)));
            }
        }
        Ok(())
    }
}

fn parse_var<T, G>(get: &G, key: &str) -> ExportOutcome<Option<T>>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| ExportError::invalid_config(format!("{} has an invalid value '{}'", key, raw))),
    }
}

/// Load `.env`, read the environment and store the result for [`config`].
/// Later calls return the configuration stored by the first one.
pub fn load() -> ExportOutcome<&'static ExportConfig> {
    if let Some(config) = CONFIG.get() {
        return Ok(config);
    }
    if let Err(e) = dotenv::dotenv() {
        log::debug!("No .env file loaded: {}", e);
    }
    let config = ExportConfig::from_env()?;
    log::debug!("Export configuration: {:?}", config);
    Ok(CONFIG.get_or_init(|| config))
}

/// Global configuration, or defaults when [`load`] was never called or failed
pub fn config() -> ExportConfig {
    CONFIG.get().cloned().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ExportConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ExportConfig::default());
        assert_eq!(config.template_dir, PathBuf::from("templates/export/pdf"));
        assert_eq!(config.pdf_timeout, Duration::from_secs(30));
        assert_eq!((config.viewport_width, config.viewport_height), (1200, 800));
    }

    #[test]
    fn test_overrides() {
        let config = ExportConfig::from_lookup(lookup(&[
            ("CMDB_EXPORT_TEMPLATE_DIR", "/opt/templates"),
            ("CMDB_EXPORT_CHROMIUM_PATH", "/usr/bin/chromium"),
            ("CMDB_EXPORT_CHROMIUM_ARGS", "--no-sandbox  --disable-dev-shm-usage"),
            ("CMDB_EXPORT_PDF_TIMEOUT_SECS", "45"),
            ("CMDB_EXPORT_CSV_BATCH_SIZE", "500"),
            ("CMDB_EXPORT_VIEWPORT_WIDTH", " "),
        ]))
        .unwrap();
        assert_eq!(config.template_dir, PathBuf::from("/opt/templates"));
        assert_eq!(config.chromium_path, Some(PathBuf::from("/usr/bin/chromium")));
        assert_eq!(config.chromium_args, vec!["--no-sandbox", "--disable-dev-shm-usage"]);
        assert_eq!(config.pdf_timeout, Duration::from_secs(45));
        assert_eq!(config.csv_batch_size, 500);
        assert_eq!(config.viewport_width, 1200);
    }

    #[test]
    fn test_invalid_values() {
        let err = ExportConfig::from_lookup(lookup(&[("CMDB_EXPORT_PDF_TIMEOUT_SECS", "soon")])).unwrap_err();
        assert_eq!(err.code(), "INVALID_CONFIGURATION");
        assert!(ExportConfig::from_lookup(lookup(&[("CMDB_EXPORT_CSV_BATCH_SIZE", "0")])).is_err());
        assert!(ExportConfig::from_lookup(lookup(&[("CMDB_EXPORT_LAUNCH_TIMEOUT_SECS", "0")])).is_err());
    }
}
