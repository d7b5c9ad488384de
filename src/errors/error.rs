use std::collections::BTreeMap;
use thiserror::Error;

use crate::domains::export::types::ExportFormat;

/// Errors raised by the export core
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExportError {
    #[error("No data provided for {format} export")]
    NoData { format: ExportFormat },

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Chart {index}: {reason}")]
    InvalidChart { index: usize, reason: String },

    #[error("Failed to initialize rendering engine: {0}")]
    RenderInitialization(String),

    #[error("HTML generation failed: {0}")]
    HtmlGeneration(String),

    #[error("{format} export failed: {message}")]
    ExportFailure {
        format: ExportFormat,
        message: String,
        context: BTreeMap<String, String>,
    },

    #[error("I/O error: {0}")]
    Io(String),
}

impl ExportError {
    pub fn no_data(format: ExportFormat) -> Self {
        Self::NoData { format }
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration(message.into())
    }

    pub fn invalid_chart(index: usize, reason: &str) -> Self {
        Self::InvalidChart {
            index,
            reason: reason.to_string(),
        }
    }

    /// Wraps an underlying failure together with the options that help diagnose it.
    /// Configuration, no-data and engine start-up errors pass through untouched.
    pub fn failure(format: ExportFormat, cause: ExportError, context: BTreeMap<String, String>) -> Self {
        match cause {
            ExportError::NoData { .. }
            | ExportError::InvalidConfiguration(_)
            | ExportError::InvalidChart { .. }
            | ExportError::RenderInitialization(_)
            | ExportError::ExportFailure { .. } => cause,
            other => Self::ExportFailure {
                format,
                message: other.to_string(),
                context,
            },
        }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            ExportError::NoData { .. } => "NO_DATA",
            ExportError::InvalidConfiguration(_) | ExportError::InvalidChart { .. } => "INVALID_CONFIGURATION",
            ExportError::RenderInitialization(_) => "RENDER_INITIALIZATION",
            ExportError::HtmlGeneration(_) => "HTML_GENERATION",
            ExportError::ExportFailure { .. } => "EXPORT_FAILURE",
            ExportError::Io(_) => "IO_ERROR",
        }
    }

    pub fn context(&self) -> Option<&BTreeMap<String, String>> {
        match self {
            ExportError::ExportFailure { context, .. } => Some(context),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ExportError {
    fn from(err: std::io::Error) -> Self {
        ExportError::Io(err.to_string())
    }
}

impl serde::Serialize for ExportError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("ExportError", 3)?;
        state.serialize_field("code", self.code())?;
        state.serialize_field("message", &self.to_string())?;
        state.serialize_field("context", &self.context())?;
        state.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_data_messages() {
        assert_eq!(
            ExportError::no_data(ExportFormat::Csv).to_string(),
            "No data provided for CSV export"
        );
        assert_eq!(
            ExportError::no_data(ExportFormat::Excel).to_string(),
            "No data provided for Excel export"
        );
        assert_eq!(
            ExportError::no_data(ExportFormat::Pdf).to_string(),
            "No data provided for PDF export"
        );
    }

    #[test]
    fn test_failure_wraps_only_unexpected_errors() {
        let mut context = BTreeMap::new();
        context.insert("sheetName".to_string(), "Data".to_string());

        let wrapped = ExportError::failure(ExportFormat::Excel, ExportError::Io("disk full".into()), context.clone());
        assert_eq!(wrapped.code(), "EXPORT_FAILURE");
        assert_eq!(wrapped.context().unwrap().get("sheetName").unwrap(), "Data");
        assert!(wrapped.to_string().contains("disk full"));

        let passthrough = ExportError::failure(ExportFormat::Excel, ExportError::invalid_chart(2, "title is required"), context);
        assert_eq!(passthrough, ExportError::invalid_chart(2, "title is required"));
    }

    #[test]
    fn test_serialize_shape() {
        let json = serde_json::to_value(ExportError::HtmlGeneration("unclosed block".into())).unwrap();
        assert_eq!(json["code"], "HTML_GENERATION");
        assert_eq!(json["message"], "HTML generation failed: unclosed block");
        assert!(json["context"].is_null());
    }
}
