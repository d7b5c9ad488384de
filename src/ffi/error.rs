use std::fmt;
use serde::{Deserialize, Serialize};

use crate::errors::ExportError;

/// Error codes for FFI boundary
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    // Success (no error)
    Success = 0,

    // General errors (1-99)
    Unknown = 1,
    InvalidArgument = 2,
    NullPointer = 3,
    InvalidUtf8 = 4,
    InternalError = 6,

    // Export errors (500-599)
    NoData = 500,
    InvalidConfiguration = 501,
    RenderInitialization = 502,
    HtmlGeneration = 503,
    ExportFailure = 504,
    IoError = 505,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({})", self, *self as i32)
    }
}

/// Error type for FFI boundary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FFIError {
    /// Error code for programmatic handling
    pub code: ErrorCode,

    /// Human-readable error message
    pub message: String,

    /// Optional additional details (JSON string)
    pub details: Option<String>,
}

impl fmt::Display for FFIError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(details) = &self.details {
            write!(f, "{}: {} ({})", self.code, self.message, details)
        } else {
            write!(f, "{}: {}", self.code, self.message)
        }
    }
}

impl std::error::Error for FFIError {}

impl FFIError {
    pub fn new(code: ErrorCode, message: &str) -> Self {
        Self {
            code,
            message: message.to_string(),
            details: None,
        }
    }

    pub fn with_details(code: ErrorCode, message: &str, details: &str) -> Self {
        Self {
            code,
            message: message.to_string(),
            details: Some(details.to_string()),
        }
    }

    pub fn invalid_argument(message: &str) -> Self {
        Self::new(ErrorCode::InvalidArgument, message)
    }

    pub fn null_pointer(name: &str) -> Self {
        Self::new(ErrorCode::NullPointer, &format!("Null pointer provided for {}", name))
    }

    pub fn internal(message: String) -> Self {
        Self::new(ErrorCode::InternalError, &message)
    }
}

impl From<ExportError> for FFIError {
    fn from(err: ExportError) -> Self {
        let code = match &err {
            ExportError::NoData { .. } => ErrorCode::NoData,
            ExportError::InvalidConfiguration(_) | ExportError::InvalidChart { .. } => ErrorCode::InvalidConfiguration,
            ExportError::RenderInitialization(_) => ErrorCode::RenderInitialization,
            ExportError::HtmlGeneration(_) => ErrorCode::HtmlGeneration,
            ExportError::ExportFailure { .. } => ErrorCode::ExportFailure,
            ExportError::Io(_) => ErrorCode::IoError,
        };

        match err.context() {
            Some(context) => {
                let details = serde_json::to_string(context).unwrap_or_default();
                Self::with_details(code, &err.to_string(), &details)
            }
            None => Self::new(code, &err.to_string()),
        }
    }
}

/// Result type for FFI functions
pub type FFIResult<T> = Result<T, FFIError>;
