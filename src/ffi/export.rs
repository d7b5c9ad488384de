// src/ffi/export.rs
// ============================================================================
// C ABI for the report export service.
// Requests and responses are JSON strings. Every *mut c_char handed back to
// the caller must be released with `report_export_free`.
// ============================================================================

use crate::config;
use crate::domains::export::service::{ExportService, ExportServiceImpl};
use crate::domains::export::types::{ExportFormat, ExportOptions, ExportResult, ExportWarning, Record};
use crate::ffi::error::{FFIError, FFIResult};
use crate::ffi::{handle_json_result, handle_status_result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::ffi::{c_char, CStr, CString};
use std::os::raw::c_int;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tokio::runtime::Runtime;

static RUNTIME: OnceLock<Runtime> = OnceLock::new();
static SERVICE: OnceLock<ExportServiceImpl> = OnceLock::new();

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// Shared runtime; the PDF engine handle outlives a single call
fn runtime() -> FFIResult<&'static Runtime> {
    if let Some(rt) = RUNTIME.get() {
        return Ok(rt);
    }
    let rt = Runtime::new()
        .map_err(|e| FFIError::internal(format!("Failed to create Tokio runtime: {}", e)))?;
    let _ = RUNTIME.set(rt);
    RUNTIME
        .get()
        .ok_or_else(|| FFIError::internal("Tokio runtime unavailable".to_string()))
}

fn block_on_async<F, T>(future: F) -> FFIResult<T>
where
    F: std::future::Future<Output = FFIResult<T>>,
{
    runtime()?.block_on(future)
}

fn service() -> &'static ExportServiceImpl {
    SERVICE.get_or_init(|| {
        crate::init_logging();
        ExportServiceImpl::new(&config::config())
    })
}

/// Helper to read a C string argument
unsafe fn read_c_str<'a>(ptr: *const c_char, name: &str) -> FFIResult<&'a str> {
    if ptr.is_null() {
        return Err(FFIError::null_pointer(name));
    }
    unsafe { CStr::from_ptr(ptr) }
        .to_str()
        .map_err(|_| FFIError::new(crate::ffi::error::ErrorCode::InvalidUtf8, &format!("Invalid UTF-8 in {}", name)))
}

/// Helper to parse JSON payload
fn parse_json_payload<T: serde::de::DeserializeOwned>(json_str: &str) -> FFIResult<T> {
    serde_json::from_str(json_str)
        .map_err(|e| FFIError::invalid_argument(&format!("Invalid JSON payload: {}", e)))
}

/// Helper to create JSON response
fn create_json_response<T: Serialize>(data: &T) -> FFIResult<*mut c_char> {
    let json_string = serde_json::to_string(data)
        .map_err(|e| FFIError::internal(format!("JSON serialization failed: {}", e)))?;
    let c_string = CString::new(json_string)
        .map_err(|e| FFIError::internal(format!("CString creation failed: {}", e)))?;
    Ok(c_string.into_raw())
}

// ============================================================================
// DTOs
// ============================================================================

#[derive(Debug, Deserialize)]
struct ExportRequestDto {
    records: Vec<Record>,
    format: ExportFormat,
    #[serde(default)]
    options: ExportOptions,
    /// File or directory; when absent the bytes are returned inline as base64
    #[serde(default)]
    output_path: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct ExportResponseDto {
    export_id: String,
    file_name: String,
    mime_type: String,
    size: usize,
    record_count: usize,
    checksum: String,
    created_at: String,
    warnings: Vec<ExportWarning>,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<String>,
}

#[derive(Debug, Serialize)]
struct HealthResponseDto {
    ready: bool,
    closed: bool,
}

#[derive(Debug, Deserialize)]
struct TemplateRequestDto {
    format: ExportFormat,
    fields: Vec<String>,
    #[serde(default)]
    options: ExportOptions,
}

#[derive(Debug, Serialize)]
struct TemplateResponseDto {
    file_name: String,
    mime_type: String,
    size: usize,
    data: String,
}

/// Writes the export next to / at `output_path` and returns where it went
fn write_output(result: &ExportResult, output_path: &Path) -> FFIResult<PathBuf> {
    let target = if output_path.is_dir() {
        output_path.join(result.file_name())
    } else {
        output_path.to_path_buf()
    };
    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| FFIError::internal(format!("Failed to create {}: {}", parent.display(), e)))?;
    }
    std::fs::write(&target, &result.data)
        .map_err(|e| FFIError::internal(format!("Failed to write {}: {}", target.display(), e)))?;
    log::info!("Export written to {}", target.display());
    Ok(target)
}

fn to_response(result: ExportResult, output_path: Option<&Path>) -> FFIResult<ExportResponseDto> {
    let (path, data) = match output_path {
        Some(output_path) => (Some(write_output(&result, output_path)?.display().to_string()), None),
        None => (None, Some(STANDARD.encode(&result.data))),
    };
    let metadata = result.metadata;
    Ok(ExportResponseDto {
        export_id: metadata.export_id.to_string(),
        file_name: metadata.file_name,
        mime_type: metadata.mime_type,
        size: metadata.size,
        record_count: metadata.record_count,
        checksum: metadata.checksum,
        created_at: metadata.created_at.to_rfc3339(),
        warnings: metadata.warnings,
        path,
        data,
    })
}

// ============================================================================
// EXPORTED FUNCTIONS
// ============================================================================

/// Export records as CSV, Excel or PDF
///
/// # Arguments
/// * `request_json` - `{"records": [...], "format": "csv", "options": {...}, "output_path": "..."}`
///
/// # Returns
/// JSON with the export metadata plus either `path` or base64 `data`
///
/// # Safety
/// This function should only be called with valid, null-terminated C strings
#[unsafe(no_mangle)]
pub unsafe extern "C" fn report_export_create(
    request_json: *const c_char,
    result: *mut *mut c_char,
) -> c_int {
    handle_status_result(|| unsafe {
        if result.is_null() {
            return Err(FFIError::null_pointer("result"));
        }
        let json_str = read_c_str(request_json, "request_json")?;
        let ExportRequestDto { records, format, options, output_path } = parse_json_payload(json_str)?;

        let export = block_on_async(async move {
            service()
                .export(records, format, options)
                .await
                .map_err(FFIError::from)
        })?;

        let response = to_response(export, output_path.as_deref())?;
        *result = create_json_response(&response)?;
        Ok(())
    })
}

/// Header-only import template
///
/// # Arguments
/// * `request_json` - `{"format": "csv" | "excel", "fields": [...], "options": {...}}`
///
/// # Safety
/// This function should only be called with valid, null-terminated C strings
#[unsafe(no_mangle)]
pub unsafe extern "C" fn report_export_template(
    request_json: *const c_char,
    result: *mut *mut c_char,
) -> c_int {
    handle_status_result(|| unsafe {
        if result.is_null() {
            return Err(FFIError::null_pointer("result"));
        }
        let json_str = read_c_str(request_json, "request_json")?;
        let TemplateRequestDto { format, fields, options } = parse_json_payload(json_str)?;

        let bytes = block_on_async(async move {
            service()
                .create_template(format, fields, options)
                .await
                .map_err(FFIError::from)
        })?;

        let response = TemplateResponseDto {
            file_name: format!("template.{}", format.file_extension()),
            mime_type: format.mime_type().to_string(),
            size: bytes.len(),
            data: STANDARD.encode(&bytes),
        };
        *result = create_json_response(&response)?;
        Ok(())
    })
}

/// Launches the PDF rendering engine if needed and checks it by opening a blank page
///
/// # Returns
/// `{"ready": true, "closed": false}` or an FFIError JSON. Free with `report_export_free`.
#[unsafe(no_mangle)]
pub extern "C" fn report_export_health_check() -> *mut c_char {
    handle_json_result(|| {
        let pdf = service().pdf_exporter();
        block_on_async(async move {
            pdf.health_check().await.map_err(FFIError::from)?;
            Ok(HealthResponseDto {
                ready: true,
                closed: pdf.is_closed().await,
            })
        })
    })
}

/// Closes the PDF rendering engine. Later PDF exports fail.
#[unsafe(no_mangle)]
pub extern "C" fn report_export_shutdown() -> c_int {
    handle_status_result(|| {
        if let Some(service) = SERVICE.get() {
            runtime()?.block_on(service.shutdown());
        }
        Ok(())
    })
}

/// Free memory allocated by Rust for strings returned from this module
///
/// # Safety
/// `ptr` must come from one of the functions above and be freed only once
#[unsafe(no_mangle)]
pub unsafe extern "C" fn report_export_free(ptr: *mut c_char) {
    if !ptr.is_null() {
        unsafe { let _ = CString::from_raw(ptr); }
    }
}
