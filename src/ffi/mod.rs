use std::os::raw::{c_int, c_char};
use std::ffi::CString;
use crate::ffi::error::{FFIError, ErrorCode};
use serde::Serialize;

pub mod error;
pub mod export;

/// Error handling helper for FFI boundaries (returns error code)
pub fn handle_status_result<F>(func: F) -> c_int
where
    F: FnOnce() -> FFIResult<()>,
{
    match func() {
        Ok(_) => ErrorCode::Success as c_int,
        Err(e) => {
            log::error!("[FFI] Code: {:?}, Message: {}, Details: {}",
                        e.code, e.message, e.details.as_deref().unwrap_or("None"));
            e.code as c_int
        }
    }
}

/// Serializes Ok(T) or Err(FFIError) to JSON.
/// Returns a pointer to a C string (must be freed by the caller).
pub fn handle_json_result<F, T>(func: F) -> *mut c_char
where
    F: FnOnce() -> FFIResult<T>,
    T: Serialize,
{
    let json_string = match func() {
        Ok(value) => serde_json::to_string(&value),
        Err(ffi_error) => serde_json::to_string(&ffi_error),
    };

    let final_json = match json_string {
        Ok(s) => s,
        Err(e) => {
            // The caller must always be able to parse the response
            log::error!("[FFI] Serialization failed: {}", e);
            error_json(ErrorCode::InternalError, &format!("Failed to serialize result: {}", e))
        }
    };

    match CString::new(final_json) {
        Ok(c_string) => c_string.into_raw(),
        Err(e) => {
            log::error!("[FFI] Failed to create CString: {}", e);
            let error_json = error_json(ErrorCode::InternalError, &format!("Failed to create CString: {}", e));
            CString::new(error_json).map_or(std::ptr::null_mut(), |cs| cs.into_raw())
        }
    }
}

fn error_json(code: ErrorCode, message: &str) -> String {
    serde_json::to_string(&FFIError::new(code, message)).unwrap_or_else(|_| {
        format!("{{\"code\":\"{:?}\",\"message\":\"serialization failure\",\"details\":null}}", code)
    })
}

pub use error::FFIResult;
