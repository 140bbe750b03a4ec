//! FFI bindings for pagevitals
//!
//! This module provides C-compatible functions for calling the engine from
//! other languages. All functions use C strings (null-terminated) and return
//! allocated memory that must be freed by the caller using
//! `pagevitals_free_string`.
//!
//! A session handle wraps a single-threaded page session; it must only be
//! used from the thread that created it.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use crate::error::VitalsError;
use crate::replay::{replay_json, ReplayOptions, TraceReplayer};
use crate::schema::TraceAdapter;

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

/// Set the last error message
fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

/// Clear the last error message
fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

/// Helper to convert C string to Rust string
unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

/// Helper to convert Rust string to C string (caller must free)
fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

/// Options from an optional JSON string; NULL means defaults
unsafe fn options_from_ptr(options_json: *const c_char) -> Result<ReplayOptions, VitalsError> {
    if options_json.is_null() {
        return Ok(ReplayOptions::default());
    }
    match cstr_to_string(options_json) {
        Some(json) => ReplayOptions::from_json(&json),
        None => Err(VitalsError::ParseError(
            "Options string is not valid UTF-8".to_string(),
        )),
    }
}

// ============================================================================
// Stateless API
// ============================================================================

/// Replay a trace (NDJSON or JSON array) and return the report JSON.
///
/// # Safety
/// - `trace` must be a valid null-terminated C string.
/// - `options_json` must be a valid null-terminated C string or NULL for defaults.
/// - Returns a newly allocated string that must be freed with `pagevitals_free_string`.
/// - Returns NULL on error; call `pagevitals_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn pagevitals_replay(
    trace: *const c_char,
    options_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    let trace_str = match cstr_to_string(trace) {
        Some(s) => s,
        None => {
            set_last_error("Invalid trace string pointer");
            return ptr::null_mut();
        }
    };

    let options = match options_from_ptr(options_json) {
        Ok(options) => options,
        Err(e) => {
            set_last_error(&e.to_string());
            return ptr::null_mut();
        }
    };

    match replay_json(&trace_str, options).and_then(|report| report.to_json()) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Stateful Session API
// ============================================================================

/// Opaque handle to a live page session
pub struct PageVitalsSessionHandle {
    replayer: TraceReplayer,
}

/// Create a new page session.
///
/// # Safety
/// - `options_json` must be a valid null-terminated C string or NULL for defaults.
/// - Returns a pointer to a newly allocated session.
/// - Must be freed with `pagevitals_session_free`.
/// - Returns NULL on error.
#[no_mangle]
pub unsafe extern "C" fn pagevitals_session_new(
    options_json: *const c_char,
) -> *mut PageVitalsSessionHandle {
    clear_last_error();

    let options = match options_from_ptr(options_json) {
        Ok(options) => options,
        Err(e) => {
            set_last_error(&e.to_string());
            return ptr::null_mut();
        }
    };

    match TraceReplayer::new(options) {
        Ok(replayer) => Box::into_raw(Box::new(PageVitalsSessionHandle { replayer })),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Free a page session.
///
/// # Safety
/// - `session` must be a valid pointer returned by `pagevitals_session_new`, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn pagevitals_session_free(session: *mut PageVitalsSessionHandle) {
    if !session.is_null() {
        drop(Box::from_raw(session));
    }
}

/// Apply one or more trace events (a single JSON object, NDJSON or a JSON array).
///
/// # Safety
/// - `session` must be a valid pointer returned by `pagevitals_session_new`.
/// - `events` must be a valid null-terminated C string.
/// - Returns 0 on success, non-zero on error.
/// - On error, call `pagevitals_last_error` to get the error message. Events
///   before the failing one have been applied.
#[no_mangle]
pub unsafe extern "C" fn pagevitals_session_apply(
    session: *mut PageVitalsSessionHandle,
    events: *const c_char,
) -> i32 {
    clear_last_error();

    if session.is_null() {
        set_last_error("Null session pointer");
        return -1;
    }

    let handle = &mut *session;

    let events_str = match cstr_to_string(events) {
        Some(s) => s,
        None => {
            set_last_error("Invalid events string pointer");
            return -1;
        }
    };

    let result = TraceAdapter::parse(&events_str)
        .and_then(|events| handle.replayer.apply_all(&events));
    match result {
        Ok(()) => 0,
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

/// Current metric values as a JSON object.
///
/// # Safety
/// - `session` must be a valid pointer returned by `pagevitals_session_new`.
/// - Returns a newly allocated string that must be freed with `pagevitals_free_string`.
/// - Returns NULL on error.
#[no_mangle]
pub unsafe extern "C" fn pagevitals_session_metrics(
    session: *const PageVitalsSessionHandle,
) -> *mut c_char {
    clear_last_error();

    if session.is_null() {
        set_last_error("Null session pointer");
        return ptr::null_mut();
    }

    let handle = &*session;

    match serde_json::to_string(&handle.replayer.metrics()) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Every `on_metric` notification so far, as a JSON array.
///
/// # Safety
/// - `session` must be a valid pointer returned by `pagevitals_session_new`.
/// - Returns a newly allocated string that must be freed with `pagevitals_free_string`.
/// - Returns NULL on error.
#[no_mangle]
pub unsafe extern "C" fn pagevitals_session_reports(
    session: *const PageVitalsSessionHandle,
) -> *mut c_char {
    clear_last_error();

    if session.is_null() {
        set_last_error("Null session pointer");
        return ptr::null_mut();
    }

    let handle = &*session;

    match serde_json::to_string(&handle.replayer.reports()) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by pagevitals functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a pagevitals function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn pagevitals_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a thread-local error string.
/// - The returned pointer is valid until the next pagevitals call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn pagevitals_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

// ============================================================================
// Version Information
// ============================================================================

/// Get the library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn pagevitals_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
