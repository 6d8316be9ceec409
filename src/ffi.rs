//! FFI bindings for the discrete logger
//!
//! This module provides C-compatible functions so a mobile or desktop host can
//! forward its platform callbacks straight into a [`DiscreteLogger`]. Strings
//! are null-terminated; strings returned by the library must be freed with
//! `dl_free_string`.
//!
//! Integer-returning calls use `-1` for "failed, see `dl_last_error`". Signal
//! calls return `1` when the signal was accepted and `0` when it was ignored
//! because logging is disabled.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use chrono::Local;

use crate::config::LoggerConfig;
use crate::correlator::event_time_to_wall_clock;
use crate::logger::DiscreteLogger;
use crate::store::FsContentStore;
use crate::types::ContactId;

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

fn accepted(flag: bool) -> i32 {
    i32::from(flag)
}

// ============================================================================
// Lifecycle
// ============================================================================

/// Opaque handle to a DiscreteLogger
pub struct DiscreteLoggerHandle {
    logger: DiscreteLogger<FsContentStore>,
}

/// Borrow the logger behind `handle`, recording an error when it is null
unsafe fn logger_ref<'a>(
    handle: *const DiscreteLoggerHandle,
) -> Option<&'a DiscreteLogger<FsContentStore>> {
    if handle.is_null() {
        set_last_error("Null logger pointer");
        return None;
    }
    Some(&(*handle).logger)
}

fn into_handle(config: LoggerConfig) -> *mut DiscreteLoggerHandle {
    match DiscreteLogger::open(config) {
        Ok(logger) => Box::into_raw(Box::new(DiscreteLoggerHandle { logger })),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Create a logger with the default layout under `root_dir`.
///
/// # Safety
/// - `root_dir` must be a valid null-terminated C string.
/// - Must be freed with `dl_logger_free`.
/// - Returns NULL on error; call `dl_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn dl_logger_new(root_dir: *const c_char) -> *mut DiscreteLoggerHandle {
    clear_last_error();

    let root = match cstr_to_string(root_dir) {
        Some(s) => s,
        None => {
            set_last_error("Invalid root directory string pointer");
            return ptr::null_mut();
        }
    };

    into_handle(LoggerConfig::with_root(root))
}

/// Create a logger from a JSON [`LoggerConfig`].
///
/// # Safety
/// - `config_json` must be a valid null-terminated C string.
/// - Must be freed with `dl_logger_free`.
/// - Returns NULL on error; call `dl_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn dl_logger_new_with_config(
    config_json: *const c_char,
) -> *mut DiscreteLoggerHandle {
    clear_last_error();

    let json = match cstr_to_string(config_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid config string pointer");
            return ptr::null_mut();
        }
    };

    match LoggerConfig::from_json(&json) {
        Ok(config) => into_handle(config),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Free a logger, waiting for queued writes and backups first.
///
/// # Safety
/// - `logger` must be a valid pointer returned by `dl_logger_new*`, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn dl_logger_free(logger: *mut DiscreteLoggerHandle) {
    if !logger.is_null() {
        drop(Box::from_raw(logger));
    }
}

// ============================================================================
// Signals
// ============================================================================

/// Publish an ambient sensor reading.
///
/// # Safety
/// - `logger` must be a valid pointer returned by `dl_logger_new*`.
#[no_mangle]
pub unsafe extern "C" fn dl_on_ambient_sample(logger: *const DiscreteLoggerHandle, value: f32) -> i32 {
    clear_last_error();
    match logger_ref(logger) {
        Some(logger) => {
            logger.on_ambient_sample(value);
            1
        }
        None => -1,
    }
}

/// A contact began at `timestamp_ms` (wall clock).
///
/// # Safety
/// - `logger` must be a valid pointer returned by `dl_logger_new*`.
#[no_mangle]
pub unsafe extern "C" fn dl_on_begin(
    logger: *const DiscreteLoggerHandle,
    contact_id: ContactId,
    timestamp_ms: i64,
) -> i32 {
    clear_last_error();
    match logger_ref(logger) {
        Some(logger) => accepted(logger.on_begin(contact_id, timestamp_ms)),
        None => -1,
    }
}

/// Explicit sample for one open contact.
///
/// # Safety
/// - `logger` must be a valid pointer returned by `dl_logger_new*`.
#[no_mangle]
pub unsafe extern "C" fn dl_on_sample(
    logger: *const DiscreteLoggerHandle,
    contact_id: ContactId,
    value: f32,
) -> i32 {
    clear_last_error();
    match logger_ref(logger) {
        Some(logger) => accepted(logger.on_sample(contact_id, value)),
        None => -1,
    }
}

/// Pointer movement.
///
/// # Safety
/// - `logger` must be a valid pointer returned by `dl_logger_new*`.
#[no_mangle]
pub unsafe extern "C" fn dl_on_move(logger: *const DiscreteLoggerHandle) -> i32 {
    clear_last_error();
    match logger_ref(logger) {
        Some(logger) => accepted(logger.on_move()),
        None => -1,
    }
}

/// A contact ended at `timestamp_ms` (wall clock).
///
/// # Safety
/// - `logger` must be a valid pointer returned by `dl_logger_new*`.
#[no_mangle]
pub unsafe extern "C" fn dl_on_end(
    logger: *const DiscreteLoggerHandle,
    contact_id: ContactId,
    timestamp_ms: i64,
) -> i32 {
    clear_last_error();
    match logger_ref(logger) {
        Some(logger) => accepted(logger.on_end(contact_id, timestamp_ms)),
        None => -1,
    }
}

/// The platform aborted a contact.
///
/// # Safety
/// - `logger` must be a valid pointer returned by `dl_logger_new*`.
#[no_mangle]
pub unsafe extern "C" fn dl_on_cancel(
    logger: *const DiscreteLoggerHandle,
    contact_id: ContactId,
) -> i32 {
    clear_last_error();
    match logger_ref(logger) {
        Some(logger) => accepted(logger.on_cancel(contact_id)),
        None => -1,
    }
}

/// Report whether the screen is interactive; non-interactive discards open contacts.
///
/// # Safety
/// - `logger` must be a valid pointer returned by `dl_logger_new*`.
#[no_mangle]
pub unsafe extern "C" fn dl_set_interactive(logger: *const DiscreteLoggerHandle, on: bool) -> i32 {
    clear_last_error();
    match logger_ref(logger) {
        Some(logger) => {
            if on {
                logger.interactive_on();
            } else {
                logger.interactive_off();
            }
            0
        }
        None => -1,
    }
}

/// Convert a platform uptime timestamp into wall-clock milliseconds.
///
/// # Safety
/// Pure function; always safe to call.
#[no_mangle]
pub unsafe extern "C" fn dl_event_time_to_wall_clock(
    event_uptime_ms: i64,
    now_uptime_ms: i64,
    now_wall_ms: i64,
) -> i64 {
    event_time_to_wall_clock(event_uptime_ms, now_uptime_ms, now_wall_ms)
}

// ============================================================================
// Labels, Backups and Flushing
// ============================================================================

/// Label pending events and queue them for writing.
///
/// # Safety
/// - `logger` must be a valid pointer returned by `dl_logger_new*`.
/// - `text` must be a valid null-terminated C string.
/// - Returns the number of events labeled (0 for blank text), or -1 on error.
#[no_mangle]
pub unsafe extern "C" fn dl_submit_label(
    logger: *const DiscreteLoggerHandle,
    text: *const c_char,
) -> i64 {
    clear_last_error();

    let Some(logger) = logger_ref(logger) else {
        return -1;
    };

    let text = match cstr_to_string(text) {
        Some(s) => s,
        None => {
            set_last_error("Invalid label string pointer");
            return -1;
        }
    };

    match logger.submit_label(&text) {
        Ok(labeled) => i64::try_from(labeled).unwrap_or(i64::MAX),
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

/// Run the daily backup check against the local clock.
///
/// # Safety
/// - `logger` must be a valid pointer returned by `dl_logger_new*`.
/// - Returns a JSON outcome that must be freed with `dl_free_string`.
/// - Returns NULL on error; call `dl_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn dl_check_and_backup(logger: *const DiscreteLoggerHandle) -> *mut c_char {
    clear_last_error();

    let Some(logger) = logger_ref(logger) else {
        return ptr::null_mut();
    };

    let outcome = logger.check_and_backup(Local::now());
    match serde_json::to_string(&outcome) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Block until queued writes and backups have finished.
///
/// # Safety
/// - `logger` must be a valid pointer returned by `dl_logger_new*`.
/// - Returns 0 on success, -1 on error.
#[no_mangle]
pub unsafe extern "C" fn dl_flush(logger: *const DiscreteLoggerHandle) -> i32 {
    clear_last_error();

    let Some(logger) = logger_ref(logger) else {
        return -1;
    };

    match logger.flush() {
        Ok(()) => 0,
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

/// Number of completed events waiting for a label.
///
/// # Safety
/// - `logger` must be a valid pointer returned by `dl_logger_new*`.
/// - Returns -1 on error.
#[no_mangle]
pub unsafe extern "C" fn dl_pending_count(logger: *const DiscreteLoggerHandle) -> i64 {
    clear_last_error();
    match logger_ref(logger) {
        Some(logger) => i64::try_from(logger.pending_count()).unwrap_or(i64::MAX),
        None => -1,
    }
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by logger functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a `dl_` function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn dl_free_string(ptr: *mut c_char) {
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
/// - The returned pointer is valid until the next `dl_` call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn dl_last_error() -> *const c_char {
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
pub unsafe extern "C" fn dl_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn c(s: &str) -> CString {
        CString::new(s).unwrap()
    }

    #[test]
    fn test_ffi_logger_lifecycle() {
        let dir = tempdir().unwrap();
        let root = c(dir.path().to_str().unwrap());

        unsafe {
            let logger = dl_logger_new(root.as_ptr());
            assert!(!logger.is_null());

            assert_eq!(dl_on_ambient_sample(logger, 4.0), 1);
            assert_eq!(dl_on_begin(logger, 1, 1000), 1);
            assert_eq!(dl_on_sample(logger, 1, 9.0), 1);
            assert_eq!(dl_on_end(logger, 1, 1300), 1);
            assert_eq!(dl_pending_count(logger), 1);

            let label = c("walk");
            assert_eq!(dl_submit_label(logger, label.as_ptr()), 1);
            assert_eq!(dl_flush(logger), 0);
            assert_eq!(dl_pending_count(logger), 0);

            dl_logger_free(logger);
        }

        let contents = fs::read_to_string(dir.path().join("DiscreteLogger/discreteLogs.csv")).unwrap();
        assert!(contents.ends_with("1000,300,9.0,walk\n"));
    }

    #[test]
    fn test_ffi_interactive_off_ignores_contacts() {
        let dir = tempdir().unwrap();
        let root = c(dir.path().to_str().unwrap());

        unsafe {
            let logger = dl_logger_new(root.as_ptr());
            assert_eq!(dl_on_begin(logger, 1, 1000), 1);
            assert_eq!(dl_set_interactive(logger, false), 0);
            assert_eq!(dl_on_end(logger, 1, 1100), 0);
            assert_eq!(dl_set_interactive(logger, true), 0);
            assert_eq!(dl_on_end(logger, 1, 1100), 1);
            assert_eq!(dl_pending_count(logger), 0);
            dl_logger_free(logger);
        }
    }

    #[test]
    fn test_ffi_config_and_backup() {
        let dir = tempdir().unwrap();
        let config = c(&format!(
            r#"{{"root_dir": {:?}, "log_directory": "Taps"}}"#,
            dir.path().to_str().unwrap()
        ));

        unsafe {
            let logger = dl_logger_new_with_config(config.as_ptr());
            assert!(!logger.is_null());

            let first = dl_check_and_backup(logger);
            assert!(!first.is_null());
            let first_str = CStr::from_ptr(first).to_str().unwrap().to_string();
            dl_free_string(first);

            let second = dl_check_and_backup(logger);
            let second_str = CStr::from_ptr(second).to_str().unwrap().to_string();
            dl_free_string(second);

            assert_eq!(dl_flush(logger), 0);
            dl_logger_free(logger);

            assert!(first_str.contains("\"submitted\""));
            assert_eq!(second_str, r#"{"outcome":"already_backed_up"}"#);
        }

        assert_eq!(fs::read_dir(dir.path().join("Taps/Backups")).unwrap().count(), 1);
    }

    #[test]
    fn test_ffi_error_handling() {
        unsafe {
            assert_eq!(dl_on_begin(ptr::null(), 1, 1000), -1);
            let error = dl_last_error();
            assert!(!error.is_null());
            assert_eq!(CStr::from_ptr(error).to_str().unwrap(), "Null logger pointer");

            let logger = dl_logger_new(ptr::null());
            assert!(logger.is_null());
            assert!(!dl_last_error().is_null());

            let bad = c(r#"{"log_file_name": "../x.csv"}"#);
            let logger = dl_logger_new_with_config(bad.as_ptr());
            assert!(logger.is_null());
            let error_str = CStr::from_ptr(dl_last_error()).to_str().unwrap();
            assert!(error_str.contains("log_file_name"));

            dl_free_string(ptr::null_mut());
            dl_logger_free(ptr::null_mut());
        }
    }

    #[test]
    fn test_ffi_event_time_conversion() {
        unsafe {
            assert_eq!(dl_event_time_to_wall_clock(900, 1000, 50_000), 49_900);
        }
    }

    #[test]
    fn test_ffi_version() {
        unsafe {
            let version = dl_version();
            assert!(!version.is_null());

            let version_str = CStr::from_ptr(version).to_str().unwrap();
            assert_eq!(version_str, env!("CARGO_PKG_VERSION"));
        }
    }
}
