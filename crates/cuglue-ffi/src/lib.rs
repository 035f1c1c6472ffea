//! C entry points for cuglue
//!
//! The native GPU API invokes callbacks through plain C function pointers
//! with an opaque `userData` pointer. This crate exports those trampolines
//! plus a few process-wide controls:
//!
//! - `cuglue_stream_callback` / `cuglue_host_fn`: pass as the callback
//!   function to `cuStreamAddCallback` / `cuLaunchHostFunc`, with the
//!   pointer from `ArmedCallback::hand_off` as user data
//! - `cuglue_set_log_level` / `cuglue_get_log_level`
//! - `cuglue_version`
//!
//! Trampolines forward to the dispatcher installed with
//! [`install_dispatcher`]. Nothing panics across the C boundary.

use std::ffi::c_void;
use std::panic::{self, AssertUnwindSafe};

use libc::{c_char, c_int};
use once_cell::sync::OnceCell;

use cuglue_core::callback::CallbackSink;
use cuglue_core::log::{self, LogLevel};
use cuglue_core::{log_debug, log_error};
use cuglue_sdk::{BridgeError, BridgeResult};

/// Opaque stream handle passed by the driver
pub type CUstream = *mut c_void;

/// Driver status code
pub type CUresult = c_int;

static SINK: OnceCell<Box<dyn CallbackSink>> = OnceCell::new();

/// Install the process-wide callback dispatcher.
///
/// Fails with `BridgeError::AlreadyInitialized` if one is installed.
pub fn install_dispatcher(sink: Box<dyn CallbackSink>) -> BridgeResult<()> {
    SINK.set(sink).map_err(|_| BridgeError::AlreadyInitialized)?;
    log_debug!("Callback dispatcher installed");
    Ok(())
}

fn dispatch(kind: &str, f: impl FnOnce(&dyn CallbackSink)) {
    let Some(sink) = SINK.get() else {
        log_error!("{} fired before a dispatcher was installed; leaking its context", kind);
        return;
    };
    if panic::catch_unwind(AssertUnwindSafe(|| f(sink.as_ref()))).is_err() {
        log_error!("Panic while delivering {}", kind);
    }
}

// ============================================================================
// Trampolines
// ============================================================================

/// `CUstreamCallback` trampoline
///
/// # Safety
/// `user_data` must come from `ArmedCallback::hand_off` and be delivered
/// at most once.
#[no_mangle]
pub unsafe extern "C" fn cuglue_stream_callback(
    _h_stream: CUstream,
    status: CUresult,
    user_data: *mut c_void,
) {
    dispatch("stream callback", |sink| sink.stream_callback(status, user_data));
}

/// `CUhostFn` trampoline
///
/// # Safety
/// `user_data` must come from `ArmedCallback::hand_off` and be delivered
/// at most once.
#[no_mangle]
pub unsafe extern "C" fn cuglue_host_fn(user_data: *mut c_void) {
    dispatch("host function", |sink| sink.host_fn(user_data));
}

// ============================================================================
// Log control
// ============================================================================

/// Set the log threshold (0 = quiet ... 6 = debug trace)
///
/// # Returns
/// * 0 on success
/// * -1 if `level` is not a valid level
#[no_mangle]
pub extern "C" fn cuglue_set_log_level(level: c_int) -> c_int {
    match u8::try_from(level).ok().and_then(LogLevel::from_u8) {
        Some(level) => {
            log::set_level(level);
            0
        }
        None => -1,
    }
}

/// Current log threshold
#[no_mangle]
pub extern "C" fn cuglue_get_log_level() -> c_int {
    log::level() as c_int
}

/// Library version as a static NUL-terminated string
#[no_mangle]
pub extern "C" fn cuglue_version() -> *const c_char {
    static VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "\0");
    VERSION.as_ptr() as *const c_char
}

// ============================================================================
// Tests
// ============================================================================
