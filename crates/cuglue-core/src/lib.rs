//! cuglue core - marshaling between a managed runtime and native GPU APIs
//!
//! Components:
//!
//! - [`array`]: primitive arrays to native buffers and back, with write-back
//! - [`string`]: strings and string arrays to NUL-terminated native copies
//! - [`handles`]: class, field and method handles resolved once at startup
//! - [`callback`]: asynchronous native callbacks into managed objects
//! - [`log`]: the process-wide level-gated logger
//! - [`exception`]: raising managed exceptions for bridge failures
//!
//! Everything is driven through a [`Bridge`] built from [`BridgeOptions`],
//! against any runtime implementing the `cuglue-sdk` traits.
//!
//! # Example
//!
//! ```ignore
//! let bridge = Bridge::initialize(&mut env, BridgeOptions::from_env())?;
//! let status = bridge.guard(&mut env, |env| {
//!     let input = array::copy_in::<_, f64, f32>(&bridge, env, Some(data), ViewStrategy::Critical)?;
//!     // ... call the native API ...
//!     array::release(env, input, Some(data), true, ViewStrategy::Critical)?;
//!     Ok(0)
//! });
//! ```

#![warn(missing_docs)]

pub mod log;

pub mod alloc;
pub mod array;
pub mod bridge;
pub mod callback;
pub mod exception;
pub mod handles;
pub mod string;
pub mod view;

pub use alloc::{NativeAllocator, TrackingAllocator};
pub use array::{NativeArray, NestedArray};
pub use bridge::{
    global, init, install, Bridge, BridgeOptions, CallbackInterface, ExceptionClasses,
};
pub use callback::{ArmedCallback, AttachGuard, CallbackContext, CallbackSink, Dispatcher};
pub use exception::{throw_by_name, Raise};
pub use handles::HandleCache;
pub use log::LogLevel;
pub use string::{NativeString, NativeStringArray};
pub use view::{CriticalView, ElementsView, ViewStrategy};

pub use cuglue_sdk::{BridgeError, BridgeResult};
