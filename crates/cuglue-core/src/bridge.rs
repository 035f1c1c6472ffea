//! Bridge context and options
//!
//! A [`Bridge`] is built once at startup from [`BridgeOptions`] and then
//! shared read-only by every wrapper call and callback trampoline. It owns
//! the resolved handle cache, the exception class names and the native
//! allocator.
//!
//! C entry points cannot receive a context argument, so a bridge can also
//! be installed process-wide with [`init`] / [`install`] and fetched with
//! [`global`].

use std::sync::Arc;

use once_cell::sync::OnceCell;

use cuglue_sdk::{BridgeError, BridgeResult, ManagedEnv};

use crate::alloc::{NativeAllocator, TrackingAllocator};
use crate::exception::Raise;
use crate::handles::HandleCache;
use crate::log::{self, LogLevel};
use crate::{log_debug, log_error, log_warn};

/// Environment variable holding a log level name or number
pub const LOG_LEVEL_ENV: &str = "CUGLUE_LOG_LEVEL";

/// Interface name of stream callbacks: `(stream, int status, Object userData)`
pub const STREAM_CALLBACK: &str = "stream_callback";

/// Interface name of host functions: `(Object userData)`
pub const HOST_FN: &str = "host_fn";

/// Exception classes raised for bridge failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionClasses {
    /// Native allocation failed
    pub out_of_memory: String,
    /// A required reference was null
    pub null_pointer: String,
    /// An argument had the wrong type
    pub illegal_argument: String,
    /// An index was outside an array
    pub index_out_of_bounds: String,
    /// Anything else
    pub runtime: String,
}

impl Default for ExceptionClasses {
    fn default() -> Self {
        Self {
            out_of_memory: "java/lang/OutOfMemoryError".to_string(),
            null_pointer: "java/lang/NullPointerException".to_string(),
            illegal_argument: "java/lang/IllegalArgumentException".to_string(),
            index_out_of_bounds: "java/lang/ArrayIndexOutOfBoundsException".to_string(),
            runtime: "java/lang/RuntimeException".to_string(),
        }
    }
}

/// A managed callback interface resolved at initialization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackInterface {
    /// Name trampolines use to look the interface up
    pub name: String,
    /// Internal class name of the interface
    pub class: String,
    /// Method invoked on the callback target
    pub method: String,
    /// Method signature
    pub signature: String,
}

impl CallbackInterface {
    /// Describe a callback interface
    pub fn new(
        name: impl Into<String>,
        class: impl Into<String>,
        method: impl Into<String>,
        signature: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            class: class.into(),
            method: method.into(),
            signature: signature.into(),
        }
    }

    /// `jcuda.driver.CUstreamCallback.call(CUstream, int, Object)`
    pub fn stream_callback() -> Self {
        Self::new(
            STREAM_CALLBACK,
            "jcuda/driver/CUstreamCallback",
            "call",
            "(Ljcuda/driver/CUstream;ILjava/lang/Object;)V",
        )
    }

    /// `jcuda.driver.CUhostFn.call(Object)`
    pub fn host_fn() -> Self {
        Self::new(HOST_FN, "jcuda/driver/CUhostFn", "call", "(Ljava/lang/Object;)V")
    }
}

/// Bridge options
pub struct BridgeOptions {
    /// Log threshold to apply at initialization (`None` keeps the current one)
    pub log_level: Option<LogLevel>,

    /// Exception classes for bridge failures
    pub exceptions: ExceptionClasses,

    /// Class whose `long nativePointer` field holds native handles
    pub native_pointer_class: Option<String>,

    /// Callback interfaces to resolve, in order
    pub callbacks: Vec<CallbackInterface>,

    /// Admission policy for native buffers
    pub allocator: Arc<dyn NativeAllocator>,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            log_level: None,
            exceptions: ExceptionClasses::default(),
            native_pointer_class: None,
            callbacks: Vec::new(),
            allocator: Arc::new(TrackingAllocator::new()),
        }
    }
}

impl BridgeOptions {
    /// Defaults, with the log level taken from `CUGLUE_LOG_LEVEL` if set
    pub fn from_env() -> Self {
        let log_level = std::env::var(LOG_LEVEL_ENV).ok().and_then(|value| {
            let level = LogLevel::parse(&value);
            if level.is_none() {
                log_warn!("Ignoring invalid {}={:?}", LOG_LEVEL_ENV, value);
            }
            level
        });
        Self {
            log_level,
            ..Self::default()
        }
    }
}

/// Shared bridge context
pub struct Bridge {
    handles: HandleCache,
    exceptions: ExceptionClasses,
    allocator: Arc<dyn NativeAllocator>,
}

impl Bridge {
    /// Resolve every handle the bridge needs.
    ///
    /// On failure the environment's pending exception is left untouched and
    /// nothing resolved so far is kept.
    pub fn initialize<E: ManagedEnv + ?Sized>(
        env: &mut E,
        options: BridgeOptions,
    ) -> BridgeResult<Self> {
        if let Some(level) = options.log_level {
            log::set_level(level);
        }
        log_debug!("Initializing bridge");
        let handles = HandleCache::initialize(env, &options)?;
        Ok(Self {
            handles,
            exceptions: options.exceptions,
            allocator: options.allocator,
        })
    }

    /// Resolved class, field and method handles
    pub fn handles(&self) -> &HandleCache {
        &self.handles
    }

    /// Exception class names
    pub fn exceptions(&self) -> &ExceptionClasses {
        &self.exceptions
    }

    /// Native buffer allocator
    pub fn allocator(&self) -> &Arc<dyn NativeAllocator> {
        &self.allocator
    }

    /// Run a wrapper body and turn its error into a managed exception.
    ///
    /// Returns the body's value, or `T::default()` as the sentinel after
    /// raising. The caller must return to the runtime promptly afterwards.
    pub fn guard<E, T, F>(&self, env: &mut E, body: F) -> T
    where
        E: ManagedEnv + ?Sized,
        T: Default,
        F: FnOnce(&mut E) -> BridgeResult<T>,
    {
        match body(env) {
            Ok(value) => value,
            Err(err) => {
                err.raise(env, &self.exceptions);
                T::default()
            }
        }
    }

    /// Delete the durable references held by the handle cache
    pub fn shutdown<E: ManagedEnv + ?Sized>(self, env: &mut E) {
        self.handles.release(env);
    }
}

static GLOBAL: OnceCell<Arc<Bridge>> = OnceCell::new();

/// Install `bridge` as the process-wide bridge.
///
/// Hands the bridge back if one is already installed.
pub fn install(bridge: Bridge) -> Result<Arc<Bridge>, Arc<Bridge>> {
    match GLOBAL.try_insert(Arc::new(bridge)) {
        Ok(installed) => Ok(Arc::clone(installed)),
        Err((_, rejected)) => Err(rejected),
    }
}

/// The process-wide bridge, if installed
pub fn global() -> Option<Arc<Bridge>> {
    GLOBAL.get().cloned()
}

/// Initialize and install the process-wide bridge.
///
/// This is the single initialization entry point for C callers. A second
/// call fails with `BridgeError::AlreadyInitialized` and releases what it
/// resolved.
pub fn init<E: ManagedEnv + ?Sized>(env: &mut E, options: BridgeOptions) -> BridgeResult<Arc<Bridge>> {
    let bridge = Bridge::initialize(env, options)?;
    install(bridge).map_err(|rejected| {
        log_warn!("Bridge already initialized");
        match Arc::try_unwrap(rejected) {
            Ok(bridge) => bridge.shutdown(env),
            Err(_) => log_error!("Rejected bridge is still shared; its references are leaked"),
        }
        BridgeError::AlreadyInitialized
    })
}
