//! Callback bridge
//!
//! Relays asynchronous native callbacks into managed callback objects.
//!
//! ```text
//! Created --arm--> Armed --hand_off--> (native owns it) --deliver--> Finished
//!                    \--abort--> Aborted
//! ```
//!
//! A [`CallbackContext`] holds durable references to everything the managed
//! target needs. Arming moves it to the heap and yields an opaque pointer
//! for the native API. From then on exactly one path releases it:
//!
//! - the registering call failed: the wrapper calls [`ArmedCallback::abort`]
//!   (or lets [`register`] do it);
//! - the call succeeded: ownership is handed to native code and the
//!   trampoline reclaims it in [`deliver`].
//!
//! Both transitions consume the armed handle, so releasing twice does not
//! compile. Delivery may happen on a thread the runtime has never seen;
//! [`AttachGuard`] attaches it for the duration of the delivery.

use std::ffi::c_void;
use std::mem::ManuallyDrop;
use std::ptr::NonNull;
use std::sync::Arc;

use cuglue_sdk::{BridgeError, BridgeResult, GlobalRef, ManagedEnv, ManagedValue, ManagedVm, ObjectRef};

use crate::bridge::{Bridge, HOST_FN, STREAM_CALLBACK};
use crate::{log_debug, log_error, log_trace, log_warn};

// ============================================================================
// Context
// ============================================================================

/// Durable references for one pending callback
#[derive(Debug)]
pub struct CallbackContext {
    stream: Option<GlobalRef>,
    target: GlobalRef,
    user_data: Option<GlobalRef>,
}

impl CallbackContext {
    /// Pin the stream, callback target and user data.
    ///
    /// If pinning fails part way, the references already taken are deleted.
    pub fn new<E: ManagedEnv + ?Sized>(
        env: &mut E,
        stream: Option<ObjectRef>,
        target: ObjectRef,
        user_data: Option<ObjectRef>,
    ) -> BridgeResult<Self> {
        let stream = pin_optional(env, stream)?;
        let target = match env.new_global_ref(target) {
            Ok(target) => target,
            Err(err) => {
                unpin(env, stream);
                return Err(err);
            }
        };
        let user_data = match pin_optional(env, user_data) {
            Ok(user_data) => user_data,
            Err(err) => {
                unpin(env, stream);
                env.delete_global_ref(target);
                return Err(err);
            }
        };
        Ok(Self {
            stream,
            target,
            user_data,
        })
    }

    /// The stream the callback was enqueued on
    pub fn stream(&self) -> Option<ObjectRef> {
        self.stream.as_ref().map(GlobalRef::as_obj)
    }

    /// The managed callback object
    pub fn target(&self) -> ObjectRef {
        self.target.as_obj()
    }

    /// The user data passed back to the target
    pub fn user_data(&self) -> Option<ObjectRef> {
        self.user_data.as_ref().map(GlobalRef::as_obj)
    }

    /// Move the context to the heap for hand-off to native code
    pub fn arm(self) -> ArmedCallback {
        let ptr = NonNull::from(Box::leak(Box::new(self)));
        log_trace!("Armed callback context {:p}", ptr);
        ArmedCallback { ptr: Some(ptr) }
    }

    /// Delete every durable reference
    pub fn release<E: ManagedEnv + ?Sized>(self, env: &mut E) {
        unpin(env, self.stream);
        env.delete_global_ref(self.target);
        unpin(env, self.user_data);
    }

    /// Reclaim a context handed to native code.
    ///
    /// # Safety
    /// `user_data` must be null or a pointer obtained from
    /// [`ArmedCallback::hand_off`] that has not been reclaimed yet.
    pub unsafe fn from_user_data(user_data: *mut c_void) -> Option<Box<CallbackContext>> {
        NonNull::new(user_data.cast::<CallbackContext>()).map(|ptr| Box::from_raw(ptr.as_ptr()))
    }
}

fn pin_optional<E: ManagedEnv + ?Sized>(
    env: &mut E,
    obj: Option<ObjectRef>,
) -> BridgeResult<Option<GlobalRef>> {
    obj.map(|obj| env.new_global_ref(obj)).transpose()
}

fn unpin<E: ManagedEnv + ?Sized>(env: &mut E, global: Option<GlobalRef>) {
    if let Some(global) = global {
        env.delete_global_ref(global);
    }
}

/// A context waiting for the registering call to report its outcome
#[must_use = "an armed callback must be aborted or handed off"]
pub struct ArmedCallback {
    ptr: Option<NonNull<CallbackContext>>,
}

impl ArmedCallback {
    /// Opaque pointer to pass to the native API
    pub fn user_data(&self) -> *mut c_void {
        self.ptr
            .map_or(std::ptr::null_mut(), |ptr| ptr.as_ptr().cast())
    }

    /// The registering call failed: release the context here
    pub fn abort<E: ManagedEnv + ?Sized>(mut self, env: &mut E) {
        if let Some(ptr) = self.ptr.take() {
            log_debug!("Aborting callback context {:p}", ptr);
            let ctx = unsafe { Box::from_raw(ptr.as_ptr()) };
            (*ctx).release(env);
        }
    }

    /// The registering call succeeded: native code now owns the context
    pub fn hand_off(mut self) -> *mut c_void {
        let user_data = self.user_data();
        self.ptr = None;
        user_data
    }
}

impl Drop for ArmedCallback {
    fn drop(&mut self) {
        if let Some(ptr) = self.ptr {
            // Without an environment the references cannot be deleted, and
            // native code may still fire the callback.
            log_warn!("Armed callback context {:p} dropped without abort or hand-off; leaking", ptr);
        }
    }
}

// ============================================================================
// Registration
// ============================================================================

/// Outcome of a native call that registers a callback
pub trait RegistrationStatus {
    /// True if native code took ownership of the context
    fn succeeded(&self) -> bool;
}

impl RegistrationStatus for bool {
    fn succeeded(&self) -> bool {
        *self
    }
}

/// Native status codes: zero is success
impl RegistrationStatus for i32 {
    fn succeeded(&self) -> bool {
        *self == 0
    }
}

impl<T, E> RegistrationStatus for Result<T, E> {
    fn succeeded(&self) -> bool {
        self.is_ok()
    }
}

/// Arm `ctx`, pass its pointer to `call`, then hand off or abort depending
/// on the returned status
pub fn register<E, R, F>(env: &mut E, ctx: CallbackContext, call: F) -> R
where
    E: ManagedEnv + ?Sized,
    R: RegistrationStatus,
    F: FnOnce(*mut c_void) -> R,
{
    let armed = ctx.arm();
    let status = call(armed.user_data());
    if status.succeeded() {
        armed.hand_off();
    } else {
        armed.abort(env);
    }
    status
}

// ============================================================================
// Delivery
// ============================================================================

/// Environment for the current thread, attaching it if necessary.
///
/// Detaches on drop only if this guard did the attaching.
pub struct AttachGuard<'v, V: ManagedVm> {
    vm: &'v V,
    env: ManuallyDrop<V::Env>,
    attached: bool,
}

impl<'v, V: ManagedVm> AttachGuard<'v, V> {
    /// Get or create the current thread's environment
    pub fn new(vm: &'v V) -> BridgeResult<Self> {
        let (env, attached) = match vm.env() {
            Some(env) => (env, false),
            None => {
                log_trace!("Attaching delivery thread");
                (vm.attach_current_thread()?, true)
            }
        };
        Ok(Self {
            vm,
            env: ManuallyDrop::new(env),
            attached,
        })
    }

    /// True if the guard attached the thread
    pub fn attached(&self) -> bool {
        self.attached
    }

    /// The thread's environment
    pub fn env(&mut self) -> &mut V::Env {
        &mut self.env
    }
}

impl<V: ManagedVm> Drop for AttachGuard<'_, V> {
    fn drop(&mut self) {
        // The environment must not outlive the attachment.
        unsafe { ManuallyDrop::drop(&mut self.env) };
        if self.attached {
            log_trace!("Detaching delivery thread");
            self.vm.detach_current_thread();
        }
    }
}

/// Report and clear an exception thrown by a callback target.
///
/// There is no managed caller to propagate it to.
pub fn finish_callback<E: ManagedEnv + ?Sized>(env: &mut E) {
    if env.exception_check() {
        log_error!("Exception thrown by callback target");
        env.exception_describe();
        env.exception_clear();
    }
}

/// Deliver a native callback to its managed target and release the context.
///
/// The target is invoked through the callback interface registered as
/// `interface`, with the arguments built by `marshal`. The context is
/// released whether or not the invocation succeeds. Only if the thread
/// cannot be attached are its references leaked, since they cannot be
/// deleted without an environment.
///
/// # Safety
/// `user_data` must be a pointer obtained from [`ArmedCallback::hand_off`]
/// that has not been delivered yet.
pub unsafe fn deliver<V, F>(
    vm: &V,
    bridge: &Bridge,
    interface: &str,
    user_data: *mut c_void,
    marshal: F,
) -> BridgeResult<()>
where
    V: ManagedVm,
    F: FnOnce(&CallbackContext) -> Vec<ManagedValue>,
{
    let Some(ctx) = CallbackContext::from_user_data(user_data) else {
        log_error!("Callback delivered without a context");
        return Err(BridgeError::Runtime("null callback context".to_string()));
    };
    let mut guard = match AttachGuard::new(vm) {
        Ok(guard) => guard,
        Err(err) => {
            log_error!("Could not attach delivery thread, leaking callback context: {}", err);
            std::mem::forget(ctx);
            return Err(err);
        }
    };
    let env = guard.env();

    let result = match bridge.handles().callback(interface) {
        Some(callback) => {
            let args = marshal(&ctx);
            log_trace!("Invoking {} callback", interface);
            let invoked = env.call_method(ctx.target(), callback.method(), &args).map(drop);
            finish_callback(env);
            invoked
        }
        None => {
            log_error!("No callback interface registered as '{}'", interface);
            Err(BridgeError::Resolution {
                what: format!("callback interface {}", interface),
            })
        }
    };
    (*ctx).release(env);
    result
}

/// Arguments of `CUstreamCallback.call(stream, status, userData)`
pub fn stream_callback_args(ctx: &CallbackContext, status: i32) -> Vec<ManagedValue> {
    vec![
        ManagedValue::Object(ctx.stream()),
        ManagedValue::Int(status),
        ManagedValue::Object(ctx.user_data()),
    ]
}

/// Arguments of `CUhostFn.call(userData)`
pub fn host_fn_args(ctx: &CallbackContext) -> Vec<ManagedValue> {
    vec![ManagedValue::Object(ctx.user_data())]
}

/// Receiver of native callbacks, independent of the runtime type
pub trait CallbackSink: Send + Sync {
    /// A stream callback fired
    ///
    /// # Safety
    /// See [`deliver`].
    unsafe fn stream_callback(&self, status: i32, user_data: *mut c_void);

    /// A host function fired
    ///
    /// # Safety
    /// See [`deliver`].
    unsafe fn host_fn(&self, user_data: *mut c_void);
}

/// Delivers callbacks into one runtime through one bridge
pub struct Dispatcher<V: ManagedVm> {
    vm: Arc<V>,
    bridge: Arc<Bridge>,
}

impl<V: ManagedVm> Dispatcher<V> {
    /// Create a dispatcher
    pub fn new(vm: Arc<V>, bridge: Arc<Bridge>) -> Self {
        Self { vm, bridge }
    }

    /// The runtime callbacks are delivered into
    pub fn vm(&self) -> &Arc<V> {
        &self.vm
    }

    /// The bridge whose handles are used for delivery
    pub fn bridge(&self) -> &Arc<Bridge> {
        &self.bridge
    }
}

impl<V: ManagedVm> CallbackSink for Dispatcher<V> {
    unsafe fn stream_callback(&self, status: i32, user_data: *mut c_void) {
        let delivered = deliver(&*self.vm, &self.bridge, STREAM_CALLBACK, user_data, |ctx| {
            stream_callback_args(ctx, status)
        });
        if let Err(err) = delivered {
            log_debug!("Stream callback delivery failed: {}", err);
        }
    }

    unsafe fn host_fn(&self, user_data: *mut c_void) {
        let delivered = deliver(&*self.vm, &self.bridge, HOST_FN, user_data, host_fn_args);
        if let Err(err) = delivered {
            log_debug!("Host function delivery failed: {}", err);
        }
    }
}
