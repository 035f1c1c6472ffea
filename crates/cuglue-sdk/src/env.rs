//! `ManagedEnv` and `ManagedVm`: what the bridge needs from a managed runtime
//!
//! The bridge never talks to a runtime directly. It programs against these
//! traits; a runtime binding (a JNI function table, an embedded heap, ...)
//! provides the concrete implementation.
//!
//! `ManagedEnv` is a per-thread environment, the analogue of a `JNIEnv*`.
//! Every method takes `&mut self`: a borrowed view of managed memory that
//! keeps the environment mutably borrowed therefore makes any other runtime
//! call a compile-time error for as long as the view is alive.
//!
//! # Pending exceptions
//!
//! Methods that fail because the runtime raised an exception leave that
//! exception pending and return `BridgeError::PendingException` (or, for
//! lookups, `BridgeError::Resolution`). Callers must not throw over it.

use std::ffi::c_void;
use std::ptr::NonNull;

use crate::element::{PrimitiveKind, ReleaseMode};
use crate::error::BridgeResult;
use crate::refs::{ClassRef, FieldId, GlobalRef, ManagedValue, MethodId, ObjectRef};

/// Per-thread managed-runtime environment.
pub trait ManagedEnv {
    // ========================================================================
    // Class and Member Lookup
    // ========================================================================

    /// Find a class by its internal name (e.g. `java/lang/String`)
    fn find_class(&mut self, name: &str) -> BridgeResult<ClassRef>;

    /// Resolve an instance field by name and type signature
    fn get_field_id(&mut self, class: ClassRef, name: &str, signature: &str)
        -> BridgeResult<FieldId>;

    /// Resolve an instance method (or `<init>` constructor) by name and signature
    fn get_method_id(
        &mut self,
        class: ClassRef,
        name: &str,
        signature: &str,
    ) -> BridgeResult<MethodId>;

    // ========================================================================
    // References
    // ========================================================================

    /// Create a durable reference to `obj`
    fn new_global_ref(&mut self, obj: ObjectRef) -> BridgeResult<GlobalRef>;

    /// Delete a durable reference
    fn delete_global_ref(&mut self, global: GlobalRef);

    /// Release a frame-local reference early. Runtimes without local
    /// reference tables may ignore this.
    fn delete_local_ref(&mut self, _obj: ObjectRef) {}

    // ========================================================================
    // Exceptions
    // ========================================================================

    /// Raise an exception of `class` with `message`. Returns normally; the
    /// exception stays pending until the native frame returns.
    fn throw_new(&mut self, class: ClassRef, message: &str) -> BridgeResult<()>;

    /// Check whether an exception is pending
    fn exception_check(&mut self) -> bool;

    /// Print the pending exception to the runtime's error stream
    fn exception_describe(&mut self);

    /// Clear the pending exception
    fn exception_clear(&mut self);

    // ========================================================================
    // Objects
    // ========================================================================

    /// Construct an object with the given constructor
    fn new_object(
        &mut self,
        class: ClassRef,
        constructor: MethodId,
        args: &[ManagedValue],
    ) -> BridgeResult<ObjectRef>;

    /// Invoke an instance method (virtual dispatch)
    fn call_method(
        &mut self,
        obj: ObjectRef,
        method: MethodId,
        args: &[ManagedValue],
    ) -> BridgeResult<ManagedValue>;

    /// Read a `long` field
    fn get_long_field(&mut self, obj: ObjectRef, field: FieldId) -> BridgeResult<i64>;

    /// Write a `long` field
    fn set_long_field(&mut self, obj: ObjectRef, field: FieldId, value: i64) -> BridgeResult<()>;

    // ========================================================================
    // Arrays
    // ========================================================================

    /// Length of a primitive or object array
    fn array_length(&mut self, array: ObjectRef) -> BridgeResult<usize>;

    /// Allocate a zero-filled primitive array
    fn new_primitive_array(&mut self, kind: PrimitiveKind, len: usize) -> BridgeResult<ObjectRef>;

    /// Element of an object array (`None` for null)
    fn object_array_element(
        &mut self,
        array: ObjectRef,
        index: usize,
    ) -> BridgeResult<Option<ObjectRef>>;

    /// Direct, zero-copy view of a primitive array's elements.
    ///
    /// Returns `None` with an exception pending if no view could be made.
    /// Between this call and the matching [`release_critical`] no other
    /// method of this environment may be called.
    ///
    /// [`release_critical`]: ManagedEnv::release_critical
    fn acquire_critical(&mut self, array: ObjectRef, kind: PrimitiveKind)
        -> Option<NonNull<c_void>>;

    /// End a critical view.
    ///
    /// # Safety
    /// `elems` must come from `acquire_critical` on the same `array` and
    /// must not be used afterwards.
    unsafe fn release_critical(&mut self, array: ObjectRef, elems: NonNull<c_void>, mode: ReleaseMode);

    /// View of a primitive array's elements, possibly a copy.
    ///
    /// Unlike a critical view, other runtime calls are allowed while this
    /// view is held. Returns `None` with an exception pending on failure.
    fn acquire_elements(&mut self, array: ObjectRef, kind: PrimitiveKind)
        -> Option<NonNull<c_void>>;

    /// End an elements view, copying back on `ReleaseMode::Commit`.
    ///
    /// # Safety
    /// `elems` must come from `acquire_elements` on the same `array` and
    /// must not be used afterwards.
    unsafe fn release_elements(&mut self, array: ObjectRef, elems: NonNull<c_void>, mode: ReleaseMode);
}

/// Process-wide handle to a managed runtime, the analogue of a `JavaVM*`.
///
/// Used by callback trampolines, which may run on threads the runtime has
/// never seen.
pub trait ManagedVm: Send + Sync {
    /// Environment type handed out for attached threads
    type Env: ManagedEnv;

    /// Environment of the current thread if it is already attached
    fn env(&self) -> Option<Self::Env>;

    /// Attach the current thread and return its environment
    fn attach_current_thread(&self) -> BridgeResult<Self::Env>;

    /// Detach the current thread
    fn detach_current_thread(&self);
}
