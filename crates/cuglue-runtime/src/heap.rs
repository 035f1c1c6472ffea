//! In-process managed heap
//!
//! `ManagedHeap` is a cheaply clonable handle to a shared object table. It
//! implements `ManagedVm`; each thread works through its own [`HeapEnv`].
//! Objects are never collected, so references stay valid for the life of
//! the heap.
//!
//! Besides the runtime operations, the heap exposes host-side helpers to
//! build and inspect objects, counters describing how it was used (live
//! durable references, critical-region violations, attaches) and fault
//! injection for failure paths.

use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::{Mutex, MutexGuard};

use cuglue_sdk::{
    ArrayRef, BridgeError, BridgeResult, ClassRef, ManagedValue, ManagedVm, ObjectArrayRef,
    ObjectRef, StringRef,
};

use crate::class::{ClassBuilder, ClassDef};
use crate::env::HeapEnv;
use crate::object::{HeapElement, Object, ThrownException};

/// Exception classes every heap defines
pub const BUILTIN_EXCEPTIONS: &[&str] = &[
    "java/lang/Throwable",
    "java/lang/RuntimeException",
    "java/lang/OutOfMemoryError",
    "java/lang/NullPointerException",
    "java/lang/IllegalArgumentException",
    "java/lang/ArrayIndexOutOfBoundsException",
    "java/lang/NoClassDefFoundError",
    "java/lang/NoSuchFieldError",
    "java/lang/NoSuchMethodError",
];

pub(crate) struct FieldEntry {
    pub(crate) class: usize,
    pub(crate) name: String,
    pub(crate) signature: String,
}

pub(crate) struct MethodEntry {
    pub(crate) class: usize,
    pub(crate) name: String,
    pub(crate) signature: String,
}

#[derive(Default)]
pub(crate) struct HeapState {
    pub(crate) objects: FxHashMap<ObjectRef, Object>,
    pub(crate) classes: Vec<ClassDef>,
    pub(crate) class_objects: Vec<ObjectRef>,
    pub(crate) class_by_name: FxHashMap<String, usize>,
    pub(crate) fields: Vec<FieldEntry>,
    pub(crate) methods: Vec<MethodEntry>,
    pub(crate) globals: FxHashMap<ObjectRef, usize>,
    pub(crate) global_ref_limit: Option<usize>,
    pub(crate) pending: FxHashMap<ThreadId, ThrownException>,
    pub(crate) described: Vec<ThrownException>,
    pub(crate) attached: FxHashSet<ThreadId>,
}

impl HeapState {
    pub(crate) fn class_index(&self, class: ClassRef) -> Option<usize> {
        match self.objects.get(&class.as_obj()) {
            Some(Object::Class(index)) => Some(*index),
            _ => None,
        }
    }

    /// Class of an object, for method dispatch
    pub(crate) fn class_of(&self, obj: ObjectRef) -> Option<usize> {
        match self.objects.get(&obj)? {
            Object::Instance { class, .. } => Some(*class),
            Object::Str(_) => self.class_by_name.get("java/lang/String").copied(),
            _ => None,
        }
    }

    pub(crate) fn live_global_refs(&self) -> usize {
        self.globals.values().sum()
    }
}

#[derive(Default)]
struct Counters {
    critical_violations: AtomicUsize,
    attaches: AtomicUsize,
    detaches: AtomicUsize,
    invalid_global_deletes: AtomicUsize,
    overwritten_exceptions: AtomicUsize,
    failing_views: AtomicUsize,
    refuse_attach: AtomicBool,
}

struct HeapInner {
    state: Mutex<HeapState>,
    next_id: AtomicU64,
    counters: Counters,
}

/// Shared in-process managed heap
#[derive(Clone)]
pub struct ManagedHeap {
    inner: Arc<HeapInner>,
}

impl Default for ManagedHeap {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ManagedHeap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("ManagedHeap")
            .field("objects", &state.objects.len())
            .field("classes", &state.classes.len())
            .field("live_global_refs", &state.live_global_refs())
            .finish()
    }
}

impl ManagedHeap {
    /// Create a heap with the built-in classes, attaching the current
    /// thread as a runtime thread
    pub fn new() -> Self {
        let heap = Self {
            inner: Arc::new(HeapInner {
                state: Mutex::new(HeapState::default()),
                next_id: AtomicU64::new(1),
                counters: Counters::default(),
            }),
        };
        heap.define_builtins();
        heap.state().attached.insert(thread::current().id());
        heap
    }

    fn define_builtins(&self) {
        self.define_class(ClassBuilder::new("java/lang/Object").default_constructor());
        self.define_class(
            ClassBuilder::new("java/lang/String")
                .method("getBytes", "()[B", |env, this, _| {
                    let text = env
                        .heap()
                        .string_value(this)
                        .ok_or_else(|| env.throw("java/lang/IllegalArgumentException", "not a string"))?;
                    let bytes: Vec<i8> = text.bytes().map(|b| b as i8).collect();
                    let array = env.heap().new_array(&bytes);
                    Ok(ManagedValue::Object(Some(array.as_obj())))
                })
                .method("<init>", "([B)V", |env, _, args| {
                    let bytes = match args.first().and_then(ManagedValue::as_object) {
                        Some(Some(bytes)) => env.heap().array_values(ArrayRef::<i8>::from_obj(bytes)),
                        _ => None,
                    };
                    let bytes = bytes
                        .ok_or_else(|| env.throw("java/lang/NullPointerException", "bytes"))?;
                    let raw: Vec<u8> = bytes.into_iter().map(|b| b as u8).collect();
                    let string = env.heap().new_string(&String::from_utf8_lossy(&raw));
                    Ok(ManagedValue::Object(Some(string.as_obj())))
                }),
        );
        for name in BUILTIN_EXCEPTIONS {
            self.define_class(ClassBuilder::new(*name));
        }
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, HeapState> {
        self.inner.state.lock()
    }

    pub(crate) fn alloc(&self, object: Object) -> ObjectRef {
        loop {
            // Skips 0 if the counter ever wraps
            let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
            if let Some(obj) = ObjectRef::from_raw(id) {
                self.state().objects.insert(obj, object);
                return obj;
            }
        }
    }

    // ========================================================================
    // Host helpers
    // ========================================================================

    /// Environment for the current thread, registering it as a runtime
    /// thread if needed (not counted as an attach)
    pub fn current_env(&self) -> HeapEnv {
        self.state().attached.insert(thread::current().id());
        HeapEnv::new(self.clone())
    }

    /// Register a class, replacing any class of the same name
    pub fn define_class(&self, builder: ClassBuilder) -> ClassRef {
        let def = builder.build();
        let name = def.name.clone();
        let index = {
            let mut state = self.state();
            state.classes.push(def);
            state.classes.len() - 1
        };
        let obj = self.alloc(Object::Class(index));
        let mut state = self.state();
        state.class_objects.push(obj);
        state.class_by_name.insert(name, index);
        ClassRef::from_obj(obj)
    }

    /// Allocate an instance of a class without running a constructor
    pub fn new_instance(&self, class_name: &str) -> Option<ObjectRef> {
        let class = *self.state().class_by_name.get(class_name)?;
        Some(self.alloc(Object::Instance {
            class,
            fields: FxHashMap::default(),
        }))
    }

    /// Create a string
    pub fn new_string(&self, text: &str) -> StringRef {
        StringRef::from_obj(self.alloc(Object::Str(text.to_string())))
    }

    /// Contents of a string object
    pub fn string_value(&self, obj: ObjectRef) -> Option<String> {
        match self.state().objects.get(&obj)? {
            Object::Str(text) => Some(text.clone()),
            _ => None,
        }
    }

    /// Create a primitive array holding `values`
    pub fn new_array<T: HeapElement>(&self, values: &[T]) -> ArrayRef<T> {
        ArrayRef::from_obj(self.alloc(Object::Array(T::wrap(values.into()))))
    }

    /// Contents of a primitive array
    pub fn array_values<T: HeapElement>(&self, array: ArrayRef<T>) -> Option<Vec<T>> {
        match self.state().objects.get(&array.as_obj())? {
            Object::Array(elems) => T::slice(elems).map(<[T]>::to_vec),
            _ => None,
        }
    }

    /// Create an object array
    pub fn new_object_array(&self, elements: &[Option<ObjectRef>]) -> ObjectArrayRef {
        ObjectArrayRef::from_obj(self.alloc(Object::ObjectArray(elements.into())))
    }

    /// Value of an instance field (`None` if unset or not an instance)
    pub fn field_value(&self, obj: ObjectRef, name: &str) -> Option<ManagedValue> {
        match self.state().objects.get(&obj)? {
            Object::Instance { fields, .. } => fields.get(name).cloned(),
            _ => None,
        }
    }

    /// Set an instance field
    pub fn set_field_value(&self, obj: ObjectRef, name: &str, value: ManagedValue) -> BridgeResult<()> {
        match self.state().objects.get_mut(&obj) {
            Some(Object::Instance { fields, .. }) => {
                fields.insert(name.to_string(), value);
                Ok(())
            }
            Some(other) => Err(BridgeError::TypeMismatch {
                expected: "instance".to_string(),
                got: other.type_name().to_string(),
            }),
            None => Err(BridgeError::Runtime(format!("no object {:?}", obj))),
        }
    }

    // ========================================================================
    // Exceptions
    // ========================================================================

    pub(crate) fn set_pending(&self, class: &str, message: &str) {
        let exception = ThrownException {
            class: class.to_string(),
            message: message.to_string(),
        };
        let previous = self.state().pending.insert(thread::current().id(), exception);
        if previous.is_some() {
            self.inner
                .counters
                .overwritten_exceptions
                .fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Exception pending on the current thread
    pub fn pending_exception(&self) -> Option<ThrownException> {
        self.state().pending.get(&thread::current().id()).cloned()
    }

    /// Clear the current thread's pending exception, returning it
    pub fn take_pending_exception(&self) -> Option<ThrownException> {
        self.state().pending.remove(&thread::current().id())
    }

    /// Exceptions reported through `exception_describe`, oldest first
    pub fn described_exceptions(&self) -> Vec<ThrownException> {
        self.state().described.clone()
    }

    /// Throws that replaced an exception which was still pending
    pub fn exceptions_overwritten(&self) -> usize {
        self.inner.counters.overwritten_exceptions.load(Ordering::Relaxed)
    }

    // ========================================================================
    // Counters
    // ========================================================================

    /// Durable references created and not yet deleted
    pub fn live_global_refs(&self) -> usize {
        self.state().live_global_refs()
    }

    /// Durable references to `obj`
    pub fn global_refs_to(&self, obj: ObjectRef) -> usize {
        self.state().globals.get(&obj).copied().unwrap_or(0)
    }

    /// Deletions of durable references that did not exist
    pub fn invalid_global_ref_deletes(&self) -> usize {
        self.inner.counters.invalid_global_deletes.load(Ordering::Relaxed)
    }

    pub(crate) fn record_invalid_global_delete(&self) {
        self.inner
            .counters
            .invalid_global_deletes
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Runtime calls made while a critical view was held
    pub fn critical_violations(&self) -> usize {
        self.inner.counters.critical_violations.load(Ordering::Relaxed)
    }

    pub(crate) fn record_critical_violation(&self) {
        self.inner
            .counters
            .critical_violations
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Threads attached through `attach_current_thread`
    pub fn attach_count(&self) -> usize {
        self.inner.counters.attaches.load(Ordering::Relaxed)
    }

    /// Threads detached through `detach_current_thread`
    pub fn detach_count(&self) -> usize {
        self.inner.counters.detaches.load(Ordering::Relaxed)
    }

    /// Whether the current thread is attached
    pub fn is_current_thread_attached(&self) -> bool {
        self.state().attached.contains(&thread::current().id())
    }

    // ========================================================================
    // Fault injection
    // ========================================================================

    /// Make the next `count` view acquisitions fail with a pending
    /// `OutOfMemoryError`
    pub fn fail_view_acquisitions(&self, count: usize) {
        self.inner.counters.failing_views.store(count, Ordering::Relaxed);
    }

    pub(crate) fn take_view_failure(&self) -> bool {
        self.inner
            .counters
            .failing_views
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok()
    }

    /// Refuse durable references once `limit` are live
    pub fn set_global_ref_limit(&self, limit: Option<usize>) {
        self.state().global_ref_limit = limit;
    }

    /// Make `attach_current_thread` fail
    pub fn refuse_attach(&self, refuse: bool) {
        self.inner.counters.refuse_attach.store(refuse, Ordering::Relaxed);
    }
}

impl ManagedVm for ManagedHeap {
    type Env = HeapEnv;

    fn env(&self) -> Option<HeapEnv> {
        self.is_current_thread_attached()
            .then(|| HeapEnv::new(self.clone()))
    }

    fn attach_current_thread(&self) -> BridgeResult<HeapEnv> {
        if self.inner.counters.refuse_attach.load(Ordering::Relaxed) {
            return Err(BridgeError::AttachFailed("attach refused".to_string()));
        }
        if self.state().attached.insert(thread::current().id()) {
            self.inner.counters.attaches.fetch_add(1, Ordering::Relaxed);
        }
        Ok(HeapEnv::new(self.clone()))
    }

    fn detach_current_thread(&self) {
        if self.state().attached.remove(&thread::current().id()) {
            self.inner.counters.detaches.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_helpers() {
        let heap = ManagedHeap::new();
        let s = heap.new_string("hello");
        assert_eq!(heap.string_value(s.as_obj()).as_deref(), Some("hello"));

        let array = heap.new_array(&[1.5f64, 2.5]);
        assert_eq!(heap.array_values(array), Some(vec![1.5, 2.5]));
        assert_eq!(heap.array_values(ArrayRef::<i32>::from_obj(array.as_obj())), None);
    }

    #[test]
    fn test_creator_thread_is_attached() {
        let heap = ManagedHeap::new();
        assert!(heap.env().is_some());
        let other = heap.clone();
        thread::spawn(move || assert!(other.env().is_none()))
            .join()
            .unwrap();
        assert_eq!(heap.attach_count(), 0);
    }

    #[test]
    fn test_attach_and_detach_counted() {
        let heap = ManagedHeap::new();
        let other = heap.clone();
        thread::spawn(move || {
            other.attach_current_thread().unwrap();
            assert!(other.is_current_thread_attached());
            other.detach_current_thread();
            assert!(!other.is_current_thread_attached());
        })
        .join()
        .unwrap();
        assert_eq!(heap.attach_count(), 1);
        assert_eq!(heap.detach_count(), 1);
    }

    #[test]
    fn test_view_failures_are_consumed() {
        let heap = ManagedHeap::new();
        heap.fail_view_acquisitions(2);
        assert!(heap.take_view_failure());
        assert!(heap.take_view_failure());
        assert!(!heap.take_view_failure());
    }
}
