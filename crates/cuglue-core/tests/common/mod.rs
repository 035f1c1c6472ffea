//! Shared fixtures for the bridge integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use cuglue_core::{Bridge, BridgeOptions, CallbackInterface, NativeAllocator, TrackingAllocator};
use cuglue_runtime::{ClassBuilder, HeapEnv, ManagedHeap};
use cuglue_sdk::{BridgeError, ManagedValue};

pub const STREAM_SIGNATURE: &str = "(Ljcuda/driver/CUstream;ILjava/lang/Object;)V";
pub const HOST_FN_SIGNATURE: &str = "(Ljava/lang/Object;)V";
pub const POINTER_CLASS: &str = "jcuda/NativePointerObject";

/// Heap with the callback interfaces, a recording implementation of both,
/// a throwing implementation and a native pointer class
pub fn heap() -> ManagedHeap {
    let heap = ManagedHeap::new();
    heap.define_class(
        ClassBuilder::new("jcuda/driver/CUstreamCallback").abstract_method("call", STREAM_SIGNATURE),
    );
    heap.define_class(ClassBuilder::new("jcuda/driver/CUhostFn").abstract_method("call", HOST_FN_SIGNATURE));
    heap.define_class(ClassBuilder::new("jcuda/driver/CUstream").default_constructor());
    heap.define_class(
        ClassBuilder::new("test/Recorder")
            .method("call", STREAM_SIGNATURE, |env, this, args| {
                record_call(env, this)?;
                let heap = env.heap();
                heap.set_field_value(this, "stream", args[0])?;
                heap.set_field_value(this, "status", args[1])?;
                heap.set_field_value(this, "userData", args[2])?;
                Ok(ManagedValue::Void)
            })
            .method("call", HOST_FN_SIGNATURE, |env, this, args| {
                record_call(env, this)?;
                env.heap().set_field_value(this, "userData", args[0])?;
                Ok(ManagedValue::Void)
            }),
    );
    heap.define_class(
        ClassBuilder::new("test/Thrower").method("call", HOST_FN_SIGNATURE, |env, _, _| {
            Err(env.throw("java/lang/RuntimeException", "callback failed"))
        }),
    );
    heap.define_class(ClassBuilder::new(POINTER_CLASS).field("nativePointer", "J"));
    heap
}

fn record_call(env: &mut HeapEnv, this: cuglue_sdk::ObjectRef) -> Result<(), BridgeError> {
    let heap = env.heap();
    let calls = heap
        .field_value(this, "calls")
        .and_then(|v| v.as_long())
        .unwrap_or(0);
    heap.set_field_value(this, "calls", ManagedValue::Long(calls + 1))
}

/// Number of times a recorder's `call` ran
pub fn calls(heap: &ManagedHeap, recorder: cuglue_sdk::ObjectRef) -> i64 {
    heap.field_value(recorder, "calls")
        .and_then(|v| v.as_long())
        .unwrap_or(0)
}

/// Options resolving both callback interfaces and the pointer class
pub fn options(allocator: Arc<dyn NativeAllocator>) -> BridgeOptions {
    BridgeOptions {
        native_pointer_class: Some(POINTER_CLASS.to_string()),
        callbacks: vec![CallbackInterface::stream_callback(), CallbackInterface::host_fn()],
        allocator,
        ..BridgeOptions::default()
    }
}

/// Heap, main-thread environment, bridge and its allocation tracker
pub fn setup() -> (ManagedHeap, HeapEnv, Bridge, Arc<TrackingAllocator>) {
    let tracker = Arc::new(TrackingAllocator::new());
    let (heap, env, bridge) = setup_with(tracker.clone());
    (heap, env, bridge, tracker)
}

pub fn setup_with(allocator: Arc<dyn NativeAllocator>) -> (ManagedHeap, HeapEnv, Bridge) {
    let heap = heap();
    let mut env = heap.current_env();
    let bridge = Bridge::initialize(&mut env, options(allocator)).unwrap();
    (heap, env, bridge)
}

/// Tracking allocator that refuses its `fail_on`-th reservation (1-based)
pub struct FailingAllocator {
    pub inner: TrackingAllocator,
    reservations: AtomicUsize,
    fail_on: usize,
}

impl FailingAllocator {
    pub fn new(fail_on: usize) -> Self {
        Self {
            inner: TrackingAllocator::new(),
            reservations: AtomicUsize::new(0),
            fail_on,
        }
    }
}

impl NativeAllocator for FailingAllocator {
    fn reserve(&self, bytes: usize) -> bool {
        let n = self.reservations.fetch_add(1, Ordering::SeqCst) + 1;
        n != self.fail_on && self.inner.reserve(bytes)
    }

    fn release(&self, bytes: usize) {
        self.inner.release(bytes);
    }
}
