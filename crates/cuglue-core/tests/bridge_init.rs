//! Bridge Initialization Tests
//!
//! Handle resolution, the error-to-exception boundary and the process-wide
//! bridge.
//!
//! # Running Tests
//! ```bash
//! cargo test -p cuglue-core --test bridge_init
//! ```

mod common;

use std::sync::Arc;

use cuglue_core::handles::resolve_constructor;
use cuglue_core::{
    global, init, Bridge, BridgeError, BridgeOptions, CallbackInterface, ExceptionClasses, TrackingAllocator,
};
use cuglue_runtime::{ClassBuilder, ManagedHeap};
use cuglue_sdk::{ManagedEnv, ManagedValue};

fn pending_class(heap: &ManagedHeap) -> Option<String> {
    heap.pending_exception().map(|e| e.class)
}

// ===== Handle resolution =====

#[test]
fn test_resolves_every_configured_handle() {
    let (heap, mut env, bridge, _) = common::setup();
    let handles = bridge.handles();
    assert!(handles.native_pointer().is_some());
    assert!(handles.callback("stream_callback").is_some());
    assert!(handles.callback("host_fn").is_some());
    assert!(handles.callback("graph_callback").is_none());
    assert_eq!(handles.callback("host_fn").unwrap().name(), "host_fn");

    // String class plus one reference per callback interface
    assert_eq!(heap.live_global_refs(), 3);
    bridge.shutdown(&mut env);
    assert_eq!(heap.live_global_refs(), 0);
    assert_eq!(heap.invalid_global_ref_deletes(), 0);
}

#[test]
fn test_missing_class_leaves_nothing_pinned() {
    let heap = common::heap();
    let mut env = heap.current_env();
    let mut options = common::options(Arc::new(TrackingAllocator::new()));
    options
        .callbacks
        .push(CallbackInterface::new("graph_callback", "jcuda/driver/CUgraphCallback", "call", "()V"));

    let result = Bridge::initialize(&mut env, options);
    assert!(matches!(result, Err(BridgeError::Resolution { .. })));
    assert_eq!(heap.live_global_refs(), 0);
    // The runtime's own lookup failure stays pending
    assert_eq!(pending_class(&heap), Some("java/lang/NoClassDefFoundError".to_string()));
}

#[test]
fn test_missing_method_leaves_nothing_pinned() {
    let heap = common::heap();
    let mut env = heap.current_env();
    let options = BridgeOptions {
        callbacks: vec![CallbackInterface::new(
            "stream_callback",
            "jcuda/driver/CUstreamCallback",
            "call",
            "(I)V",
        )],
        ..BridgeOptions::default()
    };

    assert!(Bridge::initialize(&mut env, options).is_err());
    assert_eq!(heap.live_global_refs(), 0);
    assert_eq!(pending_class(&heap), Some("java/lang/NoSuchMethodError".to_string()));
}

#[test]
fn test_missing_pointer_field() {
    let heap = common::heap();
    heap.define_class(ClassBuilder::new("test/NoPointer").field("handle", "J"));
    let mut env = heap.current_env();
    let options = BridgeOptions {
        native_pointer_class: Some("test/NoPointer".to_string()),
        ..BridgeOptions::default()
    };

    assert!(Bridge::initialize(&mut env, options).is_err());
    assert_eq!(heap.live_global_refs(), 0);
    assert_eq!(pending_class(&heap), Some("java/lang/NoSuchFieldError".to_string()));
}

#[test]
fn test_resolve_constructor_builds_objects() {
    let heap = common::heap();
    let mut env = heap.current_env();
    let (class, constructor) = resolve_constructor(&mut env, "java/lang/String", "([B)V").unwrap();

    let bytes = heap.new_array(&[b'o' as i8, b'k' as i8]);
    let string = env
        .new_object(class, constructor, &[ManagedValue::Object(Some(bytes.as_obj()))])
        .unwrap();
    env.delete_local_ref(class.as_obj());
    assert_eq!(heap.string_value(string).as_deref(), Some("ok"));
    assert!(heap.pending_exception().is_none());
}

#[test]
fn test_resolve_constructor_missing_signature() {
    let heap = common::heap();
    let mut env = heap.current_env();
    let result = resolve_constructor(&mut env, "java/lang/String", "(I)V");
    assert!(matches!(result, Err(BridgeError::Resolution { .. })));
    assert_eq!(pending_class(&heap), Some("java/lang/NoSuchMethodError".to_string()));
}

#[test]
fn test_resolve_constructor_missing_class() {
    let heap = common::heap();
    let mut env = heap.current_env();
    let result = resolve_constructor(&mut env, "jcuda/driver/CUevent", "()V");
    assert!(matches!(result, Err(BridgeError::Resolution { .. })));
    assert_eq!(pending_class(&heap), Some("java/lang/NoClassDefFoundError".to_string()));
}

// ===== Native pointers =====

#[test]
fn test_native_pointer_get_and_set() {
    let (heap, mut env, bridge, _) = common::setup();
    let pointer = heap.new_instance(common::POINTER_CLASS).unwrap();
    let handles = bridge.handles();

    assert_eq!(handles.get_native_pointer(&mut env, Some(pointer)).unwrap(), 0);
    handles.set_native_pointer(&mut env, pointer, 0x7f00_dead_beef).unwrap();
    assert_eq!(handles.get_native_pointer(&mut env, Some(pointer)).unwrap(), 0x7f00_dead_beef);
    assert_eq!(handles.get_native_pointer(&mut env, None).unwrap(), 0);
}

#[test]
fn test_native_pointer_without_configured_class() {
    let heap = common::heap();
    let mut env = heap.current_env();
    let bridge = Bridge::initialize(&mut env, BridgeOptions::default()).unwrap();
    let pointer = heap.new_instance(common::POINTER_CLASS).unwrap();

    let value = bridge.guard(&mut env, |env| bridge.handles().get_native_pointer(env, Some(pointer)));
    assert_eq!(value, 0);
    assert_eq!(pending_class(&heap), Some("java/lang/RuntimeException".to_string()));
}

// ===== Error boundary =====

#[test]
fn test_guard_maps_errors_to_exceptions() {
    let (heap, mut env, bridge, _) = common::setup();
    let cases = [
        (BridgeError::Allocation { bytes: 64 }, "java/lang/OutOfMemoryError"),
        (BridgeError::NullElement { index: 0 }, "java/lang/NullPointerException"),
        (
            BridgeError::IndexOutOfBounds { index: 4, len: 4 },
            "java/lang/ArrayIndexOutOfBoundsException",
        ),
        (
            BridgeError::TypeMismatch {
                expected: "byte[]".into(),
                got: "int".into(),
            },
            "java/lang/IllegalArgumentException",
        ),
        (BridgeError::Runtime("cuInit failed".into()), "java/lang/RuntimeException"),
    ];
    for (err, class) in cases {
        let message = err.to_string();
        let value: i64 = bridge.guard(&mut env, |_| Err(err));
        assert_eq!(value, 0);
        let thrown = heap.take_pending_exception().unwrap();
        assert_eq!(thrown.class, class);
        assert_eq!(thrown.message, message);
    }
}

#[test]
fn test_guard_passes_values_through() {
    let (heap, mut env, bridge, _) = common::setup();
    let value = bridge.guard(&mut env, |_| Ok(42u64));
    assert_eq!(value, 42);
    assert!(heap.pending_exception().is_none());
}

#[test]
fn test_guard_never_overwrites_pending_exception() {
    let (heap, mut env, bridge, _) = common::setup();
    let _ = env.find_class("jcuda/driver/Missing");
    assert_eq!(pending_class(&heap), Some("java/lang/NoClassDefFoundError".to_string()));

    bridge.guard(&mut env, |_| Err::<(), _>(BridgeError::Allocation { bytes: 8 }));
    assert_eq!(pending_class(&heap), Some("java/lang/NoClassDefFoundError".to_string()));
    assert_eq!(heap.exceptions_overwritten(), 0);
}

#[test]
fn test_custom_exception_classes() {
    let heap = common::heap();
    heap.define_class(ClassBuilder::new("jcuda/CudaException"));
    let mut env = heap.current_env();
    let options = BridgeOptions {
        exceptions: ExceptionClasses {
            runtime: "jcuda/CudaException".to_string(),
            ..ExceptionClasses::default()
        },
        ..BridgeOptions::default()
    };
    let bridge = Bridge::initialize(&mut env, options).unwrap();

    bridge.guard(&mut env, |_| Err::<(), _>(BridgeError::Runtime("launch failed".into())));
    assert_eq!(pending_class(&heap), Some("jcuda/CudaException".to_string()));
}

// ===== Process-wide bridge =====

#[test]
fn test_init_installs_once() {
    let heap = common::heap();
    let mut env = heap.current_env();

    let installed = init(&mut env, common::options(Arc::new(TrackingAllocator::new()))).unwrap();
    let refs = heap.live_global_refs();
    assert!(Arc::ptr_eq(&installed, &global().unwrap()));

    let second = init(&mut env, common::options(Arc::new(TrackingAllocator::new())));
    assert_eq!(second.err(), Some(BridgeError::AlreadyInitialized));
    // The rejected bridge released what it resolved
    assert_eq!(heap.live_global_refs(), refs);
    assert!(Arc::ptr_eq(&installed, &global().unwrap()));
}
