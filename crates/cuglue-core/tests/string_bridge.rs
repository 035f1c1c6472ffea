//! String Bridge Tests
//!
//! Managed strings to NUL-terminated native bytes and back, plus string
//! arrays and their cleanup when a conversion fails part way.
//!
//! # Running Tests
//! ```bash
//! cargo test -p cuglue-core --test string_bridge
//! ```

mod common;

use std::ffi::CStr;
use std::sync::Arc;

use cuglue_core::string::{from_native, release_string_array, to_native, to_native_array};
use cuglue_core::BridgeError;
use cuglue_sdk::ManagedEnv;

// ===== Single strings =====

#[test]
fn test_ascii_round_trip() {
    let (heap, mut env, bridge, tracker) = common::setup();
    let managed = heap.new_string("kernel_main");

    let native = to_native(&bridge, &mut env, Some(managed)).unwrap().unwrap();
    assert_eq!(native.len(), 11);
    assert_eq!(native.as_bytes(), b"kernel_main\0");
    assert_eq!(native.as_c_str().to_str().unwrap(), "kernel_main");
    assert_eq!(tracker.live_buffers(), 1);

    let back = from_native(&bridge, &mut env, native.as_c_str().to_bytes()).unwrap();
    assert_eq!(heap.string_value(back.as_obj()), Some("kernel_main".to_string()));

    drop(native);
    assert_eq!(tracker.live_buffers(), 0);
}

#[test]
fn test_multibyte_round_trip() {
    let (heap, mut env, bridge, _) = common::setup();
    let managed = heap.new_string("héllo ✓");

    let native = to_native(&bridge, &mut env, Some(managed)).unwrap().unwrap();
    assert_eq!(native.len(), "héllo ✓".len());
    let c_str = unsafe { CStr::from_ptr(native.as_ptr()) };
    assert_eq!(c_str.to_str().unwrap(), "héllo ✓");

    let back = from_native(&bridge, &mut env, c_str.to_bytes()).unwrap();
    assert_eq!(heap.string_value(back.as_obj()), Some("héllo ✓".to_string()));
}

#[test]
fn test_empty_string() {
    let (heap, mut env, bridge, _) = common::setup();
    let native = to_native(&bridge, &mut env, Some(heap.new_string("")))
        .unwrap()
        .unwrap();
    assert!(native.is_empty());
    assert_eq!(native.as_bytes(), b"\0");
}

#[test]
fn test_null_string_is_absent() {
    let (_heap, mut env, bridge, tracker) = common::setup();
    assert!(to_native(&bridge, &mut env, None).unwrap().is_none());
    assert_eq!(tracker.live_buffers(), 0);
    assert!(!env.exception_check());
}

#[test]
fn test_string_allocation_failure() {
    let allocator = Arc::new(common::FailingAllocator::new(1));
    let (heap, mut env, bridge) = common::setup_with(allocator.clone());
    let managed = heap.new_string("abc");

    let native = bridge.guard(&mut env, |env| to_native(&bridge, env, Some(managed)));
    assert!(native.is_none());
    assert_eq!(
        heap.take_pending_exception().map(|e| e.class),
        Some("java/lang/OutOfMemoryError".to_string())
    );
    assert_eq!(allocator.inner.live_buffers(), 0);
}

// ===== String arrays =====

#[test]
fn test_string_array_table() {
    let (heap, mut env, bridge, tracker) = common::setup();
    let names = ["-arch", "sm_80", "-O3"];
    let elements: Vec<_> = names.iter().map(|n| Some(heap.new_string(n).as_obj())).collect();
    let array = heap.new_object_array(&elements);

    let native = to_native_array(&bridge, &mut env, Some(array)).unwrap().unwrap();
    assert_eq!(native.len(), 3);
    assert_eq!(tracker.live_buffers(), 4);

    let table = native.as_ptr();
    for (index, name) in names.iter().enumerate() {
        let entry = unsafe { CStr::from_ptr(*table.add(index)) };
        assert_eq!(entry.to_str().unwrap(), *name);
        assert_eq!(native.get(index).unwrap().as_c_str(), entry);
    }
    assert!(unsafe { *table.add(3) }.is_null());

    release_string_array(Some(native));
    assert_eq!(tracker.live_buffers(), 0);
}

#[test]
fn test_empty_string_array() {
    let (heap, mut env, bridge, _) = common::setup();
    let array = heap.new_object_array(&[]);
    let native = to_native_array(&bridge, &mut env, Some(array)).unwrap().unwrap();
    assert!(native.is_empty());
    assert!(unsafe { *native.as_ptr() }.is_null());
}

#[test]
fn test_partial_failure_frees_converted_strings() {
    // Reservations: table, s0, s1, then s2 is refused
    let allocator = Arc::new(common::FailingAllocator::new(4));
    let (heap, mut env, bridge) = common::setup_with(allocator.clone());
    let elements: Vec<_> = (0..5)
        .map(|i| Some(heap.new_string(&format!("option{}", i)).as_obj()))
        .collect();
    let array = heap.new_object_array(&elements);

    let result = to_native_array(&bridge, &mut env, Some(array));
    assert!(matches!(result, Err(BridgeError::Allocation { .. })));
    assert_eq!(allocator.inner.live_buffers(), 0);
    assert_eq!(allocator.inner.live_bytes(), 0);

    // Raised at the wrapper boundary it becomes OutOfMemoryError
    bridge.guard(&mut env, |_| result.map(drop));
    assert_eq!(
        heap.take_pending_exception().map(|e| e.class),
        Some("java/lang/OutOfMemoryError".to_string())
    );
}

#[test]
fn test_null_element_raises_null_pointer() {
    let (heap, mut env, bridge, tracker) = common::setup();
    let first = heap.new_string("first").as_obj();
    let array = heap.new_object_array(&[Some(first), None]);

    let result = to_native_array(&bridge, &mut env, Some(array));
    assert_eq!(result.err(), Some(BridgeError::NullElement { index: 1 }));
    assert_eq!(tracker.live_buffers(), 0);

    let native = bridge.guard(&mut env, |env| to_native_array(&bridge, env, Some(array)));
    assert!(native.is_none());
    assert_eq!(
        heap.take_pending_exception().map(|e| e.class),
        Some("java/lang/NullPointerException".to_string())
    );
}

#[test]
fn test_release_absent_string_array() {
    let (_heap, mut env, bridge, tracker) = common::setup();
    let native = to_native_array(&bridge, &mut env, None).unwrap();
    assert!(native.is_none());
    release_string_array(native);
    assert_eq!(tracker.live_buffers(), 0);
}
