//! String bridge
//!
//! Managed strings are converted with the runtime's own `getBytes()`, so the
//! native bytes use the platform default encoding exactly as managed code
//! would see it. Native strings are owned, NUL-terminated copies.

use std::ffi::{c_char, CStr};

use cuglue_sdk::{
    ArrayRef, BridgeError, BridgeResult, ManagedEnv, ManagedValue, ObjectArrayRef, ObjectRef,
    PrimitiveKind, StringRef,
};

use crate::alloc::{self, Allocation};
use crate::array::write_contents;
use crate::bridge::Bridge;
use crate::log_trace;
use crate::view::{with_view, ViewStrategy};

/// Owned NUL-terminated native copy of a managed string
pub struct NativeString {
    bytes: Vec<u8>,
    _ticket: Allocation,
}

impl NativeString {
    /// Length in bytes, excluding the terminator
    pub fn len(&self) -> usize {
        self.bytes.len() - 1
    }

    /// True for the empty string
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes without the terminator
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len()]
    }

    /// Pointer to the NUL-terminated bytes
    pub fn as_ptr(&self) -> *const c_char {
        self.bytes.as_ptr().cast()
    }

    /// The string up to its first NUL byte
    pub fn as_c_str(&self) -> &CStr {
        CStr::from_bytes_until_nul(&self.bytes).unwrap_or_default()
    }
}

impl std::fmt::Debug for NativeString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("NativeString")
            .field(&String::from_utf8_lossy(self.as_bytes()))
            .finish()
    }
}

/// Convert a managed string into an owned native string.
///
/// A null string maps to `None`.
pub fn to_native<E: ManagedEnv + ?Sized>(
    bridge: &Bridge,
    env: &mut E,
    string: Option<StringRef>,
) -> BridgeResult<Option<NativeString>> {
    let Some(string) = string else {
        return Ok(None);
    };
    let handles = bridge.handles();
    let bytes = match env.call_method(string.as_obj(), handles.string_get_bytes(), &[])? {
        ManagedValue::Object(Some(bytes)) => bytes,
        other => {
            return Err(BridgeError::TypeMismatch {
                expected: "byte[]".to_string(),
                got: other.type_name().to_string(),
            })
        }
    };
    let converted = copy_bytes(bridge, env, bytes);
    env.delete_local_ref(bytes);
    converted.map(Some)
}

fn copy_bytes<E: ManagedEnv + ?Sized>(
    bridge: &Bridge,
    env: &mut E,
    bytes: ObjectRef,
) -> BridgeResult<NativeString> {
    let len = env.array_length(bytes)?;
    let (mut buf, ticket) = alloc::allocate(bridge.allocator(), len + 1, 0u8)?;
    with_view(env, ArrayRef::<i8>::from_obj(bytes), ViewStrategy::Critical, false, |elems| {
        for (dst, src) in buf.iter_mut().zip(elems.iter()) {
            *dst = *src as u8;
        }
    })?;
    Ok(NativeString {
        bytes: buf,
        _ticket: ticket,
    })
}

/// Owned native copies of a managed string array, with a NULL-terminated
/// pointer table
pub struct NativeStringArray {
    // Field order is drop order: elements before the table.
    strings: Vec<NativeString>,
    pointers: Vec<*const c_char>,
    _ticket: Allocation,
}

impl NativeStringArray {
    /// Number of strings
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    /// True if there are no strings
    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    /// String at `index`
    pub fn get(&self, index: usize) -> Option<&NativeString> {
        self.strings.get(index)
    }

    /// Iterate over the strings
    pub fn iter(&self) -> std::slice::Iter<'_, NativeString> {
        self.strings.iter()
    }

    /// The `char**` table; `len()` pointers followed by NULL
    pub fn as_ptr(&self) -> *const *const c_char {
        self.pointers.as_ptr()
    }
}

/// Convert every element of a managed string array.
///
/// Null elements are rejected. On any failure the strings converted so far
/// and the table are freed before the error is returned.
pub fn to_native_array<E: ManagedEnv + ?Sized>(
    bridge: &Bridge,
    env: &mut E,
    array: Option<ObjectArrayRef>,
) -> BridgeResult<Option<NativeStringArray>> {
    let Some(array) = array else {
        return Ok(None);
    };
    let outer = array.as_obj();
    let count = env.array_length(outer)?;
    log_trace!("Converting string array of length {}", count);
    let (mut pointers, ticket) = alloc::allocate(bridge.allocator(), count + 1, std::ptr::null())?;
    let mut strings = Vec::with_capacity(count);
    for index in 0..count {
        let element = env
            .object_array_element(outer, index)?
            .ok_or(BridgeError::NullElement { index })?;
        let converted = to_native(bridge, env, Some(StringRef::from_obj(element)));
        env.delete_local_ref(element);
        let native = converted?.ok_or(BridgeError::NullElement { index })?;
        pointers[index] = native.as_ptr();
        strings.push(native);
    }
    Ok(Some(NativeStringArray {
        strings,
        pointers,
        _ticket: ticket,
    }))
}

/// Free a native string array, elements first. `None` is a no-op.
pub fn release_string_array(array: Option<NativeStringArray>) {
    if let Some(array) = array {
        log_trace!("Releasing string array of length {}", array.len());
        drop(array);
    }
}

/// Build a managed string from native bytes with `new String(byte[])`
pub fn from_native<E: ManagedEnv + ?Sized>(
    bridge: &Bridge,
    env: &mut E,
    bytes: &[u8],
) -> BridgeResult<StringRef> {
    let handles = bridge.handles();
    let array = env.new_primitive_array(PrimitiveKind::Byte, bytes.len())?;
    let result = write_contents(env, ArrayRef::<i8>::from_obj(array), bytes, ViewStrategy::Critical)
        .and_then(|_| {
            env.new_object(
                handles.string_class(),
                handles.string_from_bytes(),
                &[ManagedValue::Object(Some(array))],
            )
        });
    env.delete_local_ref(array);
    result.map(StringRef::from_obj)
}
