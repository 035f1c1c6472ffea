//! Primitive array bridge
//!
//! Converts managed primitive arrays into owned native buffers of any
//! numeric element type and back. Every conversion is a plain `as` cast
//! (see [`Cast`]); there is no range checking.
//!
//! ```text
//! copy_in:  length -> allocate -> view -> cast each element -> release view (no commit)
//! release:  [write back: view -> cast each element -> commit] -> free buffer
//! ```
//!
//! An absent managed array maps to an absent handle and back; that is never
//! an error. The native buffer is freed on every path, including when the
//! write-back view cannot be acquired.

use std::ops::{Deref, DerefMut};

use cuglue_sdk::{
    ArrayRef, BridgeError, BridgeResult, Cast, ManagedEnv, ManagedPrimitive, ObjectArrayRef,
};

use crate::alloc::{self, Allocation};
use crate::bridge::Bridge;
use crate::{log_error, log_trace};
use crate::view::{with_view, ViewStrategy};

/// Owned native buffer converted from a managed array
pub struct NativeArray<N> {
    buf: Vec<N>,
    _ticket: Allocation,
}

impl<N> NativeArray<N> {
    /// Element count
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// True if the buffer has no elements
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Pointer for the native API
    pub fn as_ptr(&self) -> *const N {
        self.buf.as_ptr()
    }

    /// Mutable pointer for native APIs that write results
    pub fn as_mut_ptr(&mut self) -> *mut N {
        self.buf.as_mut_ptr()
    }
}

impl<N> Deref for NativeArray<N> {
    type Target = [N];

    fn deref(&self) -> &[N] {
        &self.buf
    }
}

impl<N> DerefMut for NativeArray<N> {
    fn deref_mut(&mut self) -> &mut [N] {
        &mut self.buf
    }
}

impl<N> std::fmt::Debug for NativeArray<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeArray").field("len", &self.buf.len()).finish()
    }
}

fn allocate_native<N: Copy + Default>(bridge: &Bridge, len: usize) -> BridgeResult<NativeArray<N>> {
    let (buf, ticket) = alloc::allocate(bridge.allocator(), len, N::default())?;
    Ok(NativeArray {
        buf,
        _ticket: ticket,
    })
}

/// Copy a managed array into a new native buffer.
///
/// The view is released without committing, so the managed array is never
/// modified.
pub fn copy_in<E, M, N>(
    bridge: &Bridge,
    env: &mut E,
    source: Option<ArrayRef<M>>,
    strategy: ViewStrategy,
) -> BridgeResult<Option<NativeArray<N>>>
where
    E: ManagedEnv + ?Sized,
    M: ManagedPrimitive + Cast<N>,
    N: Copy + Default,
{
    let Some(source) = source else {
        return Ok(None);
    };
    let len = env.array_length(source.as_obj())?;
    log_trace!("Copying in {} {} elements", len, M::KIND.name());
    let mut native = allocate_native::<N>(bridge, len)?;
    with_view(env, source, strategy, false, |elems| {
        for (dst, src) in native.buf.iter_mut().zip(elems.iter()) {
            *dst = src.cast();
        }
    })?;
    Ok(Some(native))
}

/// Allocate a native buffer sized like `source` without reading it
pub fn alloc_for<E, M, N>(
    bridge: &Bridge,
    env: &mut E,
    source: Option<ArrayRef<M>>,
) -> BridgeResult<Option<NativeArray<N>>>
where
    E: ManagedEnv + ?Sized,
    M: ManagedPrimitive,
    N: Copy + Default,
{
    match source {
        None => Ok(None),
        Some(source) => {
            let len = env.array_length(source.as_obj())?;
            allocate_native(bridge, len).map(Some)
        }
    }
}

/// Free a native buffer, first writing it back into `destination` if
/// `write_back` is set.
///
/// Without a destination the buffer is simply freed. Write-back copies
/// `min(native, managed)` elements.
pub fn release<E, M, N>(
    env: &mut E,
    native: Option<NativeArray<N>>,
    destination: Option<ArrayRef<M>>,
    write_back: bool,
    strategy: ViewStrategy,
) -> BridgeResult<()>
where
    E: ManagedEnv + ?Sized,
    M: ManagedPrimitive,
    N: Copy + Cast<M>,
{
    let (Some(native), Some(destination)) = (native, destination) else {
        return Ok(());
    };
    if !write_back {
        return Ok(());
    }
    with_view(env, destination, strategy, true, |elems| {
        for (dst, src) in elems.iter_mut().zip(native.iter()) {
            *dst = src.cast();
        }
    })
}

/// Convert the contents of `source` into caller-supplied storage.
///
/// Returns the number of elements copied.
pub fn read_contents<E, M, N>(
    env: &mut E,
    source: ArrayRef<M>,
    dest: &mut [N],
    strategy: ViewStrategy,
) -> BridgeResult<usize>
where
    E: ManagedEnv + ?Sized,
    M: ManagedPrimitive + Cast<N>,
{
    with_view(env, source, strategy, false, |elems| {
        for (dst, src) in dest.iter_mut().zip(elems.iter()) {
            *dst = src.cast();
        }
        dest.len().min(elems.len())
    })
}

/// Commit native data into an existing managed array.
///
/// Returns the number of elements written.
pub fn write_contents<E, M, N>(
    env: &mut E,
    dest: ArrayRef<M>,
    src: &[N],
    strategy: ViewStrategy,
) -> BridgeResult<usize>
where
    E: ManagedEnv + ?Sized,
    M: ManagedPrimitive,
    N: Copy + Cast<M>,
{
    with_view(env, dest, strategy, true, |elems| {
        for (dst, value) in elems.iter_mut().zip(src.iter()) {
            *dst = value.cast();
        }
        elems.len().min(src.len())
    })
}

/// Write a single element into a managed array
pub fn set_element<E, M, N>(env: &mut E, array: ArrayRef<M>, index: usize, value: N) -> BridgeResult<()>
where
    E: ManagedEnv + ?Sized,
    M: ManagedPrimitive,
    N: Cast<M>,
{
    let len = env.array_length(array.as_obj())?;
    if index >= len {
        return Err(BridgeError::IndexOutOfBounds { index, len });
    }
    with_view(env, array, ViewStrategy::Critical, true, |elems| {
        elems[index] = value.cast();
    })
}

// ============================================================================
// Nested arrays
// ============================================================================

/// Native pointer table built from an array of primitive arrays.
///
/// Null rows map to null pointers.
pub struct NestedArray<N> {
    rows: Vec<Option<NativeArray<N>>>,
    table: Vec<*mut N>,
    _ticket: Allocation,
}

impl<N> NestedArray<N> {
    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True if there are no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row `index`, `None` for a null row
    pub fn row(&self, index: usize) -> Option<&NativeArray<N>> {
        self.rows.get(index).and_then(Option::as_ref)
    }

    /// The `N**` table for the native API
    pub fn as_ptr(&self) -> *const *mut N {
        self.table.as_ptr()
    }
}

/// Copy each row of a managed array of primitive arrays into native memory
pub fn copy_in_nested<E, M, N>(
    bridge: &Bridge,
    env: &mut E,
    source: Option<ObjectArrayRef>,
    strategy: ViewStrategy,
) -> BridgeResult<Option<NestedArray<N>>>
where
    E: ManagedEnv + ?Sized,
    M: ManagedPrimitive + Cast<N>,
    N: Copy + Default,
{
    let Some(source) = source else {
        return Ok(None);
    };
    let outer = source.as_obj();
    let count = env.array_length(outer)?;
    let (mut table, ticket) = alloc::allocate(bridge.allocator(), count, std::ptr::null_mut::<N>())?;
    let mut rows = Vec::with_capacity(count);
    for (index, slot) in table.iter_mut().enumerate() {
        let mut row = match env.object_array_element(outer, index)? {
            None => None,
            Some(element) => {
                let copied = copy_in::<E, M, N>(bridge, env, Some(ArrayRef::from_obj(element)), strategy);
                env.delete_local_ref(element);
                copied?
            }
        };
        if let Some(row) = &mut row {
            *slot = row.buf.as_mut_ptr();
        }
        rows.push(row);
    }
    Ok(Some(NestedArray {
        rows,
        table,
        _ticket: ticket,
    }))
}

/// Free a nested array, writing rows back into `destination` if requested.
///
/// Write-back stops at the first failing row, since the runtime then has an
/// exception pending. Rows not yet written back are freed without touching
/// the runtime.
pub fn release_nested<E, M, N>(
    env: &mut E,
    nested: Option<NestedArray<N>>,
    destination: Option<ObjectArrayRef>,
    write_back: bool,
    strategy: ViewStrategy,
) -> BridgeResult<()>
where
    E: ManagedEnv + ?Sized,
    M: ManagedPrimitive,
    N: Copy + Cast<M>,
{
    let (Some(nested), Some(destination)) = (nested, destination) else {
        return Ok(());
    };
    if !write_back {
        return Ok(());
    }
    let outer = destination.as_obj();
    for (index, row) in nested.rows.into_iter().enumerate() {
        let Some(row) = row else { continue };
        let Some(element) = env.object_array_element(outer, index)? else {
            continue;
        };
        let result = release(env, Some(row), Some(ArrayRef::<M>::from_obj(element)), true, strategy);
        env.delete_local_ref(element);
        if let Err(err) = result {
            log_error!("Writing back row {} of a nested array failed: {}", index, err);
            return Err(err);
        }
    }
    Ok(())
}
