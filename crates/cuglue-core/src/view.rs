//! Scoped views of managed primitive arrays
//!
//! Two acquisition strategies:
//!
//! - [`CriticalView`]: direct, zero-copy access. While it is alive the
//!   runtime may have paused other activity (GC, other threads), so no
//!   runtime call is allowed. The view holds the environment by `&mut`
//!   and exposes no way to reach it, so calling the runtime inside the
//!   region does not compile.
//! - [`ElementsView`]: possibly a copy; the environment stays reachable
//!   through [`ElementsView::env`].
//!
//! Both release on drop without committing. Call `commit` to persist
//! changes into the managed array.

use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;

use cuglue_sdk::{ArrayRef, BridgeError, BridgeResult, ManagedEnv, ManagedPrimitive, ObjectRef, ReleaseMode};

/// Which view an array operation uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewStrategy {
    /// Zero-copy critical region; only for call sites that make no runtime
    /// call while the view is open
    #[default]
    Critical,
    /// Standard element retrieval
    Elements,
}

/// Zero-copy view of a managed array inside a critical region
pub struct CriticalView<'e, E: ManagedEnv + ?Sized, T: ManagedPrimitive> {
    env: &'e mut E,
    array: ObjectRef,
    elems: NonNull<T>,
    len: usize,
    mode: ReleaseMode,
}

impl<'e, E: ManagedEnv + ?Sized, T: ManagedPrimitive> CriticalView<'e, E, T> {
    /// Enter the critical region for `array`
    pub fn acquire(env: &'e mut E, array: ArrayRef<T>) -> BridgeResult<Self> {
        let obj = array.as_obj();
        let len = env.array_length(obj)?;
        let elems = env
            .acquire_critical(obj, T::KIND)
            .ok_or(BridgeError::ViewAcquisition)?;
        Ok(Self {
            env,
            array: obj,
            elems: elems.cast(),
            len,
            mode: ReleaseMode::Abort,
        })
    }

    /// Leave the region, persisting changes
    pub fn commit(mut self) {
        self.mode = ReleaseMode::Commit;
    }
}

impl<E: ManagedEnv + ?Sized, T: ManagedPrimitive> Deref for CriticalView<'_, E, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        unsafe { std::slice::from_raw_parts(self.elems.as_ptr(), self.len) }
    }
}

impl<E: ManagedEnv + ?Sized, T: ManagedPrimitive> DerefMut for CriticalView<'_, E, T> {
    fn deref_mut(&mut self) -> &mut [T] {
        unsafe { std::slice::from_raw_parts_mut(self.elems.as_ptr(), self.len) }
    }
}

impl<E: ManagedEnv + ?Sized, T: ManagedPrimitive> Drop for CriticalView<'_, E, T> {
    fn drop(&mut self) {
        unsafe {
            self.env
                .release_critical(self.array, self.elems.cast(), self.mode)
        };
    }
}

/// View of a managed array obtained through standard element retrieval
pub struct ElementsView<'e, E: ManagedEnv + ?Sized, T: ManagedPrimitive> {
    env: &'e mut E,
    array: ObjectRef,
    elems: NonNull<T>,
    len: usize,
    mode: ReleaseMode,
}

impl<'e, E: ManagedEnv + ?Sized, T: ManagedPrimitive> ElementsView<'e, E, T> {
    /// Retrieve the elements of `array`
    pub fn acquire(env: &'e mut E, array: ArrayRef<T>) -> BridgeResult<Self> {
        let obj = array.as_obj();
        let len = env.array_length(obj)?;
        let elems = env
            .acquire_elements(obj, T::KIND)
            .ok_or(BridgeError::ViewAcquisition)?;
        Ok(Self {
            env,
            array: obj,
            elems: elems.cast(),
            len,
            mode: ReleaseMode::Abort,
        })
    }

    /// The environment, usable while the view is held
    pub fn env(&mut self) -> &mut E {
        self.env
    }

    /// Release the view, copying changes back into the managed array
    pub fn commit(mut self) {
        self.mode = ReleaseMode::Commit;
    }
}

impl<E: ManagedEnv + ?Sized, T: ManagedPrimitive> Deref for ElementsView<'_, E, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        unsafe { std::slice::from_raw_parts(self.elems.as_ptr(), self.len) }
    }
}

impl<E: ManagedEnv + ?Sized, T: ManagedPrimitive> DerefMut for ElementsView<'_, E, T> {
    fn deref_mut(&mut self) -> &mut [T] {
        unsafe { std::slice::from_raw_parts_mut(self.elems.as_ptr(), self.len) }
    }
}

impl<E: ManagedEnv + ?Sized, T: ManagedPrimitive> Drop for ElementsView<'_, E, T> {
    fn drop(&mut self) {
        unsafe {
            self.env
                .release_elements(self.array, self.elems.cast(), self.mode)
        };
    }
}

/// Run `f` over the elements of `array` with the chosen strategy.
///
/// The closure only sees the slice, so it cannot call the runtime even on
/// the elements path. With `commit` the changes are persisted; otherwise the
/// view is released without touching the managed array.
pub fn with_view<E, T, R>(
    env: &mut E,
    array: ArrayRef<T>,
    strategy: ViewStrategy,
    commit: bool,
    f: impl FnOnce(&mut [T]) -> R,
) -> BridgeResult<R>
where
    E: ManagedEnv + ?Sized,
    T: ManagedPrimitive,
{
    match strategy {
        ViewStrategy::Critical => {
            let mut view = CriticalView::acquire(env, array)?;
            let result = f(&mut view);
            if commit {
                view.commit();
            }
            Ok(result)
        }
        ViewStrategy::Elements => {
            let mut view = ElementsView::acquire(env, array)?;
            let result = f(&mut view);
            if commit {
                view.commit();
            }
            Ok(result)
        }
    }
}
