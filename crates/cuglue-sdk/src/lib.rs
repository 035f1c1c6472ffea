//! cuglue SDK - managed-runtime capabilities for the GPU binding layer
//!
//! This crate holds the types and traits that sit on the boundary between a
//! managed runtime and native code, without any bridge logic:
//!
//! - [`ManagedEnv`] / [`ManagedVm`]: what the bridge needs from a runtime
//! - reference types ([`ObjectRef`], [`GlobalRef`], typed array refs)
//! - [`ManagedPrimitive`] and [`Cast`] for array element conversion
//! - [`BridgeError`] / [`BridgeResult`]
//!
//! Runtime bindings implement the traits; `cuglue-core` programs against
//! them.

#![warn(missing_docs)]

pub mod element;
pub mod env;
pub mod error;
pub mod refs;

pub use element::{Cast, ManagedPrimitive, PrimitiveKind, ReleaseMode};
pub use env::{ManagedEnv, ManagedVm};
pub use error::{BridgeError, BridgeResult};
pub use refs::{
    ArrayRef, ClassRef, FieldId, GlobalRef, ManagedValue, MethodId, ObjectArrayRef, ObjectRef,
    StringRef,
};
