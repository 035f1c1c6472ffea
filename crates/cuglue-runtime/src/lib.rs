//! cuglue runtime - an in-process managed heap
//!
//! Implements `ManagedVm` and `ManagedEnv` over a simple object table with
//! classes, strings, primitive and object arrays, durable references,
//! per-thread pending exceptions and thread attachment. Embedding hosts
//! without an external VM use it directly; the bridge's tests use it to
//! observe reference counts, critical-region discipline and attach/detach
//! behavior.

#![warn(missing_docs)]

pub mod class;
pub mod env;
pub mod heap;
pub mod object;

pub use class::{ClassBuilder, MethodBody};
pub use env::HeapEnv;
pub use heap::{ManagedHeap, BUILTIN_EXCEPTIONS};
pub use object::{HeapElement, PrimitiveArray, ThrownException};
