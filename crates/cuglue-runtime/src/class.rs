//! Class definitions
//!
//! Classes are declared with a [`ClassBuilder`] and registered through
//! `ManagedHeap::define_class`. A method either has a Rust body or is
//! abstract (interface methods). Calls dispatch on the receiver's class by
//! name and signature, so any class declaring `call(Ljava/lang/Object;)V`
//! can be invoked through an interface method id with that shape.

use std::fmt;
use std::sync::Arc;

use cuglue_sdk::{BridgeResult, ManagedValue, ObjectRef};

use crate::env::HeapEnv;

/// Body of a heap method: `(env, this, args) -> result`.
///
/// A constructor (`<init>`) body may return an object to be used instead of
/// the freshly allocated instance.
pub type MethodBody =
    Arc<dyn Fn(&mut HeapEnv, ObjectRef, &[ManagedValue]) -> BridgeResult<ManagedValue> + Send + Sync>;

pub(crate) struct MethodDef {
    pub(crate) name: String,
    pub(crate) signature: String,
    pub(crate) body: Option<MethodBody>,
}

impl fmt::Debug for MethodDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDef")
            .field("name", &self.name)
            .field("signature", &self.signature)
            .field("abstract", &self.body.is_none())
            .finish()
    }
}

#[derive(Debug)]
pub(crate) struct ClassDef {
    pub(crate) name: String,
    pub(crate) fields: Vec<(String, String)>,
    pub(crate) methods: Vec<MethodDef>,
}

impl ClassDef {
    pub(crate) fn field(&self, name: &str, signature: &str) -> bool {
        self.fields.iter().any(|(n, s)| n == name && s == signature)
    }

    pub(crate) fn method(&self, name: &str, signature: &str) -> Option<&MethodDef> {
        self.methods
            .iter()
            .find(|m| m.name == name && m.signature == signature)
    }
}

/// Declares a heap class
pub struct ClassBuilder {
    def: ClassDef,
}

impl ClassBuilder {
    /// Start a class with its internal name, e.g. `jcuda/driver/CUhostFn`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            def: ClassDef {
                name: name.into(),
                fields: Vec::new(),
                methods: Vec::new(),
            },
        }
    }

    /// Declare an instance field
    pub fn field(mut self, name: impl Into<String>, signature: impl Into<String>) -> Self {
        self.def.fields.push((name.into(), signature.into()));
        self
    }

    /// Declare a method with a body
    pub fn method<F>(mut self, name: impl Into<String>, signature: impl Into<String>, body: F) -> Self
    where
        F: Fn(&mut HeapEnv, ObjectRef, &[ManagedValue]) -> BridgeResult<ManagedValue>
            + Send
            + Sync
            + 'static,
    {
        self.def.methods.push(MethodDef {
            name: name.into(),
            signature: signature.into(),
            body: Some(Arc::new(body)),
        });
        self
    }

    /// Declare a method without a body
    pub fn abstract_method(mut self, name: impl Into<String>, signature: impl Into<String>) -> Self {
        self.def.methods.push(MethodDef {
            name: name.into(),
            signature: signature.into(),
            body: None,
        });
        self
    }

    /// Declare a constructor that only allocates
    pub fn default_constructor(self) -> Self {
        self.method("<init>", "()V", |_, _, _| Ok(ManagedValue::Void))
    }

    pub(crate) fn build(self) -> ClassDef {
        self.def
    }
}
