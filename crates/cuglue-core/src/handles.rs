//! Reflection handle cache
//!
//! Class references, field and method identifiers are resolved once at
//! startup in a fixed order:
//!
//! 1. `java/lang/String` (durable reference)
//! 2. `String.getBytes()[B`
//! 3. `String.<init>([B)V`
//! 4. the native pointer class and its `long nativePointer` field, if
//!    configured
//! 5. each configured callback interface class (durable reference) and its
//!    method, in the configured order
//!
//! Resolution stops at the first failure. The environment keeps its own
//! pending exception, and every durable reference taken so far is deleted,
//! so a failed initialization leaves nothing behind. After success the cache
//! is immutable and can be read from any thread.

use cuglue_sdk::{
    BridgeError, BridgeResult, ClassRef, FieldId, GlobalRef, ManagedEnv, MethodId, ObjectRef,
};

use crate::bridge::{BridgeOptions, CallbackInterface};
use crate::{log_debug, log_error};

/// Name of the field holding native handles on pointer objects
pub const NATIVE_POINTER_FIELD: &str = "nativePointer";

// ============================================================================
// Resolution helpers
// ============================================================================

/// Find a class, logging the failure
pub fn resolve_class<E: ManagedEnv + ?Sized>(env: &mut E, name: &str) -> BridgeResult<ClassRef> {
    env.find_class(name).map_err(|err| {
        log_error!("Failed to access class '{}': {}", name, err);
        BridgeError::Resolution {
            what: format!("class {}", name),
        }
    })
}

/// Find a class and pin it with a durable reference
pub fn resolve_global_class<E: ManagedEnv + ?Sized>(
    env: &mut E,
    name: &str,
) -> BridgeResult<GlobalRef> {
    let local = resolve_class(env, name)?;
    let global = env.new_global_ref(local.as_obj()).map_err(|err| {
        log_error!("Failed to create reference to class '{}': {}", name, err);
        BridgeError::Resolution {
            what: format!("class {}", name),
        }
    });
    env.delete_local_ref(local.as_obj());
    global
}

/// Resolve an instance field
pub fn resolve_field<E: ManagedEnv + ?Sized>(
    env: &mut E,
    class: ClassRef,
    name: &str,
    signature: &str,
) -> BridgeResult<FieldId> {
    env.get_field_id(class, name, signature).map_err(|err| {
        log_error!("Failed to access field '{}' ({}): {}", name, signature, err);
        BridgeError::Resolution {
            what: format!("field {} {}", name, signature),
        }
    })
}

/// Resolve an instance method
pub fn resolve_method<E: ManagedEnv + ?Sized>(
    env: &mut E,
    class: ClassRef,
    name: &str,
    signature: &str,
) -> BridgeResult<MethodId> {
    env.get_method_id(class, name, signature).map_err(|err| {
        log_error!("Failed to access method '{}' ({}): {}", name, signature, err);
        BridgeError::Resolution {
            what: format!("method {} {}", name, signature),
        }
    })
}

/// Find a class by name and resolve one of its constructors.
///
/// The returned class is a local reference owned by the caller, who deletes
/// it once the objects are constructed. On failure nothing is left to delete.
pub fn resolve_constructor<E: ManagedEnv + ?Sized>(
    env: &mut E,
    class_name: &str,
    signature: &str,
) -> BridgeResult<(ClassRef, MethodId)> {
    let class = resolve_class(env, class_name)?;
    match resolve_method(env, class, "<init>", signature) {
        Ok(constructor) => Ok((class, constructor)),
        Err(err) => {
            env.delete_local_ref(class.as_obj());
            Err(err)
        }
    }
}

/// Resolve the `long nativePointer` field of the named class
pub fn resolve_native_pointer_field<E: ManagedEnv + ?Sized>(
    env: &mut E,
    class_name: &str,
) -> BridgeResult<FieldId> {
    let class = resolve_class(env, class_name)?;
    let field = resolve_field(env, class, NATIVE_POINTER_FIELD, "J");
    env.delete_local_ref(class.as_obj());
    field
}

// ============================================================================
// Cache
// ============================================================================

/// A resolved callback interface
#[derive(Debug)]
pub struct CallbackMethod {
    name: String,
    class: ClassRef,
    method: MethodId,
}

impl CallbackMethod {
    /// Interface name the method was registered under
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Pinned interface class
    pub fn class(&self) -> ClassRef {
        self.class
    }

    /// Method invoked on callback targets
    pub fn method(&self) -> MethodId {
        self.method
    }
}

/// Handles resolved at bridge initialization
#[derive(Debug)]
pub struct HandleCache {
    string_class: ClassRef,
    string_get_bytes: MethodId,
    string_from_bytes: MethodId,
    native_pointer: Option<FieldId>,
    callbacks: Vec<CallbackMethod>,
    pinned: Vec<GlobalRef>,
}

impl HandleCache {
    /// Resolve every handle named by `options`
    pub fn initialize<E: ManagedEnv + ?Sized>(
        env: &mut E,
        options: &BridgeOptions,
    ) -> BridgeResult<Self> {
        let mut pinned = Vec::new();
        match resolve_all(env, options, &mut pinned) {
            Ok(resolved) => {
                log_debug!(
                    "Resolved {} class references and {} callback interfaces",
                    pinned.len(),
                    resolved.callbacks.len()
                );
                Ok(Self {
                    string_class: resolved.string_class,
                    string_get_bytes: resolved.string_get_bytes,
                    string_from_bytes: resolved.string_from_bytes,
                    native_pointer: resolved.native_pointer,
                    callbacks: resolved.callbacks,
                    pinned,
                })
            }
            Err(err) => {
                for global in pinned {
                    env.delete_global_ref(global);
                }
                Err(err)
            }
        }
    }

    /// `java/lang/String`
    pub fn string_class(&self) -> ClassRef {
        self.string_class
    }

    /// `String.getBytes()[B`
    pub fn string_get_bytes(&self) -> MethodId {
        self.string_get_bytes
    }

    /// `String.<init>([B)V`
    pub fn string_from_bytes(&self) -> MethodId {
        self.string_from_bytes
    }

    /// The `nativePointer` field, if a pointer class was configured
    pub fn native_pointer(&self) -> Option<FieldId> {
        self.native_pointer
    }

    /// Resolved callback interface by name
    pub fn callback(&self, name: &str) -> Option<&CallbackMethod> {
        self.callbacks.iter().find(|c| c.name == name)
    }

    /// Read the native handle stored in a pointer object (0 for null)
    pub fn get_native_pointer<E: ManagedEnv + ?Sized>(
        &self,
        env: &mut E,
        obj: Option<ObjectRef>,
    ) -> BridgeResult<i64> {
        match obj {
            None => Ok(0),
            Some(obj) => env.get_long_field(obj, self.native_pointer_field()?),
        }
    }

    /// Store a native handle in a pointer object
    pub fn set_native_pointer<E: ManagedEnv + ?Sized>(
        &self,
        env: &mut E,
        obj: ObjectRef,
        value: i64,
    ) -> BridgeResult<()> {
        env.set_long_field(obj, self.native_pointer_field()?, value)
    }

    fn native_pointer_field(&self) -> BridgeResult<FieldId> {
        self.native_pointer.ok_or_else(|| BridgeError::Resolution {
            what: format!("field {} J", NATIVE_POINTER_FIELD),
        })
    }

    /// Delete every durable reference held by the cache
    pub fn release<E: ManagedEnv + ?Sized>(self, env: &mut E) {
        for global in self.pinned {
            env.delete_global_ref(global);
        }
    }
}

struct Resolved {
    string_class: ClassRef,
    string_get_bytes: MethodId,
    string_from_bytes: MethodId,
    native_pointer: Option<FieldId>,
    callbacks: Vec<CallbackMethod>,
}

fn resolve_all<E: ManagedEnv + ?Sized>(
    env: &mut E,
    options: &BridgeOptions,
    pinned: &mut Vec<GlobalRef>,
) -> BridgeResult<Resolved> {
    let string = resolve_global_class(env, "java/lang/String")?;
    let string_class = ClassRef::from_obj(string.as_obj());
    pinned.push(string);

    let string_get_bytes = resolve_method(env, string_class, "getBytes", "()[B")?;
    let string_from_bytes = resolve_method(env, string_class, "<init>", "([B)V")?;

    let native_pointer = match &options.native_pointer_class {
        Some(class_name) => Some(resolve_native_pointer_field(env, class_name)?),
        None => None,
    };

    let mut callbacks = Vec::with_capacity(options.callbacks.len());
    for interface in &options.callbacks {
        callbacks.push(resolve_callback(env, interface, pinned)?);
    }

    Ok(Resolved {
        string_class,
        string_get_bytes,
        string_from_bytes,
        native_pointer,
        callbacks,
    })
}

fn resolve_callback<E: ManagedEnv + ?Sized>(
    env: &mut E,
    interface: &CallbackInterface,
    pinned: &mut Vec<GlobalRef>,
) -> BridgeResult<CallbackMethod> {
    let global = resolve_global_class(env, &interface.class)?;
    let class = ClassRef::from_obj(global.as_obj());
    pinned.push(global);
    let method = resolve_method(env, class, &interface.method, &interface.signature)?;
    Ok(CallbackMethod {
        name: interface.name.clone(),
        class,
        method,
    })
}
