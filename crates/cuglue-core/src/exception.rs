//! Raising managed exceptions from native code

use cuglue_sdk::{BridgeError, ManagedEnv};

use crate::bridge::ExceptionClasses;
use crate::{log_error, log_trace, log_warn};

/// Raise an exception of the class named `class_name` with `message`.
///
/// Never fails: if the class cannot be found, whatever the lookup left
/// pending stays pending and the failure is logged.
pub fn throw_by_name<E: ManagedEnv + ?Sized>(env: &mut E, class_name: &str, message: &str) {
    let class = match env.find_class(class_name) {
        Ok(class) => class,
        Err(err) => {
            log_error!("Could not find exception class {}: {}", class_name, err);
            return;
        }
    };
    if let Err(err) = env.throw_new(class, message) {
        log_error!("Could not throw {}: {}", class_name, err);
    }
    env.delete_local_ref(class.as_obj());
}

/// Turns a bridge error into a pending managed exception
pub trait Raise {
    /// Raise the exception for this error unless one is already pending
    fn raise<E: ManagedEnv + ?Sized>(&self, env: &mut E, classes: &ExceptionClasses);
}

impl Raise for BridgeError {
    fn raise<E: ManagedEnv + ?Sized>(&self, env: &mut E, classes: &ExceptionClasses) {
        if env.exception_check() {
            log_trace!("Exception already pending for: {}", self);
            return;
        }
        if self.is_signalled() {
            log_warn!("Exception for '{}' was cleared before it reached the caller", self);
        }
        let class = exception_class(self, classes);
        throw_by_name(env, class, &self.to_string());
    }
}

fn exception_class<'c>(err: &BridgeError, classes: &'c ExceptionClasses) -> &'c str {
    match err {
        BridgeError::Allocation { .. } => &classes.out_of_memory,
        BridgeError::NullElement { .. } => &classes.null_pointer,
        BridgeError::IndexOutOfBounds { .. } => &classes.index_out_of_bounds,
        BridgeError::TypeMismatch { .. } => &classes.illegal_argument,
        // Signalled errors whose exception was cleared in the meantime
        // still have to reach the caller as something.
        _ => &classes.runtime,
    }
}
