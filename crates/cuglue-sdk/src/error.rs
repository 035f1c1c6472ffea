//! Error types shared by every bridge operation

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Bridge error types
///
/// Errors travel as values inside the bridge. At the wrapper boundary they
/// are turned into a managed exception (see `cuglue_core::exception`).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BridgeError {
    /// Native buffer allocation failed
    #[error("Out of memory allocating {bytes} bytes of native memory")]
    Allocation {
        /// Number of bytes requested
        bytes: usize,
    },

    /// The runtime could not produce a view of an array. An exception is
    /// already pending in the runtime when this is returned.
    #[error("Could not acquire a view of the managed array")]
    ViewAcquisition,

    /// A class, field or method could not be resolved
    #[error("Could not resolve {what}")]
    Resolution {
        /// Description of the missing handle, e.g. `method getBytes ()[B`
        what: String,
    },

    /// The runtime raised an exception that is still pending
    #[error("A managed exception is pending")]
    PendingException,

    /// A managed object array contained null where a value was required
    #[error("Null element at index {index}")]
    NullElement {
        /// Index of the null element
        index: usize,
    },

    /// Index outside of a managed array
    #[error("Index {index} out of bounds for length {len}")]
    IndexOutOfBounds {
        /// Requested index
        index: usize,
        /// Array length
        len: usize,
    },

    /// A managed value had a different type than required
    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch {
        /// Expected type name
        expected: String,
        /// Actual type name
        got: String,
    },

    /// The current thread could not be attached to the runtime
    #[error("Could not attach thread to the managed runtime: {0}")]
    AttachFailed(String),

    /// A process-wide bridge was already installed
    #[error("Bridge already initialized")]
    AlreadyInitialized,

    /// Any other runtime failure
    #[error("{0}")]
    Runtime(String),
}

impl BridgeError {
    /// True if the runtime itself raised an exception for this failure.
    ///
    /// The exception may since have been cleared, as callback delivery does
    /// after describing it. `Resolution` is not signalled: the handle cache
    /// reports unresolved handles without any runtime lookup failing.
    pub fn is_signalled(&self) -> bool {
        matches!(self, BridgeError::ViewAcquisition | BridgeError::PendingException)
    }
}

impl From<String> for BridgeError {
    fn from(s: String) -> Self {
        BridgeError::Runtime(s)
    }
}

impl From<&str> for BridgeError {
    fn from(s: &str) -> Self {
        BridgeError::Runtime(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signalled_errors() {
        assert!(BridgeError::ViewAcquisition.is_signalled());
        assert!(BridgeError::PendingException.is_signalled());
        assert!(!BridgeError::Resolution {
            what: "class Foo".into()
        }
        .is_signalled());
        assert!(!BridgeError::Allocation { bytes: 8 }.is_signalled());
        assert!(!BridgeError::NullElement { index: 0 }.is_signalled());
    }

    #[test]
    fn test_error_messages() {
        let err = BridgeError::IndexOutOfBounds { index: 5, len: 3 };
        assert_eq!(err.to_string(), "Index 5 out of bounds for length 3");
        let err: BridgeError = "boom".into();
        assert_eq!(err, BridgeError::Runtime("boom".to_string()));
    }
}
