//! Reference and value types crossing the managed/native boundary
//!
//! Every managed object is seen by native code as an opaque reference. The
//! runtime decides what the bits mean (a JNI `jobject`, a heap slot, ...);
//! the bridge only moves them around.
//!
//! Absent references ("null") are modelled as `Option<ObjectRef>`, never as
//! a sentinel value.

use std::fmt;
use std::marker::PhantomData;
use std::num::NonZeroU64;

use crate::element::ManagedPrimitive;

// ============================================================================
// Object references
// ============================================================================

/// Opaque, non-null reference to a managed object.
///
/// Valid for the current native frame unless it was obtained from a
/// [`GlobalRef`].
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct ObjectRef(NonZeroU64);

impl ObjectRef {
    /// Wrap raw reference bits. Returns `None` for the null reference.
    pub fn from_raw(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(ObjectRef)
    }

    /// Raw reference bits
    pub fn as_raw(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectRef({:#x})", self.0)
    }
}

/// Reference to a managed class object
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[repr(transparent)]
pub struct ClassRef(ObjectRef);

impl ClassRef {
    /// Treat an object reference as a class reference
    pub fn from_obj(obj: ObjectRef) -> Self {
        ClassRef(obj)
    }

    /// The class as a plain object reference
    pub fn as_obj(self) -> ObjectRef {
        self.0
    }
}

/// Durable reference that stays valid until explicitly deleted.
///
/// Deliberately neither `Clone` nor `Copy`: deleting a global reference
/// consumes it, so a reference cannot be deleted twice.
#[derive(PartialEq, Eq, Hash, Debug)]
pub struct GlobalRef(ObjectRef);

impl GlobalRef {
    /// Wrap a reference the runtime has made durable.
    ///
    /// Only `ManagedEnv::new_global_ref` implementations should call this.
    pub fn from_raw(obj: ObjectRef) -> Self {
        GlobalRef(obj)
    }

    /// Borrow the referenced object
    pub fn as_obj(&self) -> ObjectRef {
        self.0
    }

    /// Give up the wrapper, returning the raw reference for deletion
    pub fn into_raw(self) -> ObjectRef {
        self.0
    }
}

/// Resolved field identifier
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct FieldId(pub u64);

/// Resolved method (or constructor) identifier
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct MethodId(pub u64);

// ============================================================================
// Typed references
// ============================================================================

/// Reference to a managed primitive array whose elements are `M`
pub struct ArrayRef<M: ManagedPrimitive> {
    obj: ObjectRef,
    _elem: PhantomData<fn() -> M>,
}

impl<M: ManagedPrimitive> ArrayRef<M> {
    /// Treat an object reference as a primitive array of `M`
    pub fn from_obj(obj: ObjectRef) -> Self {
        ArrayRef {
            obj,
            _elem: PhantomData,
        }
    }

    /// The array as a plain object reference
    pub fn as_obj(self) -> ObjectRef {
        self.obj
    }
}

impl<M: ManagedPrimitive> Clone for ArrayRef<M> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<M: ManagedPrimitive> Copy for ArrayRef<M> {}

impl<M: ManagedPrimitive> fmt::Debug for ArrayRef<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ArrayRef<{}>({:#x})", M::KIND.name(), self.obj.as_raw())
    }
}

/// Reference to a managed string
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct StringRef(ObjectRef);

impl StringRef {
    /// Treat an object reference as a string
    pub fn from_obj(obj: ObjectRef) -> Self {
        StringRef(obj)
    }

    /// The string as a plain object reference
    pub fn as_obj(self) -> ObjectRef {
        self.0
    }
}

/// Reference to a managed array of object references
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ObjectArrayRef(ObjectRef);

impl ObjectArrayRef {
    /// Treat an object reference as an object array
    pub fn from_obj(obj: ObjectRef) -> Self {
        ObjectArrayRef(obj)
    }

    /// The array as a plain object reference
    pub fn as_obj(self) -> ObjectRef {
        self.0
    }
}

// ============================================================================
// ManagedValue
// ============================================================================

/// Argument or return value of a managed method call
#[derive(Clone, Copy, PartialEq, Debug, Default)]
pub enum ManagedValue {
    /// No value (void return)
    #[default]
    Void,
    /// Boolean
    Bool(bool),
    /// 8-bit signed integer
    Byte(i8),
    /// 16-bit signed integer
    Short(i16),
    /// 32-bit signed integer
    Int(i32),
    /// 64-bit signed integer
    Long(i64),
    /// 32-bit float
    Float(f32),
    /// 64-bit float
    Double(f64),
    /// Object reference, `None` for null
    Object(Option<ObjectRef>),
}

impl ManagedValue {
    /// Null object reference
    pub fn null() -> Self {
        ManagedValue::Object(None)
    }

    /// Get as object reference if this is an object (null gives `Some(None)`)
    pub fn as_object(&self) -> Option<Option<ObjectRef>> {
        match self {
            ManagedValue::Object(obj) => Some(*obj),
            _ => None,
        }
    }

    /// Get as i32 if this is an int
    pub fn as_int(&self) -> Option<i32> {
        match self {
            ManagedValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as i64 if this is a long
    pub fn as_long(&self) -> Option<i64> {
        match self {
            ManagedValue::Long(l) => Some(*l),
            _ => None,
        }
    }

    /// Type name for diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            ManagedValue::Void => "void",
            ManagedValue::Bool(_) => "boolean",
            ManagedValue::Byte(_) => "byte",
            ManagedValue::Short(_) => "short",
            ManagedValue::Int(_) => "int",
            ManagedValue::Long(_) => "long",
            ManagedValue::Float(_) => "float",
            ManagedValue::Double(_) => "double",
            ManagedValue::Object(_) => "object",
        }
    }
}

impl From<Option<ObjectRef>> for ManagedValue {
    fn from(obj: Option<ObjectRef>) -> Self {
        ManagedValue::Object(obj)
    }
}

impl From<ObjectRef> for ManagedValue {
    fn from(obj: ObjectRef) -> Self {
        ManagedValue::Object(Some(obj))
    }
}

impl From<i32> for ManagedValue {
    fn from(i: i32) -> Self {
        ManagedValue::Int(i)
    }
}

impl From<i64> for ManagedValue {
    fn from(l: i64) -> Self {
        ManagedValue::Long(l)
    }
}
