//! Heap objects

use rustc_hash::FxHashMap;

use cuglue_sdk::{ManagedPrimitive, ManagedValue, ObjectRef, PrimitiveKind};

/// Typed storage of a primitive array.
///
/// Element storage is boxed and never resized, so pointers handed out for
/// critical views stay valid while the object table is reorganized.
#[derive(Debug, Clone, PartialEq)]
pub enum PrimitiveArray {
    /// `byte[]`
    Byte(Box<[i8]>),
    /// `short[]`
    Short(Box<[i16]>),
    /// `int[]`
    Int(Box<[i32]>),
    /// `long[]`
    Long(Box<[i64]>),
    /// `float[]`
    Float(Box<[f32]>),
    /// `double[]`
    Double(Box<[f64]>),
}

macro_rules! for_each_array {
    ($array:expr, $elems:ident => $body:expr) => {
        match $array {
            PrimitiveArray::Byte($elems) => $body,
            PrimitiveArray::Short($elems) => $body,
            PrimitiveArray::Int($elems) => $body,
            PrimitiveArray::Long($elems) => $body,
            PrimitiveArray::Float($elems) => $body,
            PrimitiveArray::Double($elems) => $body,
        }
    };
}

impl PrimitiveArray {
    /// Zero-filled array of `kind`
    pub fn zeroed(kind: PrimitiveKind, len: usize) -> Self {
        match kind {
            PrimitiveKind::Byte => PrimitiveArray::Byte(vec![0; len].into()),
            PrimitiveKind::Short => PrimitiveArray::Short(vec![0; len].into()),
            PrimitiveKind::Int => PrimitiveArray::Int(vec![0; len].into()),
            PrimitiveKind::Long => PrimitiveArray::Long(vec![0; len].into()),
            PrimitiveKind::Float => PrimitiveArray::Float(vec![0.0; len].into()),
            PrimitiveKind::Double => PrimitiveArray::Double(vec![0.0; len].into()),
        }
    }

    /// Element kind
    pub fn kind(&self) -> PrimitiveKind {
        match self {
            PrimitiveArray::Byte(_) => PrimitiveKind::Byte,
            PrimitiveArray::Short(_) => PrimitiveKind::Short,
            PrimitiveArray::Int(_) => PrimitiveKind::Int,
            PrimitiveArray::Long(_) => PrimitiveKind::Long,
            PrimitiveArray::Float(_) => PrimitiveKind::Float,
            PrimitiveArray::Double(_) => PrimitiveKind::Double,
        }
    }

    /// Element count
    pub fn len(&self) -> usize {
        for_each_array!(self, elems => elems.len())
    }

    /// True if the array has no elements
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pointer to the first element
    pub(crate) fn as_mut_ptr(&mut self) -> *mut u8 {
        for_each_array!(self, elems => elems.as_mut_ptr().cast())
    }

    /// Overwrite the elements of `self` with those of `other` (same kind)
    pub(crate) fn copy_from(&mut self, other: &PrimitiveArray) -> bool {
        match (self, other) {
            (PrimitiveArray::Byte(dst), PrimitiveArray::Byte(src)) => dst.copy_from_slice(src),
            (PrimitiveArray::Short(dst), PrimitiveArray::Short(src)) => dst.copy_from_slice(src),
            (PrimitiveArray::Int(dst), PrimitiveArray::Int(src)) => dst.copy_from_slice(src),
            (PrimitiveArray::Long(dst), PrimitiveArray::Long(src)) => dst.copy_from_slice(src),
            (PrimitiveArray::Float(dst), PrimitiveArray::Float(src)) => dst.copy_from_slice(src),
            (PrimitiveArray::Double(dst), PrimitiveArray::Double(src)) => dst.copy_from_slice(src),
            _ => return false,
        }
        true
    }
}

/// Primitive element types with heap array storage
pub trait HeapElement: ManagedPrimitive {
    /// Wrap owned elements
    fn wrap(elems: Box<[Self]>) -> PrimitiveArray;

    /// Borrow the elements if `array` holds this type
    fn slice(array: &PrimitiveArray) -> Option<&[Self]>;
}

macro_rules! impl_heap_element {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl HeapElement for $ty {
                fn wrap(elems: Box<[Self]>) -> PrimitiveArray {
                    PrimitiveArray::$variant(elems)
                }

                fn slice(array: &PrimitiveArray) -> Option<&[Self]> {
                    match array {
                        PrimitiveArray::$variant(elems) => Some(elems),
                        _ => None,
                    }
                }
            }
        )*
    };
}

impl_heap_element! {
    i8 => Byte,
    i16 => Short,
    i32 => Int,
    i64 => Long,
    f32 => Float,
    f64 => Double,
}

/// An object in the heap
#[derive(Debug)]
pub(crate) enum Object {
    Class(usize),
    Instance {
        class: usize,
        fields: FxHashMap<String, ManagedValue>,
    },
    Str(String),
    Array(PrimitiveArray),
    ObjectArray(Box<[Option<ObjectRef>]>),
}

impl Object {
    pub(crate) fn type_name(&self) -> &'static str {
        match self {
            Object::Class(_) => "class",
            Object::Instance { .. } => "instance",
            Object::Str(_) => "string",
            Object::Array(_) => "array",
            Object::ObjectArray(_) => "object[]",
        }
    }
}

/// An exception raised in the heap
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThrownException {
    /// Internal class name, e.g. `java/lang/OutOfMemoryError`
    pub class: String,
    /// Message passed to the throw
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zeroed_arrays() {
        let array = PrimitiveArray::zeroed(PrimitiveKind::Float, 3);
        assert_eq!(array.kind(), PrimitiveKind::Float);
        assert_eq!(array.len(), 3);
        assert_eq!(f32::slice(&array), Some(&[0.0f32; 3][..]));
        assert_eq!(i32::slice(&array), None);
    }

    #[test]
    fn test_copy_from_requires_same_kind() {
        let mut dst = PrimitiveArray::zeroed(PrimitiveKind::Int, 2);
        assert!(dst.copy_from(&i32::wrap(vec![4, 5].into())));
        assert_eq!(i32::slice(&dst), Some(&[4, 5][..]));
        assert!(!dst.copy_from(&i64::wrap(vec![1, 2].into())));
    }
}
