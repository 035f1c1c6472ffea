//! Element types of managed primitive arrays and numeric casts
//!
//! A managed array has one of a fixed set of element kinds. Native code may
//! want the data as any numeric type; [`Cast`] is the plain `as` conversion
//! between the two, with native numeric semantics (truncation toward zero
//! for float → int, wrapping for narrowing ints, saturation for
//! out-of-range floats). No range checking is performed.

/// Element kind of a managed primitive array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    /// `byte[]`
    Byte,
    /// `short[]`
    Short,
    /// `int[]`
    Int,
    /// `long[]`
    Long,
    /// `float[]`
    Float,
    /// `double[]`
    Double,
}

impl PrimitiveKind {
    /// Element size in bytes
    pub fn size(self) -> usize {
        match self {
            PrimitiveKind::Byte => 1,
            PrimitiveKind::Short => 2,
            PrimitiveKind::Int | PrimitiveKind::Float => 4,
            PrimitiveKind::Long | PrimitiveKind::Double => 8,
        }
    }

    /// Managed type name
    pub fn name(self) -> &'static str {
        match self {
            PrimitiveKind::Byte => "byte",
            PrimitiveKind::Short => "short",
            PrimitiveKind::Int => "int",
            PrimitiveKind::Long => "long",
            PrimitiveKind::Float => "float",
            PrimitiveKind::Double => "double",
        }
    }
}

/// How a view of a managed array is given back to the runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseMode {
    /// Copy changes back (if the view was a copy) and free the view
    Commit,
    /// Free the view without copying anything back
    Abort,
}

/// Rust type matching the element layout of a managed primitive array
pub trait ManagedPrimitive: Copy + Default + Send + 'static {
    /// Array element kind this type corresponds to
    const KIND: PrimitiveKind;
}

impl ManagedPrimitive for i8 {
    const KIND: PrimitiveKind = PrimitiveKind::Byte;
}

impl ManagedPrimitive for i16 {
    const KIND: PrimitiveKind = PrimitiveKind::Short;
}

impl ManagedPrimitive for i32 {
    const KIND: PrimitiveKind = PrimitiveKind::Int;
}

impl ManagedPrimitive for i64 {
    const KIND: PrimitiveKind = PrimitiveKind::Long;
}

impl ManagedPrimitive for f32 {
    const KIND: PrimitiveKind = PrimitiveKind::Float;
}

impl ManagedPrimitive for f64 {
    const KIND: PrimitiveKind = PrimitiveKind::Double;
}

/// Static numeric cast (`self as T`)
pub trait Cast<T> {
    /// Convert with `as` semantics
    fn cast(self) -> T;
}

macro_rules! impl_cast {
    ($($src:ty),* $(,)?) => {
        $(
            impl_cast!(@from $src => i8, u8, i16, u16, i32, u32, i64, u64, isize, usize, f32, f64);
        )*
    };
    (@from $src:ty => $($dst:ty),*) => {
        $(
            impl Cast<$dst> for $src {
                #[inline(always)]
                fn cast(self) -> $dst {
                    self as $dst
                }
            }
        )*
    };
}

impl_cast!(i8, u8, i16, u16, i32, u32, i64, u64, isize, usize, f32, f64);
