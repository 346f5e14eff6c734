//! Element data types and tensor memory formats.

use std::fmt;

/// Enum specifying the data type of a tensor element.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum DataType {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float16,
    Float32,
    Float64,
}

impl DataType {
    /// Return the size of elements of this type in bytes.
    pub fn size(self) -> usize {
        match self {
            DataType::Bool | DataType::Int8 | DataType::UInt8 => 1,
            DataType::Int16 | DataType::UInt16 | DataType::Float16 => 2,
            DataType::Int32 | DataType::UInt32 | DataType::Float32 => 4,
            DataType::Int64 | DataType::UInt64 | DataType::Float64 => 8,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(
            self,
            DataType::Float16 | DataType::Float32 | DataType::Float64
        )
    }
}

impl fmt::Display for DataType {
    /// Format this enum value in the style of the corresponding Rust type (eg.
    /// "i32" for `DataType::Int32`).
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Bool => "bool",
            DataType::Int8 => "i8",
            DataType::Int16 => "i16",
            DataType::Int32 => "i32",
            DataType::Int64 => "i64",
            DataType::UInt8 => "u8",
            DataType::UInt16 => "u16",
            DataType::UInt32 => "u32",
            DataType::UInt64 => "u64",
            DataType::Float16 => "f16",
            DataType::Float32 => "f32",
            DataType::Float64 => "f64",
        };
        f.write_str(name)
    }
}

/// Get the [`DataType`] that corresponds to a given type.
pub trait DataTypeOf {
    /// Return the data type that corresponds to the `Self` type.
    fn dtype_of() -> DataType;
}

/// Element types that can be viewed directly from raw device memory.
///
/// # Safety
///
/// Implementors must be plain data: `Copy`, without padding, and valid for
/// every bit pattern of their size. `bool` is therefore excluded.
pub unsafe trait Element: DataTypeOf + Copy + Send + Sync + fmt::Debug + 'static {}

macro_rules! impl_element {
    ($($type:ty => $dtype:ident),* $(,)?) => {
        $(
            impl DataTypeOf for $type {
                fn dtype_of() -> DataType {
                    DataType::$dtype
                }
            }

            unsafe impl Element for $type {}
        )*
    };
}

impl_element!(
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    u8 => UInt8,
    u16 => UInt16,
    u32 => UInt32,
    u64 => UInt64,
    f32 => Float32,
    f64 => Float64,
);

impl DataTypeOf for bool {
    fn dtype_of() -> DataType {
        DataType::Bool
    }
}

/// Memory layout of a tensor.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub enum Format {
    /// Row-major layout with no particular channel interpretation.
    #[default]
    Default,
    Nchw,
    Nhwc,
    /// Channels split into blocks of 16, as used by some accelerators.
    Nc1hwc0,
    /// Wildcard accepted by a [`KernelAttr`](crate::KernelAttr). Never the
    /// format of an actual tensor.
    Any,
}

impl Format {
    /// Return true if a tensor in format `actual` satisfies a requirement for
    /// `self`.
    pub fn accepts(self, actual: Format) -> bool {
        self == Format::Any || self == actual
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Format::Default => "DefaultFormat",
            Format::Nchw => "NCHW",
            Format::Nhwc => "NHWC",
            Format::Nc1hwc0 => "NC1HWC0",
            Format::Any => "*",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::{DataType, DataTypeOf, Format};

    #[test]
    fn test_dtype_size_and_display() {
        assert_eq!(DataType::Float16.size(), 2);
        assert_eq!(DataType::Int64.size(), 8);
        assert_eq!(DataType::Bool.size(), 1);
        assert_eq!(DataType::UInt32.to_string(), "u32");
        assert_eq!(f64::dtype_of(), DataType::Float64);
        assert_eq!(bool::dtype_of(), DataType::Bool);
        assert!(DataType::Float32.is_float());
        assert!(!DataType::Int32.is_float());
    }

    #[test]
    fn test_format_accepts() {
        assert!(Format::Any.accepts(Format::Nchw));
        assert!(Format::Nhwc.accepts(Format::Nhwc));
        assert!(!Format::Nhwc.accepts(Format::Nchw));
        assert!(!Format::Nchw.accepts(Format::Any));
    }
}
