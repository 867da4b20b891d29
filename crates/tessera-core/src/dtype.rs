use std::fmt;

/// Data types supported by Tessera tensors.
///
/// Standard IEEE floats and integers. The half-precision tags (`F16`, `BF16`)
/// are carried for interchange but have no CPU kernels; dispatching an
/// operation on them reports `UnsupportedDType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    /// 16-bit IEEE 754 half-precision float
    F16,
    /// 16-bit Brain Float (same exponent range as F32, reduced mantissa)
    BF16,
    /// 32-bit IEEE 754 single-precision float
    F32,
    /// 64-bit IEEE 754 double-precision float
    F64,
    /// 8-bit signed integer
    I8,
    /// 8-bit unsigned integer
    U8,
    /// 32-bit signed integer
    I32,
    /// 64-bit signed integer
    I64,
}

impl DType {
    /// Size in bytes of a single element.
    pub fn element_size(&self) -> usize {
        match self {
            DType::F16 | DType::BF16 => 2,
            DType::F32 => 4,
            DType::F64 => 8,
            DType::I8 | DType::U8 => 1,
            DType::I32 => 4,
            DType::I64 => 8,
        }
    }

    /// Number of bytes needed to store `n` elements of this dtype.
    pub fn storage_bytes(&self, n: usize) -> usize {
        self.element_size() * n
    }

    /// Whether this dtype is a floating-point type.
    pub fn is_float(&self) -> bool {
        matches!(self, DType::F16 | DType::BF16 | DType::F32 | DType::F64)
    }

    /// Whether this dtype is an integer type.
    pub fn is_integer(&self) -> bool {
        matches!(self, DType::I8 | DType::U8 | DType::I32 | DType::I64)
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DType::F16 => write!(f, "f16"),
            DType::BF16 => write!(f, "bf16"),
            DType::F32 => write!(f, "f32"),
            DType::F64 => write!(f, "f64"),
            DType::I8 => write!(f, "i8"),
            DType::U8 => write!(f, "u8"),
            DType::I32 => write!(f, "i32"),
            DType::I64 => write!(f, "i64"),
        }
    }
}

/// Element types with CPU kernel support.
///
/// One generic kernel body is written per operation and monomorphized for each
/// implementor; the runtime `DType` tag selects the instantiation through
/// [`with_element!`](crate::with_element).
pub trait Element:
    bytemuck::Pod
    + num_traits::Num
    + num_traits::NumCast
    + PartialOrd
    + Send
    + Sync
    + fmt::Debug
    + 'static
{
    /// The runtime tag corresponding to this element type.
    const DTYPE: DType;

    /// Sentinel guaranteed to lose any max comparison: negative infinity for
    /// floats, the type minimum for integers.
    fn lowest() -> Self;

    fn from_f64(v: f64) -> Option<Self> {
        num_traits::cast(v)
    }

    fn to_f64(self) -> f64 {
        num_traits::cast(self).unwrap_or(f64::NAN)
    }
}

macro_rules! impl_element {
    ($ty:ty, $dtype:expr, $lowest:expr) => {
        impl Element for $ty {
            const DTYPE: DType = $dtype;

            fn lowest() -> Self {
                $lowest
            }
        }
    };
}

impl_element!(f32, DType::F32, f32::NEG_INFINITY);
impl_element!(f64, DType::F64, f64::NEG_INFINITY);
impl_element!(i8, DType::I8, i8::MIN);
impl_element!(u8, DType::U8, u8::MIN);
impl_element!(i32, DType::I32, i32::MIN);
impl_element!(i64, DType::I64, i64::MIN);

/// Dispatch a runtime `DType` tag to a monomorphized body.
///
/// Binds `$ty` to the concrete element type and evaluates `$body`, which must
/// produce a `Result`; tags without kernel coverage evaluate to
/// `Err(UnsupportedDType)`.
///
/// ```
/// use tessera_core::{with_element, DType, Result};
///
/// fn lowest_bits(dtype: DType) -> Result<usize> {
///     with_element!(dtype, T, { Ok(std::mem::size_of::<T>() * 8) })
/// }
/// assert_eq!(lowest_bits(DType::F64).unwrap(), 64);
/// assert!(lowest_bits(DType::F16).is_err());
/// ```
#[macro_export]
macro_rules! with_element {
    ($dtype:expr, $ty:ident, $body:expr) => {
        match $dtype {
            $crate::DType::F32 => {
                type $ty = f32;
                $body
            }
            $crate::DType::F64 => {
                type $ty = f64;
                $body
            }
            $crate::DType::I8 => {
                type $ty = i8;
                $body
            }
            $crate::DType::U8 => {
                type $ty = u8;
                $body
            }
            $crate::DType::I32 => {
                type $ty = i32;
                $body
            }
            $crate::DType::I64 => {
                type $ty = i64;
                $body
            }
            other => Err($crate::TesseraError::UnsupportedDType(other)),
        }
    };
}
