//! Numeric traits used by generic kernels.

use std::ops::{Add, Div, Mul, Neg, Sub};

use crate::dtype::Element;

/// Element types supported by the arithmetic kernels.
///
/// Integer arithmetic wraps on overflow, so kernels never panic on extreme
/// input values.
pub trait Number: Element + PartialOrd + Default {
    const ZERO: Self;
    const ONE: Self;

    /// Smallest and largest representable values. For floats these are the
    /// infinities.
    const MIN_VAL: Self;
    const MAX_VAL: Self;

    fn wrapping_add(self, rhs: Self) -> Self;
    fn wrapping_sub(self, rhs: Self) -> Self;
    fn wrapping_mul(self, rhs: Self) -> Self;
    fn wrapping_neg(self) -> Self;

    /// Divide, returning `None` for integer division by zero.
    fn checked_div(self, rhs: Self) -> Option<Self>;

    fn abs(self) -> Self;

    /// Return the maximum of `self` and `other`. For floats a NaN operand is
    /// propagated.
    fn max(self, other: Self) -> Self;

    /// Return the minimum of `self` and `other`. For floats a NaN operand is
    /// propagated.
    fn min(self, other: Self) -> Self;

    fn is_nan(self) -> bool;

    fn from_usize(val: usize) -> Self;
    fn from_f64(val: f64) -> Self;
    fn to_f64(self) -> f64;

    /// Exact integer value, or `None` for float types.
    fn to_i128(self) -> Option<i128>;
}

macro_rules! impl_int_number {
    ($type:ty) => {
        impl Number for $type {
            const ZERO: Self = 0;
            const ONE: Self = 1;
            const MIN_VAL: Self = <$type>::MIN;
            const MAX_VAL: Self = <$type>::MAX;

            fn wrapping_add(self, rhs: Self) -> Self {
                <$type>::wrapping_add(self, rhs)
            }

            fn wrapping_sub(self, rhs: Self) -> Self {
                <$type>::wrapping_sub(self, rhs)
            }

            fn wrapping_mul(self, rhs: Self) -> Self {
                <$type>::wrapping_mul(self, rhs)
            }

            fn wrapping_neg(self) -> Self {
                <$type>::wrapping_neg(self)
            }

            fn checked_div(self, rhs: Self) -> Option<Self> {
                if rhs == 0 {
                    None
                } else {
                    Some(<$type>::wrapping_div(self, rhs))
                }
            }

            fn abs(self) -> Self {
                <$type>::wrapping_abs(self)
            }

            fn max(self, other: Self) -> Self {
                Ord::max(self, other)
            }

            fn min(self, other: Self) -> Self {
                Ord::min(self, other)
            }

            fn is_nan(self) -> bool {
                false
            }

            fn from_usize(val: usize) -> Self {
                val as $type
            }

            fn from_f64(val: f64) -> Self {
                val as $type
            }

            fn to_f64(self) -> f64 {
                self as f64
            }

            fn to_i128(self) -> Option<i128> {
                Some(self as i128)
            }
        }
    };
}

macro_rules! impl_float_number {
    ($type:ty) => {
        impl Number for $type {
            const ZERO: Self = 0.;
            const ONE: Self = 1.;
            const MIN_VAL: Self = <$type>::NEG_INFINITY;
            const MAX_VAL: Self = <$type>::INFINITY;

            fn wrapping_add(self, rhs: Self) -> Self {
                self + rhs
            }

            fn wrapping_sub(self, rhs: Self) -> Self {
                self - rhs
            }

            fn wrapping_mul(self, rhs: Self) -> Self {
                self * rhs
            }

            fn wrapping_neg(self) -> Self {
                -self
            }

            fn checked_div(self, rhs: Self) -> Option<Self> {
                Some(self / rhs)
            }

            fn abs(self) -> Self {
                <$type>::abs(self)
            }

            fn max(self, other: Self) -> Self {
                if self.is_nan() || other.is_nan() {
                    <$type>::NAN
                } else {
                    <$type>::max(self, other)
                }
            }

            fn min(self, other: Self) -> Self {
                if self.is_nan() || other.is_nan() {
                    <$type>::NAN
                } else {
                    <$type>::min(self, other)
                }
            }

            fn is_nan(self) -> bool {
                <$type>::is_nan(self)
            }

            fn from_usize(val: usize) -> Self {
                val as $type
            }

            fn from_f64(val: f64) -> Self {
                val as $type
            }

            fn to_f64(self) -> f64 {
                self as f64
            }

            fn to_i128(self) -> Option<i128> {
                None
            }
        }
    };
}

impl_int_number!(i32);
impl_int_number!(i64);
impl_float_number!(f32);
impl_float_number!(f64);

/// Floating point operations used by activation and optimizer kernels.
pub trait Float:
    Number
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
{
    fn exp(self) -> Self;
    fn sqrt(self) -> Self;
    fn tanh(self) -> Self;

    /// Logistic function `1 / (1 + exp(-x))`.
    fn sigmoid(self) -> Self {
        Self::ONE / (Self::ONE + (-self).exp())
    }
}

macro_rules! impl_float {
    ($type:ty) => {
        impl Float for $type {
            fn exp(self) -> Self {
                <$type>::exp(self)
            }

            fn sqrt(self) -> Self {
                <$type>::sqrt(self)
            }

            fn tanh(self) -> Self {
                <$type>::tanh(self)
            }
        }
    };
}

impl_float!(f32);
impl_float!(f64);

/// Conversion between element types with the semantics of an `as` cast.
///
/// Float to integer conversions saturate, and NaN converts to zero.
pub trait CastFrom<S> {
    fn cast_from(val: S) -> Self;
}

macro_rules! impl_cast_from {
    ($from:ty => $($to:ty),*) => {
        $(
            impl CastFrom<$from> for $to {
                fn cast_from(val: $from) -> Self {
                    val as $to
                }
            }
        )*
    };
}

macro_rules! impl_cast_all {
    ($($from:ty),*) => {
        $(
            impl_cast_from!($from => i8, i16, i32, i64, u8, u16, u32, u64, f32, f64);
        )*
    };
}

impl_cast_all!(i8, i16, i32, i64, u8, u16, u32, u64, f32, f64);

#[cfg(test)]
mod tests {
    use super::{CastFrom, Float, Number};

    #[test]
    fn test_wrapping_arithmetic() {
        assert_eq!(Number::wrapping_add(i32::MAX, 1), i32::MIN);
        assert_eq!(Number::wrapping_neg(i64::MIN), i64::MIN);
        assert_eq!(Number::checked_div(7i32, 0), None);
        assert_eq!(Number::checked_div(-7i32, 2), Some(-3));
        assert_eq!(Number::checked_div(1f32, 0.), Some(f32::INFINITY));
    }

    #[test]
    fn test_float_min_max_propagates_nan() {
        assert!(Number::max(f32::NAN, 1.).is_nan());
        assert!(Number::min(1., f64::NAN).is_nan());
        assert_eq!(Number::max(2i64, 3), 3);
        assert_eq!(Number::min(-1.5f32, 3.), -1.5);
    }

    #[test]
    fn test_sigmoid() {
        assert_eq!(Float::sigmoid(0f32), 0.5);
        assert!((Float::sigmoid(2f64) - 0.8807970779778823).abs() < 1e-12);
    }

    #[test]
    fn test_cast_from() {
        assert_eq!(u8::cast_from(300i32), 44);
        assert_eq!(i32::cast_from(-2.7f32), -2);
        assert_eq!(u16::cast_from(-1.0f64), 0);
        assert_eq!(i8::cast_from(f32::NAN), 0);
        assert_eq!(f32::cast_from(16777217i64), 16777216.);
    }
}
