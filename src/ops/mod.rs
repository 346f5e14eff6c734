//! Built-in CPU kernels.
//!
//! Each kernel type is generic over its element type(s) and is registered
//! once per supported type combination, so the data type is fixed when the
//! registry selects a kernel. [`register_cpu_kernels`] adds all of them to a
//! registry.

use std::iter::repeat;
use std::ops::Range;

use smallvec::SmallVec;

use crate::address::{Address, AddressMut};
use crate::dtype::Element;
use crate::error::{AddressError, KernelError};
use crate::kernel::{Shape, num_elements};
use crate::registry::KernelRegistry;

mod binary_elementwise;
mod convert;
mod generate;
mod matrix_band;
mod optim;
mod reduce;
mod unary_elementwise;
mod variadic_elementwise;

pub use binary_elementwise::{BinaryKernel, BinaryOp};
pub use convert::CastKernel;
pub use generate::RangeKernel;
pub use matrix_band::{DiagAlign, MatrixBandPartKernel, MatrixDiagPartKernel};
pub use optim::{SparseApplyAdagradKernel, SparseApplyProximalAdagradKernel};
pub use reduce::{ArgReduceKernel, ArgReduceOp, ReduceKernel, ReduceOp};
pub use unary_elementwise::{FloatUnaryKernel, FloatUnaryOp, UnaryKernel, UnaryOp};
pub use variadic_elementwise::AddNKernel;

/// Register every built-in CPU kernel with `reg`.
pub fn register_cpu_kernels(reg: &mut KernelRegistry) {
    binary_elementwise::register(reg);
    variadic_elementwise::register(reg);
    unary_elementwise::register(reg);
    convert::register(reg);
    reduce::register(reg);
    matrix_band::register(reg);
    generate::register(reg);
    optim::register(reg);
}

/// Register a kernel factory on the CPU for each listed element type.
///
/// `$attr` and `$kernel` are expanded once per type, with `$t` naming that
/// type.
macro_rules! register_typed {
    ($reg:expr, $op:expr, [$($T:ty),*], |$t:ident| $attr:expr, $kernel:expr) => {
        $({
            type $t = $T;
            $reg.register(
                $op,
                $crate::registry::DeviceKind::Cpu,
                $attr,
                move || -> Box<dyn $crate::kernel::Kernel> { Box::new($kernel) },
            );
        })*
    };
}
pub(crate) use register_typed;

fn address_error(op: &str, role: &'static str, index: usize, source: AddressError) -> KernelError {
    KernelError::Address {
        op: op.to_string(),
        role,
        index,
        source,
    }
}

/// Return the first `len` elements of input `index` as a `[T]`.
pub(crate) fn input<'a, T: Element>(
    op: &str,
    inputs: &[Address<'a>],
    index: usize,
    len: usize,
) -> Result<&'a [T], KernelError> {
    let addr = inputs
        .get(index)
        .ok_or_else(|| KernelError::wrong_arity(op, "input addresses", index + 1, inputs.len()))?;
    let data = addr
        .as_slice::<T>()
        .map_err(|err| address_error(op, "input", index, err))?;
    data.get(..len).ok_or_else(|| {
        let err = AddressError::TooSmall {
            size: addr.size(),
            required: len * size_of::<T>(),
        };
        address_error(op, "input", index, err)
    })
}

/// Return the value of a single-element input.
pub(crate) fn input_scalar<T: Element>(
    op: &str,
    inputs: &[Address],
    index: usize,
) -> Result<T, KernelError> {
    input::<T>(op, inputs, index, 1).map(|data| data[0])
}

fn typed_output<'a, T: Element>(
    op: &str,
    addr: &'a mut AddressMut,
    index: usize,
    len: usize,
) -> Result<&'a mut [T], KernelError> {
    let size = addr.size();
    let data = addr
        .as_mut_slice::<T>()
        .map_err(|err| address_error(op, "output", index, err))?;
    if data.len() < len {
        let err = AddressError::TooSmall {
            size,
            required: len * size_of::<T>(),
        };
        return Err(address_error(op, "output", index, err));
    }
    Ok(&mut data[..len])
}

/// Return the first `len` elements of output `index` as a `[T]`.
pub(crate) fn output<'a, T: Element>(
    op: &str,
    outputs: &'a mut [AddressMut],
    index: usize,
    len: usize,
) -> Result<&'a mut [T], KernelError> {
    let n_outputs = outputs.len();
    let addr = outputs
        .get_mut(index)
        .ok_or_else(|| KernelError::wrong_arity(op, "output addresses", index + 1, n_outputs))?;
    typed_output(op, addr, index, len)
}

/// Return the first two outputs, with `lens.0` and `lens.1` elements.
pub(crate) fn output_pair<'a, A: Element, B: Element>(
    op: &str,
    outputs: &'a mut [AddressMut],
    lens: (usize, usize),
) -> Result<(&'a mut [A], &'a mut [B]), KernelError> {
    let n_outputs = outputs.len();
    match outputs {
        [a, b, ..] => Ok((
            typed_output(op, a, 0, lens.0)?,
            typed_output(op, b, 1, lens.1)?,
        )),
        _ => Err(KernelError::wrong_arity(op, "output addresses", 2, n_outputs)),
    }
}

/// Return the input shapes as an array, failing if there are not exactly
/// `N`.
pub(crate) fn input_shapes<'a, const N: usize>(
    op: &str,
    shapes: &'a [Shape],
) -> Result<&'a [Shape; N], KernelError> {
    shapes
        .try_into()
        .map_err(|_| KernelError::wrong_arity(op, "input shapes", N, shapes.len()))
}

/// Check that `shape` describes a single value.
pub(crate) fn check_scalar(op: &str, name: &str, shape: &[usize]) -> Result<(), KernelError> {
    if num_elements(shape) != 1 {
        return Err(KernelError::invalid_shape(
            op,
            format!("{} must be a scalar but has shape {:?}", name, shape),
        ));
    }
    Ok(())
}

/// Resolve an axis in `[-ndim, ndim)` to a dimension index.
pub(crate) fn resolve_axis(op: &str, ndim: usize, axis: i64) -> Result<usize, KernelError> {
    let ndim_i = ndim as i64;
    let resolved = if axis < 0 { axis + ndim_i } else { axis };
    if resolved < 0 || resolved >= ndim_i {
        return Err(KernelError::invalid_attr(
            op,
            "axis",
            format!("axis {} is outside the range [-{}, {})", axis, ndim, ndim),
        ));
    }
    Ok(resolved as usize)
}

/// Return the shape that results from broadcasting `a` and `b` following
/// NumPy rules, or `None` if they are incompatible.
///
/// Shapes are left-padded with 1s to the same length and compared from the
/// right. Each pair of sizes must be equal, or one of them must be 1.
pub fn broadcast_shapes(a: &[usize], b: &[usize]) -> Option<Shape> {
    let a_pad = b.len().saturating_sub(a.len());
    let b_pad = a.len().saturating_sub(b.len());

    let a_iter = a.iter().copied().rev().chain(repeat(1).take(a_pad));
    let b_iter = b.iter().copied().rev().chain(repeat(1).take(b_pad));

    let mut result = Shape::with_capacity(a.len().max(b.len()));
    for (a, b) in a_iter.zip(b_iter) {
        if a == b || b == 1 {
            result.push(a);
        } else if a == 1 {
            result.push(b);
        } else {
            return None;
        }
    }
    result.reverse();

    Some(result)
}

/// Row-major strides of a contiguous tensor with the given shape.
pub(crate) fn contiguous_strides(shape: &[usize]) -> Shape {
    let mut strides: Shape = SmallVec::from_elem(0, shape.len());
    let mut stride = 1;
    for (dim_stride, &size) in strides.iter_mut().zip(shape).rev() {
        *dim_stride = stride;
        stride *= size;
    }
    strides
}

/// Strides for reading a contiguous tensor of shape `shape` as if it had
/// been broadcast to `out_shape`. Broadcast dimensions get a stride of zero.
pub(crate) fn broadcast_strides(shape: &[usize], out_shape: &[usize]) -> Shape {
    let pad = out_shape.len() - shape.len();
    let strides = contiguous_strides(shape);
    (0..out_shape.len())
        .map(|dim| {
            if dim < pad || shape[dim - pad] == 1 {
                0
            } else {
                strides[dim - pad]
            }
        })
        .collect()
}

/// Iterator over the memory offsets of a range of positions in a strided
/// view.
///
/// Positions are numbered in row-major order over `shape`. The offset of a
/// position is the dot product of its index with `strides`.
pub(crate) struct Offsets<'a> {
    shape: &'a [usize],
    strides: &'a [usize],
    index: Shape,
    offset: usize,
    remaining: usize,
}

impl<'a> Offsets<'a> {
    pub fn new(shape: &'a [usize], strides: &'a [usize], range: Range<usize>) -> Self {
        let mut index: Shape = SmallVec::from_elem(0, shape.len());
        let mut offset = 0;
        let mut pos = range.start;
        for dim in (0..shape.len()).rev() {
            if shape[dim] == 0 {
                break;
            }
            index[dim] = pos % shape[dim];
            pos /= shape[dim];
            offset += index[dim] * strides[dim];
        }
        Offsets {
            shape,
            strides,
            index,
            offset,
            remaining: range.len(),
        }
    }
}

impl Iterator for Offsets<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let current = self.offset;

        for dim in (0..self.shape.len()).rev() {
            self.index[dim] += 1;
            self.offset += self.strides[dim];
            if self.index[dim] < self.shape[dim] {
                break;
            }
            self.offset -= self.strides[dim] * self.shape[dim];
            self.index[dim] = 0;
        }

        Some(current)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for Offsets<'_> {}
