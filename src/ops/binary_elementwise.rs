use std::marker::PhantomData;

use kernrt_parallel::{SearchKey, SearchSlot, Split, parallel_launch_mut, search_cache};

use crate::address::{Address, AddressMut};
use crate::dtype::Element;
use crate::error::KernelError;
use crate::kernel::{Kernel, LaunchSizes, NodeInfo, Shape, num_elements};
use crate::kernel_attr::KernelAttr;
use crate::number::Number;
use crate::ops::{
    Offsets, broadcast_shapes, broadcast_strides, input, input_shapes, output, register_typed,
};
use crate::registry::KernelRegistry;

/// Element-wise binary arithmetic operators.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    /// Division. Integer division truncates towards zero and fails on a
    /// zero divisor.
    Div,
    /// Element-wise maximum. NaN operands propagate.
    Maximum,
    /// Element-wise minimum. NaN operands propagate.
    Minimum,
}

impl BinaryOp {
    pub const ALL: [BinaryOp; 6] = [
        BinaryOp::Add,
        BinaryOp::Sub,
        BinaryOp::Mul,
        BinaryOp::Div,
        BinaryOp::Maximum,
        BinaryOp::Minimum,
    ];

    pub fn name(self) -> &'static str {
        match self {
            BinaryOp::Add => "Add",
            BinaryOp::Sub => "Sub",
            BinaryOp::Mul => "Mul",
            BinaryOp::Div => "Div",
            BinaryOp::Maximum => "Maximum",
            BinaryOp::Minimum => "Minimum",
        }
    }
}

/// Kernel for a [`BinaryOp`] on inputs of type `T`, with NumPy-style
/// broadcasting.
///
/// The block size of the parallel launch is chosen by auto-search, keyed by
/// operator, element type and input shapes.
#[derive(Debug)]
pub struct BinaryKernel<T> {
    op: BinaryOp,
    a_shape: Shape,
    b_shape: Shape,
    out_shape: Shape,
    a_strides: Shape,
    b_strides: Shape,
    sizes: LaunchSizes,
    search: SearchSlot,
    _marker: PhantomData<T>,
}

impl<T: Number> BinaryKernel<T> {
    pub fn new(op: BinaryOp) -> Self {
        BinaryKernel {
            op,
            a_shape: Shape::new(),
            b_shape: Shape::new(),
            out_shape: Shape::new(),
            a_strides: Shape::new(),
            b_strides: Shape::new(),
            sizes: LaunchSizes::default(),
            search: SearchSlot::new(),
            _marker: PhantomData,
        }
    }

    /// Apply `f` to every pair of broadcast elements of `a` and `b`.
    ///
    /// `f` returns `None` if the pair has no result, which fails the launch.
    fn run<F>(&self, a: &[T], b: &[T], out: &mut [T], f: F) -> Result<(), KernelError>
    where
        F: Fn(T, T) -> Option<T> + Sync,
    {
        let contiguous = a.len() == out.len() && b.len() == out.len();

        parallel_launch_mut(out, Split::Auto(&self.search), |range, out| {
            let mut apply = |(y, (x1, x2)): (&mut T, (T, T))| match f(x1, x2) {
                Some(val) => {
                    *y = val;
                    true
                }
                None => false,
            };

            let ok = if contiguous {
                let pairs = a[range.clone()].iter().copied().zip(b[range].iter().copied());
                out.iter_mut().zip(pairs).all(&mut apply)
            } else {
                let a_offsets = Offsets::new(&self.out_shape, &self.a_strides, range.clone());
                let b_offsets = Offsets::new(&self.out_shape, &self.b_strides, range);
                let pairs = a_offsets.zip(b_offsets).map(|(i, j)| (a[i], b[j]));
                out.iter_mut().zip(pairs).all(&mut apply)
            };

            if ok {
                Ok(())
            } else {
                Err(KernelError::invalid_value(
                    self.op.name(),
                    "integer division by zero",
                ))
            }
        })
    }
}

impl<T: Number> Kernel for BinaryKernel<T> {
    fn name(&self) -> &str {
        self.op.name()
    }

    fn init(&mut self, node: &NodeInfo) -> Result<(), KernelError> {
        node.check_arity(2, 1)?;
        node.check_dtypes(&[T::dtype_of(); 2], &[T::dtype_of()])
    }

    fn resize(&mut self, shapes: &[Shape]) -> Result<(), KernelError> {
        let op = self.op.name();
        let [a, b] = input_shapes::<2>(op, shapes)?;
        let out_shape = broadcast_shapes(a, b).ok_or_else(|| {
            KernelError::invalid_shape(op, format!("cannot broadcast {:?} and {:?}", a, b))
        })?;

        let dtype = T::dtype_of();
        self.a_strides = broadcast_strides(a, &out_shape);
        self.b_strides = broadcast_strides(b, &out_shape);
        self.sizes = LaunchSizes::from_shapes(
            &[(&a[..], dtype), (&b[..], dtype)],
            &[(out_shape.clone(), dtype)],
        );
        self.search = search_cache().slot(SearchKey::new(op, &(dtype, &a[..], &b[..])));
        self.a_shape = a.clone();
        self.b_shape = b.clone();
        self.out_shape = out_shape;
        Ok(())
    }

    fn sizes(&self) -> &LaunchSizes {
        &self.sizes
    }

    fn launch(
        &mut self,
        inputs: &[Address],
        _workspace: &mut [AddressMut],
        outputs: &mut [AddressMut],
    ) -> Result<(), KernelError> {
        let op = self.op.name();
        let a = input::<T>(op, inputs, 0, num_elements(&self.a_shape))?;
        let b = input::<T>(op, inputs, 1, num_elements(&self.b_shape))?;
        let out = output::<T>(op, outputs, 0, num_elements(&self.out_shape))?;

        match self.op {
            BinaryOp::Add => self.run(a, b, out, |x, y| Some(x.wrapping_add(y))),
            BinaryOp::Sub => self.run(a, b, out, |x, y| Some(x.wrapping_sub(y))),
            BinaryOp::Mul => self.run(a, b, out, |x, y| Some(x.wrapping_mul(y))),
            BinaryOp::Div => self.run(a, b, out, |x, y| x.checked_div(y)),
            BinaryOp::Maximum => self.run(a, b, out, |x, y| Some(x.max(y))),
            BinaryOp::Minimum => self.run(a, b, out, |x, y| Some(x.min(y))),
        }
    }
}

fn binary_attr<T: Element>() -> KernelAttr {
    let dtype = T::dtype_of();
    KernelAttr::new().input(dtype).input(dtype).output(dtype)
}

pub(crate) fn register(reg: &mut KernelRegistry) {
    for op in BinaryOp::ALL {
        register_typed!(
            reg,
            op.name(),
            [i32, i64, f32, f64],
            |T| binary_attr::<T>(),
            BinaryKernel::<T>::new(op)
        );
    }
}
