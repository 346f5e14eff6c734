use std::marker::PhantomData;

use kernrt_parallel::{Split, parallel_config, parallel_launch_mut};

use crate::address::{Address, AddressMut};
use crate::dtype::{DataType, DataTypeOf};
use crate::error::KernelError;
use crate::kernel::{Kernel, LaunchSizes, NodeInfo, Shape, num_elements};
use crate::kernel_attr::KernelAttr;
use crate::number::Number;
use crate::ops::{
    Offsets, contiguous_strides, input, input_shapes, output, output_pair, register_typed,
    resolve_axis,
};
use crate::registry::KernelRegistry;

/// Split for a launch where each unit of work visits `unit_cost` elements.
fn split_for_cost(unit_cost: usize) -> Split<'static> {
    let min_block = parallel_config().min_block_len / unit_cost.max(1);
    Split::EvenMin(min_block.max(1))
}

/// Reduction operators.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ReduceOp {
    Sum,
    /// Arithmetic mean. Integer means truncate towards zero.
    Mean,
    Max,
    Min,
    Prod,
}

impl ReduceOp {
    pub const ALL: [ReduceOp; 5] = [
        ReduceOp::Sum,
        ReduceOp::Mean,
        ReduceOp::Max,
        ReduceOp::Min,
        ReduceOp::Prod,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ReduceOp::Sum => "ReduceSum",
            ReduceOp::Mean => "ReduceMean",
            ReduceOp::Max => "ReduceMax",
            ReduceOp::Min => "ReduceMin",
            ReduceOp::Prod => "ReduceProd",
        }
    }

    /// Return true if reducing zero elements has no defined result.
    fn needs_elements(self) -> bool {
        matches!(self, ReduceOp::Mean | ReduceOp::Max | ReduceOp::Min)
    }
}

/// Layout of a reduction over a contiguous input.
///
/// The input dimensions are divided into kept and reduced dimensions. Each
/// output element corresponds to one position in the kept dimensions, and
/// reduces over every position in the reduced dimensions.
#[derive(Clone, Debug, Default)]
struct ReducePlan {
    kept_shape: Shape,
    kept_strides: Shape,
    reduced_shape: Shape,
    reduced_strides: Shape,
    out_shape: Shape,
}

impl ReducePlan {
    fn new(
        op: ReduceOp,
        shape: &[usize],
        axes: Option<&[i64]>,
        keep_dims: bool,
    ) -> Result<Self, KernelError> {
        let name = op.name();
        let ndim = shape.len();

        let mut reduced = vec![false; ndim];
        match axes {
            None | Some([]) => reduced.fill(true),
            Some(axes) => {
                for &axis in axes {
                    let dim = resolve_axis(name, ndim, axis)?;
                    if reduced[dim] {
                        return Err(KernelError::invalid_attr(
                            name,
                            "axis",
                            format!("axis {} is repeated", axis),
                        ));
                    }
                    reduced[dim] = true;
                }
            }
        }

        let strides = contiguous_strides(shape);
        let mut plan = ReducePlan::default();
        for (dim, &is_reduced) in reduced.iter().enumerate() {
            if is_reduced {
                plan.reduced_shape.push(shape[dim]);
                plan.reduced_strides.push(strides[dim]);
                if keep_dims {
                    plan.out_shape.push(1);
                }
            } else {
                plan.kept_shape.push(shape[dim]);
                plan.kept_strides.push(strides[dim]);
                plan.out_shape.push(shape[dim]);
            }
        }

        if op.needs_elements() && plan.reduced_len() == 0 && num_elements(&plan.out_shape) > 0 {
            return Err(KernelError::invalid_shape(
                name,
                format!("cannot reduce empty dimensions of shape {:?}", shape),
            ));
        }

        Ok(plan)
    }

    fn reduced_len(&self) -> usize {
        num_elements(&self.reduced_shape)
    }
}

/// Reduces its input over a set of axes.
///
/// Attributes:
///
/// - `axis`: int or list of ints. If missing or empty, all axes are reduced.
/// - `keep_dims`: keep reduced axes as size-1 dimensions. Defaults to false.
#[derive(Debug)]
pub struct ReduceKernel<T> {
    op: ReduceOp,
    axes: Option<Vec<i64>>,
    keep_dims: bool,
    in_len: usize,
    plan: ReducePlan,
    sizes: LaunchSizes,
    _marker: PhantomData<T>,
}

impl<T: Number> ReduceKernel<T> {
    pub fn new(op: ReduceOp) -> Self {
        ReduceKernel {
            op,
            axes: None,
            keep_dims: false,
            in_len: 0,
            plan: ReducePlan::default(),
            sizes: LaunchSizes::default(),
            _marker: PhantomData,
        }
    }

    fn run<F, G>(&self, x: &[T], out: &mut [T], init: T, fold: F, finish: G) -> Result<(), KernelError>
    where
        F: Fn(T, T) -> T + Sync,
        G: Fn(T) -> T + Sync,
    {
        let plan = &self.plan;
        let reduced_len = plan.reduced_len();

        parallel_launch_mut(out, split_for_cost(reduced_len), |range, out| {
            let bases = Offsets::new(&plan.kept_shape, &plan.kept_strides, range);
            for (y, base) in out.iter_mut().zip(bases) {
                let acc = Offsets::new(&plan.reduced_shape, &plan.reduced_strides, 0..reduced_len)
                    .fold(init, |acc, offset| fold(acc, x[base + offset]));
                *y = finish(acc);
            }
            Ok(())
        })
    }
}

impl<T: Number> Kernel for ReduceKernel<T> {
    fn name(&self) -> &str {
        self.op.name()
    }

    fn init(&mut self, node: &NodeInfo) -> Result<(), KernelError> {
        node.check_arity(1, 1)?;
        self.axes = node.ints_attr("axis")?;
        self.keep_dims = node.bool_attr("keep_dims", false)?;

        // Validate axes against the static input rank.
        ReducePlan::new(
            self.op,
            &node.inputs[0].shape,
            self.axes.as_deref(),
            self.keep_dims,
        )?;
        Ok(())
    }

    fn resize(&mut self, shapes: &[Shape]) -> Result<(), KernelError> {
        let [shape] = input_shapes::<1>(self.op.name(), shapes)?;
        let plan = ReducePlan::new(self.op, shape, self.axes.as_deref(), self.keep_dims)?;

        let dtype = T::dtype_of();
        self.sizes =
            LaunchSizes::from_shapes(&[(&shape[..], dtype)], &[(plan.out_shape.clone(), dtype)]);
        self.in_len = num_elements(shape);
        self.plan = plan;
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
        let name = self.op.name();
        let x = input::<T>(name, inputs, 0, self.in_len)?;
        let out = output::<T>(name, outputs, 0, num_elements(&self.plan.out_shape))?;
        let id = |acc: T| acc;

        match self.op {
            ReduceOp::Sum => self.run(x, out, T::ZERO, T::wrapping_add, id),
            ReduceOp::Prod => self.run(x, out, T::ONE, T::wrapping_mul, id),
            ReduceOp::Max => self.run(x, out, T::MIN_VAL, T::max, id),
            ReduceOp::Min => self.run(x, out, T::MAX_VAL, T::min, id),
            ReduceOp::Mean => {
                let count = T::from_usize(self.plan.reduced_len());
                self.run(x, out, T::ZERO, T::wrapping_add, |sum: T| {
                    sum.checked_div(count).unwrap_or(T::ZERO)
                })
            }
        }
    }
}

/// Index-returning reduction operators.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ArgReduceOp {
    ArgMax,
    ArgMin,
}

impl ArgReduceOp {
    pub fn name(self) -> &'static str {
        match self {
            ArgReduceOp::ArgMax => "ArgMaxWithValue",
            ArgReduceOp::ArgMin => "ArgMinWithValue",
        }
    }
}

/// Returns the index and value of the largest or smallest element along an
/// axis.
///
/// Outputs are the `i32` index and the value. Ties resolve to the first
/// occurrence and NaN is treated as greater than (for `ArgMax`) or less than
/// (for `ArgMin`) every other value.
///
/// A scalar input is accepted when `axis` is 0 or -1. Both outputs are then
/// scalars, the index is 0 and the value is the input.
#[derive(Debug)]
pub struct ArgReduceKernel<T> {
    op: ArgReduceOp,
    axis: i64,
    keep_dims: bool,

    /// Product of dimensions before the axis.
    outer: usize,
    axis_len: usize,
    /// Product of dimensions after the axis.
    inner: usize,

    sizes: LaunchSizes,
    _marker: PhantomData<T>,
}

impl<T: Number> ArgReduceKernel<T> {
    pub fn new(op: ArgReduceOp) -> Self {
        ArgReduceKernel {
            op,
            axis: 0,
            keep_dims: false,
            outer: 0,
            axis_len: 0,
            inner: 0,
            sizes: LaunchSizes::default(),
            _marker: PhantomData,
        }
    }

    /// Compute `(outer, axis_len, inner, out_shape)` for an input shape.
    fn layout(&self, shape: &[usize]) -> Result<(usize, usize, usize, Shape), KernelError> {
        let name = self.op.name();

        if shape.is_empty() {
            if self.axis != 0 && self.axis != -1 {
                return Err(KernelError::invalid_attr(
                    name,
                    "axis",
                    format!("axis must be 0 or -1 for a scalar input, got {}", self.axis),
                ));
            }
            return Ok((1, 1, 1, Shape::new()));
        }

        let dim = resolve_axis(name, shape.len(), self.axis)?;
        let axis_len = shape[dim];
        if axis_len == 0 {
            return Err(KernelError::invalid_shape(
                name,
                format!("cannot reduce empty axis {} of shape {:?}", dim, shape),
            ));
        }
        if axis_len > i32::MAX as usize {
            return Err(KernelError::invalid_shape(
                name,
                format!("axis size {} exceeds the index type range", axis_len),
            ));
        }

        let mut out_shape: Shape = shape.into();
        if self.keep_dims {
            out_shape[dim] = 1;
        } else {
            out_shape.remove(dim);
        }
        let outer = num_elements(&shape[..dim]);
        let inner = num_elements(&shape[dim + 1..]);
        Ok((outer, axis_len, inner, out_shape))
    }

    fn run<F>(&self, x: &[T], indices: &mut [i32], values: &mut [T], better: F) -> Result<(), KernelError>
    where
        F: Fn(T, T) -> bool + Sync,
    {
        let (axis_len, inner) = (self.axis_len, self.inner);

        parallel_launch_mut(
            (indices, values),
            split_for_cost(axis_len),
            |range, (indices, values)| {
                for ((index, value), pos) in indices.iter_mut().zip(values.iter_mut()).zip(range) {
                    let base = (pos / inner) * axis_len * inner + pos % inner;
                    let (mut best_index, mut best) = (0, x[base]);
                    for k in 1..axis_len {
                        let val = x[base + k * inner];
                        if better(val, best) {
                            best_index = k;
                            best = val;
                        }
                    }
                    *index = best_index as i32;
                    *value = best;
                }
                Ok(())
            },
        )
    }
}

impl<T: Number> Kernel for ArgReduceKernel<T> {
    fn name(&self) -> &str {
        self.op.name()
    }

    fn init(&mut self, node: &NodeInfo) -> Result<(), KernelError> {
        node.check_arity(1, 2)?;
        self.axis = node.int_attr("axis", 0)?;
        self.keep_dims = node.bool_attr("keep_dims", false)?;
        self.layout(&node.inputs[0].shape)?;
        Ok(())
    }

    fn resize(&mut self, shapes: &[Shape]) -> Result<(), KernelError> {
        let [shape] = input_shapes::<1>(self.op.name(), shapes)?;
        let (outer, axis_len, inner, out_shape) = self.layout(shape)?;

        let dtype = T::dtype_of();
        self.sizes = LaunchSizes::from_shapes(
            &[(&shape[..], dtype)],
            &[(out_shape.clone(), DataType::Int32), (out_shape, dtype)],
        );
        self.outer = outer;
        self.axis_len = axis_len;
        self.inner = inner;
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
        let name = self.op.name();
        let out_len = self.outer * self.inner;
        let x = input::<T>(name, inputs, 0, out_len * self.axis_len)?;
        let (indices, values) = output_pair::<i32, T>(name, outputs, (out_len, out_len))?;

        match self.op {
            ArgReduceOp::ArgMax => self.run(x, indices, values, |val, best| {
                val > best || (val.is_nan() && !best.is_nan())
            }),
            ArgReduceOp::ArgMin => self.run(x, indices, values, |val, best| {
                val < best || (val.is_nan() && !best.is_nan())
            }),
        }
    }
}

pub(crate) fn register(reg: &mut KernelRegistry) {
    for op in ReduceOp::ALL {
        register_typed!(
            reg,
            op.name(),
            [i32, i64, f32, f64],
            |T| KernelAttr::new().input(T::dtype_of()).output(T::dtype_of()),
            ReduceKernel::<T>::new(op)
        );
    }
    for op in [ArgReduceOp::ArgMax, ArgReduceOp::ArgMin] {
        register_typed!(
            reg,
            op.name(),
            [i32, i64, f32, f64],
            |T| KernelAttr::new()
                .input(T::dtype_of())
                .output(DataType::Int32)
                .output(T::dtype_of()),
            ArgReduceKernel::<T>::new(op)
        );
    }
}
