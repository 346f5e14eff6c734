//! Optimizer kernels that apply a sparse gradient to a dense variable.
//!
//! The variable `var` and its accumulator `accum` have shape
//! `[first_dim, ...]` and are updated in place. The gradient has one row per
//! entry of the 1D `indices` input. Rows with repeated indices are summed
//! before the update, and only rows named by an index are touched.

use std::marker::PhantomData;

use kernrt_parallel::{Rows, Split, parallel_config, parallel_launch_mut};

use crate::address::{Address, AddressMut};
use crate::dtype::{DataTypeOf, Element};
use crate::error::KernelError;
use crate::kernel::{Kernel, LaunchSizes, NodeInfo, Shape, num_elements};
use crate::kernel_attr::KernelAttr;
use crate::number::Float;
use crate::ops::{
    check_scalar, input, input_scalar, input_shapes, output, output_pair, register_typed,
};
use crate::registry::KernelRegistry;
use crate::sparse::{SparseIndex, reduce_sparse_gradient_par};

/// `var` and `accum` are updated through outputs 0 and 1.
const STATE_REFS: [(usize, usize); 2] = [(0, 0), (1, 1)];

/// Shape bookkeeping shared by the sparse optimizers.
#[derive(Clone, Debug, Default)]
struct SparseLayout {
    first_dim: usize,
    outer_dim: usize,
    count: usize,
}

impl SparseLayout {
    /// Validate the shapes of `var`, `accum`, `grad` and `indices`.
    fn new(
        op: &str,
        var: &[usize],
        accum: &[usize],
        grad: &[usize],
        indices: &[usize],
    ) -> Result<Self, KernelError> {
        let Some((&first_dim, row_shape)) = var.split_first() else {
            return Err(KernelError::invalid_shape(op, "var must have at least 1 dim"));
        };
        if accum != var {
            return Err(KernelError::invalid_shape(
                op,
                format!("accum shape {:?} does not match var shape {:?}", accum, var),
            ));
        }
        let &[count] = indices else {
            return Err(KernelError::invalid_shape(
                op,
                format!("indices must be a vector, got shape {:?}", indices),
            ));
        };
        if grad.split_first() != Some((&count, row_shape)) {
            return Err(KernelError::invalid_shape(
                op,
                format!(
                    "grad shape {:?} does not match {} indices into var of shape {:?}",
                    grad, count, var
                ),
            ));
        }

        Ok(SparseLayout {
            first_dim,
            outer_dim: num_elements(row_shape),
            count,
        })
    }

    fn var_len(&self) -> usize {
        self.first_dim * self.outer_dim
    }
}

/// Copy state input `index` into the matching output unless the input is
/// empty or already aliases the output.
fn load_state<T: Element>(
    op: &str,
    inputs: &[Address],
    outputs: &mut [AddressMut],
    index: usize,
    len: usize,
) -> Result<(), KernelError> {
    let Some(src_addr) = inputs.get(index) else {
        return Ok(());
    };
    if src_addr.is_empty() {
        return Ok(());
    }
    let dst = output::<T>(op, outputs, index, len)?;
    if src_addr.as_ptr() == dst.as_ptr() as *const u8 {
        return Ok(());
    }
    let src = input::<T>(op, inputs, index, len)?;
    dst.copy_from_slice(src);
    Ok(())
}

/// Reduce the gradient and apply `update(var_row, accum_row, grad_row)` to
/// each touched row.
fn apply_sparse<T, I, F>(
    op: &str,
    layout: &SparseLayout,
    inputs: &[Address],
    outputs: &mut [AddressMut],
    (grad_index, indices_index): (usize, usize),
    update: F,
) -> Result<(), KernelError>
where
    T: Float,
    I: SparseIndex,
    F: Fn(&mut [T], &mut [T], &[T]) + Sync,
{
    let var_len = layout.var_len();
    let outer_dim = layout.outer_dim;
    load_state::<T>(op, inputs, outputs, 0, var_len)?;
    load_state::<T>(op, inputs, outputs, 1, var_len)?;

    let grad = input::<T>(op, inputs, grad_index, layout.count * outer_dim)?;
    let indices = input::<I>(op, inputs, indices_index, layout.count)?;
    let grad = reduce_sparse_gradient_par(indices, grad, layout.first_dim, outer_dim)
        .map_err(|err| KernelError::sparse(op, err))?;

    tracing::trace!(
        op,
        rows = layout.count,
        unique_rows = grad.count(),
        "reduced sparse gradient"
    );

    let (var, accum) = output_pair::<T, T>(op, outputs, (var_len, var_len))?;
    let state = (Rows::new(var, outer_dim), Rows::new(accum, outer_dim));
    let min_rows = (parallel_config().min_block_len / outer_dim.max(1)).max(1);

    parallel_launch_mut(state, Split::EvenMin(min_rows), |range, (mut var, mut accum)| {
        // Indices are ascending and unique, so each block owns a contiguous
        // run of them.
        let start = grad
            .indices
            .partition_point(|&i| (i.to_i64() as usize) < range.start);
        let end = grad
            .indices
            .partition_point(|&i| (i.to_i64() as usize) < range.end);

        for k in start..end {
            let row = grad.indices[k].to_i64() as usize - range.start;
            let g = &grad.values[k * outer_dim..(k + 1) * outer_dim];
            update(var.row_mut(row), accum.row_mut(row), g);
        }
        Ok(())
    })
}

/// Sparse Adagrad update.
///
/// Inputs are `var`, `accum`, `grad` and `indices`. For each touched row:
///
/// ```text
/// accum += grad * grad        (if update_slots)
/// var -= lr * grad / (sqrt(accum) + epsilon)
/// ```
///
/// Attributes are `lr` (required), `epsilon` (default 0) and `update_slots`
/// (default true).
#[derive(Debug)]
pub struct SparseApplyAdagradKernel<T, I> {
    lr: f64,
    epsilon: f64,
    update_slots: bool,
    layout: SparseLayout,
    sizes: LaunchSizes,
    _marker: PhantomData<(T, I)>,
}

impl<T: Float, I: SparseIndex> SparseApplyAdagradKernel<T, I> {
    pub fn new() -> Self {
        SparseApplyAdagradKernel {
            lr: 0.,
            epsilon: 0.,
            update_slots: true,
            layout: SparseLayout::default(),
            sizes: LaunchSizes::default(),
            _marker: PhantomData,
        }
    }
}

impl<T: Float, I: SparseIndex> Default for SparseApplyAdagradKernel<T, I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Float, I: SparseIndex> Kernel for SparseApplyAdagradKernel<T, I> {
    fn name(&self) -> &str {
        "SparseApplyAdagrad"
    }

    fn init(&mut self, node: &NodeInfo) -> Result<(), KernelError> {
        node.check_arity(4, 2)?;
        if node.attr("lr").is_none() {
            return Err(KernelError::invalid_attr(
                "SparseApplyAdagrad",
                "lr",
                "attribute is required",
            ));
        }
        self.lr = node.float_attr("lr", 0.)?;
        self.epsilon = node.float_attr("epsilon", 0.)?;
        self.update_slots = node.bool_attr("update_slots", true)?;
        Ok(())
    }

    fn resize(&mut self, shapes: &[Shape]) -> Result<(), KernelError> {
        let op = "SparseApplyAdagrad";
        let [var, accum, grad, indices] = input_shapes::<4>(op, shapes)?;
        self.layout = SparseLayout::new(op, var, accum, grad, indices)?;

        let dtype = T::dtype_of();
        self.sizes = LaunchSizes::from_shapes(
            &[
                (&var[..], dtype),
                (&accum[..], dtype),
                (&grad[..], dtype),
                (&indices[..], I::dtype_of()),
            ],
            &[(var.clone(), dtype), (accum.clone(), dtype)],
        );
        Ok(())
    }

    fn sizes(&self) -> &LaunchSizes {
        &self.sizes
    }

    fn ref_outputs(&self) -> &[(usize, usize)] {
        &STATE_REFS
    }

    fn launch(
        &mut self,
        inputs: &[Address],
        _workspace: &mut [AddressMut],
        outputs: &mut [AddressMut],
    ) -> Result<(), KernelError> {
        let lr = T::from_f64(self.lr);
        let epsilon = T::from_f64(self.epsilon);
        let update_slots = self.update_slots;

        apply_sparse::<T, I, _>(
            "SparseApplyAdagrad",
            &self.layout,
            inputs,
            outputs,
            (2, 3),
            |var, accum, grad| {
                for ((v, a), &g) in var.iter_mut().zip(accum.iter_mut()).zip(grad) {
                    if update_slots {
                        *a = *a + g * g;
                    }
                    *v = *v - lr * g / (a.sqrt() + epsilon);
                }
            },
        )
    }
}

/// Sparse proximal Adagrad update with L1 and L2 regularization.
///
/// Inputs are `var`, `accum`, `lr`, `l1`, `l2`, `grad` and `indices`, where
/// `lr`, `l1` and `l2` are scalars. For each touched row:
///
/// ```text
/// accum += grad * grad
/// rate = lr / sqrt(accum)
/// prox = var - grad * rate
/// var = sign(prox) * max(|prox| - rate * l1, 0) / (1 + rate * l2)
/// ```
///
/// When `l1` is not positive the shrinkage step is skipped.
#[derive(Debug)]
pub struct SparseApplyProximalAdagradKernel<T, I> {
    layout: SparseLayout,
    sizes: LaunchSizes,
    _marker: PhantomData<(T, I)>,
}

impl<T: Float, I: SparseIndex> SparseApplyProximalAdagradKernel<T, I> {
    pub fn new() -> Self {
        SparseApplyProximalAdagradKernel {
            layout: SparseLayout::default(),
            sizes: LaunchSizes::default(),
            _marker: PhantomData,
        }
    }

    fn check_hyperparams(shapes: &[Shape]) -> Result<(), KernelError> {
        let op = "SparseApplyProximalAdagrad";
        for (index, name) in [(2, "lr"), (3, "l1"), (4, "l2")] {
            if let Some(shape) = shapes.get(index) {
                check_scalar(op, name, shape)?;
            }
        }
        Ok(())
    }
}

impl<T: Float, I: SparseIndex> Default for SparseApplyProximalAdagradKernel<T, I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Float, I: SparseIndex> Kernel for SparseApplyProximalAdagradKernel<T, I> {
    fn name(&self) -> &str {
        "SparseApplyProximalAdagrad"
    }

    fn init(&mut self, node: &NodeInfo) -> Result<(), KernelError> {
        node.check_arity(7, 2)?;
        Self::check_hyperparams(&node.input_shapes())
    }

    fn resize(&mut self, shapes: &[Shape]) -> Result<(), KernelError> {
        let op = "SparseApplyProximalAdagrad";
        let [var, accum, lr, l1, l2, grad, indices] = input_shapes::<7>(op, shapes)?;
        Self::check_hyperparams(shapes)?;
        self.layout = SparseLayout::new(op, var, accum, grad, indices)?;

        let dtype = T::dtype_of();
        self.sizes = LaunchSizes::from_shapes(
            &[
                (&var[..], dtype),
                (&accum[..], dtype),
                (&lr[..], dtype),
                (&l1[..], dtype),
                (&l2[..], dtype),
                (&grad[..], dtype),
                (&indices[..], I::dtype_of()),
            ],
            &[(var.clone(), dtype), (accum.clone(), dtype)],
        );
        Ok(())
    }

    fn sizes(&self) -> &LaunchSizes {
        &self.sizes
    }

    fn ref_outputs(&self) -> &[(usize, usize)] {
        &STATE_REFS
    }

    fn launch(
        &mut self,
        inputs: &[Address],
        _workspace: &mut [AddressMut],
        outputs: &mut [AddressMut],
    ) -> Result<(), KernelError> {
        let op = "SparseApplyProximalAdagrad";
        let lr = input_scalar::<T>(op, inputs, 2)?;
        let l1 = input_scalar::<T>(op, inputs, 3)?;
        let l2 = input_scalar::<T>(op, inputs, 4)?;

        apply_sparse::<T, I, _>(op, &self.layout, inputs, outputs, (5, 6), |var, accum, grad| {
            for ((v, a), &g) in var.iter_mut().zip(accum.iter_mut()).zip(grad) {
                *a = *a + g * g;
                let rate = lr / a.sqrt();
                let prox = *v - g * rate;
                let scale = T::ONE + rate * l2;
                *v = if l1 > T::ZERO {
                    let shrunk = (prox.abs() - rate * l1).max(T::ZERO);
                    let sign = if prox > T::ZERO {
                        T::ONE
                    } else if prox < T::ZERO {
                        -T::ONE
                    } else {
                        T::ZERO
                    };
                    sign * shrunk / scale
                } else {
                    prox / scale
                };
            }
        })
    }
}

fn optimizer_attr<T: DataTypeOf, I: DataTypeOf>(n_float_inputs: usize) -> KernelAttr {
    let attr = (0..n_float_inputs).fold(KernelAttr::new(), |attr, _| attr.input(T::dtype_of()));
    attr.input(I::dtype_of())
        .output(T::dtype_of())
        .output(T::dtype_of())
}

pub(crate) fn register(reg: &mut KernelRegistry) {
    register_typed!(
        reg,
        "SparseApplyAdagrad",
        [f32, f64],
        |T| optimizer_attr::<T, i32>(3),
        SparseApplyAdagradKernel::<T, i32>::new()
    );
    register_typed!(
        reg,
        "SparseApplyAdagrad",
        [f32, f64],
        |T| optimizer_attr::<T, i64>(3),
        SparseApplyAdagradKernel::<T, i64>::new()
    );
    register_typed!(
        reg,
        "SparseApplyProximalAdagrad",
        [f32, f64],
        |T| optimizer_attr::<T, i32>(6),
        SparseApplyProximalAdagradKernel::<T, i32>::new()
    );
    register_typed!(
        reg,
        "SparseApplyProximalAdagrad",
        [f32, f64],
        |T| optimizer_attr::<T, i64>(6),
        SparseApplyProximalAdagradKernel::<T, i64>::new()
    );
}
