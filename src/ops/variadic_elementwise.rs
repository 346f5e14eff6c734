use std::marker::PhantomData;

use kernrt_parallel::{Split, parallel_launch_mut};

use crate::address::{Address, AddressMut};
use crate::dtype::DataTypeOf;
use crate::error::KernelError;
use crate::kernel::{Kernel, LaunchSizes, NodeInfo, Shape, num_elements};
use crate::kernel_attr::KernelAttr;
use crate::number::Number;
use crate::ops::{input, output, register_typed};
use crate::registry::KernelRegistry;

/// Sum of any number of inputs with identical shapes.
#[derive(Debug)]
pub struct AddNKernel<T> {
    n_inputs: usize,
    len: usize,
    sizes: LaunchSizes,
    _marker: PhantomData<T>,
}

impl<T: Number> AddNKernel<T> {
    pub fn new() -> Self {
        AddNKernel {
            n_inputs: 0,
            len: 0,
            sizes: LaunchSizes::default(),
            _marker: PhantomData,
        }
    }
}

impl<T: Number> Default for AddNKernel<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Number> Kernel for AddNKernel<T> {
    fn name(&self) -> &str {
        "AddN"
    }

    fn init(&mut self, node: &NodeInfo) -> Result<(), KernelError> {
        if node.inputs.is_empty() {
            return Err(KernelError::wrong_arity("AddN", "inputs", "at least 1", 0));
        }
        node.check_arity(node.inputs.len(), 1)
    }

    fn resize(&mut self, shapes: &[Shape]) -> Result<(), KernelError> {
        let Some(first) = shapes.first() else {
            return Err(KernelError::wrong_arity("AddN", "input shapes", "at least 1", 0));
        };
        if let Some(other) = shapes.iter().find(|shape| *shape != first) {
            return Err(KernelError::invalid_shape(
                "AddN",
                format!("input shapes {:?} and {:?} differ", first, other),
            ));
        }

        let dtype = T::dtype_of();
        let input_sizes: Vec<(&[usize], _)> = shapes.iter().map(|s| (&s[..], dtype)).collect();
        self.sizes = LaunchSizes::from_shapes(&input_sizes, &[(first.clone(), dtype)]);
        self.n_inputs = shapes.len();
        self.len = num_elements(first);
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
        let terms = (0..self.n_inputs)
            .map(|index| input::<T>("AddN", inputs, index, self.len))
            .collect::<Result<Vec<_>, _>>()?;
        let out = output::<T>("AddN", outputs, 0, self.len)?;

        parallel_launch_mut(out, Split::Even, |range, out| {
            out.copy_from_slice(&terms[0][range.clone()]);
            for term in &terms[1..] {
                for (y, &x) in out.iter_mut().zip(&term[range.clone()]) {
                    *y = y.wrapping_add(x);
                }
            }
            Ok::<_, KernelError>(())
        })
    }
}

pub(crate) fn register(reg: &mut KernelRegistry) {
    register_typed!(
        reg,
        "AddN",
        [i32, i64, f32, f64],
        |T| KernelAttr::new()
            .input(T::dtype_of())
            .output(T::dtype_of())
            .all_same(),
        AddNKernel::<T>::new()
    );
}

#[cfg(test)]
mod tests {
    use crate::address::{Address, AddressMut};
    use crate::dtype::DataType;
    use crate::error::KernelError;
    use crate::kernel::NodeInfo;
    use crate::registry::{DeviceKind, kernel_registry};

    fn add_n_node(dtype: DataType, n: usize, shape: &[usize]) -> NodeInfo {
        (0..n)
            .fold(NodeInfo::new("AddN"), |node, _| node.input(dtype, shape))
            .output(dtype, shape)
    }

    #[test]
    fn test_add_n() {
        for n in 1..=4 {
            let node = add_n_node(DataType::Int64, n, &[2, 2]);
            let mut kernel = kernel_registry().build(DeviceKind::Cpu, &node).unwrap();

            let terms: Vec<Vec<i64>> = (0..n as i64)
                .map(|i| vec![i, 10 * i, 100 * i, 1000 * i])
                .collect();
            let inputs: Vec<Address> = terms.iter().map(|t| Address::from_slice(&t[..])).collect();
            let mut out = [0i64; 4];
            kernel
                .launch(&inputs, &mut [], &mut [AddressMut::from_slice(&mut out)])
                .unwrap();

            let total: i64 = (0..n as i64).sum();
            assert_eq!(out, [total, 10 * total, 100 * total, 1000 * total]);
        }
    }

    #[test]
    fn test_add_n_mixed_types_not_found() {
        let node = NodeInfo::new("AddN")
            .input(DataType::Float32, &[2])
            .input(DataType::Int32, &[2])
            .output(DataType::Float32, &[2]);
        let err = kernel_registry().build(DeviceKind::Cpu, &node).unwrap_err();
        assert!(matches!(err, KernelError::NotFound { .. }));

        // A node without inputs matches no variadic signature.
        let node = NodeInfo::new("AddN").output(DataType::Float32, &[2]);
        assert!(kernel_registry().build(DeviceKind::Cpu, &node).is_err());
    }

    #[test]
    fn test_add_n_shape_mismatch() {
        let node = NodeInfo::new("AddN")
            .input(DataType::Float32, &[2])
            .input(DataType::Float32, &[3])
            .output(DataType::Float32, &[3]);
        let err = kernel_registry().build(DeviceKind::Cpu, &node).unwrap_err();
        assert!(matches!(err, KernelError::InvalidShape { .. }));
    }
}
