use std::marker::PhantomData;

use kernrt_parallel::{Split, parallel_launch_mut};

use crate::address::{Address, AddressMut};
use crate::dtype::{DataTypeOf, Element};
use crate::error::KernelError;
use crate::kernel::{Kernel, LaunchSizes, NodeInfo, Shape, num_elements};
use crate::kernel_attr::KernelAttr;
use crate::number::CastFrom;
use crate::ops::{input, input_shapes, output};
use crate::registry::{DeviceKind, KernelRegistry};

/// Converts elements from type `S` to type `D` with the semantics of an
/// `as` cast.
#[derive(Debug)]
pub struct CastKernel<S, D> {
    len: usize,
    sizes: LaunchSizes,
    _marker: PhantomData<(S, D)>,
}

impl<S: Element, D: Element + CastFrom<S>> CastKernel<S, D> {
    pub fn new() -> Self {
        CastKernel {
            len: 0,
            sizes: LaunchSizes::default(),
            _marker: PhantomData,
        }
    }
}

impl<S: Element, D: Element + CastFrom<S>> Default for CastKernel<S, D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Element, D: Element + CastFrom<S>> Kernel for CastKernel<S, D> {
    fn name(&self) -> &str {
        "Cast"
    }

    fn init(&mut self, node: &NodeInfo) -> Result<(), KernelError> {
        node.check_arity(1, 1)?;
        node.check_dtypes(&[S::dtype_of()], &[D::dtype_of()])
    }

    fn resize(&mut self, shapes: &[Shape]) -> Result<(), KernelError> {
        let [shape] = input_shapes::<1>("Cast", shapes)?;
        self.sizes = LaunchSizes::from_shapes(
            &[(&shape[..], S::dtype_of())],
            &[(shape.clone(), D::dtype_of())],
        );
        self.len = num_elements(shape);
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
        let x = input::<S>("Cast", inputs, 0, self.len)?;
        let out = output::<D>("Cast", outputs, 0, self.len)?;
        parallel_launch_mut(out, Split::Even, |range, out| {
            for (y, &x) in out.iter_mut().zip(&x[range]) {
                *y = D::cast_from(x);
            }
            Ok(())
        })
    }
}

macro_rules! register_cast_from {
    ($reg:expr, $from:ty => $($to:ty),*) => {
        $(
            $reg.register(
                "Cast",
                DeviceKind::Cpu,
                KernelAttr::new()
                    .input(<$from>::dtype_of())
                    .output(<$to>::dtype_of()),
                || -> Box<dyn Kernel> { Box::new(CastKernel::<$from, $to>::new()) },
            );
        )*
    };
}

macro_rules! register_cast {
    ($reg:expr, $($from:ty),*) => {
        $(
            register_cast_from!($reg, $from => i8, i16, i32, i64, u8, u16, u32, u64, f32, f64);
        )*
    };
}

pub(crate) fn register(reg: &mut KernelRegistry) {
    register_cast!(reg, i8, i16, i32, i64, u8, u16, u32, u64, f32, f64);
}

#[cfg(test)]
mod tests {
    use crate::address::{Address, AddressMut};
    use crate::dtype::DataType;
    use crate::kernel::NodeInfo;
    use crate::registry::{DeviceKind, kernel_registry};

    fn cast_node(from: DataType, to: DataType, len: usize) -> NodeInfo {
        NodeInfo::new("Cast").input(from, &[len]).output(to, &[len])
    }

    #[test]
    fn test_cast() {
        let node = cast_node(DataType::Float32, DataType::Int8, 5);
        let mut kernel = kernel_registry().build(DeviceKind::Cpu, &node).unwrap();
        let x = [1.9f32, -1.9, 300., f32::NAN, -300.];
        let mut out = [0i8; 5];
        kernel
            .launch(&[Address::from_slice(&x)], &mut [], &mut [AddressMut::from_slice(&mut out)])
            .unwrap();
        assert_eq!(out, [1, -1, 127, 0, -128]);

        let node = cast_node(DataType::Int64, DataType::UInt16, 2);
        let mut kernel = kernel_registry().build(DeviceKind::Cpu, &node).unwrap();
        assert_eq!(kernel.sizes().unwrap().inputs, [16]);
        assert_eq!(kernel.sizes().unwrap().outputs, [4]);
        let mut out = [0u16; 2];
        kernel
            .launch(
                &[Address::from_slice(&[65537i64, -1])],
                &mut [],
                &mut [AddressMut::from_slice(&mut out)],
            )
            .unwrap();
        assert_eq!(out, [1, u16::MAX]);
    }

    #[test]
    fn test_cast_registrations() {
        let attrs = kernel_registry().supported_attrs("Cast", DeviceKind::Cpu);
        assert_eq!(attrs.len(), 100);

        // Bool has no element representation.
        let node = cast_node(DataType::Bool, DataType::Float32, 1);
        assert!(kernel_registry().build(DeviceKind::Cpu, &node).is_err());
    }
}
