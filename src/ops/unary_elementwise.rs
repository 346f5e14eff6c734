use std::marker::PhantomData;

use kernrt_parallel::{Split, parallel_launch_mut};

use crate::address::{Address, AddressMut};
use crate::dtype::DataTypeOf;
use crate::error::KernelError;
use crate::kernel::{Kernel, LaunchSizes, NodeInfo, Shape, num_elements};
use crate::kernel_attr::KernelAttr;
use crate::number::{Float, Number};
use crate::ops::{input, input_shapes, output, register_typed};
use crate::registry::KernelRegistry;

/// Shape bookkeeping shared by the unary kernels.
#[derive(Debug, Default)]
struct UnarySizes {
    len: usize,
    sizes: LaunchSizes,
}

impl UnarySizes {
    fn resize<T: DataTypeOf>(&mut self, op: &str, shapes: &[Shape]) -> Result<(), KernelError> {
        let [shape] = input_shapes::<1>(op, shapes)?;
        let dtype = T::dtype_of();
        self.sizes = LaunchSizes::from_shapes(&[(&shape[..], dtype)], &[(shape.clone(), dtype)]);
        self.len = num_elements(shape);
        Ok(())
    }

    /// Apply `f` to each element of the input, writing to the output.
    fn map<T: Number, F: Fn(T) -> T + Sync>(
        &self,
        op: &str,
        inputs: &[Address],
        outputs: &mut [AddressMut],
        f: F,
    ) -> Result<(), KernelError> {
        let x = input::<T>(op, inputs, 0, self.len)?;
        let out = output::<T>(op, outputs, 0, self.len)?;
        parallel_launch_mut(out, Split::Even, |range, out| {
            for (y, &x) in out.iter_mut().zip(&x[range]) {
                *y = f(x);
            }
            Ok(())
        })
    }
}

/// Element-wise operators defined for all numeric types.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum UnaryOp {
    Relu,
    Neg,
    Abs,
    Square,
}

impl UnaryOp {
    pub const ALL: [UnaryOp; 4] = [UnaryOp::Relu, UnaryOp::Neg, UnaryOp::Abs, UnaryOp::Square];

    pub fn name(self) -> &'static str {
        match self {
            UnaryOp::Relu => "Relu",
            UnaryOp::Neg => "Neg",
            UnaryOp::Abs => "Abs",
            UnaryOp::Square => "Square",
        }
    }
}

#[derive(Debug)]
pub struct UnaryKernel<T> {
    op: UnaryOp,
    sizes: UnarySizes,
    _marker: PhantomData<T>,
}

impl<T: Number> UnaryKernel<T> {
    pub fn new(op: UnaryOp) -> Self {
        UnaryKernel {
            op,
            sizes: UnarySizes::default(),
            _marker: PhantomData,
        }
    }
}

impl<T: Number> Kernel for UnaryKernel<T> {
    fn name(&self) -> &str {
        self.op.name()
    }

    fn init(&mut self, node: &NodeInfo) -> Result<(), KernelError> {
        node.check_arity(1, 1)?;
        node.check_dtypes(&[T::dtype_of()], &[T::dtype_of()])
    }

    fn resize(&mut self, shapes: &[Shape]) -> Result<(), KernelError> {
        self.sizes.resize::<T>(self.op.name(), shapes)
    }

    fn sizes(&self) -> &LaunchSizes {
        &self.sizes.sizes
    }

    fn launch(
        &mut self,
        inputs: &[Address],
        _workspace: &mut [AddressMut],
        outputs: &mut [AddressMut],
    ) -> Result<(), KernelError> {
        let op = self.op.name();
        let sizes = &self.sizes;
        match self.op {
            UnaryOp::Relu => sizes.map(op, inputs, outputs, |x: T| x.max(T::ZERO)),
            UnaryOp::Neg => sizes.map(op, inputs, outputs, |x: T| x.wrapping_neg()),
            UnaryOp::Abs => sizes.map(op, inputs, outputs, |x: T| x.abs()),
            UnaryOp::Square => sizes.map(op, inputs, outputs, |x: T| x.wrapping_mul(x)),
        }
    }
}

/// Element-wise operators defined only for floating point types.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FloatUnaryOp {
    Sigmoid,
    Tanh,
    Sqrt,
    Exp,
}

impl FloatUnaryOp {
    pub const ALL: [FloatUnaryOp; 4] = [
        FloatUnaryOp::Sigmoid,
        FloatUnaryOp::Tanh,
        FloatUnaryOp::Sqrt,
        FloatUnaryOp::Exp,
    ];

    pub fn name(self) -> &'static str {
        match self {
            FloatUnaryOp::Sigmoid => "Sigmoid",
            FloatUnaryOp::Tanh => "Tanh",
            FloatUnaryOp::Sqrt => "Sqrt",
            FloatUnaryOp::Exp => "Exp",
        }
    }
}

#[derive(Debug)]
pub struct FloatUnaryKernel<T> {
    op: FloatUnaryOp,
    sizes: UnarySizes,
    _marker: PhantomData<T>,
}

impl<T: Float> FloatUnaryKernel<T> {
    pub fn new(op: FloatUnaryOp) -> Self {
        FloatUnaryKernel {
            op,
            sizes: UnarySizes::default(),
            _marker: PhantomData,
        }
    }
}

impl<T: Float> Kernel for FloatUnaryKernel<T> {
    fn name(&self) -> &str {
        self.op.name()
    }

    fn init(&mut self, node: &NodeInfo) -> Result<(), KernelError> {
        node.check_arity(1, 1)?;
        node.check_dtypes(&[T::dtype_of()], &[T::dtype_of()])
    }

    fn resize(&mut self, shapes: &[Shape]) -> Result<(), KernelError> {
        self.sizes.resize::<T>(self.op.name(), shapes)
    }

    fn sizes(&self) -> &LaunchSizes {
        &self.sizes.sizes
    }

    fn launch(
        &mut self,
        inputs: &[Address],
        _workspace: &mut [AddressMut],
        outputs: &mut [AddressMut],
    ) -> Result<(), KernelError> {
        let op = self.op.name();
        let sizes = &self.sizes;
        match self.op {
            FloatUnaryOp::Sigmoid => sizes.map(op, inputs, outputs, |x: T| x.sigmoid()),
            FloatUnaryOp::Tanh => sizes.map(op, inputs, outputs, |x: T| x.tanh()),
            FloatUnaryOp::Sqrt => sizes.map(op, inputs, outputs, |x: T| x.sqrt()),
            FloatUnaryOp::Exp => sizes.map(op, inputs, outputs, |x: T| x.exp()),
        }
    }
}

fn unary_attr<T: DataTypeOf>() -> KernelAttr {
    KernelAttr::new().input(T::dtype_of()).output(T::dtype_of())
}

pub(crate) fn register(reg: &mut KernelRegistry) {
    for op in UnaryOp::ALL {
        register_typed!(
            reg,
            op.name(),
            [i32, i64, f32, f64],
            |T| unary_attr::<T>(),
            UnaryKernel::<T>::new(op)
        );
    }
    for op in FloatUnaryOp::ALL {
        register_typed!(
            reg,
            op.name(),
            [f32, f64],
            |T| unary_attr::<T>(),
            FloatUnaryKernel::<T>::new(op)
        );
    }
}

#[cfg(test)]
mod tests {
    use kernrt_testing::{TestCases, expect_close};

    use crate::address::{Address, AddressMut};
    use crate::dtype::{DataType, Element};
    use crate::error::KernelError;
    use crate::kernel::NodeInfo;
    use crate::registry::{DeviceKind, kernel_registry};

    fn run_unary<T: Element + Default>(op: &str, x: &[T]) -> Result<Vec<T>, KernelError> {
        let node = NodeInfo::new(op)
            .input(T::dtype_of(), &[x.len()])
            .output(T::dtype_of(), &[x.len()]);
        let mut kernel = kernel_registry().build(DeviceKind::Cpu, &node)?;
        let mut out = vec![T::default(); x.len()];
        kernel.launch(
            &[Address::from_slice(x)],
            &mut [],
            &mut [AddressMut::from_slice(&mut out)],
        )?;
        Ok(out)
    }

    #[test]
    fn test_integer_unary_ops() {
        let x = [-3i32, 0, 5, i32::MIN];
        assert_eq!(run_unary("Relu", &x).unwrap(), [0, 0, 5, 0]);
        assert_eq!(run_unary("Neg", &x).unwrap(), [3, 0, -5, i32::MIN]);
        assert_eq!(run_unary("Abs", &x).unwrap(), [3, 0, 5, i32::MIN]);
        assert_eq!(run_unary("Square", &[-3i64, 4]).unwrap(), [9, 16]);
    }

    #[test]
    fn test_float_unary_ops() {
        #[derive(Debug)]
        struct Case {
            op: &'static str,
            x: Vec<f32>,
            expected: Vec<f32>,
        }

        let cases = [
            Case {
                op: "Relu",
                x: vec![-1., 0.5],
                expected: vec![0., 0.5],
            },
            Case {
                op: "Sigmoid",
                x: vec![0., 2.],
                expected: vec![0.5, 0.880797],
            },
            Case {
                op: "Tanh",
                x: vec![0., 1.],
                expected: vec![0., 0.761594],
            },
            Case {
                op: "Sqrt",
                x: vec![4., 2.],
                expected: vec![2., 1.414214],
            },
            Case {
                op: "Exp",
                x: vec![0., 1.],
                expected: vec![1., 2.718282],
            },
        ];

        cases.test_each(|case| {
            let out = run_unary(case.op, &case.x).unwrap();
            expect_close(&out, &case.expected).unwrap();
        });
    }

    #[test]
    fn test_large_input() {
        let x: Vec<f64> = (0..10_000).map(|i| i as f64 - 5000.).collect();
        let out = run_unary("Relu", &x).unwrap();
        for (x, y) in x.iter().zip(&out) {
            assert_eq!(*y, x.max(0.));
        }
    }

    #[test]
    fn test_float_ops_reject_integers() {
        let err = run_unary("Sqrt", &[4i32]).unwrap_err();
        assert!(matches!(err, KernelError::NotFound { .. }));
        let err = run_unary("Exp", &[1u8]).unwrap_err();
        assert!(err.to_string().contains(&DataType::UInt8.to_string()));
    }
}
