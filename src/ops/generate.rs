use std::marker::PhantomData;

use kernrt_parallel::{Split, parallel_launch_mut};
use smallvec::smallvec;

use crate::address::{Address, AddressMut};
use crate::dtype::DataTypeOf;
use crate::error::KernelError;
use crate::kernel::{Kernel, LaunchSizes, NodeInfo, Shape};
use crate::kernel_attr::KernelAttr;
use crate::number::Number;
use crate::ops::{check_scalar, input_scalar, input_shapes, output, register_typed};
use crate::registry::KernelRegistry;

/// Default upper bound on the length of a `Range` output.
pub const DEFAULT_RANGE_MAXLEN: i64 = 1_000_000;

/// Return the number of values in `[start, limit)` with step `delta`.
fn range_len<T: Number>(start: T, limit: T, delta: T) -> Result<usize, KernelError> {
    if delta == T::ZERO {
        return Err(KernelError::invalid_value("Range", "delta must be non-zero"));
    }

    if let (Some(start), Some(limit), Some(delta)) =
        (start.to_i128(), limit.to_i128(), delta.to_i128())
    {
        let span = limit - start;
        if span == 0 || (span > 0) != (delta > 0) {
            return Ok(0);
        }
        let len = span.unsigned_abs().div_ceil(delta.unsigned_abs());
        return usize::try_from(len).map_err(|_| {
            KernelError::invalid_value("Range", format!("length {} is too large", len))
        });
    }

    let (start, limit, delta) = (start.to_f64(), limit.to_f64(), delta.to_f64());
    let span = limit - start;
    if span == 0. || (span > 0.) != (delta > 0.) {
        return Ok(0);
    }

    let len = (span / delta).ceil();
    if !len.is_finite() {
        return Err(KernelError::invalid_value(
            "Range",
            format!(
                "cannot generate values from {} to {} with step {}",
                start, limit, delta
            ),
        ));
    }
    Ok(len as usize)
}

/// Generates the sequence `start, start + delta, ...` up to but excluding
/// `limit`.
///
/// The inputs are the scalars `start`, `limit` and `delta`. The output
/// length is only known at launch, so the output buffer is sized for
/// `maxlen` elements and the realized shape is reported afterwards.
#[derive(Debug)]
pub struct RangeKernel<T> {
    maxlen: usize,
    sizes: LaunchSizes,
    realized: Vec<Shape>,
    _marker: PhantomData<T>,
}

impl<T: Number> RangeKernel<T> {
    pub fn new() -> Self {
        RangeKernel {
            maxlen: DEFAULT_RANGE_MAXLEN as usize,
            sizes: LaunchSizes::default(),
            realized: Vec::new(),
            _marker: PhantomData,
        }
    }
}

impl<T: Number> Default for RangeKernel<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Number> Kernel for RangeKernel<T> {
    fn name(&self) -> &str {
        "Range"
    }

    fn init(&mut self, node: &NodeInfo) -> Result<(), KernelError> {
        node.check_arity(3, 1)?;
        let maxlen = node.int_attr("maxlen", DEFAULT_RANGE_MAXLEN)?;
        if maxlen <= 0 {
            return Err(KernelError::invalid_attr(
                "Range",
                "maxlen",
                format!("must be positive, got {}", maxlen),
            ));
        }
        self.maxlen = maxlen as usize;
        Ok(())
    }

    fn resize(&mut self, shapes: &[Shape]) -> Result<(), KernelError> {
        let [start, limit, delta] = input_shapes::<3>("Range", shapes)?;
        check_scalar("Range", "start", start)?;
        check_scalar("Range", "limit", limit)?;
        check_scalar("Range", "delta", delta)?;

        let dtype = T::dtype_of();
        self.sizes = LaunchSizes::from_shapes(
            &[(&start[..], dtype), (&limit[..], dtype), (&delta[..], dtype)],
            &[(smallvec![self.maxlen], dtype)],
        );
        self.realized.clear();
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
        let start = input_scalar::<T>("Range", inputs, 0)?;
        let limit = input_scalar::<T>("Range", inputs, 1)?;
        let delta = input_scalar::<T>("Range", inputs, 2)?;
        let len = range_len(start, limit, delta)?;

        let available = outputs
            .first()
            .map(|addr| addr.size() / size_of::<T>())
            .unwrap_or(0);
        if len > available {
            return Err(KernelError::OutputTooSmall {
                op: "Range".to_string(),
                required: len,
                available,
            });
        }

        let out = output::<T>("Range", outputs, 0, len)?;
        parallel_launch_mut(out, Split::Even, |range, out| {
            for (y, i) in out.iter_mut().zip(range) {
                *y = start.wrapping_add(T::from_usize(i).wrapping_mul(delta));
            }
            Ok::<_, KernelError>(())
        })?;

        self.realized = vec![smallvec![len]];
        Ok(())
    }

    fn realized_output_shapes(&self) -> Option<&[Shape]> {
        if self.realized.is_empty() {
            None
        } else {
            Some(&self.realized)
        }
    }
}

pub(crate) fn register(reg: &mut KernelRegistry) {
    register_typed!(
        reg,
        "Range",
        [i32, i64, f32, f64],
        |T| KernelAttr::new()
            .input(T::dtype_of())
            .input(T::dtype_of())
            .input(T::dtype_of())
            .output(T::dtype_of()),
        RangeKernel::<T>::new()
    );
}

#[cfg(test)]
mod tests {
    use kernrt_testing::{TestCases, expect_close};

    use crate::address::{Address, AddressMut};
    use crate::dtype::{DataType, DataTypeOf};
    use crate::error::{ErrorKind, KernelError};
    use crate::kernel::{KernelInstance, NodeInfo, Shape};
    use crate::number::Number;
    use crate::registry::{DeviceKind, kernel_registry};

    fn range_kernel<T: DataTypeOf>(maxlen: i64) -> KernelInstance {
        let dtype = T::dtype_of();
        let node = NodeInfo::new("Range")
            .input(dtype, &[])
            .input(dtype, &[])
            .input(dtype, &[])
            .output(dtype, &[])
            .with_attr("maxlen", maxlen);
        kernel_registry().build(DeviceKind::Cpu, &node).unwrap()
    }

    fn run_range<T: Number>(
        kernel: &mut KernelInstance,
        buf_len: usize,
        start: T,
        limit: T,
        delta: T,
    ) -> Result<Vec<T>, KernelError> {
        let mut out = vec![T::ZERO; buf_len];
        kernel.launch(
            &[
                Address::from_slice(&[start]),
                Address::from_slice(&[limit]),
                Address::from_slice(&[delta]),
            ],
            &mut [],
            &mut [AddressMut::from_slice(&mut out)],
        )?;
        let len = kernel.realized_output_shapes().unwrap()[0][0];
        out.truncate(len);
        Ok(out)
    }

    #[test]
    fn test_range_int() {
        #[derive(Debug)]
        struct Case {
            start: i32,
            limit: i32,
            delta: i32,
            expected: Vec<i32>,
        }

        let cases = [
            Case {
                start: 0,
                limit: 5,
                delta: 1,
                expected: vec![0, 1, 2, 3, 4],
            },
            Case {
                start: 0,
                limit: 0,
                delta: 1,
                expected: vec![],
            },
            Case {
                start: 1,
                limit: 8,
                delta: 3,
                expected: vec![1, 4, 7],
            },
            Case {
                start: 5,
                limit: -1,
                delta: -2,
                expected: vec![5, 3, 1],
            },
            // Step points away from the limit.
            Case {
                start: 0,
                limit: 5,
                delta: -1,
                expected: vec![],
            },
        ];

        cases.test_each(|case| {
            let mut kernel = range_kernel::<i32>(16);
            let out = run_range(&mut kernel, 16, case.start, case.limit, case.delta).unwrap();
            assert_eq!(out, case.expected);
            let shapes = kernel.realized_output_shapes().unwrap();
            assert_eq!(shapes, [Shape::from_slice(&[case.expected.len()])]);
        });
    }

    #[test]
    fn test_range_float() {
        let mut kernel = range_kernel::<f32>(8);
        let out = run_range(&mut kernel, 8, 0.5f32, 2., 0.5).unwrap();
        expect_close(&out, &[0.5, 1., 1.5]).unwrap();

        let mut kernel = range_kernel::<f64>(8);
        let out = run_range(&mut kernel, 8, 0., 1., 0.3f64).unwrap();
        assert_eq!(out.len(), 4);
    }

    #[test]
    fn test_range_i64_beyond_f64_precision() {
        let start = (1i64 << 53) + 1;
        let mut kernel = range_kernel::<i64>(8);

        let out = run_range(&mut kernel, 8, start, start + 3, 1).unwrap();
        assert_eq!(out, [start, start + 1, start + 2]);

        let out = run_range(&mut kernel, 8, start + 4, start, -2).unwrap();
        assert_eq!(out, [start + 4, start + 2]);

        // The span of the full i64 range is counted without overflow.
        let out = run_range(&mut kernel, 8, i64::MIN, i64::MAX, i64::MAX).unwrap();
        assert_eq!(out, [i64::MIN, -1, i64::MAX - 1]);
    }

    #[test]
    fn test_range_zero_delta() {
        let mut kernel = range_kernel::<i64>(8);
        let err = run_range(&mut kernel, 8, 1i64, 5, 0).unwrap_err();
        assert!(matches!(err, KernelError::InvalidValue { .. }));
        assert_eq!(err.kind(), ErrorKind::Runtime);
    }

    #[test]
    fn test_range_output_too_small() {
        let mut kernel = range_kernel::<i32>(4);
        assert_eq!(kernel.sizes().unwrap().output_shapes, [Shape::from_slice(&[4])]);

        let err = run_range(&mut kernel, 4, 0i32, 10, 1).unwrap_err();
        assert_eq!(
            err,
            KernelError::OutputTooSmall {
                op: "Range".into(),
                required: 10,
                available: 4,
            }
        );

        // A larger buffer than `maxlen` is usable.
        let out = run_range(&mut kernel, 10, 0i32, 10, 1).unwrap();
        assert_eq!(out.len(), 10);
    }

    #[test]
    fn test_range_invalid_node() {
        let node = NodeInfo::new("Range")
            .input(DataType::Int32, &[])
            .input(DataType::Int32, &[])
            .input(DataType::Int32, &[])
            .output(DataType::Int32, &[])
            .with_attr("maxlen", 0i64);
        let err = kernel_registry().build(DeviceKind::Cpu, &node).unwrap_err();
        assert!(matches!(err, KernelError::InvalidAttr { .. }));

        let node = NodeInfo::new("Range")
            .input(DataType::Int32, &[2])
            .input(DataType::Int32, &[])
            .input(DataType::Int32, &[])
            .output(DataType::Int32, &[]);
        let err = kernel_registry().build(DeviceKind::Cpu, &node).unwrap_err();
        assert!(matches!(err, KernelError::InvalidShape { .. }));
    }
}
