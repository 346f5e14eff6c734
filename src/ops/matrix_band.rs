//! Operators on the diagonal bands of batched matrices.
//!
//! Inputs have shape `[..., m, n]`. The leading dimensions are batch
//! dimensions and each `[m, n]` slice is processed independently. Diagonal
//! `d` is the set of elements `(i, j)` with `j - i == d`, so positive `d`
//! selects superdiagonals and negative `d` subdiagonals.

use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;

use kernrt_parallel::{Rows, Split, parallel_launch_mut};

use crate::address::{Address, AddressMut};
use crate::dtype::{DataType, DataTypeOf};
use crate::error::KernelError;
use crate::kernel::{Kernel, LaunchSizes, NodeInfo, Shape, num_elements};
use crate::kernel_attr::KernelAttr;
use crate::number::Number;
use crate::ops::{check_scalar, input, input_scalar, input_shapes, output, register_typed};
use crate::registry::KernelRegistry;
use crate::sparse::SparseIndex;

/// Split a shape `[..., m, n]` into `(batch, m, n)`.
fn matrix_dims(op: &str, shape: &[usize]) -> Result<(usize, usize, usize), KernelError> {
    match shape {
        [batch @ .., m, n] => Ok((num_elements(batch), *m, *n)),
        _ => Err(KernelError::invalid_shape(
            op,
            format!("input must have at least 2 dims, got shape {:?}", shape),
        )),
    }
}

/// Zeroes all elements outside a band around the main diagonal.
///
/// Inputs are the matrix, `num_lower` and `num_upper`. Element `(i, j)` is
/// kept if `i - j <= num_lower` and `j - i <= num_upper`. A negative band
/// width, or one larger than the matrix, keeps the whole triangle.
#[derive(Debug)]
pub struct MatrixBandPartKernel<T, I> {
    shape: Shape,
    sizes: LaunchSizes,
    _marker: PhantomData<(T, I)>,
}

impl<T: Number, I: SparseIndex> MatrixBandPartKernel<T, I> {
    pub fn new() -> Self {
        MatrixBandPartKernel {
            shape: Shape::new(),
            sizes: LaunchSizes::default(),
            _marker: PhantomData,
        }
    }
}

impl<T: Number, I: SparseIndex> Default for MatrixBandPartKernel<T, I> {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve a band width input. Out of range widths select every diagonal
/// on that side.
fn band_width(width: i64, full: usize) -> usize {
    if width < 0 || width as u64 > full as u64 {
        full
    } else {
        width as usize
    }
}

impl<T: Number, I: SparseIndex> Kernel for MatrixBandPartKernel<T, I> {
    fn name(&self) -> &str {
        "MatrixBandPart"
    }

    fn init(&mut self, node: &NodeInfo) -> Result<(), KernelError> {
        node.check_arity(3, 1)
    }

    fn resize(&mut self, shapes: &[Shape]) -> Result<(), KernelError> {
        let [shape, lower, upper] = input_shapes::<3>("MatrixBandPart", shapes)?;
        matrix_dims("MatrixBandPart", shape)?;
        check_scalar("MatrixBandPart", "num_lower", lower)?;
        check_scalar("MatrixBandPart", "num_upper", upper)?;

        let dtype = T::dtype_of();
        let index_dtype = I::dtype_of();
        self.sizes = LaunchSizes::from_shapes(
            &[
                (&shape[..], dtype),
                (&lower[..], index_dtype),
                (&upper[..], index_dtype),
            ],
            &[(shape.clone(), dtype)],
        );
        self.shape = shape.clone();
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
        let op = "MatrixBandPart";
        let (batch, m, n) = matrix_dims(op, &self.shape)?;
        let len = batch * m * n;

        let x = input::<T>(op, inputs, 0, len)?;
        let lower = band_width(input_scalar::<I>(op, inputs, 1)?.to_i64(), m);
        let upper = band_width(input_scalar::<I>(op, inputs, 2)?.to_i64(), n);
        let out = output::<T>(op, outputs, 0, len)?;

        let rows = Rows::new(out, n);
        parallel_launch_mut(rows, Split::EvenMin(64), |range, mut rows| {
            for (row, out_row) in range.zip(rows.iter_mut()) {
                let i = row % m;
                let x_row = &x[row * n..(row + 1) * n];
                // Kept columns are `[i - lower, i + upper]`.
                let start = i.saturating_sub(lower);
                let end = (i + upper + 1).min(n);
                for (j, (y, &x)) in out_row.iter_mut().zip(x_row).enumerate() {
                    *y = if j >= start && j < end { x } else { T::ZERO };
                }
            }
            Ok(())
        })
    }
}

/// Placement of diagonals shorter than the longest extracted diagonal.
///
/// The first word applies to superdiagonals, the second to subdiagonals.
/// `Left` puts padding at the end of a row and `Right` at the start.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum DiagAlign {
    LeftLeft,
    LeftRight,
    #[default]
    RightLeft,
    RightRight,
}

impl DiagAlign {
    /// Return true if diagonal `d` is left aligned.
    pub fn left_aligned(self, d: i64) -> bool {
        let (superdiag, subdiag) = match self {
            DiagAlign::LeftLeft => (true, true),
            DiagAlign::LeftRight => (true, false),
            DiagAlign::RightLeft => (false, true),
            DiagAlign::RightRight => (false, false),
        };
        if d >= 0 { superdiag } else { subdiag }
    }
}

impl FromStr for DiagAlign {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LEFT_LEFT" => Ok(DiagAlign::LeftLeft),
            "LEFT_RIGHT" => Ok(DiagAlign::LeftRight),
            "RIGHT_LEFT" => Ok(DiagAlign::RightLeft),
            "RIGHT_RIGHT" => Ok(DiagAlign::RightRight),
            _ => Err(format!("unknown alignment \"{}\"", s)),
        }
    }
}

impl fmt::Display for DiagAlign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DiagAlign::LeftLeft => "LEFT_LEFT",
            DiagAlign::LeftRight => "LEFT_RIGHT",
            DiagAlign::RightLeft => "RIGHT_LEFT",
            DiagAlign::RightRight => "RIGHT_RIGHT",
        };
        f.write_str(name)
    }
}

/// Range of diagonals selected by `k` after clamping to an `[m, n]` matrix.
#[derive(Copy, Clone, Debug, PartialEq)]
struct DiagRange {
    lower: i64,
    upper: i64,
    max_len: usize,
}

impl DiagRange {
    /// Resolve `(lower, upper)` for a non-empty `[m, n]` matrix.
    ///
    /// Both ends are clamped to `[-(m - 1), n - 1]`, the range of diagonals
    /// that exist. `lower > upper` is an error.
    fn new(lower: i64, upper: i64, m: usize, n: usize) -> Result<Self, KernelError> {
        if lower > upper {
            return Err(KernelError::invalid_attr(
                "MatrixDiagPart",
                "k",
                format!("lower diagonal {} is above upper diagonal {}", lower, upper),
            ));
        }
        let (m_i, n_i) = (m as i64, n as i64);
        let lower = lower.clamp(-(m_i - 1), n_i - 1);
        let upper = upper.clamp(-(m_i - 1), n_i - 1);
        let max_len = Ord::min(m_i + Ord::min(upper, 0), n_i - Ord::max(lower, 0)) as usize;
        Ok(DiagRange {
            lower,
            upper,
            max_len,
        })
    }

    fn num_diags(&self) -> usize {
        (self.upper - self.lower + 1) as usize
    }
}

/// Length of diagonal `d` of an `[m, n]` matrix.
fn diag_len(d: i64, m: usize, n: usize) -> usize {
    let len = Ord::min(m as i64 + Ord::min(d, 0), n as i64 - Ord::max(d, 0));
    Ord::max(len, 0) as usize
}

/// Extracts a band of diagonals from each matrix.
///
/// Inputs are the matrix, `k` and a scalar padding value. `k` is an `i32`
/// scalar selecting one diagonal, or a pair `(lower, upper)` selecting a
/// range. Diagonals are written from `upper` down to `lower`, each padded to
/// the length of the longest one according to the `align` attribute.
///
/// The output shape is `[..., max_len]` for a single diagonal and
/// `[..., num_diags, max_len]` otherwise. It depends on `k`, so the output
/// is sized for the largest possible result and the actual shape is
/// reported after each launch.
#[derive(Debug)]
pub struct MatrixDiagPartKernel<T> {
    align: DiagAlign,
    shape: Shape,
    sizes: LaunchSizes,
    realized: Vec<Shape>,
    _marker: PhantomData<T>,
}

impl<T: Number> MatrixDiagPartKernel<T> {
    pub fn new() -> Self {
        MatrixDiagPartKernel {
            align: DiagAlign::default(),
            shape: Shape::new(),
            sizes: LaunchSizes::default(),
            realized: Vec::new(),
            _marker: PhantomData,
        }
    }

    fn read_k(&self, inputs: &[Address], k_len: usize) -> Result<(i64, i64), KernelError> {
        let k = input::<i32>("MatrixDiagPart", inputs, 1, k_len)?;
        match *k {
            [d] => Ok((d as i64, d as i64)),
            [lower, upper] => Ok((lower as i64, upper as i64)),
            _ => Err(KernelError::invalid_shape(
                "MatrixDiagPart",
                "k must have 1 or 2 elements",
            )),
        }
    }
}

impl<T: Number> Default for MatrixDiagPartKernel<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Number> Kernel for MatrixDiagPartKernel<T> {
    fn name(&self) -> &str {
        "MatrixDiagPart"
    }

    fn init(&mut self, node: &NodeInfo) -> Result<(), KernelError> {
        node.check_arity(3, 1)?;
        let align = node.str_attr("align", "RIGHT_LEFT")?;
        self.align = align
            .parse()
            .map_err(|reason| KernelError::invalid_attr("MatrixDiagPart", "align", reason))?;
        Ok(())
    }

    fn resize(&mut self, shapes: &[Shape]) -> Result<(), KernelError> {
        let op = "MatrixDiagPart";
        let [shape, k, padding] = input_shapes::<3>(op, shapes)?;
        let (_, m, n) = matrix_dims(op, shape)?;
        if !matches!(num_elements(k), 1 | 2) {
            return Err(KernelError::invalid_shape(
                op,
                format!("k must have 1 or 2 elements, got shape {:?}", k),
            ));
        }
        check_scalar(op, "padding_value", padding)?;

        // Largest output: every diagonal, each as long as the main one.
        let mut max_shape: Shape = shape[..shape.len() - 2].into();
        max_shape.push((m + n).saturating_sub(1));
        max_shape.push(m.min(n));

        let dtype = T::dtype_of();
        self.sizes = LaunchSizes::from_shapes(
            &[
                (&shape[..], dtype),
                (&k[..], DataType::Int32),
                (&padding[..], dtype),
            ],
            &[(max_shape, dtype)],
        );
        self.shape = shape.clone();
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
        let op = "MatrixDiagPart";
        let (batch, m, n) = matrix_dims(op, &self.shape)?;
        let batch_shape = &self.shape[..self.shape.len() - 2];

        let k_len = self.sizes.inputs[1] / size_of::<i32>();
        let (lower, upper) = self.read_k(inputs, k_len)?;
        let single = lower == upper;

        if m == 0 || n == 0 {
            if lower > upper {
                return Err(KernelError::invalid_attr(
                    op,
                    "k",
                    format!("lower diagonal {} is above upper diagonal {}", lower, upper),
                ));
            }
            let mut shape: Shape = batch_shape.into();
            shape.push(0);
            self.realized = vec![shape];
            return Ok(());
        }

        let diags = DiagRange::new(lower, upper, m, n)?;
        let x = input::<T>(op, inputs, 0, batch * m * n)?;
        let padding = input_scalar::<T>(op, inputs, 2)?;
        let num_diags = diags.num_diags();
        let max_len = diags.max_len;
        let out = output::<T>(op, outputs, 0, batch * num_diags * max_len)?;
        let align = self.align;

        // Each output row is one diagonal of one matrix.
        let rows = Rows::new(out, max_len);
        parallel_launch_mut(rows, Split::EvenMin(16), |range, mut rows| {
            for (row, out_row) in range.zip(rows.iter_mut()) {
                let matrix = &x[(row / num_diags) * m * n..][..m * n];
                let d = diags.upper - (row % num_diags) as i64;
                let len = diag_len(d, m, n);
                let offset = if align.left_aligned(d) {
                    0
                } else {
                    max_len - len
                };
                let (row0, col0) = (Ord::max(-d, 0) as usize, Ord::max(d, 0) as usize);

                for (t, y) in out_row.iter_mut().enumerate() {
                    *y = match t.checked_sub(offset) {
                        Some(pos) if pos < len => matrix[(row0 + pos) * n + col0 + pos],
                        _ => padding,
                    };
                }
            }
            Ok::<_, KernelError>(())
        })?;

        let mut shape: Shape = batch_shape.into();
        if !single {
            shape.push(num_diags);
        }
        shape.push(max_len);
        self.realized = vec![shape];
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

fn band_part_attr<T: DataTypeOf, I: DataTypeOf>() -> KernelAttr {
    KernelAttr::new()
        .input(T::dtype_of())
        .input(I::dtype_of())
        .input(I::dtype_of())
        .output(T::dtype_of())
}

pub(crate) fn register(reg: &mut KernelRegistry) {
    register_typed!(
        reg,
        "MatrixBandPart",
        [i32, i64, f32, f64],
        |T| band_part_attr::<T, i32>(),
        MatrixBandPartKernel::<T, i32>::new()
    );
    register_typed!(
        reg,
        "MatrixBandPart",
        [i32, i64, f32, f64],
        |T| band_part_attr::<T, i64>(),
        MatrixBandPartKernel::<T, i64>::new()
    );
    register_typed!(
        reg,
        "MatrixDiagPart",
        [i32, i64, f32, f64],
        |T| KernelAttr::new()
            .input(T::dtype_of())
            .input(DataType::Int32)
            .input(T::dtype_of())
            .output(T::dtype_of()),
        MatrixDiagPartKernel::<T>::new()
    );
}

#[cfg(test)]
mod tests {
    use kernrt_testing::TestCases;

    use super::{DiagAlign, DiagRange, band_width, diag_len};
    use crate::address::{Address, AddressMut};
    use crate::dtype::DataType;
    use crate::error::{ErrorKind, KernelError};
    use crate::kernel::{KernelInstance, NodeInfo};
    use crate::registry::{DeviceKind, kernel_registry};

    fn band_part(x: &[f32], shape: &[usize], lower: i64, upper: i64) -> Vec<f32> {
        let node = NodeInfo::new("MatrixBandPart")
            .input(DataType::Float32, shape)
            .input(DataType::Int64, &[])
            .input(DataType::Int64, &[])
            .output(DataType::Float32, shape);
        let mut kernel = kernel_registry().build(DeviceKind::Cpu, &node).unwrap();
        let mut out = vec![0f32; x.len()];
        kernel
            .launch(
                &[
                    Address::from_slice(x),
                    Address::from_slice(&[lower]),
                    Address::from_slice(&[upper]),
                ],
                &mut [],
                &mut [AddressMut::from_slice(&mut out)],
            )
            .unwrap();
        out
    }

    #[test]
    fn test_matrix_band_part() {
        #[derive(Debug)]
        struct Case {
            lower: i64,
            upper: i64,
            expected: Vec<f32>,
        }

        // 3x4 matrix of ones.
        let x = [1f32; 12];

        let cases = [
            // Main diagonal only.
            Case {
                lower: 0,
                upper: 0,
                expected: vec![1., 0., 0., 0., 0., 1., 0., 0., 0., 0., 1., 0.],
            },
            // Upper triangle.
            Case {
                lower: 0,
                upper: -1,
                expected: vec![1., 1., 1., 1., 0., 1., 1., 1., 0., 0., 1., 1.],
            },
            // Lower triangle.
            Case {
                lower: -1,
                upper: 0,
                expected: vec![1., 0., 0., 0., 1., 1., 0., 0., 1., 1., 1., 0.],
            },
            // Tridiagonal.
            Case {
                lower: 1,
                upper: 1,
                expected: vec![1., 1., 0., 0., 1., 1., 1., 0., 0., 1., 1., 1.],
            },
            // Oversized widths keep everything.
            Case {
                lower: 100,
                upper: 100,
                expected: vec![1.; 12],
            },
        ];

        cases.test_each(|case| {
            let out = band_part(&x, &[3, 4], case.lower, case.upper);
            assert_eq!(out, case.expected);
        });
    }

    #[test]
    fn test_matrix_band_part_batched() {
        let x: Vec<f32> = (1..=8).map(|i| i as f32).collect();
        let out = band_part(&x, &[2, 2, 2], 0, 0);
        assert_eq!(out, [1., 0., 0., 4., 5., 0., 0., 8.]);
    }

    #[test]
    fn test_matrix_band_part_invalid() {
        let node = NodeInfo::new("MatrixBandPart")
            .input(DataType::Float32, &[4])
            .input(DataType::Int32, &[])
            .input(DataType::Int32, &[])
            .output(DataType::Float32, &[4]);
        let err = kernel_registry().build(DeviceKind::Cpu, &node).unwrap_err();
        assert!(matches!(err, KernelError::InvalidShape { .. }));

        // Band widths must share one integer type.
        let node = NodeInfo::new("MatrixBandPart")
            .input(DataType::Float32, &[2, 2])
            .input(DataType::Int32, &[])
            .input(DataType::Int64, &[])
            .output(DataType::Float32, &[2, 2]);
        let err = kernel_registry().build(DeviceKind::Cpu, &node).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Dispatch);
    }

    #[test]
    fn test_band_width() {
        assert_eq!(band_width(-1, 5), 5);
        assert_eq!(band_width(6, 5), 5);
        assert_eq!(band_width(2, 5), 2);
    }

    fn diag_kernel(shape: &[usize], k_len: usize, align: Option<&str>) -> KernelInstance {
        let k_shape: &[usize] = if k_len == 1 { &[] } else { &[2] };
        let mut node = NodeInfo::new("MatrixDiagPart")
            .input(DataType::Float32, shape)
            .input(DataType::Int32, k_shape)
            .input(DataType::Float32, &[])
            .output(DataType::Float32, &[]);
        if let Some(align) = align {
            node = node.with_attr("align", align);
        }
        kernel_registry().build(DeviceKind::Cpu, &node).unwrap()
    }

    fn diag_part(
        kernel: &mut KernelInstance,
        x: &[f32],
        k: &[i32],
    ) -> Result<(Vec<usize>, Vec<f32>), KernelError> {
        let max_len = kernel.sizes()?.outputs[0] / size_of::<f32>();
        let mut out = vec![0f32; max_len];
        kernel.launch(
            &[
                Address::from_slice(x),
                Address::from_slice(k),
                Address::from_slice(&[-1f32]),
            ],
            &mut [],
            &mut [AddressMut::from_slice(&mut out)],
        )?;
        let shape = kernel.realized_output_shapes().unwrap()[0].to_vec();
        out.truncate(shape.iter().product());
        Ok((shape, out))
    }

    #[test]
    fn test_matrix_diag_part() {
        #[derive(Debug)]
        struct Case {
            shape: Vec<usize>,
            k: Vec<i32>,
            align: Option<&'static str>,
            expected_shape: Vec<usize>,
            expected: Vec<f32>,
        }

        let cases = [
            Case {
                shape: vec![3, 3],
                k: vec![0],
                align: None,
                expected_shape: vec![3],
                expected: vec![1., 5., 9.],
            },
            Case {
                shape: vec![3, 3],
                k: vec![-1, 1],
                align: None,
                expected_shape: vec![3, 3],
                expected: vec![-1., 2., 6., 1., 5., 9., 4., 8., -1.],
            },
            Case {
                shape: vec![3, 3],
                k: vec![-1, 1],
                align: Some("LEFT_RIGHT"),
                expected_shape: vec![3, 3],
                expected: vec![2., 6., -1., 1., 5., 9., -1., 4., 8.],
            },
            // 2x3 matrix, superdiagonals only.
            Case {
                shape: vec![2, 3],
                k: vec![0, 2],
                align: None,
                expected_shape: vec![3, 2],
                expected: vec![-1., 3., 2., 6., 1., 5.],
            },
            // Out of range diagonals are clamped.
            Case {
                shape: vec![2, 2],
                k: vec![-5, 5],
                align: Some("LEFT_LEFT"),
                expected_shape: vec![3, 2],
                expected: vec![2., -1., 1., 4., 3., -1.],
            },
        ];

        cases.test_each(|case| {
            let mut kernel = diag_kernel(&case.shape, case.k.len(), case.align);
            let len = case.shape.iter().product();
            let x: Vec<f32> = (1..=len).map(|i| i as f32).collect();
            let (shape, out) = diag_part(&mut kernel, &x, &case.k).unwrap();
            assert_eq!(shape, case.expected_shape);
            assert_eq!(out, case.expected);
        });
    }

    #[test]
    fn test_matrix_diag_part_batched() {
        let mut kernel = diag_kernel(&[2, 2, 2], 1, None);
        let x: Vec<f32> = (1..=8).map(|i| i as f32).collect();
        let (shape, out) = diag_part(&mut kernel, &x, &[1]).unwrap();
        assert_eq!(shape, [2, 1]);
        assert_eq!(out, [2., 6.]);
    }

    #[test]
    fn test_matrix_diag_part_errors() {
        let mut kernel = diag_kernel(&[3, 3], 2, None);
        let x = [0f32; 9];
        let err = diag_part(&mut kernel, &x, &[1, 0]).unwrap_err();
        assert!(matches!(err, KernelError::InvalidAttr { .. }));
        assert_eq!(err.kind(), ErrorKind::Config);

        let node = NodeInfo::new("MatrixDiagPart")
            .input(DataType::Float32, &[3, 3])
            .input(DataType::Int32, &[])
            .input(DataType::Float32, &[])
            .output(DataType::Float32, &[])
            .with_attr("align", "CENTER");
        let err = kernel_registry().build(DeviceKind::Cpu, &node).unwrap_err();
        assert!(matches!(err, KernelError::InvalidAttr { .. }));
    }

    #[test]
    fn test_matrix_diag_part_empty() {
        let mut kernel = diag_kernel(&[2, 0, 3], 1, None);
        let (shape, out) = diag_part(&mut kernel, &[], &[0]).unwrap();
        assert_eq!(shape, [2, 0]);
        assert!(out.is_empty());
    }

    #[test]
    fn test_diag_range_clamp() {
        #[derive(Debug)]
        struct Case {
            k: (i64, i64),
            m: usize,
            n: usize,
        }

        let cases = [
            Case { k: (-10, 10), m: 3, n: 4 },
            Case { k: (-2, 3), m: 3, n: 4 },
            Case { k: (5, 9), m: 3, n: 4 },
            Case { k: (-9, -5), m: 3, n: 4 },
            Case { k: (0, 0), m: 1, n: 1 },
        ];

        cases.test_each(|case| {
            let range = DiagRange::new(case.k.0, case.k.1, case.m, case.n).unwrap();
            assert!(range.lower >= -(case.m as i64 - 1));
            assert!(range.upper <= case.n as i64 - 1);
            assert!(range.lower <= range.upper);
            let longest = (range.lower..=range.upper)
                .map(|d| diag_len(d, case.m, case.n))
                .max()
                .unwrap();
            assert_eq!(range.max_len, longest);
        });

        assert!(DiagRange::new(2, 1, 3, 3).is_err());
    }

    #[test]
    fn test_diag_align() {
        assert_eq!("RIGHT_LEFT".parse(), Ok(DiagAlign::RightLeft));
        assert_eq!(DiagAlign::default(), DiagAlign::RightLeft);
        assert_eq!(DiagAlign::LeftRight.to_string(), "LEFT_RIGHT");
        assert!(DiagAlign::LeftRight.left_aligned(1));
        assert!(!DiagAlign::LeftRight.left_aligned(-1));
        assert!("left".parse::<DiagAlign>().is_err());
    }
}
