//! Testing utilities shared by the kernrt crates.
//!
//! - [`TestCases`] runs table-driven tests and reports every failing case,
//!   not just the first.
//! - [`expect_close`] and [`assert_close`] compare floating point kernel
//!   outputs with a tolerance.

use std::fmt::Debug;
use std::panic::{RefUnwindSafe, UnwindSafe};

/// Utility for parametrized (table-driven) tests.
///
/// Define a `Debug` struct, conventionally named `Case`, collect instances of
/// it into `cases` and call `cases.test_each(|case| ...)`. Each case runs
/// with panics caught. Once all cases have run, the test panics if any of
/// them failed, listing the failing cases.
///
/// ```
/// use kernrt_testing::TestCases;
///
/// #[derive(Debug)]
/// struct Case {
///     count: usize,
///     block: usize,
///     blocks: usize,
/// }
///
/// let cases = [
///     Case { count: 10, block: 3, blocks: 4 },
///     Case { count: 8, block: 8, blocks: 1 },
/// ];
///
/// cases.test_each(|&Case { count, block, blocks }| {
///     assert_eq!(count.div_ceil(block), blocks);
/// });
/// ```
///
/// Test cases and values captured by the test function must be
/// [unwind safe](std::panic::UnwindSafe). Values that are not, such as
/// atomics or cells, can be created inside the test function or wrapped in
/// [`AssertUnwindSafe`](std::panic::AssertUnwindSafe).
pub trait TestCases {
    /// The data for a single test case.
    type Case;

    /// Call `test` with a reference to each case, catching panics.
    fn test_each(self, test: impl Fn(&Self::Case) + RefUnwindSafe)
    where
        Self::Case: Debug + RefUnwindSafe;

    /// Variant of [`test_each`](TestCases::test_each) which passes a clone of
    /// each case to `test`.
    fn test_each_clone(self, test: impl Fn(Self::Case) + RefUnwindSafe)
    where
        Self::Case: Debug + Clone + UnwindSafe;

    /// Variant of [`test_each`](TestCases::test_each) which passes each case
    /// by value. The case is formatted before the call so failures can still
    /// be reported.
    fn test_each_value(self, test: impl Fn(Self::Case) + RefUnwindSafe)
    where
        Self::Case: Debug + UnwindSafe;
}

fn report_failures<F: Debug>(failures: &[F]) {
    assert!(
        failures.is_empty(),
        "{} test cases failed: {:?}",
        failures.len(),
        failures
    );
}

impl<I: IntoIterator> TestCases for I {
    type Case = I::Item;

    fn test_each(self, test: impl Fn(&I::Item) + RefUnwindSafe)
    where
        Self::Case: Debug + RefUnwindSafe,
    {
        let failures: Vec<_> = self
            .into_iter()
            .filter(|case| std::panic::catch_unwind(|| test(case)).is_err())
            .collect();
        report_failures(&failures);
    }

    fn test_each_clone(self, test: impl Fn(I::Item) + RefUnwindSafe)
    where
        Self::Case: Debug + Clone + UnwindSafe,
    {
        let test = &test;
        let failures: Vec<_> = self
            .into_iter()
            .filter(|case| {
                let value = case.clone();
                std::panic::catch_unwind(move || test(value)).is_err()
            })
            .collect();
        report_failures(&failures);
    }

    fn test_each_value(self, test: impl Fn(I::Item) + RefUnwindSafe)
    where
        Self::Case: Debug + UnwindSafe,
    {
        let test = &test;
        let failures: Vec<String> = self
            .into_iter()
            .filter_map(|case| {
                let desc = format!("{:?}", case);
                std::panic::catch_unwind(move || test(case))
                    .is_err()
                    .then_some(desc)
            })
            .collect();
        report_failures(&failures);
    }
}

/// Floating point types that can be compared with a tolerance.
pub trait ApproxEq: Copy + Debug {
    /// Default absolute tolerance.
    const EPSILON: Self;

    fn approx_eq(self, other: Self, tolerance: Self) -> bool;
}

macro_rules! impl_approx_eq {
    ($type:ty, $eps:expr) => {
        impl ApproxEq for $type {
            const EPSILON: Self = $eps;

            fn approx_eq(self, other: Self, tolerance: Self) -> bool {
                if self.is_nan() || other.is_nan() {
                    return self.is_nan() && other.is_nan();
                }
                if self == other {
                    // Handles matching infinities.
                    return true;
                }
                let scale = self.abs().max(other.abs()).max(1.0);
                (self - other).abs() <= tolerance * scale
            }
        }
    };
}

impl_approx_eq!(f32, 1e-5);
impl_approx_eq!(f64, 1e-10);

/// Compare two float slices element-wise using a relative tolerance.
///
/// Returns an error describing the first mismatches if the lengths differ
/// or any pair of elements is not within tolerance. NaNs compare equal to
/// each other.
pub fn expect_close<T: ApproxEq>(actual: &[T], expected: &[T]) -> Result<(), String> {
    expect_close_with_tolerance(actual, expected, T::EPSILON)
}

/// Variant of [`expect_close`] with an explicit tolerance.
pub fn expect_close_with_tolerance<T: ApproxEq>(
    actual: &[T],
    expected: &[T],
    tolerance: T,
) -> Result<(), String> {
    if actual.len() != expected.len() {
        return Err(format!(
            "length mismatch: actual {} expected {}",
            actual.len(),
            expected.len()
        ));
    }

    const MAX_REPORTED: usize = 10;
    let mismatches: Vec<_> = actual
        .iter()
        .zip(expected)
        .enumerate()
        .filter(|(_, (a, e))| !a.approx_eq(**e, tolerance))
        .map(|(i, (a, e))| format!("[{}] {:?} != {:?}", i, a, e))
        .collect();

    if mismatches.is_empty() {
        Ok(())
    } else {
        let shown = mismatches.len().min(MAX_REPORTED);
        Err(format!(
            "{} of {} values differ: {}",
            mismatches.len(),
            actual.len(),
            mismatches[..shown].join(", ")
        ))
    }
}

/// Panic if [`expect_close`] fails.
#[track_caller]
pub fn assert_close<T: ApproxEq>(actual: &[T], expected: &[T]) {
    if let Err(err) = expect_close(actual, expected) {
        panic!("{}", err);
    }
}
