//! Deduplication of sparse gradient updates.
//!
//! A sparse gradient holds a list of row indices into a dense variable of
//! shape `[first_dim, outer_dim]` and one row of `outer_dim` values per
//! index. Indices may repeat. Optimizer kernels first merge the rows of
//! repeated indices so that each touched row of the variable is updated
//! exactly once.

use kernrt_parallel::thread_pool;
use rayon::prelude::*;

use crate::dtype::Element;
use crate::error::SparseGradientError;
use crate::number::Number;

/// Integer types usable as sparse indices.
pub trait SparseIndex: Element + Ord {
    fn to_i64(self) -> i64;
    fn from_usize(val: usize) -> Self;
}

macro_rules! impl_sparse_index {
    ($type:ty) => {
        impl SparseIndex for $type {
            fn to_i64(self) -> i64 {
                self as i64
            }

            fn from_usize(val: usize) -> Self {
                val as $type
            }
        }
    };
}

impl_sparse_index!(i32);
impl_sparse_index!(i64);

/// A sparse gradient: rows of `outer_dim` values and the index each row
/// applies to.
#[derive(Clone, Debug, PartialEq)]
pub struct SparseGradient<T, I> {
    pub values: Vec<T>,
    pub indices: Vec<I>,
    pub outer_dim: usize,
}

impl<T, I> SparseGradient<T, I> {
    /// Number of rows.
    pub fn count(&self) -> usize {
        self.indices.len()
    }

    /// Iterate over `(index, row)` pairs.
    pub fn rows(&self) -> impl Iterator<Item = (&I, &[T])> {
        // `max(1)` keeps `chunks` valid when rows are empty.
        let rows = self.values.chunks(self.outer_dim.max(1));
        self.indices.iter().zip(rows.chain(std::iter::repeat(&[][..])))
    }
}

/// Validate indices and values and return the positions of all rows as
/// `(index, position)` pairs.
fn checked_positions<T, I: SparseIndex>(
    indices: &[I],
    values: &[T],
    first_dim: usize,
    outer_dim: usize,
) -> Result<Vec<(usize, usize)>, SparseGradientError> {
    let expected = indices.len() * outer_dim;
    if values.len() != expected {
        return Err(SparseGradientError::LengthMismatch {
            expected,
            actual: values.len(),
        });
    }

    indices
        .iter()
        .enumerate()
        .map(|(pos, &index)| {
            let index = index.to_i64();
            if index < 0 || index as u64 >= first_dim as u64 {
                Err(SparseGradientError::IndexOutOfBounds { index, first_dim })
            } else {
                Ok((index as usize, pos))
            }
        })
        .collect()
}

/// Sort `(index, position)` pairs by index and sum the rows of equal
/// indices.
///
/// The sort is stable, so rows of the same index are summed in their
/// original order.
fn merge_rows<T: Number, I: SparseIndex>(
    mut positions: Vec<(usize, usize)>,
    values: &[T],
    outer_dim: usize,
) -> SparseGradient<T, I> {
    positions.sort_by_key(|&(index, _)| index);

    let mut out = SparseGradient {
        values: Vec::with_capacity(positions.len() * outer_dim),
        indices: Vec::with_capacity(positions.len()),
        outer_dim,
    };
    let row = |pos: usize| &values[pos * outer_dim..(pos + 1) * outer_dim];

    for group in positions.chunk_by(|a, b| a.0 == b.0) {
        let (index, first) = group[0];
        out.indices.push(I::from_usize(index));

        let start = out.values.len();
        out.values.extend_from_slice(row(first));
        let acc = &mut out.values[start..];
        for &(_, pos) in &group[1..] {
            for (acc, &x) in acc.iter_mut().zip(row(pos)) {
                *acc = acc.wrapping_add(x);
            }
        }
    }

    out
}

/// Merge rows of a sparse gradient with repeated indices.
///
/// `values` holds `indices.len()` rows of `outer_dim` elements. The result
/// contains each distinct index once, in ascending order, together with the
/// sum of its rows.
///
/// Fails if any index is outside `[0, first_dim)` or if the length of
/// `values` does not match.
pub fn reduce_sparse_gradient<T: Number, I: SparseIndex>(
    indices: &[I],
    values: &[T],
    first_dim: usize,
    outer_dim: usize,
) -> Result<SparseGradient<T, I>, SparseGradientError> {
    let positions = checked_positions(indices, values, first_dim, outer_dim)?;
    Ok(merge_rows(positions, values, outer_dim))
}

/// Minimum number of rows before the bucketed reducer goes parallel.
const MIN_PARALLEL_ROWS: usize = 1024;

/// Parallel variant of [`reduce_sparse_gradient`].
///
/// The index space `[0, first_dim)` is divided into contiguous buckets, one
/// per pool thread. Each bucket is sorted and merged independently and the
/// results are concatenated. The output is identical to the serial reducer.
pub fn reduce_sparse_gradient_par<T: Number, I: SparseIndex>(
    indices: &[I],
    values: &[T],
    first_dim: usize,
    outer_dim: usize,
) -> Result<SparseGradient<T, I>, SparseGradientError> {
    let positions = checked_positions(indices, values, first_dim, outer_dim)?;

    let pool = thread_pool();
    let n_buckets = pool.num_threads().min(first_dim);
    if positions.len() < MIN_PARALLEL_ROWS || n_buckets <= 1 {
        return Ok(merge_rows(positions, values, outer_dim));
    }

    Ok(pool.run(|| merge_bucketed(positions, values, first_dim, outer_dim, n_buckets)))
}

/// Split `positions` into `n_buckets` contiguous index ranges, merge each
/// bucket in parallel and concatenate the results.
fn merge_bucketed<T: Number, I: SparseIndex>(
    positions: Vec<(usize, usize)>,
    values: &[T],
    first_dim: usize,
    outer_dim: usize,
    n_buckets: usize,
) -> SparseGradient<T, I> {
    let bucket_len = first_dim.div_ceil(n_buckets.max(1)).max(1);
    let mut buckets: Vec<Vec<(usize, usize)>> = vec![Vec::new(); n_buckets.max(1)];
    for entry in positions {
        buckets[entry.0 / bucket_len].push(entry);
    }

    let parts: Vec<SparseGradient<T, I>> = buckets
        .into_par_iter()
        .map(|bucket| merge_rows(bucket, values, outer_dim))
        .collect();

    let mut out = SparseGradient {
        values: Vec::with_capacity(parts.iter().map(|p| p.values.len()).sum()),
        indices: Vec::with_capacity(parts.iter().map(|p| p.count()).sum()),
        outer_dim,
    };
    for part in parts {
        out.indices.extend(part.indices);
        out.values.extend(part.values);
    }
    out
}
