//! Splittable iterators with Rayon support.

use std::ops::Range;

use rayon::iter::plumbing::{Consumer, Producer, ProducerCallback, UnindexedConsumer, bridge};
use rayon::prelude::*;

/// An exact-size iterator which can be cut in two at any position.
///
/// Together with [`ParIter`] this is all that is needed to drive the iterator
/// from Rayon's indexed parallel iterator machinery.
pub trait SplitIterator: DoubleEndedIterator + ExactSizeIterator {
    /// Split into the first `index` items and the remainder.
    ///
    /// Panics if `index > self.len()`.
    fn split_at(self, index: usize) -> (Self, Self)
    where
        Self: Sized;
}

/// Adapter exposing a [`SplitIterator`] as a Rayon parallel iterator.
pub struct ParIter<I: SplitIterator>(I);

impl<I: SplitIterator> From<I> for ParIter<I> {
    fn from(val: I) -> Self {
        ParIter(val)
    }
}

impl<I: SplitIterator + Send> ParallelIterator for ParIter<I>
where
    I::Item: Send,
{
    type Item = I::Item;

    fn drive_unindexed<C>(self, consumer: C) -> C::Result
    where
        C: UnindexedConsumer<Self::Item>,
    {
        bridge(self, consumer)
    }

    fn opt_len(&self) -> Option<usize> {
        Some(ExactSizeIterator::len(&self.0))
    }
}

impl<I: SplitIterator + Send> IndexedParallelIterator for ParIter<I>
where
    I::Item: Send,
{
    fn drive<C>(self, consumer: C) -> C::Result
    where
        C: Consumer<Self::Item>,
    {
        bridge(self, consumer)
    }

    fn len(&self) -> usize {
        ExactSizeIterator::len(&self.0)
    }

    fn with_producer<CB>(self, callback: CB) -> CB::Output
    where
        CB: ProducerCallback<Self::Item>,
    {
        callback.callback(self)
    }
}

impl<I: SplitIterator + Send> Producer for ParIter<I> {
    type Item = I::Item;
    type IntoIter = I;

    fn into_iter(self) -> Self::IntoIter {
        self.0
    }

    fn split_at(self, index: usize) -> (Self, Self) {
        let (left, right) = SplitIterator::split_at(self.0, index);
        (Self(left), Self(right))
    }
}

/// Iterator over consecutive blocks of an index range.
///
/// Every block has `block_size` indices except the last, which holds the
/// remainder. The blocks exactly cover the range with no overlap.
#[derive(Clone, Debug)]
pub struct BlockRanges {
    remaining: Range<usize>,
    block_size: usize,
}

impl BlockRanges {
    /// Partition `0..count` into blocks of `block_size`.
    ///
    /// Panics if `block_size` is zero.
    pub fn new(count: usize, block_size: usize) -> Self {
        assert!(block_size > 0, "block size must be non-zero");
        BlockRanges {
            remaining: 0..count,
            block_size,
        }
    }

    /// Block size used for all but the last block.
    pub fn block_size(&self) -> usize {
        self.block_size
    }
}

impl Iterator for BlockRanges {
    type Item = Range<usize>;

    #[inline]
    fn next(&mut self) -> Option<Range<usize>> {
        if self.remaining.is_empty() {
            return None;
        }
        let start = self.remaining.start;
        let end = start.saturating_add(self.block_size).min(self.remaining.end);
        self.remaining.start = end;
        Some(start..end)
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = self.remaining.len().div_ceil(self.block_size);
        (len, Some(len))
    }
}

impl ExactSizeIterator for BlockRanges {}

impl DoubleEndedIterator for BlockRanges {
    fn next_back(&mut self) -> Option<Range<usize>> {
        if self.remaining.is_empty() {
            return None;
        }
        // The last block is the one that holds the remainder, so its start is
        // aligned to a multiple of the block size relative to the range start.
        let n_blocks = self.len();
        let start = self.remaining.start + (n_blocks - 1) * self.block_size;
        let end = self.remaining.end;
        self.remaining.end = start;
        Some(start..end)
    }
}

impl SplitIterator for BlockRanges {
    fn split_at(self, index: usize) -> (Self, Self) {
        let len = self.len();
        assert!(
            index <= len,
            "split index {} out of bounds for {} blocks",
            index,
            len
        );
        let mid = self.remaining.start
            + (index * self.block_size).min(self.remaining.len());
        (
            BlockRanges {
                remaining: self.remaining.start..mid,
                block_size: self.block_size,
            },
            BlockRanges {
                remaining: mid..self.remaining.end,
                block_size: self.block_size,
            },
        )
    }
}

impl IntoParallelIterator for BlockRanges {
    type Iter = ParIter<Self>;
    type Item = Range<usize>;

    fn into_par_iter(self) -> Self::Iter {
        ParIter::from(self)
    }
}

#[cfg(test)]
mod tests {
    use rayon::prelude::*;

    use super::{BlockRanges, SplitIterator};

    #[test]
    fn test_block_ranges() {
        let blocks: Vec<_> = BlockRanges::new(10, 4).collect();
        assert_eq!(blocks, [0..4, 4..8, 8..10]);

        let blocks: Vec<_> = BlockRanges::new(8, 4).collect();
        assert_eq!(blocks, [0..4, 4..8]);

        assert_eq!(BlockRanges::new(0, 4).count(), 0);
        assert_eq!(BlockRanges::new(10, 4).len(), 3);
    }

    #[test]
    fn test_block_ranges_rev() {
        let blocks: Vec<_> = BlockRanges::new(10, 4).rev().collect();
        assert_eq!(blocks, [8..10, 4..8, 0..4]);
    }

    #[test]
    fn test_block_ranges_split() {
        let (left, right) = BlockRanges::new(10, 4).split_at(1);
        assert_eq!(left.collect::<Vec<_>>(), [0..4]);
        assert_eq!(right.collect::<Vec<_>>(), [4..8, 8..10]);

        let (left, right) = BlockRanges::new(10, 4).split_at(3);
        assert_eq!(left.len(), 3);
        assert_eq!(right.len(), 0);
    }

    #[test]
    fn test_block_ranges_par_iter() {
        let serial: Vec<_> = BlockRanges::new(1000, 7).collect();
        let parallel: Vec<_> = BlockRanges::new(1000, 7).into_par_iter().collect();
        assert_eq!(serial, parallel);
    }
}
