/// Mutable output storage that can be split into disjoint parts for parallel
/// writes.
///
/// A partition consists of `units()` equally sized units (elements, rows,
/// ...). Splitting hands out non-overlapping halves, so each block of a
/// parallel launch gets exclusive access to exactly the units it covers.
pub trait Partition: Sized + Send {
    /// Number of units in this partition.
    fn units(&self) -> usize;

    /// Split into the first `mid` units and the rest.
    ///
    /// Panics if `mid > self.units()`.
    fn split_at(self, mid: usize) -> (Self, Self);
}

impl<T: Send> Partition for &mut [T] {
    fn units(&self) -> usize {
        self.len()
    }

    fn split_at(self, mid: usize) -> (Self, Self) {
        self.split_at_mut(mid)
    }
}

/// A mutable slice viewed as a sequence of fixed-length rows.
///
/// Each row is one unit of the partition.
#[derive(Debug)]
pub struct Rows<'a, T> {
    data: &'a mut [T],
    row_len: usize,
}

impl<'a, T> Rows<'a, T> {
    /// View `data` as rows of `row_len` elements.
    ///
    /// Panics if `data.len()` is not a multiple of `row_len`. A zero
    /// `row_len` is only allowed for empty data.
    pub fn new(data: &'a mut [T], row_len: usize) -> Self {
        if row_len == 0 {
            assert!(data.is_empty(), "zero-length rows require empty data");
        } else {
            assert!(
                data.len() % row_len == 0,
                "length {} is not a multiple of row length {}",
                data.len(),
                row_len
            );
        }
        Rows { data, row_len }
    }

    /// Length of each row.
    pub fn row_len(&self) -> usize {
        self.row_len
    }

    /// Return the `index`th row of this partition.
    pub fn row_mut(&mut self, index: usize) -> &mut [T] {
        let start = index * self.row_len;
        &mut self.data[start..start + self.row_len]
    }

    /// Iterate over the rows of this partition.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut [T]> {
        // `max(1)` keeps `chunks_exact_mut` valid when the data is empty.
        self.data.chunks_exact_mut(self.row_len.max(1))
    }

    /// Return the underlying elements.
    pub fn into_inner(self) -> &'a mut [T] {
        self.data
    }
}

impl<T: Send> Partition for Rows<'_, T> {
    fn units(&self) -> usize {
        if self.row_len == 0 {
            0
        } else {
            self.data.len() / self.row_len
        }
    }

    fn split_at(self, mid: usize) -> (Self, Self) {
        let (left, right) = self.data.split_at_mut(mid * self.row_len);
        (
            Rows {
                data: left,
                row_len: self.row_len,
            },
            Rows {
                data: right,
                row_len: self.row_len,
            },
        )
    }
}

/// A pair of partitions split in lockstep, eg. the index and value outputs of
/// an arg-reduction.
///
/// Both partitions must have the same number of units.
impl<A: Partition, B: Partition> Partition for (A, B) {
    fn units(&self) -> usize {
        debug_assert_eq!(self.0.units(), self.1.units());
        self.0.units().min(self.1.units())
    }

    fn split_at(self, mid: usize) -> (Self, Self) {
        let (a_left, a_right) = self.0.split_at(mid);
        let (b_left, b_right) = self.1.split_at(mid);
        ((a_left, b_left), (a_right, b_right))
    }
}
