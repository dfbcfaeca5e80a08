//! # Batch Planner
//!
//! Splits a dataset of `n` examples into contiguous mini-batch index ranges.
//! Ranges address positions in the current dataset ordering, so a shuffle of
//! the underlying examples never requires re-planning.

use std::num::NonZeroUsize;

/// An inclusive `[start, end]` range of example positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BatchRange {
    /// First position in the batch.
    pub start: usize,
    /// Last position in the batch (inclusive).
    pub end: usize,
}

impl BatchRange {
    /// Creates a range covering `start..=end`.
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start <= end, "batch range {start}..={end} is empty");
        Self { start, end }
    }

    /// Number of positions in the range, `end - start + 1`.
    ///
    /// This is the nominal batch size used to normalize the training loss,
    /// regardless of how many real tokens the batch holds.
    pub fn len(&self) -> usize {
        self.end - self.start + 1
    }

    /// A range always holds at least one position.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Iterate over the positions in the range.
    pub fn positions(&self) -> std::ops::RangeInclusive<usize> {
        self.start..=self.end
    }
}

/// Partition `[0, dataset_size)` into ascending ranges of `batch_size`
/// positions. The last range holds the remainder and may be shorter.
///
/// # Examples
/// ```
/// use std::num::NonZeroUsize;
/// use seqtag_core::batch::{build_batch_list, BatchRange};
///
/// let ranges = build_batch_list(10, NonZeroUsize::new(3).unwrap());
/// assert_eq!(
///     ranges,
///     vec![
///         BatchRange::new(0, 2),
///         BatchRange::new(3, 5),
///         BatchRange::new(6, 8),
///         BatchRange::new(9, 9),
///     ]
/// );
/// ```
pub fn build_batch_list(dataset_size: usize, batch_size: NonZeroUsize) -> Vec<BatchRange> {
    let batch_size = batch_size.get();
    (0..dataset_size)
        .step_by(batch_size)
        .map(|start| BatchRange::new(start, (start + batch_size).min(dataset_size) - 1))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nz(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    #[test]
    fn test_empty_dataset() {
        assert!(build_batch_list(0, nz(32)).is_empty());
    }

    #[test]
    fn test_exact_multiple() {
        let ranges = build_batch_list(6, nz(3));
        assert_eq!(ranges, vec![BatchRange::new(0, 2), BatchRange::new(3, 5)]);
    }

    #[test]
    fn test_batch_larger_than_dataset() {
        let ranges = build_batch_list(5, nz(32));
        assert_eq!(ranges, vec![BatchRange::new(0, 4)]);
        assert_eq!(ranges[0].len(), 5);
    }

    #[test]
    fn test_ranges_cover_dataset_exactly_once() {
        for size in 0..50 {
            for batch in 1..12 {
                let ranges = build_batch_list(size, nz(batch));
                let mut next = 0;
                for (i, range) in ranges.iter().enumerate() {
                    assert_eq!(range.start, next, "gap or overlap at {size}/{batch}");
                    assert!(range.len() <= batch);
                    if i + 1 < ranges.len() {
                        assert_eq!(range.len(), batch);
                    }
                    next = range.end + 1;
                }
                assert_eq!(next, size);
            }
        }
    }

    #[test]
    fn test_positions() {
        let range = BatchRange::new(3, 5);
        assert_eq!(range.positions().collect::<Vec<_>>(), vec![3, 4, 5]);
    }
}
