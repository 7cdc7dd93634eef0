use std::ops::Range;

/// Splits `total` rows among `num_shards` and returns the range for `shard_id`.
///
/// Properties:
/// - Ranges are contiguous, disjoint and cover `[0..total)`.
/// - Sizes differ by at most 1 (balanced partition).
///
/// # Panics
/// If `num_shards` is zero or `shard_id` is not lower than `num_shards`.
pub fn shard_range(total: usize, shard_id: usize, num_shards: usize) -> Range<usize> {
    assert!(num_shards > 0);
    assert!(shard_id < num_shards);

    let base = total / num_shards;
    let rem = total % num_shards;

    let start = shard_id * base + shard_id.min(rem);
    let extra = usize::from(shard_id < rem);
    let end = start + base + extra;

    start..end
}

/// Splits `total` rows in at most `max_shards` non empty balanced ranges.
///
/// # Returns
/// The ranges in order, there are `min(total, max_shards)` of them.
pub fn shard_ranges(total: usize, max_shards: usize) -> Vec<Range<usize>> {
    let n = total.min(max_shards);
    (0..n).map(|id| shard_range(total, id, n)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shard_range_balanced() {
        // total 10, shards 3 => sizes 4,3,3
        assert_eq!(shard_range(10, 0, 3), 0..4);
        assert_eq!(shard_range(10, 1, 3), 4..7);
        assert_eq!(shard_range(10, 2, 3), 7..10);
    }

    #[test]
    fn shard_ranges_skip_empty_shards() {
        assert_eq!(shard_ranges(2, 4), vec![0..1, 1..2]);
        assert_eq!(shard_ranges(5, 2), vec![0..3, 3..5]);
        assert!(shard_ranges(0, 3).is_empty());
    }
}
