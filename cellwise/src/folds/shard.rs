use crate::common::*;

/// The number of shards of the one-fifth split.
pub const NUM_FIFTH_SHARDS: usize = 5;

/// Returns the `index`-th of `count` contiguous shards of `items`.
///
/// Every shard holds `len / count` items except the last one, which also
/// takes the remainder.
pub fn shard<T>(items: &[T], index: usize, count: usize) -> Result<&[T]> {
    ensure!(count > 0, "shard count must be positive");
    ensure!(
        index < count,
        "shard index {} is out of range, expect less than {}",
        index,
        count
    );

    let size = items.len() / count;
    let start = index * size;
    let end = if index + 1 == count {
        items.len()
    } else {
        start + size
    };
    Ok(&items[start..end])
}

pub fn one_fifth_shard<T>(items: &[T], index: usize) -> Result<&[T]> {
    shard(items, index, NUM_FIFTH_SHARDS)
}
