use std::cmp::min;

use derive_more::Display;

/// Inclusive block range queried in one provider call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[display("[{from}, {to}]")]
pub struct BlockRange {
    pub from: u64,
    pub to: u64,
}

impl BlockRange {
    pub fn new(from: u64, to: u64) -> Self {
        Self { from, to }
    }

    pub fn contains(&self, block_number: u64) -> bool {
        (self.from..=self.to).contains(&block_number)
    }
}

/// Splits `[start, end]` into contiguous, non-overlapping chunks of at most
/// `max_range` blocks each.
pub fn get_chunks(start: u64, end: u64, max_range: u64) -> Vec<BlockRange> {
    let max_range = max_range.max(1);
    let mut chunks = vec![];

    let mut from = start;
    while from <= end {
        let to = min(from.saturating_add(max_range - 1), end);
        chunks.push(BlockRange::new(from, to));

        match to.checked_add(1) {
            Some(next) => from = next,
            None => break,
        }
    }

    chunks
}
