use std::collections::BTreeMap;
use std::mem;

/// In-memory staging area between the aggregator and the writer.
///
/// Entries collect under their bucket key in arrival order until the driver
/// drains the whole mapping at the next flush. Entries are never
/// deduplicated.
#[derive(Debug, Default)]
pub struct BucketAccumulator {
    buckets: BTreeMap<usize, Vec<String>>,
}

impl BucketAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `entry` under `key`, creating the bucket if absent.
    pub fn add(&mut self, key: usize, entry: String) {
        self.buckets.entry(key).or_default().push(entry);
    }

    /// Returns the full mapping and resets the accumulator to empty.
    pub fn drain(&mut self) -> BTreeMap<usize, Vec<String>> {
        mem::take(&mut self.buckets)
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}
