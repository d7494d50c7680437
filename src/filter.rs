mod bloom;

pub use bloom::BloomFilterPolicy;
use bytes::Bytes;

use std::sync::Arc;

use crate::coding::decode_fixed32;

/// log2 of the data-file interval covered by one filter: 2 KiB windows.
const FILTER_BASE_LG: u32 = 11;
const FILTER_BASE: u64 = 1 << FILTER_BASE_LG;

/// A probabilistic membership test over the keys of a table.
///
/// Implementations may trade space for accuracy however they like, with one
/// hard requirement: `key_may_match` must never return false for a key that
/// was passed to `create_filter` for that filter (no false negatives).
pub trait FilterPolicy: Send + Sync {
    /// Wire name of the policy; keyed into the metaindex block as
    /// `"filter." + name()`, so changing it orphans existing filters.
    fn name(&self) -> &'static str;

    /// Appends a filter summarizing `keys` to `dst`.
    fn create_filter(&self, keys: &[&[u8]], dst: &mut Vec<u8>);

    fn key_may_match(&self, key: &[u8], filter: &[u8]) -> bool;
}

/// Accumulates keys in 2 KiB input windows and emits the filter block:
///
/// ```text
/// filter_0 .. filter_{n-1}
/// offset_0 .. offset_{n-1}   (u32 LE each)
/// array_offset (u32 LE)  base_lg (u8)
/// ```
///
/// Call sequence: `(start_block add_key*)* finish`.
pub struct FilterBlockBuilder {
    policy: Arc<dyn FilterPolicy>,
    /// Flattened pending keys plus their start offsets.
    keys: Vec<u8>,
    start: Vec<usize>,
    result: Vec<u8>,
    filter_offsets: Vec<u32>,
}

impl FilterBlockBuilder {
    pub fn new(policy: Arc<dyn FilterPolicy>) -> FilterBlockBuilder {
        FilterBlockBuilder {
            policy,
            keys: Vec::new(),
            start: Vec::new(),
            result: Vec::new(),
            filter_offsets: Vec::new(),
        }
    }

    /// Announces that a data block begins at `block_offset`, emitting filters
    /// (empty ones if no keys are pending) for every 2 KiB window passed.
    pub fn start_block(&mut self, block_offset: u64) {
        let filter_index = block_offset / FILTER_BASE;
        assert!(
            filter_index >= self.filter_offsets.len() as u64,
            "data block offsets must not go backwards"
        );
        while filter_index > self.filter_offsets.len() as u64 {
            self.generate_filter();
        }
    }

    pub fn add_key(&mut self, key: &[u8]) {
        self.start.push(self.keys.len());
        self.keys.extend_from_slice(key);
    }

    /// Emits any pending filter followed by the offset array and parameters.
    pub fn finish(&mut self) -> &[u8] {
        if !self.start.is_empty() {
            self.generate_filter();
        }
        let array_offset = self.result.len() as u32;
        for i in 0..self.filter_offsets.len() {
            let offset = self.filter_offsets[i];
            self.result.extend_from_slice(&offset.to_le_bytes());
        }
        self.result.extend_from_slice(&array_offset.to_le_bytes());
        self.result.push(FILTER_BASE_LG as u8);
        &self.result
    }

    fn generate_filter(&mut self) {
        let num_keys = self.start.len();
        if num_keys == 0 {
            // Fast path: an empty window gets a zero-length filter.
            self.filter_offsets.push(self.result.len() as u32);
            return;
        }

        self.start.push(self.keys.len());
        let keys = &self.keys;
        let start = &self.start;
        let tmp_keys: Vec<&[u8]> = (0..num_keys)
            .map(|i| &keys[start[i]..start[i + 1]])
            .collect();

        self.filter_offsets.push(self.result.len() as u32);
        self.policy.create_filter(&tmp_keys, &mut self.result);

        self.keys.clear();
        self.start.clear();
    }
}

/// Probes a finished filter block. Structurally inconsistent contents degrade
/// to "possible match" — the filter may only ever suppress reads, never hide
/// a present key.
pub struct FilterBlockReader {
    policy: Arc<dyn FilterPolicy>,
    data: Bytes,
    /// Start of the offset array within `data`.
    array_offset: usize,
    num_filters: usize,
    base_lg: u32,
}

impl FilterBlockReader {
    pub fn new(policy: Arc<dyn FilterPolicy>, contents: Bytes) -> FilterBlockReader {
        let mut reader = FilterBlockReader {
            policy,
            data: Bytes::new(),
            array_offset: 0,
            num_filters: 0,
            base_lg: 0,
        };
        let n = contents.len();
        if n < 5 {
            return reader;
        }
        let base_lg = contents[n - 1] as u32;
        if base_lg > 30 {
            // A bogus shift amount would make every probe misbehave.
            return reader;
        }
        let array_offset = decode_fixed32(&contents[n - 5..]) as usize;
        if array_offset > n - 5 {
            return reader;
        }
        reader.num_filters = (n - 5 - array_offset) / 4;
        reader.array_offset = array_offset;
        reader.base_lg = base_lg;
        reader.data = contents;
        reader
    }

    pub fn key_may_match(&self, block_offset: u64, key: &[u8]) -> bool {
        let index = (block_offset >> self.base_lg) as usize;
        if index < self.num_filters {
            let start = decode_fixed32(&self.data[self.array_offset + 4 * index..]) as usize;
            let limit = decode_fixed32(&self.data[self.array_offset + 4 * index + 4..]) as usize;
            if start == limit {
                // Empty filters match no keys.
                return false;
            }
            if start < limit && limit <= self.array_offset {
                return self.policy.key_may_match(key, &self.data[start..limit]);
            }
        }
        // Missing filter or inconsistent offsets: treat as a potential match.
        true
    }
}
