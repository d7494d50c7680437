use std::cmp::Ordering;
use std::sync::Arc;

use crate::coding::put_varint32;
use crate::comparator::Comparator;

/// Builds a block. Records are prefix-compressed against their predecessor;
/// every `restart_interval` records the full key is stored so readers can
/// binary-search the restart array.
pub struct BlockBuilder {
    restart_interval: usize,
    comparator: Arc<dyn Comparator>,
    /// Serialized records; the restart array is appended by `finish`.
    buffer: Vec<u8>,
    /// Offsets of records that store a full key.
    restarts: Vec<u32>,
    /// Records emitted since the last restart.
    counter: usize,
    finished: bool,
    last_key: Vec<u8>,
}

fn mismatch(lhs: &[u8], rhs: &[u8]) -> usize {
    mismatch_chunks::<64>(lhs, rhs)
}

fn mismatch_chunks<const N: usize>(lhs: &[u8], rhs: &[u8]) -> usize {
    let off = std::iter::zip(lhs.chunks_exact(N), rhs.chunks_exact(N))
        .take_while(|(a, b)| a == b)
        .count()
        * N;
    off + std::iter::zip(&lhs[off..], &rhs[off..])
        .take_while(|(a, b)| a == b)
        .count()
}

impl BlockBuilder {
    pub fn new(restart_interval: usize, comparator: Arc<dyn Comparator>) -> BlockBuilder {
        assert!(restart_interval >= 1);
        BlockBuilder {
            restart_interval,
            comparator,
            buffer: Vec::new(),
            restarts: vec![0],
            counter: 0,
            finished: false,
            last_key: Vec::new(),
        }
    }

    /// Clears the contents as if the builder had just been constructed.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.restarts.clear();
        self.restarts.push(0);
        self.counter = 0;
        self.finished = false;
        self.last_key.clear();
    }

    /// Appends a record. `key` must be strictly greater than every previously
    /// added key; feeding unsorted input is a programmer error.
    pub fn add(&mut self, key: &[u8], value: &[u8]) {
        assert!(!self.finished, "add() after finish()");
        assert!(self.counter <= self.restart_interval);
        assert!(
            self.buffer.is_empty()
                || self.comparator.compare(key, &self.last_key) == Ordering::Greater,
            "keys must be added in strictly increasing order"
        );

        let shared = if self.counter < self.restart_interval {
            mismatch(&self.last_key, key)
        } else {
            self.restarts.push(self.buffer.len() as u32);
            self.counter = 0;
            0
        };
        let non_shared = key.len() - shared;

        put_varint32(&mut self.buffer, shared as u32);
        put_varint32(&mut self.buffer, non_shared as u32);
        put_varint32(&mut self.buffer, value.len() as u32);
        self.buffer.extend_from_slice(&key[shared..]);
        self.buffer.extend_from_slice(value);

        self.last_key.truncate(shared);
        self.last_key.extend_from_slice(&key[shared..]);
        debug_assert_eq!(self.last_key, key);
        self.counter += 1;
    }

    /// Appends the restart array and returns a view of the block contents.
    /// The slice stays valid until `reset`.
    pub fn finish(&mut self) -> &[u8] {
        for i in 0..self.restarts.len() {
            let restart = self.restarts[i];
            self.buffer.extend_from_slice(&restart.to_le_bytes());
        }
        self.buffer
            .extend_from_slice(&(self.restarts.len() as u32).to_le_bytes());
        self.finished = true;
        &self.buffer
    }

    /// Estimate of the finished, uncompressed block size.
    pub fn current_size_estimate(&self) -> usize {
        self.buffer.len() + self.restarts.len() * 4 + 4
    }

    /// True iff no record has been added since the last `reset`.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}
