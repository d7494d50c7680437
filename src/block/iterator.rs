use std::cmp::Ordering;
use std::sync::Arc;

use crate::coding::get_varint32;
use crate::comparator::Comparator;
use crate::error::{Error, Result};
use crate::iterators::StorageIterator;

use super::Block;

/// Cursor over a single decoded block.
///
/// The key is materialized into a cursor-owned buffer that is rewritten on
/// every movement, so callers that need to retain it must copy. Because
/// records share prefix bytes with their predecessor, `prev` cannot decode
/// backwards; it re-seeks the nearest restart point and scans forward.
///
/// Corruption (bad varints, impossible shared lengths, out-of-bounds record
/// extents) moves the cursor to a terminal invalid state and latches the
/// error in `status`.
pub struct BlockIterator {
    block: Arc<Block>,
    comparator: Arc<dyn Comparator>,
    /// Offset of the current record; `block.restart_offset()` means invalid.
    current: usize,
    /// Index of the restart region containing `current`.
    restart_index: usize,
    key: Vec<u8>,
    value_range: (usize, usize),
    status: Result<()>,
}

/// Record header: shared, non-shared and value lengths plus header size.
fn decode_entry(data: &[u8]) -> Option<(usize, usize, usize, usize)> {
    let (shared, n1) = get_varint32(data)?;
    let (non_shared, n2) = get_varint32(&data[n1..])?;
    let (value_len, n3) = get_varint32(&data[n1 + n2..])?;
    Some((
        shared as usize,
        non_shared as usize,
        value_len as usize,
        n1 + n2 + n3,
    ))
}

impl BlockIterator {
    pub fn new(block: Arc<Block>, comparator: Arc<dyn Comparator>) -> BlockIterator {
        let current = block.restart_offset();
        let restart_index = block.num_restarts();
        BlockIterator {
            block,
            comparator,
            current,
            restart_index,
            key: Vec::new(),
            value_range: (0, 0),
            status: Ok(()),
        }
    }

    fn next_entry_offset(&self) -> usize {
        self.value_range.1
    }

    fn seek_to_restart_point(&mut self, index: usize) {
        self.key.clear();
        self.restart_index = index;
        let offset = self.block.restart_point(index);
        // No record parsed yet; park the value end at the restart so the next
        // parse starts there.
        self.value_range = (offset, offset);
    }

    fn mark_invalid(&mut self) {
        self.current = self.block.restart_offset();
        self.restart_index = self.block.num_restarts();
        self.key.clear();
        self.value_range = (0, 0);
    }

    fn corruption(&mut self, msg: &str) {
        if self.status.is_ok() {
            self.status = Err(Error::corruption(msg));
        }
        self.mark_invalid();
    }

    /// Decodes the record at `next_entry_offset`, reconstructing the key as
    /// `prev_key[..shared] ++ non_shared`. Returns false at the end of the
    /// record region or on corruption.
    fn parse_next_key(&mut self) -> bool {
        self.current = self.next_entry_offset();
        let limit = self.block.restart_offset();
        if self.current >= limit {
            self.mark_invalid();
            return false;
        }

        let entry = match decode_entry(&self.block.data()[self.current..limit]) {
            Some(entry) => entry,
            None => {
                self.corruption("bad record header in block");
                return false;
            }
        };
        let (shared, non_shared, value_len, header_len) = entry;
        if shared > self.key.len() {
            self.corruption("record shares more bytes than previous key holds");
            return false;
        }
        let key_start = self.current + header_len;
        if key_start + non_shared + value_len > limit {
            self.corruption("record overruns block contents");
            return false;
        }

        self.key.truncate(shared);
        self.key
            .extend_from_slice(&self.block.data()[key_start..key_start + non_shared]);
        self.value_range = (key_start + non_shared, key_start + non_shared + value_len);
        while self.restart_index + 1 < self.block.num_restarts()
            && self.block.restart_point(self.restart_index + 1) < self.current
        {
            self.restart_index += 1;
        }
        true
    }

    /// Byte range of the full key stored at restart `index`, for binary
    /// search.
    fn restart_key_range(&self, index: usize) -> Option<(usize, usize)> {
        let offset = self.block.restart_point(index);
        let limit = self.block.restart_offset();
        if offset >= limit {
            return None;
        }
        let (shared, non_shared, _, header_len) = decode_entry(&self.block.data()[offset..limit])?;
        if shared != 0 || offset + header_len + non_shared > limit {
            return None;
        }
        Some((offset + header_len, offset + header_len + non_shared))
    }
}

impl StorageIterator for BlockIterator {
    fn valid(&self) -> bool {
        self.status.is_ok() && self.current < self.block.restart_offset()
    }

    fn seek_to_first(&mut self) {
        if self.status.is_err() || self.block.num_restarts() == 0 {
            self.mark_invalid();
            return;
        }
        self.seek_to_restart_point(0);
        self.parse_next_key();
    }

    fn seek_to_last(&mut self) {
        if self.status.is_err() || self.block.num_restarts() == 0 {
            self.mark_invalid();
            return;
        }
        self.seek_to_restart_point(self.block.num_restarts() - 1);
        while self.parse_next_key() && self.next_entry_offset() < self.block.restart_offset() {}
    }

    fn seek(&mut self, target: &[u8]) {
        if self.status.is_err() || self.block.num_restarts() == 0 {
            self.mark_invalid();
            return;
        }
        // Binary search the restart array for the last restart whose key is
        // strictly less than the target, then scan records forward.
        let mut left = 0;
        let mut right = self.block.num_restarts() - 1;
        while left < right {
            let mid = (left + right + 1) / 2;
            let Some((key_start, key_end)) = self.restart_key_range(mid) else {
                self.corruption("bad restart record in block");
                return;
            };
            let mid_key = &self.block.data()[key_start..key_end];
            if self.comparator.compare(mid_key, target) == Ordering::Less {
                left = mid;
            } else {
                right = mid - 1;
            }
        }

        self.seek_to_restart_point(left);
        loop {
            if !self.parse_next_key() {
                return;
            }
            if self.comparator.compare(&self.key, target) != Ordering::Less {
                return;
            }
        }
    }

    fn next(&mut self) {
        assert!(self.valid(), "next() on invalid cursor");
        self.parse_next_key();
    }

    fn prev(&mut self) {
        assert!(self.valid(), "prev() on invalid cursor");
        let original = self.current;

        // Back up to the restart region that ends before the current record.
        while self.block.restart_point(self.restart_index) >= original {
            if self.restart_index == 0 {
                // No record precedes the first one.
                self.mark_invalid();
                return;
            }
            self.restart_index -= 1;
        }

        self.seek_to_restart_point(self.restart_index);
        // Scan forward, stopping at the record just before the original.
        loop {
            if !self.parse_next_key() {
                return;
            }
            if self.next_entry_offset() >= original {
                return;
            }
        }
    }

    fn key(&self) -> &[u8] {
        assert!(self.valid(), "key() on invalid cursor");
        &self.key
    }

    fn value(&self) -> &[u8] {
        assert!(self.valid(), "value() on invalid cursor");
        &self.block.data()[self.value_range.0..self.value_range.1]
    }

    fn status(&self) -> Result<()> {
        self.status.clone()
    }
}
