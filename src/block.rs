mod builder;
mod iterator;

pub use builder::BlockBuilder;
use bytes::Bytes;
pub use iterator::BlockIterator;

use crate::coding::decode_fixed32;
use crate::error::{Error, Result};

/// A decoded block: the smallest unit of read and caching. The payload is a
/// run of prefix-compressed records followed by an array of restart offsets
/// and a trailing restart count:
///
/// ```text
/// record*  restart_offsets[num_restarts] (u32 LE each)  num_restarts (u32 LE)
/// ```
///
/// At a restart point a record stores its key in full, which is what makes
/// binary search over the restart array possible.
pub struct Block {
    data: Bytes,
    restart_offset: usize,
    num_restarts: u32,
}

impl Block {
    /// Validates the restart array bounds and takes ownership of `data`.
    pub fn new(data: Bytes) -> Result<Block> {
        if data.len() < 4 {
            return Err(Error::corruption("block too short for restart count"));
        }
        let num_restarts = decode_fixed32(&data[data.len() - 4..]);
        let max_restarts = ((data.len() - 4) / 4) as u32;
        if num_restarts > max_restarts {
            return Err(Error::corruption("restart array overruns block"));
        }
        let restart_offset = data.len() - 4 * (1 + num_restarts as usize);
        Ok(Block {
            data,
            restart_offset,
            num_restarts,
        })
    }

    /// Size of the decoded payload in bytes, used as the cache charge.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub(crate) fn data(&self) -> &[u8] {
        &self.data
    }

    /// Offset where the record region ends and the restart array begins.
    pub(crate) fn restart_offset(&self) -> usize {
        self.restart_offset
    }

    pub(crate) fn num_restarts(&self) -> usize {
        self.num_restarts as usize
    }

    /// Byte offset of the `index`-th restart record.
    pub(crate) fn restart_point(&self, index: usize) -> usize {
        debug_assert!(index < self.num_restarts());
        decode_fixed32(&self.data[self.restart_offset + 4 * index..]) as usize
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::comparator::{BytewiseComparator, Comparator};
    use crate::iterators::StorageIterator;

    fn comparator() -> Arc<dyn Comparator> {
        Arc::new(BytewiseComparator)
    }

    fn build(entries: &[(&[u8], &[u8])], restart_interval: usize) -> Arc<Block> {
        let mut builder = BlockBuilder::new(restart_interval, comparator());
        for (k, v) in entries {
            builder.add(k, v);
        }
        let contents = Bytes::copy_from_slice(builder.finish());
        Arc::new(Block::new(contents).unwrap())
    }

    fn collect_forward(block: &Arc<Block>) -> Vec<(Vec<u8>, Vec<u8>)> {
        let mut iter = BlockIterator::new(block.clone(), comparator());
        let mut out = Vec::new();
        iter.seek_to_first();
        while iter.valid() {
            out.push((iter.key().to_vec(), iter.value().to_vec()));
            iter.next();
        }
        iter.status().unwrap();
        out
    }

    #[test]
    fn empty_block_round_trip() {
        let block = build(&[], 16);
        assert_eq!(block.num_restarts(), 1);
        assert!(collect_forward(&block).is_empty());
    }

    #[test]
    fn round_trip_various_restart_intervals() {
        let entries: Vec<(Vec<u8>, Vec<u8>)> = (0..100)
            .map(|i| {
                (
                    format!("key{i:05}").into_bytes(),
                    format!("value{i}").into_bytes(),
                )
            })
            .collect();
        let borrowed: Vec<(&[u8], &[u8])> = entries
            .iter()
            .map(|(k, v)| (k.as_slice(), v.as_slice()))
            .collect();
        for interval in [1, 2, 8, 16, 100] {
            let block = build(&borrowed, interval);
            let decoded = collect_forward(&block);
            assert_eq!(decoded.len(), entries.len());
            for ((k, v), (dk, dv)) in entries.iter().zip(decoded.iter()) {
                assert_eq!(k, dk);
                assert_eq!(v, dv);
            }
        }
    }

    #[test]
    fn prefix_compression_layout() {
        // 16 keys sharing the "user0000" prefix, restart interval 8: exactly
        // two restarts, and every non-restart record shares at least the
        // 8-byte common prefix with its predecessor.
        let keys: Vec<Vec<u8>> = (0..16)
            .map(|i| format!("user{i:06}").into_bytes())
            .collect();
        let entries: Vec<(&[u8], &[u8])> =
            keys.iter().map(|k| (k.as_slice(), &b"x"[..])).collect();
        let block = build(&entries, 8);

        assert_eq!(block.num_restarts(), 2);
        assert_eq!(block.restart_point(0), 0);

        // Walk the raw records and check the shared lengths directly.
        let data = block.data();
        let mut pos = 0;
        let mut index = 0;
        while pos < block.restart_offset() {
            let (shared, n1) = crate::coding::get_varint32(&data[pos..]).unwrap();
            let (non_shared, n2) = crate::coding::get_varint32(&data[pos + n1..]).unwrap();
            let (value_len, n3) =
                crate::coding::get_varint32(&data[pos + n1 + n2..]).unwrap();
            if index == 0 || index == 8 {
                assert_eq!(shared, 0, "restart record {index} must store a full key");
                if index == 8 {
                    assert_eq!(block.restart_point(1), pos);
                }
            } else {
                assert!(shared >= 8, "record {index} shared only {shared} bytes");
            }
            pos += n1 + n2 + n3 + non_shared as usize + value_len as usize;
            index += 1;
        }
        assert_eq!(index, 16);
    }

    #[test]
    fn seek_lands_on_first_key_not_less() {
        let entries: Vec<(Vec<u8>, Vec<u8>)> = (0..50)
            .map(|i| (format!("k{:04}", i * 2).into_bytes(), vec![i as u8]))
            .collect();
        let borrowed: Vec<(&[u8], &[u8])> = entries
            .iter()
            .map(|(k, v)| (k.as_slice(), v.as_slice()))
            .collect();
        let block = build(&borrowed, 4);
        let mut iter = BlockIterator::new(block, comparator());

        iter.seek(b"k0008");
        assert!(iter.valid());
        assert_eq!(iter.key(), b"k0008");

        // Between two keys: lands on the next one.
        iter.seek(b"k0009");
        assert!(iter.valid());
        assert_eq!(iter.key(), b"k0010");

        // Before the first key.
        iter.seek(b"");
        assert!(iter.valid());
        assert_eq!(iter.key(), b"k0000");

        // Past the last key.
        iter.seek(b"k9999");
        assert!(!iter.valid());
        iter.status().unwrap();
    }

    #[test]
    fn forward_then_backward() {
        let entries: Vec<(Vec<u8>, Vec<u8>)> = (0..30)
            .map(|i| (format!("key{i:03}").into_bytes(), vec![i as u8]))
            .collect();
        let borrowed: Vec<(&[u8], &[u8])> = entries
            .iter()
            .map(|(k, v)| (k.as_slice(), v.as_slice()))
            .collect();
        let block = build(&borrowed, 7);
        let mut iter = BlockIterator::new(block, comparator());

        iter.seek_to_last();
        let mut reversed = Vec::new();
        while iter.valid() {
            reversed.push(iter.key().to_vec());
            iter.prev();
        }
        iter.status().unwrap();
        let mut expected: Vec<Vec<u8>> = entries.iter().map(|(k, _)| k.clone()).collect();
        expected.reverse();
        assert_eq!(reversed, expected);
    }

    #[test]
    fn prev_from_first_invalidates() {
        let block = build(&[(b"a", b"1"), (b"b", b"2")], 16);
        let mut iter = BlockIterator::new(block, comparator());
        iter.seek_to_first();
        iter.prev();
        assert!(!iter.valid());
        iter.status().unwrap();
    }

    #[test]
    fn seek_then_prev_crosses_restart() {
        let entries: Vec<(Vec<u8>, Vec<u8>)> = (0..20)
            .map(|i| (format!("key{i:03}").into_bytes(), vec![i as u8]))
            .collect();
        let borrowed: Vec<(&[u8], &[u8])> = entries
            .iter()
            .map(|(k, v)| (k.as_slice(), v.as_slice()))
            .collect();
        // Interval 4 puts key008 at a restart; prev from it must scan the
        // previous restart region.
        let block = build(&borrowed, 4);
        let mut iter = BlockIterator::new(block, comparator());
        iter.seek(b"key008");
        assert_eq!(iter.key(), b"key008");
        iter.prev();
        assert!(iter.valid());
        assert_eq!(iter.key(), b"key007");
    }

    #[test]
    fn builder_reset_reproduces_bytes() {
        let mut builder = BlockBuilder::new(5, comparator());
        let add_all = |b: &mut BlockBuilder| {
            for i in 0..20 {
                b.add(format!("key{i:03}").as_bytes(), b"value");
            }
        };
        add_all(&mut builder);
        let first = builder.finish().to_vec();
        builder.reset();
        add_all(&mut builder);
        let second = builder.finish().to_vec();
        assert_eq!(first, second);
    }

    #[test]
    fn size_estimate_tracks_finished_size() {
        let mut builder = BlockBuilder::new(3, comparator());
        assert!(builder.is_empty());
        for i in 0..10 {
            builder.add(format!("key{i:03}").as_bytes(), b"v");
        }
        assert!(!builder.is_empty());
        let estimate = builder.current_size_estimate();
        assert_eq!(builder.finish().len(), estimate);
    }

    #[test]
    #[should_panic(expected = "increasing order")]
    fn out_of_order_add_panics() {
        let mut builder = BlockBuilder::new(16, comparator());
        builder.add(b"b", b"1");
        builder.add(b"a", b"2");
    }

    #[test]
    #[should_panic(expected = "increasing order")]
    fn duplicate_add_panics() {
        let mut builder = BlockBuilder::new(16, comparator());
        builder.add(b"a", b"1");
        builder.add(b"a", b"2");
    }

    #[test]
    fn rejects_short_contents() {
        assert!(Block::new(Bytes::from_static(&[0, 0, 0])).is_err());
    }

    #[test]
    fn rejects_oversized_restart_count() {
        // Claims 100 restarts in a 4-byte block.
        assert!(Block::new(Bytes::from_static(&[100, 0, 0, 0])).is_err());
    }

    #[test]
    fn truncated_record_sets_corruption_status() {
        // One restart at offset 0, record region is a single dangling
        // continuation byte.
        let mut raw = vec![0x80u8];
        raw.extend_from_slice(&0u32.to_le_bytes());
        raw.extend_from_slice(&1u32.to_le_bytes());
        let block = Arc::new(Block::new(Bytes::from(raw)).unwrap());
        let mut iter = BlockIterator::new(block, comparator());
        iter.seek_to_first();
        assert!(!iter.valid());
        assert!(iter.status().unwrap_err().is_corruption());
    }

    #[test]
    fn impossible_shared_length_sets_corruption_status() {
        // First record claims 3 shared bytes, but there is no previous key.
        let mut raw = vec![3u8, 0, 0];
        raw.extend_from_slice(&0u32.to_le_bytes());
        raw.extend_from_slice(&1u32.to_le_bytes());
        let block = Arc::new(Block::new(Bytes::from(raw)).unwrap());
        let mut iter = BlockIterator::new(block, comparator());
        iter.seek_to_first();
        assert!(!iter.valid());
        assert!(iter.status().unwrap_err().is_corruption());
    }

    #[test]
    fn record_overrunning_block_sets_corruption_status() {
        // value_len of 200 cannot fit in the record region.
        let mut raw = vec![0u8, 1, 200, b'a'];
        raw.extend_from_slice(&0u32.to_le_bytes());
        raw.extend_from_slice(&1u32.to_le_bytes());
        let block = Arc::new(Block::new(Bytes::from(raw)).unwrap());
        let mut iter = BlockIterator::new(block, comparator());
        iter.seek_to_first();
        assert!(!iter.valid());
        assert!(iter.status().unwrap_err().is_corruption());
    }
}
