use std::sync::Arc;

use crate::block::Block;
use crate::cache::ShardedCache;
use crate::comparator::{BytewiseComparator, Comparator};
use crate::filter::FilterPolicy;

/// How a block's payload is stored on disk. The discriminant is the type byte
/// written into the block trailer.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionType {
    None = 0,
    Snappy = 1,
}

impl CompressionType {
    pub fn from_u8(v: u8) -> Option<CompressionType> {
        match v {
            0 => Some(CompressionType::None),
            1 => Some(CompressionType::Snappy),
            _ => None,
        }
    }
}

/// Knobs for building and reading tables.
#[derive(Clone)]
pub struct Options {
    /// Total order over keys; must be stable across writes and reads of the
    /// same file.
    pub comparator: Arc<dyn Comparator>,
    /// Target uncompressed size of a data block before it is flushed.
    pub block_size: usize,
    /// Records between restart points in data blocks.
    pub block_restart_interval: usize,
    pub compression: CompressionType,
    /// Optional membership filter; `None` disables filter blocks entirely.
    pub filter_policy: Option<Arc<dyn FilterPolicy>>,
    /// Optional cache for decoded data blocks.
    pub block_cache: Option<Arc<ShardedCache<Block>>>,
    /// Verify checksums on every block read, not just when a `ReadOptions`
    /// asks for it.
    pub paranoid_checks: bool,
}

impl Default for Options {
    fn default() -> Options {
        Options {
            comparator: Arc::new(BytewiseComparator),
            block_size: 4096,
            block_restart_interval: 16,
            compression: CompressionType::Snappy,
            filter_policy: None,
            block_cache: None,
            paranoid_checks: false,
        }
    }
}

/// Per-read knobs.
#[derive(Debug, Clone, Copy)]
pub struct ReadOptions {
    pub verify_checksums: bool,
    /// Whether blocks fetched for this read should be admitted to the block
    /// cache.
    pub fill_cache: bool,
}

impl Default for ReadOptions {
    fn default() -> ReadOptions {
        ReadOptions {
            verify_checksums: false,
            fill_cache: true,
        }
    }
}
