mod builder;
mod format;

use std::sync::Arc;

pub use builder::TableBuilder;
use bytes::Bytes;
pub use format::{BlockHandle, Footer, BLOCK_TRAILER_SIZE, FOOTER_ENCODED_LENGTH, TABLE_MAGIC_NUMBER};

use crate::block::{Block, BlockIterator};
use crate::env::RandomAccessFile;
use crate::error::{Error, Result};
use crate::filter::{FilterBlockReader, FilterPolicy};
use crate::iterators::two_level_iterator::TwoLevelIterator;
use crate::iterators::StorageIterator;
use crate::options::{Options, ReadOptions};

/// An open, immutable table file.
///
/// The index block is parsed eagerly at `open` and shared by every cursor;
/// the filter block is loaded lazily alongside it when a policy is
/// configured. Data blocks are fetched on demand, optionally through the
/// block cache, keyed by a per-open id so different files sharing a cache
/// never collide. Concurrent readers are safe once `open` returns.
pub struct Table {
    options: Options,
    file: Arc<dyn RandomAccessFile>,
    cache_id: u64,
    index_block: Arc<Block>,
    metaindex_handle: BlockHandle,
    filter: Option<FilterBlockReader>,
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("cache_id", &self.cache_id)
            .field("metaindex_handle", &self.metaindex_handle)
            .finish_non_exhaustive()
    }
}

impl Table {
    /// Reads the footer, index block and (if configured) filter block of the
    /// file, which must be `size` bytes long.
    pub fn open(options: Options, file: Arc<dyn RandomAccessFile>, size: u64) -> Result<Table> {
        if size < FOOTER_ENCODED_LENGTH as u64 {
            return Err(Error::corruption("file is too short to be an sstable"));
        }
        let footer_input = file.read(size - FOOTER_ENCODED_LENGTH as u64, FOOTER_ENCODED_LENGTH)?;
        let footer = Footer::decode_from(&footer_input)?;

        let index_contents =
            format::read_block(file.as_ref(), &footer.index_handle, options.paranoid_checks)?;
        let index_block = Arc::new(Block::new(index_contents)?);
        let cache_id = options.block_cache.as_ref().map_or(0, |cache| cache.new_id());

        let mut table = Table {
            options,
            file,
            cache_id,
            index_block,
            metaindex_handle: footer.metaindex_handle,
            filter: None,
        };
        table.read_meta(&footer);
        log::debug!(
            "opened table of {} bytes, filter {}",
            size,
            if table.filter.is_some() { "present" } else { "absent" }
        );
        Ok(table)
    }

    /// Loads the filter block named by the metaindex. Failures here are
    /// non-fatal: the table just reads without a filter.
    fn read_meta(&mut self, footer: &Footer) {
        let Some(policy) = self.options.filter_policy.clone() else {
            return;
        };
        let Ok(contents) = format::read_block(
            self.file.as_ref(),
            &footer.metaindex_handle,
            self.options.paranoid_checks,
        ) else {
            return;
        };
        let Ok(meta) = Block::new(contents) else {
            return;
        };
        let mut iter = BlockIterator::new(Arc::new(meta), self.options.comparator.clone());
        let key = format!("filter.{}", policy.name());
        iter.seek(key.as_bytes());
        if iter.valid() && iter.key() == key.as_bytes() {
            self.read_filter(policy, iter.value());
        }
    }

    fn read_filter(&mut self, policy: Arc<dyn FilterPolicy>, handle_value: &[u8]) {
        let Ok((handle, _)) = BlockHandle::decode_from(handle_value) else {
            return;
        };
        let Ok(contents) = format::read_block(
            self.file.as_ref(),
            &handle,
            self.options.paranoid_checks,
        ) else {
            return;
        };
        self.filter = Some(FilterBlockReader::new(policy, contents));
    }

    /// Fetches the data block an index entry points at and returns a cursor
    /// over it, going through the block cache when one is configured.
    fn block_iterator(&self, options: &ReadOptions, index_value: &[u8]) -> Result<BlockIterator> {
        let (handle, _) = BlockHandle::decode_from(index_value)?;
        let verify = options.verify_checksums || self.options.paranoid_checks;

        let block: Arc<Block> = match &self.options.block_cache {
            Some(cache) => {
                let mut cache_key = [0u8; 16];
                cache_key[..8].copy_from_slice(&self.cache_id.to_be_bytes());
                cache_key[8..].copy_from_slice(&handle.offset.to_be_bytes());
                match cache.lookup(&cache_key) {
                    Some(block) => block,
                    None => {
                        let contents = format::read_block(self.file.as_ref(), &handle, verify)?;
                        let block = Block::new(contents)?;
                        let charge = block.size();
                        if options.fill_cache {
                            cache.insert(&cache_key, block, charge)
                        } else {
                            Arc::new(block)
                        }
                    }
                }
            }
            None => {
                let contents = format::read_block(self.file.as_ref(), &handle, verify)?;
                Arc::new(Block::new(contents)?)
            }
        };
        Ok(BlockIterator::new(block, self.options.comparator.clone()))
    }

    /// A cursor over the whole table: an index cursor outside, data-block
    /// cursors inside.
    pub fn new_iterator(self: Arc<Self>, options: ReadOptions) -> TwoLevelIterator {
        let index_iter =
            BlockIterator::new(self.index_block.clone(), self.options.comparator.clone());
        let table = self;
        TwoLevelIterator::new(
            index_iter,
            Box::new(move |read_options, index_value| {
                table.block_iterator(read_options, index_value)
            }),
            options,
        )
    }

    /// Point lookup. Descends the index, consults the filter, and only then
    /// touches the data block; a filter "no" short-circuits to `Ok(None)`
    /// without any block I/O.
    pub fn get(&self, options: &ReadOptions, key: &[u8]) -> Result<Option<Bytes>> {
        let mut index_iter =
            BlockIterator::new(self.index_block.clone(), self.options.comparator.clone());
        index_iter.seek(key);
        if !index_iter.valid() {
            index_iter.status()?;
            return Ok(None);
        }

        let index_value = index_iter.value();
        if let Some(filter) = &self.filter {
            if let Ok((handle, _)) = BlockHandle::decode_from(index_value) {
                if !filter.key_may_match(handle.offset, key) {
                    return Ok(None);
                }
            }
        }

        let mut block_iter = self.block_iterator(options, index_value)?;
        block_iter.seek(key);
        if block_iter.valid()
            && self.options.comparator.compare(block_iter.key(), key) == std::cmp::Ordering::Equal
        {
            return Ok(Some(Bytes::copy_from_slice(block_iter.value())));
        }
        block_iter.status()?;
        Ok(None)
    }

    /// Approximate file offset where the data for `key` begins. Keys past
    /// the last entry map to the start of the metaindex block, i.e. the end
    /// of the data area.
    pub fn approximate_offset_of(&self, key: &[u8]) -> u64 {
        let mut index_iter =
            BlockIterator::new(self.index_block.clone(), self.options.comparator.clone());
        index_iter.seek(key);
        if index_iter.valid() {
            if let Ok((handle, _)) = BlockHandle::decode_from(index_iter.value()) {
                return handle.offset;
            }
        }
        self.metaindex_handle.offset
    }
}
