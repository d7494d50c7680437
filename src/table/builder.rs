use std::borrow::Cow;
use std::cmp::Ordering;

use crate::block::BlockBuilder;
use crate::coding::{crc32c_pair, mask_crc};
use crate::env::WritableFile;
use crate::error::Result;
use crate::filter::FilterBlockBuilder;
use crate::options::{CompressionType, Options};

use super::format::{BlockHandle, Footer, BLOCK_TRAILER_SIZE};

/// Serializes an ordered key/value stream into a table file.
///
/// Data blocks are cut at `options.block_size` and indexed by a shortened
/// separator key; the index entry for a block is deferred until the first key
/// of the next block is known, which is what lets the separator be short.
/// The first I/O error latches: later calls become no-ops and `finish`
/// returns it.
pub struct TableBuilder<W: WritableFile> {
    options: Options,
    file: W,
    /// Bytes written so far; the offset the next block lands at.
    offset: u64,
    status: Result<()>,
    data_block: BlockBuilder,
    index_block: BlockBuilder,
    last_key: Vec<u8>,
    num_entries: u64,
    closed: bool,
    filter_block: Option<FilterBlockBuilder>,
    /// True iff the handle of the just-flushed data block still needs its
    /// index entry; implies the data block builder is empty.
    pending_index_entry: bool,
    pending_handle: BlockHandle,
}

impl<W: WritableFile> TableBuilder<W> {
    pub fn new(options: Options, file: W) -> TableBuilder<W> {
        let mut filter_block = options
            .filter_policy
            .clone()
            .map(FilterBlockBuilder::new);
        if let Some(fb) = &mut filter_block {
            fb.start_block(0);
        }
        TableBuilder {
            data_block: BlockBuilder::new(
                options.block_restart_interval,
                options.comparator.clone(),
            ),
            // One restart per entry: index keys are irregular and seeks
            // through them should not have to scan.
            index_block: BlockBuilder::new(1, options.comparator.clone()),
            options,
            file,
            offset: 0,
            status: Ok(()),
            last_key: Vec::new(),
            num_entries: 0,
            closed: false,
            filter_block,
            pending_index_entry: false,
            pending_handle: BlockHandle::default(),
        }
    }

    /// Appends a key/value pair. Keys must arrive in strictly increasing
    /// order.
    pub fn add(&mut self, key: &[u8], value: &[u8]) {
        assert!(!self.closed, "add() after finish()/abandon()");
        if self.status.is_err() {
            return;
        }
        if self.num_entries > 0 {
            assert!(
                self.options.comparator.compare(key, &self.last_key) == Ordering::Greater,
                "keys must be added in strictly increasing order"
            );
        }

        if self.pending_index_entry {
            debug_assert!(self.data_block.is_empty());
            self.options
                .comparator
                .find_shortest_separator(&mut self.last_key, key);
            let mut handle_encoding = Vec::new();
            self.pending_handle.encode_to(&mut handle_encoding);
            self.index_block.add(&self.last_key, &handle_encoding);
            self.pending_index_entry = false;
        }

        if let Some(fb) = &mut self.filter_block {
            fb.add_key(key);
        }

        self.last_key.clear();
        self.last_key.extend_from_slice(key);
        self.num_entries += 1;
        self.data_block.add(key, value);

        if self.data_block.current_size_estimate() >= self.options.block_size {
            self.flush();
        }
    }

    /// Writes out the data block under construction, if any.
    pub fn flush(&mut self) {
        assert!(!self.closed, "flush() after finish()/abandon()");
        if self.status.is_err() {
            return;
        }
        if self.data_block.is_empty() {
            return;
        }
        assert!(
            !self.pending_index_entry,
            "flush() with an index entry still pending"
        );

        let block = std::mem::replace(
            &mut self.data_block,
            BlockBuilder::new(
                self.options.block_restart_interval,
                self.options.comparator.clone(),
            ),
        );
        let handle = self.emit_block(block);
        if self.status.is_ok() {
            log::debug!(
                "flushed data block at offset {} ({} bytes)",
                handle.offset,
                handle.size
            );
            self.pending_handle = handle;
            self.pending_index_entry = true;
            if let Err(e) = self.file.flush() {
                self.status = Err(e);
            }
        }
        if let Some(fb) = &mut self.filter_block {
            fb.start_block(self.offset);
        }
    }

    /// Writes all remaining blocks and the footer. The caller still owns
    /// syncing and closing the file; on error the partially written file
    /// should be removed.
    pub fn finish(&mut self) -> Result<()> {
        self.flush();
        assert!(!self.closed, "finish() after finish()/abandon()");
        self.closed = true;

        let mut filter_block_handle = BlockHandle::default();
        let policy_name = self.options.filter_policy.as_ref().map(|p| p.name());

        // Filter block, stored uncompressed.
        if let Some(mut fb) = self.filter_block.take() {
            if self.status.is_ok() {
                let contents = fb.finish();
                filter_block_handle = self.emit_raw_block(contents, CompressionType::None);
            }
        }

        // Metaindex block: one entry mapping the policy name to the filter
        // block's handle.
        let mut metaindex_handle = BlockHandle::default();
        if self.status.is_ok() {
            let mut metaindex_block = BlockBuilder::new(
                self.options.block_restart_interval,
                self.options.comparator.clone(),
            );
            if let Some(name) = policy_name {
                let key = format!("filter.{name}");
                let mut handle_encoding = Vec::new();
                filter_block_handle.encode_to(&mut handle_encoding);
                metaindex_block.add(key.as_bytes(), &handle_encoding);
            }
            metaindex_handle = self.emit_block(metaindex_block);
        }

        // Index block, with the entry for the final data block keyed by a
        // short successor of the last key.
        let mut index_handle = BlockHandle::default();
        if self.status.is_ok() {
            if self.pending_index_entry {
                self.options.comparator.find_short_successor(&mut self.last_key);
                let mut handle_encoding = Vec::new();
                self.pending_handle.encode_to(&mut handle_encoding);
                self.index_block.add(&self.last_key, &handle_encoding);
                self.pending_index_entry = false;
            }
            let block = std::mem::replace(
                &mut self.index_block,
                BlockBuilder::new(1, self.options.comparator.clone()),
            );
            index_handle = self.emit_block(block);
        }

        if self.status.is_ok() {
            let footer = Footer {
                metaindex_handle,
                index_handle,
            };
            let mut footer_encoding = Vec::new();
            footer.encode_to(&mut footer_encoding);
            match self.file.append(&footer_encoding) {
                Ok(()) => self.offset += footer_encoding.len() as u64,
                Err(e) => self.status = Err(e),
            }
        }
        self.status.clone()
    }

    /// Gives up on the file without writing remaining blocks.
    pub fn abandon(&mut self) {
        assert!(!self.closed, "abandon() after finish()/abandon()");
        self.closed = true;
    }

    pub fn status(&self) -> Result<()> {
        self.status.clone()
    }

    pub fn num_entries(&self) -> u64 {
        self.num_entries
    }

    /// Size of the file generated so far; final after `finish`.
    pub fn file_size(&self) -> u64 {
        self.offset
    }

    /// Hands back the underlying file so the caller can sync and close it.
    pub fn into_file(self) -> W {
        assert!(self.closed, "into_file() before finish()/abandon()");
        self.file
    }

    /// Compresses if configured and worthwhile (at least 1/8 saved), then
    /// appends payload and trailer.
    fn emit_block(&mut self, mut block: BlockBuilder) -> BlockHandle {
        let raw = block.finish();
        let (contents, kind): (Cow<[u8]>, CompressionType) = match self.options.compression {
            CompressionType::None => (Cow::Borrowed(raw), CompressionType::None),
            CompressionType::Snappy => match snap::raw::Encoder::new().compress_vec(raw) {
                Ok(compressed) if compressed.len() < raw.len() - raw.len() / 8 => {
                    (Cow::Owned(compressed), CompressionType::Snappy)
                }
                // Incompressible (or the encoder failed): store raw bytes.
                _ => (Cow::Borrowed(raw), CompressionType::None),
            },
        };
        self.emit_raw_block(&contents, kind)
    }

    fn emit_raw_block(&mut self, contents: &[u8], kind: CompressionType) -> BlockHandle {
        let handle = BlockHandle::new(self.offset, contents.len() as u64);
        if let Err(e) = self.append_with_trailer(contents, kind) {
            if self.status.is_ok() {
                self.status = Err(e);
            }
            return handle;
        }
        self.offset += contents.len() as u64 + BLOCK_TRAILER_SIZE as u64;
        handle
    }

    fn append_with_trailer(&mut self, contents: &[u8], kind: CompressionType) -> Result<()> {
        self.file.append(contents)?;
        let mut trailer = [0u8; BLOCK_TRAILER_SIZE];
        trailer[0] = kind as u8;
        let crc = crc32c_pair(contents, &trailer[..1]);
        trailer[1..].copy_from_slice(&mask_crc(crc).to_le_bytes());
        self.file.append(&trailer)?;
        Ok(())
    }
}
