use crate::block::BlockIterator;
use crate::error::Result;
use crate::options::ReadOptions;

use super::StorageIterator;

/// Materializes the data-block cursor for an index entry's value.
pub type BlockFunction = Box<dyn Fn(&ReadOptions, &[u8]) -> Result<BlockIterator>>;

/// Composes an index cursor with the data-block cursors it points at,
/// presenting the table as one flat ordered sequence.
///
/// The outer cursor walks index entries whose values are block handles; the
/// block function turns a handle into an inner cursor. The handle that
/// produced the current inner cursor is remembered so an outer move that
/// lands on the same block does not recreate it.
pub struct TwoLevelIterator {
    index_iter: BlockIterator,
    data_iter: Option<BlockIterator>,
    block_function: BlockFunction,
    options: ReadOptions,
    /// Index value that produced `data_iter`.
    data_block_handle: Vec<u8>,
    status: Result<()>,
}

impl TwoLevelIterator {
    pub(crate) fn new(
        index_iter: BlockIterator,
        block_function: BlockFunction,
        options: ReadOptions,
    ) -> TwoLevelIterator {
        TwoLevelIterator {
            index_iter,
            data_iter: None,
            block_function,
            options,
            data_block_handle: Vec::new(),
            status: Ok(()),
        }
    }

    fn save_error(&mut self, error: crate::error::Error) {
        if self.status.is_ok() {
            self.status = Err(error);
        }
    }

    fn set_data_iterator(&mut self, iter: Option<BlockIterator>) {
        if let Some(old) = &self.data_iter {
            if let Err(e) = old.status() {
                self.save_error(e);
            }
        }
        self.data_iter = iter;
    }

    fn init_data_block(&mut self) {
        if !self.index_iter.valid() {
            self.set_data_iterator(None);
            return;
        }
        if self.data_iter.is_some() && self.index_iter.value() == self.data_block_handle.as_slice()
        {
            // Already positioned over this block.
            return;
        }
        let handle = self.index_iter.value().to_vec();
        match (self.block_function)(&self.options, &handle) {
            Ok(iter) => {
                self.data_block_handle = handle;
                self.set_data_iterator(Some(iter));
            }
            Err(e) => {
                self.save_error(e);
                self.data_block_handle.clear();
                self.set_data_iterator(None);
            }
        }
    }

    /// Walks the outer cursor forward past blocks whose cursors are empty or
    /// exhausted.
    fn skip_empty_data_blocks_forward(&mut self) {
        while self.data_iter.as_ref().map_or(true, |it| !it.valid()) {
            if !self.index_iter.valid() {
                self.set_data_iterator(None);
                return;
            }
            self.index_iter.next();
            self.init_data_block();
            if let Some(iter) = &mut self.data_iter {
                iter.seek_to_first();
            }
        }
    }

    fn skip_empty_data_blocks_backward(&mut self) {
        while self.data_iter.as_ref().map_or(true, |it| !it.valid()) {
            if !self.index_iter.valid() {
                self.set_data_iterator(None);
                return;
            }
            self.index_iter.prev();
            self.init_data_block();
            if let Some(iter) = &mut self.data_iter {
                iter.seek_to_last();
            }
        }
    }

    fn data_iter(&self) -> &BlockIterator {
        self.data_iter.as_ref().expect("cursor is not positioned")
    }
}

impl StorageIterator for TwoLevelIterator {
    fn valid(&self) -> bool {
        self.data_iter.as_ref().is_some_and(|it| it.valid())
    }

    fn seek_to_first(&mut self) {
        self.index_iter.seek_to_first();
        self.init_data_block();
        if let Some(iter) = &mut self.data_iter {
            iter.seek_to_first();
        }
        self.skip_empty_data_blocks_forward();
    }

    fn seek_to_last(&mut self) {
        self.index_iter.seek_to_last();
        self.init_data_block();
        if let Some(iter) = &mut self.data_iter {
            iter.seek_to_last();
        }
        self.skip_empty_data_blocks_backward();
    }

    fn seek(&mut self, target: &[u8]) {
        self.index_iter.seek(target);
        self.init_data_block();
        if let Some(iter) = &mut self.data_iter {
            iter.seek(target);
        }
        self.skip_empty_data_blocks_forward();
    }

    fn next(&mut self) {
        assert!(self.valid(), "next() on invalid cursor");
        self.data_iter.as_mut().unwrap().next();
        self.skip_empty_data_blocks_forward();
    }

    fn prev(&mut self) {
        assert!(self.valid(), "prev() on invalid cursor");
        self.data_iter.as_mut().unwrap().prev();
        self.skip_empty_data_blocks_backward();
    }

    fn key(&self) -> &[u8] {
        assert!(self.valid(), "key() on invalid cursor");
        self.data_iter().key()
    }

    fn value(&self) -> &[u8] {
        assert!(self.valid(), "value() on invalid cursor");
        self.data_iter().value()
    }

    fn status(&self) -> Result<()> {
        self.index_iter.status()?;
        if let Some(iter) = &self.data_iter {
            iter.status()?;
        }
        self.status.clone()
    }
}
