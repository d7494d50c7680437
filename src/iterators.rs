pub mod merge_iterator;
pub mod two_level_iterator;

use crate::error::Result;

/// A positioned cursor over an ordered sequence of key/value records.
///
/// A cursor starts unpositioned; one of the seek operations must run before
/// `key`/`value`/`next`/`prev` may be called. Movement operations do not
/// return errors directly: a failure (I/O, corruption) latches into
/// `status()` and the cursor turns invalid. Calling `key`/`value`/`next`/
/// `prev` on an invalid cursor is a programmer error and panics.
///
/// Keys and values are borrowed from cursor-owned storage and are
/// invalidated by the next movement.
pub trait StorageIterator {
    fn valid(&self) -> bool;

    fn seek_to_first(&mut self);

    fn seek_to_last(&mut self);

    /// Positions at the first record whose key is `>= target`.
    fn seek(&mut self, target: &[u8]);

    fn next(&mut self);

    fn prev(&mut self);

    fn key(&self) -> &[u8];

    fn value(&self) -> &[u8];

    /// First error this cursor (or a source it consumed) ran into, if any.
    fn status(&self) -> Result<()>;
}

/// A cursor over nothing, optionally carrying an error.
pub struct EmptyIterator {
    status: Result<()>,
}

impl EmptyIterator {
    pub fn new() -> EmptyIterator {
        EmptyIterator { status: Ok(()) }
    }

    pub fn with_status(status: Result<()>) -> EmptyIterator {
        EmptyIterator { status }
    }
}

impl Default for EmptyIterator {
    fn default() -> EmptyIterator {
        EmptyIterator::new()
    }
}

impl StorageIterator for EmptyIterator {
    fn valid(&self) -> bool {
        false
    }

    fn seek_to_first(&mut self) {}

    fn seek_to_last(&mut self) {}

    fn seek(&mut self, _target: &[u8]) {}

    fn next(&mut self) {
        panic!("next() on invalid cursor");
    }

    fn prev(&mut self) {
        panic!("prev() on invalid cursor");
    }

    fn key(&self) -> &[u8] {
        panic!("key() on invalid cursor");
    }

    fn value(&self) -> &[u8] {
        panic!("value() on invalid cursor");
    }

    fn status(&self) -> Result<()> {
        self.status.clone()
    }
}
