//! Immutable sorted string table files.
//!
//! A table is built once from a strictly increasing key/value stream and then
//! read forever: prefix-compressed data blocks, an optional bloom-style
//! filter block, a metaindex naming that filter, an index block of shortened
//! separator keys, and a fixed 48-byte footer. Every block carries a one-byte
//! compression tag and a masked CRC32C trailer.
//!
//! [`TableBuilder`] writes a file through a [`env::WritableFile`];
//! [`Table`] answers point lookups and hands out bidirectional cursors, with
//! decoded blocks optionally shared through a [`cache::ShardedCache`].
//! Cursors over several tables compose with
//! [`iterators::merge_iterator::new_merge_iterator`].

pub mod arena;
pub mod block;
pub mod cache;
pub mod coding;
pub mod comparator;
pub mod env;
pub mod error;
pub mod filter;
pub mod iterators;
pub mod options;
pub mod table;

pub use error::{Error, Result};
pub use options::{CompressionType, Options, ReadOptions};
pub use table::{Table, TableBuilder};
