//! On-disk framing shared by the builder and the reader: block handles, the
//! fixed footer, and verified block reads.

use bytes::Bytes;

use crate::coding::{
    crc32c, decode_fixed32, decode_fixed64, get_varint64, put_varint64, unmask_crc,
};
use crate::env::RandomAccessFile;
use crate::error::{Error, Result};
use crate::options::CompressionType;

/// 1-byte compression type + 4-byte masked CRC32C after every block payload.
pub const BLOCK_TRAILER_SIZE: usize = 5;

/// Encoded footer length: two block handles zero-padded to 40 bytes, then the
/// 8-byte magic number.
pub const FOOTER_ENCODED_LENGTH: usize = 48;

pub const TABLE_MAGIC_NUMBER: u64 = 0xdb47_7524_8b80_fb57;

const FOOTER_HANDLES_LENGTH: usize = 40;

/// Location of a block within a file, serialized as two varints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockHandle {
    pub offset: u64,
    pub size: u64,
}

impl BlockHandle {
    pub fn new(offset: u64, size: u64) -> BlockHandle {
        BlockHandle { offset, size }
    }

    pub fn encode_to(&self, dst: &mut Vec<u8>) {
        put_varint64(dst, self.offset);
        put_varint64(dst, self.size);
    }

    /// Decodes a handle, returning it and the number of bytes consumed.
    pub fn decode_from(input: &[u8]) -> Result<(BlockHandle, usize)> {
        let (offset, n1) =
            get_varint64(input).ok_or_else(|| Error::corruption("bad block handle"))?;
        let (size, n2) =
            get_varint64(&input[n1..]).ok_or_else(|| Error::corruption("bad block handle"))?;
        Ok((BlockHandle { offset, size }, n1 + n2))
    }
}

/// The fixed-size tail of every table file, locating the metaindex and index
/// blocks.
#[derive(Debug, Clone, Copy)]
pub struct Footer {
    pub metaindex_handle: BlockHandle,
    pub index_handle: BlockHandle,
}

impl Footer {
    pub fn encode_to(&self, dst: &mut Vec<u8>) {
        let original = dst.len();
        self.metaindex_handle.encode_to(dst);
        self.index_handle.encode_to(dst);
        dst.resize(original + FOOTER_HANDLES_LENGTH, 0);
        dst.extend_from_slice(&TABLE_MAGIC_NUMBER.to_le_bytes());
        debug_assert_eq!(dst.len(), original + FOOTER_ENCODED_LENGTH);
    }

    pub fn decode_from(input: &[u8]) -> Result<Footer> {
        if input.len() < FOOTER_ENCODED_LENGTH {
            return Err(Error::corruption("footer too short"));
        }
        let magic = decode_fixed64(&input[FOOTER_HANDLES_LENGTH..]);
        if magic != TABLE_MAGIC_NUMBER {
            return Err(Error::corruption("not an sstable (bad magic number)"));
        }
        let (metaindex_handle, n) = BlockHandle::decode_from(&input[..FOOTER_HANDLES_LENGTH])?;
        let (index_handle, _) = BlockHandle::decode_from(&input[n..FOOTER_HANDLES_LENGTH])?;
        Ok(Footer {
            metaindex_handle,
            index_handle,
        })
    }
}

/// Reads the block `handle` points at, checks its trailer and undoes
/// compression. Returns the decoded payload.
pub fn read_block(
    file: &dyn RandomAccessFile,
    handle: &BlockHandle,
    verify_checksums: bool,
) -> Result<Bytes> {
    let n = handle.size as usize;
    let mut data = match file.read(handle.offset, n + BLOCK_TRAILER_SIZE) {
        Ok(data) => data,
        Err(Error::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(Error::corruption("truncated block read"));
        }
        Err(e) => return Err(e),
    };
    if data.len() < n + BLOCK_TRAILER_SIZE {
        return Err(Error::corruption("truncated block read"));
    }

    let type_byte = data[n];
    if verify_checksums {
        let expected = unmask_crc(decode_fixed32(&data[n + 1..]));
        // The stored CRC covers the payload and the type byte.
        let actual = crc32c(&data[..n + 1]);
        if actual != expected {
            return Err(Error::corruption("block checksum mismatch"));
        }
    }

    match CompressionType::from_u8(type_byte) {
        Some(CompressionType::None) => {
            data.truncate(n);
            Ok(Bytes::from(data))
        }
        Some(CompressionType::Snappy) => {
            let decoded = snap::raw::Decoder::new()
                .decompress_vec(&data[..n])
                .map_err(|e| Error::corruption(format!("snappy decompression failed: {e}")))?;
            Ok(Bytes::from(decoded))
        }
        None => Err(Error::corruption(format!(
            "unknown block compression type: {type_byte}"
        ))),
    }
}
