//! Narrow file abstractions the table code writes through and reads from.
//! Callers may substitute their own implementations (in-memory files, fault
//! injection); the std-backed ones below are the defaults.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::Result;

/// Append-only destination for a table under construction.
pub trait WritableFile {
    fn append(&mut self, data: &[u8]) -> Result<()>;
    fn flush(&mut self) -> Result<()>;
    fn sync(&mut self) -> Result<()>;
    fn close(&mut self) -> Result<()>;
}

/// Positioned reads over a finished table.
pub trait RandomAccessFile: Send + Sync {
    /// Reads exactly `n` bytes starting at `offset`.
    fn read(&self, offset: u64, n: usize) -> Result<Vec<u8>>;
}

pub struct FsWritableFile {
    inner: BufWriter<File>,
}

impl FsWritableFile {
    pub fn create(path: impl AsRef<Path>) -> Result<FsWritableFile> {
        Ok(FsWritableFile {
            inner: BufWriter::new(File::create(path)?),
        })
    }
}

impl WritableFile for FsWritableFile {
    fn append(&mut self, data: &[u8]) -> Result<()> {
        self.inner.write_all(data)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        self.inner.flush()?;
        self.inner.get_ref().sync_all()?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }
}

pub struct FsRandomAccessFile {
    file: File,
}

impl FsRandomAccessFile {
    /// Opens the file read-only and returns it along with its size.
    pub fn open(path: impl AsRef<Path>) -> Result<(FsRandomAccessFile, u64)> {
        let file = File::options().read(true).write(false).open(path)?;
        let size = file.metadata()?.len();
        Ok((FsRandomAccessFile { file }, size))
    }
}

impl RandomAccessFile for FsRandomAccessFile {
    fn read(&self, offset: u64, n: usize) -> Result<Vec<u8>> {
        use std::os::unix::fs::FileExt;
        let mut data = vec![0; n];
        self.file.read_exact_at(&mut data, offset)?;
        Ok(data)
    }
}
