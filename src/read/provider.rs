//! Sources of byte ranges.
//!
//! The reader never reads a file sequentially: it asks a [`ByteRangeProvider`] for
//! the tail of the file and then for the exact ranges a row group needs. Calls may
//! arrive concurrently and in any order, since several columns are loaded at once.
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{Error, Result};

/// A random-access source of bytes.
///
/// Every method must either fill `buffer` completely or fail; a short read is
/// reported as [`Error::BufferNotFilled`] and never returned as partial data.
#[async_trait]
pub trait ByteRangeProvider: Send + Sync {
    /// The total length of the resource in bytes.
    fn len(&self) -> Result<u64>;

    /// Fills `buffer` with the bytes starting at `offset`.
    fn get_range(&self, buffer: &mut [u8], offset: u64) -> Result<()>;

    /// Fills `buffer` with the bytes starting `length_from_end` bytes before the end.
    fn get_range_from_end(&self, buffer: &mut [u8], length_from_end: u64) -> Result<()> {
        let offset = offset_from_end(self.len()?, buffer.len(), length_from_end)?;
        self.get_range(buffer, offset)
    }

    async fn get_range_async(&self, buffer: &mut [u8], offset: u64) -> Result<()> {
        self.get_range(buffer, offset)
    }

    async fn get_range_from_end_async(
        &self,
        buffer: &mut [u8],
        length_from_end: u64,
    ) -> Result<()> {
        self.get_range_from_end(buffer, length_from_end)
    }
}

fn offset_from_end(len: u64, requested: usize, length_from_end: u64) -> Result<u64> {
    len.checked_sub(length_from_end)
        .ok_or(Error::BufferNotFilled {
            expected: requested,
            actual: len as usize,
        })
}

/// Copies `buffer.len()` bytes of `data` starting at `offset` into `buffer`.
fn copy_range(data: &[u8], buffer: &mut [u8], offset: u64) -> Result<()> {
    let start = (offset as usize).min(data.len());
    let available = data.len() - start;
    if available < buffer.len() {
        return Err(Error::BufferNotFilled {
            expected: buffer.len(),
            actual: available,
        });
    }
    buffer.copy_from_slice(&data[start..start + buffer.len()]);
    Ok(())
}

/// Bytes held in memory.
#[derive(Debug, Clone)]
pub struct MemoryProvider {
    data: Vec<u8>,
}

impl MemoryProvider {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}

impl ByteRangeProvider for MemoryProvider {
    fn len(&self) -> Result<u64> {
        Ok(self.data.len() as u64)
    }

    fn get_range(&self, buffer: &mut [u8], offset: u64) -> Result<()> {
        copy_range(&self.data, buffer, offset)
    }
}

// see (unstable) Seek::stream_len
fn stream_len(seek: &mut impl Seek) -> std::result::Result<u64, std::io::Error> {
    let old_pos = seek.stream_position()?;
    let len = seek.seek(SeekFrom::End(0))?;

    // Avoid seeking a third time when we were already at the end of the
    // stream. The branch is usually way cheaper than a seek operation.
    if old_pos != len {
        seek.seek(SeekFrom::Start(old_pos))?;
    }

    Ok(len)
}

/// A local file. Reads are serialized through a mutex around the file handle.
#[derive(Debug)]
pub struct FileProvider {
    file: Mutex<File>,
    len: u64,
}

impl FileProvider {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::new(File::open(path)?)
    }

    pub fn new(mut file: File) -> Result<Self> {
        let len = stream_len(&mut file)?;
        Ok(Self {
            file: Mutex::new(file),
            len,
        })
    }
}

impl ByteRangeProvider for FileProvider {
    fn len(&self) -> Result<u64> {
        Ok(self.len)
    }

    fn get_range(&self, buffer: &mut [u8], offset: u64) -> Result<()> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        let mut filled = 0;
        while filled < buffer.len() {
            match file.read(&mut buffer[filled..]) {
                Ok(0) => break,
                Ok(read) => filled += read,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        if filled < buffer.len() {
            return Err(Error::BufferNotFilled {
                expected: buffer.len(),
                actual: filled,
            });
        }
        Ok(())
    }
}

/// A memory-mapped local file.
#[derive(Debug)]
pub struct MmapProvider {
    mmap: memmap2::Mmap,
}

impl MmapProvider {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::new(&File::open(path)?)
    }

    /// Maps `file` into memory. The file must not be truncated while mapped.
    #[allow(unsafe_code)]
    pub fn new(file: &File) -> Result<Self> {
        // SAFETY: the mapping is read-only and the caller guarantees the file is not
        // truncated while the provider is alive.
        let mmap = unsafe { memmap2::Mmap::map(file)? };
        Ok(Self { mmap })
    }
}

impl ByteRangeProvider for MmapProvider {
    fn len(&self) -> Result<u64> {
        Ok(self.mmap.len() as u64)
    }

    fn get_range(&self, buffer: &mut [u8], offset: u64) -> Result<()> {
        copy_range(&self.mmap, buffer, offset)
    }
}
