//! APIs to read ORC files.
//!
//! Reading starts at the [`FileTail`] (postscript, footer and metadata), located from
//! the end of the file. Everything else is fetched on demand by a [`Reader`]: stripe
//! footers, row indexes and the byte ranges of the streams of one row group.
use log::debug;
use prost::Message;

use crate::error::{Error, Result};
use crate::proto::{
    CompressionKind, ColumnStatistics, Footer, Metadata, PostScript, StripeInformation, Type,
};

pub mod column;
pub mod decode;
pub mod decompress;
pub mod filter;
mod options;
mod provider;
mod reader;
pub mod row_index;
pub mod stripe;

pub use column::{
    BinaryColumnBuffer, BooleanColumnBuffer, ByteColumnBuffer, ColumnBuffer, ColumnDecoder,
    DateColumnBuffer, Decimal, DecimalColumnBuffer, DoubleColumnBuffer, DoubleNanColumnBuffer,
    FloatColumnBuffer, IntegerColumnBuffer, OrcColumn, StringColumnBuffer, TimestampColumnBuffer,
};
pub use filter::{FilterKind, FilterValues};
pub use options::{ReaderOptions, DEFAULT_COMPRESSION_BLOCK_SIZE, DEFAULT_TAIL_WINDOW};
pub use provider::{ByteRangeProvider, FileProvider, MemoryProvider, MmapProvider};
pub use reader::{ColumnLoad, Reader};
pub use stripe::{StreamDetail, StripeStreams};

/// The magic string of the postscript.
pub const MAGIC: &str = "ORC";

/// The row group stride when the footer does not declare one.
pub const DEFAULT_ROW_INDEX_STRIDE: usize = 10_000;

/// The metadata at the end of an ORC file.
#[derive(Debug, Clone, PartialEq)]
pub struct FileTail {
    pub postscript: PostScript,
    pub footer: Footer,
    pub metadata: Metadata,
    /// Length of the whole file.
    pub file_length: u64,
}

impl FileTail {
    pub fn compression(&self) -> CompressionKind {
        self.postscript.compression()
    }

    pub fn compression_block_size(&self) -> usize {
        self.postscript
            .compression_block_size
            .map(|x| x as usize)
            .unwrap_or(DEFAULT_COMPRESSION_BLOCK_SIZE)
    }

    pub fn stripes(&self) -> &[StripeInformation] {
        &self.footer.stripes
    }

    pub fn types(&self) -> &[Type] {
        &self.footer.types
    }

    pub fn number_of_rows(&self) -> u64 {
        self.footer.number_of_rows()
    }

    pub fn row_index_stride(&self) -> usize {
        match self.footer.row_index_stride {
            Some(stride) if stride > 0 => stride as usize,
            _ => DEFAULT_ROW_INDEX_STRIDE,
        }
    }

    /// File level statistics of `column`.
    pub fn column_statistics(&self, column: u32) -> Option<&ColumnStatistics> {
        self.footer.statistics.get(column as usize)
    }

    /// Statistics of `column` in `stripe`.
    pub fn stripe_statistics(&self, stripe: usize, column: u32) -> Option<&ColumnStatistics> {
        self.metadata
            .stripe_stats
            .get(stripe)
            .and_then(|x| x.col_stats.get(column as usize))
    }
}

enum Tail {
    Parsed(FileTail),
    /// The tail needs this many bytes from the end of the file.
    Incomplete(u64),
}

/// Parses the tail from the last `bytes.len()` bytes of a file of `file_length` bytes.
fn parse_tail(bytes: &[u8], file_length: u64, block_capacity: Option<usize>) -> Result<Tail> {
    let (postscript_length, rest) = match bytes.split_last() {
        Some((length, rest)) => (*length as usize, rest),
        None => return Err(Error::CorruptFile("the file is empty".to_string())),
    };
    let postscript_end = 1 + postscript_length as u64;
    if postscript_end > file_length {
        return Err(Error::CorruptFile(format!(
            "a postscript of {postscript_length} bytes does not fit a file of {file_length} bytes"
        )));
    }
    if postscript_length > rest.len() {
        return Ok(Tail::Incomplete(postscript_end));
    }
    let (rest, postscript) = rest.split_at(rest.len() - postscript_length);
    let postscript = PostScript::decode(postscript)
        .map_err(|_| Error::CorruptFile("the postscript cannot be decoded".to_string()))?;
    if postscript.magic.as_deref() != Some(MAGIC) {
        return Err(Error::CorruptFile(format!(
            "the postscript magic is {:?}",
            postscript.magic
        )));
    }

    let footer_length = postscript.footer_length();
    let metadata_length = postscript.metadata_length();
    let total = postscript_end + footer_length + metadata_length;
    if total > file_length {
        return Err(Error::CorruptFile(format!(
            "a tail of {total} bytes does not fit a file of {file_length} bytes"
        )));
    }
    if total > bytes.len() as u64 {
        return Ok(Tail::Incomplete(total));
    }

    let compression = postscript.compression();
    let capacity = block_capacity.unwrap_or_else(|| {
        postscript
            .compression_block_size
            .map(|x| x as usize)
            .unwrap_or(DEFAULT_COMPRESSION_BLOCK_SIZE)
    });
    let (rest, footer) = rest.split_at(rest.len() - footer_length as usize);
    let metadata = &rest[rest.len() - metadata_length as usize..];

    let footer = Footer::decode(decompress::maybe_decompress(footer, compression, capacity)?.as_slice())?;
    let metadata =
        Metadata::decode(decompress::maybe_decompress(metadata, compression, capacity)?.as_slice())?;

    Ok(Tail::Parsed(FileTail {
        postscript,
        footer,
        metadata,
        file_length,
    }))
}

fn tail_window(file_length: u64, options: &ReaderOptions) -> Result<u64> {
    if file_length == 0 {
        return Err(Error::CorruptFile("the file is empty".to_string()));
    }
    Ok(options.tail_window.clamp(1, file_length))
}

/// Reads the [`FileTail`] of the file behind `provider`.
///
/// The last [`ReaderOptions::tail_window`] bytes are read first. When the tail is
/// larger, exactly the bytes it needs are read again.
pub fn read_tail<P: ByteRangeProvider + ?Sized>(
    provider: &P,
    options: &ReaderOptions,
) -> Result<FileTail> {
    let file_length = provider.len()?;
    let mut window = tail_window(file_length, options)?;
    loop {
        let mut bytes = vec![0; window as usize];
        provider.get_range_from_end(&mut bytes, window)?;
        match parse_tail(&bytes, file_length, options.block_capacity)? {
            Tail::Parsed(tail) => return Ok(tail),
            Tail::Incomplete(needed) => window = grow(window, needed)?,
        }
    }
}

/// Async version of [`read_tail`].
pub async fn read_tail_async<P: ByteRangeProvider + ?Sized>(
    provider: &P,
    options: &ReaderOptions,
) -> Result<FileTail> {
    let file_length = provider.len()?;
    let mut window = tail_window(file_length, options)?;
    loop {
        let mut bytes = vec![0; window as usize];
        provider.get_range_from_end_async(&mut bytes, window).await?;
        match parse_tail(&bytes, file_length, options.block_capacity)? {
            Tail::Parsed(tail) => return Ok(tail),
            Tail::Incomplete(needed) => window = grow(window, needed)?,
        }
    }
}

fn grow(window: u64, needed: u64) -> Result<u64> {
    if needed <= window {
        return Err(Error::CorruptFile(format!(
            "the tail needs {needed} bytes but {window} bytes were not enough"
        )));
    }
    debug!("growing the tail window from {window} to {needed} bytes");
    Ok(needed)
}
