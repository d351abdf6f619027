//! Block-chunked decompression.
//!
//! A compressed ORC stream is a sequence of blocks, each prefixed by a 3 byte header
//! holding its length and whether it was stored uncompressed ("original"). The
//! [`Decompressor`] walks those blocks one at a time; [`decompress_into`] stitches
//! them into one contiguous buffer so that decoders never see block boundaries.
use std::io::Read;

use fallible_streaming_iterator::FallibleStreamingIterator;

use crate::proto::CompressionKind;

use super::super::error::{Error, Result};

/// Size of the header preceding each compressed block.
pub const BLOCK_HEADER_SIZE: usize = 3;

fn decode_header(bytes: &[u8]) -> Result<(bool, usize)> {
    let a: [u8; 3] = bytes
        .get(..BLOCK_HEADER_SIZE)
        .and_then(|x| x.try_into().ok())
        .ok_or_else(|| Error::oos("compressed block header is truncated"))?;
    let a = [0, a[0], a[1], a[2]];
    let length = u32::from_le_bytes(a);
    let is_original = a[1] & 1 == 1;
    let length = (length >> (8 + 1)) as usize;

    Ok((is_original, length))
}

fn too_large(actual: usize, capacity: usize) -> Result<()> {
    if actual > capacity {
        Err(Error::BlockTooLarge {
            actual: Some(actual),
            capacity,
        })
    } else {
        Ok(())
    }
}

/// Decompresses one block of `compression` into `scratch`, which must be empty.
fn decompress_block(
    compression: CompressionKind,
    compressed: &[u8],
    capacity: usize,
    scratch: &mut Vec<u8>,
) -> Result<()> {
    match compression {
        CompressionKind::None => scratch.extend_from_slice(compressed),
        CompressionKind::Zlib => {
            let mut gz = flate2::read::DeflateDecoder::new(compressed);
            gz.read_to_end(scratch)
                .map_err(|e| Error::Decompression(e.to_string()))?;
        }
        CompressionKind::Snappy => {
            let length = snap::raw::decompress_len(compressed)
                .map_err(|e| Error::Decompression(e.to_string()))?;
            too_large(length, capacity)?;
            scratch.resize(length, 0);
            snap::raw::Decoder::new()
                .decompress(compressed, scratch)
                .map_err(|e| Error::Decompression(e.to_string()))?;
        }
        CompressionKind::Lz4 => {
            scratch.resize(capacity, 0);
            match lz4_flex::block::decompress_into(compressed, scratch) {
                Ok(length) => scratch.truncate(length),
                // raw lz4 blocks do not record their decompressed length
                Err(lz4_flex::block::DecompressError::OutputTooSmall { .. }) => {
                    return Err(Error::BlockTooLarge {
                        actual: None,
                        capacity,
                    })
                }
                Err(e) => return Err(Error::Decompression(e.to_string())),
            }
        }
        CompressionKind::Zstd => {
            let mut decoder =
                zstd::Decoder::new(compressed).map_err(|e| Error::Decompression(e.to_string()))?;
            decoder
                .read_to_end(scratch)
                .map_err(|e| Error::Decompression(e.to_string()))?;
        }
        other => return Err(Error::UnsupportedCompression(other)),
    };
    too_large(scratch.len(), capacity)
}

enum State<'a> {
    Original(&'a [u8]),
    Compressed(Vec<u8>),
}

/// A [`FallibleStreamingIterator`] over the decompressed blocks of a stream.
pub struct Decompressor<'a> {
    stream: &'a [u8],
    current: Option<State<'a>>, // when we have compression but the value is original
    compression: CompressionKind,
    capacity: usize,
    scratch: Vec<u8>,
}

impl<'a> Decompressor<'a> {
    /// Creates a new [`Decompressor`] over `stream`. Blocks larger than `capacity` once
    /// decompressed are rejected with [`Error::BlockTooLarge`].
    pub fn new(
        stream: &'a [u8],
        compression: CompressionKind,
        capacity: usize,
        scratch: Vec<u8>,
    ) -> Self {
        Self {
            stream,
            current: None,
            compression,
            capacity,
            scratch,
        }
    }

    /// Returns the internal memory region so that it can be re-used.
    pub fn into_inner(self) -> Vec<u8> {
        match self.current {
            Some(State::Compressed(buffer)) => buffer,
            _ => self.scratch,
        }
    }
}

impl<'a> FallibleStreamingIterator for Decompressor<'a> {
    type Item = [u8];

    type Error = Error;

    #[inline]
    fn advance(&mut self) -> Result<()> {
        if let Some(State::Compressed(buffer)) = self.current.take() {
            self.scratch = buffer;
        }
        if self.stream.is_empty() {
            return Ok(());
        }
        match self.compression {
            CompressionKind::None => {
                self.current = Some(State::Original(self.stream));
                self.stream = &[];
            }
            compression => {
                let (is_original, length) = decode_header(self.stream)?;
                let end = BLOCK_HEADER_SIZE + length;
                let block = self.stream.get(BLOCK_HEADER_SIZE..end).ok_or_else(|| {
                    Error::oos(format!(
                        "compressed block of {length} bytes exceeds the {} remaining bytes",
                        self.stream.len() - BLOCK_HEADER_SIZE
                    ))
                })?;
                self.stream = &self.stream[end..];
                if is_original {
                    too_large(block.len(), self.capacity)?;
                    self.current = Some(State::Original(block));
                } else {
                    self.scratch.clear();
                    decompress_block(compression, block, self.capacity, &mut self.scratch)?;
                    self.current = Some(State::Compressed(std::mem::take(&mut self.scratch)));
                }
            }
        };
        Ok(())
    }

    #[inline]
    fn get(&self) -> Option<&Self::Item> {
        self.current.as_ref().map(|x| match x {
            State::Original(x) => *x,
            State::Compressed(x) => x.as_ref(),
        })
    }
}

/// Decompresses every block of `stream` and writes their concatenation to `out`,
/// replacing its previous content. `scratch` is used (and grown) for individual blocks.
pub fn decompress_into(
    stream: &[u8],
    compression: CompressionKind,
    capacity: usize,
    scratch: &mut Vec<u8>,
    out: &mut Vec<u8>,
) -> Result<()> {
    out.clear();
    if compression == CompressionKind::None {
        out.extend_from_slice(stream);
        return Ok(());
    }
    let mut decompressor =
        Decompressor::new(stream, compression, capacity, std::mem::take(scratch));
    while let Some(block) = decompressor.next()? {
        out.extend_from_slice(block);
    }
    *scratch = decompressor.into_inner();
    Ok(())
}

/// Decompresses a whole `stream` (e.g. a footer) into a new buffer.
pub fn maybe_decompress(
    stream: &[u8],
    compression: CompressionKind,
    capacity: usize,
) -> Result<Vec<u8>> {
    let mut out = vec![];
    decompress_into(stream, compression, capacity, &mut vec![], &mut out)?;
    Ok(out)
}
