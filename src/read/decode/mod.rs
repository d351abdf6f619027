//! Decoders of the primitive ORC stream encodings.
//!
//! Every decoder reads from a borrowed slice and is resumable: `read` fills at most
//! the given output and leaves the rest of the stream for the next call.
mod boolean_rle;
mod byte_rle;
mod rle_v2;
mod variable_length;

pub use boolean_rle::BooleanDecoder;
pub use byte_rle::ByteRleDecoder;
pub use rle_v2::RleV2Decoder;
pub use variable_length::{signed_varint, unsigned_varint, zigzag, VarintDecoder};

use crate::error::{Error, Result};

pub fn deserialize_f32(stream: &[u8]) -> impl Iterator<Item = f32> + '_ {
    stream
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
}

pub fn deserialize_f64(stream: &[u8]) -> impl Iterator<Item = f64> + '_ {
    stream.chunks_exact(8).map(|chunk| {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(chunk);
        f64::from_le_bytes(bytes)
    })
}

/// Returns the first `length` bytes of `stream` and advances it.
#[inline]
pub(crate) fn take<'a>(stream: &mut &'a [u8], length: usize) -> Result<&'a [u8]> {
    if stream.len() < length {
        return Err(Error::oos(format!(
            "expected {length} more bytes but the stream has {}",
            stream.len()
        )));
    }
    let (head, tail) = stream.split_at(length);
    *stream = tail;
    Ok(head)
}

#[inline]
pub(crate) fn read_u8(stream: &mut &[u8]) -> Result<u8> {
    take(stream, 1).map(|x| x[0])
}
