use crate::error::{Error, Result};

use super::read_u8;

#[inline]
pub fn zigzag(z: u64) -> i64 {
    if z & 0x1 == 0 {
        (z >> 1) as i64
    } else {
        !(z >> 1) as i64
    }
}

#[inline]
fn zigzag_i128(z: u128) -> i128 {
    if z & 0x1 == 0 {
        (z >> 1) as i128
    } else {
        !(z >> 1) as i128
    }
}

/// Reads a base 128 varint of at most 64 bits.
pub fn unsigned_varint(stream: &mut &[u8]) -> Result<u64> {
    let mut i = 0u64;
    let mut j = 0;
    loop {
        if j > 9 {
            // if j * 7 > 64
            return Err(Error::oos("varint is longer than 64 bits"));
        }
        let byte = read_u8(stream)?;
        i |= (u64::from(byte & 0x7F)) << (j * 7);
        if (byte >> 7) == 0 {
            break;
        } else {
            j += 1;
        }
    }
    Ok(i)
}

pub fn signed_varint(stream: &mut &[u8]) -> Result<i64> {
    unsigned_varint(stream).map(zigzag)
}

/// Largest unscaled decimal magnitude ORC allows (38 digits).
const MAX_UNSCALED: i128 = 10i128.pow(38) - 1;

/// Decoder of zigzag varints of arbitrary length, as used by the unscaled values of
/// decimal columns. Values that do not fit 38 decimal digits are rejected with
/// [`Error::DecimalOverflow`].
#[derive(Debug, Clone)]
pub struct VarintDecoder<'a> {
    stream: &'a [u8],
}

impl<'a> VarintDecoder<'a> {
    pub fn new(stream: &'a [u8]) -> Self {
        Self { stream }
    }

    /// The next value, or `None` when the stream is exhausted.
    pub fn next_i128(&mut self) -> Result<Option<i128>> {
        if self.stream.is_empty() {
            return Ok(None);
        }
        let mut value = 0u128;
        let mut shift = 0u32;
        loop {
            let byte = read_u8(&mut self.stream)?;
            let group = u128::from(byte & 0x7F);
            if group != 0 {
                if shift >= 128 || (group << shift) >> shift != group {
                    return Err(Error::DecimalOverflow);
                }
                value |= group << shift;
            }
            if byte & 0x80 == 0 {
                break;
            }
            shift += 7;
        }
        let value = zigzag_i128(value);
        if !(-MAX_UNSCALED..=MAX_UNSCALED).contains(&value) {
            return Err(Error::DecimalOverflow);
        }
        Ok(Some(value))
    }

    /// Fills `out` and returns the number of values read, which is smaller than
    /// `out.len()` only when the stream is exhausted.
    pub fn read(&mut self, out: &mut [i128]) -> Result<usize> {
        for (read, slot) in out.iter_mut().enumerate() {
            match self.next_i128()? {
                Some(value) => *slot = value,
                None => return Ok(read),
            }
        }
        Ok(out.len())
    }
}
