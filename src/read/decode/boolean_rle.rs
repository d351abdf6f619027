use crate::error::{Error, Result};

use super::ByteRleDecoder;

/// Decoder of bit-packed booleans stored in a byte run-length encoded stream.
/// Bits are unpacked most significant first.
#[derive(Debug, Clone)]
pub struct BooleanDecoder<'a> {
    bytes: ByteRleDecoder<'a>,
    current: u8,
    bits_left: u8,
}

impl<'a> BooleanDecoder<'a> {
    pub fn new(stream: &'a [u8]) -> Self {
        Self {
            bytes: ByteRleDecoder::new(stream),
            current: 0,
            bits_left: 0,
        }
    }

    /// Positions the decoder at a row group: skips `bytes` whole bytes of the
    /// run-length decoded stream and then `bits` bits of the following byte.
    pub fn seek(&mut self, bytes: usize, bits: u8) -> Result<()> {
        if bits > 8 {
            return Err(Error::oos(format!("cannot skip {bits} bits of a byte")));
        }
        self.bytes.skip(bytes)?;
        self.bits_left = 0;
        if bits > 0 {
            self.current = self
                .bytes
                .next_byte()?
                .ok_or_else(|| Error::oos("boolean stream ended while seeking"))?;
            self.bits_left = 8 - bits;
        }
        Ok(())
    }

    /// Fills `out` and returns the number of values decoded, which is smaller than
    /// `out.len()` only when the stream is exhausted.
    pub fn read(&mut self, out: &mut [bool]) -> Result<usize> {
        for (read, slot) in out.iter_mut().enumerate() {
            if self.bits_left == 0 {
                match self.bytes.next_byte()? {
                    Some(byte) => {
                        self.current = byte;
                        self.bits_left = 8;
                    }
                    None => return Ok(read),
                }
            }
            self.bits_left -= 1;
            *slot = (self.current >> self.bits_left) & 1 == 1;
        }
        Ok(out.len())
    }
}

impl<'a> Iterator for BooleanDecoder<'a> {
    type Item = Result<bool>;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        let mut value = [false];
        match self.read(&mut value) {
            Ok(1) => Some(Ok(value[0])),
            Ok(_) => None,
            Err(e) => Some(Err(e)),
        }
    }
}
