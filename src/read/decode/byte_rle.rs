use crate::error::{Error, Result};

use super::{read_u8, take};

/// The state of the run being consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Run {
    /// `remaining` copies of `value`.
    Repeat { value: u8, remaining: usize },
    /// `remaining` literal bytes still in the stream.
    Literals { remaining: usize },
}

/// Decoder of ORC's byte run-length encoding.
///
/// A header `h` (read as `i8`) is followed either by a single byte repeated `h + 3`
/// times (`h >= 0`) or by `-h` literal bytes (`h < 0`).
#[derive(Debug, Clone)]
pub struct ByteRleDecoder<'a> {
    stream: &'a [u8],
    run: Option<Run>,
}

impl<'a> ByteRleDecoder<'a> {
    pub fn new(stream: &'a [u8]) -> Self {
        Self { stream, run: None }
    }

    fn next_run(&mut self) -> Result<Option<Run>> {
        if self.stream.is_empty() {
            return Ok(None);
        }
        let header = read_u8(&mut self.stream)? as i8;
        let run = if header < 0 {
            let remaining = -(header as i16) as usize;
            if remaining > self.stream.len() {
                return Err(Error::RleLiteralTooLarge(remaining));
            }
            Run::Literals { remaining }
        } else {
            let value = read_u8(&mut self.stream)?;
            Run::Repeat {
                value,
                remaining: header as usize + 3,
            }
        };
        Ok(Some(run))
    }

    /// Returns the current run, advancing to the next one when it is exhausted.
    fn current(&mut self) -> Result<Option<Run>> {
        match self.run {
            Some(Run::Repeat { remaining, .. }) | Some(Run::Literals { remaining })
                if remaining > 0 =>
            {
                Ok(self.run)
            }
            _ => {
                self.run = self.next_run()?;
                Ok(self.run)
            }
        }
    }

    /// Fills `out` and returns the number of bytes decoded. Fewer than `out.len()` bytes
    /// are decoded only when the stream is exhausted; a partially consumed run is
    /// resumed by the next call.
    pub fn read(&mut self, out: &mut [u8]) -> Result<usize> {
        let mut filled = 0;
        while filled < out.len() {
            let run = match self.current()? {
                Some(run) => run,
                None => break,
            };
            let wanted = out.len() - filled;
            match run {
                Run::Repeat { value, remaining } => {
                    let length = remaining.min(wanted);
                    out[filled..filled + length].fill(value);
                    filled += length;
                    self.run = Some(Run::Repeat {
                        value,
                        remaining: remaining - length,
                    });
                }
                Run::Literals { remaining } => {
                    let length = remaining.min(wanted);
                    let literals = take(&mut self.stream, length)?;
                    out[filled..filled + length].copy_from_slice(literals);
                    filled += length;
                    self.run = Some(Run::Literals {
                        remaining: remaining - length,
                    });
                }
            }
        }
        Ok(filled)
    }

    /// Discards the next `count` bytes.
    pub fn skip(&mut self, mut count: usize) -> Result<()> {
        while count > 0 {
            let run = self.current()?.ok_or_else(|| {
                Error::oos(format!("cannot skip {count} more bytes of an exhausted stream"))
            })?;
            match run {
                Run::Repeat { value, remaining } => {
                    let length = remaining.min(count);
                    count -= length;
                    self.run = Some(Run::Repeat {
                        value,
                        remaining: remaining - length,
                    });
                }
                Run::Literals { remaining } => {
                    let length = remaining.min(count);
                    take(&mut self.stream, length)?;
                    count -= length;
                    self.run = Some(Run::Literals {
                        remaining: remaining - length,
                    });
                }
            }
        }
        Ok(())
    }

    /// Returns the next byte, or `None` when the stream is exhausted.
    pub fn next_byte(&mut self) -> Result<Option<u8>> {
        let mut byte = [0u8];
        Ok((self.read(&mut byte)? == 1).then_some(byte[0]))
    }
}
