use crate::error::{Error, Result};

use super::{read_u8, take, unsigned_varint, zigzag};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum EncodingTypeV2 {
    ShortRepeat,
    Direct,
    PatchedBase,
    Delta,
}

fn header_to_encoding(header: u8) -> EncodingTypeV2 {
    match (header & 128 == 128, header & 64 == 64) {
        // 11... = 3
        (true, true) => EncodingTypeV2::Delta,
        // 10... = 2
        (true, false) => EncodingTypeV2::PatchedBase,
        // 01... = 1
        (false, true) => EncodingTypeV2::Direct,
        // 00... = 0
        (false, false) => EncodingTypeV2::ShortRepeat,
    }
}

/// Decodes the 5 bit width code shared by the Direct, Patched Base and Delta headers.
fn decode_bit_width(code: u8) -> u8 {
    match code {
        0..=23 => code + 1,
        24 => 26,
        25 => 28,
        26 => 30,
        27 => 32,
        28 => 40,
        29 => 48,
        30 => 56,
        _ => 64,
    }
}

/// Rounds `width` up to the next width the bit packer supports.
fn closest_fixed_bits(width: u8) -> u8 {
    match width {
        0 => 1,
        1..=24 => width,
        25..=26 => 26,
        27..=28 => 28,
        29..=30 => 30,
        31..=32 => 32,
        33..=40 => 40,
        41..=48 => 48,
        49..=56 => 56,
        _ => 64,
    }
}

fn header_to_rle_v2_short_repeated_width(header: u8) -> u8 {
    (header & 0b00111000) >> 3
}

fn header_to_rle_v2_short_repeated_count(header: u8) -> u8 {
    header & 0b00000111
}

fn header_to_bit_width_code(header: u8) -> u8 {
    (header & 0b00111110) >> 1
}

fn header_to_rle_v2_direct_length(header: u8, header1: u8) -> u16 {
    let bit = header & 0b00000001;
    let r = u16::from_be_bytes([bit, header1]);
    1 + r
}

/// Unpacks `count` big-endian values of `width` bits. The packed values start at a
/// byte boundary and the stream is advanced to the byte following them.
fn unpack(stream: &mut &[u8], width: u8, count: usize, out: &mut Vec<u64>) -> Result<()> {
    let width = width as usize;
    let bytes = take(stream, (width * count + 7) / 8)?;
    let mut bit = 0usize;
    for _ in 0..count {
        let mut value = 0u64;
        let mut remaining = width;
        while remaining > 0 {
            let byte = bytes[bit / 8];
            let available = 8 - bit % 8;
            let length = available.min(remaining);
            let bits = (byte >> (available - length)) & ((1u16 << length) - 1) as u8;
            value = (value << length) | u64::from(bits);
            remaining -= length;
            bit += length;
        }
        out.push(value);
    }
    Ok(())
}

fn read_big_endian(stream: &mut &[u8], width: usize) -> Result<u64> {
    let bytes = take(stream, width)?;
    let mut a = [0u8; 8];
    a[8 - width..].copy_from_slice(bytes);
    Ok(u64::from_be_bytes(a))
}

/// Decoder of the ORC integer run-length encoding, version 2.
///
/// Each run is decoded in full into an internal buffer (at most 512 values) from which
/// [`RleV2Decoder::read`] copies, so a caller can stop anywhere and resume later.
/// Unsigned streams are returned as `i64` with the same bit pattern.
#[derive(Debug, Clone)]
pub struct RleV2Decoder<'a> {
    stream: &'a [u8],
    signed: bool,
    literals: Vec<i64>,
    position: usize,
    scratch: Vec<u64>,
}

impl<'a> RleV2Decoder<'a> {
    pub fn new(stream: &'a [u8], signed: bool) -> Self {
        Self {
            stream,
            signed,
            literals: Vec::with_capacity(512),
            position: 0,
            scratch: vec![],
        }
    }

    pub fn signed(stream: &'a [u8]) -> Self {
        Self::new(stream, true)
    }

    pub fn unsigned(stream: &'a [u8]) -> Self {
        Self::new(stream, false)
    }

    #[inline]
    fn decode(&self, value: u64) -> i64 {
        if self.signed {
            zigzag(value)
        } else {
            value as i64
        }
    }

    /// Decodes the next run into `self.literals`. Returns false at the end of the stream.
    fn next_run(&mut self) -> Result<bool> {
        self.literals.clear();
        self.position = 0;
        if self.stream.is_empty() {
            return Ok(false);
        }
        let header = read_u8(&mut self.stream)?;
        match header_to_encoding(header) {
            EncodingTypeV2::ShortRepeat => self.short_repeat(header)?,
            EncodingTypeV2::Direct => self.direct(header)?,
            EncodingTypeV2::PatchedBase => self.patched_base(header)?,
            EncodingTypeV2::Delta => self.delta(header)?,
        };
        Ok(true)
    }

    fn short_repeat(&mut self, header: u8) -> Result<()> {
        let width = 1 + header_to_rle_v2_short_repeated_width(header) as usize;
        let count = 3 + header_to_rle_v2_short_repeated_count(header) as usize;
        let value = read_big_endian(&mut self.stream, width)?;
        let value = self.decode(value);
        self.literals.extend(std::iter::repeat(value).take(count));
        Ok(())
    }

    fn direct(&mut self, header: u8) -> Result<()> {
        let width = decode_bit_width(header_to_bit_width_code(header));
        let length = header_to_rle_v2_direct_length(header, read_u8(&mut self.stream)?);

        self.scratch.clear();
        unpack(&mut self.stream, width, length as usize, &mut self.scratch)?;
        let signed = self.signed;
        self.literals.extend(
            self.scratch
                .iter()
                .map(|x| if signed { zigzag(*x) } else { *x as i64 }),
        );
        Ok(())
    }

    fn patched_base(&mut self, header: u8) -> Result<()> {
        let width = decode_bit_width(header_to_bit_width_code(header));
        let length = header_to_rle_v2_direct_length(header, read_u8(&mut self.stream)?) as usize;

        let third = read_u8(&mut self.stream)?;
        let base_width = ((third >> 5) & 0b111) as usize + 1;
        let patch_width = decode_bit_width(third & 0b11111);

        let fourth = read_u8(&mut self.stream)?;
        let patch_gap_width = ((fourth >> 5) & 0b111) + 1;
        let patch_list_length = (fourth & 0b11111) as usize;

        // the base is stored in sign-magnitude form
        let base = read_big_endian(&mut self.stream, base_width)?;
        let sign_mask = 1u64 << (base_width * 8 - 1);
        let base = if base & sign_mask != 0 {
            -((base & !sign_mask) as i64)
        } else {
            base as i64
        };

        self.scratch.clear();
        unpack(&mut self.stream, width, length, &mut self.scratch)?;

        if patch_width as usize + patch_gap_width as usize > 64 {
            return Err(Error::oos(
                "patch width and patch gap width of a patched base run exceed 64 bits",
            ));
        }
        let mut patches = Vec::with_capacity(patch_list_length);
        unpack(
            &mut self.stream,
            closest_fixed_bits(patch_width + patch_gap_width),
            patch_list_length,
            &mut patches,
        )?;

        let patch_mask = if patch_width == 64 {
            u64::MAX
        } else {
            (1u64 << patch_width) - 1
        };
        // a gap of 255 with an empty patch only extends the gap of the next entry
        let mut gap = 0usize;
        let mut index = 0usize;
        for entry in patches {
            let entry_gap = (entry >> patch_width) as usize;
            let patch = entry & patch_mask;
            gap += entry_gap;
            if entry_gap == 255 && patch == 0 {
                continue;
            }
            index += gap;
            gap = 0;
            let value = self.scratch.get_mut(index).ok_or_else(|| {
                Error::oos(format!("patch at {index} is outside a run of {length} values"))
            })?;
            *value |= patch.checked_shl(width as u32).unwrap_or(0);
        }

        self.literals.extend(
            self.scratch
                .iter()
                .map(|x| base.wrapping_add(*x as i64)),
        );
        Ok(())
    }

    fn delta(&mut self, header: u8) -> Result<()> {
        let code = header_to_bit_width_code(header);
        let length = header_to_rle_v2_direct_length(header, read_u8(&mut self.stream)?) as usize;

        let first = unsigned_varint(&mut self.stream)?;
        let first = self.decode(first);
        let delta_base = zigzag(unsigned_varint(&mut self.stream)?);

        self.literals.push(first);
        if code == 0 {
            // fixed delta
            let mut previous = first;
            for _ in 1..length {
                previous = previous.wrapping_add(delta_base);
                self.literals.push(previous);
            }
            return Ok(());
        }

        let mut previous = first.wrapping_add(delta_base);
        if length > 1 {
            self.literals.push(previous);
        }
        self.scratch.clear();
        unpack(
            &mut self.stream,
            decode_bit_width(code),
            length.saturating_sub(2),
            &mut self.scratch,
        )?;
        for delta in self.scratch.iter() {
            previous = if delta_base < 0 {
                previous.wrapping_sub(*delta as i64)
            } else {
                previous.wrapping_add(*delta as i64)
            };
            self.literals.push(previous);
        }
        Ok(())
    }

    /// Fills `out` and returns the number of values decoded. Fewer than `out.len()`
    /// values are decoded only when the stream is exhausted.
    pub fn read(&mut self, out: &mut [i64]) -> Result<usize> {
        let mut filled = 0;
        while filled < out.len() {
            if self.position == self.literals.len() && !self.next_run()? {
                break;
            }
            let length = (self.literals.len() - self.position).min(out.len() - filled);
            out[filled..filled + length]
                .copy_from_slice(&self.literals[self.position..self.position + length]);
            self.position += length;
            filled += length;
        }
        Ok(filled)
    }

    /// Discards the next `count` values.
    pub fn skip(&mut self, mut count: usize) -> Result<()> {
        while count > 0 {
            if self.position == self.literals.len() && !self.next_run()? {
                return Err(Error::oos(format!(
                    "cannot skip {count} more values of an exhausted stream"
                )));
            }
            let length = (self.literals.len() - self.position).min(count);
            self.position += length;
            count -= length;
        }
        Ok(())
    }
}
