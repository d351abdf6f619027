use chrono::{DateTime, NaiveDateTime};

use crate::{
    error::{Error, Result},
    proto::{column_encoding::Kind as ColumnEncodingKind, r#type::Kind as TypeKind},
};

use super::{check_kind, read_integers, ColumnDecoder, DecodeStreams, OrcColumn};

/// Seconds between 1970-01-01 and 2015-01-01, the epoch of ORC timestamps.
pub const TIMESTAMP_BASE_SECONDS: i64 = 1_420_070_400;

/// Decodes the nanoseconds of the Secondary stream: the 3 low bits hold the number of
/// trailing decimal zeros removed (minus one), the remaining bits the significand.
pub fn decode_nanos(encoded: u64) -> Result<u32> {
    let zeros = encoded & 0b111;
    let significand = encoded >> 3;
    let nanos = if zeros == 0 {
        Some(significand)
    } else {
        10u64
            .checked_pow(zeros as u32 + 1)
            .and_then(|scale| significand.checked_mul(scale))
    };
    nanos
        .filter(|x| *x < 1_000_000_000)
        .map(|x| x as u32)
        .ok_or_else(|| Error::oos(format!("{encoded} does not encode nanoseconds")))
}

/// Builds a timestamp from the seconds relative to 2015-01-01 of the Data stream and
/// the encoded nanoseconds of the Secondary stream.
pub fn timestamp_from_parts(seconds: i64, encoded_nanos: u64) -> Result<NaiveDateTime> {
    let nanos = decode_nanos(encoded_nanos)?;
    let mut seconds = seconds
        .checked_add(TIMESTAMP_BASE_SECONDS)
        .ok_or_else(|| Error::oos(format!("{seconds} seconds overflow a timestamp")))?;
    // seconds of timestamps before 1970 were truncated towards zero
    if seconds < 0 && nanos > 999_999 {
        seconds -= 1;
    }
    DateTime::from_timestamp(seconds, nanos)
        .map(|x| x.naive_utc())
        .ok_or_else(|| Error::oos(format!("{seconds}s {nanos}ns is not a valid timestamp")))
}

#[derive(Debug, Default)]
pub struct TimestampColumn {
    seconds: Vec<i64>,
    nanos: Vec<i64>,
}

impl ColumnDecoder for TimestampColumn {
    type Value = NaiveDateTime;
    type Item = Option<NaiveDateTime>;

    fn try_new(column: &OrcColumn) -> Result<Self> {
        check_kind(column, &[TypeKind::Timestamp])?;
        Ok(Self::default())
    }

    fn null() -> Self::Item {
        None
    }

    fn item(value: NaiveDateTime) -> Self::Item {
        Some(value)
    }

    fn decode(
        &mut self,
        streams: &DecodeStreams<'_>,
        count: usize,
        out: &mut Vec<NaiveDateTime>,
    ) -> Result<()> {
        if streams.encoding != ColumnEncodingKind::DirectV2 {
            return Err(streams.unsupported_encoding());
        }
        self.seconds.clear();
        self.nanos.clear();
        read_integers(streams.data, true, count, &mut self.seconds)?;
        read_integers(streams.secondary()?, false, count, &mut self.nanos)?;
        if self.seconds.len() != self.nanos.len() {
            return Err(Error::ValueCountMismatch {
                column: streams.column,
                expected: self.seconds.len(),
                found: self.nanos.len(),
            });
        }
        for (seconds, nanos) in self.seconds.iter().zip(self.nanos.iter()) {
            out.push(timestamp_from_parts(*seconds, *nanos as u64)?);
        }
        Ok(())
    }
}
