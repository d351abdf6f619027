use chrono::NaiveDate;

use crate::{
    error::{Error, Result},
    proto::{column_encoding::Kind as ColumnEncodingKind, r#type::Kind as TypeKind},
    read::decode::{deserialize_f32, deserialize_f64, BooleanDecoder, ByteRleDecoder},
};

use super::{check_kind, read_integers, ColumnDecoder, DecodeStreams, OrcColumn};

/// Days between 0001-01-01 (day 1 of the common era) and 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i64 = 719_163;

fn require_direct_v2(streams: &DecodeStreams<'_>) -> Result<()> {
    if streams.encoding == ColumnEncodingKind::DirectV2 {
        Ok(())
    } else {
        Err(streams.unsupported_encoding())
    }
}

#[derive(Debug, Default)]
pub struct BooleanColumn;

impl ColumnDecoder for BooleanColumn {
    type Value = bool;
    type Item = Option<bool>;

    fn try_new(column: &OrcColumn) -> Result<Self> {
        check_kind(column, &[TypeKind::Boolean])?;
        Ok(Self)
    }

    fn null() -> Self::Item {
        None
    }

    fn item(value: bool) -> Self::Item {
        Some(value)
    }

    fn decode(
        &mut self,
        streams: &DecodeStreams<'_>,
        count: usize,
        out: &mut Vec<bool>,
    ) -> Result<()> {
        let data = streams.data;
        let mut decoder = BooleanDecoder::new(data.bytes);
        decoder.seek(
            data.positions.values_to_skip as usize,
            data.positions.remaining_bits,
        )?;
        let start = out.len();
        out.resize(start + count, false);
        let read = decoder.read(&mut out[start..])?;
        out.truncate(start + read);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct ByteColumn {
    scratch: Vec<u8>,
}

impl ColumnDecoder for ByteColumn {
    type Value = i8;
    type Item = Option<i8>;

    fn try_new(column: &OrcColumn) -> Result<Self> {
        check_kind(column, &[TypeKind::Byte])?;
        Ok(Self::default())
    }

    fn null() -> Self::Item {
        None
    }

    fn item(value: i8) -> Self::Item {
        Some(value)
    }

    fn decode(
        &mut self,
        streams: &DecodeStreams<'_>,
        count: usize,
        out: &mut Vec<i8>,
    ) -> Result<()> {
        let data = streams.data;
        let mut decoder = ByteRleDecoder::new(data.bytes);
        decoder.skip(data.positions.values_to_skip as usize)?;
        self.scratch.clear();
        self.scratch.resize(count, 0);
        let read = decoder.read(&mut self.scratch)?;
        out.extend(self.scratch[..read].iter().map(|x| *x as i8));
        Ok(())
    }
}

/// Short, int and long columns.
#[derive(Debug, Default)]
pub struct IntegerColumn;

impl ColumnDecoder for IntegerColumn {
    type Value = i64;
    type Item = Option<i64>;

    fn try_new(column: &OrcColumn) -> Result<Self> {
        check_kind(column, &[TypeKind::Short, TypeKind::Int, TypeKind::Long])?;
        Ok(Self)
    }

    fn null() -> Self::Item {
        None
    }

    fn item(value: i64) -> Self::Item {
        Some(value)
    }

    fn decode(
        &mut self,
        streams: &DecodeStreams<'_>,
        count: usize,
        out: &mut Vec<i64>,
    ) -> Result<()> {
        require_direct_v2(streams)?;
        read_integers(streams.data, true, count, out)
    }
}

#[derive(Debug, Default)]
pub struct FloatColumn;

impl ColumnDecoder for FloatColumn {
    type Value = f32;
    type Item = Option<f32>;

    fn try_new(column: &OrcColumn) -> Result<Self> {
        check_kind(column, &[TypeKind::Float])?;
        Ok(Self)
    }

    fn null() -> Self::Item {
        None
    }

    fn item(value: f32) -> Self::Item {
        Some(value)
    }

    fn decode(
        &mut self,
        streams: &DecodeStreams<'_>,
        count: usize,
        out: &mut Vec<f32>,
    ) -> Result<()> {
        out.extend(deserialize_f32(streams.data.bytes).take(count));
        Ok(())
    }
}

fn decode_f64(streams: &DecodeStreams<'_>, count: usize, out: &mut Vec<f64>) {
    out.extend(deserialize_f64(streams.data.bytes).take(count));
}

#[derive(Debug, Default)]
pub struct DoubleColumn;

impl ColumnDecoder for DoubleColumn {
    type Value = f64;
    type Item = Option<f64>;

    fn try_new(column: &OrcColumn) -> Result<Self> {
        check_kind(column, &[TypeKind::Double])?;
        Ok(Self)
    }

    fn null() -> Self::Item {
        None
    }

    fn item(value: f64) -> Self::Item {
        Some(value)
    }

    fn decode(
        &mut self,
        streams: &DecodeStreams<'_>,
        count: usize,
        out: &mut Vec<f64>,
    ) -> Result<()> {
        decode_f64(streams, count, out);
        Ok(())
    }
}

/// A double column whose nulls are represented as `NaN`.
#[derive(Debug, Default)]
pub struct DoubleNanColumn;

impl ColumnDecoder for DoubleNanColumn {
    type Value = f64;
    type Item = f64;

    fn try_new(column: &OrcColumn) -> Result<Self> {
        check_kind(column, &[TypeKind::Double])?;
        Ok(Self)
    }

    fn null() -> f64 {
        f64::NAN
    }

    fn item(value: f64) -> f64 {
        value
    }

    fn decode(
        &mut self,
        streams: &DecodeStreams<'_>,
        count: usize,
        out: &mut Vec<f64>,
    ) -> Result<()> {
        decode_f64(streams, count, out);
        Ok(())
    }
}

/// Converts days since 1970-01-01 to a date.
pub fn date_from_days(days: i64) -> Result<NaiveDate> {
    days.checked_add(UNIX_EPOCH_DAYS_FROM_CE)
        .and_then(|x| i32::try_from(x).ok())
        .and_then(NaiveDate::from_num_days_from_ce_opt)
        .ok_or_else(|| Error::oos(format!("{days} days since the epoch is not a valid date")))
}

#[derive(Debug, Default)]
pub struct DateColumn {
    days: Vec<i64>,
}

impl ColumnDecoder for DateColumn {
    type Value = NaiveDate;
    type Item = Option<NaiveDate>;

    fn try_new(column: &OrcColumn) -> Result<Self> {
        check_kind(column, &[TypeKind::Date])?;
        Ok(Self::default())
    }

    fn null() -> Self::Item {
        None
    }

    fn item(value: NaiveDate) -> Self::Item {
        Some(value)
    }

    fn decode(
        &mut self,
        streams: &DecodeStreams<'_>,
        count: usize,
        out: &mut Vec<NaiveDate>,
    ) -> Result<()> {
        require_direct_v2(streams)?;
        self.days.clear();
        read_integers(streams.data, true, count, &mut self.days)?;
        for days in &self.days {
            out.push(date_from_days(*days)?);
        }
        Ok(())
    }
}
