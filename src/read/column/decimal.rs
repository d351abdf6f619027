use std::{cmp::Ordering, fmt, str::FromStr};

use crate::{
    error::{Error, Result},
    proto::{column_encoding::Kind as ColumnEncodingKind, r#type::Kind as TypeKind},
    read::decode::VarintDecoder,
};

use super::{check_kind, read_integers, ColumnDecoder, DecodeStreams, OrcColumn};

/// A decimal number, `mantissa * 10^-scale`.
///
/// Equality and ordering compare numeric values: `1.50 == 1.5`.
#[derive(Debug, Clone, Copy)]
pub struct Decimal {
    mantissa: i128,
    scale: i32,
}

impl Decimal {
    pub fn new(mantissa: i128, scale: i32) -> Self {
        Self { mantissa, scale }
    }

    pub fn mantissa(&self) -> i128 {
        self.mantissa
    }

    pub fn scale(&self) -> i32 {
        self.scale
    }

    pub fn to_f64(&self) -> f64 {
        self.mantissa as f64 * 10f64.powi(-self.scale)
    }

    /// The same value without trailing zeros in the mantissa.
    fn normalized(self) -> Self {
        if self.mantissa == 0 {
            return Self::new(0, 0);
        }
        let mut x = self;
        while x.mantissa % 10 == 0 {
            x.mantissa /= 10;
            x.scale -= 1;
        }
        x
    }
}

impl Ord for Decimal {
    fn cmp(&self, other: &Self) -> Ordering {
        let a = self.normalized();
        let b = other.normalized();
        let sign = a.mantissa.signum().cmp(&b.mantissa.signum());
        if sign != Ordering::Equal || a.scale == b.scale {
            return sign.then(a.mantissa.cmp(&b.mantissa));
        }
        // rescale the mantissa with the smaller scale to the larger one
        let (low, high) = if a.scale < b.scale { (a, b) } else { (b, a) };
        let scaled = u32::try_from(i64::from(high.scale) - i64::from(low.scale))
            .ok()
            .and_then(|x| 10i128.checked_pow(x))
            .and_then(|x| low.mantissa.checked_mul(x));
        let ordering = match scaled {
            Some(scaled) => scaled.cmp(&high.mantissa),
            // larger in magnitude than any mantissa
            None if low.mantissa > 0 => Ordering::Greater,
            None => Ordering::Less,
        };
        if a.scale < b.scale {
            ordering
        } else {
            ordering.reverse()
        }
    }
}

impl PartialOrd for Decimal {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Decimal {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Decimal {}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = self.mantissa.unsigned_abs().to_string();
        if self.mantissa < 0 {
            f.write_str("-")?;
        }
        if self.scale <= 0 {
            f.write_str(&digits)?;
            if self.mantissa != 0 {
                for _ in 0..-(self.scale as i64) {
                    f.write_str("0")?;
                }
            }
            return Ok(());
        }
        let scale = self.scale as usize;
        if digits.len() <= scale {
            write!(f, "0.{}{}", "0".repeat(scale - digits.len()), digits)
        } else {
            let (integer, fraction) = digits.split_at(digits.len() - scale);
            write!(f, "{integer}.{fraction}")
        }
    }
}

impl FromStr for Decimal {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::oos(format!("{s:?} is not a decimal"));
        let trimmed = s.trim();
        let (negative, unsigned) = match trimmed.as_bytes().first() {
            Some(b'-') => (true, &trimmed[1..]),
            Some(b'+') => (false, &trimmed[1..]),
            _ => (false, trimmed),
        };
        let (integer, fraction) = unsigned.split_once('.').unwrap_or((unsigned, ""));
        if integer.is_empty() && fraction.is_empty() {
            return Err(invalid());
        }
        if !integer.bytes().chain(fraction.bytes()).all(|x| x.is_ascii_digit()) {
            return Err(invalid());
        }
        let digits = format!("{integer}{fraction}");
        let significant = digits.trim_start_matches('0');
        let mantissa = if significant.is_empty() {
            0
        } else {
            significant
                .parse::<i128>()
                .map_err(|_| Error::DecimalOverflow)?
        };
        let scale = i32::try_from(fraction.len()).map_err(|_| invalid())?;
        Ok(Self::new(if negative { -mantissa } else { mantissa }, scale))
    }
}

#[derive(Debug, Default)]
pub struct DecimalColumn {
    mantissas: Vec<i128>,
    scales: Vec<i64>,
}

impl ColumnDecoder for DecimalColumn {
    type Value = Decimal;
    type Item = Option<Decimal>;

    fn try_new(column: &OrcColumn) -> Result<Self> {
        check_kind(column, &[TypeKind::Decimal])?;
        Ok(Self::default())
    }

    fn null() -> Self::Item {
        None
    }

    fn item(value: Decimal) -> Self::Item {
        Some(value)
    }

    fn decode(
        &mut self,
        streams: &DecodeStreams<'_>,
        count: usize,
        out: &mut Vec<Decimal>,
    ) -> Result<()> {
        if streams.encoding != ColumnEncodingKind::DirectV2 {
            return Err(streams.unsupported_encoding());
        }
        self.mantissas.clear();
        self.mantissas.resize(count, 0);
        let read = VarintDecoder::new(streams.data.bytes).read(&mut self.mantissas)?;
        self.mantissas.truncate(read);

        self.scales.clear();
        read_integers(streams.secondary()?, true, count, &mut self.scales)?;
        if self.scales.len() != self.mantissas.len() {
            return Err(Error::ValueCountMismatch {
                column: streams.column,
                expected: self.mantissas.len(),
                found: self.scales.len(),
            });
        }
        for (mantissa, scale) in self.mantissas.iter().zip(self.scales.iter()) {
            let scale = i32::try_from(*scale)
                .map_err(|_| Error::oos(format!("decimal scale {scale} is out of range")))?;
            out.push(Decimal::new(*mantissa, scale));
        }
        Ok(())
    }
}
