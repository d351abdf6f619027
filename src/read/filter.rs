//! Statistics based pruning.
//!
//! A [`FilterValues`] is a closed `[min, max]` range of one logical type, held as a pair
//! of strings. [`FilterValues::may_match`] tells whether the interval described by a
//! column's statistics (file, stripe or row group) overlaps the range. It never answers
//! `false` for statistics whose values may match; missing or unusable statistics always
//! match.
use std::cmp::Ordering;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use log::warn;

use crate::{
    error::{Error, Result},
    proto::{r#type::Kind as TypeKind, ColumnStatistics},
};

use super::column::Decimal;

const MILLIS_PER_DAY: i64 = 86_400_000;
const DATE_FORMAT: &str = "%Y-%m-%d";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";
const TIME_FORMAT: &str = "%H:%M:%S%.f";

/// The logical type of a [`FilterValues`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterKind {
    Integer,
    Double,
    Boolean,
    Decimal,
    String,
    Date,
    Timestamp,
    /// The time of day of a timestamp column, regardless of its date.
    TimeOfDay,
}

impl FilterKind {
    fn applies_to(self, column_type: TypeKind) -> bool {
        use TypeKind::*;
        match self {
            FilterKind::Integer => matches!(column_type, Byte | Short | Int | Long),
            FilterKind::Double => matches!(column_type, Float | Double),
            FilterKind::Boolean => column_type == Boolean,
            FilterKind::Decimal => column_type == Decimal,
            FilterKind::String => matches!(column_type, String | Varchar | Char),
            FilterKind::Date => column_type == Date,
            FilterKind::Timestamp | FilterKind::TimeOfDay => column_type == Timestamp,
        }
    }
}

/// A parsed range.
#[derive(Debug, Clone, PartialEq)]
enum Range<'a> {
    Integer(i64, i64),
    Double(f64, f64),
    Boolean(bool, bool),
    Decimal(Decimal, Decimal),
    String(&'a str, &'a str),
    /// Days since the epoch.
    Date(i64, i64),
    /// Milliseconds since the epoch.
    Timestamp(i64, i64),
    /// Milliseconds since midnight.
    TimeOfDay(i64, i64),
}

fn invalid(kind: FilterKind, value: &str) -> Error {
    Error::InvalidFilter(format!("{value:?} is not a valid {kind:?} bound"))
}

fn days_since_epoch(date: NaiveDate) -> i64 {
    date.signed_duration_since(NaiveDate::default()).num_days()
}

fn millis_since_epoch(datetime: NaiveDateTime) -> i64 {
    datetime.and_utc().timestamp_millis()
}

fn millis_since_midnight(time: NaiveTime) -> i64 {
    time.num_seconds_from_midnight() as i64 * 1000 + (time.nanosecond() / 1_000_000) as i64
}

fn parse<'a>(kind: FilterKind, min: &'a str, max: &'a str) -> Result<Range<'a>> {
    macro_rules! bounds {
        ($parse:expr) => {{
            let parse = $parse;
            (
                parse(min).ok_or_else(|| invalid(kind, min))?,
                parse(max).ok_or_else(|| invalid(kind, max))?,
            )
        }};
    }
    let range = match kind {
        FilterKind::Integer => {
            let (min, max) = bounds!(|x: &str| x.trim().parse::<i64>().ok());
            Range::Integer(min, max)
        }
        FilterKind::Double => {
            let (min, max) =
                bounds!(|x: &str| x.trim().parse::<f64>().ok().filter(|x| !x.is_nan()));
            Range::Double(min, max)
        }
        FilterKind::Boolean => {
            let (min, max) = bounds!(|x: &str| x.trim().parse::<bool>().ok());
            Range::Boolean(min, max)
        }
        FilterKind::Decimal => {
            let (min, max) = bounds!(|x: &str| x.parse::<Decimal>().ok());
            Range::Decimal(min, max)
        }
        FilterKind::String => Range::String(min, max),
        FilterKind::Date => {
            let (min, max) = bounds!(|x: &str| NaiveDate::parse_from_str(x.trim(), DATE_FORMAT)
                .ok()
                .map(days_since_epoch));
            Range::Date(min, max)
        }
        FilterKind::Timestamp => {
            let (min, max) = bounds!(|x: &str| NaiveDateTime::parse_from_str(
                x.trim(),
                TIMESTAMP_FORMAT
            )
            .ok()
            .map(millis_since_epoch));
            Range::Timestamp(min, max)
        }
        FilterKind::TimeOfDay => {
            let (min, max) = bounds!(|x: &str| NaiveTime::parse_from_str(x.trim(), TIME_FORMAT)
                .ok()
                .map(millis_since_midnight));
            Range::TimeOfDay(min, max)
        }
    };
    let ordered = match &range {
        Range::Integer(a, b) | Range::Date(a, b) | Range::Timestamp(a, b) | Range::TimeOfDay(a, b) => {
            a <= b
        }
        Range::Double(a, b) => a <= b,
        Range::Boolean(a, b) => a <= b,
        Range::Decimal(a, b) => a <= b,
        Range::String(a, b) => a <= b,
    };
    if !ordered {
        return Err(Error::InvalidFilter(format!(
            "the minimum {min:?} is larger than the maximum {max:?}"
        )));
    }
    Ok(range)
}

/// Whether `[min, max]` and `[query_min, query_max]` overlap.
fn overlaps<T: PartialOrd>(min: T, max: T, query_min: T, query_max: T) -> bool {
    !(max < query_min || min > query_max)
}

/// A typed `[min, max]` range, normalized to strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FilterValues {
    kind: FilterKind,
    min: String,
    max: String,
}

impl FilterValues {
    /// A range of `kind` from its textual bounds. Dates are `YYYY-MM-DD`, timestamps
    /// `YYYY-MM-DD HH:MM:SS[.fff]` and times of day `HH:MM:SS[.fff]`.
    pub fn new<S: Into<String>, T: Into<String>>(kind: FilterKind, min: S, max: T) -> Result<Self> {
        let values = Self {
            kind,
            min: min.into(),
            max: max.into(),
        };
        parse(kind, &values.min, &values.max)?;
        Ok(values)
    }

    pub fn integer(min: i64, max: i64) -> Result<Self> {
        Self::new(FilterKind::Integer, min.to_string(), max.to_string())
    }

    pub fn double(min: f64, max: f64) -> Result<Self> {
        Self::new(FilterKind::Double, min.to_string(), max.to_string())
    }

    pub fn boolean(min: bool, max: bool) -> Result<Self> {
        Self::new(FilterKind::Boolean, min.to_string(), max.to_string())
    }

    pub fn decimal(min: Decimal, max: Decimal) -> Result<Self> {
        Self::new(FilterKind::Decimal, min.to_string(), max.to_string())
    }

    pub fn string<S: Into<String>, T: Into<String>>(min: S, max: T) -> Result<Self> {
        Self::new(FilterKind::String, min, max)
    }

    pub fn date(min: NaiveDate, max: NaiveDate) -> Result<Self> {
        Self::new(
            FilterKind::Date,
            min.format(DATE_FORMAT).to_string(),
            max.format(DATE_FORMAT).to_string(),
        )
    }

    pub fn timestamp(min: NaiveDateTime, max: NaiveDateTime) -> Result<Self> {
        Self::new(
            FilterKind::Timestamp,
            min.format(TIMESTAMP_FORMAT).to_string(),
            max.format(TIMESTAMP_FORMAT).to_string(),
        )
    }

    pub fn time_of_day(min: NaiveTime, max: NaiveTime) -> Result<Self> {
        Self::new(
            FilterKind::TimeOfDay,
            min.format(TIME_FORMAT).to_string(),
            max.format(TIME_FORMAT).to_string(),
        )
    }

    pub fn kind(&self) -> FilterKind {
        self.kind
    }

    pub fn min(&self) -> &str {
        &self.min
    }

    pub fn max(&self) -> &str {
        &self.max
    }

    /// Whether values described by `statistics` of a `column_type` column may fall in
    /// this range. Fails when the range does not apply to `column_type`.
    pub fn may_match(
        &self,
        column_type: TypeKind,
        statistics: Option<&ColumnStatistics>,
    ) -> Result<bool> {
        if !self.kind.applies_to(column_type) {
            return Err(Error::InvalidFilter(format!(
                "a {:?} filter does not apply to a {column_type:?} column",
                self.kind
            )));
        }
        let range = parse(self.kind, &self.min, &self.max)?;
        let statistics = match statistics {
            Some(statistics) => statistics,
            None => return Ok(true),
        };
        if statistics.number_of_values == Some(0) {
            // only nulls
            return Ok(false);
        }

        Ok(match range {
            Range::Integer(query_min, query_max) => {
                match statistics.int_statistics.as_ref() {
                    Some(x) => match (x.minimum, x.maximum) {
                        (Some(min), Some(max)) => overlaps(min, max, query_min, query_max),
                        _ => true,
                    },
                    None => true,
                }
            }
            Range::Double(query_min, query_max) => {
                match statistics.double_statistics.as_ref() {
                    Some(x) => match (x.minimum, x.maximum) {
                        (Some(min), Some(max)) if !min.is_nan() && !max.is_nan() => {
                            overlaps(min, max, query_min, query_max)
                        }
                        _ => true,
                    },
                    None => true,
                }
            }
            Range::Boolean(query_min, query_max) => {
                let trues = statistics
                    .bucket_statistics
                    .as_ref()
                    .and_then(|x| x.count.first().copied());
                match (trues, statistics.number_of_values) {
                    (Some(trues), Some(total)) => {
                        let has_true = trues > 0;
                        let has_false = trues < total;
                        (!query_min && has_false) || (query_max && has_true)
                    }
                    _ => true,
                }
            }
            Range::Decimal(query_min, query_max) => {
                let bounds = statistics
                    .decimal_statistics
                    .as_ref()
                    .and_then(|x| x.minimum.as_deref().zip(x.maximum.as_deref()));
                match bounds {
                    Some((min, max)) => match (min.parse::<Decimal>(), max.parse::<Decimal>()) {
                        (Ok(min), Ok(max)) => overlaps(min, max, query_min, query_max),
                        _ => {
                            warn!("ignoring unparsable decimal statistics [{min}, {max}]");
                            true
                        }
                    },
                    None => true,
                }
            }
            Range::String(query_min, query_max) => {
                let bounds = statistics
                    .string_statistics
                    .as_ref()
                    .and_then(|x| x.minimum.as_deref().zip(x.maximum.as_deref()));
                match bounds {
                    Some((min, max)) => overlaps(min, max, query_min, query_max),
                    None => true,
                }
            }
            Range::Date(query_min, query_max) => {
                match statistics.date_statistics.as_ref() {
                    Some(x) => match (x.minimum, x.maximum) {
                        (Some(min), Some(max)) => {
                            overlaps(min as i64, max as i64, query_min, query_max)
                        }
                        _ => true,
                    },
                    None => true,
                }
            }
            Range::Timestamp(query_min, query_max) => match timestamp_bounds(statistics) {
                Some((min, max)) => overlaps(min, max, query_min, query_max),
                None => true,
            },
            Range::TimeOfDay(query_min, query_max) => match timestamp_bounds(statistics) {
                Some((min, max)) => time_of_day_overlaps(min, max, query_min, query_max),
                None => true,
            },
        })
    }
}

/// The UTC bounds, falling back to the bounds older writers record in their local time.
fn timestamp_bounds(statistics: &ColumnStatistics) -> Option<(i64, i64)> {
    let x = statistics.timestamp_statistics.as_ref()?;
    x.minimum_utc
        .zip(x.maximum_utc)
        .or_else(|| x.minimum.zip(x.maximum))
}

/// Whether timestamps in `[min, max]` (milliseconds since the epoch) may have a time of
/// day in `[query_min, query_max]` (milliseconds since midnight).
fn time_of_day_overlaps(min: i64, max: i64, query_min: i64, query_max: i64) -> bool {
    if max.saturating_sub(min) >= MILLIS_PER_DAY - 1 {
        return true;
    }
    let start = min.rem_euclid(MILLIS_PER_DAY);
    let end = max.rem_euclid(MILLIS_PER_DAY);
    match start.cmp(&end) {
        Ordering::Less | Ordering::Equal => overlaps(start, end, query_min, query_max),
        // wraps around midnight
        Ordering::Greater => {
            overlaps(start, MILLIS_PER_DAY - 1, query_min, query_max)
                || overlaps(0, end, query_min, query_max)
        }
    }
}
