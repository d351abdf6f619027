//! Typed column buffers.
//!
//! A [`ColumnBuffer`] owns everything needed to turn the streams of one column in one
//! row group into typed values: a compressed and a decompressed buffer per stream,
//! a block scratch for decompression and the output slots. Its buffers are only ever
//! grown, so loading successive row groups does not allocate once warm. A buffer is
//! not shared: load distinct columns concurrently with distinct buffers.
//!
//! What is decoded, and how, is defined by a [`ColumnDecoder`]; this module provides
//! one per ORC primitive type.
use std::sync::Arc;

use log::trace;

use crate::{
    error::{Error, Result},
    proto::{
        column_encoding::Kind as ColumnEncodingKind, r#type::Kind as TypeKind, stream::Kind,
        CompressionKind,
    },
};

use super::{
    decode::{BooleanDecoder, RleV2Decoder},
    decompress::decompress_into,
    filter::FilterValues,
    provider::ByteRangeProvider,
    row_index::{ColumnDataStreams, ResolvedPositions, StreamRange},
};

mod binary;
mod decimal;
mod primitive;
mod timestamp;

pub use binary::{BinaryColumn, StringColumn, StringDictionary};
pub use decimal::{Decimal, DecimalColumn};
pub use primitive::{
    BooleanColumn, ByteColumn, DateColumn, DoubleColumn, DoubleNanColumn, FloatColumn,
    IntegerColumn,
};
pub use timestamp::TimestampColumn;

pub type BooleanColumnBuffer = ColumnBuffer<BooleanColumn>;
pub type ByteColumnBuffer = ColumnBuffer<ByteColumn>;
pub type IntegerColumnBuffer = ColumnBuffer<IntegerColumn>;
pub type FloatColumnBuffer = ColumnBuffer<FloatColumn>;
pub type DoubleColumnBuffer = ColumnBuffer<DoubleColumn>;
pub type DoubleNanColumnBuffer = ColumnBuffer<DoubleNanColumn>;
pub type DateColumnBuffer = ColumnBuffer<DateColumn>;
pub type TimestampColumnBuffer = ColumnBuffer<TimestampColumn>;
pub type DecimalColumnBuffer = ColumnBuffer<DecimalColumn>;
pub type BinaryColumnBuffer = ColumnBuffer<BinaryColumn>;
pub type StringColumnBuffer = ColumnBuffer<StringColumn>;

/// A primitive column of a file: its identity and an optional filter range.
#[derive(Debug, Clone, PartialEq)]
pub struct OrcColumn {
    /// Index of the column in the type tree (0 is the root struct).
    pub id: u32,
    pub name: String,
    pub kind: TypeKind,
    pub precision: Option<u32>,
    pub scale: Option<u32>,
    filter: Option<FilterValues>,
}

impl OrcColumn {
    pub fn new<S: Into<String>>(id: u32, name: S, kind: TypeKind) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            precision: None,
            scale: None,
            filter: None,
        }
    }

    pub fn with_decimal(mut self, precision: Option<u32>, scale: Option<u32>) -> Self {
        self.precision = precision;
        self.scale = scale;
        self
    }

    /// Attaches a filter range, used by [`crate::read::Reader::filter_stripes_for`].
    pub fn with_filter(mut self, filter: FilterValues) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn set_filter(&mut self, filter: Option<FilterValues>) {
        self.filter = filter;
    }

    pub fn filter(&self) -> Option<&FilterValues> {
        self.filter.as_ref()
    }
}

/// A decompressed stream starting at the block holding a row group, advanced to the
/// row group's offset inside that block.
#[derive(Debug, Clone, Copy)]
pub struct PositionedStream<'a> {
    pub bytes: &'a [u8],
    pub positions: ResolvedPositions,
}

/// Everything a [`ColumnDecoder`] reads for one row group.
#[derive(Debug, Clone, Copy)]
pub struct DecodeStreams<'a> {
    pub column: u32,
    pub encoding: ColumnEncodingKind,
    pub data: PositionedStream<'a>,
    pub secondary: Option<PositionedStream<'a>>,
    pub length: Option<PositionedStream<'a>>,
    pub dictionary: Option<&'a StringDictionary>,
}

impl<'a> DecodeStreams<'a> {
    pub fn secondary(&self) -> Result<PositionedStream<'a>> {
        self.secondary.ok_or(Error::MissingStream {
            column: self.column,
            kind: Kind::Secondary,
        })
    }

    pub fn length(&self) -> Result<PositionedStream<'a>> {
        self.length.ok_or(Error::MissingStream {
            column: self.column,
            kind: Kind::Length,
        })
    }

    pub fn unsupported_encoding(&self) -> Error {
        Error::UnsupportedEncoding {
            column: self.column,
            encoding: self.encoding,
        }
    }
}

/// Decodes the non-null values of one column type.
pub trait ColumnDecoder: Send + Sized {
    /// A decoded non-null value.
    type Value: Send;
    /// A slot of the output.
    type Item: Clone + Send;

    /// Fails with [`Error::UnsupportedType`] when `column` cannot be decoded by `Self`.
    fn try_new(column: &OrcColumn) -> Result<Self>;

    /// The slot of a null value.
    fn null() -> Self::Item;

    fn item(value: Self::Value) -> Self::Item;

    /// Appends up to `count` values decoded from `streams` to `out`.
    fn decode(
        &mut self,
        streams: &DecodeStreams<'_>,
        count: usize,
        out: &mut Vec<Self::Value>,
    ) -> Result<()>;
}

pub(crate) fn check_kind(column: &OrcColumn, kinds: &[TypeKind]) -> Result<()> {
    if kinds.contains(&column.kind) {
        Ok(())
    } else {
        Err(Error::UnsupportedType {
            column: column.id,
            kind: column.kind,
        })
    }
}

/// Appends up to `count` run length encoded integers of `stream` to `out`.
pub(crate) fn read_integers(
    stream: PositionedStream<'_>,
    signed: bool,
    count: usize,
    out: &mut Vec<i64>,
) -> Result<()> {
    let mut decoder = RleV2Decoder::new(stream.bytes, signed);
    decoder.skip(stream.positions.values_to_skip as usize)?;
    let start = out.len();
    out.resize(start + count, 0);
    let read = decoder.read(&mut out[start..])?;
    out.truncate(start + read);
    Ok(())
}

/// Everything needed to load one column of one row group.
#[derive(Debug, Clone)]
pub struct RowGroupPlan {
    pub stripe: usize,
    pub row_group: usize,
    /// Rows of the row group (the stride, except for the last row group of a stripe).
    pub rows: usize,
    pub encoding: ColumnEncodingKind,
    pub streams: ColumnDataStreams,
    pub dictionary: Option<Arc<StringDictionary>>,
    pub compression: CompressionKind,
    pub block_capacity: usize,
    pub memoize_present: bool,
}

const PRESENT: usize = 0;
const DATA: usize = 1;
const SECONDARY: usize = 2;
const LENGTH: usize = 3;

fn targets(streams: &ColumnDataStreams) -> [(usize, Option<StreamRange>); 4] {
    [
        (PRESENT, streams.present),
        (DATA, Some(streams.data)),
        (SECONDARY, streams.secondary),
        (LENGTH, streams.length),
    ]
}

/// The buffers of one stream.
#[derive(Debug, Default)]
struct StreamBuffer {
    compressed: Vec<u8>,
    decompressed: Vec<u8>,
    /// The (offset, length) whose bytes are in `compressed`.
    fetched: Option<(u64, u64)>,
    /// The (offset, length) whose bytes are in `decompressed`.
    decoded: Option<(u64, u64)>,
}

impl StreamBuffer {
    /// Returns a buffer of `length` bytes to fetch `range` into, growing it if needed.
    fn prepare(&mut self, range: &StreamRange) -> &mut [u8] {
        let length = range.length as usize;
        if self.compressed.len() < length {
            self.compressed.resize(length, 0);
        }
        self.fetched = None;
        self.decoded = None;
        &mut self.compressed[..length]
    }

    fn is_memoized(&self, range: &StreamRange) -> bool {
        self.decoded == Some((range.offset, range.length))
    }

    fn decompress(
        &mut self,
        range: &StreamRange,
        compression: CompressionKind,
        capacity: usize,
        scratch: &mut Vec<u8>,
    ) -> Result<()> {
        let key = (range.offset, range.length);
        if self.decoded == Some(key) {
            return Ok(());
        }
        if self.fetched != Some(key) {
            return Err(Error::oos(format!(
                "stream at {} was not fetched before decompression",
                range.offset
            )));
        }
        decompress_into(
            &self.compressed[..range.length as usize],
            compression,
            capacity,
            scratch,
            &mut self.decompressed,
        )?;
        self.decoded = Some(key);
        Ok(())
    }

    fn positioned(&self, range: &StreamRange) -> Result<PositionedStream<'_>> {
        let offset = range.positions.row_entry_offset as usize;
        let bytes = self.decompressed.get(offset..).ok_or_else(|| {
            Error::oos(format!(
                "row group starts {offset} bytes into a block of {} bytes",
                self.decompressed.len()
            ))
        })?;
        Ok(PositionedStream {
            bytes,
            positions: range.positions,
        })
    }
}

/// Reusable buffers and decoded values of one column.
pub struct ColumnBuffer<D: ColumnDecoder> {
    column: OrcColumn,
    stride: usize,
    decoder: D,
    values: Vec<D::Item>,
    num_values_read: usize,
    dense: Vec<D::Value>,
    present: Vec<bool>,
    streams: [StreamBuffer; 4],
    block: Vec<u8>,
}

impl<D: ColumnDecoder> std::fmt::Debug for ColumnBuffer<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ColumnBuffer")
            .field("column", &self.column)
            .field("stride", &self.stride)
            .field("num_values_read", &self.num_values_read)
            .finish()
    }
}

impl<D: ColumnDecoder> ColumnBuffer<D> {
    /// Creates a buffer for `column` holding up to `stride` values.
    pub fn try_new(column: OrcColumn, stride: usize) -> Result<Self> {
        let decoder = D::try_new(&column)?;
        Ok(Self {
            column,
            stride,
            decoder,
            values: Vec::with_capacity(stride),
            num_values_read: 0,
            dense: Vec::with_capacity(stride),
            present: Vec::with_capacity(stride),
            streams: Default::default(),
            block: vec![],
        })
    }

    pub fn column(&self) -> &OrcColumn {
        &self.column
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    /// The values of the last loaded row group.
    pub fn values(&self) -> &[D::Item] {
        &self.values[..self.num_values_read]
    }

    pub fn num_values_read(&self) -> usize {
        self.num_values_read
    }

    /// Forgets the last loaded row group. Allocated buffers are kept.
    pub fn reset(&mut self) {
        self.values.clear();
        self.num_values_read = 0;
        for stream in self.streams.iter_mut() {
            stream.fetched = None;
            stream.decoded = None;
        }
    }

    /// Whether `range` can be skipped because it is the memoized Present range.
    fn skip_fetch(&self, slot: usize, range: &StreamRange, plan: &RowGroupPlan) -> bool {
        let skip = slot == PRESENT && plan.memoize_present && self.streams[slot].is_memoized(range);
        if skip {
            trace!(
                "column {} re-uses the Present range at {} for row group {} of stripe {}",
                self.column.id,
                range.offset,
                plan.row_group,
                plan.stripe
            );
        }
        skip
    }

    pub(crate) fn fetch<P: ByteRangeProvider + ?Sized>(
        &mut self,
        provider: &P,
        plan: &RowGroupPlan,
    ) -> Result<()> {
        for (slot, range) in targets(&plan.streams) {
            let range = match range {
                Some(range) => range,
                None => continue,
            };
            if self.skip_fetch(slot, &range, plan) {
                continue;
            }
            let stream = &mut self.streams[slot];
            provider.get_range(stream.prepare(&range), range.offset)?;
            stream.fetched = Some((range.offset, range.length));
        }
        Ok(())
    }

    pub(crate) async fn fetch_async<P: ByteRangeProvider + ?Sized>(
        &mut self,
        provider: &P,
        plan: &RowGroupPlan,
    ) -> Result<()> {
        for (slot, range) in targets(&plan.streams) {
            let range = match range {
                Some(range) => range,
                None => continue,
            };
            if self.skip_fetch(slot, &range, plan) {
                continue;
            }
            let stream = &mut self.streams[slot];
            provider
                .get_range_async(stream.prepare(&range), range.offset)
                .await?;
            stream.fetched = Some((range.offset, range.length));
        }
        Ok(())
    }

    /// Decompresses and decodes the fetched streams of `plan` into the values.
    pub(crate) fn fill(&mut self, plan: &RowGroupPlan) -> Result<()> {
        self.num_values_read = 0;
        self.values.clear();
        for (slot, range) in targets(&plan.streams) {
            if let Some(range) = range {
                self.streams[slot].decompress(
                    &range,
                    plan.compression,
                    plan.block_capacity,
                    &mut self.block,
                )?;
            }
        }

        let rows = plan.rows.min(self.stride);
        let column = self.column.id;

        let non_null = match &plan.streams.present {
            Some(range) => {
                let present = self.streams[PRESENT].positioned(range)?;
                let mut decoder = BooleanDecoder::new(present.bytes);
                decoder.seek(
                    present.positions.values_to_skip as usize,
                    present.positions.remaining_bits,
                )?;
                self.present.clear();
                self.present.resize(rows, false);
                let read = decoder.read(&mut self.present)?;
                if read < rows {
                    return Err(Error::oos(format!(
                        "column {column}: Present stream holds {read} of {rows} rows"
                    )));
                }
                self.present.iter().filter(|x| **x).count()
            }
            None => rows,
        };

        let positioned = |slot: usize, range: &Option<StreamRange>| {
            range
                .as_ref()
                .map(|range| self.streams[slot].positioned(range))
                .transpose()
        };
        let streams = DecodeStreams {
            column,
            encoding: plan.encoding,
            data: self.streams[DATA].positioned(&plan.streams.data)?,
            secondary: positioned(SECONDARY, &plan.streams.secondary)?,
            length: positioned(LENGTH, &plan.streams.length)?,
            dictionary: plan.dictionary.as_deref(),
        };

        self.dense.clear();
        self.decoder.decode(&streams, non_null, &mut self.dense)?;
        if self.dense.len() != non_null {
            return Err(Error::oos(format!(
                "column {column}: Data stream holds {} of {non_null} values",
                self.dense.len()
            )));
        }

        if plan.streams.present.is_some() {
            let mut dense = self.dense.drain(..);
            for is_present in &self.present[..rows] {
                let item = if *is_present {
                    dense.next().map(D::item).ok_or_else(|| {
                        Error::oos(format!("column {column}: ran out of values"))
                    })?
                } else {
                    D::null()
                };
                self.values.push(item);
            }
        } else {
            self.values.extend(self.dense.drain(..).map(D::item));
        }
        self.num_values_read = rows;
        Ok(())
    }

    pub(crate) fn read<P: ByteRangeProvider + ?Sized>(
        &mut self,
        provider: &P,
        plan: &RowGroupPlan,
    ) -> Result<()> {
        self.fetch(provider, plan)?;
        self.fill(plan)
    }

    pub(crate) async fn read_async<P: ByteRangeProvider + ?Sized>(
        &mut self,
        provider: &P,
        plan: &RowGroupPlan,
    ) -> Result<()> {
        self.fetch_async(provider, plan).await?;
        self.fill(plan)
    }
}
