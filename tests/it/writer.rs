//! A minimal ORC writer used to build test files in memory.
//!
//! Every row group starts new runs in every stream, so positions only ever carry a
//! block offset and an offset inside the block. Byte columns are the exception: their
//! runs cross row groups, so their positions also skip into a run. Strides must be
//! multiples of 8 so that boolean streams of a row group start on a byte.
use std::collections::{BTreeSet, HashMap};
use std::io::Write;
use std::ops::Range;

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use flate2::{write::DeflateEncoder, Compression};
use prost::Message;

use orc_reader::proto::{
    column_encoding::Kind as ColumnEncodingKind, r#type::Kind as TypeKind, stream::Kind,
    BinaryStatistics, BucketStatistics, ColumnEncoding, ColumnStatistics, CompressionKind,
    DateStatistics, DecimalStatistics, DoubleStatistics, Footer, IntegerStatistics, Metadata,
    PostScript, RowIndex, RowIndexEntry, Stream, StringStatistics, StripeFooter,
    StripeInformation, StripeStatistics, TimestampStatistics, Type,
};
use orc_reader::read::Decimal;

pub const TIMESTAMP_BASE_SECONDS: i64 = 1_420_070_400;

#[derive(Debug, Clone)]
pub enum Values {
    /// Byte RLE over the whole stripe: row groups may start inside a run.
    Byte(Vec<Option<i8>>),
    Short(Vec<Option<i64>>),
    Int(Vec<Option<i64>>),
    Long(Vec<Option<i64>>),
    Float(Vec<Option<f32>>),
    Double(Vec<Option<f64>>),
    Date(Vec<Option<NaiveDate>>),
    Binary(Vec<Option<Vec<u8>>>),
    Boolean(Vec<Option<bool>>),
    /// Direct encoded strings.
    String(Vec<Option<String>>),
    /// Dictionary encoded strings.
    Dictionary(Vec<Option<String>>),
    /// Mantissas of a fixed scale.
    Decimal {
        precision: u32,
        scale: u32,
        values: Vec<Option<i128>>,
    },
    Timestamp(Vec<Option<NaiveDateTime>>),
}

impl Values {
    fn len(&self) -> usize {
        match self {
            Values::Byte(v) => v.len(),
            Values::Short(v) | Values::Int(v) | Values::Long(v) => v.len(),
            Values::Float(v) => v.len(),
            Values::Double(v) => v.len(),
            Values::Date(v) => v.len(),
            Values::Binary(v) => v.len(),
            Values::Boolean(v) => v.len(),
            Values::String(v) | Values::Dictionary(v) => v.len(),
            Values::Decimal { values, .. } => values.len(),
            Values::Timestamp(v) => v.len(),
        }
    }

    fn is_null(&self, row: usize) -> bool {
        match self {
            Values::Byte(v) => v[row].is_none(),
            Values::Short(v) | Values::Int(v) | Values::Long(v) => v[row].is_none(),
            Values::Float(v) => v[row].is_none(),
            Values::Double(v) => v[row].is_none(),
            Values::Date(v) => v[row].is_none(),
            Values::Binary(v) => v[row].is_none(),
            Values::Boolean(v) => v[row].is_none(),
            Values::String(v) | Values::Dictionary(v) => v[row].is_none(),
            Values::Decimal { values, .. } => values[row].is_none(),
            Values::Timestamp(v) => v[row].is_none(),
        }
    }

    fn type_(&self) -> Type {
        let kind = match self {
            Values::Byte(_) => TypeKind::Byte,
            Values::Short(_) => TypeKind::Short,
            Values::Int(_) => TypeKind::Int,
            Values::Long(_) => TypeKind::Long,
            Values::Float(_) => TypeKind::Float,
            Values::Double(_) => TypeKind::Double,
            Values::Date(_) => TypeKind::Date,
            Values::Binary(_) => TypeKind::Binary,
            Values::Boolean(_) => TypeKind::Boolean,
            Values::String(_) | Values::Dictionary(_) => TypeKind::String,
            Values::Decimal { .. } => TypeKind::Decimal,
            Values::Timestamp(_) => TypeKind::Timestamp,
        };
        let (precision, scale) = match self {
            Values::Decimal {
                precision, scale, ..
            } => (Some(*precision), Some(*scale)),
            _ => (None, None),
        };
        Type {
            kind: Some(kind as i32),
            precision,
            scale,
            ..Default::default()
        }
    }

    fn encoding(&self) -> ColumnEncodingKind {
        match self {
            Values::Byte(_) | Values::Float(_) | Values::Double(_) | Values::Boolean(_) => {
                ColumnEncodingKind::Direct
            }
            Values::Dictionary(_) => ColumnEncodingKind::DictionaryV2,
            _ => ColumnEncodingKind::DirectV2,
        }
    }

    fn statistics(&self, rows: Range<usize>) -> ColumnStatistics {
        let non_null = rows.clone().filter(|row| !self.is_null(*row)).count();
        let mut statistics = ColumnStatistics {
            number_of_values: Some(non_null as u64),
            has_null: Some(non_null < rows.len()),
            ..Default::default()
        };
        match self {
            Values::Byte(v) => {
                let present = v[rows].iter().flatten().map(|x| *x as i64).collect::<Vec<_>>();
                statistics.int_statistics = integer_statistics(&present);
            }
            Values::Short(v) | Values::Int(v) | Values::Long(v) => {
                let present = v[rows].iter().flatten().copied().collect::<Vec<_>>();
                statistics.int_statistics = integer_statistics(&present);
            }
            Values::Float(v) => {
                let present = v[rows].iter().flatten().map(|x| *x as f64).collect::<Vec<_>>();
                statistics.double_statistics = double_statistics(&present);
            }
            Values::Date(v) => {
                let days = v[rows]
                    .iter()
                    .flatten()
                    .map(|x| days_since_epoch(*x) as i32)
                    .collect::<Vec<_>>();
                if let (Some(min), Some(max)) = (days.iter().min(), days.iter().max()) {
                    statistics.date_statistics = Some(DateStatistics {
                        minimum: Some(*min),
                        maximum: Some(*max),
                    });
                }
            }
            Values::Binary(v) => {
                statistics.binary_statistics = Some(BinaryStatistics {
                    sum: Some(v[rows].iter().flatten().map(|x| x.len() as i64).sum()),
                });
            }
            Values::Double(v) => {
                let present = v[rows].iter().flatten().copied().collect::<Vec<_>>();
                statistics.double_statistics = double_statistics(&present);
            }
            Values::Boolean(v) => {
                let trues = v[rows].iter().flatten().filter(|x| **x).count();
                statistics.bucket_statistics = Some(BucketStatistics {
                    count: vec![trues as u64],
                });
            }
            Values::String(v) | Values::Dictionary(v) => {
                let present = v[rows].iter().flatten().collect::<Vec<_>>();
                if let (Some(min), Some(max)) = (present.iter().min(), present.iter().max()) {
                    statistics.string_statistics = Some(StringStatistics {
                        minimum: Some(min.to_string()),
                        maximum: Some(max.to_string()),
                        sum: Some(present.iter().map(|x| x.len() as i64).sum()),
                    });
                }
            }
            Values::Decimal { scale, values, .. } => {
                let present = values[rows]
                    .iter()
                    .flatten()
                    .map(|x| Decimal::new(*x, *scale as i32))
                    .collect::<Vec<_>>();
                if let (Some(min), Some(max)) = (present.iter().min(), present.iter().max()) {
                    statistics.decimal_statistics = Some(DecimalStatistics {
                        minimum: Some(min.to_string()),
                        maximum: Some(max.to_string()),
                        sum: None,
                    });
                }
            }
            Values::Timestamp(v) => {
                let millis = v[rows]
                    .iter()
                    .flatten()
                    .map(|x| x.and_utc().timestamp_millis())
                    .collect::<Vec<_>>();
                if let (Some(min), Some(max)) = (millis.iter().min(), millis.iter().max()) {
                    statistics.timestamp_statistics = Some(TimestampStatistics {
                        minimum: Some(*min),
                        maximum: Some(*max),
                        minimum_utc: Some(*min),
                        maximum_utc: Some(*max),
                        ..Default::default()
                    });
                }
            }
        }
        statistics
    }
}

fn integer_statistics(present: &[i64]) -> Option<IntegerStatistics> {
    let (min, max) = (present.iter().min()?, present.iter().max()?);
    Some(IntegerStatistics {
        minimum: Some(*min),
        maximum: Some(*max),
        sum: present.iter().try_fold(0i64, |acc, x| acc.checked_add(*x)),
    })
}

fn double_statistics(present: &[f64]) -> Option<DoubleStatistics> {
    if present.is_empty() {
        return None;
    }
    Some(DoubleStatistics {
        minimum: Some(present.iter().copied().fold(f64::INFINITY, f64::min)),
        maximum: Some(present.iter().copied().fold(f64::NEG_INFINITY, f64::max)),
        sum: Some(present.iter().sum()),
    })
}

pub fn days_since_epoch(date: NaiveDate) -> i64 {
    date.signed_duration_since(NaiveDate::default()).num_days()
}

pub fn zigzag(x: i64) -> u64 {
    ((x << 1) ^ (x >> 63)) as u64
}

fn zigzag_i128(x: i128) -> u128 {
    ((x << 1) ^ (x >> 127)) as u128
}

fn width_and_code(max: u64) -> (u32, u8) {
    let bits = (64 - max.leading_zeros()).max(1);
    match bits {
        1..=24 => (bits, (bits - 1) as u8),
        25..=26 => (26, 24),
        27..=28 => (28, 25),
        29..=30 => (30, 26),
        31..=32 => (32, 27),
        33..=40 => (40, 28),
        41..=48 => (48, 29),
        49..=56 => (56, 30),
        _ => (64, 31),
    }
}

/// Encodes `values` as Direct runs of integer RLE v2.
pub fn encode_rle_v2(values: &[u64]) -> Vec<u8> {
    let mut out = vec![];
    for chunk in values.chunks(512) {
        let max = chunk.iter().copied().max().unwrap_or(0);
        let (width, code) = width_and_code(max);
        let length = chunk.len() - 1;
        out.push(0b0100_0000 | code << 1 | (length >> 8) as u8);
        out.push(length as u8);
        let mut bytes = vec![0u8; (chunk.len() * width as usize + 7) / 8];
        let mut bit = 0;
        for value in chunk {
            for i in (0..width).rev() {
                if (value >> i) & 1 == 1 {
                    bytes[bit / 8] |= 0x80 >> (bit % 8);
                }
                bit += 1;
            }
        }
        out.extend(bytes);
    }
    out
}

pub fn encode_byte_rle(bytes: &[u8]) -> Vec<u8> {
    encode_byte_runs(bytes).0
}

/// Encodes `bytes` with byte RLE, also returning the (first value, header offset) of
/// every run.
pub fn encode_byte_runs(bytes: &[u8]) -> (Vec<u8>, Vec<(usize, usize)>) {
    let mut out = vec![];
    let mut runs = vec![];
    let mut i = 0;
    while i < bytes.len() {
        runs.push((i, out.len()));
        let mut run = 1;
        while i + run < bytes.len() && bytes[i + run] == bytes[i] && run < 130 {
            run += 1;
        }
        if run >= 3 {
            out.push((run - 3) as u8);
            out.push(bytes[i]);
            i += run;
            continue;
        }
        let start = i;
        while i < bytes.len() && i - start < 128 {
            if i + 2 < bytes.len() && bytes[i] == bytes[i + 1] && bytes[i] == bytes[i + 2] {
                break;
            }
            i += 1;
        }
        out.push((-((i - start) as i32)) as i8 as u8);
        out.extend_from_slice(&bytes[start..i]);
    }
    (out, runs)
}

pub fn encode_booleans(bits: &[bool]) -> Vec<u8> {
    let bytes = bits
        .chunks(8)
        .map(|chunk| {
            chunk
                .iter()
                .enumerate()
                .filter(|(_, bit)| **bit)
                .fold(0u8, |acc, (i, _)| acc | 0x80 >> i)
        })
        .collect::<Vec<_>>();
    encode_byte_rle(&bytes)
}

fn encode_varint(value: i128, out: &mut Vec<u8>) {
    let mut value = zigzag_i128(value);
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

pub fn encode_nanos(nanos: u32) -> u64 {
    if nanos == 0 {
        return 0;
    }
    if nanos % 100 != 0 {
        return (nanos as u64) << 3;
    }
    let mut nanos = nanos / 100;
    let mut zeros = 1;
    while nanos % 10 == 0 && zeros < 7 {
        nanos /= 10;
        zeros += 1;
    }
    (nanos as u64) << 3 | zeros
}

pub fn deflate(data: &[u8]) -> Vec<u8> {
    let mut encoder = DeflateEncoder::new(vec![], Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Splits a stream in compressed blocks of `block_size` uncompressed bytes.
struct StreamWriter {
    compression: CompressionKind,
    block_size: usize,
    output: Vec<u8>,
    pending: Vec<u8>,
    /// Compressed offset of every flushed block.
    blocks: Vec<u64>,
}

impl StreamWriter {
    fn new(compression: CompressionKind, block_size: usize) -> Self {
        Self {
            compression,
            block_size,
            output: vec![],
            pending: vec![],
            blocks: vec![],
        }
    }

    /// The position of the byte at `offset` of the uncompressed stream. Only valid
    /// once the block holding it was flushed.
    fn position_of(&self, offset: usize) -> Vec<u64> {
        match self.compression {
            CompressionKind::None => vec![offset as u64],
            _ => vec![
                self.blocks[offset / self.block_size],
                (offset % self.block_size) as u64,
            ],
        }
    }

    fn position(&self) -> Vec<u64> {
        match self.compression {
            CompressionKind::None => vec![self.pending.len() as u64],
            _ => vec![self.output.len() as u64, self.pending.len() as u64],
        }
    }

    fn write(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
        if self.compression == CompressionKind::None {
            return;
        }
        while self.pending.len() >= self.block_size {
            let block = self.pending.drain(..self.block_size).collect::<Vec<_>>();
            self.flush(&block);
        }
    }

    fn flush(&mut self, block: &[u8]) {
        let compressed = deflate(block);
        let (payload, original) = if compressed.len() < block.len() {
            (compressed, false)
        } else {
            (block.to_vec(), true)
        };
        self.blocks.push(self.output.len() as u64);
        let header = (payload.len() as u32) << 1 | original as u32;
        self.output.extend_from_slice(&header.to_le_bytes()[..3]);
        self.output.extend(payload);
    }

    fn flush_pending(&mut self) {
        if self.compression != CompressionKind::None && !self.pending.is_empty() {
            let block = std::mem::take(&mut self.pending);
            self.flush(&block);
        }
    }

    fn finish(mut self) -> Vec<u8> {
        if self.compression == CompressionKind::None {
            return self.pending;
        }
        self.flush_pending();
        self.output
    }
}

struct ColumnStreams {
    present: StreamWriter,
    data: StreamWriter,
    secondary: StreamWriter,
    length: StreamWriter,
}

/// Encodes the rows of one row group, returning its positions.
fn encode_row_group(
    values: &Values,
    rows: Range<usize>,
    has_present: bool,
    streams: &mut ColumnStreams,
    dictionary: &HashMap<String, u64>,
    byte_positions: Option<&[u64]>,
) -> Vec<u64> {
    let mut positions = vec![];
    if has_present {
        positions.extend(streams.present.position());
        positions.extend([0, 0]);
        let bits = rows.clone().map(|row| !values.is_null(row)).collect::<Vec<_>>();
        streams.present.write(&encode_booleans(&bits));
    }
    match values {
        // written for the whole stripe by `FileBuilder::encode_bytes`
        Values::Byte(_) => positions.extend(byte_positions.unwrap_or_default()),
        Values::Short(v) | Values::Int(v) | Values::Long(v) => {
            positions.extend(streams.data.position());
            positions.push(0);
            let encoded = v[rows].iter().flatten().map(|x| zigzag(*x)).collect::<Vec<_>>();
            streams.data.write(&encode_rle_v2(&encoded));
        }
        Values::Date(v) => {
            positions.extend(streams.data.position());
            positions.push(0);
            let encoded = v[rows]
                .iter()
                .flatten()
                .map(|x| zigzag(days_since_epoch(*x)))
                .collect::<Vec<_>>();
            streams.data.write(&encode_rle_v2(&encoded));
        }
        Values::Float(v) => {
            positions.extend(streams.data.position());
            let bytes = v[rows]
                .iter()
                .flatten()
                .flat_map(|x| x.to_le_bytes())
                .collect::<Vec<_>>();
            streams.data.write(&bytes);
        }
        Values::Binary(v) => {
            positions.extend(streams.data.position());
            positions.extend(streams.length.position());
            positions.push(0);
            let present = v[rows].iter().flatten().collect::<Vec<_>>();
            let bytes = present.iter().flat_map(|x| x.iter().copied()).collect::<Vec<_>>();
            let lengths = present.iter().map(|x| x.len() as u64).collect::<Vec<_>>();
            streams.data.write(&bytes);
            streams.length.write(&encode_rle_v2(&lengths));
        }
        Values::Double(v) => {
            positions.extend(streams.data.position());
            let bytes = v[rows]
                .iter()
                .flatten()
                .flat_map(|x| x.to_le_bytes())
                .collect::<Vec<_>>();
            streams.data.write(&bytes);
        }
        Values::Boolean(v) => {
            positions.extend(streams.data.position());
            positions.extend([0, 0]);
            let bits = v[rows].iter().flatten().copied().collect::<Vec<_>>();
            streams.data.write(&encode_booleans(&bits));
        }
        Values::String(v) => {
            positions.extend(streams.data.position());
            positions.extend(streams.length.position());
            positions.push(0);
            let present = v[rows].iter().flatten().collect::<Vec<_>>();
            let bytes = present.iter().flat_map(|x| x.bytes()).collect::<Vec<_>>();
            let lengths = present.iter().map(|x| x.len() as u64).collect::<Vec<_>>();
            streams.data.write(&bytes);
            streams.length.write(&encode_rle_v2(&lengths));
        }
        Values::Dictionary(v) => {
            positions.extend(streams.data.position());
            positions.push(0);
            let indexes = v[rows]
                .iter()
                .flatten()
                .map(|x| dictionary[x])
                .collect::<Vec<_>>();
            streams.data.write(&encode_rle_v2(&indexes));
        }
        Values::Decimal { scale, values, .. } => {
            positions.extend(streams.data.position());
            positions.extend(streams.secondary.position());
            positions.push(0);
            let mut bytes = vec![];
            let mut scales = vec![];
            for mantissa in values[rows].iter().flatten() {
                encode_varint(*mantissa, &mut bytes);
                scales.push(zigzag(*scale as i64));
            }
            streams.data.write(&bytes);
            streams.secondary.write(&encode_rle_v2(&scales));
        }
        Values::Timestamp(v) => {
            positions.extend(streams.data.position());
            positions.push(0);
            positions.extend(streams.secondary.position());
            positions.push(0);
            let present = v[rows].iter().flatten().collect::<Vec<_>>();
            let seconds = present
                .iter()
                .map(|x| zigzag(x.and_utc().timestamp() - TIMESTAMP_BASE_SECONDS))
                .collect::<Vec<_>>();
            let nanos = present
                .iter()
                .map(|x| encode_nanos(x.nanosecond()))
                .collect::<Vec<_>>();
            streams.data.write(&encode_rle_v2(&seconds));
            streams.secondary.write(&encode_rle_v2(&nanos));
        }
    }
    positions
}

/// The encoded streams of one column in one stripe.
struct EncodedColumn {
    row_index: RowIndex,
    streams: Vec<(Kind, Vec<u8>)>,
    encoding: ColumnEncoding,
}

#[derive(Debug, Clone)]
pub struct FileBuilder {
    compression: CompressionKind,
    block_size: usize,
    stride: usize,
    stripe_rows: usize,
    columns: Vec<(String, Values)>,
}

impl FileBuilder {
    pub fn new(stride: usize) -> Self {
        assert_eq!(stride % 8, 0);
        Self {
            compression: CompressionKind::Zlib,
            block_size: 1024,
            stride,
            stripe_rows: usize::MAX,
            columns: vec![],
        }
    }

    pub fn compression(mut self, compression: CompressionKind) -> Self {
        self.compression = compression;
        self
    }

    pub fn block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    /// Rows of every stripe but the last; must be a multiple of the stride.
    pub fn stripe_rows(mut self, stripe_rows: usize) -> Self {
        assert_eq!(stripe_rows % self.stride, 0);
        self.stripe_rows = stripe_rows;
        self
    }

    pub fn column(mut self, name: &str, values: Values) -> Self {
        self.columns.push((name.to_string(), values));
        self
    }

    fn compress(&self, bytes: &[u8]) -> Vec<u8> {
        let mut writer = StreamWriter::new(self.compression, self.block_size);
        writer.write(bytes);
        writer.finish()
    }

    fn stream_writer(&self) -> StreamWriter {
        StreamWriter::new(self.compression, self.block_size)
    }

    fn encode_column(&self, values: &Values, rows: Range<usize>) -> EncodedColumn {
        let has_present = rows.clone().any(|row| values.is_null(row));

        let mut dictionary = HashMap::new();
        let mut dictionary_streams = vec![];
        if let Values::Dictionary(v) = values {
            let unique = v[rows.clone()].iter().flatten().collect::<BTreeSet<_>>();
            let lengths = unique.iter().map(|x| x.len() as u64).collect::<Vec<_>>();
            let bytes = unique.iter().flat_map(|x| x.bytes()).collect::<Vec<_>>();
            dictionary_streams.push((Kind::Length, self.compress(&encode_rle_v2(&lengths))));
            dictionary_streams.push((Kind::DictionaryData, self.compress(&bytes)));
            dictionary = unique
                .into_iter()
                .enumerate()
                .map(|(i, x)| (x.clone(), i as u64))
                .collect();
        }

        let mut streams = ColumnStreams {
            present: self.stream_writer(),
            data: self.stream_writer(),
            secondary: self.stream_writer(),
            length: self.stream_writer(),
        };
        let byte_positions = match values {
            Values::Byte(v) => self.encode_bytes(&v[rows.clone()], &mut streams.data),
            _ => vec![],
        };

        let mut entries = vec![];
        let mut start = rows.start;
        while start < rows.end {
            let end = (start + self.stride).min(rows.end);
            let positions = encode_row_group(
                values,
                start..end,
                has_present,
                &mut streams,
                &dictionary,
                byte_positions.get(entries.len()).map(Vec::as_slice),
            );
            entries.push(RowIndexEntry {
                positions,
                statistics: Some(values.statistics(start..end)),
            });
            start = end;
        }

        let mut encoded = vec![];
        if has_present {
            encoded.push((Kind::Present, streams.present.finish()));
        }
        encoded.push((Kind::Data, streams.data.finish()));
        match values {
            Values::String(_) | Values::Binary(_) => {
                encoded.push((Kind::Length, streams.length.finish()))
            }
            Values::Dictionary(_) => encoded.extend(dictionary_streams),
            Values::Decimal { .. } | Values::Timestamp(_) => {
                encoded.push((Kind::Secondary, streams.secondary.finish()))
            }
            _ => {}
        }

        EncodedColumn {
            row_index: RowIndex { entry: entries },
            streams: encoded,
            encoding: ColumnEncoding {
                kind: Some(values.encoding() as i32),
                dictionary_size: match values {
                    Values::Dictionary(_) => Some(dictionary.len() as u32),
                    _ => None,
                },
            },
        }
    }

    /// Writes the non-null bytes of a stripe as one byte RLE stream and returns the
    /// Data positions of every row group: the run holding its first value and the
    /// values of that run to skip.
    fn encode_bytes(&self, values: &[Option<i8>], data: &mut StreamWriter) -> Vec<Vec<u64>> {
        let bytes = values.iter().flatten().map(|x| *x as u8).collect::<Vec<_>>();
        let (encoded, runs) = encode_byte_runs(&bytes);
        data.write(&encoded);
        data.flush_pending();

        let mut positions = vec![];
        let mut first = 0;
        for chunk in values.chunks(self.stride) {
            let (mut position, skip) =
                match runs.iter().rev().find(|(start, _)| *start <= first) {
                    Some((start, offset)) if first < bytes.len() => {
                        (data.position_of(*offset), (first - start) as u64)
                    }
                    _ => (data.position(), 0),
                };
            position.push(skip);
            positions.push(position);
            first += chunk.iter().flatten().count();
        }
        positions
    }

    fn statistics(&self, rows: Range<usize>) -> Vec<ColumnStatistics> {
        let mut statistics = vec![ColumnStatistics {
            number_of_values: Some(rows.len() as u64),
            ..Default::default()
        }];
        statistics.extend(
            self.columns
                .iter()
                .map(|(_, values)| values.statistics(rows.clone())),
        );
        statistics
    }

    pub fn build(self) -> Vec<u8> {
        let rows = self.columns.first().map(|(_, v)| v.len()).unwrap_or(0);
        assert!(self.columns.iter().all(|(_, v)| v.len() == rows));

        let mut file = b"ORC".to_vec();
        let mut stripes = vec![];
        let mut stripe_stats = vec![];
        let mut start = 0;
        while start < rows {
            let end = start.saturating_add(self.stripe_rows).min(rows);
            let offset = file.len() as u64;

            let mut index_streams = vec![];
            let mut data_streams = vec![];
            let mut index_bytes = vec![];
            let mut data_bytes = vec![];
            let mut encodings = vec![ColumnEncoding {
                kind: Some(ColumnEncodingKind::Direct as i32),
                dictionary_size: None,
            }];
            for (i, (_, values)) in self.columns.iter().enumerate() {
                let column = i as u32 + 1;
                let encoded = self.encode_column(values, start..end);
                let row_index = self.compress(&encoded.row_index.encode_to_vec());
                index_streams.push(Stream {
                    kind: Some(Kind::RowIndex as i32),
                    column: Some(column),
                    length: Some(row_index.len() as u64),
                });
                index_bytes.extend(row_index);
                for (kind, bytes) in encoded.streams {
                    data_streams.push(Stream {
                        kind: Some(kind as i32),
                        column: Some(column),
                        length: Some(bytes.len() as u64),
                    });
                    data_bytes.extend(bytes);
                }
                encodings.push(encoded.encoding);
            }
            let footer = StripeFooter {
                streams: index_streams.into_iter().chain(data_streams).collect(),
                columns: encodings,
                writer_timezone: Some("UTC".to_string()),
            };
            let footer = self.compress(&footer.encode_to_vec());

            stripes.push(StripeInformation {
                offset: Some(offset),
                index_length: Some(index_bytes.len() as u64),
                data_length: Some(data_bytes.len() as u64),
                footer_length: Some(footer.len() as u64),
                number_of_rows: Some((end - start) as u64),
            });
            stripe_stats.push(StripeStatistics {
                col_stats: self.statistics(start..end),
            });
            file.extend(index_bytes);
            file.extend(data_bytes);
            file.extend(footer);
            start = end;
        }

        let mut types = vec![Type {
            kind: Some(TypeKind::Struct as i32),
            subtypes: (1..=self.columns.len() as u32).collect(),
            field_names: self.columns.iter().map(|(name, _)| name.clone()).collect(),
            ..Default::default()
        }];
        types.extend(self.columns.iter().map(|(_, values)| values.type_()));

        let metadata = self.compress(&Metadata { stripe_stats }.encode_to_vec());
        let footer = Footer {
            header_length: Some(3),
            content_length: Some(file.len() as u64 - 3),
            stripes,
            types,
            metadata: vec![],
            number_of_rows: Some(rows as u64),
            statistics: self.statistics(0..rows),
            row_index_stride: Some(self.stride as u32),
        };
        let footer = self.compress(&footer.encode_to_vec());
        let postscript = PostScript {
            footer_length: Some(footer.len() as u64),
            compression: Some(self.compression as i32),
            compression_block_size: match self.compression {
                CompressionKind::None => None,
                _ => Some(self.block_size as u64),
            },
            version: vec![0, 12],
            metadata_length: Some(metadata.len() as u64),
            writer_version: Some(1),
            magic: Some("ORC".to_string()),
        }
        .encode_to_vec();

        file.extend(metadata);
        file.extend(footer);
        file.extend(&postscript);
        file.push(postscript.len() as u8);
        file
    }
}
