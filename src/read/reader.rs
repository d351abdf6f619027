use std::collections::{hash_map::Entry, HashMap};
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

use futures::future::{try_join_all, BoxFuture};
use log::{debug, trace};
use parking_lot::Mutex;
use prost::Message;

use crate::{
    error::{Error, Result},
    proto::{
        column_encoding::Kind as ColumnEncodingKind, stream::Kind, CompressionKind, RowIndex,
        StripeFooter, StripeInformation,
    },
};

use super::{
    column::{
        BinaryColumnBuffer, BooleanColumnBuffer, ByteColumnBuffer, ColumnBuffer, ColumnDecoder,
        DateColumnBuffer, DecimalColumnBuffer, DoubleColumnBuffer, DoubleNanColumnBuffer,
        FloatColumnBuffer, IntegerColumnBuffer, OrcColumn, RowGroupPlan, StringColumnBuffer,
        StringDictionary, TimestampColumnBuffer,
    },
    decompress::maybe_decompress,
    filter::FilterValues,
    read_tail, read_tail_async,
    row_index::{ColumnDataStreams, PositionResolver, RowGroupIndex},
    stripe::{StreamDetail, StripeStreams},
    ByteRangeProvider, FileTail, ReaderOptions,
};

type Cache<K, V> = Mutex<HashMap<K, Arc<V>>>;

fn cached<K: Eq + Hash, V>(cache: &Cache<K, V>, key: &K) -> Option<Arc<V>> {
    cache.lock().get(key).cloned()
}

/// Inserts `value` unless another caller populated `key` first, in which case the
/// existing value wins.
fn insert_if_absent<K: Eq + Hash + Debug, V>(cache: &Cache<K, V>, key: K, value: V) -> Arc<V> {
    match cache.lock().entry(key) {
        Entry::Occupied(entry) => {
            trace!("{:?} was cached concurrently", entry.key());
            entry.get().clone()
        }
        Entry::Vacant(entry) => entry.insert(Arc::new(value)).clone(),
    }
}

/// Lists the primitive children of the root struct.
fn discover_columns(tail: &FileTail) -> Vec<OrcColumn> {
    let types = tail.types();
    let root = match types.first() {
        Some(root) => root,
        None => return vec![],
    };
    root.subtypes
        .iter()
        .zip(root.field_names.iter())
        .filter_map(|(id, name)| {
            let type_ = types.get(*id as usize)?;
            let column = OrcColumn::new(*id, name.clone(), type_.kind());
            Some(column.with_decimal(type_.precision, type_.scale))
        })
        .collect()
}

/// A reader of the row groups of an ORC file.
///
/// The stripe footers, row indexes and string dictionaries it reads are cached and
/// shared by every load; the reader can be used from several tasks at once.
pub struct Reader<P: ByteRangeProvider> {
    provider: P,
    options: ReaderOptions,
    tail: FileTail,
    columns: Vec<OrcColumn>,
    block_capacity: usize,
    stripes: Cache<usize, StripeStreams>,
    row_indexes: Cache<(usize, u32), RowGroupIndex>,
    dictionaries: Cache<(usize, u32), StringDictionary>,
}

impl<P: ByteRangeProvider> std::fmt::Debug for Reader<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reader")
            .field("options", &self.options)
            .field("compression", &self.compression())
            .field("stripes", &self.number_of_stripes())
            .field("columns", &self.columns)
            .finish()
    }
}

impl<P: ByteRangeProvider> Reader<P> {
    /// Reads the tail of the file behind `provider`.
    pub fn open(provider: P, options: ReaderOptions) -> Result<Self> {
        let tail = read_tail(&provider, &options)?;
        Ok(Self::from_tail(provider, options, tail))
    }

    /// Async version of [`Reader::open`].
    pub async fn open_async(provider: P, options: ReaderOptions) -> Result<Self> {
        let tail = read_tail_async(&provider, &options).await?;
        Ok(Self::from_tail(provider, options, tail))
    }

    fn from_tail(provider: P, options: ReaderOptions, tail: FileTail) -> Self {
        let block_capacity = options
            .block_capacity
            .unwrap_or_else(|| tail.compression_block_size());
        let columns = discover_columns(&tail);
        debug!(
            "opened a file of {} bytes: {} stripes, {} rows, {:?} compression",
            tail.file_length,
            tail.stripes().len(),
            tail.number_of_rows(),
            tail.compression()
        );
        Self {
            provider,
            options,
            tail,
            columns,
            block_capacity,
            stripes: Default::default(),
            row_indexes: Default::default(),
            dictionaries: Default::default(),
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn options(&self) -> &ReaderOptions {
        &self.options
    }

    pub fn tail(&self) -> &FileTail {
        &self.tail
    }

    pub fn compression(&self) -> CompressionKind {
        self.tail.compression()
    }

    pub fn row_index_stride(&self) -> usize {
        self.tail.row_index_stride()
    }

    pub fn number_of_stripes(&self) -> usize {
        self.tail.stripes().len()
    }

    fn stripe_information(&self, stripe: usize) -> Result<&StripeInformation> {
        self.tail
            .stripes()
            .get(stripe)
            .ok_or(Error::StripeOutOfRange(stripe))
    }

    pub fn number_of_row_groups(&self, stripe: usize) -> Result<usize> {
        let rows = self.stripe_information(stripe)?.number_of_rows() as usize;
        let stride = self.row_index_stride();
        Ok((rows + stride - 1) / stride)
    }

    /// The primitive columns of the file.
    pub fn columns(&self) -> &[OrcColumn] {
        &self.columns
    }

    pub fn get_column(&self, name: &str) -> Result<OrcColumn> {
        self.columns
            .iter()
            .find(|column| column.name == name)
            .cloned()
            .ok_or_else(|| Error::UnknownColumn(name.to_string()))
    }

    /// Creates a buffer decoding `column` with `D`, sized to the row group stride.
    pub fn create_column_buffer<D: ColumnDecoder>(
        &self,
        column: &OrcColumn,
    ) -> Result<ColumnBuffer<D>> {
        ColumnBuffer::try_new(column.clone(), self.row_index_stride())
    }

    pub fn create_boolean_column_buffer(&self, column: &OrcColumn) -> Result<BooleanColumnBuffer> {
        self.create_column_buffer(column)
    }

    pub fn create_byte_column_buffer(&self, column: &OrcColumn) -> Result<ByteColumnBuffer> {
        self.create_column_buffer(column)
    }

    /// A buffer of a short, int or long column.
    pub fn create_integer_column_buffer(&self, column: &OrcColumn) -> Result<IntegerColumnBuffer> {
        self.create_column_buffer(column)
    }

    pub fn create_float_column_buffer(&self, column: &OrcColumn) -> Result<FloatColumnBuffer> {
        self.create_column_buffer(column)
    }

    pub fn create_double_column_buffer(&self, column: &OrcColumn) -> Result<DoubleColumnBuffer> {
        self.create_column_buffer(column)
    }

    /// A buffer of a double column whose nulls are `NaN`.
    pub fn create_double_nan_column_buffer(
        &self,
        column: &OrcColumn,
    ) -> Result<DoubleNanColumnBuffer> {
        self.create_column_buffer(column)
    }

    pub fn create_date_column_buffer(&self, column: &OrcColumn) -> Result<DateColumnBuffer> {
        self.create_column_buffer(column)
    }

    pub fn create_timestamp_column_buffer(
        &self,
        column: &OrcColumn,
    ) -> Result<TimestampColumnBuffer> {
        self.create_column_buffer(column)
    }

    pub fn create_decimal_column_buffer(&self, column: &OrcColumn) -> Result<DecimalColumnBuffer> {
        self.create_column_buffer(column)
    }

    pub fn create_binary_column_buffer(&self, column: &OrcColumn) -> Result<BinaryColumnBuffer> {
        self.create_column_buffer(column)
    }

    /// A buffer of a string, varchar or char column.
    pub fn create_string_column_buffer(&self, column: &OrcColumn) -> Result<StringColumnBuffer> {
        self.create_column_buffer(column)
    }

    fn decompress(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        maybe_decompress(bytes, self.compression(), self.block_capacity)
    }

    /// The (offset, length) of the footer of `stripe`.
    fn stripe_footer_range(&self, stripe: usize) -> Result<(u64, usize)> {
        let information = self.stripe_information(stripe)?;
        let offset =
            information.offset() + information.index_length() + information.data_length();
        Ok((offset, information.footer_length() as usize))
    }

    fn decode_stripe_streams(&self, stripe: usize, footer: &[u8]) -> Result<StripeStreams> {
        let footer = StripeFooter::decode(self.decompress(footer)?.as_slice())?;
        let streams = StripeStreams::try_new(stripe, self.stripe_information(stripe)?, &footer)?;
        debug!(
            "cataloged {} streams of stripe {stripe}",
            streams.streams().len()
        );
        Ok(streams)
    }

    /// The streams of `stripe`, read from its footer on first use.
    pub fn stripe_streams(&self, stripe: usize) -> Result<Arc<StripeStreams>> {
        if let Some(streams) = cached(&self.stripes, &stripe) {
            return Ok(streams);
        }
        let (offset, length) = self.stripe_footer_range(stripe)?;
        let mut footer = vec![0; length];
        self.provider.get_range(&mut footer, offset)?;
        let streams = self.decode_stripe_streams(stripe, &footer)?;
        Ok(insert_if_absent(&self.stripes, stripe, streams))
    }

    /// Async version of [`Reader::stripe_streams`].
    pub async fn stripe_streams_async(&self, stripe: usize) -> Result<Arc<StripeStreams>> {
        if let Some(streams) = cached(&self.stripes, &stripe) {
            return Ok(streams);
        }
        let (offset, length) = self.stripe_footer_range(stripe)?;
        let mut footer = vec![0; length];
        self.provider.get_range_async(&mut footer, offset).await?;
        let streams = self.decode_stripe_streams(stripe, &footer)?;
        Ok(insert_if_absent(&self.stripes, stripe, streams))
    }

    fn decode_row_index(&self, stripe: usize, column: u32, bytes: &[u8]) -> Result<RowGroupIndex> {
        let index = RowIndex::decode(self.decompress(bytes)?.as_slice())?;
        debug!(
            "read {} row index entries of column {column} in stripe {stripe}",
            index.entry.len()
        );
        Ok(RowGroupIndex::new(stripe, column, index))
    }

    /// The row index of `column` in `stripe`, read on first use.
    pub fn row_index(&self, stripe: usize, column: u32) -> Result<Arc<RowGroupIndex>> {
        let key = (stripe, column);
        if let Some(index) = cached(&self.row_indexes, &key) {
            return Ok(index);
        }
        let streams = self.stripe_streams(stripe)?;
        let detail = streams.require(column, Kind::RowIndex)?;
        let mut bytes = vec![0; detail.length as usize];
        self.provider.get_range(&mut bytes, detail.offset)?;
        let index = self.decode_row_index(stripe, column, &bytes)?;
        Ok(insert_if_absent(&self.row_indexes, key, index))
    }

    /// Async version of [`Reader::row_index`].
    pub async fn row_index_async(&self, stripe: usize, column: u32) -> Result<Arc<RowGroupIndex>> {
        let key = (stripe, column);
        if let Some(index) = cached(&self.row_indexes, &key) {
            return Ok(index);
        }
        let streams = self.stripe_streams_async(stripe).await?;
        let detail = *streams.require(column, Kind::RowIndex)?;
        let mut bytes = vec![0; detail.length as usize];
        self.provider.get_range_async(&mut bytes, detail.offset).await?;
        let index = self.decode_row_index(stripe, column, &bytes)?;
        Ok(insert_if_absent(&self.row_indexes, key, index))
    }

    /// The Length and DictionaryData streams of a dictionary, and its size.
    fn dictionary_streams(
        streams: &StripeStreams,
        column: u32,
    ) -> Result<(StreamDetail, StreamDetail, usize)> {
        let size = streams.dictionary_size(column).ok_or_else(|| {
            Error::oos(format!(
                "column {column} of stripe {} has no dictionary size",
                streams.stripe()
            ))
        })?;
        let lengths = *streams.require(column, Kind::Length)?;
        let data = *streams.require(column, Kind::DictionaryData)?;
        Ok((lengths, data, size))
    }

    fn decode_dictionary(&self, lengths: &[u8], data: &[u8], size: usize) -> Result<StringDictionary> {
        StringDictionary::try_new(&self.decompress(lengths)?, &self.decompress(data)?, size)
    }

    /// The dictionary of the dictionary encoded string `column` in `stripe`, read on
    /// first use.
    pub fn dictionary(&self, stripe: usize, column: u32) -> Result<Arc<StringDictionary>> {
        let key = (stripe, column);
        if let Some(dictionary) = cached(&self.dictionaries, &key) {
            return Ok(dictionary);
        }
        let streams = self.stripe_streams(stripe)?;
        let (lengths, data, size) = Self::dictionary_streams(&streams, column)?;
        let mut length_bytes = vec![0; lengths.length as usize];
        self.provider.get_range(&mut length_bytes, lengths.offset)?;
        let mut data_bytes = vec![0; data.length as usize];
        self.provider.get_range(&mut data_bytes, data.offset)?;
        let dictionary = self.decode_dictionary(&length_bytes, &data_bytes, size)?;
        debug!("read a dictionary of {size} entries of column {column} in stripe {stripe}");
        Ok(insert_if_absent(&self.dictionaries, key, dictionary))
    }

    /// Async version of [`Reader::dictionary`].
    pub async fn dictionary_async(
        &self,
        stripe: usize,
        column: u32,
    ) -> Result<Arc<StringDictionary>> {
        let key = (stripe, column);
        if let Some(dictionary) = cached(&self.dictionaries, &key) {
            return Ok(dictionary);
        }
        let streams = self.stripe_streams_async(stripe).await?;
        let (lengths, data, size) = Self::dictionary_streams(&streams, column)?;
        let mut length_bytes = vec![0; lengths.length as usize];
        self.provider
            .get_range_async(&mut length_bytes, lengths.offset)
            .await?;
        let mut data_bytes = vec![0; data.length as usize];
        self.provider
            .get_range_async(&mut data_bytes, data.offset)
            .await?;
        let dictionary = self.decode_dictionary(&length_bytes, &data_bytes, size)?;
        debug!("read a dictionary of {size} entries of column {column} in stripe {stripe}");
        Ok(insert_if_absent(&self.dictionaries, key, dictionary))
    }

    fn build_plan(
        &self,
        row_group: usize,
        column: &OrcColumn,
        streams: &StripeStreams,
        index: &RowGroupIndex,
        dictionary: Option<Arc<StringDictionary>>,
    ) -> Result<RowGroupPlan> {
        let stripe = streams.stripe();
        let stride = self.row_index_stride();
        let first_row = row_group.saturating_mul(stride);
        if first_row >= streams.number_of_rows() {
            return Err(Error::RowGroupOutOfRange { stripe, row_group });
        }
        let rows = (streams.number_of_rows() - first_row).min(stride);

        let encoding = streams.encoding(column.id)?;
        let resolver = PositionResolver::try_new(
            column.kind,
            encoding,
            streams.get(column.id, Kind::Present).is_some(),
            self.compression() != CompressionKind::None,
        )?;
        let data_streams = ColumnDataStreams::try_new(streams, index, &resolver, row_group)?;
        Ok(RowGroupPlan {
            stripe,
            row_group,
            rows,
            encoding,
            streams: data_streams,
            dictionary,
            compression: self.compression(),
            block_capacity: self.block_capacity,
            memoize_present: self.options.memoize_present,
        })
    }

    fn plan(&self, stripe: usize, row_group: usize, column: &OrcColumn) -> Result<RowGroupPlan> {
        let streams = self.stripe_streams(stripe)?;
        let index = self.row_index(stripe, column.id)?;
        let dictionary = match streams.encoding(column.id)? {
            ColumnEncodingKind::DictionaryV2 => {
                Some(self.dictionary(stripe, column.id)?)
            }
            _ => None,
        };
        self.build_plan(row_group, column, &streams, &index, dictionary)
    }

    async fn plan_async(
        &self,
        stripe: usize,
        row_group: usize,
        column: &OrcColumn,
    ) -> Result<RowGroupPlan> {
        let streams = self.stripe_streams_async(stripe).await?;
        let index = self.row_index_async(stripe, column.id).await?;
        let dictionary = match streams.encoding(column.id)? {
            ColumnEncodingKind::DictionaryV2 => {
                Some(self.dictionary_async(stripe, column.id).await?)
            }
            _ => None,
        };
        self.build_plan(row_group, column, &streams, &index, dictionary)
    }

    /// Loads row group `row_group` of `stripe` into `buffer`.
    pub fn load_data<D: ColumnDecoder>(
        &self,
        stripe: usize,
        row_group: usize,
        buffer: &mut ColumnBuffer<D>,
    ) -> Result<()> {
        let plan = self.plan(stripe, row_group, buffer.column())?;
        buffer.read(&self.provider, &plan)
    }

    /// Async version of [`Reader::load_data`].
    pub async fn load_data_async<D: ColumnDecoder>(
        &self,
        stripe: usize,
        row_group: usize,
        buffer: &mut ColumnBuffer<D>,
    ) -> Result<()> {
        let plan = self.plan_async(stripe, row_group, buffer.column()).await?;
        buffer.read_async(&self.provider, &plan).await
    }

    /// Loads row group `row_group` of `stripe` into every buffer.
    pub fn load_columns(
        &self,
        stripe: usize,
        row_group: usize,
        buffers: &mut [&mut dyn ColumnLoad<P>],
    ) -> Result<()> {
        buffers
            .iter_mut()
            .try_for_each(|buffer| buffer.load(self, stripe, row_group))
    }

    /// Loads row group `row_group` of `stripe` into every buffer concurrently.
    /// Fails with the first error; the other buffers are then left in an unspecified
    /// state.
    pub async fn load_columns_async(
        &self,
        stripe: usize,
        row_group: usize,
        buffers: &mut [&mut dyn ColumnLoad<P>],
    ) -> Result<()> {
        self.stripe_streams_async(stripe).await?;
        try_join_all(
            buffers
                .iter_mut()
                .map(|buffer| buffer.load_async(self, stripe, row_group)),
        )
        .await?;
        Ok(())
    }

    /// Whether the file level statistics of `column` may match `filter`.
    pub fn file_may_match(&self, column: &OrcColumn, filter: &FilterValues) -> Result<bool> {
        filter.may_match(column.kind, self.tail.column_statistics(column.id))
    }

    /// Whether the statistics of `column` in `stripe` may match `filter`.
    pub fn stripe_may_match(
        &self,
        stripe: usize,
        column: &OrcColumn,
        filter: &FilterValues,
    ) -> Result<bool> {
        self.stripe_information(stripe)?;
        filter.may_match(column.kind, self.tail.stripe_statistics(stripe, column.id))
    }

    /// The stripes whose statistics of `column` may match `filter`.
    pub fn filter_stripes(&self, column: &OrcColumn, filter: &FilterValues) -> Result<Vec<usize>> {
        self.filter_stripes_in(0..self.number_of_stripes(), column, filter)
    }

    /// The stripes of `candidates` whose statistics of `column` may match `filter`.
    pub fn filter_stripes_in<I: IntoIterator<Item = usize>>(
        &self,
        candidates: I,
        column: &OrcColumn,
        filter: &FilterValues,
    ) -> Result<Vec<usize>> {
        let mut selected = vec![];
        let mut total = 0;
        for stripe in candidates {
            total += 1;
            if self.stripe_may_match(stripe, column, filter)? {
                selected.push(stripe);
            }
        }
        debug!(
            "{} of {total} stripes may match {filter:?} on column {}",
            selected.len(),
            column.name
        );
        Ok(selected)
    }

    /// The stripes that may match the filters attached to `columns`.
    pub fn filter_stripes_for(&self, columns: &[OrcColumn]) -> Result<Vec<usize>> {
        let mut stripes = (0..self.number_of_stripes()).collect::<Vec<_>>();
        for column in columns {
            if let Some(filter) = column.filter() {
                stripes = self.filter_stripes_in(stripes, column, filter)?;
            }
        }
        Ok(stripes)
    }

    fn select_row_groups(
        index: &RowGroupIndex,
        column: &OrcColumn,
        filter: &FilterValues,
    ) -> Result<Vec<usize>> {
        let mut selected = vec![];
        for row_group in 0..index.num_row_groups() {
            if filter.may_match(column.kind, index.row_group_stats(row_group))? {
                selected.push(row_group);
            }
        }
        debug!(
            "{} of {} row groups of stripe {} may match {filter:?} on column {}",
            selected.len(),
            index.num_row_groups(),
            index.stripe(),
            column.name
        );
        Ok(selected)
    }

    /// The row groups of `stripe` whose statistics of `column` may match `filter`.
    pub fn filter_row_groups(
        &self,
        stripe: usize,
        column: &OrcColumn,
        filter: &FilterValues,
    ) -> Result<Vec<usize>> {
        let index = self.row_index(stripe, column.id)?;
        Self::select_row_groups(&index, column, filter)
    }

    /// Async version of [`Reader::filter_row_groups`].
    pub async fn filter_row_groups_async(
        &self,
        stripe: usize,
        column: &OrcColumn,
        filter: &FilterValues,
    ) -> Result<Vec<usize>> {
        let index = self.row_index_async(stripe, column.id).await?;
        Self::select_row_groups(&index, column, filter)
    }
}

/// A column buffer of any type that a [`Reader`] can load.
pub trait ColumnLoad<P: ByteRangeProvider>: Send {
    fn column(&self) -> &OrcColumn;

    fn load(&mut self, reader: &Reader<P>, stripe: usize, row_group: usize) -> Result<()>;

    fn load_async<'a>(
        &'a mut self,
        reader: &'a Reader<P>,
        stripe: usize,
        row_group: usize,
    ) -> BoxFuture<'a, Result<()>>;
}

impl<P: ByteRangeProvider, D: ColumnDecoder> ColumnLoad<P> for ColumnBuffer<D> {
    fn column(&self) -> &OrcColumn {
        ColumnBuffer::column(self)
    }

    fn load(&mut self, reader: &Reader<P>, stripe: usize, row_group: usize) -> Result<()> {
        reader.load_data(stripe, row_group, self)
    }

    fn load_async<'a>(
        &'a mut self,
        reader: &'a Reader<P>,
        stripe: usize,
        row_group: usize,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(reader.load_data_async(stripe, row_group, self))
    }
}
