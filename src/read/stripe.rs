use std::collections::HashMap;

use crate::{
    error::{Error, Result},
    proto::{
        column_encoding::Kind as ColumnEncodingKind, stream::Kind, ColumnEncoding,
        StripeFooter, StripeInformation,
    },
};

/// The location of one stream of a stripe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamDetail {
    pub column: u32,
    pub kind: Kind,
    pub encoding: ColumnEncodingKind,
    /// Absolute offset of the stream in the file.
    pub offset: u64,
    pub length: u64,
    pub dictionary_size: Option<u32>,
}

impl StreamDetail {
    /// The offset one past the last byte of the stream.
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }
}

/// Catalog of the streams of a stripe, built once from its footer.
/// Its main use is [`StripeStreams::require`], to locate a stream of a column.
#[derive(Debug, Clone)]
pub struct StripeStreams {
    stripe: usize,
    number_of_rows: u64,
    streams: Vec<StreamDetail>,
    index: HashMap<(u32, Kind), usize>,
    encodings: Vec<ColumnEncoding>,
}

impl StripeStreams {
    pub(crate) fn try_new(
        stripe: usize,
        information: &StripeInformation,
        footer: &StripeFooter,
    ) -> Result<Self> {
        let mut offset = information.offset(); // the start of the stream
        let mut streams = Vec::with_capacity(footer.streams.len());
        let mut index = HashMap::with_capacity(footer.streams.len());
        for stream in &footer.streams {
            let column = stream.column();
            let encoding = footer
                .columns
                .get(column as usize)
                .ok_or(Error::InvalidColumn(column))?;
            let detail = StreamDetail {
                column,
                kind: stream.kind(),
                encoding: encoding.kind(),
                offset,
                length: stream.length(),
                dictionary_size: encoding.dictionary_size,
            };
            offset += detail.length;
            index.entry((column, detail.kind)).or_insert(streams.len());
            streams.push(detail);
        }
        let declared = information.offset() + information.index_length() + information.data_length();
        if offset != declared {
            return Err(Error::oos(format!(
                "streams of stripe {stripe} end at {offset} but its data ends at {declared}"
            )));
        }

        Ok(Self {
            stripe,
            number_of_rows: information.number_of_rows(),
            streams,
            index,
            encodings: footer.columns.clone(),
        })
    }

    pub fn stripe(&self) -> usize {
        self.stripe
    }

    /// The number of rows of this stripe
    pub fn number_of_rows(&self) -> usize {
        self.number_of_rows as usize
    }

    pub fn streams(&self) -> &[StreamDetail] {
        &self.streams
    }

    pub fn get(&self, column: u32, kind: Kind) -> Option<&StreamDetail> {
        self.index.get(&(column, kind)).map(|i| &self.streams[*i])
    }

    /// Like [`StripeStreams::get`] but a missing stream is an error.
    pub fn require(&self, column: u32, kind: Kind) -> Result<&StreamDetail> {
        self.get(column, kind)
            .ok_or(Error::MissingStream { column, kind })
    }

    pub fn encoding(&self, column: u32) -> Result<ColumnEncodingKind> {
        self.encodings
            .get(column as usize)
            .map(|x| x.kind())
            .ok_or(Error::InvalidColumn(column))
    }

    pub fn dictionary_size(&self, column: u32) -> Option<usize> {
        self.encodings
            .get(column as usize)
            .and_then(|x| x.dictionary_size)
            .map(|x| x as usize)
    }
}
