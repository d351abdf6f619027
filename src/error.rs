use thiserror::Error;

use crate::proto::{
    column_encoding::Kind as ColumnEncodingKind, r#type::Kind as TypeKind, stream::Kind,
    CompressionKind,
};

/// Errors raised while reading an ORC file.
#[derive(Debug, Error)]
pub enum Error {
    /// The file tail is not a valid ORC tail (bad magic, impossible lengths).
    #[error("corrupt ORC file: {0}")]
    CorruptFile(String),
    #[error("out of spec: {0}")]
    OutOfSpec(String),
    #[error("RLE literal run of {0} values exceeds the remaining stream")]
    RleLiteralTooLarge(usize),
    #[error("invalid utf-8 in string column")]
    InvalidUtf8,
    #[error("column {0} does not exist")]
    InvalidColumn(u32),
    #[error("no column named {0:?}")]
    UnknownColumn(String),
    #[error("column {column} has no {kind:?} stream")]
    MissingStream { column: u32, kind: Kind },
    #[error("column {column}: data stream yielded {expected} values but the secondary stream {found}")]
    ValueCountMismatch {
        column: u32,
        expected: usize,
        found: usize,
    },
    #[error("column {column}: encoding {encoding:?} is not supported")]
    UnsupportedEncoding {
        column: u32,
        encoding: ColumnEncodingKind,
    },
    #[error("column {column}: type {kind:?} is not supported by this buffer")]
    UnsupportedType { column: u32, kind: TypeKind },
    #[error("compression {0:?} is not supported")]
    UnsupportedCompression(CompressionKind),
    #[error("no row index position layout for {stream:?} of a {column_type:?} column encoded as {encoding:?}")]
    UnsupportedStreamPosition {
        stream: Kind,
        column_type: TypeKind,
        encoding: ColumnEncodingKind,
    },
    /// A byte range provider returned fewer bytes than requested.
    #[error("requested {expected} bytes but only {actual} were available")]
    BufferNotFilled { expected: usize, actual: usize },
    /// A compressed block decompressed to more bytes than the configured block capacity.
    /// Raise [`crate::read::ReaderOptions::block_capacity`] to read the file.
    #[error("decompressed block of {} bytes exceeds the block capacity of {capacity} bytes", .actual.map(|x| x.to_string()).unwrap_or_else(|| "more".to_string()))]
    BlockTooLarge {
        actual: Option<usize>,
        capacity: usize,
    },
    #[error("decompression failed: {0}")]
    Decompression(String),
    #[error("decimal value does not fit 38 digits")]
    DecimalOverflow,
    #[error("invalid filter: {0}")]
    InvalidFilter(String),
    #[error("stripe {0} does not exist")]
    StripeOutOfRange(usize),
    #[error("row group {row_group} does not exist in stripe {stripe}")]
    RowGroupOutOfRange { stripe: usize, row_group: usize },
    #[error("invalid protobuf message")]
    InvalidProto,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<prost::DecodeError> for Error {
    fn from(_: prost::DecodeError) -> Self {
        Self::InvalidProto
    }
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn oos<S: Into<String>>(msg: S) -> Self {
        Self::OutOfSpec(msg.into())
    }
}
