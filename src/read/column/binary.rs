use crate::{
    error::{Error, Result},
    proto::{column_encoding::Kind as ColumnEncodingKind, r#type::Kind as TypeKind},
    read::decode::{take, RleV2Decoder},
};

use super::{check_kind, read_integers, ColumnDecoder, DecodeStreams, OrcColumn};

/// Appends the next `lengths.len()` values of `data` to `out`.
fn split<'a, T, F>(mut data: &'a [u8], lengths: &[i64], out: &mut Vec<T>, f: F) -> Result<()>
where
    F: Fn(&'a [u8]) -> Result<T>,
{
    for length in lengths {
        let length = usize::try_from(*length)
            .map_err(|_| Error::oos(format!("negative value length {length}")))?;
        out.push(f(take(&mut data, length)?)?);
    }
    Ok(())
}

fn utf8(bytes: &[u8]) -> Result<String> {
    std::str::from_utf8(bytes)
        .map(|x| x.to_string())
        .map_err(|_| Error::InvalidUtf8)
}

/// The dictionary of a dictionary encoded string column in one stripe.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StringDictionary {
    values: Vec<String>,
}

impl StringDictionary {
    /// Builds a dictionary of `size` entries from the decompressed Length and
    /// DictionaryData streams.
    pub fn try_new(lengths: &[u8], data: &[u8], size: usize) -> Result<Self> {
        let mut decoder = RleV2Decoder::unsigned(lengths);
        let mut entry_lengths = vec![0; size];
        let read = decoder.read(&mut entry_lengths)?;
        if read != size {
            return Err(Error::oos(format!(
                "dictionary of {size} entries has {read} lengths"
            )));
        }
        let mut values = Vec::with_capacity(size);
        split(data, &entry_lengths, &mut values, utf8)?;
        Ok(Self { values })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: i64) -> Result<&str> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.values.get(i))
            .map(|x| x.as_str())
            .ok_or_else(|| {
                Error::oos(format!(
                    "index {index} is outside a dictionary of {} entries",
                    self.values.len()
                ))
            })
    }
}

#[derive(Debug, Default)]
pub struct BinaryColumn {
    lengths: Vec<i64>,
}

impl ColumnDecoder for BinaryColumn {
    type Value = Vec<u8>;
    type Item = Option<Vec<u8>>;

    fn try_new(column: &OrcColumn) -> Result<Self> {
        check_kind(column, &[TypeKind::Binary])?;
        Ok(Self::default())
    }

    fn null() -> Self::Item {
        None
    }

    fn item(value: Vec<u8>) -> Self::Item {
        Some(value)
    }

    fn decode(
        &mut self,
        streams: &DecodeStreams<'_>,
        count: usize,
        out: &mut Vec<Vec<u8>>,
    ) -> Result<()> {
        if streams.encoding != ColumnEncodingKind::DirectV2 {
            return Err(streams.unsupported_encoding());
        }
        self.lengths.clear();
        read_integers(streams.length()?, false, count, &mut self.lengths)?;
        split(streams.data.bytes, &self.lengths, out, |x| Ok(x.to_vec()))
    }
}

/// String, varchar and char columns, direct or dictionary encoded.
#[derive(Debug, Default)]
pub struct StringColumn {
    scratch: Vec<i64>,
}

impl ColumnDecoder for StringColumn {
    type Value = String;
    type Item = Option<String>;

    fn try_new(column: &OrcColumn) -> Result<Self> {
        check_kind(column, &[TypeKind::String, TypeKind::Varchar, TypeKind::Char])?;
        Ok(Self::default())
    }

    fn null() -> Self::Item {
        None
    }

    fn item(value: String) -> Self::Item {
        Some(value)
    }

    fn decode(
        &mut self,
        streams: &DecodeStreams<'_>,
        count: usize,
        out: &mut Vec<String>,
    ) -> Result<()> {
        self.scratch.clear();
        match streams.encoding {
            ColumnEncodingKind::DirectV2 => {
                read_integers(streams.length()?, false, count, &mut self.scratch)?;
                split(streams.data.bytes, &self.scratch, out, utf8)
            }
            ColumnEncodingKind::DictionaryV2 => {
                let dictionary = streams.dictionary.ok_or_else(|| {
                    Error::oos(format!(
                        "column {} is dictionary encoded but has no dictionary",
                        streams.column
                    ))
                })?;
                read_integers(streams.data, false, count, &mut self.scratch)?;
                for index in &self.scratch {
                    out.push(dictionary.get(*index)?.to_string());
                }
                Ok(())
            }
            _ => Err(streams.unsupported_encoding()),
        }
    }
}
