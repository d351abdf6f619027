//! Row group indexes and the resolution of their positions.
//!
//! Every row index entry carries, per stream of its column, the position at which the
//! row group starts. A position is a flat list of integers whose layout depends on the
//! stream, the column type and its encoding:
//! * the offset of the compressed block holding the row group (absent when the file
//!   is not compressed);
//! * the offset inside the decompressed block (or the raw byte offset when the file is
//!   not compressed);
//! * for run length encoded streams, the number of values of the run to skip;
//! * for boolean streams, the number of bits of the next byte to skip.
//!
//! The positions of the Present stream, when the column has one, come first.
use crate::{
    error::{Error, Result},
    proto::{
        column_encoding::Kind as ColumnEncodingKind, r#type::Kind as TypeKind, stream::Kind,
        ColumnStatistics, RowIndex,
    },
};

use super::stripe::{StreamDetail, StripeStreams};

/// A single row group entry of a row index.
#[derive(Debug, Clone, PartialEq)]
pub struct RowGroupEntry {
    pub statistics: Option<ColumnStatistics>,
    pub positions: Vec<u64>,
}

/// The row index of one column in one stripe.
#[derive(Debug, Clone, PartialEq)]
pub struct RowGroupIndex {
    stripe: usize,
    column: u32,
    entries: Vec<RowGroupEntry>,
}

impl RowGroupIndex {
    pub fn new(stripe: usize, column: u32, index: RowIndex) -> Self {
        let entries = index
            .entry
            .into_iter()
            .map(|entry| RowGroupEntry {
                statistics: entry.statistics,
                positions: entry.positions,
            })
            .collect();
        Self {
            stripe,
            column,
            entries,
        }
    }

    pub fn stripe(&self) -> usize {
        self.stripe
    }

    pub fn column(&self) -> u32 {
        self.column
    }

    pub fn num_row_groups(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[RowGroupEntry] {
        &self.entries
    }

    pub fn entry(&self, row_group: usize) -> Result<&RowGroupEntry> {
        self.entries.get(row_group).ok_or(Error::RowGroupOutOfRange {
            stripe: self.stripe,
            row_group,
        })
    }

    pub fn row_group_stats(&self, row_group: usize) -> Option<&ColumnStatistics> {
        self.entries
            .get(row_group)
            .and_then(|entry| entry.statistics.as_ref())
    }
}

/// How a stream records the position of a row group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamPosition {
    /// Raw bytes: `[block, offset]`.
    Bytes,
    /// A run length encoded stream: `[block, offset, values to skip]`.
    Run,
    /// A bit-packed boolean stream: `[block, offset, bytes to skip, bits to skip]`.
    Bits,
}

impl StreamPosition {
    /// The number of position slots this stream occupies.
    pub fn slots(self, compressed: bool) -> usize {
        let slots = match self {
            StreamPosition::Bytes => 2,
            StreamPosition::Run => 3,
            StreamPosition::Bits => 4,
        };
        if compressed {
            slots
        } else {
            slots - 1
        }
    }
}

use StreamPosition::*;

/// The positioned streams of a column after its optional Present stream, in the order
/// their positions are recorded.
pub fn position_layout(
    column_type: TypeKind,
    encoding: ColumnEncodingKind,
) -> Option<&'static [(Kind, StreamPosition)]> {
    use ColumnEncodingKind::*;
    use TypeKind::*;
    Some(match (column_type, encoding) {
        (Boolean, Direct | DirectV2) => &[(Kind::Data, Bits)],
        (Byte, Direct | DirectV2) => &[(Kind::Data, Run)],
        (Short | Int | Long | Date, DirectV2) => &[(Kind::Data, Run)],
        (Float | Double, Direct | DirectV2) => &[(Kind::Data, Bytes)],
        (String | Varchar | Char | Binary, DirectV2) => &[(Kind::Data, Bytes), (Kind::Length, Run)],
        (String | Varchar | Char, DictionaryV2) => &[(Kind::Data, Run)],
        (Timestamp, DirectV2) => &[(Kind::Data, Run), (Kind::Secondary, Run)],
        (Decimal, DirectV2) => &[(Kind::Data, Bytes), (Kind::Secondary, Run)],
        _ => return None,
    })
}

/// Where a row group starts in one stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResolvedPositions {
    /// Offset, relative to the start of the stream, of the compressed block holding
    /// the start of the row group. When the file is not compressed, the byte offset of
    /// the row group.
    pub row_group_offset: u64,
    /// Offset of the row group inside the decompressed block.
    pub row_entry_offset: u64,
    /// Values to discard before the first value of the row group. For boolean streams,
    /// the number of whole bytes to discard.
    pub values_to_skip: u64,
    /// Bits of the first byte to discard (boolean streams only).
    pub remaining_bits: u8,
}

impl ResolvedPositions {
    fn key(&self) -> (u64, u64) {
        (self.row_group_offset, self.row_entry_offset)
    }
}

/// A byte range of a stream to fetch, and where the row group starts within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamRange {
    pub kind: Kind,
    /// Absolute offset in the file.
    pub offset: u64,
    pub length: u64,
    pub positions: ResolvedPositions,
}

/// Resolves row index positions for one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionResolver {
    column_type: TypeKind,
    encoding: ColumnEncodingKind,
    has_present: bool,
    compressed: bool,
    layout: &'static [(Kind, StreamPosition)],
}

impl PositionResolver {
    /// Fails with [`Error::UnsupportedStreamPosition`] when positions of this column
    /// type and encoding cannot be resolved.
    pub fn try_new(
        column_type: TypeKind,
        encoding: ColumnEncodingKind,
        has_present: bool,
        compressed: bool,
    ) -> Result<Self> {
        let layout = position_layout(column_type, encoding).ok_or(
            Error::UnsupportedStreamPosition {
                stream: Kind::Data,
                column_type,
                encoding,
            },
        )?;
        Ok(Self {
            column_type,
            encoding,
            has_present,
            compressed,
            layout,
        })
    }

    pub fn has_present(&self) -> bool {
        self.has_present
    }

    pub fn compressed(&self) -> bool {
        self.compressed
    }

    /// The positioned streams after Present.
    pub fn layout(&self) -> &'static [(Kind, StreamPosition)] {
        self.layout
    }

    /// The first slot of `kind` and how it is positioned.
    fn locate(&self, kind: Kind) -> Result<(usize, StreamPosition)> {
        let present = Bits.slots(self.compressed);
        if kind == Kind::Present {
            return if self.has_present {
                Ok((0, Bits))
            } else {
                Err(self.unsupported(kind))
            };
        }
        let mut start = if self.has_present { present } else { 0 };
        for (stream, position) in self.layout {
            if *stream == kind {
                return Ok((start, *position));
            }
            start += position.slots(self.compressed);
        }
        Err(self.unsupported(kind))
    }

    fn unsupported(&self, stream: Kind) -> Error {
        Error::UnsupportedStreamPosition {
            stream,
            column_type: self.column_type,
            encoding: self.encoding,
        }
    }

    /// The number of slots every position of this column holds.
    pub fn slots(&self) -> usize {
        let present = if self.has_present {
            Bits.slots(self.compressed)
        } else {
            0
        };
        present
            + self
                .layout
                .iter()
                .map(|(_, position)| position.slots(self.compressed))
                .sum::<usize>()
    }

    /// Resolves where the row group whose positions are `positions` starts in `kind`.
    pub fn resolve(&self, kind: Kind, positions: &[u64]) -> Result<ResolvedPositions> {
        let (start, position) = self.locate(kind)?;
        let slots = position.slots(self.compressed);
        let slots = positions.get(start..start + slots).ok_or_else(|| {
            Error::oos(format!(
                "row index entry has {} positions but {kind:?} of a {:?} column needs {}",
                positions.len(),
                self.column_type,
                start + slots
            ))
        })?;
        let (row_group_offset, row_entry_offset, rest) = if self.compressed {
            (slots[0], slots[1], &slots[2..])
        } else {
            (slots[0], 0, &slots[1..])
        };
        let mut resolved = ResolvedPositions {
            row_group_offset,
            row_entry_offset,
            ..Default::default()
        };
        match position {
            Bytes => {}
            Run => resolved.values_to_skip = rest[0],
            Bits => {
                resolved.values_to_skip = rest[0];
                resolved.remaining_bits = u8::try_from(rest[1])
                    .ok()
                    .filter(|x| *x <= 8)
                    .ok_or_else(|| Error::oos(format!("cannot skip {} bits of a byte", rest[1])))?;
            }
        }
        Ok(resolved)
    }

    /// Computes the byte range of `stream` that holds row group `row_group` of `index`.
    ///
    /// The range starts at the block holding the row group. The run at which the next
    /// row group starts may still hold values of this one, so the range extends to the
    /// first later position past that run; when that position is inside a compressed
    /// block, the whole block is included.
    pub fn calculate_range(
        &self,
        index: &RowGroupIndex,
        row_group: usize,
        stream: &StreamDetail,
    ) -> Result<StreamRange> {
        let kind = stream.kind;
        let entries = index.entries();
        let current = self.resolve(kind, &index.entry(row_group)?.positions)?;

        let resolve = |entry: &RowGroupEntry| self.resolve(kind, &entry.positions);
        let end = match entries.get(row_group + 1) {
            None => stream.length,
            Some(next) => {
                let next = resolve(next)?;
                let mut later = entries.iter().skip(row_group + 2).map(resolve);
                let mut boundary = None;
                for position in later.by_ref() {
                    let position = position?;
                    if position.key() > next.key() {
                        boundary = Some(position);
                        break;
                    }
                }
                match boundary {
                    None => stream.length,
                    Some(q) if !self.compressed || q.row_entry_offset == 0 => q.row_group_offset,
                    Some(q) => {
                        let mut end = stream.length;
                        for position in later {
                            let position = position?;
                            if position.row_group_offset > q.row_group_offset {
                                end = position.row_group_offset;
                                break;
                            }
                        }
                        end
                    }
                }
            }
        };
        let end = end.min(stream.length);
        if end < current.row_group_offset {
            return Err(Error::oos(format!(
                "row group {row_group} of column {} starts at {} past the end {end} of its {kind:?} stream",
                index.column(),
                current.row_group_offset
            )));
        }
        Ok(StreamRange {
            kind,
            offset: stream.offset + current.row_group_offset,
            length: end - current.row_group_offset,
            positions: current,
        })
    }
}

/// The ranges of every positioned stream of a column for one row group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDataStreams {
    pub present: Option<StreamRange>,
    pub data: StreamRange,
    pub secondary: Option<StreamRange>,
    pub length: Option<StreamRange>,
}

impl ColumnDataStreams {
    pub fn try_new(
        streams: &StripeStreams,
        index: &RowGroupIndex,
        resolver: &PositionResolver,
        row_group: usize,
    ) -> Result<Self> {
        let column = index.column();
        let range = |kind: Kind| -> Result<StreamRange> {
            resolver.calculate_range(index, row_group, streams.require(column, kind)?)
        };

        let present = if resolver.has_present() {
            Some(range(Kind::Present)?)
        } else {
            None
        };
        let mut data = None;
        let mut secondary = None;
        let mut length = None;
        for (kind, _) in resolver.layout() {
            let resolved = Some(range(*kind)?);
            match kind {
                Kind::Data => data = resolved,
                Kind::Secondary => secondary = resolved,
                Kind::Length => length = resolved,
                other => return Err(resolver.unsupported(*other)),
            }
        }
        let data = data.ok_or(Error::MissingStream {
            column,
            kind: Kind::Data,
        })?;
        Ok(Self {
            present,
            data,
            secondary,
            length,
        })
    }
}
