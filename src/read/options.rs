/// The default number of bytes read from the end of a file when looking for its tail.
pub const DEFAULT_TAIL_WINDOW: u64 = 16 * 1024;

/// Block size assumed when the postscript does not declare one.
pub const DEFAULT_COMPRESSION_BLOCK_SIZE: usize = 256 * 1024;

/// Options of a [`super::Reader`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderOptions {
    /// Number of bytes optimistically read from the end of the file. When the tail
    /// is larger, exactly the missing bytes are read in a second round trip.
    pub tail_window: u64,
    /// Maximum size of a decompressed block. Defaults to the compression block size
    /// declared in the postscript.
    pub block_capacity: Option<usize>,
    /// Whether a column buffer re-uses the Present stream bytes it fetched for the
    /// previous row group when the next row group maps to the same byte range.
    pub memoize_present: bool,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            tail_window: DEFAULT_TAIL_WINDOW,
            block_capacity: None,
            memoize_present: true,
        }
    }
}

impl ReaderOptions {
    pub fn with_tail_window(mut self, tail_window: u64) -> Self {
        self.tail_window = tail_window;
        self
    }

    pub fn with_block_capacity(mut self, block_capacity: usize) -> Self {
        self.block_capacity = Some(block_capacity);
        self
    }

    pub fn with_memoize_present(mut self, memoize_present: bool) -> Self {
        self.memoize_present = memoize_present;
        self
    }
}
