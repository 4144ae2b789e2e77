//! Random-access matrix reader
//!
//! Opening a file costs three reads: the header, the 16-byte footer and the
//! trailer index it points to. After that every row id is known and rows are
//! fetched from the underlying `RowStore`, either a whole-file memory map
//! (`ReadMode::Eager`) or an LRU-cached file handle (`ReadMode::Paged`).

use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::config::ReadMode;
use super::format::{FOOTER_SIZE, Footer, HEADER_SIZE, IndexEntry, MatrixHeader, parse_index};
use crate::directories::{MmapRowStore, OwnedBytes, PagedRowStore, RowCacheStats, RowStore};
use crate::error::{Error, Result};
use crate::structures::row_codec::{self, ROW_HEADER_SIZE};
use crate::structures::{MatrixRow, RowLayout, ValueCodec, decode_row};

pub struct MatrixReader {
    path: Option<PathBuf>,
    mode: ReadMode,
    header: MatrixHeader,
    store: Arc<dyn RowStore>,
    /// Index entries in storage order
    index: Vec<IndexEntry>,
    /// row id -> position in `index`
    positions: FxHashMap<i32, usize>,
}

impl std::fmt::Debug for MatrixReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatrixReader")
            .field("path", &self.path)
            .field("mode", &self.mode)
            .field("header", &self.header)
            .field("num_rows", &self.index.len())
            .finish()
    }
}

impl MatrixReader {
    pub fn open(path: impl AsRef<Path>, mode: ReadMode) -> Result<Self> {
        let path = path.as_ref();
        let store: Arc<dyn RowStore> = match mode {
            ReadMode::Eager => Arc::new(MmapRowStore::open(path)?),
            ReadMode::Paged { max_cached_bytes } => {
                Arc::new(PagedRowStore::open(path, max_cached_bytes)?)
            }
        };
        let mut reader = Self::open_with_store(store, mode)?;
        reader.path = Some(path.to_path_buf());
        log::info!(
            "opened matrix {} ({} rows, {:?}, {:?})",
            path.display(),
            reader.num_rows(),
            reader.layout(),
            mode
        );
        Ok(reader)
    }

    /// Open a matrix held entirely in memory
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        Self::open_with_store(Arc::new(MmapRowStore::from_bytes(bytes)), ReadMode::Eager)
    }

    /// Bootstrap a reader from any row store
    pub fn open_with_store(store: Arc<dyn RowStore>, mode: ReadMode) -> Result<Self> {
        let file_len = store.len();
        if file_len < HEADER_SIZE + FOOTER_SIZE {
            return Err(Error::CorruptFile(format!(
                "file is {} bytes, too short for header and footer",
                file_len
            )));
        }
        let header = MatrixHeader::parse(store.read_raw(0..HEADER_SIZE)?.as_slice())?;
        let footer = Footer::parse(
            store.read_raw(file_len - FOOTER_SIZE..file_len)?.as_slice(),
            file_len,
        )?;
        let index_bytes =
            store.read_raw(footer.index_offset..footer.index_offset + footer.index_length)?;
        let index = parse_index(index_bytes.as_slice(), &footer)?;

        let mut positions = FxHashMap::default();
        positions.reserve(index.len());
        for (pos, entry) in index.iter().enumerate() {
            if positions.insert(entry.row_id, pos).is_some() {
                return Err(Error::CorruptFile(format!(
                    "row {} appears twice in the trailer index",
                    entry.row_id
                )));
            }
        }

        Ok(Self {
            path: None,
            mode,
            header,
            store,
            index,
            positions,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn mode(&self) -> ReadMode {
        self.mode
    }

    pub fn header(&self) -> &MatrixHeader {
        &self.header
    }

    pub fn layout(&self) -> RowLayout {
        self.header.layout
    }

    pub fn codec(&self) -> &ValueCodec {
        &self.header.codec
    }

    /// Column count shared by every row of a dense matrix
    pub fn dense_width(&self) -> Option<usize> {
        self.header.dense_width()
    }

    pub fn num_rows(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn contains_row(&self, row_id: i32) -> bool {
        self.positions.contains_key(&row_id)
    }

    /// Row ids in storage order, straight from the trailer index
    pub fn row_ids(&self) -> impl ExactSizeIterator<Item = i32> + '_ {
        self.index.iter().map(|entry| entry.row_id)
    }

    /// Fetch one row. A missing id is `Ok(None)`, not an error.
    pub fn get_row(&self, row_id: i32) -> Result<Option<MatrixRow>> {
        let Some(&pos) = self.positions.get(&row_id) else {
            return Ok(None);
        };
        let entry = &self.index[pos];
        let bytes = self.store.read_row(entry.range())?;
        self.decode_entry(entry, &bytes).map(Some)
    }

    /// Lazily decode every row in storage order.
    ///
    /// Each call starts a fresh scan. Paged readers bypass the row cache so a
    /// scan does not evict the working set of random lookups.
    pub fn rows(&self) -> Rows<'_> {
        Rows {
            reader: self,
            pos: 0,
        }
    }

    /// Call `f(row_id, col, code)` for every stored cell, in storage order
    pub fn for_each_cell(&self, mut f: impl FnMut(i32, i32, i16)) -> Result<()> {
        for entry in &self.index {
            self.scan_entry(entry, &mut f)?;
        }
        Ok(())
    }

    /// Total number of stored cells; reads only the 8-byte row headers
    pub fn num_cells(&self) -> Result<u64> {
        let mut total = 0u64;
        for entry in &self.index {
            let head = self
                .store
                .read_raw(entry.offset..entry.offset + ROW_HEADER_SIZE as u64)?;
            let num_cols = i32::from_le_bytes([head[4], head[5], head[6], head[7]]);
            let num_cols = u64::try_from(num_cols).map_err(|_| {
                Error::CorruptRow(format!(
                    "row {}: negative column count {}",
                    entry.row_id, num_cols
                ))
            })?;
            total += num_cols;
        }
        Ok(total)
    }

    /// Row cache counters, for paged readers
    pub fn cache_stats(&self) -> Option<RowCacheStats> {
        self.store.cache_stats()
    }

    pub(crate) fn entries(&self) -> &[IndexEntry] {
        &self.index
    }

    /// Route the cells of one indexed row to `f` without building a `MatrixRow`
    pub(crate) fn scan_entry(
        &self,
        entry: &IndexEntry,
        f: &mut impl FnMut(i32, i32, i16),
    ) -> Result<()> {
        let bytes = self.store.read_raw(entry.range())?;
        check_row_id(entry, &bytes)?;
        row_codec::for_each_cell(&bytes, self.header.layout, f)
    }

    fn decode_entry(&self, entry: &IndexEntry, bytes: &OwnedBytes) -> Result<MatrixRow> {
        check_row_id(entry, bytes)?;
        decode_row(
            bytes,
            self.header.layout,
            self.header.codec,
            self.header.dense_width(),
        )
    }
}

fn check_row_id(entry: &IndexEntry, bytes: &[u8]) -> Result<()> {
    let stored = row_codec::peek_row_id(bytes)?;
    if stored != entry.row_id {
        return Err(Error::CorruptRow(format!(
            "index points row {} at offset {} but found row {}",
            entry.row_id, entry.offset, stored
        )));
    }
    Ok(())
}

/// Iterator returned by `MatrixReader::rows`
pub struct Rows<'a> {
    reader: &'a MatrixReader,
    pos: usize,
}

impl Iterator for Rows<'_> {
    type Item = Result<MatrixRow>;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.reader.index.get(self.pos)?;
        self.pos += 1;
        Some(
            self.reader
                .store
                .read_raw(entry.range())
                .map_err(Error::from)
                .and_then(|bytes| self.reader.decode_entry(entry, &bytes)),
        )
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.reader.index.len() - self.pos;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Rows<'_> {}

impl<'a> IntoIterator for &'a MatrixReader {
    type Item = Result<MatrixRow>;
    type IntoIter = Rows<'a>;

    fn into_iter(self) -> Rows<'a> {
        self.rows()
    }
}

/// Open a matrix file in eager mode
pub fn open_matrix(path: impl AsRef<Path>) -> Result<MatrixReader> {
    MatrixReader::open(path, ReadMode::Eager)
}
