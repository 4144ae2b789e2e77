//! Streaming, append-only matrix writer
//!
//! Row bytes go to the sink as soon as `write_row` is called; only the
//! `(row_id, offset, length)` index entries stay in memory until `finish`
//! appends the trailer index and footer.

use rustc_hash::FxHashSet;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use super::format::{HEADER_SIZE, IndexEntry, MatrixHeader, write_index_and_footer};
use crate::error::{Error, Result};
use crate::structures::{MatrixRow, ValueCodec, encode_row_into};

/// Buffer size for file-backed writers
const WRITE_BUFFER_SIZE: usize = 1 << 20;

/// A byte sink that can make written data durable
pub trait MatrixSink: Write {
    fn sync(&mut self) -> io::Result<()> {
        self.flush()
    }
}

impl MatrixSink for BufWriter<File> {
    fn sync(&mut self) -> io::Result<()> {
        self.flush()?;
        self.get_ref().sync_all()
    }
}

impl MatrixSink for Vec<u8> {}

/// Summary returned by `MatrixWriter::finish`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteSummary {
    pub num_rows: usize,
    pub num_cells: u64,
    pub total_bytes: u64,
}

enum SinkState<W> {
    Open(W),
    Finished(W),
    Failed,
}

pub struct MatrixWriter<W: MatrixSink = BufWriter<File>> {
    path: Option<PathBuf>,
    sink: SinkState<W>,
    header: MatrixHeader,
    index: Vec<IndexEntry>,
    seen: FxHashSet<i32>,
    offset: u64,
    num_cells: u64,
    scratch: Vec<u8>,
}

impl MatrixWriter<BufWriter<File>> {
    /// Create a sparse matrix file at `path`
    pub fn create(path: impl AsRef<Path>, codec: ValueCodec) -> Result<Self> {
        Self::create_with_header(path, MatrixHeader::sparse(codec))
    }

    /// Create a dense matrix file whose rows all have `num_cols` columns
    pub fn create_dense(path: impl AsRef<Path>, codec: ValueCodec, num_cols: u32) -> Result<Self> {
        Self::create_with_header(path, MatrixHeader::dense(codec, num_cols))
    }

    pub fn create_with_header(path: impl AsRef<Path>, header: MatrixHeader) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        let mut writer = Self::new(BufWriter::with_capacity(WRITE_BUFFER_SIZE, file), header)?;
        writer.path = Some(path.to_path_buf());
        log::info!("writing {:?} matrix to {}", header.layout, path.display());
        Ok(writer)
    }
}

impl<W: MatrixSink> MatrixWriter<W> {
    /// Start a matrix on an arbitrary sink; the header is written immediately
    pub fn new(mut sink: W, header: MatrixHeader) -> Result<Self> {
        header.write(&mut sink)?;
        Ok(Self {
            path: None,
            sink: SinkState::Open(sink),
            header,
            index: Vec::new(),
            seen: FxHashSet::default(),
            offset: HEADER_SIZE,
            num_cells: 0,
            scratch: Vec::new(),
        })
    }

    pub fn header(&self) -> &MatrixHeader {
        &self.header
    }

    pub fn codec(&self) -> &ValueCodec {
        &self.header.codec
    }

    /// Number of rows written so far
    pub fn num_rows(&self) -> usize {
        self.index.len()
    }

    /// True once the writer is finished or has failed
    pub fn is_finished(&self) -> bool {
        !matches!(self.sink, SinkState::Open(_))
    }

    /// Append one row. Rows may arrive in any id order but each id only once.
    ///
    /// Rows packed with a different codec are re-quantized into the file's codec.
    pub fn write_row(&mut self, row: &MatrixRow) -> Result<()> {
        let SinkState::Open(sink) = &mut self.sink else {
            return Err(Error::WriterClosed);
        };
        if row.layout() != self.header.layout {
            return Err(Error::InvalidRow(format!(
                "row {} is {:?} but the matrix is {:?}",
                row.row_id(),
                row.layout(),
                self.header.layout
            )));
        }
        if let Some(width) = self.header.dense_width()
            && row.num_cols() != width
        {
            return Err(Error::InvalidRow(format!(
                "dense row {} has {} columns, matrix has {}",
                row.row_id(),
                row.num_cols(),
                width
            )));
        }
        if self.seen.contains(&row.row_id()) {
            return Err(Error::DuplicateRow(row.row_id()));
        }

        self.scratch.clear();
        if row.codec().almost_eq(&self.header.codec) {
            encode_row_into(row, &mut self.scratch);
        } else {
            log::debug!("re-quantizing row {} into the matrix codec", row.row_id());
            encode_row_into(&row.clone().with_codec(self.header.codec), &mut self.scratch);
        }
        let length = u32::try_from(self.scratch.len())
            .ok()
            .filter(|&len| len <= i32::MAX as u32)
            .ok_or_else(|| {
                Error::InvalidRow(format!(
                    "row {} encodes to {} bytes",
                    row.row_id(),
                    self.scratch.len()
                ))
            })?;

        if let Err(e) = sink.write_all(&self.scratch) {
            // Part of the row may already be in the sink; the offsets are lost.
            log::error!("matrix write failed at offset {}: {}", self.offset, e);
            self.sink = SinkState::Failed;
            return Err(e.into());
        }
        self.index.push(IndexEntry {
            row_id: row.row_id(),
            offset: self.offset,
            length,
        });
        self.seen.insert(row.row_id());
        self.offset += length as u64;
        self.num_cells += row.num_cols() as u64;
        Ok(())
    }

    /// Append the trailer index and footer. Must be called exactly once;
    /// later calls and later writes fail with `Error::WriterClosed`.
    ///
    /// A sink error here, or an earlier one in `write_row`, leaves the writer
    /// failed: nothing further can be written or finished.
    pub fn finish(&mut self) -> Result<WriteSummary> {
        let mut sink = match std::mem::replace(&mut self.sink, SinkState::Failed) {
            SinkState::Open(sink) => sink,
            other => {
                self.sink = other;
                return Err(Error::WriterClosed);
            }
        };
        let trailer = write_index_and_footer(&mut sink, &self.index, self.offset)?;
        sink.sync()?;

        let summary = WriteSummary {
            num_rows: self.index.len(),
            num_cells: self.num_cells,
            total_bytes: self.offset + trailer,
        };
        match &self.path {
            Some(path) => log::info!(
                "finished matrix {}: {} rows, {} cells, {} bytes",
                path.display(),
                summary.num_rows,
                summary.num_cells,
                summary.total_bytes
            ),
            None => log::debug!(
                "finished in-memory matrix: {} rows, {} bytes",
                summary.num_rows,
                summary.total_bytes
            ),
        }
        self.sink = SinkState::Finished(sink);
        self.seen = FxHashSet::default();
        Ok(summary)
    }

    /// Recover the sink of a finished writer
    pub fn into_inner(mut self) -> Option<W> {
        match std::mem::replace(&mut self.sink, SinkState::Failed) {
            SinkState::Finished(sink) => Some(sink),
            _ => None,
        }
    }
}

impl<W: MatrixSink> Drop for MatrixWriter<W> {
    fn drop(&mut self) {
        if let SinkState::Open(_) = self.sink {
            log::warn!(
                "matrix writer for {} dropped before finish(); output is incomplete",
                self.path
                    .as_deref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "<stream>".to_string())
            );
        }
    }
}

/// Write every row of `rows` to a new sparse matrix at `path`
pub fn write_matrix<I>(path: impl AsRef<Path>, codec: ValueCodec, rows: I) -> Result<WriteSummary>
where
    I: IntoIterator<Item = MatrixRow>,
{
    let mut writer = MatrixWriter::create(path, codec)?;
    for row in rows {
        writer.write_row(&row)?;
    }
    writer.finish()
}
