//! wikimatrix - quantized row-matrix storage
//!
//! Large sparse or dense score matrices stored as write-once files:
//! - 16-bit linear quantization of scores (`ValueCodec`)
//! - Sorted sparse rows with delta-varint column ids, or fixed-width dense rows
//! - Streaming append-only writer with a trailer index and 16-byte footer
//! - Random-access reader over a memory map or a byte-bounded LRU row cache
//! - Out-of-core transposition in bucketed source scans
//! - Fully decoded in-memory matrices for symmetrization and id compaction

pub mod directories;
pub mod error;
pub mod matrix;
pub mod structures;

pub use error::{Error, Result};

pub use structures::{MAX_SCORE, MIN_SCORE, MatrixRow, RowData, RowLayout, ValueCodec};

pub use directories::{OwnedBytes, RowCacheStats, RowStore};

pub use matrix::{
    BucketPlan, InMemoryMatrix, MatrixReader, MatrixWriter, ReadMode, TransposeConfig,
    TransposeStats, Transposer, WriteSummary, new_writer, open_matrix, transpose,
};
