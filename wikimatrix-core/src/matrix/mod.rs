//! Matrix files: writing, reading, transposing and in-memory editing

mod config;
pub mod format;
mod in_memory;
mod reader;
mod transpose;
mod writer;

#[cfg(test)]
mod tests;

pub use config::{
    BucketPlan, DEFAULT_CACHE_BYTES, DEFAULT_TRANSPOSE_BUDGET, ReadMode, TransposeConfig,
};
pub use format::{IndexEntry, MatrixHeader};
pub use in_memory::{DecodedRow, InMemoryMatrix};
pub use reader::{MatrixReader, Rows, open_matrix};
pub use transpose::{TransposeStats, Transposer, transpose};
pub use writer::{MatrixSink, MatrixWriter, WriteSummary, write_matrix};

use std::path::Path;

use crate::error::Result;
use crate::structures::ValueCodec;

/// Create a sparse matrix file with the default codec
pub fn new_writer(path: impl AsRef<Path>) -> Result<MatrixWriter> {
    MatrixWriter::create(path, ValueCodec::default())
}
