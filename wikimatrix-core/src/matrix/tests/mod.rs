//! End-to-end matrix tests over real files

mod paged;
mod transpose;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::path::Path;

use crate::matrix::{MatrixReader, MatrixWriter, ReadMode};
use crate::structures::{MatrixRow, ValueCodec};

/// Sparse rows as `(row id, [(col, value)])`
pub(super) type SparseRows = Vec<(i32, Vec<(i32, f32)>)>;

/// Random sparse rows with ids in `-num_rows/4..`, columns drawn from a
/// universe that also contains negative ids, values in [-1, 1].
/// Rows come back in shuffled order.
pub(super) fn random_rows(seed: u64, num_rows: usize, num_cols: i32, density: f64) -> SparseRows {
    let mut rng = StdRng::seed_from_u64(seed);
    let first_id = -(num_rows as i32) / 4;
    let first_col = -num_cols / 4;
    let mut rows: SparseRows = (0..num_rows as i32)
        .map(|i| {
            let mut entries: Vec<(i32, f32)> = Vec::new();
            for col in first_col..first_col + num_cols {
                if rng.random_bool(density) {
                    entries.push((col, rng.random_range(-1.0f32..=1.0)));
                }
            }
            if entries.is_empty() {
                entries.push((first_col + rng.random_range(0..num_cols), 0.5));
            }
            entries.shuffle(&mut rng);
            (first_id + i, entries)
        })
        .collect();
    rows.shuffle(&mut rng);
    rows
}

pub(super) fn write_rows(path: &Path, rows: &SparseRows) -> ValueCodec {
    let codec = ValueCodec::default();
    let mut writer = MatrixWriter::create(path, codec).unwrap();
    for (id, entries) in rows {
        let row = MatrixRow::sparse(*id, codec, entries.iter().copied()).unwrap();
        writer.write_row(&row).unwrap();
    }
    writer.finish().unwrap();
    codec
}

pub(super) fn open(path: &Path) -> MatrixReader {
    MatrixReader::open(path, ReadMode::Eager).unwrap()
}

/// Every (row, col, value) cell of a reader
pub(super) fn cells(reader: &MatrixReader) -> Vec<(i32, i32, f32)> {
    let mut out = Vec::new();
    for row in reader.rows() {
        let row = row.unwrap();
        out.extend(row.iter().map(|(col, v)| (row.row_id(), col, v)));
    }
    out.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
    out
}
