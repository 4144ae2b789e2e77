//! Fully decoded, mutable matrix for data that fits in RAM
//!
//! Values are held unquantized as `f64`. Writing back to disk derives a codec
//! from the observed value range.

use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use std::path::Path;

use super::reader::MatrixReader;
use super::writer::{MatrixWriter, WriteSummary};
use crate::error::Result;
use crate::structures::{MatrixRow, RowData, ValueCodec};

/// Decoded row: column id -> value, ordered by column id
pub type DecodedRow = BTreeMap<i32, f64>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InMemoryMatrix {
    rows: FxHashMap<i32, DecodedRow>,
}

impl InMemoryMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode every row of `reader`
    pub fn from_reader(reader: &MatrixReader) -> Result<Self> {
        let mut matrix = Self::new();
        matrix.rows.reserve(reader.num_rows());
        for row in reader.rows() {
            matrix.insert_row(&row?);
        }
        log::debug!("loaded {} rows into memory", matrix.num_rows());
        Ok(matrix)
    }

    /// Build from `(row, col, value)` triples; a repeated cell keeps the last value
    pub fn from_triples<I>(triples: I) -> Self
    where
        I: IntoIterator<Item = (i32, i32, f64)>,
    {
        let mut matrix = Self::new();
        for (row, col, value) in triples {
            matrix.set(row, col, value);
        }
        matrix
    }

    /// Replace (or add) a row with the decoded values of `row`
    pub fn insert_row(&mut self, row: &MatrixRow) {
        let decoded = row.iter().map(|(col, value)| (col, value as f64)).collect();
        self.rows.insert(row.row_id(), decoded);
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn num_cells(&self) -> usize {
        self.rows.values().map(BTreeMap::len).sum()
    }

    /// Row ids in ascending order
    pub fn row_ids(&self) -> Vec<i32> {
        let mut ids: Vec<i32> = self.rows.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn get(&self, row: i32) -> Option<&DecodedRow> {
        self.rows.get(&row)
    }

    pub fn get_value(&self, row: i32, col: i32) -> Option<f64> {
        self.rows.get(&row)?.get(&col).copied()
    }

    pub fn set(&mut self, row: i32, col: i32, value: f64) {
        self.rows.entry(row).or_default().insert(col, value);
    }

    /// Add `delta` to a cell, treating a missing cell as zero
    pub fn add(&mut self, row: i32, col: i32, delta: f64) {
        *self.rows.entry(row).or_default().entry(col).or_insert(0.0) += delta;
    }

    pub fn remove_row(&mut self, row: i32) -> Option<DecodedRow> {
        self.rows.remove(&row)
    }

    /// Rows in ascending id order
    pub fn iter(&self) -> impl Iterator<Item = (i32, &DecodedRow)> + '_ {
        self.row_ids()
            .into_iter()
            .filter_map(move |id| self.rows.get(&id).map(|row| (id, row)))
    }

    /// Make `M[i][j] == M[j][i]` for every stored pair.
    ///
    /// Cells present on both sides become their average; a cell whose mirror
    /// is absent is copied to the mirror unchanged.
    pub fn symmetrize(&mut self) {
        self.symmetrize_by(|value, mirror| match mirror {
            Some(m) => 0.5 * (value + m),
            None => value,
        });
    }

    /// Like `symmetrize`, but an absent mirror counts as `fill`
    pub fn symmetrize_with_fill(&mut self, fill: f64) {
        self.symmetrize_by(|value, mirror| 0.5 * (value + mirror.unwrap_or(fill)));
    }

    fn symmetrize_by(&mut self, combine: impl Fn(f64, Option<f64>) -> f64) {
        let mut cells: Vec<(i32, i32, f64)> = Vec::with_capacity(self.num_cells());
        for (&row, cols) in &self.rows {
            for (&col, &value) in cols {
                if row == col {
                    continue;
                }
                let mirror = self.get_value(col, row);
                // Each unordered pair is handled once, from its smaller-id side
                // or from whichever side exists.
                if mirror.is_some() && row > col {
                    continue;
                }
                cells.push((row, col, combine(value, mirror)));
            }
        }
        for (row, col, value) in cells {
            self.set(row, col, value);
            self.set(col, row, value);
        }
    }

    /// Re-map ids onto `0..n`: row ids first in ascending order, then column
    /// ids that are not also row ids, in ascending order.
    ///
    /// Returns the original id of every compressed id.
    pub fn compress_ids(&mut self) -> Vec<i32> {
        let mut raw_ids = self.row_ids();
        let mut mapping: FxHashMap<i32, i32> = raw_ids
            .iter()
            .enumerate()
            .map(|(i, &id)| (id, i as i32))
            .collect();

        let mut extra: Vec<i32> = self
            .rows
            .values()
            .flat_map(|cols| cols.keys().copied())
            .filter(|col| !mapping.contains_key(col))
            .collect();
        extra.sort_unstable();
        extra.dedup();
        for col in extra {
            mapping.insert(col, raw_ids.len() as i32);
            raw_ids.push(col);
        }

        let rows = std::mem::take(&mut self.rows);
        self.rows = rows
            .into_iter()
            .map(|(id, cols)| {
                let cols = cols.into_iter().map(|(col, v)| (mapping[&col], v)).collect();
                (mapping[&id], cols)
            })
            .collect();
        raw_ids
    }

    /// Quantize every row with `codec`, ascending by row id
    pub fn to_rows(&self, codec: ValueCodec) -> impl Iterator<Item = MatrixRow> + '_ {
        self.iter().map(move |(id, cols)| {
            let col_ids = cols.keys().copied().collect();
            let codes = cols.values().map(|&v| codec.pack(v as f32)).collect();
            // Keys of a BTreeMap are unique and sorted.
            MatrixRow::from_parts(id, RowData::Sparse { col_ids, codes }, codec)
        })
    }

    /// Write a sparse matrix file with a codec fitted to the stored values
    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<WriteSummary> {
        let codec =
            ValueCodec::fit(self.rows.values().flat_map(|cols| cols.values().map(|&v| v as f32)));
        self.write_to_with_codec(path, codec)
    }

    pub fn write_to_with_codec(
        &self,
        path: impl AsRef<Path>,
        codec: ValueCodec,
    ) -> Result<WriteSummary> {
        let mut writer = MatrixWriter::create(path, codec)?;
        for row in self.to_rows(codec) {
            writer.write_row(&row)?;
        }
        writer.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_add_get() {
        let mut m = InMemoryMatrix::new();
        m.set(1, 2, 0.5);
        m.add(1, 2, 0.25);
        m.add(3, 4, 1.0);
        assert_eq!(m.get_value(1, 2), Some(0.75));
        assert_eq!(m.get_value(3, 4), Some(1.0));
        assert_eq!(m.get_value(2, 1), None);
        assert_eq!(m.row_ids(), vec![1, 3]);
        assert_eq!(m.num_cells(), 2);

        let removed = m.remove_row(3).unwrap();
        assert_eq!(removed.get(&4), Some(&1.0));
        assert!(m.remove_row(3).is_none());
        assert_eq!(m.num_rows(), 1);
    }

    #[test]
    fn test_symmetrize() {
        let mut m =
            InMemoryMatrix::from_triples([(1, 2, 0.4), (2, 1, 0.8), (1, 3, 0.3), (4, 4, 1.0)]);
        m.symmetrize();
        assert!((m.get_value(1, 2).unwrap() - 0.6).abs() < 1e-12);
        assert!((m.get_value(2, 1).unwrap() - 0.6).abs() < 1e-12);
        assert_eq!(m.get_value(3, 1), Some(0.3));
        assert_eq!(m.get_value(1, 3), Some(0.3));
        assert_eq!(m.get_value(4, 4), Some(1.0));
    }

    #[test]
    fn test_symmetrize_with_fill() {
        let mut m = InMemoryMatrix::from_triples([(1, 3, 0.3)]);
        m.symmetrize_with_fill(0.1);
        assert!((m.get_value(1, 3).unwrap() - 0.2).abs() < 1e-12);
        assert!((m.get_value(3, 1).unwrap() - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_compress_ids() {
        let mut m = InMemoryMatrix::from_triples([(100, 7, 0.1), (50, 100, 0.2), (50, 900, 0.3)]);
        let raw = m.compress_ids();
        assert_eq!(raw, vec![50, 100, 7, 900]);
        assert_eq!(m.row_ids(), vec![0, 1]);
        assert_eq!(m.get_value(1, 2), Some(0.1));
        assert_eq!(m.get_value(0, 1), Some(0.2));
        assert_eq!(m.get_value(0, 3), Some(0.3));
    }

    #[test]
    fn test_write_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.wmx");
        let m = InMemoryMatrix::from_triples([(1, 2, 3.0), (1, 5, -2.0), (2, 1, 7.5)]);
        let summary = m.write_to(&path).unwrap();
        assert_eq!(summary.num_rows, 2);

        let reader = MatrixReader::open(&path, Default::default()).unwrap();
        let codec = *reader.codec();
        let reloaded = InMemoryMatrix::from_reader(&reader).unwrap();
        for (row, col, value) in [(1, 2, 3.0), (1, 5, -2.0), (2, 1, 7.5)] {
            let got = reloaded.get_value(row, col).unwrap();
            assert!((got - value).abs() <= codec.epsilon() as f64 + 1e-6);
        }
    }
}
