//! A single matrix row with quantized values
//!
//! Sparse rows keep parallel `col_ids` / `codes` arrays sorted by column id,
//! which gives `O(log n)` lookups and lets two rows be intersected with a
//! single two-pointer walk. Dense rows store one code per column of a fixed
//! matrix-wide universe `0..num_cols`.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use super::value_codec::ValueCodec;
use crate::error::{Error, Result};

/// Physical layout of the rows in a matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RowLayout {
    #[default]
    Sparse,
    Dense,
}

/// Row payload: either sorted (column id, code) pairs or a fixed-width code array
#[derive(Debug, Clone, PartialEq)]
pub enum RowData {
    Sparse { col_ids: Vec<i32>, codes: Vec<i16> },
    Dense { codes: Vec<i16> },
}

/// One row of a matrix together with the codec its codes were packed with
#[derive(Debug, Clone, PartialEq)]
pub struct MatrixRow {
    row_id: i32,
    data: RowData,
    codec: ValueCodec,
}

impl MatrixRow {
    /// Build a sparse row from unsorted `(column id, value)` pairs
    pub fn sparse<I>(row_id: i32, codec: ValueCodec, entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (i32, f32)>,
    {
        let mut pairs: Vec<(i32, i16)> = entries
            .into_iter()
            .map(|(col, value)| (col, codec.pack(value)))
            .collect();
        pairs.sort_unstable_by_key(|&(col, _)| col);
        let (col_ids, codes) = pairs.into_iter().unzip();
        Self::checked_sparse(row_id, codec, col_ids, codes)
    }

    /// Build a sparse row from already-packed codes.
    ///
    /// Columns are reordered by id if necessary; duplicate ids are rejected.
    pub fn sparse_from_codes(
        row_id: i32,
        codec: ValueCodec,
        col_ids: Vec<i32>,
        codes: Vec<i16>,
    ) -> Result<Self> {
        if col_ids.len() != codes.len() {
            return Err(Error::InvalidRow(format!(
                "row {}: {} column ids but {} codes",
                row_id,
                col_ids.len(),
                codes.len()
            )));
        }
        if is_non_decreasing(&col_ids) {
            return Self::checked_sparse(row_id, codec, col_ids, codes);
        }
        let mut pairs: Vec<(i32, i16)> = col_ids.into_iter().zip(codes).collect();
        pairs.sort_unstable_by_key(|&(col, _)| col);
        let (col_ids, codes) = pairs.into_iter().unzip();
        Self::checked_sparse(row_id, codec, col_ids, codes)
    }

    fn checked_sparse(
        row_id: i32,
        codec: ValueCodec,
        col_ids: Vec<i32>,
        codes: Vec<i16>,
    ) -> Result<Self> {
        if let Some(w) = col_ids.windows(2).find(|w| w[0] >= w[1]) {
            return Err(Error::InvalidRow(format!(
                "row {}: duplicate column id {}",
                row_id, w[0]
            )));
        }
        Ok(Self {
            row_id,
            data: RowData::Sparse { col_ids, codes },
            codec,
        })
    }

    /// Build a dense row; column `i` holds `values[i]`
    pub fn dense(row_id: i32, codec: ValueCodec, values: &[f32]) -> Self {
        let codes = values.iter().map(|&v| codec.pack(v)).collect();
        Self::dense_from_codes(row_id, codec, codes)
    }

    pub fn dense_from_codes(row_id: i32, codec: ValueCodec, codes: Vec<i16>) -> Self {
        Self {
            row_id,
            data: RowData::Dense { codes },
            codec,
        }
    }

    /// Assemble a row whose invariants were already verified by the caller
    pub(crate) fn from_parts(row_id: i32, data: RowData, codec: ValueCodec) -> Self {
        Self {
            row_id,
            data,
            codec,
        }
    }

    #[inline]
    pub fn row_id(&self) -> i32 {
        self.row_id
    }

    #[inline]
    pub fn codec(&self) -> &ValueCodec {
        &self.codec
    }

    #[inline]
    pub fn data(&self) -> &RowData {
        &self.data
    }

    pub fn layout(&self) -> RowLayout {
        match self.data {
            RowData::Sparse { .. } => RowLayout::Sparse,
            RowData::Dense { .. } => RowLayout::Dense,
        }
    }

    /// Number of stored columns
    #[inline]
    pub fn num_cols(&self) -> usize {
        self.codes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.num_cols() == 0
    }

    /// Column ids of a sparse row; `None` for dense rows
    pub fn col_ids(&self) -> Option<&[i32]> {
        match &self.data {
            RowData::Sparse { col_ids, .. } => Some(col_ids),
            RowData::Dense { .. } => None,
        }
    }

    #[inline]
    pub fn codes(&self) -> &[i16] {
        match &self.data {
            RowData::Sparse { codes, .. } | RowData::Dense { codes } => codes,
        }
    }

    /// Column id of the `i`-th stored entry
    #[inline]
    pub fn col_id(&self, i: usize) -> i32 {
        match &self.data {
            RowData::Sparse { col_ids, .. } => col_ids[i],
            RowData::Dense { .. } => i as i32,
        }
    }

    /// Decoded value of the `i`-th stored entry
    #[inline]
    pub fn value_at(&self, i: usize) -> f32 {
        self.codec.unpack(self.codes()[i])
    }

    /// Position of `col` among the stored entries
    pub fn position(&self, col: i32) -> Option<usize> {
        match &self.data {
            RowData::Sparse { col_ids, .. } => col_ids.binary_search(&col).ok(),
            RowData::Dense { codes } => {
                usize::try_from(col).ok().filter(|&i| i < codes.len())
            }
        }
    }

    pub fn get_code(&self, col: i32) -> Option<i16> {
        self.position(col).map(|i| self.codes()[i])
    }

    pub fn get_value(&self, col: i32) -> Option<f32> {
        self.get_code(col).map(|code| self.codec.unpack(code))
    }

    /// Iterate `(column id, value)` in column order
    pub fn iter(&self) -> impl Iterator<Item = (i32, f32)> + '_ {
        self.iter_codes()
            .map(move |(col, code)| (col, self.codec.unpack(code)))
    }

    /// Iterate `(column id, code)` in column order
    pub fn iter_codes(&self) -> impl Iterator<Item = (i32, i16)> + '_ {
        self.codes()
            .iter()
            .enumerate()
            .map(move |(i, &code)| (self.col_id(i), code))
    }

    /// Call `f(col, self_code, other_code)` once for every column present in
    /// both rows, in increasing column order.
    pub fn for_each_common_column<F>(&self, other: &MatrixRow, mut f: F)
    where
        F: FnMut(i32, i16, i16),
    {
        match (&self.data, &other.data) {
            (
                RowData::Sparse {
                    col_ids: a_ids,
                    codes: a_codes,
                },
                RowData::Sparse {
                    col_ids: b_ids,
                    codes: b_codes,
                },
            ) => {
                let mut i = 0;
                let mut j = 0;
                while i < a_ids.len() && j < b_ids.len() {
                    match a_ids[i].cmp(&b_ids[j]) {
                        Ordering::Less => i += 1,
                        Ordering::Greater => j += 1,
                        Ordering::Equal => {
                            f(a_ids[i], a_codes[i], b_codes[j]);
                            i += 1;
                            j += 1;
                        }
                    }
                }
            }
            (RowData::Sparse { col_ids, codes }, RowData::Dense { codes: dense }) => {
                for (&col, &code) in col_ids.iter().zip(codes) {
                    if let Some(&other_code) = usize::try_from(col).ok().and_then(|c| dense.get(c))
                    {
                        f(col, code, other_code);
                    }
                }
            }
            (RowData::Dense { codes: dense }, RowData::Sparse { col_ids, codes }) => {
                for (&col, &code) in col_ids.iter().zip(codes) {
                    if let Some(&self_code) = usize::try_from(col).ok().and_then(|c| dense.get(c)) {
                        f(col, self_code, code);
                    }
                }
            }
            (RowData::Dense { codes: a }, RowData::Dense { codes: b }) => {
                for (i, (&x, &y)) in a.iter().zip(b).enumerate() {
                    f(i as i32, x, y);
                }
            }
        }
    }

    /// Dot product over the shared columns of two rows
    pub fn dot(&self, other: &MatrixRow) -> f64 {
        let mut sum = 0.0f64;
        self.for_each_common_column(other, |_, a, b| {
            sum += self.codec.unpack(a) as f64 * other.codec.unpack(b) as f64;
        });
        sum
    }

    /// L2 norm of the decoded values
    pub fn norm(&self) -> f64 {
        self.codes()
            .iter()
            .map(|&c| {
                let v = self.codec.unpack(c) as f64;
                v * v
            })
            .sum::<f64>()
            .sqrt()
    }

    /// Cosine similarity; 0.0 when either row has zero norm
    pub fn cosine_similarity(&self, other: &MatrixRow) -> f64 {
        let denom = self.norm() * other.norm();
        if denom == 0.0 {
            0.0
        } else {
            self.dot(other) / denom
        }
    }

    /// Re-quantize this row into `codec`
    pub fn with_codec(self, codec: ValueCodec) -> Self {
        if self.codec.almost_eq(&codec) {
            return Self { codec, ..self };
        }
        let old = self.codec;
        let data = match self.data {
            RowData::Sparse { col_ids, codes } => RowData::Sparse {
                col_ids,
                codes: codes.iter().map(|&c| codec.transcode(c, &old)).collect(),
            },
            RowData::Dense { codes } => RowData::Dense {
                codes: codes.iter().map(|&c| codec.transcode(c, &old)).collect(),
            },
        };
        Self {
            row_id: self.row_id,
            data,
            codec,
        }
    }
}

fn is_non_decreasing(ids: &[i32]) -> bool {
    ids.windows(2).all(|w| w[0] <= w[1])
}
