//! Binary encoding of a single row
//!
//! ```text
//! sparse: row_id(i32) num_cols(i32) vint(first id as u32) vint(gap)*(n-1) codes(i16 * n)
//! dense:  row_id(i32) num_cols(i32) codes(i16 * n)
//! ```
//!
//! All fixed-width fields are little-endian. Column ids are strictly
//! increasing, so every gap after the first id is at least 1.
//!
//! Decoding is the one place where row bytes are validated: a declared
//! column count that disagrees with the bytes available, or ids that do not
//! strictly increase, fail with `Error::CorruptRow`.

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};

use super::row::{MatrixRow, RowData, RowLayout};
use super::value_codec::ValueCodec;
use super::vint::{read_vint, vint_len, write_vint};
use crate::error::{Error, Result};

/// row_id(4) + num_cols(4)
pub const ROW_HEADER_SIZE: usize = 8;

/// Append the encoding of `row` to `out`
pub fn encode_row_into(row: &MatrixRow, out: &mut Vec<u8>) {
    out.reserve(encoded_len(row));
    let n = row.num_cols();
    // Writes into a Vec cannot fail.
    let _ = out.write_i32::<LittleEndian>(row.row_id());
    let _ = out.write_i32::<LittleEndian>(n as i32);
    if let RowData::Sparse { col_ids, .. } = row.data() {
        let mut prev: Option<i32> = None;
        for &col in col_ids {
            let gap = match prev {
                None => col as u32,
                Some(p) => col.wrapping_sub(p) as u32,
            };
            let _ = write_vint(out, gap as u64);
            prev = Some(col);
        }
    }
    let start = out.len();
    out.resize(start + 2 * n, 0);
    LittleEndian::write_i16_into(row.codes(), &mut out[start..]);
}

/// Encode `row` into a fresh buffer
pub fn encode_row(row: &MatrixRow) -> Vec<u8> {
    let mut out = Vec::new();
    encode_row_into(row, &mut out);
    out
}

/// Exact size of the encoding of `row`
pub fn encoded_len(row: &MatrixRow) -> usize {
    let ids = match row.data() {
        RowData::Sparse { col_ids, .. } => {
            let mut prev: Option<i32> = None;
            col_ids
                .iter()
                .map(|&col| {
                    let gap = match prev {
                        None => col as u32,
                        Some(p) => col.wrapping_sub(p) as u32,
                    };
                    prev = Some(col);
                    vint_len(gap as u64)
                })
                .sum()
        }
        RowData::Dense { .. } => 0,
    };
    ROW_HEADER_SIZE + ids + 2 * row.num_cols()
}

/// Read only the row id of an encoded row
pub fn peek_row_id(bytes: &[u8]) -> Result<i32> {
    if bytes.len() < ROW_HEADER_SIZE {
        return Err(Error::CorruptRow(format!(
            "row needs at least {} bytes, got {}",
            ROW_HEADER_SIZE,
            bytes.len()
        )));
    }
    Ok(LittleEndian::read_i32(&bytes[0..4]))
}

/// Decode a row written by `encode_row`.
///
/// `dense_width` is the matrix-wide column count for dense layouts; rows of
/// a different width are rejected.
pub fn decode_row(
    bytes: &[u8],
    layout: RowLayout,
    codec: ValueCodec,
    dense_width: Option<usize>,
) -> Result<MatrixRow> {
    let row_id = peek_row_id(bytes)?;
    let declared = LittleEndian::read_i32(&bytes[4..8]);
    let num_cols = usize::try_from(declared).map_err(|_| {
        Error::CorruptRow(format!(
            "row {}: negative column count {}",
            row_id, declared
        ))
    })?;
    let mut rest = &bytes[ROW_HEADER_SIZE..];

    let data = match layout {
        RowLayout::Sparse => {
            // Every column needs at least one id byte and two code bytes.
            if num_cols.saturating_mul(3) > rest.len() {
                return Err(length_mismatch(row_id, num_cols, bytes.len()));
            }
            let col_ids = read_col_ids(&mut rest, row_id, num_cols)?;
            let codes = read_codes(rest, row_id, num_cols, bytes.len())?;
            RowData::Sparse { col_ids, codes }
        }
        RowLayout::Dense => {
            if let Some(width) = dense_width
                && width != num_cols
            {
                return Err(Error::CorruptRow(format!(
                    "row {}: dense row has {} columns, matrix has {}",
                    row_id, num_cols, width
                )));
            }
            let codes = read_codes(rest, row_id, num_cols, bytes.len())?;
            RowData::Dense { codes }
        }
    };
    Ok(MatrixRow::from_parts(row_id, data, codec))
}

fn read_col_ids(rest: &mut &[u8], row_id: i32, num_cols: usize) -> Result<Vec<i32>> {
    let mut col_ids = Vec::with_capacity(num_cols);
    let mut prev: i64 = 0;
    for i in 0..num_cols {
        let raw = read_vint(rest).map_err(|e| {
            Error::CorruptRow(format!("row {}: bad column id #{}: {}", row_id, i, e))
        })?;
        let raw = u32::try_from(raw).map_err(|_| {
            Error::CorruptRow(format!("row {}: column gap {} exceeds 32 bits", row_id, raw))
        })?;
        let col = if i == 0 {
            raw as i32 as i64
        } else {
            if raw == 0 {
                return Err(Error::CorruptRow(format!(
                    "row {}: column ids not strictly increasing at #{}",
                    row_id, i
                )));
            }
            prev + raw as i64
        };
        if col > i32::MAX as i64 {
            return Err(Error::CorruptRow(format!(
                "row {}: column id overflow at #{}",
                row_id, i
            )));
        }
        col_ids.push(col as i32);
        prev = col;
    }
    Ok(col_ids)
}

fn read_codes(rest: &[u8], row_id: i32, num_cols: usize, total: usize) -> Result<Vec<i16>> {
    if rest.len() != num_cols.saturating_mul(2) {
        return Err(length_mismatch(row_id, num_cols, total));
    }
    let mut codes = vec![0i16; num_cols];
    LittleEndian::read_i16_into(rest, &mut codes);
    Ok(codes)
}

fn length_mismatch(row_id: i32, num_cols: usize, total: usize) -> Error {
    Error::CorruptRow(format!(
        "row {}: {} columns declared but row is {} bytes",
        row_id, num_cols, total
    ))
}

/// Visit the cells of an encoded row without building a `MatrixRow`.
///
/// Calls `f(row_id, col, code)` for each stored column; used by full scans
/// that only need to route cells (transposition).
pub fn for_each_cell(
    bytes: &[u8],
    layout: RowLayout,
    mut f: impl FnMut(i32, i32, i16),
) -> Result<()> {
    let row_id = peek_row_id(bytes)?;
    let mut cursor = &bytes[4..];
    let num_cols = cursor
        .read_i32::<LittleEndian>()
        .map_err(|e| Error::CorruptRow(e.to_string()))?;
    let num_cols = usize::try_from(num_cols)
        .map_err(|_| Error::CorruptRow(format!("row {}: negative column count", row_id)))?;
    match layout {
        RowLayout::Sparse => {
            if num_cols.saturating_mul(3) > cursor.len() {
                return Err(length_mismatch(row_id, num_cols, bytes.len()));
            }
            let col_ids = read_col_ids(&mut cursor, row_id, num_cols)?;
            if cursor.len() != num_cols * 2 {
                return Err(length_mismatch(row_id, num_cols, bytes.len()));
            }
            for (i, col) in col_ids.into_iter().enumerate() {
                f(row_id, col, LittleEndian::read_i16(&cursor[2 * i..2 * i + 2]));
            }
        }
        RowLayout::Dense => {
            if cursor.len() != num_cols * 2 {
                return Err(length_mismatch(row_id, num_cols, bytes.len()));
            }
            for i in 0..num_cols {
                f(row_id, i as i32, LittleEndian::read_i16(&cursor[2 * i..2 * i + 2]));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> ValueCodec {
        ValueCodec::default()
    }

    #[test]
    fn test_sparse_encoding_layout() {
        let row = MatrixRow::sparse(1, codec(), [(3, 1.0), (9, 0.7)]).unwrap();
        let bytes = encode_row(&row);
        assert_eq!(bytes.len(), encoded_len(&row));
        // header + two one-byte gaps (3, 6) + two codes
        assert_eq!(bytes.len(), 8 + 2 + 4);
        assert_eq!(&bytes[0..4], &1i32.to_le_bytes());
        assert_eq!(&bytes[4..8], &2i32.to_le_bytes());
        assert_eq!(bytes[8], 3);
        assert_eq!(bytes[9], 6);

        let decoded = decode_row(&bytes, RowLayout::Sparse, codec(), None).unwrap();
        assert_eq!(decoded, row);
    }

    #[test]
    fn test_negative_and_extreme_ids() {
        let row = MatrixRow::sparse(
            -5,
            codec(),
            [(i32::MIN, 0.1), (-1, 0.2), (0, 0.3), (i32::MAX, 0.4)],
        )
        .unwrap();
        let bytes = encode_row(&row);
        assert_eq!(bytes.len(), encoded_len(&row));
        let decoded = decode_row(&bytes, RowLayout::Sparse, codec(), None).unwrap();
        assert_eq!(decoded.col_ids(), row.col_ids());
        assert_eq!(decoded.row_id(), -5);
    }

    #[test]
    fn test_dense_encoding() {
        let row = MatrixRow::dense(7, codec(), &[0.1, -0.2, 0.3]);
        let bytes = encode_row(&row);
        assert_eq!(bytes.len(), 8 + 6);
        let decoded = decode_row(&bytes, RowLayout::Dense, codec(), Some(3)).unwrap();
        assert_eq!(decoded, row);

        let err = decode_row(&bytes, RowLayout::Dense, codec(), Some(4)).unwrap_err();
        assert!(matches!(err, Error::CorruptRow(_)));
    }

    #[test]
    fn test_empty_row() {
        let row = MatrixRow::sparse(3, codec(), std::iter::empty()).unwrap();
        let bytes = encode_row(&row);
        assert_eq!(bytes.len(), ROW_HEADER_SIZE);
        let decoded = decode_row(&bytes, RowLayout::Sparse, codec(), None).unwrap();
        assert!(decoded.is_empty());
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let row = MatrixRow::sparse(1, codec(), [(3, 1.0), (9, 0.7)]).unwrap();
        let mut bytes = encode_row(&row);

        // Truncated codes
        let short = &bytes[..bytes.len() - 1];
        assert!(matches!(
            decode_row(short, RowLayout::Sparse, codec(), None),
            Err(Error::CorruptRow(_))
        ));

        // Trailing garbage
        bytes.push(0);
        assert!(matches!(
            decode_row(&bytes, RowLayout::Sparse, codec(), None),
            Err(Error::CorruptRow(_))
        ));

        // Declared count far larger than the payload
        let mut huge = encode_row(&row);
        huge[4..8].copy_from_slice(&1_000_000i32.to_le_bytes());
        assert!(matches!(
            decode_row(&huge, RowLayout::Sparse, codec(), None),
            Err(Error::CorruptRow(_))
        ));

        // Too short for a header
        assert!(matches!(
            decode_row(&[1, 2, 3], RowLayout::Sparse, codec(), None),
            Err(Error::CorruptRow(_))
        ));
    }

    #[test]
    fn test_non_increasing_ids_rejected() {
        let row = MatrixRow::sparse(1, codec(), [(3, 1.0), (9, 0.7)]).unwrap();
        let mut bytes = encode_row(&row);
        // Second gap of zero repeats column 3
        bytes[9] = 0;
        let err = decode_row(&bytes, RowLayout::Sparse, codec(), None).unwrap_err();
        assert!(matches!(err, Error::CorruptRow(_)));
        assert!(err.to_string().contains("strictly increasing"));
    }

    #[test]
    fn test_for_each_cell_matches_decode() {
        let row = MatrixRow::sparse(11, codec(), [(2, 0.5), (40, -0.25), (41, 0.0)]).unwrap();
        let bytes = encode_row(&row);
        let mut cells = Vec::new();
        for_each_cell(&bytes, RowLayout::Sparse, |r, c, v| cells.push((r, c, v))).unwrap();
        let expected: Vec<(i32, i32, i16)> = row.iter_codes().map(|(c, v)| (11, c, v)).collect();
        assert_eq!(cells, expected);
    }
}
