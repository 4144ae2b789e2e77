//! On-disk layout of a matrix file.
//!
//! Rows are written first, in submission order, followed by a trailer index
//! and a fixed 16-byte footer that points back at the index:
//! ```text
//! [header: 32 bytes]
//! [row bytes...]
//! [trailer index: (row_id: i32, offset: i64, length: i32) * N]
//! [footer: index_offset(i64) + index_length(i64)]
//! ```
//! All integers are little-endian and every offset is absolute. A file whose
//! footer does not describe a well-formed index ending exactly at the footer
//! is incomplete (the writer never reached `finish`) and is rejected.

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use std::io::{self, Write};

use crate::error::{Error, Result};
use crate::structures::row_codec::ROW_HEADER_SIZE;
use crate::structures::{RowLayout, ValueCodec};

/// Magic number at the start of every matrix file ("WMX1" in LE)
pub const MATRIX_MAGIC: u32 = 0x31584D57;

pub const FORMAT_VERSION: u32 = 1;

/// Header layout: magic(4) + version(4) + layout(4) + dense_num_cols(4) + c1(8) + c2(8)
pub const HEADER_SIZE: u64 = 32;

/// Footer layout: index_offset(8) + index_length(8)
pub const FOOTER_SIZE: u64 = 16;

/// Index entry layout: row_id(4) + offset(8) + length(4)
pub const INDEX_ENTRY_SIZE: u64 = 16;

const LAYOUT_SPARSE: u32 = 0;
const LAYOUT_DENSE: u32 = 1;

/// File-level metadata stored in the header
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatrixHeader {
    pub layout: RowLayout,
    /// Column count of every row in a dense matrix; 0 for sparse matrices
    pub dense_num_cols: u32,
    pub codec: ValueCodec,
}

impl MatrixHeader {
    pub fn sparse(codec: ValueCodec) -> Self {
        Self {
            layout: RowLayout::Sparse,
            dense_num_cols: 0,
            codec,
        }
    }

    pub fn dense(codec: ValueCodec, num_cols: u32) -> Self {
        Self {
            layout: RowLayout::Dense,
            dense_num_cols: num_cols,
            codec,
        }
    }

    /// Width every row must have, for dense layouts
    pub fn dense_width(&self) -> Option<usize> {
        match self.layout {
            RowLayout::Dense => Some(self.dense_num_cols as usize),
            RowLayout::Sparse => None,
        }
    }

    pub fn write<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_u32::<LittleEndian>(MATRIX_MAGIC)?;
        writer.write_u32::<LittleEndian>(FORMAT_VERSION)?;
        writer.write_u32::<LittleEndian>(match self.layout {
            RowLayout::Sparse => LAYOUT_SPARSE,
            RowLayout::Dense => LAYOUT_DENSE,
        })?;
        writer.write_u32::<LittleEndian>(self.dense_num_cols)?;
        writer.write_f64::<LittleEndian>(self.codec.c1())?;
        writer.write_f64::<LittleEndian>(self.codec.c2())?;
        Ok(())
    }

    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE as usize {
            return Err(Error::CorruptFile(format!(
                "header needs {} bytes, got {}",
                HEADER_SIZE,
                bytes.len()
            )));
        }
        let magic = LittleEndian::read_u32(&bytes[0..4]);
        if magic != MATRIX_MAGIC {
            return Err(Error::CorruptFile(format!("bad magic {:#010x}", magic)));
        }
        let version = LittleEndian::read_u32(&bytes[4..8]);
        if version != FORMAT_VERSION {
            return Err(Error::CorruptFile(format!(
                "unsupported format version {}",
                version
            )));
        }
        let layout = match LittleEndian::read_u32(&bytes[8..12]) {
            LAYOUT_SPARSE => RowLayout::Sparse,
            LAYOUT_DENSE => RowLayout::Dense,
            other => {
                return Err(Error::CorruptFile(format!("unknown row layout {}", other)));
            }
        };
        let dense_num_cols = LittleEndian::read_u32(&bytes[12..16]);
        let c1 = LittleEndian::read_f64(&bytes[16..24]);
        let c2 = LittleEndian::read_f64(&bytes[24..32]);
        if !(c1.is_finite() && c1 > 0.0 && c2.is_finite()) {
            return Err(Error::CorruptFile(format!(
                "invalid codec parameters c1={} c2={}",
                c1, c2
            )));
        }
        Ok(Self {
            layout,
            dense_num_cols,
            codec: ValueCodec::new(c1, c2),
        })
    }
}

/// Location of one row in the file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    pub row_id: i32,
    pub offset: u64,
    pub length: u32,
}

impl IndexEntry {
    pub fn range(&self) -> std::ops::Range<u64> {
        self.offset..self.offset + self.length as u64
    }
}

/// Position of the trailer index, read from the last 16 bytes of a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Footer {
    pub index_offset: u64,
    pub index_length: u64,
}

impl Footer {
    /// Parse and validate a footer against the total file length
    pub fn parse(bytes: &[u8], file_len: u64) -> Result<Self> {
        if bytes.len() != FOOTER_SIZE as usize {
            return Err(Error::CorruptFile("truncated footer".into()));
        }
        let index_offset = LittleEndian::read_i64(&bytes[0..8]);
        let index_length = LittleEndian::read_i64(&bytes[8..16]);
        let (Ok(index_offset), Ok(index_length)) =
            (u64::try_from(index_offset), u64::try_from(index_length))
        else {
            return Err(Error::CorruptFile(format!(
                "negative index bounds {} / {}",
                index_offset, index_length
            )));
        };
        let expected_end = index_offset
            .checked_add(index_length)
            .and_then(|end| end.checked_add(FOOTER_SIZE));
        if index_offset < HEADER_SIZE || expected_end != Some(file_len) {
            return Err(Error::CorruptFile(format!(
                "footer describes index at {}+{} but file is {} bytes",
                index_offset, index_length, file_len
            )));
        }
        if index_length % INDEX_ENTRY_SIZE != 0 {
            return Err(Error::CorruptFile(format!(
                "index length {} is not a multiple of {}",
                index_length, INDEX_ENTRY_SIZE
            )));
        }
        Ok(Self {
            index_offset,
            index_length,
        })
    }

    pub fn num_entries(&self) -> usize {
        (self.index_length / INDEX_ENTRY_SIZE) as usize
    }
}

/// Write the trailer index followed by the footer.
///
/// `index_offset` is the current file position (where the index starts).
/// Returns the number of bytes written.
pub fn write_index_and_footer(
    writer: &mut (impl Write + ?Sized),
    index: &[IndexEntry],
    index_offset: u64,
) -> io::Result<u64> {
    for entry in index {
        writer.write_i32::<LittleEndian>(entry.row_id)?;
        writer.write_i64::<LittleEndian>(entry.offset as i64)?;
        writer.write_i32::<LittleEndian>(entry.length as i32)?;
    }
    let index_length = index.len() as u64 * INDEX_ENTRY_SIZE;
    writer.write_i64::<LittleEndian>(index_offset as i64)?;
    writer.write_i64::<LittleEndian>(index_length as i64)?;
    Ok(index_length + FOOTER_SIZE)
}

/// Parse trailer index bytes, checking every entry lies inside the row area
pub fn parse_index(bytes: &[u8], footer: &Footer) -> Result<Vec<IndexEntry>> {
    if bytes.len() as u64 != footer.index_length {
        return Err(Error::CorruptFile("truncated trailer index".into()));
    }
    let mut entries = Vec::with_capacity(footer.num_entries());
    for chunk in bytes.chunks_exact(INDEX_ENTRY_SIZE as usize) {
        let row_id = LittleEndian::read_i32(&chunk[0..4]);
        let offset = LittleEndian::read_i64(&chunk[4..12]);
        let length = LittleEndian::read_i32(&chunk[12..16]);
        let valid = offset >= HEADER_SIZE as i64
            && length >= ROW_HEADER_SIZE as i32
            && (offset as u64)
                .checked_add(length as u64)
                .is_some_and(|end| end <= footer.index_offset);
        if !valid {
            return Err(Error::CorruptFile(format!(
                "index entry for row {} points outside the row area ({}+{})",
                row_id, offset, length
            )));
        }
        entries.push(IndexEntry {
            row_id,
            offset: offset as u64,
            length: length as u32,
        });
    }
    Ok(entries)
}
