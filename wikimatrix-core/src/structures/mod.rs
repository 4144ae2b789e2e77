mod row;
pub mod row_codec;
mod value_codec;
mod vint;

pub use row::{MatrixRow, RowData, RowLayout};
pub use row_codec::{decode_row, encode_row, encode_row_into, encoded_len};
pub use value_codec::{MAX_SCORE, MIN_SCORE, PACKED_RANGE, ValueCodec};
pub use vint::{read_vint, vint_len, write_vint};
