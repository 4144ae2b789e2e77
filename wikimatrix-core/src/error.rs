//! Error types for wikimatrix

use std::io;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Missing or invalid header, footer or trailer index.
    #[error("Corrupt matrix file: {0}")]
    CorruptFile(String),

    /// Row bytes failed structural validation on decode.
    #[error("Corrupt row: {0}")]
    CorruptRow(String),

    #[error("Matrix writer is closed")]
    WriterClosed,

    /// A row handed to us by a caller violates a construction invariant.
    #[error("Invalid row: {0}")]
    InvalidRow(String),

    #[error("Row {0} was already written")]
    DuplicateRow(i32),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True for errors caused by bytes on disk rather than by the caller or the OS.
    pub fn is_corruption(&self) -> bool {
        matches!(self, Error::CorruptFile(_) | Error::CorruptRow(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(Error::DuplicateRow(7).to_string(), "Row 7 was already written");
        assert_eq!(Error::WriterClosed.to_string(), "Matrix writer is closed");
    }

    #[test]
    fn test_corruption_classification() {
        assert!(Error::CorruptFile("footer".into()).is_corruption());
        assert!(Error::CorruptRow("ids".into()).is_corruption());
        assert!(!Error::WriterClosed.is_corruption());
        assert!(!Error::Io(io::Error::other("disk")).is_corruption());
    }
}
