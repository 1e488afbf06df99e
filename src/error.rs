//! Error types for symspmv

use thiserror::Error;

/// Result type alias using symspmv's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while constructing an engine
#[derive(Error, Debug)]
pub enum Error {
    /// Underlying I/O failure while reading a matrix file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed Matrix Market content
    #[error("malformed Matrix Market data at line {line}: {msg}")]
    Format {
        /// 1-based line number of the offending input line
        line: usize,
        /// What was wrong with it
        msg: String,
    },

    /// An entry's coordinates fall outside the declared matrix dimensions
    #[error("index ({row}, {col}) out of range for a {n_rows}x{n_cols} matrix")]
    IndexOutOfRange {
        /// 0-based row of the entry
        row: usize,
        /// 0-based column of the entry
        col: usize,
        /// Declared number of rows
        n_rows: usize,
        /// Declared number of columns
        n_cols: usize,
    },

    /// The coordinate stream is not sorted by ascending row
    #[error("entry rows must be ascending: row {row} follows row {prev}")]
    NonAscendingRows {
        /// Row of the offending entry
        row: usize,
        /// Row of the preceding entry
        prev: usize,
    },

    /// Invalid engine configuration
    #[error("invalid engine configuration: {0}")]
    Config(String),
}
