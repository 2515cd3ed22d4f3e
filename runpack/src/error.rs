//! Error types for run-pack serialization

use thiserror::Error;

/// Run-pack specific error types
#[derive(Debug, Error)]
pub enum PackError {
    /// An I/O operation failed
    #[error("run pack i/o: {0}")]
    Io(#[from] std::io::Error),

    /// The file does not start with the run-pack magic
    #[error("bad magic: {0:#018x}")]
    BadMagic(u64),

    /// The format version is not supported
    #[error("unsupported version: {0}")]
    BadVersion(u32),

    /// The endian canary is byte-swapped or unknown
    #[error("bad endian canary: {0:#010x}")]
    BadEndian(u32),

    /// A series column does not match the ts column length
    #[error("column {name} has {len} elements, expected {expected}")]
    LengthMismatch {
        /// Offending column name
        name: String,
        /// Its element count
        len: u64,
        /// The ts column element count
        expected: u64,
    },

    /// A blob or table extends past the end of the file
    #[error("truncated file: {0}")]
    Truncated(&'static str),
}
