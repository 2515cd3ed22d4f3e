//! Error types for tape construction and streaming

use std::path::PathBuf;
use thiserror::Error;

/// Tape-specific error types
#[derive(Debug, Error)]
pub enum TapeError {
    /// The requested date range is inverted
    #[error("invalid range: start {start} is after end {end}")]
    InvalidRange {
        /// Requested start date (YYYYMMDD)
        start: u32,
        /// Requested end date (YYYYMMDD)
        end: u32,
    },

    /// A range endpoint is not a valid Gregorian calendar date
    #[error("invalid date: {0}")]
    InvalidDate(u32),

    /// An I/O operation on a tape file failed
    #[error("{}: {source}", path.display())]
    Io {
        /// File the operation touched
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// A tape file violates the on-disk format
    #[error("{}: {reason}", path.display())]
    Format {
        /// Offending file
        path: PathBuf,
        /// What the validation found
        reason: String,
    },
}
