//! Columnar bar tapes: on-disk format, memory-mapped streaming reader, writer
//!
//! A tape holds one day of bars for one symbol and timeframe. Readers stream
//! across a date range, skipping days with no file.

#![deny(warnings)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![deny(dead_code)]
#![deny(unused)]
#![deny(missing_docs)]
#![allow(unsafe_code)] // read-only memory mapping of tape files

pub mod date;
pub mod error;
pub mod format;
pub mod reader;
pub mod writer;

pub use error::TapeError;
pub use format::{TapeHeader, tape_path};
pub use reader::TapeReader;
pub use writer::TapeWriter;
