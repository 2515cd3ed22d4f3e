//! Streaming tape reader over a date range
//!
//! Maps one day file at a time; the previous mapping is released when the
//! next day opens. Days without a file are skipped silently.

use crate::date::{next_day, ymd_to_date};
use crate::error::TapeError;
use crate::format::{self, HEADER_SIZE, RECORD_SIZE, RECORD_TYPE_BAR, TAPE_VERSION, TapeHeader};
use common::{Bar, Timeframe};
use memmap2::Mmap;
use std::fs::File;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug)]
struct CurrentTape {
    map: Mmap,
    path: PathBuf,
    record_count: u64,
    next_record: u64,
}

/// Streams bars from tape files across an inclusive YYYYMMDD date range
#[derive(Debug)]
pub struct TapeReader {
    base_dir: PathBuf,
    symbol: String,
    timeframe: Timeframe,
    end_ymd: u32,
    /// Next candidate day to open; `None` once the range is exhausted
    current_day: Option<u32>,
    current: Option<CurrentTape>,
}

impl TapeReader {
    /// Create a reader for `[start_ymd, end_ymd]`.
    ///
    /// # Errors
    ///
    /// Fails if the range is inverted or either endpoint is not a valid
    /// calendar date. No file is touched until the first [`Self::next_bar`].
    pub fn new(
        base_dir: &Path,
        symbol: &str,
        timeframe: Timeframe,
        start_ymd: u32,
        end_ymd: u32,
    ) -> Result<Self, TapeError> {
        if end_ymd < start_ymd {
            return Err(TapeError::InvalidRange {
                start: start_ymd,
                end: end_ymd,
            });
        }
        for ymd in [start_ymd, end_ymd] {
            if ymd_to_date(ymd).is_none() {
                return Err(TapeError::InvalidDate(ymd));
            }
        }

        Ok(Self {
            base_dir: base_dir.to_path_buf(),
            symbol: symbol.to_string(),
            timeframe,
            end_ymd,
            current_day: Some(start_ymd),
            current: None,
        })
    }

    /// Symbol this reader streams
    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Timeframe this reader streams
    #[must_use]
    pub const fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    /// Pull the next bar, or `Ok(None)` at end of range.
    ///
    /// # Errors
    ///
    /// Propagates I/O failures other than "not found" and any structural
    /// violation of the tape format.
    pub fn next_bar(&mut self) -> Result<Option<Bar>, TapeError> {
        loop {
            if let Some(tape) = &mut self.current {
                if tape.next_record < tape.record_count {
                    let offset = HEADER_SIZE + usize::try_from(tape.next_record).map_err(
                        |_| TapeError::Format {
                            path: tape.path.clone(),
                            reason: "record index exceeds address space".to_string(),
                        },
                    )? * RECORD_SIZE;
                    let bar = format::read_bar(&tape.map[offset..offset + RECORD_SIZE])
                        .map_err(|e| TapeError::Io {
                            path: tape.path.clone(),
                            source: e,
                        })?;
                    tape.next_record += 1;
                    return Ok(Some(bar));
                }
            }

            if !self.open_next_tape()? {
                return Ok(None);
            }
        }
    }

    /// Open the next existing day file in the range. Returns `false` when
    /// the range is exhausted.
    fn open_next_tape(&mut self) -> Result<bool, TapeError> {
        // Drop the previous mapping before opening another file.
        self.current = None;

        while let Some(day) = self.current_day {
            let path = format::tape_path(&self.base_dir, &self.symbol, self.timeframe, day);
            self.current_day = next_day(day).filter(|&d| d <= self.end_ymd);

            let file = match File::open(&path) {
                Ok(f) => f,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(TapeError::Io { path, source: e }),
            };

            // SAFETY: the mapping is read-only and private to this reader;
            // tape files are treated as immutable once written.
            let map = unsafe { Mmap::map(&file) }.map_err(|e| TapeError::Io {
                path: path.clone(),
                source: e,
            })?;

            let header = Self::validate(&map, &path)?;
            debug!(
                path = %path.display(),
                records = header.record_count,
                "opened tape"
            );

            self.current = Some(CurrentTape {
                map,
                path,
                record_count: header.record_count,
                next_record: 0,
            });
            return Ok(true);
        }

        Ok(false)
    }

    fn validate(map: &Mmap, path: &Path) -> Result<TapeHeader, TapeError> {
        let fail = |reason: String| TapeError::Format {
            path: path.to_path_buf(),
            reason,
        };

        if map.len() < HEADER_SIZE {
            return Err(fail(format!(
                "file too small for header: {} bytes",
                map.len()
            )));
        }

        let header = TapeHeader::read_from(&map[..HEADER_SIZE])
            .map_err(|e| fail(e.to_string()))?;

        if header.version != TAPE_VERSION {
            return Err(fail(format!("unsupported version: {}", header.version)));
        }
        if header.record_type != RECORD_TYPE_BAR {
            return Err(fail(format!(
                "expected record type {RECORD_TYPE_BAR}, got {}",
                header.record_type
            )));
        }
        if header.record_size as usize != RECORD_SIZE {
            return Err(fail(format!("bad record size: {}", header.record_size)));
        }

        let capacity = (map.len() - HEADER_SIZE) as u64 / RECORD_SIZE as u64;
        if header.record_count > capacity {
            return Err(fail(format!(
                "record_count {} exceeds file capacity {capacity}",
                header.record_count
            )));
        }

        Ok(header)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn inverted_range_rejected() {
        let err = TapeReader::new(Path::new("."), "EURUSD", Timeframe::M1, 20_240_201, 20_240_101)
            .unwrap_err();
        assert!(matches!(err, TapeError::InvalidRange { .. }));
    }

    #[test]
    fn invalid_date_rejected() {
        let err = TapeReader::new(Path::new("."), "EURUSD", Timeframe::M1, 20_240_230, 20_240_301)
            .unwrap_err();
        assert!(matches!(err, TapeError::InvalidDate(20_240_230)));
    }

    #[test]
    fn empty_range_yields_no_bars() -> Result<(), Box<dyn Error>> {
        let dir = TempDir::new()?;
        let mut reader =
            TapeReader::new(dir.path(), "EURUSD", Timeframe::M1, 20_240_101, 20_240_107)?;
        assert!(reader.next_bar()?.is_none());
        // End of stream is sticky, not an error.
        assert!(reader.next_bar()?.is_none());
        Ok(())
    }

    #[test]
    fn corrupt_magic_is_fatal() -> Result<(), Box<dyn Error>> {
        let dir = TempDir::new()?;
        let path = format::tape_path(dir.path(), "EURUSD", Timeframe::M1, 20_240_102);
        fs::create_dir_all(path.parent().ok_or("no parent")?)?;
        fs::write(&path, vec![0u8; HEADER_SIZE])?;

        let mut reader =
            TapeReader::new(dir.path(), "EURUSD", Timeframe::M1, 20_240_101, 20_240_107)?;
        let err = reader.next_bar().unwrap_err();
        assert!(matches!(err, TapeError::Format { .. }));
        Ok(())
    }

    #[test]
    fn overlong_record_count_is_fatal() -> Result<(), Box<dyn Error>> {
        let dir = TempDir::new()?;
        let path = format::tape_path(dir.path(), "EURUSD", Timeframe::M1, 20_240_102);
        fs::create_dir_all(path.parent().ok_or("no parent")?)?;

        let header = TapeHeader {
            version: TAPE_VERSION,
            record_type: RECORD_TYPE_BAR,
            record_size: RECORD_SIZE as u32,
            start_ts: common::Ts::from_nanos(0),
            end_ts: common::Ts::from_nanos(0),
            record_count: 1_000,
        };
        let mut bytes = Vec::new();
        header.write_to(&mut bytes)?;
        fs::write(&path, bytes)?;

        let mut reader =
            TapeReader::new(dir.path(), "EURUSD", Timeframe::M1, 20_240_101, 20_240_107)?;
        let err = reader.next_bar().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("record_count"), "unexpected error: {msg}");
        Ok(())
    }

    #[test]
    fn truncated_header_is_fatal() -> Result<(), Box<dyn Error>> {
        let dir = TempDir::new()?;
        let path = format::tape_path(dir.path(), "EURUSD", Timeframe::M1, 20_240_102);
        fs::create_dir_all(path.parent().ok_or("no parent")?)?;
        fs::write(&path, b"TAPEv001")?;

        let mut reader =
            TapeReader::new(dir.path(), "EURUSD", Timeframe::M1, 20_240_101, 20_240_107)?;
        let err = reader.next_bar().unwrap_err();
        assert!(err.to_string().contains("too small"));
        Ok(())
    }
}
