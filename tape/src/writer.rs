//! Tape writer for tooling and test fixtures
//!
//! Writes a placeholder header, streams records, then patches the header
//! with the final timestamps and count on `finish`.

use crate::error::TapeError;
use crate::format::{self, RECORD_TYPE_BAR, TAPE_VERSION, TapeHeader};
use common::{Bar, Ts};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Appends bar records to a new tape file
pub struct TapeWriter {
    file: BufWriter<File>,
    path: PathBuf,
    start_ts: Ts,
    end_ts: Ts,
    record_count: u64,
}

impl TapeWriter {
    /// Create a tape at `path`, truncating any existing file. Parent
    /// directories are created as needed.
    ///
    /// # Errors
    ///
    /// Fails on any I/O error while creating the file or writing the
    /// header placeholder.
    pub fn create(path: &Path) -> Result<Self, TapeError> {
        let io_err = |source| TapeError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .map_err(io_err)?;
        let mut writer = BufWriter::new(file);

        Self::header(Ts::from_nanos(0), Ts::from_nanos(0), 0)
            .write_to(&mut writer)
            .map_err(io_err)?;

        Ok(Self {
            file: writer,
            path: path.to_path_buf(),
            start_ts: Ts::from_nanos(0),
            end_ts: Ts::from_nanos(0),
            record_count: 0,
        })
    }

    /// Append one bar record.
    ///
    /// # Errors
    ///
    /// Fails on any I/O error.
    pub fn append(&mut self, bar: &Bar) -> Result<(), TapeError> {
        format::write_bar(bar, &mut self.file).map_err(|source| TapeError::Io {
            path: self.path.clone(),
            source,
        })?;

        if self.record_count == 0 {
            self.start_ts = bar.ts;
        }
        self.end_ts = bar.ts;
        self.record_count += 1;
        Ok(())
    }

    /// Number of records appended so far
    #[must_use]
    pub const fn record_count(&self) -> u64 {
        self.record_count
    }

    /// Patch the header with final counts and flush.
    ///
    /// # Errors
    ///
    /// Fails on any I/O error while seeking, rewriting, or flushing.
    pub fn finish(mut self) -> Result<(), TapeError> {
        let path = self.path.clone();
        let io_err = |source| TapeError::Io {
            path: path.clone(),
            source,
        };

        self.file.seek(SeekFrom::Start(0)).map_err(io_err)?;
        Self::header(self.start_ts, self.end_ts, self.record_count)
            .write_to(&mut self.file)
            .map_err(io_err)?;
        self.file.flush().map_err(io_err)?;

        debug!(
            path = %self.path.display(),
            records = self.record_count,
            "closed tape"
        );
        Ok(())
    }

    const fn header(start_ts: Ts, end_ts: Ts, record_count: u64) -> TapeHeader {
        TapeHeader {
            version: TAPE_VERSION,
            record_type: RECORD_TYPE_BAR,
            record_size: format::RECORD_SIZE as u32,
            start_ts,
            end_ts,
            record_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::TapeReader;
    use common::Timeframe;
    use std::error::Error;
    use tempfile::TempDir;

    fn bar(ts_ns: u64, close: f64) -> Bar {
        Bar {
            ts: Ts::from_nanos(ts_ns),
            open: close - 0.0002,
            high: close + 0.0005,
            low: close - 0.0005,
            close,
            volume: 100.0,
        }
    }

    fn write_day(dir: &Path, ymd: u32, first_ts: u64, bars: usize) -> Result<(), TapeError> {
        let path = format::tape_path(dir, "EURUSD", Timeframe::M1, ymd);
        let mut writer = TapeWriter::create(&path)?;
        for i in 0..bars {
            writer.append(&bar(
                first_ts + i as u64 * 60_000_000_000,
                1.1 + i as f64 * 1e-4,
            ))?;
        }
        writer.finish()
    }

    #[test]
    fn round_trip_across_day_gap() -> Result<(), Box<dyn Error>> {
        let dir = TempDir::new()?;

        // Friday and Monday; the weekend has no files.
        write_day(dir.path(), 20_240_105, 1_000, 10)?;
        write_day(dir.path(), 20_240_108, 2_000_000, 5)?;

        let mut reader =
            TapeReader::new(dir.path(), "EURUSD", Timeframe::M1, 20_240_101, 20_240_131)?;

        let mut count = 0;
        let mut prev_ts = 0;
        while let Some(b) = reader.next_bar()? {
            assert!(b.ts.as_nanos() > prev_ts || count == 0);
            prev_ts = b.ts.as_nanos();
            count += 1;
        }
        assert_eq!(count, 15);
        Ok(())
    }

    #[test]
    fn header_reflects_appended_records() -> Result<(), Box<dyn Error>> {
        let dir = TempDir::new()?;
        let path = dir.path().join("one.tape");

        let mut writer = TapeWriter::create(&path)?;
        writer.append(&bar(500, 1.2))?;
        writer.append(&bar(600, 1.3))?;
        assert_eq!(writer.record_count(), 2);
        writer.finish()?;

        let bytes = std::fs::read(&path)?;
        let header = TapeHeader::read_from(&bytes)?;
        assert_eq!(header.record_count, 2);
        assert_eq!(header.start_ts, Ts::from_nanos(500));
        assert_eq!(header.end_ts, Ts::from_nanos(600));
        Ok(())
    }
}
