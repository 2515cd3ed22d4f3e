//! On-disk tape layout: 72-byte header followed by packed 44-byte records
//!
//! All integers and floats are little-endian.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use common::{Bar, Timeframe, Ts};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

/// Magic bytes opening every tape file
pub const TAPE_MAGIC: [u8; 8] = *b"TAPEv001";

/// Current tape format version
pub const TAPE_VERSION: u32 = 1;

/// Record type tag for 1-minute bars (the only type in format v1)
pub const RECORD_TYPE_BAR: u32 = 2;

/// Size of the tape header in bytes
pub const HEADER_SIZE: usize = 72;

/// Size of one packed bar record in bytes
pub const RECORD_SIZE: usize = 44;

/// Parsed tape file header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TapeHeader {
    /// Format version, must equal [`TAPE_VERSION`]
    pub version: u32,
    /// Record type tag, must equal [`RECORD_TYPE_BAR`]
    pub record_type: u32,
    /// Bytes per record, must equal [`RECORD_SIZE`]
    pub record_size: u32,
    /// Timestamp of the first record
    pub start_ts: Ts,
    /// Timestamp of the last record
    pub end_ts: Ts,
    /// Number of records following the header
    pub record_count: u64,
}

impl TapeHeader {
    /// Decode a header from the first [`HEADER_SIZE`] bytes of a tape.
    ///
    /// Only the magic is checked here; semantic validation (version, record
    /// type and size, record count vs file span) is the reader's job.
    ///
    /// # Errors
    ///
    /// Returns `InvalidData` if the buffer is short or the magic is wrong.
    pub fn read_from(mut buf: &[u8]) -> io::Result<Self> {
        let mut magic = [0u8; 8];
        buf.read_exact(&mut magic)?;
        if magic != TAPE_MAGIC {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "bad magic"));
        }

        let version = buf.read_u32::<LittleEndian>()?;
        let record_type = buf.read_u32::<LittleEndian>()?;
        let record_size = buf.read_u32::<LittleEndian>()?;
        let _reserved = buf.read_u32::<LittleEndian>()?;
        let start_ts = Ts::from_nanos(buf.read_u64::<LittleEndian>()?);
        let end_ts = Ts::from_nanos(buf.read_u64::<LittleEndian>()?);
        let record_count = buf.read_u64::<LittleEndian>()?;

        Ok(Self {
            version,
            record_type,
            record_size,
            start_ts,
            end_ts,
            record_count,
        })
    }

    /// Encode the header, including magic and reserved padding.
    ///
    /// # Errors
    ///
    /// Returns any error from the underlying writer.
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&TAPE_MAGIC)?;
        w.write_u32::<LittleEndian>(self.version)?;
        w.write_u32::<LittleEndian>(self.record_type)?;
        w.write_u32::<LittleEndian>(self.record_size)?;
        w.write_u32::<LittleEndian>(0)?;
        w.write_u64::<LittleEndian>(self.start_ts.as_nanos())?;
        w.write_u64::<LittleEndian>(self.end_ts.as_nanos())?;
        w.write_u64::<LittleEndian>(self.record_count)?;
        w.write_all(&[0u8; 24])?;
        Ok(())
    }
}

/// Decode one bar record from a [`RECORD_SIZE`]-byte slice.
///
/// # Errors
///
/// Returns `UnexpectedEof` if the slice is short.
pub fn read_bar(mut buf: &[u8]) -> io::Result<Bar> {
    Ok(Bar {
        ts: Ts::from_nanos(buf.read_u64::<LittleEndian>()?),
        open: buf.read_f64::<LittleEndian>()?,
        high: buf.read_f64::<LittleEndian>()?,
        low: buf.read_f64::<LittleEndian>()?,
        close: buf.read_f64::<LittleEndian>()?,
        volume: buf.read_f32::<LittleEndian>()?,
    })
}

/// Encode one bar record.
///
/// # Errors
///
/// Returns any error from the underlying writer.
pub fn write_bar<W: Write>(bar: &Bar, w: &mut W) -> io::Result<()> {
    w.write_u64::<LittleEndian>(bar.ts.as_nanos())?;
    w.write_f64::<LittleEndian>(bar.open)?;
    w.write_f64::<LittleEndian>(bar.high)?;
    w.write_f64::<LittleEndian>(bar.low)?;
    w.write_f64::<LittleEndian>(bar.close)?;
    w.write_f32::<LittleEndian>(bar.volume)?;
    Ok(())
}

/// Canonical tape path: `{base}/bars/{symbol}/{tf}/{YYYY}/{symbol}_{YYYYMMDD}.tape`
#[must_use]
pub fn tape_path(base_dir: &Path, symbol: &str, timeframe: Timeframe, ymd: u32) -> PathBuf {
    let year = ymd / 10_000;
    base_dir
        .join("bars")
        .join(symbol)
        .join(timeframe.as_str())
        .join(format!("{year:04}"))
        .join(format!("{symbol}_{ymd:08}.tape"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trip() -> io::Result<()> {
        let hdr = TapeHeader {
            version: TAPE_VERSION,
            record_type: RECORD_TYPE_BAR,
            record_size: 44,
            start_ts: Ts::from_nanos(1_000),
            end_ts: Ts::from_nanos(2_000),
            record_count: 17,
        };

        let mut buf = Vec::new();
        hdr.write_to(&mut buf)?;
        assert_eq!(buf.len(), HEADER_SIZE);

        let back = TapeHeader::read_from(&buf)?;
        assert_eq!(back, hdr);
        Ok(())
    }

    #[test]
    fn bar_record_is_44_bytes() -> io::Result<()> {
        let bar = Bar {
            ts: Ts::from_nanos(42),
            open: 1.0,
            high: 2.0,
            low: 0.5,
            close: 1.5,
            volume: 123.0,
        };

        let mut buf = Vec::new();
        write_bar(&bar, &mut buf)?;
        assert_eq!(buf.len(), RECORD_SIZE);

        let back = read_bar(&buf)?;
        assert_eq!(back, bar);
        Ok(())
    }

    #[test]
    fn bad_magic_rejected() {
        let buf = [0u8; HEADER_SIZE];
        assert!(TapeHeader::read_from(&buf).is_err());
    }

    #[test]
    fn path_layout() {
        let p = tape_path(Path::new("/data"), "EURUSD", Timeframe::M1, 20_240_105);
        assert_eq!(
            p,
            Path::new("/data/bars/EURUSD/1m/2024/EURUSD_20240105.tape")
        );
    }
}
