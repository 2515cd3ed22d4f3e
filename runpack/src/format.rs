//! On-disk run-pack layout
//!
//! Fixed little-endian layout: 80-byte file header, length-prefixed meta
//! blob, 56-byte TOC entries, 8-aligned raw column blobs, and 56-byte
//! packed trade records.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

/// Magic opening every run pack
pub const PACK_MAGIC: u64 = 0x3150_4B50_4E55_5252;

/// Current run-pack format version
pub const PACK_VERSION: u32 = 1;

/// Endian canary as written by a little-endian producer
pub const ENDIAN_CANARY: u32 = 0x0102_0304;

/// Size of the file header in bytes
pub const HEADER_SIZE: u64 = 80;

/// Size of one TOC entry in bytes
pub const TOC_ENTRY_SIZE: u64 = 56;

/// Size of one packed trade record in bytes
pub const TRADE_RECORD_SIZE: u64 = 56;

/// Bytes reserved for a column name in the TOC (NUL padded)
pub const NAME_BYTES: usize = 32;

/// Element type of a series column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DType {
    /// 32-bit signed integer
    I32,
    /// 64-bit signed integer
    I64,
    /// 32-bit float
    F32,
    /// 64-bit float
    F64,
}

impl DType {
    /// Wire tag
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        match self {
            Self::I32 => 1,
            Self::I64 => 2,
            Self::F32 => 3,
            Self::F64 => 4,
        }
    }

    /// Decode a wire tag
    #[must_use]
    pub const fn from_u32(tag: u32) -> Option<Self> {
        match tag {
            1 => Some(Self::I32),
            2 => Some(Self::I64),
            3 => Some(Self::F32),
            4 => Some(Self::F64),
            _ => None,
        }
    }

    /// Bytes per element
    #[must_use]
    pub const fn elem_size(self) -> u32 {
        match self {
            Self::I32 | Self::F32 => 4,
            Self::I64 | Self::F64 => 8,
        }
    }
}

/// Parsed run-pack file header
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PackHeader {
    /// Creation time, milliseconds since UNIX epoch
    pub created_unix_ms: u64,
    /// Byte offset of the meta blob (its u64 length prefix)
    pub meta_offset: u64,
    /// Meta blob length in bytes, excluding prefix and padding
    pub meta_bytes: u64,
    /// Byte offset of the TOC
    pub toc_offset: u64,
    /// Number of TOC entries
    pub toc_count: u32,
    /// Byte offset of the trades blob
    pub trades_offset: u64,
    /// Number of packed trade records
    pub trades_count: u64,
    /// Total file length in bytes
    pub file_bytes: u64,
}

impl PackHeader {
    /// Encode the header, magic and canary included.
    ///
    /// # Errors
    ///
    /// Returns any error from the underlying writer.
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u64::<LittleEndian>(PACK_MAGIC)?;
        w.write_u32::<LittleEndian>(PACK_VERSION)?;
        w.write_u32::<LittleEndian>(ENDIAN_CANARY)?;
        w.write_u64::<LittleEndian>(self.created_unix_ms)?;
        w.write_u64::<LittleEndian>(self.meta_offset)?;
        w.write_u64::<LittleEndian>(self.meta_bytes)?;
        w.write_u64::<LittleEndian>(self.toc_offset)?;
        w.write_u32::<LittleEndian>(self.toc_count)?;
        w.write_u32::<LittleEndian>(0)?; // reserved
        w.write_u64::<LittleEndian>(self.trades_offset)?;
        w.write_u64::<LittleEndian>(self.trades_count)?;
        w.write_u64::<LittleEndian>(self.file_bytes)?;
        Ok(())
    }

    /// Decode a header, returning it with the raw magic/version/canary
    /// for the caller to validate.
    ///
    /// # Errors
    ///
    /// Returns `UnexpectedEof` if the buffer is short.
    pub fn read_from(mut buf: &[u8]) -> io::Result<(u64, u32, u32, Self)> {
        let magic = buf.read_u64::<LittleEndian>()?;
        let version = buf.read_u32::<LittleEndian>()?;
        let endian = buf.read_u32::<LittleEndian>()?;
        let created_unix_ms = buf.read_u64::<LittleEndian>()?;
        let meta_offset = buf.read_u64::<LittleEndian>()?;
        let meta_bytes = buf.read_u64::<LittleEndian>()?;
        let toc_offset = buf.read_u64::<LittleEndian>()?;
        let toc_count = buf.read_u32::<LittleEndian>()?;
        let _reserved = buf.read_u32::<LittleEndian>()?;
        let trades_offset = buf.read_u64::<LittleEndian>()?;
        let trades_count = buf.read_u64::<LittleEndian>()?;
        let file_bytes = buf.read_u64::<LittleEndian>()?;

        Ok((
            magic,
            version,
            endian,
            Self {
                created_unix_ms,
                meta_offset,
                meta_bytes,
                toc_offset,
                toc_count,
                trades_offset,
                trades_count,
                file_bytes,
            },
        ))
    }
}

/// One table-of-contents entry describing a series blob
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TocEntry {
    /// Column name (at most 31 bytes survive on disk)
    pub name: String,
    /// Element type
    pub dtype: DType,
    /// Bytes per element
    pub elem_size: u32,
    /// Element count
    pub len: u64,
    /// Byte offset of the blob from file start
    pub offset: u64,
}

impl TocEntry {
    /// Encode one entry. Names longer than 31 bytes are truncated.
    ///
    /// # Errors
    ///
    /// Returns any error from the underlying writer.
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        let mut name = [0u8; NAME_BYTES];
        let bytes = self.name.as_bytes();
        let n = bytes.len().min(NAME_BYTES - 1);
        name[..n].copy_from_slice(&bytes[..n]);
        w.write_all(&name)?;
        w.write_u32::<LittleEndian>(self.dtype.as_u32())?;
        w.write_u32::<LittleEndian>(self.elem_size)?;
        w.write_u64::<LittleEndian>(self.len)?;
        w.write_u64::<LittleEndian>(self.offset)?;
        Ok(())
    }

    /// Decode one entry.
    ///
    /// # Errors
    ///
    /// Returns `InvalidData` for an unknown dtype tag, `UnexpectedEof`
    /// for a short buffer.
    pub fn read_from(mut buf: &[u8]) -> io::Result<Self> {
        let mut name = [0u8; NAME_BYTES];
        buf.read_exact(&mut name)?;
        let end = name.iter().position(|&b| b == 0).unwrap_or(NAME_BYTES);
        let name = String::from_utf8_lossy(&name[..end]).into_owned();

        let tag = buf.read_u32::<LittleEndian>()?;
        let dtype = DType::from_u32(tag).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidData, format!("unknown dtype {tag}"))
        })?;
        let elem_size = buf.read_u32::<LittleEndian>()?;
        let len = buf.read_u64::<LittleEndian>()?;
        let offset = buf.read_u64::<LittleEndian>()?;

        Ok(Self {
            name,
            dtype,
            elem_size,
            len,
            offset,
        })
    }
}

/// One packed closed trade as stored on disk
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TradeRecord {
    /// Entry timestamp, nanoseconds
    pub entry_ts: i64,
    /// Exit timestamp, nanoseconds
    pub exit_ts: i64,
    /// Bar index at entry, -1 if unknown
    pub entry_bar: i32,
    /// Bar index at exit
    pub exit_bar: i32,
    /// +1 long, -1 short
    pub side: i8,
    /// Lots closed (magnitude)
    pub lots: f32,
    /// Weighted-average entry price
    pub entry_price: f32,
    /// Closing fill price
    pub exit_price: f32,
    /// Realized pnl in account currency
    pub pnl: f32,
    /// Reserved: pnl / risk
    pub pnl_r: f32,
    /// Reserved: maximum adverse excursion
    pub mae: f32,
    /// Reserved: maximum favorable excursion
    pub mfe: f32,
}

impl TradeRecord {
    /// Encode one record, reserved padding included.
    ///
    /// # Errors
    ///
    /// Returns any error from the underlying writer.
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_i64::<LittleEndian>(self.entry_ts)?;
        w.write_i64::<LittleEndian>(self.exit_ts)?;
        w.write_i32::<LittleEndian>(self.entry_bar)?;
        w.write_i32::<LittleEndian>(self.exit_bar)?;
        w.write_i8(self.side)?;
        w.write_i8(0)?; // reserved
        w.write_i16::<LittleEndian>(0)?; // reserved
        w.write_f32::<LittleEndian>(self.lots)?;
        w.write_f32::<LittleEndian>(self.entry_price)?;
        w.write_f32::<LittleEndian>(self.exit_price)?;
        w.write_f32::<LittleEndian>(self.pnl)?;
        w.write_f32::<LittleEndian>(self.pnl_r)?;
        w.write_f32::<LittleEndian>(self.mae)?;
        w.write_f32::<LittleEndian>(self.mfe)?;
        Ok(())
    }

    /// Decode one record.
    ///
    /// # Errors
    ///
    /// Returns `UnexpectedEof` if the buffer is short.
    pub fn read_from(mut buf: &[u8]) -> io::Result<Self> {
        let entry_ts = buf.read_i64::<LittleEndian>()?;
        let exit_ts = buf.read_i64::<LittleEndian>()?;
        let entry_bar = buf.read_i32::<LittleEndian>()?;
        let exit_bar = buf.read_i32::<LittleEndian>()?;
        let side = buf.read_i8()?;
        let _pad1 = buf.read_i8()?;
        let _pad2 = buf.read_i16::<LittleEndian>()?;
        Ok(Self {
            entry_ts,
            exit_ts,
            entry_bar,
            exit_bar,
            side,
            lots: buf.read_f32::<LittleEndian>()?,
            entry_price: buf.read_f32::<LittleEndian>()?,
            exit_price: buf.read_f32::<LittleEndian>()?,
            pnl: buf.read_f32::<LittleEndian>()?,
            pnl_r: buf.read_f32::<LittleEndian>()?,
            mae: buf.read_f32::<LittleEndian>()?,
            mfe: buf.read_f32::<LittleEndian>()?,
        })
    }
}

/// Borrowed view of one series column
#[derive(Debug, Clone, Copy)]
pub enum ColumnData<'a> {
    /// 32-bit signed integers
    I32(&'a [i32]),
    /// 64-bit signed integers
    I64(&'a [i64]),
    /// 32-bit floats
    F32(&'a [f32]),
    /// 64-bit floats
    F64(&'a [f64]),
}

impl ColumnData<'_> {
    /// Element type of this column
    #[must_use]
    pub const fn dtype(&self) -> DType {
        match self {
            Self::I32(_) => DType::I32,
            Self::I64(_) => DType::I64,
            Self::F32(_) => DType::F32,
            Self::F64(_) => DType::F64,
        }
    }

    /// Element count
    #[must_use]
    pub const fn len(&self) -> usize {
        match self {
            Self::I32(v) => v.len(),
            Self::I64(v) => v.len(),
            Self::F32(v) => v.len(),
            Self::F64(v) => v.len(),
        }
    }

    /// True when the column holds no elements
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A named column handed to the writer
#[derive(Debug, Clone, Copy)]
pub struct Column<'a> {
    /// TOC name; the stable identifier downstream tools key on
    pub name: &'a str,
    /// Borrowed elements
    pub data: ColumnData<'a>,
}

/// Round `x` up to the next multiple of 8
#[must_use]
pub const fn align8(x: u64) -> u64 {
    (x + 7) & !7
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_fixed_size() -> io::Result<()> {
        let mut buf = Vec::new();
        PackHeader::default().write_to(&mut buf)?;
        assert_eq!(buf.len() as u64, HEADER_SIZE);
        Ok(())
    }

    #[test]
    fn toc_entry_round_trip_and_size() -> io::Result<()> {
        let entry = TocEntry {
            name: "equity".to_string(),
            dtype: DType::F32,
            elem_size: 4,
            len: 128,
            offset: 4096,
        };
        let mut buf = Vec::new();
        entry.write_to(&mut buf)?;
        assert_eq!(buf.len() as u64, TOC_ENTRY_SIZE);
        assert_eq!(TocEntry::read_from(&buf)?, entry);
        Ok(())
    }

    #[test]
    fn long_names_truncate_to_31_bytes() -> io::Result<()> {
        let entry = TocEntry {
            name: "a".repeat(40),
            dtype: DType::I64,
            elem_size: 8,
            len: 0,
            offset: 0,
        };
        let mut buf = Vec::new();
        entry.write_to(&mut buf)?;
        let back = TocEntry::read_from(&buf)?;
        assert_eq!(back.name.len(), 31);
        Ok(())
    }

    #[test]
    fn trade_record_round_trip_and_size() -> io::Result<()> {
        let rec = TradeRecord {
            entry_ts: 1_000,
            exit_ts: 2_000,
            entry_bar: 3,
            exit_bar: 9,
            side: -1,
            lots: 2.5,
            entry_price: 1.1,
            exit_price: 1.2,
            pnl: -42.0,
            pnl_r: 0.0,
            mae: 0.0,
            mfe: 0.0,
        };
        let mut buf = Vec::new();
        rec.write_to(&mut buf)?;
        assert_eq!(buf.len() as u64, TRADE_RECORD_SIZE);
        assert_eq!(TradeRecord::read_from(&buf)?, rec);
        Ok(())
    }

    #[test]
    fn align8_rounds_up() {
        assert_eq!(align8(0), 0);
        assert_eq!(align8(1), 8);
        assert_eq!(align8(8), 8);
        assert_eq!(align8(81), 88);
    }
}
