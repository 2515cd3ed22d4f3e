//! Validating run-pack reader
//!
//! Loads the whole file, checks magic/version/endian canary, and exposes
//! the TOC, raw column blobs, typed column decoders, and trade records.

use crate::error::PackError;
use crate::format::{
    DType, ENDIAN_CANARY, HEADER_SIZE, PACK_MAGIC, PACK_VERSION, PackHeader, TOC_ENTRY_SIZE,
    TRADE_RECORD_SIZE, TocEntry, TradeRecord,
};
use byteorder::{LittleEndian, ReadBytesExt};
use std::path::Path;

/// An opened, validated run pack
pub struct PackReader {
    header: PackHeader,
    toc: Vec<TocEntry>,
    bytes: Vec<u8>,
}

impl PackReader {
    /// Open and validate a run pack.
    ///
    /// # Errors
    ///
    /// Rejects wrong magic, unsupported versions, byte-swapped or unknown
    /// endian canaries, and files whose header or TOC extends past the end.
    pub fn open(path: &Path) -> Result<Self, PackError> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(bytes)
    }

    /// Validate an in-memory pack image.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Self::open`].
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, PackError> {
        if (bytes.len() as u64) < HEADER_SIZE {
            return Err(PackError::Truncated("header"));
        }

        let (magic, version, endian, header) = PackHeader::read_from(&bytes)?;
        if magic != PACK_MAGIC {
            return Err(PackError::BadMagic(magic));
        }
        if version != PACK_VERSION {
            return Err(PackError::BadVersion(version));
        }
        if endian != ENDIAN_CANARY {
            return Err(PackError::BadEndian(endian));
        }
        if header.file_bytes != bytes.len() as u64 {
            return Err(PackError::Truncated("file length mismatch"));
        }

        let toc_end = u64::from(header.toc_count)
            .checked_mul(TOC_ENTRY_SIZE)
            .and_then(|span| header.toc_offset.checked_add(span))
            .ok_or(PackError::Truncated("toc"))?;
        if toc_end > bytes.len() as u64 {
            return Err(PackError::Truncated("toc"));
        }

        let mut toc = Vec::with_capacity(header.toc_count as usize);
        for i in 0..u64::from(header.toc_count) {
            let at = (header.toc_offset + i * TOC_ENTRY_SIZE) as usize;
            let entry = TocEntry::read_from(&bytes[at..at + TOC_ENTRY_SIZE as usize])?;
            let blob_end = entry
                .len
                .checked_mul(u64::from(entry.elem_size))
                .and_then(|span| entry.offset.checked_add(span))
                .ok_or(PackError::Truncated("series blob"))?;
            if blob_end > bytes.len() as u64 {
                return Err(PackError::Truncated("series blob"));
            }
            toc.push(entry);
        }

        let trades_end = header
            .trades_count
            .checked_mul(TRADE_RECORD_SIZE)
            .and_then(|span| header.trades_offset.checked_add(span))
            .ok_or(PackError::Truncated("trades blob"))?;
        if trades_end > bytes.len() as u64 {
            return Err(PackError::Truncated("trades blob"));
        }

        Ok(Self { header, toc, bytes })
    }

    /// Parsed file header
    #[must_use]
    pub const fn header(&self) -> &PackHeader {
        &self.header
    }

    /// Table of contents, in file order
    #[must_use]
    pub fn toc(&self) -> &[TocEntry] {
        &self.toc
    }

    /// Raw meta bytes (conventionally JSON)
    #[must_use]
    pub fn meta_bytes(&self) -> &[u8] {
        let start = self.header.meta_offset as usize + 8;
        &self.bytes[start..start + self.header.meta_bytes as usize]
    }

    fn entry(&self, name: &str) -> Option<&TocEntry> {
        self.toc.iter().find(|e| e.name == name)
    }

    /// Raw blob bytes of a column, by TOC name
    #[must_use]
    pub fn column_bytes(&self, name: &str) -> Option<&[u8]> {
        let e = self.entry(name)?;
        let start = e.offset as usize;
        let len = (e.len * u64::from(e.elem_size)) as usize;
        Some(&self.bytes[start..start + len])
    }

    /// Decode an f32 column, by TOC name
    #[must_use]
    pub fn column_f32(&self, name: &str) -> Option<Vec<f32>> {
        let e = self.entry(name)?;
        if e.dtype != DType::F32 {
            return None;
        }
        let mut buf = self.column_bytes(name)?;
        let mut out = vec![0f32; e.len as usize];
        buf.read_f32_into::<LittleEndian>(&mut out).ok()?;
        Some(out)
    }

    /// Decode an i32 column, by TOC name
    #[must_use]
    pub fn column_i32(&self, name: &str) -> Option<Vec<i32>> {
        let e = self.entry(name)?;
        if e.dtype != DType::I32 {
            return None;
        }
        let mut buf = self.column_bytes(name)?;
        let mut out = vec![0i32; e.len as usize];
        buf.read_i32_into::<LittleEndian>(&mut out).ok()?;
        Some(out)
    }

    /// Decode an i64 column, by TOC name
    #[must_use]
    pub fn column_i64(&self, name: &str) -> Option<Vec<i64>> {
        let e = self.entry(name)?;
        if e.dtype != DType::I64 {
            return None;
        }
        let mut buf = self.column_bytes(name)?;
        let mut out = vec![0i64; e.len as usize];
        buf.read_i64_into::<LittleEndian>(&mut out).ok()?;
        Some(out)
    }

    /// Raw bytes of the trades blob
    #[must_use]
    pub fn trade_bytes(&self) -> &[u8] {
        let start = self.header.trades_offset as usize;
        let len = (self.header.trades_count * TRADE_RECORD_SIZE) as usize;
        &self.bytes[start..start + len]
    }

    /// Decode every packed trade record.
    ///
    /// # Errors
    ///
    /// Fails if a record cannot be decoded.
    pub fn trades(&self) -> Result<Vec<TradeRecord>, PackError> {
        let bytes = self.trade_bytes();
        let mut out = Vec::with_capacity(self.header.trades_count as usize);
        for chunk in bytes.chunks_exact(TRADE_RECORD_SIZE as usize) {
            out.push(TradeRecord::read_from(chunk)?);
        }
        Ok(out)
    }
}
