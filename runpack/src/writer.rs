//! Two-pass run-pack writer
//!
//! Writes placeholder header and TOC, streams the blobs, then seeks back
//! and patches both with the final offsets and file length.

use crate::error::PackError;
use crate::format::{
    Column, ColumnData, PackHeader, TOC_ENTRY_SIZE, TocEntry, TradeRecord, align8,
};
use byteorder::{LittleEndian, WriteBytesExt};
use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::Path;
use tracing::info;

/// Run-level metadata stored ahead of the TOC
#[derive(Debug, Clone, Default)]
pub struct PackMeta {
    /// Raw meta bytes, conventionally a JSON object
    pub json: String,
    /// Creation time, milliseconds since UNIX epoch
    pub created_unix_ms: u64,
}

const ZEROS: [u8; 8] = [0u8; 8];

fn pad_to_8<W: Write + Seek>(w: &mut W) -> Result<u64, PackError> {
    let pos = w.stream_position()?;
    let target = align8(pos);
    if target > pos {
        // Gap is at most 7 bytes.
        w.write_all(&ZEROS[..(target - pos) as usize])?;
    }
    Ok(target)
}

fn write_column_data<W: Write>(w: &mut W, data: ColumnData<'_>) -> Result<(), PackError> {
    match data {
        ColumnData::I32(v) => {
            for x in v {
                w.write_i32::<LittleEndian>(*x)?;
            }
        }
        ColumnData::I64(v) => {
            for x in v {
                w.write_i64::<LittleEndian>(*x)?;
            }
        }
        ColumnData::F32(v) => {
            for x in v {
                w.write_f32::<LittleEndian>(*x)?;
            }
        }
        ColumnData::F64(v) => {
            for x in v {
                w.write_f64::<LittleEndian>(*x)?;
            }
        }
    }
    Ok(())
}

/// Write a complete run pack in one shot.
///
/// The first column is the time axis; every other column must have the
/// same length. Zero-length runs are valid and produce empty blobs.
///
/// # Errors
///
/// Fails on length mismatches between columns or any I/O error.
pub fn write_pack(
    path: &Path,
    meta: &PackMeta,
    columns: &[Column<'_>],
    trades: &[TradeRecord],
) -> Result<(), PackError> {
    let expected = columns.first().map_or(0, |c| c.data.len() as u64);
    for col in columns {
        if col.data.len() as u64 != expected {
            return Err(PackError::LengthMismatch {
                name: col.name.to_string(),
                len: col.data.len() as u64,
                expected,
            });
        }
    }

    let file = File::create(path)?;
    let mut w = BufWriter::new(file);

    // 1) Header placeholder; final values are patched at the end.
    let mut header = PackHeader {
        created_unix_ms: meta.created_unix_ms,
        ..PackHeader::default()
    };
    header.write_to(&mut w)?;

    // 2) Meta blob: u64 length prefix, raw bytes, pad to 8.
    header.meta_offset = w.stream_position()?;
    header.meta_bytes = meta.json.len() as u64;
    w.write_u64::<LittleEndian>(header.meta_bytes)?;
    w.write_all(meta.json.as_bytes())?;
    pad_to_8(&mut w)?;

    // 3) TOC placeholder.
    header.toc_offset = w.stream_position()?;
    header.toc_count = u32::try_from(columns.len())
        .map_err(|_| PackError::Truncated("too many columns"))?;
    for _ in columns {
        w.write_all(&[0u8; TOC_ENTRY_SIZE as usize])?;
    }

    // 4) Series blobs, 8-aligned, filling TOC entries as we go.
    let mut toc = Vec::with_capacity(columns.len());
    for col in columns {
        let offset = pad_to_8(&mut w)?;
        write_column_data(&mut w, col.data)?;
        toc.push(TocEntry {
            name: col.name.to_string(),
            dtype: col.data.dtype(),
            elem_size: col.data.dtype().elem_size(),
            len: col.data.len() as u64,
            offset,
        });
    }

    // 5) Trades blob, 8-aligned.
    header.trades_offset = pad_to_8(&mut w)?;
    header.trades_count = trades.len() as u64;
    for trade in trades {
        trade.write_to(&mut w)?;
    }

    // 6) Patch TOC and header with final offsets.
    header.file_bytes = w.stream_position()?;

    w.seek(SeekFrom::Start(header.toc_offset))?;
    for entry in &toc {
        entry.write_to(&mut w)?;
    }

    w.seek(SeekFrom::Start(0))?;
    header.write_to(&mut w)?;
    w.flush()?;

    info!(
        path = %path.display(),
        columns = columns.len(),
        trades = trades.len(),
        bytes = header.file_bytes,
        "wrote run pack"
    );
    Ok(())
}
