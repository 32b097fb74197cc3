//! Listpack: the modern replacement for ziplist, with a per-entry
//! back-length. Used by stream values.

use std::io::Read;

use byteorder::{LittleEndian, ReadBytesExt};
use bytes::{Buf, Bytes};

use crate::errors::{RdbParseError, RdbResult};
use crate::reader;

/// A raw listpack element.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum LpEntry {
    Str(Bytes),
    Int(i64),
}

impl LpEntry {
    pub(crate) fn into_bytes(self) -> Bytes {
        match self {
            LpEntry::Str(bytes) => bytes,
            LpEntry::Int(value) => Bytes::from(value.to_string()),
        }
    }

    /// Integer form. Stream counters may be stored as ASCII strings.
    pub(crate) fn to_i64(&self) -> RdbResult<i64> {
        match self {
            LpEntry::Int(value) => Ok(*value),
            LpEntry::Str(bytes) => std::str::from_utf8(bytes)
                .ok()
                .and_then(|s| s.parse().ok())
                .ok_or(RdbParseError::Stream("non-numeric listpack element")),
        }
    }
}

/// Decode a whole listpack blob. The element count in the header saturates,
/// so the 0xFF terminator is authoritative.
pub(crate) fn decode(blob: Bytes) -> RdbResult<Vec<LpEntry>> {
    let mut buf = blob.reader();
    let _total_bytes = buf.read_u32::<LittleEndian>()?;
    let _count = buf.read_u16::<LittleEndian>()?;

    let mut entries = Vec::new();
    loop {
        let first = buf.read_u8()?;
        if first == 0xFF {
            break;
        }
        let (entry, element_size) = read_element(&mut buf, first)?;
        // skip the back-length, sized by the element it follows
        reader::read_bytes(&mut buf, backlen_size(element_size))?;
        entries.push(entry);
    }
    Ok(entries)
}

/// Read one element given its first byte; returns the element and its
/// encoded size in bytes (header included), which determines the
/// back-length width.
fn read_element(buf: &mut impl Read, first: u8) -> RdbResult<(LpEntry, usize)> {
    // 7-bit unsigned immediate
    if first & 0x80 == 0 {
        return Ok((LpEntry::Int(first as i64), 1));
    }
    // 6-bit length string
    if first & 0xC0 == 0x80 {
        let len = (first & 0x3F) as usize;
        return Ok((LpEntry::Str(reader::read_bytes(buf, len)?), 1 + len));
    }
    // 13-bit signed integer
    if first & 0xE0 == 0xC0 {
        let next = buf.read_u8()?;
        let raw = ((first & 0x1F) as i64) << 8 | next as i64;
        let value = if raw >= 4096 { raw - 8192 } else { raw };
        return Ok((LpEntry::Int(value), 2));
    }
    // 12-bit length string
    if first & 0xF0 == 0xE0 {
        let next = buf.read_u8()?;
        let len = ((first & 0x0F) as usize) << 8 | next as usize;
        return Ok((LpEntry::Str(reader::read_bytes(buf, len)?), 2 + len));
    }

    match first {
        0xF0 => {
            let len = buf.read_u32::<LittleEndian>()? as usize;
            Ok((LpEntry::Str(reader::read_bytes(buf, len)?), 5 + len))
        }
        0xF1 => Ok((LpEntry::Int(buf.read_i16::<LittleEndian>()? as i64), 3)),
        0xF2 => Ok((LpEntry::Int(buf.read_i24::<LittleEndian>()? as i64), 4)),
        0xF3 => Ok((LpEntry::Int(buf.read_i32::<LittleEndian>()? as i64), 5)),
        0xF4 => Ok((LpEntry::Int(buf.read_i64::<LittleEndian>()?), 9)),
        other => Err(RdbParseError::ListpackHeader(other)),
    }
}

fn backlen_size(element_size: usize) -> usize {
    match element_size {
        0..=127 => 1,
        128..=16_383 => 2,
        16_384..=2_097_151 => 3,
        2_097_152..=268_435_455 => 4,
        _ => 5,
    }
}
