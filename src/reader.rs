//! Byte-level reader primitives shared by the opcode state machine and the
//! collection iterators. Everything works against `impl Read` so the same
//! functions decode the outer stream and materialized packed blobs.

use std::io::Read;

use byteorder::{BigEndian, LittleEndian, ReadBytesExt};
use bytes::Bytes;

use crate::constants::str_enc;
use crate::errors::{RdbParseError, RdbResult};

pub(crate) mod crc;
pub(crate) mod lzf;

pub(crate) fn read_bytes<R: Read>(reader: &mut R, len: usize) -> RdbResult<Bytes> {
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    Ok(Bytes::from(buf))
}

/// Read a length-encoded integer. Returns `(value, true)` when the top bits
/// select a special string encoding instead of a plain length.
pub(crate) fn read_length_with_encoding<R: Read>(reader: &mut R) -> RdbResult<(u64, bool)> {
    let first = reader.read_u8()?;

    match (first & 0xC0) >> 6 {
        // 6-bit length
        0b00 => Ok(((first & 0x3F) as u64, false)),
        // 14-bit length: low 6 bits and the next byte
        0b01 => {
            let next = reader.read_u8()?;
            Ok((((first & 0x3F) as u64) << 8 | next as u64, false))
        }
        // special string-encoding selector
        0b11 => Ok(((first & 0x3F) as u64, true)),
        _ => match first {
            0x80 => Ok((reader.read_u32::<BigEndian>()? as u64, false)),
            0x81 => Ok((reader.read_u64::<BigEndian>()?, false)),
            other => Err(RdbParseError::LengthEncoding(other)),
        },
    }
}

/// Read a length where a special encoding selector is not allowed.
pub(crate) fn read_length<R: Read>(reader: &mut R) -> RdbResult<u64> {
    let (length, encoded) = read_length_with_encoding(reader)?;
    if encoded {
        return Err(RdbParseError::LengthEncoding(0xC0 | length as u8));
    }
    Ok(length)
}

/// Read a length-prefixed string: raw bytes, an integer rendered in decimal,
/// or an LZF-compressed blob.
pub(crate) fn read_string<R: Read>(reader: &mut R) -> RdbResult<Bytes> {
    let (length, encoded) = read_length_with_encoding(reader)?;

    if !encoded {
        return read_bytes(reader, length as usize);
    }

    match length {
        str_enc::INT8 => Ok(render_int(reader.read_i8()? as i64)),
        str_enc::INT16 => Ok(render_int(reader.read_i16::<LittleEndian>()? as i64)),
        str_enc::INT32 => Ok(render_int(reader.read_i32::<LittleEndian>()? as i64)),
        str_enc::LZF => {
            let compressed_len = read_length(reader)?;
            let uncompressed_len = read_length(reader)?;
            let mut compressed = vec![0u8; compressed_len as usize];
            reader.read_exact(&mut compressed)?;
            Ok(Bytes::from(lzf::decompress(
                &compressed,
                uncompressed_len as usize,
            )?))
        }
        other => Err(RdbParseError::StringEncoding(other)),
    }
}

fn render_int(value: i64) -> Bytes {
    Bytes::from(value.to_string())
}

/// Expiry in epoch seconds, widened to milliseconds
pub(crate) fn read_seconds_time<R: Read>(reader: &mut R) -> RdbResult<u64> {
    Ok(u64::from(reader.read_u32::<LittleEndian>()?) * 1000)
}

/// Expiry in epoch milliseconds
pub(crate) fn read_millis_time<R: Read>(reader: &mut R) -> RdbResult<u64> {
    Ok(reader.read_u64::<LittleEndian>()?)
}

/// Legacy "string double": a 1-byte length with reserved values for the
/// non-finite cases, otherwise ASCII digits. Used by sorted sets v1.
pub(crate) fn read_legacy_double<R: Read>(reader: &mut R) -> RdbResult<f64> {
    match reader.read_u8()? {
        253 => Ok(f64::NAN),
        254 => Ok(f64::INFINITY),
        255 => Ok(f64::NEG_INFINITY),
        len => {
            let buf = read_bytes(reader, len as usize)?;
            parse_float(&buf)
        }
    }
}

/// IEEE-754 little-endian double. Used by sorted sets v2.
pub(crate) fn read_binary_double<R: Read>(reader: &mut R) -> RdbResult<f64> {
    Ok(reader.read_f64::<LittleEndian>()?)
}

pub(crate) fn parse_float(buf: &[u8]) -> RdbResult<f64> {
    std::str::from_utf8(buf)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| RdbParseError::ParseFloat(Bytes::copy_from_slice(buf)))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn length_6bit() -> RdbResult<()> {
        let (len, encoded) = read_length_with_encoding(&mut [0x3Fu8].as_slice())?;
        assert_eq!(len, 63);
        assert!(!encoded);
        Ok(())
    }

    #[test]
    fn length_14bit() -> RdbResult<()> {
        let (len, encoded) = read_length_with_encoding(&mut [0x7F, 0xFF].as_slice())?;
        assert_eq!(len, 16383);
        assert!(!encoded);

        let (len, _) = read_length_with_encoding(&mut [0x40, 0x40].as_slice())?;
        assert_eq!(len, 64);
        Ok(())
    }

    #[test]
    fn length_32bit() -> RdbResult<()> {
        let (len, encoded) =
            read_length_with_encoding(&mut [0x80, 0x00, 0x00, 0x40, 0x00].as_slice())?;
        assert_eq!(len, 16384);
        assert!(!encoded);
        Ok(())
    }

    #[test]
    fn length_64bit() -> RdbResult<()> {
        let bytes = [0x81, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00];
        let (len, encoded) = read_length_with_encoding(&mut bytes.as_slice())?;
        assert_eq!(len, 1 << 32);
        assert!(!encoded);
        Ok(())
    }

    #[test]
    fn length_special_selector() -> RdbResult<()> {
        let (selector, encoded) = read_length_with_encoding(&mut [0xC2].as_slice())?;
        assert_eq!(selector, 2);
        assert!(encoded);
        Ok(())
    }

    #[test]
    fn length_invalid_prefix() {
        let err = read_length_with_encoding(&mut [0x82].as_slice()).unwrap_err();
        assert!(matches!(err, RdbParseError::LengthEncoding(0x82)));
    }

    #[test]
    fn length_rejects_selector() {
        let err = read_length(&mut [0xC0].as_slice()).unwrap_err();
        assert!(matches!(err, RdbParseError::LengthEncoding(0xC0)));
    }

    #[test]
    fn string_raw() -> RdbResult<()> {
        let bytes = [
            0x0D, 0x48, 0x65, 0x6C, 0x6C, 0x6F, 0x2C, 0x20, 0x57, 0x6F, 0x72, 0x6C, 0x64, 0x21,
        ];
        let s = read_string(&mut bytes.as_slice())?;
        assert_eq!(s, Bytes::from("Hello, World!"));
        Ok(())
    }

    #[test]
    fn string_int8() -> RdbResult<()> {
        let s = read_string(&mut [0xC0, 0x7B].as_slice())?;
        assert_eq!(s, Bytes::from("123"));

        let s = read_string(&mut [0xC0, 0x85].as_slice())?;
        assert_eq!(s, Bytes::from("-123"));
        Ok(())
    }

    #[test]
    fn string_int16() -> RdbResult<()> {
        let s = read_string(&mut [0xC1, 0x39, 0x30].as_slice())?;
        assert_eq!(s, Bytes::from("12345"));

        let s = read_string(&mut [0xC1, 0xC7, 0xCF].as_slice())?;
        assert_eq!(s, Bytes::from("-12345"));
        Ok(())
    }

    #[test]
    fn string_int32() -> RdbResult<()> {
        let s = read_string(&mut [0xC2, 0x87, 0xD6, 0x12, 0x00].as_slice())?;
        assert_eq!(s, Bytes::from("1234567"));
        Ok(())
    }

    #[test]
    fn string_lzf() -> RdbResult<()> {
        // literal run of 3: "foo"
        let bytes = [0xC3, 0x04, 0x03, 0x02, b'f', b'o', b'o'];
        let s = read_string(&mut bytes.as_slice())?;
        assert_eq!(s, Bytes::from("foo"));
        Ok(())
    }

    #[test]
    fn string_truncated() {
        let err = read_string(&mut [0x05, b'a', b'b'].as_slice()).unwrap_err();
        assert!(matches!(err, RdbParseError::Io(_)));
    }

    #[test]
    fn times() -> RdbResult<()> {
        let secs = read_seconds_time(&mut 1_600_000_000u32.to_le_bytes().as_slice())?;
        assert_eq!(secs, 1_600_000_000_000);

        let millis = read_millis_time(&mut 1_700_000_000_000u64.to_le_bytes().as_slice())?;
        assert_eq!(millis, 1_700_000_000_000);
        Ok(())
    }

    #[test]
    fn legacy_double_specials() -> RdbResult<()> {
        assert!(read_legacy_double(&mut [253u8].as_slice())?.is_nan());
        assert_eq!(read_legacy_double(&mut [254u8].as_slice())?, f64::INFINITY);
        assert_eq!(
            read_legacy_double(&mut [255u8].as_slice())?,
            f64::NEG_INFINITY
        );
        Ok(())
    }

    #[test]
    fn legacy_double_ascii() -> RdbResult<()> {
        let score = read_legacy_double(&mut [0x04, b'3', b'.', b'1', b'4'].as_slice())?;
        assert_eq!(score, 3.14);
        Ok(())
    }

    #[test]
    fn legacy_double_garbage() {
        let err = read_legacy_double(&mut [0x02, b'x', b'y'].as_slice()).unwrap_err();
        assert!(matches!(err, RdbParseError::ParseFloat(_)));
    }

    #[test]
    fn binary_double() -> RdbResult<()> {
        let score = read_binary_double(&mut 3.5f64.to_le_bytes().as_slice())?;
        assert_eq!(score, 3.5);
        Ok(())
    }
}
