//! Legacy zipmap: the packed small-hash blob used before ziplist-encoded
//! hashes. Pairs are parsed until the 0xFF terminator; the head announces
//! the blob's 1-byte hint (254 means the count is unknown) without
//! re-counting.

use std::io::Read;

use byteorder::{LittleEndian, ReadBytesExt};
use bytes::{Buf, Bytes};

use crate::errors::{RdbParseError, RdbResult};
use crate::mapper::{EmitStrategies, EmitStrategy};
use crate::reader;
use crate::record::{CollectionKind, DataKey, Record, Value};

use super::Collection;

pub(crate) struct ZipMapIterator {
    col: Collection,
    stage: Stage,
}

enum Stage {
    Head,
    Entries { buf: bytes::buf::Reader<Bytes> },
    Done,
}

impl ZipMapIterator {
    pub(crate) fn new(key: DataKey, strategies: EmitStrategies) -> Self {
        Self {
            col: Collection::new(
                key,
                CollectionKind::Hash,
                strategies.for_kind(CollectionKind::Hash),
            ),
            stage: Stage::Head,
        }
    }

    pub(crate) fn strategy(&self) -> EmitStrategy {
        self.col.strategy()
    }

    pub(crate) fn step<R: Read>(&mut self, reader: &mut R) -> RdbResult<Option<Record>> {
        match std::mem::replace(&mut self.stage, Stage::Done) {
            Stage::Head => {
                let blob = reader::read_string(reader)?;
                let mut buf = blob.reader();
                let hint = buf.read_u8()?;

                self.stage = Stage::Entries { buf };
                Ok(Some(self.col.head(hint as u64)))
            }
            Stage::Entries { mut buf } => {
                let Some(field_len) = read_pair_length(&mut buf)? else {
                    return Ok(Some(self.col.slice()));
                };
                let field = reader::read_bytes(&mut buf, field_len)?;

                let Some(value_len) = read_pair_length(&mut buf)? else {
                    return Err(RdbParseError::ZipMapEnd(field));
                };
                let free = buf.read_u8()? as usize;
                let value = reader::read_bytes(&mut buf, value_len)?;
                if free > 0 {
                    // unused trailing bytes announced by the free count
                    reader::read_bytes(&mut buf, free)?;
                }

                let record = self.col.entry(Value::Field { field, value });
                self.stage = Stage::Entries { buf };
                Ok(Some(record))
            }
            Stage::Done => Ok(None),
        }
    }
}

/// A zipmap length byte: inline below 254, 254 announces a 4-byte LE length,
/// 255 is the terminator (`None`).
fn read_pair_length(buf: &mut impl Read) -> RdbResult<Option<usize>> {
    match buf.read_u8()? {
        0xFF => Ok(None),
        0xFE => Ok(Some(buf.read_u32::<LittleEndian>()? as usize)),
        len => Ok(Some(len as usize)),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn step_all(blob: &[u8]) -> RdbResult<Vec<Record>> {
        let mut input = vec![blob.len() as u8];
        input.extend_from_slice(blob);

        let key = DataKey {
            database: 0,
            key: Bytes::from("h"),
            expiry: None,
            idle: None,
            freq: None,
        };
        let mut iter = ZipMapIterator::new(key, EmitStrategies::default());
        let mut reader = input.as_slice();
        let mut records = Vec::new();
        while let Some(record) = iter.step(&mut reader)? {
            records.push(record);
        }
        Ok(records)
    }

    #[test]
    fn pairs_and_free_bytes() -> RdbResult<()> {
        let blob = [
            0x02, // hint
            0x01, b'f', 0x01, 0x00, b'v', // "f" => "v", no free bytes
            0x01, b'g', 0x01, 0x02, b'w', 0xAA, 0xBB, // "g" => "w", 2 free bytes
            0xFF,
        ];
        let records = step_all(&blob)?;
        assert_eq!(records.len(), 4);
        assert_eq!(
            records[2],
            Record::Entry {
                key: DataKey {
                    database: 0,
                    key: Bytes::from("h"),
                    expiry: None,
                    idle: None,
                    freq: None,
                },
                kind: CollectionKind::Hash,
                index: 1,
                length: 2,
                value: Value::Field {
                    field: Bytes::from("g"),
                    value: Bytes::from("w"),
                },
            }
        );
        assert!(matches!(records[3], Record::Slice { ref values, .. } if values.len() == 2));
        Ok(())
    }

    #[test]
    fn long_length_marker() -> RdbResult<()> {
        // field length announced through the 254 + u32 form
        let mut blob = vec![0x01, 0xFE];
        blob.extend_from_slice(&1u32.to_le_bytes());
        blob.extend_from_slice(&[b'f', 0x01, 0x00, b'v', 0xFF]);

        let records = step_all(&blob)?;
        assert!(matches!(
            &records[1],
            Record::Entry {
                value: Value::Field { field, .. },
                ..
            } if field == &Bytes::from("f")
        ));
        Ok(())
    }

    #[test]
    fn unknown_hint_announced_as_is() -> RdbResult<()> {
        let blob = [0xFE_u8, 0x01, b'f', 0x01, 0x00, b'v', 0xFF];
        let records = step_all(&blob)?;
        assert!(matches!(records[0], Record::Head { length: 254, .. }));
        Ok(())
    }

    #[test]
    fn missing_value_rejected() {
        let blob = [0x01, 0x01, b'f', 0xFF];
        let err = step_all(&blob).unwrap_err();
        assert!(matches!(err, RdbParseError::ZipMapEnd(ref key) if key == &Bytes::from("f")));
    }
}
