//! Packed integer set: a length-prefixed blob holding a fixed-width
//! little-endian integer array.

use std::io::Read;

use byteorder::{LittleEndian, ReadBytesExt};
use bytes::{Buf, Bytes};

use crate::errors::{RdbParseError, RdbResult};
use crate::mapper::{EmitStrategies, EmitStrategy};
use crate::reader;
use crate::record::{CollectionKind, DataKey, Record, Value};

use super::Collection;

pub(crate) struct IntSetIterator {
    col: Collection,
    stage: Stage,
}

enum Stage {
    Head,
    Entries {
        buf: bytes::buf::Reader<Bytes>,
        encoding: u32,
    },
    Done,
}

impl IntSetIterator {
    pub(crate) fn new(key: DataKey, strategies: EmitStrategies) -> Self {
        Self {
            col: Collection::new(
                key,
                CollectionKind::Set,
                strategies.for_kind(CollectionKind::Set),
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

                let encoding = buf.read_u32::<LittleEndian>()?;
                if !matches!(encoding, 2 | 4 | 8) {
                    return Err(RdbParseError::IntSetEncoding(encoding));
                }
                let length = buf.read_u32::<LittleEndian>()? as u64;

                self.stage = Stage::Entries { buf, encoding };
                Ok(Some(self.col.head(length)))
            }
            Stage::Entries { .. } if self.col.done() => Ok(Some(self.col.slice())),
            Stage::Entries { mut buf, encoding } => {
                let value = match encoding {
                    2 => buf.read_i16::<LittleEndian>()? as i64,
                    4 => buf.read_i32::<LittleEndian>()? as i64,
                    _ => buf.read_i64::<LittleEndian>()?,
                };
                let record = self.col.entry(Value::Int(value));
                self.stage = Stage::Entries { buf, encoding };
                Ok(Some(record))
            }
            Stage::Done => Ok(None),
        }
    }
}
