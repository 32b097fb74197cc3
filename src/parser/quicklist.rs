//! Quicklist: an outer length of ziplist nodes forming one logical list.
//! Nodes are decoded up front so the head can announce the true element
//! count; the slice keeps every value anyway, so peak memory is unchanged.

use std::io::Read;

use crate::errors::RdbResult;
use crate::mapper::{EmitStrategies, EmitStrategy};
use crate::reader;
use crate::record::{CollectionKind, DataKey, Record, Value};

use super::ziplist::{self, ZlEntry};
use super::Collection;

pub(crate) struct QuickListIterator {
    col: Collection,
    stage: Stage,
}

enum Stage {
    Head,
    Entries(std::vec::IntoIter<ZlEntry>),
    Done,
}

impl QuickListIterator {
    pub(crate) fn new(key: DataKey, strategies: EmitStrategies) -> Self {
        Self {
            col: Collection::new(
                key,
                CollectionKind::List,
                strategies.for_kind(CollectionKind::List),
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
                let nodes = reader::read_length(reader)?;
                let mut entries = Vec::new();
                for _ in 0..nodes {
                    let blob = reader::read_string(reader)?;
                    entries.extend(ziplist::decode(blob)?);
                }

                let length = entries.len() as u64;
                self.stage = Stage::Entries(entries.into_iter());
                Ok(Some(self.col.head(length)))
            }
            Stage::Entries(mut entries) => {
                let Some(entry) = entries.next() else {
                    return Ok(Some(self.col.slice()));
                };
                let record = self.col.entry(Value::String(entry.into_bytes()));
                self.stage = Stage::Entries(entries);
                Ok(Some(record))
            }
            Stage::Done => Ok(None),
        }
    }
}
