//! Sequence iterator for the plain (non-packed) collection encodings:
//! a length, then that many elements read by a pluggable element reader.

use std::io::Read;

use crate::errors::RdbResult;
use crate::mapper::{EmitStrategies, EmitStrategy};
use crate::reader;
use crate::record::{CollectionKind, DataKey, Record, Value};

use super::Collection;

/// Reads one element of a sequence-encoded collection.
pub(crate) enum ElementReader {
    /// A single string (lists and sets)
    String,
    /// Member plus score; `binary` picks the v2 IEEE-754 form over the
    /// legacy string double
    Scored { binary: bool },
    /// Field/value pair (hashes; the announced length counts pairs)
    Field,
}

impl ElementReader {
    fn read<R: Read>(&self, reader: &mut R) -> RdbResult<Value> {
        match self {
            ElementReader::String => Ok(Value::String(reader::read_string(reader)?)),
            ElementReader::Scored { binary } => {
                let member = reader::read_string(reader)?;
                let score = if *binary {
                    reader::read_binary_double(reader)?
                } else {
                    reader::read_legacy_double(reader)?
                };
                Ok(Value::Scored { member, score })
            }
            ElementReader::Field => {
                let field = reader::read_string(reader)?;
                let value = reader::read_string(reader)?;
                Ok(Value::Field { field, value })
            }
        }
    }
}

pub(crate) struct SeqIterator {
    col: Collection,
    element: ElementReader,
    stage: Stage,
}

enum Stage {
    Head,
    Entries,
    Done,
}

impl SeqIterator {
    pub(crate) fn new(
        key: DataKey,
        kind: CollectionKind,
        element: ElementReader,
        strategies: EmitStrategies,
    ) -> Self {
        Self {
            col: Collection::new(key, kind, strategies.for_kind(kind)),
            element,
            stage: Stage::Head,
        }
    }

    pub(crate) fn strategy(&self) -> EmitStrategy {
        self.col.strategy()
    }

    pub(crate) fn step<R: Read>(&mut self, reader: &mut R) -> RdbResult<Option<Record>> {
        match self.stage {
            Stage::Head => {
                let length = reader::read_length(reader)?;
                self.stage = Stage::Entries;
                Ok(Some(self.col.head(length)))
            }
            Stage::Entries if self.col.done() => {
                self.stage = Stage::Done;
                Ok(Some(self.col.slice()))
            }
            Stage::Entries => {
                let value = self.element.read(reader)?;
                Ok(Some(self.col.entry(value)))
            }
            Stage::Done => Ok(None),
        }
    }
}
