//! Record mapping: which of a collection's head/entry/slice records the
//! consumer actually sees.

use crate::record::{CollectionKind, Record};

/// Filter applied to the records of one collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EmitStrategy {
    /// Head, every entry, and the final slice.
    #[default]
    All,
    /// Entries only, for stream-style consumption.
    EntriesOnly,
    /// The final slice only, collecting the whole collection at once.
    SliceOnly,
}

impl EmitStrategy {
    pub(crate) fn admits(self, record: &Record) -> bool {
        match (self, record) {
            (EmitStrategy::All, _) => true,
            (EmitStrategy::EntriesOnly, Record::Entry { .. }) => true,
            (EmitStrategy::SliceOnly, Record::Slice { .. }) => true,
            _ => false,
        }
    }
}

/// Per-kind strategy table, so set semantics can be handled differently from
/// list semantics without touching the iterators.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmitStrategies {
    pub list: EmitStrategy,
    pub set: EmitStrategy,
    pub sorted_set: EmitStrategy,
    pub hash: EmitStrategy,
    pub stream: EmitStrategy,
}

impl EmitStrategies {
    /// The same strategy for every collection kind.
    pub fn uniform(strategy: EmitStrategy) -> Self {
        Self {
            list: strategy,
            set: strategy,
            sorted_set: strategy,
            hash: strategy,
            stream: strategy,
        }
    }

    pub(crate) fn for_kind(&self, kind: CollectionKind) -> EmitStrategy {
        match kind {
            CollectionKind::List => self.list,
            CollectionKind::Set => self.set,
            CollectionKind::SortedSet => self.sorted_set,
            CollectionKind::Hash => self.hash,
            CollectionKind::Stream => self.stream,
        }
    }
}
