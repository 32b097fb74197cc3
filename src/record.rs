use std::fmt;

use bytes::Bytes;

/// Identity shared by every record of one logical key: the database it lives
/// in, the key itself, and any metadata announced by opcode prefixes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataKey {
    /// Database index from the last `SelectDB`, or -1 if none was seen
    pub database: i64,
    pub key: Bytes,
    /// Expiry as Unix epoch milliseconds
    pub expiry: Option<u64>,
    /// LRU idle time announced for this key
    pub idle: Option<u64>,
    /// LFU access frequency announced for this key
    pub freq: Option<u8>,
}

/// Logical collection kind, carried on head/entry/slice records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionKind {
    List,
    Set,
    SortedSet,
    Hash,
    Stream,
}

/// A stream entry id: milliseconds part and sequence part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamId {
    pub ms: u64,
    pub seq: u64,
}

/// One entry of a stream: its id and field/value pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEntry {
    pub id: StreamId,
    pub fields: Vec<(Bytes, Bytes)>,
}

/// A single element of a collection. The variant depends on the collection
/// kind: strings for lists and sets, native integers for intsets, scored
/// members for sorted sets, field/value pairs for hashes.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(Bytes),
    Int(i64),
    Scored { member: Bytes, score: f64 },
    Field { field: Bytes, value: Bytes },
    Stream(StreamEntry),
}

/// One decoded record of the snapshot stream.
///
/// For every collection the decoder emits exactly one `Head`, then one
/// `Entry` per element with indices 0..length, then one `Slice` carrying all
/// values in entry order.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    /// Header metadata pair (opcode 0xFA)
    Aux { key: Bytes, value: Bytes },
    /// Hash-table sizing announced by ResizeDB, if emission is enabled
    DatabaseSize {
        database: i64,
        size: u64,
        expires: u64,
    },
    /// A scalar string key
    String { key: DataKey, value: Bytes },
    /// Start of a collection, announcing its length
    Head {
        key: DataKey,
        kind: CollectionKind,
        length: u64,
    },
    /// One collection element
    Entry {
        key: DataKey,
        kind: CollectionKind,
        index: u64,
        length: u64,
        value: Value,
    },
    /// All values of a collection, in entry order
    Slice {
        key: DataKey,
        kind: CollectionKind,
        values: Vec<Value>,
    },
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CollectionKind::List => "list",
            CollectionKind::Set => "set",
            CollectionKind::SortedSet => "zset",
            CollectionKind::Hash => "hash",
            CollectionKind::Stream => "stream",
        };
        f.write_str(name)
    }
}

impl fmt::Display for DataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "db={} key={:?}",
            self.database,
            String::from_utf8_lossy(&self.key)
        )?;
        if let Some(expiry) = self.expiry {
            write!(f, " expiry={expiry}")?;
        }
        if let Some(idle) = self.idle {
            write!(f, " idle={idle}")?;
        }
        if let Some(freq) = self.freq {
            write!(f, " freq={freq}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(value) => write!(f, "{:?}", String::from_utf8_lossy(value)),
            Value::Int(value) => write!(f, "{value}"),
            Value::Scored { member, score } => {
                write!(f, "{:?}:{score}", String::from_utf8_lossy(member))
            }
            Value::Field { field, value } => write!(
                f,
                "{:?}={:?}",
                String::from_utf8_lossy(field),
                String::from_utf8_lossy(value)
            ),
            Value::Stream(entry) => {
                write!(f, "{}-{}", entry.id.ms, entry.id.seq)?;
                for (field, value) in &entry.fields {
                    write!(
                        f,
                        " {:?}={:?}",
                        String::from_utf8_lossy(field),
                        String::from_utf8_lossy(value)
                    )?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Record::Aux { key, value } => write!(
                f,
                "aux {:?}={:?}",
                String::from_utf8_lossy(key),
                String::from_utf8_lossy(value)
            ),
            Record::DatabaseSize {
                database,
                size,
                expires,
            } => write!(f, "dbsize db={database} size={size} expires={expires}"),
            Record::String { key, value } => {
                write!(f, "string {key} value={:?}", String::from_utf8_lossy(value))
            }
            Record::Head { key, kind, length } => write!(f, "{kind}-head {key} len={length}"),
            Record::Entry {
                key,
                kind,
                index,
                length,
                value,
            } => write!(f, "{kind}-entry {key} [{index}/{length}] {value}"),
            Record::Slice { key, kind, values } => {
                write!(f, "{kind}-slice {key} n={} [", values.len())?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{value}")?;
                }
                f.write_str("]")
            }
        }
    }
}
