//! Stream values (type 15): listpack-encoded entries keyed by a 16-byte
//! master id, followed by stream metadata and consumer groups with their
//! pending-entry lists.
//!
//! The whole value is consumed before the head is emitted, so the outer
//! stream stays aligned even though group metadata is not surfaced as
//! records.

use std::io::Read;

use byteorder::{BigEndian, LittleEndian, ReadBytesExt};
use bytes::Bytes;
use tracing::debug;

use crate::errors::{RdbParseError, RdbResult};
use crate::mapper::{EmitStrategies, EmitStrategy};
use crate::reader;
use crate::record::{CollectionKind, DataKey, Record, StreamEntry, StreamId, Value};

use super::listpack::{self, LpEntry};
use super::Collection;

const ITEM_FLAG_DELETED: i64 = 1;
const ITEM_FLAG_SAMEFIELDS: i64 = 2;

pub(crate) struct StreamIterator {
    col: Collection,
    stage: Stage,
}

enum Stage {
    Head,
    Entries(std::vec::IntoIter<StreamEntry>),
    Done,
}

impl StreamIterator {
    pub(crate) fn new(key: DataKey, strategies: EmitStrategies) -> Self {
        Self {
            col: Collection::new(
                key,
                CollectionKind::Stream,
                strategies.for_kind(CollectionKind::Stream),
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
                let entries = read_stream_value(reader)?;
                let length = entries.len() as u64;
                self.stage = Stage::Entries(entries.into_iter());
                Ok(Some(self.col.head(length)))
            }
            Stage::Entries(mut entries) => {
                let Some(entry) = entries.next() else {
                    return Ok(Some(self.col.slice()));
                };
                let record = self.col.entry(Value::Stream(entry));
                self.stage = Stage::Entries(entries);
                Ok(Some(record))
            }
            Stage::Done => Ok(None),
        }
    }
}

/// Consume an entire stream value, returning its live entries.
fn read_stream_value<R: Read>(reader: &mut R) -> RdbResult<Vec<StreamEntry>> {
    let mut entries = Vec::new();

    let listpacks = reader::read_length(reader)?;
    for _ in 0..listpacks {
        let master_key = reader::read_string(reader)?;
        if master_key.len() != 16 {
            return Err(RdbParseError::Stream("master entry key must be 16 bytes"));
        }
        let mut id_bytes = &master_key[..];
        let master = StreamId {
            ms: id_bytes.read_u64::<BigEndian>()?,
            seq: id_bytes.read_u64::<BigEndian>()?,
        };

        let blob = reader::read_string(reader)?;
        decode_entries(master, blob, &mut entries)?;
    }

    let _items = reader::read_length(reader)?;
    let _last_ms = reader::read_length(reader)?;
    let _last_seq = reader::read_length(reader)?;
    skip_consumer_groups(reader)?;

    Ok(entries)
}

/// Decode the items of one listpack into stream entries, dropping items
/// flagged as deleted.
fn decode_entries(master: StreamId, blob: Bytes, out: &mut Vec<StreamEntry>) -> RdbResult<()> {
    let mut lp = Lp {
        inner: listpack::decode(blob)?.into_iter(),
    };

    let count = lp.int()?;
    let deleted = lp.int()?;

    let num_master_fields = lp.int()?;
    let mut master_fields = Vec::with_capacity(num_master_fields.max(0) as usize);
    for _ in 0..num_master_fields {
        master_fields.push(lp.bytes()?);
    }
    if lp.int()? != 0 {
        return Err(RdbParseError::Stream("master entry missing end marker"));
    }

    for _ in 0..(count + deleted) {
        let flags = lp.int()?;
        let ms_diff = lp.int()?;
        let seq_diff = lp.int()?;

        let mut fields = Vec::new();
        if flags & ITEM_FLAG_SAMEFIELDS != 0 {
            for field in &master_fields {
                fields.push((field.clone(), lp.bytes()?));
            }
        } else {
            let num_fields = lp.int()?;
            for _ in 0..num_fields {
                let field = lp.bytes()?;
                let value = lp.bytes()?;
                fields.push((field, value));
            }
        }
        // per-item element count used for backward iteration
        lp.int()?;

        if flags & ITEM_FLAG_DELETED != 0 {
            continue;
        }
        out.push(StreamEntry {
            id: StreamId {
                ms: master.ms.wrapping_add(ms_diff as u64),
                seq: master.seq.wrapping_add(seq_diff as u64),
            },
            fields,
        });
    }

    Ok(())
}

/// Consume consumer groups, their global PELs, and per-consumer PELs. Every
/// field is parsed (nothing is blind-skipped), so a malformed group fails
/// loudly instead of desynchronizing the stream; the contents are traced at
/// debug level rather than surfaced as records.
fn skip_consumer_groups<R: Read>(reader: &mut R) -> RdbResult<()> {
    let groups = reader::read_length(reader)?;
    for _ in 0..groups {
        let name = reader::read_string(reader)?;
        let last_ms = reader::read_length(reader)?;
        let last_seq = reader::read_length(reader)?;

        let pending = reader::read_length(reader)?;
        for _ in 0..pending {
            skip_pending_entry(reader)?;
        }

        let consumers = reader::read_length(reader)?;
        for _ in 0..consumers {
            let consumer = reader::read_string(reader)?;
            let _seen_time = reader.read_u64::<LittleEndian>()?;
            let owned = reader::read_length(reader)?;
            for _ in 0..owned {
                let mut id = [0u8; 16];
                reader.read_exact(&mut id)?;
            }
            debug!(
                consumer = %String::from_utf8_lossy(&consumer),
                owned,
                "consumer state consumed"
            );
        }

        debug!(
            group = %String::from_utf8_lossy(&name),
            last_ms,
            last_seq,
            pending,
            consumers,
            "consumer group metadata consumed"
        );
    }
    Ok(())
}

fn skip_pending_entry<R: Read>(reader: &mut R) -> RdbResult<()> {
    let mut id = [0u8; 16];
    reader.read_exact(&mut id)?;
    let _delivery_time = reader.read_u64::<LittleEndian>()?;
    let _delivery_count = reader::read_length(reader)?;
    Ok(())
}

/// Cursor over decoded listpack elements with truncation errors.
struct Lp {
    inner: std::vec::IntoIter<LpEntry>,
}

impl Lp {
    fn next(&mut self) -> RdbResult<LpEntry> {
        self.inner
            .next()
            .ok_or(RdbParseError::Stream("listpack ended early"))
    }

    fn int(&mut self) -> RdbResult<i64> {
        self.next()?.to_i64()
    }

    fn bytes(&mut self) -> RdbResult<Bytes> {
        Ok(self.next()?.into_bytes())
    }
}

#[cfg(test)]
mod test {
    use super::super::listpack::testutil::{build, Entry};
    use super::*;
    use crate::parser::RdbParser;
    use crate::record::Record;

    fn master_key(ms: u64, seq: u64) -> Vec<u8> {
        let mut key = Vec::with_capacity(16);
        key.extend_from_slice(&ms.to_be_bytes());
        key.extend_from_slice(&seq.to_be_bytes());
        key
    }

    fn stream_rdb(listpacks: &[(Vec<u8>, Vec<u8>)], items: u8, groups: &[u8]) -> Vec<u8> {
        let mut bytes = b"REDIS0009".to_vec();
        bytes.extend_from_slice(&[0x0F, 0x01, b'x']); // stream value, key "x"
        bytes.push(listpacks.len() as u8);
        for (key, blob) in listpacks {
            bytes.push(key.len() as u8);
            bytes.extend_from_slice(key);
            bytes.push(blob.len() as u8);
            bytes.extend_from_slice(blob);
        }
        bytes.push(items); // current item count
        bytes.extend_from_slice(&[0x05, 0x00]); // last id ms/seq
        bytes.extend_from_slice(groups);
        bytes.push(0xFF);
        bytes.extend_from_slice(&[0u8; 8]);
        bytes
    }

    fn decode_records(bytes: &[u8]) -> RdbResult<Vec<Record>> {
        RdbParser::new(bytes).collect()
    }

    #[test]
    fn entries_with_shared_and_own_fields() -> RdbResult<()> {
        let blob = build(&[
            Entry::Int(2), // count
            Entry::Int(0), // deleted
            Entry::Int(1), // master fields
            Entry::Str(b"temp"),
            Entry::Int(0), // end of master entry
            // item 1: SAMEFIELDS
            Entry::Int(ITEM_FLAG_SAMEFIELDS),
            Entry::Int(0), // ms diff
            Entry::Int(0), // seq diff
            Entry::Str(b"20"),
            Entry::Int(4), // back count
            // item 2: own fields
            Entry::Int(0),
            Entry::Int(1), // ms diff
            Entry::Int(0),
            Entry::Int(1), // field count
            Entry::Str(b"hum"),
            Entry::Str(b"40"),
            Entry::Int(6), // back count
        ]);
        let bytes = stream_rdb(&[(master_key(1000, 0), blob)], 2, &[0x00]);

        let records = decode_records(&bytes)?;
        assert_eq!(records.len(), 4); // head, 2 entries, slice

        let Record::Head { length, .. } = &records[0] else {
            panic!("expected a head record");
        };
        assert_eq!(*length, 2);

        let Record::Entry {
            value: Value::Stream(entry),
            ..
        } = &records[1]
        else {
            panic!("expected a stream entry");
        };
        assert_eq!(entry.id, StreamId { ms: 1000, seq: 0 });
        assert_eq!(
            entry.fields,
            vec![(Bytes::from("temp"), Bytes::from("20"))]
        );

        let Record::Entry {
            value: Value::Stream(entry),
            ..
        } = &records[2]
        else {
            panic!("expected a stream entry");
        };
        assert_eq!(entry.id, StreamId { ms: 1001, seq: 0 });
        assert_eq!(entry.fields, vec![(Bytes::from("hum"), Bytes::from("40"))]);
        Ok(())
    }

    #[test]
    fn deleted_items_are_dropped() -> RdbResult<()> {
        let blob = build(&[
            Entry::Int(1), // count
            Entry::Int(1), // deleted
            Entry::Int(0), // no master fields
            Entry::Int(0), // end of master entry
            // live item
            Entry::Int(0),
            Entry::Int(0),
            Entry::Int(1),
            Entry::Int(1),
            Entry::Str(b"f"),
            Entry::Str(b"v"),
            Entry::Int(6),
            // deleted item
            Entry::Int(ITEM_FLAG_DELETED),
            Entry::Int(0),
            Entry::Int(2),
            Entry::Int(0), // no fields
            Entry::Int(4),
        ]);
        let bytes = stream_rdb(&[(master_key(7, 0), blob)], 1, &[0x00]);

        let records = decode_records(&bytes)?;
        assert_eq!(records.len(), 3); // head, 1 entry, slice
        let Record::Entry {
            value: Value::Stream(entry),
            ..
        } = &records[1]
        else {
            panic!("expected a stream entry");
        };
        assert_eq!(entry.id, StreamId { ms: 7, seq: 1 });
        Ok(())
    }

    #[test]
    fn consumer_groups_keep_alignment() -> RdbResult<()> {
        let blob = build(&[
            Entry::Int(1),
            Entry::Int(0),
            Entry::Int(0),
            Entry::Int(0),
            Entry::Int(0),
            Entry::Int(0),
            Entry::Int(0),
            Entry::Int(1),
            Entry::Str(b"f"),
            Entry::Str(b"v"),
            Entry::Int(6),
        ]);

        // one group, one global pending entry, one consumer with one
        // pending id
        let mut groups = vec![0x01];
        groups.extend_from_slice(&[0x01, b'g']); // name
        groups.extend_from_slice(&[0x05, 0x00]); // group last id
        groups.push(0x01); // global PEL size
        groups.extend_from_slice(&[0u8; 16]); // pending id
        groups.extend_from_slice(&123u64.to_le_bytes()); // delivery time
        groups.push(0x02); // delivery count
        groups.push(0x01); // consumers
        groups.extend_from_slice(&[0x01, b'c']); // consumer name
        groups.extend_from_slice(&456u64.to_le_bytes()); // seen time
        groups.push(0x01); // consumer PEL size
        groups.extend_from_slice(&[0u8; 16]); // pending id

        let bytes = stream_rdb(&[(master_key(1, 1), blob)], 1, &groups);

        // the stream after the groups (EOF + checksum) must still parse
        let records = decode_records(&bytes)?;
        assert_eq!(records.len(), 3);
        Ok(())
    }

    #[test]
    fn bad_master_key_rejected() {
        let bytes = stream_rdb(&[(vec![0u8; 8], vec![])], 0, &[0x00]);
        let err = decode_records(&bytes).unwrap_err();
        assert!(matches!(err, RdbParseError::Stream(_)));
    }
}
