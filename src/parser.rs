//! Top-level opcode state machine: verifies the header, consumes opcodes,
//! buffers per-key metadata, and hands collection values to a sub-iterator.

pub(crate) mod intset;
pub(crate) mod listpack;
pub(crate) mod quicklist;
pub(crate) mod seq;
pub(crate) mod stream;
pub(crate) mod zipmap;
pub(crate) mod ziplist;

use std::io::Read;

use byteorder::{LittleEndian, ReadBytesExt};
use bytes::Bytes;
use tracing::debug;

use crate::constants::{
    data_type, module_op, op_code, CHECKSUM_MIN_VERSION, MAX_VERSION, MIN_VERSION, RDB_MAGIC,
};
use crate::errors::{RdbParseError, RdbResult};
use crate::mapper::{EmitStrategies, EmitStrategy};
use crate::reader::{self, crc::Crc64Reader};
use crate::record::{CollectionKind, DataKey, Record, Value};

use self::intset::IntSetIterator;
use self::quicklist::QuickListIterator;
use self::seq::{ElementReader, SeqIterator};
use self::stream::StreamIterator;
use self::zipmap::ZipMapIterator;
use self::ziplist::ZipListIterator;

/// Decoder configuration
#[derive(Debug, Clone, Copy, Default)]
pub struct Options {
    /// Emit a [`Record::DatabaseSize`] for ResizeDB opcodes instead of
    /// absorbing them
    pub emit_resize_db: bool,
    /// Verify the trailing CRC64 checksum (present from format version 5 on;
    /// a stored value of 0 means the writer disabled checksumming)
    pub verify_checksum: bool,
    /// Which records of each collection kind are surfaced
    pub strategies: EmitStrategies,
}

/// Streaming RDB snapshot parser.
///
/// Pull records with [`next_record`](RdbParser::next_record) or through the
/// [`Iterator`] impl. `Ok(None)` marks exhaustion and is sticky: once the
/// stream has ended (or failed), every further call returns it again.
pub struct RdbParser<R> {
    reader: Crc64Reader<R>,
    options: Options,
    version: u32,
    database: i64,
    pending: PendingMeta,
    state: DecoderState,
}

/// Per-key metadata announced by opcode prefixes, flushed into the next
/// key's `DataKey`
#[derive(Debug, Default)]
struct PendingMeta {
    expiry: Option<u64>,
    idle: Option<u64>,
    freq: Option<u8>,
}

impl PendingMeta {
    fn flush(&mut self, database: i64, key: Bytes) -> DataKey {
        DataKey {
            database,
            key,
            expiry: self.expiry.take(),
            idle: self.idle.take(),
            freq: self.freq.take(),
        }
    }
}

enum DecoderState {
    Header,
    Opcodes,
    Value(ValueIterator),
    Finished,
}

impl<R: Read> RdbParser<R> {
    pub fn new(reader: R) -> Self {
        Self::with_options(reader, Options::default())
    }

    pub fn with_options(reader: R, options: Options) -> Self {
        Self {
            reader: Crc64Reader::new(reader),
            options,
            version: 0,
            database: -1,
            pending: PendingMeta::default(),
            state: DecoderState::Header,
        }
    }

    /// Decode the next record, or `Ok(None)` once the stream is exhausted.
    /// Errors are terminal: the parser does not resynchronize.
    pub fn next_record(&mut self) -> RdbResult<Option<Record>> {
        match self.advance() {
            Ok(record) => Ok(record),
            Err(err) => {
                self.state = DecoderState::Finished;
                Err(err)
            }
        }
    }

    fn advance(&mut self) -> RdbResult<Option<Record>> {
        loop {
            match std::mem::replace(&mut self.state, DecoderState::Opcodes) {
                DecoderState::Finished => {
                    self.state = DecoderState::Finished;
                    return Ok(None);
                }
                DecoderState::Header => {
                    self.read_header()?;
                }
                DecoderState::Value(mut iter) => {
                    if let Some(record) = iter.next(&mut self.reader)? {
                        self.state = DecoderState::Value(iter);
                        return Ok(Some(record));
                    }
                    // sub-iterator exhausted, back to the opcode loop
                }
                DecoderState::Opcodes => {
                    if let Some(record) = self.step_opcode()? {
                        return Ok(Some(record));
                    }
                }
            }
        }
    }

    fn read_header(&mut self) -> RdbResult<()> {
        let mut magic = [0u8; 5];
        self.reader.read_exact(&mut magic)?;
        if &magic != RDB_MAGIC {
            return Err(RdbParseError::InvalidMagic);
        }

        let mut digits = [0u8; 4];
        self.reader.read_exact(&mut digits)?;
        let version: u32 = std::str::from_utf8(&digits)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| RdbParseError::InvalidVersion(Bytes::copy_from_slice(&digits)))?;

        if !(MIN_VERSION..=MAX_VERSION).contains(&version) {
            return Err(RdbParseError::UnsupportedVersion(version));
        }

        self.version = version;
        Ok(())
    }

    /// Consume one opcode. Returns a record when the opcode produces one;
    /// metadata opcodes update parser state and return `None`.
    fn step_opcode(&mut self) -> RdbResult<Option<Record>> {
        let opcode = self.reader.read_u8()?;

        match opcode {
            op_code::EXPIRE_TIME_MS => {
                self.pending.expiry = Some(reader::read_millis_time(&mut self.reader)?);
                Ok(None)
            }
            op_code::EXPIRE_TIME => {
                self.pending.expiry = Some(reader::read_seconds_time(&mut self.reader)?);
                Ok(None)
            }
            op_code::IDLE => {
                self.pending.idle = Some(reader::read_length(&mut self.reader)?);
                Ok(None)
            }
            op_code::FREQ => {
                self.pending.freq = Some(self.reader.read_u8()?);
                Ok(None)
            }
            op_code::SELECT_DB => {
                self.database = reader::read_length(&mut self.reader)? as i64;
                Ok(None)
            }
            op_code::RESIZE_DB => {
                let size = reader::read_length(&mut self.reader)?;
                let expires = reader::read_length(&mut self.reader)?;
                if self.options.emit_resize_db {
                    Ok(Some(Record::DatabaseSize {
                        database: self.database,
                        size,
                        expires,
                    }))
                } else {
                    Ok(None)
                }
            }
            op_code::AUX => {
                let key = reader::read_string(&mut self.reader)?;
                let value = reader::read_string(&mut self.reader)?;
                Ok(Some(Record::Aux { key, value }))
            }
            op_code::MODULE_AUX => {
                skip_module_payload(&mut self.reader)?;
                Ok(None)
            }
            op_code::EOF => {
                self.finish()?;
                Ok(None)
            }
            data_type => {
                let key = reader::read_string(&mut self.reader)?;
                let data_key = self.pending.flush(self.database, key);
                self.begin_value(data_type, data_key)
            }
        }
    }

    fn begin_value(&mut self, data_type: u8, key: DataKey) -> RdbResult<Option<Record>> {
        let strategies = self.options.strategies;
        let iter = match data_type {
            data_type::STRING => {
                let value = reader::read_string(&mut self.reader)?;
                return Ok(Some(Record::String { key, value }));
            }
            data_type::LIST => ValueIterator::Seq(SeqIterator::new(
                key,
                CollectionKind::List,
                ElementReader::String,
                strategies,
            )),
            data_type::SET => ValueIterator::Seq(SeqIterator::new(
                key,
                CollectionKind::Set,
                ElementReader::String,
                strategies,
            )),
            data_type::ZSET => ValueIterator::Seq(SeqIterator::new(
                key,
                CollectionKind::SortedSet,
                ElementReader::Scored { binary: false },
                strategies,
            )),
            data_type::ZSET_2 => ValueIterator::Seq(SeqIterator::new(
                key,
                CollectionKind::SortedSet,
                ElementReader::Scored { binary: true },
                strategies,
            )),
            data_type::HASH => ValueIterator::Seq(SeqIterator::new(
                key,
                CollectionKind::Hash,
                ElementReader::Field,
                strategies,
            )),
            data_type::HASH_ZIPMAP => {
                ValueIterator::ZipMap(ZipMapIterator::new(key, strategies))
            }
            data_type::LIST_ZIPLIST => ValueIterator::ZipList(ZipListIterator::new(
                key,
                CollectionKind::List,
                strategies,
            )),
            data_type::SET_INTSET => {
                ValueIterator::IntSet(IntSetIterator::new(key, strategies))
            }
            data_type::ZSET_ZIPLIST => ValueIterator::ZipList(ZipListIterator::new(
                key,
                CollectionKind::SortedSet,
                strategies,
            )),
            data_type::HASH_ZIPLIST => ValueIterator::ZipList(ZipListIterator::new(
                key,
                CollectionKind::Hash,
                strategies,
            )),
            data_type::LIST_QUICKLIST => {
                ValueIterator::QuickList(QuickListIterator::new(key, strategies))
            }
            data_type::STREAM_LISTPACKS => {
                ValueIterator::Stream(StreamIterator::new(key, strategies))
            }
            data_type::MODULE | data_type::MODULE_2 => {
                debug!(key = ?key.key, "skipping opaque module value");
                skip_module_payload(&mut self.reader)?;
                return Ok(None);
            }
            other => return Err(RdbParseError::DataType(other)),
        };

        self.state = DecoderState::Value(iter);
        Ok(None)
    }

    /// Consume the checksum trailer and mark the stream exhausted.
    fn finish(&mut self) -> RdbResult<()> {
        if self.version >= CHECKSUM_MIN_VERSION {
            // the stored checksum covers everything up to and including the
            // EOF opcode, so compute before reading the trailer
            let computed = self.reader.checksum();
            let stored = self.reader.read_u64::<LittleEndian>()?;
            if self.options.verify_checksum && stored != 0 && stored != computed {
                return Err(RdbParseError::ChecksumMismatch { stored, computed });
            }
        }
        self.state = DecoderState::Finished;
        Ok(())
    }
}

impl<R: Read> Iterator for RdbParser<R> {
    type Item = RdbResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => None,
            Err(err) => Some(Err(err)),
        }
    }
}

/// Skip an opaque module payload (value types 6 and 7 and the ModuleAux
/// opcode): a length-encoded module id, then opcode-tagged values until the
/// end marker. Consumes exactly the payload, keeping the outer stream
/// aligned.
fn skip_module_payload<R: Read>(reader: &mut R) -> RdbResult<()> {
    let _module_id = reader::read_length(reader)?;

    loop {
        match reader::read_length(reader)? {
            module_op::EOF => return Ok(()),
            module_op::SINT | module_op::UINT => {
                reader::read_length(reader)?;
            }
            module_op::FLOAT => {
                let mut buf = [0u8; 4];
                reader.read_exact(&mut buf)?;
            }
            module_op::DOUBLE => {
                let mut buf = [0u8; 8];
                reader.read_exact(&mut buf)?;
            }
            module_op::STRING => {
                reader::read_string(reader)?;
            }
            other => return Err(RdbParseError::ModuleOpcode(other)),
        }
    }
}

/// Shared per-collection bookkeeping: builds the head/entry/slice records
/// and accumulates the running value slice.
pub(crate) struct Collection {
    key: DataKey,
    kind: CollectionKind,
    strategy: EmitStrategy,
    length: u64,
    index: u64,
    values: Vec<Value>,
}

impl Collection {
    pub(crate) fn new(key: DataKey, kind: CollectionKind, strategy: EmitStrategy) -> Self {
        Self {
            key,
            kind,
            strategy,
            length: 0,
            index: 0,
            values: Vec::new(),
        }
    }

    pub(crate) fn kind(&self) -> CollectionKind {
        self.kind
    }

    pub(crate) fn strategy(&self) -> EmitStrategy {
        self.strategy
    }

    pub(crate) fn done(&self) -> bool {
        self.index >= self.length
    }

    pub(crate) fn head(&mut self, length: u64) -> Record {
        self.length = length;
        Record::Head {
            key: self.key.clone(),
            kind: self.kind,
            length,
        }
    }

    pub(crate) fn entry(&mut self, value: Value) -> Record {
        let record = Record::Entry {
            key: self.key.clone(),
            kind: self.kind,
            index: self.index,
            length: self.length,
            value: value.clone(),
        };
        self.index += 1;
        self.values.push(value);
        record
    }

    pub(crate) fn slice(&mut self) -> Record {
        Record::Slice {
            key: self.key.clone(),
            kind: self.kind,
            values: std::mem::take(&mut self.values),
        }
    }
}

pub(crate) enum ValueIterator {
    Seq(SeqIterator),
    IntSet(IntSetIterator),
    ZipMap(ZipMapIterator),
    ZipList(ZipListIterator),
    QuickList(QuickListIterator),
    Stream(StreamIterator),
}

impl ValueIterator {
    /// Next surfaced record of the active collection, or `None` at its end.
    /// Records suppressed by the emit strategy are absorbed here.
    fn next<R: Read>(&mut self, reader: &mut R) -> RdbResult<Option<Record>> {
        loop {
            let (record, strategy) = match self {
                ValueIterator::Seq(iter) => (iter.step(reader)?, iter.strategy()),
                ValueIterator::IntSet(iter) => (iter.step(reader)?, iter.strategy()),
                ValueIterator::ZipMap(iter) => (iter.step(reader)?, iter.strategy()),
                ValueIterator::ZipList(iter) => (iter.step(reader)?, iter.strategy()),
                ValueIterator::QuickList(iter) => (iter.step(reader)?, iter.strategy()),
                ValueIterator::Stream(iter) => (iter.step(reader)?, iter.strategy()),
            };
            let Some(record) = record else {
                return Ok(None);
            };
            if strategy.admits(&record) {
                return Ok(Some(record));
            }
        }
    }
}
