//! Byte-level constants of the RDB snapshot format.

pub const RDB_MAGIC: &[u8; 5] = b"REDIS";

pub const MIN_VERSION: u32 = 1;
pub const MAX_VERSION: u32 = 9;
/// The 8-byte CRC64 trailer exists from this format version on.
pub const CHECKSUM_MIN_VERSION: u32 = 5;

/// Top-level opcodes, consumed between keys.
pub mod op_code {
    pub const MODULE_AUX: u8 = 0xF7;
    pub const IDLE: u8 = 0xF8;
    pub const FREQ: u8 = 0xF9;
    pub const AUX: u8 = 0xFA;
    pub const RESIZE_DB: u8 = 0xFB;
    pub const EXPIRE_TIME_MS: u8 = 0xFC;
    pub const EXPIRE_TIME: u8 = 0xFD;
    pub const SELECT_DB: u8 = 0xFE;
    pub const EOF: u8 = 0xFF;
}

/// Value type flags. Any byte that is not an opcode is read as one of these.
pub mod data_type {
    pub const STRING: u8 = 0;
    pub const LIST: u8 = 1;
    pub const SET: u8 = 2;
    pub const ZSET: u8 = 3;
    pub const HASH: u8 = 4;
    pub const ZSET_2: u8 = 5;
    pub const MODULE: u8 = 6;
    pub const MODULE_2: u8 = 7;
    pub const HASH_ZIPMAP: u8 = 9;
    pub const LIST_ZIPLIST: u8 = 10;
    pub const SET_INTSET: u8 = 11;
    pub const ZSET_ZIPLIST: u8 = 12;
    pub const HASH_ZIPLIST: u8 = 13;
    pub const LIST_QUICKLIST: u8 = 14;
    pub const STREAM_LISTPACKS: u8 = 15;
}

/// Special string-encoding selectors (length prefix with top bits `11`).
pub mod str_enc {
    pub const INT8: u64 = 0;
    pub const INT16: u64 = 1;
    pub const INT32: u64 = 2;
    pub const LZF: u64 = 3;
}

/// Opcodes inside a module payload, used only to skip it.
pub mod module_op {
    pub const EOF: u64 = 0;
    pub const SINT: u64 = 1;
    pub const UINT: u64 = 2;
    pub const FLOAT: u64 = 3;
    pub const DOUBLE: u64 = 4;
    pub const STRING: u64 = 5;
}
