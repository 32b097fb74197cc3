use bytes::Bytes;

/// Result type for snapshot decoding
pub type RdbResult<T> = Result<T, RdbParseError>;

/// Errors while decoding an RDB snapshot. Every error is fatal to the
/// stream; the decoder does not resynchronize.
#[derive(Debug, thiserror::Error)]
pub enum RdbParseError {
    #[error("invalid magic string")]
    InvalidMagic,
    #[error("invalid version bytes {0:?}")]
    InvalidVersion(Bytes),
    #[error("unsupported version {0}")]
    UnsupportedVersion(u32),
    #[error("invalid length encoding {0:#04x}")]
    LengthEncoding(u8),
    #[error("invalid string encoding {0}")]
    StringEncoding(u64),
    #[error("unsupported data type {0}")]
    DataType(u8),
    #[error("invalid module opcode {0}")]
    ModuleOpcode(u64),
    #[error("invalid intset encoding {0}")]
    IntSetEncoding(u32),
    #[error("unexpected end of zipmap for key {0:?}")]
    ZipMapEnd(Bytes),
    #[error("invalid ziplist entry header {0:#04x}")]
    ZipListHeader(u8),
    #[error("invalid ziplist end byte {0:#04x}")]
    ZipListEnd(u8),
    #[error("ziplist length {0} not divisible by 2")]
    ZipListLength(u64),
    #[error("invalid listpack entry header {0:#04x}")]
    ListpackHeader(u8),
    #[error("invalid stream data: {0}")]
    Stream(&'static str),
    #[error("failed to parse float from {0:?}")]
    ParseFloat(Bytes),
    #[error("invalid lzf data: {0}")]
    Lzf(&'static str),
    #[error("checksum mismatch: stored {stored:#018x}, computed {computed:#018x}")]
    ChecksumMismatch { stored: u64, computed: u64 },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
