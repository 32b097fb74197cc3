//! Streaming decoder for Redis-compatible RDB snapshot files.
//!
//! [`RdbParser`] pulls records out of a snapshot one at a time: auxiliary
//! header fields, scalar strings, and for every collection a head, its
//! entries in order, and a final slice holding all values. The byte source
//! only needs to implement [`std::io::Read`].
//!
//! ```
//! use tinirdb::RdbParser;
//!
//! // REDIS0003, SELECT 0, "foo" => "bar", EOF (no checksum before version 5)
//! let snapshot: &[u8] = &[
//!     b'R', b'E', b'D', b'I', b'S', b'0', b'0', b'0', b'3',
//!     0xFE, 0x00,
//!     0x00, 0x03, b'f', b'o', b'o', 0x03, b'b', b'a', b'r',
//!     0xFF,
//! ];
//!
//! let mut parser = RdbParser::new(snapshot);
//! while let Some(record) = parser.next_record().unwrap() {
//!     println!("{record}");
//! }
//! ```

pub mod constants;
mod errors;
mod mapper;
mod parser;
mod reader;
mod record;

pub use errors::{RdbParseError, RdbResult};
pub use mapper::{EmitStrategies, EmitStrategy};
pub use parser::{Options, RdbParser};
pub use record::{CollectionKind, DataKey, Record, StreamEntry, StreamId, Value};
