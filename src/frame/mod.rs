//! UHF reader binary frame codec.
//!
//! Frames are `[0xA0, length, opcode, payload.., checksum]` in both
//! directions. Encoding is pure and total over valid inputs; decoding never
//! fails on unknown op-codes, only on truncated frames.

mod parser;
mod protocol;
mod types;


// Re-export public API
pub use parser::decode;
pub use protocol::{bytes_to_hex, checksum, encode, format_frame, hex_to_bytes};
pub use types::{Bank, Command, DEFAULT_PASSWORD, InboundEvent, Malformed, OpStatus, TagReport};
