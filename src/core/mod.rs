//! # Core Wire Components
//!
//! Packet framing, codecs, messages and streaming I/O.
//!
//! ## Components
//! - **Packet**: fixed 28-byte little-endian header with a CRC32 payload checksum
//! - **Codec**: stateless `PacketCodec` implementations (binary, JSON) plus a `tokio_util` adapter
//! - **Message**: the marshal contract shared by both codecs and the type registry
//! - **Reader / Writer**: incremental frame I/O over async byte streams
//!
//! ## Binary Wire Format
//! ```text
//! [Magic(4)] [Version(2)] [Type(2)] [Length(4)] [Sequence(4)] [TimestampNanos(8)] [Crc32(4)] [Payload(N)]
//! ```
//!
//! ## Safety
//! - Maximum payload size is enforced from the header alone, before any payload is buffered
//! - Every framing error is connection-fatal; there is no in-band resynchronization

pub mod codec;
pub mod json;
pub mod message;
pub mod packet;
pub mod reader;
pub mod serialization;
pub mod writer;
