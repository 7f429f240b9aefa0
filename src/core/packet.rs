//! # Binary Packets
//!
//! ## Wire Format
//! ```text
//! [Magic(4)] [Version(2)] [Type(2)] [Length(4)] [Sequence(4)] [TimestampNanos(8)] [Crc32(4)] [Payload(N)]
//! ```
//! All integers are little-endian. The checksum is CRC32-IEEE over the payload only.
//!
//! Validation runs in a fixed order: magic, version, length, then checksum once the payload
//! has arrived. The first three need nothing but the header, so an oversized length is
//! rejected before any payload is buffered.

use crate::config::{MAGIC_BYTES, MAX_PAYLOAD_SIZE, PROTOCOL_VERSION};
use crate::core::message::MessageType;
use crate::error::{ProtocolError, Result};
use crate::utils::time;
use bytes::{Buf, BufMut, Bytes, BytesMut};

const MAGIC_LEN: usize = 4;
const VERSION_LEN: usize = 2;
const TYPE_LEN: usize = 2;
const LENGTH_LEN: usize = 4;
const SEQUENCE_LEN: usize = 4;
const TIMESTAMP_LEN: usize = 8;
const CHECKSUM_LEN: usize = 4;

/// Size of the fixed header, derived from its fields
pub const HEADER_SIZE: usize =
    MAGIC_LEN + VERSION_LEN + TYPE_LEN + LENGTH_LEN + SEQUENCE_LEN + TIMESTAMP_LEN + CHECKSUM_LEN;

const _: () = assert!(HEADER_SIZE == 28);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub magic: [u8; 4],
    pub version: u16,
    pub message_type: MessageType,
    pub length: u32,
    pub sequence: u32,
    pub timestamp_nanos: i64,
    pub checksum: u32,
}

impl PacketHeader {
    /// Parse the fixed-size header. Performs no validation.
    pub fn parse(src: &[u8]) -> Result<Self> {
        if src.len() < HEADER_SIZE {
            return Err(ProtocolError::DeserializeError(format!(
                "Truncated header: {} of {HEADER_SIZE} bytes",
                src.len()
            )));
        }

        let mut buf = &src[..HEADER_SIZE];
        let mut magic = [0u8; 4];
        buf.copy_to_slice(&mut magic);

        Ok(Self {
            magic,
            version: buf.get_u16_le(),
            message_type: MessageType(buf.get_u16_le()),
            length: buf.get_u32_le(),
            sequence: buf.get_u32_le(),
            timestamp_nanos: buf.get_i64_le(),
            checksum: buf.get_u32_le(),
        })
    }

    /// Header-only checks: magic, version, then length against `max_payload`
    pub fn validate(&self, max_payload: usize) -> Result<()> {
        if self.magic != MAGIC_BYTES {
            return Err(ProtocolError::InvalidMagic(self.magic));
        }
        if self.version != PROTOCOL_VERSION {
            return Err(ProtocolError::UnsupportedVersion(self.version));
        }
        let length = self.length as usize;
        if length > max_payload {
            return Err(ProtocolError::OversizedPacket {
                size: length,
                max: max_payload,
            });
        }
        Ok(())
    }

    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(HEADER_SIZE);
        dst.put_slice(&self.magic);
        dst.put_u16_le(self.version);
        dst.put_u16_le(self.message_type.0);
        dst.put_u32_le(self.length);
        dst.put_u32_le(self.sequence);
        dst.put_i64_le(self.timestamp_nanos);
        dst.put_u32_le(self.checksum);
    }
}

/// A header plus its payload.
///
/// Constructed packets always satisfy `header.length == payload.len()` and
/// `header.checksum == crc32(payload)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub header: PacketHeader,
    pub payload: Bytes,
}

impl Packet {
    /// Build an outbound packet stamped with the current time
    pub fn new(message_type: MessageType, sequence: u32, payload: impl Into<Bytes>) -> Self {
        Self::with_timestamp(message_type, sequence, time::now_nanos(), payload)
    }

    pub fn with_timestamp(
        message_type: MessageType,
        sequence: u32,
        timestamp_nanos: i64,
        payload: impl Into<Bytes>,
    ) -> Self {
        let payload = payload.into();
        Self {
            header: PacketHeader {
                magic: MAGIC_BYTES,
                version: PROTOCOL_VERSION,
                message_type,
                length: payload.len() as u32,
                sequence,
                timestamp_nanos,
                checksum: crc32fast::hash(&payload),
            },
            payload,
        }
    }

    /// Write header then payload contiguously
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(HEADER_SIZE + self.payload.len());
        self.header.encode(dst);
        dst.put_slice(&self.payload);
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + self.payload.len());
        self.encode(&mut buf);
        buf.to_vec()
    }

    /// Decode one packet from the start of `src`.
    ///
    /// Returns `Ok(None)` when more bytes are needed; [`Packet::needed`] tells how many.
    /// Any validation failure is connection-fatal.
    pub fn decode(src: &[u8], max_payload: usize) -> Result<Option<(Packet, usize)>> {
        if src.len() < HEADER_SIZE {
            return Ok(None);
        }

        let header = PacketHeader::parse(src)?;
        header.validate(max_payload)?;

        let total = HEADER_SIZE + header.length as usize;
        if src.len() < total {
            return Ok(None);
        }

        let payload = &src[HEADER_SIZE..total];
        let actual = crc32fast::hash(payload);
        if actual != header.checksum {
            return Err(ProtocolError::ChecksumMismatch {
                expected: header.checksum,
                actual,
            });
        }

        Ok(Some((
            Packet {
                header,
                payload: Bytes::copy_from_slice(payload),
            },
            total,
        )))
    }

    /// Total bytes required to finish the packet starting at `src`
    pub fn needed(src: &[u8], max_payload: usize) -> Result<usize> {
        if src.len() < HEADER_SIZE {
            return Ok(HEADER_SIZE);
        }
        let header = PacketHeader::parse(src)?;
        header.validate(max_payload)?;
        Ok(HEADER_SIZE + header.length as usize)
    }

    /// Decode a complete buffer using the default payload limit
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        match Self::decode(bytes, MAX_PAYLOAD_SIZE)? {
            Some((packet, _)) => Ok(packet),
            None => Err(ProtocolError::DeserializeError(format!(
                "Incomplete packet: {} bytes available",
                bytes.len()
            ))),
        }
    }
}
