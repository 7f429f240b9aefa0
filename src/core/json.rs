//! # JSON Codec
//!
//! Alternate wire format for debugging and interop with tooling that cannot speak the binary
//! header. Each envelope is a JSON document preceded by its byte length so it can be framed on
//! a raw stream:
//!
//! ```text
//! [Length(4, LE)] {"type": 1, "timestamp": 1700000000000000000, "sequence": 7, "data": {...}}
//! ```
//!
//! `max_payload` bounds the message bytes, as with the binary codec. The document limit is
//! derived from it: base64 payload text plus a fixed allowance for the envelope fields.
//!
//! There is no checksum. Types the registry does not know decode to a
//! [`GenericMessage`](crate::core::message::GenericMessage) holding the raw `data` fields,
//! so newer peers can add types without breaking older ones.

use crate::config::MAX_PAYLOAD_SIZE;
use crate::core::codec::{Decoded, Frame, PacketCodec};
use crate::core::message::{Message, MessageRegistry, MessageType};
use crate::core::serialization::SerializationFormat;
use crate::error::{ProtocolError, Result};
use crate::utils::time;
use bytes::{BufMut, BytesMut};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

const LENGTH_PREFIX: usize = 4;

/// Room for the envelope and call fields around a base64 payload
const ENVELOPE_ALLOWANCE: usize = 4096;

/// Largest document that can carry a `max_payload`-byte payload.
fn document_limit(max_payload: usize) -> usize {
    max_payload
        .div_ceil(3)
        .saturating_mul(4)
        .saturating_add(ENVELOPE_ALLOWANCE)
        .min(u32::MAX as usize)
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    message_type: u16,
    timestamp: i64,
    sequence: u32,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Clone)]
pub struct JsonCodec {
    registry: Arc<MessageRegistry>,
    max_payload: usize,
    max_document: usize,
}

impl JsonCodec {
    pub fn new(registry: Arc<MessageRegistry>, max_payload: usize) -> Self {
        Self {
            registry,
            max_payload,
            max_document: document_limit(max_payload),
        }
    }

    /// Largest length prefix accepted on decode or produced on encode
    pub fn document_limit(&self) -> usize {
        self.max_document
    }
}

impl Default for JsonCodec {
    fn default() -> Self {
        Self::new(Arc::new(MessageRegistry::with_defaults()), MAX_PAYLOAD_SIZE)
    }
}

impl PacketCodec for JsonCodec {
    fn format(&self) -> SerializationFormat {
        SerializationFormat::Json
    }

    fn max_payload(&self) -> usize {
        self.max_payload
    }

    fn encode(&self, message: &dyn Message, sequence: u32, dst: &mut BytesMut) -> Result<()> {
        let envelope = Envelope {
            message_type: message.message_type().0,
            timestamp: time::now_nanos(),
            sequence,
            data: message.to_json()?,
        };
        let document = serde_json::to_vec(&envelope)?;
        if document.len() > self.max_document {
            return Err(ProtocolError::OversizedPacket {
                size: document.len(),
                max: self.max_document,
            });
        }

        dst.reserve(LENGTH_PREFIX + document.len());
        dst.put_u32_le(document.len() as u32);
        dst.put_slice(&document);
        Ok(())
    }

    fn decode(&self, src: &[u8]) -> Result<Decoded> {
        if src.len() < LENGTH_PREFIX {
            return Ok(Decoded::Incomplete {
                needed: LENGTH_PREFIX,
            });
        }

        let mut prefix = [0u8; LENGTH_PREFIX];
        prefix.copy_from_slice(&src[..LENGTH_PREFIX]);
        let length = u32::from_le_bytes(prefix) as usize;
        if length > self.max_document {
            return Err(ProtocolError::OversizedPacket {
                size: length,
                max: self.max_document,
            });
        }

        let total = LENGTH_PREFIX + length;
        if src.len() < total {
            return Ok(Decoded::Incomplete { needed: total });
        }

        let envelope: Envelope = serde_json::from_slice(&src[LENGTH_PREFIX..total])?;
        let message_type = MessageType(envelope.message_type);
        let mut message = self.registry.create(message_type);
        message.merge_json(envelope.data)?;

        Ok(Decoded::Frame {
            frame: Frame {
                message_type,
                sequence: envelope.sequence,
                timestamp_nanos: envelope.timestamp,
                message,
            },
            consumed: total,
        })
    }
}
