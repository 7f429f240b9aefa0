use crate::config::MAX_PAYLOAD_SIZE;
use crate::core::message::{Message, MessageRegistry, MessageType};
use crate::core::packet::Packet;
use crate::core::serialization::SerializationFormat;
use crate::error::{ProtocolError, Result};
use bytes::{Buf, BytesMut};
use std::fmt;
use std::sync::Arc;
use tokio_util::codec::{Decoder, Encoder};

/// One decoded unit: the message plus the envelope fields that travelled with it
#[derive(Debug)]
pub struct Frame {
    pub message_type: MessageType,
    pub sequence: u32,
    pub timestamp_nanos: i64,
    pub message: Box<dyn Message>,
}

/// Outcome of an incremental decode attempt
#[derive(Debug)]
pub enum Decoded {
    /// `needed` is the total byte count required from the start of the input
    Incomplete { needed: usize },
    Frame { frame: Frame, consumed: usize },
}

/// Frames messages on a byte stream.
///
/// Codecs hold no per-connection state and are shared between connections behind an `Arc`.
/// Sequence numbers are supplied by the writer that owns the stream.
pub trait PacketCodec: fmt::Debug + Send + Sync {
    fn format(&self) -> SerializationFormat;

    /// Largest message body accepted, framing not counted
    fn max_payload(&self) -> usize;

    fn encode(&self, message: &dyn Message, sequence: u32, dst: &mut BytesMut) -> Result<()>;

    fn decode(&self, src: &[u8]) -> Result<Decoded>;
}

/// Fixed-header binary codec
#[derive(Debug, Clone)]
pub struct BinaryCodec {
    registry: Arc<MessageRegistry>,
    max_payload: usize,
}

impl BinaryCodec {
    pub fn new(registry: Arc<MessageRegistry>, max_payload: usize) -> Self {
        Self {
            registry,
            max_payload,
        }
    }
}

impl Default for BinaryCodec {
    fn default() -> Self {
        Self::new(Arc::new(MessageRegistry::with_defaults()), MAX_PAYLOAD_SIZE)
    }
}

impl PacketCodec for BinaryCodec {
    fn format(&self) -> SerializationFormat {
        SerializationFormat::Binary
    }

    fn max_payload(&self) -> usize {
        self.max_payload
    }

    fn encode(&self, message: &dyn Message, sequence: u32, dst: &mut BytesMut) -> Result<()> {
        let payload = message.marshal()?;
        if payload.len() > self.max_payload {
            return Err(ProtocolError::OversizedPacket {
                size: payload.len(),
                max: self.max_payload,
            });
        }

        Packet::new(message.message_type(), sequence, payload).encode(dst);
        Ok(())
    }

    fn decode(&self, src: &[u8]) -> Result<Decoded> {
        let (packet, consumed) = match Packet::decode(src, self.max_payload)? {
            Some(decoded) => decoded,
            None => {
                return Ok(Decoded::Incomplete {
                    needed: Packet::needed(src, self.max_payload)?,
                })
            }
        };

        let header = packet.header;
        let mut message = self.registry.create(header.message_type);
        message.unmarshal(&packet.payload)?;

        Ok(Decoded::Frame {
            frame: Frame {
                message_type: header.message_type,
                sequence: header.sequence,
                timestamp_nanos: header.timestamp_nanos,
                message,
            },
            consumed,
        })
    }
}

/// `tokio_util` adapter so any [`PacketCodec`] works with `Framed`.
///
/// Holds the outbound sequence counter of the stream it is attached to.
#[derive(Debug, Clone)]
pub struct FramedCodec {
    codec: Arc<dyn PacketCodec>,
    next_sequence: u32,
}

impl FramedCodec {
    pub fn new(codec: Arc<dyn PacketCodec>) -> Self {
        Self {
            codec,
            next_sequence: 1,
        }
    }
}

impl Decoder for FramedCodec {
    type Item = Frame;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        match self.codec.decode(src)? {
            Decoded::Incomplete { needed } => {
                src.reserve(needed.saturating_sub(src.len()));
                Ok(None)
            }
            Decoded::Frame { frame, consumed } => {
                src.advance(consumed);
                Ok(Some(frame))
            }
        }
    }
}

impl Encoder<Box<dyn Message>> for FramedCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Box<dyn Message>, dst: &mut BytesMut) -> Result<()> {
        self.codec.encode(item.as_ref(), self.next_sequence, dst)?;
        self.next_sequence = self.next_sequence.wrapping_add(1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::core::message::GenericMessage;
    use crate::core::packet::HEADER_SIZE;
    use crate::protocol::method::MethodKey;
    use crate::protocol::rpc::Request;

    fn request(payload: &[u8]) -> Request {
        Request::new(3, MethodKey::new("honor", "Query"), payload.to_vec())
    }

    #[test]
    fn test_binary_encode_decode() {
        let codec = BinaryCodec::default();
        let mut buf = BytesMut::new();
        codec.encode(&request(b"abc"), 77, &mut buf).unwrap();

        match codec.decode(&buf).unwrap() {
            Decoded::Frame { frame, consumed } => {
                assert_eq!(consumed, buf.len());
                assert_eq!(frame.sequence, 77);
                assert_eq!(frame.message_type, MessageType::REQUEST);
                let req = frame.message.downcast_ref::<Request>().unwrap();
                assert_eq!(&req.payload[..], b"abc");
            }
            other => panic!("expected frame, got {other:?}"),
        }
    }

    #[test]
    fn test_binary_incomplete_needed() {
        let codec = BinaryCodec::default();
        let mut buf = BytesMut::new();
        codec.encode(&request(b"abcdef"), 1, &mut buf).unwrap();

        assert!(matches!(
            codec.decode(&buf[..3]).unwrap(),
            Decoded::Incomplete { needed: HEADER_SIZE }
        ));
        let total = buf.len();
        assert!(matches!(
            codec.decode(&buf[..HEADER_SIZE]).unwrap(),
            Decoded::Incomplete { needed } if needed == total
        ));
    }

    #[test]
    fn test_binary_rejects_oversized_encode() {
        let codec = BinaryCodec::new(Arc::new(MessageRegistry::with_defaults()), 8);
        let mut buf = BytesMut::new();
        let err = codec.encode(&request(&[0u8; 64]), 1, &mut buf).unwrap_err();
        assert!(matches!(err, ProtocolError::OversizedPacket { max: 8, .. }));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_unknown_type_decodes_generic() {
        let codec = BinaryCodec::default();
        let mut buf = BytesMut::new();
        Packet::new(MessageType(900), 4, vec![9, 9]).encode(&mut buf);

        match codec.decode(&buf).unwrap() {
            Decoded::Frame { frame, .. } => {
                let generic = frame.message.downcast_ref::<GenericMessage>().unwrap();
                assert_eq!(generic.raw, vec![9, 9]);
            }
            other => panic!("expected frame, got {other:?}"),
        }
    }

    #[test]
    fn test_framed_codec_sequences() {
        let mut framed = FramedCodec::new(Arc::new(BinaryCodec::default()));
        let mut buf = BytesMut::new();
        let first: Box<dyn Message> = Box::new(request(b"1"));
        let second: Box<dyn Message> = Box::new(request(b"2"));
        framed.encode(first, &mut buf).unwrap();
        framed.encode(second, &mut buf).unwrap();

        let first = Decoder::decode(&mut framed, &mut buf).unwrap().unwrap();
        let second = Decoder::decode(&mut framed, &mut buf).unwrap().unwrap();
        assert_eq!(first.sequence + 1, second.sequence);
        assert!(buf.is_empty());
        assert!(Decoder::decode(&mut framed, &mut buf).unwrap().is_none());
    }
}
