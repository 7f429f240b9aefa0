//! Integration tests for the two wire formats
//!
//! Application messages registered through `TypedMessage` travel over either codec, and
//! the JSON envelope stays readable on the wire.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use bytes::BytesMut;
use rpc_transport::core::codec::{Decoded, PacketCodec};
use rpc_transport::core::message::GenericMessage;
use rpc_transport::config::MAX_PAYLOAD_SIZE;
use rpc_transport::{MessageRegistry, MessageType, SerializationFormat, TypedMessage};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
struct HonorUpdate {
    character: String,
    delta: i32,
    tags: Vec<String>,
}

impl TypedMessage for HonorUpdate {
    const MESSAGE_TYPE: MessageType = MessageType(100);
}

fn codec(format: SerializationFormat) -> Arc<dyn PacketCodec> {
    let mut registry = MessageRegistry::with_defaults();
    registry.register::<HonorUpdate>();
    format.codec(Arc::new(registry), MAX_PAYLOAD_SIZE)
}

fn sample() -> HonorUpdate {
    HonorUpdate {
        character: "Thrall".into(),
        delta: -15,
        tags: vec!["pvp".into(), "arena".into()],
    }
}

fn roundtrip(format: SerializationFormat) -> (HonorUpdate, u32) {
    let codec = codec(format);
    let mut buf = BytesMut::new();
    codec.encode(&sample(), 41, &mut buf).unwrap();

    match codec.decode(&buf).unwrap() {
        Decoded::Frame { frame, consumed } => {
            assert_eq!(consumed, buf.len());
            assert_eq!(frame.message_type, MessageType(100));
            let sequence = frame.sequence;
            (*frame.message.downcast::<HonorUpdate>().unwrap(), sequence)
        }
        Decoded::Incomplete { needed } => panic!("incomplete, needs {needed}"),
    }
}

#[test]
fn test_typed_message_over_binary() {
    let (decoded, sequence) = roundtrip(SerializationFormat::Binary);
    assert_eq!(decoded, sample());
    assert_eq!(sequence, 41);
}

#[test]
fn test_typed_message_over_json() {
    let (decoded, sequence) = roundtrip(SerializationFormat::Json);
    assert_eq!(decoded, sample());
    assert_eq!(sequence, 41);
}

#[test]
fn test_json_envelope_is_readable() {
    let codec = codec(SerializationFormat::Json);
    let mut buf = BytesMut::new();
    codec.encode(&sample(), 7, &mut buf).unwrap();

    let length = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    assert_eq!(length, buf.len() - 4);

    let envelope: serde_json::Value = serde_json::from_slice(&buf[4..]).unwrap();
    assert_eq!(envelope["type"], 100);
    assert_eq!(envelope["sequence"], 7);
    assert!(envelope["timestamp"].as_i64().unwrap() > 0);
    assert_eq!(envelope["data"]["character"], "Thrall");
}

#[test]
fn test_unregistered_type_falls_back_to_generic() {
    let sender = codec(SerializationFormat::Binary);
    let receiver = SerializationFormat::Binary.codec(
        Arc::new(MessageRegistry::with_defaults()),
        MAX_PAYLOAD_SIZE,
    );

    let mut buf = BytesMut::new();
    sender.encode(&sample(), 1, &mut buf).unwrap();
    let Decoded::Frame { frame, .. } = receiver.decode(&buf).unwrap() else {
        panic!("expected a frame");
    };
    let generic = frame.message.downcast::<GenericMessage>().unwrap();
    assert_eq!(generic.message_type, MessageType(100));
    assert!(!generic.raw.is_empty());
}

#[test]
fn test_format_names_parse() {
    assert_eq!(
        "json".parse::<SerializationFormat>().unwrap(),
        SerializationFormat::Json
    );
    assert_eq!(
        "binary".parse::<SerializationFormat>().unwrap(),
        SerializationFormat::Binary
    );
    assert!("msgpack".parse::<SerializationFormat>().is_err());
    assert_eq!(SerializationFormat::default(), SerializationFormat::Binary);
    assert_eq!(codec(SerializationFormat::Json).format(), SerializationFormat::Json);
}
