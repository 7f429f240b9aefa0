//! Property-based tests using proptest
//!
//! Framing invariants over randomly generated payloads: round trips, checksum coverage,
//! and chunk-size independence of incremental decoding.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use bytes::BytesMut;
use proptest::prelude::*;
use rpc_transport::config::MAX_PAYLOAD_SIZE;
use rpc_transport::core::codec::{Decoded, PacketCodec};
use rpc_transport::core::packet::{Packet, HEADER_SIZE};
use rpc_transport::core::reader::PacketReader;
use rpc_transport::protocol::rpc::Request;
use rpc_transport::resolver::NetworkAddress;
use rpc_transport::{BinaryCodec, JsonCodec, MessageType, MethodKey, ProtocolError};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

fn encode_requests(codec: &dyn PacketCodec, payloads: &[Vec<u8>]) -> Vec<u8> {
    let mut buf = BytesMut::new();
    for (i, payload) in payloads.iter().enumerate() {
        let request = Request::new(i as u64, MethodKey::new("svc", "Op"), payload.clone());
        codec.encode(&request, i as u32 + 1, &mut buf).unwrap();
    }
    buf.to_vec()
}

fn decode_all(codec: &dyn PacketCodec, mut src: &[u8]) -> Vec<Request> {
    let mut out = Vec::new();
    while !src.is_empty() {
        match codec.decode(src).unwrap() {
            Decoded::Frame { frame, consumed } => {
                out.push(*frame.message.downcast::<Request>().unwrap());
                src = &src[consumed..];
            }
            Decoded::Incomplete { needed } => panic!("complete buffer reported {needed} needed"),
        }
    }
    out
}

/// Feed `bytes` to a reader in `chunk`-sized writes and collect every request
fn read_chunked(codec: Arc<dyn PacketCodec>, bytes: Vec<u8>, chunk: usize, count: usize) -> Vec<Request> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    rt.block_on(async move {
        let (mut tx, rx) = tokio::io::duplex(chunk.max(1));
        let writer = tokio::spawn(async move {
            for piece in bytes.chunks(chunk.max(1)) {
                tx.write_all(piece).await.unwrap();
            }
        });
        let mut reader = PacketReader::with_capacity(rx, codec, 16);
        let mut out = Vec::new();
        for _ in 0..count {
            let frame = reader.read_frame().await.unwrap();
            out.push(*frame.message.downcast::<Request>().unwrap());
        }
        writer.await.unwrap();
        out
    })
}

proptest! {
    #[test]
    fn prop_packet_roundtrip(
        payload in prop::collection::vec(any::<u8>(), 0..10000),
        type_id in any::<u16>(),
        sequence in any::<u32>(),
        timestamp in any::<i64>(),
    ) {
        let packet = Packet::with_timestamp(MessageType(type_id), sequence, timestamp, payload.clone());
        let bytes = packet.to_bytes();
        prop_assert_eq!(bytes.len(), HEADER_SIZE + payload.len());

        let (decoded, consumed) = Packet::decode(&bytes, MAX_PAYLOAD_SIZE).unwrap().unwrap();
        prop_assert_eq!(consumed, bytes.len());
        prop_assert_eq!(&decoded.payload[..], &payload[..]);
        prop_assert_eq!(decoded.header.message_type, MessageType(type_id));
        prop_assert_eq!(decoded.header.sequence, sequence);
        prop_assert_eq!(decoded.header.timestamp_nanos, timestamp);
    }
}

proptest! {
    #[test]
    fn prop_any_payload_bit_flip_is_detected(
        payload in prop::collection::vec(any::<u8>(), 1..2048),
        index in any::<prop::sample::Index>(),
        bit in 0u8..8,
    ) {
        let mut bytes = Packet::new(MessageType(7), 1, payload.clone()).to_bytes();
        let at = HEADER_SIZE + index.index(payload.len());
        bytes[at] ^= 1 << bit;

        let result = Packet::decode(&bytes, MAX_PAYLOAD_SIZE);
        prop_assert!(
            matches!(result, Err(ProtocolError::ChecksumMismatch { .. })),
            "expected checksum mismatch"
        );
    }
}

proptest! {
    #[test]
    fn prop_truncated_packet_is_incomplete(
        payload in prop::collection::vec(any::<u8>(), 0..512),
        cut in any::<prop::sample::Index>(),
    ) {
        let bytes = Packet::new(MessageType(1), 1, payload).to_bytes();
        let len = cut.index(bytes.len());
        prop_assert!(Packet::decode(&bytes[..len], MAX_PAYLOAD_SIZE).unwrap().is_none());
        let needed = Packet::needed(&bytes[..len], MAX_PAYLOAD_SIZE).unwrap();
        prop_assert!(needed > len);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_chunking_does_not_change_frames(
        payloads in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..300), 1..6),
        chunk in 1usize..64,
    ) {
        let codec: Arc<dyn PacketCodec> = Arc::new(BinaryCodec::default());
        let bytes = encode_requests(codec.as_ref(), &payloads);

        let whole = decode_all(codec.as_ref(), &bytes);
        let chunked = read_chunked(codec, bytes, chunk, payloads.len());
        prop_assert_eq!(whole, chunked);
    }

    #[test]
    fn prop_json_chunking_does_not_change_frames(
        payloads in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..100), 1..4),
        chunk in 1usize..32,
    ) {
        let codec: Arc<dyn PacketCodec> = Arc::new(JsonCodec::default());
        let bytes = encode_requests(codec.as_ref(), &payloads);

        let whole = decode_all(codec.as_ref(), &bytes);
        let chunked = read_chunked(codec, bytes, chunk, payloads.len());
        prop_assert_eq!(whole, chunked);
    }
}

proptest! {
    #[test]
    fn prop_method_key_is_deterministic(component in "[a-z]{1,12}", method in "[A-Za-z]{1,16}") {
        let a = MethodKey::new(&component, &method);
        let b = MethodKey::new(&component, &method);
        prop_assert_eq!(a, b);
        prop_assert_eq!(MethodKey::from_hex(&a.to_hex()), Some(a));
    }

    #[test]
    fn prop_address_splits_on_first_separator(
        network in "[a-z0-9]{0,8}",
        address in "[a-z0-9:/.]{0,24}",
    ) {
        let joined = format!("{network}://{address}");
        let (n, a) = NetworkAddress::split(&joined).unwrap();
        prop_assert_eq!(n, network.as_str());
        prop_assert_eq!(a, address.as_str());
    }
}
