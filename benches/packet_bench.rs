use bytes::BytesMut;
use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use rpc_transport::core::codec::PacketCodec;
use rpc_transport::protocol::rpc::Request;
use rpc_transport::{BinaryCodec, JsonCodec, MethodKey};

#[allow(clippy::unwrap_used)]
fn bench_codec(c: &mut Criterion, name: &str, codec: &dyn PacketCodec) {
    let mut group = c.benchmark_group(name);
    let payload_sizes = [64usize, 512, 4096, 65536, 1024 * 1024];
    let method = MethodKey::new("bench", "Call");

    for &size in &payload_sizes {
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_function(format!("encode_{size}b"), |b| {
            b.iter_batched(
                || Request::new(1, method, vec![0u8; size]),
                |request| {
                    let mut buf = BytesMut::with_capacity(size + 64);
                    codec.encode(&request, 1, &mut buf).unwrap();
                },
                BatchSize::SmallInput,
            )
        });

        let mut encoded = BytesMut::new();
        codec
            .encode(&Request::new(1, method, vec![0u8; size]), 1, &mut encoded)
            .unwrap();
        group.bench_function(format!("decode_{size}b"), |b| {
            b.iter(|| {
                let decoded = codec.decode(&encoded);
                assert!(decoded.is_ok());
            })
        });
    }

    group.finish();
}

fn bench_binary(c: &mut Criterion) {
    bench_codec(c, "binary_codec", &BinaryCodec::default());
}

fn bench_json(c: &mut Criterion) {
    bench_codec(c, "json_codec", &JsonCodec::default());
}

fn bench_method_key(c: &mut Criterion) {
    c.bench_function("method_key", |b| {
        b.iter(|| MethodKey::new("inventory", "GetCharacterItems"))
    });
}

criterion_group!(benches, bench_binary, bench_json, bench_method_key);
criterion_main!(benches);
