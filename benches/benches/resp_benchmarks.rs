use std::hint::black_box;

use bytes::BytesMut;
use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use zumic_mpx::{
    connection::{push::into_event, resp},
    PubSubCommand,
};

fn pmessage_frame(payload_len: usize) -> Vec<u8> {
    let payload = vec![b'x'; payload_len];
    let mut buf = BytesMut::new();
    resp::encode_command(
        &[
            b"pmessage".as_slice(),
            b"req:*".as_slice(),
            b"req:42".as_slice(),
            payload.as_slice(),
        ],
        &mut buf,
    );
    buf.to_vec()
}

fn bench_decode_pmessage(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_pmessage");
    for size in [16usize, 1024, 64 * 1024] {
        let wire = pmessage_frame(size);
        group.throughput(Throughput::Bytes(wire.len() as u64));
        group.bench_function(format!("{size}B"), |b| {
            b.iter(|| {
                let mut buf = BytesMut::from(wire.as_slice());
                let frame = resp::decode(&mut buf).unwrap().unwrap();
                black_box(into_event(frame).unwrap())
            })
        });
    }
    group.finish();
}

fn bench_encode_subscribe(c: &mut Criterion) {
    let command = PubSubCommand::Subscribe((0..100).map(|i| format!("channel:{i}")).collect());
    c.bench_function("encode_subscribe_100", |b| {
        b.iter(|| {
            let mut buf = BytesMut::with_capacity(4096);
            resp::encode_pubsub(black_box(&command), &mut buf);
            black_box(buf.len())
        })
    });
}

criterion_group!(benches, bench_decode_pmessage, bench_encode_subscribe);
criterion_main!(benches);
