use std::{hint::black_box, sync::Arc};

use bytes::Bytes;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use zumic_mpx::{
    registry::Registry, BrokerLink, ConnectionEvent, Handlers, Multiplexer, PubSubCommand,
};

/// Связь, отбрасывающая команды.
struct NullLink;

impl BrokerLink for NullLink {
    fn send(
        &self,
        _command: PubSubCommand,
    ) {
    }
}

fn connected() -> Multiplexer {
    let mux = Multiplexer::new(Arc::new(NullLink));
    mux.handle_event(ConnectionEvent::Connected);
    mux
}

fn bench_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch_message");
    for listeners in [1usize, 10, 100] {
        let mux = connected();
        let subs: Vec<_> = (0..listeners)
            .map(|_| {
                let sub = mux
                    .create_channel_subscription(Handlers::new(|_, payload| {
                        black_box(payload.len());
                    }))
                    .unwrap();
                sub.add("chan").unwrap();
                sub
            })
            .collect();
        let payload = Bytes::from_static(b"payload");

        group.bench_with_input(BenchmarkId::from_parameter(listeners), &listeners, |b, _| {
            b.iter(|| {
                mux.handle_event(ConnectionEvent::Message {
                    channel: "chan".to_string(),
                    payload: payload.clone(),
                })
            })
        });
        drop(subs);
    }
    group.finish();
}

fn bench_add_remove(c: &mut Criterion) {
    let mux = connected();
    let sub = mux
        .create_channel_subscription(Handlers::new(|_, _| {}))
        .unwrap();
    // Второй слушатель держит ключ живым: add/remove не шлют команд.
    let keeper = mux
        .create_channel_subscription(Handlers::new(|_, _| {}))
        .unwrap();
    keeper.add("chan").unwrap();

    c.bench_function("channel_add_remove", |b| {
        b.iter(|| {
            sub.add(black_box("chan")).unwrap();
            sub.remove(black_box("chan")).unwrap();
        })
    });
}

fn bench_registry(c: &mut Criterion) {
    c.bench_function("registry_prepend_remove_1000", |b| {
        b.iter(|| {
            let mut registry = Registry::new();
            let ids: Vec<_> = (0..1000u32).map(|i| registry.prepend(i)).collect();
            for id in ids.into_iter().step_by(2) {
                black_box(registry.remove(id));
            }
            black_box(registry.len())
        })
    });
}

criterion_group!(benches, bench_dispatch, bench_add_remove, bench_registry);
criterion_main!(benches);
