//! Benchmarks for peerhub dispatch paths

use std::sync::Arc;

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tokio::runtime::{Builder, Runtime};
use tokio::sync::{mpsc, oneshot};

use peerhub_broadcast::Broadcaster;
use peerhub_core::{PeerError, PeerId, Server};
use peerhub_handle::{Handle, HandleReceivers};
use peerhub_server::{EventDrivenServer, FifoServer};

fn runtime() -> Runtime {
    Builder::new_current_thread().enable_all().build().unwrap()
}

/// Accept and acknowledge every write until the handle is dropped
fn sink(receivers: HandleReceivers) {
    let HandleReceivers { mut rx, .. } = receivers;
    tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            payload.complete(Ok(()));
        }
    });
}

fn bench_event_driven_append(c: &mut Criterion) {
    let rt = runtime();
    let server = EventDrivenServer::new();
    server.on_message(|msg, _server: Arc<EventDrivenServer>| async move {
        black_box(msg.data().len());
        Ok::<(), PeerError>(())
    });
    let data = Bytes::from_static(b"position update");

    c.bench_function("event_driven_append", |b| {
        b.iter(|| rt.block_on(server.append_message(PeerId::new(0), data.clone())))
    });
}

fn bench_fifo_round_trip(c: &mut Criterion) {
    let rt = runtime();
    let server = FifoServer::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    server.on_message(move |msg, _server: Arc<FifoServer>| {
        let _ = tx.send(msg.peer_id());
        std::future::ready(Ok::<(), PeerError>(()))
    });
    {
        let server = server.clone();
        rt.spawn(async move { server.start().await });
    }
    let data = Bytes::from_static(b"input frame");

    c.bench_function("fifo_round_trip", |b| {
        b.iter(|| {
            rt.block_on(async {
                server.append_message(PeerId::new(1), data.clone()).await;
                black_box(rx.recv().await)
            })
        })
    });
    server.stop();
}

fn bench_handle_write(c: &mut Criterion) {
    let rt = runtime();
    let (handle, receivers) = Handle::channel(64);
    rt.block_on(async { sink(receivers) });

    c.bench_function("handle_write_then", |b| {
        b.iter(|| {
            rt.block_on(async {
                let (tx, rx) = oneshot::channel();
                handle
                    .write_then(Bytes::from_static(b"payload"), move |result| {
                        let _ = tx.send(result.is_ok());
                    })
                    .await;
                black_box(rx.await.unwrap_or(false))
            })
        })
    });
}

fn bench_broadcast_fan_out(c: &mut Criterion) {
    let rt = runtime();
    let broadcaster = Broadcaster::new();
    rt.block_on(async {
        for _ in 0..8 {
            let (handle, receivers) = Handle::channel(64);
            sink(receivers);
            let (tx, rx) = oneshot::channel();
            broadcaster.add_target_then(handle, move |id| {
                let _ = tx.send(id);
            });
            let _ = rx.await;
        }
    });

    c.bench_function("broadcast_fan_out_8", |b| {
        b.iter(|| {
            rt.block_on(async {
                let (tx, mut rx) = mpsc::unbounded_channel();
                broadcaster.write_then(Bytes::from_static(b"frame"), move |_, result| {
                    let _ = tx.send(result.is_ok());
                });
                for _ in 0..8 {
                    black_box(rx.recv().await);
                }
            })
        })
    });
}

criterion_group!(
    benches,
    bench_event_driven_append,
    bench_fifo_round_trip,
    bench_handle_write,
    bench_broadcast_fan_out
);
criterion_main!(benches);
