//! End-to-end Integration Test Suite
//!
//! Scenarios that cross crate boundaries:
//! - Id allocation and message routing through a live server
//! - Lockstep batching against peers that deliver asynchronously
//! - Broadcast failure isolation with registry-owned and slow peers
//! - A TCP chat room: listener, FIFO server and broadcaster together

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use peerhub_broadcast::Broadcaster;
use peerhub_core::{PeerId, TargetId};
use peerhub_node::PeerNode;
use peerhub_server::{HookContext, PeerRegistry, RegistryEvent};

const POLL_INTERVAL: Duration = Duration::from_millis(2);

/// Poll `cond` until it holds or `limit` elapses. Returns the final verdict.
pub async fn wait_until(limit: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + limit;
    loop {
        if cond() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Keep `broadcaster` in sync with the peers of `registry`.
///
/// Each added peer becomes a target through a [`PeerNode`]; removing the peer
/// removes its target. A peer removed before its target id is known leaves
/// a dead target behind, which the broadcaster evicts on the next failed write.
pub fn join_broadcast(registry: &PeerRegistry, broadcaster: &Broadcaster) {
    let members: Arc<Mutex<HashMap<PeerId, TargetId>>> = Arc::default();

    {
        let broadcaster = broadcaster.clone();
        let members = members.clone();
        registry.on(RegistryEvent::AfterAdd, move |ctx: &HookContext<'_>| {
            let Some(peer) = ctx.peer else {
                return;
            };
            let peer_id = ctx.peer_id;
            let members = members.clone();
            let handle = PeerNode::with_default_buffer(peer.clone()).spawn();
            broadcaster.add_target_then(handle, move |target_id| {
                members.lock().insert(peer_id, target_id);
            });
        });
    }

    let broadcaster = broadcaster.clone();
    registry.on(RegistryEvent::AfterRemove, move |ctx: &HookContext<'_>| {
        let target_id = members.lock().remove(&ctx.peer_id);
        if let Some(target_id) = target_id {
            broadcaster.remove_target(target_id);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    use bytes::Bytes;
    use proptest::prelude::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio::sync::{mpsc, oneshot};

    use peerhub_core::{PeerError, PeerMessage, PeerResult, Server, ServerRef};
    use peerhub_handle::Handle;
    use peerhub_server::{EventDrivenServer, FifoServer, LockstepConfig, LockstepServer};
    use peerhub_transport::{BasicPeer, TcpPeerListener};

    use crate::ChannelPeer;

    fn ok() -> std::future::Ready<PeerResult<()>> {
        std::future::ready(Ok(()))
    }

    #[tokio::test]
    async fn test_event_driven_ids_and_routing() {
        let server = EventDrivenServer::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        server.on_message(move |msg, _server: Arc<EventDrivenServer>| {
            let _ = tx.send((msg.peer_id(), msg.into_data()));
            ok()
        });
        let server_ref: ServerRef = server.clone();

        let mut remotes = Vec::new();
        for expected in 0..3 {
            let (peer, remote) = ChannelPeer::pair(&server_ref);
            assert_eq!(server.add_peer(peer), PeerId::new(expected));
            remotes.push(remote);
        }

        assert!(remotes[1].send("from one"));
        assert_eq!(rx.recv().await, Some((PeerId::new(1), Bytes::from("from one"))));

        server.remove_peer(PeerId::new(1)).await.unwrap();
        assert_eq!(remotes[1].recv().await, None);

        let (peer, _remote) = ChannelPeer::pair(&server_ref);
        assert_eq!(server.add_peer(peer), PeerId::new(1));
        let missing = server.remove_peer(PeerId::new(7)).await;
        assert!(matches!(missing, Err(PeerError::NotFound(id)) if id == PeerId::new(7)));

        server.stop();
        assert!(server.start().await.is_empty());
        assert_eq!(server.peer_count(), 0);
        assert_eq!(remotes[0].recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lockstep_batches_by_arrival_step() {
        let config = LockstepConfig {
            step_length_ms: 50,
            min_step_length_ms: 10,
            max_step_length_ms: 100,
        };
        let server = LockstepServer::with_config(&config);
        let (tx, mut rx) = mpsc::unbounded_channel();
        server.on_step(move |step, batch: Arc<[PeerMessage]>, _server: Arc<LockstepServer>| {
            let seen: Vec<(PeerId, Bytes)> =
                batch.iter().map(|msg| (msg.peer_id(), msg.data().clone())).collect();
            let _ = tx.send((step, seen));
            ok()
        });
        let server_ref: ServerRef = server.clone();

        let (first, first_remote) = ChannelPeer::pair(&server_ref);
        let (second, second_remote) = ChannelPeer::pair(&server_ref);
        server.add_peer(first);
        server.add_peer(second);
        let runner = {
            let server = server.clone();
            tokio::spawn(async move { server.start().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        first_remote.send("a");
        tokio::time::sleep(Duration::from_millis(20)).await;
        second_remote.send("b");
        tokio::time::sleep(Duration::from_millis(30)).await;
        first_remote.send("c");

        let (step, batch) = rx.recv().await.unwrap();
        assert_eq!(step, 0);
        assert_eq!(
            batch,
            vec![(PeerId::new(0), Bytes::from("a")), (PeerId::new(1), Bytes::from("b"))]
        );
        let (step, batch) = rx.recv().await.unwrap();
        assert_eq!(step, 1);
        assert_eq!(batch, vec![(PeerId::new(0), Bytes::from("c"))]);

        server.stop();
        assert!(runner.await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_broadcast_isolates_stuck_target() {
        let server = EventDrivenServer::new();
        let server_ref: ServerRef = server.clone();
        let (peer, mut remote) = ChannelPeer::pair(&server_ref);
        let id = server.add_peer(peer);
        let healthy = PeerNode::with_default_buffer(server.get_peer(id).unwrap()).spawn();
        // Capacity 1, already full, nobody reading
        let (stuck, _stuck_receivers) = Handle::channel(1);
        stuck.write(Bytes::from_static(b"backlog")).await.unwrap();

        let broadcaster = Broadcaster::new().timeout_ms(50);
        let mut target_ids = Vec::new();
        for handle in [healthy, stuck] {
            let (done_tx, done_rx) = oneshot::channel();
            broadcaster.add_target_then(handle, move |target_id| {
                let _ = done_tx.send(target_id);
            });
            target_ids.push(done_rx.await.unwrap());
        }
        let (healthy_id, stuck_id) = (target_ids[0], target_ids[1]);

        let (tx, mut rx) = mpsc::unbounded_channel();
        broadcaster.write_then("x1", move |target_id, result| {
            let _ = tx.send((target_id, result.map_err(|e| matches!(e, PeerError::Timeout))));
        });

        // The healthy target is served without waiting on the stuck one
        assert_eq!(rx.recv().await, Some((healthy_id, Ok(()))));
        assert_eq!(remote.recv().await, Some(Bytes::from("x1")));
        assert_eq!(rx.recv().await, Some((stuck_id, Err(true))));
        assert!(wait_until(Duration::from_secs(1), || broadcaster.target_count() == 1).await);

        broadcaster.write("x2");
        assert_eq!(remote.recv().await, Some(Bytes::from("x2")));
        assert_eq!(broadcaster.target_ids(), vec![healthy_id]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_broadcast_evicts_slow_peer() {
        let broadcaster = Broadcaster::new().timeout_ms(100);
        let mut target_ids = Vec::new();
        let mut written = Vec::new();
        for delay_ms in [0u64, 0, 500] {
            let (tx, rx) = mpsc::unbounded_channel();
            let peer = BasicPeer::new().on_write(move |data: Bytes| {
                let tx = tx.clone();
                async move {
                    if delay_ms > 0 {
                        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    }
                    let _ = tx.send(data);
                    Ok::<(), PeerError>(())
                }
            });
            let handle = PeerNode::with_default_buffer(Arc::new(peer)).spawn();
            let (done_tx, done_rx) = oneshot::channel();
            broadcaster.add_target_then(handle, move |target_id| {
                let _ = done_tx.send(target_id);
            });
            target_ids.push(done_rx.await.unwrap());
            written.push(rx);
        }
        let slow_id = target_ids[2];

        let (tx, mut outcomes) = mpsc::unbounded_channel();
        let started = Instant::now();
        broadcaster.write_then("msg", move |target_id, result| {
            let timed_out = matches!(result, Err(PeerError::Timeout));
            let _ = tx.send((target_id, result.is_ok(), timed_out, started.elapsed()));
        });

        for rx in &mut written[..2] {
            let data = tokio::time::timeout(Duration::from_millis(100), rx.recv())
                .await
                .unwrap();
            assert_eq!(data, Some(Bytes::from("msg")));
        }

        let mut slow_outcome = None;
        for _ in 0..3 {
            let (target_id, ok, timed_out, elapsed) = outcomes.recv().await.unwrap();
            if target_id == slow_id {
                slow_outcome = Some((ok, timed_out, elapsed));
            } else {
                assert!(ok);
            }
        }
        let (ok, timed_out, elapsed) = slow_outcome.unwrap();
        assert!(!ok && timed_out);
        assert!(elapsed >= Duration::from_millis(100) && elapsed < Duration::from_millis(500));
        assert_eq!(broadcaster.target_ids(), vec![target_ids[0], target_ids[1]]);

        broadcaster.write("next");
        for rx in &mut written[..2] {
            assert_eq!(rx.recv().await, Some(Bytes::from("next")));
        }
        // The slow peer finishes the write it had already accepted, and nothing more
        assert_eq!(written[2].recv().await, Some(Bytes::from("msg")));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(written[2].try_recv().is_err());
    }

    #[tokio::test]
    async fn test_tcp_chat_room_over_fifo() {
        let server = FifoServer::new();
        let broadcaster = Broadcaster::new();
        join_broadcast(server.registry(), &broadcaster);
        {
            let broadcaster = broadcaster.clone();
            server.on_message(move |msg, _server: Arc<FifoServer>| {
                broadcaster.write(msg.into_data());
                ok()
            });
        }
        let runner = {
            let server = server.clone();
            tokio::spawn(async move { server.start().await })
        };

        let listener = TcpPeerListener::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let addr = listener.local_addr();
        let accept = listener.spawn(server.clone());

        let mut alice = TcpStream::connect(addr).await.unwrap();
        let mut bob = TcpStream::connect(addr).await.unwrap();
        assert!(wait_until(Duration::from_secs(5), || broadcaster.target_count() == 2).await);

        alice.write_all(b"hi all").await.unwrap();
        for client in [&mut alice, &mut bob] {
            let mut buf = [0u8; 6];
            client.read_exact(&mut buf).await.unwrap();
            assert_eq!(&buf, b"hi all");
        }

        drop(bob);
        let settled = wait_until(Duration::from_secs(5), || {
            server.peer_count() == 1 && broadcaster.target_count() == 1
        });
        assert!(settled.await);

        accept.stop().await.unwrap();
        server.stop();
        assert!(runner.await.unwrap().is_empty());

        let mut rest = Vec::new();
        alice.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn test_fifo_keeps_each_peers_order(script in prop::collection::vec(0usize..3, 1..40)) {
            let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
            rt.block_on(async move {
                let server = FifoServer::new();
                let (tx, mut rx) = mpsc::unbounded_channel();
                server.on_message(move |msg, _server: Arc<FifoServer>| {
                    let _ = tx.send((msg.peer_id(), msg.into_data()));
                    ok()
                });
                let server_ref: ServerRef = server.clone();
                let remotes: Vec<_> = (0..3)
                    .map(|_| {
                        let (peer, remote) = ChannelPeer::pair(&server_ref);
                        server.add_peer(peer);
                        remote
                    })
                    .collect();
                let runner = {
                    let server = server.clone();
                    tokio::spawn(async move { server.start().await })
                };

                for (seq, who) in script.iter().enumerate() {
                    assert!(remotes[*who].send(seq.to_string()));
                }

                let mut seen: HashMap<PeerId, Vec<usize>> = HashMap::new();
                for _ in 0..script.len() {
                    let (peer_id, data) = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                        .await
                        .unwrap()
                        .unwrap();
                    let seq = std::str::from_utf8(&data).unwrap().parse().unwrap();
                    seen.entry(peer_id).or_default().push(seq);
                }

                for who in 0..3usize {
                    let expected: Vec<usize> = script
                        .iter()
                        .enumerate()
                        .filter(|(_, w)| **w == who)
                        .map(|(seq, _)| seq)
                        .collect();
                    let got = seen.remove(&PeerId::new(who as u32)).unwrap_or_default();
                    assert_eq!(got, expected);
                }

                server.stop();
                runner.await.unwrap();
            });
        }
    }
}
