//! Broadcast room: every registered peer hears every message

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use peerhub_broadcast::Broadcaster;
use peerhub_core::{PeerId, TargetId};
use peerhub_handle::Handle;
use peerhub_node::{trim_line, PeerNode};
use peerhub_server::{HookContext, PeerRegistry, RegistryEvent};

#[derive(Clone)]
pub struct Room {
    broadcaster: Broadcaster,
    members: Arc<Mutex<HashMap<PeerId, TargetId>>>,
    /// Local line sinks: stdout echo and the journal file
    sinks: Vec<(&'static str, Handle)>,
}

impl Room {
    pub fn new(broadcaster: Broadcaster) -> Self {
        Room {
            broadcaster,
            members: Arc::default(),
            sinks: Vec::new(),
        }
    }

    pub fn with_sink(mut self, name: &'static str, handle: Handle) -> Self {
        self.sinks.push((name, handle));
        self
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    pub fn member_count(&self) -> usize {
        self.members.lock().len()
    }

    /// Make every peer added to `registry` a member until it is removed.
    ///
    /// A peer removed before its target id is known leaves a dead target
    /// behind; the broadcaster evicts it on the next failed write.
    pub fn attach(&self, registry: &PeerRegistry) {
        let room = self.clone();
        registry.on(RegistryEvent::AfterAdd, move |ctx: &HookContext<'_>| {
            let Some(peer) = ctx.peer else {
                return;
            };
            let peer_id = ctx.peer_id;
            let members = room.members.clone();
            let handle = PeerNode::with_default_buffer(peer.clone()).spawn();
            room.broadcaster.add_target_then(handle, move |target_id| {
                members.lock().insert(peer_id, target_id);
                tracing::info!(peer_id = %peer_id, target_id = %target_id, "joined room");
            });
        });

        let room = self.clone();
        registry.on(RegistryEvent::AfterRemove, move |ctx: &HookContext<'_>| {
            let target_id = room.members.lock().remove(&ctx.peer_id);
            if let Some(target_id) = target_id {
                room.broadcaster.remove_target(target_id);
                tracing::info!(peer_id = %ctx.peer_id, "left room");
            }
        });
    }

    /// Send `data` to every member and every local sink
    pub async fn publish(&self, data: Bytes) {
        self.broadcaster.write(data.clone());
        if self.sinks.is_empty() {
            return;
        }
        let line = trim_line(data.to_vec());
        for (name, sink) in &self.sinks {
            if let Err(e) = sink.write(line.clone()).await {
                tracing::warn!(sink = *name, error = %e, "room sink write failed");
            }
        }
    }

    /// [`publish`](Self::publish) from synchronous callbacks
    pub fn announce(&self, data: Bytes) {
        let room = self.clone();
        tokio::spawn(async move { room.publish(data).await });
    }

    /// Stop every target, then flush and stop the local sinks
    pub async fn close(&self) {
        self.broadcaster.stop_all();
        for (name, sink) in &self.sinks {
            let (tx, rx) = oneshot::channel();
            sink.stop_then(move |result| {
                let _ = tx.send(result);
            })
            .await;
            if let Ok(Err(e)) = rx.await {
                tracing::warn!(sink = *name, error = %e, "room sink did not stop cleanly");
            }
        }
    }
}
