//! Event-driven dispatch
//!
//! `append_message` runs the before-process hook and the message handler on
//! the calling peer's own task. Peers are handled concurrently with each
//! other; a slow handler only holds back the peer that produced the message.

use std::future::Future;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::RwLock;

use peerhub_core::{PeerError, PeerId, PeerMessage, PeerRef, PeerResult, Server};

use crate::{HookContext, PeerRegistry, RegistryEvent};

/// Runs before the handler and may rewrite the message
pub type MessageHook = Arc<dyn Fn(&mut PeerMessage, &EventDrivenServer) + Send + Sync>;

pub type MessageHandler =
    Arc<dyn Fn(PeerMessage, Arc<EventDrivenServer>) -> BoxFuture<'static, PeerResult<()>>
        + Send
        + Sync>;

/// Immediate per-peer dispatch
pub struct EventDrivenServer {
    registry: PeerRegistry,
    before_process: RwLock<Option<MessageHook>>,
    handler: RwLock<Option<MessageHandler>>,
    me: Weak<EventDrivenServer>,
}

impl EventDrivenServer {
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|me| EventDrivenServer {
            registry: PeerRegistry::new(),
            before_process: RwLock::new(None),
            handler: RwLock::new(None),
            me: me.clone(),
        })
    }

    pub fn registry(&self) -> &PeerRegistry {
        &self.registry
    }

    /// Register a lifecycle hook, replacing any previous one for `event`
    pub fn on(
        &self,
        event: RegistryEvent,
        hook: impl Fn(&HookContext<'_>) + Send + Sync + 'static,
    ) {
        self.registry.on(event, hook);
    }

    pub fn before_process(
        &self,
        hook: impl Fn(&mut PeerMessage, &EventDrivenServer) + Send + Sync + 'static,
    ) {
        *self.before_process.write() = Some(Arc::new(hook));
    }

    /// Install the message handler, replacing any previous one
    pub fn on_message<F, Fut>(&self, handler: F)
    where
        F: Fn(PeerMessage, Arc<EventDrivenServer>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = PeerResult<()>> + Send + 'static,
    {
        let handler: MessageHandler =
            Arc::new(move |msg: PeerMessage, server: Arc<EventDrivenServer>| {
                handler(msg, server).boxed()
            });
        *self.handler.write() = Some(handler);
    }

    /// Block until [`stop`](Self::stop), then close every remaining peer
    pub async fn start(&self) -> Vec<PeerError> {
        tracing::info!("event-driven server started");
        self.registry.start().await
    }

    pub fn stop(&self) {
        self.registry.stop();
    }
}

#[async_trait]
impl Server for EventDrivenServer {
    fn add_peer(&self, peer: PeerRef) -> PeerId {
        self.registry.add_peer(peer)
    }

    async fn remove_peer(&self, id: PeerId) -> PeerResult<()> {
        self.registry.remove_peer(id).await
    }

    async fn append_message(&self, id: PeerId, data: Bytes) {
        let mut msg = PeerMessage::new(id, data);

        let hook = self.before_process.read().clone();
        if let Some(hook) = hook {
            hook(&mut msg, self);
        }

        let handler = self.handler.read().clone();
        let (Some(handler), Some(server)) = (handler, self.me.upgrade()) else {
            tracing::trace!(peer_id = %id, "no message handler installed");
            return;
        };
        if let Err(e) = handler(msg, server).await {
            tracing::error!(peer_id = %id, error = %e, "message handler failed");
        }
    }

    fn peer_count(&self) -> usize {
        self.registry.peer_count()
    }

    fn get_peer(&self, id: PeerId) -> Option<PeerRef> {
        self.registry.get_peer(id)
    }

    fn for_each_peer(&self, f: &mut dyn FnMut(PeerId, &PeerRef)) {
        self.registry.for_each_peer(f);
    }
}
