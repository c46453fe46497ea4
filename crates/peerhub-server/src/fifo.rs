//! FIFO dispatch
//!
//! Every peer feeds one shared queue. A single loop inside `start()` pulls
//! messages in acceptance order and awaits the handler before pulling the
//! next, so handler invocations are totally ordered and never overlap.

use std::future::Future;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;

use peerhub_core::{PeerError, PeerId, PeerMessage, PeerRef, PeerResult, Server};

use crate::{HookContext, PeerRegistry, RegistryEvent};

pub type FifoHandler =
    Arc<dyn Fn(PeerMessage, Arc<FifoServer>) -> BoxFuture<'static, PeerResult<()>> + Send + Sync>;

/// Globally serialized dispatch
pub struct FifoServer {
    registry: PeerRegistry,
    tx: mpsc::UnboundedSender<PeerMessage>,
    /// Taken by the dispatch loop
    rx: Mutex<Option<mpsc::UnboundedReceiver<PeerMessage>>>,
    handler: RwLock<Option<FifoHandler>>,
    me: Weak<FifoServer>,
}

impl FifoServer {
    pub fn new() -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        Arc::new_cyclic(|me| FifoServer {
            registry: PeerRegistry::new(),
            tx,
            rx: Mutex::new(Some(rx)),
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

    /// Install the message handler, replacing any previous one
    pub fn on_message<F, Fut>(&self, handler: F)
    where
        F: Fn(PeerMessage, Arc<FifoServer>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = PeerResult<()>> + Send + 'static,
    {
        let handler: FifoHandler =
            Arc::new(move |msg: PeerMessage, server: Arc<FifoServer>| handler(msg, server).boxed());
        *self.handler.write() = Some(handler);
    }

    /// Run the dispatch loop until [`stop`](Self::stop), then drain the registry.
    ///
    /// Messages still queued when stop is observed are dropped.
    pub async fn start(&self) -> Vec<PeerError> {
        let rx = self.rx.lock().take();
        let Some(mut rx) = rx else {
            tracing::warn!("fifo dispatch loop already started");
            return Vec::new();
        };

        let mut stop = self.registry.stop_signal();
        tracing::info!("fifo server started");

        loop {
            tokio::select! {
                biased;
                _ = stop.stopped() => break,
                msg = rx.recv() => match msg {
                    Some(msg) => self.dispatch(msg).await,
                    None => break,
                },
            }
        }

        rx.close();
        self.registry.drain().await
    }

    pub fn stop(&self) {
        self.registry.stop();
    }

    async fn dispatch(&self, msg: PeerMessage) {
        let handler = self.handler.read().clone();
        let (Some(handler), Some(server)) = (handler, self.me.upgrade()) else {
            return;
        };
        let peer_id = msg.peer_id();
        if let Err(e) = handler(msg, server).await {
            tracing::error!(peer_id = %peer_id, error = %e, "message handler failed");
        }
    }
}

#[async_trait]
impl Server for FifoServer {
    fn add_peer(&self, peer: PeerRef) -> PeerId {
        self.registry.add_peer(peer)
    }

    async fn remove_peer(&self, id: PeerId) -> PeerResult<()> {
        self.registry.remove_peer(id).await
    }

    async fn append_message(&self, id: PeerId, data: Bytes) {
        if self.tx.send(PeerMessage::new(id, data)).is_err() {
            tracing::debug!(peer_id = %id, "fifo queue closed, message dropped");
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
