//! Peer registry shared by every dispatch discipline

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tracing::Instrument;

use peerhub_core::{PeerError, PeerId, PeerRef, PeerResult};

use crate::{HookContext, HookTable, RegistryEvent};

/// Peer map plus ids reserved by in-flight adds
#[derive(Default)]
struct PeerTable {
    peers: HashMap<PeerId, PeerRef>,
    /// Allocated but not yet inserted (BeforeAdd is running)
    reserved: HashSet<PeerId>,
}

impl PeerTable {
    /// INVARIANT: the returned id is the smallest one neither registered nor reserved
    fn reserve(&mut self) -> PeerId {
        let id = PeerId::smallest_free(|id| {
            self.peers.contains_key(&id) || self.reserved.contains(&id)
        });
        self.reserved.insert(id);
        id
    }

    fn commit(&mut self, id: PeerId, peer: PeerRef) {
        self.reserved.remove(&id);
        self.peers.insert(id, peer);
    }
}

/// One-shot stop signal observed by server run loops
#[derive(Clone, Debug)]
pub struct StopSignal {
    rx: watch::Receiver<bool>,
}

impl StopSignal {
    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once stop has been requested. Cancel-safe.
    pub async fn stopped(&mut self) {
        loop {
            let stopped = *self.rx.borrow_and_update();
            if stopped {
                return;
            }
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Owns the peer collection, id allocation, lifecycle hooks and shutdown drain
pub struct PeerRegistry {
    table: Mutex<PeerTable>,
    hooks: RwLock<HookTable>,
    stop_tx: watch::Sender<bool>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        let (stop_tx, _) = watch::channel(false);
        PeerRegistry {
            table: Mutex::new(PeerTable::default()),
            hooks: RwLock::new(HookTable::new()),
            stop_tx,
        }
    }

    /// Register a lifecycle hook, replacing any previous one for `event`
    pub fn on(
        &self,
        event: RegistryEvent,
        hook: impl Fn(&HookContext<'_>) + Send + Sync + 'static,
    ) {
        self.hooks.write().set(event, Arc::new(hook));
    }

    fn fire(&self, event: RegistryEvent, peer_id: PeerId, peer: Option<&PeerRef>) {
        let hook = self.hooks.read().get(event);
        if let Some(hook) = hook {
            hook(&HookContext {
                event,
                peer_id,
                peer,
                registry: self,
            });
        }
    }

    /// Register a peer and launch its read loop on its own task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn add_peer(&self, peer: PeerRef) -> PeerId {
        let id = self.table.lock().reserve();
        peer.set_id(id);

        self.fire(RegistryEvent::BeforeAdd, id, Some(&peer));

        self.table.lock().commit(id, peer.clone());

        let tag = peer.tag();
        let reader = peer.clone();
        tokio::spawn(
            async move { reader.start().await }
                .instrument(tracing::info_span!("peer", peer_id = %id, tag = %tag)),
        );
        tracing::debug!(peer_id = %id, tag = %tag, "peer added");

        self.fire(RegistryEvent::AfterAdd, id, Some(&peer));
        id
    }

    /// Close and forget a peer.
    ///
    /// The entry leaves the map under the lock; `close` runs right after the
    /// lock is released and its error is only logged.
    pub async fn remove_peer(&self, id: PeerId) -> PeerResult<()> {
        self.fire(RegistryEvent::BeforeRemove, id, None);

        let removed = self.table.lock().peers.remove(&id);
        let result = match removed {
            Some(peer) => {
                if let Err(e) = peer.close().await {
                    tracing::error!(
                        peer_id = %id,
                        tag = %peer.tag(),
                        error = %e,
                        "peer close failed"
                    );
                }
                tracing::debug!(peer_id = %id, "peer removed");
                Ok(())
            }
            None => Err(PeerError::NotFound(id)),
        };

        self.fire(RegistryEvent::AfterRemove, id, None);
        result
    }

    pub fn peer_count(&self) -> usize {
        self.table.lock().peers.len()
    }

    pub fn contains_peer(&self, id: PeerId) -> bool {
        self.table.lock().peers.contains_key(&id)
    }

    pub fn get_peer(&self, id: PeerId) -> Option<PeerRef> {
        self.table.lock().peers.get(&id).cloned()
    }

    /// Registered ids in ascending order
    pub fn peer_ids(&self) -> Vec<PeerId> {
        let mut ids: Vec<PeerId> = self.table.lock().peers.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Visit every peer under the registry lock.
    ///
    /// Calling `add_peer`/`remove_peer` from `f` deadlocks.
    pub fn for_each_peer(&self, mut f: impl FnMut(PeerId, &PeerRef)) {
        let table = self.table.lock();
        for (id, peer) in table.peers.iter() {
            f(*id, peer);
        }
    }

    pub fn stop_signal(&self) -> StopSignal {
        StopSignal {
            rx: self.stop_tx.subscribe(),
        }
    }

    /// Request shutdown. Calls after the first have no further effect.
    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
    }

    /// Wait for stop, then drain
    pub async fn start(&self) -> Vec<PeerError> {
        self.stop_signal().stopped().await;
        self.drain().await
    }

    /// Close and forget every remaining peer, collecting close failures
    pub async fn drain(&self) -> Vec<PeerError> {
        let mut peers: Vec<(PeerId, PeerRef)> = self.table.lock().peers.drain().collect();
        peers.sort_unstable_by_key(|(id, _)| *id);

        let mut errs = Vec::new();
        for (id, peer) in peers {
            if let Err(e) = peer.close().await {
                tracing::warn!(peer_id = %id, error = %e, "peer close failed during shutdown");
                errs.push(e);
            }
        }
        errs
    }
}

impl Default for PeerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
