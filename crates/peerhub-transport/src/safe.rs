//! Mutual-exclusion decorator

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{Mutex, MutexGuard};

use peerhub_core::{Peer, PeerId, PeerResult};

/// Wraps a peer so that its writes and close never run concurrently.
///
/// `start` is not serialized: a read loop holding the lock would starve
/// writers. Use [`SafePeer::lock`] to fence setup work against writes.
pub struct SafePeer<P> {
    inner: P,
    lock: Mutex<()>,
}

impl<P: Peer> SafePeer<P> {
    pub fn new(inner: P) -> Self {
        SafePeer {
            inner,
            lock: Mutex::new(()),
        }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    /// Hold off writes and close until the guard is dropped
    pub async fn lock(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().await
    }
}

#[async_trait]
impl<P: Peer> Peer for SafePeer<P> {
    fn id(&self) -> PeerId {
        self.inner.id()
    }

    fn set_id(&self, id: PeerId) {
        self.inner.set_id(id)
    }

    fn tag(&self) -> String {
        self.inner.tag()
    }

    fn set_tag(&self, tag: &str) {
        self.inner.set_tag(tag)
    }

    async fn write(&self, data: Bytes) -> PeerResult<()> {
        let _guard = self.lock.lock().await;
        self.inner.write(data).await
    }

    async fn close(&self) -> PeerResult<()> {
        let _guard = self.lock.lock().await;
        self.inner.close().await
    }

    async fn start(&self) {
        self.inner.start().await
    }
}
