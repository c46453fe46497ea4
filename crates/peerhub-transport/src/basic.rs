//! Closure-driven peer

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::FutureExt;

use peerhub_core::{Peer, PeerId, PeerIdentity, PeerResult};

pub type WriteHook = Arc<dyn Fn(Bytes) -> BoxFuture<'static, PeerResult<()>> + Send + Sync>;
pub type CloseHook = Arc<dyn Fn() -> BoxFuture<'static, PeerResult<()>> + Send + Sync>;
pub type StartHook = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// A peer whose behavior is entirely supplied by hooks.
///
/// Unset hooks succeed without doing anything. Write and close hooks may be
/// called concurrently; wrap in [`SafePeer`](crate::SafePeer) if that matters.
pub struct BasicPeer {
    identity: PeerIdentity,
    on_write: WriteHook,
    on_close: CloseHook,
    on_start: StartHook,
}

impl BasicPeer {
    pub fn new() -> Self {
        BasicPeer {
            identity: PeerIdentity::new("basic"),
            on_write: Arc::new(|_: Bytes| -> BoxFuture<'static, PeerResult<()>> {
                async { Ok(()) }.boxed()
            }),
            on_close: Arc::new(|| -> BoxFuture<'static, PeerResult<()>> {
                async { Ok(()) }.boxed()
            }),
            on_start: Arc::new(|| -> BoxFuture<'static, ()> { async {}.boxed() }),
        }
    }

    pub fn with_tag(self, tag: &str) -> Self {
        self.identity.set_tag(tag);
        self
    }

    pub fn on_write<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Bytes) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = PeerResult<()>> + Send + 'static,
    {
        self.on_write = Arc::new(move |data: Bytes| f(data).boxed());
        self
    }

    pub fn on_close<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = PeerResult<()>> + Send + 'static,
    {
        self.on_close = Arc::new(move || f().boxed());
        self
    }

    /// The read loop; the registry runs it on its own task
    pub fn on_start<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.on_start = Arc::new(move || f().boxed());
        self
    }
}

impl Default for BasicPeer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Peer for BasicPeer {
    fn id(&self) -> PeerId {
        self.identity.id()
    }

    fn set_id(&self, id: PeerId) {
        self.identity.set_id(id)
    }

    fn tag(&self) -> String {
        self.identity.tag()
    }

    fn set_tag(&self, tag: &str) {
        self.identity.set_tag(tag)
    }

    async fn write(&self, data: Bytes) -> PeerResult<()> {
        (self.on_write)(data).await
    }

    async fn close(&self) -> PeerResult<()> {
        (self.on_close)().await
    }

    async fn start(&self) {
        (self.on_start)().await
    }
}
