//! In-memory peer used by the server unit tests

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use peerhub_core::{Peer, PeerError, PeerId, PeerIdentity, PeerRef, PeerResult};

#[derive(Default)]
pub(crate) struct MockPeer {
    identity: PeerIdentity,
    fail_close: bool,
    pub started: AtomicBool,
    pub close_calls: AtomicUsize,
    pub written: Mutex<Vec<Bytes>>,
}

impl MockPeer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing_close() -> Arc<Self> {
        Arc::new(MockPeer {
            fail_close: true,
            ..Default::default()
        })
    }

    pub fn peer_ref(self: &Arc<Self>) -> PeerRef {
        self.clone()
    }
}

#[async_trait]
impl Peer for MockPeer {
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
        self.written.lock().push(data);
        Ok(())
    }

    async fn close(&self) -> PeerResult<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_close {
            return Err(PeerError::Transport("close refused".to_string()));
        }
        Ok(())
    }

    async fn start(&self) {
        self.started.store(true, Ordering::SeqCst);
    }
}
