//! The peer capability contract
//!
//! A peer is any connected endpoint that can be written to, closed, and
//! started. Concrete transports (TCP, files, in-memory test doubles) and
//! decorators (locking, buffering) all implement the same trait so the
//! registry can own them uniformly.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;

use crate::{PeerId, PeerResult};

/// Connected endpoint owned by a registry once added
#[async_trait]
pub trait Peer: Send + Sync {
    /// Id assigned by the owning registry
    fn id(&self) -> PeerId;

    fn set_id(&self, id: PeerId);

    fn tag(&self) -> String;

    fn set_tag(&self, tag: &str);

    /// Write bytes to the endpoint
    async fn write(&self, data: Bytes) -> PeerResult<()>;

    /// Close the endpoint. The registry calls this exactly once on removal.
    async fn close(&self) -> PeerResult<()>;

    /// Run the read loop until the transport fails or the peer is closed
    async fn start(&self);
}

/// Shared handle to a registered peer
pub type PeerRef = Arc<dyn Peer>;

/// Id and tag storage for peer implementations
///
/// Ids are written by the registry after construction, so they live behind
/// interior mutability.
#[derive(Debug)]
pub struct PeerIdentity {
    id: AtomicU32,
    tag: RwLock<String>,
}

impl PeerIdentity {
    pub fn new(tag: &str) -> Self {
        PeerIdentity {
            id: AtomicU32::new(0),
            tag: RwLock::new(tag.to_string()),
        }
    }

    pub fn id(&self) -> PeerId {
        PeerId(self.id.load(Ordering::Acquire))
    }

    pub fn set_id(&self, id: PeerId) {
        self.id.store(id.0, Ordering::Release);
    }

    pub fn tag(&self) -> String {
        self.tag.read().clone()
    }

    pub fn set_tag(&self, tag: &str) {
        *self.tag.write() = tag.to_string();
    }
}

impl Default for PeerIdentity {
    fn default() -> Self {
        Self::new("basic")
    }
}

/// Write to a peer, logging the failure instead of returning it
pub async fn write_or_log(peer: &dyn Peer, data: Bytes) {
    if let Err(e) = peer.write(data).await {
        tracing::error!(peer_id = %peer.id(), tag = %peer.tag(), error = %e, "peer write failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PeerError;

    struct FailingPeer {
        identity: PeerIdentity,
    }

    #[async_trait]
    impl Peer for FailingPeer {
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

        async fn write(&self, _data: Bytes) -> PeerResult<()> {
            Err(PeerError::AlreadyClosed)
        }

        async fn close(&self) -> PeerResult<()> {
            Ok(())
        }

        async fn start(&self) {}
    }

    #[test]
    fn test_identity_defaults() {
        let identity = PeerIdentity::default();
        assert_eq!(identity.id(), PeerId::ZERO);
        assert_eq!(identity.tag(), "basic");
    }

    #[test]
    fn test_identity_updates() {
        let identity = PeerIdentity::new("tcp");
        identity.set_id(PeerId::new(9));
        identity.set_tag("ws");

        assert_eq!(identity.id(), PeerId::new(9));
        assert_eq!(identity.tag(), "ws");
    }

    #[tokio::test]
    async fn test_write_or_log_swallows_error() {
        let peer = FailingPeer {
            identity: PeerIdentity::new("failing"),
        };
        // Must not panic or propagate
        write_or_log(&peer, Bytes::from_static(b"data")).await;
    }
}
