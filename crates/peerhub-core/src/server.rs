//! The server capability contract exposed to transport collaborators

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::{PeerId, PeerRef, PeerResult};

/// What a peer's read loop and a transport listener may call on a server
///
/// Every dispatch discipline implements this. `start`/`stop` are inherent on
/// each server because their run loops differ.
#[async_trait]
pub trait Server: Send + Sync {
    /// Register a peer, assign it the smallest free id, and launch its read loop
    fn add_peer(&self, peer: PeerRef) -> PeerId;

    /// Close and forget a peer
    async fn remove_peer(&self, id: PeerId) -> PeerResult<()>;

    /// Hand data received from a peer to the dispatch discipline
    async fn append_message(&self, id: PeerId, data: Bytes);

    fn peer_count(&self) -> usize;

    fn get_peer(&self, id: PeerId) -> Option<PeerRef>;

    /// Visit every registered peer under the registry lock.
    ///
    /// `f` must not add or remove peers: the lock is not reentrant.
    fn for_each_peer(&self, f: &mut dyn FnMut(PeerId, &PeerRef));
}

/// Shared handle to a server, as held by peers
pub type ServerRef = Arc<dyn Server>;
