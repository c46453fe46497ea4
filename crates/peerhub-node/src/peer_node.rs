//! Handle-to-peer bridge
//!
//! Lets handle-addressed utilities such as the broadcaster reach a peer owned
//! by a registry. Stopping the node leaves the peer open; closing it is the
//! registry's job.

use peerhub_core::{Peer, PeerRef, PeerResult};
use peerhub_handle::{Handle, HandleReceivers, DEFAULT_BUFFER};

pub struct PeerNode {
    peer: PeerRef,
    handle: Handle,
    receivers: HandleReceivers,
}

impl PeerNode {
    pub fn new(peer: PeerRef, buffer: usize) -> Self {
        let (handle, receivers) = Handle::channel(buffer);
        PeerNode {
            peer,
            handle,
            receivers,
        }
    }

    pub fn with_default_buffer(peer: PeerRef) -> Self {
        Self::new(peer, DEFAULT_BUFFER)
    }

    pub fn handle(&self) -> Handle {
        self.handle.clone()
    }

    pub fn spawn(self) -> Handle {
        tokio::spawn(forward(self.peer, self.receivers));
        self.handle
    }
}

async fn forward(peer: PeerRef, receivers: HandleReceivers) {
    let HandleReceivers { mut rx, mut stop_rx } = receivers;
    loop {
        tokio::select! {
            biased;
            Some(stop) = stop_rx.recv() => {
                stop.complete(Ok(()));
                break;
            }
            Some(payload) = rx.recv() => {
                let (data, callback) = payload.into_parts();
                let result: PeerResult<()> = peer.write(data).await;
                if let Err(e) = &result {
                    tracing::debug!(
                        peer_id = %peer.id(),
                        tag = %peer.tag(),
                        error = %e,
                        "forward to peer failed"
                    );
                }
                callback(result);
            }
            else => break,
        }
    }
}
