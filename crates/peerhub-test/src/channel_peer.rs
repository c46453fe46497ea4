//! In-memory peer for driving servers without sockets

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};

use peerhub_core::{Peer, PeerError, PeerId, PeerIdentity, PeerResult, Server, ServerRef};

/// A peer whose wire is a pair of unbounded channels.
///
/// Data sent through the [`ChannelRemote`] arrives at the server as messages;
/// writes to the peer come out of the remote. Dropping the remote behaves
/// like a hangup: the read loop removes the peer from its server.
pub struct ChannelPeer {
    identity: PeerIdentity,
    server: Weak<dyn Server>,
    inbound: Mutex<Option<mpsc::UnboundedReceiver<Bytes>>>,
    /// `None` once closed, which ends the remote's stream
    outbound: Mutex<Option<mpsc::UnboundedSender<Bytes>>>,
    closed: watch::Sender<bool>,
}

/// The far end of a [`ChannelPeer`]
pub struct ChannelRemote {
    tx: mpsc::UnboundedSender<Bytes>,
    rx: mpsc::UnboundedReceiver<Bytes>,
}

impl ChannelPeer {
    pub fn pair(server: &ServerRef) -> (Arc<ChannelPeer>, ChannelRemote) {
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (closed, _) = watch::channel(false);
        let peer = ChannelPeer {
            identity: PeerIdentity::new("channel"),
            server: Arc::downgrade(server),
            inbound: Mutex::new(Some(in_rx)),
            outbound: Mutex::new(Some(out_tx)),
            closed,
        };
        (Arc::new(peer), ChannelRemote { tx: in_tx, rx: out_rx })
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}

impl ChannelRemote {
    /// Send data towards the server. False once the peer's read side is gone.
    pub fn send(&self, data: impl Into<Bytes>) -> bool {
        self.tx.send(data.into()).is_ok()
    }

    /// Next write the peer received; `None` after the peer closed
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Bytes> {
        self.rx.try_recv().ok()
    }
}

#[async_trait]
impl Peer for ChannelPeer {
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
        let outbound = self.outbound.lock();
        let tx = outbound.as_ref().ok_or(PeerError::AlreadyClosed)?;
        tx.send(data).map_err(|_| PeerError::AlreadyClosed)
    }

    async fn close(&self) -> PeerResult<()> {
        if self.closed.send_replace(true) {
            return Err(PeerError::AlreadyClosed);
        }
        self.outbound.lock().take();
        self.inbound.lock().take();
        Ok(())
    }

    async fn start(&self) {
        let inbound = self.inbound.lock().take();
        let Some(mut inbound) = inbound else {
            return;
        };
        let mut closed = self.closed.subscribe();
        if *closed.borrow_and_update() {
            return;
        }

        let id = self.id();
        loop {
            tokio::select! {
                biased;
                _ = closed.changed() => return,
                data = inbound.recv() => match data {
                    Some(data) => {
                        let Some(server) = self.server.upgrade() else {
                            return;
                        };
                        server.append_message(id, data).await;
                    }
                    None => break,
                },
            }
        }

        tracing::debug!(peer_id = %id, "channel remote dropped");
        if let Some(server) = self.server.upgrade() {
            let _ = server.remove_peer(id).await;
        }
    }
}
