//! TCP accept loop feeding a server

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use peerhub_core::{PeerResult, ServerRef};
use peerhub_handle::{StopOnlyHandle, StopPayload};

use crate::{NetPeer, NetPeerConfig};

/// Pause after a failed accept so a persistent error does not spin
const ACCEPT_BACKOFF: Duration = Duration::from_millis(10);

/// Accepts TCP connections and registers each one as a [`NetPeer`]
pub struct TcpPeerListener {
    listener: TcpListener,
    local_addr: SocketAddr,
    peer_config: NetPeerConfig,
}

impl TcpPeerListener {
    /// Bind to a local address
    pub async fn bind(addr: SocketAddr) -> PeerResult<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        Ok(TcpPeerListener {
            listener,
            local_addr,
            peer_config: NetPeerConfig::default(),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Settings applied to every accepted connection
    pub fn peer_config(mut self, config: NetPeerConfig) -> Self {
        self.peer_config = config;
        self
    }

    /// Start accepting. Stopping the listener leaves accepted peers registered.
    pub fn spawn(self, server: ServerRef) -> StopOnlyHandle {
        let (handle, stop_rx) = StopOnlyHandle::channel();
        tokio::spawn(accept_loop(self, server, stop_rx));
        handle
    }
}

fn register(stream: TcpStream, remote: SocketAddr, server: &ServerRef, config: &NetPeerConfig) {
    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!(remote = %remote, error = %e, "set_nodelay failed");
    }
    let peer = Arc::new(NetPeer::with_config(stream, server, config.clone()));
    let id = server.add_peer(peer);
    tracing::info!(peer_id = %id, remote = %remote, "accepted connection");
}

async fn accept_loop(
    listener: TcpPeerListener,
    server: ServerRef,
    mut stop_rx: mpsc::Receiver<StopPayload>,
) {
    tracing::info!(addr = %listener.local_addr, "listening");
    loop {
        tokio::select! {
            biased;
            stop = stop_rx.recv() => {
                if let Some(stop) = stop {
                    stop.complete(Ok(()));
                }
                break;
            }
            accepted = listener.listener.accept() => match accepted {
                Ok((stream, remote)) => register(stream, remote, &server, &listener.peer_config),
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            },
        }
    }
    tracing::info!(addr = %listener.local_addr, "listener stopped");
}
