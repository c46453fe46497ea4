//! Stream-backed peer
//!
//! [`NetPeer`] wraps any bidirectional async byte stream. Its read loop
//! forwards every chunk to the owning server as one message, and removes the
//! peer from the server when the remote side hangs up or the read fails.

use std::io;
use std::sync::Weak;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::watch;

use peerhub_core::{Peer, PeerError, PeerId, PeerIdentity, PeerResult, Server, ServerRef};

use crate::NetPeerConfig;

/// Peer over a byte stream such as a `TcpStream`
pub struct NetPeer<S> {
    identity: PeerIdentity,
    config: NetPeerConfig,
    server: Weak<dyn Server>,
    /// Taken by the read loop
    reader: Mutex<Option<ReadHalf<S>>>,
    /// `None` once closed
    writer: tokio::sync::Mutex<Option<WriteHalf<S>>>,
    closed: watch::Sender<bool>,
}

impl<S> NetPeer<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    pub fn new(stream: S, server: &ServerRef) -> Self {
        Self::with_config(stream, server, NetPeerConfig::default())
    }

    pub fn with_config(stream: S, server: &ServerRef, config: NetPeerConfig) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        let (closed, _) = watch::channel(false);
        NetPeer {
            identity: PeerIdentity::new("net"),
            config,
            server: std::sync::Arc::downgrade(server),
            reader: Mutex::new(Some(reader)),
            writer: tokio::sync::Mutex::new(Some(writer)),
            closed,
        }
    }

    pub fn config(&self) -> &NetPeerConfig {
        &self.config
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Hand the connection back to the server for removal
    async fn detach(&self, id: PeerId) {
        let Some(server) = self.server.upgrade() else {
            return;
        };
        if let Err(e) = server.remove_peer(id).await {
            // Already removed by someone else
            tracing::debug!(peer_id = %id, error = %e, "net peer removal skipped");
        }
    }
}

async fn read_some<R>(
    reader: &mut R,
    buf: &mut [u8],
    limit: Option<Duration>,
) -> io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, reader.read(buf))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "read deadline elapsed"))?,
        None => reader.read(buf).await,
    }
}

#[async_trait]
impl<S> Peer for NetPeer<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
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
        let mut writer = self.writer.lock().await;
        let writer = writer.as_mut().ok_or(PeerError::AlreadyClosed)?;
        let io = async {
            writer.write_all(&data).await?;
            writer.flush().await
        };
        match self.config.write_timeout() {
            Some(limit) => tokio::time::timeout(limit, io).await.map_err(|_| PeerError::Timeout)??,
            None => io.await?,
        }
        Ok(())
    }

    async fn close(&self) -> PeerResult<()> {
        if self.closed.send_replace(true) {
            return Err(PeerError::AlreadyClosed);
        }
        let reader = self.reader.lock().take();
        drop(reader);

        let writer = self.writer.lock().await.take();
        if let Some(mut writer) = writer {
            writer.shutdown().await?;
        }
        tracing::debug!(peer_id = %self.id(), "net peer closed");
        Ok(())
    }

    async fn start(&self) {
        let reader = self.reader.lock().take();
        let Some(mut reader) = reader else {
            tracing::warn!(peer_id = %self.id(), "net peer read loop already started or closed");
            return;
        };
        let mut closed = self.closed.subscribe();
        if *closed.borrow_and_update() {
            return;
        }

        let id = self.id();
        let limit = self.config.read_timeout();
        let mut buf = vec![0u8; self.config.buf_size.max(1)];
        loop {
            let read = tokio::select! {
                biased;
                _ = closed.changed() => return,
                read = read_some(&mut reader, &mut buf, limit) => read,
            };
            match read {
                Ok(0) => {
                    tracing::debug!(peer_id = %id, "remote closed the stream");
                    break;
                }
                Ok(n) => {
                    let Some(server) = self.server.upgrade() else {
                        return;
                    };
                    server.append_message(id, Bytes::copy_from_slice(&buf[..n])).await;
                }
                Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                    tracing::warn!(peer_id = %id, "read deadline elapsed, dropping peer");
                    break;
                }
                Err(e) => {
                    if self.is_closed() {
                        return;
                    }
                    tracing::warn!(peer_id = %id, error = %e, "net peer read failed");
                    break;
                }
            }
        }
        self.detach(id).await;
    }
}
