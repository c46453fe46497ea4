//! Buffering decorator

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use peerhub_core::{Peer, PeerId, PeerResult};
use peerhub_handle::{Handle, HandleReceivers};

use crate::BufferPeerConfig;

/// Queues writes in a bounded buffer and feeds them to the inner peer one at
/// a time from a background task.
///
/// `write` succeeds once the data is queued, or fails with `Timeout` if the
/// buffer stays full for the configured time. Failures of the inner write are
/// logged. The drain task starts with `start`; `close` flushes what is
/// queued before closing the inner peer.
pub struct BufferPeer<P> {
    inner: Arc<P>,
    handle: Handle,
    receivers: Mutex<Option<HandleReceivers>>,
}

impl<P: Peer + 'static> BufferPeer<P> {
    pub fn new(inner: P) -> Self {
        Self::with_config(inner, &BufferPeerConfig::default())
    }

    pub fn with_config(inner: P, config: &BufferPeerConfig) -> Self {
        let (handle, receivers) = Handle::channel(config.capacity);
        BufferPeer {
            inner: Arc::new(inner),
            handle: handle.with_timeout_ms(config.timeout_ms),
            receivers: Mutex::new(Some(receivers)),
        }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }
}

#[async_trait]
impl<P: Peer + 'static> Peer for BufferPeer<P> {
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
        self.handle.write(data).await
    }

    async fn close(&self) -> PeerResult<()> {
        // Never started: drop the queue, nothing will drain it
        drop(self.receivers.lock().take());

        let (tx, rx) = oneshot::channel();
        self.handle
            .stop_then(move |result| {
                let _ = tx.send(result);
            })
            .await;
        let _ = rx.await;

        self.inner.close().await
    }

    async fn start(&self) {
        let receivers = self.receivers.lock().take();
        if let Some(receivers) = receivers {
            tokio::spawn(drain(self.inner.clone(), receivers));
        }
        self.inner.start().await
    }
}

async fn drain<P: Peer>(inner: Arc<P>, receivers: HandleReceivers) {
    let HandleReceivers { mut rx, mut stop_rx } = receivers;
    loop {
        tokio::select! {
            biased;
            Some(payload) = rx.recv() => {
                let (data, callback) = payload.into_parts();
                let result = inner.write(data).await;
                if let Err(e) = &result {
                    tracing::error!(
                        peer_id = %inner.id(),
                        tag = %inner.tag(),
                        error = %e,
                        "buffered write failed"
                    );
                }
                callback(result);
            }
            Some(stop) = stop_rx.recv() => {
                stop.complete(Ok(()));
                break;
            }
            else => break,
        }
    }
}
