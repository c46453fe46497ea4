//! Producer side of the write/stop primitive

use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc::{self, error::SendTimeoutError};

use peerhub_core::{PeerError, PeerResult};

use crate::{StopPayload, WritePayload};

/// Default write queue capacity for nodes
pub const DEFAULT_BUFFER: usize = 16;

/// Consumer side of a [`Handle`], owned by exactly one background task
#[derive(Debug)]
pub struct HandleReceivers {
    pub rx: mpsc::Receiver<WritePayload>,
    pub stop_rx: mpsc::Receiver<StopPayload>,
}

/// Write + stop handle to a node
///
/// Cloning is cheap; every clone feeds the same consumer. A timeout of 0
/// means a write waits for queue capacity indefinitely.
#[derive(Clone, Debug)]
pub struct Handle {
    tx: mpsc::Sender<WritePayload>,
    stop_tx: mpsc::Sender<StopPayload>,
    timeout_ms: u64,
}

impl Handle {
    pub(crate) fn from_parts(
        tx: mpsc::Sender<WritePayload>,
        stop_tx: mpsc::Sender<StopPayload>,
        timeout_ms: u64,
    ) -> Self {
        Handle {
            tx,
            stop_tx,
            timeout_ms,
        }
    }

    /// Create a handle together with the receivers its consumer drains
    pub fn channel(buffer: usize) -> (Handle, HandleReceivers) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let (stop_tx, stop_rx) = mpsc::channel(1);
        (
            Handle::from_parts(tx, stop_tx, 0),
            HandleReceivers { rx, stop_rx },
        )
    }

    /// Set the default write timeout
    pub fn with_timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = ms;
        self
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }

    /// Queue a write with the default timeout.
    ///
    /// Returns once the request is accepted into the queue; the consumer's
    /// outcome is not observed. Use [`Handle::write_then`] for that.
    pub async fn write(&self, data: impl Into<Bytes>) -> PeerResult<()> {
        self.timed_write(data, self.timeout_ms).await
    }

    /// Queue a write with the default timeout and report its outcome
    pub async fn write_then(
        &self,
        data: impl Into<Bytes>,
        callback: impl FnOnce(PeerResult<()>) + Send + 'static,
    ) {
        self.timed_write_then(data, self.timeout_ms, callback).await
    }

    pub async fn timed_write(&self, data: impl Into<Bytes>, timeout_ms: u64) -> PeerResult<()> {
        self.offer(WritePayload::detached(data), timeout_ms)
            .await
            .map_err(|(_, err)| err)
    }

    /// Queue a write with an explicit timeout.
    ///
    /// `callback` fires exactly once: with `Timeout` or `AlreadyClosed` if the
    /// request was never accepted, otherwise with whatever the consumer
    /// reports. A request that misses its deadline is dropped and never
    /// reaches the consumer.
    pub async fn timed_write_then(
        &self,
        data: impl Into<Bytes>,
        timeout_ms: u64,
        callback: impl FnOnce(PeerResult<()>) + Send + 'static,
    ) {
        let payload = WritePayload::new(data, callback);
        if let Err((payload, err)) = self.offer(payload, timeout_ms).await {
            payload.complete(Err(err));
        }
    }

    async fn offer(
        &self,
        payload: WritePayload,
        timeout_ms: u64,
    ) -> Result<(), (WritePayload, PeerError)> {
        if timeout_ms == 0 {
            return self
                .tx
                .send(payload)
                .await
                .map_err(|e| (e.0, PeerError::AlreadyClosed));
        }

        // Capacity reservation and enqueue happen together, so a timed-out
        // payload is handed back instead of sitting in the queue.
        match self
            .tx
            .send_timeout(payload, Duration::from_millis(timeout_ms))
            .await
        {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(payload)) => {
                tracing::debug!(timeout_ms, "handle write not accepted in time");
                Err((payload, PeerError::Timeout))
            }
            Err(SendTimeoutError::Closed(payload)) => Err((payload, PeerError::AlreadyClosed)),
        }
    }

    /// Ask the consumer to clean up and exit
    pub async fn stop(&self) -> PeerResult<()> {
        self.stop_tx
            .send(StopPayload::detached())
            .await
            .map_err(|_| PeerError::AlreadyClosed)
    }

    /// Ask the consumer to clean up and exit, then report
    pub async fn stop_then(&self, callback: impl FnOnce(PeerResult<()>) + Send + 'static) {
        if let Err(e) = self.stop_tx.send(StopPayload::new(callback)).await {
            e.0.complete(Err(PeerError::AlreadyClosed));
        }
    }

    /// True once the consumer has dropped its write queue
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Stop-only view of this handle
    pub fn stop_only(&self) -> StopOnlyHandle {
        StopOnlyHandle {
            stop_tx: self.stop_tx.clone(),
        }
    }
}

/// Handle to a node that accepts no writes (tickers, tail followers, listeners)
#[derive(Clone, Debug)]
pub struct StopOnlyHandle {
    stop_tx: mpsc::Sender<StopPayload>,
}

impl StopOnlyHandle {
    pub(crate) fn from_sender(stop_tx: mpsc::Sender<StopPayload>) -> Self {
        StopOnlyHandle { stop_tx }
    }

    pub fn channel() -> (StopOnlyHandle, mpsc::Receiver<StopPayload>) {
        let (stop_tx, stop_rx) = mpsc::channel(1);
        (StopOnlyHandle::from_sender(stop_tx), stop_rx)
    }

    pub async fn stop(&self) -> PeerResult<()> {
        self.stop_tx
            .send(StopPayload::detached())
            .await
            .map_err(|_| PeerError::AlreadyClosed)
    }

    pub async fn stop_then(&self, callback: impl FnOnce(PeerResult<()>) + Send + 'static) {
        if let Err(e) = self.stop_tx.send(StopPayload::new(callback)).await {
            e.0.complete(Err(PeerError::AlreadyClosed));
        }
    }

    pub fn is_closed(&self) -> bool {
        self.stop_tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::{mpsc::error::TryRecvError, oneshot};

    /// Minimal consumer: acknowledges writes until stopped
    fn spawn_echo_consumer(mut receivers: HandleReceivers, seen: mpsc::UnboundedSender<Bytes>) {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Some(payload) = receivers.rx.recv() => {
                        let _ = seen.send(payload.data().clone());
                        payload.complete(Ok(()));
                    }
                    Some(stop) = receivers.stop_rx.recv() => {
                        stop.complete(Ok(()));
                        break;
                    }
                    else => break,
                }
            }
        });
    }

    #[tokio::test]
    async fn test_write_reaches_consumer() {
        let (handle, receivers) = Handle::channel(4);
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
        spawn_echo_consumer(receivers, seen_tx);

        handle.write(&b"one"[..]).await.unwrap();
        assert_eq!(seen_rx.recv().await.unwrap().as_ref(), b"one");
    }

    #[tokio::test]
    async fn test_write_then_reports_consumer_outcome() {
        let (handle, receivers) = Handle::channel(4);
        let (seen_tx, _seen_rx) = mpsc::unbounded_channel();
        spawn_echo_consumer(receivers, seen_tx);

        let (done_tx, done_rx) = oneshot::channel();
        handle
            .write_then(&b"two"[..], move |result| {
                let _ = done_tx.send(result.is_ok());
            })
            .await;
        assert!(done_rx.await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_write_is_never_delivered() {
        let (handle, mut receivers) = Handle::channel(1);
        handle.write(&b"filler"[..]).await.unwrap();

        let (done_tx, done_rx) = oneshot::channel();
        handle
            .timed_write_then(&b"late"[..], 50, move |result| {
                let _ = done_tx.send(result);
            })
            .await;
        assert!(matches!(done_rx.await.unwrap(), Err(PeerError::Timeout)));

        // Only the filler was ever queued
        assert_eq!(receivers.rx.recv().await.unwrap().data().as_ref(), b"filler");
        assert!(matches!(receivers.rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_timeout_applies_to_write() {
        let (handle, _receivers) = Handle::channel(1);
        let handle = handle.with_timeout_ms(20);
        handle.write(&b"filler"[..]).await.unwrap();

        assert!(matches!(handle.write(&b"x"[..]).await, Err(PeerError::Timeout)));
    }

    #[tokio::test]
    async fn test_stop_then_fires_after_cleanup() {
        let (handle, receivers) = Handle::channel(4);
        let (seen_tx, _seen_rx) = mpsc::unbounded_channel();
        spawn_echo_consumer(receivers, seen_tx);

        let (done_tx, done_rx) = oneshot::channel();
        handle
            .stop_then(move |result| {
                let _ = done_tx.send(result.is_ok());
            })
            .await;
        assert!(done_rx.await.unwrap());
    }

    #[tokio::test]
    async fn test_write_after_consumer_exit_is_closed() {
        let (handle, receivers) = Handle::channel(4);
        drop(receivers);

        assert!(handle.is_closed());
        assert!(matches!(handle.write(&b"x"[..]).await, Err(PeerError::AlreadyClosed)));
        assert!(matches!(handle.stop().await, Err(PeerError::AlreadyClosed)));
    }

    #[tokio::test]
    async fn test_stop_only_handle() {
        let (handle, mut stop_rx) = StopOnlyHandle::channel();
        let consumer = tokio::spawn(async move {
            if let Some(stop) = stop_rx.recv().await {
                stop.complete(Ok(()));
            }
        });

        handle.stop().await.unwrap();
        consumer.await.unwrap();
        assert!(handle.is_closed());
    }
}
