//! Assemble handles from raw queue senders

use tokio::sync::mpsc;

use peerhub_core::{PeerError, PeerResult};

use crate::{Handle, StopOnlyHandle, StopPayload, WritePayload};

/// Builder for nodes that create their own queues
#[derive(Debug, Default)]
pub struct HandleBuilder {
    tx: Option<mpsc::Sender<WritePayload>>,
    stop_tx: Option<mpsc::Sender<StopPayload>>,
    timeout_ms: u64,
}

impl HandleBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write queue sender
    pub fn tx(mut self, tx: mpsc::Sender<WritePayload>) -> Self {
        self.tx = Some(tx);
        self
    }

    /// Stop queue sender
    pub fn stop_tx(mut self, stop_tx: mpsc::Sender<StopPayload>) -> Self {
        self.stop_tx = Some(stop_tx);
        self
    }

    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = ms;
        self
    }

    /// Build a write + stop handle; both senders are required
    pub fn build(self) -> PeerResult<Handle> {
        let tx = self.tx.ok_or(PeerError::MissingComponent("write sender"))?;
        let stop_tx = self.stop_tx.ok_or(PeerError::MissingComponent("stop sender"))?;
        Ok(Handle::from_parts(tx, stop_tx, self.timeout_ms))
    }

    /// Build a stop-only handle; the write sender is ignored
    pub fn build_stop_only(self) -> PeerResult<StopOnlyHandle> {
        let stop_tx = self.stop_tx.ok_or(PeerError::MissingComponent("stop sender"))?;
        Ok(StopOnlyHandle::from_sender(stop_tx))
    }
}
