//! Broadcaster

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use peerhub_core::{PeerError, PeerResult, TargetId, TargetIdAllocator};
use peerhub_handle::Handle;

use crate::BroadcasterConfig;

/// Per-target outcome callback, shared by every target of one write
pub type WriteCallback = Arc<dyn Fn(TargetId, PeerResult<()>) + Send + Sync>;

/// Per-target stop outcome callback
pub type StopCallback = Arc<dyn Fn(PeerResult<()>) + Send + Sync>;

#[derive(Default)]
struct TargetTable {
    targets: HashMap<TargetId, Handle>,
    ids: TargetIdAllocator,
}

/// Fan-out to a dynamic set of handles
///
/// Clones share the same target set. Every mutating call runs on a spawned
/// task, so it must be made from within a tokio runtime.
#[derive(Clone)]
pub struct Broadcaster {
    timeout_ms: u64,
    keep_dead_targets: bool,
    table: Arc<Mutex<TargetTable>>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::with_config(&BroadcasterConfig::default())
    }

    pub fn with_config(config: &BroadcasterConfig) -> Self {
        Broadcaster {
            timeout_ms: config.timeout_ms,
            keep_dead_targets: config.keep_dead_targets,
            table: Arc::new(Mutex::new(TargetTable::default())),
        }
    }

    /// Default per-target write budget; 0 waits indefinitely
    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = ms;
        self
    }

    pub fn keep_dead_targets(mut self, enable: bool) -> Self {
        self.keep_dead_targets = enable;
        self
    }

    pub fn add_target(&self, handle: Handle) {
        self.add_target_then(handle, |_| {});
    }

    /// Register a target; `callback` receives its id
    pub fn add_target_then(
        &self,
        handle: Handle,
        callback: impl FnOnce(TargetId) + Send + 'static,
    ) {
        let table = self.table.clone();
        tokio::spawn(async move {
            let id = {
                let mut table = table.lock();
                let id = table.ids.next_id();
                table.targets.insert(id, handle);
                id
            };
            tracing::debug!(target_id = %id, "broadcast target added");
            callback(id);
        });
    }

    pub fn remove_target(&self, id: TargetId) {
        self.remove_target_then(id, |_| {});
    }

    /// Forget a target; `callback` receives the removed handle, if any
    pub fn remove_target_then(
        &self,
        id: TargetId,
        callback: impl FnOnce(Option<Handle>) + Send + 'static,
    ) {
        let table = self.table.clone();
        tokio::spawn(async move {
            let removed = table.lock().targets.remove(&id);
            callback(removed);
        });
    }

    pub fn get_target(&self, id: TargetId) -> PeerResult<Handle> {
        self.table
            .lock()
            .targets
            .get(&id)
            .cloned()
            .ok_or(PeerError::TargetNotFound(id))
    }

    pub fn target_count(&self) -> usize {
        self.table.lock().targets.len()
    }

    /// Current target ids, ascending
    pub fn target_ids(&self) -> Vec<TargetId> {
        let mut ids: Vec<TargetId> = self.table.lock().targets.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn write(&self, data: impl Into<Bytes>) {
        self.fan_out(data.into(), self.timeout_ms, Arc::new(|_: TargetId, _: PeerResult<()>| {}));
    }

    /// Write to every target; `callback` fires once per target outcome
    pub fn write_then(
        &self,
        data: impl Into<Bytes>,
        callback: impl Fn(TargetId, PeerResult<()>) + Send + Sync + 'static,
    ) {
        self.fan_out(data.into(), self.timeout_ms, Arc::new(callback));
    }

    pub fn timed_write(&self, data: impl Into<Bytes>, timeout_ms: u64) {
        self.fan_out(data.into(), timeout_ms, Arc::new(|_: TargetId, _: PeerResult<()>| {}));
    }

    pub fn timed_write_then(
        &self,
        data: impl Into<Bytes>,
        timeout_ms: u64,
        callback: impl Fn(TargetId, PeerResult<()>) + Send + Sync + 'static,
    ) {
        self.fan_out(data.into(), timeout_ms, Arc::new(callback));
    }

    /// Snapshot the targets and give each one an independent write task.
    ///
    /// `timeout_ms` bounds the whole per-target outcome: queueing plus the
    /// target's own write. A target that overruns is reported as `Timeout`
    /// even if its consumer later completes the write.
    fn fan_out(&self, data: Bytes, timeout_ms: u64, callback: WriteCallback) {
        let targets: Vec<(TargetId, Handle)> = self
            .table
            .lock()
            .targets
            .iter()
            .map(|(id, handle)| (*id, handle.clone()))
            .collect();

        for (id, handle) in targets {
            let data = data.clone();
            let callback = callback.clone();
            let evict_from = (!self.keep_dead_targets).then(|| self.table.clone());

            tokio::spawn(async move {
                let result = deliver(&handle, data, timeout_ms).await;
                if let (Err(e), Some(table)) = (&result, evict_from) {
                    if table.lock().targets.remove(&id).is_some() {
                        tracing::warn!(target_id = %id, error = %e, "broadcast target evicted");
                    }
                }
                callback(id, result);
            });
        }
    }

    pub fn stop_all(&self) {
        self.stop_all_then(|_| {});
    }

    /// Stop and forget every current target; `callback` fires once per target
    pub fn stop_all_then(&self, callback: impl Fn(PeerResult<()>) + Send + Sync + 'static) {
        let callback: StopCallback = Arc::new(callback);
        let table = self.table.clone();
        tokio::spawn(async move {
            let targets = std::mem::take(&mut table.lock().targets);
            tracing::debug!(count = targets.len(), "stopping all broadcast targets");
            for (_, handle) in targets {
                let callback = callback.clone();
                handle.stop_then(move |result| callback(result)).await;
            }
        });
    }
}

/// One target's write, bounded end to end by `timeout_ms` (0 is unbounded)
async fn deliver(handle: &Handle, data: Bytes, timeout_ms: u64) -> PeerResult<()> {
    let (tx, rx) = oneshot::channel();
    let outcome = async {
        handle
            .timed_write_then(data, timeout_ms, move |result| {
                let _ = tx.send(result);
            })
            .await;
        rx.await.unwrap_or(Err(PeerError::AlreadyClosed))
    };

    if timeout_ms == 0 {
        return outcome.await;
    }
    tokio::time::timeout(Duration::from_millis(timeout_ms), outcome)
        .await
        .unwrap_or(Err(PeerError::Timeout))
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}
