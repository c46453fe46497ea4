//! Lockstep dispatch
//!
//! Messages accumulate into a batch; every `step_length` the batch is swapped
//! for an empty one and handed, whole, to the step handler together with the
//! step counter.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};

use peerhub_core::{PeerError, PeerId, PeerMessage, PeerRef, PeerResult, Server};

use crate::{HookContext, LockstepConfig, PeerRegistry, RegistryEvent, StepLength};

/// Called once per tick with the step counter and the batch closed by that tick
pub type StepHandler = Arc<
    dyn Fn(u64, Arc<[PeerMessage]>, Arc<LockstepServer>) -> BoxFuture<'static, PeerResult<()>>
        + Send
        + Sync,
>;

/// Fixed-interval batched dispatch
pub struct LockstepServer {
    registry: PeerRegistry,
    /// Arrivals since the last tick; own lock, never the registry's
    peer_msgs: Mutex<Vec<PeerMessage>>,
    step_length: Mutex<StepLength>,
    current_step: AtomicU64,
    step_handler: RwLock<Option<StepHandler>>,
    me: Weak<LockstepServer>,
}

impl LockstepServer {
    pub fn new() -> Arc<Self> {
        Self::with_config(&LockstepConfig::default())
    }

    pub fn with_config(config: &LockstepConfig) -> Arc<Self> {
        let step_length = StepLength::from(config);
        Arc::new_cyclic(|me| LockstepServer {
            registry: PeerRegistry::new(),
            peer_msgs: Mutex::new(Vec::new()),
            step_length: Mutex::new(step_length),
            current_step: AtomicU64::new(0),
            step_handler: RwLock::new(None),
            me: me.clone(),
        })
    }

    pub fn registry(&self) -> &PeerRegistry {
        &self.registry
    }

    /// Register a lifecycle hook, replacing any previous one for `event`
    pub fn on(
        &self,
        event: RegistryEvent,
        hook: impl Fn(&HookContext<'_>) + Send + Sync + 'static,
    ) {
        self.registry.on(event, hook);
    }

    /// Install the step handler, replacing any previous one
    pub fn on_step<F, Fut>(&self, handler: F)
    where
        F: Fn(u64, Arc<[PeerMessage]>, Arc<LockstepServer>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = PeerResult<()>> + Send + 'static,
    {
        let handler: StepHandler = Arc::new(
            move |step: u64, batch: Arc<[PeerMessage]>, server: Arc<LockstepServer>| {
                handler(step, batch, server).boxed()
            },
        );
        *self.step_handler.write() = Some(handler);
    }

    /// Index of the next step to be delivered
    pub fn current_step(&self) -> u64 {
        self.current_step.load(Ordering::SeqCst)
    }

    pub fn step_length_ms(&self) -> u64 {
        self.step_length.lock().current_ms()
    }

    pub fn min_step_length_ms(&self) -> u64 {
        self.step_length.lock().min_ms()
    }

    pub fn max_step_length_ms(&self) -> u64 {
        self.step_length.lock().max_ms()
    }

    /// Takes effect from the next tick; clamped into the active bounds
    pub fn set_step_length(&self, ms: u64) {
        self.step_length.lock().set(ms);
    }

    pub fn set_min_step_length(&self, ms: u64) {
        self.step_length.lock().set_min(ms);
    }

    pub fn set_max_step_length(&self, ms: u64) {
        self.step_length.lock().set_max(ms);
    }

    fn step_duration(&self) -> Duration {
        self.step_length.lock().as_duration()
    }

    /// Run the tick loop until [`stop`](Self::stop), then drain the registry.
    ///
    /// The timer is re-armed after each step handler returns, with whatever
    /// step length is in effect at that point. Step boundaries therefore drift
    /// by the handler's run time: a tick comes `step_length` after the previous
    /// handler finished, not `step_length` after the previous tick.
    pub async fn start(&self) -> Vec<PeerError> {
        let mut stop = self.registry.stop_signal();
        tracing::info!(step_length_ms = self.step_length_ms(), "lockstep server started");

        loop {
            let step_length = self.step_duration();
            tokio::select! {
                biased;
                _ = stop.stopped() => break,
                _ = tokio::time::sleep(step_length) => self.step().await,
            }
        }

        tracing::info!(steps = self.current_step(), "lockstep server stopping");
        self.registry.drain().await
    }

    pub fn stop(&self) {
        self.registry.stop();
    }

    async fn step(&self) {
        let batch: Arc<[PeerMessage]> = std::mem::take(&mut *self.peer_msgs.lock()).into();
        let step = self.current_step.load(Ordering::SeqCst);

        let handler = self.step_handler.read().clone();
        match (handler, self.me.upgrade()) {
            (Some(handler), Some(server)) => {
                if let Err(e) = handler(step, batch, server).await {
                    tracing::error!(step, error = %e, "step handler failed");
                }
            }
            (None, _) => {
                tracing::trace!(step, dropped = batch.len(), "no step handler installed");
            }
            (Some(_), None) => {}
        }

        self.current_step.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Server for LockstepServer {
    fn add_peer(&self, peer: PeerRef) -> PeerId {
        self.registry.add_peer(peer)
    }

    async fn remove_peer(&self, id: PeerId) -> PeerResult<()> {
        self.registry.remove_peer(id).await
    }

    async fn append_message(&self, id: PeerId, data: Bytes) {
        let msg = PeerMessage::new(id, data);
        self.peer_msgs.lock().push(msg);
    }

    fn peer_count(&self) -> usize {
        self.registry.peer_count()
    }

    fn get_peer(&self, id: PeerId) -> Option<PeerRef> {
        self.registry.get_peer(id)
    }

    fn for_each_peer(&self, f: &mut dyn FnMut(PeerId, &PeerRef)) {
        self.registry.for_each_peer(f);
    }
}
