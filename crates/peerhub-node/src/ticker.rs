//! Fixed-interval ticker

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};

use peerhub_core::{PeerError, PeerResult};
use peerhub_handle::{StopOnlyHandle, StopPayload};

pub const DEFAULT_TICK_INTERVAL_MS: u64 = 1000;

pub type TickHandler = Arc<dyn Fn(u64) + Send + Sync>;

/// Calls the tick handler every interval with a counter starting at 0.
/// The first tick fires one interval after spawn.
pub struct Ticker {
    interval_ms: u64,
    tick_handler: Option<TickHandler>,
    handle: StopOnlyHandle,
    stop_rx: mpsc::Receiver<StopPayload>,
}

impl Ticker {
    pub fn new(interval_ms: u64) -> Self {
        let (handle, stop_rx) = StopOnlyHandle::channel();
        Ticker {
            interval_ms: interval_ms.max(1),
            tick_handler: None,
            handle,
            stop_rx,
        }
    }

    pub fn interval_ms(mut self, ms: u64) -> Self {
        self.interval_ms = ms.max(1);
        self
    }

    pub fn on_tick(mut self, handler: impl Fn(u64) + Send + Sync + 'static) -> Self {
        self.tick_handler = Some(Arc::new(handler));
        self
    }

    pub fn handle(&self) -> StopOnlyHandle {
        self.handle.clone()
    }

    pub fn spawn(self) -> PeerResult<StopOnlyHandle> {
        let handler = self.tick_handler.ok_or(PeerError::MissingComponent("tick handler"))?;
        let period = Duration::from_millis(self.interval_ms);
        tokio::spawn(run(handler, period, self.stop_rx));
        Ok(self.handle)
    }
}

impl Default for Ticker {
    fn default() -> Self {
        Self::new(DEFAULT_TICK_INTERVAL_MS)
    }
}

async fn run(handler: TickHandler, period: Duration, mut stop_rx: mpsc::Receiver<StopPayload>) {
    let mut interval = time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut current: u64 = 0;

    loop {
        tokio::select! {
            biased;
            stop = stop_rx.recv() => {
                if let Some(stop) = stop {
                    stop.complete(Ok(()));
                }
                break;
            }
            _ = interval.tick() => {
                handler(current);
                current += 1;
            }
        }
    }
}
