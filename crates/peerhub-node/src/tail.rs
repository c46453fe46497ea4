//! File tail follower

use std::io::SeekFrom;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tokio::sync::mpsc;

use peerhub_core::{PeerError, PeerResult};
use peerhub_handle::{StopOnlyHandle, StopPayload};

use crate::{trim_line, LineHandler};

pub const DEFAULT_CHECK_INTERVAL_MS: u64 = 10;

/// Follows a file from its current end and reports each new complete line
pub struct TailNode {
    filename: PathBuf,
    line_handler: Option<LineHandler>,
    check_interval_ms: u64,
    handle: StopOnlyHandle,
    stop_rx: mpsc::Receiver<StopPayload>,
}

impl TailNode {
    pub fn new(filename: impl Into<PathBuf>) -> Self {
        let (handle, stop_rx) = StopOnlyHandle::channel();
        TailNode {
            filename: filename.into(),
            line_handler: None,
            check_interval_ms: DEFAULT_CHECK_INTERVAL_MS,
            handle,
            stop_rx,
        }
    }

    pub fn on_new_line(mut self, handler: impl Fn(Bytes) + Send + Sync + 'static) -> Self {
        self.line_handler = Some(Arc::new(handler));
        self
    }

    /// How long to wait at end of file before polling again
    pub fn check_interval_ms(mut self, ms: u64) -> Self {
        self.check_interval_ms = ms.max(1);
        self
    }

    pub fn handle(&self) -> StopOnlyHandle {
        self.handle.clone()
    }

    /// Open the file, seek to its end and start following
    pub async fn spawn(self) -> PeerResult<StopOnlyHandle> {
        let handler = self.line_handler.ok_or(PeerError::MissingComponent("line handler"))?;
        let mut file = File::open(&self.filename).await?;
        file.seek(SeekFrom::End(0)).await?;

        tracing::debug!(path = %self.filename.display(), "tail node started");
        tokio::spawn(follow(
            file,
            self.filename,
            handler,
            Duration::from_millis(self.check_interval_ms),
            self.stop_rx,
        ));
        Ok(self.handle)
    }
}

async fn follow(
    file: File,
    path: PathBuf,
    handler: LineHandler,
    check_interval: Duration,
    mut stop_rx: mpsc::Receiver<StopPayload>,
) {
    let mut reader = BufReader::new(file);
    // Holds a partial line until its terminator shows up
    let mut line = Vec::new();

    loop {
        tokio::select! {
            biased;
            stop = stop_rx.recv() => {
                if let Some(stop) = stop {
                    stop.complete(Ok(()));
                }
                break;
            }
            read = reader.read_until(b'\n', &mut line) => match read {
                Ok(0) => tokio::time::sleep(check_interval).await,
                Ok(_) if line.last() == Some(&b'\n') => {
                    handler(trim_line(std::mem::take(&mut line)))
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(path = %path.display(), error = %e, "tail read failed");
                    break;
                }
            },
        }
    }
}
