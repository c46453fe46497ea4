//! Append-only file writer node

use std::path::PathBuf;

use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

use peerhub_core::{PeerError, PeerResult};
use peerhub_handle::{Handle, HandleReceivers, DEFAULT_BUFFER};

/// Appends every write as one line and syncs it before reporting success
pub struct FileNode {
    filename: Option<PathBuf>,
    handle: Handle,
    receivers: HandleReceivers,
}

impl FileNode {
    pub fn new(buffer: usize) -> Self {
        let (handle, receivers) = Handle::channel(buffer);
        FileNode {
            filename: None,
            handle,
            receivers,
        }
    }

    pub fn filename(mut self, path: impl Into<PathBuf>) -> Self {
        self.filename = Some(path.into());
        self
    }

    /// Handle usable before the node is spawned; writes queue up meanwhile
    pub fn handle(&self) -> Handle {
        self.handle.clone()
    }

    /// Open the file and start the writer task
    pub async fn spawn(self) -> PeerResult<Handle> {
        let path = self.filename.ok_or(PeerError::MissingComponent("filename"))?;
        let file = OpenOptions::new().create(true).append(true).open(&path).await?;

        tracing::debug!(path = %path.display(), "file node started");
        tokio::spawn(run(file, path, self.receivers));
        Ok(self.handle)
    }
}

impl Default for FileNode {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER)
    }
}

async fn run(mut file: File, path: PathBuf, receivers: HandleReceivers) {
    let HandleReceivers { mut rx, mut stop_rx } = receivers;
    loop {
        tokio::select! {
            biased;
            Some(stop) = stop_rx.recv() => {
                let result = file.flush().await.map_err(PeerError::from);
                stop.complete(result);
                break;
            }
            Some(payload) = rx.recv() => {
                let (data, callback) = payload.into_parts();
                match append_line(&mut file, &data).await {
                    Ok(()) => callback(Ok(())),
                    Err(e) => {
                        tracing::error!(
                            path = %path.display(),
                            error = %e,
                            "file node write failed"
                        );
                        callback(Err(e.into()));
                        break;
                    }
                }
            }
            else => break,
        }
    }
}

async fn append_line(file: &mut File, data: &[u8]) -> std::io::Result<()> {
    let mut line = Vec::with_capacity(data.len() + 1);
    line.extend_from_slice(data);
    line.push(b'\n');
    file.write_all(&line).await?;
    file.sync_data().await
}
