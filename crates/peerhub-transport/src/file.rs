//! Append-only file persistence peer

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use peerhub_core::{Peer, PeerError, PeerId, PeerIdentity, PeerResult};

/// Every write is appended as-is and synced to disk before it returns.
/// The peer has no read side; `start` returns immediately.
pub struct FilePeer {
    identity: PeerIdentity,
    path: PathBuf,
    /// `None` once closed
    file: Mutex<Option<File>>,
}

impl FilePeer {
    /// Open (creating if needed) `path` for appending
    pub async fn open(path: impl AsRef<Path>) -> PeerResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path).await?;
        Ok(FilePeer {
            identity: PeerIdentity::new("file"),
            path,
            file: Mutex::new(Some(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Peer for FilePeer {
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
        let mut file = self.file.lock().await;
        let file = file.as_mut().ok_or(PeerError::AlreadyClosed)?;
        file.write_all(&data).await?;
        file.sync_data().await?;
        Ok(())
    }

    async fn close(&self) -> PeerResult<()> {
        let mut file = self.file.lock().await.take().ok_or(PeerError::AlreadyClosed)?;
        file.flush().await?;
        tracing::debug!(peer_id = %self.id(), path = %self.path.display(), "file peer closed");
        Ok(())
    }

    async fn start(&self) {}
}
