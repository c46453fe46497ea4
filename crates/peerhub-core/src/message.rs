//! Messages produced by peer read loops

use std::time::SystemTime;

use bytes::Bytes;

use crate::PeerId;

/// A chunk of data received from a peer, stamped at acceptance time
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeerMessage {
    peer_id: PeerId,
    data: Bytes,
    time: SystemTime,
}

impl PeerMessage {
    /// Create a message stamped with the current wall-clock time
    pub fn new(peer_id: PeerId, data: impl Into<Bytes>) -> Self {
        Self::with_time(peer_id, data, SystemTime::now())
    }

    pub fn with_time(peer_id: PeerId, data: impl Into<Bytes>, time: SystemTime) -> Self {
        PeerMessage {
            peer_id,
            data: data.into(),
            time,
        }
    }

    /// Sender of this message
    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Receipt timestamp
    pub fn time(&self) -> SystemTime {
        self.time
    }

    /// Replace the payload. Only pre-dispatch hooks get mutable access.
    pub fn set_data(&mut self, data: impl Into<Bytes>) {
        self.data = data.into();
    }

    pub fn into_data(self) -> Bytes {
        self.data
    }
}
