//! Transport configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Stream peer settings. Timeouts of 0 disable the deadline.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetPeerConfig {
    /// Read buffer size; one read yields at most this many bytes
    pub buf_size: usize,
    pub read_timeout_ms: u64,
    pub write_timeout_ms: u64,
}

impl NetPeerConfig {
    pub fn read_timeout(&self) -> Option<Duration> {
        (self.read_timeout_ms > 0).then(|| Duration::from_millis(self.read_timeout_ms))
    }

    pub fn write_timeout(&self) -> Option<Duration> {
        (self.write_timeout_ms > 0).then(|| Duration::from_millis(self.write_timeout_ms))
    }
}

impl Default for NetPeerConfig {
    fn default() -> Self {
        NetPeerConfig {
            buf_size: 4096,
            read_timeout_ms: 0,
            write_timeout_ms: 0,
        }
    }
}

/// Write buffer in front of a slower peer
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferPeerConfig {
    /// Queued writes before `write` starts waiting
    pub capacity: usize,
    /// How long `write` waits for queue space
    pub timeout_ms: u64,
}

impl Default for BufferPeerConfig {
    fn default() -> Self {
        BufferPeerConfig {
            capacity: 256,
            timeout_ms: 1000,
        }
    }
}
