//! Broadcaster configuration

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadcasterConfig {
    /// Per-target write budget; 0 waits indefinitely
    pub timeout_ms: u64,
    /// Keep targets whose write failed instead of evicting them
    pub keep_dead_targets: bool,
}
