//! peerhub Node - Utility nodes driven by write/stop handles
//!
//! Each node owns the consumer side of its queues and is launched with
//! `spawn`, which returns the handle producers talk to:
//! - [`FileNode`]: append each write as a line and sync it to disk
//! - [`StdioNode`]: print writes to stdout, optionally feed stdin lines to a handler
//! - [`TailNode`]: follow a file from its end, one callback per new line
//! - [`Ticker`]: fixed-interval callback
//! - [`PeerNode`]: forward writes to a registered peer

pub mod line;
pub mod file;
pub mod stdio;
pub mod tail;
pub mod ticker;
pub mod peer_node;

pub use line::*;
pub use file::*;
pub use stdio::*;
pub use tail::*;
pub use ticker::*;
pub use peer_node::*;
