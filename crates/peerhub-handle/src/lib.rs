//! peerhub Handle - Bounded-time write/stop primitive
//!
//! Every I/O node (file writer, stdout echo, transport peer) is driven by a
//! pair of one-way request queues:
//! - a bounded write queue carrying payload + completion callback
//! - a one-shot stop queue carrying a completion callback
//!
//! Each queue is drained by exactly one background consumer owned by the
//! node. A [`Handle`] is the producer side; it gives every backend the same
//! backpressure, timeout, and shutdown semantics.

pub mod payload;
pub mod handle;
pub mod builder;

pub use payload::*;
pub use handle::*;
pub use builder::*;
