//! peerhub Broadcast - Fan-out over write/stop handles
//!
//! A [`Broadcaster`] addresses a dynamic set of [`Handle`](peerhub_handle::Handle)s
//! rather than peers. Each target gets its own bounded-time write; a target
//! that fails or times out is evicted on its own without holding back the
//! others.

pub mod config;
pub mod broadcaster;

pub use config::*;
pub use broadcaster::*;
