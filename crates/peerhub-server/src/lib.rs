//! peerhub Server - Peer registry and dispatch disciplines
//!
//! Every server owns a [`PeerRegistry`] (id allocation, lifecycle hooks,
//! shutdown drain) and differs only in how received messages reach the
//! application:
//! - [`EventDrivenServer`]: handler runs immediately on the sending peer's task
//! - [`FifoServer`]: one dispatch loop, global total order across peers
//! - [`LockstepServer`]: messages batched per fixed-length step

pub mod hooks;
pub mod registry;
pub mod event_driven;
pub mod fifo;
pub mod lockstep;
pub mod config;

#[cfg(test)]
pub(crate) mod testing;

pub use hooks::*;
pub use registry::*;
pub use event_driven::*;
pub use fifo::*;
pub use lockstep::*;
pub use config::*;
