//! peerhub Transport - Concrete peers
//!
//! This crate provides:
//! - [`BasicPeer`]: a peer assembled from closures
//! - [`SafePeer`]: serializes writes and close of an inner peer
//! - [`BufferPeer`]: queues writes and drains them into an inner peer
//! - [`FilePeer`]: append-only file persistence
//! - [`NetPeer`] over any async byte stream, and [`TcpPeerListener`]

pub mod config;
pub mod basic;
pub mod safe;
pub mod buffer;
pub mod file;
pub mod net;
pub mod listener;

pub use config::*;
pub use basic::*;
pub use safe::*;
pub use buffer::*;
pub use file::*;
pub use net::*;
pub use listener::*;
