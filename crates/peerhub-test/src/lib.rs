//! peerhub Test Harness - Scenario testing across crates
//!
//! This crate provides:
//! - [`ChannelPeer`]: an in-memory peer with a scriptable remote end
//! - Polling helpers for asynchronous assertions
//! - End-to-end scenarios over every dispatch discipline, the broadcaster
//!   and the TCP transport

pub mod channel_peer;
pub mod integration;

pub use channel_peer::*;
pub use integration::*;
