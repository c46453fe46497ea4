//! peerhub Core - Fundamental types and contracts
//!
//! This crate defines the types shared by every peerhub crate:
//! - Identifiers (PeerId, TargetId)
//! - Peer messages
//! - The peer and server capability contracts
//! - The error taxonomy

pub mod id;
pub mod error;
pub mod message;
pub mod peer;
pub mod server;

pub use id::*;
pub use error::*;
pub use message::*;
pub use peer::*;
pub use server::*;
