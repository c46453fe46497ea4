//! Error types for peerhub

use thiserror::Error;

use crate::{PeerId, TargetId};

/// Core peerhub errors
#[derive(Error, Debug)]
pub enum PeerError {
    // Registry errors
    #[error("Peer not found: {0}")]
    NotFound(PeerId),

    #[error("Broadcast target not found: {0}")]
    TargetNotFound(TargetId),

    // Lifecycle errors
    #[error("Peer already closed")]
    AlreadyClosed,

    #[error("Operation timed out")]
    Timeout,

    #[error("Missing component: {0}")]
    MissingComponent(&'static str),

    // Transport errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Transport error: {0}")]
    Transport(String),

    // Application errors
    #[error("Handler error: {0}")]
    Handler(String),
}

impl PeerError {
    /// Wrap an application handler failure
    pub fn handler(msg: impl Into<String>) -> Self {
        PeerError::Handler(msg.into())
    }

    /// True for errors that mean the other side is gone for good
    pub fn is_closed(&self) -> bool {
        matches!(self, PeerError::AlreadyClosed | PeerError::NotFound(_))
    }
}

/// Result type for peerhub operations
pub type PeerResult<T> = Result<T, PeerError>;
