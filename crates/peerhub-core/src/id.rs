//! Identity types for peerhub
//!
//! Peer ids are handed out by a registry and reused once freed. Target ids
//! are handed out by a broadcaster and never reused.

use std::fmt;

/// Peer identity - assigned by the registry that owns the peer
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct PeerId(pub u32);

impl PeerId {
    pub const ZERO: PeerId = PeerId(0);

    #[inline]
    pub fn new(id: u32) -> Self {
        PeerId(id)
    }

    #[inline]
    pub fn as_u32(self) -> u32 {
        self.0
    }

    /// The id directly above this one
    #[inline]
    pub fn next(self) -> Self {
        PeerId(self.0 + 1)
    }

    /// Smallest id for which `taken` returns false
    pub fn smallest_free(mut taken: impl FnMut(PeerId) -> bool) -> Self {
        let mut id = PeerId::ZERO;
        while taken(id) {
            id = id.next();
        }
        id
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Peer({})", self.0)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Broadcast target identity
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct TargetId(pub u64);

impl TargetId {
    #[inline]
    pub fn new(id: u64) -> Self {
        TargetId(id)
    }

    #[inline]
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Target({})", self.0)
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonic target id source
/// INVARIANT: never yields the same id twice
#[derive(Debug, Default)]
pub struct TargetIdAllocator {
    next: u64,
}

impl TargetIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> TargetId {
        let id = TargetId(self.next);
        self.next += 1;
        id
    }
}
