//! Registry lifecycle hooks
//!
//! One slot per event; registering again replaces the previous hook.

use std::sync::Arc;

use peerhub_core::{PeerId, PeerRef};

use crate::PeerRegistry;

/// Lifecycle points at which the registry calls out to the application
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RegistryEvent {
    /// Id assigned, peer not yet visible and not yet started
    BeforeAdd,
    /// Peer visible in the registry and its read loop launched
    AfterAdd,
    /// Removal requested, peer (if any) still registered
    BeforeRemove,
    /// Removal finished; the registry lock has been released
    AfterRemove,
}

impl RegistryEvent {
    pub const ALL: [RegistryEvent; 4] = [
        RegistryEvent::BeforeAdd,
        RegistryEvent::AfterAdd,
        RegistryEvent::BeforeRemove,
        RegistryEvent::AfterRemove,
    ];

    fn slot(self) -> usize {
        match self {
            RegistryEvent::BeforeAdd => 0,
            RegistryEvent::AfterAdd => 1,
            RegistryEvent::BeforeRemove => 2,
            RegistryEvent::AfterRemove => 3,
        }
    }
}

/// What a hook gets to see. Hooks always run outside the registry lock.
pub struct HookContext<'a> {
    pub event: RegistryEvent,
    pub peer_id: PeerId,
    /// The peer being added; `None` for remove events
    pub peer: Option<&'a PeerRef>,
    pub registry: &'a PeerRegistry,
}

pub type RegistryHook = Arc<dyn Fn(&HookContext<'_>) + Send + Sync>;

/// Hook slots keyed by [`RegistryEvent`]
#[derive(Default, Clone)]
pub struct HookTable {
    slots: [Option<RegistryHook>; 4],
}

impl HookTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, event: RegistryEvent, hook: RegistryHook) {
        self.slots[event.slot()] = Some(hook);
    }

    pub fn clear(&mut self, event: RegistryEvent) {
        self.slots[event.slot()] = None;
    }

    pub fn get(&self, event: RegistryEvent) -> Option<RegistryHook> {
        self.slots[event.slot()].clone()
    }
}
