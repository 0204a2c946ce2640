//! Shared fixtures for unit tests

use std::sync::Arc;

use crate::script::{EvaluationContext, Extensions};
use crate::sentence::Sentence;
use crate::services::{MemoryInventory, MemoryStats, PlayerId, Services};
use crate::slot::MemorySlotStore;
use crate::time::FixedClock;

/// Minutes since epoch the fixed clock starts at (2024-01-01)
pub const START_MINUTES: u64 = 28_401_120;

/// In-memory collaborators, kept typed so tests can seed them
pub struct Harness {
    pub player: PlayerId,
    pub slots: Arc<MemorySlotStore>,
    pub inventory: Arc<MemoryInventory>,
    pub stats: Arc<MemoryStats>,
    pub clock: Arc<FixedClock>,
    pub services: Services,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_capacity(8)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let slots = Arc::new(MemorySlotStore::new());
        let inventory = Arc::new(MemoryInventory::new(capacity));
        let stats = Arc::new(MemoryStats::new());
        let clock = Arc::new(FixedClock::new(START_MINUTES));
        let services = Services::new(slots.clone(), inventory.clone(), stats.clone(), clock.clone());
        Self {
            player: PlayerId::new("alice"),
            slots,
            inventory,
            stats,
            clock,
            services,
        }
    }

    pub fn context<'a>(
        &'a self,
        sentence: &'a Sentence,
        extensions: &'a Extensions,
    ) -> EvaluationContext<'a> {
        EvaluationContext::new(&self.player, sentence, &self.services, extensions)
    }
}
