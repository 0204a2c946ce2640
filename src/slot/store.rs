//! Quest slot persistence
//!
//! [`QuestSlotStore`] is the seam to whatever keeps player records. The
//! provided methods layer the positional field conventions on top of the
//! three raw operations, always through [`QuestSlotView`].

use std::collections::HashMap;
use dashmap::DashMap;
use tracing::warn;

use crate::error::{Result, SlotError};
use crate::services::PlayerId;
use super::view::{QuestSlotView, REPETITIONS_FIELD, STATUS_FIELD};

/// Status tokens after which a quest no longer counts as active
pub const INACTIVE_STATES: &[&str] = &["done", "rejected", "failed"];

pub trait QuestSlotStore: Send + Sync {
    fn get(&self, player: &PlayerId, slot: &str) -> Option<String>;

    /// Overwrite a whole slot; persisted before returning
    fn set(&self, player: &PlayerId, slot: &str, value: &str) -> std::result::Result<(), SlotError>;

    fn remove(&self, player: &PlayerId, slot: &str) -> std::result::Result<(), SlotError>;

    /// Parsed view of a slot. Absent and malformed slots both read as `None`.
    fn view(&self, player: &PlayerId, slot: &str) -> Option<QuestSlotView> {
        let raw = self.get(player, slot)?;
        match QuestSlotView::parse(&raw) {
            Ok(view) => Some(view),
            Err(e) => {
                warn!("Ignoring malformed slot '{}' of {}: {}", slot, player, e);
                None
            }
        }
    }

    fn get_field(&self, player: &PlayerId, slot: &str, index: usize) -> Option<String> {
        self.view(player, slot)
            .and_then(|view| view.field(index).map(str::to_string))
    }

    /// Write one positional field, leaving the others untouched
    fn set_field(
        &self,
        player: &PlayerId,
        slot: &str,
        index: usize,
        value: &str,
    ) -> std::result::Result<(), SlotError> {
        let mut view = QuestSlotView::from_stored(self.get(player, slot).as_deref())?;
        view.set_field(index, value)?;
        self.set(player, slot, &view.encode())
    }

    fn has_quest(&self, player: &PlayerId, slot: &str) -> bool {
        self.get(player, slot).is_some()
    }

    fn is_completed(&self, player: &PlayerId, slot: &str) -> bool {
        self.is_in_state(player, slot, "done")
    }

    fn is_active(&self, player: &PlayerId, slot: &str) -> bool {
        match self.get_field(player, slot, STATUS_FIELD) {
            Some(status) => !INACTIVE_STATES.contains(&status.as_str()),
            None => false,
        }
    }

    fn is_in_state(&self, player: &PlayerId, slot: &str, state: &str) -> bool {
        self.get_field(player, slot, STATUS_FIELD).as_deref() == Some(state)
    }

    /// Repetition counter; 0 when absent or not a number
    fn repetitions(&self, player: &PlayerId, slot: &str) -> u64 {
        self.view(player, slot)
            .and_then(|view| view.field_u64(REPETITIONS_FIELD))
            .unwrap_or(0)
    }
}

/// In-process slot store keyed by player
#[derive(Default)]
pub struct MemorySlotStore {
    players: DashMap<PlayerId, HashMap<String, String>>,
}

impl MemorySlotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All slots of one player
    pub fn slots(&self, player: &PlayerId) -> HashMap<String, String> {
        self.players
            .get(player)
            .map(|slots| slots.clone())
            .unwrap_or_default()
    }

    /// Serialize one player's slots to JSON
    pub fn snapshot(&self, player: &PlayerId) -> Result<String> {
        Ok(serde_json::to_string(&self.slots(player))?)
    }

    /// Replace one player's slots from a JSON snapshot
    pub fn restore(&self, player: &PlayerId, json: &str) -> Result<()> {
        let slots: HashMap<String, String> = serde_json::from_str(json)?;
        self.players.insert(player.clone(), slots);
        Ok(())
    }
}

impl QuestSlotStore for MemorySlotStore {
    fn get(&self, player: &PlayerId, slot: &str) -> Option<String> {
        self.players
            .get(player)
            .and_then(|slots| slots.get(slot).cloned())
    }

    fn set(&self, player: &PlayerId, slot: &str, value: &str) -> std::result::Result<(), SlotError> {
        self.players
            .entry(player.clone())
            .or_default()
            .insert(slot.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, player: &PlayerId, slot: &str) -> std::result::Result<(), SlotError> {
        if let Some(mut slots) = self.players.get_mut(player) {
            slots.remove(slot);
        }
        Ok(())
    }
}
