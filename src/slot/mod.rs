//! Quest Slot Module
//!
//! Persistent per-player quest progress:
//! - `store`: the persistence seam and an in-memory implementation
//! - `view`: positional `;`-separated field access
//! - `items`: item requirement encodings used by fetch quests

mod items;
mod store;
mod view;

pub use items::{parse_recorded_item, ItemRequirementSet};
pub use store::{MemorySlotStore, QuestSlotStore, INACTIVE_STATES};
pub use view::{
    QuestSlotView, FIELD_DELIMITER, MAX_FIELDS, REPETITIONS_FIELD, STATUS_FIELD, TIMESTAMP_FIELD,
};
