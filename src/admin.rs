//! Offline quest-slot administration
//!
//! Edits the quest slots of a player who is not logged in. The edit is
//! checked and applied to a copy of the stored slots; the record is only
//! written back when every step succeeded.

use std::collections::HashMap;
use dashmap::{DashMap, DashSet};
use tracing::{info, warn};

use crate::error::AdminError;
use crate::services::PlayerId;
use crate::slot::{QuestSlotView, FIELD_DELIMITER};

type AdminResult<T> = std::result::Result<T, AdminError>;

/// Persistent player records, as seen by administration tools
pub trait PlayerRecords: Send + Sync {
    fn is_online(&self, player: &PlayerId) -> bool;

    fn exists(&self, player: &PlayerId) -> bool;

    fn load_slots(&self, player: &PlayerId) -> AdminResult<HashMap<String, String>>;

    fn store_slots(&self, player: &PlayerId, slots: HashMap<String, String>) -> AdminResult<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotEdit {
    Set { slot: String, value: String },
    SetField { slot: String, index: usize, value: String },
    Remove { slot: String },
}

impl SlotEdit {
    pub fn slot(&self) -> &str {
        match self {
            SlotEdit::Set { slot, .. } | SlotEdit::SetField { slot, .. } | SlotEdit::Remove { slot } => slot,
        }
    }
}

const USAGE: &str = "<player> set <slot> <value> | <player> setfield <slot> <index> <value> | <player> remove <slot>";

/// One administrator request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfflineQuestEdit {
    pub player: PlayerId,
    pub edit: SlotEdit,
}

impl OfflineQuestEdit {
    pub fn new(player: impl Into<String>, edit: SlotEdit) -> Self {
        Self {
            player: PlayerId::new(player),
            edit,
        }
    }

    /// Parse whitespace-separated arguments. Values may contain spaces.
    pub fn parse(args: &str) -> AdminResult<Self> {
        let usage = || AdminError::Usage(USAGE.to_string());
        let mut words = args.split_whitespace();
        let player = words.next().ok_or_else(usage)?;
        let command = words.next().ok_or_else(usage)?.to_lowercase();
        let slot = words.next().ok_or_else(usage)?.to_string();

        let edit = match command.as_str() {
            "set" => SlotEdit::Set {
                slot,
                value: rest(words).ok_or_else(usage)?,
            },
            "setfield" => {
                let index = words
                    .next()
                    .and_then(|i| i.parse().ok())
                    .ok_or_else(usage)?;
                SlotEdit::SetField {
                    slot,
                    index,
                    value: rest(words).unwrap_or_default(),
                }
            }
            "remove" => SlotEdit::Remove { slot },
            _ => return Err(usage()),
        };
        Ok(Self::new(player, edit))
    }

    fn validate(&self) -> AdminResult<()> {
        let slot = self.edit.slot();
        if self.player.as_str().is_empty() || slot.is_empty() || slot.contains(FIELD_DELIMITER) {
            return Err(AdminError::Usage(USAGE.to_string()));
        }
        Ok(())
    }

    /// Run the edit and describe what changed
    pub fn apply(&self, records: &dyn PlayerRecords) -> AdminResult<String> {
        self.validate()?;
        let player = &self.player;
        if records.is_online(player) {
            return Err(AdminError::Online(player.to_string()));
        }
        if !records.exists(player) {
            return Err(AdminError::UnknownPlayer(player.to_string()));
        }

        let mut slots = records.load_slots(player)?;
        let slot = self.edit.slot().to_string();
        let before = slots.get(&slot).cloned();
        let after = self.process(before.as_deref())?;
        match &after {
            Some(value) => slots.insert(slot.clone(), value.clone()),
            None => slots.remove(&slot),
        };

        if let Err(e) = records.store_slots(player, slots) {
            warn!("Offline edit of {} for {} not stored: {}", slot, player, e);
            return Err(e);
        }

        info!("Offline edit of {} for {}: {:?} -> {:?}", slot, player, before, after);
        Ok(format!(
            "Changed quest slot '{}' of {} from {} to {}.",
            slot,
            player,
            describe(before.as_deref()),
            describe(after.as_deref())
        ))
    }

    fn process(&self, current: Option<&str>) -> AdminResult<Option<String>> {
        let slot_error = |source| AdminError::Slot {
            slot: self.edit.slot().to_string(),
            source,
        };
        match &self.edit {
            SlotEdit::Set { value, .. } => {
                QuestSlotView::parse(value).map_err(slot_error)?;
                Ok(Some(value.clone()))
            }
            SlotEdit::SetField { index, value, .. } => {
                let mut view = QuestSlotView::from_stored(current).map_err(slot_error)?;
                view.set_field(*index, value).map_err(slot_error)?;
                Ok(Some(view.encode()))
            }
            SlotEdit::Remove { .. } => Ok(None),
        }
    }
}

fn rest<'a>(words: impl Iterator<Item = &'a str>) -> Option<String> {
    let rest = words.collect::<Vec<_>>().join(" ");
    (!rest.is_empty()).then_some(rest)
}

fn describe(value: Option<&str>) -> String {
    match value {
        Some(v) => format!("'{}'", v),
        None => "nothing".to_string(),
    }
}

// ============================================================================
// In-memory records
// ============================================================================

/// Player records kept in memory, for tests and the console driver
#[derive(Debug, Default)]
pub struct MemoryPlayerRecords {
    records: DashMap<PlayerId, HashMap<String, String>>,
    online: DashSet<PlayerId>,
}

impl MemoryPlayerRecords {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, player: PlayerId, slots: HashMap<String, String>) {
        self.records.insert(player, slots);
    }

    pub fn set_online(&self, player: &PlayerId, online: bool) {
        if online {
            self.online.insert(player.clone());
        } else {
            self.online.remove(player);
        }
    }

    pub fn slots(&self, player: &PlayerId) -> Option<HashMap<String, String>> {
        self.records.get(player).map(|r| r.clone())
    }
}

impl PlayerRecords for MemoryPlayerRecords {
    fn is_online(&self, player: &PlayerId) -> bool {
        self.online.contains(player)
    }

    fn exists(&self, player: &PlayerId) -> bool {
        self.records.contains_key(player)
    }

    fn load_slots(&self, player: &PlayerId) -> AdminResult<HashMap<String, String>> {
        self.slots(player)
            .ok_or_else(|| AdminError::UnknownPlayer(player.to_string()))
    }

    fn store_slots(&self, player: &PlayerId, slots: HashMap<String, String>) -> AdminResult<()> {
        self.records.insert(player.clone(), slots);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SlotError;

    fn records() -> MemoryPlayerRecords {
        let records = MemoryPlayerRecords::new();
        let slots = HashMap::from([("daily_item".to_string(), "done;28401120;3".to_string())]);
        records.insert(PlayerId::new("bob"), slots);
        records
    }

    /// Refuses every write
    struct ReadOnly(MemoryPlayerRecords);

    impl PlayerRecords for ReadOnly {
        fn is_online(&self, player: &PlayerId) -> bool {
            self.0.is_online(player)
        }
        fn exists(&self, player: &PlayerId) -> bool {
            self.0.exists(player)
        }
        fn load_slots(&self, player: &PlayerId) -> AdminResult<HashMap<String, String>> {
            self.0.load_slots(player)
        }
        fn store_slots(&self, _: &PlayerId, _: HashMap<String, String>) -> AdminResult<()> {
            Err(AdminError::Records("read-only".to_string()))
        }
    }

    #[test]
    fn test_parse() {
        let edit = OfflineQuestEdit::parse("bob set herbs_for_carmen arandula=5;wood=2").unwrap();
        assert_eq!(
            edit.edit,
            SlotEdit::Set { slot: "herbs_for_carmen".into(), value: "arandula=5;wood=2".into() }
        );
        let edit = OfflineQuestEdit::parse("bob setfield daily_item 2 7").unwrap();
        assert_eq!(edit.edit, SlotEdit::SetField { slot: "daily_item".into(), index: 2, value: "7".into() });
        assert!(matches!(OfflineQuestEdit::parse("bob setfield daily_item x 7"), Err(AdminError::Usage(_))));
        assert!(matches!(OfflineQuestEdit::parse("bob frobnicate x"), Err(AdminError::Usage(_))));
        assert!(OfflineQuestEdit::parse("bob").is_err());
    }

    #[test]
    fn test_set_field_on_offline_player() {
        let records = records();
        let report = OfflineQuestEdit::parse("bob setfield daily_item 2 7")
            .unwrap()
            .apply(&records)
            .unwrap();
        assert_eq!(report, "Changed quest slot 'daily_item' of bob from 'done;28401120;3' to 'done;28401120;7'.");

        OfflineQuestEdit::parse("bob remove daily_item").unwrap().apply(&records).unwrap();
        assert!(records.slots(&PlayerId::new("bob")).unwrap().is_empty());
    }

    #[test]
    fn test_refusals_leave_record_unchanged() {
        let records = records();
        let bob = PlayerId::new("bob");
        let before = records.slots(&bob);

        records.set_online(&bob, true);
        let edit = OfflineQuestEdit::parse("bob set daily_item rejected").unwrap();
        assert!(matches!(edit.apply(&records), Err(AdminError::Online(_))));
        records.set_online(&bob, false);

        let edit = OfflineQuestEdit::parse("carol set daily_item rejected").unwrap();
        assert!(matches!(edit.apply(&records), Err(AdminError::UnknownPlayer(_))));

        let edit = OfflineQuestEdit::new("bob", SlotEdit::SetField {
            slot: "daily_item".into(),
            index: 1,
            value: "a;b".into(),
        });
        assert!(matches!(
            edit.apply(&records),
            Err(AdminError::Slot { source: SlotError::Delimiter(_), .. })
        ));

        assert_eq!(records.slots(&bob), before);

        let read_only = ReadOnly(records);
        let edit = OfflineQuestEdit::parse("bob set daily_item done").unwrap();
        assert!(matches!(edit.apply(&read_only), Err(AdminError::Records(_))));
        assert_eq!(read_only.0.slots(&bob), before);
    }
}
