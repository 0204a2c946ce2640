//! Player-facing collaborators
//!
//! The engine never owns player records. It talks to inventory, stats,
//! quest-slot persistence and the clock through the traits bundled in
//! [`Services`]. In-memory implementations back the console driver and tests.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::ActionError;
use crate::slot::QuestSlotStore;
use crate::time::Clock;

/// Maximum player level
pub const MAX_LEVEL: u32 = 99;

/// Stable identifier of a player character
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlayerId(String);

impl PlayerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlayerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Items carried by players
pub trait Inventory: Send + Sync {
    fn count(&self, player: &PlayerId, item: &str) -> u32;

    fn can_equip(&self, player: &PlayerId, item: &str, quantity: u32) -> bool;

    /// Give items; fails without side effects when there is no room
    fn equip(&self, player: &PlayerId, item: &str, quantity: u32) -> Result<(), ActionError>;

    /// Take items; fails without side effects when the player has too few
    fn drop_items(&self, player: &PlayerId, item: &str, quantity: u32) -> Result<(), ActionError>;

    fn is_equipped(&self, player: &PlayerId, item: &str, quantity: u32) -> bool {
        self.count(player, item) >= quantity
    }
}

/// Level, experience and karma
pub trait PlayerStats: Send + Sync {
    fn level(&self, player: &PlayerId) -> u32;

    /// Experience still needed to reach the next level
    fn xp_to_next_level(&self, player: &PlayerId) -> u64;

    fn add_xp(&self, player: &PlayerId, amount: u64);

    fn karma(&self, player: &PlayerId) -> f64;

    fn add_karma(&self, player: &PlayerId, amount: f64);
}

/// Everything conditions and actions may consult or mutate
#[derive(Clone)]
pub struct Services {
    pub slots: Arc<dyn QuestSlotStore>,
    pub inventory: Arc<dyn Inventory>,
    pub stats: Arc<dyn PlayerStats>,
    pub clock: Arc<dyn Clock>,
}

impl Services {
    pub fn new(
        slots: Arc<dyn QuestSlotStore>,
        inventory: Arc<dyn Inventory>,
        stats: Arc<dyn PlayerStats>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            slots,
            inventory,
            stats,
            clock,
        }
    }
}

// ============================================================================
// In-memory inventory
// ============================================================================

/// Per-player item stacks with a cap on distinct stacks
pub struct MemoryInventory {
    bags: DashMap<PlayerId, HashMap<String, u32>>,
    capacity: usize,
}

impl MemoryInventory {
    pub fn new(capacity: usize) -> Self {
        Self {
            bags: DashMap::new(),
            capacity,
        }
    }

    /// Distinct stacks a player is carrying
    pub fn stacks(&self, player: &PlayerId) -> usize {
        self.bags.get(player).map(|bag| bag.len()).unwrap_or(0)
    }
}

impl Inventory for MemoryInventory {
    fn count(&self, player: &PlayerId, item: &str) -> u32 {
        self.bags
            .get(player)
            .and_then(|bag| bag.get(item).copied())
            .unwrap_or(0)
    }

    fn can_equip(&self, player: &PlayerId, item: &str, quantity: u32) -> bool {
        if quantity == 0 {
            return true;
        }
        match self.bags.get(player) {
            Some(bag) => bag.contains_key(item) || bag.len() < self.capacity,
            None => self.capacity > 0,
        }
    }

    fn equip(&self, player: &PlayerId, item: &str, quantity: u32) -> Result<(), ActionError> {
        if quantity == 0 {
            return Ok(());
        }
        let mut bag = self.bags.entry(player.clone()).or_default();
        if !bag.contains_key(item) && bag.len() >= self.capacity {
            return Err(ActionError::InventoryFull {
                item: item.to_string(),
                quantity,
            });
        }
        let held = bag.entry(item.to_string()).or_insert(0);
        *held = held.saturating_add(quantity);
        Ok(())
    }

    fn drop_items(&self, player: &PlayerId, item: &str, quantity: u32) -> Result<(), ActionError> {
        let missing = || ActionError::MissingItem {
            item: item.to_string(),
            quantity,
        };
        let mut bag = self.bags.get_mut(player).ok_or_else(missing)?;
        let held = bag.get(item).copied().unwrap_or(0);
        if held < quantity {
            return Err(missing());
        }
        if held == quantity {
            bag.remove(item);
        } else {
            bag.insert(item.to_string(), held - quantity);
        }
        Ok(())
    }
}

// ============================================================================
// In-memory stats
// ============================================================================

/// Total XP required to reach a level.
/// Level 1 = 0 XP, Level 2 = 83 XP, Level 99 = 13,034,431 XP
pub fn total_xp_for_level(level: u32) -> u64 {
    if level <= 1 {
        return 0;
    }
    let mut total = 0.0;
    for l in 1..level {
        total += (l as f64 + 300.0 * 2.0_f64.powf(l as f64 / 7.0)) / 4.0;
    }
    total.floor() as u64
}

/// Level reached with a given XP total (inverse of total_xp_for_level)
pub fn level_for_xp(xp: u64) -> u32 {
    let mut low = 1;
    let mut high = MAX_LEVEL;

    while low < high {
        let mid = (low + high + 1) / 2;
        if total_xp_for_level(mid) <= xp {
            low = mid;
        } else {
            high = mid - 1;
        }
    }
    low
}

#[derive(Debug, Clone, Copy, Default)]
struct StatLine {
    xp: u64,
    karma: f64,
}

/// Stats keyed by player, level derived from XP
#[derive(Default)]
pub struct MemoryStats {
    lines: DashMap<PlayerId, StatLine>,
}

impl MemoryStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset a player's XP to the start of `level`
    pub fn set_level(&self, player: &PlayerId, level: u32) {
        let xp = total_xp_for_level(level.clamp(1, MAX_LEVEL));
        self.lines.entry(player.clone()).or_default().xp = xp;
    }

    pub fn xp(&self, player: &PlayerId) -> u64 {
        self.lines.get(player).map(|l| l.xp).unwrap_or(0)
    }
}

impl PlayerStats for MemoryStats {
    fn level(&self, player: &PlayerId) -> u32 {
        level_for_xp(self.xp(player))
    }

    fn xp_to_next_level(&self, player: &PlayerId) -> u64 {
        let level = self.level(player);
        if level >= MAX_LEVEL {
            return 0;
        }
        total_xp_for_level(level.saturating_add(1)).saturating_sub(self.xp(player))
    }

    fn add_xp(&self, player: &PlayerId, amount: u64) {
        let mut line = self.lines.entry(player.clone()).or_default();
        line.xp = line.xp.saturating_add(amount);
    }

    fn karma(&self, player: &PlayerId) -> f64 {
        self.lines.get(player).map(|l| l.karma).unwrap_or(0.0)
    }

    fn add_karma(&self, player: &PlayerId, amount: f64) {
        self.lines.entry(player.clone()).or_default().karma += amount;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_for_xp() {
        assert_eq!(total_xp_for_level(1), 0);
        assert_eq!(total_xp_for_level(2), 83);
        assert_eq!(level_for_xp(0), 1);
        assert_eq!(level_for_xp(83), 2);
        assert_eq!(level_for_xp(82), 1);
        assert_eq!(level_for_xp(u64::MAX / 2), MAX_LEVEL);
    }

    #[test]
    fn test_stats() {
        let stats = MemoryStats::new();
        let p = PlayerId::new("alice");
        assert_eq!(stats.level(&p), 1);

        stats.set_level(&p, 10);
        assert_eq!(stats.level(&p), 10);
        assert_eq!(stats.xp_to_next_level(&p), total_xp_for_level(11) - total_xp_for_level(10));

        stats.add_karma(&p, 10.0);
        stats.add_karma(&p, -2.5);
        assert_eq!(stats.karma(&p), 7.5);
    }

    #[test]
    fn test_inventory_capacity() {
        let inv = MemoryInventory::new(2);
        let p = PlayerId::new("bob");

        inv.equip(&p, "apple", 3).unwrap();
        inv.equip(&p, "wood", 1).unwrap();
        assert!(inv.can_equip(&p, "apple", 1));
        assert!(!inv.can_equip(&p, "rhosyd", 1));
        assert_eq!(
            inv.equip(&p, "rhosyd", 1),
            Err(ActionError::InventoryFull { item: "rhosyd".to_string(), quantity: 1 })
        );
        assert_eq!(inv.count(&p, "apple"), 3);
    }

    #[test]
    fn test_stack_count_saturates() {
        let inv = MemoryInventory::new(1);
        let p = PlayerId::new("dave");
        inv.equip(&p, "wooden arrow", u32::MAX).unwrap();
        inv.equip(&p, "wooden arrow", 10).unwrap();
        assert_eq!(inv.count(&p, "wooden arrow"), u32::MAX);
    }

    #[test]
    fn test_drop_items() {
        let inv = MemoryInventory::new(5);
        let p = PlayerId::new("carol");
        inv.equip(&p, "apple", 3).unwrap();

        assert!(inv.drop_items(&p, "apple", 4).is_err());
        assert_eq!(inv.count(&p, "apple"), 3);

        inv.drop_items(&p, "apple", 3).unwrap();
        assert_eq!(inv.count(&p, "apple"), 0);
        assert_eq!(inv.stacks(&p), 0);
    }
}
