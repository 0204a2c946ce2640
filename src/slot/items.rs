//! Item Requirement Sets
//!
//! Fetch quests remember what is still owed as `name=qty;name=qty` inside a
//! quest slot. This module decodes that text into an ordered collection,
//! tracks deliveries against it and encodes it back.

use tracing::debug;

const ENTRY_DELIMITER: char = ';';
const QUANTITY_DELIMITER: char = '=';

/// Ordered mapping of item name to outstanding quantity (always >= 1)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemRequirementSet {
    entries: Vec<(String, u32)>,
}

impl ItemRequirementSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a slot encoding.
    ///
    /// Segments that are not `name=positive-integer` are skipped; repeated
    /// names accumulate. Never fails.
    pub fn from_encoded(encoded: &str) -> Self {
        let mut set = Self::new();
        for segment in encoded.split(ENTRY_DELIMITER) {
            match parse_segment(segment) {
                Some((name, quantity)) => set.add(name, quantity),
                None => {
                    if !segment.is_empty() {
                        debug!("Skipping malformed item requirement segment '{}'", segment);
                    }
                }
            }
        }
        set
    }

    pub fn to_encoded(&self) -> String {
        self.entries
            .iter()
            .map(|(name, qty)| format!("{}{}{}", name, QUANTITY_DELIMITER, qty))
            .collect::<Vec<_>>()
            .join(&ENTRY_DELIMITER.to_string())
    }

    /// Add to a requirement; zero quantities are ignored and totals
    /// saturate at `u32::MAX`
    pub fn add(&mut self, name: &str, quantity: u32) {
        if quantity == 0 || name.is_empty() {
            return;
        }
        match self.entries.iter_mut().find(|(n, _)| n == name) {
            Some((_, existing)) => *existing = existing.saturating_add(quantity),
            None => self.entries.push((name.to_string(), quantity)),
        }
    }

    /// Reduce a requirement, dropping it once nothing is owed.
    /// Returns how much was actually removed.
    pub fn remove(&mut self, name: &str, quantity: u32) -> u32 {
        let Some(pos) = self.entries.iter().position(|(n, _)| n == name) else {
            return 0;
        };
        let owed = self.entries[pos].1;
        let removed = owed.min(quantity);
        if removed == owed {
            self.entries.remove(pos);
        } else {
            self.entries[pos].1 -= removed;
        }
        removed
    }

    pub fn quantity(&self, name: &str) -> u32 {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, q)| *q)
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when `has` reports enough of every required item
    pub fn is_satisfied<F>(&self, mut has: F) -> bool
    where
        F: FnMut(&str, u32) -> bool,
    {
        self.entries.iter().all(|(name, qty)| has(name, *qty))
    }

    /// Outstanding items in insertion order
    pub fn missing(&self) -> impl Iterator<Item = (&str, u32)> {
        self.entries.iter().map(|(n, q)| (n.as_str(), *q))
    }

    /// First outstanding item, used for `[item]` placeholders
    pub fn first(&self) -> Option<(&str, u32)> {
        self.missing().next()
    }

    /// Human-readable list: "5 arandula, 1 porcini, and 2 wood"
    pub fn display_list(&self) -> String {
        let parts: Vec<String> = self
            .missing()
            .map(|(name, qty)| format!("{} {}", qty, name))
            .collect();
        match parts.len() {
            0 => String::new(),
            1 => parts[0].clone(),
            2 => format!("{} and {}", parts[0], parts[1]),
            n => format!("{}, and {}", parts[..n - 1].join(", "), parts[n - 1]),
        }
    }
}

fn parse_segment(segment: &str) -> Option<(&str, u32)> {
    let (name, qty) = segment.split_once(QUANTITY_DELIMITER)?;
    let name = name.trim();
    let qty: u32 = qty.trim().parse().ok()?;
    if name.is_empty() || qty == 0 {
        return None;
    }
    Some((name, qty))
}

/// Parse a single `name=qty` field, as recorded by random item fetch quests
pub fn parse_recorded_item(field: &str) -> Option<(String, u32)> {
    parse_segment(field).map(|(n, q)| (n.to_string(), q))
}
