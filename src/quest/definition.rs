//! Quest Definitions
//!
//! A quest is content: it registers rules on NPCs and answers questions
//! about a player's progress. [`QuestDefinition`] is the seam the registry
//! loads through; data-driven quests implement it in `scripted`.

use serde::Serialize;

use crate::engine::Rule;
use crate::error::Result;
use crate::script::EvaluationContext;
use crate::slot::QuestSlotStore;

/// Registry metadata of a loaded quest
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuestInfo {
    pub name: String,
    pub title: String,
    pub description: String,
    pub slot: String,
    pub min_level: u32,
    pub region: Option<String>,
    pub npc: Option<String>,
    /// Whether the quest can be done more than once
    pub repeatable: bool,
}

/// Collects the rules a quest wants to register, keyed by NPC name
#[derive(Debug)]
pub struct QuestSetup {
    quest: String,
    slot: String,
    rules: Vec<(String, Rule)>,
}

impl QuestSetup {
    pub fn new(quest: &str, slot: &str) -> Self {
        Self {
            quest: quest.to_string(),
            slot: slot.to_string(),
            rules: Vec::new(),
        }
    }

    /// Queue a rule for `npc`, tagged with this quest as owner
    pub fn add_rule(&mut self, npc: &str, rule: Rule) {
        let rule = rule.owned_by(&self.quest, &self.slot);
        self.rules.push((npc.to_string(), rule));
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// NPC names in first-use order
    pub fn npc_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for (npc, _) in &self.rules {
            if !names.contains(&npc.as_str()) {
                names.push(npc);
            }
        }
        names
    }

    pub fn into_rules(self) -> Vec<(String, Rule)> {
        self.rules
    }
}

pub trait QuestDefinition: Send + Sync {
    /// Unique quest name, used for loading and unloading
    fn name(&self) -> &str;

    /// Slot the quest keeps its progress in
    fn slot_name(&self) -> &str;

    fn title(&self) -> &str {
        self.name()
    }

    fn description(&self) -> &str {
        ""
    }

    fn min_level(&self) -> u32 {
        0
    }

    fn region(&self) -> Option<&str> {
        None
    }

    /// NPC that gives the quest
    fn npc_name(&self) -> Option<&str> {
        None
    }

    /// Whether the quest can ever be done again after completion
    fn has_repetitions(&self) -> bool {
        false
    }

    /// Register this quest's rules
    fn add_to_world(&self, setup: &mut QuestSetup) -> Result<()>;

    /// Whether the player may do the quest again right now
    fn is_repeatable(&self, _ctx: &EvaluationContext<'_>) -> bool {
        false
    }

    fn is_completed(&self, ctx: &EvaluationContext<'_>) -> bool {
        ctx.services.slots.is_completed(ctx.player, self.slot_name())
    }

    /// Narrative of the player's progress, oldest first
    fn history(&self, _ctx: &EvaluationContext<'_>) -> Vec<String> {
        Vec::new()
    }

    fn info(&self) -> QuestInfo {
        QuestInfo {
            name: self.name().to_string(),
            title: self.title().to_string(),
            description: self.description().to_string(),
            slot: self.slot_name().to_string(),
            min_level: self.min_level(),
            region: self.region().map(str::to_string),
            npc: self.npc_name().map(str::to_string),
            repeatable: self.has_repetitions(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Triggers;
    use crate::state::ConversationState;

    #[test]
    fn test_setup_tags_rules() {
        let mut setup = QuestSetup::new("ElfPrincess", "elf_princess");
        let rule = |triggers: &[&str]| {
            Rule::new(ConversationState::Attending, Triggers::new(triggers.iter().copied()), ConversationState::Attending)
        };
        setup.add_rule("Tywysoga", rule(&["@quest"]));
        setup.add_rule("Rose Leigh", rule(&["@greeting"]));
        setup.add_rule("Tywysoga", rule(&["flower"]));

        assert_eq!(setup.npc_names(), vec!["Tywysoga", "Rose Leigh"]);
        let rules = setup.into_rules();
        assert_eq!(rules.len(), 3);
        assert!(rules.iter().all(|(_, r)| r.is_owned_by("ElfPrincess")));
        assert_eq!(rules[0].1.slot(), Some("elf_princess"));
    }
}
