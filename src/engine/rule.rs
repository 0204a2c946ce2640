//! Conversation rules
//!
//! A rule fires when the NPC is in its source state for this player, the
//! utterance starts with one of its trigger phrases, and its condition (if
//! any) holds. Rules never change after registration.

use crate::script::{Action, Condition};
use crate::sentence::{normalize, phrases, Sentence};
use crate::state::ConversationState;

/// Trigger phrases of one rule. Every phrase has the same priority.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Triggers {
    phrases: Vec<String>,
}

impl Triggers {
    /// Build from literal phrases and `@name` shorthands
    pub fn new<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut triggers = Self::default();
        for item in items {
            let item = item.as_ref().trim();
            match phrases::shorthand(item) {
                Some(set) => set.iter().for_each(|p| triggers.push(p)),
                None => triggers.push(item),
            }
        }
        triggers
    }

    fn push(&mut self, phrase: &str) {
        let phrase = normalize(phrase);
        if !phrase.is_empty() && !self.phrases.contains(&phrase) {
            self.phrases.push(phrase);
        }
    }

    pub fn phrases(&self) -> &[String] {
        &self.phrases
    }

    pub fn is_empty(&self) -> bool {
        self.phrases.is_empty()
    }

    pub fn matches(&self, sentence: &Sentence) -> bool {
        self.phrases.iter().any(|p| sentence.starts_with_phrase(p))
    }
}

impl From<&[&str]> for Triggers {
    fn from(items: &[&str]) -> Self {
        Triggers::new(items.iter().copied())
    }
}

/// Quest a rule was registered by
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleOwner {
    pub quest: String,
    pub slot: String,
}

#[derive(Debug, Clone)]
pub struct Rule {
    pub source: ConversationState,
    pub triggers: Triggers,
    pub condition: Option<Condition>,
    pub target: ConversationState,
    pub reply: Option<String>,
    pub action: Option<Action>,
    owner: Option<RuleOwner>,
}

impl Rule {
    pub fn new(
        source: ConversationState,
        triggers: impl Into<Triggers>,
        target: ConversationState,
    ) -> Self {
        Self {
            source,
            triggers: triggers.into(),
            condition: None,
            target,
            reply: None,
            action: None,
            owner: None,
        }
    }

    pub fn with_condition(mut self, condition: impl Into<Condition>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    pub fn with_reply(mut self, reply: impl Into<String>) -> Self {
        self.reply = Some(reply.into());
        self
    }

    pub fn with_action(mut self, action: impl Into<Action>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn owned_by(mut self, quest: &str, slot: &str) -> Self {
        self.owner = Some(RuleOwner {
            quest: quest.to_string(),
            slot: slot.to_string(),
        });
        self
    }

    pub fn owner(&self) -> Option<&RuleOwner> {
        self.owner.as_ref()
    }

    pub fn is_owned_by(&self, quest: &str) -> bool {
        self.owner.as_ref().is_some_and(|o| o.quest == quest)
    }

    /// Slot placeholders and slot-less leaves resolve against
    pub fn slot(&self) -> Option<&str> {
        self.owner.as_ref().map(|o| o.slot.as_str())
    }

    /// Source state and trigger check; the condition is evaluated separately
    pub fn applies(&self, current: ConversationState, sentence: &Sentence) -> bool {
        self.source.accepts(current) && self.triggers.matches(sentence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_triggers_expand_shorthand() {
        let t = Triggers::new(["@yes", "Button Mushroom", "yes"]);
        assert!(t.phrases().contains(&"ok".to_string()));
        assert!(t.phrases().contains(&"button mushroom".to_string()));
        assert_eq!(t.phrases().iter().filter(|p| *p == "yes").count(), 1);
    }

    #[test]
    fn test_synonyms_match_equally() {
        let t = Triggers::new(["porcini", "porcino", "porcinis"]);
        assert!(t.matches(&Sentence::parse("porcino")));
        assert!(t.matches(&Sentence::parse("Porcinis!")));
        assert!(!t.matches(&Sentence::parse("porc")));
    }

    #[test]
    fn test_applies() {
        let goodbye = Triggers::new(["@goodbye"]);
        let rule = Rule::new(ConversationState::Any, goodbye, ConversationState::Idle)
            .owned_by("HerbsForCarmen", "herbs_for_carmen");
        assert!(rule.applies(ConversationState::Question2, &Sentence::parse("bye")));
        assert!(!rule.applies(ConversationState::Attending, &Sentence::parse("hello")));
        assert_eq!(rule.slot(), Some("herbs_for_carmen"));
        assert!(rule.is_owned_by("HerbsForCarmen"));
    }
}
