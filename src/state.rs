//! Conversation States
//!
//! The per-player state an NPC tracks while talking.

use std::fmt;
use std::str::FromStr;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// State of one NPC's conversation with one player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConversationState {
    /// Not talking to this player
    #[default]
    Idle,
    /// Greeted, waiting for a topic
    Attending,
    Question1,
    Question2,
    Question3,
    /// A quest was proposed, waiting for yes/no
    QuestOffered,
    QuestStarted,
    ServiceOffered,
    /// Content-defined states beyond the built-in set
    Custom(u16),
    /// Wildcard: as a rule source it matches every state, as a target it
    /// keeps the current one
    Any,
}

impl ConversationState {
    pub fn as_str(&self) -> String {
        match self {
            ConversationState::Idle => "idle".to_string(),
            ConversationState::Attending => "attending".to_string(),
            ConversationState::Question1 => "question_1".to_string(),
            ConversationState::Question2 => "question_2".to_string(),
            ConversationState::Question3 => "question_3".to_string(),
            ConversationState::QuestOffered => "quest_offered".to_string(),
            ConversationState::QuestStarted => "quest_started".to_string(),
            ConversationState::ServiceOffered => "service_offered".to_string(),
            ConversationState::Custom(n) => format!("custom_{}", n),
            ConversationState::Any => "any".to_string(),
        }
    }

    /// Whether a rule registered for `self` applies while in `current`
    pub fn accepts(&self, current: ConversationState) -> bool {
        *self == ConversationState::Any || *self == current
    }

    /// Resolve a rule target against the state the rule fired in
    pub fn resolve(&self, current: ConversationState) -> ConversationState {
        match self {
            ConversationState::Any => current,
            other => *other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown conversation state '{0}'")]
pub struct UnknownState(pub String);

impl FromStr for ConversationState {
    type Err = UnknownState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let state = match s.trim().to_lowercase().as_str() {
            "idle" => ConversationState::Idle,
            "attending" => ConversationState::Attending,
            "question_1" => ConversationState::Question1,
            "question_2" => ConversationState::Question2,
            "question_3" => ConversationState::Question3,
            "quest_offered" => ConversationState::QuestOffered,
            "quest_started" => ConversationState::QuestStarted,
            "service_offered" => ConversationState::ServiceOffered,
            "any" => ConversationState::Any,
            other => other
                .strip_prefix("custom_")
                .and_then(|n| n.parse().ok())
                .map(ConversationState::Custom)
                .ok_or_else(|| UnknownState(s.to_string()))?,
        };
        Ok(state)
    }
}

impl fmt::Display for ConversationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str())
    }
}

impl Serialize for ConversationState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.as_str())
    }
}

impl<'de> Deserialize<'de> for ConversationState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_parsing() {
        assert_eq!("attending".parse::<ConversationState>(), Ok(ConversationState::Attending));
        assert_eq!("QUESTION_1".parse::<ConversationState>(), Ok(ConversationState::Question1));
        assert_eq!("custom_12".parse::<ConversationState>(), Ok(ConversationState::Custom(12)));
        assert_eq!(
            "custom_x".parse::<ConversationState>(),
            Err(UnknownState("custom_x".to_string()))
        );
        assert!("bogus".parse::<ConversationState>().is_err());
        assert_eq!(ConversationState::Custom(3).as_str(), "custom_3");

        let samples = [
            ConversationState::QuestOffered,
            ConversationState::Custom(7),
            ConversationState::Any,
        ];
        for state in samples {
            assert_eq!(state.to_string().parse::<ConversationState>(), Ok(state));
        }
    }

    #[test]
    fn test_wildcard() {
        let any = ConversationState::Any;
        assert!(any.accepts(ConversationState::Question2));
        assert!(!ConversationState::Idle.accepts(ConversationState::Attending));
        assert_eq!(any.resolve(ConversationState::Question2), ConversationState::Question2);
        assert_eq!(
            ConversationState::Idle.resolve(ConversationState::Attending),
            ConversationState::Idle
        );
    }
}
