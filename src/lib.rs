//! NPC conversation rules and quest-slot state.
//!
//! NPCs own ordered tables of conversation rules. A player's utterance plus
//! the player's quest slots select a rule, which yields a reply, a state
//! transition and side effects on inventory, stats and slots. Quests are
//! content that add rules to NPCs through the [`quest::QuestRegistry`].

pub mod admin;
pub mod config;
pub mod engine;
pub mod error;
pub mod quest;
pub mod script;
pub mod sentence;
pub mod services;
pub mod slot;
pub mod state;
pub mod time;

#[cfg(test)]
mod test_support;

pub use engine::{DispatchOutcome, Npc, NpcId, Rule, Triggers, World};
pub use error::{ActionError, AdminError, DialogueError, Result, SlotError};
pub use quest::{QuestDefinition, QuestRegistry, ScriptedQuest};
pub use sentence::Sentence;
pub use services::{PlayerId, Services};
pub use state::ConversationState;
