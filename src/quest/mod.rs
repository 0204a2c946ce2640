//! Quest System Module
//!
//! Quests are content registered into NPC rule tables. Definitions come
//! from TOML files (`scripted`) or from Rust types implementing
//! [`QuestDefinition`]; the registry loads, unloads and hot-reloads them.

pub mod definition;
pub mod registry;
pub mod scripted;

pub use definition::{QuestDefinition, QuestInfo, QuestSetup};
pub use registry::{HotReloadEvent, QuestRegistry, RegisteredQuest, ReloadOutcome};
pub use scripted::{RawAction, RawCondition, RawQuestFile, ScriptedQuest};
