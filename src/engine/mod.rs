//! Conversation Engine
//!
//! Per-NPC rule tables and the dispatch that turns an utterance into a
//! reply, a state transition and side effects.

mod npc;
pub mod reply;
mod rule;
mod world;

pub use npc::{parse_npc_file, Npc, NpcId, RawNpc, RawNpcDialogue, RawNpcFile, RawTopic};
pub use reply::{render, Placeholders};
pub use rule::{Rule, RuleOwner, Triggers};
pub use world::{DispatchOutcome, World, DEFAULT_REPLY};
