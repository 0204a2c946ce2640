//! The NPC arena and dispatch
//!
//! [`World`] owns every speaking NPC, indexed by [`NpcId`], together with
//! the collaborators rules run against. NPCs are added while the world is
//! being built; afterwards it is shared behind an `Arc` and only rule
//! tables and conversation states change.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::error::{DialogueError, Result};
use crate::script::{Effects, EvaluationContext, Extensions};
use crate::sentence::Sentence;
use crate::services::{PlayerId, Services};
use crate::state::ConversationState;
use super::npc::{parse_npc_file, Npc, NpcId};
use super::reply::{render, Placeholders};
use super::rule::Rule;

pub const DEFAULT_REPLY: &str = "Sorry, I don't understand you.";

/// Result of one utterance
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchOutcome {
    /// Lines the NPC says, in order
    pub lines: Vec<String>,
    /// Conversation state after the dispatch
    pub state: ConversationState,
    /// Whether a rule fired
    pub matched: bool,
    /// Whether quest, inventory or stats data changed
    pub side_effects_applied: bool,
}

impl DispatchOutcome {
    pub fn reply(&self) -> Option<String> {
        if self.lines.is_empty() {
            None
        } else {
            Some(self.lines.join("\n"))
        }
    }
}

pub struct World {
    npcs: Vec<Npc>,
    by_name: HashMap<String, NpcId>,
    services: Services,
    extensions: Extensions,
    default_reply: String,
    player_locks: DashMap<PlayerId, Arc<Mutex<()>>>,
}

impl World {
    pub fn new(services: Services) -> Self {
        Self {
            npcs: Vec::new(),
            by_name: HashMap::new(),
            services,
            extensions: Extensions::new(),
            default_reply: DEFAULT_REPLY.to_string(),
            player_locks: DashMap::new(),
        }
    }

    pub fn with_extensions(mut self, extensions: Extensions) -> Self {
        self.extensions = extensions;
        self
    }

    pub fn with_default_reply(mut self, reply: &str) -> Self {
        self.default_reply = reply.to_string();
        self
    }

    /// Next id to hand to [`Npc::new`] or [`Npc::from_raw`]
    pub fn next_id(&self) -> NpcId {
        NpcId(self.npcs.len())
    }

    /// Add an NPC. Its id must be [`World::next_id`] and its name unique.
    pub fn add_npc(&mut self, npc: Npc) -> Result<NpcId> {
        let id = self.next_id();
        if npc.id() != id {
            return Err(DialogueError::invalid(
                npc.name(),
                format!("expected id {:?}, got {:?}", id, npc.id()),
            ));
        }
        let key = name_key(npc.name());
        if self.by_name.contains_key(&key) {
            return Err(DialogueError::invalid(npc.name(), "duplicate NPC name"));
        }
        self.by_name.insert(key, id);
        self.npcs.push(npc);
        Ok(id)
    }

    /// Add every NPC from a TOML file, returning how many were added
    pub fn load_npcs(&mut self, path: &Path) -> Result<usize> {
        let mut added = 0;
        for raw in parse_npc_file(path)? {
            let name = raw.name.clone();
            match Npc::from_raw(self.next_id(), raw).and_then(|npc| self.add_npc(npc)) {
                Ok(_) => added += 1,
                Err(e) => warn!("Skipping NPC '{}' from {:?}: {}", name, path, e),
            }
        }
        info!("Loaded {} NPCs from {:?}", added, path);
        Ok(added)
    }

    pub fn npc(&self, id: NpcId) -> Option<&Npc> {
        self.npcs.get(id.0)
    }

    /// Case-insensitive lookup by name
    pub fn npc_id(&self, name: &str) -> Option<NpcId> {
        self.by_name.get(&name_key(name)).copied()
    }

    pub fn npcs(&self) -> impl Iterator<Item = &Npc> {
        self.npcs.iter()
    }

    pub fn len(&self) -> usize {
        self.npcs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.npcs.is_empty()
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    /// Conversation state of `player` with `npc`
    pub fn state(&self, npc: NpcId, player: &PlayerId) -> Result<ConversationState> {
        Ok(self.require(npc)?.state(player))
    }

    /// End a conversation, whatever state it was in
    pub async fn abandon(&self, npc: NpcId, player: &PlayerId) -> Result<()> {
        let npc = self.require(npc)?;
        let _turn = self.player_turn(player).await;
        npc.set_state(player, ConversationState::Idle);
        debug!("{} abandoned conversation with {}", player, npc.name());
        Ok(())
    }

    /// Dispatch raw text to an NPC looked up by name
    pub async fn dispatch_text(
        &self,
        npc_name: &str,
        player: &PlayerId,
        text: &str,
    ) -> Result<DispatchOutcome> {
        let id = self
            .npc_id(npc_name)
            .ok_or_else(|| DialogueError::NpcNotFound(npc_name.to_string()))?;
        self.dispatch(id, player, &Sentence::parse(text)).await
    }

    /// Handle one utterance of `player` to `npc`.
    ///
    /// Quest rules are tried in registration order, then the NPC's base
    /// behaviour. The first rule whose source state, trigger and condition
    /// all match fires; otherwise the NPC gives its default reply (or stays
    /// silent when idle) and the state is unchanged.
    pub async fn dispatch(
        &self,
        npc: NpcId,
        player: &PlayerId,
        sentence: &Sentence,
    ) -> Result<DispatchOutcome> {
        let npc = self.require(npc)?;
        let _turn = self.player_turn(player).await;

        let current = npc.state(player);
        let rules = npc.rules().read().await;
        let winner = rules.iter().chain(npc.behaviour()).find(|&rule| {
            rule.applies(current, sentence)
                && rule.condition.as_ref().is_none_or(|condition| {
                    condition.evaluate(&self.context(npc, player, sentence, rule))
                })
        });

        let Some(rule) = winner else {
            debug!(
                "{} -> {}: no rule for '{}' in {}",
                player,
                npc.name(),
                sentence.normalized(),
                current
            );
            let lines = if current == ConversationState::Idle {
                Vec::new()
            } else {
                vec![npc.default_reply().unwrap_or(&self.default_reply).to_string()]
            };
            return Ok(DispatchOutcome {
                lines,
                state: current,
                matched: false,
                side_effects_applied: false,
            });
        };

        let ctx = self.context(npc, player, sentence, rule);
        let mut effects = Effects::new();
        if let Some(action) = &rule.action {
            if let Err(e) = action.execute(&ctx, &mut effects) {
                match e.player_message() {
                    Some(line) => effects.say(line),
                    None => warn!(
                        "Action of {} failed for {} (quest {:?}): {}",
                        npc.name(),
                        player,
                        rule.owner().map(|o| o.quest.as_str()),
                        e
                    ),
                }
            }
        }

        let next = effects
            .state()
            .unwrap_or(rule.target)
            .resolve(current);
        let applied = effects.applied();
        let mut lines = Vec::new();
        if let Some(reply) = &rule.reply {
            lines.push(render(reply, &Placeholders::from_context(&ctx)));
        }
        lines.extend(effects.into_lines());

        npc.set_state(player, next);
        debug!("{} -> {}: {} => {}", player, npc.name(), current, next);

        Ok(DispatchOutcome {
            lines,
            state: next,
            matched: true,
            side_effects_applied: applied,
        })
    }

    fn context<'a>(
        &'a self,
        npc: &'a Npc,
        player: &'a PlayerId,
        sentence: &'a Sentence,
        rule: &'a Rule,
    ) -> EvaluationContext<'a> {
        EvaluationContext::new(player, sentence, &self.services, &self.extensions)
            .with_npc(npc.name())
            .with_quest_slot(rule.slot())
    }

    fn require(&self, id: NpcId) -> Result<&Npc> {
        self.npc(id)
            .ok_or_else(|| DialogueError::NpcNotFound(format!("{:?}", id)))
    }

    /// Wait for `player`'s earlier dispatches to finish
    async fn player_turn(&self, player: &PlayerId) -> PlayerTurn<'_> {
        let lock = self.player_locks.entry(player.clone()).or_default().clone();
        PlayerTurn {
            locks: &self.player_locks,
            player: player.clone(),
            guard: Some(lock.lock_owned().await),
        }
    }
}

/// Exclusive turn of one player. The lock entry is dropped again once no
/// other dispatch of that player holds or waits for it.
struct PlayerTurn<'a> {
    locks: &'a DashMap<PlayerId, Arc<Mutex<()>>>,
    player: PlayerId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for PlayerTurn<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks
            .remove_if(&self.player, |_, lock| Arc::strong_count(lock) == 1);
    }
}

fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}
