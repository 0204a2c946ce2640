//! Speaking NPCs
//!
//! Each [`Npc`] owns two rule tiers. Quest rules are appended and removed at
//! runtime under a read/write lock. Base behaviour (greeting, goodbye, job,
//! help) is fixed at creation and only consulted when no quest rule fires.

use std::path::Path;
use dashmap::DashMap;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::info;

use crate::error::{DialogueError, Result};
use crate::script::Predicate;
use crate::services::PlayerId;
use crate::state::ConversationState;
use super::rule::{Rule, Triggers};

/// Stable index of an NPC in the world arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NpcId(pub usize);

// ============================================================================
// Raw TOML structures
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct RawNpcFile {
    #[serde(default)]
    pub npc: Vec<RawNpc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawNpc {
    pub name: String,
    pub region: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub dialogue: RawNpcDialogue,
    /// Extra topics answered while attending
    #[serde(default)]
    pub reply: Vec<RawTopic>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawNpcDialogue {
    pub greeting: Option<String>,
    pub goodbye: Option<String>,
    pub job: Option<String>,
    pub help: Option<String>,
    pub default_reply: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawTopic {
    pub triggers: Vec<String>,
    pub text: String,
}

const DEFAULT_GREETING: &str = "Greetings! How may I help you?";
const DEFAULT_GOODBYE: &str = "Bye.";

/// Parse an NPC file
pub fn parse_npc_file(path: &Path) -> Result<Vec<RawNpc>> {
    let content = std::fs::read_to_string(path)?;
    let file: RawNpcFile = toml::from_str(&content).map_err(|e| DialogueError::Parse {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(file.npc)
}

// ============================================================================
// NPC
// ============================================================================

pub struct Npc {
    id: NpcId,
    name: String,
    region: Option<String>,
    description: Option<String>,
    default_reply: Option<String>,
    behaviour: Vec<Rule>,
    rules: RwLock<Vec<Rule>>,
    conversations: DashMap<PlayerId, ConversationState>,
}

impl Npc {
    /// An NPC with no behaviour at all
    pub fn new(id: NpcId, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            region: None,
            description: None,
            default_reply: None,
            behaviour: Vec::new(),
            rules: RwLock::new(Vec::new()),
            conversations: DashMap::new(),
        }
    }

    /// Build an NPC and its base behaviour from its TOML entry
    pub fn from_raw(id: NpcId, raw: RawNpc) -> Result<Self> {
        if raw.name.trim().is_empty() {
            return Err(DialogueError::invalid("npc", "NPC without a name"));
        }
        let dialogue = raw.dialogue;
        let mut behaviour = vec![
            Rule::new(
                ConversationState::Idle,
                Triggers::new(["@greeting"]),
                ConversationState::Attending,
            )
            .with_condition(Predicate::GreetingMatchesName)
            .with_reply(dialogue.greeting.unwrap_or_else(|| DEFAULT_GREETING.to_string())),
            Rule::new(
                ConversationState::Any,
                Triggers::new(["@goodbye"]),
                ConversationState::Idle,
            )
            .with_reply(dialogue.goodbye.unwrap_or_else(|| DEFAULT_GOODBYE.to_string())),
        ];
        for (shorthand, text) in [("@job", dialogue.job), ("@help", dialogue.help)] {
            if let Some(text) = text {
                behaviour.push(attending_topic(Triggers::new([shorthand]), text));
            }
        }
        for topic in raw.reply {
            let triggers = Triggers::new(&topic.triggers);
            if triggers.is_empty() {
                return Err(DialogueError::invalid(&raw.name, "reply without triggers"));
            }
            behaviour.push(attending_topic(triggers, topic.text));
        }

        Ok(Self {
            region: raw.region,
            description: raw.description,
            default_reply: dialogue.default_reply,
            behaviour,
            ..Self::new(id, &raw.name)
        })
    }

    pub fn with_default_reply(mut self, reply: &str) -> Self {
        self.default_reply = Some(reply.to_string());
        self
    }

    pub fn with_behaviour(mut self, rules: Vec<Rule>) -> Self {
        self.behaviour = rules;
        self
    }

    pub fn id(&self) -> NpcId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn default_reply(&self) -> Option<&str> {
        self.default_reply.as_deref()
    }

    pub fn behaviour(&self) -> &[Rule] {
        &self.behaviour
    }

    /// Quest rules, for dispatch
    pub(crate) fn rules(&self) -> &RwLock<Vec<Rule>> {
        &self.rules
    }

    /// Current state of the conversation with `player`
    pub fn state(&self, player: &PlayerId) -> ConversationState {
        self.conversations
            .get(player)
            .map(|s| *s)
            .unwrap_or_default()
    }

    pub fn set_state(&self, player: &PlayerId, state: ConversationState) {
        if state == ConversationState::Idle {
            self.conversations.remove(player);
        } else {
            self.conversations.insert(player.clone(), state);
        }
    }

    /// Players currently in a conversation with this NPC
    pub fn active_conversations(&self) -> usize {
        self.conversations.len()
    }

    /// Append quest rules after all existing ones
    pub async fn add_rules(&self, new_rules: Vec<Rule>) {
        let count = new_rules.len();
        self.rules.write().await.extend(new_rules);
        info!("Registered {} rules on {}", count, self.name);
    }

    /// Swap the rules owned by `quest` for `new_rules` under one write lock,
    /// so a dispatch sees either the old set or the new one. The new rules
    /// go after all existing ones. Returns how many old rules went.
    pub async fn replace_quest(&self, quest: &str, new_rules: Vec<Rule>) -> usize {
        let count = new_rules.len();
        let mut rules = self.rules.write().await;
        let before = rules.len();
        rules.retain(|rule| !rule.is_owned_by(quest));
        let removed = before - rules.len();
        rules.extend(new_rules);
        info!("Registered {} rules of {} on {} ({} replaced)", count, quest, self.name, removed);
        removed
    }

    /// Remove every rule owned by `quest`, returning how many went
    pub async fn remove_quest(&self, quest: &str) -> usize {
        let mut rules = self.rules.write().await;
        let before = rules.len();
        rules.retain(|rule| !rule.is_owned_by(quest));
        before - rules.len()
    }

    pub async fn rule_count(&self) -> usize {
        self.rules.read().await.len()
    }

    pub async fn rule_count_for(&self, quest: &str) -> usize {
        self.rules
            .read()
            .await
            .iter()
            .filter(|rule| rule.is_owned_by(quest))
            .count()
    }
}

fn attending_topic(triggers: Triggers, text: String) -> Rule {
    Rule::new(ConversationState::Attending, triggers, ConversationState::Attending).with_reply(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_from_raw_builds_behaviour() {
        let raw: RawNpcFile = toml::from_str(
            r#"
            [[npc]]
            name = "Carmen"
            region = "semos city"

            [npc.dialogue]
            greeting = "Hi, if you need #help, just say."
            job = "I heal."

            [[npc.reply]]
            triggers = ["heal"]
            text = "Let me see."
            "#,
        )
        .unwrap();

        let npc = Npc::from_raw(NpcId(0), raw.npc.into_iter().next().unwrap()).unwrap();
        assert_eq!(npc.name(), "Carmen");
        assert_eq!(npc.region(), Some("semos city"));
        // greeting, goodbye, job, heal
        assert_eq!(npc.behaviour().len(), 4);
        assert_eq!(npc.behaviour()[0].target, ConversationState::Attending);
    }

    #[test]
    fn test_conversation_state_defaults_to_idle() {
        let npc = Npc::new(NpcId(3), "Rose Leigh");
        let p = PlayerId::new("bob");
        assert_eq!(npc.state(&p), ConversationState::Idle);

        npc.set_state(&p, ConversationState::Question1);
        assert_eq!(npc.state(&p), ConversationState::Question1);
        assert_eq!(npc.active_conversations(), 1);

        npc.set_state(&p, ConversationState::Idle);
        assert_eq!(npc.active_conversations(), 0);
    }

    #[tokio::test]
    async fn test_remove_quest_rules() {
        let npc = Npc::new(NpcId(0), "Carmen");
        let rule = |quest: &str| {
            let attending = ConversationState::Attending;
            Rule::new(attending, Triggers::new(["@quest"]), attending).owned_by(quest, quest)
        };
        npc.add_rules(vec![rule("a"), rule("b"), rule("a")]).await;
        assert_eq!(npc.rule_count_for("a").await, 2);

        assert_eq!(npc.remove_quest("a").await, 2);
        assert_eq!(npc.rule_count().await, 1);
        assert_eq!(npc.remove_quest("a").await, 0);
    }

    #[tokio::test]
    async fn test_replace_quest_rules() {
        let npc = Npc::new(NpcId(0), "Carmen");
        let rule = |quest: &str| {
            let attending = ConversationState::Attending;
            Rule::new(attending, Triggers::new(["@quest"]), attending).owned_by(quest, quest)
        };
        npc.add_rules(vec![rule("a"), rule("b")]).await;

        assert_eq!(npc.replace_quest("a", vec![rule("a"), rule("a"), rule("a")]).await, 1);
        assert_eq!(npc.rule_count_for("a").await, 3);
        let owners: Vec<String> = npc
            .rules()
            .read()
            .await
            .iter()
            .filter_map(|r| r.owner().map(|o| o.quest.clone()))
            .collect();
        assert_eq!(owners, vec!["b", "a", "a", "a"]);

        assert_eq!(npc.replace_quest("c", vec![rule("c")]).await, 0);
        assert_eq!(npc.rule_count().await, 5);
    }

    #[test]
    fn test_parse_errors_name_the_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("npcs.toml");
        std::fs::write(&path, "[[npc]]\nname = ").unwrap();

        let err = parse_npc_file(&path).unwrap_err();
        assert!(matches!(err, DialogueError::Parse { .. }));
        assert!(err.to_string().contains("npcs.toml"));
    }
}
