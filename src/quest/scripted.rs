//! Data-driven quests
//!
//! A [`ScriptedQuest`] is read from a TOML file under `quests/`. Conditions
//! and actions are written as externally tagged tables, e.g.
//! `{ quest_in_state = { index = 0, state = "start" } }`, and converted to
//! the engine's trees once at parse time.

use std::collections::BTreeMap;
use std::path::Path;
use serde::Deserialize;

use crate::engine::{render, Placeholders, Rule, Triggers};
use crate::error::{DialogueError, Result};
use crate::script::{Action, Condition, EvaluationContext, Effect, Params, Predicate};
use crate::slot::ItemRequirementSet;
use crate::state::{ConversationState, UnknownState};
use super::definition::{QuestDefinition, QuestSetup};

// ============================================================================
// Raw TOML structures
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct RawQuestFile {
    pub quest: RawQuest,
    #[serde(default)]
    pub rule: Vec<RawRule>,
    #[serde(default)]
    pub collect: Vec<RawCollect>,
    #[serde(default)]
    pub history: Vec<RawHistory>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawQuest {
    pub name: String,
    pub slot: String,
    pub title: Option<String>,
    #[serde(default)]
    pub description: String,
    pub npc: Option<String>,
    pub region: Option<String>,
    #[serde(default)]
    pub min_level: u32,
    #[serde(default)]
    pub repeatable: bool,
    /// Seasonal quests set this to false and are loaded by hand
    #[serde(default = "default_true")]
    pub autoload: bool,
    pub repeatable_when: Option<RawCondition>,
    pub completed_when: Option<RawCondition>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawRule {
    /// Defaults to the quest's NPC
    pub npc: Option<String>,
    pub from: String,
    pub triggers: Vec<String>,
    pub when: Option<RawCondition>,
    pub to: String,
    pub reply: Option<String>,
    #[serde(default)]
    pub actions: Vec<RawAction>,
}

/// One delivery rule per required item, all sharing the completion action
#[derive(Debug, Clone, Deserialize)]
pub struct RawCollect {
    pub npc: Option<String>,
    pub from: String,
    /// Requirement encoding, e.g. `arandula=5;wood=2`
    pub items: String,
    /// Extra trigger phrases per item
    #[serde(default)]
    pub synonyms: BTreeMap<String, Vec<String>>,
    pub more_needed: String,
    pub already_brought: Option<String>,
    #[serde(default = "default_complete_state")]
    pub complete_state: String,
    #[serde(default)]
    pub on_complete: Vec<RawAction>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawHistory {
    pub when: Option<RawCondition>,
    pub text: String,
    /// Stop adding entries after this one when it applies
    #[serde(default)]
    pub stop: bool,
}

fn default_complete_state() -> String {
    "attending".to_string()
}

fn default_true() -> bool {
    true
}

fn default_one() -> u32 {
    1
}

fn default_timestamp_index() -> usize {
    1
}

fn default_counter_index() -> usize {
    2
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawSlot {
    pub slot: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RawCondition {
    All(Vec<RawCondition>),
    Any(Vec<RawCondition>),
    Not(Box<RawCondition>),
    QuestStarted(RawSlot),
    QuestNotStarted(RawSlot),
    QuestActive(RawSlot),
    QuestNotActive(RawSlot),
    QuestCompleted(RawSlot),
    QuestNotCompleted(RawSlot),
    QuestInState {
        slot: Option<String>,
        index: Option<usize>,
        state: String,
    },
    QuestNotInState {
        slot: Option<String>,
        index: Option<usize>,
        state: String,
    },
    QuestStateStartsWith {
        slot: Option<String>,
        prefix: String,
    },
    TimePassed {
        slot: Option<String>,
        #[serde(default = "default_timestamp_index")]
        index: usize,
        minutes: u64,
    },
    LevelGreaterThan(u32),
    LevelLessThan(u32),
    PlayerHasItem {
        item: String,
        #[serde(default = "default_one")]
        quantity: u32,
    },
    PlayerHasRecordedItem {
        slot: Option<String>,
        #[serde(default)]
        index: usize,
    },
    PlayerCanEquip {
        item: String,
        #[serde(default = "default_one")]
        quantity: u32,
    },
    GreetingMatchesName {},
    TriggerIs(String),
    Custom {
        id: String,
        #[serde(default)]
        params: Params,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RawAction {
    Say(String),
    SetQuest {
        slot: Option<String>,
        index: Option<usize>,
        value: String,
    },
    SetQuestAndModifyKarma {
        slot: Option<String>,
        value: String,
        karma: f64,
    },
    SetQuestToTimestamp {
        slot: Option<String>,
        #[serde(default = "default_timestamp_index")]
        index: usize,
    },
    IncrementQuest {
        slot: Option<String>,
        #[serde(default = "default_counter_index")]
        index: usize,
        #[serde(default = "default_one")]
        by: u32,
    },
    RemoveQuest(RawSlot),
    IncreaseXp(u64),
    IncreaseXpDependentOnLevel {
        divisor: u64,
        level_cap: u32,
    },
    IncreaseKarma(f64),
    DecreaseKarma(f64),
    EquipItem {
        item: String,
        #[serde(default = "default_one")]
        quantity: u32,
    },
    EquipRandomAmount {
        item: String,
        step: u32,
        rolls: u32,
        template: Option<String>,
    },
    DropItem {
        item: String,
        #[serde(default = "default_one")]
        quantity: u32,
    },
    DropRecordedItem {
        slot: Option<String>,
        #[serde(default)]
        index: usize,
    },
    SayRequiredItems {
        slot: Option<String>,
        template: String,
    },
    SayRequiredItem {
        slot: Option<String>,
        #[serde(default)]
        index: usize,
        template: String,
    },
    SayTimeRemaining {
        slot: Option<String>,
        #[serde(default = "default_timestamp_index")]
        index: usize,
        minutes: u64,
        template: String,
    },
    StartRecordingRandomItem {
        slot: Option<String>,
        #[serde(default)]
        index: usize,
        items: BTreeMap<String, u32>,
        template: String,
    },
    SetState(String),
    Custom {
        id: String,
        #[serde(default)]
        params: Params,
    },
}

// ============================================================================
// Conversion
// ============================================================================

fn parse_state(quest: &str, text: &str) -> Result<ConversationState> {
    text.parse()
        .map_err(|e: UnknownState| DialogueError::invalid(quest, e.to_string()))
}

impl RawCondition {
    pub fn into_condition(self, quest: &str) -> Result<Condition> {
        let leaf = |p: Predicate| Ok(Condition::Leaf(p));
        match self {
            RawCondition::All(children) => Ok(Condition::And(
                children
                    .into_iter()
                    .map(|c| c.into_condition(quest))
                    .collect::<Result<_>>()?,
            )),
            RawCondition::Any(children) => Ok(Condition::Or(
                children
                    .into_iter()
                    .map(|c| c.into_condition(quest))
                    .collect::<Result<_>>()?,
            )),
            RawCondition::Not(inner) => Ok(Condition::not(inner.into_condition(quest)?)),
            RawCondition::QuestStarted(a) => leaf(Predicate::QuestStarted { slot: a.slot }),
            RawCondition::QuestNotStarted(a) => leaf(Predicate::QuestNotStarted { slot: a.slot }),
            RawCondition::QuestActive(a) => leaf(Predicate::QuestActive { slot: a.slot }),
            RawCondition::QuestNotActive(a) => leaf(Predicate::QuestNotActive { slot: a.slot }),
            RawCondition::QuestCompleted(a) => leaf(Predicate::QuestCompleted { slot: a.slot }),
            RawCondition::QuestNotCompleted(a) => leaf(Predicate::QuestNotCompleted { slot: a.slot }),
            RawCondition::QuestInState { slot, index, state } => {
                leaf(Predicate::QuestInState { slot, index, state })
            }
            RawCondition::QuestNotInState { slot, index, state } => {
                leaf(Predicate::QuestNotInState { slot, index, state })
            }
            RawCondition::QuestStateStartsWith { slot, prefix } => {
                leaf(Predicate::QuestStateStartsWith { slot, prefix })
            }
            RawCondition::TimePassed { slot, index, minutes } => {
                leaf(Predicate::TimePassed { slot, index, minutes })
            }
            RawCondition::LevelGreaterThan(level) => leaf(Predicate::LevelGreaterThan(level)),
            RawCondition::LevelLessThan(level) => leaf(Predicate::LevelLessThan(level)),
            RawCondition::PlayerHasItem { item, quantity } => {
                leaf(Predicate::PlayerHasItem { item, quantity })
            }
            RawCondition::PlayerHasRecordedItem { slot, index } => {
                leaf(Predicate::PlayerHasRecordedItem { slot, index })
            }
            RawCondition::PlayerCanEquip { item, quantity } => {
                leaf(Predicate::PlayerCanEquip { item, quantity })
            }
            RawCondition::GreetingMatchesName {} => leaf(Predicate::GreetingMatchesName),
            RawCondition::TriggerIs(phrase) => leaf(Predicate::TriggerIs(phrase)),
            RawCondition::Custom { id, params } => leaf(Predicate::Custom { id, params }),
        }
    }
}

impl RawAction {
    pub fn into_effect(self, quest: &str) -> Result<Effect> {
        Ok(match self {
            RawAction::Say(text) => Effect::Say(text),
            RawAction::SetQuest { slot, index, value } => Effect::SetQuest { slot, index, value },
            RawAction::SetQuestAndModifyKarma { slot, value, karma } => {
                Effect::SetQuestAndModifyKarma { slot, value, karma }
            }
            RawAction::SetQuestToTimestamp { slot, index } => Effect::SetQuestToTimestamp { slot, index },
            RawAction::IncrementQuest { slot, index, by } => Effect::IncrementQuest {
                slot,
                index,
                by: u64::from(by),
            },
            RawAction::RemoveQuest(a) => Effect::RemoveQuest { slot: a.slot },
            RawAction::IncreaseXp(amount) => Effect::IncreaseXp(amount),
            RawAction::IncreaseXpDependentOnLevel { divisor, level_cap } => {
                if divisor == 0 {
                    return Err(DialogueError::invalid(quest, "XP divisor must be positive"));
                }
                Effect::IncreaseXpDependentOnLevel { divisor, level_cap }
            }
            RawAction::IncreaseKarma(amount) => Effect::IncreaseKarma(amount),
            RawAction::DecreaseKarma(amount) => Effect::DecreaseKarma(amount),
            RawAction::EquipItem { item, quantity } => Effect::EquipItem { item, quantity },
            RawAction::EquipRandomAmount { item, step, rolls, template } => {
                if step == 0 || rolls == 0 {
                    return Err(DialogueError::invalid(quest, "random amount needs step and rolls"));
                }
                Effect::EquipRandomAmount { item, step, rolls, template }
            }
            RawAction::DropItem { item, quantity } => Effect::DropItem { item, quantity },
            RawAction::DropRecordedItem { slot, index } => Effect::DropRecordedItem { slot, index },
            RawAction::SayRequiredItems { slot, template } => Effect::SayRequiredItems { slot, template },
            RawAction::SayRequiredItem { slot, index, template } => {
                Effect::SayRequiredItem { slot, index, template }
            }
            RawAction::SayTimeRemaining { slot, index, minutes, template } => {
                Effect::SayTimeRemaining { slot, index, minutes, template }
            }
            RawAction::StartRecordingRandomItem { slot, index, items, template } => {
                if items.is_empty() || items.values().any(|q| *q == 0) {
                    return Err(DialogueError::invalid(quest, "random item list needs positive quantities"));
                }
                Effect::StartRecordingRandomItem {
                    slot,
                    index,
                    items: items.into_iter().collect(),
                    template,
                }
            }
            RawAction::SetState(state) => Effect::SetState(parse_state(quest, &state)?),
            RawAction::Custom { id, params } => Effect::Custom { id, params },
        })
    }
}

/// A list of raw actions as one action; `None` when empty
fn into_action(raw: Vec<RawAction>, quest: &str) -> Result<Option<Action>> {
    let mut effects = raw
        .into_iter()
        .map(|a| a.into_effect(quest).map(Action::Leaf))
        .collect::<Result<Vec<_>>>()?;
    Ok(match effects.len() {
        0 => None,
        1 => effects.pop(),
        _ => Some(Action::Multiple(effects)),
    })
}

fn into_condition(raw: Option<RawCondition>, quest: &str) -> Result<Option<Condition>> {
    raw.map(|c| c.into_condition(quest)).transpose()
}

// ============================================================================
// ScriptedQuest
// ============================================================================

#[derive(Debug, Clone)]
struct HistoryEntry {
    when: Option<Condition>,
    text: String,
    stop: bool,
}

/// A quest defined entirely in TOML
#[derive(Debug, Clone)]
pub struct ScriptedQuest {
    name: String,
    slot: String,
    title: String,
    description: String,
    npc: Option<String>,
    region: Option<String>,
    min_level: u32,
    repeatable: bool,
    autoload: bool,
    repeatable_when: Option<Condition>,
    completed_when: Option<Condition>,
    rules: Vec<(String, Rule)>,
    history: Vec<HistoryEntry>,
}

impl ScriptedQuest {
    pub fn from_toml(content: &str, origin: &str) -> Result<Self> {
        let raw: RawQuestFile = toml::from_str(content).map_err(|e| DialogueError::Parse {
            path: origin.to_string(),
            source: e,
        })?;
        Self::from_raw(raw)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content, &path.display().to_string())
    }

    pub fn from_raw(raw: RawQuestFile) -> Result<Self> {
        let q = raw.quest;
        let name = q.name.trim().to_string();
        if name.is_empty() {
            return Err(DialogueError::invalid("quest", "quest without a name"));
        }
        if q.slot.is_empty() || q.slot.contains(';') {
            return Err(DialogueError::invalid(&name, format!("bad slot name '{}'", q.slot)));
        }

        let npc_for = |npc: Option<String>| -> Result<String> {
            npc.or_else(|| q.npc.clone())
                .ok_or_else(|| DialogueError::invalid(&name, "rule without an NPC"))
        };

        let mut rules = Vec::new();
        for r in raw.rule {
            let triggers = Triggers::new(&r.triggers);
            if triggers.is_empty() {
                return Err(DialogueError::invalid(&name, "rule without triggers"));
            }
            let mut rule = Rule::new(parse_state(&name, &r.from)?, triggers, parse_state(&name, &r.to)?);
            if let Some(condition) = into_condition(r.when, &name)? {
                rule = rule.with_condition(condition);
            }
            if let Some(reply) = r.reply {
                rule = rule.with_reply(reply);
            }
            if let Some(action) = into_action(r.actions, &name)? {
                rule = rule.with_action(action);
            }
            rules.push((npc_for(r.npc)?, rule));
        }

        for c in raw.collect {
            let npc = npc_for(c.npc)?;
            let from = parse_state(&name, &c.from)?;
            let complete_state = parse_state(&name, &c.complete_state)?;
            let on_complete = into_action(c.on_complete, &name)?.unwrap_or(Action::Multiple(Vec::new()));
            let items = ItemRequirementSet::from_encoded(&c.items);
            if items.is_empty() {
                return Err(DialogueError::invalid(&name, format!("no items in '{}'", c.items)));
            }
            for (item, _) in items.missing() {
                let mut phrases = vec![item.to_string()];
                phrases.extend(c.synonyms.get(item).cloned().unwrap_or_default());
                let rule = Rule::new(from, Triggers::new(&phrases), from).with_action(
                    Effect::CollectRequestedItem {
                        slot: None,
                        item: item.to_string(),
                        more_needed: c.more_needed.clone(),
                        already_brought: c.already_brought.clone(),
                        on_complete: Box::new(on_complete.clone()),
                        complete_state,
                    },
                );
                rules.push((npc.clone(), rule));
            }
        }

        let history = raw
            .history
            .into_iter()
            .map(|h| {
                Ok(HistoryEntry {
                    when: into_condition(h.when, &name)?,
                    text: h.text,
                    stop: h.stop,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let repeatable_when = into_condition(q.repeatable_when, &name)?;
        Ok(Self {
            title: q.title.unwrap_or_else(|| name.clone()),
            slot: q.slot,
            description: q.description,
            npc: q.npc,
            region: q.region,
            min_level: q.min_level,
            repeatable: q.repeatable || repeatable_when.is_some(),
            autoload: q.autoload,
            repeatable_when,
            completed_when: into_condition(q.completed_when, &name)?,
            rules,
            history,
            name,
        })
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Whether `load_all` picks this quest up
    pub fn autoload(&self) -> bool {
        self.autoload
    }
}

impl QuestDefinition for ScriptedQuest {
    fn name(&self) -> &str {
        &self.name
    }

    fn slot_name(&self) -> &str {
        &self.slot
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn min_level(&self) -> u32 {
        self.min_level
    }

    fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    fn npc_name(&self) -> Option<&str> {
        self.npc.as_deref()
    }

    fn has_repetitions(&self) -> bool {
        self.repeatable
    }

    fn add_to_world(&self, setup: &mut QuestSetup) -> Result<()> {
        for (npc, rule) in &self.rules {
            setup.add_rule(npc, rule.clone());
        }
        Ok(())
    }

    fn is_repeatable(&self, ctx: &EvaluationContext<'_>) -> bool {
        self.repeatable_when
            .as_ref()
            .is_some_and(|c| c.evaluate(ctx))
    }

    fn is_completed(&self, ctx: &EvaluationContext<'_>) -> bool {
        match &self.completed_when {
            Some(condition) => condition.evaluate(ctx),
            None => ctx.services.slots.is_completed(ctx.player, &self.slot),
        }
    }

    fn history(&self, ctx: &EvaluationContext<'_>) -> Vec<String> {
        let values = Placeholders::from_context(ctx);
        let mut lines = Vec::new();
        for entry in &self.history {
            if entry.when.as_ref().is_none_or(|c| c.evaluate(ctx)) {
                lines.push(render(&entry.text, &values));
                if entry.stop {
                    break;
                }
            }
        }
        lines
    }
}
