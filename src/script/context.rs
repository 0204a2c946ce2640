//! Evaluation context, effect accumulator and the custom leaf table

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use crate::error::ActionError;
use crate::sentence::Sentence;
use crate::services::{PlayerId, Services};
use crate::state::ConversationState;

/// Free-form arguments of a custom leaf
pub type Params = BTreeMap<String, String>;

pub type CustomPredicate = Arc<dyn Fn(&EvaluationContext<'_>, &Params) -> bool + Send + Sync>;

pub type CustomEffect = Arc<
    dyn Fn(&EvaluationContext<'_>, &Params, &mut Effects) -> Result<(), ActionError> + Send + Sync,
>;

/// Everything a condition may look at and an action may touch
pub struct EvaluationContext<'a> {
    pub player: &'a PlayerId,
    pub sentence: &'a Sentence,
    pub npc_name: Option<&'a str>,
    /// Slot of the quest that owns the rule being evaluated
    pub quest_slot: Option<&'a str>,
    pub services: &'a Services,
    pub extensions: &'a Extensions,
}

impl<'a> EvaluationContext<'a> {
    pub fn new(
        player: &'a PlayerId,
        sentence: &'a Sentence,
        services: &'a Services,
        extensions: &'a Extensions,
    ) -> Self {
        Self {
            player,
            sentence,
            npc_name: None,
            quest_slot: None,
            services,
            extensions,
        }
    }

    pub fn with_npc(mut self, name: &'a str) -> Self {
        self.npc_name = Some(name);
        self
    }

    pub fn with_quest_slot(mut self, slot: Option<&'a str>) -> Self {
        self.quest_slot = slot;
        self
    }

    /// Slot named by a leaf, falling back to the owning quest's slot
    pub fn slot<'s>(&'s self, explicit: Option<&'s str>) -> Option<&'s str> {
        explicit.or(self.quest_slot)
    }
}

/// What an action produced besides its direct service calls
#[derive(Debug, Default)]
pub struct Effects {
    lines: Vec<String>,
    state: Option<ConversationState>,
    applied: bool,
}

impl Effects {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn say(&mut self, line: impl Into<String>) {
        let line = line.into();
        if !line.is_empty() {
            self.lines.push(line);
        }
    }

    /// Override the rule's target state
    pub fn set_state(&mut self, state: ConversationState) {
        self.state = Some(state);
    }

    /// Record that player or quest data was mutated
    pub fn mark_applied(&mut self) {
        self.applied = true;
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn state(&self) -> Option<ConversationState> {
        self.state
    }

    pub fn applied(&self) -> bool {
        self.applied
    }

    pub fn into_lines(self) -> Vec<String> {
        self.lines
    }
}

/// Custom predicates and effects registered by id
#[derive(Clone, Default)]
pub struct Extensions {
    predicates: HashMap<String, CustomPredicate>,
    effects: HashMap<String, CustomEffect>,
}

impl Extensions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_predicate<F>(&mut self, id: &str, f: F)
    where
        F: Fn(&EvaluationContext<'_>, &Params) -> bool + Send + Sync + 'static,
    {
        self.predicates.insert(id.to_string(), Arc::new(f));
    }

    pub fn register_effect<F>(&mut self, id: &str, f: F)
    where
        F: Fn(&EvaluationContext<'_>, &Params, &mut Effects) -> Result<(), ActionError>
            + Send
            + Sync
            + 'static,
    {
        self.effects.insert(id.to_string(), Arc::new(f));
    }

    pub fn predicate(&self, id: &str) -> Option<&CustomPredicate> {
        self.predicates.get(id)
    }

    pub fn effect(&self, id: &str) -> Option<&CustomEffect> {
        self.effects.get(id)
    }
}

impl fmt::Debug for Extensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut predicates: Vec<&String> = self.predicates.keys().collect();
        let mut effects: Vec<&String> = self.effects.keys().collect();
        predicates.sort();
        effects.sort();
        f.debug_struct("Extensions")
            .field("predicates", &predicates)
            .field("effects", &effects)
            .finish()
    }
}
