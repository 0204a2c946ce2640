//! Conditions guarding rules
//!
//! A [`Condition`] is a tree of `And`/`Or`/`Not` nodes over [`Predicate`]
//! leaves. Evaluation never mutates anything. Leaves that hit unreadable
//! quest data answer `false` instead of failing the dispatch.

use tracing::warn;

use crate::sentence::{normalize, phrases};
use crate::slot::{parse_recorded_item, QuestSlotStore, STATUS_FIELD};
use super::context::{EvaluationContext, Params};

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// True when every child is true; empty is true
    And(Vec<Condition>),
    /// True when any child is true; empty is false
    Or(Vec<Condition>),
    Not(Box<Condition>),
    Leaf(Predicate),
}

/// Leaf predicates. `slot: None` means the owning quest's slot.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    QuestStarted { slot: Option<String> },
    QuestNotStarted { slot: Option<String> },
    QuestActive { slot: Option<String> },
    QuestNotActive { slot: Option<String> },
    QuestCompleted { slot: Option<String> },
    QuestNotCompleted { slot: Option<String> },
    /// Whole slot (no index) or one field equals `state`
    QuestInState { slot: Option<String>, index: Option<usize>, state: String },
    QuestNotInState { slot: Option<String>, index: Option<usize>, state: String },
    QuestStateStartsWith { slot: Option<String>, prefix: String },
    /// At least `minutes` have passed since the timestamp in field `index`
    TimePassed { slot: Option<String>, index: usize, minutes: u64 },
    LevelGreaterThan(u32),
    LevelLessThan(u32),
    PlayerHasItem { item: String, quantity: u32 },
    /// Player carries the `name=qty` recorded in field `index`
    PlayerHasRecordedItem { slot: Option<String>, index: usize },
    PlayerCanEquip { item: String, quantity: u32 },
    /// A name after the greeting, if any, is this NPC's
    GreetingMatchesName,
    TriggerIs(String),
    Custom { id: String, params: Params },
}

impl Condition {
    pub fn leaf(predicate: Predicate) -> Self {
        Condition::Leaf(predicate)
    }

    pub fn not(condition: Condition) -> Self {
        Condition::Not(Box::new(condition))
    }

    pub fn evaluate(&self, ctx: &EvaluationContext<'_>) -> bool {
        match self {
            Condition::And(children) => children.iter().all(|c| c.evaluate(ctx)),
            Condition::Or(children) => children.iter().any(|c| c.evaluate(ctx)),
            Condition::Not(inner) => !inner.evaluate(ctx),
            Condition::Leaf(predicate) => predicate.evaluate(ctx),
        }
    }
}

impl From<Predicate> for Condition {
    fn from(predicate: Predicate) -> Self {
        Condition::Leaf(predicate)
    }
}

impl Predicate {
    pub fn evaluate(&self, ctx: &EvaluationContext<'_>) -> bool {
        let store = ctx.services.slots.as_ref();
        let player = ctx.player;

        match self {
            Predicate::QuestStarted { slot } => {
                with_slot(ctx, slot, |s| store.has_quest(player, s))
            }
            Predicate::QuestNotStarted { slot } => {
                with_slot(ctx, slot, |s| !store.has_quest(player, s))
            }
            Predicate::QuestActive { slot } => {
                with_slot(ctx, slot, |s| store.is_active(player, s))
            }
            Predicate::QuestNotActive { slot } => {
                with_slot(ctx, slot, |s| !store.is_active(player, s))
            }
            Predicate::QuestCompleted { slot } => {
                with_slot(ctx, slot, |s| store.is_completed(player, s))
            }
            Predicate::QuestNotCompleted { slot } => {
                with_slot(ctx, slot, |s| !store.is_completed(player, s))
            }
            Predicate::QuestInState { slot, index, state } => {
                with_slot(ctx, slot, |s| in_state(store, ctx, s, *index, state))
            }
            Predicate::QuestNotInState { slot, index, state } => {
                with_slot(ctx, slot, |s| !in_state(store, ctx, s, *index, state))
            }
            Predicate::QuestStateStartsWith { slot, prefix } => with_slot(ctx, slot, |s| {
                store
                    .get(player, s)
                    .is_some_and(|value| value.starts_with(prefix.as_str()))
            }),
            Predicate::TimePassed { slot, index, minutes } => {
                with_slot(ctx, slot, |s| time_passed(ctx, s, *index, *minutes))
            }
            Predicate::LevelGreaterThan(level) => ctx.services.stats.level(player) > *level,
            Predicate::LevelLessThan(level) => ctx.services.stats.level(player) < *level,
            Predicate::PlayerHasItem { item, quantity } => {
                ctx.services.inventory.is_equipped(player, item, *quantity)
            }
            Predicate::PlayerHasRecordedItem { slot, index } => with_slot(ctx, slot, |s| {
                store
                    .get_field(player, s, *index)
                    .and_then(|field| parse_recorded_item(&field))
                    .is_some_and(|(item, qty)| ctx.services.inventory.is_equipped(player, &item, qty))
            }),
            Predicate::PlayerCanEquip { item, quantity } => {
                ctx.services.inventory.can_equip(player, item, *quantity)
            }
            Predicate::GreetingMatchesName => greeting_matches_name(ctx),
            Predicate::TriggerIs(phrase) => ctx.sentence.starts_with_phrase(&normalize(phrase)),
            Predicate::Custom { id, params } => match ctx.extensions.predicate(id) {
                Some(f) => f(ctx, params),
                None => {
                    warn!("Unknown custom predicate '{}', treating as false", id);
                    false
                }
            },
        }
    }
}

fn with_slot<F>(ctx: &EvaluationContext<'_>, explicit: &Option<String>, f: F) -> bool
where
    F: FnOnce(&str) -> bool,
{
    match ctx.slot(explicit.as_deref()) {
        Some(slot) => f(slot),
        None => {
            warn!("Quest predicate has no slot to read, treating as false");
            false
        }
    }
}

fn in_state(
    store: &dyn QuestSlotStore,
    ctx: &EvaluationContext<'_>,
    slot: &str,
    index: Option<usize>,
    state: &str,
) -> bool {
    match index {
        None => store.get(ctx.player, slot).as_deref() == Some(state),
        Some(STATUS_FIELD) => store.is_in_state(ctx.player, slot, state),
        Some(i) => store.get_field(ctx.player, slot, i).as_deref() == Some(state),
    }
}

/// A slot or field that was never written has nothing to wait for.
/// A field that holds something other than a number is malformed.
fn time_passed(ctx: &EvaluationContext<'_>, slot: &str, index: usize, minutes: u64) -> bool {
    let store = ctx.services.slots.as_ref();
    let Some(raw) = store.get(ctx.player, slot) else {
        return true;
    };
    let Some(view) = store.view(ctx.player, slot) else {
        return false;
    };
    match view.field(index) {
        None | Some("") => true,
        Some(field) => match field.trim().parse::<u64>() {
            Ok(stamp) => ctx.services.clock.now_minutes() >= stamp.saturating_add(minutes),
            Err(_) => {
                warn!(
                    "Slot '{}' of {} has no timestamp in field {}: '{}'",
                    slot, ctx.player, index, raw
                );
                false
            }
        },
    }
}

fn greeting_matches_name(ctx: &EvaluationContext<'_>) -> bool {
    let Some(npc) = ctx.npc_name else {
        return true;
    };
    let npc = normalize(npc);
    for greeting in phrases::GREETING {
        if let Some(rest) = ctx.sentence.rest_after(greeting) {
            return rest.is_empty() || rest == npc || npc.starts_with(&format!("{} ", rest));
        }
    }
    true
}
