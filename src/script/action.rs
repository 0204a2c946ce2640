//! Actions fired by a matching rule
//!
//! An [`Action`] is either a single [`Effect`] or an ordered list of
//! actions. Lists are not transactional: the first failing effect stops the
//! list and everything before it stays applied.

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::warn;

use crate::engine::reply::{render, Placeholders};
use crate::error::ActionError;
use crate::slot::{parse_recorded_item, ItemRequirementSet, QuestSlotStore};
use crate::state::ConversationState;
use crate::time::approx_duration;
use super::context::{Effects, EvaluationContext, Params};

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Multiple(Vec<Action>),
    Leaf(Effect),
}

/// Leaf effects. `slot: None` means the owning quest's slot.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Say(String),
    /// Set the whole slot, or one field when `index` is given
    SetQuest { slot: Option<String>, index: Option<usize>, value: String },
    SetQuestAndModifyKarma { slot: Option<String>, value: String, karma: f64 },
    SetQuestToTimestamp { slot: Option<String>, index: usize },
    IncrementQuest { slot: Option<String>, index: usize, by: u64 },
    RemoveQuest { slot: Option<String> },
    IncreaseXp(u64),
    /// `xp_to_next_level / divisor`, nothing at or above `level_cap`
    IncreaseXpDependentOnLevel { divisor: u64, level_cap: u32 },
    IncreaseKarma(f64),
    DecreaseKarma(f64),
    EquipItem { item: String, quantity: u32 },
    /// Give `step * d(rolls)` of an item, optionally announcing the amount
    EquipRandomAmount { item: String, step: u32, rolls: u32, template: Option<String> },
    DropItem { item: String, quantity: u32 },
    DropRecordedItem { slot: Option<String>, index: usize },
    SayRequiredItems { slot: Option<String>, template: String },
    SayRequiredItem { slot: Option<String>, index: usize, template: String },
    /// Say `template` followed by the time left until `minutes` after the stamp
    SayTimeRemaining { slot: Option<String>, index: usize, minutes: u64, template: String },
    /// Pick one of `items` and record it as `name=qty` in field `index`
    StartRecordingRandomItem {
        slot: Option<String>,
        index: usize,
        items: Vec<(String, u32)>,
        template: String,
    },
    /// Take one delivery of `item` against the requirement set in the slot
    CollectRequestedItem {
        slot: Option<String>,
        item: String,
        more_needed: String,
        already_brought: Option<String>,
        on_complete: Box<Action>,
        complete_state: ConversationState,
    },
    SetState(ConversationState),
    Custom { id: String, params: Params },
}

impl Action {
    pub fn multiple(actions: Vec<Action>) -> Self {
        Action::Multiple(actions)
    }

    pub fn execute(&self, ctx: &EvaluationContext<'_>, effects: &mut Effects) -> Result<(), ActionError> {
        match self {
            Action::Multiple(actions) => {
                for action in actions {
                    action.execute(ctx, effects)?;
                }
                Ok(())
            }
            Action::Leaf(effect) => effect.apply(ctx, effects),
        }
    }
}

impl From<Effect> for Action {
    fn from(effect: Effect) -> Self {
        Action::Leaf(effect)
    }
}

impl Effect {
    pub fn apply(&self, ctx: &EvaluationContext<'_>, effects: &mut Effects) -> Result<(), ActionError> {
        let services = ctx.services;
        let store = services.slots.as_ref();
        let player = ctx.player;

        match self {
            Effect::Say(text) => {
                effects.say(render(text, &Placeholders::from_context(ctx)));
            }
            Effect::SetQuest { slot, index, value } => {
                let Some(slot) = resolve_slot(ctx, slot) else {
                    return Ok(());
                };
                match index {
                    Some(i) => store.set_field(player, slot, *i, value)?,
                    None => store.set(player, slot, value)?,
                }
                effects.mark_applied();
            }
            Effect::SetQuestAndModifyKarma { slot, value, karma } => {
                let Some(slot) = resolve_slot(ctx, slot) else {
                    return Ok(());
                };
                store.set(player, slot, value)?;
                services.stats.add_karma(player, *karma);
                effects.mark_applied();
            }
            Effect::SetQuestToTimestamp { slot, index } => {
                let Some(slot) = resolve_slot(ctx, slot) else {
                    return Ok(());
                };
                let now = services.clock.now_minutes();
                store.set_field(player, slot, *index, &now.to_string())?;
                effects.mark_applied();
            }
            Effect::IncrementQuest { slot, index, by } => {
                let Some(slot) = resolve_slot(ctx, slot) else {
                    return Ok(());
                };
                let current = store
                    .view(player, slot)
                    .and_then(|view| view.field_u64(*index))
                    .unwrap_or(0);
                store.set_field(player, slot, *index, &current.saturating_add(*by).to_string())?;
                effects.mark_applied();
            }
            Effect::RemoveQuest { slot } => {
                let Some(slot) = resolve_slot(ctx, slot) else {
                    return Ok(());
                };
                store.remove(player, slot)?;
                effects.mark_applied();
            }
            Effect::IncreaseXp(amount) => {
                services.stats.add_xp(player, *amount);
                effects.mark_applied();
            }
            Effect::IncreaseXpDependentOnLevel { divisor, level_cap } => {
                if services.stats.level(player) < *level_cap && *divisor > 0 {
                    let amount = services.stats.xp_to_next_level(player) / divisor;
                    services.stats.add_xp(player, amount);
                    effects.mark_applied();
                }
            }
            Effect::IncreaseKarma(amount) => {
                services.stats.add_karma(player, *amount);
                effects.mark_applied();
            }
            Effect::DecreaseKarma(amount) => {
                services.stats.add_karma(player, -amount);
                effects.mark_applied();
            }
            Effect::EquipItem { item, quantity } => {
                services.inventory.equip(player, item, *quantity)?;
                effects.mark_applied();
            }
            Effect::EquipRandomAmount { item, step, rolls, template } => {
                let roll = rand::thread_rng().gen_range(1..=(*rolls).max(1));
                let quantity = step.saturating_mul(roll);
                services.inventory.equip(player, item, quantity)?;
                effects.mark_applied();
                if let Some(template) = template {
                    let values = Placeholders::from_context(ctx).with_item(item, quantity);
                    effects.say(render(template, &values));
                }
            }
            Effect::DropItem { item, quantity } => {
                services.inventory.drop_items(player, item, *quantity)?;
                effects.mark_applied();
            }
            Effect::DropRecordedItem { slot, index } => {
                let Some(slot) = resolve_slot(ctx, slot) else {
                    return Ok(());
                };
                match recorded_item(ctx, slot, *index) {
                    Some((item, qty)) => {
                        services.inventory.drop_items(player, &item, qty)?;
                        effects.mark_applied();
                    }
                    None => warn!("No recorded item in field {} of '{}' for {}", index, slot, player),
                }
            }
            Effect::SayRequiredItems { slot, template } => {
                let Some(slot) = resolve_slot(ctx, slot) else {
                    return Ok(());
                };
                let set = ItemRequirementSet::from_encoded(&store.get(player, slot).unwrap_or_default());
                let values = Placeholders::from_context(ctx).with_items(&set);
                effects.say(render(template, &values));
            }
            Effect::SayRequiredItem { slot, index, template } => {
                let Some(slot) = resolve_slot(ctx, slot) else {
                    return Ok(());
                };
                match recorded_item(ctx, slot, *index) {
                    Some((item, qty)) => {
                        let values = Placeholders::from_context(ctx).with_item(&item, qty);
                        effects.say(render(template, &values));
                    }
                    None => warn!("No recorded item in field {} of '{}' for {}", index, slot, player),
                }
            }
            Effect::SayTimeRemaining { slot, index, minutes, template } => {
                let Some(slot) = resolve_slot(ctx, slot) else {
                    return Ok(());
                };
                let stamp = store
                    .view(player, slot)
                    .and_then(|view| view.field_u64(*index))
                    .unwrap_or(0);
                let due = stamp.saturating_add(*minutes);
                let remaining = due.saturating_sub(services.clock.now_minutes());
                let text = render(template, &Placeholders::from_context(ctx));
                effects.say(format!("{} {}.", text, approx_duration(remaining)));
            }
            Effect::StartRecordingRandomItem { slot, index, items, template } => {
                let Some(slot) = resolve_slot(ctx, slot) else {
                    return Ok(());
                };
                let Some((item, qty)) = items.choose(&mut rand::thread_rng()) else {
                    warn!("Random item list for '{}' is empty", slot);
                    return Ok(());
                };
                store.set_field(player, slot, *index, &format!("{}={}", item, qty))?;
                effects.mark_applied();
                let values = Placeholders::from_context(ctx).with_item(item, *qty);
                effects.say(render(template, &values));
            }
            Effect::CollectRequestedItem {
                slot,
                item,
                more_needed,
                already_brought,
                on_complete,
                complete_state,
            } => {
                let Some(slot) = resolve_slot(ctx, slot) else {
                    return Ok(());
                };
                collect_requested_item(
                    ctx,
                    effects,
                    slot,
                    item,
                    more_needed,
                    already_brought.as_deref(),
                    on_complete,
                    *complete_state,
                )?;
            }
            Effect::SetState(state) => effects.set_state(*state),
            Effect::Custom { id, params } => match ctx.extensions.effect(id) {
                Some(f) => {
                    f(ctx, params, effects)?;
                    effects.mark_applied();
                }
                None => warn!("Unknown custom effect '{}', skipping", id),
            },
        }
        Ok(())
    }
}

fn resolve_slot<'s>(ctx: &'s EvaluationContext<'_>, explicit: &'s Option<String>) -> Option<&'s str> {
    let slot = ctx.slot(explicit.as_deref());
    if slot.is_none() {
        warn!("Quest effect has no slot to write, skipping");
    }
    slot
}

fn recorded_item(ctx: &EvaluationContext<'_>, slot: &str, index: usize) -> Option<(String, u32)> {
    ctx.services
        .slots
        .get_field(ctx.player, slot, index)
        .and_then(|field| parse_recorded_item(&field))
}

#[allow(clippy::too_many_arguments)]
fn collect_requested_item(
    ctx: &EvaluationContext<'_>,
    effects: &mut Effects,
    slot: &str,
    item: &str,
    more_needed: &str,
    already_brought: Option<&str>,
    on_complete: &Action,
    complete_state: ConversationState,
) -> Result<(), ActionError> {
    let store = ctx.services.slots.as_ref();
    let inventory = ctx.services.inventory.as_ref();

    let mut owed = ItemRequirementSet::from_encoded(&store.get(ctx.player, slot).unwrap_or_default());
    let needed = owed.quantity(item);
    if needed == 0 {
        let values = Placeholders::from_context(ctx).with_item(item, 0);
        let text = already_brought.unwrap_or("You have already brought me enough [item].");
        effects.say(render(text, &values));
        return Ok(());
    }

    let brought = inventory.count(ctx.player, item).min(needed);
    if brought == 0 {
        return Err(ActionError::MissingItem {
            item: item.to_string(),
            quantity: needed,
        });
    }

    inventory.drop_items(ctx.player, item, brought)?;
    owed.remove(item, brought);
    store.set(ctx.player, slot, &owed.to_encoded())?;
    effects.mark_applied();

    if owed.is_empty() {
        on_complete.execute(ctx, effects)?;
        effects.set_state(complete_state);
    } else {
        let values = Placeholders::from_context(ctx)
            .with_items(&owed)
            .with_item(item, brought);
        effects.say(render(more_needed, &values));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::{Extensions, Params};
    use crate::sentence::Sentence;
    use crate::services::{Inventory, PlayerStats};
    use crate::test_support::Harness;
    use crate::time::Clock;

    fn slot(name: &str) -> Option<String> {
        Some(name.to_string())
    }

    #[test]
    fn test_multiple_stops_at_first_failure() {
        let h = Harness::with_capacity(1);
        h.inventory.equip(&h.player, "wood", 1).unwrap();
        let sentence = Sentence::empty();
        let ext = Extensions::new();
        let ctx = h.context(&sentence, &ext);

        let action = Action::multiple(vec![
            Effect::SetQuest { slot: slot("elf"), index: None, value: "start".into() }.into(),
            Effect::EquipItem { item: "rhosyd".into(), quantity: 1 }.into(),
            Effect::IncreaseKarma(10.0).into(),
        ]);
        let mut effects = Effects::new();
        let err = action.execute(&ctx, &mut effects).unwrap_err();

        assert!(matches!(err, ActionError::InventoryFull { .. }));
        assert_eq!(h.slots.get(&h.player, "elf").as_deref(), Some("start"));
        assert_eq!(h.stats.karma(&h.player), 0.0);
        assert!(effects.applied());
    }

    #[test]
    fn test_timestamp_and_increment() {
        let h = Harness::new();
        let sentence = Sentence::empty();
        let ext = Extensions::new();
        let ctx = h.context(&sentence, &ext).with_quest_slot(Some("elf"));

        let action = Action::multiple(vec![
            Effect::SetQuest { slot: None, index: Some(0), value: "flower_brought".into() }.into(),
            Effect::SetQuestToTimestamp { slot: None, index: 1 }.into(),
            Effect::IncrementQuest { slot: None, index: 2, by: 1 }.into(),
        ]);
        let mut effects = Effects::new();
        action.execute(&ctx, &mut effects).unwrap();
        action.execute(&ctx, &mut effects).unwrap();

        let now = h.clock.now_minutes();
        assert_eq!(h.slots.get(&h.player, "elf"), Some(format!("flower_brought;{};2", now)));
    }

    #[test]
    fn test_xp_dependent_on_level() {
        let h = Harness::new();
        h.stats.set_level(&h.player, 10);
        let sentence = Sentence::empty();
        let ext = Extensions::new();
        let ctx = h.context(&sentence, &ext);
        let before = h.stats.xp(&h.player);
        let gap = h.stats.xp_to_next_level(&h.player);

        let mut effects = Effects::new();
        Effect::IncreaseXpDependentOnLevel { divisor: 8, level_cap: 90 }
            .apply(&ctx, &mut effects)
            .unwrap();
        assert_eq!(h.stats.xp(&h.player), before + gap / 8);

        h.stats.set_level(&h.player, 95);
        let before = h.stats.xp(&h.player);
        Effect::IncreaseXpDependentOnLevel { divisor: 8, level_cap: 90 }
            .apply(&ctx, &mut effects)
            .unwrap();
        assert_eq!(h.stats.xp(&h.player), before);
    }

    #[test]
    fn test_collect_requested_item() {
        let h = Harness::new();
        h.slots.set(&h.player, "herbs", "arandula=5;wood=2").unwrap();
        h.inventory.equip(&h.player, "arandula", 3).unwrap();
        h.inventory.equip(&h.player, "wood", 2).unwrap();
        let sentence = Sentence::empty();
        let ext = Extensions::new();
        let ctx = h.context(&sentence, &ext).with_quest_slot(Some("herbs"));

        let collect = |item: &str| Effect::CollectRequestedItem {
            slot: None,
            item: item.to_string(),
            more_needed: "Thanks. I still need [items].".to_string(),
            already_brought: None,
            on_complete: Box::new(Effect::SetQuest { slot: None, index: None, value: "done".into() }.into()),
            complete_state: ConversationState::Attending,
        };

        let mut effects = Effects::new();
        collect("arandula").apply(&ctx, &mut effects).unwrap();
        assert_eq!(h.slots.get(&h.player, "herbs").as_deref(), Some("arandula=2;wood=2"));
        assert_eq!(effects.lines(), ["Thanks. I still need 2 arandula and 2 wood."]);
        assert_eq!(h.inventory.count(&h.player, "arandula"), 0);

        let err = collect("arandula").apply(&ctx, &mut Effects::new()).unwrap_err();
        assert!(matches!(err, ActionError::MissingItem { .. }));

        h.inventory.equip(&h.player, "arandula", 10).unwrap();
        collect("arandula").apply(&ctx, &mut Effects::new()).unwrap();
        assert_eq!(h.inventory.count(&h.player, "arandula"), 8);

        let mut effects = Effects::new();
        collect("wood").apply(&ctx, &mut effects).unwrap();
        assert_eq!(h.slots.get(&h.player, "herbs").as_deref(), Some("done"));
        assert_eq!(effects.state(), Some(ConversationState::Attending));

        let mut effects = Effects::new();
        collect("wood").apply(&ctx, &mut effects).unwrap();
        assert_eq!(effects.lines(), ["You have already brought me enough wood."]);
    }

    #[test]
    fn test_record_random_item_and_drop_it() {
        let h = Harness::new();
        let sentence = Sentence::empty();
        let ext = Extensions::new();
        let ctx = h.context(&sentence, &ext).with_quest_slot(Some("daily"));

        let mut effects = Effects::new();
        Effect::StartRecordingRandomItem {
            slot: None,
            index: 0,
            items: vec![("apple".to_string(), 5)],
            template: "Fetch [quantity] [item].".to_string(),
        }
        .apply(&ctx, &mut effects)
        .unwrap();
        assert_eq!(h.slots.get(&h.player, "daily").as_deref(), Some("apple=5"));
        assert_eq!(effects.lines(), ["Fetch 5 apple."]);

        let drop = Effect::DropRecordedItem { slot: None, index: 0 };
        assert!(drop.apply(&ctx, &mut Effects::new()).is_err());
        h.inventory.equip(&h.player, "apple", 6).unwrap();
        drop.apply(&ctx, &mut Effects::new()).unwrap();
        assert_eq!(h.inventory.count(&h.player, "apple"), 1);
    }

    #[test]
    fn test_say_time_remaining() {
        let h = Harness::new();
        let now = h.clock.now_minutes();
        h.slots.set(&h.player, "daily", &format!("done;{};1", now - 100)).unwrap();
        let sentence = Sentence::empty();
        let ext = Extensions::new();
        let ctx = h.context(&sentence, &ext).with_quest_slot(Some("daily"));

        let mut effects = Effects::new();
        Effect::SayTimeRemaining {
            slot: None,
            index: 1,
            minutes: 1440,
            template: "Come back in".to_string(),
        }
        .apply(&ctx, &mut effects)
        .unwrap();
        assert_eq!(effects.lines(), ["Come back in 22 hours and 20 minutes."]);
    }

    #[test]
    fn test_equip_random_amount() {
        let h = Harness::new();
        let sentence = Sentence::empty();
        let ext = Extensions::new();
        let ctx = h.context(&sentence, &ext);

        let mut effects = Effects::new();
        Effect::EquipRandomAmount {
            item: "gold bar".into(),
            step: 5,
            rolls: 6,
            template: Some("Take these [quantity] [item]s.".into()),
        }
        .apply(&ctx, &mut effects)
        .unwrap();
        let count = h.inventory.count(&h.player, "gold bar");
        assert!((5..=30).contains(&count) && count % 5 == 0);
        assert_eq!(effects.lines(), [format!("Take these {} gold bars.", count)]);
    }

    #[test]
    fn test_equip_random_amount_saturates() {
        let h = Harness::new();
        let sentence = Sentence::empty();
        let ext = Extensions::new();
        let ctx = h.context(&sentence, &ext);

        let mut effects = Effects::new();
        Effect::EquipRandomAmount {
            item: "gold bar".into(),
            step: u32::MAX,
            rolls: 4,
            template: None,
        }
        .apply(&ctx, &mut effects)
        .unwrap();
        assert_eq!(h.inventory.count(&h.player, "gold bar"), u32::MAX);
        assert!(effects.lines().is_empty());
    }

    #[test]
    fn test_custom_effect() {
        let h = Harness::new();
        let sentence = Sentence::empty();
        let mut ext = Extensions::new();
        ext.register_effect("grant", |ctx, params, effects| {
            let item = params.get("item").map(String::as_str).unwrap_or("apple");
            ctx.services.inventory.equip(ctx.player, item, 1)?;
            effects.say("Here you go.");
            Ok(())
        });
        let ctx = h.context(&sentence, &ext);

        let mut params = Params::new();
        params.insert("item".into(), "pear".into());
        let mut effects = Effects::new();
        Effect::Custom { id: "grant".into(), params }.apply(&ctx, &mut effects).unwrap();
        assert_eq!(h.inventory.count(&h.player, "pear"), 1);
        assert!(effects.applied());

        Effect::Custom { id: "missing".into(), params: Params::new() }
            .apply(&ctx, &mut effects)
            .unwrap();
    }
}
