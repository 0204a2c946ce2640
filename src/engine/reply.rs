//! Reply templates
//!
//! Replies and action texts may contain bracketed placeholders:
//! `[items]`, `[item]`, `[quantity]`, `[npc]`, `[player]`, `[repetitions]`.
//! Values come from the context and the owning quest's slot. Placeholders
//! without a value are left as written.

use crate::script::EvaluationContext;
use crate::slot::{parse_recorded_item, ItemRequirementSet, QuestSlotStore, STATUS_FIELD};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Placeholders {
    pub items: Option<String>,
    pub item: Option<String>,
    pub quantity: Option<u32>,
    pub npc: Option<String>,
    pub player: Option<String>,
    pub repetitions: Option<u64>,
}

impl Placeholders {
    /// Resolve what the context knows about
    pub fn from_context(ctx: &EvaluationContext<'_>) -> Self {
        let mut values = Self {
            npc: ctx.npc_name.map(str::to_string),
            player: Some(ctx.player.to_string()),
            ..Self::default()
        };

        let Some(slot) = ctx.quest_slot else {
            return values;
        };
        let store = ctx.services.slots.as_ref();
        if let Some(raw) = store.get(ctx.player, slot) {
            let set = ItemRequirementSet::from_encoded(&raw);
            if !set.is_empty() {
                values = values.with_items(&set);
            } else if let Some((item, qty)) = store
                .get_field(ctx.player, slot, STATUS_FIELD)
                .and_then(|f| parse_recorded_item(&f))
            {
                values = values.with_item(&item, qty);
            }
        }
        values.repetitions = Some(store.repetitions(ctx.player, slot));
        values
    }

    pub fn with_items(mut self, set: &ItemRequirementSet) -> Self {
        self.items = Some(set.display_list());
        if let Some((name, qty)) = set.first() {
            self.item = Some(name.to_string());
            self.quantity = Some(qty);
        }
        self
    }

    pub fn with_item(mut self, name: &str, quantity: u32) -> Self {
        self.item = Some(name.to_string());
        self.quantity = Some(quantity);
        self
    }
}

pub fn render(template: &str, values: &Placeholders) -> String {
    let quantity = values.quantity.map(|q| q.to_string());
    let repetitions = values.repetitions.map(|r| r.to_string());
    let substitutions = [
        ("[items]", values.items.as_deref()),
        ("[item]", values.item.as_deref()),
        ("[quantity]", quantity.as_deref()),
        ("[npc]", values.npc.as_deref()),
        ("[player]", values.player.as_deref()),
        ("[repetitions]", repetitions.as_deref()),
    ];

    let mut out = template.to_string();
    for (key, value) in substitutions {
        if let Some(value) = value {
            if out.contains(key) {
                out = out.replace(key, value);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::Extensions;
    use crate::sentence::Sentence;
    use crate::test_support::Harness;

    #[test]
    fn test_render_leaves_unknown_placeholders() {
        let values = Placeholders::default().with_item("apple", 3);
        assert_eq!(render("Bring [quantity] [item].", &values), "Bring 3 apple.");
        assert_eq!(render("Hello [player]", &values), "Hello [player]");
        assert_eq!(render("[gold]", &values), "[gold]");
    }

    #[test]
    fn test_resolve_from_requirement_slot() {
        let h = Harness::new();
        h.slots.set(&h.player, "herbs", "arandula=5;wood=2").unwrap();
        let sentence = Sentence::empty();
        let ext = Extensions::new();
        let ctx = h.context(&sentence, &ext).with_npc("Carmen").with_quest_slot(Some("herbs"));

        let values = Placeholders::from_context(&ctx);
        assert_eq!(
            render("[npc] needs [items]; first [quantity] [item], [player].", &values),
            "Carmen needs 5 arandula and 2 wood; first 5 arandula, alice."
        );
    }

    #[test]
    fn test_resolve_recorded_item_and_repetitions() {
        let h = Harness::new();
        h.slots.set(&h.player, "daily", "golden arrow=5;100;4").unwrap();
        let sentence = Sentence::empty();
        let ext = Extensions::new();
        let ctx = h.context(&sentence, &ext).with_quest_slot(Some("daily"));

        let values = Placeholders::from_context(&ctx);
        assert_eq!(values.item.as_deref(), Some("golden arrow"));
        assert_eq!(values.quantity, Some(5));
        assert_eq!(values.repetitions, Some(4));
    }
}
