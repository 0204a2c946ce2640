//! Script Module
//!
//! The condition/action language quest content is written in:
//! - `condition`: pure guards over the evaluation context
//! - `action`: side effects on quest slots, inventory and stats
//! - `context`: evaluation context, effect accumulator, custom leaf table

mod action;
mod condition;
mod context;

pub use action::{Action, Effect};
pub use condition::{Condition, Predicate};
pub use context::{CustomEffect, CustomPredicate, Effects, EvaluationContext, Extensions, Params};
