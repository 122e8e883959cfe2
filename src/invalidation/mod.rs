//! Invalidation Module
//!
//! Rule-driven invalidation: triggers, conditions and targets, the engine
//! that fires them, the cascade dependency graph and the event history.

mod deps;
mod engine;
mod history;
mod rules;

pub use deps::DependencyGraph;
pub use engine::{InvalidationEngine, InvalidationStats, TriggerReport};
pub use history::{EventHistory, InvalidationEvent};
pub use rules::{
    fill_placeholders, lookup, Condition, ConditionOp, InvalidationRule, Target, TargetKind, Trigger, TriggerSource,
    TriggerType,
};
