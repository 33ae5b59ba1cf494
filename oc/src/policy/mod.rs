//! Conflict policy
//!
//! Decides, for an operation already active on a memo and a newly proposed
//! operation on the same memo, whether they conflict and how:
//!
//! - **queue:** keep the new operation pending until the conflict clears
//! - **cancel:** reject the new operation
//! - **replace:** cancel the existing operation, start the new one
//! - **allow:** compatible, start the new one
//!
//! The pairing table is data (see [`default_rules`] and the `policy` section of
//! the config file), not code at call sites.

mod strategy;
mod table;

pub use strategy::{OperationConflict, ResolutionStrategy, strongest};
pub use table::{ConflictPolicy, PolicyRule, RuleCondition, default_rules};
