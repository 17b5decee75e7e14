//! Rule lifecycle: durable storage plus the state machine driving rules
//! between `draft`, `active`, `paused`, and `error`.
//!
//! [`LifecycleManager`] is the single writer of rule state. It serializes
//! operations per rule, retries transient backend failures a bounded
//! number of times, and persists a definite outcome for every transition,
//! even when the caller that asked for it has gone away.

pub mod manager;
pub mod store;

pub use manager::{LifecycleManager, Rejection, RuleAssessment, RuleOutcome};
pub use store::RuleStore;
