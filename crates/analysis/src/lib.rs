//! Analysis layers for log-to-metric conversion.
//!
//! This crate provides:
//! - Suitability scoring (0-95) with a per-signal breakdown
//! - Storage cost estimation comparing logs vs materialized metrics
//! - Pre-creation guardrails with remediation text
//!
//! Everything here is a pure function: no I/O, no clock, no randomness.
//! Connector-supplied inputs (index stats, cardinalities) arrive as
//! plain values so the same code serves live requests and tests.

pub mod cost;
pub mod guardrails;
pub mod scoring;

pub use cost::{estimate, CostEstimate};
pub use guardrails::{evaluate, GuardrailCheck, GuardrailLimits, GuardrailReport};
pub use scoring::{score, ScoreBreakdown, SuitabilityScore};
