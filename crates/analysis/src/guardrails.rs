//! Pre-creation guardrails for log-to-metric rules.
//!
//! Catches rules that would create excessive cardinality, group by
//! unbounded identifiers, or cost more than the logs they replace.
//! Evaluation is total: all four checks always run in a fixed order,
//! so the caller sees every violation at once.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use l2m_core::candidate::CandidateDescriptor;

use crate::cost::CostEstimate;

// ── Thresholds ────────────────────────────────────────────────

pub const MAX_DIMENSIONS: usize = 5;
pub const MAX_SERIES_COUNT: u64 = 100_000;

/// Field names that are in practice unbounded identifiers. Grouping by
/// one of these explodes the series count. Matched by exact name,
/// case-insensitive, never by substring.
const HIGH_CARDINALITY_FIELDS: &[&str] = &[
    "user_id",
    "userid",
    "user_name",
    "username",
    "request_id",
    "requestid",
    "req_id",
    "session_id",
    "sessionid",
    "trace_id",
    "traceid",
    "span_id",
    "spanid",
    "transaction_id",
    "txn_id",
    "ip",
    "ip_address",
    "client_ip",
    "source_ip",
    "uuid",
    "guid",
    "correlation_id",
    "message",
    "msg",
    "log",
    "body",
];

/// Built-in denylist of unbounded identifier field names.
pub fn default_denylist() -> Vec<String> {
    HIGH_CARDINALITY_FIELDS.iter().map(|s| s.to_string()).collect()
}

// ── Models ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardrailLimits {
    pub max_dimensions: usize,
    pub max_series: u64,
}

impl Default for GuardrailLimits {
    fn default() -> Self {
        Self {
            max_dimensions: MAX_DIMENSIONS,
            max_series: MAX_SERIES_COUNT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardrailCheck {
    pub name: String,
    pub passed: bool,
    pub explanation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_fix: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardrailReport {
    pub all_passed: bool,
    pub checks: Vec<GuardrailCheck>,
}

// ── Public API ────────────────────────────────────────────────

/// Run all guardrails against a candidate and its cost estimate.
///
/// Checks run in a fixed order: dimension limit, cardinality ceiling,
/// denylisted dimensions, net savings. All four always appear in the
/// report regardless of how many fail.
pub fn evaluate(
    descriptor: &CandidateDescriptor,
    cost: &CostEstimate,
    cardinalities: &HashMap<String, u64>,
    denylist: &[String],
    limits: &GuardrailLimits,
) -> GuardrailReport {
    let mut checks = Vec::with_capacity(4);

    check_dimension_limit(descriptor, limits, &mut checks);
    check_cardinality(cost, cardinalities, limits, &mut checks);
    check_denylisted_dimensions(descriptor, denylist, &mut checks);
    check_net_savings(cost, &mut checks);

    GuardrailReport {
        all_passed: checks.iter().all(|c| c.passed),
        checks,
    }
}

// ── Individual checks ─────────────────────────────────────────

fn check_dimension_limit(
    descriptor: &CandidateDescriptor,
    limits: &GuardrailLimits,
    out: &mut Vec<GuardrailCheck>,
) {
    let count = descriptor.dimensions.len();

    if count <= limits.max_dimensions {
        out.push(GuardrailCheck {
            name: "dimension_limit".to_string(),
            passed: true,
            explanation: format!(
                "Rule uses {} dimension(s) (limit: {}).",
                count, limits.max_dimensions
            ),
            suggested_fix: None,
        });
    } else {
        let excess: Vec<&str> = descriptor.dimensions[limits.max_dimensions..]
            .iter()
            .map(|d| d.name.as_str())
            .collect();
        out.push(GuardrailCheck {
            name: "dimension_limit".to_string(),
            passed: false,
            explanation: format!(
                "Rule uses {} dimensions, exceeding the limit of {}. Every \
                 extra dimension multiplies the metric series count.",
                count, limits.max_dimensions
            ),
            suggested_fix: Some(format!(
                "Reduce to at most {} dimensions. Remove the least important \
                 group-by fields: {}.",
                limits.max_dimensions,
                excess.join(", ")
            )),
        });
    }
}

fn check_cardinality(
    cost: &CostEstimate,
    cardinalities: &HashMap<String, u64>,
    limits: &GuardrailLimits,
    out: &mut Vec<GuardrailCheck>,
) {
    let series = cost.estimated_series_count;

    if series < limits.max_series {
        out.push(GuardrailCheck {
            name: "cardinality".to_string(),
            passed: true,
            explanation: format!(
                "Estimated series count: {} (limit: {}).",
                series, limits.max_series
            ),
            suggested_fix: None,
        });
    } else {
        let mut fix = "Remove high-cardinality dimensions or add a filter to \
                       reduce the number of unique dimension combinations."
            .to_string();
        if let Some((name, card)) = widest_dimension(cardinalities) {
            fix.push_str(&format!(
                " The widest dimension is {} (~{} distinct values).",
                name, card
            ));
        }
        out.push(GuardrailCheck {
            name: "cardinality".to_string(),
            passed: false,
            explanation: format!(
                "Estimated series count is {}, at or above the limit of {}. \
                 This would create excessive metric data.",
                series, limits.max_series
            ),
            suggested_fix: Some(fix),
        });
    }
}

fn check_denylisted_dimensions(
    descriptor: &CandidateDescriptor,
    denylist: &[String],
    out: &mut Vec<GuardrailCheck>,
) {
    let flagged: Vec<&str> = descriptor
        .dimensions
        .iter()
        .map(|d| d.name.as_str())
        .filter(|name| denylist.iter().any(|b| b.eq_ignore_ascii_case(name)))
        .collect();

    if flagged.is_empty() {
        out.push(GuardrailCheck {
            name: "high_cardinality_fields".to_string(),
            passed: true,
            explanation: "No known high-cardinality field names detected.".to_string(),
            suggested_fix: None,
        });
    } else {
        let list = flagged.join(", ");
        out.push(GuardrailCheck {
            name: "high_cardinality_fields".to_string(),
            passed: false,
            explanation: format!(
                "Dimension(s) {} are typically unbounded high-cardinality \
                 fields. Grouping by these produces an excessive number of \
                 metric series.",
                list
            ),
            suggested_fix: Some(format!(
                "Remove {} from group-by dimensions. Use these fields in \
                 filters instead if needed.",
                list
            )),
        });
    }
}

fn check_net_savings(cost: &CostEstimate, out: &mut Vec<GuardrailCheck>) {
    if cost.savings_bytes > 0 {
        out.push(GuardrailCheck {
            name: "net_savings".to_string(),
            passed: true,
            explanation: format!(
                "Estimated savings: {} ({:.1}%). Metric storage ({}) is less \
                 than log storage ({}).",
                fmt_gb(cost.savings_bytes as u64),
                cost.savings_pct,
                fmt_gb(cost.metric_storage_bytes),
                fmt_gb(cost.log_storage_bytes)
            ),
            suggested_fix: None,
        });
    } else {
        out.push(GuardrailCheck {
            name: "net_savings".to_string(),
            passed: false,
            explanation: format!(
                "Metric storage ({}) would meet or exceed log storage ({}). \
                 This conversion would increase costs.",
                fmt_gb(cost.metric_storage_bytes),
                fmt_gb(cost.log_storage_bytes)
            ),
            suggested_fix: Some(
                "Use a larger time bucket (e.g. '5m' instead of '1m') or \
                 reduce the number of dimensions to decrease the metric \
                 series count."
                    .to_string(),
            ),
        });
    }
}

// ── Helpers ───────────────────────────────────────────────────

/// Highest-cardinality dimension, ties broken by name for determinism.
fn widest_dimension(cardinalities: &HashMap<String, u64>) -> Option<(&str, u64)> {
    cardinalities
        .iter()
        .map(|(name, card)| (name.as_str(), *card))
        .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(a.0)))
}

fn fmt_gb(bytes: u64) -> String {
    format!("{:.4} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
}

// ── Tests ─────────────────────────────────────────────────────
