//! Metric rule domain model.
//!
//! A [`MetricRule`] is the durable record describing one logs-to-metrics
//! conversion: which log index feeds it, how events are bucketed and grouped,
//! what value is computed, and how long the materialized points are kept.
//! Status and timestamps are owned by the lifecycle manager; every other
//! field is caller-supplied through [`RuleSpec`] / [`RuleUpdate`].

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::duration::{parse_duration, resolve_check_frequency};
use crate::error::{L2mError, Result};

// ── Defaults ────────────────────────────────────────────────────────

pub const DEFAULT_TIME_FIELD: &str = "timestamp";
pub const DEFAULT_TIME_BUCKET: &str = "1m";
/// How long a time bucket stays open for late-arriving events.
pub const DEFAULT_LATE_DATA_BUFFER: &str = "30s";
pub const DEFAULT_RETENTION_DAYS: u32 = 450;
pub const MAX_RETENTION_DAYS: u32 = 730;
pub const DEFAULT_PERCENTILES: [f64; 5] = [50.0, 75.0, 90.0, 95.0, 99.0];

const MAX_NAME_LEN: usize = 200;
/// Structural ceiling on grouping dimensions. The guardrail layer applies a
/// tighter limit; this one only rejects nonsense input.
const MAX_STRUCTURAL_DIMENSIONS: usize = 10;

// ── Enums ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComputeKind {
    Count,
    Sum,
    Avg,
    Distribution,
}

impl ComputeKind {
    /// Kinds that read a numeric source field.
    pub fn needs_value_field(&self) -> bool {
        !matches!(self, ComputeKind::Count)
    }
}

impl fmt::Display for ComputeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ComputeKind::Count => "count",
            ComputeKind::Sum => "sum",
            ComputeKind::Avg => "avg",
            ComputeKind::Distribution => "distribution",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleStatus {
    #[default]
    Draft,
    Active,
    Paused,
    Error,
}

impl fmt::Display for RuleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RuleStatus::Draft => "draft",
            RuleStatus::Active => "active",
            RuleStatus::Paused => "paused",
            RuleStatus::Error => "error",
        };
        write!(f, "{}", s)
    }
}

// ── Nested value objects ────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSource {
    pub index_pattern: String,
    #[serde(default = "default_time_field")]
    pub time_field: String,
    /// Optional query-DSL filter applied to the source, verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<serde_json::Value>,
}

fn default_time_field() -> String {
    DEFAULT_TIME_FIELD.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleGrouping {
    #[serde(default = "default_time_bucket")]
    pub time_bucket: String,
    #[serde(default)]
    pub dimensions: Vec<String>,
    /// How often the backend job looks for new data. `None` means "auto",
    /// resolved to max(time_bucket, 1m) when the rule is accepted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_frequency: Option<String>,
    #[serde(default = "default_late_data_buffer")]
    pub late_data_buffer: String,
}

fn default_time_bucket() -> String {
    DEFAULT_TIME_BUCKET.to_string()
}

fn default_late_data_buffer() -> String {
    DEFAULT_LATE_DATA_BUFFER.to_string()
}

impl Default for RuleGrouping {
    fn default() -> Self {
        Self {
            time_bucket: default_time_bucket(),
            dimensions: Vec::new(),
            check_frequency: None,
            late_data_buffer: default_late_data_buffer(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputeSpec {
    pub kind: ComputeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentiles: Option<Vec<f64>>,
}

impl ComputeSpec {
    /// Name of the materialized output field. The store reserves
    /// `doc_count`, so counts land in `event_count`.
    pub fn output_field(&self) -> String {
        let field = self.value_field.as_deref().unwrap_or_default();
        match self.kind {
            ComputeKind::Count => "event_count".to_string(),
            ComputeKind::Sum => format!("sum_{}", field),
            ComputeKind::Avg => format!("avg_{}", field),
            ComputeKind::Distribution => format!("pct_{}", field),
        }
    }
}

/// Back-reference to the dashboard panel a rule was derived from. Pure
/// metadata: never re-read, never re-validated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleOrigin {
    pub dashboard_id: String,
    #[serde(default)]
    pub dashboard_title: String,
    pub panel_id: String,
    #[serde(default)]
    pub panel_title: String,
}

/// Identifiers of the externally-materialized resources backing an active
/// rule, as returned by the backend at provision time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceHandles {
    pub transform_id: String,
    pub metrics_index: String,
    pub retention_policy: String,
}

/// Audit record written when a caller creates a rule past failing guardrails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardrailOverride {
    pub failed_checks: Vec<String>,
    pub overridden_at: DateTime<Utc>,
}

// ── The durable rule ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRule {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub owner: String,
    pub source: RuleSource,
    pub grouping: RuleGrouping,
    pub compute: ComputeSpec,
    pub retention_days: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<RuleOrigin>,
    pub status: RuleStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceHandles>,
    /// Verbatim downstream detail of the most recent failed activation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guardrail_override: Option<GuardrailOverride>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ── Creation / update payloads ──────────────────────────────────────

/// Caller-supplied rule specification. Defaults are resolved once, at
/// acceptance time, and stored concrete on the rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSpec {
    pub name: String,
    #[serde(default)]
    pub owner: String,
    pub source: RuleSource,
    #[serde(default)]
    pub grouping: RuleGrouping,
    pub compute: ComputeSpec,
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<RuleOrigin>,
    /// Desired status after creation: `draft` (default) or `active`.
    #[serde(default)]
    pub status: RuleStatus,
}

fn default_retention_days() -> u32 {
    DEFAULT_RETENTION_DAYS
}

/// Partial update; absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RuleUpdate {
    pub name: Option<String>,
    pub owner: Option<String>,
    pub source: Option<RuleSource>,
    pub grouping: Option<RuleGrouping>,
    pub compute: Option<ComputeSpec>,
    pub retention_days: Option<u32>,
    pub origin: Option<RuleOrigin>,
    pub status: Option<RuleStatus>,
}

impl RuleSpec {
    /// Fill every optional/defaultable field with its documented default.
    /// Resolved values are fixed into the external resource at provision
    /// time, so this runs exactly once per accepted spec.
    pub fn resolve_defaults(&mut self) {
        if self.source.time_field.trim().is_empty() {
            self.source.time_field = default_time_field();
        }
        if self.grouping.time_bucket.trim().is_empty() {
            self.grouping.time_bucket = default_time_bucket();
        }
        if self.grouping.late_data_buffer.trim().is_empty() {
            self.grouping.late_data_buffer = default_late_data_buffer();
        }
        self.grouping.check_frequency = Some(resolve_check_frequency(
            self.grouping.check_frequency.as_deref(),
            &self.grouping.time_bucket,
        ));
        if self.compute.kind == ComputeKind::Distribution && self.compute.percentiles.is_none() {
            self.compute.percentiles = Some(DEFAULT_PERCENTILES.to_vec());
        }
    }

    /// Structural validation. Call after [`resolve_defaults`](Self::resolve_defaults).
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(L2mError::validation("name", "must not be empty"));
        }
        if self.name.len() > MAX_NAME_LEN {
            return Err(L2mError::validation(
                "name",
                format!("must be at most {} characters", MAX_NAME_LEN),
            ));
        }
        if self.source.index_pattern.trim().is_empty() {
            return Err(L2mError::validation(
                "source.index_pattern",
                "must not be empty",
            ));
        }
        if self.retention_days == 0 || self.retention_days > MAX_RETENTION_DAYS {
            return Err(L2mError::validation(
                "retention_days",
                format!("must be between 1 and {}", MAX_RETENTION_DAYS),
            ));
        }
        if parse_duration(&self.grouping.time_bucket).is_none() {
            return Err(L2mError::validation(
                "grouping.time_bucket",
                format!("`{}` is not a valid duration", self.grouping.time_bucket),
            ));
        }
        if parse_duration(&self.grouping.late_data_buffer).is_none() {
            return Err(L2mError::validation(
                "grouping.late_data_buffer",
                format!(
                    "`{}` is not a valid duration",
                    self.grouping.late_data_buffer
                ),
            ));
        }
        if let Some(freq) = &self.grouping.check_frequency {
            if parse_duration(freq).is_none() {
                return Err(L2mError::validation(
                    "grouping.check_frequency",
                    format!("`{}` is not a valid duration", freq),
                ));
            }
        }
        validate_dimensions(&self.grouping.dimensions)?;
        validate_compute(&self.compute)?;
        match self.status {
            RuleStatus::Draft | RuleStatus::Active => {}
            other => {
                return Err(L2mError::validation(
                    "status",
                    format!("desired status must be draft or active, got `{}`", other),
                ));
            }
        }
        Ok(())
    }

    /// Do `self` and `other` differ in any field that the backend bakes into
    /// the provisioned resource? Name and owner changes never re-provision.
    pub fn provisioning_relevant_change(rule: &MetricRule, update: &RuleUpdate) -> bool {
        if let Some(source) = &update.source {
            if *source != rule.source {
                return true;
            }
        }
        if let Some(grouping) = &update.grouping {
            if *grouping != rule.grouping {
                return true;
            }
        }
        if let Some(compute) = &update.compute {
            if *compute != rule.compute {
                return true;
            }
        }
        if let Some(days) = update.retention_days {
            if days != rule.retention_days {
                return true;
            }
        }
        false
    }
}

fn validate_dimensions(dimensions: &[String]) -> Result<()> {
    if dimensions.len() > MAX_STRUCTURAL_DIMENSIONS {
        return Err(L2mError::validation(
            "grouping.dimensions",
            format!("at most {} dimensions allowed", MAX_STRUCTURAL_DIMENSIONS),
        ));
    }
    for (i, dim) in dimensions.iter().enumerate() {
        if dim.trim().is_empty() {
            return Err(L2mError::validation(
                "grouping.dimensions",
                format!("dimension {} is empty", i),
            ));
        }
        if dimensions[..i].contains(dim) {
            return Err(L2mError::validation(
                "grouping.dimensions",
                format!("duplicate dimension `{}`", dim),
            ));
        }
    }
    Ok(())
}

/// Compute kind and value field / percentiles must be mutually consistent.
/// Inconsistent combinations are rejected, never coerced.
fn validate_compute(compute: &ComputeSpec) -> Result<()> {
    match compute.kind {
        ComputeKind::Count => {
            if compute.value_field.is_some() {
                return Err(L2mError::validation(
                    "compute.value_field",
                    "count does not take a value field",
                ));
            }
            if compute.percentiles.is_some() {
                return Err(L2mError::validation(
                    "compute.percentiles",
                    "percentiles only apply to distribution",
                ));
            }
        }
        ComputeKind::Sum | ComputeKind::Avg => {
            if compute
                .value_field
                .as_deref()
                .map_or(true, |f| f.trim().is_empty())
            {
                return Err(L2mError::validation(
                    "compute.value_field",
                    format!("{} requires a value field", compute.kind),
                ));
            }
            if compute.percentiles.is_some() {
                return Err(L2mError::validation(
                    "compute.percentiles",
                    "percentiles only apply to distribution",
                ));
            }
        }
        ComputeKind::Distribution => {
            if compute
                .value_field
                .as_deref()
                .map_or(true, |f| f.trim().is_empty())
            {
                return Err(L2mError::validation(
                    "compute.value_field",
                    "distribution requires a value field",
                ));
            }
            let percentiles = compute.percentiles.as_deref().ok_or_else(|| {
                L2mError::validation("compute.percentiles", "distribution requires percentiles")
            })?;
            if percentiles.is_empty() {
                return Err(L2mError::validation(
                    "compute.percentiles",
                    "must not be empty",
                ));
            }
            let mut prev: Option<f64> = None;
            for &p in percentiles {
                if p <= 0.0 || p >= 100.0 {
                    return Err(L2mError::validation(
                        "compute.percentiles",
                        format!("{} is outside (0, 100)", p),
                    ));
                }
                if let Some(prev) = prev {
                    if p <= prev {
                        return Err(L2mError::validation(
                            "compute.percentiles",
                            "must be strictly ascending",
                        ));
                    }
                }
                prev = Some(p);
            }
        }
    }
    Ok(())
}

// ── Tests ───────────────────────────────────────────────────────────
