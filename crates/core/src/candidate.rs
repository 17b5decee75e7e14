//! Candidate descriptors.
//!
//! A [`CandidateDescriptor`] is the normalized, ephemeral shape of
//! "something that could become a metric": one dashboard panel, one saved
//! search, or one hand-written draft. Descriptors feed the scoring, cost,
//! and guardrail layers; they are never persisted.

use serde::{Deserialize, Serialize};

use crate::rule::{ComputeSpec, MetricRule, RuleOrigin, RuleSpec};

/// What kind of aggregation the source performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationKind {
    /// Events are grouped into fixed time buckets (date histogram).
    TimeBucketed,
    /// Raw/tabular document listing; nothing is aggregated.
    Raw,
    /// Aggregating, but not along event time.
    Other,
}

/// One grouping attribute and what we know about its aggregatability.
/// `None` means the field mapping could not be resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregatable: Option<bool>,
}

impl DimensionSpec {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            aggregatable: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateDescriptor {
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_field: Option<String>,
    /// Opaque query predicate; absent means match-all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    pub aggregation: AggregationKind,
    /// Bucket interval when the source is time-bucketed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_bucket: Option<String>,
    /// The typed compute, when the source carries one we can materialize.
    /// `None` on a non-raw source means "would default to count".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compute: Option<ComputeSpec>,
    /// Aggregation types seen on the source that cannot be materialized
    /// (top_hits and friends). Their presence zeroes the compute signal.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unsupported_aggregations: Vec<String>,
    #[serde(default)]
    pub dimensions: Vec<DimensionSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<RuleOrigin>,
}

/// Live statistics for one source index, gathered by a connector.
/// Input to cost estimation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexStats {
    pub index: String,
    pub doc_count: u64,
    pub store_size_bytes: u64,
    #[serde(default)]
    pub store_size_human: String,
    #[serde(default)]
    pub query_total: u64,
    #[serde(default)]
    pub query_time_ms: u64,
}

/// How the candidate's consumers actually use it, when known. Feeds the
/// behavioral scoring signals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageMetadata {
    /// Relative lookback the dashboard is saved with, e.g. "now-30d".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lookback: Option<String>,
    /// Auto-refresh interval in milliseconds; `None` when refresh is paused.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_interval_ms: Option<u64>,
}

impl RuleSpec {
    /// View a spec as a candidate descriptor for the analysis layers.
    /// A rule is always a time-bucketed aggregation by construction.
    pub fn as_candidate(&self) -> CandidateDescriptor {
        CandidateDescriptor {
            title: self.name.clone(),
            index_pattern: Some(self.source.index_pattern.clone()),
            time_field: Some(self.source.time_field.clone()),
            filter: self.source.filter.as_ref().map(|f| f.to_string()),
            aggregation: AggregationKind::TimeBucketed,
            time_bucket: Some(self.grouping.time_bucket.clone()),
            compute: Some(self.compute.clone()),
            unsupported_aggregations: Vec::new(),
            dimensions: self
                .grouping
                .dimensions
                .iter()
                .map(DimensionSpec::named)
                .collect(),
            origin: self.origin.clone(),
        }
    }
}

impl MetricRule {
    /// View a rule as a candidate descriptor for re-running the analysis
    /// layers on a status transition toward active.
    pub fn as_candidate(&self) -> CandidateDescriptor {
        CandidateDescriptor {
            title: self.name.clone(),
            index_pattern: Some(self.source.index_pattern.clone()),
            time_field: Some(self.source.time_field.clone()),
            filter: self.source.filter.as_ref().map(|f| f.to_string()),
            aggregation: AggregationKind::TimeBucketed,
            time_bucket: Some(self.grouping.time_bucket.clone()),
            compute: Some(self.compute.clone()),
            unsupported_aggregations: Vec::new(),
            dimensions: self
                .grouping
                .dimensions
                .iter()
                .map(DimensionSpec::named)
                .collect(),
            origin: self.origin.clone(),
        }
    }
}
