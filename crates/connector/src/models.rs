//! Typed responses from the cluster connectors.

use serde::{Deserialize, Serialize};

use l2m_core::candidate::{CandidateDescriptor, UsageMetadata};

// ── Log store ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexInfo {
    pub name: String,
    pub doc_count: u64,
    pub store_size_bytes: u64,
    pub store_size_human: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldMapping {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    pub aggregatable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexMapping {
    pub index: String,
    pub fields: Vec<FieldMapping>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldCardinality {
    pub index: String,
    pub field: String,
    pub cardinality: u64,
}

// ── Dashboard system ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardSummary {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
}

/// One dashboard resolved into conversion candidates, plus the usage
/// signals its saved state carries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardDetail {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub candidates: Vec<CandidateDescriptor>,
    pub usage: UsageMetadata,
}
