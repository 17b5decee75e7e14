//! Backend capability contract.
//!
//! Anything that can materialize a metric rule implements
//! [`MetricsBackend`]. The lifecycle layer depends on this trait only,
//! never on a concrete engine.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use l2m_core::rule::{MetricRule, ResourceHandles};
use l2m_core::Result;

/// Operational health of the materialization job behind a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Unknown,
    Healthy,
    Transitioning,
    Unhealthy,
    Stopped,
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HealthState::Unknown => "unknown",
            HealthState::Healthy => "healthy",
            HealthState::Transitioning => "transitioning",
            HealthState::Unhealthy => "unhealthy",
            HealthState::Stopped => "stopped",
        };
        write!(f, "{}", s)
    }
}

/// Point-in-time snapshot of the job backing a rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendStatus {
    pub rule_id: Uuid,
    pub transform_id: String,
    pub health: HealthState,
    #[serde(default)]
    pub docs_processed: u64,
    #[serde(default)]
    pub docs_indexed: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_checkpoint_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl BackendStatus {
    /// Status for a rule whose job is not present in the backend at all.
    pub fn absent(rule_id: Uuid, transform_id: String) -> Self {
        Self {
            rule_id,
            transform_id,
            health: HealthState::Stopped,
            docs_processed: 0,
            docs_indexed: 0,
            last_checkpoint_at: None,
            detail: Some("transform not found".to_string()),
        }
    }

    /// Status when the backend could not be read. The job may well be
    /// running; the health is expressly unknown, not stopped.
    pub fn unknown(rule_id: Uuid, transform_id: String, detail: impl Into<String>) -> Self {
        Self {
            rule_id,
            transform_id,
            health: HealthState::Unknown,
            docs_processed: 0,
            docs_indexed: 0,
            last_checkpoint_at: None,
            detail: Some(detail.into()),
        }
    }
}

/// Outcome of the pre-provision structural check. Never side-effecting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn from_errors(errors: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }
}

/// The four operations a materialization engine must support.
///
/// `deprovision` must be idempotent: tearing down resources that do not
/// exist is a no-op success, never an error.
#[async_trait]
pub trait MetricsBackend: Send + Sync {
    /// Structural pre-check against the live cluster, no side effects.
    async fn validate(&self, rule: &MetricRule) -> Result<ValidationReport>;

    /// Create and start the materialization job. Implementations roll
    /// back their own partially created resources before returning an
    /// error; the downstream failure detail is preserved verbatim.
    async fn provision(&self, rule: &MetricRule) -> Result<ResourceHandles>;

    /// Best-effort health snapshot. A missing job reads as
    /// [`HealthState::Stopped`]; only transport failures are errors.
    async fn get_status(&self, rule_id: Uuid) -> Result<BackendStatus>;

    /// Tear down the job and its output index.
    async fn deprovision(&self, rule_id: Uuid) -> Result<()>;
}
