//! Elasticsearch continuous-transform backend.
//!
//! One transform plus one ILM-managed metrics index per rule. The
//! cluster is reached through the [`TransformApi`] seam, one method per
//! remote call, so provisioning failures can be scripted step by step in
//! tests and the rollback behavior asserted exactly.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{error, info, warn};
use uuid::Uuid;

use l2m_core::naming;
use l2m_core::rule::{MetricRule, ResourceHandles};
use l2m_core::Result;

use crate::backend::{BackendStatus, HealthState, MetricsBackend, ValidationReport};
use crate::http::HttpTransformApi;
use crate::transform;

/// Low-level cluster operations. Deletion-style calls report whether the
/// resource existed; absence is never an error.
#[async_trait]
pub trait TransformApi: Send + Sync {
    /// Create the retention policy unless it already exists.
    async fn ensure_ilm_policy(&self, name: &str, body: &Value) -> Result<()>;
    async fn create_index(&self, index: &str, body: &Value) -> Result<()>;
    async fn delete_index(&self, index: &str) -> Result<bool>;
    async fn index_exists(&self, index: &str) -> Result<bool>;
    async fn field_exists(&self, index: &str, field: &str) -> Result<bool>;
    async fn transform_exists(&self, transform_id: &str) -> Result<bool>;
    async fn put_transform(&self, transform_id: &str, body: &Value) -> Result<()>;
    async fn start_transform(&self, transform_id: &str) -> Result<()>;
    /// Force-stop, waiting for completion.
    async fn stop_transform(&self, transform_id: &str) -> Result<bool>;
    async fn delete_transform(&self, transform_id: &str) -> Result<bool>;
    /// `Ok(None)` when the transform does not exist.
    async fn transform_stats(&self, transform_id: &str) -> Result<Option<Value>>;
}

/// Provisioning sub-steps that have a rollback counterpart. The shared
/// retention policy is deliberately not one of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProvisionStep {
    MetricsIndex,
    Transform,
    TransformStarted,
}

pub struct ElasticBackend<T: TransformApi> {
    api: T,
}

impl<T: TransformApi> ElasticBackend<T> {
    pub fn new(api: T) -> Self {
        Self { api }
    }

    async fn provision_steps(
        &self,
        rule: &MetricRule,
        transform_id: &str,
        index: &str,
        policy: &str,
        completed: &mut Vec<ProvisionStep>,
    ) -> Result<()> {
        self.api
            .create_index(index, &transform::dest_index_body(rule, policy))
            .await?;
        completed.push(ProvisionStep::MetricsIndex);
        info!("created metrics index {}", index);

        self.api
            .put_transform(transform_id, &transform::transform_body(rule))
            .await?;
        completed.push(ProvisionStep::Transform);
        info!("created transform {}", transform_id);

        self.api.start_transform(transform_id).await?;
        completed.push(ProvisionStep::TransformStarted);
        info!("started transform {}", transform_id);

        Ok(())
    }

    /// Undo completed sub-steps, most recent first. Best effort: a step
    /// that fails to undo is logged and the remaining steps still run.
    async fn roll_back(&self, completed: &[ProvisionStep], transform_id: &str, index: &str) {
        for step in completed.iter().rev() {
            let outcome = match step {
                ProvisionStep::TransformStarted => {
                    self.api.stop_transform(transform_id).await.map(|_| ())
                }
                ProvisionStep::Transform => {
                    self.api.delete_transform(transform_id).await.map(|_| ())
                }
                ProvisionStep::MetricsIndex => self.api.delete_index(index).await.map(|_| ()),
            };
            match outcome {
                Ok(()) => info!("rolled back {:?} for {}", step, transform_id),
                Err(e) => warn!("rollback of {:?} for {} failed: {}", step, transform_id, e),
            }
        }
    }
}

impl ElasticBackend<HttpTransformApi> {
    pub fn from_config(cluster: &l2m_core::config::ClusterConfig) -> Self {
        Self::new(HttpTransformApi::from_config(cluster))
    }
}

#[async_trait]
impl<T: TransformApi> MetricsBackend for ElasticBackend<T> {
    async fn validate(&self, rule: &MetricRule) -> Result<ValidationReport> {
        let mut errors = Vec::new();

        if !self.api.index_exists(&rule.source.index_pattern).await? {
            errors.push(format!(
                "source index '{}' does not exist",
                rule.source.index_pattern
            ));
        }

        if rule.compute.kind.needs_value_field() {
            if let Some(field) = rule.compute.value_field.as_deref() {
                match self.api.field_exists(&rule.source.index_pattern, field).await {
                    Ok(true) => {}
                    Ok(false) => {
                        errors.push(format!("compute field '{}' not found in index", field))
                    }
                    Err(e) => errors.push(format!("could not verify mapping: {}", e)),
                }
            }
        }

        let transform_id = naming::transform_id(rule.id);
        if self.api.transform_exists(&transform_id).await? {
            errors.push(format!("transform '{}' already exists", transform_id));
        }

        Ok(ValidationReport::from_errors(errors))
    }

    async fn provision(&self, rule: &MetricRule) -> Result<ResourceHandles> {
        let transform_id = naming::transform_id(rule.id);
        let metrics_index = naming::metrics_index(rule.id);
        let retention_policy = naming::retention_policy(rule.retention_days);

        // The policy is shared by every rule with the same retention, so
        // it is created idempotently and never rolled back.
        self.api
            .ensure_ilm_policy(
                &retention_policy,
                &transform::retention_policy_body(rule.retention_days),
            )
            .await?;

        let mut completed = Vec::new();
        match self
            .provision_steps(rule, &transform_id, &metrics_index, &retention_policy, &mut completed)
            .await
        {
            Ok(()) => Ok(ResourceHandles {
                transform_id,
                metrics_index,
                retention_policy,
            }),
            Err(e) => {
                error!(
                    "provisioning rule {} failed after {} of 3 sub-steps: {}",
                    rule.id,
                    completed.len(),
                    e
                );
                self.roll_back(&completed, &transform_id, &metrics_index).await;
                Err(e)
            }
        }
    }

    async fn get_status(&self, rule_id: Uuid) -> Result<BackendStatus> {
        let transform_id = naming::transform_id(rule_id);
        match self.api.transform_stats(&transform_id).await? {
            None => Ok(BackendStatus::absent(rule_id, transform_id)),
            Some(stats) => Ok(status_from_stats(rule_id, transform_id, &stats)),
        }
    }

    async fn deprovision(&self, rule_id: Uuid) -> Result<()> {
        let transform_id = naming::transform_id(rule_id);
        let metrics_index = naming::metrics_index(rule_id);

        // A failed transform can refuse to stop; deletion is forced below
        // either way.
        match self.api.stop_transform(&transform_id).await {
            Ok(true) => info!("stopped transform {}", transform_id),
            Ok(false) => {}
            Err(e) => warn!("stopping transform {} failed, deleting anyway: {}", transform_id, e),
        }

        if self.api.delete_transform(&transform_id).await? {
            info!("deleted transform {}", transform_id);
        }
        if self.api.delete_index(&metrics_index).await? {
            info!("deleted metrics index {}", metrics_index);
        }
        Ok(())
    }
}

// ── Stats parsing ─────────────────────────────────────────────

fn map_transform_state(state: &str) -> HealthState {
    match state {
        "started" | "indexing" => HealthState::Healthy,
        "starting" | "stopping" => HealthState::Transitioning,
        "stopped" => HealthState::Stopped,
        "aborting" | "failed" => HealthState::Unhealthy,
        _ => HealthState::Unknown,
    }
}

fn status_from_stats(rule_id: Uuid, transform_id: String, stats: &Value) -> BackendStatus {
    let t = &stats["transforms"][0];
    if t.is_null() {
        return BackendStatus::absent(rule_id, transform_id);
    }

    let state = t["state"].as_str().unwrap_or("unknown");
    let last_checkpoint_at = t["checkpointing"]["last"]["timestamp_millis"]
        .as_i64()
        .and_then(DateTime::<Utc>::from_timestamp_millis);

    BackendStatus {
        rule_id,
        transform_id,
        health: map_transform_state(state),
        docs_processed: t["stats"]["documents_processed"].as_u64().unwrap_or(0),
        docs_indexed: t["stats"]["documents_indexed"].as_u64().unwrap_or(0),
        last_checkpoint_at,
        detail: None,
    }
}

// ── Tests ─────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use l2m_core::rule::{ComputeKind, ComputeSpec, RuleGrouping, RuleSource, RuleStatus};
    use serde_json::json;
    use std::sync::Mutex;

    /// Scriptable in-memory cluster: records every call, optionally fails
    /// at one named operation.
    #[derive(Default)]
    struct FakeApi {
        fail_on: Option<&'static str>,
        index_exists: bool,
        field_exists: bool,
        transform_exists: bool,
        stats: Option<Value>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeApi {
        fn healthy() -> Self {
            Self {
                index_exists: true,
                field_exists: true,
                ..Default::default()
            }
        }

        fn failing_at(op: &'static str) -> Self {
            Self {
                fail_on: Some(op),
                index_exists: true,
                field_exists: true,
                ..Default::default()
            }
        }

        fn hit(&self, op: &'static str, target: &str) -> Result<()> {
            self.calls.lock().unwrap().push(format!("{}:{}", op, target));
            if self.fail_on == Some(op) {
                Err(l2m_core::L2mError::rejected(op, "scripted failure"))
            } else {
                Ok(())
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn count(&self, op: &str) -> usize {
            self.calls()
                .iter()
                .filter(|c| c.starts_with(&format!("{}:", op)))
                .count()
        }
    }

    #[async_trait]
    impl TransformApi for FakeApi {
        async fn ensure_ilm_policy(&self, name: &str, _body: &Value) -> Result<()> {
            self.hit("ensure_ilm_policy", name)
        }
        async fn create_index(&self, index: &str, _body: &Value) -> Result<()> {
            self.hit("create_index", index)
        }
        async fn delete_index(&self, index: &str) -> Result<bool> {
            self.hit("delete_index", index)?;
            Ok(true)
        }
        async fn index_exists(&self, index: &str) -> Result<bool> {
            self.hit("index_exists", index)?;
            Ok(self.index_exists)
        }
        async fn field_exists(&self, index: &str, field: &str) -> Result<bool> {
            self.hit("field_exists", &format!("{}.{}", index, field))?;
            Ok(self.field_exists)
        }
        async fn transform_exists(&self, transform_id: &str) -> Result<bool> {
            self.hit("transform_exists", transform_id)?;
            Ok(self.transform_exists)
        }
        async fn put_transform(&self, transform_id: &str, _body: &Value) -> Result<()> {
            self.hit("put_transform", transform_id)
        }
        async fn start_transform(&self, transform_id: &str) -> Result<()> {
            self.hit("start_transform", transform_id)
        }
        async fn stop_transform(&self, transform_id: &str) -> Result<bool> {
            self.hit("stop_transform", transform_id)?;
            Ok(true)
        }
        async fn delete_transform(&self, transform_id: &str) -> Result<bool> {
            self.hit("delete_transform", transform_id)?;
            Ok(true)
        }
        async fn transform_stats(&self, transform_id: &str) -> Result<Option<Value>> {
            self.hit("transform_stats", transform_id)?;
            Ok(self.stats.clone())
        }
    }

    fn make_rule() -> MetricRule {
        MetricRule {
            id: Uuid::nil(),
            name: "errors per minute".to_string(),
            owner: String::new(),
            source: RuleSource {
                index_pattern: "app-logs*".to_string(),
                time_field: "timestamp".to_string(),
                filter: None,
            },
            grouping: RuleGrouping::default(),
            compute: ComputeSpec {
                kind: ComputeKind::Count,
                value_field: None,
                percentiles: None,
            },
            retention_days: 450,
            origin: None,
            status: RuleStatus::Draft,
            resources: None,
            last_error: None,
            guardrail_override: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn op_names(calls: &[String]) -> Vec<&str> {
        calls.iter().map(|c| c.split(':').next().unwrap()).collect()
    }

    #[tokio::test]
    async fn provision_runs_steps_in_order_and_returns_handles() {
        let backend = ElasticBackend::new(FakeApi::healthy());
        let handles = backend.provision(&make_rule()).await.unwrap();

        assert_eq!(handles.transform_id, naming::transform_id(Uuid::nil()));
        assert_eq!(handles.metrics_index, naming::metrics_index(Uuid::nil()));
        assert_eq!(handles.retention_policy, naming::retention_policy(450));
        assert_eq!(
            op_names(&backend.api.calls()),
            vec![
                "ensure_ilm_policy",
                "create_index",
                "put_transform",
                "start_transform"
            ]
        );
    }

    #[tokio::test]
    async fn start_failure_rolls_back_transform_and_index_exactly_once() {
        let backend = ElasticBackend::new(FakeApi::failing_at("start_transform"));
        let err = backend.provision(&make_rule()).await.unwrap_err();
        assert!(err.to_string().contains("scripted failure"));

        assert_eq!(backend.api.count("delete_transform"), 1);
        assert_eq!(backend.api.count("delete_index"), 1);
        // Never started, so nothing to stop.
        assert_eq!(backend.api.count("stop_transform"), 0);
        assert_eq!(
            op_names(&backend.api.calls()),
            vec![
                "ensure_ilm_policy",
                "create_index",
                "put_transform",
                "start_transform",
                "delete_transform",
                "delete_index"
            ]
        );
    }

    #[tokio::test]
    async fn put_failure_rolls_back_only_the_index() {
        let backend = ElasticBackend::new(FakeApi::failing_at("put_transform"));
        backend.provision(&make_rule()).await.unwrap_err();

        assert_eq!(backend.api.count("delete_index"), 1);
        assert_eq!(backend.api.count("delete_transform"), 0);
        assert_eq!(backend.api.count("stop_transform"), 0);
    }

    #[tokio::test]
    async fn index_creation_failure_rolls_back_nothing() {
        let backend = ElasticBackend::new(FakeApi::failing_at("create_index"));
        backend.provision(&make_rule()).await.unwrap_err();

        assert_eq!(backend.api.count("delete_index"), 0);
        assert_eq!(backend.api.count("delete_transform"), 0);
    }

    #[tokio::test]
    async fn retention_policy_is_never_rolled_back() {
        let backend = ElasticBackend::new(FakeApi::failing_at("start_transform"));
        backend.provision(&make_rule()).await.unwrap_err();

        let calls = backend.api.calls();
        assert!(calls.iter().all(|c| !c.contains("delete_ilm")));
        assert_eq!(backend.api.count("ensure_ilm_policy"), 1);
    }

    #[tokio::test]
    async fn deprovision_twice_succeeds_both_times() {
        let backend = ElasticBackend::new(FakeApi::healthy());
        backend.deprovision(Uuid::nil()).await.unwrap();
        backend.deprovision(Uuid::nil()).await.unwrap();
        assert_eq!(backend.api.count("delete_transform"), 2);
        assert_eq!(backend.api.count("delete_index"), 2);
    }

    #[tokio::test]
    async fn stop_failure_does_not_block_deprovision() {
        let backend = ElasticBackend::new(FakeApi::failing_at("stop_transform"));
        backend.deprovision(Uuid::nil()).await.unwrap();
        assert_eq!(backend.api.count("delete_transform"), 1);
        assert_eq!(backend.api.count("delete_index"), 1);
    }

    #[tokio::test]
    async fn missing_transform_reads_as_stopped() {
        let backend = ElasticBackend::new(FakeApi::healthy());
        let status = backend.get_status(Uuid::nil()).await.unwrap();
        assert_eq!(status.health, HealthState::Stopped);
        assert_eq!(status.detail.as_deref(), Some("transform not found"));
    }

    #[tokio::test]
    async fn status_surfaces_state_counters_and_checkpoint() {
        let api = FakeApi {
            stats: Some(json!({
                "transforms": [{
                    "state": "indexing",
                    "stats": { "documents_processed": 1200, "documents_indexed": 40 },
                    "checkpointing": { "last": { "timestamp_millis": 1_700_000_000_000_i64 } },
                }]
            })),
            ..FakeApi::healthy()
        };
        let backend = ElasticBackend::new(api);
        let status = backend.get_status(Uuid::nil()).await.unwrap();

        assert_eq!(status.health, HealthState::Healthy);
        assert_eq!(status.docs_processed, 1200);
        assert_eq!(status.docs_indexed, 40);
        assert_eq!(
            status.last_checkpoint_at.unwrap().timestamp_millis(),
            1_700_000_000_000_i64
        );
    }

    #[test]
    fn transform_states_map_to_health() {
        assert_eq!(map_transform_state("started"), HealthState::Healthy);
        assert_eq!(map_transform_state("indexing"), HealthState::Healthy);
        assert_eq!(map_transform_state("starting"), HealthState::Transitioning);
        assert_eq!(map_transform_state("stopping"), HealthState::Transitioning);
        assert_eq!(map_transform_state("stopped"), HealthState::Stopped);
        assert_eq!(map_transform_state("failed"), HealthState::Unhealthy);
        assert_eq!(map_transform_state("aborting"), HealthState::Unhealthy);
        assert_eq!(map_transform_state("anything-else"), HealthState::Unknown);
    }

    #[tokio::test]
    async fn empty_transforms_array_reads_as_stopped() {
        let api = FakeApi {
            stats: Some(json!({ "transforms": [] })),
            ..FakeApi::healthy()
        };
        let backend = ElasticBackend::new(api);
        let status = backend.get_status(Uuid::nil()).await.unwrap();
        assert_eq!(status.health, HealthState::Stopped);
    }

    #[tokio::test]
    async fn validate_reports_every_problem_at_once() {
        let api = FakeApi {
            index_exists: false,
            transform_exists: true,
            ..Default::default()
        };
        let backend = ElasticBackend::new(api);
        let mut rule = make_rule();
        rule.compute = ComputeSpec {
            kind: ComputeKind::Avg,
            value_field: Some("latency_ms".to_string()),
            percentiles: None,
        };

        let report = backend.validate(&rule).await.unwrap();
        assert!(!report.valid);
        assert_eq!(report.errors.len(), 3);
        assert!(report.errors[0].contains("app-logs*"));
        assert!(report.errors[1].contains("latency_ms"));
        assert!(report.errors[2].contains("already exists"));
    }

    #[tokio::test]
    async fn validate_passes_a_clean_count_rule() {
        let backend = ElasticBackend::new(FakeApi::healthy());
        let report = backend.validate(&make_rule()).await.unwrap();
        assert!(report.valid);
        assert!(report.errors.is_empty());
        // Count rules have no value field to check.
        assert_eq!(backend.api.count("field_exists"), 0);
    }
}
