//! The rule state machine.
//!
//! Every status transition goes through [`LifecycleManager`]: it is the
//! only writer of rule status, it serializes operations per rule, and it
//! owns the retry policy for backend calls. The analysis layers stay
//! pure; the backend stays stateless; whatever coordination is left
//! lives here.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use l2m_analysis::guardrails::default_denylist;
use l2m_analysis::{
    estimate, evaluate, score, CostEstimate, GuardrailLimits, GuardrailReport, SuitabilityScore,
};
use l2m_backend::{BackendStatus, HealthState, MetricsBackend};
use l2m_connector::CandidateSource;
use l2m_core::candidate::{CandidateDescriptor, IndexStats};
use l2m_core::config::GuardrailConfig;
use l2m_core::error::{L2mError, Result};
use l2m_core::naming;
use l2m_core::rule::{
    GuardrailOverride, MetricRule, RuleSpec, RuleStatus, RuleUpdate,
};

use crate::store::RuleStore;

/// Attempts per backend call, counting the first one.
const BACKEND_ATTEMPTS: u32 = 3;
/// Base delay between attempts; grows linearly.
const RETRY_DELAY: Duration = Duration::from_millis(500);

// ── Operation results ───────────────────────────────────────────────

/// Everything the analysis layers can say about one rule against the
/// live cluster.
#[derive(Debug, Clone, Serialize)]
pub struct RuleAssessment {
    pub stats: IndexStats,
    pub cardinalities: HashMap<String, u64>,
    pub score: SuitabilityScore,
    pub cost: CostEstimate,
    pub guardrails: GuardrailReport,
}

/// Why a create/activate/update was refused. Carries the full report so
/// callers can render every failing check, not just the first.
#[derive(Debug, Clone, Serialize)]
pub struct Rejection {
    pub guardrails: GuardrailReport,
    pub cost: CostEstimate,
}

/// Outcome of a lifecycle operation that can be refused by guardrails.
#[derive(Debug, Clone)]
pub enum RuleOutcome {
    Accepted(MetricRule),
    Rejected(Rejection),
}

// ── The manager ─────────────────────────────────────────────────────

/// Single writer for rule state.
///
/// Cloning is cheap; clones share the store, the backend, and the
/// per-rule lock table.
#[derive(Clone)]
pub struct LifecycleManager {
    store: Arc<RuleStore>,
    backend: Arc<dyn MetricsBackend>,
    source: Arc<dyn CandidateSource>,
    limits: GuardrailLimits,
    denylist: Arc<Vec<String>>,
    locks: Arc<Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>>,
}

impl LifecycleManager {
    pub fn new(
        store: Arc<RuleStore>,
        backend: Arc<dyn MetricsBackend>,
        source: Arc<dyn CandidateSource>,
        guardrails: &GuardrailConfig,
    ) -> Self {
        let mut denylist = default_denylist();
        denylist.extend(guardrails.denylist_extra.iter().cloned());
        Self {
            store,
            backend,
            source,
            limits: GuardrailLimits {
                max_dimensions: guardrails.max_dimensions,
                max_series: guardrails.max_series,
            },
            denylist: Arc::new(denylist),
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    // ── Reads ───────────────────────────────────────────────────────

    pub fn list(&self) -> Result<Vec<MetricRule>> {
        self.store.list()
    }

    pub fn get(&self, id: Uuid) -> Result<MetricRule> {
        self.fetch(id)
    }

    /// Live backend health for a rule that should have a job. Transient
    /// read failures surface as an explicit unknown-health snapshot,
    /// never as a status change on the rule.
    pub async fn backend_status(&self, id: Uuid) -> Result<BackendStatus> {
        let rule = self.fetch(id)?;
        if rule.status == RuleStatus::Draft {
            return Err(L2mError::InvalidTransition {
                action: "monitor",
                status: rule.status,
            });
        }
        let backend = self.backend.clone();
        match with_backend_retries("status read", || backend.get_status(id)).await {
            Ok(status) => Ok(status),
            Err(e) if e.is_transient() => {
                warn!("status of rule {} is unknown: {}", id, e);
                Ok(BackendStatus::unknown(
                    id,
                    naming::transform_id(id),
                    e.to_string(),
                ))
            }
            Err(e) => Err(e),
        }
    }

    /// Run the full analysis stack for a candidate against live stats.
    pub async fn assess(
        &self,
        descriptor: &CandidateDescriptor,
        retention_days: u32,
    ) -> Result<RuleAssessment> {
        let index = descriptor.index_pattern.clone().ok_or_else(|| {
            L2mError::validation("index_pattern", "required for assessment")
        })?;

        let source = self.source.clone();
        let stats =
            with_backend_retries("index stats", || source.index_stats(&index)).await?;

        let mut cardinalities = HashMap::new();
        for dim in &descriptor.dimensions {
            if let Some(count) = self.source.field_cardinality(&index, &dim.name).await? {
                cardinalities.insert(dim.name.clone(), count);
            }
        }

        let score = score(descriptor, None);
        let cost = estimate(descriptor, &stats, &cardinalities, retention_days);
        let guardrails = evaluate(descriptor, &cost, &cardinalities, &self.denylist, &self.limits);

        Ok(RuleAssessment {
            stats,
            cardinalities,
            score,
            cost,
            guardrails,
        })
    }

    // ── Transitions ─────────────────────────────────────────────────
    //
    // Each transition runs in a spawned task: once a caller has asked
    // for it, dropping the request must not abandon half-provisioned
    // external state. The task always runs to a persisted outcome.

    /// Create a rule. Guardrails run against live stats unless the
    /// caller overrides them, in which case the override is recorded on
    /// the rule. A spec asking for `active` is provisioned in the same
    /// logical operation; if provisioning fails, the rule still exists,
    /// in `error`.
    pub async fn create(&self, mut spec: RuleSpec, skip_guardrails: bool) -> Result<RuleOutcome> {
        spec.resolve_defaults();
        spec.validate()?;
        let mgr = self.clone();
        detached("create", async move { mgr.create_inner(spec, skip_guardrails).await }).await
    }

    /// Drive a rule to `active`, provisioning backend resources.
    /// Valid from `draft`, `paused`, and `error`.
    pub async fn activate(&self, id: Uuid) -> Result<RuleOutcome> {
        let mgr = self.clone();
        detached("activate", async move { mgr.activate_inner(id).await }).await
    }

    /// Stop a rule and tear down its backend resources, keeping the
    /// record. Valid from `active` only.
    pub async fn pause(&self, id: Uuid) -> Result<MetricRule> {
        let mgr = self.clone();
        detached("pause", async move { mgr.pause_inner(id).await }).await
    }

    /// Apply a partial update. Changes that the backend baked into the
    /// provisioned resources turn this into deprovision, persist,
    /// re-provision; name and owner edits are plain writes.
    pub async fn update(&self, id: Uuid, update: RuleUpdate) -> Result<RuleOutcome> {
        let mgr = self.clone();
        detached("update", async move { mgr.update_inner(id, update).await }).await
    }

    /// Remove a rule, tearing down backend resources first when any may
    /// exist. Teardown is idempotent, so retrying a failed delete is
    /// always safe.
    pub async fn delete(&self, id: Uuid) -> Result<()> {
        let mgr = self.clone();
        detached("delete", async move { mgr.delete_inner(id).await }).await
    }

    /// One monitoring sweep over every rule that should be running.
    /// Logs only; a sweep never mutates rule status.
    pub async fn monitor_pass(&self) {
        let rules = match self.store.list() {
            Ok(rules) => rules,
            Err(e) => {
                warn!("monitor sweep could not read the rule store: {}", e);
                return;
            }
        };
        for rule in rules.iter().filter(|r| r.status == RuleStatus::Active) {
            match self.backend.get_status(rule.id).await {
                Ok(status) if status.health == HealthState::Healthy => {
                    debug!(
                        "rule {} '{}' healthy, {} docs processed",
                        rule.id, rule.name, status.docs_processed
                    );
                }
                Ok(status) => {
                    warn!(
                        "rule {} '{}' health {}{}",
                        rule.id,
                        rule.name,
                        status.health,
                        status
                            .detail
                            .as_deref()
                            .map(|d| format!(": {}", d))
                            .unwrap_or_default()
                    );
                }
                Err(e) => {
                    warn!("rule {} '{}' health check failed: {}", rule.id, rule.name, e);
                }
            }
        }
    }

    // ── Transition bodies ───────────────────────────────────────────

    async fn create_inner(self, spec: RuleSpec, skip_guardrails: bool) -> Result<RuleOutcome> {
        let mut guardrail_override = None;
        match (skip_guardrails, self.assess(&spec.as_candidate(), spec.retention_days).await) {
            (false, Ok(a)) if !a.guardrails.all_passed => {
                info!("rule '{}' refused by guardrails", spec.name);
                return Ok(RuleOutcome::Rejected(Rejection {
                    guardrails: a.guardrails,
                    cost: a.cost,
                }));
            }
            (false, Ok(_)) => {}
            (false, Err(e)) => return Err(e),
            (true, Ok(a)) if !a.guardrails.all_passed => {
                let failed: Vec<String> = a
                    .guardrails
                    .checks
                    .iter()
                    .filter(|c| !c.passed)
                    .map(|c| c.name.clone())
                    .collect();
                warn!(
                    "rule '{}' created past failing guardrails: {}",
                    spec.name,
                    failed.join(", ")
                );
                guardrail_override = Some(GuardrailOverride {
                    failed_checks: failed,
                    overridden_at: Utc::now(),
                });
            }
            (true, Ok(_)) => {}
            (true, Err(e)) => {
                // Caller asked to skip guardrails and the cluster could
                // not even be assessed. Record that nothing was checked.
                warn!(
                    "rule '{}' created without any guardrail evaluation: {}",
                    spec.name, e
                );
                guardrail_override = Some(GuardrailOverride {
                    failed_checks: Vec::new(),
                    overridden_at: Utc::now(),
                });
            }
        }

        let desired = spec.status;
        let now = Utc::now();
        let mut rule = MetricRule {
            id: Uuid::new_v4(),
            name: spec.name,
            owner: spec.owner,
            source: spec.source,
            grouping: spec.grouping,
            compute: spec.compute,
            retention_days: spec.retention_days,
            origin: spec.origin,
            status: RuleStatus::Draft,
            resources: None,
            last_error: None,
            guardrail_override,
            created_at: now,
            updated_at: now,
        };
        self.store.insert(&rule)?;

        if desired == RuleStatus::Active {
            let lock = self.rule_lock(rule.id);
            let _guard = lock.lock().await;
            if let Err(e) = self.provision_and_persist(&mut rule).await {
                // The rule exists either way; its status says what happened.
                warn!("rule {} created but not activated: {}", rule.id, e);
            }
        }
        Ok(RuleOutcome::Accepted(rule))
    }

    async fn activate_inner(self, id: Uuid) -> Result<RuleOutcome> {
        let lock = self.rule_lock(id);
        let _guard = lock.lock().await;

        let mut rule = self.fetch(id)?;
        match rule.status {
            RuleStatus::Draft | RuleStatus::Paused | RuleStatus::Error => {}
            RuleStatus::Active => {
                return Err(L2mError::InvalidTransition {
                    action: "start",
                    status: rule.status,
                })
            }
        }

        // Guardrails run again on every path toward active: the cluster
        // may look different than it did at creation time.
        if rule.guardrail_override.is_none() {
            let assessment = self.assess(&rule.as_candidate(), rule.retention_days).await?;
            if !assessment.guardrails.all_passed {
                info!("rule {} refused by guardrails on start", id);
                return Ok(RuleOutcome::Rejected(Rejection {
                    guardrails: assessment.guardrails,
                    cost: assessment.cost,
                }));
            }
        }

        // A paused or errored rule may have leftovers under its names.
        // Teardown is idempotent; a clean slate makes provisioning
        // re-runnable after crashes and external deletions alike.
        if rule.status != RuleStatus::Draft {
            let backend = self.backend.clone();
            with_backend_retries("deprovision", || backend.deprovision(id)).await?;
        }

        self.provision_and_persist(&mut rule).await?;
        Ok(RuleOutcome::Accepted(rule))
    }

    async fn pause_inner(self, id: Uuid) -> Result<MetricRule> {
        let lock = self.rule_lock(id);
        let _guard = lock.lock().await;

        let mut rule = self.fetch(id)?;
        if rule.status != RuleStatus::Active {
            return Err(L2mError::InvalidTransition {
                action: "pause",
                status: rule.status,
            });
        }
        if rule.resources.is_none() {
            // Fail closed: the record cannot be trusted, so no backend
            // call and no status write.
            let detail = format!("rule {} is active but has no resource handles", id);
            error!("{}", detail);
            return Err(L2mError::Invariant(detail));
        }

        let backend = self.backend.clone();
        with_backend_retries("deprovision", || backend.deprovision(id)).await?;

        rule.status = RuleStatus::Paused;
        rule.resources = None;
        rule.updated_at = Utc::now();
        self.store.update(&rule)?;
        info!("rule {} paused", id);
        Ok(rule)
    }

    async fn update_inner(self, id: Uuid, update: RuleUpdate) -> Result<RuleOutcome> {
        if update.status.is_some() {
            return Err(L2mError::validation(
                "status",
                "status changes go through the start and pause operations",
            ));
        }

        let lock = self.rule_lock(id);
        let _guard = lock.lock().await;

        let mut rule = self.fetch(id)?;
        let compound = rule.status == RuleStatus::Active
            && RuleSpec::provisioning_relevant_change(&rule, &update);

        let mut spec = merged_spec(&rule, &update);
        spec.resolve_defaults();
        spec.validate()?;

        if compound && rule.guardrail_override.is_none() {
            let assessment = self.assess(&spec.as_candidate(), spec.retention_days).await?;
            if !assessment.guardrails.all_passed {
                info!("update of rule {} refused by guardrails", id);
                return Ok(RuleOutcome::Rejected(Rejection {
                    guardrails: assessment.guardrails,
                    cost: assessment.cost,
                }));
            }
        }

        if compound {
            // Old resources go first; the new spec may change the very
            // names the backend derives.
            let backend = self.backend.clone();
            with_backend_retries("deprovision", || backend.deprovision(id)).await?;
            rule.resources = None;
        }

        apply_spec(&mut rule, spec);
        rule.updated_at = Utc::now();
        self.store.update(&rule)?;
        info!("rule {} updated", id);

        if compound {
            if let Err(e) = self.provision_and_persist(&mut rule).await {
                warn!("rule {} updated but not re-provisioned: {}", id, e);
            }
        }
        Ok(RuleOutcome::Accepted(rule))
    }

    async fn delete_inner(self, id: Uuid) -> Result<()> {
        let lock = self.rule_lock(id);
        let _guard = lock.lock().await;

        let rule = self.fetch(id)?;
        if rule.status != RuleStatus::Draft {
            // Any non-draft rule may have live resources; an errored one
            // may have leftovers from a failed rollback. Teardown of
            // nothing is a no-op, so this is safe for all of them.
            let backend = self.backend.clone();
            with_backend_retries("deprovision", || backend.deprovision(id)).await?;
        }
        self.store.remove(id)?;
        self.forget_lock(id);
        info!("rule {} '{}' deleted", id, rule.name);
        Ok(())
    }

    /// Validate against the cluster, provision, and persist the outcome.
    /// On success the rule is `active` with handles; on failure it is
    /// `error` carrying the downstream detail verbatim, and the error
    /// propagates.
    async fn provision_and_persist(&self, rule: &mut MetricRule) -> Result<()> {
        let outcome = {
            let snapshot = &*rule;
            let backend = self.backend.clone();
            let report =
                with_backend_retries("validate", || backend.validate(snapshot)).await;
            match report {
                Ok(report) if !report.valid => Err(L2mError::rejected(
                    "validate",
                    report.errors.join("; "),
                )),
                Ok(_) => with_backend_retries("provision", || backend.provision(snapshot)).await,
                Err(e) => Err(e),
            }
        };

        match outcome {
            Ok(handles) => {
                rule.status = RuleStatus::Active;
                rule.resources = Some(handles);
                rule.last_error = None;
                rule.updated_at = Utc::now();
                self.store.update(rule)?;
                info!("rule {} '{}' is active", rule.id, rule.name);
                Ok(())
            }
            Err(e) => {
                rule.status = RuleStatus::Error;
                rule.resources = None;
                rule.last_error = Some(e.to_string());
                rule.updated_at = Utc::now();
                self.store.update(rule)?;
                error!("activation of rule {} failed: {}", rule.id, e);
                Err(e)
            }
        }
    }

    // ── Plumbing ────────────────────────────────────────────────────

    fn fetch(&self, id: Uuid) -> Result<MetricRule> {
        self.store.get(id)?.ok_or(L2mError::RuleNotFound(id))
    }

    fn rule_lock(&self, id: Uuid) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(id).or_default().clone()
    }

    fn forget_lock(&self, id: Uuid) {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.remove(&id);
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Run a backend call, retrying transient failures with linear backoff.
/// Anything non-transient returns immediately.
async fn with_backend_retries<T, Fut>(
    operation: &str,
    mut call: impl FnMut() -> Fut,
) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < BACKEND_ATTEMPTS => {
                warn!(
                    "{} attempt {}/{} failed, retrying: {}",
                    operation, attempt, BACKEND_ATTEMPTS, e
                );
                tokio::time::sleep(RETRY_DELAY * attempt).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Run a transition to completion even if the caller goes away. The
/// spawned task owns its clone of the manager, so a dropped request
/// cannot abandon external state mid-flight.
async fn detached<T>(
    action: &'static str,
    fut: impl Future<Output = Result<T>> + Send + 'static,
) -> Result<T>
where
    T: Send + 'static,
{
    match tokio::spawn(fut).await {
        Ok(result) => result,
        Err(e) => Err(L2mError::Invariant(format!("{} task failed: {}", action, e))),
    }
}

/// The rule as it would look with `update` applied, in spec form so the
/// usual default resolution and validation run on the merged result.
fn merged_spec(rule: &MetricRule, update: &RuleUpdate) -> RuleSpec {
    RuleSpec {
        name: update.name.clone().unwrap_or_else(|| rule.name.clone()),
        owner: update.owner.clone().unwrap_or_else(|| rule.owner.clone()),
        source: update.source.clone().unwrap_or_else(|| rule.source.clone()),
        grouping: update
            .grouping
            .clone()
            .unwrap_or_else(|| rule.grouping.clone()),
        compute: update
            .compute
            .clone()
            .unwrap_or_else(|| rule.compute.clone()),
        retention_days: update.retention_days.unwrap_or(rule.retention_days),
        origin: update.origin.clone().or_else(|| rule.origin.clone()),
        status: RuleStatus::Draft,
    }
}

fn apply_spec(rule: &mut MetricRule, spec: RuleSpec) {
    rule.name = spec.name;
    rule.owner = spec.owner;
    rule.source = spec.source;
    rule.grouping = spec.grouping;
    rule.compute = spec.compute;
    rule.retention_days = spec.retention_days;
    rule.origin = spec.origin;
}
