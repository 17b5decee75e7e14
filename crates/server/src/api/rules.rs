//! Rule CRUD, lifecycle transitions, and standalone estimation.
//!
//! SRP: everything under `/api/rules` plus `/api/estimate`. Guardrail
//! rejections are 422 with the full report so callers can render the
//! failing checks; invalid transitions are 409.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use l2m_backend::BackendStatus;
use l2m_core::rule::{MetricRule, RuleSpec, RuleStatus, RuleUpdate};
use l2m_lifecycle::{RuleAssessment, RuleOutcome};

use crate::state::AppState;

use super::{api_error, ApiError};

// ── Shared plumbing ──────────────────────────────────────────────

#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
pub struct CreateRuleParams {
    /// Record a guardrail override instead of rejecting a failing spec.
    #[serde(default)]
    pub skip_guardrails: bool,
}

/// An accepted rule, or 422 carrying the full guardrail report.
fn outcome_response(accepted_status: StatusCode, outcome: RuleOutcome) -> Response {
    match outcome {
        RuleOutcome::Accepted(rule) => (accepted_status, Json(rule)).into_response(),
        RuleOutcome::Rejected(rejection) => {
            (StatusCode::UNPROCESSABLE_ENTITY, Json(rejection)).into_response()
        }
    }
}

// ── CRUD ─────────────────────────────────────────────────────────

/// Create a rule. With `status: "active"` in the spec, provisioning
/// happens in the same request.
#[utoipa::path(
    post,
    path = "/api/rules",
    tag = "Rules",
    params(CreateRuleParams),
    request_body = Object,
    responses(
        (status = 201, description = "Rule stored (and provisioned when requested active)", body = Object),
        (status = 422, description = "Spec invalid, or guardrails failed and no override was requested", body = Object)
    )
)]
pub async fn create_rule(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CreateRuleParams>,
    Json(spec): Json<RuleSpec>,
) -> Result<Response, ApiError> {
    let outcome = state
        .lifecycle
        .create(spec, params.skip_guardrails)
        .await
        .map_err(api_error)?;
    Ok(outcome_response(StatusCode::CREATED, outcome))
}

/// All stored rules.
#[utoipa::path(
    get,
    path = "/api/rules",
    tag = "Rules",
    responses(
        (status = 200, description = "Every rule, all statuses", body = Object)
    )
)]
pub async fn list_rules(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<MetricRule>>, ApiError> {
    state.lifecycle.list().map(Json).map_err(api_error)
}

/// One rule by id.
#[utoipa::path(
    get,
    path = "/api/rules/{id}",
    tag = "Rules",
    params(("id" = Uuid, Path, description = "Rule id")),
    responses(
        (status = 200, description = "The rule", body = Object),
        (status = 404, description = "No such rule")
    )
)]
pub async fn get_rule(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<MetricRule>, ApiError> {
    state.lifecycle.get(id).map(Json).map_err(api_error)
}

/// Patch a rule. Structural changes to an active rule re-provision it;
/// a status field in the payload is rejected.
#[utoipa::path(
    put,
    path = "/api/rules/{id}",
    tag = "Rules",
    params(("id" = Uuid, Path, description = "Rule id")),
    request_body = Object,
    responses(
        (status = 200, description = "Updated rule", body = Object),
        (status = 404, description = "No such rule"),
        (status = 422, description = "Merged spec invalid, or guardrails failed", body = Object)
    )
)]
pub async fn update_rule(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(update): Json<RuleUpdate>,
) -> Result<Response, ApiError> {
    let outcome = state
        .lifecycle
        .update(id, update)
        .await
        .map_err(api_error)?;
    Ok(outcome_response(StatusCode::OK, outcome))
}

/// Delete a rule and tear down whatever it provisioned.
#[utoipa::path(
    delete,
    path = "/api/rules/{id}",
    tag = "Rules",
    params(("id" = Uuid, Path, description = "Rule id")),
    responses(
        (status = 204, description = "Rule and its resources are gone"),
        (status = 404, description = "No such rule"),
        (status = 502, description = "Teardown failed; the rule record was kept")
    )
)]
pub async fn delete_rule(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.lifecycle.delete(id).await.map_err(api_error)?;
    Ok(StatusCode::NO_CONTENT)
}

// ── Transitions ──────────────────────────────────────────────────

/// Provision the rule's transform and metrics index, then mark it
/// active. Guardrails re-run unless an override is on record.
#[utoipa::path(
    post,
    path = "/api/rules/{id}/start",
    tag = "Rules",
    params(("id" = Uuid, Path, description = "Rule id")),
    responses(
        (status = 200, description = "Rule is active", body = Object),
        (status = 404, description = "No such rule"),
        (status = 409, description = "Rule is already active"),
        (status = 422, description = "Guardrails failed", body = Object),
        (status = 502, description = "Provisioning failed; the rule is in error status")
    )
)]
pub async fn start_rule(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let outcome = state.lifecycle.activate(id).await.map_err(api_error)?;
    Ok(outcome_response(StatusCode::OK, outcome))
}

/// Tear the rule's resources down and mark it paused. The record and
/// its resolved spec stay put for a later restart.
#[utoipa::path(
    post,
    path = "/api/rules/{id}/pause",
    tag = "Rules",
    params(("id" = Uuid, Path, description = "Rule id")),
    responses(
        (status = 200, description = "Rule is paused", body = Object),
        (status = 404, description = "No such rule"),
        (status = 409, description = "Only active rules can be paused"),
        (status = 502, description = "Teardown failed; the rule stayed active")
    )
)]
pub async fn pause_rule(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<MetricRule>, ApiError> {
    state.lifecycle.pause(id).await.map(Json).map_err(api_error)
}

/// Live backend health for a provisioned rule.
#[utoipa::path(
    get,
    path = "/api/rules/{id}/status",
    tag = "Rules",
    params(("id" = Uuid, Path, description = "Rule id")),
    responses(
        (status = 200, description = "Transform health and counters", body = Object),
        (status = 400, description = "Draft rules have no backend job"),
        (status = 404, description = "No such rule")
    )
)]
pub async fn rule_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<BackendStatus>, ApiError> {
    let rule = state.lifecycle.get(id).map_err(api_error)?;
    if rule.status == RuleStatus::Draft {
        return Err((
            StatusCode::BAD_REQUEST,
            "draft rules have no backend job to report on".to_string(),
        ));
    }
    state
        .lifecycle
        .backend_status(id)
        .await
        .map(Json)
        .map_err(api_error)
}

// ── Estimation ───────────────────────────────────────────────────

/// Score, cost, and guardrail verdict for a spec without storing it.
#[utoipa::path(
    post,
    path = "/api/estimate",
    tag = "Rules",
    request_body = Object,
    responses(
        (status = 200, description = "Suitability score, cost estimate, and guardrail report", body = Object),
        (status = 422, description = "Spec invalid"),
        (status = 502, description = "Cluster statistics unavailable")
    )
)]
pub async fn estimate(
    State(state): State<Arc<AppState>>,
    Json(mut spec): Json<RuleSpec>,
) -> Result<Json<RuleAssessment>, ApiError> {
    spec.resolve_defaults();
    spec.validate().map_err(api_error)?;
    state
        .lifecycle
        .assess(&spec.as_candidate(), spec.retention_days)
        .await
        .map(Json)
        .map_err(api_error)
}
