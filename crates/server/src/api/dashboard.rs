//! Metrics-dashboard write endpoints.
//!
//! SRP: creating the shared metrics dashboard and appending rule panels
//! to it.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::state::AppState;

use super::{api_error, ApiError};

#[derive(Debug, Default, Deserialize)]
pub struct CreateDashboardBody {
    pub title: Option<String>,
}

/// Create (or overwrite) the shared metrics dashboard.
#[utoipa::path(
    post,
    path = "/api/dashboard/metrics",
    tag = "Dashboard",
    request_body = Object,
    responses(
        (status = 201, description = "Dashboard import result", body = Object),
        (status = 502, description = "Dashboard system unavailable")
    )
)]
pub async fn create_metrics_dashboard(
    State(state): State<Arc<AppState>>,
    body: Option<Json<CreateDashboardBody>>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let title = body
        .and_then(|Json(b)| b.title)
        .unwrap_or_else(|| "Metrics".to_string());
    state
        .kibana
        .create_metrics_dashboard(&title)
        .await
        .map(|result| (StatusCode::CREATED, Json(result)))
        .map_err(api_error)
}

/// Clone the rule's origin panel onto its metrics index and append it
/// to the metrics dashboard. Needs a rule with an origin panel.
#[utoipa::path(
    post,
    path = "/api/rules/{id}/panel",
    tag = "Dashboard",
    params(("id" = Uuid, Path, description = "Rule id")),
    responses(
        (status = 200, description = "Import result for the cloned panel", body = Object),
        (status = 404, description = "No such rule, or its origin cannot be resolved"),
        (status = 422, description = "Rule has no origin panel"),
        (status = 502, description = "Dashboard system unavailable")
    )
)]
pub async fn add_rule_panel(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let rule = state.lifecycle.get(id).map_err(api_error)?;
    state
        .kibana
        .add_rule_panel(&rule)
        .await
        .map(Json)
        .map_err(api_error)
}
