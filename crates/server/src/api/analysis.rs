//! Dashboard analysis endpoint.
//!
//! SRP: scoring every panel of an existing dashboard for conversion.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use l2m_connector::DashboardAnalysis;

use crate::state::AppState;

use super::{api_error, ApiError};

#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
pub struct AnalyzeParams {
    /// Lookback window for query-volume sampling, e.g. `7d`. Replaces
    /// each panel's own time range when set.
    pub lookback: Option<String>,
}

/// Score every panel of a dashboard as a conversion candidate.
#[utoipa::path(
    get,
    path = "/api/analysis/dashboards/{id}",
    tag = "Analysis",
    params(
        ("id" = String, Path, description = "Dashboard saved-object id"),
        AnalyzeParams
    ),
    responses(
        (status = 200, description = "Per-panel candidates with scores and cost estimates", body = Object),
        (status = 404, description = "No such dashboard"),
        (status = 502, description = "Cluster unavailable")
    )
)]
pub async fn analyze_dashboard(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<AnalyzeParams>,
) -> Result<Json<DashboardAnalysis>, ApiError> {
    l2m_connector::analyze_dashboard(&state.kibana, &state.es, &id, params.lookback.as_deref())
        .await
        .map(Json)
        .map_err(api_error)
}
