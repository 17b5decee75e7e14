//! Pass-through reads against the log cluster and the dashboard system.
//!
//! SRP: raw catalog lookups the UI drives while composing a spec. No
//! caching; every call hits the cluster.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use l2m_connector::models::{DashboardSummary, FieldCardinality, IndexInfo, IndexMapping};
use l2m_core::candidate::IndexStats;

use crate::state::AppState;

use super::{api_error, ApiError};

#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
pub struct IndicesParams {
    /// Index name pattern, e.g. `app-*`. Defaults to every index.
    pub pattern: Option<String>,
}

/// Indices matching a pattern, with doc counts and on-disk sizes.
#[utoipa::path(
    get,
    path = "/api/es/indices",
    tag = "Cluster",
    params(IndicesParams),
    responses(
        (status = 200, description = "Matching indices", body = Object),
        (status = 502, description = "Cluster unavailable")
    )
)]
pub async fn es_indices(
    State(state): State<Arc<AppState>>,
    Query(params): Query<IndicesParams>,
) -> Result<Json<Vec<IndexInfo>>, ApiError> {
    let pattern = params.pattern.as_deref().unwrap_or("*");
    state
        .es
        .list_indices(pattern)
        .await
        .map(Json)
        .map_err(api_error)
}

/// Flattened field mapping of one index.
#[utoipa::path(
    get,
    path = "/api/es/indices/{index}/mapping",
    tag = "Cluster",
    params(("index" = String, Path, description = "Index name")),
    responses(
        (status = 200, description = "Field names and types", body = Object),
        (status = 404, description = "No such index"),
        (status = 502, description = "Cluster unavailable")
    )
)]
pub async fn es_mapping(
    State(state): State<Arc<AppState>>,
    Path(index): Path<String>,
) -> Result<Json<IndexMapping>, ApiError> {
    state.es.mapping(&index).await.map(Json).map_err(api_error)
}

/// Approximate distinct-value count for one field.
#[utoipa::path(
    get,
    path = "/api/es/indices/{index}/cardinality/{field}",
    tag = "Cluster",
    params(
        ("index" = String, Path, description = "Index name"),
        ("field" = String, Path, description = "Field name")
    ),
    responses(
        (status = 200, description = "Cardinality estimate", body = Object),
        (status = 404, description = "No such index"),
        (status = 502, description = "Cluster unavailable")
    )
)]
pub async fn es_cardinality(
    State(state): State<Arc<AppState>>,
    Path((index, field)): Path<(String, String)>,
) -> Result<Json<FieldCardinality>, ApiError> {
    state
        .es
        .field_cardinality(&index, &field)
        .await
        .map(Json)
        .map_err(api_error)
}

/// Document count, store size, and query-load counters for one index.
#[utoipa::path(
    get,
    path = "/api/es/indices/{index}/stats",
    tag = "Cluster",
    params(("index" = String, Path, description = "Index name or pattern")),
    responses(
        (status = 200, description = "Index statistics", body = Object),
        (status = 404, description = "No such index"),
        (status = 502, description = "Cluster unavailable")
    )
)]
pub async fn es_stats(
    State(state): State<Arc<AppState>>,
    Path(index): Path<String>,
) -> Result<Json<IndexStats>, ApiError> {
    state
        .es
        .index_stats(&index)
        .await
        .map(Json)
        .map_err(api_error)
}

/// Every dashboard the dashboard system knows about.
#[utoipa::path(
    get,
    path = "/api/kibana/dashboards",
    tag = "Cluster",
    responses(
        (status = 200, description = "Dashboard ids and titles", body = Object),
        (status = 502, description = "Dashboard system unavailable")
    )
)]
pub async fn kibana_dashboards(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<DashboardSummary>>, ApiError> {
    state
        .kibana
        .list_dashboards()
        .await
        .map(Json)
        .map_err(api_error)
}
