//! HTTP router construction.
//!
//! Assembles all Axum routes, CORS, and OpenAPI docs into a single
//! `Router`.

use std::sync::Arc;

use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::warn;
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use crate::api;
use crate::state::AppState;

/// Build the complete application router with all routes and middleware.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.server.cors_origin);
    Router::new()
        .route("/health", get(api::health))
        .route("/api/config", get(api::config_summary))
        // Rules
        .route("/api/rules", get(api::list_rules).post(api::create_rule))
        .route(
            "/api/rules/{id}",
            get(api::get_rule)
                .put(api::update_rule)
                .delete(api::delete_rule),
        )
        .route("/api/rules/{id}/start", post(api::start_rule))
        .route("/api/rules/{id}/pause", post(api::pause_rule))
        .route("/api/rules/{id}/status", get(api::rule_status))
        .route("/api/rules/{id}/panel", post(api::add_rule_panel))
        .route("/api/estimate", post(api::estimate))
        // Analysis
        .route("/api/analysis/dashboards/{id}", get(api::analyze_dashboard))
        // Cluster pass-through
        .route("/api/kibana/dashboards", get(api::kibana_dashboards))
        .route("/api/es/indices", get(api::es_indices))
        .route("/api/es/indices/{index}/mapping", get(api::es_mapping))
        .route(
            "/api/es/indices/{index}/cardinality/{field}",
            get(api::es_cardinality),
        )
        .route("/api/es/indices/{index}/stats", get(api::es_stats))
        // Dashboard writes
        .route("/api/dashboard/metrics", post(api::create_metrics_dashboard))
        .layer(cors)
        .with_state(state)
        .merge(Scalar::with_url("/docs", api::doc::ApiDoc::openapi()))
}

/// Exact-origin CORS when one is configured, permissive for `*`. An
/// unparseable origin falls back to permissive with a warning rather
/// than refusing to boot.
fn cors_layer(origin: &str) -> CorsLayer {
    if origin == "*" {
        return CorsLayer::permissive();
    }
    match origin.parse::<HeaderValue>() {
        Ok(value) => CorsLayer::new()
            .allow_origin(AllowOrigin::exact(value))
            .allow_methods(Any)
            .allow_headers(Any),
        Err(_) => {
            warn!("CORS_ORIGIN '{}' is not a valid origin, allowing any", origin);
            CorsLayer::permissive()
        }
    }
}
