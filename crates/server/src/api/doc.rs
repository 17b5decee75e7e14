//! OpenAPI documentation aggregator.
//!
//! Collects all `#[utoipa::path]`-annotated handlers into a single
//! OpenAPI spec, served via Scalar UI at `/docs`.

use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "logs-to-metrics API",
        version = "0.1.0",
        description = "Converts dashboard panels backed by raw log queries into continuously materialized metrics: suitability scoring, cost estimation, guardrails, and full rule lifecycle over cluster transforms.",
    ),
    tags(
        (name = "Health", description = "Server liveness and effective configuration"),
        (name = "Rules", description = "Metric rule CRUD, lifecycle transitions, and estimation"),
        (name = "Analysis", description = "Dashboard panel scoring"),
        (name = "Cluster", description = "Pass-through reads against the log cluster and dashboard system"),
        (name = "Dashboard", description = "Metrics dashboard creation and panel cloning"),
    ),
    paths(
        // Health
        crate::api::health::health,
        crate::api::health::config_summary,
        // Rules
        crate::api::rules::create_rule,
        crate::api::rules::list_rules,
        crate::api::rules::get_rule,
        crate::api::rules::update_rule,
        crate::api::rules::delete_rule,
        crate::api::rules::start_rule,
        crate::api::rules::pause_rule,
        crate::api::rules::rule_status,
        crate::api::rules::estimate,
        // Analysis
        crate::api::analysis::analyze_dashboard,
        // Cluster
        crate::api::cluster::es_indices,
        crate::api::cluster::es_mapping,
        crate::api::cluster::es_cardinality,
        crate::api::cluster::es_stats,
        crate::api::cluster::kibana_dashboards,
        // Dashboard
        crate::api::dashboard::create_metrics_dashboard,
        crate::api::dashboard::add_rule_panel,
    ),
    components(schemas(
        // Health
        crate::api::health::HealthResponse,
    ))
)]
pub struct ApiDoc;
