//! Domain-focused API endpoint modules.
//!
//! Each sub-module owns a single responsibility area. The shared error
//! mapping lives here in mod.rs.

mod analysis;
mod cluster;
mod dashboard;
pub mod doc;
mod health;
mod rules;

use axum::http::StatusCode;

use l2m_core::error::L2mError;

// ── Shared error mapping ─────────────────────────────────────────

/// Error shape every handler returns: status code plus plain-text detail.
pub(crate) type ApiError = (StatusCode, String);

/// Map domain errors onto HTTP statuses. Transport failures toward the
/// cluster are gateway errors; the cluster answering 404 about a
/// pass-through read stays a plain not-found.
pub(crate) fn api_error(e: L2mError) -> ApiError {
    let status = match &e {
        L2mError::RuleNotFound(_) => StatusCode::NOT_FOUND,
        L2mError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        L2mError::InvalidTransition { .. } => StatusCode::CONFLICT,
        L2mError::BackendRejected { detail, .. } if detail.starts_with("HTTP 404") => {
            StatusCode::NOT_FOUND
        }
        L2mError::BackendUnavailable { .. }
        | L2mError::BackendRejected { .. }
        | L2mError::UnexpectedResponse { .. } => StatusCode::BAD_GATEWAY,
        L2mError::Io(_) | L2mError::Json(_) | L2mError::Invariant(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, e.to_string())
}

// ── Re-exports ───────────────────────────────────────────────────
// Preserves flat `api::foo` import paths used by router.rs.

pub use analysis::analyze_dashboard;
pub use cluster::{es_cardinality, es_indices, es_mapping, es_stats, kibana_dashboards};
pub use dashboard::{add_rule_panel, create_metrics_dashboard};
pub use health::{config_summary, health};
pub use rules::{
    create_rule, delete_rule, estimate, get_rule, list_rules, pause_rule, rule_status, start_rule,
    update_rule,
};
