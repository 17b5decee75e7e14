//! Names for the external resources a rule materializes into.
//!
//! Every provisioned artifact carries the `l2m-` prefix so operators can
//! spot, and bulk-clean, everything this system owns. Both the metrics
//! backend and the dashboard writer derive names from here; nothing else
//! may invent its own.

use uuid::Uuid;

/// Continuous transform driving one rule's metric.
pub fn transform_id(rule_id: Uuid) -> String {
    format!("l2m-rule-{}", rule_id)
}

/// Destination index holding one rule's metric points.
pub fn metrics_index(rule_id: Uuid) -> String {
    format!("l2m-metrics-rule-{}", rule_id)
}

/// Retention (ILM) policy for a given retention window. Shared across
/// all rules with the same window, so it is never deleted per-rule.
pub fn retention_policy(retention_days: u32) -> String {
    format!("l2m-metrics-{}d", retention_days)
}

/// Kibana data view pointing at one rule's metrics index.
pub fn data_view_id(rule_id: Uuid) -> String {
    format!("l2m-metrics-dv-rule-{}", rule_id)
}

/// Kibana visualization cloned for one rule on the metrics dashboard.
pub fn visualization_id(rule_id: Uuid) -> String {
    format!("l2m-metrics-vis-rule-{}", rule_id)
}

/// The single shared metrics dashboard.
pub const METRICS_DASHBOARD_ID: &str = "l2m-metrics-dashboard";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_carry_the_shared_prefix() {
        let id = Uuid::nil();
        assert_eq!(
            transform_id(id),
            "l2m-rule-00000000-0000-0000-0000-000000000000"
        );
        assert_eq!(
            metrics_index(id),
            "l2m-metrics-rule-00000000-0000-0000-0000-000000000000"
        );
        assert_eq!(retention_policy(450), "l2m-metrics-450d");
    }
}
