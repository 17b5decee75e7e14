//! Dashboard system connector, write side.
//!
//! Maintains the shared metrics dashboard: creates it on demand, creates
//! a data view per activated rule, clones the rule's origin visualization
//! and rewires it onto the metrics index, and appends the clone as a new
//! panel. All writes go through the saved-objects NDJSON import endpoint
//! with `overwrite=true`, so re-running them is safe.

use reqwest::multipart::{Form, Part};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::info;

use l2m_core::naming;
use l2m_core::rule::{ComputeKind, ComputeSpec, MetricRule};
use l2m_core::{L2mError, Result};

use crate::kibana::{reference_map, resolve_panel_reference, KibanaClient};

impl KibanaClient {
    /// The shared metrics dashboard, or `None` when it has not been
    /// created yet.
    pub async fn metrics_dashboard(&self) -> Result<Option<Value>> {
        match self.dashboard_raw(naming::METRICS_DASHBOARD_ID).await {
            Ok(dashboard) => Ok(Some(dashboard)),
            Err(L2mError::BackendRejected { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Create (or overwrite) the empty metrics dashboard.
    pub async fn create_metrics_dashboard(&self, title: &str) -> Result<Value> {
        let search_source = serde_json::to_string(&json!({
            "query": { "query": "", "language": "kuery" },
            "filter": [],
        }))?;
        let dashboard = json!({
            "id": naming::METRICS_DASHBOARD_ID,
            "type": "dashboard",
            "attributes": {
                "title": title,
                "description": "Continuously materialized metrics, one panel per rule.",
                "panelsJSON": "[]",
                "timeRestore": true,
                "timeFrom": "now-24h",
                "timeTo": "now",
                "refreshInterval": { "pause": false, "value": 30000 },
                "kibanaSavedObjectMeta": { "searchSourceJSON": search_source },
            },
            "references": [],
        });
        info!("creating metrics dashboard '{}'", title);
        self.import_saved_objects(&[dashboard]).await
    }

    /// Clone the rule's origin visualization onto its metrics index and
    /// append it to the metrics dashboard. Errors when the rule has no
    /// origin panel or the origin visualization cannot be resolved.
    pub async fn add_rule_panel(&self, rule: &MetricRule) -> Result<Value> {
        let origin = rule.origin.as_ref().ok_or_else(|| {
            L2mError::validation("origin", "rule has no origin panel to clone a chart from")
        })?;

        let dashboard = match self.metrics_dashboard().await? {
            Some(dashboard) => dashboard,
            None => {
                self.create_metrics_dashboard("Metrics").await?;
                self.dashboard_raw(naming::METRICS_DASHBOARD_ID).await?
            }
        };

        let data_view_id = naming::data_view_id(rule.id);
        self.create_data_view(
            &data_view_id,
            &naming::metrics_index(rule.id),
            &rule.source.time_field,
            &format!("Metrics: {}", rule.name),
        )
        .await?;

        let origin_vis_id = self
            .resolve_panel_vis_id(&origin.dashboard_id, &origin.panel_id)
            .await?
            .ok_or_else(|| {
                L2mError::unexpected(
                    "resolve origin visualization",
                    format!(
                        "no visualization reference for panel '{}' in dashboard '{}'",
                        origin.panel_id, origin.dashboard_id
                    ),
                )
            })?;
        let origin_vis = self.saved_object("visualization", &origin_vis_id).await?;

        let vis_id = naming::visualization_id(rule.id);
        let vis_obj = rewire_visualization(
            &origin_vis,
            &vis_id,
            &data_view_id,
            &rule.name,
            &rule.compute,
        )?;
        let dashboard_obj = with_appended_panel(&dashboard, rule, &vis_id)?;

        info!("adding panel for rule {} to the metrics dashboard", rule.id);
        self.import_saved_objects(&[vis_obj, dashboard_obj]).await
    }

    /// The visualization a dashboard panel points at, if any.
    async fn resolve_panel_vis_id(
        &self,
        dashboard_id: &str,
        panel_index: &str,
    ) -> Result<Option<String>> {
        let dashboard = self.dashboard_raw(dashboard_id).await?;
        Ok(find_panel_vis_id(&dashboard, panel_index))
    }

    /// Create a data view over an index pattern. Conflict answers mean it
    /// already exists and are treated as success.
    pub async fn create_data_view(
        &self,
        data_view_id: &str,
        index_pattern: &str,
        time_field: &str,
        name: &str,
    ) -> Result<()> {
        let operation = "create data view";
        let payload = json!({
            "data_view": {
                "id": data_view_id,
                "title": index_pattern,
                "timeFieldName": time_field,
                "name": name,
            },
        });
        let response = self
            .request(Method::POST, "/api/data_views/data_view")
            .json(&payload)
            .send()
            .await
            .map_err(|e| L2mError::unavailable(operation, e))?;
        let status = response.status().as_u16();
        if !matches!(status, 200 | 400 | 409) {
            let body = response.text().await.unwrap_or_default();
            return Err(L2mError::rejected(
                operation,
                format!("HTTP {}: {}", status, body),
            ));
        }
        Ok(())
    }

    /// Import saved objects through the NDJSON endpoint, overwriting any
    /// object with the same id.
    async fn import_saved_objects(&self, objects: &[Value]) -> Result<Value> {
        let operation = "import saved objects";
        let mut ndjson = String::new();
        for obj in objects {
            ndjson.push_str(&serde_json::to_string(obj)?);
            ndjson.push('\n');
        }
        let part = Part::text(ndjson).file_name("objects.ndjson");
        let form = Form::new().part("file", part);
        let builder = self
            .request(Method::POST, "/api/saved_objects/_import?overwrite=true")
            .multipart(form);
        self.send_json(builder, operation).await
    }
}

// ── Saved-object assembly ─────────────────────────────────────

/// Chart agg type and output field for a compute kind. Counts become a
/// sum over the per-bucket `event_count`; distributions chart the
/// pre-computed percentile values.
fn metric_agg_for(compute: &ComputeSpec) -> (&'static str, String) {
    let agg_type = match compute.kind {
        ComputeKind::Count | ComputeKind::Sum => "sum",
        ComputeKind::Avg | ComputeKind::Distribution => "avg",
    };
    (agg_type, compute.output_field())
}

/// Copy a visualization, point every metric agg at the rule's
/// materialized output field, clear the source query, and reference the
/// rule's data view. The original object is not modified.
fn rewire_visualization(
    original: &Value,
    new_vis_id: &str,
    data_view_id: &str,
    title: &str,
    compute: &ComputeSpec,
) -> Result<Value> {
    let mut attrs = original["attributes"].clone();
    let (agg_type, metric_field) = metric_agg_for(compute);

    let mut vis_state: Value =
        serde_json::from_str(attrs["visState"].as_str().unwrap_or("{}")).unwrap_or_default();
    vis_state["title"] = json!(title);
    if let Some(aggs) = vis_state["aggs"].as_array_mut() {
        for agg in aggs {
            if agg["schema"].as_str() == Some("metric") {
                agg["type"] = json!(agg_type);
                agg["params"] = json!({ "field": metric_field });
            }
        }
    }
    attrs["title"] = json!(title);
    attrs["visState"] = Value::String(serde_json::to_string(&vis_state)?);

    // The source filter already ran inside the transform; the clone must
    // read the metrics index unfiltered.
    let mut search_source: Value = serde_json::from_str(
        attrs["kibanaSavedObjectMeta"]["searchSourceJSON"]
            .as_str()
            .unwrap_or("{}"),
    )
    .unwrap_or_default();
    search_source["query"] = json!({ "query": "", "language": "kuery" });
    search_source["filter"] = json!([]);
    attrs["kibanaSavedObjectMeta"]["searchSourceJSON"] =
        Value::String(serde_json::to_string(&search_source)?);

    Ok(json!({
        "id": new_vis_id,
        "type": "visualization",
        "attributes": attrs,
        "references": [{
            "id": data_view_id,
            "name": "kibanaSavedObjectMeta.searchSourceJSON.index",
            "type": "index-pattern",
        }],
    }))
}

/// Rebuild the metrics dashboard object with one more full-width panel
/// row pointing at the rule's visualization.
fn with_appended_panel(dashboard: &Value, rule: &MetricRule, vis_id: &str) -> Result<Value> {
    let attrs = &dashboard["attributes"];
    let mut panels: Vec<Value> =
        serde_json::from_str(attrs["panelsJSON"].as_str().unwrap_or("[]")).unwrap_or_default();
    let mut references = dashboard["references"].as_array().cloned().unwrap_or_default();

    let panel_index = format!("p_rule_{}", rule.id);
    let panel_ref_name = format!("panel_{}", panel_index);
    let row = panels.len() as u64;
    panels.push(json!({
        "panelIndex": panel_index,
        "gridData": { "x": 0, "y": row * 15, "w": 48, "h": 15, "i": panel_index },
        "type": "visualization",
        "panelRefName": panel_ref_name,
        "title": rule.name,
    }));
    references.push(json!({
        "id": vis_id,
        "name": panel_ref_name,
        "type": "visualization",
    }));

    let mut new_attrs = attrs.clone();
    new_attrs["panelsJSON"] = Value::String(serde_json::to_string(&panels)?);

    Ok(json!({
        "id": naming::METRICS_DASHBOARD_ID,
        "type": "dashboard",
        "attributes": new_attrs,
        "references": references,
    }))
}

fn find_panel_vis_id(dashboard: &Value, panel_index: &str) -> Option<String> {
    let panels: Vec<Value> =
        serde_json::from_str(dashboard["attributes"]["panelsJSON"].as_str().unwrap_or("[]"))
            .ok()?;
    let references = reference_map(dashboard);
    let panel = panels
        .iter()
        .find(|p| p["panelIndex"].as_str() == Some(panel_index))?;
    let (id, ref_type) = resolve_panel_reference(panel, &references);
    if id.is_empty() || ref_type != "visualization" {
        None
    } else {
        Some(id)
    }
}

// ── Tests ─────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use l2m_core::rule::{RuleGrouping, RuleSource, RuleStatus};
    use uuid::Uuid;

    fn count_compute() -> ComputeSpec {
        ComputeSpec {
            kind: ComputeKind::Count,
            value_field: None,
            percentiles: None,
        }
    }

    fn make_rule(name: &str) -> MetricRule {
        MetricRule {
            id: Uuid::nil(),
            name: name.to_string(),
            owner: String::new(),
            source: RuleSource {
                index_pattern: "app-logs*".to_string(),
                time_field: "timestamp".to_string(),
                filter: None,
            },
            grouping: RuleGrouping::default(),
            compute: count_compute(),
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

    fn origin_vis() -> Value {
        json!({
            "id": "vis-origin",
            "type": "visualization",
            "attributes": {
                "title": "Errors over time",
                "visState": json!({
                    "title": "Errors over time",
                    "type": "line",
                    "aggs": [
                        { "id": "1", "enabled": true, "type": "count", "schema": "metric",
                          "params": {} },
                        { "id": "2", "enabled": true, "type": "date_histogram", "schema": "segment",
                          "params": { "field": "@timestamp", "interval": "1m" } },
                    ],
                })
                .to_string(),
                "kibanaSavedObjectMeta": {
                    "searchSourceJSON": json!({
                        "query": { "query": "level:error", "language": "kuery" },
                        "filter": [{ "meta": {} }],
                    })
                    .to_string(),
                },
            },
        })
    }

    #[test]
    fn metric_agg_mapping_per_compute_kind() {
        let cases = [
            (ComputeKind::Count, None, ("sum", "event_count")),
            (ComputeKind::Sum, Some("bytes"), ("sum", "sum_bytes")),
            (ComputeKind::Avg, Some("latency_ms"), ("avg", "avg_latency_ms")),
            (ComputeKind::Distribution, Some("latency_ms"), ("avg", "pct_latency_ms")),
        ];
        for (kind, field, (want_type, want_field)) in cases {
            let compute = ComputeSpec {
                kind,
                value_field: field.map(str::to_string),
                percentiles: None,
            };
            let (agg_type, agg_field) = metric_agg_for(&compute);
            assert_eq!(agg_type, want_type);
            assert_eq!(agg_field, want_field);
        }
    }

    #[test]
    fn rewired_visualization_points_at_the_output_field() {
        let rewired =
            rewire_visualization(&origin_vis(), "vis-new", "dv-new", "My rule", &count_compute())
                .unwrap();

        assert_eq!(rewired["id"], "vis-new");
        assert_eq!(rewired["attributes"]["title"], "My rule");

        let vis_state: Value =
            serde_json::from_str(rewired["attributes"]["visState"].as_str().unwrap()).unwrap();
        let aggs = vis_state["aggs"].as_array().unwrap();
        assert_eq!(aggs[0]["type"], "sum");
        assert_eq!(aggs[0]["params"]["field"], "event_count");
        // The non-metric agg keeps its shape.
        assert_eq!(aggs[1]["type"], "date_histogram");
        assert_eq!(aggs[1]["params"]["field"], "@timestamp");
    }

    #[test]
    fn rewired_visualization_clears_query_and_filters() {
        let rewired =
            rewire_visualization(&origin_vis(), "vis-new", "dv-new", "My rule", &count_compute())
                .unwrap();
        let source: Value = serde_json::from_str(
            rewired["attributes"]["kibanaSavedObjectMeta"]["searchSourceJSON"]
                .as_str()
                .unwrap(),
        )
        .unwrap();
        assert_eq!(source["query"]["query"], "");
        assert_eq!(source["filter"].as_array().unwrap().len(), 0);

        let refs = rewired["references"].as_array().unwrap();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0]["id"], "dv-new");
        assert_eq!(refs[0]["type"], "index-pattern");
    }

    #[test]
    fn appended_panel_lands_on_its_own_row() {
        let dashboard = json!({
            "id": naming::METRICS_DASHBOARD_ID,
            "attributes": {
                "title": "Metrics",
                "panelsJSON": json!([
                    { "panelIndex": "p_rule_a", "gridData": { "x": 0, "y": 0, "w": 48, "h": 15 } },
                ])
                .to_string(),
            },
            "references": [
                { "id": "vis-a", "name": "panel_p_rule_a", "type": "visualization" },
            ],
        });
        let rule = make_rule("p99 latency");

        let updated = with_appended_panel(&dashboard, &rule, "vis-b").unwrap();
        let panels: Vec<Value> =
            serde_json::from_str(updated["attributes"]["panelsJSON"].as_str().unwrap()).unwrap();
        assert_eq!(panels.len(), 2);
        assert_eq!(panels[1]["gridData"]["y"], 15);
        assert_eq!(
            panels[1]["panelIndex"],
            format!("p_rule_{}", Uuid::nil())
        );
        assert_eq!(panels[1]["title"], "p99 latency");

        let refs = updated["references"].as_array().unwrap();
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[1]["id"], "vis-b");
    }

    #[test]
    fn panel_vis_lookup_handles_prefixed_reference_names() {
        let dashboard = json!({
            "attributes": {
                "panelsJSON": json!([
                    { "panelIndex": "3", "panelRefName": "panel_3" },
                ])
                .to_string(),
            },
            "references": [
                { "id": "vis-3", "name": "3:panel_3", "type": "visualization" },
            ],
        });
        assert_eq!(find_panel_vis_id(&dashboard, "3").as_deref(), Some("vis-3"));
        assert!(find_panel_vis_id(&dashboard, "4").is_none());
    }

    #[test]
    fn panel_vis_lookup_ignores_non_visualization_panels() {
        let dashboard = json!({
            "attributes": {
                "panelsJSON": json!([
                    { "panelIndex": "1", "panelRefName": "panel_1" },
                ])
                .to_string(),
            },
            "references": [
                { "id": "search-1", "name": "panel_1", "type": "search" },
            ],
        });
        assert!(find_panel_vis_id(&dashboard, "1").is_none());
    }
}
