//! Dashboard system connector, read side.
//!
//! Fetches dashboards and their referenced saved objects over the Kibana
//! REST API and normalizes each panel into a [`CandidateDescriptor`].
//! Saved searches become raw candidates; classic visualizations are
//! parsed from their `visState` aggregations. Parsing is pure and
//! separated from the fetch layer so it can run against captured JSON.

use std::collections::HashMap;

use reqwest::Method;
use serde_json::Value;
use tracing::{debug, warn};

use l2m_core::candidate::{AggregationKind, CandidateDescriptor, DimensionSpec, UsageMetadata};
use l2m_core::config::ClusterConfig;
use l2m_core::rule::{ComputeKind, ComputeSpec, RuleOrigin};
use l2m_core::{L2mError, Result};

use crate::models::{DashboardDetail, DashboardSummary};

#[derive(Clone)]
pub struct KibanaClient {
    client: reqwest::Client,
    base_url: String,
    auth: Option<(String, String)>,
}

impl KibanaClient {
    pub fn new(base_url: impl Into<String>, auth: Option<(String, String)>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth,
        }
    }

    pub fn from_config(cluster: &ClusterConfig) -> Self {
        let auth = cluster
            .basic_auth()
            .map(|(u, p)| (u.to_string(), p.to_string()));
        Self::new(cluster.kibana_url.clone(), auth)
    }

    // ── Read API ──────────────────────────────────────────────

    /// All dashboards with id, title, description.
    pub async fn list_dashboards(&self) -> Result<Vec<DashboardSummary>> {
        let raw = self
            .get_json(
                "/api/saved_objects/_find?type=dashboard&per_page=100",
                "list dashboards",
            )
            .await?;
        let objects = raw["saved_objects"].as_array().cloned().unwrap_or_default();
        Ok(objects
            .iter()
            .map(|obj| DashboardSummary {
                id: obj["id"].as_str().unwrap_or("").to_string(),
                title: obj["attributes"]["title"].as_str().unwrap_or("").to_string(),
                description: obj["attributes"]["description"]
                    .as_str()
                    .unwrap_or("")
                    .to_string(),
            })
            .collect())
    }

    /// Full saved object for a dashboard.
    pub async fn dashboard_raw(&self, dashboard_id: &str) -> Result<Value> {
        self.saved_object("dashboard", dashboard_id).await
    }

    /// Fetch a dashboard and normalize every panel into a candidate.
    pub async fn dashboard_with_candidates(&self, dashboard_id: &str) -> Result<DashboardDetail> {
        let raw = self.dashboard_raw(dashboard_id).await?;
        let attrs = &raw["attributes"];
        let title = attrs["title"].as_str().unwrap_or("").to_string();
        let description = attrs["description"].as_str().unwrap_or("").to_string();
        let usage = usage_from_attributes(attrs);

        let panels: Vec<Value> =
            serde_json::from_str(attrs["panelsJSON"].as_str().unwrap_or("[]"))
                .unwrap_or_default();
        let references = reference_map(&raw);

        let mut candidates = Vec::with_capacity(panels.len());
        for panel in &panels {
            let panel_id = panel["panelIndex"].as_str().unwrap_or("").to_string();
            let panel_title = panel["title"].as_str().unwrap_or("").to_string();
            let (ref_id, ref_type) = resolve_panel_reference(panel, &references);

            let mut candidate = match ref_type.as_str() {
                "search" => {
                    let obj = self.saved_object("search", &ref_id).await?;
                    let mut c = candidate_from_search(&panel_title, &obj);
                    c.index_pattern = self.resolved_index_pattern(&obj).await;
                    c
                }
                "visualization" => {
                    let obj = self.saved_object("visualization", &ref_id).await?;
                    let mut c = candidate_from_visualization(&panel_title, &obj);
                    c.index_pattern = self.resolved_index_pattern(&obj).await;
                    c
                }
                other => unknown_candidate(&panel_title, other),
            };

            candidate.origin = Some(RuleOrigin {
                dashboard_id: dashboard_id.to_string(),
                dashboard_title: title.clone(),
                panel_id,
                panel_title,
            });
            candidates.push(candidate);
        }

        Ok(DashboardDetail {
            id: raw["id"].as_str().unwrap_or(dashboard_id).to_string(),
            title,
            description,
            candidates,
            usage,
        })
    }

    /// Resolve a data view ID to its index pattern. `Ok(None)` when the
    /// data view does not exist.
    pub async fn data_view_index_pattern(&self, data_view_id: &str) -> Result<Option<String>> {
        let operation = "resolve data view";
        let response = self
            .request(
                Method::GET,
                &format!("/api/data_views/data_view/{}", data_view_id),
            )
            .send()
            .await
            .map_err(|e| L2mError::unavailable(operation, e))?;
        if response.status().as_u16() != 200 {
            return Ok(None);
        }
        let body: Value = response
            .json()
            .await
            .map_err(|e| L2mError::unexpected(operation, e))?;
        Ok(body["data_view"]["title"].as_str().map(str::to_string))
    }

    /// Index pattern for a saved object's index-pattern reference, falling
    /// back to the raw reference id when resolution fails.
    async fn resolved_index_pattern(&self, obj: &Value) -> Option<String> {
        let ref_id = index_ref_id(obj)?;
        match self.data_view_index_pattern(&ref_id).await {
            Ok(Some(pattern)) => Some(pattern),
            Ok(None) => Some(ref_id),
            Err(e) => {
                warn!("data view {} resolution failed: {}", ref_id, e);
                Some(ref_id)
            }
        }
    }

    // ── Plumbing ──────────────────────────────────────────────

    pub(crate) async fn saved_object(&self, object_type: &str, id: &str) -> Result<Value> {
        self.get_json(
            &format!("/api/saved_objects/{}/{}", object_type, id),
            "fetch saved object",
        )
        .await
    }

    pub(crate) fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        debug!("Kibana request: {}", url);
        let mut builder = self
            .client
            .request(method, url)
            .header("kbn-xsrf", "true");
        if let Some((user, pass)) = &self.auth {
            builder = builder.basic_auth(user, Some(pass));
        }
        builder
    }

    pub(crate) async fn get_json(&self, path: &str, operation: &str) -> Result<Value> {
        self.send_json(self.request(Method::GET, path), operation)
            .await
    }

    pub(crate) async fn send_json(
        &self,
        builder: reqwest::RequestBuilder,
        operation: &str,
    ) -> Result<Value> {
        let response = builder
            .send()
            .await
            .map_err(|e| L2mError::unavailable(operation, e))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(L2mError::rejected(
                operation,
                format!("HTTP {}: {}", status.as_u16(), body),
            ));
        }
        response
            .json()
            .await
            .map_err(|e| L2mError::unexpected(operation, e))
    }
}

// ── Panel parsing ─────────────────────────────────────────────

/// Numeric metric aggs we can materialize become the typed compute;
/// other numeric aggs are ignored; anything else disqualifies.
enum MetricAgg {
    Compute(ComputeSpec),
    Numeric,
    Unsupported,
}

pub(crate) fn reference_map(dashboard: &Value) -> HashMap<String, (String, String)> {
    let mut map = HashMap::new();
    if let Some(refs) = dashboard["references"].as_array() {
        for r in refs {
            if let Some(name) = r["name"].as_str() {
                map.insert(
                    name.to_string(),
                    (
                        r["id"].as_str().unwrap_or("").to_string(),
                        r["type"].as_str().unwrap_or("").to_string(),
                    ),
                );
            }
        }
    }
    map
}

/// Reference names may be stored bare or prefixed with "{panelIndex}:".
pub(crate) fn resolve_panel_reference(
    panel: &Value,
    references: &HashMap<String, (String, String)>,
) -> (String, String) {
    let ref_name = panel["panelRefName"].as_str().unwrap_or("");
    let panel_index = panel["panelIndex"].as_str().unwrap_or("");
    let hit = references
        .get(ref_name)
        .or_else(|| references.get(&format!("{}:{}", panel_index, ref_name)));
    match hit {
        Some((id, ref_type)) => (id.clone(), ref_type.clone()),
        None => (
            String::new(),
            panel["type"].as_str().unwrap_or("").to_string(),
        ),
    }
}

/// A saved search is always a raw-document listing.
fn candidate_from_search(panel_title: &str, obj: &Value) -> CandidateDescriptor {
    let attrs = &obj["attributes"];
    CandidateDescriptor {
        title: pick_title(panel_title, attrs),
        index_pattern: None,
        time_field: None,
        filter: extract_query_string(&search_source(attrs)),
        aggregation: AggregationKind::Raw,
        time_bucket: None,
        compute: None,
        unsupported_aggregations: Vec::new(),
        dimensions: Vec::new(),
        origin: None,
    }
}

/// Parse a classic visualization's `visState` aggregations.
fn candidate_from_visualization(panel_title: &str, obj: &Value) -> CandidateDescriptor {
    let attrs = &obj["attributes"];
    let filter = extract_query_string(&search_source(attrs));
    let vis_state: Value =
        serde_json::from_str(attrs["visState"].as_str().unwrap_or("{}")).unwrap_or_default();

    let mut time_field = None;
    let mut time_bucket = None;
    let mut compute: Option<ComputeSpec> = None;
    let mut unsupported = Vec::new();
    let mut dimensions = Vec::new();
    let mut time_bucketed = false;

    if let Some(aggs) = vis_state["aggs"].as_array() {
        for agg in aggs {
            if !agg["enabled"].as_bool().unwrap_or(true) {
                continue;
            }
            let agg_type = agg["type"].as_str().unwrap_or("");
            let params = &agg["params"];

            match agg["schema"].as_str().unwrap_or("") {
                "metric" => match classify_metric_agg(agg_type, params) {
                    MetricAgg::Compute(spec) => {
                        if compute.is_none() {
                            compute = Some(spec);
                        }
                    }
                    MetricAgg::Numeric => {}
                    MetricAgg::Unsupported => unsupported.push(agg_type.to_string()),
                },
                "segment" if agg_type == "date_histogram" => {
                    time_bucketed = true;
                    time_field =
                        Some(params["field"].as_str().unwrap_or("timestamp").to_string());
                    if let Some(interval) = params["interval"].as_str() {
                        if !interval.is_empty() && interval != "auto" {
                            time_bucket = Some(interval.to_string());
                        }
                    }
                }
                "group" => {
                    if let Some(field) = params["field"].as_str() {
                        if !field.is_empty() {
                            dimensions.push(DimensionSpec::named(field));
                        }
                    }
                }
                _ => {}
            }
        }
    }

    CandidateDescriptor {
        title: pick_title(panel_title, attrs),
        index_pattern: None,
        time_field,
        filter,
        aggregation: if time_bucketed {
            AggregationKind::TimeBucketed
        } else {
            AggregationKind::Other
        },
        time_bucket,
        compute,
        unsupported_aggregations: unsupported,
        dimensions,
        origin: None,
    }
}

fn classify_metric_agg(agg_type: &str, params: &Value) -> MetricAgg {
    let field = params["field"].as_str().map(str::to_string);
    match agg_type {
        "count" => MetricAgg::Compute(ComputeSpec {
            kind: ComputeKind::Count,
            value_field: None,
            percentiles: None,
        }),
        "sum" => MetricAgg::Compute(ComputeSpec {
            kind: ComputeKind::Sum,
            value_field: field,
            percentiles: None,
        }),
        "avg" => MetricAgg::Compute(ComputeSpec {
            kind: ComputeKind::Avg,
            value_field: field,
            percentiles: None,
        }),
        "percentiles" => {
            let percents = params["percents"]
                .as_array()
                .map(|a| a.iter().filter_map(Value::as_f64).collect::<Vec<f64>>())
                .filter(|v| !v.is_empty());
            MetricAgg::Compute(ComputeSpec {
                kind: ComputeKind::Distribution,
                value_field: field,
                percentiles: percents,
            })
        }
        // Numeric but not materializable as a continuous compute.
        "min" | "max" | "cardinality" | "value_count" | "median_absolute_deviation" => {
            MetricAgg::Numeric
        }
        _ => MetricAgg::Unsupported,
    }
}

fn unknown_candidate(panel_title: &str, ref_type: &str) -> CandidateDescriptor {
    CandidateDescriptor {
        title: if panel_title.is_empty() {
            format!("({} panel)", if ref_type.is_empty() { "unknown" } else { ref_type })
        } else {
            panel_title.to_string()
        },
        index_pattern: None,
        time_field: None,
        filter: None,
        aggregation: AggregationKind::Other,
        time_bucket: None,
        compute: None,
        unsupported_aggregations: Vec::new(),
        dimensions: Vec::new(),
        origin: None,
    }
}

/// Behavioral signals from the dashboard's saved state. `timeFrom` only
/// counts when the dashboard restores its time range; the refresh value
/// only counts when refresh is not paused.
pub(crate) fn usage_from_attributes(attrs: &Value) -> UsageMetadata {
    let lookback = if attrs["timeRestore"].as_bool().unwrap_or(false) {
        attrs["timeFrom"].as_str().map(str::to_string)
    } else {
        None
    };

    let refresh = &attrs["refreshInterval"];
    let refresh_interval_ms = if refresh.is_object()
        && !refresh["pause"].as_bool().unwrap_or(true)
    {
        refresh["value"].as_u64()
    } else {
        None
    };

    UsageMetadata {
        lookback,
        refresh_interval_ms,
    }
}

fn pick_title(panel_title: &str, attrs: &Value) -> String {
    if !panel_title.is_empty() {
        panel_title.to_string()
    } else {
        attrs["title"].as_str().unwrap_or("").to_string()
    }
}

fn search_source(attrs: &Value) -> Value {
    serde_json::from_str(
        attrs["kibanaSavedObjectMeta"]["searchSourceJSON"]
            .as_str()
            .unwrap_or("{}"),
    )
    .unwrap_or_default()
}

fn extract_query_string(search_source: &Value) -> Option<String> {
    let query = search_source["query"]["query"].as_str()?.trim();
    if query.is_empty() {
        None
    } else {
        Some(query.to_string())
    }
}

fn index_ref_id(obj: &Value) -> Option<String> {
    obj["references"]
        .as_array()?
        .iter()
        .find(|r| r["type"].as_str() == Some("index-pattern"))
        .and_then(|r| r["id"].as_str())
        .map(str::to_string)
}

// ── Tests ─────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vis_object(vis_state: Value, query: &str) -> Value {
        json!({
            "id": "vis-1",
            "type": "visualization",
            "attributes": {
                "title": "Errors by service",
                "visState": vis_state.to_string(),
                "kibanaSavedObjectMeta": {
                    "searchSourceJSON": json!({
                        "query": { "query": query, "language": "kuery" },
                        "filter": [],
                    })
                    .to_string(),
                },
            },
            "references": [
                { "name": "kibanaSavedObjectMeta.searchSourceJSON.index",
                  "type": "index-pattern", "id": "dv-123" },
            ],
        })
    }

    #[test]
    fn visualization_with_date_histogram_is_time_bucketed() {
        let vis_state = json!({
            "type": "line",
            "aggs": [
                { "id": "1", "enabled": true, "type": "avg", "schema": "metric",
                  "params": { "field": "latency_ms" } },
                { "id": "2", "enabled": true, "type": "date_histogram", "schema": "segment",
                  "params": { "field": "@timestamp", "interval": "5m" } },
                { "id": "3", "enabled": true, "type": "terms", "schema": "group",
                  "params": { "field": "service" } },
            ],
        });
        let c = candidate_from_visualization("", &vis_object(vis_state, "level:error"));

        assert_eq!(c.title, "Errors by service");
        assert_eq!(c.aggregation, AggregationKind::TimeBucketed);
        assert_eq!(c.time_field.as_deref(), Some("@timestamp"));
        assert_eq!(c.time_bucket.as_deref(), Some("5m"));
        assert_eq!(c.filter.as_deref(), Some("level:error"));
        let compute = c.compute.unwrap();
        assert_eq!(compute.kind, ComputeKind::Avg);
        assert_eq!(compute.value_field.as_deref(), Some("latency_ms"));
        assert_eq!(c.dimensions.len(), 1);
        assert_eq!(c.dimensions[0].name, "service");
        assert!(c.unsupported_aggregations.is_empty());
    }

    #[test]
    fn disabled_aggs_are_skipped() {
        let vis_state = json!({
            "type": "line",
            "aggs": [
                { "id": "1", "enabled": false, "type": "avg", "schema": "metric",
                  "params": { "field": "latency_ms" } },
                { "id": "2", "enabled": true, "type": "count", "schema": "metric", "params": {} },
            ],
        });
        let c = candidate_from_visualization("", &vis_object(vis_state, ""));
        assert_eq!(c.compute.unwrap().kind, ComputeKind::Count);
    }

    #[test]
    fn auto_interval_leaves_bucket_unset() {
        let vis_state = json!({
            "type": "histogram",
            "aggs": [
                { "id": "1", "enabled": true, "type": "date_histogram", "schema": "segment",
                  "params": { "field": "ts", "interval": "auto" } },
            ],
        });
        let c = candidate_from_visualization("", &vis_object(vis_state, ""));
        assert_eq!(c.aggregation, AggregationKind::TimeBucketed);
        assert!(c.time_bucket.is_none());
    }

    #[test]
    fn top_hits_lands_in_unsupported() {
        let vis_state = json!({
            "type": "table",
            "aggs": [
                { "id": "1", "enabled": true, "type": "top_hits", "schema": "metric",
                  "params": {} },
            ],
        });
        let c = candidate_from_visualization("", &vis_object(vis_state, ""));
        assert!(c.compute.is_none());
        assert_eq!(c.unsupported_aggregations, vec!["top_hits".to_string()]);
    }

    #[test]
    fn max_is_numeric_but_not_a_compute() {
        let vis_state = json!({
            "type": "line",
            "aggs": [
                { "id": "1", "enabled": true, "type": "max", "schema": "metric",
                  "params": { "field": "latency_ms" } },
            ],
        });
        let c = candidate_from_visualization("", &vis_object(vis_state, ""));
        assert!(c.compute.is_none());
        assert!(c.unsupported_aggregations.is_empty());
    }

    #[test]
    fn percentiles_carry_their_percents() {
        let vis_state = json!({
            "type": "line",
            "aggs": [
                { "id": "1", "enabled": true, "type": "percentiles", "schema": "metric",
                  "params": { "field": "latency_ms", "percents": [50.0, 95.0, 99.0] } },
            ],
        });
        let c = candidate_from_visualization("", &vis_object(vis_state, ""));
        let compute = c.compute.unwrap();
        assert_eq!(compute.kind, ComputeKind::Distribution);
        assert_eq!(compute.percentiles, Some(vec![50.0, 95.0, 99.0]));
    }

    #[test]
    fn saved_search_is_a_raw_candidate_with_trimmed_filter() {
        let obj = json!({
            "attributes": {
                "title": "Recent errors",
                "kibanaSavedObjectMeta": {
                    "searchSourceJSON": json!({
                        "query": { "query": "  level:error  ", "language": "kuery" },
                    })
                    .to_string(),
                },
            },
            "references": [],
        });
        let c = candidate_from_search("", &obj);
        assert_eq!(c.aggregation, AggregationKind::Raw);
        assert_eq!(c.filter.as_deref(), Some("level:error"));
        assert!(c.compute.is_none());
    }

    #[test]
    fn blank_query_means_no_filter() {
        let obj = json!({
            "attributes": {
                "title": "All logs",
                "kibanaSavedObjectMeta": {
                    "searchSourceJSON": json!({
                        "query": { "query": "   ", "language": "kuery" },
                    })
                    .to_string(),
                },
            },
        });
        let c = candidate_from_search("", &obj);
        assert!(c.filter.is_none());
    }

    #[test]
    fn panel_reference_falls_back_to_prefixed_name() {
        let dashboard = json!({
            "references": [
                { "name": "p1:panel_1", "type": "visualization", "id": "vis-9" },
            ],
        });
        let refs = reference_map(&dashboard);
        let panel = json!({ "panelIndex": "p1", "panelRefName": "panel_1" });
        let (id, ref_type) = resolve_panel_reference(&panel, &refs);
        assert_eq!(id, "vis-9");
        assert_eq!(ref_type, "visualization");
    }

    #[test]
    fn unreferenced_panel_uses_inline_type() {
        let refs = HashMap::new();
        let panel = json!({ "panelIndex": "p2", "panelRefName": "panel_2", "type": "lens" });
        let (id, ref_type) = resolve_panel_reference(&panel, &refs);
        assert!(id.is_empty());
        assert_eq!(ref_type, "lens");
    }

    #[test]
    fn usage_requires_time_restore_and_unpaused_refresh() {
        let restored = json!({
            "timeRestore": true,
            "timeFrom": "now-30d",
            "refreshInterval": { "pause": false, "value": 30000 },
        });
        let usage = usage_from_attributes(&restored);
        assert_eq!(usage.lookback.as_deref(), Some("now-30d"));
        assert_eq!(usage.refresh_interval_ms, Some(30000));

        let unrestored = json!({
            "timeRestore": false,
            "timeFrom": "now-30d",
            "refreshInterval": { "pause": true, "value": 30000 },
        });
        let usage = usage_from_attributes(&unrestored);
        assert!(usage.lookback.is_none());
        assert!(usage.refresh_interval_ms.is_none());
    }

    #[test]
    fn index_ref_takes_the_first_index_pattern_reference() {
        let obj = json!({
            "references": [
                { "name": "panel_1", "type": "visualization", "id": "vis-1" },
                { "name": "meta.index", "type": "index-pattern", "id": "dv-1" },
                { "name": "meta.index2", "type": "index-pattern", "id": "dv-2" },
            ],
        });
        assert_eq!(index_ref_id(&obj).as_deref(), Some("dv-1"));
    }
}
