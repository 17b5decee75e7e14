//! Request-body assembly for the continuous transform and its resources.
//!
//! Pure functions from a [`MetricRule`] to the JSON bodies the cluster
//! expects. Kept separate from the HTTP layer so the exact shapes can be
//! asserted in tests without a cluster.

use serde_json::{json, Map, Value};

use l2m_core::duration::resolve_check_frequency;
use l2m_core::naming;
use l2m_core::rule::{ComputeKind, MetricRule, DEFAULT_PERCENTILES};

/// Body for `PUT _transform/{id}`.
pub fn transform_body(rule: &MetricRule) -> Value {
    let source = &rule.source;
    let grouping = &rule.grouping;

    let query = source
        .filter
        .clone()
        .unwrap_or_else(|| json!({ "match_all": {} }));

    let mut group_by = Map::new();
    group_by.insert(
        source.time_field.clone(),
        json!({
            "date_histogram": {
                "field": source.time_field,
                "fixed_interval": grouping.time_bucket,
            }
        }),
    );
    for dim in &grouping.dimensions {
        group_by.insert(dim.clone(), json!({ "terms": { "field": dim } }));
    }

    let frequency =
        resolve_check_frequency(grouping.check_frequency.as_deref(), &grouping.time_bucket);

    json!({
        "source": {
            "index": [source.index_pattern],
            "query": query,
        },
        "dest": { "index": naming::metrics_index(rule.id) },
        "pivot": {
            "group_by": group_by,
            "aggregations": aggregations(rule),
        },
        "frequency": frequency,
        "sync": {
            "time": {
                "field": source.time_field,
                "delay": grouping.late_data_buffer,
            }
        },
    })
}

fn aggregations(rule: &MetricRule) -> Value {
    let compute = &rule.compute;
    let field = compute.value_field.as_deref().unwrap_or_default();
    let agg = match compute.kind {
        ComputeKind::Count => json!({ "value_count": { "field": rule.source.time_field } }),
        ComputeKind::Sum => json!({ "sum": { "field": field } }),
        ComputeKind::Avg => json!({ "avg": { "field": field } }),
        ComputeKind::Distribution => json!({
            "percentiles": {
                "field": field,
                "percents": compute
                    .percentiles
                    .clone()
                    .unwrap_or_else(|| DEFAULT_PERCENTILES.to_vec()),
            }
        }),
    };

    let mut aggs = Map::new();
    aggs.insert(compute.output_field(), agg);
    Value::Object(aggs)
}

/// Body for creating the metrics index: retention policy attached, one
/// shard, no replicas, and explicit mappings for every produced field.
pub fn dest_index_body(rule: &MetricRule, policy: &str) -> Value {
    let mut properties = Map::new();
    properties.insert(rule.source.time_field.clone(), json!({ "type": "date" }));
    for dim in &rule.grouping.dimensions {
        properties.insert(dim.clone(), json!({ "type": "keyword" }));
    }
    let value_type = match rule.compute.kind {
        ComputeKind::Count => "long",
        ComputeKind::Sum | ComputeKind::Avg => "double",
        // Percentiles arrive as one object keyed by percent.
        ComputeKind::Distribution => "object",
    };
    properties.insert(rule.compute.output_field(), json!({ "type": value_type }));

    json!({
        "settings": {
            "index.lifecycle.name": policy,
            "number_of_shards": 1,
            "number_of_replicas": 0,
        },
        "mappings": { "properties": Value::Object(properties) },
    })
}

/// Body for the shared retention policy `l2m-metrics-{days}d`.
pub fn retention_policy_body(retention_days: u32) -> Value {
    json!({
        "policy": {
            "phases": {
                "hot": {
                    "actions": {
                        "rollover": {
                            "max_age": "30d",
                            "max_primary_shard_size": "50gb",
                        }
                    }
                },
                "delete": {
                    "min_age": format!("{}d", retention_days),
                    "actions": { "delete": {} },
                },
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use l2m_core::rule::{ComputeSpec, RuleGrouping, RuleSource, RuleStatus};
    use uuid::Uuid;

    fn make_rule(compute: ComputeSpec) -> MetricRule {
        MetricRule {
            id: Uuid::nil(),
            name: "test rule".to_string(),
            owner: String::new(),
            source: RuleSource {
                index_pattern: "app-logs*".to_string(),
                time_field: "timestamp".to_string(),
                filter: None,
            },
            grouping: RuleGrouping {
                time_bucket: "1m".to_string(),
                dimensions: vec!["service".to_string(), "level".to_string()],
                check_frequency: None,
                late_data_buffer: "30s".to_string(),
            },
            compute,
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

    fn count_rule() -> MetricRule {
        make_rule(ComputeSpec {
            kind: ComputeKind::Count,
            value_field: None,
            percentiles: None,
        })
    }

    #[test]
    fn count_materializes_as_event_count() {
        let body = transform_body(&count_rule());
        let aggs = &body["pivot"]["aggregations"];
        assert_eq!(aggs["event_count"]["value_count"]["field"], "timestamp");
        assert!(aggs.get("doc_count").is_none());
    }

    #[test]
    fn group_by_buckets_time_and_terms_each_dimension() {
        let body = transform_body(&count_rule());
        let group_by = &body["pivot"]["group_by"];
        assert_eq!(
            group_by["timestamp"]["date_histogram"]["fixed_interval"],
            "1m"
        );
        assert_eq!(group_by["service"]["terms"]["field"], "service");
        assert_eq!(group_by["level"]["terms"]["field"], "level");
    }

    #[test]
    fn missing_filter_defaults_to_match_all() {
        let body = transform_body(&count_rule());
        assert!(body["source"]["query"]["match_all"].is_object());
        assert_eq!(body["source"]["index"][0], "app-logs*");
    }

    #[test]
    fn filter_query_is_passed_through_verbatim() {
        let mut rule = count_rule();
        rule.source.filter = Some(json!({ "term": { "level": "error" } }));
        let body = transform_body(&rule);
        assert_eq!(body["source"]["query"]["term"]["level"], "error");
    }

    #[test]
    fn sync_delay_comes_from_the_late_data_buffer() {
        let mut rule = count_rule();
        rule.grouping.late_data_buffer = "2m".to_string();
        let body = transform_body(&rule);
        assert_eq!(body["sync"]["time"]["delay"], "2m");
        assert_eq!(body["sync"]["time"]["field"], "timestamp");
    }

    #[test]
    fn sub_minute_buckets_check_at_one_minute() {
        let mut rule = count_rule();
        rule.grouping.time_bucket = "10s".to_string();
        assert_eq!(transform_body(&rule)["frequency"], "1m");

        rule.grouping.time_bucket = "5m".to_string();
        assert_eq!(transform_body(&rule)["frequency"], "5m");

        rule.grouping.check_frequency = Some("15m".to_string());
        assert_eq!(transform_body(&rule)["frequency"], "15m");
    }

    #[test]
    fn distribution_uses_percentiles_agg() {
        let rule = make_rule(ComputeSpec {
            kind: ComputeKind::Distribution,
            value_field: Some("latency_ms".to_string()),
            percentiles: Some(vec![50.0, 99.0]),
        });
        let body = transform_body(&rule);
        let agg = &body["pivot"]["aggregations"]["pct_latency_ms"]["percentiles"];
        assert_eq!(agg["field"], "latency_ms");
        assert_eq!(agg["percents"], json!([50.0, 99.0]));
    }

    #[test]
    fn dest_index_maps_every_produced_field() {
        let rule = make_rule(ComputeSpec {
            kind: ComputeKind::Avg,
            value_field: Some("latency_ms".to_string()),
            percentiles: None,
        });
        let body = dest_index_body(&rule, "l2m-metrics-450d");

        assert_eq!(body["settings"]["index.lifecycle.name"], "l2m-metrics-450d");
        assert_eq!(body["settings"]["number_of_shards"], 1);
        assert_eq!(body["settings"]["number_of_replicas"], 0);

        let props = &body["mappings"]["properties"];
        assert_eq!(props["timestamp"]["type"], "date");
        assert_eq!(props["service"]["type"], "keyword");
        assert_eq!(props["level"]["type"], "keyword");
        assert_eq!(props["avg_latency_ms"]["type"], "double");
    }

    #[test]
    fn value_types_follow_the_compute_kind() {
        let count = dest_index_body(&count_rule(), "p");
        assert_eq!(count["mappings"]["properties"]["event_count"]["type"], "long");

        let dist = make_rule(ComputeSpec {
            kind: ComputeKind::Distribution,
            value_field: Some("latency_ms".to_string()),
            percentiles: Some(vec![95.0]),
        });
        let dist_body = dest_index_body(&dist, "p");
        assert_eq!(
            dist_body["mappings"]["properties"]["pct_latency_ms"]["type"],
            "object"
        );
    }

    #[test]
    fn retention_policy_deletes_after_the_window() {
        let body = retention_policy_body(450);
        assert_eq!(body["policy"]["phases"]["delete"]["min_age"], "450d");
        assert!(body["policy"]["phases"]["delete"]["actions"]["delete"].is_object());
        assert!(body["policy"]["phases"]["hot"]["actions"]["rollover"].is_object());
    }
}
