//! Read-only log store connector.
//!
//! Index metadata, mappings, field cardinality, and stats over the
//! Elasticsearch REST API. Response parsing lives in pure helpers so it
//! can be exercised against captured payloads.

use reqwest::Method;
use serde_json::{json, Value};
use tracing::debug;

use l2m_core::candidate::IndexStats;
use l2m_core::config::ClusterConfig;
use l2m_core::{L2mError, Result};

use crate::models::{FieldCardinality, FieldMapping, IndexInfo, IndexMapping};

#[derive(Clone)]
pub struct EsClient {
    client: reqwest::Client,
    base_url: String,
    auth: Option<(String, String)>,
}

impl EsClient {
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
        Self::new(cluster.es_url.clone(), auth)
    }

    /// Index names, doc counts, and store sizes matching a pattern.
    /// System (dot-prefixed) indices are skipped.
    pub async fn list_indices(&self, pattern: &str) -> Result<Vec<IndexInfo>> {
        let path = format!(
            "/_cat/indices/{}?format=json&h=index,docs.count,store.size&bytes=b&s=index",
            pattern
        );
        let raw = self.get_json(&path, "list indices").await?;
        parse_cat_indices(&raw)
    }

    /// Field names and types for an index or pattern.
    pub async fn mapping(&self, index: &str) -> Result<IndexMapping> {
        let raw = self
            .get_json(&format!("/{}/_mapping", index), "get mapping")
            .await?;
        parse_mapping(index, &raw)
    }

    /// Approximate distinct count for one field.
    pub async fn field_cardinality(&self, index: &str, field: &str) -> Result<FieldCardinality> {
        let operation = "field cardinality";
        let body = json!({
            "size": 0,
            "aggs": { "cardinality": { "cardinality": { "field": field } } }
        });
        let raw = self
            .send_json(
                self.request(Method::POST, &format!("/{}/_search", index))
                    .json(&body),
                operation,
            )
            .await?;
        let value = raw["aggregations"]["cardinality"]["value"]
            .as_f64()
            .ok_or_else(|| {
                L2mError::unexpected(operation, "missing aggregations.cardinality.value")
            })?;
        Ok(FieldCardinality {
            index: index.to_string(),
            field: field.to_string(),
            cardinality: value.max(0.0) as u64,
        })
    }

    /// Doc count, store size, and query counters for an index.
    pub async fn index_stats(&self, index: &str) -> Result<IndexStats> {
        let raw = self
            .get_json(&format!("/{}/_stats", index), "index stats")
            .await?;
        parse_index_stats(index, &raw)
    }

    // ── Plumbing ──────────────────────────────────────────────

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        debug!("ES request: {}", url);
        let mut builder = self.client.request(method, url);
        if let Some((user, pass)) = &self.auth {
            builder = builder.basic_auth(user, Some(pass));
        }
        builder
    }

    async fn get_json(&self, path: &str, operation: &str) -> Result<Value> {
        self.send_json(self.request(Method::GET, path), operation)
            .await
    }

    async fn send_json(
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

// ── Response parsing ──────────────────────────────────────────

fn parse_cat_indices(raw: &Value) -> Result<Vec<IndexInfo>> {
    let rows = raw
        .as_array()
        .ok_or_else(|| L2mError::unexpected("list indices", "expected a JSON array"))?;

    let mut results = Vec::new();
    for row in rows {
        let Some(name) = row["index"].as_str() else {
            continue;
        };
        if name.starts_with('.') {
            continue;
        }
        let store_size_bytes = cat_number(&row["store.size"]);
        results.push(IndexInfo {
            name: name.to_string(),
            doc_count: cat_number(&row["docs.count"]),
            store_size_bytes,
            store_size_human: format_bytes(store_size_bytes),
        });
    }
    Ok(results)
}

fn parse_mapping(index: &str, raw: &Value) -> Result<IndexMapping> {
    let obj = raw
        .as_object()
        .ok_or_else(|| L2mError::unexpected("get mapping", "expected a JSON object"))?;

    // A pattern comes back keyed by concrete index name. Prefer an exact
    // key, else the first match in name order.
    let entry = obj.get(index).or_else(|| {
        let mut keys: Vec<&String> = obj.keys().collect();
        keys.sort();
        keys.first().and_then(|k| obj.get(*k))
    });
    let Some(entry) = entry else {
        return Err(L2mError::unexpected(
            "get mapping",
            format!("no mapping returned for {}", index),
        ));
    };

    let mut fields = Vec::new();
    if let Some(props) = entry["mappings"]["properties"].as_object() {
        let mut entries: Vec<(&String, &Value)> = props.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        for (name, def) in entries {
            let field_type = def
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or("object")
                .to_string();
            let aggregatable = field_type != "text";
            fields.push(FieldMapping {
                name: name.clone(),
                field_type,
                aggregatable,
            });
        }
    }
    Ok(IndexMapping {
        index: index.to_string(),
        fields,
    })
}

fn parse_index_stats(index: &str, raw: &Value) -> Result<IndexStats> {
    let total = &raw["_all"]["total"];
    let doc_count = total["docs"]["count"]
        .as_u64()
        .ok_or_else(|| L2mError::unexpected("index stats", "missing _all.total.docs.count"))?;
    let store_size_bytes = total["store"]["size_in_bytes"].as_u64().ok_or_else(|| {
        L2mError::unexpected("index stats", "missing _all.total.store.size_in_bytes")
    })?;
    Ok(IndexStats {
        index: index.to_string(),
        doc_count,
        store_size_bytes,
        store_size_human: format_bytes(store_size_bytes),
        query_total: total["search"]["query_total"].as_u64().unwrap_or(0),
        query_time_ms: total["search"]["query_time_in_millis"].as_u64().unwrap_or(0),
    })
}

/// `_cat` numeric columns arrive as strings; missing columns as null.
fn cat_number(v: &Value) -> u64 {
    match v {
        Value::String(s) => s.parse().unwrap_or(0),
        Value::Number(n) => n.as_u64().unwrap_or(0),
        _ => 0,
    }
}

pub fn format_bytes(n: u64) -> String {
    let mut value = n as f64;
    for unit in ["b", "kb", "mb", "gb", "tb"] {
        if value < 1024.0 {
            return if unit == "b" {
                format!("{}b", n)
            } else {
                format!("{:.1}{}", value, unit)
            };
        }
        value /= 1024.0;
    }
    format!("{:.1}pb", value)
}

// ── Tests ─────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_bytes_per_unit() {
        assert_eq!(format_bytes(0), "0b");
        assert_eq!(format_bytes(512), "512b");
        assert_eq!(format_bytes(2048), "2.0kb");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0mb");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.0gb");
    }

    #[test]
    fn cat_rows_skip_system_indices_and_parse_strings() {
        let raw = json!([
            { "index": ".kibana_1", "docs.count": "10", "store.size": "1000" },
            { "index": "logs-app", "docs.count": "12345", "store.size": "67890" },
            { "index": "logs-empty", "docs.count": null, "store.size": null },
        ]);
        let infos = parse_cat_indices(&raw).unwrap();
        assert_eq!(infos.len(), 2);
        assert_eq!(infos[0].name, "logs-app");
        assert_eq!(infos[0].doc_count, 12345);
        assert_eq!(infos[0].store_size_bytes, 67890);
        assert_eq!(infos[1].doc_count, 0);
    }

    #[test]
    fn mapping_marks_text_fields_non_aggregatable() {
        let raw = json!({
            "logs-app": {
                "mappings": {
                    "properties": {
                        "message": { "type": "text" },
                        "service": { "type": "keyword" },
                        "timestamp": { "type": "date" },
                        "nested_obj": { "properties": {} },
                    }
                }
            }
        });
        let mapping = parse_mapping("logs-app", &raw).unwrap();
        let names: Vec<&str> = mapping.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["message", "nested_obj", "service", "timestamp"]);

        let message = &mapping.fields[0];
        assert!(!message.aggregatable);
        let nested = &mapping.fields[1];
        assert_eq!(nested.field_type, "object");
        assert!(nested.aggregatable);
        assert!(mapping.fields[2].aggregatable);
    }

    #[test]
    fn mapping_for_pattern_takes_first_concrete_index() {
        let raw = json!({
            "logs-app-2024.02": { "mappings": { "properties": { "b": { "type": "keyword" } } } },
            "logs-app-2024.01": { "mappings": { "properties": { "a": { "type": "keyword" } } } },
        });
        let mapping = parse_mapping("logs-app*", &raw).unwrap();
        assert_eq!(mapping.fields.len(), 1);
        assert_eq!(mapping.fields[0].name, "a");
    }

    #[test]
    fn stats_pull_from_the_all_total_section() {
        let raw = json!({
            "_all": {
                "total": {
                    "docs": { "count": 5000 },
                    "store": { "size_in_bytes": 250000 },
                    "search": { "query_total": 42, "query_time_in_millis": 630 },
                }
            }
        });
        let stats = parse_index_stats("logs-app", &raw).unwrap();
        assert_eq!(stats.doc_count, 5000);
        assert_eq!(stats.store_size_bytes, 250_000);
        assert_eq!(stats.query_total, 42);
        assert_eq!(stats.query_time_ms, 630);
    }

    #[test]
    fn stats_missing_docs_section_is_an_error() {
        let raw = json!({ "_all": { "total": {} } });
        assert!(parse_index_stats("logs-app", &raw).is_err());
    }
}
