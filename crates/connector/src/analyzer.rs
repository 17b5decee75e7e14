//! Dashboard suitability analysis.
//!
//! Joins the two connectors: panels come from the dashboard system,
//! field types come from the log cluster, and every candidate is scored
//! with the dashboard's own usage signals. Field lookups degrade to
//! "unverified" rather than failing the whole analysis.

use std::collections::HashMap;

use serde::Serialize;
use tracing::warn;

use l2m_analysis::{score, SuitabilityScore};
use l2m_core::candidate::{CandidateDescriptor, UsageMetadata};
use l2m_core::Result;

use crate::es::EsClient;
use crate::kibana::KibanaClient;

#[derive(Debug, Clone, Serialize)]
pub struct ScoredCandidate {
    #[serde(flatten)]
    pub descriptor: CandidateDescriptor,
    pub score: SuitabilityScore,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardAnalysis {
    pub dashboard_id: String,
    pub dashboard_title: String,
    pub candidates: Vec<ScoredCandidate>,
}

/// Score every panel of a dashboard. `lookback_override` replaces the
/// dashboard's own saved time range when the caller knows better.
pub async fn analyze_dashboard(
    kibana: &KibanaClient,
    es: &EsClient,
    dashboard_id: &str,
    lookback_override: Option<&str>,
) -> Result<DashboardAnalysis> {
    let detail = kibana.dashboard_with_candidates(dashboard_id).await?;
    let usage = effective_usage(&detail.usage, lookback_override);

    // One field-type fetch per distinct index pattern.
    let mut field_cache: HashMap<String, HashMap<String, bool>> = HashMap::new();

    let mut candidates = Vec::with_capacity(detail.candidates.len());
    for mut descriptor in detail.candidates {
        if let Some(pattern) = descriptor.index_pattern.clone() {
            if !field_cache.contains_key(&pattern) {
                field_cache.insert(pattern.clone(), field_types(es, &pattern).await);
            }
            annotate_dimensions(&mut descriptor, &field_cache[&pattern]);
        }
        let score = score(&descriptor, Some(&usage));
        candidates.push(ScoredCandidate { descriptor, score });
    }

    Ok(DashboardAnalysis {
        dashboard_id: detail.id,
        dashboard_title: detail.title,
        candidates,
    })
}

async fn field_types(es: &EsClient, pattern: &str) -> HashMap<String, bool> {
    match es.mapping(pattern).await {
        Ok(mapping) => mapping
            .fields
            .into_iter()
            .map(|f| (f.name, f.aggregatable))
            .collect(),
        Err(e) => {
            warn!("field lookup for {} failed, dimensions stay unverified: {}", pattern, e);
            HashMap::new()
        }
    }
}

fn effective_usage(usage: &UsageMetadata, lookback_override: Option<&str>) -> UsageMetadata {
    let mut usage = usage.clone();
    if let Some(lookback) = lookback_override {
        usage.lookback = Some(lookback.to_string());
    }
    usage
}

/// Mark each dimension aggregatable or not from the mapping. An empty map
/// means the lookup failed; dimensions then keep their unverified state.
fn annotate_dimensions(descriptor: &mut CandidateDescriptor, fields: &HashMap<String, bool>) {
    if fields.is_empty() {
        return;
    }
    for dim in &mut descriptor.dimensions {
        dim.aggregatable = Some(fields.get(&dim.name).copied().unwrap_or(false));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use l2m_core::candidate::{AggregationKind, DimensionSpec};

    fn make_descriptor() -> CandidateDescriptor {
        CandidateDescriptor {
            title: "Errors by service".to_string(),
            index_pattern: Some("app-logs*".to_string()),
            time_field: Some("timestamp".to_string()),
            filter: None,
            aggregation: AggregationKind::TimeBucketed,
            time_bucket: Some("1m".to_string()),
            compute: None,
            unsupported_aggregations: Vec::new(),
            dimensions: vec![
                DimensionSpec::named("service"),
                DimensionSpec::named("message"),
                DimensionSpec::named("ghost"),
            ],
            origin: None,
        }
    }

    #[test]
    fn dimensions_are_annotated_from_the_mapping() {
        let mut descriptor = make_descriptor();
        let fields =
            HashMap::from([("service".to_string(), true), ("message".to_string(), false)]);
        annotate_dimensions(&mut descriptor, &fields);

        assert_eq!(descriptor.dimensions[0].aggregatable, Some(true));
        assert_eq!(descriptor.dimensions[1].aggregatable, Some(false));
        // Unmapped fields are not aggregatable.
        assert_eq!(descriptor.dimensions[2].aggregatable, Some(false));
    }

    #[test]
    fn failed_lookup_leaves_dimensions_unverified() {
        let mut descriptor = make_descriptor();
        annotate_dimensions(&mut descriptor, &HashMap::new());
        assert!(descriptor.dimensions.iter().all(|d| d.aggregatable.is_none()));
    }

    #[test]
    fn lookback_override_wins_over_saved_time_range() {
        let saved = UsageMetadata {
            lookback: Some("now-24h".to_string()),
            refresh_interval_ms: Some(30000),
        };
        let merged = effective_usage(&saved, Some("now-30d"));
        assert_eq!(merged.lookback.as_deref(), Some("now-30d"));
        assert_eq!(merged.refresh_interval_ms, Some(30000));

        let untouched = effective_usage(&saved, None);
        assert_eq!(untouched.lookback.as_deref(), Some("now-24h"));
    }
}
