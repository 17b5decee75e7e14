//! Storage cost comparison between raw logs and a materialized metric.
//!
//! Pure arithmetic over connector-supplied inputs. Estimation never
//! aborts: unknown cardinalities substitute a documented fallback and
//! the affected dimensions are flagged on the result.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use l2m_core::candidate::{CandidateDescriptor, IndexStats};
use l2m_core::duration::bucket_seconds;

// ── Constants ─────────────────────────────────────────────────

/// Approximate size of a single metric point in a time-series index
/// (timestamp + dimensions + value, with doc-value compression).
pub const METRIC_POINT_SIZE_BYTES: u64 = 40;

/// Assumed retention of the raw log index when comparing storage.
pub const DEFAULT_LOG_RETENTION_DAYS: u32 = 30;

/// Substituted when a dimension's distinct-value count is unknown.
pub const FALLBACK_DIMENSION_CARDINALITY: u64 = 100;

const SECONDS_PER_DAY: u64 = 86_400;

// ── Models ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostEstimate {
    /// Raw log bytes kept over the source index's retention window.
    pub log_storage_bytes: u64,
    /// Metric bytes kept over the rule's retention window.
    pub metric_storage_bytes: u64,
    /// May be negative when the metric would cost more than the logs.
    pub savings_bytes: i64,
    pub savings_pct: f64,
    pub query_speedup_x: f64,
    pub estimated_series_count: u64,
    pub docs_per_day: u64,
    pub metric_points_per_day: u64,
    pub log_retention_days: u32,
    pub metric_retention_days: u32,
    /// Dimensions whose cardinality was unknown and substituted with
    /// [`FALLBACK_DIMENSION_CARDINALITY`].
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fallback_dimensions: Vec<String>,
}

// ── Public API ────────────────────────────────────────────────

/// Estimate storage cost of materializing `descriptor` as a metric,
/// against the cost of retaining the raw logs it would replace.
///
/// `cardinalities` maps dimension name to distinct-value count; missing
/// entries fall back to [`FALLBACK_DIMENSION_CARDINALITY`].
pub fn estimate(
    descriptor: &CandidateDescriptor,
    stats: &IndexStats,
    cardinalities: &HashMap<String, u64>,
    retention_days: u32,
) -> CostEstimate {
    if stats.doc_count == 0 {
        // Empty source index: nothing to compare, speedup is neutral.
        return CostEstimate {
            log_storage_bytes: 0,
            metric_storage_bytes: 0,
            savings_bytes: 0,
            savings_pct: 0.0,
            query_speedup_x: 1.0,
            estimated_series_count: 0,
            docs_per_day: 0,
            metric_points_per_day: 0,
            log_retention_days: DEFAULT_LOG_RETENTION_DAYS,
            metric_retention_days: retention_days,
            fallback_dimensions: Vec::new(),
        };
    }

    let avg_doc_size = stats.store_size_bytes as f64 / stats.doc_count as f64;

    // Assume the index holds roughly one day of data. Good enough for
    // a comparative estimate; refining this needs the index date range.
    let docs_per_day = stats.doc_count;

    let (series_count, fallback_dimensions) = estimate_series_count(descriptor, cardinalities);

    let bucket_secs = bucket_seconds(descriptor.time_bucket.as_deref().unwrap_or(""));
    let points_per_day_per_series = SECONDS_PER_DAY / bucket_secs;
    let metric_points_per_day = series_count.saturating_mul(points_per_day_per_series);

    let log_storage_bytes =
        (docs_per_day as f64 * avg_doc_size * DEFAULT_LOG_RETENTION_DAYS as f64).round() as u64;
    let metric_storage_bytes = metric_points_per_day
        .saturating_mul(METRIC_POINT_SIZE_BYTES)
        .saturating_mul(retention_days as u64);

    // Series products can saturate u64; clamp rather than wrap.
    let savings_bytes = (log_storage_bytes as i128 - metric_storage_bytes as i128)
        .clamp(i64::MIN as i128, i64::MAX as i128) as i64;
    let savings_pct = if log_storage_bytes > 0 {
        round1(savings_bytes as f64 / log_storage_bytes as f64 * 100.0)
    } else {
        0.0
    };

    // One day of docs scanned vs one day of metric points scanned.
    let query_speedup_x = round1(docs_per_day as f64 / metric_points_per_day.max(1) as f64);

    CostEstimate {
        log_storage_bytes,
        metric_storage_bytes,
        savings_bytes,
        savings_pct,
        query_speedup_x,
        estimated_series_count: series_count,
        docs_per_day,
        metric_points_per_day,
        log_retention_days: DEFAULT_LOG_RETENTION_DAYS,
        metric_retention_days: retention_days,
        fallback_dimensions,
    }
}

// ── Helpers ───────────────────────────────────────────────────

/// Product of per-dimension cardinalities. No dimensions means exactly
/// one series. Returns the dimensions that needed the fallback.
fn estimate_series_count(
    descriptor: &CandidateDescriptor,
    cardinalities: &HashMap<String, u64>,
) -> (u64, Vec<String>) {
    if descriptor.dimensions.is_empty() {
        return (1, Vec::new());
    }

    let mut product: u64 = 1;
    let mut fallbacks = Vec::new();
    for dim in &descriptor.dimensions {
        let card = match cardinalities.get(&dim.name) {
            Some(c) => (*c).max(1),
            None => {
                fallbacks.push(dim.name.clone());
                FALLBACK_DIMENSION_CARDINALITY
            }
        };
        product = product.saturating_mul(card);
    }
    (product, fallbacks)
}

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

// ── Tests ─────────────────────────────────────────────────────
