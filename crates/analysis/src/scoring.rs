//! Suitability scoring for metric-conversion candidates.
//!
//! Produces a deterministic score (0-95) with a per-signal breakdown.
//! Pure function of its inputs: no I/O, no clock, no randomness.
//!
//! Signal weights (max 95):
//!   Structural (from the candidate shape):
//!     +25  time-bucketed aggregation
//!     +20  numeric-only compute
//!     +15  no raw-document exposure
//!     +10  aggregatable group-by dimensions
//!   Behavioral (from dashboard usage):
//!     +15  lookback window >= 7 days
//!     +10  auto-refresh enabled

use serde::{Deserialize, Serialize};

use l2m_core::candidate::{AggregationKind, CandidateDescriptor, UsageMetadata};

// ── Models ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub signal: String,
    pub points: u32,
    pub max_points: u32,
    pub rationale: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuitabilityScore {
    pub total: u32,
    pub max_total: u32,
    pub breakdown: Vec<ScoreBreakdown>,
    pub recommendation: String,
}

// ── Public API ────────────────────────────────────────────────

/// Score a candidate's suitability for conversion to a continuous metric.
///
/// Always returns a score; a candidate that matches nothing scores low
/// with an explanatory breakdown rather than erroring.
pub fn score(descriptor: &CandidateDescriptor, usage: Option<&UsageMetadata>) -> SuitabilityScore {
    let mut breakdown = Vec::with_capacity(6);

    score_time_bucketing(descriptor, &mut breakdown);
    score_numeric_compute(descriptor, &mut breakdown);
    score_raw_exposure(descriptor, &mut breakdown);
    score_dimensions(descriptor, &mut breakdown);
    score_lookback(usage.and_then(|u| u.lookback.as_deref()), &mut breakdown);
    score_auto_refresh(usage.and_then(|u| u.refresh_interval_ms), &mut breakdown);

    let total = breakdown.iter().map(|b| b.points).sum();
    let max_total = breakdown.iter().map(|b| b.max_points).sum();
    let recommendation = recommendation_for(total);

    SuitabilityScore {
        total,
        max_total,
        breakdown,
        recommendation,
    }
}

// ── Individual signals ────────────────────────────────────────

fn score_time_bucketing(descriptor: &CandidateDescriptor, out: &mut Vec<ScoreBreakdown>) {
    let bucketed = descriptor.aggregation == AggregationKind::TimeBucketed;
    out.push(ScoreBreakdown {
        signal: "time_bucketing".to_string(),
        points: if bucketed { 25 } else { 0 },
        max_points: 25,
        rationale: if bucketed {
            "Candidate aggregates into fixed time buckets, ideal for a \
             continuous metric."
                .to_string()
        } else {
            "No time-bucketed aggregation detected.".to_string()
        },
    });
}

fn score_numeric_compute(descriptor: &CandidateDescriptor, out: &mut Vec<ScoreBreakdown>) {
    let entry = if !descriptor.unsupported_aggregations.is_empty() {
        ScoreBreakdown {
            signal: "numeric_compute".to_string(),
            points: 0,
            max_points: 20,
            rationale: format!(
                "Unsupported aggregation types detected: {}.",
                descriptor.unsupported_aggregations.join(", ")
            ),
        }
    } else if let Some(compute) = &descriptor.compute {
        ScoreBreakdown {
            signal: "numeric_compute".to_string(),
            points: 20,
            max_points: 20,
            rationale: format!("Compute is a numeric aggregation ({}).", compute.kind),
        }
    } else if descriptor.aggregation != AggregationKind::Raw {
        ScoreBreakdown {
            signal: "numeric_compute".to_string(),
            points: 10,
            max_points: 20,
            rationale: "No explicit compute found; the rule may default to count.".to_string(),
        }
    } else {
        ScoreBreakdown {
            signal: "numeric_compute".to_string(),
            points: 0,
            max_points: 20,
            rationale: "Source exposes raw documents with no numeric compute.".to_string(),
        }
    };
    out.push(entry);
}

fn score_raw_exposure(descriptor: &CandidateDescriptor, out: &mut Vec<ScoreBreakdown>) {
    let raw = descriptor.aggregation == AggregationKind::Raw;
    out.push(ScoreBreakdown {
        signal: "no_raw_docs".to_string(),
        points: if raw { 0 } else { 15 },
        max_points: 15,
        rationale: if raw {
            "Candidate displays raw documents, which cannot be pre-aggregated.".to_string()
        } else {
            "Candidate does not display raw log lines.".to_string()
        },
    });
}

fn score_dimensions(descriptor: &CandidateDescriptor, out: &mut Vec<ScoreBreakdown>) {
    let dims = &descriptor.dimensions;
    let entry = if dims.is_empty() {
        ScoreBreakdown {
            signal: "aggregatable_dimensions".to_string(),
            points: 5,
            max_points: 10,
            rationale: "No group-by dimensions; the metric would be a single time series."
                .to_string(),
        }
    } else if dims.iter().any(|d| d.aggregatable == Some(false)) {
        let bad: Vec<&str> = dims
            .iter()
            .filter(|d| d.aggregatable == Some(false))
            .map(|d| d.name.as_str())
            .collect();
        ScoreBreakdown {
            signal: "aggregatable_dimensions".to_string(),
            points: 0,
            max_points: 10,
            rationale: format!("Non-aggregatable group-by fields: {}.", bad.join(", ")),
        }
    } else if dims.iter().all(|d| d.aggregatable == Some(true)) {
        let names: Vec<&str> = dims.iter().map(|d| d.name.as_str()).collect();
        ScoreBreakdown {
            signal: "aggregatable_dimensions".to_string(),
            points: 10,
            max_points: 10,
            rationale: format!("All group-by fields are aggregatable: {}.", names.join(", ")),
        }
    } else {
        let names: Vec<&str> = dims.iter().map(|d| d.name.as_str()).collect();
        ScoreBreakdown {
            signal: "aggregatable_dimensions".to_string(),
            points: 5,
            max_points: 10,
            rationale: format!(
                "Group-by fields present ({}) but field types not verified.",
                names.join(", ")
            ),
        }
    };
    out.push(entry);
}

fn score_lookback(lookback: Option<&str>, out: &mut Vec<ScoreBreakdown>) {
    let Some(raw) = lookback else {
        out.push(ScoreBreakdown {
            signal: "lookback_window".to_string(),
            points: 0,
            max_points: 15,
            rationale: "No lookback information available.".to_string(),
        });
        return;
    };

    let entry = match lookback_days(raw) {
        None => ScoreBreakdown {
            signal: "lookback_window".to_string(),
            points: 0,
            max_points: 15,
            rationale: "Could not parse the lookback period.".to_string(),
        },
        Some(days) if days >= 7 => ScoreBreakdown {
            signal: "lookback_window".to_string(),
            points: 15,
            max_points: 15,
            rationale: format!(
                "Lookback is ~{} days; long lookbacks benefit most from pre-aggregation.",
                days
            ),
        },
        Some(days) => ScoreBreakdown {
            signal: "lookback_window".to_string(),
            points: 5,
            max_points: 15,
            rationale: format!(
                "Lookback is ~{} days; short windows benefit less from pre-aggregation.",
                days
            ),
        },
    };
    out.push(entry);
}

fn score_auto_refresh(refresh_interval_ms: Option<u64>, out: &mut Vec<ScoreBreakdown>) {
    let entry = match refresh_interval_ms {
        Some(ms) if ms > 0 => ScoreBreakdown {
            signal: "auto_refresh".to_string(),
            points: 10,
            max_points: 10,
            rationale: format!(
                "Auto-refresh enabled (every {}s); repeated queries benefit from \
                 pre-aggregation.",
                ms / 1000
            ),
        },
        _ => ScoreBreakdown {
            signal: "auto_refresh".to_string(),
            points: 0,
            max_points: 10,
            rationale: "Auto-refresh not enabled or not detected.".to_string(),
        },
    };
    out.push(entry);
}

// ── Helpers ───────────────────────────────────────────────────

/// Parse a relative lookback like `now-7d` into approximate days.
/// Sub-day units round down but never below one day.
fn lookback_days(time_from: &str) -> Option<u64> {
    let suffix = time_from.strip_prefix("now-")?;
    let unit = suffix.chars().last()?;
    let num: u64 = suffix[..suffix.len() - unit.len_utf8()].parse().ok()?;
    match unit {
        'd' => Some(num),
        'w' => Some(num * 7),
        'M' => Some(num * 30),
        'y' => Some(num * 365),
        'h' => Some((num / 24).max(1)),
        'm' => Some((num / 1440).max(1)),
        _ => None,
    }
}

fn recommendation_for(total: u32) -> String {
    if total >= 80 {
        format!(
            "Strong candidate for metric conversion (score: {}). The \
             aggregations can be pre-computed continuously, cutting query \
             cost on every dashboard load.",
            total
        )
    } else if total >= 60 {
        format!(
            "Candidate for metric conversion (score: {}). Pre-aggregation \
             should pay off; review the breakdown for the weaker signals.",
            total
        )
    } else if total >= 30 {
        format!(
            "Marginal candidate for metric conversion (score: {}). Review \
             the breakdown before converting.",
            total
        )
    } else {
        format!(
            "Not recommended for metric conversion (score: {}). The \
             breakdown lists the disqualifying signals.",
            total
        )
    }
}

// ── Tests ─────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use l2m_core::candidate::DimensionSpec;
    use l2m_core::rule::{ComputeKind, ComputeSpec};

    fn bucketed_count_candidate() -> CandidateDescriptor {
        CandidateDescriptor {
            title: "Requests over time".to_string(),
            index_pattern: Some("logs-*".to_string()),
            time_field: Some("@timestamp".to_string()),
            filter: None,
            aggregation: AggregationKind::TimeBucketed,
            time_bucket: Some("1m".to_string()),
            compute: Some(ComputeSpec {
                kind: ComputeKind::Count,
                value_field: None,
                percentiles: None,
            }),
            unsupported_aggregations: Vec::new(),
            dimensions: vec![
                DimensionSpec {
                    name: "service".to_string(),
                    aggregatable: Some(true),
                },
                DimensionSpec {
                    name: "status".to_string(),
                    aggregatable: Some(true),
                },
            ],
            origin: None,
        }
    }

    fn raw_candidate() -> CandidateDescriptor {
        CandidateDescriptor {
            title: "Recent errors".to_string(),
            index_pattern: Some("logs-*".to_string()),
            time_field: None,
            filter: Some("level:error".to_string()),
            aggregation: AggregationKind::Raw,
            time_bucket: None,
            compute: None,
            unsupported_aggregations: Vec::new(),
            dimensions: Vec::new(),
            origin: None,
        }
    }

    fn heavy_usage() -> UsageMetadata {
        UsageMetadata {
            lookback: Some("now-30d".to_string()),
            refresh_interval_ms: Some(30_000),
        }
    }

    #[test]
    fn ideal_candidate_scores_strong() {
        let s = score(&bucketed_count_candidate(), Some(&heavy_usage()));
        assert_eq!(s.total, 95);
        assert_eq!(s.max_total, 95);
        assert!(s.total >= 80);
        assert!(s.recommendation.to_lowercase().contains("strong candidate"));
    }

    #[test]
    fn raw_candidate_is_not_recommended() {
        let s = score(&raw_candidate(), None);
        assert!(s.total < 30, "raw candidate scored {}", s.total);
        assert!(s.recommendation.to_lowercase().contains("not recommended"));
    }

    #[test]
    fn total_equals_breakdown_sum() {
        for (candidate, usage) in [
            (bucketed_count_candidate(), Some(heavy_usage())),
            (bucketed_count_candidate(), None),
            (raw_candidate(), None),
        ] {
            let s = score(&candidate, usage.as_ref());
            let sum: u32 = s.breakdown.iter().map(|b| b.points).sum();
            assert_eq!(s.total, sum);
            assert!(s.total <= 95);
        }
    }

    #[test]
    fn scoring_is_deterministic() {
        let candidate = bucketed_count_candidate();
        let usage = heavy_usage();
        let a = serde_json::to_string(&score(&candidate, Some(&usage))).unwrap();
        let b = serde_json::to_string(&score(&candidate, Some(&usage))).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn unsupported_aggregations_zero_the_compute_signal() {
        let mut candidate = bucketed_count_candidate();
        candidate.unsupported_aggregations = vec!["top_hits".to_string()];
        let s = score(&candidate, None);
        let compute = s
            .breakdown
            .iter()
            .find(|b| b.signal == "numeric_compute")
            .unwrap();
        assert_eq!(compute.points, 0);
        assert!(compute.rationale.contains("top_hits"));
    }

    #[test]
    fn missing_compute_gets_partial_credit_when_not_raw() {
        let mut candidate = bucketed_count_candidate();
        candidate.compute = None;
        let s = score(&candidate, None);
        let compute = s
            .breakdown
            .iter()
            .find(|b| b.signal == "numeric_compute")
            .unwrap();
        assert_eq!(compute.points, 10);
    }

    #[test]
    fn known_bad_dimension_zeroes_the_signal() {
        let mut candidate = bucketed_count_candidate();
        candidate.dimensions.push(DimensionSpec {
            name: "message".to_string(),
            aggregatable: Some(false),
        });
        let s = score(&candidate, None);
        let dims = s
            .breakdown
            .iter()
            .find(|b| b.signal == "aggregatable_dimensions")
            .unwrap();
        assert_eq!(dims.points, 0);
        assert!(dims.rationale.contains("message"));
    }

    #[test]
    fn unverified_dimensions_get_partial_credit() {
        let mut candidate = bucketed_count_candidate();
        for d in &mut candidate.dimensions {
            d.aggregatable = None;
        }
        let s = score(&candidate, None);
        let dims = s
            .breakdown
            .iter()
            .find(|b| b.signal == "aggregatable_dimensions")
            .unwrap();
        assert_eq!(dims.points, 5);
    }

    #[test]
    fn lookback_units_convert_to_days() {
        assert_eq!(lookback_days("now-7d"), Some(7));
        assert_eq!(lookback_days("now-2w"), Some(14));
        assert_eq!(lookback_days("now-1M"), Some(30));
        assert_eq!(lookback_days("now-1y"), Some(365));
        assert_eq!(lookback_days("now-48h"), Some(2));
        assert_eq!(lookback_days("now-30m"), Some(1));
        assert_eq!(lookback_days("last-7d"), None);
        assert_eq!(lookback_days("now-7q"), None);
        assert_eq!(lookback_days("now-"), None);
    }

    #[test]
    fn short_lookback_scores_partial() {
        let candidate = bucketed_count_candidate();
        let usage = UsageMetadata {
            lookback: Some("now-1d".to_string()),
            refresh_interval_ms: None,
        };
        let s = score(&candidate, Some(&usage));
        let lb = s
            .breakdown
            .iter()
            .find(|b| b.signal == "lookback_window")
            .unwrap();
        assert_eq!(lb.points, 5);
    }

    #[test]
    fn zero_refresh_interval_earns_nothing() {
        let candidate = bucketed_count_candidate();
        let usage = UsageMetadata {
            lookback: None,
            refresh_interval_ms: Some(0),
        };
        let s = score(&candidate, Some(&usage));
        let refresh = s
            .breakdown
            .iter()
            .find(|b| b.signal == "auto_refresh")
            .unwrap();
        assert_eq!(refresh.points, 0);
    }

    #[test]
    fn recommendation_buckets_are_inclusive_on_lower_bound() {
        assert!(recommendation_for(80).to_lowercase().contains("strong candidate"));
        assert!(recommendation_for(79).starts_with("Candidate"));
        assert!(recommendation_for(60).starts_with("Candidate"));
        assert!(recommendation_for(59).to_lowercase().contains("marginal"));
        assert!(recommendation_for(30).to_lowercase().contains("marginal"));
        assert!(recommendation_for(29).to_lowercase().contains("not recommended"));
    }
}
