//! Narrow data-plane seam consumed by the lifecycle layer.

use async_trait::async_trait;
use tracing::warn;

use l2m_core::candidate::{CandidateDescriptor, IndexStats};
use l2m_core::Result;

use crate::es::EsClient;
use crate::kibana::KibanaClient;

/// What the lifecycle manager needs to know about the outside world when
/// assessing a rule. Small on purpose so tests can fake it.
#[async_trait]
pub trait CandidateSource: Send + Sync {
    /// Candidates discovered in one source container (a dashboard).
    async fn list_candidates(&self, source_id: &str) -> Result<Vec<CandidateDescriptor>>;

    /// Distinct-value count for a field. `None` when it cannot be measured;
    /// estimation then falls back to a flagged default.
    async fn field_cardinality(&self, index: &str, field: &str) -> Result<Option<u64>>;

    /// Document count and storage footprint of an index pattern.
    async fn index_stats(&self, index: &str) -> Result<IndexStats>;
}

/// Production source backed by the two live connectors.
pub struct LiveSource {
    kibana: KibanaClient,
    es: EsClient,
}

impl LiveSource {
    pub fn new(kibana: KibanaClient, es: EsClient) -> Self {
        Self { kibana, es }
    }
}

#[async_trait]
impl CandidateSource for LiveSource {
    async fn list_candidates(&self, source_id: &str) -> Result<Vec<CandidateDescriptor>> {
        let detail = self.kibana.dashboard_with_candidates(source_id).await?;
        Ok(detail.candidates)
    }

    async fn field_cardinality(&self, index: &str, field: &str) -> Result<Option<u64>> {
        match self.es.field_cardinality(index, field).await {
            Ok(fc) => Ok(Some(fc.cardinality)),
            Err(e) => {
                warn!("cardinality probe for {}.{} failed: {}", index, field, e);
                Ok(None)
            }
        }
    }

    async fn index_stats(&self, index: &str) -> Result<IndexStats> {
        self.es.index_stats(index).await
    }
}
