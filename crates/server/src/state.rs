use std::sync::Arc;

use l2m_backend::ElasticBackend;
use l2m_connector::{EsClient, KibanaClient, LiveSource};
use l2m_core::config::Config;
use l2m_lifecycle::{LifecycleManager, RuleStore};

/// Everything the handlers share.
pub struct AppState {
    pub config: Config,
    pub lifecycle: LifecycleManager,
    pub es: EsClient,
    pub kibana: KibanaClient,
}

impl AppState {
    /// Wire the full service from configuration.
    pub fn from_config(config: Config) -> Self {
        let es = EsClient::from_config(&config.cluster);
        let kibana = KibanaClient::from_config(&config.cluster);
        let store = Arc::new(RuleStore::new(config.store.rules_path()));
        let backend = Arc::new(ElasticBackend::from_config(&config.cluster));
        let source = Arc::new(LiveSource::new(kibana.clone(), es.clone()));
        let lifecycle = LifecycleManager::new(store, backend, source, &config.guardrails);
        Self {
            config,
            lifecycle,
            es,
            kibana,
        }
    }
}
