//! Live [`TransformApi`] over the cluster's REST interface.

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde_json::Value;
use tracing::{debug, info};

use l2m_core::config::ClusterConfig;
use l2m_core::{L2mError, Result};

use crate::elastic::TransformApi;

pub struct HttpTransformApi {
    client: reqwest::Client,
    base_url: String,
    auth: Option<(String, String)>,
}

impl HttpTransformApi {
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

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        debug!("transform api request: {} {}", method, url);
        let mut builder = self.client.request(method, url);
        if let Some((user, pass)) = &self.auth {
            builder = builder.basic_auth(user, Some(pass));
        }
        builder
    }

    /// Send and demand a 2xx answer.
    async fn execute(
        &self,
        builder: reqwest::RequestBuilder,
        operation: &str,
    ) -> Result<reqwest::Response> {
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
        Ok(response)
    }

    /// Send, treating 404 as `Ok(None)`.
    async fn execute_opt(
        &self,
        builder: reqwest::RequestBuilder,
        operation: &str,
    ) -> Result<Option<reqwest::Response>> {
        let response = builder
            .send()
            .await
            .map_err(|e| L2mError::unavailable(operation, e))?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(L2mError::rejected(
                operation,
                format!("HTTP {}: {}", status.as_u16(), body),
            ));
        }
        Ok(Some(response))
    }
}

#[async_trait]
impl TransformApi for HttpTransformApi {
    async fn ensure_ilm_policy(&self, name: &str, body: &Value) -> Result<()> {
        let path = format!("/_ilm/policy/{}", name);
        if self
            .execute_opt(self.request(Method::GET, &path), "get retention policy")
            .await?
            .is_some()
        {
            debug!("retention policy {} already exists", name);
            return Ok(());
        }
        self.execute(
            self.request(Method::PUT, &path).json(body),
            "create retention policy",
        )
        .await?;
        info!("created retention policy {}", name);
        Ok(())
    }

    async fn create_index(&self, index: &str, body: &Value) -> Result<()> {
        self.execute(
            self.request(Method::PUT, &format!("/{}", index)).json(body),
            "create metrics index",
        )
        .await?;
        Ok(())
    }

    async fn delete_index(&self, index: &str) -> Result<bool> {
        let path = format!("/{}", index);
        Ok(self
            .execute_opt(self.request(Method::DELETE, &path), "delete metrics index")
            .await?
            .is_some())
    }

    async fn index_exists(&self, index: &str) -> Result<bool> {
        let path = format!("/{}", index);
        Ok(self
            .execute_opt(self.request(Method::HEAD, &path), "check source index")
            .await?
            .is_some())
    }

    async fn field_exists(&self, index: &str, field: &str) -> Result<bool> {
        let operation = "fetch source mapping";
        let response = self
            .execute(
                self.request(Method::GET, &format!("/{}/_mapping", index)),
                operation,
            )
            .await?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| L2mError::unexpected(operation, e))?;
        Ok(mapping_has_field(&body, field))
    }

    async fn transform_exists(&self, transform_id: &str) -> Result<bool> {
        let path = format!("/_transform/{}", transform_id);
        Ok(self
            .execute_opt(self.request(Method::GET, &path), "check transform")
            .await?
            .is_some())
    }

    async fn put_transform(&self, transform_id: &str, body: &Value) -> Result<()> {
        let path = format!("/_transform/{}?timeout=30s", transform_id);
        self.execute(self.request(Method::PUT, &path).json(body), "create transform")
            .await?;
        Ok(())
    }

    async fn start_transform(&self, transform_id: &str) -> Result<()> {
        let path = format!("/_transform/{}/_start?timeout=30s", transform_id);
        self.execute(self.request(Method::POST, &path), "start transform")
            .await?;
        Ok(())
    }

    async fn stop_transform(&self, transform_id: &str) -> Result<bool> {
        let path = format!(
            "/_transform/{}/_stop?force=true&wait_for_completion=true&timeout=30s",
            transform_id
        );
        Ok(self
            .execute_opt(self.request(Method::POST, &path), "stop transform")
            .await?
            .is_some())
    }

    async fn delete_transform(&self, transform_id: &str) -> Result<bool> {
        let path = format!("/_transform/{}?force=true", transform_id);
        Ok(self
            .execute_opt(self.request(Method::DELETE, &path), "delete transform")
            .await?
            .is_some())
    }

    async fn transform_stats(&self, transform_id: &str) -> Result<Option<Value>> {
        let operation = "fetch transform stats";
        let path = format!("/_transform/{}/_stats", transform_id);
        match self
            .execute_opt(self.request(Method::GET, &path), operation)
            .await?
        {
            None => Ok(None),
            Some(response) => {
                let body: Value = response
                    .json()
                    .await
                    .map_err(|e| L2mError::unexpected(operation, e))?;
                Ok(Some(body))
            }
        }
    }
}

/// True when any concrete index behind the name maps the field.
fn mapping_has_field(mapping: &Value, field: &str) -> bool {
    mapping
        .as_object()
        .map(|indices| {
            indices
                .values()
                .any(|m| !m["mappings"]["properties"][field].is_null())
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn field_lookup_checks_every_concrete_index() {
        let mapping = json!({
            "app-logs-2025.01": {
                "mappings": { "properties": { "timestamp": { "type": "date" } } }
            },
            "app-logs-2025.02": {
                "mappings": { "properties": {
                    "timestamp": { "type": "date" },
                    "latency_ms": { "type": "float" },
                } }
            },
        });
        assert!(mapping_has_field(&mapping, "latency_ms"));
        assert!(mapping_has_field(&mapping, "timestamp"));
        assert!(!mapping_has_field(&mapping, "missing"));
    }

    #[test]
    fn field_lookup_tolerates_malformed_mappings() {
        assert!(!mapping_has_field(&json!([]), "f"));
        assert!(!mapping_has_field(&json!({ "idx": {} }), "f"));
    }
}
