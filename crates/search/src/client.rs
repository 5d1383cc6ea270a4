//! Search backend client.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

use logship_core::Config;

use crate::error::SearchError;

/// Per-request timeout for the search backend.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Trait for search backend clients.
///
/// The shipper loop depends only on this trait, so index writes can be
/// captured by fakes in tests.
#[async_trait]
pub trait SearchClient: Send + Sync {
    /// Cluster health probe. Used once at startup as a fail-fast check.
    async fn cluster_health(&self) -> Result<(), SearchError>;

    /// Submit one document to the given index under a category label.
    async fn index_document(
        &self,
        index: &str,
        category: &str,
        body: &Value,
    ) -> Result<(), SearchError>;
}

/// HTTP client for an Elasticsearch-compatible search backend.
pub struct HttpSearchClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpSearchClient {
    /// Build a client from project config. Does not touch the network;
    /// reachability is checked by [`SearchClient::cluster_health`].
    pub fn connect(config: &Config) -> Result<Self, SearchError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| SearchError::Connection(format!("HTTP client build failed: {e}")))?;

        Ok(Self {
            http,
            base_url: config.search_base_url(),
        })
    }
}

#[async_trait]
impl SearchClient for HttpSearchClient {
    async fn cluster_health(&self) -> Result<(), SearchError> {
        let url = format!("{}/_cluster/health", self.base_url);

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| SearchError::Connection(format!("health request failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(SearchError::Unhealthy(format!(
                "{} returned status {}",
                url,
                resp.status()
            )));
        }

        // The health document carries a status field (green/yellow/red);
        // surface it in the startup log.
        let status = resp
            .json::<Value>()
            .await
            .ok()
            .and_then(|v| v.get("status").and_then(|s| s.as_str()).map(String::from))
            .unwrap_or_else(|| "unknown".to_string());

        info!(cluster_status = %status, "search backend reachable");
        Ok(())
    }

    async fn index_document(
        &self,
        index: &str,
        category: &str,
        body: &Value,
    ) -> Result<(), SearchError> {
        let url = format!("{}/{}/{}", self.base_url, index, category);

        let resp = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| SearchError::Connection(format!("index request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            return Err(SearchError::Rejected {
                status: status.as_u16(),
                body: detail,
            });
        }

        debug!(%index, %category, "document indexed");
        Ok(())
    }
}
