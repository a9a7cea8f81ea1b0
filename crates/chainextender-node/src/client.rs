//! HTTP client for the node's v2 API, backed by `reqwest`.
//!
//! Every call is retried with exponential backoff on transport errors and
//! 5xx responses. "Not found" answers are not errors for [`NodeClient::block`]:
//! they mean the height is not finalized yet.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::debug;

use chainextender_core::error::{EntityKind, ExtenderError};
use chainextender_core::node::NodeClient;
use chainextender_core::retry::{RetryConfig, RetryPolicy};
use chainextender_core::types::{AddressBalances, BlockEvents, Candidate, CoinInfo, NodeBlock, NodeStatus};

use crate::error::NodeError;
use crate::wire::{
    AddressesWire, ApiErrorWire, BlockWire, CandidatesWire, CoinInfoWire, EventsWire, StatusWire,
};

/// Configuration for [`HttpNodeClient`].
#[derive(Debug, Clone)]
pub struct NodeClientConfig {
    pub retry: RetryConfig,
    pub request_timeout: Duration,
}

impl Default for NodeClientConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// [`NodeClient`] over HTTP.
pub struct HttpNodeClient {
    base_url: String,
    http: reqwest::Client,
    retry: RetryPolicy,
}

impl HttpNodeClient {
    /// Create a client for the API rooted at `base_url` (e.g.
    /// `http://localhost:8843/v2`).
    pub fn new(base_url: impl Into<String>, config: NodeClientConfig) -> Result<Self, NodeError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| NodeError::Http(format!("failed to build HTTP client: {e}")))?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self {
            base_url,
            http,
            retry: RetryPolicy::new(config.retry),
        })
    }

    /// Create with default configuration.
    pub fn default_for(base_url: impl Into<String>) -> Result<Self, NodeError> {
        Self::new(base_url, NodeClientConfig::default())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T, NodeError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "node request");
        let resp = self.http.get(&url).query(query).send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp.json::<T>().await?);
        }

        let body = resp.text().await.unwrap_or_default();
        if let Ok(api) = serde_json::from_str::<ApiErrorWire>(&body) {
            let err = NodeError::Api {
                code: api.error.code_string(),
                message: api.error.message,
            };
            if err.is_not_found() || status.as_u16() == 404 {
                return Err(NodeError::NotFound(err.to_string()));
            }
            if status.is_server_error() {
                return Err(err);
            }
        }
        Err(NodeError::Status {
            status: status.as_u16(),
            body,
        })
    }

    async fn fetch_status(&self) -> Result<NodeStatus, ExtenderError> {
        let wire: StatusWire = self.get("/status", &[]).await?;
        Ok(wire.into())
    }

    async fn fetch_block(&self, height: u64) -> Result<Option<NodeBlock>, ExtenderError> {
        match self.get::<BlockWire>(&format!("/block/{height}"), &[]).await {
            Ok(wire) => Ok(Some(wire.into())),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn fetch_events(&self, height: u64) -> Result<BlockEvents, ExtenderError> {
        match self.get::<EventsWire>(&format!("/events/{height}"), &[]).await {
            Ok(wire) => Ok(wire.into_events(height)),
            // The events endpoint 404s for heights that produced none.
            Err(e) if e.is_not_found() => Ok(BlockEvents {
                height,
                events: vec![],
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn fetch_candidates(&self, height: u64, include_stakes: bool) -> Result<Vec<Candidate>, ExtenderError> {
        let query = [
            ("height", height.to_string()),
            ("include_stakes", include_stakes.to_string()),
            ("status", "all".to_string()),
        ];
        let wire: CandidatesWire = self.get("/candidates", &query).await?;
        Ok(wire.into_candidates())
    }

    async fn fetch_coin(&self, path: String, key: String) -> Result<CoinInfo, ExtenderError> {
        match self.get::<CoinInfoWire>(&path, &[]).await {
            Ok(wire) => Ok(wire.into()),
            Err(e) if e.is_not_found() => Err(ExtenderError::not_found(EntityKind::Coin, key)),
            Err(e) => Err(e.into()),
        }
    }

    async fn fetch_balances(&self, addresses: &[String]) -> Result<Vec<AddressBalances>, ExtenderError> {
        let query: Vec<(&str, String)> = addresses.iter().map(|a| ("addresses", a.clone())).collect();
        let wire: AddressesWire = self.get("/addresses", &query).await?;
        Ok(wire.into_balances(addresses))
    }
}

#[async_trait]
impl NodeClient for HttpNodeClient {
    async fn status(&self) -> Result<NodeStatus, ExtenderError> {
        self.retry.run("node status", || self.fetch_status()).await
    }

    async fn block(&self, height: u64) -> Result<Option<NodeBlock>, ExtenderError> {
        self.retry.run("node block", || self.fetch_block(height)).await
    }

    async fn events(&self, height: u64) -> Result<BlockEvents, ExtenderError> {
        self.retry.run("node events", || self.fetch_events(height)).await
    }

    async fn candidates(&self, height: u64, include_stakes: bool) -> Result<Vec<Candidate>, ExtenderError> {
        self.retry
            .run("node candidates", || self.fetch_candidates(height, include_stakes))
            .await
    }

    async fn coin_info_by_id(&self, id: u64) -> Result<CoinInfo, ExtenderError> {
        self.retry
            .run("node coin info", || self.fetch_coin(format!("/coin_info_by_id/{id}"), id.to_string()))
            .await
    }

    async fn coin_info_by_symbol(&self, symbol: &str) -> Result<CoinInfo, ExtenderError> {
        self.retry
            .run("node coin info", || self.fetch_coin(format!("/coin_info/{symbol}"), symbol.to_string()))
            .await
    }

    async fn balances(&self, addresses: &[String]) -> Result<Vec<AddressBalances>, ExtenderError> {
        if addresses.is_empty() {
            return Ok(vec![]);
        }
        self.retry.run("node balances", || self.fetch_balances(addresses)).await
    }
}
