//! Clients for talking to other nodes
//!
//! [`NodeClient`] speaks the full RPC surface. The coordinator only needs
//! the replication push, which it reaches through the [`ReplicaClient`]
//! and [`ReplicaConnector`] capabilities so tests can swap the transport.

use crate::common::{Config, Error, Result};
use crate::proto::{
    routes, ApplyBatchRequest, Empty, ErrorBody, GetResponse, HealthResponse, SetRequest,
    SubscribeRequest,
};
use crate::storage::Batch;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Capability to push a batch to one replica
#[async_trait]
pub trait ReplicaClient: Send + Sync {
    async fn push(&self, batch: &Batch, credential: &str) -> Result<()>;
}

/// Establishes [`ReplicaClient`]s for addresses given at subscribe time
#[async_trait]
pub trait ReplicaConnector: Send + Sync {
    async fn connect(&self, address: &str) -> Result<Arc<dyn ReplicaClient>>;
}

/// Bounded retry with exponential backoff
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Attempts after the first one
    pub retries: u32,
    /// Delay before the first retry, doubled each time
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            retries: 0,
            backoff: Duration::ZERO,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            retries: config.push_retries,
            backoff: config.push_backoff(),
        }
    }

    /// Run `op` until it succeeds, fails with a non-retryable error or
    /// the retry budget is spent.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut delay = self.backoff;
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.retries && e.is_retryable() => {
                    attempt += 1;
                    let jitter_ms = match delay.as_millis() as u64 / 4 {
                        0 => 0,
                        max => rand::random::<u64>() % max,
                    };
                    tracing::debug!(
                        attempt,
                        retries = self.retries,
                        error = %e,
                        "Retrying replica call"
                    );
                    tokio::time::sleep(delay + Duration::from_millis(jitter_ms)).await;
                    delay = delay.saturating_mul(2);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// HTTP client for one replikv node
#[derive(Debug, Clone)]
pub struct NodeClient {
    base_url: String,
    http: reqwest::Client,
}

impl NodeClient {
    /// Build a client for `address`; every call is bounded by `timeout`.
    ///
    /// Only the address is validated here, nothing is sent over the wire.
    pub fn new(address: &str, timeout: Duration) -> Result<Self> {
        let base_url = normalize_address(address)?;
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::ConnectionFailed(e.to_string()))?;
        Ok(Self { base_url, http })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn get(&self, key: &str) -> Result<String> {
        let resp = self.http.get(self.url(&routes::kv(key))).send().await?;
        let body: GetResponse = decode(resp).await?;
        Ok(body.value)
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<()> {
        let resp = self
            .http
            .put(self.url(&routes::kv(key)))
            .json(&SetRequest {
                value: value.to_string(),
            })
            .send()
            .await?;
        decode::<Empty>(resp).await?;
        Ok(())
    }

    pub async fn subscribe(&self, address: &str, asynchronous: bool, credential: &str) -> Result<()> {
        let resp = self
            .http
            .post(self.url(routes::SUBSCRIBE))
            .json(&SubscribeRequest {
                address: address.to_string(),
                asynchronous,
                credential: credential.to_string(),
            })
            .send()
            .await?;
        decode::<Empty>(resp).await?;
        Ok(())
    }

    pub async fn apply_batch(&self, entries: &Batch, credential: &str) -> Result<()> {
        let resp = self
            .http
            .post(self.url(routes::APPLY))
            .json(&ApplyBatchRequest {
                entries: entries.clone(),
                credential: credential.to_string(),
            })
            .send()
            .await?;
        decode::<Empty>(resp).await?;
        Ok(())
    }

    pub async fn health(&self) -> Result<HealthResponse> {
        let resp = self.http.get(self.url(routes::HEALTH)).send().await?;
        decode(resp).await
    }
}

/// Accepts `host:port` or a full `http(s)://` URL.
fn normalize_address(address: &str) -> Result<String> {
    let address = address.trim();
    if address.is_empty() {
        return Err(Error::ConnectionFailed("empty replica address".into()));
    }

    let candidate = if address.contains("://") {
        address.to_string()
    } else {
        format!("http://{}", address)
    };

    let url = reqwest::Url::parse(&candidate)
        .map_err(|e| Error::ConnectionFailed(format!("invalid address {}: {}", address, e)))?;
    if url.host_str().is_none() {
        return Err(Error::ConnectionFailed(format!(
            "address has no host: {}",
            address
        )));
    }

    Ok(candidate.trim_end_matches('/').to_string())
}

async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp.json::<T>().await?);
    }

    match resp.json::<ErrorBody>().await {
        Ok(body) => Err(Error::from_code(body.code, body.message)),
        Err(_) => Err(Error::Http(format!("unexpected status {}", status))),
    }
}

/// [`ReplicaClient`] over HTTP with deadline and retries
pub struct HttpReplicaClient {
    client: NodeClient,
    retry: RetryPolicy,
}

impl HttpReplicaClient {
    pub fn new(client: NodeClient, retry: RetryPolicy) -> Self {
        Self { client, retry }
    }
}

#[async_trait]
impl ReplicaClient for HttpReplicaClient {
    async fn push(&self, batch: &Batch, credential: &str) -> Result<()> {
        self.retry
            .run(|| self.client.apply_batch(batch, credential))
            .await
    }
}

/// Connector producing [`HttpReplicaClient`]s
#[derive(Debug, Clone)]
pub struct HttpConnector {
    timeout: Duration,
    retry: RetryPolicy,
}

impl HttpConnector {
    pub fn new(timeout: Duration, retry: RetryPolicy) -> Self {
        Self { timeout, retry }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.push_timeout(), RetryPolicy::from_config(config))
    }
}

#[async_trait]
impl ReplicaConnector for HttpConnector {
    async fn connect(&self, address: &str) -> Result<Arc<dyn ReplicaClient>> {
        let client = NodeClient::new(address, self.timeout)?;
        Ok(Arc::new(HttpReplicaClient::new(client, self.retry)))
    }
}
