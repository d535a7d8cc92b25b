//! Vault data sources.
//!
//! Two interchangeable adapters produce raw snapshots:
//! - [`RemoteSource`]: one request to the pre-aggregation API
//! - [`DirectSource`]: fans out to RPC, subgraph and metadata providers
//!   and merges locally

pub mod direct;
pub mod remote;

pub use direct::DirectSource;
pub use remote::RemoteSource;

use crate::config::SourcesConfig;
use crate::models::{ChainId, NetworkHealth};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Unnormalized result of one fetch.
#[derive(Debug, Clone)]
pub struct RawSnapshot {
    /// Vault list as received; big-integer tags are still present.
    pub vaults: Value,
    pub network: NetworkHealth,
    /// Server-side access time in milliseconds, when the source stamps one.
    pub access: Option<i64>,
}

/// Transport and payload errors raised by sources.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("request to {url} timed out after {seconds}s")]
    Timeout { url: String, seconds: u64 },

    #[error("cannot connect to {url}")]
    Connect { url: String },

    #[error("{url} answered {status}: {body}")]
    Status { url: String, status: u16, body: String },

    #[error("request to {url} failed: {reason}")]
    Request { url: String, reason: String },

    #[error("unexpected payload from {url}: {reason}")]
    Decode { url: String, reason: String },

    #[error("source misconfigured: {0}")]
    Config(String),
}

impl SourceError {
    /// Classify a reqwest failure.
    pub(crate) fn from_reqwest(err: reqwest::Error, url: &str, timeout_seconds: u64) -> Self {
        if err.is_timeout() {
            SourceError::Timeout {
                url: url.to_string(),
                seconds: timeout_seconds,
            }
        } else if err.is_connect() {
            SourceError::Connect {
                url: url.to_string(),
            }
        } else if err.is_decode() {
            SourceError::Decode {
                url: url.to_string(),
                reason: err.to_string(),
            }
        } else {
            SourceError::Request {
                url: url.to_string(),
                reason: err.to_string(),
            }
        }
    }
}

/// A provider of raw vault snapshots.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Short name used in logs.
    fn kind(&self) -> &'static str;

    /// Fetch the vault list and network health for `chain_id`.
    async fn fetch(&self, chain_id: ChainId, force_revalidate: bool) -> Result<RawSnapshot, SourceError>;
}

/// Build the HTTP client shared by a source's requests.
pub(crate) fn http_client(timeout_seconds: u64) -> Result<reqwest::Client, SourceError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_seconds))
        .user_agent(concat!("vaultwatch/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| SourceError::Config(format!("failed to create HTTP client: {}", e)))
}

/// Read a response body, turning non-2xx statuses into errors.
pub(crate) async fn read_json(
    response: reqwest::Response,
    url: &str,
    timeout_seconds: u64,
) -> Result<Value, SourceError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(SourceError::Status {
            url: url.to_string(),
            status: status.as_u16(),
            body,
        });
    }
    response
        .json::<Value>()
        .await
        .map_err(|e| SourceError::from_reqwest(e, url, timeout_seconds))
}

/// Select the adapter named by the configuration.
pub fn build_source(config: &SourcesConfig) -> Result<Arc<dyn SourceAdapter>, SourceError> {
    if config.remote {
        Ok(Arc::new(RemoteSource::new(
            config.api_url.clone(),
            config.timeout_seconds,
        )?))
    } else {
        Ok(Arc::new(DirectSource::from_config(config)?))
    }
}
