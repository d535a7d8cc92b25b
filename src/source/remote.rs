//! Pre-aggregated vault API client.
//!
//! The API combines the RPC, subgraph and metadata sources server-side:
//! `GET {api_url}/api/getVaults?chainID={id}&revalidate={bool}` returns
//! `{ access, data: { vaults, network } }`.

use crate::models::{effective_chain, ChainId, NetworkHealth};
use crate::source::{http_client, read_json, RawSnapshot, SourceAdapter, SourceError};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
struct GetVaultsResponse {
    #[serde(default)]
    access: Value,
    data: GetVaultsData,
}

#[derive(Debug, Deserialize)]
struct GetVaultsData {
    #[serde(default)]
    vaults: Value,
    #[serde(default)]
    network: NetworkHealth,
}

/// Client for the aggregation API.
pub struct RemoteSource {
    client: reqwest::Client,
    api_url: String,
    timeout_seconds: u64,
}

impl RemoteSource {
    pub fn new(api_url: String, timeout_seconds: u64) -> Result<Self, SourceError> {
        Ok(Self {
            client: http_client(timeout_seconds)?,
            api_url: api_url.trim_end_matches('/').to_string(),
            timeout_seconds,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/getVaults", self.api_url)
    }
}

/// Interpret the `access` stamp, which may arrive as a number or a string.
fn access_millis(access: &Value) -> Option<i64> {
    match access {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<f64>().ok().map(|f| f as i64),
        _ => None,
    }
}

fn parse_response(body: Value, url: &str) -> Result<RawSnapshot, SourceError> {
    let response: GetVaultsResponse =
        serde_json::from_value(body).map_err(|e| SourceError::Decode {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    Ok(RawSnapshot {
        vaults: response.data.vaults,
        network: response.data.network,
        access: access_millis(&response.access),
    })
}

#[async_trait]
impl SourceAdapter for RemoteSource {
    fn kind(&self) -> &'static str {
        "remote"
    }

    async fn fetch(&self, chain_id: ChainId, force_revalidate: bool) -> Result<RawSnapshot, SourceError> {
        let url = self.endpoint();
        let chain_id = effective_chain(chain_id);
        debug!(
            "GET {} chainID={} revalidate={}",
            url, chain_id, force_revalidate
        );

        let response = self
            .client
            .get(&url)
            .query(&[
                ("chainID", chain_id.to_string()),
                ("revalidate", force_revalidate.to_string()),
            ])
            .send()
            .await
            .map_err(|e| SourceError::from_reqwest(e, &url, self.timeout_seconds))?;

        let body = read_json(response, &url, self.timeout_seconds).await?;
        let raw = parse_response(body, &url)?;

        info!(
            "Fetched {} vaults from aggregation API",
            raw.vaults.as_array().map_or(0, Vec::len)
        );
        Ok(raw)
    }
}
