//! Direct multi-source fetch.
//!
//! Queries the chain RPC, the vault subgraph and the strategy metadata
//! service concurrently and merges them into the same vault shape the
//! aggregation API returns. The subgraph is the authoritative vault list;
//! the other two only degrade the network status when they fail.

use crate::codec;
use crate::config::SourcesConfig;
use crate::models::{
    effective_chain, ChainId, NetworkHealth, SourceStatus, Strategy, Vault, NOT_IN_QUEUE,
};
use crate::source::{http_client, read_json, RawSnapshot, SourceAdapter, SourceError};
use alloy_primitives::U256;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Strategy display data keyed by lowercase strategy address.
pub type MetaIndex = HashMap<String, StrategyMeta>;

/// Human-facing strategy data from the metadata service.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StrategyMeta {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Vault list and indexing status read from the subgraph.
#[derive(Debug, Clone, Default)]
pub struct SubgraphSnapshot {
    pub vaults: Vec<SubgraphVault>,
    pub block_number: u64,
    pub has_indexing_errors: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GraphToken {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub decimals: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubgraphVault {
    pub id: String,
    #[serde(default)]
    pub share_token: GraphToken,
    #[serde(default)]
    pub token: GraphToken,
    #[serde(default, with = "codec::big_uint")]
    pub balance_tokens: U256,
    #[serde(default, rename = "tokenPriceUSDC", deserialize_with = "de_decimal")]
    pub token_price_usd: f64,
    #[serde(default)]
    pub strategies: Vec<SubgraphStrategy>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubgraphStrategy {
    pub address: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, with = "codec::timestamp")]
    pub activation: u64,
    #[serde(default, with = "codec::big_uint")]
    pub total_debt: U256,
    /// `None` when the strategy is outside the withdrawal queue.
    #[serde(default)]
    pub queue_index: Option<u32>,
}

/// GraphQL decimals arrive as strings.
fn de_decimal<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Number(n) => Ok(n.as_f64().unwrap_or(0.0)),
        Value::String(s) => s.trim().parse().map_err(serde::de::Error::custom),
        Value::Null => Ok(0.0),
        other => Err(serde::de::Error::custom(format!("not a decimal: {}", other))),
    }
}

/// Latest chain block.
#[async_trait]
pub trait ChainRpc: Send + Sync {
    async fn block_number(&self, rpc_uri: &str) -> Result<u64, SourceError>;
}

/// Vault/strategy index.
#[async_trait]
pub trait Subgraph: Send + Sync {
    async fn vaults(&self, subgraph_uri: &str) -> Result<SubgraphSnapshot, SourceError>;
}

/// Strategy names and descriptions.
#[async_trait]
pub trait MetaService: Send + Sync {
    async fn strategies(&self, chain_id: ChainId) -> Result<MetaIndex, SourceError>;
}

/// JSON-RPC client.
pub struct HttpChainRpc {
    client: reqwest::Client,
    timeout_seconds: u64,
}

#[async_trait]
impl ChainRpc for HttpChainRpc {
    async fn block_number(&self, rpc_uri: &str) -> Result<u64, SourceError> {
        let request = json!({"jsonrpc": "2.0", "id": 1, "method": "eth_blockNumber", "params": []});
        let response = self
            .client
            .post(rpc_uri)
            .json(&request)
            .send()
            .await
            .map_err(|e| SourceError::from_reqwest(e, rpc_uri, self.timeout_seconds))?;
        let body = read_json(response, rpc_uri, self.timeout_seconds).await?;

        if let Some(error) = body.get("error") {
            return Err(SourceError::Request {
                url: rpc_uri.to_string(),
                reason: error.to_string(),
            });
        }
        let result = body.get("result").ok_or_else(|| SourceError::Decode {
            url: rpc_uri.to_string(),
            reason: "missing result".to_string(),
        })?;
        codec::decode(result)
            .and_then(codec::to_u64)
            .map_err(|e| SourceError::Decode {
                url: rpc_uri.to_string(),
                reason: e.to_string(),
            })
    }
}

const VAULTS_QUERY: &str = r#"{
  _meta { block { number } hasIndexingErrors }
  vaults(first: 1000) {
    id
    shareToken { name symbol decimals }
    token { name symbol decimals }
    balanceTokens
    tokenPriceUSDC
    strategies(first: 40) { address name activation totalDebt queueIndex }
  }
}"#;

#[derive(Debug, Deserialize)]
struct GraphResponse {
    data: Option<GraphData>,
    #[serde(default)]
    errors: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct GraphData {
    #[serde(rename = "_meta")]
    meta: GraphMeta,
    #[serde(default)]
    vaults: Vec<SubgraphVault>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphMeta {
    block: GraphBlock,
    #[serde(default)]
    has_indexing_errors: bool,
}

#[derive(Debug, Deserialize)]
struct GraphBlock {
    number: u64,
}

fn parse_graph_response(body: Value, url: &str) -> Result<SubgraphSnapshot, SourceError> {
    let response: GraphResponse = serde_json::from_value(body).map_err(|e| SourceError::Decode {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    let data = response.data.ok_or_else(|| SourceError::Request {
        url: url.to_string(),
        reason: Value::Array(response.errors).to_string(),
    })?;
    Ok(SubgraphSnapshot {
        vaults: data.vaults,
        block_number: data.meta.block.number,
        has_indexing_errors: data.meta.has_indexing_errors,
    })
}

/// GraphQL client for the vault subgraph.
pub struct HttpSubgraph {
    client: reqwest::Client,
    timeout_seconds: u64,
}

#[async_trait]
impl Subgraph for HttpSubgraph {
    async fn vaults(&self, subgraph_uri: &str) -> Result<SubgraphSnapshot, SourceError> {
        let response = self
            .client
            .post(subgraph_uri)
            .json(&json!({ "query": VAULTS_QUERY }))
            .send()
            .await
            .map_err(|e| SourceError::from_reqwest(e, subgraph_uri, self.timeout_seconds))?;
        let body = read_json(response, subgraph_uri, self.timeout_seconds).await?;
        parse_graph_response(body, subgraph_uri)
    }
}

#[derive(Debug, Deserialize)]
struct MetaEntry {
    #[serde(default)]
    addresses: Vec<String>,
    #[serde(flatten)]
    meta: StrategyMeta,
}

fn index_meta(entries: Vec<MetaEntry>) -> MetaIndex {
    let mut index = MetaIndex::new();
    for entry in entries {
        for address in entry.addresses {
            index.insert(address.to_lowercase(), entry.meta.clone());
        }
    }
    index
}

/// Client for the strategy metadata service.
pub struct HttpMetaService {
    client: reqwest::Client,
    meta_url: String,
    timeout_seconds: u64,
}

#[async_trait]
impl MetaService for HttpMetaService {
    async fn strategies(&self, chain_id: ChainId) -> Result<MetaIndex, SourceError> {
        let url = format!("{}/api/{}/strategies/all", self.meta_url, chain_id);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| SourceError::from_reqwest(e, &url, self.timeout_seconds))?;
        let body = read_json(response, &url, self.timeout_seconds).await?;
        let entries: Vec<MetaEntry> = serde_json::from_value(body).map_err(|e| SourceError::Decode {
            url: url.clone(),
            reason: e.to_string(),
        })?;
        Ok(index_meta(entries))
    }
}

/// Merge subgraph vaults with metadata into the shared vault model.
pub fn merge_vaults(vaults: Vec<SubgraphVault>, meta: Option<&MetaIndex>) -> Vec<Vault> {
    vaults
        .into_iter()
        .map(|vault| {
            let decimals = vault.token.decimals;
            let price = vault.token_price_usd;
            let mut strategies: Vec<Strategy> = vault
                .strategies
                .into_iter()
                .map(|s| {
                    let known = meta.and_then(|index| index.get(&s.address.to_lowercase()));
                    Strategy {
                        name: known
                            .map(|m| m.name.clone())
                            .filter(|name| !name.is_empty())
                            .unwrap_or(s.name),
                        description: known.map(|m| m.description.clone()).unwrap_or_default(),
                        activation: s.activation,
                        total_debt_usd: codec::to_units(s.total_debt, decimals) * price,
                        index: s.queue_index.unwrap_or(NOT_IN_QUEUE),
                        vault: vault.id.clone(),
                        address: s.address,
                    }
                })
                .collect();
            strategies.sort_by_key(|s| s.index);

            Vault {
                address: vault.id,
                name: vault.share_token.name,
                symbol: vault.share_token.symbol,
                decimals,
                balance_tokens: vault.balance_tokens,
                token_price_usd: price,
                strategies,
                alerts: None,
                explorer: None,
            }
        })
        .collect()
}

/// Adapter that queries the providers itself.
pub struct DirectSource {
    rpc: Arc<dyn ChainRpc>,
    subgraph: Arc<dyn Subgraph>,
    meta: Arc<dyn MetaService>,
    rpc_uris: BTreeMap<String, String>,
    subgraph_uris: BTreeMap<String, String>,
    meta_cache: Mutex<HashMap<ChainId, Arc<MetaIndex>>>,
}

impl DirectSource {
    pub fn new(
        rpc: Arc<dyn ChainRpc>,
        subgraph: Arc<dyn Subgraph>,
        meta: Arc<dyn MetaService>,
        rpc_uris: BTreeMap<String, String>,
        subgraph_uris: BTreeMap<String, String>,
    ) -> Self {
        Self {
            rpc,
            subgraph,
            meta,
            rpc_uris,
            subgraph_uris,
            meta_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Wire the HTTP providers from configuration.
    pub fn from_config(config: &SourcesConfig) -> Result<Self, SourceError> {
        let client = http_client(config.timeout_seconds)?;
        let timeout_seconds = config.timeout_seconds;
        Ok(Self::new(
            Arc::new(HttpChainRpc {
                client: client.clone(),
                timeout_seconds,
            }),
            Arc::new(HttpSubgraph {
                client: client.clone(),
                timeout_seconds,
            }),
            Arc::new(HttpMetaService {
                client,
                meta_url: config.meta_url.trim_end_matches('/').to_string(),
                timeout_seconds,
            }),
            config.rpc.clone(),
            config.subgraph.clone(),
        ))
    }

    fn uri<'a>(
        uris: &'a BTreeMap<String, String>,
        chain_id: ChainId,
        what: &str,
    ) -> Result<&'a str, SourceError> {
        uris.get(&chain_id.to_string())
            .map(String::as_str)
            .ok_or_else(|| SourceError::Config(format!("no {} URI configured for chain {}", what, chain_id)))
    }

    async fn strategy_meta(&self, chain_id: ChainId, use_cache: bool) -> Result<Arc<MetaIndex>, SourceError> {
        if use_cache {
            let cached = self.meta_cache.lock().get(&chain_id).cloned();
            if let Some(index) = cached {
                debug!("Using cached strategy metadata for chain {}", chain_id);
                return Ok(index);
            }
        }
        let index = Arc::new(self.meta.strategies(chain_id).await?);
        self.meta_cache.lock().insert(chain_id, index.clone());
        Ok(index)
    }
}

#[async_trait]
impl SourceAdapter for DirectSource {
    fn kind(&self) -> &'static str {
        "direct"
    }

    async fn fetch(&self, chain_id: ChainId, force_revalidate: bool) -> Result<RawSnapshot, SourceError> {
        let chain_id = effective_chain(chain_id);
        let rpc_uri = Self::uri(&self.rpc_uris, chain_id, "rpc")?;
        let subgraph_uri = Self::uri(&self.subgraph_uris, chain_id, "subgraph")?;

        let (block, graph, meta) = futures::future::join3(
            self.rpc.block_number(rpc_uri),
            self.subgraph.vaults(subgraph_uri),
            self.strategy_meta(chain_id, !force_revalidate),
        )
        .await;

        let graph = graph?;
        let mut status = SourceStatus::default();

        let block_number = match block {
            Ok(number) => number,
            Err(e) => {
                warn!("RPC unavailable for chain {}: {}", chain_id, e);
                status.rpc = SourceStatus::DOWN;
                0
            }
        };
        let meta = match meta {
            Ok(index) => Some(index),
            Err(e) => {
                warn!("Strategy metadata unavailable for chain {}: {}", chain_id, e);
                status.meta = SourceStatus::DOWN;
                None
            }
        };

        let network = NetworkHealth {
            status,
            block_number,
            graph_block_number: graph.block_number,
            has_graph_indexing_errors: graph.has_indexing_errors,
        };
        let vaults = merge_vaults(graph.vaults, meta.as_deref());
        info!(
            "Merged {} vaults from subgraph (block {}, chain block {})",
            vaults.len(),
            network.graph_block_number,
            network.block_number
        );

        let vaults = serde_json::to_value(&vaults).map_err(|e| SourceError::Decode {
            url: subgraph_uri.to_string(),
            reason: e.to_string(),
        })?;
        Ok(RawSnapshot {
            vaults,
            network,
            access: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::revive_vaults;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeRpc {
        fail: bool,
    }

    #[async_trait]
    impl ChainRpc for FakeRpc {
        async fn block_number(&self, _rpc_uri: &str) -> Result<u64, SourceError> {
            if self.fail {
                Err(SourceError::Connect {
                    url: "rpc".to_string(),
                })
            } else {
                Ok(1_000)
            }
        }
    }

    struct FakeGraph {
        body: Value,
    }

    #[async_trait]
    impl Subgraph for FakeGraph {
        async fn vaults(&self, subgraph_uri: &str) -> Result<SubgraphSnapshot, SourceError> {
            parse_graph_response(self.body.clone(), subgraph_uri)
        }
    }

    struct FakeMeta {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl MetaService for FakeMeta {
        async fn strategies(&self, _chain_id: ChainId) -> Result<MetaIndex, SourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(SourceError::Status {
                    url: "meta".to_string(),
                    status: 500,
                    body: String::new(),
                });
            }
            Ok(index_meta(vec![MetaEntry {
                addresses: vec!["0xS1".to_string()],
                meta: StrategyMeta {
                    name: "Curve 3pool Compounder".to_string(),
                    description: "Supplies {{token}} to Curve".to_string(),
                },
            }]))
        }
    }

    fn graph_body() -> Value {
        json!({
            "data": {
                "_meta": {"block": {"number": 990}, "hasIndexingErrors": false},
                "vaults": [{
                    "id": "0xV1",
                    "shareToken": {"name": "DAI yVault", "symbol": "yvDAI", "decimals": 18},
                    "token": {"name": "Dai", "symbol": "DAI", "decimals": 18},
                    "balanceTokens": "3000000000000000000000",
                    "tokenPriceUSDC": "1.0",
                    "strategies": [
                        {"address": "0xs2", "name": "StrategyIdle", "activation": "1600000000",
                         "totalDebt": "0", "queueIndex": null},
                        {"address": "0xs1", "name": "StrategyCurve3pool", "activation": "1500000000",
                         "totalDebt": "2000000000000000000000", "queueIndex": 0}
                    ]
                }]
            }
        })
    }

    fn uris(value: &str) -> BTreeMap<String, String> {
        BTreeMap::from([("1".to_string(), value.to_string())])
    }

    fn source(rpc_fails: bool, meta_fails: bool) -> (DirectSource, Arc<FakeMeta>) {
        let meta = Arc::new(FakeMeta {
            calls: AtomicUsize::new(0),
            fail: meta_fails,
        });
        let source = DirectSource::new(
            Arc::new(FakeRpc { fail: rpc_fails }),
            Arc::new(FakeGraph { body: graph_body() }),
            meta.clone(),
            uris("http://rpc"),
            uris("http://graph"),
        );
        (source, meta)
    }

    #[tokio::test]
    async fn test_fetch_merges_sources() {
        let (source, _) = source(false, false);
        let raw = source.fetch(1, false).await.unwrap();

        assert!(raw.access.is_none());
        assert_eq!(raw.network.block_number, 1_000);
        assert_eq!(raw.network.graph_block_number, 990);
        assert!(raw.network.is_healthy());

        let vaults = revive_vaults(raw.vaults).unwrap();
        let strategies = &vaults[0].strategies;
        assert_eq!(strategies[0].name, "Curve 3pool Compounder");
        assert_eq!(strategies[0].render_description("DAI"), "Supplies DAI to Curve");
        assert!((strategies[0].total_debt_usd - 2_000.0).abs() < 1e-6);
        assert_eq!(strategies[1].name, "StrategyIdle");
        assert!(!strategies[1].is_in_queue());
        assert!((vaults[0].total_assets_usd() - 3_000.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_degraded_providers_mark_status() {
        let (source, _) = source(true, true);
        let raw = source.fetch(1, false).await.unwrap();

        assert_eq!(raw.network.status.rpc, SourceStatus::DOWN);
        assert_eq!(raw.network.status.meta, SourceStatus::DOWN);
        assert_eq!(raw.network.status.graph, SourceStatus::HEALTHY);
        assert_eq!(raw.network.block_number, 0);

        let vaults = revive_vaults(raw.vaults).unwrap();
        assert_eq!(vaults[0].strategies[0].name, "StrategyCurve3pool");
    }

    #[tokio::test]
    async fn test_metadata_cache_respects_revalidate() {
        let (source, meta) = source(false, false);
        source.fetch(1, false).await.unwrap();
        source.fetch(1, false).await.unwrap();
        assert_eq!(meta.calls.load(Ordering::SeqCst), 1);

        source.fetch(1, true).await.unwrap();
        assert_eq!(meta.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_missing_chain_uri_is_config_error() {
        let (source, _) = source(false, false);
        let err = source.fetch(250, false).await.unwrap_err();
        assert!(matches!(err, SourceError::Config(_)));
    }

    #[test]
    fn test_graph_errors_without_data() {
        let body = json!({"errors": [{"message": "indexing_error"}]});
        let err = parse_graph_response(body, "http://graph").unwrap_err();
        assert!(err.to_string().contains("indexing_error"));
    }
}
