//! Data models for the vault monitor.
//!
//! This module contains the core data structures shared by the sync
//! controller, the risk engine and the report layer: vaults, strategies,
//! network health, committed snapshots and risk groups.

use crate::codec;
use alloy_primitives::U256;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Numeric chain identifier (1 = Ethereum mainnet).
pub type ChainId = u64;

/// Chain used when no chain is selected.
pub const DEFAULT_CHAIN_ID: ChainId = 1;

/// Queue index reported for strategies that sit outside the withdrawal queue.
pub const NOT_IN_QUEUE: u32 = 21;

/// Map the "no chain selected" value (0) to the default chain.
pub fn effective_chain(chain_id: ChainId) -> ChainId {
    if chain_id == 0 {
        DEFAULT_CHAIN_ID
    } else {
        chain_id
    }
}

/// An alert raised by the data sources against a vault.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Alert level as reported upstream ("warning", "error", ...).
    #[serde(default = "default_alert_level")]
    pub level: String,
    /// Human readable message.
    #[serde(default)]
    pub message: String,
}

fn default_alert_level() -> String {
    "warning".to_string()
}

/// A strategy allocated by a vault.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Strategy {
    /// Strategy contract address.
    pub address: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Description template; may contain the `{{token}}` placeholder.
    #[serde(default)]
    pub description: String,
    /// Activation time in seconds since the epoch.
    #[serde(default, with = "codec::timestamp")]
    pub activation: u64,
    /// Total debt in USD.
    #[serde(default, rename = "totalDebtUSDC")]
    pub total_debt_usd: f64,
    /// Position in the vault's withdrawal queue.
    #[serde(default)]
    pub index: u32,
    /// Address of the owning vault.
    #[serde(default)]
    pub vault: String,
}

impl Strategy {
    /// Whether the strategy sits in its vault's withdrawal queue.
    pub fn is_in_queue(&self) -> bool {
        self.index != NOT_IN_QUEUE
    }

    /// Resolve the `{{token}}` placeholder against the vault's symbol.
    pub fn render_description(&self, token_symbol: &str) -> String {
        self.description.replace("{{token}}", token_symbol)
    }
}

/// A vault and its strategies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vault {
    /// Vault contract address (unique).
    pub address: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Share token symbol.
    #[serde(default)]
    pub symbol: String,
    /// Token decimals.
    #[serde(default = "default_decimals")]
    pub decimals: u32,
    /// Token balance in raw units.
    #[serde(default, with = "codec::big_uint")]
    pub balance_tokens: U256,
    /// Underlying token price in USD.
    #[serde(default, rename = "tokenPriceUSDC")]
    pub token_price_usd: f64,
    /// Strategies in withdrawal-queue order.
    #[serde(default)]
    pub strategies: Vec<Strategy>,
    /// Alerts raised against the vault.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alerts: Option<Vec<Alert>>,
    /// Block explorer base URL, passed through as-is.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explorer: Option<String>,
}

fn default_decimals() -> u32 {
    18
}

impl Vault {
    /// Number of alerts attached to the vault.
    pub fn alert_count(&self) -> usize {
        self.alerts.as_ref().map_or(0, Vec::len)
    }

    /// Total assets held by the vault, in USD.
    pub fn total_assets_usd(&self) -> f64 {
        codec::to_units(self.balance_tokens, self.decimals) * self.token_price_usd
    }

    /// Sum of the debt allocated to strategies, in USD.
    pub fn allocated_usd(&self) -> f64 {
        self.strategies.iter().map(|s| s.total_debt_usd).sum()
    }

    /// Assets sitting idle in the vault, in USD.
    pub fn not_allocated_usd(&self) -> f64 {
        self.total_assets_usd() - self.allocated_usd()
    }
}

/// Per-source status codes (1 = healthy).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceStatus {
    pub rpc: u8,
    pub graph: u8,
    #[serde(rename = "yearnApi", alias = "api")]
    pub api: u8,
    #[serde(rename = "yearnMeta", alias = "meta")]
    pub meta: u8,
}

impl Default for SourceStatus {
    fn default() -> Self {
        Self {
            rpc: SourceStatus::HEALTHY,
            graph: SourceStatus::HEALTHY,
            api: SourceStatus::HEALTHY,
            meta: SourceStatus::HEALTHY,
        }
    }
}

impl SourceStatus {
    pub const HEALTHY: u8 = 1;
    pub const DOWN: u8 = 0;

    /// True when every source reports healthy.
    pub fn all_healthy(&self) -> bool {
        [self.rpc, self.graph, self.api, self.meta]
            .iter()
            .all(|s| *s == Self::HEALTHY)
    }
}

/// Health of the data sources behind a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NetworkHealth {
    pub status: SourceStatus,
    /// Latest block seen on the chain.
    pub block_number: u64,
    /// Latest block indexed by the subgraph.
    pub graph_block_number: u64,
    /// Whether the subgraph reports indexing errors.
    pub has_graph_indexing_errors: bool,
}

impl NetworkHealth {
    /// True when all sources are up and indexing is clean.
    pub fn is_healthy(&self) -> bool {
        self.status.all_healthy() && !self.has_graph_indexing_errors
    }

    /// Blocks the subgraph trails the chain by.
    pub fn index_lag(&self) -> u64 {
        self.block_number.saturating_sub(self.graph_block_number)
    }
}

/// A consistent set of vault data produced by one fetch cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub vaults: Vec<Vault>,
    /// Milliseconds since the epoch.
    pub last_update: i64,
    pub network: NetworkHealth,
}

impl Snapshot {
    /// Iterate every strategy together with its owning vault.
    pub fn strategies(&self) -> impl Iterator<Item = (&Vault, &Strategy)> {
        self.vaults
            .iter()
            .flat_map(|vault| vault.strategies.iter().map(move |s| (vault, s)))
    }

    pub fn is_empty(&self) -> bool {
        self.vaults.is_empty()
    }
}

/// Include/exclude name patterns for a risk group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatternCriteria {
    /// Strategies whose name matches any of these join the group.
    #[serde(default, alias = "nameLike")]
    pub include: Vec<String>,
    /// Strategies whose name matches any of these never join the group.
    #[serde(default)]
    pub exclude: Vec<String>,
}

/// Externally curated sub-scores of a risk group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BaseScores {
    pub audit_score: f64,
    pub code_review_score: f64,
    pub testing_score: f64,
    pub protocol_safety_score: f64,
    pub complexity_score: f64,
    pub team_knowledge_score: f64,
}

impl BaseScores {
    pub fn values(&self) -> [f64; 6] {
        [
            self.audit_score,
            self.code_review_score,
            self.testing_score,
            self.protocol_safety_score,
            self.complexity_score,
            self.team_knowledge_score,
        ]
    }
}

/// Static definition of a risk group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskGroupCriteria {
    pub name: String,
    /// Chain the group applies to.
    #[serde(default = "default_network")]
    pub network: ChainId,
    #[serde(default)]
    pub criteria: PatternCriteria,
    #[serde(flatten)]
    pub scores: BaseScores,
}

fn default_network() -> ChainId {
    DEFAULT_CHAIN_ID
}

/// A scored group of strategies, rebuilt on every aggregation pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskGroup {
    pub name: String,
    pub network: ChainId,
    pub strategies: Vec<Strategy>,
    /// Sum of member debt, in USD.
    pub tvl: f64,
    pub strategies_count: usize,
    /// Earliest known member activation; 0 when no member has one.
    pub oldest_activation: u64,
    #[serde(flatten)]
    pub scores: BaseScores,
    /// `None` for groups without members.
    pub longevity_score: Option<f64>,
    pub median_score: f64,
    pub tvl_impact: u32,
    pub impact_score: f64,
    /// Share of the grand total TVL, in percent.
    pub total_debt_ratio: f64,
    pub url_params: String,
}

impl RiskGroup {
    /// Empty group for a criteria entry.
    pub fn empty(criteria: &RiskGroupCriteria) -> Self {
        Self {
            name: criteria.name.clone(),
            network: criteria.network,
            strategies: Vec::new(),
            tvl: 0.0,
            strategies_count: 0,
            oldest_activation: 0,
            scores: criteria.scores,
            longevity_score: None,
            median_score: 0.0,
            tvl_impact: 0,
            impact_score: 0.0,
            total_debt_ratio: 0.0,
            url_params: String::new(),
        }
    }

    /// Add a member strategy and update the aggregates.
    pub fn add_member(&mut self, strategy: &Strategy) {
        self.tvl += strategy.total_debt_usd;
        self.strategies_count += 1;
        // Activation 0 means unknown and never counts as the oldest.
        if strategy.activation != 0
            && (self.oldest_activation == 0 || self.oldest_activation > strategy.activation)
        {
            self.oldest_activation = strategy.activation;
        }
        self.strategies.push(strategy.clone());
    }
}

impl fmt::Display for RiskGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} strategies, impact {:.2})",
            self.name, self.strategies_count, self.impact_score
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strategy(name: &str, debt: f64, activation: u64) -> Strategy {
        Strategy {
            address: format!("0x{:0>40}", name.len()),
            name: name.to_string(),
            description: String::new(),
            activation,
            total_debt_usd: debt,
            index: 0,
            vault: String::new(),
        }
    }

    #[test]
    fn test_effective_chain() {
        assert_eq!(effective_chain(0), 1);
        assert_eq!(effective_chain(250), 250);
    }

    #[test]
    fn test_render_description() {
        let mut s = strategy("Lender", 0.0, 0);
        s.description = "Lends {{token}} and compounds {{token}} rewards".to_string();
        assert_eq!(
            s.render_description("DAI"),
            "Lends DAI and compounds DAI rewards"
        );
    }

    #[test]
    fn test_queue_sentinel() {
        let mut s = strategy("Idle", 0.0, 0);
        assert!(s.is_in_queue());
        s.index = NOT_IN_QUEUE;
        assert!(!s.is_in_queue());
    }

    #[test]
    fn test_vault_allocation() {
        let vault = Vault {
            address: "0x01".to_string(),
            name: "DAI yVault".to_string(),
            symbol: "yvDAI".to_string(),
            decimals: 18,
            balance_tokens: U256::from(1_000u64) * U256::from(10u64).pow(U256::from(18u64)),
            token_price_usd: 1.0,
            strategies: vec![strategy("A", 600.0, 0), strategy("B", 300.0, 0)],
            alerts: None,
            explorer: None,
        };
        assert!((vault.total_assets_usd() - 1_000.0).abs() < 1e-6);
        assert!((vault.allocated_usd() - 900.0).abs() < 1e-9);
        assert!((vault.not_allocated_usd() - 100.0).abs() < 1e-6);
        assert_eq!(vault.alert_count(), 0);
    }

    #[test]
    fn test_add_member_tracks_oldest() {
        let criteria = RiskGroupCriteria {
            name: "Curve".to_string(),
            network: 1,
            criteria: PatternCriteria::default(),
            scores: BaseScores::default(),
        };
        let mut group = RiskGroup::empty(&criteria);
        group.add_member(&strategy("A", 10.0, 1_600_000_000));
        group.add_member(&strategy("B", 5.0, 1_500_000_000));
        group.add_member(&strategy("C", 1.0, 1_700_000_000));
        assert_eq!(group.strategies_count, 3);
        assert_eq!(group.oldest_activation, 1_500_000_000);
        assert!((group.tvl - 16.0).abs() < 1e-9);
    }

    #[test]
    fn test_network_health_defaults() {
        let network: NetworkHealth = serde_json::from_str("{}").unwrap();
        assert!(network.is_healthy());
        assert_eq!(network.block_number, 0);

        let network: NetworkHealth = serde_json::from_str(
            r#"{"status":{"rpc":1,"graph":0,"yearnApi":1,"yearnMeta":1},
                "blockNumber":120,"graphBlockNumber":100,"hasGraphIndexingErrors":false}"#,
        )
        .unwrap();
        assert!(!network.is_healthy());
        assert_eq!(network.index_lag(), 20);
    }

    #[test]
    fn test_criteria_accepts_name_like() {
        let criteria: RiskGroupCriteria = serde_json::from_str(
            r#"{"name":"Curve","network":1,
                "criteria":{"nameLike":["curve"],"exclude":["convex"]},
                "auditScore":1,"codeReviewScore":2,"testingScore":3,
                "protocolSafetyScore":4,"complexityScore":5,"teamKnowledgeScore":1}"#,
        )
        .unwrap();
        assert_eq!(criteria.criteria.include, vec!["curve"]);
        assert_eq!(criteria.criteria.exclude, vec!["convex"]);
        assert_eq!(criteria.scores.values(), [1.0, 2.0, 3.0, 4.0, 5.0, 1.0]);
    }
}
