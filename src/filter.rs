//! Free-text search over the vault/strategy hierarchy.
//!
//! Every matcher here is built on [`contains_ci`]; the risk engine uses
//! [`strategy_name_matches`] for its include/exclude patterns.

use crate::models::{Strategy, Vault};
use serde::Serialize;

/// Case-insensitive substring test. An empty query matches everything.
pub fn contains_ci(haystack: &str, query: &str) -> bool {
    query.is_empty() || haystack.to_lowercase().contains(&query.to_lowercase())
}

/// Match a classification pattern against a strategy's name.
pub fn strategy_name_matches(strategy: &Strategy, pattern: &str) -> bool {
    contains_ci(&strategy.name, pattern)
}

/// Match a query against a strategy or its parent vault.
pub fn strategy_matches(vault: &Vault, strategy: &Strategy, query: &str) -> bool {
    [
        strategy.name.as_str(),
        strategy.address.as_str(),
        vault.name.as_str(),
        vault.symbol.as_str(),
        vault.address.as_str(),
    ]
    .iter()
    .any(|field| contains_ci(field, query))
}

/// Match a query against a vault or any of its strategies.
pub fn vault_matches(vault: &Vault, query: &str) -> bool {
    if query.is_empty() {
        return true;
    }
    [vault.name.as_str(), vault.symbol.as_str(), vault.address.as_str()]
        .iter()
        .any(|field| contains_ci(field, query))
        || vault
            .strategies
            .iter()
            .any(|strategy| strategy_matches(vault, strategy, query))
}

/// Keep vaults matching `query`, optionally only those carrying alerts.
pub fn filter_vaults<'a>(vaults: &'a [Vault], query: &str, only_with_alerts: bool) -> Vec<&'a Vault> {
    vaults
        .iter()
        .filter(|vault| !only_with_alerts || vault.alert_count() > 0)
        .filter(|vault| vault_matches(vault, query))
        .collect()
}

/// Find a vault by address, ignoring case.
pub fn find_vault<'a>(vaults: &'a [Vault], address: &str) -> Option<&'a Vault> {
    vaults
        .iter()
        .find(|vault| vault.address.eq_ignore_ascii_case(address))
}

/// Counters shown above a filtered vault list.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchSummary {
    pub vaults: usize,
    pub strategies: usize,
    /// Idle assets across the listed vaults, in USD.
    pub not_allocated: f64,
}

/// Summarize a filtered vault list.
pub fn search_summary(vaults: &[&Vault], only_in_queue: bool) -> SearchSummary {
    SearchSummary {
        vaults: vaults.len(),
        strategies: vaults
            .iter()
            .map(|vault| {
                vault
                    .strategies
                    .iter()
                    .filter(|s| !only_in_queue || s.is_in_queue())
                    .count()
            })
            .sum(),
        not_allocated: vaults.iter().map(|vault| vault.not_allocated_usd()).sum(),
    }
}
