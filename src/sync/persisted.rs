//! Persisted snapshot state.

use crate::codec;
use crate::models::{NetworkHealth, Snapshot};
use crate::storage::{self, KeyValueStore, StoreError};
use serde_json::Value;
use tracing::warn;

pub const VAULTS_KEY: &str = "vaults";
pub const NETWORK_KEY: &str = "networkSync";
pub const LAST_UPDATE_KEY: &str = "vaultsLastUpdate";

/// Read the last committed snapshot, defaulting each missing part.
pub fn load_snapshot(store: &dyn KeyValueStore) -> Snapshot {
    let raw: Value = storage::get(store, VAULTS_KEY, Value::Null);
    let vaults = codec::revive_vaults(raw).unwrap_or_else(|e| {
        warn!("Ignoring unreadable persisted vaults: {}", e);
        Vec::new()
    });

    Snapshot {
        vaults,
        last_update: storage::get(store, LAST_UPDATE_KEY, 0i64),
        network: storage::get(store, NETWORK_KEY, NetworkHealth::default()),
    }
}

/// Write all three keys in one batch.
pub fn save_snapshot(store: &dyn KeyValueStore, snapshot: &Snapshot) -> Result<(), StoreError> {
    store.set_many(vec![
        (VAULTS_KEY.to_string(), serde_json::to_value(&snapshot.vaults)?),
        (NETWORK_KEY.to_string(), serde_json::to_value(&snapshot.network)?),
        (LAST_UPDATE_KEY.to_string(), Value::from(snapshot.last_update)),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Strategy, Vault};
    use crate::storage::{set, MemoryStore};
    use alloy_primitives::U256;
    use serde_json::json;

    #[test]
    fn test_empty_store_gives_empty_snapshot() {
        let snapshot = load_snapshot(&MemoryStore::new());
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.last_update, 0);
        assert_eq!(snapshot.network, NetworkHealth::default());
    }

    #[test]
    fn test_save_then_load() {
        let store = MemoryStore::new();
        let balance = U256::from(1u64) << 70usize;
        let snapshot = Snapshot {
            vaults: vec![Vault {
                address: "0xv".to_string(),
                name: "WETH yVault".to_string(),
                symbol: "yvWETH".to_string(),
                decimals: 18,
                balance_tokens: balance,
                token_price_usd: 1_800.0,
                strategies: vec![Strategy {
                    address: "0xs".to_string(),
                    name: "Lido".to_string(),
                    description: String::new(),
                    activation: 1_600_000_000,
                    total_debt_usd: 10.0,
                    index: 0,
                    vault: "0xv".to_string(),
                }],
                alerts: None,
                explorer: None,
            }],
            last_update: 1_650_000_000_000,
            network: NetworkHealth {
                block_number: 42,
                ..NetworkHealth::default()
            },
        };

        save_snapshot(&store, &snapshot).unwrap();
        // big integers are stored as wire tags
        let stored = store.load(VAULTS_KEY).unwrap().unwrap();
        assert_eq!(stored[0]["balanceTokens"]["type"], "BigNumber");

        assert_eq!(load_snapshot(&store), snapshot);
    }

    #[test]
    fn test_corrupt_vaults_fall_back_to_empty() {
        let store = MemoryStore::new();
        set(&store, VAULTS_KEY, &json!([{"address": "0x1", "balanceTokens": {"type": "BigNumber"}}])).unwrap();
        set(&store, LAST_UPDATE_KEY, &5i64).unwrap();

        let snapshot = load_snapshot(&store);
        assert!(snapshot.vaults.is_empty());
        assert_eq!(snapshot.last_update, 5);
    }
}
