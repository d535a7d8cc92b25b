//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.vaultwatch.toml` files.

use crate::cli::{Args, OutputFormat};
use crate::models::{ChainId, RiskGroupCriteria, DEFAULT_CHAIN_ID};
use crate::risk::ScoringConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Name of the configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = ".vaultwatch.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Data source settings.
    #[serde(default)]
    pub sources: SourcesConfig,

    /// Local state settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Risk group definitions.
    #[serde(default)]
    pub risk: RiskConfig,

    /// Longevity and TVL scoring tables.
    #[serde(default)]
    pub scoring: ScoringConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Chain to watch.
    #[serde(default = "default_chain_id")]
    pub chain_id: ChainId,

    /// Report format.
    #[serde(default)]
    pub format: OutputFormat,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            chain_id: default_chain_id(),
            format: OutputFormat::default(),
        }
    }
}

fn default_chain_id() -> ChainId {
    DEFAULT_CHAIN_ID
}

/// Where vault data comes from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// Use the aggregation API (true) or query providers directly (false).
    #[serde(default = "default_true")]
    pub remote: bool,

    /// Aggregation API base URL.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// JSON-RPC endpoint per chain id.
    #[serde(default)]
    pub rpc: BTreeMap<String, String>,

    /// Subgraph endpoint per chain id.
    #[serde(default)]
    pub subgraph: BTreeMap<String, String>,

    /// Strategy metadata service base URL.
    #[serde(default = "default_meta_url")]
    pub meta_url: String,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            remote: true,
            api_url: default_api_url(),
            timeout_seconds: default_timeout(),
            rpc: BTreeMap::new(),
            subgraph: BTreeMap::new(),
            meta_url: default_meta_url(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_api_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_timeout() -> u64 {
    60
}

fn default_meta_url() -> String {
    "https://meta.yearn.network".to_string()
}

/// Local state settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// JSON file holding the last committed snapshot.
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_file: default_state_file(),
        }
    }
}

impl StorageConfig {
    /// State file for one chain: `state.json` becomes `state.<chain>.json`.
    pub fn state_file_for(&self, chain_id: ChainId) -> PathBuf {
        let stem = self
            .state_file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "state".to_string());
        let name = match self.state_file.extension() {
            Some(ext) => format!("{}.{}.{}", stem, chain_id, ext.to_string_lossy()),
            None => format!("{}.{}", stem, chain_id),
        };
        self.state_file.with_file_name(name)
    }
}

fn default_state_file() -> PathBuf {
    PathBuf::from(".vaultwatch/state.json")
}

/// Risk group definitions, from a JSON file and/or inline tables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RiskConfig {
    /// JSON criteria file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub criteria_file: Option<PathBuf>,

    /// Groups declared inline as `[[risk.groups]]`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<RiskGroupCriteria>,
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(DEFAULT_CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// Only values given on the command line (or through their env vars)
    /// override the file.
    pub fn merge_with_args(&mut self, args: &Args) {
        if let Some(chain_id) = args.chain_id {
            self.general.chain_id = chain_id;
        }
        if let Some(format) = args.format {
            self.general.format = format;
        }

        if let Some(ref api_url) = args.api_url {
            self.sources.api_url = api_url.clone();
        }
        if args.direct {
            self.sources.remote = false;
        } else if args.remote {
            self.sources.remote = true;
        }
        if let Some(timeout) = args.timeout {
            self.sources.timeout_seconds = timeout;
        }

        if let Some(ref state_file) = args.state_file {
            self.storage.state_file = state_file.clone();
        }
        if let Some(ref criteria) = args.criteria {
            self.risk.criteria_file = Some(criteria.clone());
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
