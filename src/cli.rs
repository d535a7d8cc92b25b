//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::models::ChainId;
use crate::risk::RiskSortKey;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// vaultwatch - monitor vaults, strategies and strategy-group risk
///
/// Fetches the vault list for a chain, keeps the last good snapshot on
/// disk, and renders vault, risk and network reports.
///
/// Examples:
///   vaultwatch vaults --search curve --only-alerts
///   vaultwatch vault --vault 0xdA816459F1AB5631232FE5e97a05BBBb94970c95
///   vaultwatch risk --sort tvl --format json
///   vaultwatch network --chain-id 250 --direct
///   vaultwatch --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Report to render
    #[arg(value_enum, default_value = "vaults")]
    pub view: ViewArg,

    /// Chain to watch (1 = Ethereum, 250 = Fantom, ...)
    ///
    /// 0 selects the default chain.
    #[arg(long, value_name = "ID", env = "VAULTWATCH_CHAIN_ID")]
    pub chain_id: Option<ChainId>,

    /// Aggregation API base URL
    #[arg(long, value_name = "URL", env = "VAULTWATCH_API_URL")]
    pub api_url: Option<String>,

    /// Query RPC, subgraph and metadata providers directly
    #[arg(long, conflicts_with = "remote")]
    pub direct: bool,

    /// Use the aggregation API
    #[arg(long, conflicts_with = "direct")]
    pub remote: bool,

    /// Ask sources to bypass their caches
    #[arg(long, conflicts_with = "offline")]
    pub refresh: bool,

    /// Render the persisted snapshot without fetching
    #[arg(long)]
    pub offline: bool,

    /// Request timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Free-text filter on vault and strategy names, symbols and addresses
    #[arg(short, long, value_name = "TEXT")]
    pub search: Option<String>,

    /// Only list vaults that carry alerts
    #[arg(long)]
    pub only_alerts: bool,

    /// Only count strategies that sit in a withdrawal queue
    #[arg(long)]
    pub only_in_queue: bool,

    /// Vault address for the `vault` view
    #[arg(long, value_name = "ADDRESS")]
    pub vault: Option<String>,

    /// Sort key for the `risk` view
    #[arg(long, value_enum, default_value = "impact")]
    pub sort: SortArg,

    /// Sort ascending instead of descending
    #[arg(long)]
    pub ascending: bool,

    /// Output format (markdown, json)
    #[arg(long, value_name = "FORMAT")]
    pub format: Option<OutputFormat>,

    /// Write the report to a file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .vaultwatch.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// State file holding the last committed snapshot
    #[arg(long, value_name = "FILE")]
    pub state_file: Option<PathBuf>,

    /// JSON file with risk group definitions
    #[arg(long, value_name = "FILE")]
    pub criteria: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default .vaultwatch.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Report views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ViewArg {
    /// Filtered vault list with a search summary
    Vaults,
    /// One vault and its strategies
    Vault,
    /// Scored strategy groups and the risk matrix
    Risk,
    /// Source health and indexing lag
    Network,
}

/// Risk group sort keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SortArg {
    Name,
    Tvl,
    Impact,
    Median,
}

impl From<SortArg> for RiskSortKey {
    fn from(arg: SortArg) -> Self {
        match arg {
            SortArg::Name => RiskSortKey::Name,
            SortArg::Tvl => RiskSortKey::Tvl,
            SortArg::Impact => RiskSortKey::Impact,
            SortArg::Median => RiskSortKey::Median,
        }
    }
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(ref api_url) = self.api_url {
            if !api_url.starts_with("http://") && !api_url.starts_with("https://") {
                return Err("API URL must start with 'http://' or 'https://'".to_string());
            }
        }

        if let Some(timeout) = self.timeout {
            if timeout == 0 {
                return Err("Timeout must be at least 1 second".to_string());
            }
        }

        if self.view == ViewArg::Vault && self.vault.as_deref().map_or(true, str::is_empty) {
            return Err("The vault view needs --vault <ADDRESS>".to_string());
        }

        if let Some(ref criteria) = self.criteria {
            if !criteria.is_file() {
                return Err(format!("Criteria file does not exist: {}", criteria.display()));
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }

    /// Sort direction for the risk view.
    pub fn descending(&self) -> bool {
        !self.ascending
    }
}
