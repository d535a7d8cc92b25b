//! Markdown and JSON report generation.
//!
//! This module renders the four CLI views (vault list, vault detail, risk
//! groups, network health) from a committed snapshot.

use crate::filter::SearchSummary;
use crate::models::{ChainId, NetworkHealth, RiskGroup, SourceStatus, Vault};
use crate::risk::{RiskMatrix, MATRIX_SIZE};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;

/// Context shown at the top of every report.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportMetadata {
    pub chain_id: ChainId,
    /// Adapter that produced the data, or "offline".
    pub source: String,
    pub generated_at: DateTime<Utc>,
    /// Snapshot time in milliseconds since the epoch.
    pub last_update: i64,
    /// True when the fetch failed and the persisted snapshot is shown.
    pub stale: bool,
}

/// View-specific content.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "view", rename_all = "lowercase")]
pub enum ReportBody<'a> {
    Vaults {
        query: String,
        summary: SearchSummary,
        vaults: Vec<&'a Vault>,
    },
    Vault {
        vault: &'a Vault,
    },
    Risk {
        groups: Vec<RiskGroup>,
        matrix: RiskMatrix,
    },
    Network {
        network: &'a NetworkHealth,
    },
}

/// A rendered view plus its metadata.
#[derive(Debug, Clone, Serialize)]
pub struct Report<'a> {
    pub metadata: ReportMetadata,
    #[serde(flatten)]
    pub body: ReportBody<'a>,
}

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &Report) -> String {
    let mut output = String::new();

    output.push_str("# vaultwatch Report\n\n");
    output.push_str(&generate_metadata_section(&report.metadata));

    match &report.body {
        ReportBody::Vaults {
            query,
            summary,
            vaults,
        } => output.push_str(&generate_vaults_section(query, summary, vaults)),
        ReportBody::Vault { vault } => output.push_str(&generate_vault_section(vault)),
        ReportBody::Risk { groups, matrix } => {
            output.push_str(&generate_risk_section(groups));
            output.push_str(&generate_matrix_section(matrix));
        }
        ReportBody::Network { network } => output.push_str(&generate_network_section(network)),
    }

    output.push_str("---\n\n");
    output.push_str(&format!("*Generated by vaultwatch v{}*\n", env!("CARGO_PKG_VERSION")));

    output
}

/// Generate a JSON report.
pub fn generate_json_report(report: &Report) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}

/// Write rendered content to a file.
pub fn write_report(content: &str, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write report to {}", path.display()))
}

fn generate_metadata_section(metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str(&format!("- **Chain:** {}\n", metadata.chain_id));
    section.push_str(&format!("- **Source:** {}\n", metadata.source));
    section.push_str(&format!(
        "- **Data as of:** {}\n",
        format_millis(metadata.last_update)
    ));
    section.push_str(&format!(
        "- **Generated:** {}\n",
        metadata.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    if metadata.stale {
        section.push_str("\n> ⚠️ Refresh failed; showing the last saved snapshot.\n");
    }
    section.push('\n');

    section
}

fn generate_vaults_section(query: &str, summary: &SearchSummary, vaults: &[&Vault]) -> String {
    let mut section = String::new();

    section.push_str("## Vaults\n\n");
    if !query.is_empty() {
        section.push_str(&format!("*Filter:* `{}`\n\n", query));
    }
    section.push_str(&format!(
        "**{}** vaults · **{}** strategies · **{}** not allocated\n\n",
        summary.vaults,
        summary.strategies,
        format_usd(summary.not_allocated)
    ));

    if vaults.is_empty() {
        section.push_str("No vaults match.\n\n");
        return section;
    }

    section.push_str("| Vault | Symbol | Address | Total assets | Strategies | Alerts |\n");
    section.push_str("|:---|:---|:---|---:|:---:|:---:|\n");
    for vault in vaults {
        section.push_str(&format!(
            "| {} | {} | `{}` | {} | {} | {} |\n",
            vault.name,
            vault.symbol,
            vault.address,
            format_usd(vault.total_assets_usd()),
            vault.strategies.len(),
            vault.alert_count()
        ));
    }
    section.push('\n');

    section
}

fn generate_vault_section(vault: &Vault) -> String {
    let mut section = String::new();

    section.push_str(&format!("## {} ({})\n\n", vault.name, vault.symbol));
    match &vault.explorer {
        Some(explorer) => section.push_str(&format!(
            "- **Address:** [{}]({}/address/{})\n",
            vault.address,
            explorer.trim_end_matches('/'),
            vault.address
        )),
        None => section.push_str(&format!("- **Address:** `{}`\n", vault.address)),
    }
    section.push_str(&format!("- **Total assets:** {}\n", format_usd(vault.total_assets_usd())));
    section.push_str(&format!("- **Allocated:** {}\n", format_usd(vault.allocated_usd())));
    section.push_str(&format!(
        "- **Not allocated:** {}\n\n",
        format_usd(vault.not_allocated_usd())
    ));

    if let Some(alerts) = vault.alerts.as_ref().filter(|a| !a.is_empty()) {
        section.push_str("### Alerts\n\n");
        for alert in alerts {
            section.push_str(&format!("- **{}:** {}\n", alert.level, alert.message));
        }
        section.push('\n');
    }

    section.push_str("### Strategies\n\n");
    if vault.strategies.is_empty() {
        section.push_str("This vault has no strategies.\n\n");
        return section;
    }

    section.push_str("| Queue | Strategy | Address | Debt | Activated |\n");
    section.push_str("|:---:|:---|:---|---:|:---|\n");
    for strategy in &vault.strategies {
        let queue = if strategy.is_in_queue() {
            strategy.index.to_string()
        } else {
            "-".to_string()
        };
        section.push_str(&format!(
            "| {} | {} | `{}` | {} | {} |\n",
            queue,
            strategy.name,
            strategy.address,
            format_usd(strategy.total_debt_usd),
            format_seconds(strategy.activation)
        ));
    }
    section.push('\n');

    for strategy in vault.strategies.iter().filter(|s| !s.description.is_empty()) {
        section.push_str(&format!(
            "> **{}**: {}\n\n",
            strategy.name,
            strategy.render_description(&vault.symbol)
        ));
    }

    section
}

fn generate_risk_section(groups: &[RiskGroup]) -> String {
    let mut section = String::new();

    section.push_str("## Risk Groups\n\n");
    if groups.is_empty() {
        section.push_str("No risk groups are configured for this chain.\n\n");
        return section;
    }

    section.push_str("| Group | TVL | Strategies | Share | Longevity | Median | TVL impact | Impact |\n");
    section.push_str("|:---|---:|:---:|---:|:---:|:---:|:---:|:---:|\n");
    for group in groups {
        let longevity = group
            .longevity_score
            .map_or_else(|| "-".to_string(), |score| format!("{:.0}", score));
        section.push_str(&format!(
            "| {} | {} | {} | {:.2}% | {} | {:.1} | {} | {:.1} |\n",
            group.name,
            format_usd(group.tvl),
            group.strategies_count,
            group.total_debt_ratio,
            longevity,
            group.median_score,
            group.tvl_impact,
            group.impact_score
        ));
    }
    section.push('\n');

    section
}

fn generate_matrix_section(matrix: &RiskMatrix) -> String {
    let mut section = String::new();

    section.push_str("### Risk Matrix\n\n");
    section.push_str("Rows are TVL impact, columns are the rounded median score.\n\n");

    section.push_str("| Impact |");
    for likelihood in 0..MATRIX_SIZE {
        section.push_str(&format!(" {} |", likelihood));
    }
    section.push_str("\n|:---:|");
    section.push_str(&":---:|".repeat(MATRIX_SIZE));
    section.push('\n');

    for impact in (0..MATRIX_SIZE).rev() {
        section.push_str(&format!("| **{}** |", impact));
        for likelihood in 0..MATRIX_SIZE {
            match matrix.count(impact, likelihood) {
                0 => section.push_str("  |"),
                n => section.push_str(&format!(" {} |", n)),
            }
        }
        section.push('\n');
    }
    section.push('\n');

    section
}

fn generate_network_section(network: &NetworkHealth) -> String {
    let mut section = String::new();

    section.push_str("## Network\n\n");
    section.push_str(if network.is_healthy() {
        "**Overall:** ✅ healthy\n\n"
    } else {
        "**Overall:** ⚠️ degraded\n\n"
    });
    section.push_str("| Source | Status |\n");
    section.push_str("|:---|:---:|\n");
    for (name, status) in [
        ("RPC", network.status.rpc),
        ("Subgraph", network.status.graph),
        ("Aggregation API", network.status.api),
        ("Strategy metadata", network.status.meta),
    ] {
        section.push_str(&format!("| {} | {} |\n", name, status_badge(status)));
    }
    section.push('\n');

    section.push_str(&format!("- **Chain block:** {}\n", network.block_number));
    section.push_str(&format!("- **Subgraph block:** {}\n", network.graph_block_number));
    section.push_str(&format!("- **Indexing lag:** {} blocks\n", network.index_lag()));
    if network.has_graph_indexing_errors {
        section.push_str("- **Indexing errors:** ❌ the subgraph reports indexing errors\n");
    }
    section.push('\n');

    section
}

fn status_badge(status: u8) -> &'static str {
    if status == SourceStatus::HEALTHY {
        "✅ up"
    } else {
        "❌ down"
    }
}

/// Format a USD amount with thousands separators.
pub fn format_usd(amount: f64) -> String {
    let sign = if amount < 0.0 { "-" } else { "" };
    let fixed = format!("{:.2}", amount.abs());
    let (whole, cents) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    format!("{}${}.{}", sign, grouped, cents)
}

fn format_millis(millis: i64) -> String {
    match DateTime::from_timestamp_millis(millis) {
        Some(time) if millis > 0 => time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        _ => "never".to_string(),
    }
}

fn format_seconds(seconds: u64) -> String {
    match DateTime::from_timestamp(seconds as i64, 0) {
        Some(time) if seconds > 0 => time.format("%Y-%m-%d").to_string(),
        _ => "-".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Alert, BaseScores, Strategy, NOT_IN_QUEUE};
    use alloy_primitives::U256;

    fn metadata() -> ReportMetadata {
        ReportMetadata {
            chain_id: 1,
            source: "remote".to_string(),
            generated_at: Utc::now(),
            last_update: 1_650_000_000_000,
            stale: false,
        }
    }

    fn vault() -> Vault {
        Vault {
            address: "0xVault".to_string(),
            name: "DAI yVault".to_string(),
            symbol: "yvDAI".to_string(),
            decimals: 18,
            balance_tokens: U256::from(1_500_000_000_000_000_000_000u128),
            token_price_usd: 1.0,
            strategies: vec![
                Strategy {
                    address: "0xS1".to_string(),
                    name: "Curve Compounder".to_string(),
                    description: "Lends {{token}} on Curve".to_string(),
                    activation: 1_600_000_000,
                    total_debt_usd: 1_000.0,
                    index: 0,
                    vault: "0xVault".to_string(),
                },
                Strategy {
                    address: "0xS2".to_string(),
                    name: "Retired".to_string(),
                    description: String::new(),
                    activation: 0,
                    total_debt_usd: 0.0,
                    index: NOT_IN_QUEUE,
                    vault: "0xVault".to_string(),
                },
            ],
            alerts: Some(vec![Alert {
                level: "warning".to_string(),
                message: "Debt ratio above limit".to_string(),
            }]),
            explorer: Some("https://etherscan.io/".to_string()),
        }
    }

    #[test]
    fn test_format_usd() {
        assert_eq!(format_usd(0.0), "$0.00");
        assert_eq!(format_usd(999.5), "$999.50");
        assert_eq!(format_usd(1_234_567.891), "$1,234,567.89");
        assert_eq!(format_usd(-1_000.0), "-$1,000.00");
    }

    #[test]
    fn test_vaults_report() {
        let vault = vault();
        let report = Report {
            metadata: metadata(),
            body: ReportBody::Vaults {
                query: "curve".to_string(),
                summary: SearchSummary {
                    vaults: 1,
                    strategies: 1,
                    not_allocated: 500.0,
                },
                vaults: vec![&vault],
            },
        };
        let markdown = generate_markdown_report(&report);

        assert!(markdown.contains("# vaultwatch Report"));
        assert!(markdown.contains("2022-04-15"));
        assert!(markdown.contains("`curve`"));
        assert!(markdown.contains("**$500.00** not allocated"));
        assert!(markdown.contains("| DAI yVault | yvDAI | `0xVault` | $1,500.00 | 2 | 1 |"));
    }

    #[test]
    fn test_vault_detail_report() {
        let vault = vault();
        let report = Report {
            metadata: ReportMetadata {
                stale: true,
                ..metadata()
            },
            body: ReportBody::Vault { vault: &vault },
        };
        let markdown = generate_markdown_report(&report);

        assert!(markdown.contains("last saved snapshot"));
        assert!(markdown.contains("[0xVault](https://etherscan.io/address/0xVault)"));
        assert!(markdown.contains("**Not allocated:** $500.00"));
        assert!(markdown.contains("Debt ratio above limit"));
        assert!(markdown.contains("| 0 | Curve Compounder | `0xS1` | $1,000.00 | 2020-09-13 |"));
        assert!(markdown.contains("| - | Retired | `0xS2` | $0.00 | - |"));
        assert!(markdown.contains("Lends yvDAI on Curve"));
    }

    #[test]
    fn test_risk_report() {
        let mut group = RiskGroup::empty(&crate::models::RiskGroupCriteria {
            name: "Curve".to_string(),
            network: 1,
            criteria: Default::default(),
            scores: BaseScores::default(),
        });
        group.tvl = 2_000_000.0;
        group.tvl_impact = 2;
        group.median_score = 3.0;
        group.total_debt_ratio = 100.0;

        let mut matrix = RiskMatrix::default();
        matrix.cells[2][3] = 1;
        let report = Report {
            metadata: metadata(),
            body: ReportBody::Risk {
                groups: vec![group],
                matrix,
            },
        };
        let markdown = generate_markdown_report(&report);

        assert!(markdown.contains("| Curve | $2,000,000.00 | 0 | 100.00% | - | 3.0 | 2 | 0.0 |"));
        assert!(markdown.contains("| **2** |  |  |  | 1 |  |  |"));
    }

    #[test]
    fn test_network_report() {
        let network = NetworkHealth {
            status: SourceStatus {
                rpc: SourceStatus::DOWN,
                ..SourceStatus::default()
            },
            block_number: 110,
            graph_block_number: 100,
            has_graph_indexing_errors: true,
        };
        let report = Report {
            metadata: metadata(),
            body: ReportBody::Network { network: &network },
        };
        let markdown = generate_markdown_report(&report);

        assert!(markdown.contains("**Overall:** ⚠️ degraded"));
        assert!(markdown.contains("| RPC | ❌ down |"));
        assert!(markdown.contains("| Subgraph | ✅ up |"));
        assert!(markdown.contains("**Indexing lag:** 10 blocks"));
        assert!(markdown.contains("indexing errors"));
    }

    #[test]
    fn test_generate_json_report() {
        let network = NetworkHealth::default();
        let report = Report {
            metadata: metadata(),
            body: ReportBody::Network { network: &network },
        };
        let json = generate_json_report(&report).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["view"], "network");
        assert_eq!(value["metadata"]["chainId"], 1);
        assert_eq!(value["network"]["status"]["yearnApi"], 1);
    }
}
