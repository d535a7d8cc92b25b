//! vaultwatch - vault, strategy and risk-group monitor
//!
//! A CLI tool that fetches the vault list of a chain from the aggregation
//! API (or directly from RPC, subgraph and metadata providers), keeps the
//! last good snapshot on disk, and renders reports from it.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (configuration, fetch with no saved snapshot, etc.)
//!   2 - Refresh failed; the report was rendered from the saved snapshot

use anyhow::{Context, Result};
use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;
use vaultwatch::cli::{Args, OutputFormat, ViewArg};
use vaultwatch::config::{Config, DEFAULT_CONFIG_FILE};
use vaultwatch::models::{effective_chain, ChainId, Snapshot};
use vaultwatch::report::{self, Report, ReportBody, ReportMetadata};
use vaultwatch::storage::{JsonFileStore, KeyValueStore, MemoryStore};
use vaultwatch::sync::{wait_idle, WatchController};
use vaultwatch::{filter, risk, source};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    init_logging(&args);

    info!("vaultwatch v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    match run(args).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Run failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .vaultwatch.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(DEFAULT_CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            DEFAULT_CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", DEFAULT_CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", DEFAULT_CONFIG_FILE);
    println!("   Edit it to set per-chain RPC and subgraph endpoints, risk groups and scoring tiers.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Fetch (unless offline), then render the requested view. Returns the exit code.
async fn run(args: Args) -> Result<i32> {
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);
    config
        .scoring
        .validate()
        .context("Invalid [scoring] configuration")?;

    let chain_id = effective_chain(config.general.chain_id);
    let store: Arc<dyn KeyValueStore> = if config.storage.state_file.as_os_str().is_empty() {
        debug!("No state file configured; snapshot will not be saved");
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(JsonFileStore::new(config.storage.state_file_for(chain_id)))
    };
    let source = source::build_source(&config.sources).context("Failed to set up data source")?;
    let controller = WatchController::new(source.clone(), store, chain_id);

    let mut stale = false;
    let source_name = if args.offline {
        info!("Offline mode: using the saved snapshot for chain {}", chain_id);
        "offline"
    } else {
        stale = !refresh(&controller, &args, chain_id).await?;
        source.kind()
    };

    let snapshot = controller.current_snapshot();
    if snapshot.is_empty() {
        warn!("Snapshot for chain {} has no vaults", chain_id);
    }

    let metadata = ReportMetadata {
        chain_id,
        source: source_name.to_string(),
        generated_at: Utc::now(),
        last_update: snapshot.last_update,
        stale,
    };
    let output = render(&args, &config, &snapshot, metadata)?;

    match args.output {
        Some(ref path) => {
            report::write_report(&output, path)?;
            if !args.quiet {
                println!("✅ Report saved to: {}", path.display());
            }
        }
        None => println!("{}", output),
    }

    Ok(if stale { 2 } else { 0 })
}

/// Run one refresh with a spinner. Returns false when the saved snapshot is used instead.
async fn refresh(controller: &WatchController, args: &Args, chain_id: ChainId) -> Result<bool> {
    let handle = if args.refresh {
        controller.update()
    } else {
        controller.start(chain_id)
    };

    let spinner = if args.quiet {
        None
    } else {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(format!("Fetching vaults for chain {}...", chain_id));
        pb.enable_steady_tick(Duration::from_millis(100));
        Some(pb)
    };

    let result = wait_idle(handle).await;
    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }

    match result {
        Ok(outcome) => {
            debug!("Refresh outcome: {:?}", outcome);
            Ok(true)
        }
        Err(e) if !controller.current_snapshot().is_empty() => {
            warn!("Refresh failed, falling back to saved snapshot: {}", e);
            eprintln!("⚠️  Refresh failed ({}); showing the last saved snapshot.", e);
            Ok(false)
        }
        Err(e) => Err(e).context("Failed to fetch vaults and no saved snapshot exists"),
    }
}

/// Build the report for the requested view and serialize it.
fn render(args: &Args, config: &Config, snapshot: &Snapshot, metadata: ReportMetadata) -> Result<String> {
    let query = args.search.clone().unwrap_or_default();

    let body = match args.view {
        ViewArg::Vaults => {
            let vaults = filter::filter_vaults(&snapshot.vaults, &query, args.only_alerts);
            let summary = filter::search_summary(&vaults, args.only_in_queue);
            ReportBody::Vaults {
                query,
                summary,
                vaults,
            }
        }
        ViewArg::Vault => {
            let address = args.vault.as_deref().unwrap_or_default();
            let vault = filter::find_vault(&snapshot.vaults, address)
                .with_context(|| format!("Vault {} not found on chain {}", address, metadata.chain_id))?;
            ReportBody::Vault { vault }
        }
        ViewArg::Risk => {
            let criteria = risk::resolve_criteria(&config.risk)?;
            let mut groups = risk::compute_risk_groups(
                snapshot,
                metadata.chain_id,
                &criteria,
                &config.scoring,
                Utc::now().timestamp(),
            );
            if !query.is_empty() {
                groups.retain(|group| {
                    group
                        .strategies
                        .iter()
                        .any(|strategy| filter::contains_ci(&strategy.name, &query))
                });
            }
            risk::sort_groups(&mut groups, args.sort.into(), args.descending());
            for group in &groups {
                debug!("Risk group {}", group);
            }
            let matrix = risk::risk_matrix(&groups);
            ReportBody::Risk { groups, matrix }
        }
        ViewArg::Network => ReportBody::Network {
            network: &snapshot.network,
        },
    };

    let report = Report { metadata, body };
    match config.general.format {
        OutputFormat::Json => report::generate_json_report(&report),
        OutputFormat::Markdown => Ok(report::generate_markdown_report(&report)),
    }
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from {}", DEFAULT_CONFIG_FILE);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {}", e);
            Ok(Config::default())
        }
    }
}
