use anyhow::{Context, Result as AnyhowResult};
use clap::Parser;
use explorer::config::ExplorerConfig;
use explorer::services::cloud::{Catalog, CatalogClient, CatalogLatency};
use explorer::services::contributors::ContributorRegistry;
use explorer::services::tracing_setup;
use explorer::view::explorer_tree::{ExplorerTree, ExplorerView};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Browse a cloud resource catalog as an explorer tree
#[derive(Parser, Debug)]
#[command(name = "cloud-explorer")]
#[command(about = "Print the explorer tree for a cloud resource catalog", long_about = None)]
#[command(version)]
struct Args {
    /// Catalog of resources to browse (JSON)
    #[arg(value_name = "CATALOG")]
    catalog: PathBuf,

    /// Path to configuration file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Path to log file for diagnostics (default: stderr)
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Expand the tree down to this depth before printing
    #[arg(long, default_value_t = 2)]
    depth: usize,

    /// Artificial latency for every listing call, in milliseconds
    #[arg(long, value_name = "MS", default_value_t = 0)]
    latency_ms: u64,

    /// Print the action commands available for each action set and exit
    #[arg(long)]
    list_actions: bool,

    /// Print the effective configuration as JSON and exit
    #[arg(long)]
    dump_config: bool,
}

fn load_config(args: &Args) -> AnyhowResult<ExplorerConfig> {
    let config = match &args.config {
        Some(path) => ExplorerConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => ExplorerConfig::default(),
    };
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn main() -> AnyhowResult<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    if args.dump_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    tracing_setup::init_global(&config.log_level, args.log_file.as_deref())
        .context("Failed to initialize logging")?;

    let catalog = Catalog::load_from_file(&args.catalog)?;
    let latency = CatalogLatency::uniform(Duration::from_millis(args.latency_ms));
    let client = Arc::new(CatalogClient::with_latency(catalog, latency));
    let contributors = ContributorRegistry::with_defaults(client.clone());

    if args.list_actions {
        print_actions(&contributors.action_registry());
        return Ok(());
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    runtime.block_on(async {
        let (tree, events) = ExplorerTree::from_config(tokio::runtime::Handle::current(), &config);
        contributors.build_roots(&tree);

        let mut view = ExplorerView::new(tree, Some(events));
        view.expand_on_startup(config.expand_roots, args.depth).await;

        print!("{view}");

        let metrics = client.metrics().await;
        tracing::info!(
            "{} listing calls, {:?} simulated latency",
            metrics.total_calls(),
            metrics.total_delay_time
        );
    });

    Ok(())
}

fn print_actions(actions: &explorer::services::actions::ActionRegistry) {
    for set in actions.set_ids() {
        println!("{set}");
        for action in actions.actions(&set) {
            println!("  {} ({})", action.title, action.id);
        }
    }
}
