use anyhow::Result;
use clap::{Parser, Subcommand};
use cli::{report, shutdown};
use syncagent_core::agent;
use syncagent_core::config::{self, AppConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut cfg = config::load(cli.config.as_deref())?;
    if cli.dry_run {
        cfg.dry_run = true;
    }

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_agent(cfg).await,
        Commands::Scan { json } => run_scan(cfg, json).await,
        Commands::Ledger { json } => run_ledger(cfg, json).await,
    }
}

#[derive(Parser)]
#[command(name = "syncagent")]
#[command(about = "Uploads new and changed documents from local folders", long_about = None)]
struct Cli {
    /// Path to config file (json/toml/yaml); defaults to ./config.*
    #[arg(short, long)]
    config: Option<String>,

    /// Log uploads instead of sending them
    #[arg(long, default_value_t = false)]
    dry_run: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan on a fixed interval until interrupted (default)
    Run,
    /// Run a single scan pass and exit
    Scan {
        /// Output JSON summary
        #[arg(long)]
        json: bool,
    },
    /// List every uploaded path recorded in the ledger
    Ledger {
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
}

async fn run_agent(cfg: AppConfig) -> Result<()> {
    let orchestrator = agent::build_orchestrator(&cfg).await?;
    let shutdown = shutdown::install();
    info!(
        mappings = cfg.workspace_mapping.len(),
        "document watcher running, changes are processed every {}s",
        cfg.scan.interval_secs
    );
    agent::run(orchestrator, cfg.scan.interval(), shutdown).await;
    Ok(())
}

async fn run_scan(cfg: AppConfig, json: bool) -> Result<()> {
    let mut orchestrator = agent::build_orchestrator(&cfg).await?;
    let summary = orchestrator.run_pass().await;
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("{}", report::summary_line(&summary));
        for dup in &summary.duplicates {
            println!("copy detected (not uploaded): {} = {}", dup.path, dup.duplicate_of);
        }
    }
    Ok(())
}

async fn run_ledger(cfg: AppConfig, json: bool) -> Result<()> {
    let ledger = agent::open_ledger(&cfg).await?;
    let rows = report::ledger_rows(&ledger);
    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        for row in &rows {
            let short: String = row.hash.chars().take(12).collect();
            println!("{}  {}  {}", row.modified, short, row.path);
        }
        println!("{} record(s)", rows.len());
    }
    Ok(())
}
