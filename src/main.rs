use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use driveseed::core::counter::read_counter_file;
use driveseed::core::transfer_engine::NativeCopyEngine;
use driveseed::logging::{self, LogConfig};
use driveseed::{adapters, config::AppConfig, context::AppContext, core::Monitor};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Parser)]
#[command(name = "driveseed")]
#[command(about = "Copies a fixed folder onto every newly inserted drive", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML config file (default: driveseed.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[arg(long, global = true)]
    simulation: Option<bool>,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch for drives and copy onto each new one
    Daemon(DaemonArgs),
    /// Show the copy counter
    Status,
    /// Print the effective configuration
    Config,
}

#[derive(Args, Serialize)]
struct DaemonArgs {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    source_directory: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    destination_folder: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    poll_interval_ms: Option<u64>,

    /// Volume to ignore; repeatable. Replaces the configured list.
    #[serde(rename = "excluded_volumes", skip_serializing_if = "Vec::is_empty")]
    #[arg(long = "exclude")]
    exclude: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    counter_file: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    verify_copies: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    verbose: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    json_logs: Option<bool>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.command {
        Commands::Daemon(args) => AppConfig::new(cli.config.as_deref(), Some(args))?,
        _ => AppConfig::new(cli.config.as_deref(), None::<&DaemonArgs>)?,
    };
    if let Some(simulation) = cli.simulation {
        config.simulation = simulation;
    }

    logging::init(LogConfig::from(&config))?;

    match cli.command {
        Commands::Daemon(_) => run_daemon(config).await.context("Daemon stopped with an error")?,
        Commands::Status => run_status(&config).await.context("Failed to read status")?,
        Commands::Config => run_config(&config)?,
    }

    Ok(())
}

async fn run_daemon(config: AppConfig) -> Result<()> {
    let ctx = AppContext::new(config)?;
    let adapter = adapters::get_adapter(ctx.config.simulation, &ctx.config.simulation_root());
    let engine = Arc::new(NativeCopyEngine {
        sync_files: ctx.config.sync_files,
    });

    if ctx.config.simulation {
        info!(root = %ctx.config.simulation_root().display(), "Simulation mode");
    }

    let notifier = ctx.notifier.clone();
    let monitor = Monitor::new(ctx, adapter, engine)?;

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal.cancel();
        }
    });

    let result = monitor.run(shutdown).await;
    notifier.flush().await;
    result
}

async fn run_status(config: &AppConfig) -> Result<()> {
    let counter_path = config.counter_path()?;
    let count = read_counter_file(&counter_path).await;
    let source_state = if config.source_directory.is_dir() {
        "ok"
    } else {
        "missing"
    };

    println!("Copies completed: {}", count);
    println!("Counter file:     {}", counter_path.display());
    println!(
        "Source folder:    {} ({})",
        config.source_directory.display(),
        source_state
    );
    println!("Destination:      <drive>/{}", config.destination_folder);
    Ok(())
}

fn run_config(config: &AppConfig) -> Result<()> {
    let rendered = toml::to_string_pretty(config).context("Failed to serialize config")?;
    print!("{}", rendered);
    Ok(())
}
