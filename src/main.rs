use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use m3u_merge::config::{defaults::DEFAULT_CONFIG_FILE, Config};
use m3u_merge::proxy::write_atomic;
use m3u_merge::Aggregator;

#[derive(Parser)]
#[command(name = "m3u-merge")]
#[command(version)]
#[command(about = "Merge IPTV playlists into one ranked, deduplicated M3U")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Log level
    #[arg(short = 'v', long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch, probe, rank and write the merged playlist (default)
    Run(RunArgs),
    /// Write a default configuration file with example sources
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Args, Default)]
struct RunArgs {
    /// Output playlist path (overrides config file)
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Concurrent probe workers
    #[arg(short, long, value_name = "N")]
    workers: Option<usize>,

    /// URLs kept per channel
    #[arg(short = 'k', long, value_name = "K")]
    top_k: Option<usize>,

    /// Print the run report as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_filter = format!("m3u_merge={}", cli.log_level);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Some(Command::InitConfig { force }) => init_config(&cli.config, force).await,
        Some(Command::Run(args)) => run(&cli.config, args).await,
        None => run(&cli.config, RunArgs::default()).await,
    }
}

async fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "{} already exists, pass --force to overwrite it",
            path.display()
        );
    }
    let content = Config::example().to_toml()?;
    write_atomic(path, &content).await?;
    info!("Wrote default configuration to {}", path.display());
    Ok(())
}

async fn run(config_path: &Path, args: RunArgs) -> Result<()> {
    info!("Starting m3u-merge v{}", env!("CARGO_PKG_VERSION"));

    let mut config = Config::load(config_path)?;

    // Override config with CLI arguments
    if let Some(output) = args.output {
        config.output.path = output;
    }
    if let Some(workers) = args.workers {
        config.probe.workers = workers;
    }
    if let Some(top_k) = args.top_k {
        config.ranking.top_k = top_k;
    }

    let aggregator = Aggregator::from_config(config).await?;
    let report = match aggregator.run().await {
        Ok(report) => report,
        Err(e) => {
            error!("Run failed: {}", e);
            return Err(e.into());
        }
    };

    if args.json {
        let json = serde_json::to_string_pretty(&report).context("failed to serialize run report")?;
        println!("{json}");
    } else {
        info!(
            "Wrote {} channels ({} from last known good, {} lost) to {}",
            report.channels_ranked,
            report.fallbacks,
            report.channels_lost.len(),
            report.output_path.display()
        );
    }
    Ok(())
}
