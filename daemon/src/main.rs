//! Agora daemon: entry point for running the platform's background work and
//! inspecting its state.

use std::path::PathBuf;
use std::sync::Arc;

use agora_node::{Platform, PlatformConfig, ShutdownController};
use agora_types::{CityId, ModuleId, UserId};
use agora_utils::{format_duration, init_logging, LogFormat};
use anyhow::Context;
use clap::Parser;

#[derive(Parser)]
#[command(name = "agora-daemon", about = "Agora review platform daemon")]
struct Cli {
    /// Path to a TOML configuration file. File settings are the base;
    /// CLI flags and env vars override them.
    #[arg(long, env = "AGORA_CONFIG")]
    config: Option<PathBuf>,

    /// Data directory for the LMDB store.
    #[arg(long, env = "AGORA_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level, e.g. "info" or "debug,agora_review=trace".
    #[arg(long, env = "AGORA_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format: "human" or "json".
    #[arg(long, env = "AGORA_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    /// Seconds between posting scheduler passes.
    #[arg(long, env = "AGORA_SCHEDULER_TICK_SECS")]
    scheduler_tick_secs: Option<u64>,

    /// Collect Prometheus metrics.
    #[arg(long, env = "AGORA_ENABLE_METRICS")]
    metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Run the posting scheduler until SIGINT/SIGTERM.
    Run,
    /// Show the quorum of a (city, module) reviewer pool.
    Quorum {
        #[arg(long)]
        city: String,
        #[arg(long)]
        module: String,
    },
    /// Show a user's posted balance.
    Balance {
        #[arg(long)]
        user: String,
    },
    /// Show a user's ledger, newest first.
    Ledger {
        #[arg(long)]
        user: String,
    },
    /// Show the most recent moderation decisions.
    ModerationLog {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Post a user's pending entries if the daily cutover has passed.
    Post {
        #[arg(long)]
        user: String,
    },
}

fn load_config(cli: &Cli) -> anyhow::Result<PlatformConfig> {
    let mut config = match &cli.config {
        Some(path) => PlatformConfig::from_toml_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => PlatformConfig::default(),
    };
    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.clone();
    }
    if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }
    if let Some(format) = cli.log_format {
        config.log_format = format;
    }
    if let Some(secs) = cli.scheduler_tick_secs {
        config.scheduler_tick_secs = secs;
    }
    config.enable_metrics |= cli.metrics;
    config.validate()?;
    Ok(config)
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    init_logging(config.log_format, &config.log_level);

    let platform = Arc::new(Platform::open(&config).context("opening platform")?);

    match cli.command {
        Command::Run => {
            let tick = config.scheduler_tick();
            tracing::info!(
                data_dir = %config.data_dir.display(),
                tick = %format_duration(tick.as_secs()),
                escrow_modules = config.escrow_modules.len(),
                "starting Agora daemon"
            );

            let resumed = platform.resume_trust_followups()?;
            if resumed.outstanding > 0 {
                tracing::warn!(outstanding = resumed.outstanding, "trust followups still pending");
            }

            let shutdown = ShutdownController::new();
            let rx = shutdown.subscribe();
            let worker = Arc::clone(&platform);
            let scheduler = tokio::spawn(async move { worker.run_scheduler(tick, rx).await });

            shutdown.wait_for_signal().await;
            scheduler.await.context("posting scheduler task")?;

            if let Some(metrics) = platform.metrics() {
                tracing::info!(metrics = %metrics.encode()?, "final metrics");
            }
            tracing::info!("Agora daemon exited cleanly");
        }
        Command::Quorum { city, module } => {
            let info = platform.quorum_info(&CityId::new(city), &ModuleId::new(module))?;
            print_json(&info)?;
        }
        Command::Balance { user } => {
            let user = UserId::new(user);
            println!("{user}: {}", platform.balance(&user)?);
        }
        Command::Ledger { user } => {
            print_json(&platform.ledger(&UserId::new(user))?)?;
        }
        Command::ModerationLog { limit } => {
            print_json(&platform.moderation_log(limit)?)?;
        }
        Command::Post { user } => {
            let user = UserId::new(user);
            let posted = platform.post_due(&user)?;
            println!("{user}: posted {posted} entries");
        }
    }

    Ok(())
}
