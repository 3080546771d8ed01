// Quarry control CLI
// Run tasks against the simulated world and manage saved models

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use quarry_rl_core::DomainKind;
use quarry_task::telemetry::init_logging;
use quarry_task::EngineConfig;

mod commands;

#[derive(Parser)]
#[command(name = "quarryctl")]
#[command(about = "Quarry task and model control", version)]
struct Cli {
    /// Engine configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the storage root directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one task in a simulated world
    Run {
        #[command(subcommand)]
        task: RunTask,

        /// Seed for the world and the agent
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Probability that any action fails transiently
        #[arg(long, default_value = "0.0")]
        failure_rate: f64,

        /// Progress polling interval in milliseconds
        #[arg(long, default_value = "500")]
        watch_ms: u64,
    },

    /// List saved model versions
    Versions {
        /// Domain whose model to list
        #[arg(value_enum)]
        domain: DomainArg,
    },

    /// Make an earlier model version current again
    Rollback {
        /// Domain whose model to roll back
        #[arg(value_enum)]
        domain: DomainArg,

        /// Version to restore
        version: u32,
    },

    /// Show the last persisted progress of a task
    Progress {
        /// Task ID
        task_id: uuid::Uuid,
    },

    /// Print the effective configuration
    Config,
}

#[derive(Subcommand)]
enum RunTask {
    /// Collect blocks
    Mining {
        #[arg(long, default_value = "iron_ore")]
        block: String,
        #[arg(short, long, default_value = "5")]
        quantity: u32,
        #[arg(short, long, default_value = "8")]
        radius: u32,
        /// Ores placed in the world
        #[arg(long, default_value = "12")]
        ores: usize,
    },
    /// Harvest and replant crops
    Farming {
        #[arg(long, default_value = "wheat")]
        crop: String,
        #[arg(short, long, default_value = "6")]
        quantity: u32,
        #[arg(short, long, default_value = "4")]
        radius: u32,
    },
    /// Build a circuit with the given output strength
    Redstone {
        #[arg(short, long, default_value = "12")]
        signal: u8,
        #[arg(long, default_value = "8")]
        components: u32,
    },
    /// Walk to a destination
    Navigation {
        #[arg(allow_hyphen_values = true)]
        x: i32,
        #[arg(allow_hyphen_values = true)]
        y: i32,
        #[arg(allow_hyphen_values = true)]
        z: i32,
        #[arg(long, default_value = "64")]
        max_distance: u32,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum DomainArg {
    Mining,
    Farming,
    Redstone,
    Navigation,
}

impl From<DomainArg> for DomainKind {
    fn from(arg: DomainArg) -> Self {
        match arg {
            DomainArg::Mining => DomainKind::Mining,
            DomainArg::Farming => DomainKind::Farming,
            DomainArg::Redstone => DomainKind::Redstone,
            DomainArg::Navigation => DomainKind::Navigation,
        }
    }
}

fn load_config(cli: &Cli) -> Result<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if let Some(dir) = &cli.data_dir {
        config.storage.root = dir.clone();
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log);
    let config = load_config(&cli)?;

    match cli.command {
        Commands::Run {
            task,
            seed,
            failure_rate,
            watch_ms,
        } => commands::run(config, task, seed, failure_rate, watch_ms).await,
        Commands::Versions { domain } => commands::versions(&config, domain.into()).await,
        Commands::Rollback { domain, version } => {
            commands::rollback(config, domain.into(), version).await
        }
        Commands::Progress { task_id } => commands::progress(&config, task_id).await,
        Commands::Config => {
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}
