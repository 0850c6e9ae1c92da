use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod audit;
pub mod config;
pub mod status;
pub mod sweep;
pub mod version;

use config::NarthexConfig;
use narthex::store::StoreError;

#[derive(Parser)]
#[command(name = "narthex")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Operator CLI for the Narthex admission gate", long_about = None)]
pub struct Cli {
    /// Path to narthex.toml (generated with defaults if missing)
    #[arg(long, global = true, default_value = "narthex.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Terminalize expired pending challenges
    Sweep {
        /// Keep sweeping on the configured interval instead of exiting
        #[arg(long)]
        watch: bool,
    },

    /// Show a community's config and pending challenges
    Status {
        /// Community id
        #[arg(long)]
        community: u64,
    },

    /// Query the admission audit log
    Audit {
        /// Community id
        #[arg(long)]
        community: u64,

        /// Filter by event kind (e.g. challenge_issued)
        #[arg(long)]
        kind: Option<String>,

        /// Maximum entries to show
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },

    /// Display version information
    Version,
}

/// CLI errors.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub async fn execute(cli: Cli) -> Result<(), CliError> {
    if matches!(cli.command, Commands::Version) {
        version::execute();
        return Ok(());
    }

    let config = NarthexConfig::load_or_default(&cli.config)?;
    init_tracing(&config.logging.filter);

    match cli.command {
        Commands::Sweep { watch } => sweep::execute(&config, watch).await,
        Commands::Status { community } => status::execute(&config, community).await,
        Commands::Audit {
            community,
            kind,
            limit,
        } => audit::execute(&config, community, kind, limit).await,
        Commands::Version => unreachable!("handled above"),
    }
}

fn init_tracing(filter: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter.to_string()));
    // Ignore the error if a subscriber is already set (tests).
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
