//! Bingohall server binary

use bingohall::{api::ApiServer, config::LedgerBackend, BingoConfig, BingoHall};
use clap::Parser;
use std::{path::PathBuf, sync::Arc};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "bingohall")]
#[command(about = "Real-money 75-ball bingo hall server", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Start from the testing preset (in-memory wallets, short timers)
    #[arg(long)]
    testing: bool,

    /// Override the listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// Override the ledger data directory
    #[arg(short, long)]
    data_dir: Option<String>,

    /// Keep wallets in memory instead of RocksDB
    #[arg(long)]
    memory: bool,

    /// Log filter, e.g. `info` or `bingohall=debug,tower_http=info`
    #[arg(long)]
    log_level: Option<String>,
}

fn init_tracing(default_filter: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => BingoConfig::load(path)?,
        None if cli.testing => BingoConfig::testing(),
        None => BingoConfig::default(),
    };
    if let Some(port) = cli.port {
        config.api.port = port;
    }
    if let Some(dir) = cli.data_dir {
        config.storage.data_directory = dir;
    }
    if cli.memory {
        config.ledger.backend = LedgerBackend::Memory;
    }

    let filter = cli
        .log_level
        .unwrap_or_else(|| format!("bingohall={},tower_http=info", config.monitoring.log_level.as_filter()));
    init_tracing(&filter);

    info!("Starting bingohall {}", env!("CARGO_PKG_VERSION"));
    info!("   Ledger backend: {:?}", config.ledger.backend);
    info!(
        "   Round: {}-{} players, {}s countdown, {}ms draws, {} bps commission",
        config.game.min_players,
        config.game.max_players_per_table,
        config.game.countdown_seconds,
        config.game.draw_interval_ms,
        config.game.commission_bps
    );

    let api_config = config.api.clone();
    let hall = match BingoHall::from_config(config) {
        Ok(hall) => Arc::new(hall),
        Err(e) => {
            error!("Failed to start the hall: {}", e);
            return Err(e.into());
        }
    };

    ApiServer::new(hall, api_config).run().await
}
