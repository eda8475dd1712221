//! Headless player position tracker.
//!
//! Samples who is online from a snapshot file, records stay intervals in
//! SQLite, and reads control commands from stdin:
//!
//! ```bash
//! cargo run -p playertrack -- --config playertrack.json --snapshot players.json -v
//! ```

mod console;

use anyhow::Context;
use clap::Parser;
use playertrack_core::{
    Controller, IntervalStore, MemoryStore, SnapshotFileProvider, SqliteStore, TrackConfig,
    TrackingService,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// Player position tracker
#[derive(Parser)]
#[command(name = "playertrack")]
#[command(version)]
#[command(about = "Records where players stay, and for how long")]
struct Cli {
    /// Config file; written with defaults if missing
    #[arg(long, default_value = "playertrack.json")]
    config: PathBuf,

    /// SQLite database path (overrides the config file)
    #[arg(long)]
    database: Option<PathBuf>,

    /// JSON snapshot of online players, re-read every tick
    #[arg(long, default_value = "players.json")]
    snapshot: PathBuf,

    /// Keep intervals in memory instead of SQLite
    #[arg(long)]
    memory: bool,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let file_config = TrackConfig::load_or_default(&cli.config)
        .await
        .with_context(|| format!("loading config from {}", cli.config.display()))?;

    let mut config = file_config
        .clone()
        .apply_env()
        .context("applying environment overrides")?;
    if let Some(database) = cli.database {
        config = config.with_database(database);
    }

    let store: Arc<dyn IntervalStore> = if cli.memory {
        Arc::new(MemoryStore::new())
    } else {
        let store = SqliteStore::open(&config.database)
            .with_context(|| format!("opening database {}", config.database.display()))?;
        Arc::new(store)
    };
    let provider = Arc::new(SnapshotFileProvider::new(&cli.snapshot));

    let service = TrackingService::start(&config, store, provider)
        .await
        .context("starting tracker")?;
    info!(
        frequency_secs = config.frequency_secs,
        min_distance = config.min_distance,
        snapshot = %cli.snapshot.display(),
        "tracking started"
    );

    // Runtime changes are persisted on top of the file's own values, so
    // environment and command-line overrides never leak into it.
    let controller = Controller::new(service.handle(), file_config).with_config_path(&cli.config);
    console::run(controller, Arc::clone(service.store())).await?;

    let tracker = service.shutdown().await.context("stopping tracker")?;
    println!("Stopped. {} players tracked this session.", tracker.tracked_entities());
    Ok(())
}
