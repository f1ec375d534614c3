//! broker CLI: runs the unit watcher for a governed model.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use governor_broker::config::{Config, STORE_FILE};
use governor_broker::juju::JujuClient;
use governor_broker::store::SqliteEventStore;
use governor_broker::telemetry::{TelemetryConfig, init_telemetry};
use governor_broker::watcher::{UnitWatcher, WatcherConfig};
use tracing::info;

#[derive(Parser)]
#[command(name = "broker", about = "Feeds model unit events to the governor charm")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Watch the model and forward unit events to the governor
    Run {
        /// Storage directory holding creds.yaml and the event store
        #[arg(short, long)]
        path: PathBuf,
    },
    /// Print the events recorded in the event store
    Events {
        /// Storage directory holding the event store
        #[arg(short, long)]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Command::Run { path } => cmd_run(path).await,
        Command::Events { path } => cmd_events(path),
    }
}

async fn cmd_run(path: PathBuf) -> anyhow::Result<()> {
    let config = Config::load(&path)?;

    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        ..TelemetryConfig::default()
    })?;

    let cluster = Arc::new(JujuClient::connect(&config).await?);
    let store = SqliteEventStore::new(config.store_path());

    let mut watcher = UnitWatcher::new(
        cluster,
        store,
        WatcherConfig::new(config.governor_charm.clone()),
    );

    let shutdown = watcher.shutdown_handle();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("interrupt received");
        shutdown.shutdown();
    });

    if watcher.start().await? {
        watcher.run().await?;
    }
    Ok(())
}

fn cmd_events(path: PathBuf) -> anyhow::Result<()> {
    let store = SqliteEventStore::new(path.join(STORE_FILE));
    let events = store.read_all()?;

    if events.is_empty() {
        println!("No events recorded.");
        return Ok(());
    }

    println!("{:<6}  {:<25}  {:<14}  DATA", "ID", "TIMESTAMP", "EVENT");
    println!("{}", "-".repeat(80));

    for event in &events {
        println!(
            "{:<6}  {:<25}  {:<14}  {}",
            event.id,
            event.timestamp.format("%Y-%m-%d %H:%M:%S"),
            event.event_name,
            event.event_data
        );
    }

    println!("\n{} event(s)", events.len());
    Ok(())
}
