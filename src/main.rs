//! dxspot CLI - Stream DX cluster spots and show the ones you still need.

use anyhow::{Context, Result, bail};
use clap::Parser;
use dxspot::{
    client::SpotClient,
    config::Config,
    cty::{EntityDatabase, download_cty},
    metrics::start_metrics_server,
    need::MemoryProgress,
    pipeline::SpotPipeline,
    spot::ResolvedSpot,
    stats::SpotStats,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// dxspot - Stream DX cluster spots resolved to entities and filtered by need
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file (defaults to the platform config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Callsign to use for cluster login
    #[arg(short, long, env = "DXSPOT_CALLSIGN")]
    callsign: Option<String>,

    /// Cluster server hostname
    #[arg(long, env = "DXSPOT_HOST")]
    host: Option<String>,

    /// Cluster server port
    #[arg(long, env = "DXSPOT_PORT")]
    port: Option<u16>,

    /// Path of the cty.dat entity database
    #[arg(long)]
    cty: Option<PathBuf>,

    /// JSON file of entity/band pairs already confirmed
    #[arg(long)]
    progress: Option<PathBuf>,

    /// Print statistics every N seconds (0 = off)
    #[arg(short, long)]
    stats_interval: Option<u64>,

    /// Hide spots whose callsign does not resolve
    #[arg(long)]
    hide_unresolved: bool,

    /// Print spots as JSON lines
    #[arg(long)]
    json: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Disable auto-reconnect
    #[arg(long)]
    no_reconnect: bool,

    /// Enable the Prometheus metrics endpoint
    #[arg(long)]
    metrics: bool,

    /// Maximum runtime in seconds (0 = unlimited)
    #[arg(long, default_value_t = 0)]
    max_runtime: u64,
}

impl Args {
    /// Override config values with anything given on the command line.
    fn apply(&self, config: &mut Config) {
        if let Some(ref callsign) = self.callsign {
            config.callsign = callsign.clone();
        }
        if let Some(ref host) = self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(ref cty) = self.cty {
            config.cty_path = cty.clone();
        }
        if let Some(ref progress) = self.progress {
            config.progress_path = Some(progress.clone());
        }
        if let Some(interval) = self.stats_interval {
            config.stats_interval = interval;
        }
        if self.hide_unresolved {
            config.show_unresolved = false;
        }
        if self.no_reconnect {
            config.reconnect = false;
        }
        if self.metrics {
            config.metrics_enabled = true;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let mut config = match args.config {
        Some(ref path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    args.apply(&mut config);
    config.validate()?;

    info!("dxspot starting...");
    info!("Callsign: {}", config.callsign);
    info!("Server: {}:{}", config.host, config.port);

    let db = load_database(&config).await?;
    if db.is_empty() {
        warn!("Entity database is empty; every spot will be unresolved");
    }

    let progress = match config.progress_path {
        Some(ref path) => MemoryProgress::load_json(path)
            .with_context(|| format!("Failed to load progress from {}", path.display()))?,
        None => MemoryProgress::new(),
    };
    info!("Progress store holds {} confirmed entity/band pairs", progress.len());

    // Create shared statistics
    let stats = Arc::new(SpotStats::new());

    if config.metrics_enabled {
        let stats = Arc::clone(&stats);
        let port = config.metrics_port;
        tokio::spawn(async move {
            if let Err(e) = start_metrics_server(port, stats).await {
                error!("Metrics server failed: {}", e);
            }
        });
    }

    // Create shutdown signal
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    // Handle Ctrl+C
    let shutdown_tx_clone = shutdown_tx.clone();
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received");
                let _ = shutdown_tx_clone.send(true);
            }
            Err(e) => error!("Failed to install Ctrl+C handler: {}", e),
        }
    });

    // Optional max runtime
    if args.max_runtime > 0 {
        let shutdown_tx_clone = shutdown_tx.clone();
        let max_runtime = args.max_runtime;
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(max_runtime)).await;
            info!("Max runtime reached");
            let _ = shutdown_tx_clone.send(true);
        });
    }

    // Start stats printer
    if config.stats_interval > 0 {
        let stats = Arc::clone(&stats);
        let period = Duration::from_secs(config.stats_interval);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                interval.tick().await;
                println!("\n{}", stats.summary());
            }
        });
    }

    let pipeline = Arc::new(
        SpotPipeline::new(Arc::new(db), progress)
            .with_filters(std::mem::take(&mut config.filters))
            .with_stats(Arc::clone(&stats))
            .show_unresolved(config.show_unresolved),
    );
    let client = SpotClient::new(config.client_config());
    let reconnect_delay = Duration::from_secs(config.reconnect_delay);

    // Connection loop; reconnecting is decided here, not by the client
    'connection: loop {
        let (handle, events) = client.start();
        let (spot_tx, mut spot_rx) = mpsc::channel(256);
        let worker = {
            let pipeline = Arc::clone(&pipeline);
            tokio::spawn(async move { pipeline.run(events, spot_tx).await })
        };

        loop {
            tokio::select! {
                // Check for shutdown
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        handle.stop();
                        drop(spot_rx);
                        let _ = worker.await;
                        break 'connection;
                    }
                }

                spot = spot_rx.recv() => match spot {
                    Some(spot) => println!("{}", render_spot(&spot, args.json)),
                    // Feed ended
                    None => break,
                }
            }
        }

        match worker.await {
            Ok(emitted) => info!("Feed closed after {} spots", emitted),
            Err(e) => error!("Pipeline task failed: {}", e),
        }

        if !config.reconnect || *shutdown_rx.borrow() {
            break;
        }
        info!("Reconnecting in {}s", reconnect_delay.as_secs());
        tokio::select! {
            _ = tokio::time::sleep(reconnect_delay) => {}
            _ = shutdown_rx.changed() => break,
        }
    }

    // Print final statistics
    println!("\n\nFINAL STATISTICS");
    println!("{}", stats.summary());

    Ok(())
}

/// Load the entity database, downloading it first if configured to.
async fn load_database(config: &Config) -> Result<EntityDatabase> {
    let path = &config.cty_path;
    if !path.exists() {
        let Some(ref url) = config.cty_url else {
            bail!(
                "Entity database {} not found and no cty_url configured",
                path.display()
            );
        };
        let text = download_cty(url, Duration::from_secs(config.connect_timeout)).await?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        tokio::fs::write(path, &text)
            .await
            .with_context(|| format!("Failed to save {}", path.display()))?;
        info!("Saved entity database to {}", path.display());
    }

    Ok(EntityDatabase::load_file(path)?)
}

/// Format an emitted spot for the terminal.
fn render_spot(spot: &ResolvedSpot, json: bool) -> String {
    if json {
        serde_json::to_string(&spot.event()).unwrap_or_else(|e| format!("{{\"error\":\"{}\"}}", e))
    } else {
        spot.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CTY: &str = "Slovak Republic: 15: 28: EU: 49.00: -20.00: -1.0: OM:\n    OM,=OM5AY;";

    fn emitted_spot() -> ResolvedSpot {
        SpotPipeline::new(Arc::new(EntityDatabase::load(CTY)), MemoryProgress::new())
            .process_line("DX de OG3Z: 14074.0 OM5AY    FT8 25dB  1234Z")
            .unwrap()
    }

    #[test]
    fn test_args_override_config() {
        let args = Args::parse_from([
            "dxspot",
            "--callsign",
            "OM5AY",
            "--port",
            "7001",
            "--hide-unresolved",
            "--no-reconnect",
        ]);
        let mut config = Config::default();
        args.apply(&mut config);

        assert_eq!(config.callsign, "OM5AY");
        assert_eq!(config.port, 7001);
        assert!(!config.show_unresolved);
        assert!(!config.reconnect);
        // Untouched values keep their config defaults
        assert_eq!(config.reconnect_delay, 5);
    }

    #[test]
    fn test_render_spot_text() {
        let line = render_spot(&emitted_spot(), false);
        assert!(line.starts_with("1234Z"));
        assert!(line.contains("OM5AY"));
        assert!(line.contains("SLOVAK REPUBLIC"));
        assert!(line.ends_with("de OG3Z"));
    }

    #[test]
    fn test_render_spot_json() {
        let line = render_spot(&emitted_spot(), true);
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["callsign"], "OM5AY");
        assert_eq!(value["entity_name"], "SLOVAK REPUBLIC");
        assert_eq!(value["band"], "20");
    }

    #[tokio::test]
    async fn test_load_database_missing_without_url() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            cty_path: dir.path().join("cty.dat"),
            ..Default::default()
        };
        assert!(load_database(&config).await.is_err());

        std::fs::write(&config.cty_path, CTY).unwrap();
        assert_eq!(load_database(&config).await.unwrap().len(), 1);
    }
}
