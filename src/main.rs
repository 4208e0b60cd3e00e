// Unitwatch - systemd service state monitor
// Main entry point

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use unitwatch::config::Config;
use unitwatch::metrics::spawn_exporter;
use unitwatch::monitor::MonitorService;
use unitwatch::version::build_info;

#[derive(Parser, Debug)]
#[command(name = "unitwatch")]
#[command(author, about, long_about = None)]
#[command(disable_version_flag = true)]
struct Cli {
    /// Services to monitor (overrides the config file)
    #[arg(short, long, num_args = 1.., value_name = "UNIT")]
    services: Vec<String>,

    /// Config file path
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to the transition log file
    #[arg(short, long)]
    log_file: Option<PathBuf>,

    /// Path to the structured JSON event log
    #[arg(long)]
    event_log_file: Option<PathBuf>,

    /// Path to the persistence file
    #[arg(short, long)]
    persistence_file: Option<PathBuf>,

    /// Seconds between summary tables
    #[arg(long, value_name = "SECS")]
    stats_interval: Option<u64>,

    /// Port for the Prometheus /metrics endpoint
    #[arg(long, value_name = "PORT")]
    metrics_port: Option<u16>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Remove the transition log and persistence file, then exit
    #[arg(short, long)]
    clear: bool,

    /// Write a default configuration file and exit
    #[arg(long, value_name = "PATH")]
    create_config: Option<PathBuf>,

    /// Show version information
    #[arg(short = 'V', long)]
    version: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.version {
        println!("{}", build_info().format_display());
        println!("{}", build_info().format_build_info());
        return Ok(());
    }

    if let Some(path) = cli.create_config {
        Config::default().save(path.clone())?;
        println!("Created default configuration file: {}", path.display());
        return Ok(());
    }

    let mut config = Config::load(cli.config)?;
    if !cli.services.is_empty() {
        config.monitored_services = cli.services;
    }
    if let Some(path) = cli.log_file {
        config.log_file = path;
    }
    if let Some(path) = cli.event_log_file {
        config.event_log_file = path;
    }
    if let Some(path) = cli.persistence_file {
        config.persistence_file = path;
    }
    if let Some(secs) = cli.stats_interval {
        config.stats_interval_secs = secs;
    }
    if let Some(port) = cli.metrics_port {
        config.metrics_port = port;
    }
    if cli.debug {
        config.debug = true;
    }

    if cli.clear {
        for path in [&config.log_file, &config.persistence_file] {
            if path.exists() {
                std::fs::remove_file(path)?;
                println!("Removed {}", path.display());
            }
        }
        return Ok(());
    }

    // Diagnostics go to stderr; operational lines live in the
    // transition log. --debug raises the stderr level.
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(if config.debug {
            tracing::Level::DEBUG
        } else {
            tracing::Level::WARN
        })
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    config.validate()?;

    tracing::info!("Unitwatch starting, watching {} units", config.monitored_services.len());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let service = MonitorService::new(config.clone()).await?;
    let exporter = spawn_exporter(service.metrics(), config.metrics_port, shutdown_rx.clone());
    let handles = service.start(shutdown_rx).await?;

    wait_for_signal().await;
    println!("\nTerminating gracefully...");
    let _ = shutdown_tx.send(true);

    for handle in handles {
        let _ = handle.await;
    }
    let _ = exporter.await;

    service.finalize().await;

    Ok(())
}

/// Block until SIGINT or SIGTERM.
async fn wait_for_signal() {
    let mut term = match signal(SignalKind::terminate()) {
        Ok(term) => term,
        Err(e) => {
            tracing::error!("Failed to install SIGTERM handler: {}", e);
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = term.recv() => {}
    }
}
