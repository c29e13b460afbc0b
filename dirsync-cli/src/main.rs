mod logging;

use anyhow::{Context, Result};
use clap::Parser;
use dirsync_core::{SyncConfig, SyncOrchestrator};
use dirsync_remote_sftp::{SftpEndpoint, SftpRemote};
use std::path::PathBuf;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::info;

const HEARTBEAT_PERIOD: Duration = Duration::from_secs(10 * 60);

#[derive(Parser, Debug)]
#[command(name = "dirsync", version, about = "Mirror a local directory onto an SFTP server")]
struct Cli {
    /// Path to config file (YAML, or JSON by `.json` extension)
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Overrides `log.level` from the config file
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = SyncConfig::from_path(&cli.config)
        .with_context(|| format!("failed to load config {}", cli.config.display()))?;

    let level = cli.log_level.as_deref().unwrap_or(&config.log.level);
    logging::init(level, &config.log)?;
    info!("=== dirsync {} starting ===", env!("CARGO_PKG_VERSION"));
    info!("os: {}", std::env::consts::OS);

    let remote = SftpRemote::connect(SftpEndpoint::from(&config.ssh))
        .await
        .context("failed to connect to remote host")?;
    let mut orchestrator = SyncOrchestrator::new(&config, remote);
    orchestrator.start().await.context("failed to start sync")?;
    info!("sync running, press Ctrl+C to stop");

    let heartbeat = spawn_heartbeat(&config);
    shutdown_signal().await?;
    info!("stop signal received, shutting down");

    heartbeat.abort();
    orchestrator.stop().await;
    info!("=== dirsync exited ===");
    Ok(())
}

fn spawn_heartbeat(config: &SyncConfig) -> JoinHandle<()> {
    let local = config.local_directory.display().to_string();
    let remote = config.remote_directory.clone();
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + HEARTBEAT_PERIOD, HEARTBEAT_PERIOD);
        loop {
            ticker.tick().await;
            info!("sync service running ({local} -> {remote})");
        }
    })
}

#[cfg(unix)]
async fn shutdown_signal() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};
    let mut term = signal(SignalKind::terminate())?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res?,
        _ = term.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn shutdown_signal() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
