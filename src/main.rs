//! framehub: per-camera latest-frame pipeline with health diagnostics

use std::sync::Arc;

use color_eyre::Result;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use framehub::utils::{period_for_hz, SystemClock};
use framehub::{CameraSystem, Config, Diagnostics, FrameHub};

const DEFAULT_CONFIG_PATH: &str = "config/framehub.toml";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling and logging
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("framehub=info")),
        )
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();

    info!("framehub launching...");

    let path = std::env::var("FRAMEHUB_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
    let config = Config::load(&path)?;
    info!("Loaded configuration from {} ({} cameras)", path, config.cameras.len());

    let shutdown = CancellationToken::new();
    let mut system = CameraSystem::new(config.clone(), Arc::new(SystemClock));
    system.start(&shutdown).await?;

    let reporter = tokio::spawn(report_health(
        system.hub(),
        system.diagnostics(),
        config.diagnostics.health_publish_hz,
        shutdown.clone(),
    ));

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown requested");

    system.stop().await;
    shutdown.cancel();
    let _ = reporter.await;

    info!("framehub shutting down");
    Ok(())
}

/// Periodically log every camera's health and its latest published frame
async fn report_health(hub: Arc<FrameHub>, diagnostics: Arc<Diagnostics>, hz: u32, cancel: CancellationToken) {
    let mut ticker = time::interval(period_for_hz(hz));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        for health in diagnostics.all_snapshots() {
            let latest = hub.try_get_latest(&health.camera_id).map(|f| f.sequence());
            info!(
                camera = %health.camera_id,
                state = ?health.state,
                fps = %format!("{:.1}", health.fps),
                worst_gap_ms = %format!("{:.2}", health.worst_frame_gap_ms),
                dropped = health.dropped_frames,
                captured = health.frames_captured,
                latest = ?latest,
                message = health.message.as_deref().unwrap_or(""),
                "Camera health"
            );
        }
    }
}
