//! Lifecycle orchestration: pairs every configured camera with its pipeline
//! and capture source, and tears them down in a safe order.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::capture::{CameraFactory, CaptureSource, SourceFactory};
use crate::diagnostics::{Diagnostics, LivenessWatchdog};
use crate::error::SystemError;
use crate::pipeline::{FrameHub, FramePipeline};
use crate::utils::MonotonicClock;
use crate::{CameraProfile, Config};

struct CameraUnit {
    pipeline: FramePipeline,
    source: Box<dyn CaptureSource>,
}

pub struct CameraSystem {
    config: Config,
    clock: Arc<dyn MonotonicClock>,
    factory: Box<dyn SourceFactory>,
    hub: Arc<FrameHub>,
    diagnostics: Arc<Diagnostics>,
    cameras: Vec<CameraUnit>,
    shutdown: CancellationToken,
    watchdog: Option<JoinHandle<()>>,
    running: bool,
}

impl CameraSystem {
    pub fn new(config: Config, clock: Arc<dyn MonotonicClock>) -> Self {
        let factory = CameraFactory::new(
            Arc::clone(&clock),
            config.pipeline.buffer_pool_size,
            config.shutdown_grace(),
        );
        Self::with_factory(config, clock, Box::new(factory))
    }

    pub fn with_factory(config: Config, clock: Arc<dyn MonotonicClock>, factory: Box<dyn SourceFactory>) -> Self {
        Self {
            config,
            clock,
            factory,
            hub: Arc::new(FrameHub::new()),
            diagnostics: Arc::new(Diagnostics::new()),
            cameras: Vec::new(),
            shutdown: CancellationToken::new(),
            watchdog: None,
            running: false,
        }
    }

    /// Consumer read surface: latest frames
    pub fn hub(&self) -> Arc<FrameHub> {
        Arc::clone(&self.hub)
    }

    /// Consumer read surface: health snapshots
    pub fn diagnostics(&self) -> Arc<Diagnostics> {
        Arc::clone(&self.diagnostics)
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Start every configured camera: pipeline first, then its capture
    /// source bound to the pipeline.
    ///
    /// Configuration is validated up front and aborts the start. A capture
    /// source that fails to start is recorded as a fault for that camera only.
    #[instrument(skip_all)]
    pub async fn start(&mut self, cancel: &CancellationToken) -> Result<(), SystemError> {
        if self.running {
            return Ok(());
        }

        self.config.validate()?;
        if cancel.is_cancelled() {
            return Err(SystemError::Cancelled);
        }

        self.running = true;
        self.shutdown = cancel.child_token();
        for profile in self.config.cameras.clone() {
            if cancel.is_cancelled() {
                self.stop().await;
                return Err(SystemError::Cancelled);
            }
            if let Err(e) = self.start_camera(&profile) {
                self.stop().await;
                return Err(e);
            }
        }

        let timeout_ms = self.config.diagnostics.disconnect_timeout_ms;
        if timeout_ms > 0 {
            let watchdog = LivenessWatchdog::new(
                Arc::clone(&self.diagnostics),
                Arc::clone(&self.clock),
                Duration::from_millis(timeout_ms),
            );
            self.watchdog = Some(watchdog.spawn(self.shutdown.clone()));
        }

        Ok(())
    }

    /// Each start builds fresh pipelines, so a restarted system publishes
    /// from a clean hub slot per camera.
    fn start_camera(&mut self, profile: &CameraProfile) -> Result<(), SystemError> {
        let camera_id = profile.validate()?;
        let mut source = self.factory.create(profile)?;

        let mut pipeline = FramePipeline::new(
            camera_id.clone(),
            Arc::clone(&self.hub),
            Arc::clone(&self.diagnostics),
            self.config.shutdown_grace(),
        );
        pipeline.start()?;

        match source.start(pipeline.sink(), self.shutdown.clone()) {
            Ok(()) => info!(
                "Started camera {} provider={} {}x{}@{}",
                camera_id, profile.provider, profile.width, profile.height, profile.target_fps
            ),
            Err(e) => {
                error!(camera = %camera_id, "Capture source failed to start: {}", e);
                self.diagnostics.on_camera_fault(&camera_id, &e);
            }
        }

        self.cameras.push(CameraUnit { pipeline, source });
        Ok(())
    }

    /// Stop every capture source, then every pipeline, then release the
    /// sources. Failures are logged per camera and never cut the sequence
    /// short.
    #[instrument(skip_all)]
    pub async fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.running = false;

        for unit in &mut self.cameras {
            if let Err(e) = unit.source.stop().await {
                warn!(camera = %unit.source.camera_id(), "Capture source stop failed: {}", e);
            }
        }

        for unit in &mut self.cameras {
            unit.pipeline.stop().await;
        }

        self.shutdown.cancel();
        if let Some(mut watchdog) = self.watchdog.take() {
            if time::timeout(self.config.shutdown_grace(), &mut watchdog).await.is_err() {
                warn!("Liveness watchdog did not stop in time");
                watchdog.abort();
            }
        }

        let stopped = self.cameras.len();
        self.cameras.clear();
        info!(cameras = stopped, "Camera system stopped");
    }
}
