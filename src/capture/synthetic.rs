//! Deterministic test-pattern capture source

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::frame::{BufferPool, CameraId, Frame, FrameMetadata, PixelFormat};
use super::source::{CaptureSource, FrameSink, StopFuture};
use crate::error::CaptureError;
use crate::utils::{period_for_hz, MonotonicClock};

/// Geometry and pacing of a synthetic camera
#[derive(Debug, Clone)]
pub struct SyntheticSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub format: PixelFormat,
}

/// Produces a moving gradient with a crosshair at a target rate.
///
/// Pacing uses a monotonic interval that skips missed ticks, so a stalled
/// loop resumes at the current time instead of bursting to catch up.
pub struct SyntheticCamera {
    camera_id: CameraId,
    settings: SyntheticSettings,
    clock: Arc<dyn MonotonicClock>,
    pool: Arc<BufferPool>,
    grace: Duration,
    cancel: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
}

impl SyntheticCamera {
    pub fn new(
        camera_id: CameraId,
        settings: SyntheticSettings,
        clock: Arc<dyn MonotonicClock>,
        pool: Arc<BufferPool>,
        grace: Duration,
    ) -> Self {
        Self {
            camera_id,
            settings,
            clock,
            pool,
            grace,
            cancel: None,
            task: None,
        }
    }
}

impl CaptureSource for SyntheticCamera {
    fn camera_id(&self) -> &CameraId {
        &self.camera_id
    }

    #[instrument(skip_all, fields(camera = %self.camera_id))]
    fn start(&mut self, sink: Arc<dyn FrameSink>, cancel: CancellationToken) -> Result<(), CaptureError> {
        if self.task.is_some() {
            return Err(CaptureError::AlreadyStarted);
        }

        let token = cancel.child_token();
        let worker = Worker {
            camera_id: self.camera_id.clone(),
            settings: self.settings.clone(),
            clock: Arc::clone(&self.clock),
            pool: Arc::clone(&self.pool),
        };
        self.task = Some(tokio::spawn(worker.run(sink, token.clone())));
        self.cancel = Some(token);

        info!(
            "Synthetic capture started: {}x{}@{} {:?}",
            self.settings.width, self.settings.height, self.settings.fps, self.settings.format
        );
        Ok(())
    }

    fn stop(&mut self) -> StopFuture<'_> {
        Box::pin(async move {
            if let Some(cancel) = self.cancel.take() {
                cancel.cancel();
            }
            let Some(mut task) = self.task.take() else {
                return Ok(());
            };

            match time::timeout(self.grace, &mut task).await {
                Ok(Ok(())) => {
                    debug!(camera = %self.camera_id, "Synthetic capture stopped");
                    Ok(())
                }
                Ok(Err(e)) => Err(CaptureError::Task(e)),
                Err(_) => {
                    warn!(camera = %self.camera_id, "Capture loop ignored cancellation, aborting");
                    task.abort();
                    Err(CaptureError::StopTimeout(self.grace))
                }
            }
        })
    }
}

impl Drop for SyntheticCamera {
    fn drop(&mut self) {
        if let Some(cancel) = &self.cancel {
            cancel.cancel();
        }
    }
}

struct Worker {
    camera_id: CameraId,
    settings: SyntheticSettings,
    clock: Arc<dyn MonotonicClock>,
    pool: Arc<BufferPool>,
}

impl Worker {
    async fn run(self, sink: Arc<dyn FrameSink>, cancel: CancellationToken) {
        let SyntheticSettings {
            width,
            height,
            fps,
            format,
        } = self.settings;
        let stride = width as usize * format.bytes_per_pixel();
        let len = stride * height as usize;

        let mut ticker = time::interval(period_for_hz(fps));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut sequence = 0u64;
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let mut buffer = self.pool.acquire(len);
            fill_test_pattern(buffer.as_mut_slice(), width, height, stride, format, sequence);

            let meta = FrameMetadata {
                camera_id: self.camera_id.clone(),
                sequence,
                captured_at: SystemTime::now(),
                monotonic: self.clock.now(),
                width,
                height,
                format,
            };

            match Frame::new(meta, buffer, stride) {
                Ok(frame) => sink.submit(frame),
                Err(e) => {
                    let e = CaptureError::from(e);
                    error!(camera = %self.camera_id, "Synthetic capture loop faulted: {}", e);
                    sink.report_fault(&self.camera_id, &e);
                    break;
                }
            }
            sequence += 1;
        }
    }
}

/// Moving gradient plus a crosshair through the centre
fn fill_test_pattern(
    dst: &mut [u8],
    width: u32,
    height: u32,
    stride: usize,
    format: PixelFormat,
    sequence: u64,
) {
    let t = (sequence % 255) as u32;
    let (cx, cy) = (width / 2, height / 2);
    let bpp = format.bytes_per_pixel();

    for (y, row) in dst.chunks_exact_mut(stride).take(height as usize).enumerate() {
        let y = y as u32;
        for (x, px) in row.chunks_exact_mut(bpp).take(width as usize).enumerate() {
            let x = x as u32;
            let v = ((x + y + t) & 0xFF) as u8;
            let cross = x == cx || y == cy;
            match format {
                PixelFormat::Bgra32 if cross => px.copy_from_slice(&[0, 0, 255, 255]),
                PixelFormat::Bgra32 => px.copy_from_slice(&[v, 255 - v, v, 255]),
                PixelFormat::Rgb24 if cross => px.copy_from_slice(&[255, 0, 0]),
                PixelFormat::Bgr24 if cross => px.copy_from_slice(&[0, 0, 255]),
                PixelFormat::Rgb24 | PixelFormat::Bgr24 => px.copy_from_slice(&[v, 255 - v, v]),
                PixelFormat::Gray8 => px[0] = if cross { 255 } else { v },
            }
        }
    }
}
