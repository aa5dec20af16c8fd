//! Per-camera frame pipeline.
//!
//! The capture source installs frames into a single-slot mailbox; one
//! consumer task per camera drains it into the shared `FrameHub`. A frame
//! still pending when a newer one arrives is dropped, so memory stays bounded
//! and the producer never waits for the consumer.

pub mod hub;
pub mod mailbox;

pub use hub::FrameHub;
pub use mailbox::{Install, Mailbox};

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

use crate::capture::{CameraId, Frame, FrameSink};
use crate::diagnostics::Diagnostics;
use crate::error::{CaptureError, PipelineError};

/// Producer-facing half of a pipeline
pub struct PipelineSink {
    camera_id: CameraId,
    mailbox: Mailbox,
    diagnostics: Arc<Diagnostics>,
}

impl PipelineSink {
    pub fn camera_id(&self) -> &CameraId {
        &self.camera_id
    }

    pub fn mailbox(&self) -> &Mailbox {
        &self.mailbox
    }
}

impl FrameSink for PipelineSink {
    fn submit(&self, frame: Frame) {
        if frame.camera_id() != &self.camera_id {
            let err = CaptureError::ForeignFrame {
                expected: self.camera_id.clone(),
                actual: frame.camera_id().clone(),
            };
            self.diagnostics.on_camera_fault(&self.camera_id, &err);
            return;
        }

        match self.mailbox.install(frame) {
            Install::Fresh => {}
            Install::Replaced(stale) => {
                trace!(camera = %self.camera_id, dropped = stale.sequence(), "Dropping unconsumed frame");
                drop(stale);
                self.diagnostics.on_frame_dropped(&self.camera_id);
            }
            Install::Closed(frame) => {
                debug!(camera = %self.camera_id, sequence = frame.sequence(), "Pipeline stopped, discarding frame");
            }
        }
    }

    fn report_fault(&self, camera_id: &CameraId, error: &CaptureError) {
        self.diagnostics.on_camera_fault(camera_id, error);
    }
}

pub struct FramePipeline {
    sink: Arc<PipelineSink>,
    hub: Arc<FrameHub>,
    cancel: CancellationToken,
    consumer: Option<JoinHandle<()>>,
    grace: Duration,
}

impl FramePipeline {
    /// Create an idle pipeline and register the camera with the hub and
    /// diagnostics. The camera's hub slot is cleared: a new pipeline starts a
    /// new capture session whose sequence numbers begin again.
    pub fn new(camera_id: CameraId, hub: Arc<FrameHub>, diagnostics: Arc<Diagnostics>, grace: Duration) -> Self {
        hub.reset(&camera_id);
        diagnostics.register(&camera_id);

        Self {
            sink: Arc::new(PipelineSink {
                camera_id,
                mailbox: Mailbox::new(),
                diagnostics,
            }),
            hub,
            cancel: CancellationToken::new(),
            consumer: None,
            grace,
        }
    }

    pub fn camera_id(&self) -> &CameraId {
        &self.sink.camera_id
    }

    /// Entry point handed to the capture source
    pub fn sink(&self) -> Arc<dyn FrameSink> {
        Arc::clone(&self.sink) as Arc<dyn FrameSink>
    }

    pub fn is_running(&self) -> bool {
        self.consumer.as_ref().is_some_and(|c| !c.is_finished())
    }

    /// Spawn the consumer task. Calling this on a started pipeline is a no-op.
    /// A stopped pipeline cannot be started again.
    pub fn start(&mut self) -> Result<(), PipelineError> {
        if self.consumer.is_some() {
            return Ok(());
        }
        if self.cancel.is_cancelled() {
            return Err(PipelineError::Stopped(self.sink.camera_id.clone()));
        }

        self.consumer = Some(tokio::spawn(consume(
            Arc::clone(&self.sink),
            Arc::clone(&self.hub),
            self.cancel.clone(),
        )));
        info!(camera = %self.sink.camera_id, "Frame pipeline started");
        Ok(())
    }

    /// Close the mailbox, discarding any pending frame, then cancel the
    /// consumer and wait up to the grace period for it to exit. Later
    /// submissions are discarded.
    #[instrument(skip(self), fields(camera = %self.sink.camera_id))]
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(pending) = self.sink.mailbox.close() {
            debug!(sequence = pending.sequence(), "Discarding unconsumed frame");
        }

        if let Some(mut consumer) = self.consumer.take() {
            match time::timeout(self.grace, &mut consumer).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Pipeline consumer failed: {}", e),
                Err(_) => {
                    warn!(grace = ?self.grace, "Pipeline consumer ignored cancellation, aborting");
                    consumer.abort();
                }
            }
        }
    }
}

impl Drop for FramePipeline {
    fn drop(&mut self) {
        self.cancel.cancel();
        drop(self.sink.mailbox.close());
    }
}

async fn consume(sink: Arc<PipelineSink>, hub: Arc<FrameHub>, cancel: CancellationToken) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            woke = sink.mailbox.wait() => if !woke { break },
        }

        // Spurious wake-up: an earlier pass already drained the slot.
        let Some(frame) = sink.mailbox.take() else {
            continue;
        };

        // Rate and gap statistics describe frames that reach the hub
        let meta = frame.metadata().clone();
        match hub.publish(frame) {
            Ok(()) => {
                sink.diagnostics.on_frame_captured(&meta);
                trace!(camera = %sink.camera_id, sequence = meta.sequence, "Frame published");
            }
            Err(e) => sink.diagnostics.on_camera_fault(&sink.camera_id, &e),
        }
    }
    debug!(camera = %sink.camera_id, "Pipeline consumer exited");
}
