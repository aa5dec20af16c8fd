//! Boundary between capture sources and the frame pipeline.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::frame::{CameraId, Frame};
use crate::error::CaptureError;

pub type StopFuture<'a> = Pin<Box<dyn Future<Output = Result<(), CaptureError>> + Send + 'a>>;

/// Where a capture source delivers its output.
///
/// Both calls return promptly and never wait on a consumer; a source may
/// call them from its hot loop.
pub trait FrameSink: Send + Sync {
    /// Hand over a freshly captured frame. Ownership moves to the sink.
    fn submit(&self, frame: Frame);

    /// Report an unrecoverable fault inside the source's own loop.
    fn report_fault(&self, camera_id: &CameraId, error: &CaptureError);
}

/// A per-camera producer of frames.
pub trait CaptureSource: Send {
    fn camera_id(&self) -> &CameraId;

    /// Spawn the capture loop and return immediately. Faults inside the loop
    /// are reported through `sink`, never propagated.
    fn start(&mut self, sink: Arc<dyn FrameSink>, cancel: CancellationToken) -> Result<(), CaptureError>;

    /// Stop producing. Best-effort and idempotent.
    fn stop(&mut self) -> StopFuture<'_>;
}
