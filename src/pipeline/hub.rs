//! Latest-frame store shared by all pipelines and readers.
//!
//! Each registered camera owns one `ArcSwapOption<Frame>` slot. Publishing is
//! an atomic swap on that slot alone, so cameras never contend, and reads are
//! wait-free. No history is kept: memory is bounded to one frame per camera
//! plus whatever readers are still holding.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use tracing::trace;

use crate::capture::{CameraId, Frame};
use crate::error::HubError;
use crate::registry::Registry;

pub struct FrameHub {
    slots: Registry<ArcSwapOption<Frame>>,
}

impl Default for FrameHub {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameHub {
    pub fn new() -> Self {
        Self {
            slots: Registry::new(),
        }
    }

    /// Make a camera visible with no frame yet. Idempotent: an existing
    /// camera keeps its published frame.
    pub fn ensure_registered(&self, camera_id: &CameraId) {
        self.slots.get_or_insert_with(camera_id, ArcSwapOption::empty);
    }

    /// Register the camera and drop whatever it last published.
    ///
    /// Sequences only need to be non-decreasing within one capture session;
    /// a fresh pipeline restarts numbering and must not be held to the
    /// previous session's frames.
    pub fn reset(&self, camera_id: &CameraId) {
        let slot = self.slots.get_or_insert_with(camera_id, ArcSwapOption::empty);
        if let Some(previous) = slot.swap(None) {
            trace!(camera = %camera_id, superseded = previous.sequence(), "Frame slot reset");
        }
    }

    /// Replace the camera's current frame with `frame`.
    ///
    /// Intended for the camera's own pipeline consumer, the single writer for
    /// that key. The superseded frame is released only after the swap, and
    /// only once no reader still holds it. A frame older than the one already
    /// published is rejected and released.
    pub fn publish(&self, frame: Frame) -> Result<(), HubError> {
        let Some(slot) = self.slots.get(frame.camera_id()) else {
            return Err(HubError::UnknownCamera(frame.camera_id().clone()));
        };

        if let Some(current) = &*slot.load() {
            if frame.sequence() < current.sequence() {
                return Err(HubError::StaleFrame {
                    camera: frame.camera_id().clone(),
                    sequence: frame.sequence(),
                    current: current.sequence(),
                });
            }
        }

        let sequence = frame.sequence();
        let previous = slot.swap(Some(Arc::new(frame)));
        if let Some(previous) = previous {
            trace!(
                camera = %previous.camera_id(),
                superseded = previous.sequence(),
                sequence,
                "Frame superseded"
            );
        }
        Ok(())
    }

    /// The most recently published frame, if any.
    ///
    /// The returned handle is read-only and keeps its buffer alive for as
    /// long as it is held. A later call may return the same frame or a newer
    /// one; the hub does not pin versions for callers.
    pub fn try_get_latest(&self, camera_id: &CameraId) -> Option<Arc<Frame>> {
        self.slots.get(camera_id)?.load_full()
    }

    /// All registered cameras, ordered by id
    pub fn cameras(&self) -> Vec<CameraId> {
        self.slots.ids()
    }
}
