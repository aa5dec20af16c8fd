use std::time::SystemTime;

use serde::Serialize;

use crate::capture::CameraId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum HealthState {
    Ok,
    Degraded,
    Faulted,
    Disconnected,
}

/// Point-in-time projection of one camera's diagnostics counters.
///
/// Each field is read atomically on its own; the set as a whole is not a
/// transactional snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct CameraHealth {
    pub camera_id: CameraId,
    pub state: HealthState,
    pub message: Option<String>,
    pub fps: f64,
    pub worst_frame_gap_ms: f64,
    pub dropped_frames: u64,
    pub frames_captured: u64,
    pub timestamp: SystemTime,
}
