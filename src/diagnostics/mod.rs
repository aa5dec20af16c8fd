//! Per-camera health tracking.
//!
//! Updates come from the pipeline hot path and touch only per-camera atomics;
//! no lock is shared between cameras or between fields of one camera.

pub mod health;
pub mod watchdog;

pub use health::{CameraHealth, HealthState};
pub use watchdog::LivenessWatchdog;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use arc_swap::ArcSwapOption;
use crossbeam::atomic::AtomicCell;
use metrics::{counter, gauge, Counter, Gauge};
use tracing::{error, info, warn};

use crate::capture::{CameraId, FrameMetadata};
use crate::registry::Registry;
use crate::utils::as_nanos;

/// Cumulative drops beyond which an Ok camera is marked Degraded
pub const DEGRADED_DROP_THRESHOLD: u64 = 50;

/// Weight kept from the previous rate estimate
const FPS_HISTORY_WEIGHT: f64 = 0.9;

const NO_SAMPLE: u64 = u64::MAX;

struct CameraState {
    last_seen_ns: AtomicU64,
    worst_gap_ns: AtomicU64,
    frames: AtomicU64,
    dropped: AtomicU64,
    fps_bits: AtomicU64,
    health: AtomicCell<HealthState>,
    message: ArcSwapOption<String>,

    captured_total: Counter,
    dropped_total: Counter,
    faults_total: Counter,
    fps_gauge: Gauge,
}

impl CameraState {
    fn new(camera_id: &CameraId) -> Self {
        let label = camera_id.to_string();
        Self {
            last_seen_ns: AtomicU64::new(NO_SAMPLE),
            worst_gap_ns: AtomicU64::new(0),
            frames: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            fps_bits: AtomicU64::new(0f64.to_bits()),
            health: AtomicCell::new(HealthState::Ok),
            message: ArcSwapOption::empty(),
            captured_total: counter!("framehub_frames_captured_total", "camera" => label.clone()),
            dropped_total: counter!("framehub_frames_dropped_total", "camera" => label.clone()),
            faults_total: counter!("framehub_camera_faults_total", "camera" => label.clone()),
            fps_gauge: gauge!("framehub_camera_fps", "camera" => label),
        }
    }

    fn fps(&self) -> f64 {
        f64::from_bits(self.fps_bits.load(Ordering::Acquire))
    }
}

/// Raise `cell` to `candidate` if it is larger. Never lowers the stored value,
/// whatever the interleaving of concurrent callers.
pub fn raise_to_max(cell: &AtomicU64, candidate: u64) -> bool {
    let mut current = cell.load(Ordering::Acquire);
    while candidate > current {
        match cell.compare_exchange_weak(current, candidate, Ordering::AcqRel, Ordering::Acquire) {
            Ok(_) => return true,
            Err(actual) => current = actual,
        }
    }
    false
}

/// Running statistics and health classification for every camera
pub struct Diagnostics {
    cameras: Registry<CameraState>,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new()
    }
}

impl Diagnostics {
    pub fn new() -> Self {
        Self {
            cameras: Registry::new(),
        }
    }

    fn state(&self, camera_id: &CameraId) -> Arc<CameraState> {
        self.cameras
            .get_or_insert_with(camera_id, || CameraState::new(camera_id))
    }

    /// Make a camera visible to `all_snapshots` before its first event
    pub fn register(&self, camera_id: &CameraId) {
        self.state(camera_id);
    }

    pub fn cameras(&self) -> Vec<CameraId> {
        self.cameras.ids()
    }

    pub fn on_frame_captured(&self, meta: &FrameMetadata) {
        let state = self.state(&meta.camera_id);
        let now = as_nanos(meta.monotonic);
        // Only ever advances; a late frame neither rewinds liveness nor
        // contributes a gap.
        let advanced = state
            .last_seen_ns
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| {
                (last == NO_SAMPLE || now > last).then_some(now)
            });

        if let Some(last) = advanced.ok().filter(|&last| last != NO_SAMPLE) {
            let gap = now - last;
            raise_to_max(&state.worst_gap_ns, gap);

            let instant = 1e9 / gap as f64;
            let updated = state
                .fps_bits
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
                    let prev = f64::from_bits(bits);
                    let next = if prev == 0.0 {
                        instant
                    } else {
                        prev * FPS_HISTORY_WEIGHT + instant * (1.0 - FPS_HISTORY_WEIGHT)
                    };
                    Some(next.to_bits())
                });
            if updated.is_ok() {
                state.fps_gauge.set(state.fps());
            }
        }

        state.frames.fetch_add(1, Ordering::AcqRel);
        state.captured_total.increment(1);

        // A frame is proof of liveness
        if state
            .health
            .compare_exchange(HealthState::Disconnected, HealthState::Ok)
            .is_ok()
        {
            info!(camera = %meta.camera_id, "Camera reconnected");
        }
    }

    pub fn on_frame_dropped(&self, camera_id: &CameraId) {
        let state = self.state(camera_id);
        let dropped = state.dropped.fetch_add(1, Ordering::AcqRel) + 1;
        state.dropped_total.increment(1);

        if dropped > DEGRADED_DROP_THRESHOLD
            && state
                .health
                .compare_exchange(HealthState::Ok, HealthState::Degraded)
                .is_ok()
        {
            warn!(camera = %camera_id, dropped, "Camera degraded: excessive frame drops");
        }
    }

    pub fn on_camera_fault(&self, camera_id: &CameraId, fault: &dyn std::error::Error) {
        let state = self.state(camera_id);
        state.message.store(Some(Arc::new(fault.to_string())));
        state.health.store(HealthState::Faulted);
        state.faults_total.increment(1);
        error!(camera = %camera_id, "Camera fault: {}", fault);
    }

    /// Mark a camera Disconnected on behalf of an external liveness check.
    /// Faulted cameras keep their fault. Returns whether the state changed.
    pub fn mark_disconnected(&self, camera_id: &CameraId) -> bool {
        let state = self.state(camera_id);
        loop {
            let current = state.health.load();
            if matches!(current, HealthState::Faulted | HealthState::Disconnected) {
                return false;
            }
            if state
                .health
                .compare_exchange(current, HealthState::Disconnected)
                .is_ok()
            {
                warn!(camera = %camera_id, "Camera disconnected");
                return true;
            }
        }
    }

    /// Monotonic timestamp of the most recent captured frame
    pub fn last_frame_at(&self, camera_id: &CameraId) -> Option<Duration> {
        let state = self.cameras.get(camera_id)?;
        match state.last_seen_ns.load(Ordering::Acquire) {
            NO_SAMPLE => None,
            ns => Some(Duration::from_nanos(ns)),
        }
    }

    pub fn snapshot(&self, camera_id: &CameraId) -> CameraHealth {
        match self.cameras.get(camera_id) {
            Some(state) => project(camera_id, &state),
            None => CameraHealth {
                camera_id: camera_id.clone(),
                state: HealthState::Ok,
                message: None,
                fps: 0.0,
                worst_frame_gap_ms: 0.0,
                dropped_frames: 0,
                frames_captured: 0,
                timestamp: SystemTime::now(),
            },
        }
    }

    /// One snapshot per registered camera, ordered by camera id
    pub fn all_snapshots(&self) -> Vec<CameraHealth> {
        self.cameras
            .entries()
            .iter()
            .map(|(id, state)| project(id, state))
            .collect()
    }
}

fn project(camera_id: &CameraId, state: &CameraState) -> CameraHealth {
    let worst_ns = state.worst_gap_ns.load(Ordering::Acquire);
    CameraHealth {
        camera_id: camera_id.clone(),
        state: state.health.load(),
        message: state.message.load_full().map(|m| m.as_ref().clone()),
        fps: state.fps(),
        worst_frame_gap_ms: worst_ns as f64 / 1e6,
        dropped_frames: state.dropped.load(Ordering::Acquire),
        frames_captured: state.frames.load(Ordering::Acquire),
        timestamp: SystemTime::now(),
    }
}
