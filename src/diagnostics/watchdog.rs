use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::Diagnostics;
use crate::capture::CameraId;
use crate::utils::MonotonicClock;

/// Marks cameras Disconnected once they have gone `timeout` without a frame.
///
/// A camera that has never delivered a frame is measured from the moment the
/// watchdog was armed.
pub struct LivenessWatchdog {
    diagnostics: Arc<Diagnostics>,
    clock: Arc<dyn MonotonicClock>,
    timeout: Duration,
    armed_at: Duration,
}

impl LivenessWatchdog {
    pub fn new(diagnostics: Arc<Diagnostics>, clock: Arc<dyn MonotonicClock>, timeout: Duration) -> Self {
        let armed_at = clock.now();
        Self {
            diagnostics,
            clock,
            timeout,
            armed_at,
        }
    }

    /// One sweep over every registered camera. Returns the cameras that
    /// transitioned to Disconnected.
    pub fn check(&self) -> Vec<CameraId> {
        let now = self.clock.now();
        self.diagnostics
            .cameras()
            .into_iter()
            .filter(|id| {
                let last = self.diagnostics.last_frame_at(id).unwrap_or(self.armed_at);
                now.saturating_sub(last) > self.timeout && self.diagnostics.mark_disconnected(id)
            })
            .collect()
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        let period = (self.timeout / 2).max(Duration::from_millis(10));
        tokio::spawn(async move {
            let mut ticker = time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let lost = self.check();
                        if !lost.is_empty() {
                            debug!(?lost, "Liveness sweep");
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{FrameMetadata, PixelFormat};
    use crate::diagnostics::HealthState;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::SystemTime;

    #[derive(Default)]
    struct ManualClock(AtomicU64);

    impl ManualClock {
        fn set_ms(&self, ms: u64) {
            self.0.store(ms * 1_000_000, Ordering::SeqCst);
        }
    }

    impl MonotonicClock for ManualClock {
        fn now(&self) -> Duration {
            Duration::from_nanos(self.0.load(Ordering::SeqCst))
        }
    }

    fn frame_at(cam: &CameraId, ms: u64) -> FrameMetadata {
        FrameMetadata {
            camera_id: cam.clone(),
            sequence: ms,
            captured_at: SystemTime::now(),
            monotonic: Duration::from_millis(ms),
            width: 4,
            height: 4,
            format: PixelFormat::Gray8,
        }
    }

    #[test]
    fn silent_camera_is_disconnected_then_recovers() {
        let clock = Arc::new(ManualClock::default());
        let diag = Arc::new(Diagnostics::new());
        let live = CameraId::new("CAM-1").unwrap();
        let silent = CameraId::new("CAM-2").unwrap();
        diag.register(&live);
        diag.register(&silent);

        let watchdog = LivenessWatchdog::new(diag.clone(), clock.clone(), Duration::from_millis(500));

        clock.set_ms(400);
        diag.on_frame_captured(&frame_at(&live, 400));
        assert!(watchdog.check().is_empty());

        clock.set_ms(800);
        assert_eq!(watchdog.check(), vec![silent.clone()]);
        assert_eq!(diag.snapshot(&silent).state, HealthState::Disconnected);
        assert_eq!(diag.snapshot(&live).state, HealthState::Ok);

        clock.set_ms(1_000);
        assert_eq!(watchdog.check(), vec![live.clone()]);

        diag.on_frame_captured(&frame_at(&live, 1_000));
        assert_eq!(diag.snapshot(&live).state, HealthState::Ok);
    }
}
