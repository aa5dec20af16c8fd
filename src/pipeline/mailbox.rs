//! Single-slot frame handoff for the pipeline

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crossbeam::utils::CachePadded;
use tokio::sync::Semaphore;

use crate::capture::Frame;

/// Upper bound on outstanding wake-ups. Each extra wake-up at most costs the
/// consumer one empty pass, so this caps catch-up work after a stall.
const MAX_PENDING_SIGNALS: usize = 64;

/// One-frame mailbox between a capture source and its consumer.
///
/// The slot holds at most one frame. Every install adds a wake-up to a
/// counting signal; the consumer tolerates waking to an empty slot.
pub struct Mailbox {
    slot: Mutex<Slot>,
    signal: Semaphore,
    stats: CachePadded<Stats>,
}

/// Closing and installing serialize on the same lock, so no frame can land
/// after `close` has drained the slot.
#[derive(Default)]
struct Slot {
    frame: Option<Frame>,
    closed: bool,
}

#[derive(Default)]
struct Stats {
    installed: AtomicUsize,
    taken: AtomicUsize,
    replaced: AtomicUsize,
}

/// Result of installing a frame
pub enum Install {
    /// The slot was empty
    Fresh,
    /// An unconsumed frame was displaced and handed back to the caller
    Replaced(Frame),
    /// The mailbox is closed; the frame is handed back untouched
    Closed(Frame),
}

impl Default for Mailbox {
    fn default() -> Self {
        Self::new()
    }
}

impl Mailbox {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot::default()),
            signal: Semaphore::new(0),
            stats: CachePadded::new(Stats::default()),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Slot> {
        // Two plain fields; a panicking holder cannot leave them torn.
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Producer: make `frame` the pending frame. Never waits on the consumer.
    pub fn install(&self, frame: Frame) -> Install {
        let previous = {
            let mut slot = self.slot();
            if slot.closed {
                return Install::Closed(frame);
            }
            slot.frame.replace(frame)
        };
        self.stats.installed.fetch_add(1, Ordering::Relaxed);
        if self.signal.available_permits() < MAX_PENDING_SIGNALS {
            self.signal.add_permits(1);
        }

        match previous {
            Some(old) => {
                self.stats.replaced.fetch_add(1, Ordering::Relaxed);
                Install::Replaced(old)
            }
            None => Install::Fresh,
        }
    }

    /// Consumer: take and clear the pending frame
    pub fn take(&self) -> Option<Frame> {
        let frame = self.slot().frame.take();
        if frame.is_some() {
            self.stats.taken.fetch_add(1, Ordering::Relaxed);
        }
        frame
    }

    /// Wait for one wake-up. Returns `false` once the mailbox is closed.
    pub async fn wait(&self) -> bool {
        match self.signal.acquire().await {
            Ok(permit) => {
                permit.forget();
                true
            }
            Err(_) => false,
        }
    }

    /// Reject further installs, release any waiting consumer and hand back
    /// the frame still pending, if any.
    pub fn close(&self) -> Option<Frame> {
        let pending = {
            let mut slot = self.slot();
            slot.closed = true;
            slot.frame.take()
        };
        self.signal.close();
        pending
    }

    pub fn is_pending(&self) -> bool {
        self.slot().frame.is_some()
    }

    /// (installed, taken, replaced)
    pub fn stats(&self) -> (usize, usize, usize) {
        (
            self.stats.installed.load(Ordering::Relaxed),
            self.stats.taken.load(Ordering::Relaxed),
            self.stats.replaced.load(Ordering::Relaxed),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{CameraId, FrameBuffer, FrameMetadata, PixelFormat};
    use std::time::{Duration, SystemTime};

    fn frame(sequence: u64) -> Frame {
        let meta = FrameMetadata {
            camera_id: CameraId::new("CAM-1").unwrap(),
            sequence,
            captured_at: SystemTime::now(),
            monotonic: Duration::from_millis(sequence),
            width: 2,
            height: 2,
            format: PixelFormat::Gray8,
        };
        Frame::new(meta, FrameBuffer::zeroed(4), 2).unwrap()
    }

    #[test]
    fn newest_frame_wins() {
        let mailbox = Mailbox::new();
        assert!(matches!(mailbox.install(frame(5)), Install::Fresh));
        match mailbox.install(frame(6)) {
            Install::Replaced(old) => assert_eq!(old.sequence(), 5),
            _ => panic!("expected the pending frame to be replaced"),
        }
        assert_eq!(mailbox.take().map(|f| f.sequence()), Some(6));
        assert!(mailbox.take().is_none());
        assert_eq!(mailbox.stats(), (2, 1, 1));
    }

    #[tokio::test]
    async fn coalesced_wakeups_are_harmless() {
        let mailbox = Mailbox::new();
        mailbox.install(frame(1));
        mailbox.install(frame(2));

        assert!(mailbox.wait().await);
        assert_eq!(mailbox.take().map(|f| f.sequence()), Some(2));

        // Second wake-up finds the slot already drained
        assert!(mailbox.wait().await);
        assert!(mailbox.take().is_none());
    }

    #[test]
    fn wakeups_are_bounded() {
        let mailbox = Mailbox::new();
        for seq in 0..(MAX_PENDING_SIGNALS as u64 * 4) {
            mailbox.install(frame(seq));
        }
        assert_eq!(mailbox.signal.available_permits(), MAX_PENDING_SIGNALS);
        assert!(mailbox.is_pending());
    }

    #[tokio::test]
    async fn close_releases_waiter_and_refuses_frames() {
        let mailbox = std::sync::Arc::new(Mailbox::new());
        let waiter = {
            let mailbox = mailbox.clone();
            tokio::spawn(async move { mailbox.wait().await })
        };
        tokio::task::yield_now().await;
        assert!(mailbox.close().is_none());
        assert!(!waiter.await.unwrap());

        match mailbox.install(frame(1)) {
            Install::Closed(f) => assert_eq!(f.sequence(), 1),
            _ => panic!("closed mailbox accepted a frame"),
        }
        assert!(!mailbox.is_pending());
    }

    #[test]
    fn close_hands_back_the_pending_frame() {
        let mailbox = Mailbox::new();
        mailbox.install(frame(4));
        assert_eq!(mailbox.close().map(|f| f.sequence()), Some(4));
        assert!(mailbox.close().is_none());
    }

    #[test]
    fn install_racing_close_never_leaves_a_frame_behind() {
        for _ in 0..200 {
            let mailbox = std::sync::Arc::new(Mailbox::new());
            let producer = {
                let mailbox = mailbox.clone();
                std::thread::spawn(move || {
                    for seq in 0.. {
                        if let Install::Closed(_) = mailbox.install(frame(seq)) {
                            return;
                        }
                    }
                })
            };
            std::thread::yield_now();
            drop(mailbox.close());
            producer.join().unwrap();
            assert!(!mailbox.is_pending());
        }
    }
}
