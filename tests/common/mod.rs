#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use bytes::BytesMut;
use framehub::capture::{BufferRecycler, FrameBuffer};
use framehub::{CameraId, Frame, FrameMetadata, PixelFormat};

pub const WIDTH: u32 = 8;
pub const HEIGHT: u32 = 4;

/// Stamps every buffer it hands out with a unique id and records each
/// release, failing loudly on a second release of the same buffer.
#[derive(Default)]
pub struct TrackingRecycler {
    next_id: AtomicU64,
    released: Mutex<HashSet<u64>>,
}

impl TrackingRecycler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn buffer(self: &Arc<Self>, len: usize) -> (u64, FrameBuffer) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut data = BytesMut::zeroed(len);
        data[..8].copy_from_slice(&id.to_le_bytes());
        (id, FrameBuffer::with_recycler(data, self.clone()))
    }

    pub fn issued(&self) -> u64 {
        self.next_id.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.lock().unwrap().len()
    }

    pub fn is_released(&self, id: u64) -> bool {
        self.released.lock().unwrap().contains(&id)
    }
}

impl BufferRecycler for TrackingRecycler {
    fn recycle(&self, data: BytesMut) {
        let id = buffer_id(&data);
        assert!(self.released.lock().unwrap().insert(id), "buffer {id} released twice");
    }
}

pub fn buffer_id(data: &[u8]) -> u64 {
    u64::from_le_bytes(data[..8].try_into().unwrap())
}

pub fn camera(name: &str) -> CameraId {
    CameraId::new(name).unwrap()
}

pub fn frame(recycler: &Arc<TrackingRecycler>, camera_id: &CameraId, sequence: u64) -> (u64, Frame) {
    let stride = WIDTH as usize * 4;
    let (id, buffer) = recycler.buffer(stride * HEIGHT as usize);
    let meta = FrameMetadata {
        camera_id: camera_id.clone(),
        sequence,
        captured_at: SystemTime::now(),
        monotonic: Duration::from_micros(sequence * 100),
        width: WIDTH,
        height: HEIGHT,
        format: PixelFormat::Bgra32,
    };
    (id, Frame::new(meta, buffer, stride).unwrap())
}

/// Poll `check` until it holds or `limit` elapses
pub async fn eventually(limit: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    check()
}
