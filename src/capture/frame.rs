use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use bytes::BytesMut;
use crossbeam::queue::ArrayQueue;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, FrameError};

/// Camera identifier: trimmed, case-sensitive, cheap to clone.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CameraId(Arc<str>);

impl CameraId {
    pub fn new(value: &str) -> Result<Self, ConfigError> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(ConfigError::BlankCameraId);
        }
        Ok(Self(Arc::from(trimmed)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CameraId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for CameraId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", &*self.0)
    }
}

impl Serialize for CameraId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

/// Pixel formats we support
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    #[serde(alias = "BGRA32", alias = "Bgra32")]
    Bgra32,
    #[serde(alias = "RGB24", alias = "Rgb24")]
    Rgb24,
    #[serde(alias = "BGR24", alias = "Bgr24")]
    Bgr24,
    #[serde(alias = "GRAY8", alias = "Gray8")]
    Gray8,
}

impl PixelFormat {
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Bgra32 => 4,
            PixelFormat::Rgb24 | PixelFormat::Bgr24 => 3,
            PixelFormat::Gray8 => 1,
        }
    }
}

/// Frame metadata, fixed at the moment of capture
#[derive(Debug, Clone)]
pub struct FrameMetadata {
    pub camera_id: CameraId,
    /// Per-camera, monotonically increasing
    pub sequence: u64,
    /// Wall-clock capture time. Informational only; never used for deltas.
    pub captured_at: SystemTime,
    /// Monotonic capture time, authoritative for interval and rate math
    pub monotonic: Duration,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

impl FrameMetadata {
    /// Smallest legal stride for this geometry
    pub fn packed_stride(&self) -> usize {
        self.width as usize * self.format.bytes_per_pixel()
    }
}

/// Receives buffers back when their owning `FrameBuffer` is dropped.
pub trait BufferRecycler: Send + Sync {
    fn recycle(&self, data: BytesMut);
}

/// Exclusively-owned pixel storage.
///
/// Not `Clone`: moving the buffer is the only way to hand it on, so exactly
/// one holder exists at any instant. The allocation is released (or handed
/// to its recycler) exactly once, when the buffer is dropped.
pub struct FrameBuffer {
    data: BytesMut,
    recycler: Option<Arc<dyn BufferRecycler>>,
}

impl FrameBuffer {
    pub fn zeroed(len: usize) -> Self {
        Self {
            data: BytesMut::zeroed(len),
            recycler: None,
        }
    }

    pub fn with_recycler(data: BytesMut, recycler: Arc<dyn BufferRecycler>) -> Self {
        Self {
            data,
            recycler: Some(recycler),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl From<Vec<u8>> for FrameBuffer {
    fn from(data: Vec<u8>) -> Self {
        Self {
            data: BytesMut::from(&data[..]),
            recycler: None,
        }
    }
}

impl Drop for FrameBuffer {
    fn drop(&mut self) {
        if let Some(recycler) = self.recycler.take() {
            recycler.recycle(std::mem::take(&mut self.data));
        }
    }
}

impl fmt::Debug for FrameBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameBuffer")
            .field("len", &self.data.len())
            .field("pooled", &self.recycler.is_some())
            .finish()
    }
}

/// Bounded pool of frame allocations
pub struct BufferPool {
    free: ArrayQueue<BytesMut>,
}

impl BufferPool {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            free: ArrayQueue::new(capacity.max(1)),
        })
    }

    /// Take a zero-filled buffer of exactly `len` bytes, reusing a pooled
    /// allocation when one is available.
    pub fn acquire(self: &Arc<Self>, len: usize) -> FrameBuffer {
        let mut data = self.free.pop().unwrap_or_default();
        data.clear();
        data.resize(len, 0);
        FrameBuffer::with_recycler(data, Arc::clone(self) as Arc<dyn BufferRecycler>)
    }

    pub fn idle(&self) -> usize {
        self.free.len()
    }
}

impl BufferRecycler for BufferPool {
    fn recycle(&self, data: BytesMut) {
        // Full pool: let the allocation go.
        let _ = self.free.push(data);
    }
}

/// A captured frame: metadata plus its exclusively-owned pixels.
#[derive(Debug)]
pub struct Frame {
    meta: FrameMetadata,
    buffer: FrameBuffer,
    stride: usize,
}

impl Frame {
    /// Validates that `buffer` is exactly `height * stride` bytes and that
    /// `stride` holds at least one packed row.
    pub fn new(meta: FrameMetadata, buffer: FrameBuffer, stride: usize) -> Result<Self, FrameError> {
        if meta.width == 0 || meta.height == 0 {
            return Err(FrameError::EmptyDimensions {
                width: meta.width,
                height: meta.height,
            });
        }

        let min = meta.packed_stride();
        if stride < min {
            return Err(FrameError::StrideTooSmall { stride, min });
        }

        let expected = meta.height as usize * stride;
        if buffer.len() != expected {
            return Err(FrameError::BufferSize {
                expected,
                actual: buffer.len(),
            });
        }

        Ok(Self {
            meta,
            buffer,
            stride,
        })
    }

    pub fn metadata(&self) -> &FrameMetadata {
        &self.meta
    }

    pub fn camera_id(&self) -> &CameraId {
        &self.meta.camera_id
    }

    pub fn sequence(&self) -> u64 {
        self.meta.sequence
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn data(&self) -> &[u8] {
        self.buffer.as_slice()
    }

    /// Pixel bytes of row `y`, without stride padding
    pub fn row(&self, y: u32) -> Option<&[u8]> {
        if y >= self.meta.height {
            return None;
        }
        let start = y as usize * self.stride;
        self.data().get(start..start + self.meta.packed_stride())
    }
}
