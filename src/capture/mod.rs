pub mod factory;
pub mod frame;
pub mod source;
pub mod synthetic;

pub use factory::{CameraFactory, Provider, SourceFactory};
pub use frame::{BufferPool, BufferRecycler, CameraId, Frame, FrameBuffer, FrameMetadata, PixelFormat};
pub use source::{CaptureSource, FrameSink};
pub use synthetic::SyntheticCamera;
