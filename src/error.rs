use thiserror::Error;

use crate::capture::CameraId;

/// Startup configuration problems. These are the only errors allowed to
/// abort the whole system start.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no cameras configured (see [[cameras]] in the config file)")]
    NoCameras,

    #[error("camera id must not be blank")]
    BlankCameraId,

    #[error("camera {0} is configured more than once")]
    DuplicateCamera(String),

    #[error("camera {camera}: provider '{provider}' not implemented")]
    UnsupportedProvider { camera: String, provider: String },

    #[error("camera {camera}: {field} = {value}, expected {min}..={max}")]
    OutOfRange {
        camera: String,
        field: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },

    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

/// A frame whose geometry does not match its buffer.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame dimensions must be non-zero ({width}x{height})")]
    EmptyDimensions { width: u32, height: u32 },

    #[error("stride {stride} is smaller than a packed row ({min} bytes)")]
    StrideTooSmall { stride: usize, min: usize },

    #[error("buffer holds {actual} bytes, expected height * stride = {expected}")]
    BufferSize { expected: usize, actual: usize },
}

#[derive(Debug, Error)]
pub enum HubError {
    #[error("camera {0} is not registered with the frame hub")]
    UnknownCamera(CameraId),

    #[error("camera {camera}: frame {sequence} is older than published frame {current}")]
    StaleFrame {
        camera: CameraId,
        sequence: u64,
        current: u64,
    },
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("capture source already started")]
    AlreadyStarted,

    #[error("invalid frame: {0}")]
    Frame(#[from] FrameError),

    #[error("frame from camera {actual} submitted to the pipeline of {expected}")]
    ForeignFrame { expected: CameraId, actual: CameraId },

    #[error("capture task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("capture loop did not stop within {0:?}")]
    StopTimeout(std::time::Duration),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    /// A stopped pipeline has closed its mailbox for good
    #[error("pipeline for camera {0} was stopped and cannot be restarted")]
    Stopped(CameraId),
}

#[derive(Debug, Error)]
pub enum SystemError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("startup cancelled")]
    Cancelled,

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}
