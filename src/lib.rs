pub mod capture;
pub mod diagnostics;
pub mod error;
pub mod pipeline;
mod registry;
pub mod system;
pub mod utils;

use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use capture::{CameraId, Frame, FrameMetadata, PixelFormat};
pub use diagnostics::{CameraHealth, Diagnostics, HealthState};
pub use error::{CaptureError, ConfigError, FrameError, HubError, PipelineError, SystemError};
pub use pipeline::{FrameHub, FramePipeline};
pub use system::CameraSystem;

use capture::Provider;

/// Environment override prefix, e.g. `FRAMEHUB__PIPELINE__SHUTDOWN_GRACE_MS`
pub const ENV_PREFIX: &str = "FRAMEHUB";

const DIMENSION_RANGE: (u32, u32) = (16, 8192);
const FPS_RANGE: (u32, u32) = (1, 500);

/// System configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub pipeline: PipelineConfig,
    pub diagnostics: DiagnosticsConfig,
    pub cameras: Vec<CameraProfile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// How long a stopping loop may take to observe cancellation
    pub shutdown_grace_ms: u64,
    /// Idle buffers kept per camera for reuse
    pub buffer_pool_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    pub health_publish_hz: u32,
    /// No frame for this long marks a camera Disconnected; 0 disables
    pub disconnect_timeout_ms: u64,
}

/// One camera as configured
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraProfile {
    pub camera_id: String,
    pub provider: String,
    pub width: u32,
    pub height: u32,
    pub target_fps: u32,
    pub pixel_format: PixelFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig::default(),
            diagnostics: DiagnosticsConfig::default(),
            cameras: vec![CameraProfile::default()],
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            shutdown_grace_ms: 2000,
            buffer_pool_size: 4,
        }
    }
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            health_publish_hz: 5,
            disconnect_timeout_ms: 2000,
        }
    }
}

impl Default for CameraProfile {
    fn default() -> Self {
        Self {
            camera_id: "CAM-1".into(),
            provider: "synthetic".into(),
            width: 640,
            height: 480,
            target_fps: 120,
            pixel_format: PixelFormat::Bgra32,
        }
    }
}

impl Config {
    /// Load from a TOML file (optional) with `FRAMEHUB__*` environment
    /// overrides, then validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cameras.is_empty() {
            return Err(ConfigError::NoCameras);
        }

        let mut seen = BTreeSet::new();
        for profile in &self.cameras {
            let id = profile.validate()?;
            Provider::parse(id.as_str(), &profile.provider)?;
            if !seen.insert(id.clone()) {
                return Err(ConfigError::DuplicateCamera(id.to_string()));
            }
        }
        Ok(())
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.pipeline.shutdown_grace_ms)
    }
}

impl CameraProfile {
    /// Check geometry and rate limits, returning the normalized camera id
    pub fn validate(&self) -> Result<CameraId, ConfigError> {
        let id = CameraId::new(&self.camera_id)?;
        in_range(&id, "width", self.width, DIMENSION_RANGE)?;
        in_range(&id, "height", self.height, DIMENSION_RANGE)?;
        in_range(&id, "target_fps", self.target_fps, FPS_RANGE)?;
        Ok(id)
    }
}

fn in_range(camera: &CameraId, field: &'static str, value: u32, (min, max): (u32, u32)) -> Result<(), ConfigError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            camera: camera.to_string(),
            field,
            value,
            min,
            max,
        })
    }
}
