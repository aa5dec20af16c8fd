use std::sync::Arc;
use std::time::Duration;

use super::frame::BufferPool;
use super::source::CaptureSource;
use super::synthetic::{SyntheticCamera, SyntheticSettings};
use crate::error::ConfigError;
use crate::utils::MonotonicClock;
use crate::CameraProfile;

/// Capture back-ends selectable from configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Synthetic,
}

impl Provider {
    /// Case-insensitive provider lookup
    pub fn parse(camera: &str, name: &str) -> Result<Self, ConfigError> {
        if name.trim().eq_ignore_ascii_case("synthetic") {
            Ok(Provider::Synthetic)
        } else {
            Err(ConfigError::UnsupportedProvider {
                camera: camera.to_string(),
                provider: name.to_string(),
            })
        }
    }
}

/// Creates capture sources from camera profiles
pub trait SourceFactory: Send + Sync {
    fn create(&self, profile: &CameraProfile) -> Result<Box<dyn CaptureSource>, ConfigError>;
}

/// Builds capture sources for validated camera profiles
pub struct CameraFactory {
    clock: Arc<dyn MonotonicClock>,
    pool_size: usize,
    grace: Duration,
}

impl CameraFactory {
    pub fn new(clock: Arc<dyn MonotonicClock>, pool_size: usize, grace: Duration) -> Self {
        Self {
            clock,
            pool_size,
            grace,
        }
    }
}

impl SourceFactory for CameraFactory {
    fn create(&self, profile: &CameraProfile) -> Result<Box<dyn CaptureSource>, ConfigError> {
        let camera_id = profile.validate()?;
        match Provider::parse(camera_id.as_str(), &profile.provider)? {
            Provider::Synthetic => Ok(Box::new(SyntheticCamera::new(
                camera_id,
                SyntheticSettings {
                    width: profile.width,
                    height: profile.height,
                    fps: profile.target_fps,
                    format: profile.pixel_format,
                },
                Arc::clone(&self.clock),
                BufferPool::new(self.pool_size),
                self.grace,
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::SystemClock;

    fn factory() -> CameraFactory {
        CameraFactory::new(Arc::new(SystemClock), 2, Duration::from_secs(1))
    }

    #[test]
    fn provider_match_ignores_case() {
        assert_eq!(Provider::parse("CAM-1", " SYNTHETIC ").unwrap(), Provider::Synthetic);
    }

    #[test]
    fn creates_synthetic_source() {
        let source = factory().create(&CameraProfile::default()).unwrap();
        assert_eq!(source.camera_id().as_str(), "CAM-1");
    }

    #[test]
    fn rejects_unknown_provider() {
        let profile = CameraProfile {
            provider: "DirectShow".into(),
            ..CameraProfile::default()
        };
        assert!(matches!(
            factory().create(&profile),
            Err(ConfigError::UnsupportedProvider { .. })
        ));
    }
}
