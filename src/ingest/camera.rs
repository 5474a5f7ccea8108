//! Camera frame source.
//!
//! `CameraSource` hands out `Frame`s tagged with the configured rotation hint and
//! facing. `stub://` URLs select a synthetic scene; two reserved stub hosts emulate
//! acquisition failures:
//! - `stub://denied` fails `connect` with `AcquireError::PermissionDenied`
//! - `stub://unplugged` fails `connect` with `AcquireError::Unavailable`

use std::fmt;

use anyhow::{anyhow, Result};

use super::synthetic::SyntheticScene;
use crate::frame::{Frame, FrameInfo, PixelFormat};
use crate::geometry::{CameraFacing, Rotation};

/// Configuration for a camera source.
#[derive(Clone, Debug, PartialEq)]
pub struct CameraConfig {
    /// Source URL, e.g. "stub://front_camera".
    pub url: String,
    pub width: u32,
    pub height: u32,
    /// Target frame rate; the caller paces `next_frame` calls to it.
    pub target_fps: u32,
    pub format: PixelFormat,
    /// Rotation hint delivered with every frame.
    pub rotation: Rotation,
    pub facing: CameraFacing,
    /// Synthetic scene seed. `None` picks a random one.
    pub seed: Option<u64>,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            url: "stub://camera".to_string(),
            width: 1280,
            height: 720,
            target_fps: 30,
            format: PixelFormat::Nv21,
            rotation: Rotation::Deg90,
            facing: CameraFacing::Back,
            seed: None,
        }
    }
}

/// Resource-acquisition failures. These are the only camera errors surfaced to
/// the user; everything per-frame is absorbed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AcquireError {
    PermissionDenied,
    Unavailable(String),
}

impl fmt::Display for AcquireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AcquireError::PermissionDenied => f.write_str("camera permission denied"),
            AcquireError::Unavailable(reason) => write!(f, "camera unavailable: {}", reason),
        }
    }
}

impl std::error::Error for AcquireError {}

/// Frame statistics for a camera source.
#[derive(Clone, Debug)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub url: String,
    pub facing: CameraFacing,
}

/// Camera frame source.
#[derive(Debug)]
pub struct CameraSource {
    config: CameraConfig,
    backend: CameraBackend,
    connected: bool,
    frames_captured: u64,
}

#[derive(Debug)]
enum CameraBackend {
    Synthetic(SyntheticScene),
}

impl CameraSource {
    pub fn new(config: CameraConfig) -> Result<Self> {
        if config.width == 0 || config.height == 0 {
            return Err(anyhow!("camera frame size must be non-zero"));
        }
        config.format.expected_len(config.width, config.height)?;

        if !config.url.starts_with("stub://") {
            return Err(anyhow!(
                "camera url '{}' needs a platform capture bridge; push frames into the pipeline directly",
                config.url
            ));
        }

        let seed = config.seed.unwrap_or_else(rand::random::<u64>);
        let scene = SyntheticScene::new(&config.url, seed, config.width, config.height);
        Ok(Self {
            config,
            backend: CameraBackend::Synthetic(scene),
            connected: false,
            frames_captured: 0,
        })
    }

    pub fn config(&self) -> &CameraConfig {
        &self.config
    }

    /// Acquire the camera. Failures carry an `AcquireError`.
    pub fn connect(&mut self) -> Result<()> {
        match self.config.url.as_str() {
            "stub://denied" => return Err(AcquireError::PermissionDenied.into()),
            "stub://unplugged" => {
                return Err(AcquireError::Unavailable("no camera attached".to_string()).into())
            }
            _ => {}
        }
        self.connected = true;
        log::info!(
            "CameraSource: connected to {} ({} camera, {}x{} {:?}, rotation {})",
            self.config.url,
            self.config.facing,
            self.config.width,
            self.config.height,
            self.config.format,
            self.config.rotation
        );
        Ok(())
    }

    /// Capture the next frame.
    pub fn next_frame(&mut self) -> Result<Frame> {
        if !self.connected {
            return Err(anyhow!("camera source {} is not connected", self.config.url));
        }
        self.frames_captured += 1;
        let CameraBackend::Synthetic(scene) = &self.backend;
        let pixels = scene.render(self.frames_captured, self.config.format);
        Frame::new(pixels, self.frame_info(), self.frames_captured)
    }

    /// Release the camera. Subsequent `next_frame` calls fail until reconnected.
    pub fn disconnect(&mut self) {
        if self.connected {
            log::info!("CameraSource: released {}", self.config.url);
        }
        self.connected = false;
    }

    pub fn is_healthy(&self) -> bool {
        self.connected
    }

    pub fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frames_captured,
            url: self.config.url.clone(),
            facing: self.config.facing,
        }
    }

    fn frame_info(&self) -> FrameInfo {
        FrameInfo {
            width: self.config.width,
            height: self.config.height,
            format: self.config.format,
            rotation: self.config.rotation,
            facing: self.config.facing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(url: &str) -> CameraConfig {
        CameraConfig {
            url: url.to_string(),
            width: 64,
            height: 48,
            seed: Some(7),
            ..CameraConfig::default()
        }
    }

    #[test]
    fn synthetic_source_produces_tagged_frames() {
        let mut source = CameraSource::new(config("stub://test")).unwrap();
        source.connect().unwrap();
        let frame = source.next_frame().unwrap();
        assert_eq!(frame.width(), 64);
        assert_eq!(frame.rotation(), Rotation::Deg90);
        assert_eq!(frame.sequence(), 1);
        assert_eq!(source.stats().frames_captured, 1);
    }

    #[test]
    fn denied_source_reports_permission_error() {
        let mut source = CameraSource::new(config("stub://denied")).unwrap();
        let err = source.connect().unwrap_err();
        assert_eq!(
            err.downcast_ref::<AcquireError>(),
            Some(&AcquireError::PermissionDenied)
        );
        assert!(source.next_frame().is_err());
    }

    #[test]
    fn non_stub_urls_are_rejected() {
        assert!(CameraSource::new(config("rtsp://camera")).is_err());
    }

    #[test]
    fn disconnect_stops_frames() {
        let mut source = CameraSource::new(config("stub://test")).unwrap();
        source.connect().unwrap();
        source.disconnect();
        assert!(!source.is_healthy());
        assert!(source.next_frame().is_err());
    }
}
