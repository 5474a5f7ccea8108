use anyhow::Result;

use crate::detect::backend::{DetectionCapability, DetectorBackend};
use crate::frame::FrameInfo;
use crate::geometry::DetectedBox;

/// Backend wrapping a closure.
///
/// Platform bindings hand their native detector call in here instead of
/// implementing the trait themselves.
pub struct FnBackend<F> {
    name: &'static str,
    detect: F,
}

impl<F> FnBackend<F>
where
    F: FnMut(&[u8], &FrameInfo) -> Result<Vec<DetectedBox>> + Send,
{
    pub fn new(name: &'static str, detect: F) -> Self {
        Self { name, detect }
    }
}

impl<F> DetectorBackend for FnBackend<F>
where
    F: FnMut(&[u8], &FrameInfo) -> Result<Vec<DetectedBox>> + Send,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn supports(&self, capability: DetectionCapability) -> bool {
        matches!(capability, DetectionCapability::FaceBounds)
    }

    fn detect(&mut self, pixels: &[u8], info: &FrameInfo) -> Result<Vec<DetectedBox>> {
        (self.detect)(pixels, info)
    }
}
