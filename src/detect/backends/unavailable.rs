use anyhow::{anyhow, Result};

use crate::detect::backend::{DetectionCapability, DetectorBackend};
use crate::frame::FrameInfo;
use crate::geometry::DetectedBox;

/// Stand-in for a platform detector that is not initialized (model still
/// downloading, native library missing). Every frame yields no faces.
#[derive(Default)]
pub struct UnavailableBackend {
    reason: Option<String>,
}

impl UnavailableBackend {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
        }
    }
}

impl DetectorBackend for UnavailableBackend {
    fn name(&self) -> &'static str {
        "unavailable"
    }

    fn supports(&self, capability: DetectionCapability) -> bool {
        matches!(capability, DetectionCapability::FaceBounds)
    }

    fn is_ready(&self) -> bool {
        false
    }

    fn detect(&mut self, _pixels: &[u8], _info: &FrameInfo) -> Result<Vec<DetectedBox>> {
        Err(anyhow!(
            "detector not initialized: {}",
            self.reason.as_deref().unwrap_or("no backend loaded")
        ))
    }
}
