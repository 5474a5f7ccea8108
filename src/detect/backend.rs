use anyhow::Result;

use crate::frame::FrameInfo;
use crate::geometry::DetectedBox;

/// Detection capabilities a backend may offer.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DetectionCapability {
    /// Axis-aligned face bounding boxes.
    FaceBounds,
    /// Per-face landmark points. No built-in backend provides these.
    FaceLandmarks,
}

/// Face detector backend trait.
///
/// This is the seam platform bridges implement: ML Kit behind JNI on Android, the
/// Vision/ML Kit pod on iOS, MediaPipe through `wasm-bindgen` on the web. The
/// pipeline treats every backend as an opaque, possibly slow, possibly failing
/// capability.
///
/// # Contract
///
/// - `detect` receives the frame bytes for the duration of the call only.
/// - Boxes use the frame's pixel space with the rotation hint applied, origin
///   top-left, which is how platform detectors report them.
/// - Errors are per-frame. The adapter logs them and renders no faces.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Returns true when the backend supports a capability.
    fn supports(&self, capability: DetectionCapability) -> bool;

    /// False while the underlying model is still loading or failed to load.
    fn is_ready(&self) -> bool {
        true
    }

    fn detect(&mut self, pixels: &[u8], info: &FrameInfo) -> Result<Vec<DetectedBox>>;

    /// Optional warm-up hook, run once on the inference thread.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }

    /// Release native resources. Called once when the owning session ends.
    fn release(&mut self) {}
}
