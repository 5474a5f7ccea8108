use std::time::Instant;

use crate::geometry::{CameraFacing, DetectedBox, Rotation, Size};
use crate::session::SessionId;

/// What a single detector invocation produced.
///
/// Every variant other than `Faces` renders as "no faces"; the distinction exists
/// for diagnostics and stats only.
#[derive(Clone, Debug, PartialEq)]
pub enum DetectionOutcome {
    Faces(Vec<DetectedBox>),
    NoFaces,
    TimedOut,
    Failed,
    Unavailable,
}

impl DetectionOutcome {
    pub fn boxes(&self) -> &[DetectedBox] {
        match self {
            DetectionOutcome::Faces(boxes) => boxes,
            _ => &[],
        }
    }

    pub fn face_count(&self) -> usize {
        self.boxes().len()
    }
}

/// Result of one detection, stamped with everything the render path needs to
/// place it against the current preview.
#[derive(Clone, Debug)]
pub struct DetectionResult {
    pub session: SessionId,
    pub frame_sequence: u64,
    pub frame_size: Size,
    pub rotation: Rotation,
    pub facing: CameraFacing,
    pub outcome: DetectionOutcome,
    pub captured_at: Instant,
}

impl DetectionResult {
    pub fn boxes(&self) -> &[DetectedBox] {
        self.outcome.boxes()
    }
}
