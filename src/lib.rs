//! FaceCloak
//!
//! Live camera preview with every detected face covered by a pixelation or blur
//! patch, scaled and positioned against whatever preview rectangle the display
//! uses.
//!
//! # Architecture
//!
//! One session per active camera:
//!
//! ```text
//! CameraSource -> DetectionGate -> DetectorAdapter -> ResultSlot
//!                                                        |
//!                 PreviewGeometry -> CoordinateTransformer -> OverlayPlan -> Canvas
//! ```
//!
//! The pipeline holds these guarantees by construction:
//!
//! 1. **One detection in flight**: the gate admits a frame only when the previous
//!    detection has finished and the throttle interval has elapsed.
//! 2. **No stale faces**: results carry their session id; the slot refuses any
//!    result whose session has been superseded.
//! 3. **Boxes stay on the preview**: every transformed box lies inside the
//!    preview rectangle.
//! 4. **Detector failures are quiet**: timeouts, errors and an uninitialized
//!    backend all render as "no faces".
//!
//! # Module Structure
//!
//! - `geometry`: preview fitting and the box coordinate transform
//! - `frame`: owned pixel buffers (Frame, FrameView)
//! - `ingest`: frame sources and pixel normalization
//! - `detect`: backend trait, registry, and the timeout-bounded adapter
//! - `throttle`: the admission gate
//! - `session`: camera sessions, the result slot, and the `Pipeline`
//! - `overlay`: effect settings, draw commands, and the software canvas
//! - `state`: the immutable UI state record
//! - `config`: file and environment configuration

pub mod config;
pub mod detect;
pub mod frame;
pub mod geometry;
pub mod ingest;
pub mod overlay;
pub mod session;
pub mod state;
pub mod throttle;
pub mod ui;

pub use config::{FacecloakConfig, Platform};
pub use detect::{
    AdapterConfig, BackendRegistry, DetectionCapability, DetectionOutcome, DetectionResult,
    DetectorAdapter, DetectorBackend, FnBackend, StubBackend, UnavailableBackend,
};
pub use frame::{Frame, FrameInfo, FrameView, PixelFormat};
pub use geometry::{
    compute_preview_geometry, transform_box, CameraFacing, CoordinateTransformer, DetectedBox,
    FitMode, MirrorPolicy, Point, PreviewGeometry, Rotation, Size, TransformedBox,
};
pub use ingest::{AcquireError, CameraConfig, CameraSource};
pub use overlay::{Canvas, EffectKind, EffectSettings, Intensity, OverlayCommand, OverlayPlan};
pub use session::{
    CameraSession, FpsCounter, FrameDisposition, Pipeline, PipelineConfig, PipelineStats,
    ResultSlot, SessionId,
};
pub use state::{CameraStatus, StateCell, UiState};
pub use throttle::{DetectionGate, DetectionPermit, GateStats, DEFAULT_THROTTLE_INTERVAL};
