//! Frame ingestion.
//!
//! Platform capture stacks (CameraX, AVFoundation, `getUserMedia`) push frames into
//! the pipeline through their own bridges. This module provides the in-process
//! pieces:
//! - `CameraSource`: a pull-style source, currently backed by the synthetic
//!   `stub://` scene used by the demo and the tests
//! - `normalize`: pixel format conversion, rotation, and mirroring for the preview
//!
//! Sources MUST NOT:
//! - Store frames to disk
//! - Log frame content

pub mod camera;
pub mod normalize;
mod synthetic;

pub use camera::{AcquireError, CameraConfig, CameraSource, SourceStats};
