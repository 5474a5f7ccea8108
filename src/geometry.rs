//! Frame-to-screen geometry.
//!
//! Two pure calculations live here:
//!
//! - `PreviewGeometry::fit`: where the live video lands inside the screen once the
//!   camera's aspect ratio is fitted into the available area (letterbox/pillarbox).
//! - `CoordinateTransformer::transform`: maps a `DetectedBox` from the native pixel
//!   space of a possibly-rotated, possibly-mirrored camera frame into screen space.
//!
//! Neither function allocates, locks, or fails. Degenerate inputs collapse to
//! defined fallbacks so the render loop can call them unconditionally.

use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

// ----------------------------------------------------------------------------
// Primitive types
// ----------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const ORIGIN: Point = Point { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// Integer pixel dimensions, as delivered by a camera buffer.
    pub fn from_pixels(width: u32, height: u32) -> Self {
        Self::new(width as f32, height as f32)
    }

    /// Zero, negative, or non-finite in either dimension.
    pub fn is_degenerate(&self) -> bool {
        !(self.width.is_finite() && self.height.is_finite())
            || self.width <= 0.0
            || self.height <= 0.0
    }

    /// Landscape-major layout: width strictly greater than height.
    pub fn is_landscape(&self) -> bool {
        self.width > self.height
    }

    pub fn swapped(&self) -> Self {
        Self::new(self.height, self.width)
    }

    /// Portrait-relative orientation: swaps the axes when the size is landscape.
    pub fn portrait_relative(&self) -> Self {
        if self.is_landscape() {
            self.swapped()
        } else {
            *self
        }
    }

    /// Width over height. Meaningless for degenerate sizes.
    pub fn aspect(&self) -> f32 {
        self.width / self.height
    }
}

/// Rotation hint attached to a camera frame: how far the buffer must be rotated
/// clockwise to appear upright.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    pub fn degrees(self) -> u32 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }

    /// 90 or 270: the upright image has its axes swapped relative to the buffer.
    pub fn is_quarter_turn(self) -> bool {
        matches!(self, Rotation::Deg90 | Rotation::Deg270)
    }

    pub fn from_degrees(degrees: u32) -> Result<Self> {
        match degrees {
            0 => Ok(Rotation::Deg0),
            90 => Ok(Rotation::Deg90),
            180 => Ok(Rotation::Deg180),
            270 => Ok(Rotation::Deg270),
            other => Err(anyhow!(
                "rotation must be one of 0, 90, 180, 270 (got {})",
                other
            )),
        }
    }
}

impl TryFrom<u32> for Rotation {
    type Error = anyhow::Error;

    fn try_from(degrees: u32) -> Result<Self> {
        Self::from_degrees(degrees)
    }
}

impl From<Rotation> for u32 {
    fn from(rotation: Rotation) -> Self {
        rotation.degrees()
    }
}

impl fmt::Display for Rotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}°", self.degrees())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraFacing {
    Front,
    #[default]
    Back,
}

impl CameraFacing {
    pub fn toggled(self) -> Self {
        match self {
            CameraFacing::Front => CameraFacing::Back,
            CameraFacing::Back => CameraFacing::Front,
        }
    }

    pub fn is_front(self) -> bool {
        self == CameraFacing::Front
    }
}

impl FromStr for CameraFacing {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "front" | "user" => Ok(CameraFacing::Front),
            "back" | "rear" | "environment" => Ok(CameraFacing::Back),
            other => Err(anyhow!("unknown camera facing '{}'", other)),
        }
    }
}

impl fmt::Display for CameraFacing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraFacing::Front => f.write_str("front"),
            CameraFacing::Back => f.write_str("back"),
        }
    }
}

// ----------------------------------------------------------------------------
// Boxes
// ----------------------------------------------------------------------------

/// Face bounding box in the native pixel space of the frame it was detected in.
/// Origin top-left.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectedBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl DetectedBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.width.is_finite() && self.height.is_finite()
    }

    /// True when both dimensions reach `min_side` native pixels.
    pub fn meets_min_size(&self, min_side: f32) -> bool {
        self.width >= min_side && self.height >= min_side
    }

    /// Re-express a box found in a `buffer`-sized image in the coordinates of the
    /// upright image obtained by rotating the buffer clockwise by `rotation`.
    ///
    /// Platform detectors report boxes this way once they are given a rotation hint.
    pub fn rotated_upright(&self, buffer: Size, rotation: Rotation) -> Self {
        let (w, h) = (buffer.width, buffer.height);
        match rotation {
            Rotation::Deg0 => *self,
            Rotation::Deg90 => Self::new(h - self.y - self.height, self.x, self.height, self.width),
            Rotation::Deg180 => Self::new(
                w - self.x - self.width,
                h - self.y - self.height,
                self.width,
                self.height,
            ),
            Rotation::Deg270 => Self::new(self.y, w - self.x - self.width, self.height, self.width),
        }
    }
}

/// Box in screen space, ready for the overlay renderer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TransformedBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl TransformedBox {
    fn collapsed_at(origin: Point) -> Self {
        let origin = if origin.is_finite() {
            origin
        } else {
            Point::ORIGIN
        };
        Self {
            x: origin.x,
            y: origin.y,
            width: 0.0,
            height: 0.0,
        }
    }

    /// Zero area. The renderer skips these.
    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }
}

// ----------------------------------------------------------------------------
// Preview geometry
// ----------------------------------------------------------------------------

/// How the camera image is fitted into the screen.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FitMode {
    /// Largest aspect-preserving rectangle inside the screen (letterbox/pillarbox).
    #[default]
    Contain,
    /// Smallest aspect-preserving rectangle covering the screen. Offsets may be negative.
    Cover,
}

impl FromStr for FitMode {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "contain" => Ok(FitMode::Contain),
            "cover" => Ok(FitMode::Cover),
            other => Err(anyhow!("unknown fit mode '{}'", other)),
        }
    }
}

/// Rectangle within the screen where the live video is actually rendered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PreviewGeometry {
    pub offset: Point,
    pub size: Size,
}

impl PreviewGeometry {
    pub fn new(offset: Point, size: Size) -> Self {
        Self { offset, size }
    }

    /// Full-bleed geometry covering `screen` from the origin.
    pub fn full_bleed(screen: Size) -> Self {
        Self::new(Point::ORIGIN, screen)
    }

    /// Fit `native` into `screen`, centered.
    ///
    /// A degenerate `native` (or `screen`) yields `screen` unchanged.
    pub fn fit(native: Size, screen: Size, mode: FitMode) -> Self {
        if native.is_degenerate() || screen.is_degenerate() {
            return Self::full_bleed(screen);
        }

        let native_aspect = native.aspect();
        let native_is_wider = native_aspect > screen.aspect();
        let fit_width = match mode {
            FitMode::Contain => native_is_wider,
            FitMode::Cover => !native_is_wider,
        };

        let fitted = if fit_width {
            Size::new(screen.width, screen.width / native_aspect)
        } else {
            Size::new(screen.height * native_aspect, screen.height)
        };

        let offset = Point::new(
            (screen.width - fitted.width) / 2.0,
            (screen.height - fitted.height) / 2.0,
        );
        Self::new(offset, fitted)
    }

    /// Fit a camera preview size, first swapping it to portrait-relative orientation.
    pub fn fit_camera(native: Size, screen: Size, mode: FitMode) -> Self {
        Self::fit(native.portrait_relative(), screen, mode)
    }

    pub fn right(&self) -> f32 {
        self.offset.x + self.size.width
    }

    pub fn bottom(&self) -> f32 {
        self.offset.y + self.size.height
    }

    fn is_degenerate(&self) -> bool {
        self.size.is_degenerate() || !self.offset.is_finite()
    }
}

/// Letterbox fit (`FitMode::Contain`) of an already portrait-relative `native` size.
pub fn compute_preview_geometry(native: Size, screen: Size) -> PreviewGeometry {
    PreviewGeometry::fit(native, screen, FitMode::Contain)
}

// ----------------------------------------------------------------------------
// Coordinate transform
// ----------------------------------------------------------------------------

/// When a front-camera box must be flipped horizontally.
///
/// Sensor conventions differ per platform: some stacks deliver landscape-major
/// buffers whose front-camera output is mirrored relative to the detector, others
/// deliver portrait buffers that need no correction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MirrorPolicy {
    /// Flip front-camera boxes only when the frame is landscape-major.
    #[default]
    LandscapeFrontOnly,
    /// Flip every front-camera box.
    FrontAlways,
    /// Never flip.
    Never,
}

impl MirrorPolicy {
    pub fn should_mirror(self, facing: CameraFacing, landscape_major: bool) -> bool {
        match self {
            MirrorPolicy::LandscapeFrontOnly => facing.is_front() && landscape_major,
            MirrorPolicy::FrontAlways => facing.is_front(),
            MirrorPolicy::Never => false,
        }
    }
}

impl FromStr for MirrorPolicy {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "landscape-front-only" | "landscape_front_only" => Ok(MirrorPolicy::LandscapeFrontOnly),
            "front-always" | "front_always" => Ok(MirrorPolicy::FrontAlways),
            "never" => Ok(MirrorPolicy::Never),
            other => Err(anyhow!("unknown mirror policy '{}'", other)),
        }
    }
}

/// Maps detector output into preview space under a platform's mirror policy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CoordinateTransformer {
    mirror: MirrorPolicy,
}

impl CoordinateTransformer {
    pub fn new(mirror: MirrorPolicy) -> Self {
        Self { mirror }
    }

    pub fn mirror_policy(&self) -> MirrorPolicy {
        self.mirror
    }

    /// Transform `detected` from native frame space into screen space.
    ///
    /// The result always lies inside `preview`. A zero-sized frame or preview, or a
    /// non-finite box, yields a zero-sized box at the preview offset.
    pub fn transform(
        &self,
        detected: &DetectedBox,
        frame_size: Size,
        rotation: Rotation,
        facing: CameraFacing,
        preview: &PreviewGeometry,
    ) -> TransformedBox {
        if frame_size.is_degenerate() || preview.is_degenerate() || !detected.is_finite() {
            return TransformedBox::collapsed_at(preview.offset);
        }

        // Box coordinates stay in the buffer's axes, but a quarter-turned
        // landscape buffer is displayed against portrait logical dimensions.
        let landscape_major = frame_size.is_landscape();
        let effective = if rotation.is_quarter_turn() && landscape_major {
            frame_size.swapped()
        } else {
            frame_size
        };

        let scale_x = preview.size.width / effective.width;
        let scale_y = preview.size.height / effective.height;

        let mut left = detected.x * scale_x;
        let top = detected.y * scale_y;
        let width = detected.width * scale_x;
        let height = detected.height * scale_y;

        if self.mirror.should_mirror(facing, landscape_major) {
            left = preview.size.width - left - width;
        }

        clamp_to_preview(
            left + preview.offset.x,
            top + preview.offset.y,
            width,
            height,
            preview,
        )
    }

    /// Transform a batch, dropping boxes that collapse to zero area.
    pub fn transform_visible(
        &self,
        boxes: &[DetectedBox],
        frame_size: Size,
        rotation: Rotation,
        facing: CameraFacing,
        preview: &PreviewGeometry,
    ) -> Vec<TransformedBox> {
        boxes
            .iter()
            .map(|b| self.transform(b, frame_size, rotation, facing, preview))
            .filter(|b| !b.is_empty())
            .collect()
    }
}

/// `CoordinateTransformer::transform` under the default mirror policy.
pub fn transform_box(
    detected: &DetectedBox,
    frame_size: Size,
    rotation: Rotation,
    facing: CameraFacing,
    preview: &PreviewGeometry,
) -> TransformedBox {
    CoordinateTransformer::default().transform(detected, frame_size, rotation, facing, preview)
}

fn clamp_to_preview(
    left: f32,
    top: f32,
    width: f32,
    height: f32,
    preview: &PreviewGeometry,
) -> TransformedBox {
    let (min_x, max_x) = (preview.offset.x, preview.right());
    let (min_y, max_y) = (preview.offset.y, preview.bottom());

    let x0 = clamp_finite(left, min_x, max_x);
    let x1 = clamp_finite(left + width, min_x, max_x);
    let y0 = clamp_finite(top, min_y, max_y);
    let y1 = clamp_finite(top + height, min_y, max_y);

    TransformedBox {
        x: x0,
        y: y0,
        width: (x1 - x0).max(0.0),
        height: (y1 - y0).max(0.0),
    }
}

// NaN collapses to the lower bound.
fn clamp_finite(value: f32, min: f32, max: f32) -> f32 {
    if value.is_nan() {
        min
    } else {
        value.max(min).min(max)
    }
}
