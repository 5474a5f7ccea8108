//! Camera frame container.
//!
//! - `Frame`: one camera buffer plus the metadata the pipeline needs (size, pixel
//!   format, rotation hint, facing). Bytes are private and wiped on drop.
//! - `FrameView`: what the detector adapter and preview path receive. It can run a
//!   detector or produce an RGB copy for the preview, and nothing else.
//!
//! There is no `Clone` and no byte accessor on `Frame`; frames are handed around as
//! `Arc<Frame>` between the camera path and the detection worker.

use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::detect::DetectorBackend;
use crate::geometry::{CameraFacing, DetectedBox, Rotation, Size};
use crate::ingest::normalize::normalize_to_rgb;

/// Pixel layouts delivered by the supported camera stacks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    #[default]
    Rgb24,
    /// Browser canvas `ImageData`.
    Rgba32,
    /// iOS `kCVPixelFormatType_32BGRA`.
    Bgra32,
    Nv12,
    /// Android camera default.
    Nv21,
    Gray8,
}

impl PixelFormat {
    /// Exact buffer length for a `width` x `height` frame.
    pub fn expected_len(self, width: u32, height: u32) -> Result<usize> {
        let pixels = (width as usize)
            .checked_mul(height as usize)
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        let len = match self {
            PixelFormat::Rgb24 => pixels.checked_mul(3),
            PixelFormat::Rgba32 | PixelFormat::Bgra32 => pixels.checked_mul(4),
            PixelFormat::Nv12 | PixelFormat::Nv21 => {
                if width % 2 != 0 || height % 2 != 0 {
                    return Err(anyhow!(
                        "{:?} frames need even dimensions, got {}x{}",
                        self,
                        width,
                        height
                    ));
                }
                pixels.checked_add(pixels / 2)
            }
            PixelFormat::Gray8 => Some(pixels),
        };
        len.ok_or_else(|| anyhow!("frame dimensions overflow"))
    }
}

impl FromStr for PixelFormat {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "rgb24" | "rgb" => Ok(PixelFormat::Rgb24),
            "rgba32" | "rgba" => Ok(PixelFormat::Rgba32),
            "bgra32" | "bgra" => Ok(PixelFormat::Bgra32),
            "nv12" => Ok(PixelFormat::Nv12),
            "nv21" => Ok(PixelFormat::Nv21),
            "gray8" | "gray" => Ok(PixelFormat::Gray8),
            other => Err(anyhow!("unknown pixel format '{}'", other)),
        }
    }
}

/// Camera-side metadata describing a buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameInfo {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub rotation: Rotation,
    pub facing: CameraFacing,
}

// ----------------------------------------------------------------------------
// Frame
// ----------------------------------------------------------------------------

/// One camera buffer. Bytes are private; there is no `Clone` and no byte accessor.
pub struct Frame {
    data: Vec<u8>,
    info: FrameInfo,
    sequence: u64,
    captured_at: Instant,
}

impl Frame {
    /// Wrap a camera buffer. Fails if the byte length does not match the format.
    pub fn new(data: Vec<u8>, info: FrameInfo, sequence: u64) -> Result<Self> {
        let expected = info.format.expected_len(info.width, info.height)?;
        if data.len() != expected {
            let mut data = data;
            data.zeroize();
            return Err(anyhow!(
                "{:?} frame {}x{} expects {} bytes, received {}",
                info.format,
                info.width,
                info.height,
                expected,
                data.len()
            ));
        }
        Ok(Self {
            data,
            info,
            sequence,
            captured_at: Instant::now(),
        })
    }

    pub fn info(&self) -> FrameInfo {
        self.info
    }

    pub fn width(&self) -> u32 {
        self.info.width
    }

    pub fn height(&self) -> u32 {
        self.info.height
    }

    pub fn size(&self) -> Size {
        Size::from_pixels(self.info.width, self.info.height)
    }

    pub fn rotation(&self) -> Rotation {
        self.info.rotation
    }

    pub fn facing(&self) -> CameraFacing {
        self.info.facing
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }

    pub fn view(&self) -> FrameView<'_> {
        FrameView { frame: self }
    }

    pub(crate) fn byte_len(&self) -> usize {
        self.data.len()
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("info", &self.info)
            .field("sequence", &self.sequence)
            .field("bytes", &self.data.len())
            .finish()
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        self.data.zeroize();
    }
}

// ----------------------------------------------------------------------------
// FrameView
// ----------------------------------------------------------------------------

/// Restricted view of a frame.
///
/// Provides metadata, detector execution, and an RGB copy for the preview canvas.
pub struct FrameView<'a> {
    frame: &'a Frame,
}

impl<'a> FrameView<'a> {
    pub fn info(&self) -> FrameInfo {
        self.frame.info
    }

    pub fn sequence(&self) -> u64 {
        self.frame.sequence
    }

    /// Hand the pixels to a detector backend. Only boxes come back out.
    pub fn run_detector(&self, backend: &mut dyn DetectorBackend) -> Result<Vec<DetectedBox>> {
        backend.detect(&self.frame.data, &self.frame.info)
    }

    /// RGB24 copy of the frame in its native orientation, for the live preview.
    pub fn to_rgb(&self) -> Result<Vec<u8>> {
        let info = self.frame.info;
        normalize_to_rgb(&self.frame.data, info.width, info.height, info.format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(width: u32, height: u32, format: PixelFormat) -> FrameInfo {
        FrameInfo {
            width,
            height,
            format,
            rotation: Rotation::Deg0,
            facing: CameraFacing::Back,
        }
    }

    #[test]
    fn frame_rejects_wrong_length() {
        let err = Frame::new(vec![0u8; 10], info(4, 4, PixelFormat::Rgb24), 0).unwrap_err();
        assert!(err.to_string().contains("expects 48 bytes"));
    }

    #[test]
    fn nv21_requires_even_dimensions() {
        assert!(PixelFormat::Nv21.expected_len(3, 2).is_err());
        assert_eq!(PixelFormat::Nv21.expected_len(4, 2).unwrap(), 12);
    }

    #[test]
    fn frame_reports_metadata() {
        let frame = Frame::new(vec![7u8; 16], info(4, 4, PixelFormat::Gray8), 42).unwrap();
        assert_eq!(frame.sequence(), 42);
        assert_eq!(frame.size(), Size::new(4.0, 4.0));
        assert_eq!(frame.byte_len(), 16);
        assert!(format!("{:?}", frame).contains("bytes: 16"));
    }

    #[test]
    fn view_converts_gray_to_rgb() {
        let frame = Frame::new(vec![9u8; 4], info(2, 2, PixelFormat::Gray8), 0).unwrap();
        assert_eq!(frame.view().to_rgb().unwrap(), vec![9u8; 12]);
    }

    #[test]
    fn pixel_format_parses() {
        assert_eq!("NV21".parse::<PixelFormat>().unwrap(), PixelFormat::Nv21);
        assert!("yuyv".parse::<PixelFormat>().is_err());
    }
}
