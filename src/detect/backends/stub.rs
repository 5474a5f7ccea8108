use anyhow::{anyhow, Result};

use crate::detect::backend::{DetectionCapability, DetectorBackend};
use crate::frame::{FrameInfo, PixelFormat};
use crate::geometry::{DetectedBox, Size};

const DEFAULT_LUMA_THRESHOLD: u8 = 200;
const CELL_PX: usize = 4;

/// Stub backend for demos and tests.
///
/// Treats every connected region of bright pixels as a face, which is exactly what
/// the synthetic camera scene draws. Boxes are reported in upright coordinates like
/// a platform detector given the same rotation hint.
pub struct StubBackend {
    threshold: u8,
    calls: u64,
}

impl StubBackend {
    pub fn new() -> Self {
        Self {
            threshold: DEFAULT_LUMA_THRESHOLD,
            calls: 0,
        }
    }

    pub fn with_threshold(mut self, threshold: u8) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn calls(&self) -> u64 {
        self.calls
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn supports(&self, capability: DetectionCapability) -> bool {
        matches!(capability, DetectionCapability::FaceBounds)
    }

    fn detect(&mut self, pixels: &[u8], info: &FrameInfo) -> Result<Vec<DetectedBox>> {
        self.calls += 1;
        let expected = info.format.expected_len(info.width, info.height)?;
        if pixels.len() < expected {
            return Err(anyhow!(
                "expected {} bytes for {:?}, received {}",
                expected,
                info.format,
                pixels.len()
            ));
        }

        let buffer = Size::from_pixels(info.width, info.height);
        Ok(bright_regions(pixels, info, self.threshold)
            .into_iter()
            .map(|b| b.rotated_upright(buffer, info.rotation))
            .collect())
    }
}

fn luma_at(pixels: &[u8], info: &FrameInfo, x: usize, y: usize) -> u8 {
    let i = y * info.width as usize + x;
    let weighted = |r: u8, g: u8, b: u8| {
        ((r as u32 * 299 + g as u32 * 587 + b as u32 * 114) / 1000) as u8
    };
    match info.format {
        PixelFormat::Gray8 | PixelFormat::Nv12 | PixelFormat::Nv21 => pixels[i],
        PixelFormat::Rgb24 => weighted(pixels[i * 3], pixels[i * 3 + 1], pixels[i * 3 + 2]),
        PixelFormat::Rgba32 => weighted(pixels[i * 4], pixels[i * 4 + 1], pixels[i * 4 + 2]),
        PixelFormat::Bgra32 => weighted(pixels[i * 4 + 2], pixels[i * 4 + 1], pixels[i * 4]),
    }
}

/// 4-connected bright regions on a coarse grid, as buffer-space boxes.
fn bright_regions(pixels: &[u8], info: &FrameInfo, threshold: u8) -> Vec<DetectedBox> {
    let (w, h) = (info.width as usize, info.height as usize);
    let gw = w.div_ceil(CELL_PX);
    let gh = h.div_ceil(CELL_PX);

    let mut bright = vec![false; gw * gh];
    for gy in 0..gh {
        for gx in 0..gw {
            let px = (gx * CELL_PX + CELL_PX / 2).min(w - 1);
            let py = (gy * CELL_PX + CELL_PX / 2).min(h - 1);
            bright[gy * gw + gx] = luma_at(pixels, info, px, py) >= threshold;
        }
    }

    let mut seen = vec![false; gw * gh];
    let mut boxes = Vec::new();
    let mut stack = Vec::new();
    for start in 0..bright.len() {
        if !bright[start] || seen[start] {
            continue;
        }
        seen[start] = true;
        stack.push(start);
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (gw, gh, 0, 0);
        while let Some(cell) = stack.pop() {
            let (cx, cy) = (cell % gw, cell / gw);
            min_x = min_x.min(cx);
            min_y = min_y.min(cy);
            max_x = max_x.max(cx);
            max_y = max_y.max(cy);

            let mut visit = |n: usize| {
                if bright[n] && !seen[n] {
                    seen[n] = true;
                    stack.push(n);
                }
            };
            if cx > 0 {
                visit(cell - 1);
            }
            if cx + 1 < gw {
                visit(cell + 1);
            }
            if cy > 0 {
                visit(cell - gw);
            }
            if cy + 1 < gh {
                visit(cell + gw);
            }
        }

        let x0 = min_x * CELL_PX;
        let y0 = min_y * CELL_PX;
        let x1 = ((max_x + 1) * CELL_PX).min(w);
        let y1 = ((max_y + 1) * CELL_PX).min(h);
        boxes.push(DetectedBox::new(
            x0 as f32,
            y0 as f32,
            (x1 - x0) as f32,
            (y1 - y0) as f32,
        ));
    }
    boxes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{CameraFacing, Rotation};

    fn info(width: u32, height: u32, rotation: Rotation) -> FrameInfo {
        FrameInfo {
            width,
            height,
            format: PixelFormat::Gray8,
            rotation,
            facing: CameraFacing::Back,
        }
    }

    fn square_frame(width: usize, height: usize, x: usize, y: usize, side: usize) -> Vec<u8> {
        let mut luma = vec![10u8; width * height];
        for row in y..y + side {
            for col in x..x + side {
                luma[row * width + col] = 250;
            }
        }
        luma
    }

    #[test]
    fn stub_backend_finds_bright_square() {
        let mut backend = StubBackend::new();
        let pixels = square_frame(64, 48, 16, 8, 24);
        let boxes = backend.detect(&pixels, &info(64, 48, Rotation::Deg0)).unwrap();
        assert_eq!(boxes, vec![DetectedBox::new(16.0, 8.0, 24.0, 24.0)]);
        assert_eq!(backend.calls(), 1);
    }

    #[test]
    fn stub_backend_reports_upright_coordinates() {
        let mut backend = StubBackend::new();
        let pixels = square_frame(64, 48, 16, 8, 24);
        let boxes = backend.detect(&pixels, &info(64, 48, Rotation::Deg90)).unwrap();
        // 90° clockwise: x' = h - y - side, y' = x.
        assert_eq!(boxes, vec![DetectedBox::new(16.0, 16.0, 24.0, 24.0)]);
    }

    #[test]
    fn stub_backend_separates_regions() {
        let mut backend = StubBackend::new();
        let mut pixels = square_frame(64, 32, 0, 0, 8);
        for row in 16..24 {
            for col in 40..48 {
                pixels[row * 64 + col] = 250;
            }
        }
        let boxes = backend.detect(&pixels, &info(64, 32, Rotation::Deg0)).unwrap();
        assert_eq!(boxes.len(), 2);
    }

    #[test]
    fn stub_backend_rejects_short_buffers() {
        let mut backend = StubBackend::new();
        assert!(backend.detect(&[0u8; 10], &info(64, 48, Rotation::Deg0)).is_err());
    }
}
