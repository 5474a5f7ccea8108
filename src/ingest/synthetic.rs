use sha2::{Digest, Sha256};

use crate::frame::PixelFormat;

/// Luma of synthetic faces. The background stays well below it.
pub(crate) const FACE_LUMA: u8 = 235;
const BACKGROUND_MAX_LUMA: u8 = 160;
const FACE_COUNT: usize = 2;

#[derive(Debug)]
struct FacePath {
    phase: f32,
    speed: f32,
    orbit: f32,
}

/// Moving bright ellipses over a dim gradient, in buffer orientation.
///
/// Face paths derive from a SHA-256 of the url and seed, so a fixed seed replays
/// the same scene.
#[derive(Debug)]
pub(crate) struct SyntheticScene {
    width: u32,
    height: u32,
    faces: Vec<FacePath>,
}

impl SyntheticScene {
    pub(crate) fn new(url: &str, seed: u64, width: u32, height: u32) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(url.as_bytes());
        hasher.update(seed.to_le_bytes());
        let digest: [u8; 32] = hasher.finalize().into();

        let faces = digest
            .chunks_exact(3)
            .take(FACE_COUNT)
            .map(|b| FacePath {
                phase: b[0] as f32 / 255.0 * std::f32::consts::TAU,
                speed: 0.02 + b[1] as f32 / 255.0 * 0.05,
                orbit: 0.15 + b[2] as f32 / 255.0 * 0.15,
            })
            .collect();

        Self {
            width,
            height,
            faces,
        }
    }

    /// Render frame `n` in `format`.
    pub(crate) fn render(&self, n: u64, format: PixelFormat) -> Vec<u8> {
        let luma = self.render_luma(n);
        pack(luma, format)
    }

    fn render_luma(&self, n: u64) -> Vec<u8> {
        let w = self.width as usize;
        let h = self.height as usize;
        let mut luma = vec![0u8; w * h];
        for (i, px) in luma.iter_mut().enumerate() {
            let (x, y) = (i % w, i / w);
            *px = ((x + y + n as usize) % BACKGROUND_MAX_LUMA as usize) as u8;
        }

        let (fw, fh) = (self.width as f32, self.height as f32);
        let radius_x = fw.min(fh) / 10.0;
        let radius_y = radius_x * 1.25;
        for (k, face) in self.faces.iter().enumerate() {
            let t = face.phase + face.speed * n as f32;
            let lane = (k as f32 + 1.0) / (self.faces.len() as f32 + 1.0);
            let cx = fw * lane + fw * face.orbit * t.cos() * 0.5;
            let cy = fh * 0.5 + fh * face.orbit * t.sin();
            fill_ellipse(&mut luma, w, h, cx, cy, radius_x, radius_y);
        }
        luma
    }
}

fn fill_ellipse(luma: &mut [u8], w: usize, h: usize, cx: f32, cy: f32, rx: f32, ry: f32) {
    let x0 = (cx - rx).floor().max(0.0) as usize;
    let x1 = ((cx + rx).ceil().max(0.0) as usize).min(w);
    let y0 = (cy - ry).floor().max(0.0) as usize;
    let y1 = ((cy + ry).ceil().max(0.0) as usize).min(h);
    for y in y0..y1 {
        for x in x0..x1 {
            let dx = (x as f32 + 0.5 - cx) / rx;
            let dy = (y as f32 + 0.5 - cy) / ry;
            if dx * dx + dy * dy <= 1.0 {
                luma[y * w + x] = FACE_LUMA;
            }
        }
    }
}

fn pack(luma: Vec<u8>, format: PixelFormat) -> Vec<u8> {
    match format {
        PixelFormat::Gray8 => luma,
        PixelFormat::Nv12 | PixelFormat::Nv21 => {
            let chroma = luma.len() / 2;
            let mut out = luma;
            out.extend(std::iter::repeat(128u8).take(chroma));
            out
        }
        PixelFormat::Rgb24 => luma.iter().flat_map(|&y| [y, y, y]).collect(),
        PixelFormat::Rgba32 | PixelFormat::Bgra32 => {
            luma.iter().flat_map(|&y| [y, y, y, 255]).collect()
        }
    }
}
