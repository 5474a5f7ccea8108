//! Blur/pixelation overlay.
//!
//! `OverlayPlan` turns transformed boxes plus the user's effect settings into draw
//! commands. Platforms with a native compositor consume the plan directly; the
//! in-process `Canvas` executes it on an RGB24 screen buffer.

use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::frame::FrameView;
use crate::geometry::{PreviewGeometry, TransformedBox};
use crate::ingest::normalize::{mirror_rgb, rotate_rgb};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EffectKind {
    #[default]
    Pixelate,
    Blur,
}

impl FromStr for EffectKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pixelate" | "pixelation" | "mosaic" => Ok(EffectKind::Pixelate),
            "blur" => Ok(EffectKind::Blur),
            other => Err(anyhow!("unknown effect '{}'", other)),
        }
    }
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EffectKind::Pixelate => f.write_str("pixelate"),
            EffectKind::Blur => f.write_str("blur"),
        }
    }
}

/// Effect strength on the user-facing 1..=100 scale.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Intensity(u8);

impl Intensity {
    pub const MIN: Intensity = Intensity(1);
    pub const MAX: Intensity = Intensity(100);

    pub fn new(value: u32) -> Result<Self> {
        if !(Self::MIN.0 as u32..=Self::MAX.0 as u32).contains(&value) {
            return Err(anyhow!("intensity must be within 1..=100 (got {})", value));
        }
        Ok(Intensity(value as u8))
    }

    /// Slider input: out-of-range values are pulled to the nearest bound.
    pub fn saturating(value: i64) -> Self {
        Intensity(value.clamp(Self::MIN.0 as i64, Self::MAX.0 as i64) as u8)
    }

    pub fn get(self) -> u32 {
        self.0 as u32
    }

    /// Pixelation block edge in screen pixels, 2..=48.
    pub fn block_size(self) -> u32 {
        2 + (self.get() - 1) * 46 / 99
    }

    /// Box blur radius in screen pixels, 1..=25.
    pub fn blur_radius(self) -> u32 {
        1 + (self.get() - 1) * 24 / 99
    }

    pub fn strength_for(self, kind: EffectKind) -> u32 {
        match kind {
            EffectKind::Pixelate => self.block_size(),
            EffectKind::Blur => self.blur_radius(),
        }
    }
}

impl Default for Intensity {
    fn default() -> Self {
        Intensity(50)
    }
}

impl TryFrom<u32> for Intensity {
    type Error = anyhow::Error;

    fn try_from(value: u32) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Intensity> for u32 {
    fn from(intensity: Intensity) -> Self {
        intensity.get()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectSettings {
    pub enabled: bool,
    pub kind: EffectKind,
    pub intensity: Intensity,
}

impl Default for EffectSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            kind: EffectKind::default(),
            intensity: Intensity::default(),
        }
    }
}

// ----------------------------------------------------------------------------
// Plan
// ----------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct OverlayCommand {
    pub rect: TransformedBox,
    pub kind: EffectKind,
    /// Block size for pixelation, radius for blur.
    pub strength: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct OverlayPlan {
    pub commands: Vec<OverlayCommand>,
}

impl OverlayPlan {
    /// Zero-area boxes are skipped; a disabled effect yields an empty plan.
    pub fn build(boxes: &[TransformedBox], settings: &EffectSettings) -> Self {
        if !settings.enabled {
            return Self::default();
        }
        let strength = settings.intensity.strength_for(settings.kind);
        let commands = boxes
            .iter()
            .filter(|b| !b.is_empty())
            .map(|&rect| OverlayCommand {
                rect,
                kind: settings.kind,
                strength,
            })
            .collect();
        Self { commands }
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

// ----------------------------------------------------------------------------
// Canvas
// ----------------------------------------------------------------------------

/// Screen-space RGB24 buffer. Wiped on drop.
pub struct Canvas {
    width: u32,
    height: u32,
    rgb: Vec<u8>,
}

#[derive(Clone, Copy)]
struct PixelRect {
    x0: usize,
    y0: usize,
    x1: usize,
    y1: usize,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            rgb: vec![0u8; width as usize * height as usize * 3],
        }
    }

    pub fn from_rgb(width: u32, height: u32, rgb: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * 3;
        if rgb.len() != expected {
            return Err(anyhow!(
                "canvas {}x{} expects {} bytes, received {}",
                width,
                height,
                expected,
                rgb.len()
            ));
        }
        Ok(Self { width, height, rgb })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.rgb
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y as usize * self.width as usize + x as usize) * 3;
        Some([self.rgb[i], self.rgb[i + 1], self.rgb[i + 2]])
    }

    pub fn clear(&mut self) {
        self.rgb.fill(0);
    }

    /// Draw the live frame upright into `preview`, nearest-neighbour scaled.
    pub fn draw_preview(
        &mut self,
        view: &FrameView<'_>,
        preview: &PreviewGeometry,
        mirror: bool,
    ) -> Result<()> {
        let info = view.info();
        let rgb = view.to_rgb()?;
        let (mut upright, uw, uh) = rotate_rgb(&rgb, info.width, info.height, info.rotation);
        if mirror {
            mirror_rgb(&mut upright, uw, uh);
        }

        let target = self.pixel_rect(
            preview.offset.x,
            preview.offset.y,
            preview.size.width,
            preview.size.height,
        );
        let Some(dst) = target.filter(|_| uw > 0 && uh > 0) else {
            upright.zeroize();
            return Ok(());
        };

        let (pw, ph) = (preview.size.width, preview.size.height);
        let w = self.width as usize;
        for y in dst.y0..dst.y1 {
            let v = ((y as f32 + 0.5 - preview.offset.y) / ph * uh as f32) as usize;
            let sy = v.min(uh as usize - 1);
            for x in dst.x0..dst.x1 {
                let u = ((x as f32 + 0.5 - preview.offset.x) / pw * uw as f32) as usize;
                let sx = u.min(uw as usize - 1);
                let src = (sy * uw as usize + sx) * 3;
                let out = (y * w + x) * 3;
                self.rgb[out..out + 3].copy_from_slice(&upright[src..src + 3]);
            }
        }
        upright.zeroize();
        Ok(())
    }

    /// Execute every command of `plan`.
    pub fn apply(&mut self, plan: &OverlayPlan) {
        for command in &plan.commands {
            let Some(rect) = self.pixel_rect(
                command.rect.x,
                command.rect.y,
                command.rect.width,
                command.rect.height,
            ) else {
                continue;
            };
            match command.kind {
                EffectKind::Pixelate => self.pixelate(rect, command.strength.max(1) as usize),
                EffectKind::Blur => self.box_blur(rect, command.strength.max(1) as usize),
            }
        }
    }

    fn pixel_rect(&self, x: f32, y: f32, width: f32, height: f32) -> Option<PixelRect> {
        if !(x.is_finite() && y.is_finite() && width.is_finite() && height.is_finite()) {
            return None;
        }
        let clamp_x = |v: f32| v.max(0.0).min(self.width as f32) as usize;
        let clamp_y = |v: f32| v.max(0.0).min(self.height as f32) as usize;
        let rect = PixelRect {
            x0: clamp_x(x.floor()),
            y0: clamp_y(y.floor()),
            x1: clamp_x((x + width).ceil()),
            y1: clamp_y((y + height).ceil()),
        };
        (rect.x1 > rect.x0 && rect.y1 > rect.y0).then_some(rect)
    }

    fn pixelate(&mut self, rect: PixelRect, block: usize) {
        let w = self.width as usize;
        let mut by = rect.y0;
        while by < rect.y1 {
            let bye = (by + block).min(rect.y1);
            let mut bx = rect.x0;
            while bx < rect.x1 {
                let bxe = (bx + block).min(rect.x1);
                let mut sum = [0u64; 3];
                for y in by..bye {
                    for x in bx..bxe {
                        let i = (y * w + x) * 3;
                        for c in 0..3 {
                            sum[c] += self.rgb[i + c] as u64;
                        }
                    }
                }
                let count = ((bye - by) * (bxe - bx)) as u64;
                let avg = sum.map(|s| (s / count) as u8);
                for y in by..bye {
                    for x in bx..bxe {
                        let i = (y * w + x) * 3;
                        self.rgb[i..i + 3].copy_from_slice(&avg);
                    }
                }
                bx = bxe;
            }
            by = bye;
        }
    }

    /// Separable box blur confined to `rect`; samples clamp to the rect edges.
    fn box_blur(&mut self, rect: PixelRect, radius: usize) {
        let w = self.width as usize;
        let rw = rect.x1 - rect.x0;
        let rh = rect.y1 - rect.y0;
        let mut region = vec![0u8; rw * rh * 3];
        for y in 0..rh {
            let src = ((rect.y0 + y) * w + rect.x0) * 3;
            region[y * rw * 3..(y + 1) * rw * 3].copy_from_slice(&self.rgb[src..src + rw * 3]);
        }

        let mut scratch = vec![0u8; region.len()];
        blur_pass(&region, &mut scratch, rw, rh, radius, 3, rw * 3);
        blur_pass(&scratch, &mut region, rh, rw, radius, rw * 3, 3);

        for y in 0..rh {
            let dst = ((rect.y0 + y) * w + rect.x0) * 3;
            self.rgb[dst..dst + rw * 3].copy_from_slice(&region[y * rw * 3..(y + 1) * rw * 3]);
        }
        region.zeroize();
        scratch.zeroize();
    }
}

impl Drop for Canvas {
    fn drop(&mut self) {
        self.rgb.zeroize();
    }
}

/// One running-sum blur pass over `lines` lines of `len` pixels each.
/// `step` is the byte distance between neighbours along a line, `stride` between
/// line starts.
fn blur_pass(
    src: &[u8],
    dst: &mut [u8],
    len: usize,
    lines: usize,
    radius: usize,
    step: usize,
    stride: usize,
) {
    let window = (2 * radius + 1) as u32;
    let at = |line: usize, i: isize, c: usize| -> u32 {
        let i = i.clamp(0, len as isize - 1) as usize;
        src[line * stride + i * step + c] as u32
    };
    for line in 0..lines {
        for c in 0..3 {
            let mut sum: u32 = (-(radius as isize)..=radius as isize)
                .map(|i| at(line, i, c))
                .sum();
            for i in 0..len {
                dst[line * stride + i * step + c] = (sum / window) as u8;
                sum += at(line, i as isize + radius as isize + 1, c);
                sum -= at(line, i as isize - radius as isize, c);
            }
        }
    }
}
