use anyhow::{anyhow, Result};

use crate::frame::PixelFormat;
use crate::geometry::Rotation;

/// Convert a camera buffer of any supported format into packed RGB24.
pub fn normalize_to_rgb(
    pixels: &[u8],
    width: u32,
    height: u32,
    format: PixelFormat,
) -> Result<Vec<u8>> {
    let expected = format.expected_len(width, height)?;
    if pixels.len() != expected {
        return Err(anyhow!(
            "{:?} frame length mismatch: expected {}, got {}",
            format,
            expected,
            pixels.len()
        ));
    }

    match format {
        PixelFormat::Rgb24 => Ok(pixels.to_vec()),
        PixelFormat::Rgba32 => Ok(pixels
            .chunks_exact(4)
            .flat_map(|px| [px[0], px[1], px[2]])
            .collect()),
        PixelFormat::Bgra32 => Ok(pixels
            .chunks_exact(4)
            .flat_map(|px| [px[2], px[1], px[0]])
            .collect()),
        PixelFormat::Gray8 => Ok(pixels.iter().flat_map(|&y| [y, y, y]).collect()),
        PixelFormat::Nv12 => Ok(semi_planar_to_rgb(pixels, width, height, ChromaOrder::Uv)),
        PixelFormat::Nv21 => Ok(semi_planar_to_rgb(pixels, width, height, ChromaOrder::Vu)),
    }
}

#[derive(Clone, Copy)]
enum ChromaOrder {
    Uv,
    Vu,
}

// Caller has validated the length.
fn semi_planar_to_rgb(pixels: &[u8], width: u32, height: u32, order: ChromaOrder) -> Vec<u8> {
    let w = width as usize;
    let h = height as usize;
    let y_plane = w * h;

    let mut rgb = vec![0u8; y_plane * 3];
    for j in 0..h {
        for i in 0..w {
            let y = pixels[j * w + i] as f32;
            let chroma_index = y_plane + (j / 2) * w + (i / 2) * 2;
            let (u, v) = match order {
                ChromaOrder::Uv => (pixels[chroma_index], pixels[chroma_index + 1]),
                ChromaOrder::Vu => (pixels[chroma_index + 1], pixels[chroma_index]),
            };
            let u = u as f32 - 128.0;
            let v = v as f32 - 128.0;

            let r = y + 1.402_f32 * v;
            let g = y - 0.344_136_f32 * u - 0.714_136_f32 * v;
            let b = y + 1.772_f32 * u;

            let offset = (j * w + i) * 3;
            rgb[offset] = clamp_to_u8(r);
            rgb[offset + 1] = clamp_to_u8(g);
            rgb[offset + 2] = clamp_to_u8(b);
        }
    }

    rgb
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

/// Rotate an RGB24 buffer clockwise by `rotation`, returning the new buffer and
/// its dimensions.
pub fn rotate_rgb(rgb: &[u8], width: u32, height: u32, rotation: Rotation) -> (Vec<u8>, u32, u32) {
    let w = width as usize;
    let h = height as usize;
    if rotation == Rotation::Deg0 || rgb.len() != w * h * 3 {
        return (rgb.to_vec(), width, height);
    }

    let (out_w, out_h) = if rotation.is_quarter_turn() {
        (h, w)
    } else {
        (w, h)
    };
    let mut out = vec![0u8; rgb.len()];
    for y in 0..h {
        for x in 0..w {
            let (dx, dy) = match rotation {
                Rotation::Deg90 => (h - 1 - y, x),
                Rotation::Deg180 => (w - 1 - x, h - 1 - y),
                Rotation::Deg270 => (y, w - 1 - x),
                Rotation::Deg0 => (x, y),
            };
            let src = (y * w + x) * 3;
            let dst = (dy * out_w + dx) * 3;
            out[dst..dst + 3].copy_from_slice(&rgb[src..src + 3]);
        }
    }
    (out, out_w as u32, out_h as u32)
}

/// Flip an RGB24 buffer horizontally in place.
pub fn mirror_rgb(rgb: &mut [u8], width: u32, height: u32) {
    let w = width as usize;
    let h = height as usize;
    if rgb.len() != w * h * 3 {
        return;
    }
    for row in rgb.chunks_exact_mut(w * 3) {
        for x in 0..w / 2 {
            let left = x * 3;
            let right = (w - 1 - x) * 3;
            for c in 0..3 {
                row.swap(left + c, right + c);
            }
        }
    }
}
