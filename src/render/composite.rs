use rayon::prelude::*;

use crate::assets::decode::DecodedLayer;
use crate::foundation::core::Canvas;
use crate::foundation::error::{ReelcastError, ReelcastResult};
use crate::foundation::math::{mul_div255_u16, unpremultiply};

/// Opaque RGB24 frame, row-major, tightly packed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameRgb {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// `width * height * 3` bytes.
    pub data: Vec<u8>,
}

impl FrameRgb {
    /// Solid black frame.
    pub fn black(canvas: Canvas) -> Self {
        Self {
            width: canvas.width,
            height: canvas.height,
            data: vec![0; canvas.pixel_count() * 3],
        }
    }

    /// Frame dimensions.
    pub fn canvas(&self) -> Canvas {
        Canvas {
            width: self.width,
            height: self.height,
        }
    }

    /// Convert to an `image` buffer for PNG export.
    pub fn to_image(&self) -> ReelcastResult<image::RgbImage> {
        image::RgbImage::from_raw(self.width, self.height, self.data.clone()).ok_or_else(|| {
            ReelcastError::Other(anyhow::anyhow!(
                "frame buffer does not match {}x{}",
                self.width,
                self.height
            ))
        })
    }
}

/// `out = fg_premul + bg * (255 - alpha) / 255`, with black when `bg` is `None`.
pub fn composite_over(fg: &DecodedLayer, bg: Option<&[u8]>) -> ReelcastResult<FrameRgb> {
    let canvas = fg.canvas();
    let Some(bg) = bg else {
        // Over black the premultiplied color is the visible color.
        return Ok(FrameRgb {
            width: canvas.width,
            height: canvas.height,
            data: fg.premul_rgb.clone(),
        });
    };
    if bg.len() != fg.premul_rgb.len() {
        return Err(ReelcastError::Other(anyhow::anyhow!(
            "background buffer is {} bytes, expected {} for {}x{}",
            bg.len(),
            fg.premul_rgb.len(),
            canvas.width,
            canvas.height
        )));
    }

    let mut data = vec![0u8; fg.premul_rgb.len()];
    let row = canvas.width as usize * 3;
    data.par_chunks_mut(row.max(1))
        .zip(fg.premul_rgb.par_chunks(row.max(1)))
        .zip(bg.par_chunks(row.max(1)))
        .zip(fg.alpha.par_chunks(canvas.width.max(1) as usize))
        .for_each(|(((out, fg), bg), alpha)| {
            for (x, &a) in alpha.iter().enumerate() {
                let inv = 255 - u16::from(a);
                for c in 0..3 {
                    let i = x * 3 + c;
                    let v = u16::from(fg[i]) + mul_div255_u16(u16::from(bg[i]), inv);
                    out[i] = v.min(255) as u8;
                }
            }
        });
    Ok(FrameRgb {
        width: canvas.width,
        height: canvas.height,
        data,
    })
}

/// Straight RGB plus alpha mask, for encoders that composite with a mask themselves.
pub fn overlay_and_mask(layer: &DecodedLayer) -> (FrameRgb, Vec<u8>) {
    let mut rgb = vec![0u8; layer.premul_rgb.len()];
    for ((px, premul), &a) in rgb
        .chunks_exact_mut(3)
        .zip(layer.premul_rgb.chunks_exact(3))
        .zip(&layer.alpha)
    {
        for c in 0..3 {
            px[c] = unpremultiply(premul[c], a);
        }
    }
    (
        FrameRgb {
            width: layer.width,
            height: layer.height,
            data: rgb,
        },
        layer.alpha.clone(),
    )
}

/// Placement of a letterboxed frame inside a target canvas.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Letterbox {
    /// Scaled width.
    pub width: u32,
    /// Scaled height.
    pub height: u32,
    /// Left offset.
    pub x: u32,
    /// Top offset.
    pub y: u32,
}

impl Letterbox {
    /// Fit `src` entirely inside `target`, centered.
    pub fn fit(src: Canvas, target: Canvas) -> Self {
        let sx = f64::from(target.width) / f64::from(src.width.max(1));
        let sy = f64::from(target.height) / f64::from(src.height.max(1));
        let s = sx.min(sy);
        let width = ((f64::from(src.width) * s).round() as u32).clamp(1, target.width.max(1));
        let height = ((f64::from(src.height) * s).round() as u32).clamp(1, target.height.max(1));
        Self {
            width,
            height,
            x: (target.width - width) / 2,
            y: (target.height - height) / 2,
        }
    }
}

/// Scale `src` to fit `target`, centered, padded black.
pub fn letterbox(src: &FrameRgb, target: Canvas) -> ReelcastResult<FrameRgb> {
    if src.canvas() == target {
        return Ok(src.clone());
    }
    let place = Letterbox::fit(src.canvas(), target);
    let scaled = if place.width == src.width && place.height == src.height {
        src.data.clone()
    } else {
        image::imageops::resize(
            &src.to_image()?,
            place.width,
            place.height,
            image::imageops::FilterType::Triangle,
        )
        .into_raw()
    };

    let mut out = FrameRgb::black(target);
    let dst_row = target.width as usize * 3;
    let src_row = place.width as usize * 3;
    let x0 = place.x as usize * 3;
    for (y, row) in scaled.chunks_exact(src_row).enumerate() {
        let start = (place.y as usize + y) * dst_row + x0;
        out.data[start..start + src_row].copy_from_slice(row);
    }
    Ok(out)
}

#[cfg(test)]
#[path = "../../tests/unit/render/composite.rs"]
mod tests;
