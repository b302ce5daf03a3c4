use std::path::Path;

use crate::foundation::core::Canvas;
use crate::foundation::error::{ReelcastError, ReelcastResult};
use crate::foundation::math::{premultiply, unpremultiply};

/// Decoded still image split into premultiplied color and a separate alpha plane.
///
/// Every layer of a render shares one canvas size; see [`decode_layer`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedLayer {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Row-major premultiplied RGB, 3 bytes per pixel.
    pub premul_rgb: Vec<u8>,
    /// Row-major alpha, 1 byte per pixel.
    pub alpha: Vec<u8>,
}

impl DecodedLayer {
    /// Fully transparent layer.
    pub fn transparent(canvas: Canvas) -> Self {
        let n = canvas.pixel_count();
        Self {
            width: canvas.width,
            height: canvas.height,
            premul_rgb: vec![0; n * 3],
            alpha: vec![0; n],
        }
    }

    /// Build from straight-alpha RGBA8, pasting it at the origin of `canvas`.
    ///
    /// Pixels outside `canvas` are cropped; uncovered canvas area stays transparent. Sources are
    /// never scaled.
    pub fn from_rgba_on_canvas(
        src_width: u32,
        src_height: u32,
        rgba: &[u8],
        canvas: Canvas,
    ) -> Self {
        let mut out = Self::transparent(canvas);
        let copy_w = src_width.min(canvas.width) as usize;
        let copy_h = src_height.min(canvas.height) as usize;
        let src_stride = src_width as usize * 4;
        let dst_w = canvas.width as usize;

        for y in 0..copy_h {
            let src_row = &rgba[y * src_stride..y * src_stride + copy_w * 4];
            for (x, px) in src_row.chunks_exact(4).enumerate() {
                let a = px[3];
                let di = y * dst_w + x;
                out.alpha[di] = a;
                if a != 0 {
                    out.premul_rgb[di * 3] = premultiply(px[0], a);
                    out.premul_rgb[di * 3 + 1] = premultiply(px[1], a);
                    out.premul_rgb[di * 3 + 2] = premultiply(px[2], a);
                }
            }
        }
        out
    }

    /// Canvas covered by the layer.
    pub fn canvas(&self) -> Canvas {
        Canvas {
            width: self.width,
            height: self.height,
        }
    }

    /// Straight-alpha RGBA at `(x, y)`, or `None` out of bounds.
    pub fn straight_rgba_at(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = y as usize * self.width as usize + x as usize;
        let a = self.alpha[i];
        Some([
            unpremultiply(self.premul_rgb[i * 3], a),
            unpremultiply(self.premul_rgb[i * 3 + 1], a),
            unpremultiply(self.premul_rgb[i * 3 + 2], a),
            a,
        ])
    }

    /// Approximate heap footprint in bytes.
    pub fn byte_size(&self) -> usize {
        self.premul_rgb.len() + self.alpha.len()
    }
}

/// Read the canvas size from an image header without decoding pixels.
pub fn probe_canvas(path: &Path) -> ReelcastResult<Canvas> {
    let (width, height) = image::image_dimensions(path)
        .map_err(|e| ReelcastError::asset_decode(path, e.to_string()))?;
    if width == 0 || height == 0 {
        return Err(ReelcastError::asset_decode(path, "image has zero size"));
    }
    Ok(Canvas { width, height })
}

/// Decode `path` to a premultiplied layer fitted onto `canvas`.
pub fn decode_layer(path: &Path, canvas: Canvas) -> ReelcastResult<DecodedLayer> {
    let img = image::open(path).map_err(|e| ReelcastError::asset_decode(path, e.to_string()))?;
    let rgba = img.to_rgba8();
    let (w, h) = rgba.dimensions();
    if (w, h) != (canvas.width, canvas.height) {
        tracing::debug!(
            file = %path.display(),
            width = w,
            height = h,
            "asset size differs from canvas; pasting at origin"
        );
    }
    Ok(DecodedLayer::from_rgba_on_canvas(w, h, rgba.as_raw(), canvas))
}

#[cfg(test)]
#[path = "../../tests/unit/assets/decode.rs"]
mod tests;
