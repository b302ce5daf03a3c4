use std::ops::Range;

use rayon::prelude::*;

use crate::assets::decode::DecodedLayer;
use crate::foundation::math::{mix_ratio, premultiply};

/// Solid color in premultiplied form, used by the fade-through-color policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PremulColor {
    /// Premultiplied RGB.
    pub rgb: [u8; 3],
    /// Alpha.
    pub a: u8,
}

impl PremulColor {
    /// Opaque black.
    pub const BLACK: Self = Self {
        rgb: [0, 0, 0],
        a: 255,
    };

    /// Premultiply a straight-alpha RGBA color.
    pub fn from_straight(rgba: [u8; 4]) -> Self {
        let a = rgba[3];
        Self {
            rgb: [
                premultiply(rgba[0], a),
                premultiply(rgba[1], a),
                premultiply(rgba[2], a),
            ],
            a,
        }
    }
}

fn plane_ranges(width: u32, rows: &Range<usize>) -> (Range<usize>, Range<usize>) {
    let w = width as usize;
    let px = rows.start * w..rows.end * w;
    let rgb = px.start * 3..px.end * 3;
    (rgb, px)
}

/// Copy `rows` of `src` into `out`. Both layers share one canvas.
pub fn copy_rows(out: &mut DecodedLayer, src: &DecodedLayer, rows: Range<usize>) {
    debug_assert_eq!(out.canvas(), src.canvas());
    let (rgb, px) = plane_ranges(out.width, &rows);
    out.premul_rgb[rgb.clone()].copy_from_slice(&src.premul_rgb[rgb]);
    out.alpha[px.clone()].copy_from_slice(&src.alpha[px]);
}

/// Mix `rows` of `a` and `b` into `out` with weight `num / den` toward `b`.
///
/// Color and alpha planes use the same exact rational weight; `num == 0` reproduces `a`
/// bit-for-bit.
pub fn blend_rows(
    out: &mut DecodedLayer,
    a: &DecodedLayer,
    b: &DecodedLayer,
    rows: Range<usize>,
    num: u64,
    den: u64,
) {
    debug_assert_eq!(a.canvas(), b.canvas());
    let (rgb, px) = plane_ranges(out.width, &rows);
    let w = (out.width as usize).max(1);
    mix_planes(
        &mut out.premul_rgb[rgb.clone()],
        &a.premul_rgb[rgb.clone()],
        &b.premul_rgb[rgb],
        w * 3,
        num,
        den,
    );
    mix_planes(
        &mut out.alpha[px.clone()],
        &a.alpha[px.clone()],
        &b.alpha[px],
        w,
        num,
        den,
    );
}

// One rayon task per row of `row_len` bytes.
fn mix_planes(out: &mut [u8], a: &[u8], b: &[u8], row_len: usize, num: u64, den: u64) {
    out.par_chunks_mut(row_len)
        .zip(a.par_chunks(row_len))
        .zip(b.par_chunks(row_len))
        .for_each(|((o_row, a_row), b_row)| {
            for ((o, &x), &y) in o_row.iter_mut().zip(a_row).zip(b_row) {
                *o = mix_ratio(x, y, num, den);
            }
        });
}

/// Fade `a` to `color` over the first half of the window, then `color` to `b`.
///
/// Both halves use integer weights `2 * num` and `2 * num - den` over `den`.
pub fn fade_through_color_rows(
    out: &mut DecodedLayer,
    a: &DecodedLayer,
    b: &DecodedLayer,
    color: PremulColor,
    rows: Range<usize>,
    num: u64,
    den: u64,
) {
    let (rgb, px) = plane_ranges(out.width, &rows);
    let (src, w, toward_color) = if 2 * num < den {
        (a, 2 * num, true)
    } else {
        (b, 2 * num - den, false)
    };

    let out_rgb = &mut out.premul_rgb[rgb.clone()];
    for (i, (o, &s)) in out_rgb.iter_mut().zip(&src.premul_rgb[rgb]).enumerate() {
        let c = color.rgb[i % 3];
        *o = if toward_color {
            mix_ratio(s, c, w, den)
        } else {
            mix_ratio(c, s, w, den)
        };
    }
    for (o, &s) in out.alpha[px.clone()].iter_mut().zip(&src.alpha[px]) {
        *o = if toward_color {
            mix_ratio(s, color.a, w, den)
        } else {
            mix_ratio(color.a, s, w, den)
        };
    }
}

#[cfg(test)]
#[path = "../../tests/unit/compose/crossfade.rs"]
mod tests;
