//! Integer pixel arithmetic shared by decode, blend and composite stages.
//!
//! Everything here is exact integer math so renders are bit-reproducible across runs and
//! platforms.

/// `round(x * y / 255)` with half-up rounding.
#[inline]
pub(crate) fn mul_div255_u16(x: u16, y: u16) -> u16 {
    (((u32::from(x) * u32::from(y)) + 127) / 255) as u16
}

#[inline]
pub(crate) fn mul_div255_u8(x: u16, y: u16) -> u8 {
    mul_div255_u16(x, y) as u8
}

/// Premultiply one straight-alpha channel: `(c * a + 127) / 255`.
#[inline]
pub fn premultiply(c: u8, a: u8) -> u8 {
    mul_div255_u8(u16::from(c), u16::from(a))
}

/// Recover a straight-alpha channel: `clip(round(p * 255 / a), 0, 255)`, `0` when `a == 0`.
#[inline]
pub fn unpremultiply(p: u8, a: u8) -> u8 {
    if a == 0 {
        return 0;
    }
    let a = u32::from(a);
    let v = (u32::from(p) * 255 + a / 2) / a;
    v.min(255) as u8
}

/// Rational mix `round((a * (den - num) + b * num) / den)`.
///
/// `num` must be `<= den` and `den > 0`; `num == 0` yields `a` exactly. `den` is a window length in
/// milliseconds, far below the `u64::MAX / 255` overflow bound.
#[inline]
pub(crate) fn mix_ratio(a: u8, b: u8, num: u64, den: u64) -> u8 {
    debug_assert!(den > 0 && num <= den);
    let acc = u64::from(a) * (den - num) + u64::from(b) * num;
    ((acc + den / 2) / den) as u8
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/math.rs"]
mod tests;
