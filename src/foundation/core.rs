use crate::foundation::error::{ReelcastError, ReelcastResult};

pub use kurbo::{Affine, Point, Vec2};

/// Absolute 0-based frame index in output timeline space.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct FrameIndex(pub u64);

/// Half-open frame range `[start, end)` in output timeline space.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FrameRange {
    /// Inclusive range start.
    pub start: FrameIndex,
    /// Exclusive range end.
    pub end: FrameIndex, // exclusive
}

impl FrameRange {
    /// Create a validated range with `start <= end`.
    pub fn new(start: FrameIndex, end: FrameIndex) -> ReelcastResult<Self> {
        if start.0 > end.0 {
            return Err(ReelcastError::config("FrameRange start must be <= end"));
        }
        Ok(Self { start, end })
    }

    /// Number of frames contained in the range.
    pub fn len_frames(self) -> u64 {
        self.end.0.saturating_sub(self.start.0)
    }

    /// Return `true` when the range has no frames.
    pub fn is_empty(self) -> bool {
        self.start.0 == self.end.0
    }

    /// Return `true` when `f` is inside `[start, end)`.
    pub fn contains(self, f: FrameIndex) -> bool {
        self.start.0 <= f.0 && f.0 < self.end.0
    }
}

/// Frames-per-second represented as a rational `num/den`.
///
/// Deserializes from either a bare integer (`30`) or `{ "num": 30000, "den": 1001 }`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "FpsRepr")]
pub struct Fps {
    /// Numerator (frames).
    pub num: u32,
    /// Denominator (seconds), must be non-zero.
    pub den: u32, // must be > 0
}

#[derive(serde::Deserialize)]
#[serde(untagged)]
enum FpsRepr {
    Integer(u32),
    Rational { num: u32, den: u32 },
}

impl TryFrom<FpsRepr> for Fps {
    type Error = ReelcastError;

    fn try_from(repr: FpsRepr) -> Result<Self, Self::Error> {
        match repr {
            FpsRepr::Integer(n) => Fps::new(n, 1),
            FpsRepr::Rational { num, den } => Fps::new(num, den),
        }
    }
}

impl Fps {
    /// Create a validated FPS value.
    pub fn new(num: u32, den: u32) -> ReelcastResult<Self> {
        if den == 0 {
            return Err(ReelcastError::config("Fps den must be > 0"));
        }
        if num == 0 {
            return Err(ReelcastError::config("Fps num must be > 0"));
        }
        Ok(Self { num, den })
    }

    /// Convert to floating-point FPS.
    pub fn as_f64(self) -> f64 {
        f64::from(self.num) / f64::from(self.den)
    }

    /// Millisecond offset of frame `n`, rounded half-up.
    pub fn frame_to_ms(self, frame: u64) -> u64 {
        let num = u128::from(frame) * 1000 * u128::from(self.den);
        let den = u128::from(self.num);
        ((num + den / 2) / den) as u64
    }

    /// Number of frames needed to cover `duration_ms` (ceil).
    pub fn frames_for_ms(self, duration_ms: u64) -> u64 {
        let num = u128::from(duration_ms) * u128::from(self.num);
        let den = 1000 * u128::from(self.den);
        num.div_ceil(den) as u64
    }

    /// Frame index shown at `t_ms` (floor).
    pub fn ms_to_frame_floor(self, t_ms: u64) -> u64 {
        let num = u128::from(t_ms) * u128::from(self.num);
        let den = 1000 * u128::from(self.den);
        (num / den) as u64
    }
}

/// Output canvas dimensions in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Canvas {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Canvas {
    /// Number of pixels on the canvas.
    pub fn pixel_count(self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Canvas center in pixel coordinates.
    pub fn center(self) -> Vec2 {
        Vec2::new(f64::from(self.width) / 2.0, f64::from(self.height) / 2.0)
    }

    /// Default portrait canvas for a landscape canvas: same width, 9:16 aspect, even height.
    pub fn portrait_for(self) -> Canvas {
        let height = (u64::from(self.width) * 16 / 9) as u32;
        Canvas {
            width: self.width,
            height: height & !1,
        }
    }
}

/// Background placement: uniform scale about the canvas center, then translation.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LayerTransform {
    /// Translation in pixels.
    pub translate: Vec2,
    /// Uniform scale factor (must be finite and > 0).
    pub scale: f64,
}

impl Default for LayerTransform {
    fn default() -> Self {
        Self {
            translate: Vec2::ZERO,
            scale: 1.0,
        }
    }
}

impl LayerTransform {
    /// Return `true` when the transform leaves pixels where they are.
    pub fn is_identity(self) -> bool {
        self.translate == Vec2::ZERO && self.scale == 1.0
    }

    /// Source-to-canvas affine for a layer covering `canvas`.
    pub fn to_affine(self, canvas: Canvas) -> Affine {
        let anchor = canvas.center();
        let t_translate = Affine::translate(self.translate);
        let t_anchor = Affine::translate(anchor);
        let t_unanchor = Affine::translate(-anchor);
        let t_scale = Affine::scale(self.scale);

        // Fixed order: T(translate) * T(anchor) * S(scale) * T(-anchor)
        t_translate * t_anchor * t_scale * t_unanchor
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
