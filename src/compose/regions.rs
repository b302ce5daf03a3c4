use std::ops::Range;

/// Horizontal band split of a layer: static top, crossfaded middle, static bottom.
///
/// Invariant: `top + bottom <= height`; the middle takes the remainder.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RegionLayout {
    /// Layer height in rows.
    pub height: u32,
    /// Top band height.
    pub top: u32,
    /// Bottom band height.
    pub bottom: u32,
}

impl RegionLayout {
    /// Whole layer is the middle band.
    pub fn full(height: u32) -> Self {
        Self {
            height,
            top: 0,
            bottom: 0,
        }
    }

    /// Band heights `floor(height * ratio)`, shared by per-frame synthesis and the filter graph.
    ///
    /// Ratios are expected in `[0, 0.5]`; out-of-range values are clamped.
    pub fn exact(height: u32, top_ratio: f64, bottom_ratio: f64) -> Self {
        let band = |r: f64| (f64::from(height) * r.clamp(0.0, 0.5)).floor() as u32;
        let top = band(top_ratio);
        let bottom = band(bottom_ratio).min(height - top);
        Self {
            height,
            top,
            bottom,
        }
    }

    /// Middle band height.
    pub fn middle(&self) -> u32 {
        self.height - self.top - self.bottom
    }

    /// Return `true` when any static band exists.
    pub fn is_split(&self) -> bool {
        self.top > 0 || self.bottom > 0
    }

    /// Rows of the top band.
    pub fn top_rows(&self) -> Range<usize> {
        0..self.top as usize
    }

    /// Rows of the middle band.
    pub fn middle_rows(&self) -> Range<usize> {
        self.top as usize..(self.height - self.bottom) as usize
    }

    /// Rows of the bottom band.
    pub fn bottom_rows(&self) -> Range<usize> {
        (self.height - self.bottom) as usize..self.height as usize
    }
}

#[cfg(test)]
#[path = "../../tests/unit/compose/regions.rs"]
mod tests;
