//! Foreground synthesis: crossfade math, band splitting and the per-instant compositor.

/// `Compositor::frame_at` and its options.
pub mod compositor;
/// Integer premultiplied blends over row ranges.
pub mod crossfade;
/// Top/middle/bottom band layout.
pub mod regions;

pub use compositor::{Compositor, CompositorOpts};
pub use crossfade::PremulColor;
pub use regions::RegionLayout;
