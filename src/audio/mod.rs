//! Output audio: concatenation, trimming, silence padding and fades.

/// Trimmed, padded, faded PCM covering the output duration.
pub mod timeline;

pub use timeline::{AudioFades, AudioTimeline};
