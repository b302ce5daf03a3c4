//! Decoded layers and external media helpers.

/// Bounded LRU cache and eager precompute of decoded layers.
pub mod cache;
/// PNG decode, canvas fit and premultiplication.
pub mod decode;
/// `ffmpeg`/`ffprobe` helpers (probing, audio decode, timeouts).
pub mod media;

pub use cache::{CacheStats, LayerCache, LayerStore, PrecomputedLayers};
pub use decode::{DecodedLayer, decode_layer, probe_canvas};
