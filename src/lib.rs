//! Reelcast renders a directory of timestamped transparent stills into a video.
//!
//! Every still named `<start_ms>.png` is shown from its start until the next one, with an integer
//! premultiplied crossfade just before each change. The foreground is split into top, middle and
//! bottom bands, composited over a black, image or looping video background, and streamed into
//! `ffmpeg` together with an optional audio timeline.
//!
//! - Build a [`RenderConfig`] (or load one from JSON)
//! - Create a [`RenderSession`] for a frames directory
//! - Pull single frames from a [`FrameStream`] or render the whole window to a file
#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod foundation;

/// Decoded layers, the LRU cache and external media helpers.
pub mod assets;
/// Audio timeline: concatenation, trimming, looping and fades.
pub mod audio;
/// Background layer: black, still image or preprocessed video.
pub mod background;
/// Foreground synthesis: crossfades and band layout.
pub mod compose;
/// Render configuration.
pub mod config;
/// Encoding sinks and the one-pass filter graph.
pub mod encode;
/// Frame stream and the render session.
pub mod render;
/// Timestamped frame timeline.
pub mod timeline;

pub use crate::foundation::core::{
    Affine, Canvas, Fps, FrameIndex, FrameRange, LayerTransform, Point, Vec2,
};
pub use crate::foundation::error::{ReelcastError, ReelcastResult};

pub use crate::assets::{CacheStats, DecodedLayer};
pub use crate::audio::{AudioFades, AudioTimeline};
pub use crate::background::{BackgroundClip, BackgroundLayer, BackgroundSource, BackgroundSpec};
pub use crate::compose::{Compositor, CompositorOpts};
pub use crate::config::{DecodeMode, FadePolicy, OutputMode, RenderConfig};
pub use crate::encode::{
    AudioInputConfig, FfmpegSink, FfmpegSinkOpts, FilterGraphPlan, FrameSink, InMemorySink,
    SinkConfig, VideoCodec,
};
pub use crate::render::{
    CancelToken, FrameRgb, FrameStream, ProgressEvent, RenderReport, RenderSession, RenderStage,
    TrimWindow,
};
pub use crate::timeline::{TimedAsset, Timeline};
