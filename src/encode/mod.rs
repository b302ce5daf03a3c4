//! Encoding sinks and the one-pass filter-graph path.
//!
//! Sinks consume composited frames in timeline order and are driven by `RenderSession`.

/// `ffmpeg`-based sink: raw RGB frames on stdin, codec selection with hardware probing.
pub mod ffmpeg;
/// Declarative crossfade/overlay graph executed by `ffmpeg` in a single pass.
pub mod filtergraph;
/// Generic frame sink trait and built-in sinks.
pub mod sink;

pub use ffmpeg::{FfmpegSink, FfmpegSinkOpts, VideoCodec, select_codec};
pub use filtergraph::{FilterGraphPlan, GraphSegment};
pub use sink::{AudioInputConfig, FrameSink, InMemorySink, SinkConfig};
