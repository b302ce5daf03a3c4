//! Output frames and the render state machine.
//!
//! [`FrameStream`] pulls composited RGB frames; [`RenderSession`] drives a stream (or the
//! filter-graph path) into an encoder.

/// Foreground-over-background composite, overlay/mask split and letterboxing.
pub mod composite;
/// Render stages, progress, cancellation and atomic output.
pub mod session;
/// Trim window and pull-based frame stream.
pub mod stream;

pub use composite::{FrameRgb, Letterbox, composite_over, letterbox, overlay_and_mask};
pub use session::{CancelToken, ProgressEvent, RenderReport, RenderSession, RenderStage};
pub use stream::{FrameStream, TrimWindow};
