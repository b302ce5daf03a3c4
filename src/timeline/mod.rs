//! Timestamped frame timeline.
//!
//! Input frames are scanned from a directory ([`scan`]) and indexed by start time ([`index`]).

/// Sorted timeline, `locate` and crossfade windows.
pub mod index;
/// Directory scan and frame filename parsing.
pub mod scan;

pub use index::{CrossfadeWindow, Located, TimedAsset, Timeline};
pub use scan::{FrameName, ScannedFrame, classify_frame_name, parse_frame_name, scan_frames_dir};
