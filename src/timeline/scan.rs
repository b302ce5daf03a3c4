use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::foundation::error::{ReelcastError, ReelcastResult};

/// One input frame file with the timing encoded in its name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScannedFrame {
    /// Start timestamp in milliseconds.
    pub start_ms: u64,
    /// Explicit end from a `{start}_{end}.png` name.
    pub end_ms: Option<u64>,
    /// Image file.
    pub path: PathBuf,
}

/// What a file name says about a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameName {
    /// `{start}.png`, or `{start}_{end}.png` with `end > start`.
    Frame {
        /// Start timestamp.
        start_ms: u64,
        /// Explicit end, when named.
        end_ms: Option<u64>,
    },
    /// `{start}_{end}.png` whose end is not after its start.
    EmptyInterval {
        /// Named start.
        start_ms: u64,
        /// Named end.
        end_ms: u64,
    },
    /// Not a frame file.
    Other,
}

/// Classify a file name (extension case-insensitive).
pub fn classify_frame_name(file_name: &str) -> FrameName {
    let Some((stem, ext)) = file_name.rsplit_once('.') else {
        return FrameName::Other;
    };
    if !ext.eq_ignore_ascii_case("png") {
        return FrameName::Other;
    }
    let parsed = match stem.split_once('_') {
        None => parse_ms(stem).map(|start_ms| (start_ms, None)),
        Some((start, end)) => parse_ms(start).zip(parse_ms(end)).map(|(s, e)| (s, Some(e))),
    };
    match parsed {
        Some((start_ms, Some(end_ms))) if end_ms <= start_ms => {
            FrameName::EmptyInterval { start_ms, end_ms }
        }
        Some((start_ms, end_ms)) => FrameName::Frame { start_ms, end_ms },
        None => FrameName::Other,
    }
}

/// Parse `{start}.png` or `{start}_{end}.png`.
///
/// Returns `None` for anything else, including `end <= start`.
pub fn parse_frame_name(file_name: &str) -> Option<(u64, Option<u64>)> {
    match classify_frame_name(file_name) {
        FrameName::Frame { start_ms, end_ms } => Some((start_ms, end_ms)),
        FrameName::EmptyInterval { .. } | FrameName::Other => None,
    }
}

fn parse_ms(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// Scan `dir` for frame files, sorted by start timestamp.
///
/// Fails with [`ReelcastError::Config`] when no frame is found. Ordering invariants are checked
/// by [`Timeline::new`](crate::timeline::Timeline::new).
pub fn scan_frames_dir(dir: &Path) -> ReelcastResult<Vec<ScannedFrame>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("read frames directory '{}'", dir.display()))?;

    let mut frames = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("list '{}'", dir.display()))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        match classify_frame_name(name) {
            FrameName::Frame { start_ms, end_ms } => frames.push(ScannedFrame {
                start_ms,
                end_ms,
                path,
            }),
            FrameName::EmptyInterval { start_ms, end_ms } => tracing::warn!(
                file = %path.display(),
                start_ms,
                end_ms,
                "skipping frame whose end is not after its start"
            ),
            FrameName::Other => tracing::debug!(file = %path.display(), "skipping non-frame file"),
        }
    }

    if frames.is_empty() {
        return Err(ReelcastError::config(format!(
            "no valid frame images found in '{}'",
            dir.display()
        )));
    }

    frames.sort_by_key(|f| f.start_ms);
    for w in frames.windows(2) {
        if let Some(end) = w[0].end_ms
            && end > w[1].start_ms
        {
            tracing::warn!(
                first = %w[0].path.display(),
                second = %w[1].path.display(),
                "frame intervals overlap; the later start wins"
            );
        }
    }

    Ok(frames)
}

#[cfg(test)]
#[path = "../../tests/unit/timeline/scan.rs"]
mod tests;
