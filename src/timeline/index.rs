use std::path::{Path, PathBuf};

use crate::foundation::error::{ReelcastError, ReelcastResult};
use crate::timeline::scan::{ScannedFrame, scan_frames_dir};

/// Minimum time the last asset stays on screen.
pub const MIN_TAIL_MS: u64 = 1000;

/// One still image placed on the timeline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TimedAsset {
    /// Inclusive start.
    pub start_ms: u64,
    /// Exclusive end: next asset's start, or the tail end for the last asset.
    pub end_ms: u64,
    /// Image file.
    pub source: PathBuf,
}

impl TimedAsset {
    /// On-screen lifetime of the asset.
    pub fn duration_ms(&self) -> u64 {
        self.end_ms - self.start_ms
    }
}

/// Result of [`Timeline::locate`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Located {
    /// Greatest index whose `start_ms <= t`.
    pub current: usize,
    /// `current + 1` when it exists.
    pub next: Option<usize>,
}

/// Blend interval immediately before an asset change.
///
/// `window_ms = min(next_start - cur_start, transition_ms)`, so a short-lived asset never blends
/// for longer than it is on screen. The interval is half-open: `[window_start_ms, next_start_ms)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CrossfadeWindow {
    /// Effective blend length, `<= transition_ms`.
    pub window_ms: u64,
    /// First blended instant.
    pub window_start_ms: u64,
    /// Start of the incoming asset; excluded from the window.
    pub next_start_ms: u64,
}

impl CrossfadeWindow {
    /// Window between consecutive starts `cur_start_ms < next_start_ms`.
    pub fn between(cur_start_ms: u64, next_start_ms: u64, transition_ms: u64) -> Self {
        let gap = next_start_ms.saturating_sub(cur_start_ms);
        let window_ms = gap.min(transition_ms);
        Self {
            window_ms,
            window_start_ms: next_start_ms - window_ms,
            next_start_ms,
        }
    }

    /// Return `true` when `t_ms` falls inside the blend interval.
    pub fn contains(&self, t_ms: u64) -> bool {
        self.window_ms > 0 && self.window_start_ms <= t_ms && t_ms < self.next_start_ms
    }

    /// Blend weight numerator `t - window_start` over denominator `window_ms`.
    ///
    /// `None` outside the window, where the current asset is shown un-blended.
    pub fn weight_at(&self, t_ms: u64) -> Option<u64> {
        self.contains(t_ms).then(|| t_ms - self.window_start_ms)
    }
}

/// Immutable, sorted asset timeline.
#[derive(Clone, Debug)]
pub struct Timeline {
    assets: Vec<TimedAsset>,
    transition_ms: u64,
    total_duration_ms: u64,
}

impl Timeline {
    /// Build from scanned frames.
    ///
    /// Frames are sorted by start; fails when the list is empty, when two frames share a start,
    /// or when the first start is not `0`.
    pub fn new(mut frames: Vec<ScannedFrame>, transition_ms: u64) -> ReelcastResult<Self> {
        if frames.is_empty() {
            return Err(ReelcastError::config("timeline has no frames"));
        }
        frames.sort_by_key(|f| f.start_ms);
        if let Some(w) = frames.windows(2).find(|w| w[0].start_ms == w[1].start_ms) {
            return Err(ReelcastError::config(format!(
                "duplicate frame timestamp {}ms: '{}' and '{}'",
                w[0].start_ms,
                w[0].path.display(),
                w[1].path.display()
            )));
        }
        if frames[0].start_ms != 0 {
            return Err(ReelcastError::config(format!(
                "first frame must start at 0ms, found {}ms ('{}')",
                frames[0].start_ms,
                frames[0].path.display()
            )));
        }

        let tail_ms = MIN_TAIL_MS.max(transition_ms);
        let last_start = frames[frames.len() - 1].start_ms;
        let total_duration_ms = last_start + tail_ms;

        let starts: Vec<u64> = frames.iter().map(|f| f.start_ms).collect();
        let assets = frames
            .into_iter()
            .enumerate()
            .map(|(i, f)| TimedAsset {
                start_ms: f.start_ms,
                end_ms: starts.get(i + 1).copied().unwrap_or(total_duration_ms),
                source: f.path,
            })
            .collect();

        Ok(Self {
            assets,
            transition_ms,
            total_duration_ms,
        })
    }

    /// Scan `dir` and build the timeline.
    pub fn from_dir(dir: &Path, transition_ms: u64) -> ReelcastResult<Self> {
        let timeline = Self::new(scan_frames_dir(dir)?, transition_ms)?;
        tracing::info!(
            assets = timeline.len(),
            first_ms = ?timeline.assets.iter().take(5).map(|a| a.start_ms).collect::<Vec<_>>(),
            total_duration_ms = timeline.total_duration_ms,
            "timeline built"
        );
        Ok(timeline)
    }

    /// Number of assets (always `>= 1`).
    pub fn len(&self) -> usize {
        self.assets.len()
    }

    /// Always `false`; construction rejects empty timelines.
    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    /// All assets in start order.
    pub fn assets(&self) -> &[TimedAsset] {
        &self.assets
    }

    /// Asset at `index`.
    pub fn asset(&self, index: usize) -> Option<&TimedAsset> {
        self.assets.get(index)
    }

    /// Configured transition length.
    pub fn transition_ms(&self) -> u64 {
        self.transition_ms
    }

    /// `last.start_ms + max(1000, transition_ms)`.
    pub fn total_duration_ms(&self) -> u64 {
        self.total_duration_ms
    }

    /// Clamp `t_ms` into `[0, total_duration_ms - 1]`.
    pub fn clamp_ms(&self, t_ms: u64) -> u64 {
        t_ms.min(self.total_duration_ms.saturating_sub(1))
    }

    /// Active asset at `t_ms` (after clamping) and its successor.
    pub fn locate(&self, t_ms: u64) -> Located {
        let t = self.clamp_ms(t_ms);
        // First start is 0, so at least one asset satisfies `start <= t`.
        let current = self
            .assets
            .partition_point(|a| a.start_ms <= t)
            .saturating_sub(1);
        let next = (current + 1 < self.assets.len()).then_some(current + 1);
        Located { current, next }
    }

    /// Crossfade window between asset `index` and `index + 1`.
    pub fn window_after(&self, index: usize) -> Option<CrossfadeWindow> {
        let cur = self.assets.get(index)?;
        let next = self.assets.get(index + 1)?;
        Some(CrossfadeWindow::between(
            cur.start_ms,
            next.start_ms,
            self.transition_ms,
        ))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/timeline/index.rs"]
mod tests;
