use crate::background::BackgroundLayer;
use crate::compose::Compositor;
use crate::foundation::core::{Canvas, Fps};
use crate::foundation::error::{ReelcastError, ReelcastResult};
use crate::render::composite::{FrameRgb, composite_over, letterbox, overlay_and_mask};

/// Output window `[start_ms, end_ms)` on the timeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TrimWindow {
    /// First output instant.
    pub start_ms: u64,
    /// Exclusive end.
    pub end_ms: u64,
}

impl TrimWindow {
    /// Resolve configured trims against the timeline length.
    ///
    /// `end_trim_ms == 0` means "until the end"; larger values are clamped to the timeline.
    pub fn resolve(start_trim_ms: u64, end_trim_ms: u64, total_ms: u64) -> ReelcastResult<Self> {
        let end_ms = if end_trim_ms == 0 {
            total_ms
        } else {
            end_trim_ms.min(total_ms)
        };
        if end_ms <= start_trim_ms {
            return Err(ReelcastError::config(format!(
                "degenerate trim: start {start_trim_ms}ms, end {end_ms}ms (timeline {total_ms}ms)"
            )));
        }
        Ok(Self {
            start_ms: start_trim_ms,
            end_ms,
        })
    }

    /// Window length.
    pub fn duration_ms(&self) -> u64 {
        self.end_ms - self.start_ms
    }
}

/// Pull-based source of composited output frames.
///
/// Frame `n` shows timeline instant `start + round(n * 1000 / fps)`. Frames are cheapest when
/// pulled in increasing order; random access works but may restart a background video decoder.
pub struct FrameStream {
    compositor: Compositor,
    background: BackgroundLayer,
    fps: Fps,
    window: TrimWindow,
    output: Canvas,
}

impl FrameStream {
    /// Assemble a stream. `output` differs from the compositor canvas in portrait mode.
    pub fn new(
        compositor: Compositor,
        background: BackgroundLayer,
        fps: Fps,
        window: TrimWindow,
        output: Canvas,
    ) -> Self {
        Self {
            compositor,
            background,
            fps,
            window,
            output,
        }
    }

    /// Output width.
    pub fn width(&self) -> u32 {
        self.output.width
    }

    /// Output height.
    pub fn height(&self) -> u32 {
        self.output.height
    }

    /// Output canvas.
    pub fn canvas(&self) -> Canvas {
        self.output
    }

    /// Output frame rate.
    pub fn fps(&self) -> Fps {
        self.fps
    }

    /// Output duration.
    pub fn duration_ms(&self) -> u64 {
        self.window.duration_ms()
    }

    /// Trim window on the timeline.
    pub fn window(&self) -> TrimWindow {
        self.window
    }

    /// Number of frames covering the duration.
    pub fn frame_count(&self) -> u64 {
        self.fps.frames_for_ms(self.window.duration_ms())
    }

    /// Timeline instant shown by frame `n`.
    pub fn time_of(&self, n: u64) -> u64 {
        self.window.start_ms + self.fps.frame_to_ms(n)
    }

    /// Compositor driving the stream.
    pub fn compositor(&self) -> &Compositor {
        &self.compositor
    }

    /// Return `true` when frames sit on the solid-black base.
    pub fn has_black_background(&self) -> bool {
        self.background.is_black()
    }

    /// Composited RGB frame `n`.
    pub fn get_frame(&mut self, n: u64) -> ReelcastResult<FrameRgb> {
        let t = self.time_of(n);
        let fg = self.compositor.frame_at(t)?;
        let frame = composite_over(&fg, self.background.frame(n))?;
        self.finish(frame)
    }

    /// Composited RGB frame at an arbitrary output-relative instant.
    pub fn get_frame_at_ms(&mut self, offset_ms: u64) -> ReelcastResult<FrameRgb> {
        let fg = self.compositor.frame_at(self.window.start_ms + offset_ms)?;
        let frame = composite_over(&fg, self.background.background_at(offset_ms, self.fps))?;
        self.finish(frame)
    }

    /// Straight-alpha foreground RGB of frame `n`, for encoders that composite via a mask.
    ///
    /// Always at the compositor canvas; portrait letterboxing is not applied.
    pub fn get_overlay(&mut self, n: u64) -> ReelcastResult<FrameRgb> {
        let fg = self.compositor.frame_at(self.time_of(n))?;
        Ok(overlay_and_mask(&fg).0)
    }

    /// Alpha mask of frame `n` at the compositor canvas.
    pub fn get_mask(&mut self, n: u64) -> ReelcastResult<Vec<u8>> {
        let fg = self.compositor.frame_at(self.time_of(n))?;
        Ok(fg.alpha.clone())
    }

    fn finish(&self, frame: FrameRgb) -> ReelcastResult<FrameRgb> {
        if frame.canvas() == self.output {
            Ok(frame)
        } else {
            letterbox(&frame, self.output)
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/stream.rs"]
mod tests;
