use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::foundation::core::{Canvas, Fps, LayerTransform, Vec2};
use crate::foundation::error::{ReelcastError, ReelcastResult};

/// How decoded layers are held in memory during a render.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodeMode {
    /// `Precompute` for timelines up to `precompute_limit` assets, `Streaming` beyond.
    #[default]
    Auto,
    /// Bounded LRU cache, decode on demand. O(1) memory in timeline length.
    Streaming,
    /// Decode every asset up front on a worker pool. O(n) memory.
    Precompute,
}

/// What the middle band shows while two assets blend.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FadePolicy {
    /// Direct premultiplied crossfade between the two assets.
    #[default]
    Crossfade,
    /// Fade out to the color sampled at pixel (10, 10) of the first asset, then fade in.
    ThroughColor,
}

/// Which external path produces the output file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    /// Synthesize every frame in-process and stream raw pixels to the encoder.
    #[default]
    Frames,
    /// Emit a declarative filter graph and let `ffmpeg` execute it in one pass.
    FilterGraph,
}

/// Immutable render configuration, captured once before the render starts.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RenderConfig {
    /// Output frame rate.
    pub fps: Fps,
    /// Configured crossfade length between consecutive assets.
    pub transition_ms: u64,
    /// Timeline instant at which the output starts.
    pub start_trim_ms: u64,
    /// Timeline instant at which the output ends (`0` = end of timeline).
    pub end_trim_ms: u64,
    /// Fraction of rows in the top band, `[0, 0.5]`.
    pub top_ratio: f64,
    /// Fraction of rows in the bottom band, `[0, 0.5]`.
    pub bottom_ratio: f64,
    /// Hard-switch the top band per asset instead of holding the first asset's.
    pub dynamic_top: bool,
    /// Optional background image or video; shorthand for a one-item `background_paths`.
    pub background_path: Option<PathBuf>,
    /// Background videos played back to back as one clip.
    pub background_paths: Vec<PathBuf>,
    /// Background horizontal translation in pixels.
    pub background_translate_x: f64,
    /// Background vertical translation in pixels.
    pub background_translate_y: f64,
    /// Background uniform scale about the canvas center.
    pub background_scale: f64,
    /// Repeat a background video that is shorter than the output.
    pub background_loop: bool,
    /// Audio files concatenated in order.
    pub audio_paths: Vec<PathBuf>,
    /// Linear audio fade-in length.
    pub audio_fade_in_ms: u64,
    /// Linear audio fade-out length.
    pub audio_fade_out_ms: u64,
    /// Letterbox the composited frame into a portrait canvas.
    pub portrait: bool,
    /// Explicit portrait canvas; defaults to [`Canvas::portrait_for`].
    pub portrait_canvas: Option<Canvas>,
    /// LRU capacity in streaming mode (min 2).
    pub cache_size: usize,
    /// Layer memory strategy.
    pub decode_mode: DecodeMode,
    /// Asset count up to which [`DecodeMode::Auto`] precomputes.
    pub precompute_limit: usize,
    /// Worker threads for precompute (`None` = rayon default).
    pub threads: Option<usize>,
    /// Middle-band transition look.
    pub fade_policy: FadePolicy,
    /// Per-frame synthesis or one-pass filter graph.
    pub output_mode: OutputMode,
    /// Probe for hardware H.264 encoders before falling back to libx264.
    pub prefer_hw_encoder: bool,
    /// Timeout for short `ffmpeg`/`ffprobe` probes.
    pub probe_timeout_ms: u64,
    /// Overwrite an existing output file.
    pub overwrite: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            fps: Fps { num: 30, den: 1 },
            transition_ms: 300,
            start_trim_ms: 0,
            end_trim_ms: 0,
            top_ratio: 0.0,
            bottom_ratio: 0.0,
            dynamic_top: false,
            background_path: None,
            background_paths: Vec::new(),
            background_translate_x: 0.0,
            background_translate_y: 0.0,
            background_scale: 1.0,
            background_loop: true,
            audio_paths: Vec::new(),
            audio_fade_in_ms: 0,
            audio_fade_out_ms: 0,
            portrait: false,
            portrait_canvas: None,
            cache_size: 3,
            decode_mode: DecodeMode::Auto,
            precompute_limit: 64,
            threads: None,
            fade_policy: FadePolicy::Crossfade,
            output_mode: OutputMode::Frames,
            prefer_hw_encoder: false,
            probe_timeout_ms: 3000,
            overwrite: true,
        }
    }
}

impl RenderConfig {
    /// Load a JSON config file and validate it.
    pub fn from_path(path: &Path) -> ReelcastResult<Self> {
        let bytes =
            std::fs::read(path).with_context(|| format!("read config '{}'", path.display()))?;
        let cfg: RenderConfig = serde_json::from_slice(&bytes).map_err(|e| {
            ReelcastError::config(format!("invalid config '{}': {e}", path.display()))
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject configurations that cannot render.
    pub fn validate(&self) -> ReelcastResult<()> {
        if self.fps.num == 0 || self.fps.den == 0 {
            return Err(ReelcastError::config("fps must be non-zero"));
        }
        for (name, r) in [
            ("top_ratio", self.top_ratio),
            ("bottom_ratio", self.bottom_ratio),
        ] {
            if !r.is_finite() || !(0.0..=0.5).contains(&r) {
                return Err(ReelcastError::config(format!(
                    "{name} must be between 0.0 and 0.5, got {r}"
                )));
            }
        }
        if self.top_ratio + self.bottom_ratio > 1.0 {
            return Err(ReelcastError::config(
                "top_ratio + bottom_ratio must be <= 1.0",
            ));
        }
        if !self.background_scale.is_finite() || self.background_scale <= 0.0 {
            return Err(ReelcastError::config(
                "background_scale must be finite and > 0",
            ));
        }
        if !self.background_translate_x.is_finite() || !self.background_translate_y.is_finite() {
            return Err(ReelcastError::config("background translation must be finite"));
        }
        if self.background_path.is_some() && !self.background_paths.is_empty() {
            return Err(ReelcastError::config(
                "set either background_path or background_paths, not both",
            ));
        }
        if self.cache_size < 2 {
            return Err(ReelcastError::config(
                "cache_size must be >= 2 (current and next asset)",
            ));
        }
        if self.end_trim_ms != 0 && self.end_trim_ms <= self.start_trim_ms {
            return Err(ReelcastError::config(format!(
                "degenerate trim range: end_trim_ms ({}) <= start_trim_ms ({})",
                self.end_trim_ms, self.start_trim_ms
            )));
        }
        if let Some(n) = self.threads
            && n == 0
        {
            return Err(ReelcastError::config("threads must be >= 1 when set"));
        }
        if let Some(c) = self.portrait_canvas
            && (c.width == 0 || c.height == 0)
        {
            return Err(ReelcastError::config("portrait_canvas must be non-empty"));
        }
        Ok(())
    }

    /// Background transform assembled from the flat config fields.
    pub fn background_transform(&self) -> LayerTransform {
        LayerTransform {
            translate: Vec2::new(self.background_translate_x, self.background_translate_y),
            scale: self.background_scale,
        }
    }

    /// Background files in playback order.
    pub fn background_files(&self) -> Vec<PathBuf> {
        match &self.background_path {
            Some(path) => vec![path.clone()],
            None => self.background_paths.clone(),
        }
    }

    /// Resolve [`DecodeMode::Auto`] against the timeline length.
    pub fn effective_decode_mode(&self, asset_count: usize) -> DecodeMode {
        match self.decode_mode {
            DecodeMode::Auto if asset_count <= self.precompute_limit => DecodeMode::Precompute,
            DecodeMode::Auto => DecodeMode::Streaming,
            other => other,
        }
    }

    /// Output canvas for a composited landscape canvas.
    pub fn output_canvas(&self, landscape: Canvas) -> Canvas {
        if !self.portrait {
            return landscape;
        }
        self.portrait_canvas
            .unwrap_or_else(|| landscape.portrait_for())
    }
}

#[cfg(test)]
#[path = "../tests/unit/config.rs"]
mod tests;
