use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::time::{Duration, Instant};

use crate::assets::cache::{CacheStats, LayerCache, LayerStore, PrecomputedLayers};
use crate::assets::decode::probe_canvas;
use crate::assets::media::MIX_SAMPLE_RATE;
use crate::audio::{AudioFades, AudioTimeline};
use crate::background::{
    BackgroundClip, BackgroundLayer, BackgroundSource, BackgroundSpec, VideoWindow,
    plan_clip_pieces, spawn_preprocess_all,
};
use crate::compose::{Compositor, CompositorOpts};
use crate::config::{DecodeMode, OutputMode, RenderConfig};
use crate::encode::ffmpeg::{FfmpegSink, FfmpegSinkOpts, VideoCodec, select_codec};
use crate::encode::filtergraph::{FilterGraphPlan, GraphBackground};
use crate::encode::sink::{AudioInputConfig, FrameSink, SinkConfig};
use crate::foundation::core::{Canvas, FrameIndex};
use crate::foundation::error::{ReelcastError, ReelcastResult};
use crate::render::stream::{FrameStream, TrimWindow};
use crate::timeline::Timeline;

/// Render state machine stages, in order. There is no way back to an earlier stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderStage {
    /// Configuration validated.
    Configure,
    /// Frames directory scanned and timeline built.
    BuildTimeline,
    /// Layers decoded (eagerly or on demand) and background opened.
    Decode,
    /// Frames being produced and encoded.
    StreamFrames,
    /// Output moved into place.
    Finalize,
}

impl std::fmt::Display for RenderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Configure => "configure",
            Self::BuildTimeline => "build_timeline",
            Self::Decode => "decode",
            Self::StreamFrames => "stream_frames",
            Self::Finalize => "finalize",
        };
        f.write_str(s)
    }
}

/// Progress notification sent while rendering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub struct ProgressEvent {
    /// Current stage.
    pub stage: RenderStage,
    /// Progress within the render, `0..=100`.
    pub percent: u8,
    /// Frames produced so far.
    pub frame: u64,
    /// Frames the render will produce.
    pub total_frames: u64,
}

/// Cancellation flag shared with other threads.
///
/// Honoured only up to the moment encoding starts; a running encoder always finishes.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// New, not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Return `true` once [`CancelToken::cancel`] was called.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Summary of a finished render.
#[derive(Clone, Debug)]
pub struct RenderReport {
    /// Final output file, when one was written.
    pub output: Option<PathBuf>,
    /// Frames handed to the encoder.
    pub frames_written: u64,
    /// Output duration.
    pub duration_ms: u64,
    /// Wall-clock time of the render.
    pub elapsed: Duration,
    /// Layer store counters (zero for the filter-graph path).
    pub cache_stats: CacheStats,
    /// Video encoder used.
    pub codec: Option<VideoCodec>,
    /// Whether an audio stream was encoded.
    pub audio: bool,
}

/// Everything one render needs; no state outlives it.
pub struct RenderSession {
    cfg: RenderConfig,
    frames_dir: PathBuf,
    progress: Option<Sender<ProgressEvent>>,
    cancel: CancelToken,
}

struct Prepared {
    stream: FrameStream,
    background: Option<BackgroundSpec>,
}

/// Removes a scratch file when dropped.
struct TempFileGuard(PathBuf);

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

/// `<dir>/<stem>.partial.<ext>` next to `out_path`; the extension is kept so the muxer is
/// unchanged.
pub fn partial_path(out_path: &Path) -> PathBuf {
    let stem = out_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_owned());
    let name = match out_path.extension() {
        Some(ext) => format!("{stem}.partial.{}", ext.to_string_lossy()),
        None => format!("{stem}.partial"),
    };
    out_path.with_file_name(name)
}

fn scratch_path(prefix: &str, ext: &str) -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    std::env::temp_dir().join(format!("{prefix}-{}-{nanos}.{ext}", std::process::id()))
}

impl RenderSession {
    /// Validate `cfg` and bind it to a frames directory.
    pub fn new(cfg: RenderConfig, frames_dir: impl Into<PathBuf>) -> ReelcastResult<Self> {
        cfg.validate()?;
        Ok(Self {
            cfg,
            frames_dir: frames_dir.into(),
            progress: None,
            cancel: CancelToken::new(),
        })
    }

    /// Send [`ProgressEvent`]s to `tx`.
    pub fn with_progress(mut self, tx: Sender<ProgressEvent>) -> Self {
        self.progress = Some(tx);
        self
    }

    /// Use an externally owned cancellation token.
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token that cancels this session before encoding starts.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Session configuration.
    pub fn config(&self) -> &RenderConfig {
        &self.cfg
    }

    fn emit(&self, stage: RenderStage, percent: u8, frame: u64, total_frames: u64) {
        if let Some(tx) = &self.progress {
            // A dropped receiver only means nobody is listening.
            let _ = tx.send(ProgressEvent {
                stage,
                percent,
                frame,
                total_frames,
            });
        }
    }

    fn enter(&self, stage: RenderStage) -> ReelcastResult<()> {
        if stage <= RenderStage::StreamFrames && self.cancel.is_cancelled() {
            tracing::info!(%stage, "render cancelled");
            return Err(ReelcastError::Cancelled);
        }
        tracing::info!(%stage, "render stage");
        self.emit(stage, 0, 0, 0);
        Ok(())
    }

    /// Scan the frames directory; also returns the canvas taken from the first asset.
    pub fn build_timeline(&self) -> ReelcastResult<(Timeline, Canvas)> {
        let timeline = Timeline::from_dir(&self.frames_dir, self.cfg.transition_ms)?;
        let canvas = probe_canvas(&timeline.assets()[0].source)?;
        tracing::info!(width = canvas.width, height = canvas.height, "canvas from first asset");
        Ok((timeline, canvas))
    }

    fn prepare(&self) -> ReelcastResult<Prepared> {
        self.enter(RenderStage::Configure)?;
        let background = BackgroundSpec::from_config(&self.cfg).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "background unavailable; using solid black");
            None
        });

        self.enter(RenderStage::BuildTimeline)?;
        let (timeline, canvas) = self.build_timeline()?;
        let window = TrimWindow::resolve(
            self.cfg.start_trim_ms,
            self.cfg.end_trim_ms,
            timeline.total_duration_ms(),
        )?;

        self.enter(RenderStage::Decode)?;
        // Background preprocessing overlaps with layer decoding.
        let preprocess = match background.as_ref().map(|b| &b.source) {
            Some(BackgroundSource::Video(paths)) => {
                Some(spawn_preprocess_all(paths.clone(), canvas, self.cfg.fps))
            }
            _ => None,
        };

        let mode = self.cfg.effective_decode_mode(timeline.len());
        let store = match mode {
            DecodeMode::Precompute => LayerStore::Precomputed(PrecomputedLayers::decode_all(
                &timeline,
                canvas,
                self.cfg.threads,
            )?),
            DecodeMode::Streaming | DecodeMode::Auto => {
                LayerStore::Streaming(LayerCache::new(self.cfg.cache_size, canvas))
            }
        };
        tracing::info!(mode = ?mode, assets = timeline.len(), "layer store ready");
        let compositor = Compositor::new(
            timeline,
            store,
            canvas,
            CompositorOpts {
                top_ratio: self.cfg.top_ratio,
                bottom_ratio: self.cfg.bottom_ratio,
                dynamic_top: self.cfg.dynamic_top,
                fade_policy: self.cfg.fade_policy,
            },
        )?;

        let prepared_videos = preprocess
            .and_then(|h| h.join().ok())
            .unwrap_or_default();
        let layer = BackgroundLayer::open_or_black(
            background.as_ref(),
            &prepared_videos,
            canvas,
            VideoWindow {
                fps: self.cfg.fps,
                start_offset_ms: window.start_ms,
                duration_ms: window.duration_ms(),
            },
            self.probe_timeout(),
        );
        let stream = FrameStream::new(
            compositor,
            layer,
            self.cfg.fps,
            window,
            self.cfg.output_canvas(canvas),
        );
        Ok(Prepared { stream, background })
    }

    fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.cfg.probe_timeout_ms)
    }

    /// Run the stages up to decoding and return the frame stream.
    pub fn open_stream(&self) -> ReelcastResult<FrameStream> {
        Ok(self.prepare()?.stream)
    }

    /// Push every frame into `sink`, without audio.
    pub fn render_to_sink(&self, sink: &mut dyn FrameSink) -> ReelcastResult<RenderReport> {
        let started = Instant::now();
        let mut prepared = self.prepare()?;
        self.enter(RenderStage::StreamFrames)?;
        let frames = self.drive(&mut prepared.stream, sink, None)?;
        self.enter(RenderStage::Finalize)?;
        self.emit(RenderStage::Finalize, 100, frames, frames);
        Ok(RenderReport {
            output: None,
            frames_written: frames,
            duration_ms: prepared.stream.duration_ms(),
            elapsed: started.elapsed(),
            cache_stats: prepared.stream.compositor().cache_stats(),
            codec: None,
            audio: false,
        })
    }

    fn drive(
        &self,
        stream: &mut FrameStream,
        sink: &mut dyn FrameSink,
        audio: Option<AudioInputConfig>,
    ) -> ReelcastResult<u64> {
        let total = stream.frame_count();
        sink.begin(SinkConfig {
            width: stream.width(),
            height: stream.height(),
            fps: stream.fps(),
            audio,
        })?;
        let mut last_percent = None;
        for n in 0..total {
            let frame = stream.get_frame(n)?;
            sink.push_frame(FrameIndex(n), &frame)?;
            let percent = ((n + 1) * 100 / total.max(1)) as u8;
            if last_percent != Some(percent) {
                last_percent = Some(percent);
                self.emit(RenderStage::StreamFrames, percent, n + 1, total);
            }
        }
        sink.end()?;
        Ok(total)
    }

    fn build_audio(
        &self,
        background: Option<&BackgroundSpec>,
        window: TrimWindow,
    ) -> ReelcastResult<Option<AudioTimeline>> {
        let fades = AudioFades {
            fade_in_ms: self.cfg.audio_fade_in_ms,
            fade_out_ms: self.cfg.audio_fade_out_ms,
        };
        if !self.cfg.audio_paths.is_empty() {
            return AudioTimeline::from_paths(
                &self.cfg.audio_paths,
                window.start_ms,
                window.duration_ms(),
                fades,
            )
            .map(Some);
        }
        let Some(BackgroundSpec {
            source: BackgroundSource::Video(paths),
            looping,
            ..
        }) = background
        else {
            return Ok(None);
        };
        let audio = BackgroundClip::open_all(paths, &[], self.probe_timeout()).and_then(|clips| {
            AudioTimeline::from_background_clips(
                &clips,
                window.start_ms,
                window.duration_ms(),
                *looping,
                fades,
            )
        });
        match audio {
            Ok(audio) => Ok(audio),
            Err(e) => {
                tracing::warn!(error = %e, "background video audio unavailable");
                Ok(None)
            }
        }
    }

    /// Render to `out_path`.
    ///
    /// The encoder writes `<name>.partial.<ext>`, which is renamed into place on success and
    /// deleted on failure.
    #[tracing::instrument(skip(self), fields(frames_dir = %self.frames_dir.display()))]
    pub fn render(&self, out_path: &Path) -> ReelcastResult<RenderReport> {
        if !self.cfg.overwrite && out_path.exists() {
            return Err(ReelcastError::config(format!(
                "output file '{}' already exists",
                out_path.display()
            )));
        }
        let started = Instant::now();
        let partial = partial_path(out_path);
        let result = match self.cfg.output_mode {
            OutputMode::Frames => self.render_frames(&partial),
            OutputMode::FilterGraph => self.render_graph(&partial),
        };
        let mut report = match result {
            Ok(report) => report,
            Err(e) => {
                let _ = std::fs::remove_file(&partial);
                return Err(e);
            }
        };

        std::fs::rename(&partial, out_path).map_err(|e| {
            let _ = std::fs::remove_file(&partial);
            ReelcastError::Other(anyhow::anyhow!(
                "failed to move '{}' to '{}': {e}",
                partial.display(),
                out_path.display()
            ))
        })?;
        report.output = Some(out_path.to_path_buf());
        report.elapsed = started.elapsed();
        self.emit(
            RenderStage::Finalize,
            100,
            report.frames_written,
            report.frames_written,
        );
        tracing::info!(
            out = %out_path.display(),
            frames = report.frames_written,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "render finished"
        );
        Ok(report)
    }

    fn render_frames(&self, partial: &Path) -> ReelcastResult<RenderReport> {
        let mut prepared = self.prepare()?;
        let window = prepared.stream.window();

        let audio = self.build_audio(prepared.background.as_ref(), window)?;
        let audio_file = match audio {
            Some(audio) => {
                let guard = TempFileGuard(scratch_path("reelcast-audio", "f32le"));
                audio.write_f32le(&guard.0)?;
                Some((guard, audio.channels()))
            }
            None => None,
        };

        self.enter(RenderStage::StreamFrames)?;
        let codec = select_codec(self.cfg.prefer_hw_encoder, self.probe_timeout());
        let mut sink = FfmpegSink::new(FfmpegSinkOpts {
            out_path: partial.to_path_buf(),
            overwrite: true,
            codec,
        });
        let audio_cfg = audio_file.as_ref().map(|(guard, channels)| AudioInputConfig {
            path: guard.0.clone(),
            sample_rate: MIX_SAMPLE_RATE,
            channels: *channels,
        });
        let frames = self.drive(&mut prepared.stream, &mut sink, audio_cfg)?;

        self.enter(RenderStage::Finalize)?;
        Ok(RenderReport {
            output: None,
            frames_written: frames,
            duration_ms: window.duration_ms(),
            elapsed: Duration::ZERO,
            cache_stats: prepared.stream.compositor().cache_stats(),
            codec: Some(codec),
            audio: audio_file.is_some(),
        })
    }

    /// Build the one-pass filter graph for this session; scripts go to `work_dir`.
    pub fn plan_filter_graph(&self, work_dir: &Path) -> ReelcastResult<FilterGraphPlan> {
        self.enter(RenderStage::Configure)?;
        self.enter(RenderStage::BuildTimeline)?;
        let (timeline, canvas) = self.build_timeline()?;
        let background = self.graph_background(canvas, timeline.total_duration_ms());
        FilterGraphPlan::build(&timeline, &self.cfg, canvas, background.as_ref(), work_dir)
    }

    fn graph_background(&self, canvas: Canvas, timeline_ms: u64) -> Option<GraphBackground> {
        let spec = match BackgroundSpec::from_config(&self.cfg) {
            Ok(spec) => spec?,
            Err(e) => {
                tracing::warn!(error = %e, "background unavailable; using solid black");
                return None;
            }
        };
        match &spec.source {
            BackgroundSource::Image(path) => {
                if !path.is_file() {
                    tracing::warn!(
                        file = %path.display(),
                        "background image missing; using solid black"
                    );
                    return None;
                }
                Some(GraphBackground {
                    spec,
                    clips: Vec::new(),
                    pieces: Vec::new(),
                })
            }
            BackgroundSource::Video(paths) => {
                let prepared = spawn_preprocess_all(paths.clone(), canvas, self.cfg.fps)
                    .join()
                    .unwrap_or_default();
                let window = TrimWindow::resolve(
                    self.cfg.start_trim_ms,
                    self.cfg.end_trim_ms,
                    timeline_ms,
                );
                let planned = window.and_then(|window| {
                    let clips = BackgroundClip::open_all(paths, &prepared, self.probe_timeout())?;
                    let durations: Vec<u64> = clips.iter().map(|c| c.duration_ms).collect();
                    let pieces =
                        plan_clip_pieces(&durations, window.start_ms, window.duration_ms())?;
                    Ok((clips, pieces))
                });
                match planned {
                    Ok((clips, pieces)) => Some(GraphBackground {
                        spec,
                        clips,
                        pieces,
                    }),
                    Err(e) => {
                        tracing::warn!(
                            error = %e,
                            "background video unavailable; using solid black"
                        );
                        None
                    }
                }
            }
        }
    }

    fn render_graph(&self, partial: &Path) -> ReelcastResult<RenderReport> {
        let work_dir = std::env::temp_dir().join("reelcast-graph");
        let plan = self.plan_filter_graph(&work_dir)?;
        // Nothing to decode up front: ffmpeg reads the images itself.
        self.enter(RenderStage::Decode)?;
        self.enter(RenderStage::StreamFrames)?;
        let codec = select_codec(self.cfg.prefer_hw_encoder, self.probe_timeout());
        plan.run(codec, partial, true)?;
        self.enter(RenderStage::Finalize)?;
        Ok(RenderReport {
            output: None,
            frames_written: self.cfg.fps.frames_for_ms(plan.duration_ms()),
            duration_ms: plan.duration_ms(),
            elapsed: Duration::ZERO,
            cache_stats: CacheStats::default(),
            codec: Some(codec),
            audio: plan.has_audio(),
        })
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/session.rs"]
mod tests;
