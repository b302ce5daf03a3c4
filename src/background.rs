//! Background layer beneath the composited foreground.
//!
//! A background is either a still image (resized to the canvas once) or a list of videos played
//! back to back (fit and padded to the canvas, trimmed to a start offset, optionally looped).
//! Both get the same placement transform: uniform scale about the canvas center, then
//! translation. Load failures never abort a render; they fall back to solid black with a warning.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{Receiver, SyncSender, sync_channel};
use std::time::Duration;

use rayon::prelude::*;

use crate::assets::media::{probe_video, sha256_hex};
use crate::config::RenderConfig;
use crate::foundation::core::{Canvas, Fps, LayerTransform, Point};
use crate::foundation::error::{ReelcastError, ReelcastResult};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "tif", "tiff", "webp"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "m4v", "mov", "mkv", "avi", "webm"];

/// Decoded frames buffered ahead of the frame loop.
const VIDEO_QUEUE_DEPTH: usize = 8;

/// Directory under the system temp dir holding preprocessed background videos.
pub const PREPROC_DIR_NAME: &str = "reelcast-preproc";

/// Background media, classified once by file extension.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BackgroundSource {
    /// Still image.
    Image(PathBuf),
    /// Video clips, concatenated in order.
    Video(Vec<PathBuf>),
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum MediaKind {
    Image,
    Video,
}

fn media_kind(path: &Path) -> ReelcastResult<MediaKind> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        Ok(MediaKind::Image)
    } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
        Ok(MediaKind::Video)
    } else {
        Err(ReelcastError::background_load(format!(
            "unsupported background file type '{}'",
            path.display()
        )))
    }
}

impl BackgroundSource {
    /// Classify `path` by extension (case-insensitive).
    pub fn from_path(path: &Path) -> ReelcastResult<Self> {
        Self::from_paths(&[path.to_path_buf()])
    }

    /// Classify a background list: one image, or any number of videos.
    pub fn from_paths(paths: &[PathBuf]) -> ReelcastResult<Self> {
        let kinds = paths
            .iter()
            .map(|p| media_kind(p))
            .collect::<ReelcastResult<Vec<_>>>()?;
        match kinds.as_slice() {
            [] => Err(ReelcastError::background_load("empty background list")),
            [MediaKind::Image] => Ok(Self::Image(paths[0].clone())),
            _ if kinds.iter().all(|k| *k == MediaKind::Video) => Ok(Self::Video(paths.to_vec())),
            _ => Err(ReelcastError::background_load(
                "a background list must be one image or only videos",
            )),
        }
    }

    /// Underlying files in playback order.
    pub fn paths(&self) -> &[PathBuf] {
        match self {
            Self::Image(p) => std::slice::from_ref(p),
            Self::Video(v) => v,
        }
    }
}

/// Background configuration for one render.
#[derive(Clone, Debug, PartialEq)]
pub struct BackgroundSpec {
    /// Image or video.
    pub source: BackgroundSource,
    /// Scale about center, then translate.
    pub transform: LayerTransform,
    /// Repeat a video shorter than the output.
    pub looping: bool,
}

impl BackgroundSpec {
    /// Derive the spec from `cfg`; `Ok(None)` when no background is configured.
    pub fn from_config(cfg: &RenderConfig) -> ReelcastResult<Option<Self>> {
        let mut files = cfg.background_files();
        files.retain(|p| !p.as_os_str().is_empty());
        if files.is_empty() {
            return Ok(None);
        }
        Ok(Some(Self {
            source: BackgroundSource::from_paths(&files)?,
            transform: cfg.background_transform(),
            looping: cfg.background_loop,
        }))
    }
}

/// Which part of a background video feeds the output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VideoWindow {
    /// Output frame rate; background frames are resampled to it.
    pub fps: Fps,
    /// Offset into the video where output frame 0 is taken.
    pub start_offset_ms: u64,
    /// Output duration to cover.
    pub duration_ms: u64,
}

/// One background video, probed and ready to decode.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackgroundClip {
    /// File as configured; its audio track is read from here.
    pub source: PathBuf,
    /// File frames are decoded from: the preprocessed copy, or `source`.
    pub decode_path: PathBuf,
    /// Container duration, `0` when unknown.
    pub duration_ms: u64,
    /// Whether `source` has an audio stream.
    pub has_audio: bool,
}

impl BackgroundClip {
    /// Probe `source`; frames will come from `decode_path`.
    pub fn open(
        source: &Path,
        decode_path: &Path,
        probe_timeout: Duration,
    ) -> ReelcastResult<Self> {
        let info = probe_video(source, probe_timeout)
            .map_err(|e| ReelcastError::background_load(e.to_string()))?;
        tracing::debug!(
            file = %source.display(),
            width = info.width,
            height = info.height,
            duration_ms = info.duration_ms(),
            has_audio = info.has_audio,
            "background clip probed"
        );
        Ok(Self {
            source: source.to_path_buf(),
            decode_path: decode_path.to_path_buf(),
            duration_ms: info.duration_ms(),
            has_audio: info.has_audio,
        })
    }

    /// Open every source in order. `prepared[i]`, when present, is the decode path of
    /// `sources[i]`.
    pub fn open_all(
        sources: &[PathBuf],
        prepared: &[PathBuf],
        probe_timeout: Duration,
    ) -> ReelcastResult<Vec<Self>> {
        sources
            .iter()
            .enumerate()
            .map(|(i, src)| Self::open(src, prepared.get(i).unwrap_or(src), probe_timeout))
            .collect()
    }
}

/// Part of one clip that feeds the output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClipPiece {
    /// Index into the clip list.
    pub clip: usize,
    /// Offset into the clip.
    pub start_ms: u64,
    /// Length to read; `None` reads to the end of a clip of unknown length.
    pub len_ms: Option<u64>,
}

/// Pieces covering `duration_ms` of the concatenated clips, starting `offset_ms` into the
/// concatenation.
///
/// Clips of unknown length (`0`) are read whole from the remaining offset and do not use up the
/// duration.
pub fn plan_clip_pieces(
    durations_ms: &[u64],
    offset_ms: u64,
    duration_ms: u64,
) -> ReelcastResult<Vec<ClipPiece>> {
    let mut skip = offset_ms;
    let mut budget = duration_ms;
    let mut pieces = Vec::new();
    for (clip, &d) in durations_ms.iter().enumerate() {
        if budget == 0 {
            break;
        }
        if d == 0 {
            pieces.push(ClipPiece {
                clip,
                start_ms: skip,
                len_ms: None,
            });
            skip = 0;
            continue;
        }
        if skip >= d {
            skip -= d;
            continue;
        }
        let len = (d - skip).min(budget);
        pieces.push(ClipPiece {
            clip,
            start_ms: skip,
            len_ms: Some(len),
        });
        skip = 0;
        budget -= len;
    }
    if pieces.is_empty() {
        return Err(ReelcastError::background_load(format!(
            "start offset {offset_ms}ms is beyond background video duration {}ms",
            durations_ms.iter().sum::<u64>()
        )));
    }
    Ok(pieces)
}

/// Per-frame RGB24 background source.
pub struct BackgroundLayer {
    canvas: Canvas,
    kind: LayerKind,
}

enum LayerKind {
    Black,
    Still(Vec<u8>),
    Video(Box<VideoFrames>),
}

impl BackgroundLayer {
    /// No background: the base canvas is solid black.
    pub fn black(canvas: Canvas) -> Self {
        Self {
            canvas,
            kind: LayerKind::Black,
        }
    }

    /// Still image stretched to `canvas`, then transformed.
    pub fn image(path: &Path, canvas: Canvas, transform: LayerTransform) -> ReelcastResult<Self> {
        let img = image::open(path).map_err(|e| {
            ReelcastError::background_load(format!("'{}': {e}", path.display()))
        })?;
        let resized = image::imageops::resize(
            &img.to_rgb8(),
            canvas.width,
            canvas.height,
            image::imageops::FilterType::Triangle,
        );
        let rgb = apply_transform(resized.into_raw(), canvas, transform);
        Ok(Self {
            canvas,
            kind: LayerKind::Still(rgb),
        })
    }

    /// Clips decoded back to back on a background thread, fit and padded to `canvas`.
    ///
    /// The start offset applies to the concatenation; looping repeats the trimmed span. A clip's
    /// `decode_path` may be a preprocessed copy, on which the fit/pad filter is idempotent.
    pub fn video(
        clips: &[BackgroundClip],
        canvas: Canvas,
        transform: LayerTransform,
        window: VideoWindow,
        looping: bool,
    ) -> ReelcastResult<Self> {
        let durations: Vec<u64> = clips.iter().map(|c| c.duration_ms).collect();
        let pieces = plan_clip_pieces(&durations, window.start_offset_ms, window.duration_ms)?;
        tracing::info!(
            clips = clips.len(),
            pieces = pieces.len(),
            video_ms = durations.iter().sum::<u64>(),
            offset_ms = window.start_offset_ms,
            looping,
            "background video attached"
        );

        let decoder = VideoDecoder {
            clips: clips.iter().map(|c| c.decode_path.clone()).collect(),
            pieces,
            canvas,
            fps: window.fps,
            looping,
        };
        Ok(Self {
            canvas,
            kind: LayerKind::Video(Box::new(VideoFrames::start(decoder, transform))),
        })
    }

    /// Open `spec`, falling back to black on any failure.
    ///
    /// `prepared` holds the preprocessed decode path of each video clip, by position.
    pub fn open_or_black(
        spec: Option<&BackgroundSpec>,
        prepared: &[PathBuf],
        canvas: Canvas,
        window: VideoWindow,
        probe_timeout: Duration,
    ) -> Self {
        let Some(spec) = spec else {
            return Self::black(canvas);
        };
        let opened = match &spec.source {
            BackgroundSource::Image(path) => Self::image(path, canvas, spec.transform),
            BackgroundSource::Video(paths) => {
                BackgroundClip::open_all(paths, prepared, probe_timeout).and_then(|clips| {
                    Self::video(&clips, canvas, spec.transform, window, spec.looping)
                })
            }
        };
        match opened {
            Ok(layer) => layer,
            Err(e) => {
                tracing::warn!(error = %e, "background unavailable; using solid black");
                Self::black(canvas)
            }
        }
    }

    /// Canvas the background covers.
    pub fn canvas(&self) -> Canvas {
        self.canvas
    }

    /// Return `true` for the solid-black fallback.
    pub fn is_black(&self) -> bool {
        matches!(self.kind, LayerKind::Black)
    }

    /// RGB24 background for output frame `n` (0 = first output frame), `None` for black.
    ///
    /// Sequential access is streamed; going backwards restarts the video decoder.
    pub fn frame(&mut self, n: u64) -> Option<&[u8]> {
        if let LayerKind::Video(video) = &mut self.kind
            && let Err(e) = video.advance_to(n)
        {
            tracing::warn!(error = %e, frame = n, "background video failed; continuing on black");
            self.kind = LayerKind::Black;
        }
        match &self.kind {
            LayerKind::Black => None,
            LayerKind::Still(rgb) => Some(rgb.as_slice()),
            LayerKind::Video(video) => Some(video.current()),
        }
    }

    /// RGB24 background `t_ms` after the output start, `None` for black.
    pub fn background_at(&mut self, t_ms: u64, fps: Fps) -> Option<&[u8]> {
        let num = u128::from(t_ms) * u128::from(fps.num);
        let den = 1000 * u128::from(fps.den);
        let n = ((num + den / 2) / den) as u64;
        self.frame(n)
    }
}

/// Resample `rgb` through `transform`; uncovered pixels become black.
///
/// Each output pixel center is mapped through the inverse affine and sampled bilinearly.
pub fn apply_transform(rgb: Vec<u8>, canvas: Canvas, transform: LayerTransform) -> Vec<u8> {
    if transform.is_identity() {
        return rgb;
    }
    let inv = transform.to_affine(canvas).inverse();
    let w = canvas.width as usize;
    let h = canvas.height as usize;
    let mut out = vec![0u8; rgb.len()];

    out.par_chunks_mut(w * 3).enumerate().for_each(|(y, row)| {
        for x in 0..w {
            let p = inv * Point::new(x as f64 + 0.5, y as f64 + 0.5);
            let px = sample_bilinear(&rgb, w, h, p.x - 0.5, p.y - 0.5);
            row[x * 3..x * 3 + 3].copy_from_slice(&px);
        }
    });
    out
}

fn sample_bilinear(rgb: &[u8], w: usize, h: usize, sx: f64, sy: f64) -> [u8; 3] {
    if !sx.is_finite() || !sy.is_finite() {
        return [0; 3];
    }
    let x0 = sx.floor();
    let y0 = sy.floor();
    let fx = sx - x0;
    let fy = sy - y0;
    let fetch = |x: f64, y: f64, c: usize| -> f64 {
        if x < 0.0 || y < 0.0 || x >= w as f64 || y >= h as f64 {
            0.0
        } else {
            f64::from(rgb[(y as usize * w + x as usize) * 3 + c])
        }
    };
    let mut out = [0u8; 3];
    for (c, o) in out.iter_mut().enumerate() {
        let top = fetch(x0, y0, c) * (1.0 - fx) + fetch(x0 + 1.0, y0, c) * fx;
        let bottom = fetch(x0, y0 + 1.0, c) * (1.0 - fx) + fetch(x0 + 1.0, y0 + 1.0, c) * fx;
        *o = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
    }
    out
}

/// `ffmpeg` filter that fits a video inside `canvas` (aspect preserved), pads with black and
/// resamples to `fps`.
pub fn fit_pad_filter(canvas: Canvas, fps: Fps) -> String {
    format!(
        "scale=w={w}:h={h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2:color=black,fps={n}/{d}",
        w = canvas.width,
        h = canvas.height,
        n = fps.num,
        d = fps.den
    )
}

/// Cache location of the preprocessed copy of `src` for `canvas` and `fps`.
pub fn preprocessed_path(src: &Path, canvas: Canvas, fps: Fps) -> PathBuf {
    let key = format!(
        "{}|{}x{}|{}/{}",
        src.display(),
        canvas.width,
        canvas.height,
        fps.num,
        fps.den
    );
    let hash = sha256_hex(key.as_bytes());
    std::env::temp_dir().join(PREPROC_DIR_NAME).join(format!(
        "bg-{}-{}x{}-{}_{}.mp4",
        &hash[..16],
        canvas.width,
        canvas.height,
        fps.num,
        fps.den
    ))
}

/// Transcode `src` to canvas size and output fps once, reusing a cached result.
pub fn preprocess_video(src: &Path, canvas: Canvas, fps: Fps) -> ReelcastResult<PathBuf> {
    let dst = preprocessed_path(src, canvas, fps);
    if dst.is_file() {
        tracing::debug!(file = %dst.display(), "preprocessed background cache hit");
        return Ok(dst);
    }
    if let Some(dir) = dst.parent() {
        std::fs::create_dir_all(dir).map_err(|e| {
            ReelcastError::background_load(format!(
                "failed to create preprocessing dir '{}': {e}",
                dir.display()
            ))
        })?;
    }
    let partial = dst.with_extension("partial.mp4");
    tracing::info!(src = %src.display(), dst = %dst.display(), "preprocessing background video");
    let out = Command::new("ffmpeg")
        .args(["-y", "-hide_banner", "-loglevel", "error", "-i"])
        .arg(src)
        .args(["-an", "-vf", &fit_pad_filter(canvas, fps)])
        .args([
            "-pix_fmt",
            "yuv420p",
            "-c:v",
            "libx264",
            "-preset",
            "ultrafast",
            "-crf",
            "18",
        ])
        .arg(&partial)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| ReelcastError::background_load(format!("failed to run ffmpeg: {e}")))?;
    if !out.status.success() {
        let _ = std::fs::remove_file(&partial);
        return Err(ReelcastError::background_load(format!(
            "preprocessing '{}' failed: {}",
            src.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }
    std::fs::rename(&partial, &dst).map_err(|e| {
        ReelcastError::background_load(format!(
            "failed to move preprocessed video into '{}': {e}",
            dst.display()
        ))
    })?;
    Ok(dst)
}

/// Run [`preprocess_video`] on a worker thread.
///
/// The handle yields the path to decode: the preprocessed copy, or `src` itself when
/// preprocessing fails.
pub fn spawn_preprocess(
    src: PathBuf,
    canvas: Canvas,
    fps: Fps,
) -> std::thread::JoinHandle<PathBuf> {
    std::thread::spawn(move || match preprocess_video(&src, canvas, fps) {
        Ok(path) => path,
        Err(e) => {
            tracing::warn!(error = %e, "background preprocessing failed; decoding the original");
            src
        }
    })
}

/// Preprocess every clip in parallel; the handle yields decode paths in input order.
pub fn spawn_preprocess_all(
    sources: Vec<PathBuf>,
    canvas: Canvas,
    fps: Fps,
) -> std::thread::JoinHandle<Vec<PathBuf>> {
    std::thread::spawn(move || {
        let jobs: Vec<_> = sources
            .iter()
            .map(|src| spawn_preprocess(src.clone(), canvas, fps))
            .collect();
        jobs.into_iter()
            .zip(&sources)
            .map(|(job, src)| job.join().unwrap_or_else(|_| src.clone()))
            .collect()
    })
}

#[derive(Clone, Debug)]
struct VideoDecoder {
    clips: Vec<PathBuf>,
    pieces: Vec<ClipPiece>,
    canvas: Canvas,
    fps: Fps,
    looping: bool,
}

type DecodeMsg = Result<Vec<u8>, String>;

enum PieceEnd {
    /// The frame loop dropped the receiver.
    Closed,
    Failed(String),
}

impl VideoDecoder {
    fn spawn_ffmpeg(&self, piece: &ClipPiece) -> std::io::Result<Child> {
        let mut cmd = Command::new("ffmpeg");
        cmd.args(["-hide_banner", "-loglevel", "error", "-nostdin"]);
        if piece.start_ms > 0 {
            cmd.args(["-ss", &format_seconds(piece.start_ms)]);
        }
        if let Some(len) = piece.len_ms {
            cmd.args(["-t", &format_seconds(len)]);
        }
        cmd.arg("-i")
            .arg(&self.clips[piece.clip])
            .args([
                "-an",
                "-vf",
                &fit_pad_filter(self.canvas, self.fps),
                "-f",
                "rawvideo",
                "-pix_fmt",
                "rgb24",
                "pipe:1",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd.spawn()
    }

    /// Decode loop run on the worker thread. Exits when the receiver is gone.
    fn run(self, tx: SyncSender<DecodeMsg>) {
        loop {
            let mut frames = 0u64;
            for piece in &self.pieces {
                match self.decode_piece(piece, &tx) {
                    Ok(n) => frames += n,
                    Err(PieceEnd::Closed) => return,
                    Err(PieceEnd::Failed(msg)) => {
                        let _ = tx.send(Err(msg));
                        return;
                    }
                }
            }
            if frames == 0 {
                let _ = tx.send(Err("no frames decoded from the background video".to_owned()));
                return;
            }
            if !self.looping {
                return;
            }
            tracing::debug!(frames, "background video pass complete; looping");
        }
    }

    fn decode_piece(&self, piece: &ClipPiece, tx: &SyncSender<DecodeMsg>) -> Result<u64, PieceEnd> {
        let path = &self.clips[piece.clip];
        let frame_len = self.canvas.pixel_count() * 3;
        let mut child = self
            .spawn_ffmpeg(piece)
            .map_err(|e| PieceEnd::Failed(format!("failed to spawn ffmpeg: {e}")))?;
        let stderr = child.stderr.take().map(|mut s| {
            std::thread::spawn(move || {
                let mut buf = String::new();
                let _ = s.read_to_string(&mut buf);
                buf
            })
        });
        let Some(mut stdout) = child.stdout.take() else {
            let _ = child.kill();
            return Err(PieceEnd::Failed("ffmpeg stdout unavailable".to_owned()));
        };

        let mut frames = 0u64;
        loop {
            let mut buf = vec![0u8; frame_len];
            if stdout.read_exact(&mut buf).is_err() {
                break;
            }
            frames += 1;
            if tx.send(Ok(buf)).is_err() {
                let _ = child.kill();
                let _ = child.wait();
                return Err(PieceEnd::Closed);
            }
        }
        let status = child.wait();
        let diag = stderr.and_then(|h| h.join().ok()).unwrap_or_default();
        match status {
            Ok(s) if frames == 0 && !s.success() => Err(PieceEnd::Failed(format!(
                "ffmpeg exited with {s} on '{}': {}",
                path.display(),
                diag.trim()
            ))),
            _ => {
                tracing::trace!(file = %path.display(), frames, "background piece decoded");
                Ok(frames)
            }
        }
    }
}

fn format_seconds(ms: u64) -> String {
    format!("{}.{:03}", ms / 1000, ms % 1000)
}

struct VideoFrames {
    decoder: VideoDecoder,
    transform: LayerTransform,
    rx: Receiver<DecodeMsg>,
    next_index: u64,
    raw: Vec<u8>,
    current: Vec<u8>,
    current_index: Option<u64>,
}

impl VideoFrames {
    fn start(decoder: VideoDecoder, transform: LayerTransform) -> Self {
        let rx = Self::spawn(decoder.clone());
        Self {
            decoder,
            transform,
            rx,
            next_index: 0,
            raw: Vec::new(),
            current: Vec::new(),
            current_index: None,
        }
    }

    fn spawn(decoder: VideoDecoder) -> Receiver<DecodeMsg> {
        let (tx, rx) = sync_channel(VIDEO_QUEUE_DEPTH);
        std::thread::spawn(move || decoder.run(tx));
        rx
    }

    fn current(&self) -> &[u8] {
        &self.current
    }

    fn advance_to(&mut self, n: u64) -> ReelcastResult<()> {
        if self.current_index == Some(n) {
            return Ok(());
        }
        if n < self.next_index {
            tracing::debug!(frame = n, "background seek backwards; restarting decoder");
            self.rx = Self::spawn(self.decoder.clone());
            self.next_index = 0;
            self.raw.clear();
        }
        while self.next_index <= n {
            match self.rx.recv() {
                Ok(Ok(frame)) => {
                    self.raw = frame;
                    self.next_index += 1;
                }
                Ok(Err(msg)) => return Err(ReelcastError::background_load(msg)),
                Err(_) if !self.raw.is_empty() => {
                    // Non-looping source ended: hold the last frame.
                    self.next_index = n + 1;
                }
                Err(_) => {
                    return Err(ReelcastError::background_load(
                        "background decoder stopped before producing a frame",
                    ));
                }
            }
        }
        self.current = apply_transform(self.raw.clone(), self.decoder.canvas, self.transform);
        self.current_index = Some(n);
        Ok(())
    }
}

#[cfg(test)]
#[path = "../tests/unit/background.rs"]
mod tests;
