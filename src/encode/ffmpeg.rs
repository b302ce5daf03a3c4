use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::time::Duration;

use crate::assets::media::{is_ffmpeg_on_path, run_with_timeout};
use crate::encode::sink::{FrameSink, SinkConfig};
use crate::foundation::core::{Fps, FrameIndex};
use crate::foundation::error::{ReelcastError, ReelcastResult};
use crate::render::composite::FrameRgb;

/// H.264 encoder used for the output video.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoCodec {
    /// Software `libx264`, tuned for speed.
    Libx264,
    /// NVIDIA `h264_nvenc`.
    Nvenc,
    /// Intel `h264_qsv`.
    Qsv,
    /// AMD `h264_amf`.
    Amf,
}

impl VideoCodec {
    /// `ffmpeg` encoder name.
    pub fn encoder_name(self) -> &'static str {
        match self {
            Self::Libx264 => "libx264",
            Self::Nvenc => "h264_nvenc",
            Self::Qsv => "h264_qsv",
            Self::Amf => "h264_amf",
        }
    }

    /// Output arguments starting at `-c:v`.
    pub fn output_args(self) -> Vec<String> {
        let mut args = vec!["-c:v".to_owned(), self.encoder_name().to_owned()];
        match self {
            Self::Libx264 => args.extend(
                [
                    "-preset",
                    "ultrafast",
                    "-pix_fmt",
                    "yuv420p",
                    "-crf",
                    "22",
                    "-tune",
                    "zerolatency",
                    "-bf",
                    "0",
                ]
                .map(str::to_owned),
            ),
            Self::Nvenc | Self::Qsv | Self::Amf => {
                args.extend(["-pix_fmt", "yuv420p"].map(str::to_owned))
            }
        }
        args
    }
}

/// First hardware H.264 encoder listed by `ffmpeg -encoders`, in preference order.
pub fn pick_hw_encoder(encoders_listing: &str) -> Option<VideoCodec> {
    let txt = encoders_listing.to_ascii_lowercase();
    [VideoCodec::Nvenc, VideoCodec::Qsv, VideoCodec::Amf]
        .into_iter()
        .find(|c| txt.contains(c.encoder_name()))
}

/// Choose the video encoder.
///
/// Hardware encoders are only considered when `prefer_hw` is set. The probe runs under `timeout`
/// and any failure falls back to `libx264`.
pub fn select_codec(prefer_hw: bool, timeout: Duration) -> VideoCodec {
    if !prefer_hw {
        return VideoCodec::Libx264;
    }
    let mut cmd = Command::new("ffmpeg");
    cmd.args(["-hide_banner", "-encoders"]);
    let codec = match run_with_timeout(&mut cmd, timeout) {
        Ok(Some(out)) => pick_hw_encoder(&String::from_utf8_lossy(&out.stdout)),
        Ok(None) => {
            tracing::warn!(
                timeout_ms = timeout.as_millis() as u64,
                "hardware encoder probe timed out; using libx264"
            );
            None
        }
        Err(e) => {
            tracing::warn!(error = %e, "hardware encoder probe failed; using libx264");
            None
        }
    };
    codec.unwrap_or(VideoCodec::Libx264)
}

/// Return `true` for containers that benefit from `-movflags +faststart`.
pub fn wants_faststart(out_path: &Path) -> bool {
    let ext = out_path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    matches!(ext.as_str(), "mp4" | "mov" | "m4v")
}

/// Options for [`FfmpegSink`].
#[derive(Clone, Debug)]
pub struct FfmpegSinkOpts {
    /// Output file path.
    pub out_path: PathBuf,
    /// Overwrite output file if it already exists.
    pub overwrite: bool,
    /// Video encoder.
    pub codec: VideoCodec,
}

impl FfmpegSinkOpts {
    /// Create options for writing to `out_path` with `libx264`.
    pub fn new(out_path: impl Into<PathBuf>) -> Self {
        Self {
            out_path: out_path.into(),
            overwrite: true,
            codec: VideoCodec::Libx264,
        }
    }
}

/// Sink that spawns the system `ffmpeg` and streams raw RGB24 frames to its stdin.
///
/// Audio is optional and provided through `SinkConfig.audio`.
pub struct FfmpegSink {
    opts: FfmpegSinkOpts,

    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stderr_drain: Option<std::thread::JoinHandle<std::io::Result<Vec<u8>>>>,

    frame_len: usize,
    cfg: Option<SinkConfig>,
    last_idx: Option<FrameIndex>,
}

impl FfmpegSink {
    /// Create a new sink that streams into `ffmpeg`.
    pub fn new(opts: FfmpegSinkOpts) -> Self {
        Self {
            opts,
            child: None,
            stdin: None,
            stderr_drain: None,
            frame_len: 0,
            cfg: None,
            last_idx: None,
        }
    }

    /// Full `ffmpeg` argument list for `cfg`.
    pub fn command_args(&self, cfg: &SinkConfig) -> Vec<String> {
        let mut args: Vec<String> = vec![
            if self.opts.overwrite { "-y" } else { "-n" }.to_owned(),
            "-hide_banner".to_owned(),
            "-loglevel".to_owned(),
            "error".to_owned(),
            "-f".to_owned(),
            "rawvideo".to_owned(),
            "-pix_fmt".to_owned(),
            "rgb24".to_owned(),
            "-s".to_owned(),
            format!("{}x{}", cfg.width, cfg.height),
            "-r".to_owned(),
            fps_arg(cfg.fps),
            "-i".to_owned(),
            "pipe:0".to_owned(),
        ];
        if let Some(audio) = cfg.audio.as_ref() {
            args.extend([
                "-f".to_owned(),
                "f32le".to_owned(),
                "-ar".to_owned(),
                audio.sample_rate.to_string(),
                "-ac".to_owned(),
                audio.channels.to_string(),
                "-i".to_owned(),
                audio.path.display().to_string(),
            ]);
        }
        args.extend(self.opts.codec.output_args());
        if cfg.audio.is_some() {
            args.extend(
                ["-c:a", "aac", "-b:a", "192k", "-shortest"].map(str::to_owned),
            );
        } else {
            args.push("-an".to_owned());
        }
        if wants_faststart(&self.opts.out_path) {
            args.extend(["-movflags", "+faststart"].map(str::to_owned));
        }
        args.push(self.opts.out_path.display().to_string());
        args
    }
}

impl FrameSink for FfmpegSink {
    fn begin(&mut self, cfg: SinkConfig) -> ReelcastResult<()> {
        if cfg.width == 0 || cfg.height == 0 {
            return Err(ReelcastError::config(
                "ffmpeg sink width/height must be non-zero",
            ));
        }
        if !cfg.width.is_multiple_of(2) || !cfg.height.is_multiple_of(2) {
            return Err(ReelcastError::config(format!(
                "output size {}x{} must be even (required for yuv420p output)",
                cfg.width, cfg.height
            )));
        }
        if let Some(audio) = cfg.audio.as_ref()
            && (audio.sample_rate == 0 || audio.channels == 0)
        {
            return Err(ReelcastError::config(
                "audio sample_rate and channels must be non-zero when audio is enabled",
            ));
        }

        ensure_parent_dir(&self.opts.out_path)?;
        if !self.opts.overwrite && self.opts.out_path.exists() {
            return Err(ReelcastError::config(format!(
                "output file '{}' already exists",
                self.opts.out_path.display()
            )));
        }
        if !is_ffmpeg_on_path(Duration::from_secs(10)) {
            return Err(ReelcastError::encoder(
                "ffmpeg is required for encoding, but was not found on PATH",
            ));
        }

        let args = self.command_args(&cfg);
        tracing::info!(
            codec = self.opts.codec.encoder_name(),
            out = %self.opts.out_path.display(),
            width = cfg.width,
            height = cfg.height,
            audio = cfg.audio.is_some(),
            "starting ffmpeg encoder"
        );
        tracing::debug!(args = ?args, "ffmpeg command");

        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                ReelcastError::encoder(format!(
                    "failed to spawn ffmpeg (is it installed and on PATH?): {e}"
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ReelcastError::encoder("failed to open ffmpeg stdin"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| ReelcastError::encoder("failed to open ffmpeg stderr"))?;
        let stderr_drain = std::thread::spawn(move || {
            let mut stderr_bytes = Vec::new();
            stderr.read_to_end(&mut stderr_bytes)?;
            Ok(stderr_bytes)
        });

        self.frame_len = cfg.width as usize * cfg.height as usize * 3;
        self.child = Some(child);
        self.stdin = Some(stdin);
        self.stderr_drain = Some(stderr_drain);
        self.cfg = Some(cfg);
        self.last_idx = None;
        Ok(())
    }

    fn push_frame(&mut self, idx: FrameIndex, frame: &FrameRgb) -> ReelcastResult<()> {
        let cfg = self
            .cfg
            .as_ref()
            .ok_or_else(|| ReelcastError::encoder("ffmpeg sink not started"))?;
        if let Some(last) = self.last_idx
            && idx.0 <= last.0
        {
            return Err(ReelcastError::encoder(
                "ffmpeg sink received out-of-order frame index",
            ));
        }
        self.last_idx = Some(idx);

        if frame.width != cfg.width || frame.height != cfg.height {
            return Err(ReelcastError::encoder(format!(
                "frame size mismatch: got {}x{}, expected {}x{}",
                frame.width, frame.height, cfg.width, cfg.height
            )));
        }
        if frame.data.len() != self.frame_len {
            return Err(ReelcastError::encoder(
                "frame.data size mismatch with width*height*3",
            ));
        }

        let Some(stdin) = self.stdin.as_mut() else {
            return Err(ReelcastError::encoder("ffmpeg sink is already finalized"));
        };

        use std::io::Write as _;
        if let Err(e) = stdin.write_all(&frame.data) {
            // ffmpeg died early; its stderr says why.
            drop(self.stdin.take());
            let diag = self.finish_child().err().map(|e| e.to_string());
            return Err(ReelcastError::encoder(match diag {
                Some(d) => format!("failed to write frame to ffmpeg stdin: {e}; {d}"),
                None => format!("failed to write frame to ffmpeg stdin: {e}"),
            }));
        }
        Ok(())
    }

    fn end(&mut self) -> ReelcastResult<()> {
        drop(self.stdin.take());
        self.finish_child()?;
        self.cfg = None;
        Ok(())
    }
}

impl FfmpegSink {
    fn finish_child(&mut self) -> ReelcastResult<()> {
        let mut child = self
            .child
            .take()
            .ok_or_else(|| ReelcastError::encoder("ffmpeg sink not started"))?;
        let status = child.wait().map_err(|e| {
            ReelcastError::encoder(format!("failed to wait for ffmpeg to finish: {e}"))
        })?;
        let stderr_bytes = match self.stderr_drain.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| ReelcastError::encoder("ffmpeg stderr drain thread panicked"))?
                .map_err(|e| ReelcastError::encoder(format!("ffmpeg stderr read failed: {e}")))?,
            None => Vec::new(),
        };

        if !status.success() {
            return Err(ReelcastError::encoder(format!(
                "ffmpeg exited with status {}: {}",
                status,
                String::from_utf8_lossy(&stderr_bytes).trim()
            )));
        }
        Ok(())
    }
}

impl Drop for FfmpegSink {
    fn drop(&mut self) {
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// `num/den` frame-rate argument for `-r`.
pub(crate) fn fps_arg(fps: Fps) -> String {
    format!("{}/{}", fps.num, fps.den)
}

/// Ensure the parent directory of `path` exists.
pub fn ensure_parent_dir(path: &Path) -> ReelcastResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        use anyhow::Context as _;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/unit/encode/ffmpeg.rs"]
mod tests;
