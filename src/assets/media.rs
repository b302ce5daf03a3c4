use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::time::{Duration, Instant};

use sha2::Digest as _;

use crate::foundation::error::{ReelcastError, ReelcastResult};

/// Sample rate every audio source is resampled to.
pub const MIX_SAMPLE_RATE: u32 = 48_000;

/// Stream facts reported by `ffprobe`.
#[derive(Clone, Debug)]
pub struct VideoSourceInfo {
    /// Probed file.
    pub source_path: PathBuf,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Frame-rate numerator.
    pub fps_num: u32,
    /// Frame-rate denominator.
    pub fps_den: u32,
    /// Container duration in seconds (`0.0` when unknown).
    pub duration_sec: f64,
    /// Whether an audio stream is present.
    pub has_audio: bool,
}

impl VideoSourceInfo {
    /// Source frame rate as `f64` (`0.0` when unknown).
    pub fn source_fps(&self) -> f64 {
        if self.fps_den == 0 {
            0.0
        } else {
            f64::from(self.fps_num) / f64::from(self.fps_den)
        }
    }

    /// Duration in whole milliseconds.
    pub fn duration_ms(&self) -> u64 {
        (self.duration_sec.max(0.0) * 1000.0).round() as u64
    }
}

/// Interleaved PCM as decoded by `ffmpeg`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AudioPcm {
    /// Samples per second per channel.
    pub sample_rate: u32,
    /// Channel count.
    pub channels: u16,
    /// Interleaved samples.
    pub interleaved_f32: Vec<f32>,
}

impl AudioPcm {
    /// Number of sample frames (one sample per channel).
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.interleaved_f32.len() / usize::from(self.channels)
        }
    }
}

fn media_error(msg: String) -> ReelcastError {
    ReelcastError::Other(anyhow::anyhow!(msg))
}

/// Run a short-lived command, killing it if it outlives `timeout`.
///
/// Returns `Ok(None)` on timeout. Output pipes are drained on helper threads so a chatty
/// process cannot block on a full pipe.
pub fn run_with_timeout(cmd: &mut Command, timeout: Duration) -> ReelcastResult<Option<Output>> {
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| media_error(format!("failed to spawn {:?}: {e}", cmd.get_program())))?;

    let stdout = child.stdout.take().map(drain_thread);
    let stderr = child.stderr.take().map(drain_thread);

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if Instant::now() >= deadline => {
                let _ = child.kill();
                let _ = child.wait();
                return Ok(None);
            }
            Ok(None) => std::thread::sleep(Duration::from_millis(10)),
            Err(e) => return Err(media_error(format!("failed to wait for child: {e}"))),
        }
    };

    let join = |h: Option<std::thread::JoinHandle<Vec<u8>>>| {
        h.and_then(|h| h.join().ok()).unwrap_or_default()
    };
    Ok(Some(Output {
        status,
        stdout: join(stdout),
        stderr: join(stderr),
    }))
}

fn drain_thread<R: Read + Send + 'static>(mut r: R) -> std::thread::JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = r.read_to_end(&mut buf);
        buf
    })
}

/// Return `true` if the `ffmpeg` binary responds within `timeout`.
pub fn is_ffmpeg_on_path(timeout: Duration) -> bool {
    let mut cmd = Command::new("ffmpeg");
    cmd.arg("-version");
    matches!(run_with_timeout(&mut cmd, timeout), Ok(Some(out)) if out.status.success())
}

/// Probe a video file with `ffprobe`.
pub fn probe_video(source_path: &Path, timeout: Duration) -> ReelcastResult<VideoSourceInfo> {
    #[derive(serde::Deserialize)]
    struct ProbeStream {
        codec_type: Option<String>,
        width: Option<u32>,
        height: Option<u32>,
        r_frame_rate: Option<String>,
    }
    #[derive(serde::Deserialize)]
    struct ProbeFormat {
        duration: Option<String>,
    }
    #[derive(serde::Deserialize)]
    struct ProbeOut {
        streams: Vec<ProbeStream>,
        format: Option<ProbeFormat>,
    }

    let mut cmd = Command::new("ffprobe");
    cmd.args([
        "-v",
        "error",
        "-print_format",
        "json",
        "-show_streams",
        "-show_format",
    ])
    .arg(source_path);
    let out = run_with_timeout(&mut cmd, timeout)?.ok_or_else(|| {
        media_error(format!(
            "ffprobe timed out after {}ms for '{}'",
            timeout.as_millis(),
            source_path.display()
        ))
    })?;
    if !out.status.success() {
        return Err(media_error(format!(
            "ffprobe failed for '{}': {}",
            source_path.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }

    let parsed: ProbeOut = serde_json::from_slice(&out.stdout)
        .map_err(|e| media_error(format!("ffprobe json parse failed: {e}")))?;
    let video_stream = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| {
            media_error(format!(
                "no video stream found in '{}'",
                source_path.display()
            ))
        })?;
    let width = video_stream
        .width
        .ok_or_else(|| media_error("missing video width from ffprobe".to_owned()))?;
    let height = video_stream
        .height
        .ok_or_else(|| media_error("missing video height from ffprobe".to_owned()))?;

    let (fps_num, fps_den) = parse_ff_ratio(video_stream.r_frame_rate.as_deref().unwrap_or("0/1"))
        .ok_or_else(|| media_error("invalid video r_frame_rate".to_owned()))?;
    let duration_sec = parsed
        .format
        .as_ref()
        .and_then(|f| f.duration.as_ref())
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(0.0);
    let has_audio = parsed
        .streams
        .iter()
        .any(|s| s.codec_type.as_deref() == Some("audio"));

    Ok(VideoSourceInfo {
        source_path: source_path.to_path_buf(),
        width,
        height,
        fps_num,
        fps_den,
        duration_sec,
        has_audio,
    })
}

/// Decode any audio-bearing file to interleaved stereo `f32` at `sample_rate`.
///
/// A file without an audio stream decodes to empty PCM.
pub fn decode_audio_f32_stereo(path: &Path, sample_rate: u32) -> ReelcastResult<AudioPcm> {
    let out = Command::new("ffmpeg")
        .args(["-v", "error", "-i"])
        .arg(path)
        .args([
            "-vn",
            "-f",
            "f32le",
            "-acodec",
            "pcm_f32le",
            "-ac",
            "2",
            "-ar",
            &sample_rate.to_string(),
            "pipe:1",
        ])
        .output()
        .map_err(|e| media_error(format!("failed to run ffmpeg for audio decode: {e}")))?;

    if !out.status.success() {
        let msg = String::from_utf8_lossy(&out.stderr);
        if msg.contains("Stream specifier")
            || msg.contains("matches no streams")
            || msg.contains("Output file #0 does not contain any stream")
            || msg.contains("does not contain any stream")
        {
            return Ok(AudioPcm {
                sample_rate,
                channels: 2,
                interleaved_f32: Vec::new(),
            });
        }
        return Err(media_error(format!(
            "ffmpeg audio decode failed for '{}': {}",
            path.display(),
            msg.trim()
        )));
    }

    Ok(AudioPcm {
        sample_rate,
        channels: 2,
        interleaved_f32: f32le_to_samples(&out.stdout)?,
    })
}

pub(crate) fn f32le_to_samples(bytes: &[u8]) -> ReelcastResult<Vec<f32>> {
    if !bytes.len().is_multiple_of(4) {
        return Err(media_error(
            "decoded audio byte length is not aligned to f32 samples".to_owned(),
        ));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// Lowercase hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = sha2::Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        out.push_str(&format!("{:02x}", b));
    }
    out
}

pub(crate) fn parse_ff_ratio(s: &str) -> Option<(u32, u32)> {
    let mut parts = s.split('/');
    let a = parts.next()?.trim().parse::<u32>().ok()?;
    let b = match parts.next() {
        Some(b) => b.trim().parse::<u32>().ok()?,
        None => 1,
    };
    if b == 0 {
        return None;
    }
    Some((a, b))
}

#[cfg(test)]
#[path = "../../tests/unit/assets/media.rs"]
mod tests;
