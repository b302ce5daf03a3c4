use std::ops::Range;
use std::path::Path;

use anyhow::Context;

use crate::assets::media::{AudioPcm, MIX_SAMPLE_RATE, decode_audio_f32_stereo};
use crate::background::BackgroundClip;
use crate::foundation::error::{ReelcastError, ReelcastResult};

const CHANNELS: u16 = 2;

/// Linear fade lengths applied after trimming.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AudioFades {
    /// Fade-in over `[0, fade_in_ms]`.
    pub fade_in_ms: u64,
    /// Fade-out over `[duration - fade_out_ms, duration]`.
    pub fade_out_ms: u64,
}

/// Stereo PCM at [`MIX_SAMPLE_RATE`] whose length equals the output duration exactly.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioTimeline {
    duration_ms: u64,
    pcm: AudioPcm,
}

pub(crate) fn ms_to_frames(ms: u64, sample_rate: u32) -> usize {
    ((u128::from(ms) * u128::from(sample_rate) + 500) / 1000) as usize
}

/// Concatenate per-clip audio, each padded or cut to its clip length (`0` = keep as decoded).
pub(crate) fn join_clip_audio(parts: Vec<(AudioPcm, u64)>) -> AudioPcm {
    let stride = usize::from(CHANNELS);
    let mut out = Vec::new();
    for (pcm, clip_ms) in parts {
        let mut data = pcm.interleaved_f32;
        if clip_ms > 0 {
            data.resize(ms_to_frames(clip_ms, MIX_SAMPLE_RATE) * stride, 0.0);
        }
        out.extend_from_slice(&data);
    }
    AudioPcm {
        sample_rate: MIX_SAMPLE_RATE,
        channels: CHANNELS,
        interleaved_f32: out,
    }
}

impl AudioTimeline {
    /// Silence for `duration_ms`.
    pub fn silent(duration_ms: u64) -> Self {
        let frames = ms_to_frames(duration_ms, MIX_SAMPLE_RATE);
        Self {
            duration_ms,
            pcm: AudioPcm {
                sample_rate: MIX_SAMPLE_RATE,
                channels: CHANNELS,
                interleaved_f32: vec![0.0; frames * usize::from(CHANNELS)],
            },
        }
    }

    /// Concatenate `sources` in order, skip the first `start_ms`, then fit to `duration_ms`.
    ///
    /// Missing tail audio is padded with silence. Every source must already be stereo at
    /// [`MIX_SAMPLE_RATE`].
    pub fn concat(
        sources: &[AudioPcm],
        start_ms: u64,
        duration_ms: u64,
        fades: AudioFades,
    ) -> ReelcastResult<Self> {
        for (i, s) in sources.iter().enumerate() {
            if !s.interleaved_f32.is_empty()
                && (s.sample_rate != MIX_SAMPLE_RATE || s.channels != CHANNELS)
            {
                return Err(ReelcastError::config(format!(
                    "audio source #{i} is {} Hz / {} ch, expected {MIX_SAMPLE_RATE} Hz / {CHANNELS} ch",
                    s.sample_rate, s.channels
                )));
            }
        }

        let stride = usize::from(CHANNELS);
        let skip = ms_to_frames(start_ms, MIX_SAMPLE_RATE) * stride;
        let want = ms_to_frames(duration_ms, MIX_SAMPLE_RATE) * stride;

        let mut out = Vec::with_capacity(want);
        let mut skipped = 0usize;
        for s in sources {
            if out.len() >= want {
                break;
            }
            let mut data = s.interleaved_f32.as_slice();
            if skipped < skip {
                let n = (skip - skipped).min(data.len());
                skipped += n;
                data = &data[n..];
            }
            let take = (want - out.len()).min(data.len());
            out.extend_from_slice(&data[..take]);
        }
        let available = out.len();
        out.resize(want, 0.0);
        if available < want {
            tracing::debug!(
                padded_frames = (want - available) / stride,
                "audio shorter than output; padding with silence"
            );
        }

        let mut timeline = Self {
            duration_ms,
            pcm: AudioPcm {
                sample_rate: MIX_SAMPLE_RATE,
                channels: CHANNELS,
                interleaved_f32: out,
            },
        };
        timeline.apply_fades(fades);
        Ok(timeline)
    }

    /// Play `source` from `offset_ms` to its end, repeating that span until `duration_ms` is
    /// covered.
    ///
    /// Used for the audio of a looping background video, which loops the same trimmed span as
    /// the picture. Without `looping` the tail is silence.
    pub fn looped(
        source: &AudioPcm,
        offset_ms: u64,
        duration_ms: u64,
        looping: bool,
        fades: AudioFades,
    ) -> ReelcastResult<Self> {
        let stride = usize::from(CHANNELS);
        let skip = ms_to_frames(offset_ms, MIX_SAMPLE_RATE);
        if !looping || skip >= source.frames() {
            return Self::concat(std::slice::from_ref(source), offset_ms, duration_ms, fades);
        }
        let want = ms_to_frames(duration_ms, MIX_SAMPLE_RATE) * stride;
        let span = &source.interleaved_f32[skip * stride..];

        let mut out = Vec::with_capacity(want);
        while out.len() < want {
            let take = (want - out.len()).min(span.len());
            out.extend_from_slice(&span[..take]);
        }
        Self::concat(
            &[AudioPcm {
                sample_rate: MIX_SAMPLE_RATE,
                channels: CHANNELS,
                interleaved_f32: out,
            }],
            0,
            duration_ms,
            fades,
        )
    }

    /// Decode and concatenate audio files (any format `ffmpeg` reads).
    pub fn from_paths<P: AsRef<Path>>(
        paths: &[P],
        start_ms: u64,
        duration_ms: u64,
        fades: AudioFades,
    ) -> ReelcastResult<Self> {
        let mut sources = Vec::with_capacity(paths.len());
        for p in paths {
            let p = p.as_ref();
            let pcm = decode_audio_f32_stereo(p, MIX_SAMPLE_RATE)
                .with_context(|| format!("decode audio '{}'", p.display()))?;
            tracing::debug!(file = %p.display(), frames = pcm.frames(), "decoded audio source");
            sources.push(pcm);
        }
        Self::concat(&sources, start_ms, duration_ms, fades)
    }

    /// Audio of concatenated background clips, or `Ok(None)` when no clip has any.
    ///
    /// Clips without audio contribute silence for their length, so the sound stays aligned with
    /// the picture across clip boundaries.
    pub fn from_background_clips(
        clips: &[BackgroundClip],
        offset_ms: u64,
        duration_ms: u64,
        looping: bool,
        fades: AudioFades,
    ) -> ReelcastResult<Option<Self>> {
        if !clips.iter().any(|c| c.has_audio) {
            return Ok(None);
        }
        let mut parts = Vec::with_capacity(clips.len());
        for clip in clips {
            let pcm = if clip.has_audio {
                decode_audio_f32_stereo(&clip.source, MIX_SAMPLE_RATE).with_context(|| {
                    format!("decode background audio '{}'", clip.source.display())
                })?
            } else {
                AudioPcm {
                    sample_rate: MIX_SAMPLE_RATE,
                    channels: CHANNELS,
                    interleaved_f32: Vec::new(),
                }
            };
            parts.push((pcm, clip.duration_ms));
        }
        if parts.iter().all(|(pcm, _)| pcm.frames() == 0) {
            return Ok(None);
        }
        let joined = join_clip_audio(parts);
        tracing::info!(clips = clips.len(), "using background video audio");
        Self::looped(&joined, offset_ms, duration_ms, looping, fades).map(Some)
    }

    fn apply_fades(&mut self, fades: AudioFades) {
        let stride = usize::from(self.pcm.channels);
        let total = self.pcm.frames();
        let fade_in = ms_to_frames(fades.fade_in_ms, self.pcm.sample_rate).min(total);
        let fade_out = ms_to_frames(fades.fade_out_ms, self.pcm.sample_rate).min(total);

        for (i, frame) in self.pcm.interleaved_f32.chunks_exact_mut(stride).enumerate() {
            let mut gain = 1.0f32;
            if fade_in > 0 && i < fade_in {
                gain *= i as f32 / fade_in as f32;
            }
            let remaining = total - i;
            if fade_out > 0 && remaining <= fade_out {
                gain *= (remaining - 1) as f32 / fade_out as f32;
            }
            if gain != 1.0 {
                for s in frame {
                    *s *= gain;
                }
            }
        }
    }

    /// Output duration covered.
    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    /// Samples per second per channel.
    pub fn sample_rate(&self) -> u32 {
        self.pcm.sample_rate
    }

    /// Channel count.
    pub fn channels(&self) -> u16 {
        self.pcm.channels
    }

    /// Number of sample frames.
    pub fn frames(&self) -> usize {
        self.pcm.frames()
    }

    /// Interleaved samples for the sample-frame range `range`, clamped to the timeline.
    pub fn get_samples(&self, range: Range<usize>) -> &[f32] {
        let stride = usize::from(self.pcm.channels);
        let len = self.pcm.interleaved_f32.len();
        let start = (range.start * stride).min(len);
        let end = (range.end * stride).clamp(start, len);
        &self.pcm.interleaved_f32[start..end]
    }

    /// Return `true` when every sample is zero.
    pub fn is_silent(&self) -> bool {
        self.pcm.interleaved_f32.iter().all(|&s| s == 0.0)
    }

    /// Write raw little-endian `f32` interleaved PCM for the encoder.
    pub fn write_f32le(&self, out_path: &Path) -> ReelcastResult<()> {
        if let Some(parent) = out_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("create audio output directory '{}'", parent.display())
            })?;
        }
        let mut bytes = Vec::<u8>::with_capacity(self.pcm.interleaved_f32.len() * 4);
        for &sample in &self.pcm.interleaved_f32 {
            bytes.extend_from_slice(&sample.to_le_bytes());
        }
        std::fs::write(out_path, bytes)
            .with_context(|| format!("write audio file '{}'", out_path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/audio/timeline.rs"]
mod tests;
