//! One-pass render: the whole timeline expressed as an `ffmpeg` filter graph.
//!
//! Images enter through a single concat-demuxer source. Each image's segment is stretched by the
//! previous crossfade window so that `xfade` at offset `next_start - window` lands every blend at
//! exactly the instants the per-frame compositor uses. Color and alpha are faded separately and
//! merged back before the region bands are stacked and the result is overlaid on the background.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::background::{
    BackgroundClip, BackgroundSource, BackgroundSpec, ClipPiece, fit_pad_filter,
};
use crate::compose::RegionLayout;
use crate::config::{FadePolicy, RenderConfig};
use crate::encode::ffmpeg::{VideoCodec, ensure_parent_dir, fps_arg, wants_faststart};
use crate::foundation::core::{Canvas, Fps, LayerTransform};
use crate::foundation::error::{ReelcastError, ReelcastResult};
use crate::render::stream::TrimWindow;
use crate::timeline::Timeline;

/// One image's slice of the concatenated source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GraphSegment {
    /// Image file.
    pub path: PathBuf,
    /// Timeline start of the image.
    pub start_ms: u64,
    /// Length in the concatenated source: own duration plus the incoming crossfade window.
    pub len_ms: u64,
    /// Crossfade window into the next image (`0` for a hard cut or the last image).
    pub fade_ms: u64,
}

/// Split `timeline` into concat segments and crossfade windows.
pub fn plan_segments(timeline: &Timeline) -> Vec<GraphSegment> {
    let mut lead = 0;
    timeline
        .assets()
        .iter()
        .enumerate()
        .map(|(i, a)| {
            let fade_ms = timeline.window_after(i).map_or(0, |w| w.window_ms);
            let seg = GraphSegment {
                path: a.source.clone(),
                start_ms: a.start_ms,
                len_ms: a.duration_ms() + lead,
                fade_ms,
            };
            lead = fade_ms;
            seg
        })
        .collect()
}

/// `ffconcat` script holding each file for the given duration.
pub fn ffconcat_script<'a>(entries: impl IntoIterator<Item = (&'a Path, u64)>) -> String {
    let mut out = String::from("ffconcat version 1.0\n");
    let mut last = None;
    for (path, ms) in entries {
        out.push_str(&format!("file {}\nduration {}\n", ffconcat_quote(path), secs(ms)));
        last = Some(path);
    }
    // The demuxer ignores the final duration unless the file is repeated.
    if let Some(path) = last {
        out.push_str(&format!("file {}\n", ffconcat_quote(path)));
    }
    out
}

fn ffconcat_quote(path: &Path) -> String {
    format!("'{}'", path.display().to_string().replace('\'', r"'\''"))
}

fn secs(ms: u64) -> String {
    format!("{}.{:03}", ms / 1000, ms % 1000)
}

/// Background as seen by the graph builder.
#[derive(Clone, Debug, PartialEq)]
pub struct GraphBackground {
    /// Resolved source and placement.
    pub spec: BackgroundSpec,
    /// Probed video clips; empty for an image.
    pub clips: Vec<BackgroundClip>,
    /// Spans of `clips` covering the output window, in playback order.
    pub pieces: Vec<ClipPiece>,
}

/// `ffconcat` script playing each piece between its in and out points.
///
/// The demuxer starts each piece at the keyframe before its in point, so cuts are only as exact
/// as the clip's keyframe spacing.
pub fn background_concat_script(clips: &[BackgroundClip], pieces: &[ClipPiece]) -> String {
    let mut out = String::from("ffconcat version 1.0\n");
    for piece in pieces {
        let path = &clips[piece.clip].decode_path;
        out.push_str(&format!("file {}\n", ffconcat_quote(path)));
        if piece.start_ms > 0 {
            out.push_str(&format!("inpoint {}\n", secs(piece.start_ms)));
        }
        if let Some(len) = piece.len_ms {
            out.push_str(&format!("outpoint {}\n", secs(piece.start_ms + len)));
        }
    }
    out
}

/// Complete `ffmpeg` invocation for a one-pass render.
#[derive(Clone, Debug)]
pub struct FilterGraphPlan {
    segments: Vec<GraphSegment>,
    scripts: Vec<(PathBuf, String)>,
    inputs: Vec<Vec<String>>,
    filter: String,
    filter_path: PathBuf,
    has_audio: bool,
    fps: Fps,
    duration_ms: u64,
    output: Canvas,
}

struct GraphBuilder {
    inputs: Vec<Vec<String>>,
    lines: Vec<String>,
}

impl GraphBuilder {
    fn input(&mut self, args: Vec<String>) -> usize {
        self.inputs.push(args);
        self.inputs.len() - 1
    }

    fn line(&mut self, s: String) {
        self.lines.push(s);
    }
}

fn owned(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| (*s).to_owned()).collect()
}

impl FilterGraphPlan {
    /// Build the plan. Scripts are placed in `work_dir` by [`FilterGraphPlan::write_scripts`].
    pub fn build(
        timeline: &Timeline,
        cfg: &RenderConfig,
        canvas: Canvas,
        background: Option<&GraphBackground>,
        work_dir: &Path,
    ) -> ReelcastResult<Self> {
        if cfg.fade_policy == FadePolicy::ThroughColor {
            return Err(ReelcastError::config(
                "fade_policy 'through_color' is only supported with output_mode 'frames'",
            ));
        }
        let total = timeline.total_duration_ms();
        let window = TrimWindow::resolve(cfg.start_trim_ms, cfg.end_trim_ms, total)?;
        let (start_ms, end_ms) = (window.start_ms, window.end_ms);
        let duration_ms = window.duration_ms();
        let fps = cfg.fps;
        let (w, h) = (canvas.width, canvas.height);
        let r = fps_arg(fps);
        let layout = RegionLayout::exact(h, cfg.top_ratio, cfg.bottom_ratio);

        let segments = plan_segments(timeline);
        let n = segments.len();
        let mut scripts = Vec::new();

        let concat = ffconcat_script(segments.iter().map(|s| (s.path.as_path(), s.len_ms)));
        let concat_path = script_path(work_dir, "segments", "ffconcat", &concat);
        scripts.push((concat_path.clone(), concat));

        let mut g = GraphBuilder {
            inputs: Vec::new(),
            lines: Vec::new(),
        };
        let fit = format!(
            "format=rgba,crop=w=min(iw\\,{w}):h=min(ih\\,{h}):x=0:y=0,pad={w}:{h}:0:0:color=black@0,fps={r},setsar=1,format=yuva444p"
        );

        // Crossfaded foreground.
        let src = g.input(vec![
            "-safe".into(),
            "0".into(),
            "-f".into(),
            "concat".into(),
            "-i".into(),
            concat_path.display().to_string(),
        ]);
        let outs: String = (0..n).map(|i| format!("[b{i}]")).collect();
        g.line(format!("[{src}:v]{fit},split={n}{outs}"));
        let mut stream_ms = 0u64;
        for (i, seg) in segments.iter().enumerate() {
            g.line(format!(
                "[b{i}]trim=start={}:end={},setpts=PTS-STARTPTS,split=2[s{i}w][s{i}f]",
                secs(stream_ms),
                secs(stream_ms + seg.len_ms)
            ));
            g.line(format!("[s{i}f]extractplanes=a[s{i}a]"));
            g.line(format!("[s{i}w]format=yuv444p[s{i}c]"));
            stream_ms += seg.len_ms;
        }
        let mut cur_c = "s0c".to_owned();
        let mut cur_a = "s0a".to_owned();
        for i in 0..n.saturating_sub(1) {
            let next = &segments[i + 1];
            let fade = segments[i].fade_ms;
            let (oc, oa) = (format!("x{i}c"), format!("x{i}a"));
            let j = i + 1;
            if fade == 0 {
                g.line(format!("[{cur_c}][s{j}c]concat=n=2:v=1:a=0[{oc}]"));
                g.line(format!("[{cur_a}][s{j}a]concat=n=2:v=1:a=0[{oa}]"));
            } else {
                let offset = secs(next.start_ms - fade);
                let d = secs(fade);
                g.line(format!(
                    "[{cur_c}][s{j}c]xfade=transition=fade:duration={d}:offset={offset}[{oc}]"
                ));
                g.line(format!(
                    "[{cur_a}][s{j}a]xfade=transition=fade:duration={d}:offset={offset}[{oa}]"
                ));
            }
            cur_c = oc;
            cur_a = oa;
        }
        g.line(format!("[{cur_c}][{cur_a}]alphamerge,format=yuva444p[fg]"));

        // Region bands: middle from the crossfade chain, top/bottom from the first image or hard
        // cuts.
        let mut fg = "fg".to_owned();
        if layout.is_split() {
            let first = &segments[0].path;
            let total_s = secs(total);
            let mut stack = Vec::new();
            let static_top = layout.top > 0 && !cfg.dynamic_top;
            let first_uses = usize::from(static_top) + usize::from(layout.bottom > 0);
            if first_uses > 0 {
                let idx = g.input(vec![
                    "-loop".into(),
                    "1".into(),
                    "-framerate".into(),
                    r.clone(),
                    "-t".into(),
                    total_s,
                    "-i".into(),
                    first.display().to_string(),
                ]);
                let outs: String = (0..first_uses).map(|k| format!("[first{k}]")).collect();
                g.line(format!("[{idx}:v]{fit},split={first_uses}{outs}"));
            }
            if layout.top > 0 {
                if cfg.dynamic_top {
                    // Hard cuts: every image for exactly its own duration.
                    let hard = ffconcat_script(segments.iter().enumerate().map(|(i, s)| {
                        let lead = i.checked_sub(1).map_or(0, |p| segments[p].fade_ms);
                        (s.path.as_path(), s.len_ms - lead)
                    }));
                    let hard_path = script_path(work_dir, "hardcut", "ffconcat", &hard);
                    scripts.push((hard_path.clone(), hard));
                    let idx = g.input(vec![
                        "-safe".into(),
                        "0".into(),
                        "-f".into(),
                        "concat".into(),
                        "-i".into(),
                        hard_path.display().to_string(),
                    ]);
                    g.line(format!("[{idx}:v]{fit},crop={w}:{}:0:0[topband]", layout.top));
                } else {
                    g.line(format!("[first0]crop={w}:{}:0:0[topband]", layout.top));
                }
                stack.push("[topband]".to_owned());
            }
            g.line(format!(
                "[fg]crop={w}:{}:0:{}[fgmid]",
                layout.middle(),
                layout.top
            ));
            stack.push("[fgmid]".to_owned());
            if layout.bottom > 0 {
                let k = usize::from(static_top);
                g.line(format!(
                    "[first{k}]crop={w}:{}:0:{}[botband]",
                    layout.bottom,
                    h - layout.bottom
                ));
                stack.push("[botband]".to_owned());
            }
            g.line(format!(
                "{}vstack=inputs={}[fgs]",
                stack.concat(),
                stack.len()
            ));
            fg = "fgs".to_owned();
        }
        g.line(format!(
            "[{fg}]trim=start={}:end={},setpts=PTS-STARTPTS[ov]",
            secs(start_ms),
            secs(end_ms)
        ));

        // Background.
        let dur_s = secs(duration_ms);
        let black = format!("color=c=black:s={w}x{h}:r={r}:d={dur_s}");
        let mut bg_audio = None;
        let bg_label = match background {
            None => {
                let idx = g.input(vec!["-f".into(), "lavfi".into(), "-i".into(), black.clone()]);
                format!("{idx}:v")
            }
            Some(bg) => {
                let raw = match &bg.spec.source {
                    BackgroundSource::Image(path) => {
                        let idx = g.input(vec![
                            "-loop".into(),
                            "1".into(),
                            "-framerate".into(),
                            r.clone(),
                            "-i".into(),
                            path.display().to_string(),
                        ]);
                        g.line(format!("[{idx}:v]scale={w}:{h},setsar=1,format=yuv444p[bgraw]"));
                        "bgraw".to_owned()
                    }
                    BackgroundSource::Video(_) => {
                        // The trimmed span is looped, matching the per-frame decoder.
                        let script = background_concat_script(&bg.clips, &bg.pieces);
                        let script_file = script_path(work_dir, "background", "ffconcat", &script);
                        scripts.push((script_file.clone(), script));
                        let mut args = Vec::new();
                        if bg.spec.looping {
                            args.extend(owned(&["-stream_loop", "-1"]));
                        }
                        args.extend(owned(&["-safe", "0", "-f", "concat", "-i"]));
                        args.push(script_file.display().to_string());
                        let idx = g.input(args);
                        let hold = if bg.spec.looping {
                            String::new()
                        } else {
                            ",tpad=stop=-1:stop_mode=clone".to_owned()
                        };
                        g.line(format!(
                            "[{idx}:v]{},setpts=PTS-STARTPTS{hold},format=yuv444p[bgraw]",
                            fit_pad_filter(canvas, fps)
                        ));
                        if bg.pieces.iter().any(|p| bg.clips[p.clip].has_audio) {
                            bg_audio = Some(bg);
                        }
                        "bgraw".to_owned()
                    }
                };
                place_background(&mut g, &raw, canvas, bg.spec.transform, &black)
            }
        };
        g.line(format!(
            "[{bg_label}][ov]overlay=shortest=1:x=0:y=0:format=yuv444,format=yuv420p[vmain]"
        ));
        let output = cfg.output_canvas(canvas);
        if output != canvas {
            g.line(format!(
                "[vmain]scale=w={pw}:h={ph}:force_original_aspect_ratio=decrease,pad={pw}:{ph}:(ow-iw)/2:(oh-ih)/2:color=black,setsar=1,format=yuv420p[vout]",
                pw = output.width,
                ph = output.height
            ));
        } else {
            g.line("[vmain]null[vout]".to_owned());
        }

        // Audio.
        let fades = audio_fades(cfg.audio_fade_in_ms, cfg.audio_fade_out_ms, duration_ms);
        let has_audio = if !cfg.audio_paths.is_empty() {
            let mut ins = String::new();
            for (j, p) in cfg.audio_paths.iter().enumerate() {
                let idx = g.input(vec!["-i".into(), p.display().to_string()]);
                g.line(format!("[{idx}:a]aresample=48000,aformat=channel_layouts=stereo[aa{j}]"));
                ins.push_str(&format!("[aa{j}]"));
            }
            g.line(format!(
                "{ins}concat=n={}:v=0:a=1,atrim=start={},asetpts=PTS-STARTPTS,apad,atrim=end={dur_s}{fades}[aout]",
                cfg.audio_paths.len(),
                secs(start_ms)
            ));
            true
        } else if let Some(bg) = bg_audio {
            let looped = background_audio(&mut g, bg);
            g.line(format!("[{looped}]apad,atrim=end={dur_s}{fades}[aout]"));
            true
        } else {
            false
        };

        let filter = g.lines.join(";\n");
        let filter_path = script_path(work_dir, "graph", "ffgraph", &filter);
        Ok(Self {
            segments,
            scripts,
            inputs: g.inputs,
            filter,
            filter_path,
            has_audio,
            fps,
            duration_ms,
            output,
        })
    }

    /// Concat segments in timeline order.
    pub fn segments(&self) -> &[GraphSegment] {
        &self.segments
    }

    /// Filter graph text.
    pub fn filter(&self) -> &str {
        &self.filter
    }

    /// Concat scripts as `(path, contents)`.
    pub fn scripts(&self) -> &[(PathBuf, String)] {
        &self.scripts
    }

    /// Output duration.
    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    /// Output canvas (portrait letterbox applied).
    pub fn output_canvas(&self) -> Canvas {
        self.output
    }

    /// Return `true` when the graph produces an audio stream.
    pub fn has_audio(&self) -> bool {
        self.has_audio
    }

    /// Write concat and filter scripts to their paths.
    pub fn write_scripts(&self) -> ReelcastResult<()> {
        use anyhow::Context as _;
        for (path, body) in self
            .scripts
            .iter()
            .map(|(p, b)| (p, b.as_str()))
            .chain([(&self.filter_path, self.filter.as_str())])
        {
            ensure_parent_dir(path)?;
            std::fs::write(path, body)
                .with_context(|| format!("write filter graph script '{}'", path.display()))?;
        }
        Ok(())
    }

    /// Full `ffmpeg` argument list.
    pub fn command_args(&self, codec: VideoCodec, out_path: &Path, overwrite: bool) -> Vec<String> {
        let mut args = vec![
            if overwrite { "-y" } else { "-n" }.to_owned(),
            "-hide_banner".to_owned(),
            "-loglevel".to_owned(),
            "error".to_owned(),
        ];
        for input in &self.inputs {
            args.extend(input.iter().cloned());
        }
        args.extend([
            "-filter_complex_script".to_owned(),
            self.filter_path.display().to_string(),
            "-map".to_owned(),
            "[vout]".to_owned(),
        ]);
        if self.has_audio {
            args.extend(owned(&["-map", "[aout]"]));
        }
        args.extend(["-r".to_owned(), fps_arg(self.fps)]);
        args.extend(codec.output_args());
        if self.has_audio {
            args.extend(owned(&["-c:a", "aac", "-b:a", "192k"]));
        }
        args.extend(["-t".to_owned(), secs(self.duration_ms)]);
        if wants_faststart(out_path) {
            args.extend(owned(&["-movflags", "+faststart"]));
        }
        args.push(out_path.display().to_string());
        args
    }

    /// Write scripts and run `ffmpeg` to completion.
    ///
    /// Failure surfaces `ffmpeg`'s stderr verbatim.
    pub fn run(&self, codec: VideoCodec, out_path: &Path, overwrite: bool) -> ReelcastResult<()> {
        self.write_scripts()?;
        ensure_parent_dir(out_path)?;
        let args = self.command_args(codec, out_path, overwrite);
        tracing::info!(
            codec = codec.encoder_name(),
            out = %out_path.display(),
            segments = self.segments.len(),
            filter = %self.filter_path.display(),
            "running one-pass filter graph"
        );
        let out = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| ReelcastError::encoder(format!("failed to spawn ffmpeg: {e}")))?;
        if !out.status.success() {
            return Err(ReelcastError::encoder(format!(
                "ffmpeg exited with status {}: {}",
                out.status,
                String::from_utf8_lossy(&out.stderr).trim()
            )));
        }
        Ok(())
    }
}

/// Background audio read from the original clips over the same pieces as the picture.
///
/// Clips without sound contribute silence of their piece length. Returns the output label.
fn background_audio(g: &mut GraphBuilder, bg: &GraphBackground) -> String {
    let norm = "aresample=48000,aformat=sample_fmts=fltp:channel_layouts=stereo";
    let mut ins = String::new();
    for (p, piece) in bg.pieces.iter().enumerate() {
        let clip = &bg.clips[piece.clip];
        let mut args = Vec::new();
        if clip.has_audio {
            if piece.start_ms > 0 {
                args.extend(["-ss".to_owned(), secs(piece.start_ms)]);
            }
            if let Some(len) = piece.len_ms {
                args.extend(["-t".to_owned(), secs(len)]);
            }
            args.extend(["-i".to_owned(), clip.source.display().to_string()]);
            let idx = g.input(args);
            let pad = piece
                .len_ms
                .map(|len| format!(",apad=whole_dur={}", secs(len)))
                .unwrap_or_default();
            g.line(format!("[{idx}:a]{norm}{pad}[bga{p}]"));
        } else {
            let len = piece.len_ms.unwrap_or(0);
            args.extend(owned(&["-f", "lavfi", "-t"]));
            args.extend([
                secs(len),
                "-i".to_owned(),
                "anullsrc=r=48000:cl=stereo".to_owned(),
            ]);
            let idx = g.input(args);
            g.line(format!("[{idx}:a]{norm}[bga{p}]"));
        }
        ins.push_str(&format!("[bga{p}]"));
    }
    g.line(format!(
        "{ins}concat=n={}:v=0:a=1,asetpts=N/SR/TB[bgacat]",
        bg.pieces.len()
    ));
    let span_ms: Option<u64> = bg.pieces.iter().map(|p| p.len_ms).sum();
    match span_ms {
        Some(ms) if bg.spec.looping && ms > 0 => {
            let samples = u128::from(ms) * 48_000 / 1000;
            g.line(format!("[bgacat]aloop=loop=-1:size={samples}[bgaloop]"));
            "bgaloop".to_owned()
        }
        _ => "bgacat".to_owned(),
    }
}

fn audio_fades(fade_in_ms: u64, fade_out_ms: u64, duration_ms: u64) -> String {
    let mut s = String::new();
    if fade_in_ms > 0 {
        s.push_str(&format!(",afade=t=in:st=0:d={}", secs(fade_in_ms.min(duration_ms))));
    }
    if fade_out_ms > 0 {
        let d = fade_out_ms.min(duration_ms);
        s.push_str(&format!(
            ",afade=t=out:st={}:d={}",
            secs(duration_ms - d),
            secs(d)
        ));
    }
    s
}

/// Scale about the canvas center, then translate, over black.
fn place_background(
    g: &mut GraphBuilder,
    raw: &str,
    canvas: Canvas,
    transform: LayerTransform,
    black: &str,
) -> String {
    if transform.is_identity() {
        return raw.to_owned();
    }
    let (w, h) = (f64::from(canvas.width), f64::from(canvas.height));
    let sw = ((w * transform.scale).round() as u32).max(1);
    let sh = ((h * transform.scale).round() as u32).max(1);
    let x = ((w - f64::from(sw)) / 2.0 + transform.translate.x).round() as i64;
    let y = ((h - f64::from(sh)) / 2.0 + transform.translate.y).round() as i64;
    let idx = g.input(vec!["-f".into(), "lavfi".into(), "-i".into(), black.to_owned()]);
    g.line(format!("[{raw}]scale={sw}:{sh}[bgscaled]"));
    g.line(format!(
        "[{idx}:v][bgscaled]overlay=x={x}:y={y}:eof_action=repeat,format=yuv444p[bg]"
    ));
    "bg".to_owned()
}

fn script_path(dir: &Path, stem: &str, ext: &str, body: &str) -> PathBuf {
    let hash = crate::assets::media::sha256_hex(body.as_bytes());
    dir.join(format!("{stem}-{}.{ext}", &hash[..12]))
}

#[cfg(test)]
#[path = "../../tests/unit/encode/filtergraph.rs"]
mod tests;
