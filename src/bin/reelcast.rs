use std::path::PathBuf;
use std::sync::mpsc;

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand, ValueEnum};

use reelcast::{DecodeMode, FadePolicy, OutputMode, RenderConfig, RenderSession, RenderStage};

#[derive(Parser, Debug)]
#[command(name = "reelcast", version)]
struct Cli {
    /// More log output (repeat for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors.
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render the frames directory into a video (requires `ffmpeg` on PATH).
    Render(RenderArgs),
    /// Write one composited frame as a PNG.
    Frame(FrameArgs),
    /// Print the one-pass filter graph without running it.
    Plan(PlanArgs),
}

#[derive(Args, Debug)]
struct InputArgs {
    /// Directory of `<start_ms>.png` stills.
    #[arg(long = "frames")]
    frames_dir: PathBuf,

    /// JSON render config; flags below override its fields.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output frame rate.
    #[arg(long)]
    fps: Option<u32>,

    /// Crossfade length in milliseconds.
    #[arg(long)]
    transition_ms: Option<u64>,

    /// Output starts at this timeline instant.
    #[arg(long)]
    start_ms: Option<u64>,

    /// Output ends at this timeline instant.
    #[arg(long)]
    end_ms: Option<u64>,

    /// Top band ratio.
    #[arg(long)]
    top: Option<f64>,

    /// Bottom band ratio.
    #[arg(long)]
    bottom: Option<f64>,

    /// Switch the top band with each asset.
    #[arg(long)]
    dynamic_top: bool,

    /// Background image or video; repeat to play videos back to back.
    #[arg(long)]
    background: Vec<PathBuf>,

    /// Do not loop a short background video.
    #[arg(long)]
    no_loop: bool,

    /// Audio file; repeat to concatenate.
    #[arg(long = "audio")]
    audio: Vec<PathBuf>,

    /// Letterbox into a portrait canvas.
    #[arg(long)]
    portrait: bool,

    /// Layer memory strategy.
    #[arg(long, value_enum)]
    decode: Option<DecodeChoice>,

    /// Fade through the first asset's sampled color.
    #[arg(long)]
    through_color: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum DecodeChoice {
    Auto,
    Streaming,
    Precompute,
}

#[derive(Args, Debug)]
struct RenderArgs {
    #[command(flatten)]
    input: InputArgs,

    /// Output video path.
    #[arg(long)]
    out: PathBuf,

    /// Let `ffmpeg` execute a filter graph instead of streaming frames.
    #[arg(long)]
    filter_graph: bool,

    /// Probe for hardware H.264 encoders.
    #[arg(long)]
    hw: bool,

    /// Fail when the output already exists.
    #[arg(long)]
    no_overwrite: bool,
}

#[derive(Args, Debug)]
struct FrameArgs {
    #[command(flatten)]
    input: InputArgs,

    /// Output-relative instant in milliseconds.
    #[arg(long)]
    at_ms: u64,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,
}

#[derive(Args, Debug)]
struct PlanArgs {
    #[command(flatten)]
    input: InputArgs,

    /// Directory for the generated scripts.
    #[arg(long)]
    work_dir: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let level = match (cli.quiet, cli.verbose) {
        (true, _) => tracing::Level::ERROR,
        (false, 0) => tracing::Level::INFO,
        (false, 1) => tracing::Level::DEBUG,
        (false, _) => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match cli.cmd {
        Command::Render(args) => cmd_render(args),
        Command::Frame(args) => cmd_frame(args),
        Command::Plan(args) => cmd_plan(args),
    }
}

fn load_config(args: &InputArgs) -> anyhow::Result<RenderConfig> {
    let mut cfg = match &args.config {
        Some(path) => RenderConfig::from_path(path)?,
        None => RenderConfig::default(),
    };
    if let Some(fps) = args.fps {
        cfg.fps = reelcast::Fps::new(fps, 1)?;
    }
    if let Some(v) = args.transition_ms {
        cfg.transition_ms = v;
    }
    if let Some(v) = args.start_ms {
        cfg.start_trim_ms = v;
    }
    if let Some(v) = args.end_ms {
        cfg.end_trim_ms = v;
    }
    if let Some(v) = args.top {
        cfg.top_ratio = v;
    }
    if let Some(v) = args.bottom {
        cfg.bottom_ratio = v;
    }
    cfg.dynamic_top |= args.dynamic_top;
    match args.background.as_slice() {
        [] => {}
        [one] => {
            cfg.background_path = Some(one.clone());
            cfg.background_paths.clear();
        }
        many => {
            cfg.background_path = None;
            cfg.background_paths = many.to_vec();
        }
    }
    if args.no_loop {
        cfg.background_loop = false;
    }
    if !args.audio.is_empty() {
        cfg.audio_paths = args.audio.clone();
    }
    cfg.portrait |= args.portrait;
    if let Some(d) = args.decode {
        cfg.decode_mode = match d {
            DecodeChoice::Auto => DecodeMode::Auto,
            DecodeChoice::Streaming => DecodeMode::Streaming,
            DecodeChoice::Precompute => DecodeMode::Precompute,
        };
    }
    if args.through_color {
        cfg.fade_policy = FadePolicy::ThroughColor;
    }
    Ok(cfg)
}

fn cmd_render(args: RenderArgs) -> anyhow::Result<()> {
    let mut cfg = load_config(&args.input)?;
    if args.filter_graph {
        cfg.output_mode = OutputMode::FilterGraph;
    }
    cfg.prefer_hw_encoder |= args.hw;
    if args.no_overwrite {
        cfg.overwrite = false;
    }

    let (tx, rx) = mpsc::channel();
    let session = RenderSession::new(cfg, &args.input.frames_dir)?.with_progress(tx);
    let out = args.out.clone();
    let worker = std::thread::spawn(move || session.render(&out));

    let mut last = None;
    for ev in rx {
        if ev.stage == RenderStage::StreamFrames {
            if last != Some(ev.percent) && ev.percent % 10 == 0 {
                tracing::info!(
                    percent = ev.percent,
                    frame = ev.frame,
                    total = ev.total_frames,
                    "encoding"
                );
            }
            last = Some(ev.percent);
        }
    }
    let report = worker
        .join()
        .map_err(|_| anyhow::anyhow!("render thread panicked"))??;

    eprintln!(
        "wrote {} ({} frames, {:.1}s)",
        args.out.display(),
        report.frames_written,
        report.elapsed.as_secs_f64()
    );
    Ok(())
}

fn cmd_frame(args: FrameArgs) -> anyhow::Result<()> {
    let cfg = load_config(&args.input)?;
    let session = RenderSession::new(cfg, &args.input.frames_dir)?;
    let mut stream = session.open_stream()?;
    let frame = stream.get_frame_at_ms(args.at_ms)?;

    if let Some(parent) = args.out.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    frame
        .to_image()?
        .save_with_format(&args.out, image::ImageFormat::Png)
        .with_context(|| format!("write png '{}'", args.out.display()))?;

    eprintln!("wrote {}", args.out.display());
    Ok(())
}

fn cmd_plan(args: PlanArgs) -> anyhow::Result<()> {
    let mut cfg = load_config(&args.input)?;
    cfg.output_mode = OutputMode::FilterGraph;
    let work_dir = args
        .work_dir
        .unwrap_or_else(|| std::env::temp_dir().join("reelcast-graph"));
    let session = RenderSession::new(cfg, &args.input.frames_dir)?;
    let plan = session.plan_filter_graph(&work_dir)?;
    plan.write_scripts()?;
    for seg in plan.segments() {
        eprintln!(
            "segment {} start={}ms len={}ms fade={}ms",
            seg.path.display(),
            seg.start_ms,
            seg.len_ms,
            seg.fade_ms
        );
    }
    println!("{}", plan.filter());
    Ok(())
}
