use std::sync::mpsc;

use super::*;
use crate::encode::sink::InMemorySink;

fn temp_dir(name: &str) -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let dir = std::env::temp_dir().join(format!(
        "reelcast_session_{name}_{}_{nanos}",
        std::process::id()
    ));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn frames_dir(name: &str) -> PathBuf {
    let dir = temp_dir(name);
    for (s, px) in [(0u64, [255u8, 0, 0, 255]), (1000, [0, 255, 0, 255])] {
        image::RgbaImage::from_pixel(4, 2, image::Rgba(px))
            .save(dir.join(format!("{s}.png")))
            .unwrap();
    }
    dir
}

fn cfg() -> RenderConfig {
    RenderConfig {
        fps: crate::foundation::core::Fps::new(10, 1).unwrap(),
        transition_ms: 200,
        ..RenderConfig::default()
    }
}

#[test]
fn partial_path_keeps_extension() {
    assert_eq!(
        partial_path(Path::new("/out/video.mp4")),
        PathBuf::from("/out/video.partial.mp4")
    );
    assert_eq!(
        partial_path(Path::new("clip")),
        PathBuf::from("clip.partial")
    );
}

#[test]
fn invalid_config_is_rejected_up_front() {
    let mut c = cfg();
    c.top_ratio = 0.9;
    assert!(matches!(
        RenderSession::new(c, "/nope"),
        Err(ReelcastError::Config(_))
    ));
}

#[test]
fn render_to_sink_pushes_every_frame_in_order() {
    let dir = frames_dir("sink");
    let session = RenderSession::new(cfg(), &dir).unwrap();
    let mut sink = InMemorySink::new();
    let report = session.render_to_sink(&mut sink).unwrap();

    assert_eq!(report.frames_written, 20);
    assert_eq!(report.duration_ms, 2000);
    assert!(report.output.is_none());
    assert!(sink.is_finished());
    let sc = sink.config().unwrap();
    assert_eq!((sc.width, sc.height), (4, 2));
    assert!(sc.audio.is_none());

    let frames = sink.frames();
    assert_eq!(frames.len(), 20);
    for (i, (idx, _)) in frames.iter().enumerate() {
        assert_eq!(idx.0, i as u64);
    }
    assert!(frames[0].1.data.chunks_exact(3).all(|p| p == [255, 0, 0]));
    assert!(frames[12].1.data.chunks_exact(3).all(|p| p == [0, 255, 0]));
    // t = 900ms sits halfway through the 800..1000 window.
    let mid = &frames[9].1.data[..3];
    assert!(mid[0] > 0 && mid[1] > 0);
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn progress_walks_stages_in_order() {
    let dir = frames_dir("progress");
    let (tx, rx) = mpsc::channel();
    let session = RenderSession::new(cfg(), &dir).unwrap().with_progress(tx);
    session.render_to_sink(&mut InMemorySink::new()).unwrap();
    drop(session);

    let events: Vec<ProgressEvent> = rx.iter().collect();
    let stages: Vec<RenderStage> = events.iter().map(|e| e.stage).collect();
    assert!(stages.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(stages[0], RenderStage::Configure);
    let last = events.last().unwrap();
    assert_eq!(last.stage, RenderStage::Finalize);
    assert_eq!(last.percent, 100);
    assert_eq!(last.frame, 20);
    assert!(
        events
            .iter()
            .any(|e| e.stage == RenderStage::StreamFrames && e.percent == 50)
    );
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn cancelled_session_never_starts() {
    let dir = frames_dir("cancel");
    let session = RenderSession::new(cfg(), &dir).unwrap();
    session.cancel_token().cancel();
    let mut sink = InMemorySink::new();
    assert!(matches!(
        session.render_to_sink(&mut sink),
        Err(ReelcastError::Cancelled)
    ));
    assert!(sink.config().is_none());
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn existing_output_is_kept_without_overwrite() {
    let dir = frames_dir("overwrite");
    let out = dir.join("out.mp4");
    std::fs::write(&out, b"keep").unwrap();
    let mut c = cfg();
    c.overwrite = false;
    let err = RenderSession::new(c, &dir).unwrap().render(&out).unwrap_err();
    assert!(err.to_string().contains("already exists"));
    assert_eq!(std::fs::read(&out).unwrap(), b"keep");
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn missing_frames_dir_fails_before_decoding() {
    let session = RenderSession::new(cfg(), "/definitely/not/here").unwrap();
    assert!(session.open_stream().is_err());
}

#[test]
fn stage_names_are_snake_case() {
    assert_eq!(RenderStage::StreamFrames.to_string(), "stream_frames");
    assert_eq!(
        serde_json::to_string(&RenderStage::BuildTimeline).unwrap(),
        "\"build_timeline\""
    );
}
