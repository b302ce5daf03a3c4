use super::*;
use crate::foundation::core::Canvas;

fn cfg() -> SinkConfig {
    SinkConfig {
        width: 2,
        height: 2,
        fps: Fps::new(30, 1).unwrap(),
        audio: None,
    }
}

#[test]
fn in_memory_sink_records_frames() {
    let mut sink = InMemorySink::new();
    assert!(sink.config().is_none());
    sink.begin(cfg()).unwrap();
    let black = FrameRgb::black(Canvas {
        width: 2,
        height: 2,
    });
    sink.push_frame(FrameIndex(0), &black).unwrap();
    sink.push_frame(FrameIndex(1), &black).unwrap();
    assert!(!sink.is_finished());
    sink.end().unwrap();

    assert!(sink.is_finished());
    assert_eq!(sink.frames().len(), 2);
    assert_eq!(sink.frames()[1].0, FrameIndex(1));
    assert_eq!(sink.config().unwrap().width, 2);
}

#[test]
fn begin_resets_previous_run() {
    let mut sink = InMemorySink::new();
    sink.begin(cfg()).unwrap();
    sink.push_frame(
        FrameIndex(0),
        &FrameRgb::black(Canvas {
            width: 2,
            height: 2,
        }),
    )
    .unwrap();
    sink.end().unwrap();
    sink.begin(cfg()).unwrap();
    assert!(sink.frames().is_empty());
    assert!(!sink.is_finished());
}
