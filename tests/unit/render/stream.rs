use std::path::PathBuf;

use super::*;
use crate::assets::cache::{LayerCache, LayerStore};
use crate::compose::CompositorOpts;
use crate::timeline::{ScannedFrame, Timeline};

fn temp_dir(name: &str) -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let dir = std::env::temp_dir().join(format!(
        "reelcast_stream_{name}_{}_{nanos}",
        std::process::id()
    ));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn stream(dir: &std::path::Path, window: TrimWindow, output: Canvas) -> FrameStream {
    let canvas = Canvas {
        width: 4,
        height: 2,
    };
    let frames = [(0u64, [200u8, 0, 0, 255]), (1000, [0, 0, 200, 128])]
        .iter()
        .map(|&(s, px)| {
            let path = dir.join(format!("{s}.png"));
            image::RgbaImage::from_pixel(4, 2, image::Rgba(px))
                .save(&path)
                .unwrap();
            ScannedFrame {
                start_ms: s,
                end_ms: None,
                path,
            }
        })
        .collect();
    let timeline = Timeline::new(frames, 200).unwrap();
    let compositor = Compositor::new(
        timeline,
        LayerStore::Streaming(LayerCache::new(2, canvas)),
        canvas,
        CompositorOpts::default(),
    )
    .unwrap();
    FrameStream::new(
        compositor,
        BackgroundLayer::black(canvas),
        Fps::new(10, 1).unwrap(),
        window,
        output,
    )
}

#[test]
fn trim_window_resolution() {
    assert_eq!(
        TrimWindow::resolve(0, 0, 3000).unwrap(),
        TrimWindow {
            start_ms: 0,
            end_ms: 3000
        }
    );
    assert_eq!(TrimWindow::resolve(500, 9000, 3000).unwrap().end_ms, 3000);
    assert!(TrimWindow::resolve(3000, 0, 3000).is_err());
    assert!(TrimWindow::resolve(700, 600, 3000).is_err());
}

#[test]
fn frame_timing_follows_fps_and_trim() {
    let dir = temp_dir("timing");
    let canvas = Canvas {
        width: 4,
        height: 2,
    };
    let window = TrimWindow::resolve(250, 0, 2000).unwrap();
    let s = stream(&dir, window, canvas);
    assert_eq!(s.duration_ms(), 1750);
    // ceil(1.75 s * 10 fps)
    assert_eq!(s.frame_count(), 18);
    assert_eq!(s.time_of(0), 250);
    assert_eq!(s.time_of(3), 550);
    assert_eq!((s.width(), s.height()), (4, 2));
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn frames_over_black_show_premultiplied_color() {
    let dir = temp_dir("black");
    let canvas = Canvas {
        width: 4,
        height: 2,
    };
    let mut s = stream(&dir, TrimWindow::resolve(0, 0, 2000).unwrap(), canvas);
    assert!(s.has_black_background());
    let first = s.get_frame(0).unwrap();
    assert!(first.data.chunks_exact(3).all(|p| p == [200, 0, 0]));
    // Frame 15 is t = 1500ms, inside the tail of the half-transparent second image.
    let blue = s.get_frame(15).unwrap();
    let expected = ((200u16 * 128 + 127) / 255) as u8;
    assert!(blue.data.chunks_exact(3).all(|p| p == [0, 0, expected]));
    assert_eq!(s.get_mask(15).unwrap(), vec![128; 8]);
    assert_eq!(s.get_frame_at_ms(1500).unwrap(), blue);
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn overlay_is_unpremultiplied() {
    let dir = temp_dir("overlay");
    let canvas = Canvas {
        width: 4,
        height: 2,
    };
    let mut s = stream(&dir, TrimWindow::resolve(0, 0, 2000).unwrap(), canvas);
    let overlay = s.get_overlay(15).unwrap();
    for px in overlay.data.chunks_exact(3) {
        assert_eq!(px[0], 0);
        assert!(px[2].abs_diff(200) <= 1);
    }
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn portrait_output_is_letterboxed() {
    let dir = temp_dir("portrait");
    let target = Canvas {
        width: 4,
        height: 8,
    };
    let mut s = stream(&dir, TrimWindow::resolve(0, 0, 2000).unwrap(), target);
    let f = s.get_frame(0).unwrap();
    assert_eq!(f.canvas(), target);
    assert!(f.data[..3 * 4 * 3].iter().all(|&v| v == 0));
    assert_eq!(&f.data[3 * 4 * 3..3 * 4 * 3 + 3], &[200, 0, 0]);
    std::fs::remove_dir_all(&dir).ok();
}
