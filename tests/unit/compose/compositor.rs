use std::path::{Path, PathBuf};

use super::*;
use crate::assets::cache::{LayerCache, PrecomputedLayers};
use crate::timeline::ScannedFrame;

fn temp_dir(name: &str) -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let dir = std::env::temp_dir().join(format!(
        "reelcast_compositor_{name}_{}_{nanos}",
        std::process::id()
    ));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// Each asset gets its own color plus a row gradient so band provenance is visible.
fn write_assets(dir: &Path, starts: &[u64], w: u32, h: u32) -> Vec<ScannedFrame> {
    starts
        .iter()
        .enumerate()
        .map(|(i, &s)| {
            let path = dir.join(format!("{s}.png"));
            let v = 30 + (i as u8) * 45;
            let img = image::RgbaImage::from_fn(w, h, |_, y| {
                image::Rgba([v, 255 - v, (y as u8).wrapping_mul(3), 255 - (i as u8) * 20])
            });
            img.save(&path).unwrap();
            ScannedFrame {
                start_ms: s,
                end_ms: None,
                path,
            }
        })
        .collect()
}

fn compositor(
    frames: Vec<ScannedFrame>,
    transition_ms: u64,
    canvas: Canvas,
    opts: CompositorOpts,
    cache: usize,
) -> Compositor {
    let timeline = Timeline::new(frames, transition_ms).unwrap();
    Compositor::new(
        timeline,
        LayerStore::Streaming(LayerCache::new(cache, canvas)),
        canvas,
        opts,
    )
    .unwrap()
}

fn decoded(path: &Path, canvas: Canvas) -> DecodedLayer {
    crate::assets::decode::decode_layer(path, canvas).unwrap()
}

#[test]
fn tail_region_shows_last_asset_unblended() {
    let dir = temp_dir("tail");
    let canvas = Canvas {
        width: 8,
        height: 4,
    };
    let frames = write_assets(&dir, &[0, 1000, 2000], 8, 4);
    let last = decoded(&frames[2].path, canvas);
    let mut c = compositor(frames, 500, canvas, CompositorOpts::default(), 2);

    assert_eq!(c.timeline().total_duration_ms(), 3000);
    assert_eq!(*c.frame_at(2750).unwrap(), last);
    assert_eq!(*c.frame_at(99_999).unwrap(), last);
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn short_gap_blends_from_time_zero() {
    let dir = temp_dir("gap");
    let canvas = Canvas {
        width: 4,
        height: 2,
    };
    let frames = write_assets(&dir, &[0, 300], 4, 2);
    let a = decoded(&frames[0].path, canvas);
    let b = decoded(&frames[1].path, canvas);
    let mut c = compositor(frames, 500, canvas, CompositorOpts::default(), 2);

    assert_eq!(c.timeline().window_after(0).unwrap().window_ms, 300);
    // Weight 0 at t = 0 reproduces asset 0 exactly.
    assert_eq!(*c.frame_at(0).unwrap(), a);
    // Blending already, halfway through.
    assert_ne!(*c.frame_at(150).unwrap(), a);
    assert_ne!(*c.frame_at(150).unwrap(), b);
    assert_eq!(*c.frame_at(300).unwrap(), b);
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn crossfade_is_monotonic_toward_next() {
    let dir = temp_dir("mono");
    let canvas = Canvas {
        width: 2,
        height: 2,
    };
    let frames = write_assets(&dir, &[0, 1000], 2, 2);
    let a = decoded(&frames[0].path, canvas);
    let b = decoded(&frames[1].path, canvas);
    let mut c = compositor(frames, 400, canvas, CompositorOpts::default(), 2);

    assert_eq!(*c.frame_at(599).unwrap(), a);
    assert_eq!(*c.frame_at(600).unwrap(), a);
    let mut prev = c.frame_at(600).unwrap();
    for t in 601..1000 {
        let cur = c.frame_at(t).unwrap();
        for k in 0..cur.premul_rgb.len() {
            let (pa, pb) = (a.premul_rgb[k], b.premul_rgb[k]);
            let (p, q) = (prev.premul_rgb[k], cur.premul_rgb[k]);
            if pb >= pa {
                assert!(q >= p, "t={t} k={k}");
            } else {
                assert!(q <= p, "t={t} k={k}");
            }
        }
        prev = cur;
    }
    // One millisecond before the switch the blend is within one step of `b`.
    let near = c.frame_at(999).unwrap();
    for (x, y) in near.premul_rgb.iter().zip(&b.premul_rgb) {
        assert!((i16::from(*x) - i16::from(*y)).abs() <= 1);
    }
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn static_bands_come_from_first_asset() {
    let dir = temp_dir("bands");
    let canvas = Canvas {
        width: 3,
        height: 100,
    };
    let frames = write_assets(&dir, &[0, 1000, 2000], 3, 100);
    let first = decoded(&frames[0].path, canvas);
    let second = decoded(&frames[1].path, canvas);
    let opts = CompositorOpts {
        top_ratio: 0.25,
        bottom_ratio: 0.25,
        ..CompositorOpts::default()
    };
    let mut c = compositor(frames, 300, canvas, opts, 2);
    let row = |l: &DecodedLayer, y: usize| l.alpha[y * 3..y * 3 + 3].to_vec();

    for t in [0u64, 850, 1500, 1850, 2500] {
        let f = c.frame_at(t).unwrap();
        for y in (0..25).chain(75..100) {
            assert_eq!(row(&f, y), row(&first, y), "t={t} y={y}");
            assert_eq!(
                f.premul_rgb[y * 9..y * 9 + 9],
                first.premul_rgb[y * 9..y * 9 + 9]
            );
        }
    }
    let f = c.frame_at(1500).unwrap();
    for y in 25..75 {
        assert_eq!(row(&f, y), row(&second, y));
    }
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn dynamic_top_hard_cuts_without_blending() {
    let dir = temp_dir("dyn");
    let canvas = Canvas {
        width: 2,
        height: 10,
    };
    let frames = write_assets(&dir, &[0, 1000], 2, 10);
    let first = decoded(&frames[0].path, canvas);
    let second = decoded(&frames[1].path, canvas);
    let opts = CompositorOpts {
        top_ratio: 0.2,
        dynamic_top: true,
        ..CompositorOpts::default()
    };
    let mut c = compositor(frames, 500, canvas, opts, 2);

    let mid_blend = c.frame_at(900).unwrap();
    assert_eq!(mid_blend.premul_rgb[..12], first.premul_rgb[..12]);
    assert_ne!(mid_blend.premul_rgb[12..], first.premul_rgb[12..]);
    let after = c.frame_at(1000).unwrap();
    assert_eq!(after.premul_rgb[..12], second.premul_rgb[..12]);
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn cache_size_and_precompute_agree() {
    let dir = temp_dir("transparency");
    let canvas = Canvas {
        width: 6,
        height: 12,
    };
    let frames = write_assets(&dir, &[0, 250, 400, 1200, 1300], 6, 12);
    let opts = CompositorOpts {
        top_ratio: 0.25,
        bottom_ratio: 0.1,
        ..CompositorOpts::default()
    };

    let mut small = compositor(frames.clone(), 300, canvas, opts, 2);
    let timeline = Timeline::new(frames, 300).unwrap();
    let pre = PrecomputedLayers::decode_all(&timeline, canvas, Some(2)).unwrap();
    let mut eager =
        Compositor::new(timeline, LayerStore::Precomputed(pre), canvas, opts).unwrap();

    // Reverse order for the precomputed side, forward for the streaming side.
    let samples: Vec<u64> = (0..2300).step_by(37).collect();
    let mut scrambled = samples.clone();
    scrambled.reverse();
    let eager_frames: Vec<_> = scrambled
        .iter()
        .map(|&t| (t, eager.frame_at(t).unwrap()))
        .collect();
    for (t, f) in eager_frames.into_iter().rev() {
        assert_eq!(*small.frame_at(t).unwrap(), *f, "t={t}");
    }
    assert!(small.cache_stats().evictions > 0);
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn repeated_queries_use_the_memo() {
    let dir = temp_dir("memo");
    let canvas = Canvas {
        width: 2,
        height: 2,
    };
    let frames = write_assets(&dir, &[0, 500], 2, 2);
    let mut c = compositor(frames, 300, canvas, CompositorOpts::default(), 2);
    let a = c.frame_at(350).unwrap();
    let b = c.frame_at(350).unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    let other = c.frame_at(351).unwrap();
    assert!(!Arc::ptr_eq(&a, &other));
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn through_color_policy_passes_sampled_color() {
    let dir = temp_dir("through");
    let canvas = Canvas {
        width: 12,
        height: 12,
    };
    let frames = write_assets(&dir, &[0, 1000], 12, 12);
    let first = decoded(&frames[0].path, canvas);
    let opts = CompositorOpts {
        fade_policy: FadePolicy::ThroughColor,
        ..CompositorOpts::default()
    };
    let mut c = compositor(frames, 400, canvas, opts, 2);

    let sample = first.straight_rgba_at(10, 10).unwrap();
    let color = PremulColor::from_straight(sample);
    let mid = c.frame_at(800).unwrap();
    assert!(mid.alpha.iter().all(|&a| a == color.a));
    for px in mid.premul_rgb.chunks_exact(3) {
        assert_eq!(px, color.rgb);
    }
    assert_eq!(*c.frame_at(600).unwrap(), first);
    std::fs::remove_dir_all(&dir).ok();
}
