use super::*;
use crate::timeline::ScannedFrame;

fn temp_dir(name: &str) -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let dir = std::env::temp_dir().join(format!(
        "reelcast_cache_{name}_{}_{nanos}",
        std::process::id()
    ));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn write_frames(dir: &std::path::Path, starts: &[u64]) -> Vec<ScannedFrame> {
    starts
        .iter()
        .enumerate()
        .map(|(i, &s)| {
            let path = dir.join(format!("{s}.png"));
            let v = (i as u8).wrapping_mul(40);
            image::RgbaImage::from_pixel(4, 2, image::Rgba([v, 255 - v, 7, 200]))
                .save(&path)
                .unwrap();
            ScannedFrame {
                start_ms: s,
                end_ms: None,
                path,
            }
        })
        .collect()
}

const CANVAS: Canvas = Canvas {
    width: 4,
    height: 2,
};

#[test]
fn lru_evicts_least_recently_used() {
    let dir = temp_dir("lru");
    let frames = write_frames(&dir, &[0, 100, 200]);
    let (a, b, c) = (&frames[0].path, &frames[1].path, &frames[2].path);

    let mut cache = LayerCache::new(2, CANVAS);
    cache.get_or_decode(a).unwrap();
    cache.get_or_decode(b).unwrap();
    // Touch `a` so `b` becomes the eviction candidate.
    cache.get_or_decode(a).unwrap();
    cache.get_or_decode(c).unwrap();

    assert_eq!(cache.len(), 2);
    assert!(cache.contains(a));
    assert!(!cache.contains(b));
    assert!(cache.contains(c));

    let stats = cache.stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 3);
    assert_eq!(stats.evictions, 1);
    assert_eq!(stats.peak_entries, 2);

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn cache_hit_returns_same_allocation() {
    let dir = temp_dir("hit");
    let frames = write_frames(&dir, &[0]);
    let mut cache = LayerCache::new(3, CANVAS);
    let first = cache.get_or_decode(&frames[0].path).unwrap();
    let second = cache.get_or_decode(&frames[0].path).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn decode_error_is_not_cached() {
    let dir = temp_dir("err");
    let bad = dir.join("0.png");
    std::fs::write(&bad, b"garbage").unwrap();
    let mut cache = LayerCache::new(2, CANVAS);
    assert!(cache.get_or_decode(&bad).is_err());
    assert!(cache.is_empty());
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn precompute_matches_streaming_layers() {
    let dir = temp_dir("pre");
    let frames = write_frames(&dir, &[0, 500, 900, 1400, 2000]);
    let timeline = Timeline::new(frames, 300).unwrap();

    let mut pre = LayerStore::Precomputed(
        PrecomputedLayers::decode_all(&timeline, CANVAS, Some(3)).unwrap(),
    );
    let mut streaming = LayerStore::Streaming(LayerCache::new(2, CANVAS));

    for (i, asset) in timeline.assets().iter().enumerate().rev() {
        let a = pre.layer(i, &asset.source).unwrap();
        let b = streaming.layer(i, &asset.source).unwrap();
        assert_eq!(*a, *b);
    }
    assert_eq!(streaming.stats().misses, 5);
    assert_eq!(streaming.stats().evictions, 3);
    assert_eq!(pre.stats().evictions, 0);

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn precompute_fails_on_any_bad_asset() {
    let dir = temp_dir("prebad");
    let mut frames = write_frames(&dir, &[0, 100]);
    let bad = dir.join("200.png");
    std::fs::write(&bad, b"garbage").unwrap();
    frames.push(ScannedFrame {
        start_ms: 200,
        end_ms: None,
        path: bad,
    });
    let timeline = Timeline::new(frames, 300).unwrap();
    let err = PrecomputedLayers::decode_all(&timeline, CANVAS, None).unwrap_err();
    assert!(matches!(err, ReelcastError::AssetDecode { .. }));
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn zero_threads_is_rejected() {
    assert!(matches!(
        build_thread_pool(Some(0)),
        Err(ReelcastError::Config(_))
    ));
}
