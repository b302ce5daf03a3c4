use super::*;

fn frames(starts: &[u64]) -> Vec<ScannedFrame> {
    starts
        .iter()
        .map(|&s| ScannedFrame {
            start_ms: s,
            end_ms: None,
            path: PathBuf::from(format!("{s}.png")),
        })
        .collect()
}

#[test]
fn total_duration_uses_minimum_tail() {
    let tl = Timeline::new(frames(&[0, 1000, 2000]), 500).unwrap();
    assert_eq!(tl.total_duration_ms(), 3000);
    assert_eq!(tl.assets()[2].end_ms, 3000);
    assert_eq!(tl.assets()[0].duration_ms(), 1000);

    let tl = Timeline::new(frames(&[0, 1000]), 1500).unwrap();
    assert_eq!(tl.total_duration_ms(), 2500);
}

#[test]
fn construction_rejects_bad_inputs() {
    assert!(matches!(
        Timeline::new(Vec::new(), 300),
        Err(ReelcastError::Config(_))
    ));
    let err = Timeline::new(frames(&[100, 200]), 300).unwrap_err();
    assert!(err.to_string().contains("first frame must start at 0ms"));
    let err = Timeline::new(frames(&[0, 200, 200]), 300).unwrap_err();
    assert!(err.to_string().contains("duplicate"));
}

#[test]
fn construction_sorts_unordered_frames() {
    let tl = Timeline::new(frames(&[2000, 0, 1000]), 300).unwrap();
    let starts: Vec<u64> = tl.assets().iter().map(|a| a.start_ms).collect();
    assert_eq!(starts, vec![0, 1000, 2000]);
}

#[test]
fn locate_uses_upper_bound_minus_one() {
    let tl = Timeline::new(frames(&[0, 1000, 2000]), 500).unwrap();
    assert_eq!(
        tl.locate(0),
        Located {
            current: 0,
            next: Some(1)
        }
    );
    assert_eq!(tl.locate(999).current, 0);
    assert_eq!(tl.locate(1000).current, 1);
    assert_eq!(
        tl.locate(2750),
        Located {
            current: 2,
            next: None
        }
    );
    // Past the end clamps to total - 1.
    assert_eq!(tl.clamp_ms(10_000), 2999);
    assert_eq!(tl.locate(10_000).current, 2);
}

#[test]
fn window_is_capped_by_gap() {
    let tl = Timeline::new(frames(&[0, 300]), 500).unwrap();
    let w = tl.window_after(0).unwrap();
    assert_eq!(w.window_ms, 300);
    assert_eq!(w.window_start_ms, 0);
    assert_eq!(w.weight_at(0), Some(0));
    assert_eq!(w.weight_at(299), Some(299));
    assert_eq!(w.weight_at(300), None);
    assert!(tl.window_after(1).is_none());
}

#[test]
fn window_shrink_law_holds_for_all_gaps() {
    for gap in 1..=1200u64 {
        let w = CrossfadeWindow::between(5000, 5000 + gap, 500);
        assert!(w.window_ms <= 500);
        if gap < 500 {
            assert_eq!(w.window_ms, gap);
        } else {
            assert_eq!(w.window_ms, 500);
        }
        assert_eq!(w.window_start_ms + w.window_ms, 5000 + gap);
    }
}

#[test]
fn window_is_half_open_and_empty_when_transition_zero() {
    let w = CrossfadeWindow::between(0, 1000, 200);
    assert!(!w.contains(799));
    assert!(w.contains(800));
    assert!(w.contains(999));
    assert!(!w.contains(1000));

    let none = CrossfadeWindow::between(0, 1000, 0);
    assert_eq!(none.window_ms, 0);
    assert!(!none.contains(1000));
    assert!(!none.contains(999));
}
