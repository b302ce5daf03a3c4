use super::*;

#[test]
fn defaults_are_valid() {
    RenderConfig::default().validate().unwrap();
}

#[test]
fn json_uses_defaults_for_missing_fields() {
    let cfg: RenderConfig = serde_json::from_str(
        r#"{
            "fps": 25,
            "transition_ms": 500,
            "top_ratio": 0.25,
            "bottom_ratio": 0.2,
            "dynamic_top": true,
            "background_path": "bg.mp4",
            "audio_paths": ["a.mp3", "b.mp3"],
            "decode_mode": "streaming",
            "fade_policy": "through_color",
            "output_mode": "filter_graph"
        }"#,
    )
    .unwrap();
    cfg.validate().unwrap();
    assert_eq!(cfg.fps, Fps::new(25, 1).unwrap());
    assert_eq!(cfg.transition_ms, 500);
    assert!(cfg.dynamic_top);
    assert_eq!(cfg.audio_paths.len(), 2);
    assert_eq!(cfg.cache_size, 3);
    assert_eq!(cfg.decode_mode, DecodeMode::Streaming);
    assert_eq!(cfg.fade_policy, FadePolicy::ThroughColor);
    assert_eq!(cfg.output_mode, OutputMode::FilterGraph);
}

#[test]
fn unknown_fields_are_rejected() {
    assert!(serde_json::from_str::<RenderConfig>(r#"{"fsp": 30}"#).is_err());
}

#[test]
fn ratio_validation() {
    let cfg = RenderConfig {
        top_ratio: 0.6,
        ..RenderConfig::default()
    };
    assert!(matches!(cfg.validate(), Err(ReelcastError::Config(_))));

    let cfg = RenderConfig {
        bottom_ratio: -0.1,
        ..RenderConfig::default()
    };
    assert!(cfg.validate().is_err());

    let cfg = RenderConfig {
        top_ratio: 0.5,
        bottom_ratio: 0.5,
        ..RenderConfig::default()
    };
    cfg.validate().unwrap();
}

#[test]
fn degenerate_trim_is_rejected() {
    let cfg = RenderConfig {
        start_trim_ms: 2000,
        end_trim_ms: 1500,
        ..RenderConfig::default()
    };
    let err = cfg.validate().unwrap_err();
    assert!(err.to_string().contains("degenerate trim range"));

    let cfg = RenderConfig {
        start_trim_ms: 2000,
        end_trim_ms: 0,
        ..RenderConfig::default()
    };
    cfg.validate().unwrap();
}

#[test]
fn cache_and_scale_validation() {
    let cfg = RenderConfig {
        cache_size: 1,
        ..RenderConfig::default()
    };
    assert!(cfg.validate().is_err());

    let cfg = RenderConfig {
        background_scale: 0.0,
        ..RenderConfig::default()
    };
    assert!(cfg.validate().is_err());

    let cfg = RenderConfig {
        background_scale: f64::NAN,
        ..RenderConfig::default()
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn auto_decode_mode_switches_on_timeline_length() {
    let cfg = RenderConfig {
        precompute_limit: 10,
        ..RenderConfig::default()
    };
    assert_eq!(cfg.effective_decode_mode(10), DecodeMode::Precompute);
    assert_eq!(cfg.effective_decode_mode(11), DecodeMode::Streaming);

    let cfg = RenderConfig {
        decode_mode: DecodeMode::Streaming,
        ..RenderConfig::default()
    };
    assert_eq!(cfg.effective_decode_mode(1), DecodeMode::Streaming);
}

#[test]
fn output_canvas_honors_portrait() {
    let land = Canvas {
        width: 640,
        height: 360,
    };
    assert_eq!(RenderConfig::default().output_canvas(land), land);

    let cfg = RenderConfig {
        portrait: true,
        ..RenderConfig::default()
    };
    assert_eq!(
        cfg.output_canvas(land),
        Canvas {
            width: 640,
            height: 1136
        }
    );

    let cfg = RenderConfig {
        portrait: true,
        portrait_canvas: Some(Canvas {
            width: 360,
            height: 640,
        }),
        ..RenderConfig::default()
    };
    assert_eq!(cfg.output_canvas(land).width, 360);
}

#[test]
fn from_path_reports_config_errors() {
    let dir = std::env::temp_dir().join(format!("reelcast_config_{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("bad.json");
    std::fs::write(&path, r#"{"top_ratio": 0.9}"#).unwrap();
    assert!(matches!(
        RenderConfig::from_path(&path),
        Err(ReelcastError::Config(_))
    ));
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn background_path_is_shorthand_for_one_clip() {
    let cfg = RenderConfig {
        background_path: Some(PathBuf::from("bg.mp4")),
        ..RenderConfig::default()
    };
    assert_eq!(cfg.background_files(), vec![PathBuf::from("bg.mp4")]);

    let cfg: RenderConfig =
        serde_json::from_str(r#"{"background_paths": ["a.mp4", "b.webm"]}"#).unwrap();
    cfg.validate().unwrap();
    assert_eq!(
        cfg.background_files(),
        vec![PathBuf::from("a.mp4"), PathBuf::from("b.webm")]
    );

    let both = RenderConfig {
        background_path: Some(PathBuf::from("bg.mp4")),
        ..cfg
    };
    assert!(matches!(both.validate(), Err(ReelcastError::Config(_))));
    assert!(RenderConfig::default().background_files().is_empty());
}
