use super::*;

#[test]
fn display_prefixes_are_stable() {
    assert!(
        ReelcastError::config("x")
            .to_string()
            .contains("config error:")
    );
    assert!(
        ReelcastError::asset_decode(Path::new("frames/0.png"), "truncated")
            .to_string()
            .contains("asset decode error: 'frames/0.png': truncated")
    );
    assert!(
        ReelcastError::background_load("x")
            .to_string()
            .contains("background load error:")
    );
    assert!(
        ReelcastError::encoder("x")
            .to_string()
            .contains("encoder error:")
    );
}

#[test]
fn encoder_error_keeps_tool_output_verbatim() {
    let stderr = "[libx264 @ 0x1] width not divisible by 2 (641x360)";
    let err = ReelcastError::encoder(stderr);
    assert!(err.to_string().ends_with(stderr));
}

#[test]
fn only_background_failures_are_recoverable() {
    assert!(ReelcastError::background_load("missing").is_recoverable());
    assert!(!ReelcastError::config("x").is_recoverable());
    assert!(!ReelcastError::encoder("x").is_recoverable());
    assert!(!ReelcastError::Cancelled.is_recoverable());
}

#[test]
fn other_preserves_source() {
    let base = std::io::Error::other("boom");
    let err = ReelcastError::Other(anyhow::Error::new(base));
    assert!(err.to_string().contains("boom"));
}
