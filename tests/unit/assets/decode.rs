use super::*;

fn write_png(path: &Path, w: u32, h: u32, rgba: [u8; 4]) {
    let img = image::RgbaImage::from_pixel(w, h, image::Rgba(rgba));
    img.save(path).unwrap();
}

fn temp_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("reelcast_decode_{}_{name}", std::process::id()))
}

#[test]
fn decode_png_premultiplies_and_splits_alpha() {
    let path = temp_path("premul.png");
    write_png(&path, 2, 2, [100, 50, 200, 128]);

    let layer = decode_layer(
        &path,
        Canvas {
            width: 2,
            height: 2,
        },
    )
    .unwrap();
    assert_eq!(layer.alpha, vec![128; 4]);
    assert_eq!(
        &layer.premul_rgb[..3],
        &[
            ((100u16 * 128 + 127) / 255) as u8,
            ((50u16 * 128 + 127) / 255) as u8,
            ((200u16 * 128 + 127) / 255) as u8,
        ]
    );
    assert_eq!(probe_canvas(&path).unwrap(), layer.canvas());
    std::fs::remove_file(&path).ok();
}

#[test]
fn smaller_asset_is_pasted_at_origin() {
    let canvas = Canvas {
        width: 4,
        height: 3,
    };
    let rgba = [255u8, 0, 0, 255].repeat(4);
    let layer = DecodedLayer::from_rgba_on_canvas(2, 2, &rgba, canvas);
    assert_eq!(layer.width, 4);
    assert_eq!(layer.height, 3);
    assert_eq!(layer.alpha, vec![255, 255, 0, 0, 255, 255, 0, 0, 0, 0, 0, 0]);
    assert_eq!(layer.straight_rgba_at(1, 1), Some([255, 0, 0, 255]));
    assert_eq!(layer.straight_rgba_at(3, 2), Some([0, 0, 0, 0]));
    assert_eq!(layer.straight_rgba_at(4, 0), None);
}

#[test]
fn larger_asset_is_cropped_not_scaled() {
    let canvas = Canvas {
        width: 2,
        height: 1,
    };
    let mut rgba = Vec::new();
    for x in 0..3u8 {
        rgba.extend_from_slice(&[x * 10, 0, 0, 255]);
    }
    rgba.extend(std::iter::repeat_n(7u8, 12));
    let layer = DecodedLayer::from_rgba_on_canvas(3, 2, &rgba, canvas);
    assert_eq!(layer.premul_rgb, vec![0, 0, 0, 10, 0, 0]);
    assert_eq!(layer.alpha, vec![255, 255]);
}

#[test]
fn missing_file_is_asset_decode_error() {
    let path = temp_path("does_not_exist.png");
    let err = decode_layer(
        &path,
        Canvas {
            width: 1,
            height: 1,
        },
    )
    .unwrap_err();
    assert!(matches!(err, ReelcastError::AssetDecode { .. }));
}

#[test]
fn corrupt_file_is_asset_decode_error() {
    let path = temp_path("corrupt.png");
    std::fs::write(&path, b"not a png").unwrap();
    let err = decode_layer(
        &path,
        Canvas {
            width: 1,
            height: 1,
        },
    )
    .unwrap_err();
    assert!(err.to_string().starts_with("asset decode error:"));
    std::fs::remove_file(&path).ok();
}
