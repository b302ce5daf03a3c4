use super::*;

#[test]
fn mul_div255_variants_align() {
    for x in [0u16, 1, 127, 255] {
        for y in [0u16, 1, 127, 255] {
            assert_eq!(u16::from(mul_div255_u8(x, y)), mul_div255_u16(x, y));
        }
    }
}

#[test]
fn premultiply_rounds_half_up() {
    assert_eq!(premultiply(100, 128), ((100u16 * 128 + 127) / 255) as u8);
    assert_eq!(premultiply(255, 255), 255);
    assert_eq!(premultiply(200, 0), 0);
}

#[test]
fn unpremultiply_guards_zero_alpha() {
    assert_eq!(unpremultiply(0, 0), 0);
    assert_eq!(unpremultiply(17, 0), 0);
    assert_eq!(unpremultiply(255, 255), 255);
    // Out-of-gamut premultiplied values clip instead of wrapping.
    assert_eq!(unpremultiply(200, 100), 255);
}

#[test]
fn premultiply_roundtrip_is_within_one_unit() {
    for a in 1..=255u16 {
        for c in 0..=255u16 {
            let p = premultiply(c as u8, a as u8);
            let back = unpremultiply(p, a as u8);
            // Low alphas quantize hard; the bound is the quantization step of the alpha.
            let tol = (255 + a - 1) / a / 2 + 1;
            let diff = (i32::from(back) - c as i32).unsigned_abs() as u16;
            assert!(
                diff <= tol,
                "c={c} a={a} p={p} back={back} tol={tol}"
            );
            if a >= 128 {
                assert!(diff <= 1, "c={c} a={a}");
            }
            if a == 255 {
                assert_eq!(back as u16, c);
            }
        }
    }
}

#[test]
fn mix_ratio_endpoints_and_midpoint() {
    assert_eq!(mix_ratio(10, 200, 0, 500), 10);
    assert_eq!(mix_ratio(10, 200, 500, 500), 200);
    assert_eq!(mix_ratio(0, 255, 1, 2), 128);
    assert_eq!(mix_ratio(0, 3, 1, 2), 2);
}

#[test]
fn mix_ratio_is_monotonic_in_weight() {
    let den = 300;
    let mut prev = mix_ratio(40, 220, 0, den);
    for num in 1..=den {
        let v = mix_ratio(40, 220, num, den);
        assert!(v >= prev);
        prev = v;
    }
}
