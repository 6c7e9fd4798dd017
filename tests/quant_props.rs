use piedense::quant::{clamp_activation, dequantize, quantize, saturate_i8, QuantizationParams};

#[test]
fn quantize_dequantize_round_trip_all_int8() {
    let params = [(1.0f32, 0i32), (0.1, 0), (0.0078125, -128), (0.37, 127), (3.5, -7), (1e-4, 42)];
    for (scale, zp) in params {
        let p = QuantizationParams::per_tensor(scale, zp).unwrap();
        for v in i8::MIN..=i8::MAX {
            let real = dequantize(v as i32, p.scale(0), p.zero_point(0));
            assert_eq!(quantize(real, p.scale(0), p.zero_point(0)), v, "scale={} zp={} v={}", scale, zp, v);
        }
    }
}

#[test]
fn activation_clamp_is_idempotent() {
    let ranges = [(-128, 127), (0, 127), (-6, 6), (3, 3)];
    for (lo, hi) in ranges {
        for v in (-100_000..=100_000).step_by(97).chain([i32::MIN, i32::MAX]) {
            let once = clamp_activation(v, lo, hi);
            assert_eq!(clamp_activation(once, lo, hi), once);
            assert!(once >= lo && once <= hi);
        }
    }
}

#[test]
fn saturating_narrow_is_identity_inside_int8() {
    for v in -128..=127 {
        assert_eq!(saturate_i8(v) as i32, v);
    }
    assert_eq!(saturate_i8(128), 127);
    assert_eq!(saturate_i8(-129), -128);
}
