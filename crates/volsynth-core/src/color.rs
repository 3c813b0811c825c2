//! HSV → RGBA8 conversion used to turn per-cluster color settings into
//! transfer-function control points.

use crate::transfer::Rgba8;

/// Convert hue, saturation, value and alpha (each in [0, 1]) to RGBA bytes
/// using the hexagonal-sector method.
pub fn hsv_to_rgba(h: f64, s: f64, v: f64, a: f64) -> Rgba8 {
    let scaled = h * 6.0;
    let sector = scaled.floor();
    let f = scaled - sector;
    let p = v * (1.0 - s);
    let q = v * (1.0 - f * s);
    let t = v * (1.0 - (1.0 - f) * s);

    let (r, g, b) = match (sector as i64).rem_euclid(6) {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    };

    Rgba8::new(to_byte(r), to_byte(g), to_byte(b), to_byte(a))
}

/// Scale a unit component to a byte, rounding half up.
fn to_byte(component: f64) -> u8 {
    (component * 255.0).round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(actual: Rgba8, expected: [u8; 4]) -> bool {
        actual
            .to_array()
            .iter()
            .zip(expected.iter())
            .all(|(a, e)| (*a as i16 - *e as i16).abs() <= 1)
    }

    #[test]
    fn test_white() {
        assert_eq!(hsv_to_rgba(0.0, 0.0, 1.0, 1.0), Rgba8::new(255, 255, 255, 255));
    }

    #[test]
    fn test_primaries() {
        assert_eq!(hsv_to_rgba(0.0, 1.0, 1.0, 1.0), Rgba8::new(255, 0, 0, 255));
        assert!(close(hsv_to_rgba(1.0 / 3.0, 1.0, 1.0, 1.0), [0, 255, 0, 255]));
        assert!(close(hsv_to_rgba(2.0 / 3.0, 1.0, 1.0, 1.0), [0, 0, 255, 255]));
    }

    #[test]
    fn test_secondaries() {
        assert!(close(hsv_to_rgba(1.0 / 6.0, 1.0, 1.0, 1.0), [255, 255, 0, 255]));
        assert!(close(hsv_to_rgba(0.5, 1.0, 1.0, 1.0), [0, 255, 255, 255]));
        assert!(close(hsv_to_rgba(5.0 / 6.0, 1.0, 1.0, 1.0), [255, 0, 255, 255]));
    }

    #[test]
    fn test_hue_one_matches_hue_zero() {
        assert_eq!(hsv_to_rgba(1.0, 0.7, 0.6, 0.5), hsv_to_rgba(0.0, 0.7, 0.6, 0.5));
    }

    #[test]
    fn test_black_and_transparent() {
        assert_eq!(hsv_to_rgba(0.3, 0.9, 0.0, 0.0), Rgba8::new(0, 0, 0, 0));
    }

    #[test]
    fn test_half_alpha_rounds_up() {
        // 0.5 * 255 = 127.5
        assert_eq!(hsv_to_rgba(0.0, 0.0, 1.0, 0.5).a, 128);
    }
}
