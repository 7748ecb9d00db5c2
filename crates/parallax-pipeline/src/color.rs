//! sRGB <-> CIELAB conversion.
//!
//! Clustering distances are measured in CIELAB (D65), where Euclidean
//! distance tracks perceived color difference far better than raw RGB.
//! Conversions go through linear RGB using the `palette` crate.

use palette::{Clamp, IntoColor, Lab, LinSrgb, Srgb};
use rayon::prelude::*;

use crate::types::RgbImage;

/// A CIELAB color as `[L, a, b]`.
pub type LabColor = [f32; 3];

/// Convert one 8-bit sRGB color to CIELAB.
#[must_use]
pub fn srgb_to_lab(rgb: [u8; 3]) -> LabColor {
    let lab: Lab = Srgb::new(rgb[0], rgb[1], rgb[2])
        .into_format::<f32>()
        .into_linear()
        .into_color();
    [lab.l, lab.a, lab.b]
}

/// Convert a CIELAB color to 8-bit sRGB, clamping out-of-gamut values.
#[must_use]
pub fn lab_to_srgb(lab: LabColor) -> [u8; 3] {
    let linear: LinSrgb = Lab::new(lab[0], lab[1], lab[2]).into_color();
    let srgb: Srgb<u8> = linear.clamp().into_encoding();
    [srgb.red, srgb.green, srgb.blue]
}

/// Convert every pixel of an image to CIELAB, in row-major order.
///
/// Each pixel converts independently, so the work is split across the
/// rayon thread pool without affecting the result.
#[must_use]
pub fn lab_pixels(image: &RgbImage) -> Vec<LabColor> {
    image
        .as_raw()
        .par_chunks_exact(3)
        .map(|p| srgb_to_lab([p[0], p[1], p[2]]))
        .collect()
}

/// Squared Euclidean distance between two CIELAB colors.
#[must_use]
pub fn distance_squared(a: LabColor, b: LabColor) -> f32 {
    let dl = a[0] - b[0];
    let da = a[1] - b[1];
    let db = a[2] - b[2];
    dl.mul_add(dl, da.mul_add(da, db * db))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn white_and_black_lightness() {
        let white = srgb_to_lab([255, 255, 255]);
        let black = srgb_to_lab([0, 0, 0]);
        assert!((white[0] - 100.0).abs() < 0.1, "white L = {}", white[0]);
        assert!(white[1].abs() < 0.1 && white[2].abs() < 0.1);
        assert!(black[0].abs() < 0.1, "black L = {}", black[0]);
    }

    #[test]
    fn red_has_positive_a() {
        let red = srgb_to_lab([255, 0, 0]);
        assert!((red[0] - 53.2).abs() < 0.5, "red L = {}", red[0]);
        assert!(red[1] > 70.0, "red a = {}", red[1]);
    }

    #[test]
    fn blue_has_negative_b() {
        let blue = srgb_to_lab([0, 0, 255]);
        assert!(blue[2] < -90.0, "blue b = {}", blue[2]);
    }

    #[test]
    fn round_trip_primaries() {
        for rgb in [[255, 0, 0], [0, 255, 0], [0, 0, 255], [12, 200, 99]] {
            let back = lab_to_srgb(srgb_to_lab(rgb));
            for c in 0..3 {
                let diff = i16::from(back[c]) - i16::from(rgb[c]);
                assert!(diff.abs() <= 1, "{rgb:?} -> {back:?}");
            }
        }
    }

    #[test]
    fn out_of_gamut_lab_is_clamped() {
        let rgb = lab_to_srgb([50.0, 150.0, -150.0]);
        // Any value is valid u8; the conversion must simply not panic and
        // must saturate at least one channel.
        assert!(rgb.contains(&255) || rgb.contains(&0));
    }

    #[test]
    fn lab_pixels_row_major() {
        let img = RgbImage::from_fn(2, 1, |x, _| {
            if x == 0 {
                image::Rgb([0, 0, 0])
            } else {
                image::Rgb([255, 255, 255])
            }
        });
        let lab = lab_pixels(&img);
        assert_eq!(lab.len(), 2);
        assert!(lab[0][0] < lab[1][0]);
    }

    #[test]
    fn distance_is_squared_euclidean() {
        let d = distance_squared([0.0, 3.0, 0.0], [0.0, 0.0, 4.0]);
        assert!((d - 25.0).abs() < 1e-4);
    }
}
