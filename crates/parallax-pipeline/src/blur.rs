//! Gaussian smoothing for the partitioner input and soft layer edges.
//!
//! [`smooth_rgb`] wraps [`imageproc::filter::gaussian_blur_f32`] to
//! suppress gradient noise before superpixel partitioning so flat
//! regions with slight dithering do not fragment.
//!
//! [`blur_mask`] softens a binary layer mask into an antialiased alpha
//! channel. It uses a fixed 3x3 Gaussian in `f32`, so alpha never
//! reaches more than [`MASK_KERNEL_RADIUS`] pixels past the mask.

use image::{GrayImage, ImageBuffer, Luma};

use crate::types::RgbImage;

/// Apply Gaussian blur to an RGB image by blurring each channel
/// independently.
///
/// The image is split into three single-channel images, each is
/// blurred, and the result is reassembled. Gaussian blur is linear and
/// per-channel, so this equals blurring in RGB space.
///
/// Non-positive sigma values return the image unchanged, since
/// `imageproc`'s underlying function panics on `sigma <= 0.0`.
#[must_use = "returns the smoothed image"]
pub fn smooth_rgb(image: &RgbImage, sigma: f32) -> RgbImage {
    if sigma <= 0.0 {
        return image.clone();
    }

    let (w, h) = (image.width(), image.height());

    let channels: [GrayImage; 3] = std::array::from_fn(|c| {
        GrayImage::from_fn(w, h, |x, y| image::Luma([image.get_pixel(x, y).0[c]]))
    });

    let blurred: [GrayImage; 3] =
        std::array::from_fn(|c| imageproc::filter::gaussian_blur_f32(&channels[c], sigma));

    RgbImage::from_fn(w, h, |x, y| {
        image::Rgb([
            blurred[0].get_pixel(x, y).0[0],
            blurred[1].get_pixel(x, y).0[0],
            blurred[2].get_pixel(x, y).0[0],
        ])
    })
}

/// Reach of the mask blur kernel in pixels.
pub const MASK_KERNEL_RADIUS: u8 = 1;

/// Normalized 3-tap Gaussian weights for `sigma`.
fn mask_kernel(sigma: f32) -> [f32; 3] {
    let side = (-1.0 / (2.0 * sigma * sigma)).exp();
    let total = 2.0f32.mul_add(side, 1.0);
    [side / total, 1.0 / total, side / total]
}

/// Blur a binary mask (0 or 255) into alpha values in `[0, 1]`.
///
/// `sigma` shapes the weights of a 3x3 Gaussian kernel; edges are
/// padded by continuity. Non-positive sigma values return the unblurred
/// mask scaled to `[0, 1]`.
#[must_use = "returns the alpha values"]
pub fn blur_mask(mask: &GrayImage, sigma: f32) -> Vec<f32> {
    let alpha: ImageBuffer<Luma<f32>, Vec<f32>> =
        ImageBuffer::from_fn(mask.width(), mask.height(), |x, y| {
            Luma([f32::from(mask.get_pixel(x, y)[0]) / 255.0])
        });
    if sigma <= 0.0 {
        return alpha.into_raw();
    }
    imageproc::filter::separable_filter_equal(&alpha, &mask_kernel(sigma))
        .into_raw()
        .into_iter()
        .map(|a| a.clamp(0.0, 1.0))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Left half red, right half blue, sharp boundary at x=5.
    fn red_blue_image() -> RgbImage {
        RgbImage::from_fn(10, 10, |x, _y| {
            if x < 5 {
                image::Rgb([255, 0, 0])
            } else {
                image::Rgb([0, 0, 255])
            }
        })
    }

    #[test]
    fn zero_sigma_returns_identical_image() {
        let img = red_blue_image();
        assert_eq!(smooth_rgb(&img, 0.0), img);
    }

    #[test]
    fn negative_sigma_returns_identical_image() {
        let img = red_blue_image();
        assert_eq!(smooth_rgb(&img, -1.0), img);
    }

    #[test]
    fn output_dimensions_preserved() {
        let img = RgbImage::new(17, 31);
        let blurred = smooth_rgb(&img, 1.0);
        assert_eq!(blurred.dimensions(), (17, 31));
    }

    #[test]
    fn smooths_sharp_color_edge() {
        let blurred = smooth_rgb(&red_blue_image(), 2.0);
        let left = blurred.get_pixel(4, 5).0[0];
        let right = blurred.get_pixel(5, 5).0[0];
        assert!(left < 255, "expected red to decrease near boundary, got {left}");
        assert!(right > 0, "expected red to increase near boundary, got {right}");
    }

    #[test]
    fn uniform_image_unchanged_by_blur() {
        let img = RgbImage::from_pixel(10, 10, image::Rgb([100, 150, 200]));
        let blurred = smooth_rgb(&img, 1.0);
        let expected: [u8; 3] = [100, 150, 200];
        for pixel in blurred.pixels() {
            for (c, &exp) in expected.iter().enumerate() {
                let diff = i16::from(pixel.0[c]) - i16::from(exp);
                assert!(diff.abs() <= 1, "channel {c}: expected ~{exp}, got {}", pixel.0[c]);
            }
        }
    }

    #[test]
    fn blur_mask_stays_in_unit_range() {
        let mask = GrayImage::from_fn(9, 9, |x, y| {
            if (3..6).contains(&x) && (3..6).contains(&y) {
                image::Luma([255])
            } else {
                image::Luma([0])
            }
        });
        let alpha = blur_mask(&mask, 0.8);
        assert_eq!(alpha.len(), 81);
        assert!(alpha.iter().all(|a| (0.0..=1.0).contains(a)));
        // Center stays nearly opaque, the rim picks up partial alpha.
        assert!(alpha[4 * 9 + 4] > 0.9);
        let rim = alpha[4 * 9 + 2];
        assert!(rim > 0.0 && rim < 1.0, "rim alpha {rim}");
    }

    #[test]
    fn blur_mask_stays_within_kernel_radius() {
        let mask = GrayImage::from_fn(9, 9, |x, y| {
            if (3..6).contains(&x) && (3..6).contains(&y) {
                image::Luma([255])
            } else {
                image::Luma([0])
            }
        });
        let alpha = blur_mask(&mask, 0.8);
        for y in 0..9 {
            for x in 0..9 {
                let near = (2..7).contains(&x) && (2..7).contains(&y);
                let a = alpha[y * 9 + x];
                if !near {
                    assert!(a.abs() < f32::EPSILON, "alpha {a} at ({x}, {y})");
                }
            }
        }
    }

    #[test]
    fn blur_mask_is_not_quantized() {
        // A lone edge pixel: one step right of a vertical mask boundary
        // picks up exactly the side weight.
        let mask = GrayImage::from_fn(4, 1, |x, _| image::Luma([if x < 2 { 255 } else { 0 }]));
        let alpha = blur_mask(&mask, 0.8);
        let [side, center, _] = mask_kernel(0.8);
        assert!((alpha[2] - side).abs() < 1e-6, "got {}", alpha[2]);
        assert!((alpha[1] - (side + center)).abs() < 1e-6, "got {}", alpha[1]);
        assert!((mask_kernel(0.8).iter().sum::<f32>() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn blur_mask_zero_sigma_is_binary() {
        let mask = GrayImage::from_fn(2, 1, |x, _| image::Luma([if x == 0 { 255 } else { 0 }]));
        assert_eq!(blur_mask(&mask, 0.0), vec![1.0, 0.0]);
    }
}
