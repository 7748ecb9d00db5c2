//! Per-region mean color features.
//!
//! Computes the mean CIELAB color of every region in a single pass over
//! the pixels, accumulating per-region sums. The sums are taken in a
//! fixed order so identical inputs yield bit-identical features.

use crate::color::{self, LabColor};
use crate::types::{LabelMap, RgbImage};

/// Mean CIELAB color of each region, indexed by region id.
///
/// Regions without pixels get `[0, 0, 0]`.
#[must_use]
pub fn region_means(image: &RgbImage, regions: &LabelMap) -> Vec<LabColor> {
    debug_assert_eq!(image.dimensions(), (regions.width(), regions.height()));
    let lab = color::lab_pixels(image);
    mean_by_label(&lab, regions.as_slice(), regions.label_count() as usize)
}

/// Mean of `values` grouped by `labels`, for a label space of `count`.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
pub fn mean_by_label(values: &[LabColor], labels: &[u32], count: usize) -> Vec<LabColor> {
    let mut sums = vec![[0.0f64; 3]; count];
    let mut counts = vec![0u64; count];
    for (value, &label) in values.iter().zip(labels) {
        let k = label as usize;
        for c in 0..3 {
            sums[k][c] += f64::from(value[c]);
        }
        counts[k] += 1;
    }
    sums.iter()
        .zip(&counts)
        .map(|(s, &n)| {
            if n == 0 {
                [0.0; 3]
            } else {
                let n = n as f64;
                [(s[0] / n) as f32, (s[1] / n) as f32, (s[2] / n) as f32]
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_region_means() {
        let img = RgbImage::from_fn(4, 1, |x, _| {
            if x < 2 {
                image::Rgb([255, 0, 0])
            } else {
                image::Rgb([0, 0, 255])
            }
        });
        let regions = LabelMap::from_fn(4, 1, |x, _| u32::from(x >= 2));
        let means = region_means(&img, &regions);
        assert_eq!(means.len(), 2);
        assert_eq!(means[0], color::srgb_to_lab([255, 0, 0]));
        assert_eq!(means[1], color::srgb_to_lab([0, 0, 255]));
    }

    #[test]
    fn mean_averages_members() {
        let values = [[0.0, 10.0, -10.0], [50.0, 30.0, 10.0]];
        let means = mean_by_label(&values, &[0, 0], 1);
        assert_eq!(means, vec![[25.0, 20.0, 0.0]]);
    }

    #[test]
    fn empty_label_is_zero() {
        let values = [[10.0, 10.0, 10.0]];
        let means = mean_by_label(&values, &[1], 3);
        assert_eq!(means[0], [0.0; 3]);
        assert_eq!(means[1], [10.0, 10.0, 10.0]);
        assert_eq!(means[2], [0.0; 3]);
    }

    #[test]
    #[allow(clippy::cast_possible_truncation)]
    fn means_are_bit_identical_across_calls() {
        let img = RgbImage::from_fn(16, 16, |x, y| {
            image::Rgb([(x * 13) as u8, (y * 7) as u8, ((x + y) * 5) as u8])
        });
        let regions = LabelMap::from_fn(16, 16, |x, y| (x / 4) + 4 * (y / 4));
        assert_eq!(region_means(&img, &regions), region_means(&img, &regions));
    }
}
