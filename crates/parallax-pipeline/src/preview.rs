//! Diagnostic preview rasters.
//!
//! None of these feed back into the decomposition. They exist so a
//! user tuning parameters can see what each stage produced.

use image::{Rgb, Rgba};

use crate::color::{self, LabColor};
use crate::types::{LabelMap, Layer, RgbImage, RgbaImage};

/// Color used to draw region boundaries.
const BOUNDARY_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

/// Preview rasters attached to a pipeline result when
/// [`PipelineConfig::visualize`](crate::PipelineConfig::visualize) is set.
#[derive(Debug, Clone)]
pub struct Previews {
    /// Input with superpixel boundaries drawn in red.
    pub boundaries: RgbImage,
    /// Each superpixel filled with its mean color.
    pub regions: RgbImage,
    /// Each pixel filled with its color cluster's display color.
    pub clusters: RgbImage,
    /// Composite of every layer.
    pub reconstruction: RgbaImage,
}

/// Paint every pixel whose right or bottom neighbor belongs to a
/// different region.
#[must_use]
pub fn mark_boundaries(image: &RgbImage, regions: &LabelMap) -> RgbImage {
    let (w, h) = image.dimensions();
    let mut out = image.clone();
    for y in 0..h {
        for x in 0..w {
            let label = regions.get(x, y);
            let right = x + 1 < w && regions.get(x + 1, y) != label;
            let below = y + 1 < h && regions.get(x, y + 1) != label;
            if right || below {
                out.put_pixel(x, y, BOUNDARY_COLOR);
            }
        }
    }
    out
}

/// Fill each region with its mean color.
#[must_use]
pub fn region_colors(regions: &LabelMap, features: &[LabColor]) -> RgbImage {
    let palette: Vec<[u8; 3]> = features.iter().map(|&f| color::lab_to_srgb(f)).collect();
    fill(regions, &palette)
}

/// Fill each pixel with the color of its label. Labels past the end of
/// `palette` are drawn black.
#[must_use]
pub fn cluster_colors(labels: &LabelMap, palette: &[[u8; 3]]) -> RgbImage {
    fill(labels, palette)
}

fn fill(labels: &LabelMap, palette: &[[u8; 3]]) -> RgbImage {
    RgbImage::from_fn(labels.width(), labels.height(), |x, y| {
        Rgb(palette
            .get(labels.get(x, y) as usize)
            .copied()
            .unwrap_or([0, 0, 0]))
    })
}

/// Composite the layers at `selected` indices.
///
/// Color is the sum of `rgb * alpha` over the selected layers; alpha is
/// the per-pixel maximum. Out-of-range indices are ignored. The output
/// has the size of the first layer (empty when there are no layers).
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn reconstruct(layers: &[Layer], selected: &[usize]) -> RgbaImage {
    let Some(first) = layers.first() else {
        return RgbaImage::new(0, 0);
    };
    let (w, h) = first.image.dimensions();
    let chosen: Vec<&Layer> = selected.iter().filter_map(|&i| layers.get(i)).collect();

    let quantize = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
    RgbaImage::from_fn(w, h, |x, y| {
        let mut rgb = [0.0f32; 3];
        let mut alpha = 0.0f32;
        for layer in &chosen {
            let p = layer.image.get_pixel(x, y);
            for (acc, &c) in rgb.iter_mut().zip(&p.0[..3]) {
                *acc += c * p[3];
            }
            alpha = alpha.max(p[3]);
        }
        Rgba([
            quantize(rgb[0]),
            quantize(rgb[1]),
            quantize(rgb[2]),
            quantize(alpha),
        ])
    })
}

/// Composite every layer.
#[must_use]
pub fn reconstruct_all(layers: &[Layer]) -> RgbaImage {
    let all: Vec<usize> = (0..layers.len()).collect();
    reconstruct(layers, &all)
}
