//! Layer synthesis from the final label map.
//!
//! Each label becomes one full-canvas RGBA raster. In [`EdgeMode::Hard`]
//! the alpha channel is the binary membership mask. In
//! [`EdgeMode::Soft`] the alpha is a 3x3 Gaussian blur of that mask,
//! and color is sampled through the mask dilated by the blur radius, so
//! every pixel with nonzero alpha carries image color instead of black.
//! Color is never premultiplied.

use image::{GrayImage, Luma, Rgba};
use imageproc::distance_transform::Norm;
use imageproc::morphology::dilate;
use rayon::prelude::*;

use crate::blur;
use crate::types::{EdgeMode, LabelMap, Layer, Rgba32FImage, RgbImage};

/// Build one layer per label in the label space, ordered by descending
/// pixel count (ties by ascending label).
///
/// Labels without pixels produce fully transparent layers.
#[must_use]
pub fn synthesize(
    image: &RgbImage,
    labels: &LabelMap,
    edge_mode: EdgeMode,
    soft_edge_sigma: f32,
) -> Vec<Layer> {
    debug_assert_eq!(image.dimensions(), (labels.width(), labels.height()));
    let mut layers: Vec<Layer> = (0..labels.label_count())
        .into_par_iter()
        .map(|label| build_layer(image, labels, label, edge_mode, soft_edge_sigma))
        .collect();
    layers.sort_by(|a, b| {
        b.pixel_count
            .cmp(&a.pixel_count)
            .then(a.label.cmp(&b.label))
    });
    layers
}

/// Binary membership mask of `label` (255 inside, 0 outside).
fn membership_mask(labels: &LabelMap, label: u32) -> GrayImage {
    GrayImage::from_fn(labels.width(), labels.height(), |x, y| {
        Luma([if labels.get(x, y) == label { 255 } else { 0 }])
    })
}

fn build_layer(
    image: &RgbImage,
    labels: &LabelMap,
    label: u32,
    edge_mode: EdgeMode,
    soft_edge_sigma: f32,
) -> Layer {
    let (w, h) = image.dimensions();
    let mask = membership_mask(labels, label);
    let pixel_count = mask.as_raw().iter().filter(|&&v| v > 0).count() as u64;
    let rgb = |x: u32, y: u32| image.get_pixel(x, y).0.map(|c| f32::from(c) / 255.0);

    let raster = match edge_mode {
        EdgeMode::Hard => Rgba32FImage::from_fn(w, h, |x, y| {
            if mask.get_pixel(x, y)[0] > 0 {
                let [r, g, b] = rgb(x, y);
                Rgba([r, g, b, 1.0])
            } else {
                Rgba([0.0; 4])
            }
        }),
        EdgeMode::Soft => {
            let color_mask = dilate(&mask, Norm::LInf, blur::MASK_KERNEL_RADIUS);
            let alpha = blur::blur_mask(&mask, soft_edge_sigma);
            Rgba32FImage::from_fn(w, h, |x, y| {
                let a = alpha[y as usize * w as usize + x as usize];
                if color_mask.get_pixel(x, y)[0] > 0 {
                    let [r, g, b] = rgb(x, y);
                    Rgba([r, g, b, a])
                } else {
                    Rgba([0.0, 0.0, 0.0, a])
                }
            })
        }
    };

    Layer {
        label,
        pixel_count,
        image: raster,
    }
}
