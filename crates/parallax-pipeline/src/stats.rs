//! Per-layer coverage statistics.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::types::Layer;

/// Coverage and color summary of one layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerStatistics {
    /// Position of the layer in the ordered output.
    pub layer_index: usize,
    /// Label id the layer was built from.
    pub label: u32,
    /// Pixels with alpha above the visibility threshold.
    pub pixel_count: u64,
    /// `pixel_count` as a percentage of the canvas, rounded to two
    /// decimals.
    pub percentage: f64,
    /// Mean color of the visible pixels; black when none are visible.
    pub average_color: [u8; 3],
}

/// Statistics for every layer of a decomposition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticsReport {
    /// Number of layers.
    pub layer_count: usize,
    /// Per-layer entries, in layer order.
    pub layers: Vec<LayerStatistics>,
}

impl StatisticsReport {
    /// Sum of all layer percentages.
    #[must_use]
    pub fn total_percentage(&self) -> f64 {
        self.layers.iter().map(|l| l.percentage).sum()
    }
}

/// Compute statistics for `layers`.
///
/// A pixel is visible when its alpha exceeds `visible_alpha`. In soft
/// edge mode the blurred rim of neighboring layers overlaps, so the
/// percentages may add up to slightly more than 100.
#[must_use]
pub fn collect(layers: &[Layer], visible_alpha: f32) -> StatisticsReport {
    let entries = layers
        .par_iter()
        .enumerate()
        .map(|(layer_index, layer)| layer_statistics(layer_index, layer, visible_alpha))
        .collect();
    StatisticsReport {
        layer_count: layers.len(),
        layers: entries,
    }
}

#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn layer_statistics(layer_index: usize, layer: &Layer, visible_alpha: f32) -> LayerStatistics {
    let total = u64::from(layer.image.width()) * u64::from(layer.image.height());
    let mut count = 0u64;
    let mut sums = [0.0f64; 3];
    for pixel in layer.image.pixels() {
        if pixel[3] > visible_alpha {
            count += 1;
            for (sum, &c) in sums.iter_mut().zip(&pixel.0[..3]) {
                *sum += f64::from(c);
            }
        }
    }

    let (percentage, average_color) = if count == 0 || total == 0 {
        (0.0, [0, 0, 0])
    } else {
        let pct = (count as f64 / total as f64 * 100.0 * 100.0).round() / 100.0;
        let color = sums.map(|s| (s / count as f64 * 255.0).round().clamp(0.0, 255.0) as u8);
        (pct, color)
    };

    LayerStatistics {
        layer_index,
        label: layer.label,
        pixel_count: count,
        percentage,
        average_color,
    }
}
