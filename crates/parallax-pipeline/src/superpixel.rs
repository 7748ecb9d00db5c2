//! SLIC superpixel partitioning.
//!
//! Partitions an image into compact, perceptually coherent regions:
//!
//! 1. Seeds are placed on a regular grid of step `S = sqrt(N / target)`
//!    and nudged to the lowest-gradient pixel of their 3x3 neighborhood
//!    so no seed starts on an edge.
//! 2. Each refinement pass assigns every pixel within a `2S` window of a
//!    center to the center minimizing
//!    `d_lab² + (d_xy / S)² * compactness²`, then moves every center to
//!    the mean color and position of its pixels.
//! 3. Connectivity is enforced: every 4-connected fragment becomes its
//!    own region, and fragments smaller than a quarter of the mean
//!    region size are absorbed by an adjacent region.
//!
//! The output region ids are dense (`0..R`) and every region is
//! 4-connected. `R` is close to, but not exactly, the requested target.
//! A uniform image may produce any number of regions, including one.

use crate::color::{self, LabColor};
use crate::types::{Dimensions, LabelMap, RgbImage};

/// Output of the superpixel partitioner.
#[derive(Debug, Clone)]
pub struct Superpixels {
    /// Dense region label map.
    pub regions: LabelMap,
    /// Number of grid seeds placed before connectivity enforcement.
    pub seed_count: usize,
    /// Grid step `S` in pixels.
    pub step: f64,
}

/// A cluster center in joint color/position space.
#[derive(Debug, Clone, Copy)]
struct Center {
    x: f32,
    y: f32,
    color: LabColor,
}

/// Partition `image` into roughly `segment_target` connected regions.
///
/// `compactness` trades color adherence (low) for regular shape (high).
/// The caller is expected to have smoothed the image already.
#[must_use]
pub fn partition(
    image: &RgbImage,
    segment_target: u32,
    compactness: f32,
    iterations: u32,
) -> Superpixels {
    let dims = Dimensions::of(image);
    let (w, h) = (dims.width as usize, dims.height as usize);
    let lab = color::lab_pixels(image);

    #[allow(clippy::cast_precision_loss)]
    let step = (dims.pixel_count() as f64 / f64::from(segment_target.max(1)))
        .sqrt()
        .max(1.0);
    let (grid_w, grid_h) = grid_shape(w, h, step);

    let mut centers = seed_centers(&lab, w, h, grid_w, grid_h, step);
    let mut labels = initial_labels(w, h, grid_w, grid_h);
    let mut distances = vec![f32::INFINITY; w * h];

    #[allow(clippy::cast_possible_truncation)]
    let spatial_weight = (f64::from(compactness) / step).powi(2) as f32;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let window = (2.0 * step).ceil() as usize;

    for _ in 0..iterations {
        distances.fill(f32::INFINITY);
        assign_pixels(
            &lab,
            w,
            h,
            &centers,
            window,
            spatial_weight,
            &mut labels,
            &mut distances,
        );
        update_centers(&lab, w, &labels, &mut centers);
    }

    let regions = enforce_connectivity(&labels, dims, centers.len());
    log::debug!(
        "superpixels: {} seeds (step {step:.1}) -> {} regions",
        centers.len(),
        regions.label_count(),
    );
    Superpixels {
        regions,
        seed_count: centers.len(),
        step,
    }
}

/// Number of seed columns and rows for grid step `step`.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn grid_shape(w: usize, h: usize, step: f64) -> (usize, usize) {
    let cols = ((w as f64 / step).round() as usize).clamp(1, w);
    let rows = ((h as f64 / step).round() as usize).clamp(1, h);
    (cols, rows)
}

/// Place one seed at the center of each grid cell, moved to the
/// lowest-gradient pixel of its 3x3 neighborhood when cells are large
/// enough that neighboring seeds cannot collide.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn seed_centers(
    lab: &[LabColor],
    w: usize,
    h: usize,
    grid_w: usize,
    grid_h: usize,
    step: f64,
) -> Vec<Center> {
    let mut centers = Vec::with_capacity(grid_w * grid_h);
    for row in 0..grid_h {
        for col in 0..grid_w {
            let mut x = ((col as f64 + 0.5) * w as f64 / grid_w as f64) as usize;
            let mut y = ((row as f64 + 0.5) * h as f64 / grid_h as f64) as usize;
            x = x.min(w - 1);
            y = y.min(h - 1);
            if step >= 3.0 {
                (x, y) = lowest_gradient_near(lab, w, h, x, y);
            }
            centers.push(Center {
                x: x as f32,
                y: y as f32,
                color: lab[y * w + x],
            });
        }
    }
    centers
}

/// Pixel of minimal color gradient in the 3x3 neighborhood of `(x, y)`.
fn lowest_gradient_near(
    lab: &[LabColor],
    w: usize,
    h: usize,
    x: usize,
    y: usize,
) -> (usize, usize) {
    let mut best = (x, y);
    let mut best_gradient = f32::INFINITY;
    for ny in y.saturating_sub(1)..=(y + 1).min(h - 1) {
        for nx in x.saturating_sub(1)..=(x + 1).min(w - 1) {
            let g = gradient(lab, w, h, nx, ny);
            if g < best_gradient {
                best_gradient = g;
                best = (nx, ny);
            }
        }
    }
    best
}

/// Squared central-difference color gradient, clamped at the borders.
fn gradient(lab: &[LabColor], w: usize, h: usize, x: usize, y: usize) -> f32 {
    let at = |x: usize, y: usize| lab[y * w + x];
    let horizontal = color::distance_squared(at((x + 1).min(w - 1), y), at(x.saturating_sub(1), y));
    let vertical = color::distance_squared(at(x, (y + 1).min(h - 1)), at(x, y.saturating_sub(1)));
    horizontal + vertical
}

/// Label every pixel with its grid cell, so pixels outside every search
/// window still carry a valid seed label.
fn initial_labels(w: usize, h: usize, grid_w: usize, grid_h: usize) -> Vec<u32> {
    let mut labels = Vec::with_capacity(w * h);
    for y in 0..h {
        let row = (y * grid_h / h).min(grid_h - 1);
        for x in 0..w {
            let col = (x * grid_w / w).min(grid_w - 1);
            #[allow(clippy::cast_possible_truncation)]
            labels.push((row * grid_w + col) as u32);
        }
    }
    labels
}

/// One assignment pass: each center claims the pixels in its window it
/// is closest to.
#[allow(
    clippy::too_many_arguments,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn assign_pixels(
    lab: &[LabColor],
    w: usize,
    h: usize,
    centers: &[Center],
    window: usize,
    spatial_weight: f32,
    labels: &mut [u32],
    distances: &mut [f32],
) {
    for (k, center) in centers.iter().enumerate() {
        let cx = center.x.round() as usize;
        let cy = center.y.round() as usize;
        let x_range = cx.saturating_sub(window)..(cx + window + 1).min(w);
        let y_range = cy.saturating_sub(window)..(cy + window + 1).min(h);
        for y in y_range {
            let dy = y as f32 - center.y;
            for x in x_range.clone() {
                let dx = x as f32 - center.x;
                let i = y * w + x;
                let spatial = dx.mul_add(dx, dy * dy);
                let d = spatial_weight.mul_add(spatial, color::distance_squared(lab[i], center.color));
                if d < distances[i] {
                    distances[i] = d;
                    labels[i] = k as u32;
                }
            }
        }
    }
}

/// Move each center to the mean color and position of its pixels.
/// Centers that lost every pixel stay where they are.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn update_centers(lab: &[LabColor], w: usize, labels: &[u32], centers: &mut [Center]) {
    let mut sums = vec![[0.0f64; 5]; centers.len()];
    let mut counts = vec![0u64; centers.len()];
    for (i, &label) in labels.iter().enumerate() {
        let k = label as usize;
        let c = lab[i];
        let s = &mut sums[k];
        s[0] += f64::from(c[0]);
        s[1] += f64::from(c[1]);
        s[2] += f64::from(c[2]);
        s[3] += (i % w) as f64;
        s[4] += (i / w) as f64;
        counts[k] += 1;
    }
    for ((center, s), &count) in centers.iter_mut().zip(&sums).zip(&counts) {
        if count == 0 {
            continue;
        }
        let n = count as f64;
        center.color = [(s[0] / n) as f32, (s[1] / n) as f32, (s[2] / n) as f32];
        center.x = (s[3] / n) as f32;
        center.y = (s[4] / n) as f32;
    }
}

/// Relabel 4-connected fragments densely in scan order, absorbing
/// fragments below a quarter of the mean region size into an adjacent,
/// already-labeled region.
fn enforce_connectivity(labels: &[u32], dims: Dimensions, segment_count: usize) -> LabelMap {
    let (w, h) = (dims.width as usize, dims.height as usize);
    let n = w * h;
    let min_size = n / segment_count.max(1) / 4;

    let neighbors = |i: usize| {
        let (x, y) = (i % w, i / w);
        [
            (x > 0).then(|| i - 1),
            (y > 0).then(|| i - w),
            (x + 1 < w).then(|| i + 1),
            (y + 1 < h).then(|| i + w),
        ]
        .into_iter()
        .flatten()
    };

    let mut out = vec![u32::MAX; n];
    let mut queue: Vec<usize> = Vec::new();
    let mut next = 0u32;

    for start in 0..n {
        if out[start] != u32::MAX {
            continue;
        }
        let adjacent = neighbors(start).map(|j| out[j]).find(|&l| l != u32::MAX);
        let source = labels[start];

        out[start] = next;
        queue.clear();
        queue.push(start);
        let mut head = 0;
        while head < queue.len() {
            let i = queue[head];
            head += 1;
            for j in neighbors(i) {
                if out[j] == u32::MAX && labels[j] == source {
                    out[j] = next;
                    queue.push(j);
                }
            }
        }

        match adjacent {
            Some(target) if queue.len() < min_size => {
                for &i in &queue {
                    out[i] = target;
                }
            }
            _ => next += 1,
        }
    }

    LabelMap::from_parts(dims, out, next)
}
