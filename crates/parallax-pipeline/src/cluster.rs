//! K-means clustering of region colors.
//!
//! Regions are grouped by color with Lloyd's algorithm over their mean
//! CIELAB features. Lightness is scaled down before clustering so that
//! lit and shaded parts of one object, which differ mostly in `L`, end
//! up in the same cluster.
//!
//! Seeding uses k-means++ from a fixed-seed [`Xoroshiro128PlusPlus`], so
//! identical inputs always produce identical assignments. Several
//! restarts are run and the one with the lowest inertia (sum of squared
//! distances to the assigned centroid) wins; ties keep the earliest.

use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoroshiro128PlusPlus;
use serde::{Deserialize, Serialize};

use crate::color::LabColor;
use crate::features::mean_by_label;
use crate::types::{LabelMap, PipelineConfig};

/// Parameters of a clustering run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterParams {
    /// Number of clusters `K`.
    pub clusters: u32,
    /// Factor applied to lightness before clustering.
    pub lightness_weight: f32,
    /// RNG seed for k-means++ initialization.
    pub seed: u64,
    /// Number of independent runs.
    pub restarts: u32,
    /// Iteration cap of a single run.
    pub max_iterations: u32,
}

impl From<&PipelineConfig> for ClusterParams {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            clusters: config.layer_count,
            lightness_weight: config.lightness_weight,
            seed: config.seed,
            restarts: config.restarts,
            max_iterations: config.max_iterations,
        }
    }
}

/// Convergence instrumentation for a clustering run.
///
/// Purely informational; nothing in the pipeline branches on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterReport {
    /// Requested cluster count.
    pub requested: u32,
    /// Number of region features clustered.
    pub region_count: usize,
    /// Assignment passes of the winning run.
    pub iterations: u32,
    /// Whether the winning run stopped because assignments were stable
    /// (`false` means the iteration cap was hit).
    pub converged: bool,
    /// Final inertia of the winning run, in weighted CIELAB units.
    pub inertia: f64,
    /// Number of runs performed.
    pub restarts: u32,
    /// Clusters that received at least one region.
    pub non_empty: usize,
}

/// Result of clustering region features.
#[derive(Debug, Clone)]
pub struct Clustering {
    /// Cluster id of each region, indexed by region id.
    pub assignment: Vec<u32>,
    /// Unweighted mean CIELAB color of each cluster's regions, indexed
    /// by cluster id. Empty clusters get `[0, 0, 0]`.
    pub centroids: Vec<LabColor>,
    /// Convergence instrumentation.
    pub report: ClusterReport,
}

impl Clustering {
    /// Map a region label map to a per-pixel cluster label map.
    ///
    /// The result's label space is the requested cluster count, so
    /// empty clusters keep their ids.
    #[must_use]
    pub fn pixel_labels(&self, regions: &LabelMap) -> LabelMap {
        match regions.remap(&self.assignment, self.report.requested) {
            Some(map) => map,
            // Unreachable: `assignment` covers every region with ids
            // below `requested`.
            None => LabelMap::from_parts(
                regions.dimensions(),
                vec![0; regions.as_slice().len()],
                self.report.requested.max(1),
            ),
        }
    }
}

/// Cluster region features into `params.clusters` groups.
///
/// With at least as many clusters as regions, every region becomes its
/// own cluster and the remaining clusters stay empty.
#[must_use]
pub fn cluster(features: &[LabColor], params: &ClusterParams) -> Clustering {
    let k = params.clusters as usize;
    let r = features.len();

    if k >= r {
        #[allow(clippy::cast_possible_truncation)]
        let assignment: Vec<u32> = (0..r as u32).collect();
        let centroids = mean_by_label(features, &assignment, k);
        let report = ClusterReport {
            requested: params.clusters,
            region_count: r,
            iterations: 0,
            converged: true,
            inertia: 0.0,
            restarts: 0,
            non_empty: r,
        };
        log::debug!("kmeans: {r} regions <= {k} clusters, one cluster per region");
        return Clustering {
            assignment,
            centroids,
            report,
        };
    }

    let weighted: Vec<[f64; 3]> = features
        .iter()
        .map(|f| {
            [
                f64::from(f[0]) * f64::from(params.lightness_weight),
                f64::from(f[1]),
                f64::from(f[2]),
            ]
        })
        .collect();

    let mut rng = Xoroshiro128PlusPlus::seed_from_u64(params.seed);
    let mut best: Option<Run> = None;
    for _ in 0..params.restarts {
        let initial = plus_plus_init(&weighted, k, &mut rng);
        let run = lloyd(&weighted, initial, params.max_iterations);
        if best.as_ref().is_none_or(|b| run.inertia < b.inertia) {
            best = Some(run);
        }
    }

    let best = best.unwrap_or_else(|| lloyd(&weighted, weighted[..k].to_vec(), 1));
    let centroids = mean_by_label(features, &best.assignment, k);
    let mut used = vec![false; k];
    for &a in &best.assignment {
        used[a as usize] = true;
    }
    let report = ClusterReport {
        requested: params.clusters,
        region_count: r,
        iterations: best.iterations,
        converged: best.converged,
        inertia: best.inertia,
        restarts: params.restarts,
        non_empty: used.iter().filter(|&&u| u).count(),
    };
    log::debug!(
        "kmeans: k={k} regions={r} iterations={} converged={} inertia={:.2}",
        report.iterations,
        report.converged,
        report.inertia,
    );
    Clustering {
        assignment: best.assignment,
        centroids,
        report,
    }
}

/// One Lloyd run.
struct Run {
    assignment: Vec<u32>,
    iterations: u32,
    converged: bool,
    inertia: f64,
}

fn distance_squared(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    let d0 = a[0] - b[0];
    let d1 = a[1] - b[1];
    let d2 = a[2] - b[2];
    d0.mul_add(d0, d1.mul_add(d1, d2 * d2))
}

/// Index of the nearest centroid; ties go to the lowest index.
fn nearest(point: &[f64; 3], centroids: &[[f64; 3]]) -> (usize, f64) {
    let mut best = (0, f64::INFINITY);
    for (i, c) in centroids.iter().enumerate() {
        let d = distance_squared(point, c);
        if d < best.1 {
            best = (i, d);
        }
    }
    best
}

/// k-means++ seeding: each further centroid is drawn with probability
/// proportional to its squared distance from the closest chosen one.
/// When every point coincides with a chosen centroid, a uniform draw is
/// used instead.
fn plus_plus_init(points: &[[f64; 3]], k: usize, rng: &mut Xoroshiro128PlusPlus) -> Vec<[f64; 3]> {
    let mut centroids = Vec::with_capacity(k);
    centroids.push(points[rng.gen_range(0..points.len())]);
    let mut closest: Vec<f64> = points
        .iter()
        .map(|p| distance_squared(p, &centroids[0]))
        .collect();

    while centroids.len() < k {
        let total: f64 = closest.iter().sum();
        let pick = if total > 0.0 {
            let mut target = rng.gen_range(0.0..total);
            let mut chosen = points.len() - 1;
            for (i, &d) in closest.iter().enumerate() {
                if target < d {
                    chosen = i;
                    break;
                }
                target -= d;
            }
            chosen
        } else {
            rng.gen_range(0..points.len())
        };
        let centroid = points[pick];
        for (c, p) in closest.iter_mut().zip(points) {
            *c = c.min(distance_squared(p, &centroid));
        }
        centroids.push(centroid);
    }
    centroids
}

/// Lloyd iterations until the assignment is stable or the cap is hit.
/// Empty clusters keep their previous centroid. Inertia is measured
/// against the centroids the final assignment was made with.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn lloyd(points: &[[f64; 3]], mut centroids: Vec<[f64; 3]>, max_iterations: u32) -> Run {
    let k = centroids.len();
    let mut assignment = vec![u32::MAX; points.len()];
    let mut iterations = 0;
    let mut converged = false;

    while iterations < max_iterations {
        iterations += 1;
        let mut changed = false;
        for (a, p) in assignment.iter_mut().zip(points) {
            let (i, _) = nearest(p, &centroids);
            let i = i as u32;
            if *a != i {
                *a = i;
                changed = true;
            }
        }
        if !changed {
            converged = true;
            break;
        }
        // Inertia is measured against the centroids that produced the
        // final assignment.
        if iterations == max_iterations {
            break;
        }

        let mut sums = vec![[0.0f64; 3]; k];
        let mut counts = vec![0u64; k];
        for (&a, p) in assignment.iter().zip(points) {
            let s = &mut sums[a as usize];
            s[0] += p[0];
            s[1] += p[1];
            s[2] += p[2];
            counts[a as usize] += 1;
        }
        for ((c, s), &n) in centroids.iter_mut().zip(&sums).zip(&counts) {
            if n > 0 {
                let n = n as f64;
                *c = [s[0] / n, s[1] / n, s[2] / n];
            }
        }
    }

    let inertia = assignment
        .iter()
        .zip(points)
        .map(|(&a, p)| distance_squared(p, &centroids[a as usize]))
        .sum();
    Run {
        assignment,
        iterations,
        converged,
        inertia,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn params(clusters: u32) -> ClusterParams {
        ClusterParams {
            clusters,
            lightness_weight: 0.65,
            seed: 42,
            restarts: 10,
            max_iterations: 300,
        }
    }

    fn two_groups() -> Vec<LabColor> {
        vec![
            [50.0, 70.0, 60.0],
            [52.0, 71.0, 58.0],
            [48.0, 69.0, 61.0],
            [30.0, 70.0, -100.0],
            [31.0, 72.0, -98.0],
        ]
    }

    #[test]
    fn separates_two_color_groups() {
        let result = cluster(&two_groups(), &params(2));
        let a = &result.assignment;
        assert_eq!(a[0], a[1]);
        assert_eq!(a[1], a[2]);
        assert_eq!(a[3], a[4]);
        assert_ne!(a[0], a[3]);
        assert!(result.report.converged);
        assert_eq!(result.report.non_empty, 2);
    }

    #[test]
    fn deterministic_with_fixed_seed() {
        let features: Vec<LabColor> = (0..60)
            .map(|i| {
                #[allow(clippy::cast_precision_loss)]
                let t = i as f32;
                [t % 100.0, (t * 7.0) % 80.0 - 40.0, (t * 13.0) % 90.0 - 45.0]
            })
            .collect();
        let a = cluster(&features, &params(5));
        let b = cluster(&features, &params(5));
        assert_eq!(a.assignment, b.assignment);
        assert_eq!(a.report, b.report);
    }

    #[test]
    fn more_clusters_than_regions_is_identity() {
        let features = vec![[10.0, 0.0, 0.0], [90.0, 0.0, 0.0]];
        let result = cluster(&features, &params(4));
        assert_eq!(result.assignment, vec![0, 1]);
        assert_eq!(result.centroids.len(), 4);
        assert_eq!(result.centroids[1], [90.0, 0.0, 0.0]);
        assert_eq!(result.centroids[3], [0.0, 0.0, 0.0]);
        assert_eq!(result.report.non_empty, 2);
    }

    #[test]
    fn identical_features_leave_extra_clusters_empty() {
        let features = vec![[40.0, 5.0, 5.0]; 12];
        let result = cluster(&features, &params(3));
        assert!(result.assignment.iter().all(|&a| a == result.assignment[0]));
        assert_eq!(result.report.non_empty, 1);
        assert_eq!(result.centroids.len(), 3);
        assert!(result.report.inertia.abs() < 1e-9);
    }

    #[test]
    fn centroids_are_unweighted_means() {
        let result = cluster(&two_groups(), &params(2));
        let red = result.assignment[0] as usize;
        // Mean L of the first group is 50, not 50 * 0.65.
        assert!((result.centroids[red][0] - 50.0).abs() < 1e-4);
    }

    #[test]
    fn lightness_weight_merges_shades() {
        // Same hue at three lightness levels plus a distinct hue. With a
        // small lightness weight, the shades stay together.
        let features = vec![
            [20.0, 60.0, 40.0],
            [50.0, 60.0, 40.0],
            [80.0, 60.0, 40.0],
            [50.0, -60.0, -40.0],
        ];
        let p = ClusterParams {
            lightness_weight: 0.2,
            ..params(2)
        };
        let result = cluster(&features, &p);
        let a = &result.assignment;
        assert_eq!(a[0], a[1]);
        assert_eq!(a[1], a[2]);
        assert_ne!(a[0], a[3]);
    }

    #[test]
    fn iteration_cap_is_reported() {
        let features: Vec<LabColor> = (0..40)
            .map(|i| {
                #[allow(clippy::cast_precision_loss)]
                let t = i as f32;
                [t, t * 0.5, -t]
            })
            .collect();
        let p = ClusterParams {
            max_iterations: 1,
            ..params(4)
        };
        let result = cluster(&features, &p);
        assert_eq!(result.report.iterations, 1);
        assert!(!result.report.converged);
    }

    #[test]
    fn capped_run_reports_inertia_of_its_assignment() {
        let points = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [10.0, 0.0, 0.0]];
        let initial = vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]];
        let run = lloyd(&points, initial, 1);
        assert_eq!(run.assignment, vec![0, 1, 1]);
        assert!(!run.converged);
        // Distances to the centroids used for the assignment: 0, 0, 9.
        assert!((run.inertia - 81.0).abs() < 1e-9, "inertia {}", run.inertia);
    }

    #[test]
    fn converged_run_inertia_matches_final_centroids() {
        let points = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [10.0, 0.0, 0.0]];
        let initial = vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]];
        let run = lloyd(&points, initial, 100);
        assert!(run.converged);
        assert_eq!(run.assignment, vec![0, 0, 1]);
        // Centroids 0.5 and 10.
        assert!((run.inertia - 0.5).abs() < 1e-9, "inertia {}", run.inertia);
    }

    #[test]
    fn pixel_labels_map_regions_to_clusters() {
        let regions = LabelMap::from_fn(3, 1, |x, _| x);
        let clustering = Clustering {
            assignment: vec![1, 0, 1],
            centroids: vec![[0.0; 3]; 3],
            report: ClusterReport {
                requested: 3,
                region_count: 3,
                iterations: 1,
                converged: true,
                inertia: 0.0,
                restarts: 1,
                non_empty: 2,
            },
        };
        let pixels = clustering.pixel_labels(&regions);
        assert_eq!(pixels.as_slice(), &[1, 0, 1]);
        assert_eq!(pixels.label_count(), 3);
    }
}
