//! Spatial splitting of color clusters.
//!
//! A cluster groups regions by color only, so one cluster may cover
//! several disjoint areas of the icon (two eyes, a row of buttons). This
//! stage finds the connected components of each cluster and moves the
//! largest ones onto freshly allocated labels so they become separate
//! layers.
//!
//! Fan-out per cluster is capped at `max_regions_per_color`. When a
//! cluster has more components than that, the largest keeps the cluster
//! label, the next ones get new labels, and every remaining component is
//! folded into the last new label. When it has no more than the cap,
//! only components above `significant_fraction` of the cluster size are
//! split off so stray specks stay with the dominant component.
//!
//! Component labeling runs per cluster on the rayon pool. Labels are
//! then allocated sequentially in ascending cluster order, so the output
//! does not depend on scheduling.

use image::{GrayImage, Luma};
use imageproc::region_labelling::connected_components;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::types::{Adjacency, LabelMap, PipelineConfig, SplitMode};

/// Parameters of the splitting stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitParams {
    /// Whether splitting runs at all.
    pub mode: SplitMode,
    /// Maximum number of labels a single cluster may end up with.
    pub max_regions_per_color: u32,
    /// Minimum share of its cluster a within-cap component needs to be
    /// split off.
    pub significant_fraction: f64,
    /// Pixel connectivity for component labeling.
    pub adjacency: Adjacency,
}

impl From<&PipelineConfig> for SplitParams {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            mode: config.split_mode,
            max_regions_per_color: config.max_regions_per_color,
            significant_fraction: config.significant_fraction,
            adjacency: config.adjacency,
        }
    }
}

/// Summary of what the splitter did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitReport {
    /// Label space size on input.
    pub labels_before: u32,
    /// Label space size on output.
    pub labels_after: u32,
    /// Clusters that received at least one new label.
    pub clusters_split: usize,
    /// Connected components found across all non-empty clusters.
    pub components_found: usize,
}

/// Connected components of one cluster.
struct Components {
    cluster: u32,
    /// Pixel count per component, ranked largest first.
    sizes: Vec<u64>,
    /// Row-major pixel index and rank of every member pixel.
    members: Vec<(usize, usize)>,
}

/// Split clusters of `labels` into spatially separate labels.
///
/// Never removes a label and never changes any pixel's membership to a
/// different original cluster; new labels are appended after the
/// current label space.
#[must_use]
pub fn split(mut labels: LabelMap, params: &SplitParams) -> (LabelMap, SplitReport) {
    let labels_before = labels.label_count();
    let mut report = SplitReport {
        labels_before,
        labels_after: labels_before,
        ..SplitReport::default()
    };
    if params.mode == SplitMode::Off {
        return (labels, report);
    }

    let counts = labels.pixel_counts();
    let connectivity = params.adjacency.to_connectivity();
    let found: Vec<Components> = (0..labels_before)
        .into_par_iter()
        .filter(|&c| counts[c as usize] > 0)
        .map(|c| components_of(&labels, c, connectivity))
        .collect();

    for components in found {
        report.components_found += components.sizes.len();
        let slots = assign_slots(&components.sizes, params);
        let new_labels = slots.iter().copied().max().unwrap_or(0);
        if new_labels == 0 {
            continue;
        }
        let mut targets = Vec::with_capacity(new_labels + 1);
        targets.push(components.cluster);
        for _ in 0..new_labels {
            targets.push(labels.allocate_label());
        }
        for &(index, rank) in &components.members {
            let slot = slots[rank];
            if slot > 0 {
                labels.set_index(index, targets[slot]);
            }
        }
        log::debug!(
            "split: cluster {} had {} components, moved to labels {:?}",
            components.cluster,
            components.sizes.len(),
            &targets[1..],
        );
        report.clusters_split += 1;
    }

    report.labels_after = labels.label_count();
    (labels, report)
}

/// Label the connected components of one cluster and rank them by
/// size, descending, ties broken by first appearance in scan order.
fn components_of(
    labels: &LabelMap,
    cluster: u32,
    connectivity: imageproc::region_labelling::Connectivity,
) -> Components {
    let mask = GrayImage::from_fn(labels.width(), labels.height(), |x, y| {
        Luma([if labels.get(x, y) == cluster { 255 } else { 0 }])
    });
    let components = connected_components(&mask, connectivity, Luma([0u8]));

    let mut sizes: Vec<u64> = Vec::new();
    let mut first_seen: Vec<usize> = Vec::new();
    let mut members: Vec<(usize, usize)> = Vec::new();
    for (index, pixel) in components.pixels().enumerate() {
        let id = pixel[0];
        if id == 0 {
            continue;
        }
        let c = (id - 1) as usize;
        if c >= sizes.len() {
            sizes.resize(c + 1, 0);
            first_seen.resize(c + 1, usize::MAX);
        }
        sizes[c] += 1;
        first_seen[c] = first_seen[c].min(index);
        members.push((index, c));
    }

    let mut order: Vec<usize> = (0..sizes.len()).filter(|&c| sizes[c] > 0).collect();
    order.sort_by(|&a, &b| sizes[b].cmp(&sizes[a]).then(first_seen[a].cmp(&first_seen[b])));
    let mut rank_of = vec![0usize; sizes.len()];
    for (rank, &c) in order.iter().enumerate() {
        rank_of[c] = rank;
    }
    for member in &mut members {
        member.1 = rank_of[member.1];
    }

    Components {
        cluster,
        sizes: order.iter().map(|&c| sizes[c]).collect(),
        members,
    }
}

/// Decide where each ranked component goes.
///
/// Returns one slot per component: `0` keeps the original label, `s > 0`
/// moves the component to the `s`-th newly allocated label.
#[allow(clippy::cast_precision_loss)]
fn assign_slots(ranked_sizes: &[u64], params: &SplitParams) -> Vec<usize> {
    let n = ranked_sizes.len();
    let cap = params.max_regions_per_color.max(1) as usize;
    if n <= 1 {
        return vec![0; n];
    }

    if n > cap {
        return (0..n).map(|rank| rank.min(cap - 1)).collect();
    }

    let total: u64 = ranked_sizes.iter().sum();
    let threshold = params.significant_fraction * total as f64;
    let significant = ranked_sizes
        .iter()
        .take_while(|&&s| s as f64 > threshold)
        .count()
        .min(cap);
    (0..n)
        .map(|rank| if rank < significant { rank } else { 0 })
        .collect()
}
