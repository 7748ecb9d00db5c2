//! Pipeline diagnostics: timing, counts, and other metrics for each stage.
//!
//! These diagnostics are permanent instrumentation intended for
//! parameter tuning. [`process_with_diagnostics`](crate::process_with_diagnostics)
//! collects them alongside the pipeline result.
//!
//! The pipeline crate performs no I/O, so time is read through an
//! injected [`Clock`]. Durations are serialized as fractional seconds
//! (`f64`) for JSON compatibility, since `std::time::Duration` does not
//! implement serde traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cluster::ClusterReport;
use crate::split::SplitReport;
use crate::types::EdgeMode;

/// Source of monotonic time for stage measurements.
pub trait Clock {
    /// Opaque point in time.
    type Instant;

    /// The current instant.
    fn now(&self) -> Self::Instant;

    /// Time elapsed since `since`.
    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

/// Clock that never advances, for runs that do not collect timings.
pub(crate) struct NoClock;

impl Clock for NoClock {
    type Instant = ();

    fn now(&self) {}

    fn elapsed(&self, _since: &()) -> Duration {
        Duration::ZERO
    }
}

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Diagnostics collected from a single pipeline run.
///
/// The split stage is `None` when splitting is disabled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDiagnostics {
    /// Stage 0: decoding and optional resize.
    pub load: StageDiagnostics,
    /// Stage 1: smoothing and superpixel partitioning.
    pub partition: StageDiagnostics,
    /// Stage 2: region feature extraction.
    pub features: StageDiagnostics,
    /// Stage 3: k-means clustering.
    pub clustering: StageDiagnostics,
    /// Stage 4: spatial splitting (only when `split_mode != off`).
    pub split: Option<StageDiagnostics>,
    /// Stage 5: layer synthesis.
    pub layers: StageDiagnostics,
    /// Stage 6: statistics collection.
    pub statistics: StageDiagnostics,
    /// Total wall-clock duration of the entire pipeline (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    /// Summary counts across all stages.
    pub summary: PipelineSummary,
}

/// Diagnostics for a single pipeline stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Wall-clock duration of this stage (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Stage-specific metrics.
    pub metrics: StageMetrics,
}

/// Stage-specific metrics that vary by pipeline stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StageMetrics {
    /// Decoding metrics.
    Load {
        /// Size of the input image bytes (0 for pre-decoded input).
        input_bytes: usize,
        /// Working image width in pixels.
        width: u32,
        /// Working image height in pixels.
        height: u32,
        /// Whether the image was resized to the canonical size.
        resized: bool,
    },
    /// Superpixel partitioning metrics.
    Partition {
        /// Requested superpixel count.
        segment_target: u32,
        /// Compactness used.
        compactness: f32,
        /// Regions produced.
        region_count: u32,
        /// Whether the partition came from the cache.
        cache_hit: bool,
    },
    /// Feature extraction metrics.
    Features {
        /// Number of feature vectors.
        region_count: usize,
    },
    /// Clustering metrics.
    Clustering(ClusterReport),
    /// Spatial splitting metrics.
    Split(SplitReport),
    /// Layer synthesis metrics.
    Layers {
        /// Edge treatment used.
        edge_mode: EdgeMode,
        /// Number of layers emitted.
        layer_count: usize,
        /// Layers without any pixel.
        empty_layers: usize,
    },
    /// Statistics metrics.
    Statistics {
        /// Layers with at least one visible pixel.
        visible_layers: usize,
        /// Sum of all layer percentages.
        total_percentage: f64,
    },
}

/// High-level summary counts for the entire pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSummary {
    /// Working image width in pixels.
    pub image_width: u32,
    /// Working image height in pixels.
    pub image_height: u32,
    /// Total pixel count.
    pub pixel_count: u64,
    /// Number of superpixel regions.
    pub region_count: u32,
    /// Requested number of color clusters.
    pub cluster_count: u32,
    /// Final label space size.
    pub label_count: u32,
    /// Whether the partition came from the cache.
    pub cache_hit: bool,
}

impl PipelineDiagnostics {
    /// Stages in pipeline order, skipping those that did not run.
    #[must_use]
    pub fn stages(&self) -> Vec<(&'static str, &StageDiagnostics)> {
        let mut s = vec![
            ("Load", &self.load),
            ("Partition", &self.partition),
            ("Features", &self.features),
            ("Clustering", &self.clustering),
        ];
        if let Some(ref split) = self.split {
            s.push(("Split", split));
        }
        s.push(("Layers", &self.layers));
        s.push(("Statistics", &self.statistics));
        s
    }

    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Pipeline Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Image: {}x{} ({} pixels)",
            self.summary.image_width, self.summary.image_height, self.summary.pixel_count,
        ));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<24} {:>10} {:>10}  {}",
            "Stage", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(80));

        let total_ms = duration_ms(self.total_duration);
        for (name, diag) in self.stages() {
            let ms = duration_ms(diag.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            let details = format_metrics(&diag.metrics);
            lines.push(format!("{name:<24} {ms:>8.3}ms {pct:>9.1}%  {details}"));
        }

        lines.push(String::new());
        lines.push(format!(
            "Regions: {}  |  Clusters: {}  |  Labels: {}  |  Cache: {}",
            self.summary.region_count,
            self.summary.cluster_count,
            self.summary.label_count,
            if self.summary.cache_hit { "hit" } else { "miss" },
        ));

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Format stage metrics into a compact detail string.
fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Load {
            input_bytes,
            width,
            height,
            resized,
        } => {
            let resized = if *resized { " (resized)" } else { "" };
            format!("{input_bytes} bytes -> {width}x{height}{resized}")
        }
        StageMetrics::Partition {
            segment_target,
            compactness,
            region_count,
            cache_hit,
        } => {
            let cached = if *cache_hit { " [cached]" } else { "" };
            format!(
                "target={segment_target} compactness={compactness:.1} regions={region_count}{cached}"
            )
        }
        StageMetrics::Features { region_count } => format!("{region_count} features"),
        StageMetrics::Clustering(report) => {
            let stop = if report.converged { "converged" } else { "cap" };
            format!(
                "k={} iters={} ({stop}) inertia={:.1} non_empty={}",
                report.requested, report.iterations, report.inertia, report.non_empty,
            )
        }
        StageMetrics::Split(report) => format!(
            "labels={}->{} split={} components={}",
            report.labels_before,
            report.labels_after,
            report.clusters_split,
            report.components_found,
        ),
        StageMetrics::Layers {
            edge_mode,
            layer_count,
            empty_layers,
        } => format!("{edge_mode} {layer_count} layers ({empty_layers} empty)"),
        StageMetrics::Statistics {
            visible_layers,
            total_percentage,
        } => format!("{visible_layers} visible, {total_percentage:.2}% covered"),
    }
}
