//! Incremental pipeline: advance stage-by-stage, inspecting each
//! intermediate result before continuing.
//!
//! Unlike [`crate::process`] which runs the entire pipeline in one
//! call, [`Pipeline`] lets the caller drive execution one step at a time:
//!
//! ```rust
//! # use parallax_pipeline::{Pipeline, PipelineConfig, PipelineError};
//! # fn run(png: Vec<u8>) -> Result<(), PipelineError> {
//! let config = PipelineConfig::default();
//! let clustered = Pipeline::new(png, config)
//!     .load()?
//!     .partition(None)
//!     .cluster();
//! println!("{} regions", clustered.clustering().report.region_count);
//!
//! let result = clustered
//!     .split()
//!     .synthesize()
//!     .collect_statistics()
//!     .into_result();
//! # Ok(())
//! # }
//! ```
//!
//! Each stage method consumes `self` and returns the next pipeline state
//! (or `Result` for the fallible load stage), carrying the intermediates
//! later stages need. [`PipelineConfig::validate`] runs before anything
//! else, in [`Pending::load`].
//!
//! # Memory
//!
//! The working image is retained until [`Finished::into_result`] so
//! previews can be drawn at the end. The partition is shared through an
//! [`Arc`] with the cache, so a cache hit copies nothing.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{Partition, PartitionKey, PipelineCache};
use crate::cluster::{ClusterParams, Clustering};
use crate::diagnostics::{Clock, NoClock, StageMetrics};
use crate::preview::{self, Previews};
use crate::split::{SplitParams, SplitReport};
use crate::stats::StatisticsReport;
use crate::types::{
    Dimensions, LabelMap, Layer, PipelineConfig, PipelineError, PipelineResult, RgbImage,
    SplitMode,
};
use crate::{color, decode, superpixel};

/// Input held by a [`Pending`] pipeline.
enum Source {
    Bytes(Vec<u8>),
    Image(RgbImage),
    Raw {
        width: u32,
        height: u32,
        channels: u8,
        data: Vec<u8>,
    },
}

// ───────────────────────── Stage 0: Pending ──────────────────────────

/// Pipeline state before any processing has occurred.
///
/// Call [`load`](Self::load) to advance to the next stage.
#[must_use = "pipeline stages are consumed by advancing — call .load() to continue"]
pub struct Pending {
    config: PipelineConfig,
    source: Source,
}

impl Pending {
    /// The configuration this pipeline will run with.
    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Validate the configuration, decode the input and apply the
    /// optional canonical resize.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] for a bad configuration,
    /// [`PipelineError::EmptyInput`] for empty bytes,
    /// [`PipelineError::ImageDecode`] for undecodable bytes and
    /// [`PipelineError::EmptyImage`] for a zero-sized image, and
    /// [`PipelineError::UnsupportedChannels`] or
    /// [`PipelineError::BufferSize`] for a malformed raw buffer.
    pub fn load(self) -> Result<Loaded, PipelineError> {
        self.config.validate()?;
        let (image, input_bytes) = match self.source {
            Source::Bytes(bytes) => (decode::decode(&bytes)?, bytes.len()),
            Source::Image(image) => {
                decode::check_dimensions(&image)?;
                (image, 0)
            }
            Source::Raw {
                width,
                height,
                channels,
                data,
            } => {
                let len = data.len();
                (decode::from_raw(width, height, channels, data)?, len)
            }
        };
        let (image, resized) = match self.config.canonical_size {
            Some(size) => decode::resize_to_canonical(image, size),
            None => (image, false),
        };
        log::debug!(
            "load: {}x{} from {input_bytes} bytes{}",
            image.width(),
            image.height(),
            if resized { " (resized)" } else { "" },
        );
        Ok(Loaded {
            config: self.config,
            image,
            input_bytes,
            resized,
        })
    }
}

// ───────────────────────── Stage 1: Loaded ───────────────────────────

/// Pipeline state after decoding.
///
/// Call [`partition`](Self::partition) to advance to the next stage.
#[must_use = "pipeline stages are consumed by advancing — call .partition() to continue"]
pub struct Loaded {
    config: PipelineConfig,
    image: RgbImage,
    input_bytes: usize,
    resized: bool,
}

impl Loaded {
    /// The working RGB image.
    #[must_use]
    pub const fn image(&self) -> &RgbImage {
        &self.image
    }

    /// Working image dimensions.
    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        Dimensions::of(&self.image)
    }

    /// Metrics for the load stage.
    #[must_use]
    pub fn metrics(&self) -> StageMetrics {
        StageMetrics::Load {
            input_bytes: self.input_bytes,
            width: self.image.width(),
            height: self.image.height(),
            resized: self.resized,
        }
    }

    /// Partition the image into superpixels and extract region features,
    /// reusing the cached partition when `cache` holds a matching entry.
    pub fn partition(self, cache: Option<&PipelineCache>) -> Partitioned {
        self.partition_timed(cache, &NoClock)
    }

    /// [`partition`](Self::partition), timing the partition and feature
    /// steps separately.
    pub(crate) fn partition_timed<C: Clock>(
        self,
        cache: Option<&PipelineCache>,
        clock: &C,
    ) -> Partitioned {
        let mut partition_duration = Duration::ZERO;
        let mut features_duration = Duration::ZERO;
        let start = clock.now();

        let image = &self.image;
        let config = &self.config;
        let mut compute = || -> Result<Partition, Infallible> {
            let smoothed = crate::blur::smooth_rgb(image, config.smoothing_sigma);
            let superpixels = superpixel::partition(
                &smoothed,
                config.segment_target,
                config.compactness,
                config.slic_iterations,
            );
            log::debug!(
                "partition: {} seeds at step {:.2} -> {} regions",
                superpixels.seed_count,
                superpixels.step,
                superpixels.regions.label_count(),
            );
            partition_duration = clock.elapsed(&start);

            let features_start = clock.now();
            let features = crate::features::region_means(image, &superpixels.regions);
            features_duration = clock.elapsed(&features_start);
            Ok(Partition {
                regions: superpixels.regions,
                features,
            })
        };

        let (partition, cache_hit) = match cache {
            Some(cache) => {
                let key = PartitionKey::new(image, config);
                let Ok(found) = cache.get_or_compute(&key, compute);
                found
            }
            None => {
                let Ok(partition) = compute();
                (Arc::new(partition), false)
            }
        };
        if cache_hit {
            partition_duration = clock.elapsed(&start);
        }

        Partitioned {
            config: self.config,
            image: self.image,
            partition,
            cache_hit,
            partition_duration,
            features_duration,
        }
    }
}

// ───────────────────────── Stage 2: Partitioned ──────────────────────

/// Pipeline state after superpixel partitioning and feature extraction.
///
/// Call [`cluster`](Self::cluster) to advance to the next stage.
#[must_use = "pipeline stages are consumed by advancing — call .cluster() to continue"]
pub struct Partitioned {
    config: PipelineConfig,
    image: RgbImage,
    partition: Arc<Partition>,
    cache_hit: bool,
    partition_duration: Duration,
    features_duration: Duration,
}

impl Partitioned {
    /// The superpixel label map.
    #[must_use]
    pub fn regions(&self) -> &LabelMap {
        &self.partition.regions
    }

    /// Mean CIELAB color of each region.
    #[must_use]
    pub fn features(&self) -> &[color::LabColor] {
        &self.partition.features
    }

    /// The shared partition, as stored in the cache.
    #[must_use]
    pub fn partition(&self) -> &Arc<Partition> {
        &self.partition
    }

    /// Whether the partition came from the cache.
    #[must_use]
    pub const fn cache_hit(&self) -> bool {
        self.cache_hit
    }

    /// Metrics for the partition stage.
    #[must_use]
    pub fn metrics(&self) -> StageMetrics {
        StageMetrics::Partition {
            segment_target: self.config.segment_target,
            compactness: self.config.compactness,
            region_count: self.partition.regions.label_count(),
            cache_hit: self.cache_hit,
        }
    }

    /// Metrics for the feature extraction stage.
    #[must_use]
    pub fn features_metrics(&self) -> StageMetrics {
        StageMetrics::Features {
            region_count: self.partition.features.len(),
        }
    }

    pub(crate) const fn durations(&self) -> (Duration, Duration) {
        (self.partition_duration, self.features_duration)
    }

    /// Cluster region features and map clusters back to pixels.
    pub fn cluster(self) -> Clustered {
        let clustering =
            crate::cluster::cluster(&self.partition.features, &ClusterParams::from(&self.config));
        let labels = clustering.pixel_labels(&self.partition.regions);
        let cluster_colors = clustering
            .centroids
            .iter()
            .map(|&c| color::lab_to_srgb(c))
            .collect();
        Clustered {
            config: self.config,
            image: self.image,
            partition: self.partition,
            clustering,
            cluster_colors,
            labels,
        }
    }
}

// ───────────────────────── Stage 3: Clustered ────────────────────────

/// Pipeline state after k-means clustering.
///
/// Call [`split`](Self::split) to advance to the next stage.
#[must_use = "pipeline stages are consumed by advancing — call .split() to continue"]
pub struct Clustered {
    config: PipelineConfig,
    image: RgbImage,
    partition: Arc<Partition>,
    clustering: Clustering,
    cluster_colors: Vec<[u8; 3]>,
    labels: LabelMap,
}

impl Clustered {
    /// Cluster assignment, display centroids and convergence report.
    #[must_use]
    pub const fn clustering(&self) -> &Clustering {
        &self.clustering
    }

    /// Per-pixel cluster labels.
    #[must_use]
    pub const fn labels(&self) -> &LabelMap {
        &self.labels
    }

    /// Display color of each cluster.
    #[must_use]
    pub fn cluster_colors(&self) -> &[[u8; 3]] {
        &self.cluster_colors
    }

    /// Metrics for the clustering stage.
    #[must_use]
    pub fn metrics(&self) -> StageMetrics {
        StageMetrics::Clustering(self.clustering.report.clone())
    }

    /// Split spatially disjoint clusters (a pass-through when
    /// `split_mode` is off).
    pub fn split(self) -> Split {
        let cluster_labels = self.config.visualize.then(|| self.labels.clone());
        let (labels, report) = if self.config.split_mode == SplitMode::Off {
            (self.labels, None)
        } else {
            let (labels, report) =
                crate::split::split(self.labels, &SplitParams::from(&self.config));
            (labels, Some(report))
        };
        Split {
            config: self.config,
            image: self.image,
            partition: self.partition,
            cluster_colors: self.cluster_colors,
            cluster_labels,
            labels,
            report,
        }
    }
}

// ───────────────────────── Stage 4: Split ────────────────────────────

/// Pipeline state after spatial splitting.
///
/// Call [`synthesize`](Self::synthesize) to advance to the next stage.
#[must_use = "pipeline stages are consumed by advancing — call .synthesize() to continue"]
pub struct Split {
    config: PipelineConfig,
    image: RgbImage,
    partition: Arc<Partition>,
    cluster_colors: Vec<[u8; 3]>,
    cluster_labels: Option<LabelMap>,
    labels: LabelMap,
    report: Option<SplitReport>,
}

impl Split {
    /// Final per-pixel labels.
    #[must_use]
    pub const fn labels(&self) -> &LabelMap {
        &self.labels
    }

    /// Splitter report, or `None` when splitting was disabled.
    #[must_use]
    pub const fn report(&self) -> Option<&SplitReport> {
        self.report.as_ref()
    }

    /// Metrics for the split stage, or `None` when it did not run.
    #[must_use]
    pub fn metrics(&self) -> Option<StageMetrics> {
        self.report.map(StageMetrics::Split)
    }

    /// Build one RGBA layer per label.
    pub fn synthesize(self) -> Synthesized {
        let layers = crate::layers::synthesize(
            &self.image,
            &self.labels,
            self.config.edge_mode,
            self.config.soft_edge_sigma,
        );
        log::debug!(
            "layers: {} {} layers, {} empty",
            layers.len(),
            self.config.edge_mode,
            layers.iter().filter(|l| l.is_empty()).count(),
        );
        Synthesized {
            config: self.config,
            image: self.image,
            partition: self.partition,
            cluster_colors: self.cluster_colors,
            cluster_labels: self.cluster_labels,
            label_count: self.labels.label_count(),
            layers,
        }
    }
}

// ───────────────────────── Stage 5: Synthesized ──────────────────────

/// Pipeline state after layer synthesis.
///
/// Call [`collect_statistics`](Self::collect_statistics) to advance to
/// the final stage.
#[must_use = "pipeline stages are consumed by advancing — call .collect_statistics() to continue"]
pub struct Synthesized {
    config: PipelineConfig,
    image: RgbImage,
    partition: Arc<Partition>,
    cluster_colors: Vec<[u8; 3]>,
    cluster_labels: Option<LabelMap>,
    label_count: u32,
    layers: Vec<Layer>,
}

impl Synthesized {
    /// The ordered layers.
    #[must_use]
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Metrics for the layer stage.
    #[must_use]
    pub fn metrics(&self) -> StageMetrics {
        StageMetrics::Layers {
            edge_mode: self.config.edge_mode,
            layer_count: self.layers.len(),
            empty_layers: self.layers.iter().filter(|l| l.is_empty()).count(),
        }
    }

    /// Compute per-layer statistics.
    pub fn collect_statistics(self) -> Finished {
        let statistics = crate::stats::collect(&self.layers, self.config.visible_alpha);
        Finished {
            config: self.config,
            image: self.image,
            partition: self.partition,
            cluster_colors: self.cluster_colors,
            cluster_labels: self.cluster_labels,
            label_count: self.label_count,
            layers: self.layers,
            statistics,
        }
    }
}

// ───────────────────────── Stage 6: Finished ─────────────────────────

/// Pipeline state after statistics, the final stage.
///
/// Call [`into_result`](Self::into_result) to extract the
/// [`PipelineResult`].
#[must_use = "call .into_result() to extract the PipelineResult"]
pub struct Finished {
    config: PipelineConfig,
    image: RgbImage,
    partition: Arc<Partition>,
    cluster_colors: Vec<[u8; 3]>,
    cluster_labels: Option<LabelMap>,
    label_count: u32,
    layers: Vec<Layer>,
    statistics: StatisticsReport,
}

impl Finished {
    /// Per-layer statistics.
    #[must_use]
    pub const fn statistics(&self) -> &StatisticsReport {
        &self.statistics
    }

    /// Metrics for the statistics stage.
    #[must_use]
    pub fn metrics(&self) -> StageMetrics {
        StageMetrics::Statistics {
            visible_layers: self
                .statistics
                .layers
                .iter()
                .filter(|l| l.pixel_count > 0)
                .count(),
            total_percentage: self.statistics.total_percentage(),
        }
    }

    /// Consume the pipeline, drawing previews when requested.
    #[must_use]
    pub fn into_result(self) -> PipelineResult {
        let previews = self.cluster_labels.as_ref().map(|cluster_labels| Previews {
            boundaries: preview::mark_boundaries(&self.image, &self.partition.regions),
            regions: preview::region_colors(&self.partition.regions, &self.partition.features),
            clusters: preview::cluster_colors(cluster_labels, &self.cluster_colors),
            reconstruction: preview::reconstruct_all(&self.layers),
        });
        debug_assert_eq!(previews.is_some(), self.config.visualize);
        PipelineResult {
            dimensions: Dimensions::of(&self.image),
            region_count: self.partition.regions.label_count(),
            label_count: self.label_count,
            cluster_colors: self.cluster_colors,
            layers: self.layers,
            statistics: self.statistics,
            previews,
        }
    }
}

// ───────────────────────── Entry point ───────────────────────────────

/// Entry point for the staged API.
pub struct Pipeline;

impl Pipeline {
    /// Create a new pipeline from encoded image bytes and config.
    ///
    /// No processing is performed until [`.load()`](Pending::load).
    #[allow(clippy::new_ret_no_self)]
    pub const fn new(image_bytes: Vec<u8>, config: PipelineConfig) -> Pending {
        Pending {
            config,
            source: Source::Bytes(image_bytes),
        }
    }

    /// Create a new pipeline from an already-decoded RGB image.
    pub const fn from_image(image: RgbImage, config: PipelineConfig) -> Pending {
        Pending {
            config,
            source: Source::Image(image),
        }
    }

    /// Create a new pipeline from an uncompressed row-major RGB (3
    /// channels) or RGBA (4 channels) pixel buffer.
    pub const fn from_raw(
        width: u32,
        height: u32,
        channels: u8,
        data: Vec<u8>,
        config: PipelineConfig,
    ) -> Pending {
        Pending {
            config,
            source: Source::Raw {
                width,
                height,
                channels,
                data,
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::EdgeMode;

    fn two_blocks() -> RgbImage {
        RgbImage::from_fn(4, 2, |x, _| {
            if x < 2 {
                image::Rgb([255, 0, 0])
            } else {
                image::Rgb([0, 0, 255])
            }
        })
    }

    fn config() -> PipelineConfig {
        PipelineConfig {
            layer_count: 2,
            split_mode: SplitMode::Off,
            edge_mode: EdgeMode::Hard,
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn stages_expose_intermediates() {
        let loaded = Pipeline::from_image(two_blocks(), config()).load().unwrap();
        assert_eq!(loaded.dimensions().pixel_count(), 8);

        let partitioned = loaded.partition(None);
        assert!(!partitioned.cache_hit());
        assert_eq!(
            partitioned.features().len(),
            partitioned.regions().label_count() as usize
        );

        let clustered = partitioned.cluster();
        assert_eq!(clustered.labels().label_count(), 2);
        assert_eq!(clustered.cluster_colors().len(), 2);

        let split = clustered.split();
        assert!(split.report().is_none());
        assert!(split.metrics().is_none());

        let synthesized = split.synthesize();
        assert_eq!(synthesized.layers().len(), 2);

        let finished = synthesized.collect_statistics();
        assert_eq!(finished.statistics().layer_count, 2);
        let result = finished.into_result();
        assert!(result.previews.is_none());
    }

    #[test]
    fn invalid_config_fails_at_load() {
        let bad = PipelineConfig {
            layer_count: 0,
            ..config()
        };
        let err = Pipeline::from_image(two_blocks(), bad).load().err().unwrap();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
    }

    #[test]
    fn empty_bytes_fail_at_load() {
        let err = Pipeline::new(Vec::new(), config()).load().err().unwrap();
        assert!(matches!(err, PipelineError::EmptyInput));
    }

    #[test]
    fn raw_buffer_loads() {
        let data = [255, 0, 0, 0, 0, 255].repeat(4);
        let loaded = Pipeline::from_raw(2, 4, 3, data, config()).load().unwrap();
        assert_eq!(loaded.image().get_pixel(1, 3).0, [0, 0, 255]);
        assert!(matches!(
            loaded.metrics(),
            StageMetrics::Load {
                input_bytes: 24,
                ..
            }
        ));
    }

    #[test]
    fn malformed_raw_buffer_fails_at_load() {
        let err = Pipeline::from_raw(2, 2, 2, vec![0; 8], config())
            .load()
            .err()
            .unwrap();
        assert!(matches!(err, PipelineError::UnsupportedChannels(2)));

        let err = Pipeline::from_raw(2, 2, 4, vec![0; 15], config())
            .load()
            .err()
            .unwrap();
        assert!(matches!(
            err,
            PipelineError::BufferSize {
                expected: 16,
                actual: 15
            }
        ));
    }

    #[test]
    fn canonical_resize_applies() {
        let cfg = PipelineConfig {
            canonical_size: Some(8),
            ..config()
        };
        let loaded = Pipeline::from_image(two_blocks(), cfg).load().unwrap();
        assert_eq!(loaded.image().dimensions(), (8, 8));
        assert!(matches!(loaded.metrics(), StageMetrics::Load { resized: true, .. }));
    }

    #[test]
    fn cache_hit_reuses_partition() {
        let cache = PipelineCache::new();
        let first = Pipeline::from_image(two_blocks(), config())
            .load()
            .unwrap()
            .partition(Some(&cache));
        let second = Pipeline::from_image(two_blocks(), config())
            .load()
            .unwrap()
            .partition(Some(&cache));
        assert!(!first.cache_hit());
        assert!(second.cache_hit());
        assert!(Arc::ptr_eq(first.partition(), second.partition()));
    }

    #[test]
    fn visualize_attaches_previews() {
        let cfg = PipelineConfig {
            visualize: true,
            ..config()
        };
        let result = Pipeline::from_image(two_blocks(), cfg)
            .load()
            .unwrap()
            .partition(None)
            .cluster()
            .split()
            .synthesize()
            .collect_statistics()
            .into_result();
        let previews = result.previews.unwrap();
        assert_eq!(previews.boundaries.dimensions(), (4, 2));
        assert_eq!(previews.reconstruction.dimensions(), (4, 2));
        let red = previews.clusters.get_pixel(0, 0);
        assert!(red[0] > 250 && red[2] < 5, "{red:?}");
    }
}
