//! parallax-pipeline: decompose an icon into ordered RGBA layers (sans-IO).
//!
//! The pipeline runs:
//! decode -> superpixel partition -> region features -> k-means color
//! clustering -> spatial splitting -> layer synthesis -> statistics.
//!
//! Partition and features depend only on the image and the partition
//! parameters, so a [`PipelineCache`] can carry them across runs that
//! only change clustering or edge settings.
//!
//! This crate has **no I/O dependencies** -- it operates on in-memory
//! byte slices and images and returns structured data. Writing layers
//! to disk lives in `parallax-bench`.

pub mod blur;
pub mod cache;
pub mod cluster;
pub mod color;
pub mod decode;
pub mod diagnostics;
pub mod features;
pub mod layers;
pub mod pipeline;
pub mod preview;
pub mod split;
pub mod stats;
pub mod superpixel;
pub mod types;

pub use cache::{Partition, PipelineCache};
pub use diagnostics::{Clock, PipelineDiagnostics};
pub use pipeline::Pipeline;
pub use preview::Previews;
pub use stats::{LayerStatistics, StatisticsReport};
pub use types::{
    Adjacency, Dimensions, EdgeMode, LabelMap, Layer, PipelineConfig, PipelineError,
    PipelineResult, RgbImage, SplitMode,
};

use diagnostics::{NoClock, PipelineSummary, StageDiagnostics};
use pipeline::Pending;

/// Run the full decomposition on encoded image bytes.
///
/// Takes raw image bytes (PNG, JPEG, BMP, WebP), a configuration and an
/// optional partition cache, and produces the ordered layers with their
/// statistics.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidConfig`] if `config` fails
/// validation, [`PipelineError::EmptyInput`] if `image_bytes` is empty,
/// [`PipelineError::ImageDecode`] if the image cannot be decoded, and
/// [`PipelineError::EmptyImage`] if it has no pixels.
pub fn process(
    image_bytes: &[u8],
    config: &PipelineConfig,
    cache: Option<&PipelineCache>,
) -> Result<PipelineResult, PipelineError> {
    let pending = Pipeline::new(image_bytes.to_vec(), config.clone());
    run(pending, cache, &NoClock).map(|(result, _)| result)
}

/// Run the full decomposition on an already-decoded RGB image.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidConfig`] if `config` fails
/// validation and [`PipelineError::EmptyImage`] if `image` has no
/// pixels.
pub fn process_image(
    image: RgbImage,
    config: &PipelineConfig,
    cache: Option<&PipelineCache>,
) -> Result<PipelineResult, PipelineError> {
    let pending = Pipeline::from_image(image, config.clone());
    run(pending, cache, &NoClock).map(|(result, _)| result)
}

/// Run the full decomposition on an uncompressed RGB or RGBA pixel
/// buffer.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidConfig`] if `config` fails
/// validation, [`PipelineError::EmptyImage`] for a zero dimension,
/// [`PipelineError::UnsupportedChannels`] unless `channels` is 3 or 4,
/// and [`PipelineError::BufferSize`] if `data` has the wrong length.
pub fn process_raw(
    width: u32,
    height: u32,
    channels: u8,
    data: Vec<u8>,
    config: &PipelineConfig,
    cache: Option<&PipelineCache>,
) -> Result<PipelineResult, PipelineError> {
    let pending = Pipeline::from_raw(width, height, channels, data, config.clone());
    run(pending, cache, &NoClock).map(|(result, _)| result)
}

/// Run the full decomposition and collect per-stage diagnostics.
///
/// # Errors
///
/// Same as [`process`].
pub fn process_with_diagnostics<C: Clock>(
    image_bytes: &[u8],
    config: &PipelineConfig,
    cache: Option<&PipelineCache>,
    clock: &C,
) -> Result<(PipelineResult, PipelineDiagnostics), PipelineError> {
    let pending = Pipeline::new(image_bytes.to_vec(), config.clone());
    run(pending, cache, clock)
}

/// Drive every stage, timing each one with `clock`.
fn run<C: Clock>(
    pending: Pending,
    cache: Option<&PipelineCache>,
    clock: &C,
) -> Result<(PipelineResult, PipelineDiagnostics), PipelineError> {
    let total_start = clock.now();
    let cluster_count = pending.config().layer_count;

    let start = clock.now();
    let loaded = pending.load()?;
    let load = StageDiagnostics {
        duration: clock.elapsed(&start),
        metrics: loaded.metrics(),
    };

    let partitioned = loaded.partition_timed(cache, clock);
    let (partition_duration, features_duration) = partitioned.durations();
    let partition = StageDiagnostics {
        duration: partition_duration,
        metrics: partitioned.metrics(),
    };
    let features = StageDiagnostics {
        duration: features_duration,
        metrics: partitioned.features_metrics(),
    };
    let cache_hit = partitioned.cache_hit();

    let start = clock.now();
    let clustered = partitioned.cluster();
    let clustering = StageDiagnostics {
        duration: clock.elapsed(&start),
        metrics: clustered.metrics(),
    };

    let start = clock.now();
    let split_stage = clustered.split();
    let split_duration = clock.elapsed(&start);
    let split = split_stage.metrics().map(|metrics| StageDiagnostics {
        duration: split_duration,
        metrics,
    });

    let start = clock.now();
    let synthesized = split_stage.synthesize();
    let layers = StageDiagnostics {
        duration: clock.elapsed(&start),
        metrics: synthesized.metrics(),
    };

    let start = clock.now();
    let finished = synthesized.collect_statistics();
    let statistics = StageDiagnostics {
        duration: clock.elapsed(&start),
        metrics: finished.metrics(),
    };

    let result = finished.into_result();
    let summary = PipelineSummary {
        image_width: result.dimensions.width,
        image_height: result.dimensions.height,
        pixel_count: result.dimensions.pixel_count() as u64,
        region_count: result.region_count,
        cluster_count,
        label_count: result.label_count,
        cache_hit,
    };
    log::info!(
        "decomposed {}x{} image: {} regions, {} clusters, {} layers{}",
        summary.image_width,
        summary.image_height,
        summary.region_count,
        summary.cluster_count,
        result.layers.len(),
        if cache_hit { " (cached partition)" } else { "" },
    );

    let diagnostics = PipelineDiagnostics {
        load,
        partition,
        features,
        clustering,
        split,
        layers,
        statistics,
        total_duration: clock.elapsed(&total_start),
        summary,
    };
    Ok((result, diagnostics))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::cell::Cell;
    use std::time::Duration;

    use super::*;

    /// Encode an RGB image as PNG bytes.
    fn png(img: &RgbImage) -> Vec<u8> {
        let mut buf = Vec::new();
        let encoder = image::codecs::png::PngEncoder::new(&mut buf);
        image::ImageEncoder::write_image(
            encoder,
            img.as_raw(),
            img.width(),
            img.height(),
            image::ExtendedColorType::Rgb8,
        )
        .unwrap();
        buf
    }

    /// Clock that advances one millisecond per reading.
    struct TickClock(Cell<u64>);

    impl Clock for TickClock {
        type Instant = u64;

        fn now(&self) -> u64 {
            let t = self.0.get() + 1;
            self.0.set(t);
            t
        }

        fn elapsed(&self, since: &u64) -> Duration {
            Duration::from_millis(self.now() - since)
        }
    }

    fn stripes() -> RgbImage {
        RgbImage::from_fn(12, 12, |x, _| match x / 4 {
            0 => image::Rgb([230, 30, 30]),
            1 => image::Rgb([30, 200, 60]),
            _ => image::Rgb([20, 40, 220]),
        })
    }

    #[test]
    fn process_empty_input() {
        let result = process(&[], &PipelineConfig::default(), None);
        assert!(matches!(result, Err(PipelineError::EmptyInput)));
    }

    #[test]
    fn process_corrupt_input() {
        let result = process(&[0xFF, 0x00], &PipelineConfig::default(), None);
        assert!(matches!(result, Err(PipelineError::ImageDecode(_))));
    }

    #[test]
    fn process_rejects_invalid_config_before_decoding() {
        let config = PipelineConfig {
            max_regions_per_color: 0,
            ..PipelineConfig::default()
        };
        // Empty input would be an input error; the parameter error wins.
        let result = process(&[], &config, None);
        assert!(matches!(result, Err(PipelineError::InvalidConfig(_))));
    }

    #[test]
    fn process_matches_process_image() {
        let config = PipelineConfig {
            layer_count: 3,
            ..PipelineConfig::default()
        };
        let from_bytes = process(&png(&stripes()), &config, None).unwrap();
        let from_image = process_image(stripes(), &config, None).unwrap();
        assert_eq!(from_bytes.statistics, from_image.statistics);
        assert_eq!(from_bytes.cluster_colors, from_image.cluster_colors);
    }

    #[test]
    fn diagnostics_cover_every_stage() {
        let config = PipelineConfig {
            layer_count: 3,
            ..PipelineConfig::default()
        };
        let clock = TickClock(Cell::new(0));
        let (result, diag) =
            process_with_diagnostics(&png(&stripes()), &config, None, &clock).unwrap();
        assert_eq!(diag.summary.image_width, 12);
        assert_eq!(diag.summary.cluster_count, 3);
        assert_eq!(diag.summary.label_count, result.label_count);
        assert!(diag.split.is_some());
        assert!(!diag.summary.cache_hit);
        assert!(diag.total_duration >= diag.load.duration);
        assert!(diag.clustering.duration > Duration::ZERO);
    }

    #[test]
    fn split_off_skips_split_diagnostics() {
        let config = PipelineConfig {
            layer_count: 3,
            split_mode: SplitMode::Off,
            ..PipelineConfig::default()
        };
        let clock = TickClock(Cell::new(0));
        let (_, diag) = process_with_diagnostics(&png(&stripes()), &config, None, &clock).unwrap();
        assert!(diag.split.is_none());
    }

    #[test]
    fn cache_hit_is_reported() {
        let cache = PipelineCache::new();
        let config = PipelineConfig {
            layer_count: 3,
            ..PipelineConfig::default()
        };
        let clock = TickClock(Cell::new(0));
        let bytes = png(&stripes());
        let (_, first) = process_with_diagnostics(&bytes, &config, Some(&cache), &clock).unwrap();
        let (_, second) = process_with_diagnostics(&bytes, &config, Some(&cache), &clock).unwrap();
        assert!(!first.summary.cache_hit);
        assert!(second.summary.cache_hit);
        assert!(second.features.duration.is_zero());
    }

    #[test]
    fn process_raw_matches_process_image() {
        let config = PipelineConfig {
            layer_count: 3,
            ..PipelineConfig::default()
        };
        let img = stripes();
        let from_raw = process_raw(12, 12, 3, img.as_raw().clone(), &config, None).unwrap();
        let from_image = process_image(img, &config, None).unwrap();
        assert_eq!(from_raw.statistics, from_image.statistics);
    }

    #[test]
    fn process_raw_rejects_short_buffer() {
        let result = process_raw(4, 4, 4, vec![0; 10], &PipelineConfig::default(), None);
        assert!(matches!(
            result,
            Err(PipelineError::BufferSize {
                expected: 64,
                actual: 10
            })
        ));
    }

    #[test]
    fn three_stripes_give_three_layers() {
        let config = PipelineConfig {
            layer_count: 3,
            edge_mode: EdgeMode::Hard,
            ..PipelineConfig::default()
        };
        let result = process_image(stripes(), &config, None).unwrap();
        assert_eq!(result.layers.len(), 3);
        for stats in &result.statistics.layers {
            assert_eq!(stats.pixel_count, 48);
        }
    }
}
