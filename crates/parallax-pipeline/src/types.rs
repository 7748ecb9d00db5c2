//! Shared types for the parallax layer decomposition pipeline.

use serde::{Deserialize, Serialize};

/// Re-export `RgbImage` so downstream crates can hand decoded images to
/// the pipeline without depending on `image` directly.
pub use image::RgbImage;

/// Re-export `RgbaImage` for 8-bit layer and preview rasters.
pub use image::RgbaImage;

/// Re-export `Rgba32FImage`, the storage type of every emitted layer.
pub use image::Rgba32FImage;

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Total number of pixels (`width * height`).
    #[must_use]
    pub const fn pixel_count(self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Dimensions of an existing image buffer.
    #[must_use]
    pub fn of<P: image::Pixel>(image: &image::ImageBuffer<P, Vec<P::Subpixel>>) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
        }
    }
}

/// A dense per-pixel label array.
///
/// The same type carries superpixel region ids, cluster ids and final
/// layer ids depending on the pipeline stage. Every value is strictly
/// below [`label_count`](Self::label_count); labels may be unused (an
/// empty cluster still occupies its slot in the label space).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelMap {
    dimensions: Dimensions,
    labels: Vec<u32>,
    label_count: u32,
}

impl LabelMap {
    /// Wrap a raw row-major label buffer.
    ///
    /// Returns `None` if the buffer length does not match the dimensions
    /// or any label is outside `0..label_count`.
    #[must_use]
    pub fn from_raw(dimensions: Dimensions, labels: Vec<u32>, label_count: u32) -> Option<Self> {
        if labels.len() != dimensions.pixel_count() {
            return None;
        }
        if labels.iter().any(|&l| l >= label_count) {
            return None;
        }
        Some(Self {
            dimensions,
            labels,
            label_count,
        })
    }

    /// Wrap a buffer the caller has already checked.
    pub(crate) fn from_parts(dimensions: Dimensions, labels: Vec<u32>, label_count: u32) -> Self {
        debug_assert_eq!(labels.len(), dimensions.pixel_count());
        debug_assert!(labels.iter().all(|&l| l < label_count));
        Self {
            dimensions,
            labels,
            label_count,
        }
    }

    /// Build a label map by evaluating `f` at every pixel.
    ///
    /// The label space is sized to one past the largest label produced.
    #[must_use]
    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> u32) -> Self {
        let mut labels = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                labels.push(f(x, y));
            }
        }
        let label_count = labels.iter().max().map_or(0, |&m| m + 1);
        Self {
            dimensions: Dimensions { width, height },
            labels,
            label_count,
        }
    }

    /// Image dimensions covered by this map.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    /// Width in pixels.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.dimensions.width
    }

    /// Height in pixels.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.dimensions.height
    }

    /// Size of the label space (one past the largest valid label).
    #[must_use]
    pub const fn label_count(&self) -> u32 {
        self.label_count
    }

    /// Row-major label values.
    #[must_use]
    pub fn as_slice(&self) -> &[u32] {
        &self.labels
    }

    /// Label at pixel `(x, y)`.
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> u32 {
        self.labels[self.index(x, y)]
    }

    /// Row-major index of pixel `(x, y)`.
    #[must_use]
    pub const fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.dimensions.width as usize + x as usize
    }

    /// Number of pixels carrying each label, indexed by label.
    #[must_use]
    pub fn pixel_counts(&self) -> Vec<u64> {
        let mut counts = vec![0u64; self.label_count as usize];
        for &l in &self.labels {
            counts[l as usize] += 1;
        }
        counts
    }

    /// Relabel every pixel through a lookup table.
    ///
    /// `table[old]` is the new label of every pixel labeled `old`; the
    /// result has a label space of `new_count`.
    ///
    /// Returns `None` if the table is shorter than the current label
    /// space or produces a label outside `0..new_count`.
    #[must_use]
    pub fn remap(&self, table: &[u32], new_count: u32) -> Option<Self> {
        if table.len() < self.label_count as usize {
            return None;
        }
        if table[..self.label_count as usize]
            .iter()
            .any(|&l| l >= new_count)
        {
            return None;
        }
        Some(Self {
            dimensions: self.dimensions,
            labels: self.labels.iter().map(|&l| table[l as usize]).collect(),
            label_count: new_count,
        })
    }

    /// Allocate a fresh label after the highest existing one.
    pub(crate) const fn allocate_label(&mut self) -> u32 {
        let label = self.label_count;
        self.label_count += 1;
        label
    }

    /// Overwrite the label at a row-major index.
    ///
    /// The caller guarantees `label < label_count`.
    pub(crate) fn set_index(&mut self, index: usize, label: u32) {
        debug_assert!(label < self.label_count, "label outside label space");
        self.labels[index] = label;
    }
}

/// Whether and how clusters are split into spatially separate layers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitMode {
    /// Leave the cluster label map unchanged.
    Off,
    /// Split clusters into connected components, capped per color, and
    /// split within-cap clusters only into significant fragments.
    #[default]
    Auto,
}

/// Edge treatment applied to layer masks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeMode {
    /// Binary alpha; color zero outside the mask.
    Hard,
    /// Blurred alpha with color sampled through a one-pixel dilation.
    #[default]
    Soft,
}

/// Pixel adjacency used for connected-component labeling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Adjacency {
    /// Edge-sharing neighbors only.
    #[default]
    Four,
    /// Edge- and corner-sharing neighbors.
    Eight,
}

impl Adjacency {
    pub(crate) const fn to_connectivity(self) -> imageproc::region_labelling::Connectivity {
        match self {
            Self::Four => imageproc::region_labelling::Connectivity::Four,
            Self::Eight => imageproc::region_labelling::Connectivity::Eight,
        }
    }
}

impl std::fmt::Display for SplitMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Off => f.write_str("off"),
            Self::Auto => f.write_str("auto"),
        }
    }
}

impl std::fmt::Display for EdgeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hard => f.write_str("hard"),
            Self::Soft => f.write_str("soft"),
        }
    }
}

/// Configuration for the layer decomposition pipeline.
///
/// All parameters have defaults matching the interactive tool the
/// pipeline was tuned in. Call [`validate`](Self::validate) (done by
/// every pipeline entry point) before running any stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Number of color clusters, i.e. layers before spatial splitting.
    pub layer_count: u32,

    /// Desired number of superpixels. The partitioner produces roughly
    /// this many regions.
    pub segment_target: u32,

    /// Superpixel shape regularity. Higher values give blockier regions,
    /// lower values follow color boundaries more closely.
    pub compactness: f32,

    /// Gaussian sigma of the smoothing pass before partitioning.
    /// Non-positive values disable smoothing.
    pub smoothing_sigma: f32,

    /// Number of superpixel refinement passes.
    pub slic_iterations: u32,

    /// Factor applied to CIELAB lightness before clustering, in `(0, 1]`.
    /// Lower values group shaded parts of one object together.
    pub lightness_weight: f32,

    /// Seed for k-means initialization.
    pub seed: u64,

    /// Number of independent k-means runs; the lowest inertia wins.
    pub restarts: u32,

    /// Iteration cap of a single k-means run.
    pub max_iterations: u32,

    /// Spatial splitting of disconnected clusters.
    pub split_mode: SplitMode,

    /// Maximum number of layers a single color cluster may become.
    pub max_regions_per_color: u32,

    /// In [`SplitMode::Auto`], a fragment is split off only if it holds
    /// more than this fraction of its cluster's pixels.
    pub significant_fraction: f64,

    /// Connectivity used to find disconnected fragments.
    pub adjacency: Adjacency,

    /// Layer edge treatment.
    pub edge_mode: EdgeMode,

    /// Gaussian sigma of the alpha blur in [`EdgeMode::Soft`].
    pub soft_edge_sigma: f32,

    /// Alpha above which a layer pixel counts as visible in statistics.
    pub visible_alpha: f32,

    /// Resize the input to a `size x size` square before processing.
    pub canonical_size: Option<u32>,

    /// Identity of the input for the partition cache. When `None`, a
    /// hash of the pixel data is used.
    pub cache_key: Option<String>,

    /// Attach diagnostic preview rasters to the result.
    pub visualize: bool,
}

impl PipelineConfig {
    /// Default number of color clusters.
    pub const DEFAULT_LAYER_COUNT: u32 = 6;
    /// Default superpixel target.
    pub const DEFAULT_SEGMENT_TARGET: u32 = 800;
    /// Default superpixel compactness.
    pub const DEFAULT_COMPACTNESS: f32 = 25.0;
    /// Default pre-partition smoothing sigma.
    pub const DEFAULT_SMOOTHING_SIGMA: f32 = 1.0;
    /// Default number of superpixel refinement passes.
    pub const DEFAULT_SLIC_ITERATIONS: u32 = 10;
    /// Default lightness weight.
    pub const DEFAULT_LIGHTNESS_WEIGHT: f32 = 0.65;
    /// Default k-means seed.
    pub const DEFAULT_SEED: u64 = 42;
    /// Default number of k-means restarts.
    pub const DEFAULT_RESTARTS: u32 = 10;
    /// Default k-means iteration cap.
    pub const DEFAULT_MAX_ITERATIONS: u32 = 300;
    /// Default per-color region cap.
    pub const DEFAULT_MAX_REGIONS_PER_COLOR: u32 = 2;
    /// Default significant-fragment fraction.
    pub const DEFAULT_SIGNIFICANT_FRACTION: f64 = 0.05;
    /// Default soft-edge alpha blur sigma.
    pub const DEFAULT_SOFT_EDGE_SIGMA: f32 = 0.8;
    /// Default statistics visibility threshold.
    pub const DEFAULT_VISIBLE_ALPHA: f32 = 0.01;
    /// Canonical icon edge length.
    pub const CANONICAL_SIZE: u32 = 1024;

    /// Check every parameter before any computation starts.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] naming the first
    /// offending parameter.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let fail = |msg: &str| Err(PipelineError::InvalidConfig(msg.to_string()));
        if self.layer_count == 0 {
            return fail("layer_count must be at least 1");
        }
        if self.segment_target == 0 {
            return fail("segment_target must be at least 1");
        }
        if self.max_regions_per_color == 0 {
            return fail("max_regions_per_color must be at least 1");
        }
        if !self.compactness.is_finite() || self.compactness < 0.0 {
            return fail("compactness must be finite and non-negative");
        }
        if !self.smoothing_sigma.is_finite() {
            return fail("smoothing_sigma must be finite");
        }
        if self.slic_iterations == 0 {
            return fail("slic_iterations must be at least 1");
        }
        if !(self.lightness_weight > 0.0 && self.lightness_weight <= 1.0) {
            return fail("lightness_weight must be in (0, 1]");
        }
        if self.restarts == 0 {
            return fail("restarts must be at least 1");
        }
        if self.max_iterations == 0 {
            return fail("max_iterations must be at least 1");
        }
        if !(0.0..1.0).contains(&self.significant_fraction) {
            return fail("significant_fraction must be in [0, 1)");
        }
        if !self.soft_edge_sigma.is_finite() {
            return fail("soft_edge_sigma must be finite");
        }
        if !(0.0..1.0).contains(&self.visible_alpha) {
            return fail("visible_alpha must be in [0, 1)");
        }
        if self.canonical_size == Some(0) {
            return fail("canonical_size must be at least 1");
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            layer_count: Self::DEFAULT_LAYER_COUNT,
            segment_target: Self::DEFAULT_SEGMENT_TARGET,
            compactness: Self::DEFAULT_COMPACTNESS,
            smoothing_sigma: Self::DEFAULT_SMOOTHING_SIGMA,
            slic_iterations: Self::DEFAULT_SLIC_ITERATIONS,
            lightness_weight: Self::DEFAULT_LIGHTNESS_WEIGHT,
            seed: Self::DEFAULT_SEED,
            restarts: Self::DEFAULT_RESTARTS,
            max_iterations: Self::DEFAULT_MAX_ITERATIONS,
            split_mode: SplitMode::default(),
            max_regions_per_color: Self::DEFAULT_MAX_REGIONS_PER_COLOR,
            significant_fraction: Self::DEFAULT_SIGNIFICANT_FRACTION,
            adjacency: Adjacency::default(),
            edge_mode: EdgeMode::default(),
            soft_edge_sigma: Self::DEFAULT_SOFT_EDGE_SIGMA,
            visible_alpha: Self::DEFAULT_VISIBLE_ALPHA,
            canonical_size: None,
            cache_key: None,
            visualize: false,
        }
    }
}

/// One output layer: an RGBA raster of the full canvas size.
///
/// Channels are in `[0, 1]`. Color is not premultiplied by alpha.
#[derive(Debug, Clone)]
pub struct Layer {
    /// Label id in the final label map this layer was built from.
    pub label: u32,
    /// Number of pixels in the layer's binary membership mask.
    pub pixel_count: u64,
    /// The RGBA layer raster.
    pub image: Rgba32FImage,
}

impl Layer {
    /// Quantize the layer to 8 bits per channel, e.g. for PNG export.
    #[must_use]
    pub fn to_rgba8(&self) -> RgbaImage {
        image::DynamicImage::ImageRgba32F(self.image.clone()).to_rgba8()
    }

    /// Returns `true` if no pixel belongs to this layer.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.pixel_count == 0
    }
}

/// Output of a complete pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineResult {
    /// Layers ordered by descending pixel count.
    pub layers: Vec<Layer>,
    /// Per-layer statistics, in layer order.
    pub statistics: crate::stats::StatisticsReport,
    /// Display color of each color cluster, indexed by cluster id.
    pub cluster_colors: Vec<[u8; 3]>,
    /// Number of superpixel regions.
    pub region_count: u32,
    /// Final label space size (clusters plus split-off labels).
    pub label_count: u32,
    /// Working image dimensions.
    pub dimensions: Dimensions,
    /// Preview rasters, present when `visualize` was set.
    pub previews: Option<crate::preview::Previews>,
}

/// Errors that can occur during pipeline processing.
///
/// Uses custom `Serialize`/`Deserialize` because `image::ImageError`
/// does not implement serde traits. The `ImageDecode` variant is
/// serialized as its `Display` string.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Failed to decode the input image.
    #[error("failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// The input image bytes were empty.
    #[error("input image data is empty")]
    EmptyInput,

    /// The decoded image has zero width or height.
    #[error("image has zero width or height")]
    EmptyImage,

    /// A raw pixel buffer had a channel count other than 3 or 4.
    #[error("unsupported channel count: {0} (expected 3 or 4)")]
    UnsupportedChannels(u8),

    /// A raw pixel buffer's length does not match its dimensions.
    #[error("pixel buffer holds {actual} bytes, expected {expected}")]
    BufferSize {
        /// Length implied by width, height and channel count.
        expected: usize,
        /// Length actually supplied.
        actual: usize,
    },

    /// Pipeline configuration is invalid.
    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),
}

impl PipelineError {
    /// Short machine-readable kind of this error.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ImageDecode(_)
            | Self::EmptyInput
            | Self::EmptyImage
            | Self::UnsupportedChannels(_)
            | Self::BufferSize { .. } => "input",
            Self::InvalidConfig(_) => "parameter",
        }
    }
}

/// Serde-compatible proxy for `PipelineError`.
///
/// `image::ImageError` does not implement serde, so the `ImageDecode`
/// variant stores its `Display` string instead.
#[derive(Serialize, Deserialize)]
enum PipelineErrorProxy {
    ImageDecode(String),
    EmptyInput,
    EmptyImage,
    UnsupportedChannels(u8),
    BufferSize { expected: usize, actual: usize },
    InvalidConfig(String),
}

impl Serialize for PipelineError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let proxy = match self {
            Self::ImageDecode(e) => PipelineErrorProxy::ImageDecode(e.to_string()),
            Self::EmptyInput => PipelineErrorProxy::EmptyInput,
            Self::EmptyImage => PipelineErrorProxy::EmptyImage,
            Self::UnsupportedChannels(n) => PipelineErrorProxy::UnsupportedChannels(*n),
            Self::BufferSize { expected, actual } => PipelineErrorProxy::BufferSize {
                expected: *expected,
                actual: *actual,
            },
            Self::InvalidConfig(s) => PipelineErrorProxy::InvalidConfig(s.clone()),
        };
        proxy.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PipelineError {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let proxy = PipelineErrorProxy::deserialize(deserializer)?;
        Ok(match proxy {
            // The typed image error cannot be rebuilt; keep the message.
            PipelineErrorProxy::ImageDecode(msg) => Self::ImageDecode(image::ImageError::IoError(
                std::io::Error::other(msg),
            )),
            PipelineErrorProxy::EmptyInput => Self::EmptyInput,
            PipelineErrorProxy::EmptyImage => Self::EmptyImage,
            PipelineErrorProxy::UnsupportedChannels(n) => Self::UnsupportedChannels(n),
            PipelineErrorProxy::BufferSize { expected, actual } => {
                Self::BufferSize { expected, actual }
            }
            PipelineErrorProxy::InvalidConfig(s) => Self::InvalidConfig(s),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    // --- LabelMap tests ---

    #[test]
    fn from_raw_rejects_wrong_length() {
        let dims = Dimensions {
            width: 2,
            height: 2,
        };
        assert!(LabelMap::from_raw(dims, vec![0, 0, 0], 1).is_none());
    }

    #[test]
    fn from_raw_rejects_label_outside_space() {
        let dims = Dimensions {
            width: 2,
            height: 1,
        };
        assert!(LabelMap::from_raw(dims, vec![0, 2], 2).is_none());
        assert!(LabelMap::from_raw(dims, vec![0, 1], 2).is_some());
    }

    #[test]
    fn from_fn_sizes_label_space() {
        let map = LabelMap::from_fn(3, 2, |x, _| x);
        assert_eq!(map.label_count(), 3);
        assert_eq!(map.get(2, 1), 2);
        assert_eq!(map.pixel_counts(), vec![2, 2, 2]);
    }

    #[test]
    fn remap_through_table() {
        let map = LabelMap::from_fn(4, 1, |x, _| x);
        let remapped = map.remap(&[1, 1, 0, 2], 3).unwrap();
        assert_eq!(remapped.as_slice(), &[1, 1, 0, 2]);
        assert_eq!(remapped.label_count(), 3);
    }

    #[test]
    fn remap_rejects_short_table() {
        let map = LabelMap::from_fn(3, 1, |x, _| x);
        assert!(map.remap(&[0, 0], 1).is_none());
    }

    #[test]
    fn allocate_label_grows_space() {
        let mut map = LabelMap::from_fn(2, 1, |_, _| 0);
        assert_eq!(map.allocate_label(), 1);
        assert_eq!(map.allocate_label(), 2);
        assert_eq!(map.label_count(), 3);
        assert_eq!(map.pixel_counts(), vec![2, 0, 0]);
    }

    // --- PipelineConfig tests ---

    #[test]
    fn default_config_is_valid() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_layer_count_is_rejected() {
        let config = PipelineConfig {
            layer_count: 0,
            ..PipelineConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(ref s) if s.contains("layer_count")));
    }

    #[test]
    fn zero_segment_target_is_rejected() {
        let config = PipelineConfig {
            segment_target: 0,
            ..PipelineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn zero_max_regions_is_rejected() {
        let config = PipelineConfig {
            max_regions_per_color: 0,
            ..PipelineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn lightness_weight_out_of_range_is_rejected() {
        for weight in [0.0, -0.5, 1.5, f32::NAN] {
            let config = PipelineConfig {
                lightness_weight: weight,
                ..PipelineConfig::default()
            };
            assert!(config.validate().is_err(), "weight {weight} accepted");
        }
    }

    #[test]
    fn config_json_uses_lowercase_modes() {
        let config = PipelineConfig {
            split_mode: SplitMode::Off,
            edge_mode: EdgeMode::Hard,
            ..PipelineConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"split_mode\":\"off\""));
        assert!(json.contains("\"edge_mode\":\"hard\""));
        let back: PipelineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn partial_config_json_fills_defaults() {
        let config: PipelineConfig = serde_json::from_str(r#"{"layer_count": 3}"#).unwrap();
        assert_eq!(config.layer_count, 3);
        assert_eq!(config.segment_target, PipelineConfig::DEFAULT_SEGMENT_TARGET);
        assert_eq!(config.split_mode, SplitMode::Auto);
    }

    // --- PipelineError tests ---

    #[test]
    fn error_display_messages() {
        assert_eq!(
            PipelineError::EmptyInput.to_string(),
            "input image data is empty"
        );
        assert_eq!(
            PipelineError::UnsupportedChannels(2).to_string(),
            "unsupported channel count: 2 (expected 3 or 4)"
        );
        assert_eq!(
            PipelineError::BufferSize {
                expected: 12,
                actual: 10
            }
            .to_string(),
            "pixel buffer holds 10 bytes, expected 12"
        );
    }

    #[test]
    fn error_kinds() {
        assert_eq!(PipelineError::EmptyImage.kind(), "input");
        assert_eq!(
            PipelineError::InvalidConfig(String::new()).kind(),
            "parameter"
        );
    }

    #[test]
    fn error_serde_round_trip() {
        let err = PipelineError::BufferSize {
            expected: 48,
            actual: 47,
        };
        let json = serde_json::to_string(&err).unwrap();
        let back: PipelineError = serde_json::from_str(&json).unwrap();
        assert!(matches!(
            back,
            PipelineError::BufferSize {
                expected: 48,
                actual: 47
            }
        ));
    }

    #[test]
    fn image_decode_error_keeps_message() {
        let err = PipelineError::ImageDecode(image::ImageError::IoError(std::io::Error::other(
            "bad header",
        )));
        let json = serde_json::to_string(&err).unwrap();
        let back: PipelineError = serde_json::from_str(&json).unwrap();
        assert!(back.to_string().contains("bad header"));
    }
}
