//! parallax-bench: CLI tool for layer decomposition and diagnostics.
//!
//! Runs the decomposition pipeline on an image file with configurable
//! parameters, printing per-stage diagnostics and optionally writing
//! every layer as a PNG. Useful for:
//!
//! - Tuning layer count, lightness weight and superpixel density
//! - Comparing hard and soft edges
//! - Measuring how much a cached partition saves across repeated runs
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin parallax-bench -- [OPTIONS] <IMAGE_PATH>
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::{Parser, ValueEnum};
use parallax_pipeline::diagnostics::{Clock, PipelineDiagnostics};
use parallax_pipeline::{PipelineCache, PipelineConfig, PipelineResult};

/// Icon layer decomposition and diagnostics for parallax.
///
/// Decomposes an image into ordered color layers and prints per-stage
/// timing and count diagnostics.
#[derive(Parser)]
#[command(name = "parallax-bench", version)]
struct Cli {
    /// Path to the input image (PNG, JPEG, BMP, WebP).
    image_path: PathBuf,

    /// Number of color clusters.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_LAYER_COUNT, value_parser = clap::builder::RangedU64ValueParser::<u32>::new().range(1..))]
    layers: u32,

    /// Desired number of superpixels.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_SEGMENT_TARGET, value_parser = clap::builder::RangedU64ValueParser::<u32>::new().range(1..))]
    segments: u32,

    /// Superpixel compactness.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_COMPACTNESS)]
    compactness: f32,

    /// Lightness weight applied before clustering, in (0, 1].
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_LIGHTNESS_WEIGHT)]
    lightness_weight: f32,

    /// k-means seed.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_SEED)]
    seed: u64,

    /// Spatial splitting of disconnected clusters.
    #[arg(long, value_enum, default_value_t = Split::Auto)]
    split: Split,

    /// Maximum number of layers a single color may become.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_MAX_REGIONS_PER_COLOR, value_parser = clap::builder::RangedU64ValueParser::<u32>::new().range(1..))]
    max_regions_per_color: u32,

    /// Layer edge treatment.
    #[arg(long, value_enum, default_value_t = Edges::Soft)]
    edges: Edges,

    /// Resize the input to a square of this edge length before processing.
    #[arg(long, default_value_t = PipelineConfig::CANONICAL_SIZE, value_parser = clap::builder::RangedU64ValueParser::<u32>::new().range(1..))]
    size: u32,

    /// Process the image at its original size.
    #[arg(long)]
    no_resize: bool,

    /// Write layer PNGs, statistics and previews to this directory
    /// (first run only).
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// Number of runs for averaging. Runs after the first reuse the
    /// cached partition unless `--no-cache` is given.
    #[arg(long, default_value_t = 1, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    runs: usize,

    /// Recompute the partition on every run.
    #[arg(long)]
    no_cache: bool,

    /// Output diagnostics as JSON instead of a human-readable report.
    #[arg(long)]
    json: bool,

    /// Full pipeline config as a JSON string.
    ///
    /// When provided, all other pipeline parameter flags are ignored.
    /// The JSON must be a valid `PipelineConfig` serialization.
    #[arg(long)]
    config_json: Option<String>,
}

/// Spatial split selection.
#[derive(Clone, Copy, ValueEnum)]
enum Split {
    /// One layer per color cluster.
    Off,
    /// Split disconnected clusters, capped per color.
    Auto,
}

/// Edge mode selection.
#[derive(Clone, Copy, ValueEnum)]
enum Edges {
    /// Binary alpha.
    Hard,
    /// Blurred alpha.
    Soft,
}

/// Build a [`PipelineConfig`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and all
/// individual parameter flags are ignored. Otherwise, a config is
/// assembled from the individual flags.
fn config_from_cli(cli: &Cli) -> Result<PipelineConfig, String> {
    if let Some(ref json) = cli.config_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }

    Ok(PipelineConfig {
        layer_count: cli.layers,
        segment_target: cli.segments,
        compactness: cli.compactness,
        lightness_weight: cli.lightness_weight,
        seed: cli.seed,
        split_mode: match cli.split {
            Split::Off => parallax_pipeline::SplitMode::Off,
            Split::Auto => parallax_pipeline::SplitMode::Auto,
        },
        max_regions_per_color: cli.max_regions_per_color,
        edge_mode: match cli.edges {
            Edges::Hard => parallax_pipeline::EdgeMode::Hard,
            Edges::Soft => parallax_pipeline::EdgeMode::Soft,
        },
        canonical_size: (!cli.no_resize).then_some(cli.size),
        cache_key: Some(cli.image_path.display().to_string()),
        visualize: cli.out_dir.is_some(),
        ..PipelineConfig::default()
    })
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let config = match config_from_cli(&cli) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let image_bytes = match std::fs::read(&cli.image_path) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Error reading {}: {e}", cli.image_path.display());
            return ExitCode::FAILURE;
        }
    };

    eprintln!(
        "Image: {} ({} bytes)",
        cli.image_path.display(),
        image_bytes.len(),
    );
    eprintln!("Config: {config:#?}");
    eprintln!("Runs: {}", cli.runs);
    eprintln!();

    let cache = PipelineCache::new();
    let mut all_diagnostics = Vec::with_capacity(cli.runs);

    for run in 0..cli.runs {
        if cli.runs > 1 {
            eprintln!("--- Run {}/{} ---", run + 1, cli.runs);
        }

        let cache_ref = (!cli.no_cache).then_some(&cache);
        match parallax_pipeline::process_with_diagnostics(
            &image_bytes,
            &config,
            cache_ref,
            &StdClock,
        ) {
            Ok((result, diagnostics)) => {
                if cli.json {
                    match serde_json::to_string_pretty(&diagnostics) {
                        Ok(json) => println!("{json}"),
                        Err(e) => {
                            eprintln!("Error serializing diagnostics: {e}");
                            return ExitCode::FAILURE;
                        }
                    }
                } else {
                    println!("{}", diagnostics.report());
                    print_statistics(&result);
                }

                // Write outputs on the first run only.
                if run == 0
                    && let Some(ref dir) = cli.out_dir
                    && let Err(e) = write_outputs(dir, &result)
                {
                    eprintln!("Error writing to {}: {e}", dir.display());
                    return ExitCode::FAILURE;
                }

                all_diagnostics.push(diagnostics);
            }
            Err(e) => {
                eprintln!("Pipeline error ({}): {e}", e.kind());
                return ExitCode::FAILURE;
            }
        }

        if cli.runs > 1 {
            eprintln!();
        }
    }

    if cli.runs > 1 {
        print_multi_run_summary(&all_diagnostics);
    }

    ExitCode::SUCCESS
}

/// Print one line per layer: coverage and mean color.
fn print_statistics(result: &PipelineResult) {
    println!();
    println!(
        "{:<6} {:>6} {:>10} {:>8}  {}",
        "Layer", "Label", "Pixels", "Percent", "Color"
    );
    println!("{}", "-".repeat(48));
    for stats in &result.statistics.layers {
        let [r, g, b] = stats.average_color;
        println!(
            "{:<6} {:>6} {:>10} {:>7.2}%  #{r:02x}{g:02x}{b:02x}",
            stats.layer_index, stats.label, stats.pixel_count, stats.percentage,
        );
    }
    println!(
        "Total visible: {:.2}%",
        result.statistics.total_percentage()
    );
}

/// Write every layer as `layer_NN.png`, the statistics as JSON, and the
/// preview rasters when present.
fn write_outputs(dir: &Path, result: &PipelineResult) -> Result<(), Box<dyn std::error::Error>> {
    std::fs::create_dir_all(dir)?;
    for (i, layer) in result.layers.iter().enumerate() {
        let path = dir.join(format!("layer_{i:02}.png"));
        layer.to_rgba8().save(&path)?;
        log::debug!("wrote {} ({} pixels)", path.display(), layer.pixel_count);
    }

    let stats_path = dir.join("statistics.json");
    std::fs::write(
        &stats_path,
        serde_json::to_string_pretty(&result.statistics)?,
    )?;

    if let Some(ref previews) = result.previews {
        previews.boundaries.save(dir.join("preview_boundaries.png"))?;
        previews.regions.save(dir.join("preview_regions.png"))?;
        previews.clusters.save(dir.join("preview_clusters.png"))?;
        previews
            .reconstruction
            .save(dir.join("preview_reconstruction.png"))?;
    }

    eprintln!(
        "Wrote {} layers to {}",
        result.layers.len(),
        dir.display()
    );
    Ok(())
}

/// [`Clock`] implementation backed by [`std::time::Instant`].
struct StdClock;

impl Clock for StdClock {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn elapsed(&self, since: &Instant) -> Duration {
        since.elapsed()
    }
}

/// Function pointer type for extracting a stage duration from diagnostics.
type StageExtractor = fn(&PipelineDiagnostics) -> Option<Duration>;

/// Print aggregated statistics across multiple runs.
#[allow(clippy::cast_precision_loss)]
fn print_multi_run_summary(all_diagnostics: &[PipelineDiagnostics]) {
    debug_assert!(!all_diagnostics.is_empty(), "no diagnostics to summarize");

    println!();
    println!(
        "Summary ({} runs)\n{}",
        all_diagnostics.len(),
        "=".repeat(60),
    );

    if all_diagnostics.is_empty() {
        println!("Warning: no diagnostics to summarize");
        return;
    }

    let durations: Vec<f64> = all_diagnostics
        .iter()
        .map(|d| d.total_duration.as_secs_f64() * 1000.0)
        .collect();

    let min = durations.iter().copied().reduce(f64::min).unwrap_or(0.0);
    let max = durations.iter().copied().reduce(f64::max).unwrap_or(0.0);
    let mean = durations.iter().sum::<f64>() / durations.len() as f64;

    println!("Total duration: min={min:.3}ms  mean={mean:.3}ms  max={max:.3}ms");

    let hits = all_diagnostics
        .iter()
        .filter(|d| d.summary.cache_hit)
        .count();
    println!("Cached partitions: {hits}/{}", all_diagnostics.len());

    println!();
    println!("{:<24} {:>12}", "Stage", "Mean (ms)");
    println!("{}", "-".repeat(40));

    let stage_extractors: &[(&str, StageExtractor)] = &[
        ("Load", |d| Some(d.load.duration)),
        ("Partition", |d| Some(d.partition.duration)),
        ("Features", |d| Some(d.features.duration)),
        ("Clustering", |d| Some(d.clustering.duration)),
        ("Split", |d| d.split.as_ref().map(|s| s.duration)),
        ("Layers", |d| Some(d.layers.duration)),
        ("Statistics", |d| Some(d.statistics.duration)),
    ];

    for (name, extractor) in stage_extractors {
        let stage_durations: Vec<f64> = all_diagnostics
            .iter()
            .filter_map(extractor)
            .map(|dur| dur.as_secs_f64() * 1000.0)
            .collect();

        if stage_durations.is_empty() {
            continue;
        }

        let stage_mean = stage_durations.iter().sum::<f64>() / stage_durations.len() as f64;
        println!("{name:<24} {stage_mean:>10.3}ms");
    }
}
