use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::Parser;
use env_logger::Env;

use nanotube_length_lib::config::Config;
use nanotube_length_lib::errors::{NanotubeError, Result};
use nanotube_length_lib::image_io::load_image;
use nanotube_length_lib::lengths::PerimeterMethod;
use nanotube_length_lib::pipeline::process_image;
use nanotube_length_lib::threshold::ThresholdMethod;

/// Command-line arguments
#[derive(Parser, Debug)]
#[clap(author, version, about = "Nanotube length measurement from micrographs")]
struct Args {
    /// Path to the input image
    #[clap(short, long)]
    input: Option<String>,

    /// Path to output directory
    #[clap(short, long)]
    output: Option<String>,

    /// Path to configuration file
    #[clap(short, long, default_value = "config.toml")]
    config: String,

    /// Gaussian smoothing sigma (overwrites config)
    #[clap(short, long)]
    sigma: Option<f32>,

    /// Radius of the disk used for the background median (overwrites config)
    #[clap(short = 'r', long)]
    median_radius: Option<u32>,

    /// Skeleton fragments smaller than this many pixels are removed (overwrites config)
    #[clap(short = 'm', long)]
    min_fragment: Option<u32>,

    /// Threshold method: entropy, variance, bisection or triangle (overwrites config)
    #[clap(short, long)]
    threshold: Option<String>,

    /// Microns per pixel (overwrites config)
    #[clap(short, long)]
    pixel_to_micron: Option<f64>,

    /// Perimeter estimator: weighted or contour (overwrites config)
    #[clap(long)]
    perimeter: Option<String>,

    /// Skip the background subtraction step
    #[clap(long)]
    skip_background: bool,

    /// Enable debug mode (save intermediate images and print more info)
    #[clap(short, long)]
    debug: bool,
}

/// Config file contents, or the defaults when the file does not exist
fn load_config(path: &str) -> Result<Config> {
    if Path::new(path).is_file() {
        Config::from_file(path)
    } else {
        log::info!("No config file at {}, using defaults", path);
        Ok(Config::default())
    }
}

/// Main function
fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse();

    let level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(level)).init();

    // Load configuration
    let mut config = load_config(&args.config)?;

    // Override config with command-line arguments
    if let Some(input) = args.input.clone() {
        config.input_path = input;
    }

    if let Some(output) = args.output.clone() {
        config.output_base_dir = output;
    }

    let params = &mut config.measurement;
    if let Some(sigma) = args.sigma {
        params.gaussian_sigma = sigma;
    }
    if let Some(radius) = args.median_radius {
        params.median_radius = radius;
    }
    if let Some(min_fragment) = args.min_fragment {
        params.min_skeleton_fragment = min_fragment;
    }
    if let Some(name) = args.threshold.as_deref() {
        params.threshold_method = name.parse::<ThresholdMethod>()?;
    }
    if let Some(scale) = args.pixel_to_micron {
        params.pixel_to_micron = scale;
    }
    if let Some(name) = args.perimeter.as_deref() {
        params.perimeter_method = name.parse::<PerimeterMethod>()?;
    }
    if args.skip_background {
        params.skip_background_subtraction = true;
    }

    // Validate configuration
    config.validate()?;

    // Start timing
    let start_time = Instant::now();

    let input_path = PathBuf::from(&config.input_path);
    if !input_path.is_file() {
        return Err(NanotubeError::InvalidPath(input_path));
    }

    log::info!("Processing single file: {}", input_path.display());
    let input_image = load_image(&input_path)?;
    let records = process_image(input_image, &config, args.debug)?;

    if args.debug {
        let effective = PathBuf::from(&config.output_base_dir).join("effective_config.toml");
        config.save_to_file(&effective)?;
        log::debug!("Effective configuration written to {}", effective.display());
    }

    // Report elapsed time
    let elapsed = start_time.elapsed();
    log::info!(
        "Measured {} nanotubes in {:.2} seconds",
        records.len(),
        elapsed.as_secs_f64()
    );

    Ok(())
}
