// src/config.rs - Run configuration and the validated measurement parameter bundle

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::errors::{NanotubeError, Result};
use crate::lengths::PerimeterMethod;
use crate::threshold::ThresholdMethod;

/// Configuration for one measurement run
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
    pub input_path: String,

    #[serde(default = "default_output_base_dir")]
    pub output_base_dir: String,

    #[serde(default)]
    pub measurement: MeasurementParams,
}

/// Parameters consumed by the measurement core.
///
/// Fixed before a run starts; `validate` must succeed before any stage executes.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct MeasurementParams {
    /// Radius of the disk used for the background median estimate
    #[serde(default = "default_median_radius")]
    pub median_radius: u32,

    /// Spread of the Gaussian blur applied before subtraction and thresholding
    #[serde(default = "default_gaussian_sigma")]
    pub gaussian_sigma: f32,

    /// Skeleton fragments with fewer pixels than this are dropped
    #[serde(default = "default_min_skeleton_fragment")]
    pub min_skeleton_fragment: u32,

    #[serde(default)]
    pub threshold_method: ThresholdMethod,

    /// Microns per pixel
    #[serde(default = "default_pixel_to_micron")]
    pub pixel_to_micron: f64,

    /// Bypass background subtraction for flat, high-contrast images
    #[serde(default)]
    pub skip_background_subtraction: bool,

    #[serde(default)]
    pub perimeter_method: PerimeterMethod,
}

fn default_output_base_dir() -> String {
    "_figs".to_string()
}

fn default_median_radius() -> u32 {
    20
}

fn default_gaussian_sigma() -> f32 {
    3.0
}

fn default_min_skeleton_fragment() -> u32 {
    3
}

// 60x objective
fn default_pixel_to_micron() -> f64 {
    0.070556640625
}

impl Default for MeasurementParams {
    fn default() -> Self {
        Self {
            median_radius: default_median_radius(),
            gaussian_sigma: default_gaussian_sigma(),
            min_skeleton_fragment: default_min_skeleton_fragment(),
            threshold_method: ThresholdMethod::default(),
            pixel_to_micron: default_pixel_to_micron(),
            skip_background_subtraction: false,
            perimeter_method: PerimeterMethod::default(),
        }
    }
}

impl MeasurementParams {
    /// Reject non-positive or non-finite parameter values
    pub fn validate(&self) -> Result<()> {
        if self.median_radius == 0 {
            return Err(NanotubeError::Config(
                "median_radius must be > 0".to_string(),
            ));
        }

        if !(self.gaussian_sigma.is_finite() && self.gaussian_sigma > 0.0) {
            return Err(NanotubeError::Config(format!(
                "gaussian_sigma must be a finite value > 0.0 (got {})",
                self.gaussian_sigma
            )));
        }

        if self.min_skeleton_fragment == 0 {
            return Err(NanotubeError::Config(
                "min_skeleton_fragment must be > 0".to_string(),
            ));
        }

        if !(self.pixel_to_micron.is_finite() && self.pixel_to_micron > 0.0) {
            return Err(NanotubeError::Config(format!(
                "pixel_to_micron must be a finite value > 0.0 (got {})",
                self.pixel_to_micron
            )));
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input_path: "./input.tif".to_string(),
            output_base_dir: default_output_base_dir(),
            measurement: MeasurementParams::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            NanotubeError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;

        toml::from_str(&content).map_err(|source| NanotubeError::ConfigLoad {
            source,
            path: path.to_path_buf(),
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.output_base_dir.trim().is_empty() {
            return Err(NanotubeError::Config(
                "output_base_dir must not be empty".to_string(),
            ));
        }

        self.measurement.validate()
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| {
            NanotubeError::Config(format!("Failed to serialize config: {}", e))
        })?;

        fs::write(path, content)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn rejects_non_positive_parameters() {
        let mut params = MeasurementParams::default();
        params.median_radius = 0;
        assert!(params.validate().unwrap_err().is_config_error());

        let mut params = MeasurementParams::default();
        params.gaussian_sigma = 0.0;
        assert!(params.validate().is_err());

        let mut params = MeasurementParams::default();
        params.gaussian_sigma = f32::NAN;
        assert!(params.validate().is_err());

        let mut params = MeasurementParams::default();
        params.min_skeleton_fragment = 0;
        assert!(params.validate().is_err());

        let mut params = MeasurementParams::default();
        params.pixel_to_micron = -0.1;
        assert!(params.validate().is_err());
    }

    #[test]
    fn parses_partial_toml_with_defaults() {
        let text = r#"
input_path = "tube.tif"

[measurement]
gaussian_sigma = 1.5
threshold_method = "otsu"
perimeter_method = "weighted"
"#;
        let config: Config = toml::from_str(text).unwrap();
        assert_eq!(config.input_path, "tube.tif");
        assert_eq!(config.output_base_dir, "_figs");
        assert_eq!(config.measurement.gaussian_sigma, 1.5);
        assert_eq!(config.measurement.median_radius, 20);
        assert_eq!(config.measurement.threshold_method, ThresholdMethod::Variance);
        assert_eq!(config.measurement.perimeter_method, PerimeterMethod::Weighted);
    }

    #[test]
    fn unknown_threshold_name_fails_to_parse() {
        let text = r#"
input_path = "tube.tif"

[measurement]
threshold_method = "median"
"#;
        assert!(toml::from_str::<Config>(text).is_err());
    }

    #[test]
    fn save_and_reload_keeps_values() {
        let dir = std::env::temp_dir().join(format!("nanotube_config_{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");

        let mut config = Config::default();
        config.measurement.median_radius = 7;
        config.measurement.threshold_method = ThresholdMethod::Bisection;
        config.save_to_file(&path).unwrap();

        let reloaded = Config::from_file(&path).unwrap();
        assert_eq!(reloaded, config);

        fs::remove_dir_all(&dir).ok();
    }
}
