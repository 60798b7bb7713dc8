use thiserror::Error;
use std::io;
use std::path::PathBuf;

/// Custom error types for nanotube length measurement
#[derive(Error, Debug)]
pub enum NanotubeError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Image decoding error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to load configuration from {path}: {source}")]
    ConfigLoad {
        source: toml::de::Error,
        path: PathBuf,
    },

    #[error("Unknown threshold method: {0} (expected entropy, variance, bisection or triangle)")]
    UnknownThresholdMethod(String),

    #[error("Unknown perimeter method: {0} (expected contour or weighted)")]
    UnknownPerimeterMethod(String),

    #[error("CSV output error: {0}")]
    CsvOutput(#[from] csv::Error),

    #[error("Invalid input path: {0}")]
    InvalidPath(PathBuf),

    #[error("No *_lengths.csv tables found in {0}")]
    NoLengthTables(PathBuf),
}

impl NanotubeError {
    /// True for errors raised while validating parameters, before any stage runs
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            NanotubeError::Config(_)
                | NanotubeError::ConfigLoad { .. }
                | NanotubeError::UnknownThresholdMethod(_)
                | NanotubeError::UnknownPerimeterMethod(_)
        )
    }
}

/// Type alias for Result with our custom error type
pub type Result<T> = std::result::Result<T, NanotubeError>;
