// src/lib.rs - Library interface for nanotube length measurement

pub mod aggregate;
pub mod branches;
pub mod config;
pub mod diagnostics;
pub mod errors;
pub mod image_io;
pub mod image_utils;
pub mod lengths;
pub mod morphology;
pub mod output;
pub mod pipeline;
pub mod skeleton;
pub mod smoothing;
pub mod threshold;

// Re-export commonly used types and functions
pub use errors::{NanotubeError, Result};
pub use config::{Config, MeasurementParams};
pub use pipeline::{measure, measure_image, measure_mask, process_image, Measurement, StageCounts};
pub use image_io::{InputImage, load_image};
pub use image_utils::Gray16Image;

// Re-export stage functions
pub use smoothing::{subtract_background, median_filter_disk, gaussian_smooth};
pub use threshold::{threshold_image, ThresholdMethod};
pub use skeleton::{skeletonize, thin, remove_small_objects};
pub use branches::{branch_points, remove_branches, remove_branch_components};
pub use lengths::{measure_lengths, LengthRecord, PerimeterMethod};

// Re-export collaborators
pub use diagnostics::{DiagnosticSink, DiagnosticStage, NoDiagnostics, PngDiagnostics};
pub use aggregate::concat_length_tables;
