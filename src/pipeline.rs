// src/pipeline.rs - The five-stage measurement core and the per-image driver

use std::fs;
use std::path::PathBuf;

use image::GrayImage;

use crate::branches::{branch_points, remove_branch_components};
use crate::config::{Config, MeasurementParams};
use crate::diagnostics::{
    emit, DiagnosticImage, DiagnosticSink, DiagnosticStage, NoDiagnostics, PngDiagnostics,
};
use crate::errors::Result;
use crate::image_io::InputImage;
use crate::image_utils::{count_foreground, dilate_cross, Gray16Image};
use crate::lengths::{measure_lengths, LengthRecord};
use crate::output::{write_lengths_csv, write_run_values_csv};
use crate::skeleton::skeletonize;
use crate::smoothing::subtract_background;
use crate::threshold::threshold_image;

/// Foreground pixel counts after each binary stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StageCounts {
    pub thresholded: usize,
    pub skeleton: usize,
    pub branch_free: usize,
}

/// Result of one measurement run
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub records: Vec<LengthRecord>,
    pub counts: StageCounts,
}

/// Stage 1: background suppression (or pass-through when configured to skip)
fn suppress_background(
    image: &Gray16Image,
    params: &MeasurementParams,
    sink: &dyn DiagnosticSink,
) -> Gray16Image {
    if params.skip_background_subtraction {
        log::debug!("Background subtraction skipped");
        return image.clone();
    }

    let result = subtract_background(image, params.median_radius, params.gaussian_sigma);
    emit(sink, DiagnosticStage::Smoothed, DiagnosticImage::Gray16(&result.smoothed));
    emit(sink, DiagnosticStage::Background, DiagnosticImage::Gray16(&result.background));
    emit(sink, DiagnosticStage::NoBackground, DiagnosticImage::Gray16(&result.corrected));
    result.corrected
}

/// Stages 3 and 4 on an already thresholded mask: thin, drop short fragments,
/// then delete every component that touches a junction
pub fn skeleton_stages(
    mask: &GrayImage,
    params: &MeasurementParams,
    sink: &dyn DiagnosticSink,
) -> (GrayImage, GrayImage) {
    let skeleton = skeletonize(mask, params.min_skeleton_fragment);
    emit(sink, DiagnosticStage::Thin, DiagnosticImage::Mask(&skeleton));
    if sink.wants(DiagnosticStage::ThinDilated) {
        let dilated = dilate_cross(&skeleton);
        emit(sink, DiagnosticStage::ThinDilated, DiagnosticImage::Mask(&dilated));
    }

    let branches = branch_points(&skeleton);
    emit(sink, DiagnosticStage::BranchPoints, DiagnosticImage::Mask(&branches));

    let branch_free = remove_branch_components(&skeleton, &branches);
    if sink.wants(DiagnosticStage::NoBranchesDilated) {
        let dilated = dilate_cross(&branch_free);
        emit(sink, DiagnosticStage::NoBranchesDilated, DiagnosticImage::Mask(&dilated));
    }

    (skeleton, branch_free)
}

/// Measure a binary mask (stages 3-5)
pub fn measure_mask(
    mask: &GrayImage,
    params: &MeasurementParams,
    sink: &dyn DiagnosticSink,
) -> Result<Measurement> {
    params.validate()?;

    let (skeleton, branch_free) = skeleton_stages(mask, params, sink);
    let records = measure_lengths(&branch_free, params.pixel_to_micron, params.perimeter_method);

    Ok(Measurement {
        counts: StageCounts {
            thresholded: count_foreground(mask),
            skeleton: count_foreground(&skeleton),
            branch_free: count_foreground(&branch_free),
        },
        records,
    })
}

/// Run all five stages on a grayscale micrograph.
///
/// Parameters are validated before any stage runs. Every stage is a pure
/// function of its input, so identical inputs give identical records.
pub fn measure_image(
    image: &Gray16Image,
    params: &MeasurementParams,
    sink: &dyn DiagnosticSink,
) -> Result<Measurement> {
    params.validate()?;

    let corrected = suppress_background(image, params, sink);

    let mask = threshold_image(&corrected, params.gaussian_sigma, params.threshold_method);
    emit(sink, DiagnosticStage::Threshold, DiagnosticImage::Mask(&mask));

    let measurement = measure_mask(&mask, params, sink)?;
    let counts = measurement.counts;
    log::debug!(
        "Foreground pixels: {} thresholded, {} skeleton, {} branch-free",
        counts.thresholded,
        counts.skeleton,
        counts.branch_free
    );

    Ok(measurement)
}

/// Run all five stages without diagnostics
pub fn measure(image: &Gray16Image, params: &MeasurementParams) -> Result<Vec<LengthRecord>> {
    Ok(measure_image(image, params, &NoDiagnostics)?.records)
}

/// Process a single image: measure it and write the length table, the run
/// parameters and the diagnostic images into the output directory
pub fn process_image(
    input_image: InputImage,
    config: &Config,
    debug: bool,
) -> Result<Vec<LengthRecord>> {
    config.validate()?;

    let InputImage { image, path, filename } = input_image;
    let output_dir = PathBuf::from(&config.output_base_dir);
    fs::create_dir_all(&output_dir)?;

    let (width, height) = image.dimensions();
    log::info!("Measuring {} ({}x{})", path.display(), width, height);

    let sink = PngDiagnostics::new(&output_dir, &filename, debug);
    let measurement = measure_image(&image, &config.measurement, &sink)?;

    let lengths_path = write_lengths_csv(&measurement.records, &output_dir, &filename)?;
    let params_path = write_run_values_csv(&path, &config.measurement, &output_dir, &filename)?;

    let total: f64 = measurement.records.iter().map(|r| r.microns).sum();
    log::info!(
        "{}: {} isolated nanotubes, {:.2} micron total",
        filename,
        measurement.records.len(),
        total
    );
    if debug {
        for record in &measurement.records {
            log::debug!(
                "  label {}: {:.1} px -> {:.4} micron",
                record.label,
                record.pixels,
                record.microns
            );
        }
    }
    log::info!("Wrote {} and {}", lengths_path.display(), params_path.display());

    Ok(measurement.records)
}
