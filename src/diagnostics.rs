// src/diagnostics.rs - Optional per-stage images for visual QA

use std::path::PathBuf;

use image::GrayImage;

use crate::errors::Result;
use crate::image_io::{save_gray16, save_mask};
use crate::image_utils::Gray16Image;

/// Pipeline points at which a diagnostic image can be captured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticStage {
    Smoothed,
    Background,
    NoBackground,
    Threshold,
    Thin,
    ThinDilated,
    BranchPoints,
    NoBranchesDilated,
}

impl DiagnosticStage {
    /// File-name suffix appended to the image's base name
    pub fn suffix(&self) -> &'static str {
        match self {
            DiagnosticStage::Smoothed => "_smooth",
            DiagnosticStage::Background => "_bg",
            DiagnosticStage::NoBackground => "_noBG",
            DiagnosticStage::Threshold => "_thresh",
            DiagnosticStage::Thin => "_thin",
            DiagnosticStage::ThinDilated => "_dilate",
            DiagnosticStage::BranchPoints => "_branches",
            DiagnosticStage::NoBranchesDilated => "_noBranches_dilate",
        }
    }
}

/// Borrowed image handed to a sink
#[derive(Clone, Copy)]
pub enum DiagnosticImage<'a> {
    Gray16(&'a Gray16Image),
    Mask(&'a GrayImage),
}

/// Receiver of diagnostic images. Failures are reported back but never abort
/// a measurement.
pub trait DiagnosticSink {
    /// Whether the stage should be rendered at all
    fn wants(&self, stage: DiagnosticStage) -> bool;

    fn save(&self, stage: DiagnosticStage, image: DiagnosticImage<'_>) -> Result<()>;
}

/// Sink that discards everything
pub struct NoDiagnostics;

impl DiagnosticSink for NoDiagnostics {
    fn wants(&self, _stage: DiagnosticStage) -> bool {
        false
    }

    fn save(&self, _stage: DiagnosticStage, _image: DiagnosticImage<'_>) -> Result<()> {
        Ok(())
    }
}

/// Writes `<dir>/<filename><suffix>.png`. The dilated branch-free skeleton is
/// always written; every other stage only in debug mode.
pub struct PngDiagnostics {
    pub dir: PathBuf,
    pub filename: String,
    pub debug: bool,
}

impl PngDiagnostics {
    pub fn new<P: Into<PathBuf>>(dir: P, filename: &str, debug: bool) -> Self {
        Self {
            dir: dir.into(),
            filename: filename.to_string(),
            debug,
        }
    }

    pub fn path_for(&self, stage: DiagnosticStage) -> PathBuf {
        self.dir.join(format!("{}{}.png", self.filename, stage.suffix()))
    }
}

impl DiagnosticSink for PngDiagnostics {
    fn wants(&self, stage: DiagnosticStage) -> bool {
        self.debug || stage == DiagnosticStage::NoBranchesDilated
    }

    fn save(&self, stage: DiagnosticStage, image: DiagnosticImage<'_>) -> Result<()> {
        let path = self.path_for(stage);
        match image {
            DiagnosticImage::Gray16(img) => save_gray16(img, &path)?,
            DiagnosticImage::Mask(img) => save_mask(img, &path)?,
        }
        log::debug!("Saved diagnostic image {}", path.display());
        Ok(())
    }
}

/// Hand an image to the sink if it wants the stage; failures are only logged
pub fn emit(sink: &dyn DiagnosticSink, stage: DiagnosticStage, image: DiagnosticImage<'_>) {
    if !sink.wants(stage) {
        return;
    }
    if let Err(e) = sink.save(stage, image) {
        log::warn!("Could not save {:?} diagnostic image: {}", stage, e);
    }
}
