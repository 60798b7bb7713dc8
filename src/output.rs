use std::fs;
use std::path::{Path, PathBuf};
use csv::Writer;

use crate::config::MeasurementParams;
use crate::errors::Result;
use crate::lengths::LengthRecord;

/// Header of the micron column shared by per-image and combined tables
pub const LENGTH_COLUMN: &str = "lengths (micron)";
pub const INDEX_COLUMN: &str = "index";

/// Write a two-column `index,lengths (micron)` table
pub fn write_length_column<P, I>(path: P, microns: I) -> Result<()>
where
    P: AsRef<Path>,
    I: IntoIterator<Item = f64>,
{
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut writer = Writer::from_path(path)?;
    writer.write_record(&[INDEX_COLUMN, LENGTH_COLUMN])?;

    for (index, value) in microns.into_iter().enumerate() {
        writer.write_record(&[index.to_string(), format!("{:.6}", value)])?;
    }

    writer.flush()?;

    Ok(())
}

/// Write `<filename>_lengths.csv`, one row per length record
pub fn write_lengths_csv<P: AsRef<Path>>(
    records: &[LengthRecord],
    output_dir: P,
    filename: &str,
) -> Result<PathBuf> {
    let output_path = output_dir.as_ref().join(format!("{}_lengths.csv", filename));
    write_length_column(&output_path, records.iter().map(|r| r.microns))?;
    Ok(output_path)
}

/// Write `<filename>_runvalues.csv`: the parameters used, for reproducibility
pub fn write_run_values_csv<P: AsRef<Path>>(
    source: &Path,
    params: &MeasurementParams,
    output_dir: P,
    filename: &str,
) -> Result<PathBuf> {
    let output_path = output_dir.as_ref().join(format!("{}_runvalues.csv", filename));

    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut writer = Writer::from_path(&output_path)?;

    writer.write_record(&[
        "filename",
        "smoothing sigma value",
        "median smoothing radius",
        "threshold type",
        "objects smaller than n (pix) removed",
        "pixels to microns",
        "background subtraction skipped",
        "perimeter method",
    ])?;

    writer.write_record(&[
        source.display().to_string(),
        params.gaussian_sigma.to_string(),
        params.median_radius.to_string(),
        params.threshold_method.to_string(),
        params.min_skeleton_fragment.to_string(),
        params.pixel_to_micron.to_string(),
        params.skip_background_subtraction.to_string(),
        params.perimeter_method.to_string(),
    ])?;

    writer.flush()?;

    Ok(output_path)
}
