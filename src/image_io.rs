use std::path::{Path, PathBuf};
use image::{GrayImage, ImageFormat};

use crate::errors::{NanotubeError, Result};
use crate::image_utils::Gray16Image;

/// Represents an input micrograph with its metadata
pub struct InputImage {
    pub image: Gray16Image,
    pub path: PathBuf,
    pub filename: String,
}

/// Load an image as 16-bit grayscale.
///
/// 8-bit sources are widened to the full 16-bit range.
pub fn load_image<P: AsRef<Path>>(path: P) -> Result<InputImage> {
    let path = path.as_ref();

    if !path.is_file() {
        return Err(NanotubeError::InvalidPath(path.to_path_buf()));
    }

    // Get filename without extension
    let filename = path.file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| NanotubeError::InvalidPath(path.to_path_buf()))?
        .to_string();

    let img = image::open(path)?;

    Ok(InputImage {
        image: img.to_luma16(),
        path: path.to_path_buf(),
        filename,
    })
}

/// Save a binary mask (or any 8-bit grayscale image) as PNG
pub fn save_mask<P: AsRef<Path>>(image: &GrayImage, path: P) -> Result<()> {
    image.save_with_format(path, ImageFormat::Png)?;
    Ok(())
}

/// Save a 16-bit grayscale image as PNG
pub fn save_gray16<P: AsRef<Path>>(image: &Gray16Image, path: P) -> Result<()> {
    image.save_with_format(path, ImageFormat::Png)?;
    Ok(())
}
