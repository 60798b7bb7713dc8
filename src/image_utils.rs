use image::{GrayImage, ImageBuffer, Luma};
use imageproc::distance_transform::Norm;
use imageproc::morphology::dilate;

/// 16-bit grayscale micrograph
pub type Gray16Image = ImageBuffer<Luma<u16>, Vec<u16>>;

/// Constants
pub const FOREGROUND: u8 = 255;
pub const BACKGROUND: u8 = 0;

/// Check if a mask pixel is foreground (any non-zero sample)
#[inline]
pub fn is_foreground(pixel: &Luma<u8>) -> bool {
    pixel[0] != BACKGROUND
}

/// Foreground test with out-of-bounds coordinates treated as background
#[inline]
pub fn foreground_at(mask: &GrayImage, x: i32, y: i32) -> bool {
    let (width, height) = mask.dimensions();
    in_bounds(x, y, width, height) && is_foreground(mask.get_pixel(x as u32, y as u32))
}

/// Check if a point is inside the image bounds
#[inline]
pub fn in_bounds(x: i32, y: i32, width: u32, height: u32) -> bool {
    x >= 0 && y >= 0 && (x as u32) < width && (y as u32) < height
}

/// Number of foreground pixels in a mask
pub fn count_foreground(mask: &GrayImage) -> usize {
    mask.pixels().filter(|p| is_foreground(p)).count()
}

/// Build a mask of the given size from a per-pixel predicate
pub fn mask_from_fn<F>(width: u32, height: u32, mut predicate: F) -> GrayImage
where
    F: FnMut(u32, u32) -> bool,
{
    GrayImage::from_fn(width, height, |x, y| {
        Luma([if predicate(x, y) { FOREGROUND } else { BACKGROUND }])
    })
}

/// Offsets of a disk footprint of the given radius, grouped per row.
///
/// Each entry is `(dy, half_width)`: the row `dy` covers `-half_width..=half_width`.
/// A pixel belongs to the disk when `dx^2 + dy^2 <= radius^2`.
pub fn disk_rows(radius: u32) -> Vec<(i32, i32)> {
    let r = radius as i64;
    (-r..=r)
        .map(|dy| {
            let mut half = 0i64;
            while (half + 1) * (half + 1) + dy * dy <= r * r {
                half += 1;
            }
            (dy as i32, half as i32)
        })
        .collect()
}

/// Number of pixels in a disk footprint
pub fn disk_area(radius: u32) -> usize {
    disk_rows(radius)
        .iter()
        .map(|&(_, half)| (2 * half + 1) as usize)
        .sum()
}

/// Binary dilation by one pixel with a 4-connected (cross) footprint
pub fn dilate_cross(mask: &GrayImage) -> GrayImage {
    dilate(mask, Norm::L1, 1)
}
