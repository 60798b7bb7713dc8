// src/smoothing.rs - Noise suppression and background (illumination) removal

use image::Luma;
use imageproc::filter::gaussian_blur_f32;
use rayon::prelude::*;

use crate::image_utils::{disk_area, disk_rows, Gray16Image};

/// Gaussian blur with spread `sigma`. Callers validate `sigma > 0`.
pub fn gaussian_smooth(image: &Gray16Image, sigma: f32) -> Gray16Image {
    gaussian_blur_f32(image, sigma)
}

/// Running histogram over 16-bit samples, split into 256 coarse blocks of 256
/// values so rank queries touch at most 512 counters.
struct SlidingHistogram {
    coarse: [u32; 256],
    fine: Vec<u32>,
}

impl SlidingHistogram {
    fn new() -> Self {
        Self {
            coarse: [0; 256],
            fine: vec![0; 1 << 16],
        }
    }

    #[inline]
    fn add(&mut self, value: u16) {
        self.coarse[(value >> 8) as usize] += 1;
        self.fine[value as usize] += 1;
    }

    #[inline]
    fn remove(&mut self, value: u16) {
        self.coarse[(value >> 8) as usize] -= 1;
        self.fine[value as usize] -= 1;
    }

    /// Value at zero-based `rank` in sorted order
    fn select(&self, rank: usize) -> u16 {
        let mut seen = 0usize;
        for (block, &count) in self.coarse.iter().enumerate() {
            let count = count as usize;
            if seen + count > rank {
                let start = block << 8;
                for (offset, &c) in self.fine[start..start + 256].iter().enumerate() {
                    seen += c as usize;
                    if seen > rank {
                        return (start + offset) as u16;
                    }
                }
            }
            seen += count;
        }
        u16::MAX
    }
}

/// Median filter over a disk footprint of the given radius.
///
/// Samples outside the image repeat the nearest edge pixel. Rows are filtered
/// in parallel, each with its own sliding histogram.
pub fn median_filter_disk(image: &Gray16Image, radius: u32) -> Gray16Image {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return image.clone();
    }

    let rows = disk_rows(radius);
    let rank = disk_area(radius) / 2;
    let (w, h) = (width as i32, height as i32);

    let sample = |x: i32, y: i32| -> u16 {
        image.get_pixel(x.clamp(0, w - 1) as u32, y.clamp(0, h - 1) as u32)[0]
    };

    let filtered: Vec<Vec<u16>> = (0..h)
        .into_par_iter()
        .map(|y| {
            let mut hist = SlidingHistogram::new();
            for &(dy, half) in &rows {
                for dx in -half..=half {
                    hist.add(sample(dx, y + dy));
                }
            }

            let mut row = Vec::with_capacity(width as usize);
            row.push(hist.select(rank));

            for x in 1..w {
                for &(dy, half) in &rows {
                    hist.remove(sample(x - 1 - half, y + dy));
                    hist.add(sample(x + half, y + dy));
                }
                row.push(hist.select(rank));
            }
            row
        })
        .collect();

    Gray16Image::from_fn(width, height, |x, y| Luma([filtered[y as usize][x as usize]]))
}

/// Pixel-wise `minuend - subtrahend`, clipped at zero
pub fn subtract_saturating(minuend: &Gray16Image, subtrahend: &Gray16Image) -> Gray16Image {
    let (width, height) = minuend.dimensions();
    Gray16Image::from_fn(width, height, |x, y| {
        Luma([minuend.get_pixel(x, y)[0].saturating_sub(subtrahend.get_pixel(x, y)[0])])
    })
}

/// Intermediate images of a background subtraction, kept for diagnostics
pub struct BackgroundSubtraction {
    pub smoothed: Gray16Image,
    pub background: Gray16Image,
    pub corrected: Gray16Image,
}

/// Remove broadband illumination: blur the image, estimate the background with
/// a disk median of the *unblurred* image, and subtract.
pub fn subtract_background(
    image: &Gray16Image,
    median_radius: u32,
    sigma: f32,
) -> BackgroundSubtraction {
    let smoothed = gaussian_smooth(image, sigma);
    let background = median_filter_disk(image, median_radius);
    let corrected = subtract_saturating(&smoothed, &background);

    BackgroundSubtraction {
        smoothed,
        background,
        corrected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn brute_force_median(image: &Gray16Image, radius: u32, x: i32, y: i32) -> u16 {
        let (w, h) = (image.width() as i32, image.height() as i32);
        let mut values = Vec::new();
        for (dy, half) in disk_rows(radius) {
            for dx in -half..=half {
                let sx = (x + dx).clamp(0, w - 1) as u32;
                let sy = (y + dy).clamp(0, h - 1) as u32;
                values.push(image.get_pixel(sx, sy)[0]);
            }
        }
        values.sort_unstable();
        values[values.len() / 2]
    }

    #[test]
    fn median_matches_brute_force() {
        let image = Gray16Image::from_fn(17, 11, |x, y| {
            Luma([((x * 7919 + y * 104_729) % 65_521) as u16])
        });
        let filtered = median_filter_disk(&image, 3);
        for y in 0..11 {
            for x in 0..17 {
                assert_eq!(
                    filtered.get_pixel(x, y)[0],
                    brute_force_median(&image, 3, x as i32, y as i32),
                    "mismatch at ({}, {})",
                    x,
                    y
                );
            }
        }
    }

    #[test]
    fn median_erases_thin_bright_line() {
        let image =
            Gray16Image::from_fn(21, 21, |_, y| Luma([if y == 10 { 60_000 } else { 1_000 }]));
        let background = median_filter_disk(&image, 3);
        assert!(background.pixels().all(|p| p[0] == 1_000));
    }

    #[test]
    fn subtraction_clips_at_zero() {
        let a = Gray16Image::from_pixel(2, 2, Luma([10]));
        let b = Gray16Image::from_pixel(2, 2, Luma([25]));
        assert!(subtract_saturating(&a, &b).pixels().all(|p| p[0] == 0));
        assert!(subtract_saturating(&b, &a).pixels().all(|p| p[0] == 15));
    }

    #[test]
    fn background_subtraction_keeps_filament_and_flattens_gradient() {
        // Illumination ramp plus one bright horizontal filament
        let image = Gray16Image::from_fn(40, 40, |x, y| {
            let ramp = 5_000 + 200 * x as u16;
            Luma([if y == 20 { ramp + 30_000 } else { ramp }])
        });
        let result = subtract_background(&image, 5, 0.8);

        let on_line = result.corrected.get_pixel(20, 20)[0];
        let off_line = result.corrected.get_pixel(20, 5)[0];
        assert!(on_line > 10_000, "filament lost: {}", on_line);
        assert!(off_line < 500, "background left: {}", off_line);
    }
}
