// src/lengths.rs - Per-component length measurement in pixels and microns

use std::fmt;
use std::str::FromStr;

use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::errors::NanotubeError;
use crate::morphology::{
    first_pixels, label_components, path_length, trace_contour, LabelImage, BACKGROUND_LABEL,
};

/// How a component's boundary length is estimated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PerimeterMethod {
    /// Moore-traced outer contour; about twice the length of a thin curve
    Contour,
    /// Border-pixel weighting with 4-connected border detection; about the
    /// length of a thin curve, minus its two end pixels
    #[default]
    Weighted,
}

impl PerimeterMethod {
    pub fn name(&self) -> &'static str {
        match self {
            PerimeterMethod::Contour => "contour",
            PerimeterMethod::Weighted => "weighted",
        }
    }
}

impl fmt::Display for PerimeterMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PerimeterMethod {
    type Err = NanotubeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "contour" => Ok(PerimeterMethod::Contour),
            "weighted" => Ok(PerimeterMethod::Weighted),
            _ => Err(NanotubeError::UnknownPerimeterMethod(s.to_string())),
        }
    }
}

/// Measured length of one surviving skeleton component
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LengthRecord {
    /// Component label in the final labeling pass
    pub label: u32,
    /// Boundary length in pixels
    pub pixels: f64,
    /// `pixels * pixel_to_micron`
    pub microns: f64,
}

/// Outer-contour length of every component, indexed by label
fn contour_perimeters(labels: &LabelImage, count: u32) -> Vec<f64> {
    first_pixels(labels, count)
        .into_iter()
        .enumerate()
        .map(|(label, start)| match start {
            Some(start) => path_length(&trace_contour(labels, label as u32, start)),
            None => 0.0,
        })
        .collect()
}

/// Weight of a border pixel by its code `1 + 2 * axial + 10 * diagonal`,
/// where the counts are neighbouring border pixels of the same component
fn border_weight(code: usize) -> f64 {
    match code {
        5 | 7 | 15 | 17 | 25 | 27 => 1.0,
        21 | 33 => std::f64::consts::SQRT_2,
        13 | 23 => (1.0 + std::f64::consts::SQRT_2) / 2.0,
        _ => 0.0,
    }
}

/// Weighted border-pixel perimeter of every component, indexed by label
fn weighted_perimeters(labels: &LabelImage, count: u32) -> Vec<f64> {
    let (width, height) = labels.dimensions();
    let (w, h) = (width as i32, height as i32);
    let label_at = |x: i32, y: i32| -> u32 {
        if x < 0 || y < 0 || x >= w || y >= h {
            BACKGROUND_LABEL
        } else {
            labels.get_pixel(x as u32, y as u32)[0]
        }
    };

    // A pixel is on the border when erosion by a cross would remove it
    let border: Vec<bool> = labels
        .enumerate_pixels()
        .map(|(x, y, p)| {
            let (x, y, label) = (x as i32, y as i32, p[0]);
            label != BACKGROUND_LABEL
                && [(1, 0), (-1, 0), (0, 1), (0, -1)]
                    .iter()
                    .any(|&(dx, dy)| label_at(x + dx, y + dy) != label)
        })
        .collect();
    let is_border = |x: i32, y: i32, label: u32| -> bool {
        label_at(x, y) == label && border[(y * w + x) as usize]
    };

    let mut perimeters = vec![0.0; count as usize + 1];
    for (x, y, p) in labels.enumerate_pixels() {
        let label = p[0];
        if !border[(y * width + x) as usize] {
            continue;
        }
        let (x, y) = (x as i32, y as i32);
        let axial = [(1, 0), (-1, 0), (0, 1), (0, -1)]
            .iter()
            .filter(|&&(dx, dy)| is_border(x + dx, y + dy, label))
            .count();
        let diagonal = [(1, 1), (-1, 1), (1, -1), (-1, -1)]
            .iter()
            .filter(|&&(dx, dy)| is_border(x + dx, y + dy, label))
            .count();
        perimeters[label as usize] += border_weight(1 + 2 * axial + 10 * diagonal);
    }
    perimeters
}

/// Label the skeleton's components and measure each one's boundary length.
///
/// Records come back in ascending label order, one per component; an empty
/// skeleton yields an empty vector.
pub fn measure_lengths(
    skeleton: &GrayImage,
    pixel_to_micron: f64,
    method: PerimeterMethod,
) -> Vec<LengthRecord> {
    let (labels, count) = label_components(skeleton);
    let perimeters = match method {
        PerimeterMethod::Contour => contour_perimeters(&labels, count),
        PerimeterMethod::Weighted => weighted_perimeters(&labels, count),
    };

    (1..=count)
        .map(|label| {
            let pixels = perimeters[label as usize];
            LengthRecord {
                label,
                pixels,
                microns: pixels * pixel_to_micron,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_utils::mask_from_fn;
    use assert_approx_eq::assert_approx_eq;

    fn horizontal_line(length: u32) -> GrayImage {
        mask_from_fn(length + 10, 7, |x, y| y == 3 && (5..5 + length).contains(&x))
    }

    #[test]
    fn contour_length_is_about_twice_line_length() {
        let records = measure_lengths(&horizontal_line(20), 0.1, PerimeterMethod::Contour);
        assert_eq!(records.len(), 1);
        assert_approx_eq!(records[0].pixels, 38.0);
        assert!((records[0].pixels - 40.0).abs() <= 2.0);
    }

    #[test]
    fn weighted_length_tracks_line_length() {
        let records = measure_lengths(&horizontal_line(20), 0.1, PerimeterMethod::Weighted);
        assert_eq!(records.len(), 1);
        assert_approx_eq!(records[0].pixels, 18.0);
    }

    #[test]
    fn diagonal_steps_count_root_two() {
        let skeleton = mask_from_fn(12, 12, |x, y| x == y && (2..7).contains(&x));
        let records = measure_lengths(&skeleton, 1.0, PerimeterMethod::Contour);
        assert_approx_eq!(records[0].pixels, 8.0 * std::f64::consts::SQRT_2);

        let records = measure_lengths(&skeleton, 1.0, PerimeterMethod::Weighted);
        // two ends contribute nothing, three interior pixels sqrt(2) each
        assert_approx_eq!(records[0].pixels, 3.0 * std::f64::consts::SQRT_2);
    }

    #[test]
    fn microns_are_exact_product() {
        let scale = 0.070556640625;
        for method in [PerimeterMethod::Contour, PerimeterMethod::Weighted] {
            for record in measure_lengths(&horizontal_line(13), scale, method) {
                assert_eq!(record.microns, record.pixels * scale);
                assert!(record.pixels >= 0.0);
            }
        }
    }

    #[test]
    fn records_follow_label_order() {
        // Short segment first in raster order, long one below it
        let skeleton = mask_from_fn(40, 20, |x, y| {
            (y == 2 && (30..35).contains(&x)) || (y == 10 && (2..30).contains(&x))
        });
        let records = measure_lengths(&skeleton, 1.0, PerimeterMethod::Contour);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].label, 1);
        assert_eq!(records[1].label, 2);
        assert_approx_eq!(records[0].pixels, 8.0);
        assert_approx_eq!(records[1].pixels, 54.0);
    }

    #[test]
    fn empty_skeleton_has_no_records() {
        let skeleton = GrayImage::new(10, 10);
        assert!(measure_lengths(&skeleton, 0.5, PerimeterMethod::Contour).is_empty());
        assert!(measure_lengths(&skeleton, 0.5, PerimeterMethod::Weighted).is_empty());
    }

    #[test]
    fn weighted_is_the_default_estimator() {
        assert_eq!(PerimeterMethod::default(), PerimeterMethod::Weighted);
        let records = measure_lengths(&horizontal_line(20), 0.1, PerimeterMethod::default());
        assert_approx_eq!(records[0].microns, 1.8);
    }

    #[test]
    fn parses_perimeter_names() {
        assert_eq!("Weighted".parse::<PerimeterMethod>().unwrap(), PerimeterMethod::Weighted);
        assert!("area".parse::<PerimeterMethod>().unwrap_err().is_config_error());
    }
}
