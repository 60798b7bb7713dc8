// src/threshold.rs - Global threshold selection and binarisation

use std::fmt;
use std::str::FromStr;

use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::errors::NanotubeError;
use crate::image_utils::{mask_from_fn, Gray16Image};
use crate::smoothing::gaussian_smooth;

/// Number of histogram bins used by every threshold strategy
pub const HISTOGRAM_BINS: usize = 256;

/// Statistical method used to pick the global threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdMethod {
    /// Yen's entropic-correlation maximisation
    #[default]
    #[serde(alias = "yen")]
    Entropy,
    /// Otsu's between-class variance maximisation
    #[serde(alias = "otsu")]
    Variance,
    /// Iterative intermeans (ISODATA)
    #[serde(alias = "isodata")]
    Bisection,
    /// Triangle method on the histogram peak
    #[serde(alias = "tri")]
    Triangle,
}

impl ThresholdMethod {
    pub fn name(&self) -> &'static str {
        match self {
            ThresholdMethod::Entropy => "entropy",
            ThresholdMethod::Variance => "variance",
            ThresholdMethod::Bisection => "bisection",
            ThresholdMethod::Triangle => "triangle",
        }
    }

    /// Threshold intensity for the given histogram
    pub fn select(&self, histogram: &Histogram) -> f64 {
        if histogram.is_flat() {
            return histogram.min;
        }
        match self {
            ThresholdMethod::Entropy => yen_threshold(histogram),
            ThresholdMethod::Variance => otsu_threshold(histogram),
            ThresholdMethod::Bisection => isodata_threshold(histogram),
            ThresholdMethod::Triangle => triangle_threshold(histogram),
        }
    }
}

impl fmt::Display for ThresholdMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ThresholdMethod {
    type Err = NanotubeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "entropy" | "yen" => Ok(ThresholdMethod::Entropy),
            "variance" | "otsu" => Ok(ThresholdMethod::Variance),
            "bisection" | "isodata" => Ok(ThresholdMethod::Bisection),
            "triangle" | "tri" => Ok(ThresholdMethod::Triangle),
            _ => Err(NanotubeError::UnknownThresholdMethod(s.to_string())),
        }
    }
}

/// Intensity histogram with equal-width bins spanning `[min, max]`
#[derive(Debug, Clone)]
pub struct Histogram {
    pub counts: Vec<u64>,
    pub min: f64,
    pub max: f64,
}

impl Histogram {
    pub fn from_image(image: &Gray16Image) -> Self {
        let (min, max) = image
            .pixels()
            .fold((u16::MAX, u16::MIN), |(lo, hi), p| (lo.min(p[0]), hi.max(p[0])));

        let mut counts = vec![0u64; HISTOGRAM_BINS];
        if image.width() == 0 || image.height() == 0 {
            return Self { counts, min: 0.0, max: 0.0 };
        }

        let (min, max) = (min as f64, max as f64);
        let span = max - min;
        for p in image.pixels() {
            let bin = if span > 0.0 {
                (((p[0] as f64 - min) / span) * HISTOGRAM_BINS as f64) as usize
            } else {
                0
            };
            counts[bin.min(HISTOGRAM_BINS - 1)] += 1;
        }

        Self { counts, min, max }
    }

    pub fn is_flat(&self) -> bool {
        self.max <= self.min
    }

    pub fn bin_width(&self) -> f64 {
        (self.max - self.min) / HISTOGRAM_BINS as f64
    }

    pub fn center(&self, bin: usize) -> f64 {
        self.min + (bin as f64 + 0.5) * self.bin_width()
    }

    /// Upper boundary of a bin; every sample counted in `bin` lies below it
    pub fn upper_edge(&self, bin: usize) -> f64 {
        self.min + (bin as f64 + 1.0) * self.bin_width()
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }
}

/// Index of the first maximum among the candidate scores
fn first_argmax(scores: impl Iterator<Item = (usize, f64)>) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (idx, score) in scores {
        if !score.is_finite() {
            continue;
        }
        match best {
            Some((_, s)) if s >= score => {}
            _ => best = Some((idx, score)),
        }
    }
    best.map(|(idx, _)| idx)
}

fn yen_threshold(histogram: &Histogram) -> f64 {
    let total = histogram.total() as f64;
    let pmf: Vec<f64> = histogram.counts.iter().map(|&c| c as f64 / total).collect();
    let n = pmf.len();

    let mut p1 = vec![0.0; n];
    let mut p1_sq = vec![0.0; n];
    let mut p2_sq = vec![0.0; n];
    let (mut acc, mut acc_sq) = (0.0, 0.0);
    for i in 0..n {
        acc += pmf[i];
        acc_sq += pmf[i] * pmf[i];
        p1[i] = acc;
        p1_sq[i] = acc_sq;
    }
    let mut acc_sq = 0.0;
    for i in (0..n).rev() {
        acc_sq += pmf[i] * pmf[i];
        p2_sq[i] = acc_sq;
    }

    let scores = (0..n - 1).filter_map(|i| {
        let spread = p1[i] * (1.0 - p1[i]);
        let correlation = p1_sq[i] * p2_sq[i + 1];
        (spread > 0.0 && correlation > 0.0)
            .then(|| (i, 2.0 * spread.ln() - correlation.ln()))
    });

    first_argmax(scores)
        .map(|i| histogram.upper_edge(i))
        .unwrap_or(histogram.min)
}

fn otsu_threshold(histogram: &Histogram) -> f64 {
    let n = histogram.counts.len();
    let centers: Vec<f64> = (0..n).map(|i| histogram.center(i)).collect();
    let total_weight = histogram.total() as f64;
    let total_mass: f64 = histogram
        .counts
        .iter()
        .zip(&centers)
        .map(|(&c, &v)| c as f64 * v)
        .sum();

    let mut weight_low = 0.0;
    let mut mass_low = 0.0;
    let scores = (0..n - 1).map(|i| {
        weight_low += histogram.counts[i] as f64;
        mass_low += histogram.counts[i] as f64 * centers[i];
        let weight_high = total_weight - weight_low;
        if weight_low == 0.0 || weight_high == 0.0 {
            return (i, 0.0);
        }
        let mean_low = mass_low / weight_low;
        let mean_high = (total_mass - mass_low) / weight_high;
        (i, weight_low * weight_high * (mean_low - mean_high).powi(2))
    });

    first_argmax(scores)
        .map(|i| histogram.upper_edge(i))
        .unwrap_or(histogram.min)
}

fn isodata_threshold(histogram: &Histogram) -> f64 {
    let centers: Vec<f64> = (0..histogram.counts.len()).map(|i| histogram.center(i)).collect();

    // Means of the bins at or below, and above, a threshold
    let split_means = |t: f64| -> Option<(f64, f64)> {
        let (mut w_lo, mut m_lo, mut w_hi, mut m_hi) = (0.0, 0.0, 0.0, 0.0);
        for (&c, &v) in histogram.counts.iter().zip(&centers) {
            let c = c as f64;
            if v <= t {
                w_lo += c;
                m_lo += c * v;
            } else {
                w_hi += c;
                m_hi += c * v;
            }
        }
        (w_lo > 0.0 && w_hi > 0.0).then(|| (m_lo / w_lo, m_hi / w_hi))
    };

    let total = histogram.total() as f64;
    let mut t = histogram
        .counts
        .iter()
        .zip(&centers)
        .map(|(&c, &v)| c as f64 * v)
        .sum::<f64>()
        / total;

    let tolerance = histogram.bin_width() / 2.0;
    for _ in 0..HISTOGRAM_BINS {
        let Some((mean_low, mean_high)) = split_means(t) else {
            break;
        };
        let next = (mean_low + mean_high) / 2.0;
        let converged = (next - t).abs() < tolerance;
        t = next;
        if converged {
            break;
        }
    }
    t
}

fn triangle_threshold(histogram: &Histogram) -> f64 {
    let counts = &histogram.counts;
    let n = counts.len();

    let first = counts.iter().position(|&c| c > 0).unwrap_or(0);
    let last = counts.iter().rposition(|&c| c > 0).unwrap_or(n - 1);
    let peak = first_argmax(counts.iter().map(|&c| c as f64).enumerate()).unwrap_or(0);

    // Work on the longer tail; mirror when it lies left of the peak
    let flip = (peak - first) > (last - peak);
    let at = |i: usize| -> f64 {
        if flip {
            counts[n - 1 - i] as f64
        } else {
            counts[i] as f64
        }
    };
    let (peak, end) = if flip { (n - 1 - peak, n - 1 - first) } else { (peak, last) };

    if end <= peak {
        return histogram.upper_edge(if flip { n - 1 - peak } else { peak });
    }

    let height = at(peak);
    let width = (end - peak) as f64;
    // Vertical distance (scaled) from each bin top to the peak-to-tail line
    let scores = (peak..=end).map(|i| {
        let x = (i - peak) as f64;
        (i, height * (width - x) - width * at(i))
    });

    let best = first_argmax(scores).unwrap_or(peak);
    if flip {
        // Mirrored bins split on their lower side
        histogram.upper_edge(n - 1 - best) - histogram.bin_width()
    } else {
        histogram.upper_edge(best)
    }
}

/// Smooth with the given `sigma`, then keep pixels strictly above the
/// method's threshold.
///
/// Re-thresholding a mask is stable for `Variance` and `Bisection`.
/// `Entropy` and `Triangle` place the level inside the blur halo, so each
/// pass can add the ring of pixels bordering the mask.
pub fn threshold_image(image: &Gray16Image, sigma: f32, method: ThresholdMethod) -> GrayImage {
    let smoothed = gaussian_smooth(image, sigma);
    let level = method.select(&Histogram::from_image(&smoothed));
    log::debug!("{} threshold level: {:.1}", method, level);

    let (width, height) = smoothed.dimensions();
    mask_from_fn(width, height, |x, y| smoothed.get_pixel(x, y)[0] as f64 > level)
}
