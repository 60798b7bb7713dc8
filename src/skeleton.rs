// src/skeleton.rs - Thinning to one-pixel-wide curves and fragment cleanup

use std::sync::OnceLock;

use image::{GrayImage, Luma};

use crate::image_utils::{foreground_at, mask_from_fn, BACKGROUND};
use crate::morphology::{component_sizes, label_components};

/// Neighbour offsets in bit order of the 8-neighbourhood code:
/// E, NE, N, NW, W, SW, S, SE (y grows downward)
const NEIGHBOUR_BITS: [(i32, i32); 8] = [
    (1, 0),
    (1, -1),
    (0, -1),
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/// Deletion tables for the two thinning sub-iterations
static THIN_LUTS: OnceLock<[[bool; 256]; 2]> = OnceLock::new();

#[inline]
fn bit(code: usize, i: usize) -> bool {
    code >> i & 1 == 1
}

/// Exactly one 4-connected transition into an 8-connected run
fn single_crossing(code: usize) -> bool {
    (0..8)
        .step_by(2)
        .filter(|&i| !bit(code, i) && (bit(code, i + 1) || bit(code, (i + 2) % 8)))
        .count()
        == 1
}

/// Endpoint/interior guard: 2 <= min(N1, N2) <= 3
fn neighbour_count_ok(code: usize) -> bool {
    let (mut n1, mut n2) = (0, 0);
    for k in [1, 3, 5, 7] {
        if bit(code, k) || bit(code, k - 1) {
            n1 += 1;
        }
        if bit(code, k) || bit(code, (k + 1) % 8) {
            n2 += 1;
        }
    }
    (2..=3).contains(&n1.min(n2))
}

fn thin_luts() -> &'static [[bool; 256]; 2] {
    THIN_LUTS.get_or_init(|| {
        let mut luts = [[false; 256]; 2];
        for code in 0..256 {
            if !(single_crossing(code) && neighbour_count_ok(code)) {
                continue;
            }
            // First pass peels south-east boundaries, second pass north-west
            luts[0][code] = !((bit(code, 1) || bit(code, 2) || !bit(code, 7)) && bit(code, 0));
            luts[1][code] = !((bit(code, 5) || bit(code, 6) || !bit(code, 3)) && bit(code, 4));
        }
        luts
    })
}

fn neighbour_code(mask: &GrayImage, x: u32, y: u32) -> usize {
    NEIGHBOUR_BITS
        .iter()
        .enumerate()
        .filter(|(_, &(dx, dy))| foreground_at(mask, x as i32 + dx, y as i32 + dy))
        .fold(0, |code, (i, _)| code | 1 << i)
}

/// Morphological thinning: repeatedly peel boundary pixels that are not
/// needed for connectivity until the foreground is one pixel wide.
///
/// Both sub-iterations evaluate the whole image before deleting, and the
/// loop stops once a full pass deletes nothing.
pub fn thin(mask: &GrayImage) -> GrayImage {
    let (width, height) = mask.dimensions();
    let mut skeleton = mask_from_fn(width, height, |x, y| foreground_at(mask, x as i32, y as i32));
    let luts = thin_luts();

    loop {
        let mut changed = false;
        for lut in luts {
            let doomed: Vec<(u32, u32)> = skeleton
                .enumerate_pixels()
                .filter(|(_, _, p)| p[0] != BACKGROUND)
                .filter(|&(x, y, _)| lut[neighbour_code(&skeleton, x, y)])
                .map(|(x, y, _)| (x, y))
                .collect();

            changed |= !doomed.is_empty();
            for (x, y) in doomed {
                skeleton.put_pixel(x, y, Luma([BACKGROUND]));
            }
        }
        if !changed {
            break;
        }
    }

    skeleton
}

/// Delete every 8-connected component with fewer than `min_size` pixels
pub fn remove_small_objects(mask: &GrayImage, min_size: u32) -> GrayImage {
    let (labels, count) = label_components(mask);
    let sizes = component_sizes(&labels, count);
    let (width, height) = mask.dimensions();

    mask_from_fn(width, height, |x, y| {
        let label = labels.get_pixel(x, y)[0] as usize;
        label != 0 && sizes[label] >= min_size as usize
    })
}

/// Thin the mask, then drop fragments shorter than `min_fragment` pixels
pub fn skeletonize(mask: &GrayImage, min_fragment: u32) -> GrayImage {
    remove_small_objects(&thin(mask), min_fragment)
}
