use image::{GrayImage, ImageBuffer, Luma};
use imageproc::region_labelling::{connected_components, Connectivity};

use crate::image_utils::{in_bounds, is_foreground, BACKGROUND, FOREGROUND};

/// Per-pixel component labels; 0 is background
pub type LabelImage = ImageBuffer<Luma<u32>, Vec<u32>>;

pub const BACKGROUND_LABEL: u32 = 0;

/// Direction vectors for Moore-Neighbor contour tracing (clockwise, y down)
pub static MOORE_NEIGHBORHOOD: [(i32, i32); 8] = [
    (1, 0),   // right
    (1, 1),   // down-right
    (0, 1),   // down
    (-1, 1),  // down-left
    (-1, 0),  // left
    (-1, -1), // up-left
    (0, -1),  // up
    (1, -1),  // up-right
];

/// Connected components labeling under 8-neighborhood adjacency.
///
/// Labels run `1..=count` in raster order of each component's first pixel.
/// They are fresh per call and must not be compared across calls.
pub fn label_components(mask: &GrayImage) -> (LabelImage, u32) {
    // Adjacent pixels only join when their values are equal, so collapse to 0/255
    let (width, height) = mask.dimensions();
    let binary = GrayImage::from_fn(width, height, |x, y| {
        Luma([if is_foreground(mask.get_pixel(x, y)) { FOREGROUND } else { BACKGROUND }])
    });

    let labels = connected_components(&binary, Connectivity::Eight, Luma([BACKGROUND]));
    let count = labels.pixels().map(|p| p[0]).max().unwrap_or(BACKGROUND_LABEL);
    (labels, count)
}

/// Pixel count of every label, indexed by label (entry 0 is background)
pub fn component_sizes(labels: &LabelImage, count: u32) -> Vec<usize> {
    let mut sizes = vec![0usize; count as usize + 1];
    for p in labels.pixels() {
        sizes[p[0] as usize] += 1;
    }
    sizes
}

/// First pixel of every label in raster order, indexed by label
pub fn first_pixels(labels: &LabelImage, count: u32) -> Vec<Option<(u32, u32)>> {
    let mut firsts = vec![None; count as usize + 1];
    for (x, y, p) in labels.enumerate_pixels() {
        let slot = &mut firsts[p[0] as usize];
        if slot.is_none() {
            *slot = Some((x, y));
        }
    }
    firsts[BACKGROUND_LABEL as usize] = None;
    firsts
}

/// Trace the outer boundary of one labelled component.
///
/// `start` must be the component's first pixel in raster order. Returns the
/// closed path of boundary pixels (first and last entries coincide) or just
/// `[start]` for an isolated pixel. Tracing stops when the start pixel is
/// left in the same direction as the first move (Jacob's criterion).
pub fn trace_contour(labels: &LabelImage, label: u32, start: (u32, u32)) -> Vec<(u32, u32)> {
    let (width, height) = labels.dimensions();
    let inside = |x: i32, y: i32| -> bool {
        in_bounds(x, y, width, height) && labels.get_pixel(x as u32, y as u32)[0] == label
    };

    let mut contour = vec![start];
    let mut current = (start.0 as i32, start.1 as i32);

    // Nothing left of or above the raster-first pixel belongs to the component
    let mut backtrack = 4;
    let mut first_move = None;

    // Each pixel is entered at most once per side
    let max_steps = 8 * (width as usize * height as usize).min(1 << 24) + 8;

    loop {
        let next = (1..=8)
            .map(|i| (backtrack + i) % 8)
            .find(|&d| {
                let (dx, dy) = MOORE_NEIGHBORHOOD[d];
                inside(current.0 + dx, current.1 + dy)
            });

        let Some(direction) = next else {
            break;
        };

        if current == (start.0 as i32, start.1 as i32) {
            match first_move {
                Some(first) if first == direction => break,
                None => first_move = Some(direction),
                _ => {}
            }
        }

        let (dx, dy) = MOORE_NEIGHBORHOOD[direction];
        current = (current.0 + dx, current.1 + dy);
        contour.push((current.0 as u32, current.1 as u32));

        // The last examined background neighbour, seen from the new pixel
        backtrack = if direction % 2 == 0 {
            (direction + 6) % 8
        } else {
            (direction + 5) % 8
        };

        if contour.len() > max_steps {
            log::warn!(
                "Contour trace for label {} exceeded {} steps, stopping early",
                label,
                max_steps
            );
            break;
        }
    }

    contour
}

/// Euclidean length of a pixel path (unit axial steps, sqrt(2) diagonal steps)
pub fn path_length(path: &[(u32, u32)]) -> f64 {
    path.windows(2)
        .map(|pair| {
            let dx = (pair[1].0 as i64 - pair[0].0 as i64).abs();
            let dy = (pair[1].1 as i64 - pair[0].1 as i64).abs();
            if dx != 0 && dy != 0 {
                std::f64::consts::SQRT_2
            } else {
                (dx + dy) as f64
            }
        })
        .sum()
}
