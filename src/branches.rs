// src/branches.rs - Junction detection and removal of every component that touches one

use std::collections::BTreeSet;
use std::sync::OnceLock;

use image::GrayImage;

use crate::image_utils::{foreground_at, is_foreground, mask_from_fn};
use crate::morphology::{label_components, LabelImage, BACKGROUND_LABEL};

/// Element of a 3x3 hit-or-miss pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cell {
    /// Must be foreground
    Hit,
    /// Must be background
    Miss,
    /// Ignored
    DontCare,
}

/// A 3x3 hit-or-miss structuring element, row-major, top row first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pattern {
    cells: [[Cell; 3]; 3],
}

impl Pattern {
    pub fn new(cells: [[Cell; 3]; 3]) -> Self {
        Self { cells }
    }

    /// Exact pattern: 1 is a hit, 0 is a miss
    pub fn from_bits(rows: [[u8; 3]; 3]) -> Self {
        let cell = |v: u8| if v != 0 { Cell::Hit } else { Cell::Miss };
        Self {
            cells: rows.map(|row| row.map(cell)),
        }
    }

    /// Quarter turn counter-clockwise
    pub fn rotate90(&self) -> Self {
        let mut cells = [[Cell::DontCare; 3]; 3];
        for (r, row) in cells.iter_mut().enumerate() {
            for (c, cell) in row.iter_mut().enumerate() {
                *cell = self.cells[c][2 - r];
            }
        }
        Self { cells }
    }

    /// The pattern at 0, 90, 180 and 270 degrees
    pub fn rotations(&self) -> [Pattern; 4] {
        let r1 = self.rotate90();
        let r2 = r1.rotate90();
        let r3 = r2.rotate90();
        [*self, r1, r2, r3]
    }

    /// Match against a 9-bit neighbourhood code (bit `3 * row + col` set for foreground)
    pub fn matches_code(&self, code: usize) -> bool {
        self.cells.iter().flatten().enumerate().all(|(i, cell)| {
            let set = code >> i & 1 == 1;
            match cell {
                Cell::Hit => set,
                Cell::Miss => !set,
                Cell::DontCare => true,
            }
        })
    }
}

/// Junction shapes used at all four rotations
const ROTATED_BRANCH_SHAPES: [[[u8; 3]; 3]; 6] = [
    [[0, 1, 0], [1, 1, 1], [0, 0, 0]],
    [[1, 0, 1], [0, 1, 0], [1, 0, 0]],
    [[1, 0, 1], [0, 1, 0], [0, 1, 0]],
    [[0, 1, 0], [1, 1, 0], [0, 0, 1]],
    [[0, 0, 1], [1, 1, 1], [0, 1, 0]],
    [[1, 0, 0], [1, 1, 1], [0, 1, 0]],
];

/// Junction shapes used as given
const FIXED_BRANCH_SHAPES: [[[u8; 3]; 3]; 3] = [
    [[0, 1, 0], [1, 1, 1], [0, 1, 0]],
    [[1, 0, 1], [0, 1, 0], [1, 0, 1]],
    [[1, 0, 0], [0, 1, 1], [1, 1, 0]],
];

static BRANCH_PATTERNS: OnceLock<Vec<Pattern>> = OnceLock::new();
static BRANCH_LUT: OnceLock<[bool; 512]> = OnceLock::new();

/// The T-, Y- and X-junction pattern set, duplicates removed, in a stable order
pub fn branch_patterns() -> &'static [Pattern] {
    BRANCH_PATTERNS.get_or_init(|| {
        let mut patterns: Vec<Pattern> = Vec::new();
        let candidates = ROTATED_BRANCH_SHAPES
            .iter()
            .flat_map(|&shape| Pattern::from_bits(shape).rotations())
            .chain(FIXED_BRANCH_SHAPES.iter().map(|&shape| Pattern::from_bits(shape)));

        for pattern in candidates {
            if !patterns.contains(&pattern) {
                patterns.push(pattern);
            }
        }
        patterns
    })
}

/// 512-entry table: neighbourhood code -> matches some branch pattern
fn branch_lut() -> &'static [bool; 512] {
    BRANCH_LUT.get_or_init(|| {
        let patterns = branch_patterns();
        let mut lut = [false; 512];
        for (code, entry) in lut.iter_mut().enumerate() {
            *entry = patterns.iter().any(|p| p.matches_code(code));
        }
        lut
    })
}

/// 9-bit code of the 3x3 neighbourhood centred on (x, y); outside is background
pub fn neighbourhood_code(mask: &GrayImage, x: u32, y: u32) -> usize {
    let mut code = 0;
    for row in 0..3 {
        for col in 0..3 {
            let nx = x as i32 + col as i32 - 1;
            let ny = y as i32 + row as i32 - 1;
            if foreground_at(mask, nx, ny) {
                code |= 1 << (3 * row + col);
            }
        }
    }
    code
}

/// Mark every foreground pixel whose neighbourhood matches a branch pattern.
///
/// Pixels on the outer row or column are never marked: their 3x3 window
/// leaves the image, and cells outside cannot satisfy a pattern.
pub fn branch_points(skeleton: &GrayImage) -> GrayImage {
    let lut = branch_lut();
    let (width, height) = skeleton.dimensions();
    mask_from_fn(width, height, |x, y| {
        let interior = x > 0 && y > 0 && x + 1 < width && y + 1 < height;
        interior
            && is_foreground(skeleton.get_pixel(x, y))
            && lut[neighbourhood_code(skeleton, x, y)]
    })
}

/// Labels of components containing at least one branch point.
///
/// The background label never enters the set, even when `branches` marks a
/// pixel the skeleton does not cover.
pub fn labels_touching(labels: &LabelImage, branches: &GrayImage) -> BTreeSet<u32> {
    labels
        .enumerate_pixels()
        .filter(|&(x, y, _)| is_foreground(branches.get_pixel(x, y)))
        .map(|(_, _, label)| label[0])
        .filter(|&label| label != BACKGROUND_LABEL)
        .collect()
}

/// Build a new skeleton without the components listed in `doomed`
pub fn prune_labels(labels: &LabelImage, doomed: &BTreeSet<u32>) -> GrayImage {
    let (width, height) = labels.dimensions();
    mask_from_fn(width, height, |x, y| {
        let label = labels.get_pixel(x, y)[0];
        label != BACKGROUND_LABEL && !doomed.contains(&label)
    })
}

/// Delete every connected component that contains a branch point, given a
/// precomputed branch-point mask
pub fn remove_branch_components(skeleton: &GrayImage, branches: &GrayImage) -> GrayImage {
    let (labels, count) = label_components(skeleton);
    let doomed = labels_touching(&labels, branches);
    log::debug!(
        "Removing {} of {} skeleton components touching a junction",
        doomed.len(),
        count
    );
    prune_labels(&labels, &doomed)
}

/// Delete every connected component of the skeleton that contains a branch point
pub fn remove_branches(skeleton: &GrayImage) -> GrayImage {
    remove_branch_components(skeleton, &branch_points(skeleton))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_utils::{count_foreground, FOREGROUND};
    use image::Luma;

    fn draw(width: u32, height: u32, pixels: &[(u32, u32)]) -> GrayImage {
        mask_from_fn(width, height, |x, y| pixels.contains(&(x, y)))
    }

    fn straight_segment(y: u32, xs: std::ops::Range<u32>) -> Vec<(u32, u32)> {
        xs.map(|x| (x, y)).collect()
    }

    #[test]
    fn rotation_is_counter_clockwise_and_cyclic() {
        let t = Pattern::from_bits([[0, 1, 0], [1, 1, 1], [0, 0, 0]]);
        let left = Pattern::from_bits([[0, 1, 0], [1, 1, 0], [0, 1, 0]]);
        assert_eq!(t.rotate90(), left);
        assert_eq!(t.rotate90().rotate90().rotate90().rotate90(), t);
    }

    #[test]
    fn pattern_set_is_deduplicated() {
        let patterns = branch_patterns();
        assert_eq!(patterns.len(), 27);
        assert!(patterns.contains(&Pattern::from_bits([[0, 1, 0], [1, 1, 1], [0, 1, 0]])));
        assert!(patterns.contains(&Pattern::from_bits([[1, 0, 1], [0, 1, 0], [1, 0, 1]])));
        // upside-down T
        assert!(patterns.contains(&Pattern::from_bits([[0, 0, 0], [1, 1, 1], [0, 1, 0]])));
    }

    #[test]
    fn dont_care_cells_are_ignored() {
        let mut cells = [[Cell::DontCare; 3]; 3];
        cells[1][1] = Cell::Hit;
        cells[0][1] = Cell::Miss;
        let p = Pattern::new(cells);
        assert!(p.matches_code(0b000_010_000));
        assert!(p.matches_code(0b111_111_101));
        assert!(!p.matches_code(0b000_010_010));
    }

    #[test]
    fn line_has_no_branch_points() {
        let skeleton = draw(20, 5, &straight_segment(2, 3..15));
        assert_eq!(count_foreground(&branch_points(&skeleton)), 0);
    }

    #[test]
    fn t_junction_component_is_removed_and_others_kept() {
        let mut pixels = straight_segment(3, 2..13);
        pixels.extend((4..10).map(|y| (7, y)));
        let lone = straight_segment(15, 4..16);
        pixels.extend(lone.iter().copied());
        let skeleton = draw(20, 20, &pixels);

        let branches = branch_points(&skeleton);
        assert!(is_foreground(branches.get_pixel(7, 3)));

        let pruned = remove_branches(&skeleton);
        assert_eq!(pruned, draw(20, 20, &lone));
    }

    #[test]
    fn y_junction_component_is_removed() {
        // Stem going down from (10, 10), arms going up-left and up-right
        let mut pixels: Vec<(u32, u32)> = (10..16).map(|y| (10, y)).collect();
        pixels.extend((1..6).map(|d| (10 - d, 10 - d)));
        pixels.extend((1..6).map(|d| (10 + d, 10 - d)));
        let skeleton = draw(21, 21, &pixels);

        assert!(is_foreground(branch_points(&skeleton).get_pixel(10, 10)));
        assert_eq!(count_foreground(&remove_branches(&skeleton)), 0);
    }

    #[test]
    fn x_junction_component_is_removed() {
        let pixels: Vec<(u32, u32)> = (0..15)
            .flat_map(|i| [(5 + i, 5 + i), (19 - i, 5 + i)])
            .collect();
        let skeleton = draw(25, 25, &pixels);
        assert!(count_foreground(&branch_points(&skeleton)) >= 1);
        assert_eq!(count_foreground(&remove_branches(&skeleton)), 0);
    }

    #[test]
    fn junction_on_image_border_is_not_marked() {
        // T whose bar runs along the top row
        let mut pixels = straight_segment(0, 2..10);
        pixels.extend((1..6).map(|y| (5, y)));
        let skeleton = draw(12, 8, &pixels);

        assert_eq!(count_foreground(&branch_points(&skeleton)), 0);
        assert_eq!(remove_branches(&skeleton), skeleton);

        // The same T one row down is a junction
        let shifted: Vec<(u32, u32)> = pixels.iter().map(|&(x, y)| (x, y + 1)).collect();
        let skeleton = draw(12, 8, &shifted);
        assert!(is_foreground(branch_points(&skeleton).get_pixel(5, 1)));
        assert_eq!(count_foreground(&remove_branches(&skeleton)), 0);
    }

    #[test]
    fn branch_free_skeleton_is_unchanged() {
        let mut pixels = straight_segment(2, 1..9);
        pixels.extend((4..12).map(|i| (i, i)));
        let skeleton = draw(16, 16, &pixels);
        assert_eq!(remove_branches(&skeleton), skeleton);
    }

    #[test]
    fn empty_skeleton_stays_empty() {
        let skeleton = GrayImage::new(12, 12);
        let pruned = remove_branches(&skeleton);
        assert_eq!(count_foreground(&pruned), 0);
    }

    #[test]
    fn background_label_is_never_removed() {
        let skeleton = draw(10, 10, &straight_segment(5, 1..8));
        let (labels, _) = label_components(&skeleton);

        // A stray marker on background must not select label 0
        let mut branches = GrayImage::new(10, 10);
        branches.put_pixel(0, 0, Luma([FOREGROUND]));
        let doomed = labels_touching(&labels, &branches);
        assert!(doomed.is_empty());
        assert_eq!(prune_labels(&labels, &doomed), skeleton);
    }
}
