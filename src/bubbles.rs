use image::Luma;
use imageproc::point::Point;
use imageproc::rect::Rect;
use imageproc::region_labelling::{connected_components, Connectivity};
use log::debug;
use logging_timer::time;

use crate::config::OmrConfig;
use crate::geometry::{is_roughly_square, rect_from_bounds};
use crate::preprocess::BinaryMask;

/// A connected mark region that might be one answer bubble.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BubbleCandidate {
    pub id: usize,
    /// Mean position of the region's pixels.
    pub centroid: Point<f32>,
    /// Number of foreground pixels in the region.
    pub area: u32,
    pub bounds: Rect,
}

/// Running pixel statistics for one labelled region.
#[derive(Debug, Clone, Copy)]
struct Region {
    area: u32,
    sum_x: u64,
    sum_y: u64,
    min_x: u32,
    min_y: u32,
    max_x: u32,
    max_y: u32,
}

impl Region {
    fn new(x: u32, y: u32) -> Self {
        Self {
            area: 0,
            sum_x: 0,
            sum_y: 0,
            min_x: x,
            min_y: y,
            max_x: x,
            max_y: y,
        }
    }

    fn add(&mut self, x: u32, y: u32) {
        self.area += 1;
        self.sum_x += x as u64;
        self.sum_y += y as u64;
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }

    fn bounds(&self) -> Rect {
        rect_from_bounds(self.min_x, self.min_y, self.max_x, self.max_y)
    }

    fn centroid(&self) -> Point<f32> {
        Point::new(
            (self.sum_x as f64 / self.area as f64) as f32,
            (self.sum_y as f64 / self.area as f64) as f32,
        )
    }
}

/// Collects the 8-connected foreground regions of the mask, in the order
/// their first pixel appears in a raster scan.
fn find_regions(mask: &BinaryMask) -> Vec<Region> {
    let labels = connected_components(mask.as_image(), Connectivity::Eight, Luma([0u8]));
    let mut regions: Vec<Option<Region>> = Vec::new();

    for (x, y, label) in labels.enumerate_pixels() {
        let label = label.0[0] as usize;
        if label == 0 {
            continue;
        }
        if regions.len() <= label {
            regions.resize(label + 1, None);
        }
        regions[label]
            .get_or_insert_with(|| Region::new(x, y))
            .add(x, y);
    }

    let mut regions: Vec<Region> = regions.into_iter().flatten().collect();
    regions.sort_by_key(|r| (r.min_y, r.min_x));
    regions
}

/// Determines whether a region is the right size and shape to be a bubble.
fn region_could_be_bubble(region: &Region, config: &OmrConfig) -> bool {
    region.area >= config.min_contour_area
        && region.area <= config.max_contour_area
        && is_roughly_square(&region.bounds(), config.aspect_ratio_tolerance)
}

/// Finds the mark regions that could be answer bubbles. Noise specks, long
/// strokes and text are filtered out by area and shape. An empty result is
/// not an error here; grid mapping decides whether that is fatal.
#[time]
pub fn detect_candidates(mask: &BinaryMask, config: &OmrConfig) -> Vec<BubbleCandidate> {
    let regions = find_regions(mask);
    let region_count = regions.len();

    let candidates: Vec<BubbleCandidate> = regions
        .iter()
        .filter(|region| region_could_be_bubble(region, config))
        .enumerate()
        .map(|(id, region)| BubbleCandidate {
            id,
            centroid: region.centroid(),
            area: region.area,
            bounds: region.bounds(),
        })
        .collect();

    debug!(
        "kept {} of {} regions as bubble candidates",
        candidates.len(),
        region_count
    );
    candidates
}
