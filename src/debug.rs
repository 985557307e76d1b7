use std::path::{Path, PathBuf};

use image::{DynamicImage, GrayImage, RgbImage};
use imageproc::drawing::{draw_cross_mut, draw_filled_rect_mut, draw_hollow_rect_mut};
use log::{debug, warn};

use crate::bubbles::BubbleCandidate;
use crate::fill::FillAnalysis;
use crate::grid::Grid;
use crate::image_utils::{GREEN, PINK, RAINBOW, RED, WHITE_RGB};

/// Creates a path for a debug image.
pub fn debug_image_path(base: &Path, label: &str) -> PathBuf {
    let mut result = PathBuf::from(base);
    result.set_file_name(format!(
        "{}_debug_{}.png",
        base.file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("sheet"),
        label
    ));
    result
}

/// Writes annotated copies of a sheet next to the input image. A disabled
/// writer skips the drawing entirely.
#[derive(Debug, Clone)]
pub struct ImageDebugWriter {
    input_path: PathBuf,
    input_image: Option<GrayImage>,
}

impl ImageDebugWriter {
    pub fn new(input_path: PathBuf, input_image: GrayImage) -> Self {
        Self {
            input_path,
            input_image: Some(input_image),
        }
    }

    pub fn disabled() -> Self {
        Self {
            input_path: PathBuf::new(),
            input_image: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.input_image.is_some()
    }

    /// Draws on a color copy of the input and saves it under `label`.
    /// Returns the written path, if any.
    pub fn write(&self, label: &str, draw: impl FnOnce(&mut RgbImage)) -> Option<PathBuf> {
        let input_image = self.input_image.as_ref()?;
        let mut canvas = DynamicImage::ImageLuma8(input_image.clone()).into_rgb8();
        draw(&mut canvas);
        self.save(label, &canvas)
    }

    /// Saves `image` as-is under `label`.
    pub fn write_image(&self, label: &str, image: &GrayImage) -> Option<PathBuf> {
        if !self.is_enabled() {
            return None;
        }
        let canvas = DynamicImage::ImageLuma8(image.clone()).into_rgb8();
        self.save(label, &canvas)
    }

    fn save(&self, label: &str, canvas: &RgbImage) -> Option<PathBuf> {
        let path = debug_image_path(&self.input_path, label);
        match canvas.save(&path) {
            Ok(()) => {
                debug!("wrote debug image {}", path.display());
                Some(path)
            }
            Err(e) => {
                warn!("could not write debug image {}: {}", path.display(), e);
                None
            }
        }
    }
}

/// Outlines every bubble candidate with its centroid.
pub fn draw_candidates_debug_image_mut(canvas: &mut RgbImage, candidates: &[BubbleCandidate]) {
    for candidate in candidates {
        draw_hollow_rect_mut(canvas, candidate.bounds, PINK);
        draw_cross_mut(
            canvas,
            PINK,
            candidate.centroid.x.round() as i32,
            candidate.centroid.y.round() as i32,
        );
    }
}

/// Outlines the grid, one color per row.
pub fn draw_grid_debug_image_mut(canvas: &mut RgbImage, grid: &Grid) {
    for row in &grid.rows {
        let color = RAINBOW[row.question_index % RAINBOW.len()];
        for candidate in &row.choices {
            draw_hollow_rect_mut(canvas, candidate.bounds, color);
        }
    }
}

/// Fills marked bubbles green and every bubble of an ambiguous question red.
pub fn draw_fill_debug_image_mut(canvas: &mut RgbImage, grid: &Grid, analysis: &FillAnalysis) {
    for row in &grid.rows {
        let Some(choice) = analysis.marks.get(&row.question_id()) else {
            continue;
        };

        for (label, candidate) in row.labeled_choices() {
            if choice.is_ambiguous() {
                draw_filled_rect_mut(canvas, candidate.bounds, RED);
            } else if choice.answer() == Some(label.as_str()) {
                draw_filled_rect_mut(canvas, candidate.bounds, GREEN);
            } else {
                draw_hollow_rect_mut(canvas, candidate.bounds, WHITE_RGB);
            }
        }
    }
}
