use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{FileKind, OmrError, OmrResult};

/// Tunable parameters for reading a sheet. Loaded once and shared read-only
/// by every evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OmrConfig {
    /// Number of answer choices per question (bubbles per grid row).
    pub questions_per_row: usize,
    /// Number of questions (grid rows) on the sheet.
    pub total_questions: usize,
    /// Minimum fill ratio for a bubble to count as marked.
    pub bubble_threshold: f32,
    /// Gaussian smoothing kernel width in pixels; 0 or 1 disables smoothing.
    pub blur_kernel_size: u32,
    /// Pixels brighter than this are never marks, whatever their surroundings.
    pub binarization_threshold: u8,
    /// Side of the square neighbourhood used for the local mean.
    pub adaptive_block_size: u32,
    /// How far below the local mean a pixel must be to count as a mark.
    pub adaptive_offset: u8,
    pub min_contour_area: u32,
    pub max_contour_area: u32,
    /// Allowed deviation of a candidate's width/height ratio from 1.
    pub aspect_ratio_tolerance: f32,
    /// Slack factor applied to the expected row spacing when clustering rows.
    pub row_tolerance: f32,
}

impl Default for OmrConfig {
    fn default() -> Self {
        Self {
            questions_per_row: 5,
            total_questions: 10,
            bubble_threshold: 0.65,
            blur_kernel_size: 5,
            binarization_threshold: 180,
            adaptive_block_size: 31,
            adaptive_offset: 2,
            min_contour_area: 20,
            max_contour_area: 400,
            aspect_ratio_tolerance: 0.3,
            row_tolerance: 0.35,
        }
    }
}

impl OmrConfig {
    pub fn from_json_file(path: &Path) -> OmrResult<Self> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| OmrError::Read(FileKind::Config, path.to_path_buf(), e))?;
        let config: OmrConfig = serde_json::from_str(&json)
            .map_err(|e| OmrError::Parse(FileKind::Config, path.to_path_buf(), e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> OmrResult<()> {
        let invalid = |reason: String| Err(OmrError::InvalidConfig(reason));

        if self.total_questions == 0 {
            return invalid("total_questions must be at least 1".to_string());
        }
        if !(1..=26).contains(&self.questions_per_row) {
            return invalid(format!(
                "questions_per_row must be between 1 and 26, got {}",
                self.questions_per_row
            ));
        }
        if !(self.bubble_threshold > 0.0 && self.bubble_threshold <= 1.0) {
            return invalid(format!(
                "bubble_threshold must be in (0, 1], got {}",
                self.bubble_threshold
            ));
        }
        if self.blur_kernel_size > 1 && self.blur_kernel_size % 2 == 0 {
            return invalid(format!(
                "blur_kernel_size must be odd, got {}",
                self.blur_kernel_size
            ));
        }
        if self.adaptive_block_size < 3 || self.adaptive_block_size % 2 == 0 {
            return invalid(format!(
                "adaptive_block_size must be odd and at least 3, got {}",
                self.adaptive_block_size
            ));
        }
        if self.min_contour_area > self.max_contour_area {
            return invalid(format!(
                "min_contour_area ({}) exceeds max_contour_area ({})",
                self.min_contour_area, self.max_contour_area
            ));
        }
        if !(self.aspect_ratio_tolerance >= 0.0) {
            return invalid("aspect_ratio_tolerance must not be negative".to_string());
        }
        if !(self.row_tolerance > 0.0) {
            return invalid("row_tolerance must be positive".to_string());
        }

        Ok(())
    }
}
