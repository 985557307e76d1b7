use std::fmt::Display;

use log::{debug, warn};
use logging_timer::time;

use crate::bubbles::BubbleCandidate;
use crate::config::OmrConfig;
use crate::types::{choice_label, QuestionId};

/// One question's bubbles, ordered left to right.
#[derive(Debug, Clone, PartialEq)]
pub struct GridRow {
    /// Zero-based, top to bottom.
    pub question_index: usize,
    pub choices: Vec<BubbleCandidate>,
}

impl GridRow {
    pub fn question_id(&self) -> QuestionId {
        QuestionId::from_row_index(self.question_index)
    }

    /// Pairs each choice with its label: "A", "B", ...
    pub fn labeled_choices(&self) -> impl Iterator<Item = (String, &BubbleCandidate)> {
        self.choices
            .iter()
            .enumerate()
            .map(|(position, candidate)| (choice_label(position), candidate))
    }
}

/// The question/choice layout recovered from a sheet, rows top to bottom.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    pub rows: Vec<GridRow>,
}

impl Grid {
    pub fn candidate_count(&self) -> usize {
        self.rows.iter().map(|row| row.choices.len()).sum()
    }
}

/// The bubbles on a sheet do not line up with the configured layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutMismatch {
    RowCount {
        expected: usize,
        observed: usize,
    },
    ChoiceCount {
        /// Zero-based row index.
        question_index: usize,
        expected: usize,
        observed: usize,
    },
}

impl Display for LayoutMismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LayoutMismatch::RowCount { expected, observed } => write!(
                f,
                "expected {} question rows, found {}",
                expected, observed
            ),
            LayoutMismatch::ChoiceCount {
                question_index,
                expected,
                observed,
            } => write!(
                f,
                "expected {} choices for question {}, found {}",
                expected,
                question_index + 1,
                observed
            ),
        }
    }
}

/// Vertical distance from a row's mean centre within which a candidate still
/// belongs to that row: the expected row pitch (sheet height split evenly
/// across the questions) scaled by the configured slack. All skew tolerance
/// lives here; `cluster_rows` only applies the band.
pub fn row_tolerance_band(image_height: u32, config: &OmrConfig) -> f32 {
    let expected_pitch = image_height as f32 / config.total_questions.max(1) as f32;
    expected_pitch * config.row_tolerance
}

/// Groups candidates into rows by vertical centroid. A candidate joins the
/// current row while it lies within `band` of that row's mean centre;
/// otherwise it starts a new row. Rows come back top to bottom, each sorted
/// left to right.
pub fn cluster_rows(candidates: &[BubbleCandidate], band: f32) -> Vec<Vec<BubbleCandidate>> {
    let mut sorted = candidates.to_vec();
    sorted.sort_by(|a, b| {
        a.centroid
            .y
            .total_cmp(&b.centroid.y)
            .then(a.centroid.x.total_cmp(&b.centroid.x))
    });

    let mut rows: Vec<Vec<BubbleCandidate>> = vec![];
    let mut row_sum_y = 0.0f32;

    for candidate in sorted {
        let current_row = rows
            .last_mut()
            .filter(|row| (candidate.centroid.y - row_sum_y / row.len() as f32).abs() <= band);

        match current_row {
            Some(row) => {
                row_sum_y += candidate.centroid.y;
                row.push(candidate);
            }
            None => {
                row_sum_y = candidate.centroid.y;
                rows.push(vec![candidate]);
            }
        }
    }

    for row in &mut rows {
        row.sort_by(|a, b| a.centroid.x.total_cmp(&b.centroid.x));
    }
    rows
}

/// Arranges bubble candidates into the configured question/choice grid.
///
/// Any disagreement with the configuration, whether missing or surplus rows
/// or bubbles, fails with [`LayoutMismatch`]. Nothing is padded or dropped,
/// since either would silently change a grade.
#[time]
pub fn map_to_grid(
    candidates: &[BubbleCandidate],
    image_height: u32,
    config: &OmrConfig,
) -> Result<Grid, LayoutMismatch> {
    let band = row_tolerance_band(image_height, config);
    let rows = cluster_rows(candidates, band);
    debug!(
        "clustered {} candidates into {} rows (band {:.1}px)",
        candidates.len(),
        rows.len(),
        band
    );

    if rows.len() != config.total_questions {
        warn!(
            "expected {} question rows, found {}",
            config.total_questions,
            rows.len()
        );
        return Err(LayoutMismatch::RowCount {
            expected: config.total_questions,
            observed: rows.len(),
        });
    }

    if let Some((question_index, row)) = rows
        .iter()
        .enumerate()
        .find(|(_, row)| row.len() != config.questions_per_row)
    {
        warn!(
            "question {}: expected {} bubbles, found {}",
            question_index + 1,
            config.questions_per_row,
            row.len()
        );
        return Err(LayoutMismatch::ChoiceCount {
            question_index,
            expected: config.questions_per_row,
            observed: row.len(),
        });
    }

    Ok(Grid {
        rows: rows
            .into_iter()
            .enumerate()
            .map(|(question_index, choices)| GridRow {
                question_index,
                choices,
            })
            .collect(),
    })
}
