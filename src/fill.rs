use std::collections::BTreeMap;

use log::debug;
use logging_timer::time;
use rayon::prelude::*;
use serde::Serialize;

use crate::config::OmrConfig;
use crate::grid::{Grid, GridRow};
use crate::preprocess::BinaryMask;
use crate::types::QuestionId;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FillMeasurement {
    pub candidate_id: usize,
    /// Foreground share of the candidate's bounding box, always in `[0, 1]`.
    pub fill_ratio: f32,
}

/// How a single question was answered on the sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkedChoice {
    /// No bubble reached the fill threshold.
    Unmarked,
    Single(String),
    /// Several bubbles reached the threshold; the intended answer cannot be
    /// known, so none is reported.
    Ambiguous(Vec<String>),
}

impl MarkedChoice {
    /// The single marked label, if there is one.
    pub fn answer(&self) -> Option<&str> {
        match self {
            MarkedChoice::Single(label) => Some(label),
            _ => None,
        }
    }

    pub fn is_ambiguous(&self) -> bool {
        matches!(self, MarkedChoice::Ambiguous(_))
    }
}

/// Per-question resolution for a whole sheet, keyed by question number.
pub type MarkedAnswers = BTreeMap<QuestionId, MarkedChoice>;

#[derive(Debug, Clone, PartialEq)]
pub struct FillAnalysis {
    pub marks: MarkedAnswers,
    /// One entry per grid candidate, in grid order.
    pub measurements: Vec<FillMeasurement>,
}

/// Picks the marked answer from a row's fill ratios. Never guesses between
/// several marks.
pub fn resolve_marks(labeled_ratios: &[(String, f32)], bubble_threshold: f32) -> MarkedChoice {
    let marked: Vec<String> = labeled_ratios
        .iter()
        .filter(|(_, ratio)| *ratio >= bubble_threshold)
        .map(|(label, _)| label.clone())
        .collect();

    match marked.len() {
        0 => MarkedChoice::Unmarked,
        1 => MarkedChoice::Single(marked[0].clone()),
        _ => MarkedChoice::Ambiguous(marked),
    }
}

fn analyze_row(
    row: &GridRow,
    mask: &BinaryMask,
    config: &OmrConfig,
) -> (MarkedChoice, Vec<FillMeasurement>) {
    let mut labeled_ratios = Vec::with_capacity(row.choices.len());
    let mut measurements = Vec::with_capacity(row.choices.len());

    for (label, candidate) in row.labeled_choices() {
        let fill_ratio = mask.fill_ratio(&candidate.bounds).clamp(0.0, 1.0);
        measurements.push(FillMeasurement {
            candidate_id: candidate.id,
            fill_ratio,
        });
        labeled_ratios.push((label, fill_ratio));
    }

    let choice = resolve_marks(&labeled_ratios, config.bubble_threshold);
    debug!(
        "question {}: {:?} (fills {:?})",
        row.question_index + 1,
        choice,
        labeled_ratios
    );
    (choice, measurements)
}

/// Measures how full every bubble is and resolves each question to a single
/// mark, no mark, or an ambiguous multi-mark.
#[time]
pub fn analyze_fill(grid: &Grid, mask: &BinaryMask, config: &OmrConfig) -> FillAnalysis {
    let rows: Vec<(QuestionId, MarkedChoice, Vec<FillMeasurement>)> = grid
        .rows
        .par_iter()
        .map(|row| {
            let (choice, measurements) = analyze_row(row, mask, config);
            (row.question_id(), choice, measurements)
        })
        .collect();

    let mut marks = MarkedAnswers::new();
    let mut measurements = Vec::with_capacity(grid.candidate_count());
    for (question, choice, row_measurements) in rows {
        marks.insert(question, choice);
        measurements.extend(row_measurements);
    }

    FillAnalysis {
        marks,
        measurements,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use image::GrayImage;
    use imageproc::drawing::draw_filled_rect_mut;
    use imageproc::point::Point;
    use imageproc::rect::Rect;
    use proptest::prelude::*;

    use crate::bubbles::BubbleCandidate;
    use crate::image_utils::{BLACK, WHITE};

    fn labeled(ratios: &[f32]) -> Vec<(String, f32)> {
        ratios
            .iter()
            .enumerate()
            .map(|(i, r)| (crate::types::choice_label(i), *r))
            .collect()
    }

    #[test]
    fn test_resolve_marks() {
        assert_eq!(
            resolve_marks(&labeled(&[0.1, 0.2, 0.3]), 0.65),
            MarkedChoice::Unmarked
        );
        assert_eq!(
            resolve_marks(&labeled(&[0.1, 0.9, 0.3]), 0.65),
            MarkedChoice::Single("B".to_string())
        );
        assert_eq!(
            resolve_marks(&labeled(&[0.7, 0.1, 0.95]), 0.65),
            MarkedChoice::Ambiguous(vec!["A".to_string(), "C".to_string()])
        );
    }

    #[test]
    fn test_threshold_is_inclusive() {
        assert_eq!(
            resolve_marks(&labeled(&[0.5, 0.25]), 0.5),
            MarkedChoice::Single("A".to_string())
        );
    }

    /// A grid of 10x10 boxes at x = 10, 30, 50..., y = 10, 30, 50..., with
    /// the given boxes painted solid.
    fn grid_and_mask(rows: usize, choices: usize, filled: &[(usize, usize)]) -> (Grid, BinaryMask) {
        let mut img = GrayImage::from_pixel(20 * choices as u32 + 20, 20 * rows as u32 + 20, BLACK);
        let mut grid_rows = vec![];
        for row in 0..rows {
            let mut row_choices = vec![];
            for choice in 0..choices {
                let bounds = Rect::at(10 + 20 * choice as i32, 10 + 20 * row as i32).of_size(10, 10);
                if filled.contains(&(row, choice)) {
                    draw_filled_rect_mut(&mut img, bounds, WHITE);
                }
                row_choices.push(BubbleCandidate {
                    id: row * choices + choice,
                    centroid: Point::new(bounds.left() as f32 + 5.0, bounds.top() as f32 + 5.0),
                    area: 100,
                    bounds,
                });
            }
            grid_rows.push(GridRow {
                question_index: row,
                choices: row_choices,
            });
        }
        (Grid { rows: grid_rows }, BinaryMask::from_image(img))
    }

    #[test]
    fn test_analyze_fill() {
        let (grid, mask) = grid_and_mask(3, 4, &[(0, 2), (2, 0), (2, 3)]);
        let analysis = analyze_fill(&grid, &mask, &OmrConfig::default());

        assert_eq!(analysis.measurements.len(), 12);
        assert_eq!(
            analysis.marks.get(&QuestionId::from("1")),
            Some(&MarkedChoice::Single("C".to_string()))
        );
        assert_eq!(
            analysis.marks.get(&QuestionId::from("2")),
            Some(&MarkedChoice::Unmarked)
        );
        assert!(analysis.marks[&QuestionId::from("3")].is_ambiguous());
        assert_eq!(analysis.marks[&QuestionId::from("3")].answer(), None);

        let filled = analysis
            .measurements
            .iter()
            .find(|m| m.candidate_id == 2)
            .unwrap();
        assert_eq!(filled.fill_ratio, 1.0);
        let ids: Vec<usize> = analysis.measurements.iter().map(|m| m.candidate_id).collect();
        assert_eq!(ids, (0..12).collect::<Vec<_>>());
    }

    proptest! {
        #[test]
        fn test_fill_ratios_are_fractions(
            filled in proptest::collection::vec((0usize..4, 0usize..5), 0..12),
        ) {
            let (grid, mask) = grid_and_mask(4, 5, &filled);
            let analysis = analyze_fill(&grid, &mask, &OmrConfig::default());
            prop_assert_eq!(analysis.measurements.len(), 20);
            for measurement in &analysis.measurements {
                prop_assert!((0.0..=1.0).contains(&measurement.fill_ratio));
            }
            for (question, choice) in &analysis.marks {
                let row = question.as_str().parse::<usize>().unwrap() - 1;
                let marked_in_row = (0..5).filter(|c| filled.contains(&(row, *c))).count();
                match marked_in_row {
                    0 => prop_assert_eq!(choice, &MarkedChoice::Unmarked),
                    1 => prop_assert!(choice.answer().is_some()),
                    _ => prop_assert!(choice.is_ambiguous()),
                }
            }
        }
    }
}
