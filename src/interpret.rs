use std::path::Path;

use image::ImageFormat;
use log::info;
use logging_timer::time;

use crate::answer_key::AnswerKey;
use crate::bubbles::{detect_candidates, BubbleCandidate};
use crate::config::OmrConfig;
use crate::debug::{
    draw_candidates_debug_image_mut, draw_fill_debug_image_mut, draw_grid_debug_image_mut,
    ImageDebugWriter,
};
use crate::error::{FileKind, OmrError, OmrResult};
use crate::fill::{analyze_fill, FillAnalysis};
use crate::grid::{map_to_grid, Grid};
use crate::preprocess::{decode_image, preprocess, RawImage};
use crate::scoring::{score, EvaluationResult, ProcessingInfo};

/// Everything read off a sheet before it is compared with a key.
#[derive(Debug, Clone)]
pub struct SheetMarks {
    pub image_size: (u32, u32),
    pub candidates: Vec<BubbleCandidate>,
    pub grid: Grid,
    pub fill: FillAnalysis,
}

impl SheetMarks {
    pub fn processing_info(&self, config: &OmrConfig) -> ProcessingInfo {
        let fill_ratios = self
            .grid
            .rows
            .iter()
            .map(|row| {
                let ratios = row
                    .choices
                    .iter()
                    .map(|candidate| {
                        self.fill
                            .measurements
                            .iter()
                            .find(|m| m.candidate_id == candidate.id)
                            .map_or(0.0, |m| m.fill_ratio)
                    })
                    .collect();
                (row.question_id(), ratios)
            })
            .collect();

        ProcessingInfo {
            image_processing: "adaptive_threshold".to_string(),
            image_width: self.image_size.0,
            image_height: self.image_size.1,
            candidates_detected: self.candidates.len(),
            rows_detected: self.grid.rows.len(),
            ambiguous_questions: self
                .fill
                .marks
                .iter()
                .filter(|(_, choice)| choice.is_ambiguous())
                .map(|(question, _)| question.clone())
                .collect(),
            fill_ratios,
            config: config.clone(),
        }
    }
}

/// Reads the marks off a sheet: binarize, find bubbles, lay them out on the
/// question grid, and resolve each question's mark.
#[time]
pub fn read_sheet_marks(
    image: &RawImage,
    config: &OmrConfig,
    debug: &ImageDebugWriter,
) -> OmrResult<SheetMarks> {
    config.validate()?;

    let mask = preprocess(image, config)?;
    debug.write_image("binary", mask.as_image());

    let candidates = detect_candidates(&mask, config);
    debug.write("candidates", |canvas| {
        draw_candidates_debug_image_mut(canvas, &candidates)
    });

    let grid = map_to_grid(&candidates, mask.height(), config)?;
    debug.write("grid", |canvas| draw_grid_debug_image_mut(canvas, &grid));

    let fill = analyze_fill(&grid, &mask, config);
    debug.write("fill", |canvas| {
        draw_fill_debug_image_mut(canvas, &grid, &fill)
    });

    Ok(SheetMarks {
        image_size: (mask.width(), mask.height()),
        candidates,
        grid,
        fill,
    })
}

/// Reads a sheet and scores it against `answer_key`.
#[time]
pub fn evaluate_sheet(
    image: &RawImage,
    answer_key: &AnswerKey,
    config: &OmrConfig,
    debug: &ImageDebugWriter,
) -> OmrResult<EvaluationResult> {
    if answer_key.is_empty() {
        return Err(OmrError::EmptyAnswerKey);
    }

    let marks = read_sheet_marks(image, config, debug)?;
    score(&marks.fill.marks, answer_key, marks.processing_info(config))
}

/// Decodes `bytes` (sniffing the format unless one is declared) and
/// evaluates the sheet.
pub fn evaluate_sheet_bytes(
    bytes: &[u8],
    format: Option<ImageFormat>,
    answer_key: &AnswerKey,
    config: &OmrConfig,
) -> OmrResult<EvaluationResult> {
    let image = decode_image(bytes, format)?;
    evaluate_sheet(&image, answer_key, config, &ImageDebugWriter::disabled())
}

fn load_sheet(path: &Path) -> OmrResult<RawImage> {
    let bytes = std::fs::read(path)
        .map_err(|e| OmrError::Read(FileKind::Sheet, path.to_path_buf(), e))?;

    // the bytes decide the format; the extension is only a fallback for
    // formats without a recognisable signature
    match decode_image(&bytes, None) {
        Ok(image) => Ok(image),
        Err(sniff_error) => match ImageFormat::from_path(path) {
            Ok(format) => decode_image(&bytes, Some(format)).map_err(|_| sniff_error),
            Err(_) => Err(sniff_error),
        },
    }
}

fn debug_writer_for(path: &Path, image: &RawImage, debug: bool) -> ImageDebugWriter {
    if debug {
        ImageDebugWriter::new(path.to_path_buf(), image.to_luma8())
    } else {
        ImageDebugWriter::disabled()
    }
}

/// Loads a sheet image from disk and evaluates it.
#[time]
pub fn evaluate_sheet_file(
    path: &Path,
    answer_key: &AnswerKey,
    config: &OmrConfig,
    debug: bool,
) -> OmrResult<EvaluationResult> {
    info!("processing image: {}", path.display());
    let image = load_sheet(path)?;
    let debug = debug_writer_for(path, &image, debug);
    evaluate_sheet(&image, answer_key, config, &debug)
}

/// Reads the answer key off a reference sheet filled in with the correct
/// answers.
#[time]
pub fn extract_answer_key(
    image: &RawImage,
    config: &OmrConfig,
    debug: &ImageDebugWriter,
) -> OmrResult<AnswerKey> {
    let marks = read_sheet_marks(image, config, debug)?;
    AnswerKey::from_reference_marks(&marks.fill.marks)
}

/// Loads a reference sheet from disk and reads its answer key.
pub fn extract_answer_key_file(path: &Path, config: &OmrConfig, debug: bool) -> OmrResult<AnswerKey> {
    info!("reading answer key from reference sheet: {}", path.display());
    let image = load_sheet(path)?;
    let debug = debug_writer_for(path, &image, debug);
    extract_answer_key(&image, config, &debug)
}
