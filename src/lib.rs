//! Bubble-sheet (OMR) reading and scoring.
//!
//! A sheet goes through five stages, each a pure function of its inputs:
//! [`preprocess`](preprocess::preprocess) binarizes the image,
//! [`detect_candidates`](bubbles::detect_candidates) finds bubble-shaped
//! regions, [`map_to_grid`](grid::map_to_grid) arranges them into questions
//! and choices, [`analyze_fill`](fill::analyze_fill) decides which bubble (if
//! any) was marked, and [`score`](scoring::score) compares the marks with an
//! answer key. [`evaluate_sheet`](interpret::evaluate_sheet) runs them all.

pub mod answer_key;
pub mod bubbles;
pub mod config;
pub mod debug;
pub mod error;
pub mod fill;
pub mod geometry;
pub mod grid;
pub mod image_utils;
pub mod interpret;
pub mod preprocess;
pub mod results_log;
pub mod scoring;
pub mod types;

pub use answer_key::{AnswerKey, AnswerKeyDirectory, AnswerKeyStore};
pub use config::OmrConfig;
pub use error::{FileKind, OmrError, OmrResult};
pub use interpret::{
    evaluate_sheet, evaluate_sheet_bytes, evaluate_sheet_file, extract_answer_key,
    extract_answer_key_file,
};
pub use scoring::{letter_grade, EvaluationResult, QuestionStatus};
