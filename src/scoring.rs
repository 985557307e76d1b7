use std::collections::BTreeMap;

use log::info;
use logging_timer::time;
use serde::{Deserialize, Serialize};

use crate::answer_key::AnswerKey;
use crate::config::OmrConfig;
use crate::error::{OmrError, OmrResult};
use crate::fill::{MarkedAnswers, MarkedChoice};
use crate::types::{labels_match, QuestionId};

/// Decimal places kept in `EvaluationResult::percentage`.
pub const PERCENTAGE_DECIMALS: i32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionStatus {
    Correct,
    Incorrect,
    NotAttempted,
    /// More than one bubble was marked.
    Invalid,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionResult {
    pub question_number: QuestionId,
    pub marked_answer: Option<String>,
    pub correct_answer: String,
    pub status: QuestionStatus,
}

/// Diagnostics about how a sheet was read. Purely observational: nothing in
/// here feeds into the score.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessingInfo {
    pub image_processing: String,
    pub image_width: u32,
    pub image_height: u32,
    pub candidates_detected: usize,
    pub rows_detected: usize,
    pub ambiguous_questions: Vec<QuestionId>,
    /// Fill ratio of each choice, left to right, per question.
    pub fill_ratios: BTreeMap<QuestionId, Vec<f32>>,
    pub config: OmrConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub score: usize,
    pub total: usize,
    pub percentage: f64,
    /// Marked label per question; empty when nothing (or more than one
    /// bubble) was marked.
    pub marked_answers: BTreeMap<QuestionId, String>,
    pub correct_answers: BTreeMap<QuestionId, String>,
    pub result: BTreeMap<QuestionId, QuestionStatus>,
    pub processing_info: ProcessingInfo,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub correct: usize,
    pub incorrect: usize,
    pub not_attempted: usize,
    pub invalid: usize,
}

impl StatusCounts {
    pub fn total(&self) -> usize {
        self.correct + self.incorrect + self.not_attempted + self.invalid
    }
}

impl EvaluationResult {
    pub fn status_counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for status in self.result.values() {
            match status {
                QuestionStatus::Correct => counts.correct += 1,
                QuestionStatus::Incorrect => counts.incorrect += 1,
                QuestionStatus::NotAttempted => counts.not_attempted += 1,
                QuestionStatus::Invalid => counts.invalid += 1,
            }
        }
        counts
    }

    /// Per-question records in natural question order.
    pub fn question_results(&self) -> Vec<QuestionResult> {
        self.result
            .iter()
            .map(|(question, status)| QuestionResult {
                question_number: question.clone(),
                marked_answer: self
                    .marked_answers
                    .get(question)
                    .filter(|answer| !answer.is_empty())
                    .cloned(),
                correct_answer: self
                    .correct_answers
                    .get(question)
                    .cloned()
                    .unwrap_or_default(),
                status: *status,
            })
            .collect()
    }
}

pub fn round_percentage(value: f64) -> f64 {
    let scale = 10f64.powi(PERCENTAGE_DECIMALS);
    (value * scale).round() / scale
}

fn question_status(mark: Option<&MarkedChoice>, correct_answer: &str) -> QuestionStatus {
    match mark {
        Some(MarkedChoice::Ambiguous(_)) => QuestionStatus::Invalid,
        Some(MarkedChoice::Single(label)) if labels_match(label, correct_answer) => {
            QuestionStatus::Correct
        }
        Some(MarkedChoice::Single(_)) => QuestionStatus::Incorrect,
        Some(MarkedChoice::Unmarked) | None => QuestionStatus::NotAttempted,
    }
}

/// Compares marks against the answer key. The key defines which questions
/// count: marks for questions outside it are ignored and key questions with
/// no detected mark are not attempted.
#[time]
pub fn score(
    marks: &MarkedAnswers,
    answer_key: &AnswerKey,
    processing_info: ProcessingInfo,
) -> OmrResult<EvaluationResult> {
    if answer_key.is_empty() {
        return Err(OmrError::EmptyAnswerKey);
    }

    let mut marked_answers = BTreeMap::new();
    let mut correct_answers = BTreeMap::new();
    let mut result = BTreeMap::new();
    let mut correct_count = 0;

    for (question, correct_answer) in answer_key.iter() {
        let mark = marks.get(question);
        let status = question_status(mark, correct_answer);
        if status == QuestionStatus::Correct {
            correct_count += 1;
        }

        marked_answers.insert(
            question.clone(),
            mark.and_then(MarkedChoice::answer).unwrap_or_default().to_string(),
        );
        correct_answers.insert(question.clone(), correct_answer.clone());
        result.insert(question.clone(), status);
    }

    let total = answer_key.len();
    let percentage = round_percentage(100.0 * correct_count as f64 / total as f64);
    info!("scored {}/{} ({}%)", correct_count, total, percentage);

    Ok(EvaluationResult {
        score: correct_count,
        total,
        percentage,
        marked_answers,
        correct_answers,
        result,
        processing_info,
    })
}

/// Letter grade for a percentage score.
pub fn letter_grade(percentage: f64) -> &'static str {
    match percentage {
        p if p >= 90.0 => "A+",
        p if p >= 80.0 => "A",
        p if p >= 70.0 => "B+",
        p if p >= 60.0 => "B",
        p if p >= 50.0 => "C",
        p if p >= 40.0 => "D",
        _ => "F",
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use proptest::prelude::*;

    fn key(entries: &[(&str, &str)]) -> AnswerKey {
        entries
            .iter()
            .map(|(q, a)| (QuestionId::from(*q), a.to_string()))
            .collect()
    }

    fn marks(entries: &[(&str, MarkedChoice)]) -> MarkedAnswers {
        entries
            .iter()
            .map(|(q, m)| (QuestionId::from(*q), m.clone()))
            .collect()
    }

    fn single(label: &str) -> MarkedChoice {
        MarkedChoice::Single(label.to_string())
    }

    fn five_question_key() -> AnswerKey {
        key(&[("1", "A"), ("2", "B"), ("3", "C"), ("4", "D"), ("5", "A")])
    }

    #[test]
    fn test_scores_mixed_sheet() {
        let marks = marks(&[
            ("1", single("A")),
            ("2", single("B")),
            ("3", single("D")),
            ("4", single("D")),
            ("5", MarkedChoice::Unmarked),
        ]);
        let result = score(&marks, &five_question_key(), ProcessingInfo::default()).unwrap();

        assert_eq!(result.score, 3);
        assert_eq!(result.total, 5);
        assert_eq!(result.percentage, 60.0);
        let statuses: Vec<QuestionStatus> = result.result.values().copied().collect();
        assert_eq!(
            statuses,
            vec![
                QuestionStatus::Correct,
                QuestionStatus::Correct,
                QuestionStatus::Incorrect,
                QuestionStatus::Correct,
                QuestionStatus::NotAttempted,
            ]
        );
        assert_eq!(result.marked_answers[&QuestionId::from("5")], "");
        assert_eq!(result.marked_answers[&QuestionId::from("3")], "D");
    }

    #[test]
    fn test_ambiguous_question_is_invalid() {
        let marks = marks(&[
            ("1", single("A")),
            (
                "2",
                MarkedChoice::Ambiguous(vec!["B".to_string(), "C".to_string()]),
            ),
            ("3", single("C")),
            ("4", single("D")),
            ("5", single("A")),
        ]);
        let result = score(&marks, &five_question_key(), ProcessingInfo::default()).unwrap();

        assert_eq!(result.result[&QuestionId::from("2")], QuestionStatus::Invalid);
        assert_eq!(result.marked_answers[&QuestionId::from("2")], "");
        assert_eq!(result.score, 4);
        assert_eq!(result.total, 5);
        assert_eq!(
            result.status_counts(),
            StatusCounts {
                correct: 4,
                incorrect: 0,
                not_attempted: 0,
                invalid: 1
            }
        );
    }

    #[test]
    fn test_key_defines_the_questions() {
        // question 6 is not in the key; question 5 was never detected
        let marks = marks(&[
            ("1", single("A")),
            ("2", single("B")),
            ("3", single("C")),
            ("4", single("D")),
            ("6", single("E")),
        ]);
        let result = score(&marks, &five_question_key(), ProcessingInfo::default()).unwrap();

        assert_eq!(result.total, 5);
        assert!(!result.result.contains_key(&QuestionId::from("6")));
        assert_eq!(
            result.result[&QuestionId::from("5")],
            QuestionStatus::NotAttempted
        );
    }

    #[test]
    fn test_answers_compare_loosely() {
        let marks = marks(&[("1", single("B"))]);
        let result = score(&marks, &key(&[("1", " b ")]), ProcessingInfo::default()).unwrap();
        assert_eq!(result.score, 1);
    }

    #[test]
    fn test_empty_key_is_an_error() {
        assert!(matches!(
            score(&MarkedAnswers::new(), &AnswerKey::default(), ProcessingInfo::default()),
            Err(OmrError::EmptyAnswerKey)
        ));
    }

    #[test]
    fn test_percentage_rounding() {
        let marks = marks(&[("1", single("A"))]);
        let result = score(
            &marks,
            &key(&[("1", "A"), ("2", "B"), ("3", "C")]),
            ProcessingInfo::default(),
        )
        .unwrap();
        assert_eq!(result.percentage, 33.33);
        assert_eq!(round_percentage(66.666), 66.67);
    }

    #[test]
    fn test_serialized_shape() {
        let marks = marks(&[("1", single("A")), ("2", MarkedChoice::Unmarked)]);
        let result = score(&marks, &key(&[("1", "A"), ("2", "B")]), ProcessingInfo::default())
            .unwrap();
        let json: serde_json::Value = serde_json::to_value(&result).unwrap();

        assert_eq!(json["score"], 1);
        assert_eq!(json["total"], 2);
        assert_eq!(json["percentage"], 50.0);
        assert_eq!(json["marked_answers"]["1"], "A");
        assert_eq!(json["correct_answers"]["2"], "B");
        assert_eq!(json["result"]["1"], "correct");
        assert_eq!(json["result"]["2"], "not_attempted");
        assert!(json["processing_info"].is_object());
    }

    #[test]
    fn test_question_results() {
        let marks = marks(&[("10", single("A")), ("2", single("C"))]);
        let result = score(&marks, &key(&[("10", "A"), ("2", "B")]), ProcessingInfo::default())
            .unwrap();
        let results = result.question_results();

        assert_eq!(results[0].question_number.as_str(), "2");
        assert_eq!(results[0].marked_answer.as_deref(), Some("C"));
        assert_eq!(results[0].status, QuestionStatus::Incorrect);
        assert_eq!(results[1].question_number.as_str(), "10");
        assert_eq!(results[1].correct_answer, "A");
    }

    #[test]
    fn test_letter_grade() {
        assert_eq!(letter_grade(100.0), "A+");
        assert_eq!(letter_grade(90.0), "A+");
        assert_eq!(letter_grade(89.99), "A");
        assert_eq!(letter_grade(60.0), "B");
        assert_eq!(letter_grade(45.0), "D");
        assert_eq!(letter_grade(0.0), "F");
    }

    fn mark_strategy() -> impl Strategy<Value = Option<MarkedChoice>> {
        prop_oneof![
            Just(None),
            Just(Some(MarkedChoice::Unmarked)),
            "[A-E]".prop_map(|l| Some(MarkedChoice::Single(l))),
            Just(Some(MarkedChoice::Ambiguous(vec![
                "A".to_string(),
                "B".to_string()
            ]))),
        ]
    }

    proptest! {
        #[test]
        fn test_statuses_partition_total(
            answers in proptest::collection::vec(("[A-E]", mark_strategy()), 1..40),
        ) {
            let answer_key: AnswerKey = answers
                .iter()
                .enumerate()
                .map(|(i, (a, _))| (QuestionId::from_row_index(i), a.clone()))
                .collect();
            let marks: MarkedAnswers = answers
                .iter()
                .enumerate()
                .filter_map(|(i, (_, m))| m.clone().map(|m| (QuestionId::from_row_index(i), m)))
                .collect();

            let result = score(&marks, &answer_key, ProcessingInfo::default()).unwrap();
            let counts = result.status_counts();

            prop_assert_eq!(result.total, answers.len());
            prop_assert_eq!(counts.total(), result.total);
            prop_assert_eq!(counts.correct, result.score);
            prop_assert_eq!(
                result.percentage,
                round_percentage(100.0 * result.score as f64 / result.total as f64)
            );

            // no hidden state: scoring again gives the same result
            let again = score(&marks, &answer_key, ProcessingInfo::default()).unwrap();
            prop_assert_eq!(&again, &result);
            prop_assert_eq!(
                serde_json::to_string(&again).unwrap(),
                serde_json::to_string(&result).unwrap()
            );
        }
    }
}
