use std::fmt::Display;
use std::io;
use std::path::PathBuf;

use crate::grid::LayoutMismatch;
use crate::types::{AnswerKeyId, QuestionId};

pub type OmrResult<T> = Result<T, OmrError>;

/// What a file on disk was being read as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Sheet,
    Config,
    AnswerKey,
    ResultsLog,
}

impl FileKind {
    pub fn stage(self) -> &'static str {
        match self {
            FileKind::Sheet => "decode",
            FileKind::Config => "config",
            FileKind::AnswerKey => "answer-key",
            FileKind::ResultsLog => "results-log",
        }
    }
}

#[derive(Debug)]
pub enum OmrError {
    /// The input bytes could not be read as a raster image.
    ImageDecode(image::ImageError),
    /// The image decoded but has no pixels.
    EmptyImage { width: u32, height: u32 },
    /// The detected bubbles do not form the configured grid.
    LayoutMismatch(LayoutMismatch),
    /// The answer key has no questions, so there is nothing to score against.
    EmptyAnswerKey,
    InvalidConfig(String),
    AnswerKeyNotFound(AnswerKeyId),
    /// A reference sheet question did not resolve to exactly one mark.
    UnresolvedReferenceMark(QuestionId),
    Read(FileKind, PathBuf, io::Error),
    Parse(FileKind, PathBuf, serde_json::Error),
    ResultsLog(io::Error),
}

impl OmrError {
    /// The pipeline stage or collaborator the error came from.
    pub fn stage(&self) -> &'static str {
        match self {
            OmrError::ImageDecode(_) => "decode",
            OmrError::EmptyImage { .. } => "preprocess",
            OmrError::LayoutMismatch(_) => "grid",
            OmrError::EmptyAnswerKey => "scoring",
            OmrError::InvalidConfig(_) => "config",
            OmrError::AnswerKeyNotFound(_) | OmrError::UnresolvedReferenceMark(_) => "answer-key",
            OmrError::Read(kind, ..) | OmrError::Parse(kind, ..) => kind.stage(),
            OmrError::ResultsLog(_) => "results-log",
        }
    }
}

impl Display for OmrError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: ", self.stage())?;
        match self {
            OmrError::ImageDecode(e) => write!(f, "could not decode image: {}", e),
            OmrError::EmptyImage { width, height } => {
                write!(f, "image has no pixels ({}x{})", width, height)
            }
            OmrError::LayoutMismatch(mismatch) => write!(f, "{}", mismatch),
            OmrError::EmptyAnswerKey => write!(f, "answer key has no questions"),
            OmrError::InvalidConfig(reason) => write!(f, "invalid configuration: {}", reason),
            OmrError::AnswerKeyNotFound(id) => write!(f, "answer key '{}' not found", id),
            OmrError::UnresolvedReferenceMark(question) => write!(
                f,
                "reference sheet question {} does not have exactly one mark",
                question
            ),
            OmrError::Read(_, path, e) => write!(f, "could not read {}: {}", path.display(), e),
            OmrError::Parse(_, path, e) => write!(f, "could not parse {}: {}", path.display(), e),
            OmrError::ResultsLog(e) => write!(f, "could not append result: {}", e),
        }
    }
}

impl std::error::Error for OmrError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            OmrError::ImageDecode(e) => Some(e),
            OmrError::Read(_, _, e) | OmrError::ResultsLog(e) => Some(e),
            OmrError::Parse(_, _, e) => Some(e),
            _ => None,
        }
    }
}

impl From<LayoutMismatch> for OmrError {
    fn from(mismatch: LayoutMismatch) -> Self {
        OmrError::LayoutMismatch(mismatch)
    }
}

impl From<image::ImageError> for OmrError {
    fn from(e: image::ImageError) -> Self {
        OmrError::ImageDecode(e)
    }
}
