use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{FileKind, OmrError, OmrResult};
use crate::fill::MarkedAnswers;
use crate::types::{AnswerKeyId, QuestionId};

/// Correct choice label per question number.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "AnswerKeyDocument")]
pub struct AnswerKey(BTreeMap<QuestionId, String>);

/// The shapes an answer key file may take on disk: a bare question→answer
/// object, or an `answers` object alongside exam metadata (`exam_id`,
/// `exam_name`, ...), which is ignored.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AnswerKeyDocument {
    Detailed {
        answers: BTreeMap<QuestionId, String>,
    },
    Flat(BTreeMap<QuestionId, String>),
}

impl From<AnswerKeyDocument> for AnswerKey {
    fn from(document: AnswerKeyDocument) -> Self {
        match document {
            AnswerKeyDocument::Detailed { answers, .. } => AnswerKey(answers),
            AnswerKeyDocument::Flat(answers) => AnswerKey(answers),
        }
    }
}

impl AnswerKey {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, question: &QuestionId) -> Option<&str> {
        self.0.get(question).map(String::as_str)
    }

    /// Questions in natural order with their correct answers.
    pub fn iter(&self) -> impl Iterator<Item = (&QuestionId, &String)> {
        self.0.iter()
    }

    pub fn from_json_file(path: &Path) -> OmrResult<Self> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| OmrError::Read(FileKind::AnswerKey, path.to_path_buf(), e))?;
        serde_json::from_str(&json)
            .map_err(|e| OmrError::Parse(FileKind::AnswerKey, path.to_path_buf(), e))
    }

    /// Builds a key from a reference sheet's marks. Every question must carry
    /// exactly one mark.
    pub fn from_reference_marks(marks: &MarkedAnswers) -> OmrResult<Self> {
        let mut answers = BTreeMap::new();
        for (question, choice) in marks {
            match choice.answer() {
                Some(label) => {
                    answers.insert(question.clone(), label.to_string());
                }
                None => return Err(OmrError::UnresolvedReferenceMark(question.clone())),
            }
        }

        if answers.is_empty() {
            return Err(OmrError::EmptyAnswerKey);
        }
        Ok(AnswerKey(answers))
    }
}

impl FromIterator<(QuestionId, String)> for AnswerKey {
    fn from_iter<I: IntoIterator<Item = (QuestionId, String)>>(iter: I) -> Self {
        AnswerKey(iter.into_iter().collect())
    }
}

/// Where answer keys come from. Implementations must be safe to read from
/// many evaluations at once.
pub trait AnswerKeyStore: Send + Sync {
    fn list_keys(&self) -> OmrResult<Vec<AnswerKeyId>>;
    fn load_key(&self, id: &AnswerKeyId) -> OmrResult<AnswerKey>;
}

/// Answer keys stored as `<dir>/<id>.json`. Listing only looks at file
/// names; a key file is parsed when it is loaded, so one broken file does not
/// hide the others.
#[derive(Debug, Clone, Default)]
pub struct AnswerKeyDirectory {
    dir: PathBuf,
}

impl AnswerKeyDirectory {
    /// Opens `dir`, failing if it cannot be listed.
    pub fn open(dir: &Path) -> OmrResult<Self> {
        let store = Self {
            dir: dir.to_path_buf(),
        };
        let keys = store.key_paths()?;
        info!("found {} answer keys in {}", keys.len(), dir.display());
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Key ids (file stems) and their paths. Only names found here can be
    /// loaded, so ids never reach outside the directory.
    fn key_paths(&self) -> OmrResult<BTreeMap<String, PathBuf>> {
        let read_error = |e| OmrError::Read(FileKind::AnswerKey, self.dir.clone(), e);
        let entries = std::fs::read_dir(&self.dir).map_err(read_error)?;

        let mut keys = BTreeMap::new();
        for entry in entries {
            let path = entry.map_err(read_error)?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                warn!("skipping answer key with non-UTF-8 name: {}", path.display());
                continue;
            };
            keys.insert(stem.to_string(), path.clone());
        }
        Ok(keys)
    }
}

impl AnswerKeyStore for AnswerKeyDirectory {
    fn list_keys(&self) -> OmrResult<Vec<AnswerKeyId>> {
        Ok(self
            .key_paths()?
            .into_keys()
            .map(AnswerKeyId::new)
            .collect())
    }

    fn load_key(&self, id: &AnswerKeyId) -> OmrResult<AnswerKey> {
        let keys = self.key_paths()?;
        let path = keys
            .get(id.as_str())
            .ok_or_else(|| OmrError::AnswerKeyNotFound(id.clone()))?;
        let key = AnswerKey::from_json_file(path)?;
        debug!("loaded answer key '{}' with {} questions", id, key.len());
        Ok(key)
    }
}
