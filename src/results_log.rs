use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{FileKind, OmrError, OmrResult};
use crate::scoring::EvaluationResult;
use crate::types::AnswerKeyId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultsLogEntry {
    pub sheet: String,
    pub answer_key: AnswerKeyId,
    pub result: EvaluationResult,
}

/// Append-only JSON-lines record of evaluations. Shared between concurrent
/// evaluations; each entry is written whole under the lock.
#[derive(Debug)]
pub struct ResultsLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl ResultsLog {
    pub fn open(path: &Path) -> OmrResult<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(OmrError::ResultsLog)?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, entry: &ResultsLogEntry) -> OmrResult<()> {
        let mut line = serde_json::to_vec(entry)
            .map_err(|e| OmrError::ResultsLog(std::io::Error::from(e)))?;
        line.push(b'\n');

        // whole line per write, so a poisoned lock is still safe to reuse
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        file.write_all(&line).map_err(OmrError::ResultsLog)?;
        file.flush().map_err(OmrError::ResultsLog)?;
        debug!("appended result for {} to {}", entry.sheet, self.path.display());
        Ok(())
    }

    /// Reads every entry back, oldest first.
    pub fn read_entries(path: &Path) -> OmrResult<Vec<ResultsLogEntry>> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| OmrError::Read(FileKind::ResultsLog, path.to_path_buf(), e))?;
        contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                serde_json::from_str(line)
                    .map_err(|e| OmrError::Parse(FileKind::ResultsLog, path.to_path_buf(), e))
            })
            .collect()
    }
}
