use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Why a prompt range could not be loaded. Each variant is reported verbatim to the user.
#[derive(Error, Debug)]
pub enum PromptLoadError {
    #[error("prompt file '{0}' was not found")]
    FileMissing(PathBuf),

    #[error("could not read prompt file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("prompt file '{0}' is empty or contains only blank lines")]
    NoPrompts(PathBuf),

    #[error("start line must be at least 1")]
    StartBelowOne,

    #[error("start line {start} is beyond the {len} prompts in the file")]
    StartBeyondFile { start: usize, len: usize },

    #[error("start line {start} is after end line {effective_end} (clamped to file length)")]
    InvertedRange { start: usize, effective_end: usize },
}

/// Ordered prompts selected from a file by a 1-based inclusive line range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptBatch {
    pub prompts: Vec<String>,
    pub start: usize,
    /// Last line actually selected, after clamping `end` to the file.
    pub end: usize,
}

impl PromptBatch {
    pub fn len(&self) -> usize {
        self.prompts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prompts.is_empty()
    }

    /// Read `path` and select lines `start..=end`. Blank lines are dropped and
    /// surrounding whitespace trimmed before numbering, so line numbers count
    /// prompts rather than raw file lines. An `end` past the file is clamped.
    pub fn load(path: &Path, start: usize, end: usize) -> Result<Self, PromptLoadError> {
        let contents = fs::read_to_string(path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                PromptLoadError::FileMissing(path.to_path_buf())
            } else {
                PromptLoadError::Read {
                    path: path.to_path_buf(),
                    source: e,
                }
            }
        })?;

        let lines: Vec<String> = contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();

        Self::select(lines, start, end).map_err(|e| match e {
            PromptLoadError::NoPrompts(_) => PromptLoadError::NoPrompts(path.to_path_buf()),
            other => other,
        })
    }

    fn select(lines: Vec<String>, start: usize, end: usize) -> Result<Self, PromptLoadError> {
        if lines.is_empty() {
            return Err(PromptLoadError::NoPrompts(PathBuf::new()));
        }
        if start < 1 {
            return Err(PromptLoadError::StartBelowOne);
        }
        if start > lines.len() {
            return Err(PromptLoadError::StartBeyondFile {
                start,
                len: lines.len(),
            });
        }

        let effective_end = end.min(lines.len());
        if start - 1 >= effective_end {
            return Err(PromptLoadError::InvertedRange {
                start,
                effective_end,
            });
        }

        let prompts = lines[start - 1..effective_end].to_vec();
        tracing::info!(
            count = prompts.len(),
            start,
            end = effective_end,
            "prompts loaded"
        );
        Ok(Self {
            prompts,
            start,
            end: effective_end,
        })
    }
}
