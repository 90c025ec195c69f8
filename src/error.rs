use std::path::PathBuf;

use crate::NotePath;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("notes root does not exist: {0}")]
    RootNotFound(PathBuf),

    #[error("invalid note path: {0}")]
    InvalidNotePath(String),

    #[error("path is outside notes root: {0}")]
    PathOutsideRoot(PathBuf),

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("note not found: {0}")]
    NoteNotFound(NotePath),

    #[error("checkbox {index} out of range for {path} ({count} items)")]
    CheckboxOutOfRange {
        path: NotePath,
        index: usize,
        count: usize,
    },

    #[error("note changed on disk, checkbox ordinal is stale: {path}")]
    Conflict { path: NotePath },

    #[error("invalid exclude pattern: {0}")]
    BadExcludePattern(String),

    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),

    #[error("background task failed: {0}")]
    TaskFailed(String),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// The note or checkbox ordinal the caller named does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::NoteNotFound(_) | Self::CheckboxOutOfRange { .. }
        )
    }

    /// The caller's view of the note is stale; re-fetch and retry.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}
