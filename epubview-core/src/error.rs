use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors reported on the session's error channel. None of these are returned
/// to the caller of a command.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionError {
    #[error("failed to read file: {0}")]
    ReadFile(String),
    #[error("file reading is not available in this environment")]
    OpenFile,
    #[error("failed to open document: {0}")]
    OpenDocument(String),
    #[error("no document is loaded")]
    NotLoadedDocument,
    #[error("no chapter is displayed")]
    NotDisplayedChapter,
    #[error("search query is empty")]
    Search,
    #[error("search failed: {0}")]
    FindText(String),
    #[error("failed to compute pagination: {0}")]
    ComputePagination(String),
    #[error("failed to load metadata: {0}")]
    LoadMetadata(String),
    #[error("failed to load table of contents: {0}")]
    LoadToc(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    ReadFile,
    OpenFile,
    OpenDocument,
    NotLoadedDocument,
    NotDisplayedChapter,
    Search,
    FindText,
    ComputePagination,
    LoadMetadata,
    LoadToc,
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::ReadFile(_) => ErrorKind::ReadFile,
            SessionError::OpenFile => ErrorKind::OpenFile,
            SessionError::OpenDocument(_) => ErrorKind::OpenDocument,
            SessionError::NotLoadedDocument => ErrorKind::NotLoadedDocument,
            SessionError::NotDisplayedChapter => ErrorKind::NotDisplayedChapter,
            SessionError::Search => ErrorKind::Search,
            SessionError::FindText(_) => ErrorKind::FindText,
            SessionError::ComputePagination(_) => ErrorKind::ComputePagination,
            SessionError::LoadMetadata(_) => ErrorKind::LoadMetadata,
            SessionError::LoadToc(_) => ErrorKind::LoadToc,
        }
    }
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ReadFile => "READ_FILE",
            ErrorKind::OpenFile => "OPEN_FILE",
            ErrorKind::OpenDocument => "OPEN_DOCUMENT",
            ErrorKind::NotLoadedDocument => "NOT_LOADED_DOCUMENT",
            ErrorKind::NotDisplayedChapter => "NOT_DISPLAYED_CHAPTER",
            ErrorKind::Search => "SEARCH",
            ErrorKind::FindText => "FIND_TEXT",
            ErrorKind::ComputePagination => "COMPUTE_PAGINATION",
            ErrorKind::LoadMetadata => "LOAD_METADATA",
            ErrorKind::LoadToc => "LOAD_TOC",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Flattens an engine error chain into the detail string carried by the event.
pub(crate) fn describe(err: &anyhow::Error) -> String {
    format!("{err:#}")
}
