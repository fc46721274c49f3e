//! Typed errors for the seams between the CLI, generation and the provider
//! APIs.

use thiserror::Error;

/// Failure of a single provider call chain.
#[derive(Debug, Error)]
pub enum DeployError {
    #[error("{0}")]
    NotConfigured(String),

    #[error("{0}")]
    InvalidSettings(String),

    #[error("{step} failed: {message}")]
    Api { step: &'static str, message: String },

    #[error("{0} is not supported for this target")]
    Unsupported(&'static str),

    #[error("Network error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error("Invalid deploy content: {0}")]
    Content(String),
}

impl DeployError {
    pub fn api(step: &'static str, message: impl Into<String>) -> Self {
        Self::Api {
            step,
            message: message.into(),
        }
    }
}

/// Failure talking to the app's own JSON API. Mirrors the
/// `{error, detail, url}` objects the dashboard surfaced.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{error} ({url}): {detail}")]
pub struct ApiError {
    pub error: String,
    pub detail: String,
    pub url: String,
}

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("custom template {0} has no entry page")]
    MissingEntry(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ArchiveError {
    #[error("too many entries for a ZIP without ZIP64: {0}")]
    TooManyEntries(usize),

    #[error("archive exceeds 4 GiB at entry {0}")]
    TooLarge(String),

    #[error("entry name too long: {0}")]
    NameTooLong(String),

    #[error("two files map to the entry {0}")]
    DuplicateEntry(String),
}
