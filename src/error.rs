//! Error taxonomy shared by every stage of the organize/undo pipeline.

use crate::config::ConfigError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while validating, organizing, logging or undoing.
///
/// Path, rule and config errors are fatal and surface before any file is touched.
/// Move errors are per item; the caller decides whether to keep going.
#[derive(Debug, Error)]
pub enum SortError {
    /// A source or destination root is missing, not a directory, or nested badly.
    #[error("Invalid path {}: {reason}", .path.display())]
    InvalidPath { path: PathBuf, reason: String },

    /// The user rule table is missing or is not a key → folder table.
    #[error("Rule file {}: {reason}", .path.display())]
    RuleFile { path: PathBuf, reason: String },

    /// A single file could not be moved.
    #[error("Failed to move {} to {}: {cause}", .from.display(), .to.display())]
    Move {
        from: PathBuf,
        to: PathBuf,
        #[source]
        cause: io::Error,
    },

    /// The file changed between scan and move and was left in place.
    #[error("{} changed since it was scanned", .path.display())]
    StaleSource { path: PathBuf },

    /// The path is not valid UTF-8 and could not be recorded for undo.
    #[error("{} has a name that is not valid UTF-8, left in place", .path.display())]
    NonUtf8Path { path: PathBuf },

    /// Advisory capacity check failed before a real run.
    #[error(
        "Not enough free space under {}: {required} bytes needed, {available} available",
        .root.display()
    )]
    InsufficientSpace {
        root: PathBuf,
        required: u64,
        available: u64,
    },

    /// Reading or writing the batch log failed.
    #[error("Batch log {}: {cause}", .path.display())]
    Log {
        path: PathBuf,
        #[source]
        cause: io::Error,
    },

    /// A batch log or snapshot file could not be parsed.
    #[error("Malformed batch log {}: {reason}", .path.display())]
    LogFormat { path: PathBuf, reason: String },

    /// A snapshot for this batch id is already on disk.
    #[error("Batch {batch_id} is already recorded")]
    DuplicateBatch { batch_id: String },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Other(String),
}

impl SortError {
    pub(crate) fn invalid_path(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn rule_file(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::RuleFile {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn log(path: impl Into<PathBuf>, cause: io::Error) -> Self {
        Self::Log {
            path: path.into(),
            cause,
        }
    }

    pub(crate) fn log_format(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::LogFormat {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// True for failures tied to one file rather than to the whole run.
    pub fn is_per_item(&self) -> bool {
        matches!(
            self,
            Self::Move { .. } | Self::StaleSource { .. } | Self::NonUtf8Path { .. }
        )
    }
}

/// Result type used throughout the crate.
pub type SortResult<T> = Result<T, SortError>;
