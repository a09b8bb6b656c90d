//! Error taxonomy for journal operations.
//!
//! Malformed log lines and dangling leaves are not errors: they are skipped and
//! counted by the import and conversion results. What remains here are the
//! failures a caller has to see.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum JournalError {
    #[error("user not found: {0}")]
    UserNotFound(String),

    #[error("event not found: {0}")]
    EventNotFound(i64),

    #[error("invalid username: {0:?}")]
    InvalidUsername(String),

    #[error("invalid event: {0}")]
    InvalidEvent(String),

    /// A conversion or regroup pass failed and was rolled back as a whole.
    #[error("{pass} rolled back: {source}")]
    Transaction {
        pass: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl JournalError {
    /// Wrap a storage error raised inside a transactional pass.
    pub fn rolled_back(pass: &'static str, source: rusqlite::Error) -> Self {
        JournalError::Transaction { pass, source }
    }

    /// Attribute a storage failure to the pass it happened in. Other errors
    /// pass through unchanged.
    pub fn in_pass(self, pass: &'static str) -> Self {
        match self {
            JournalError::Database(source) => JournalError::Transaction { pass, source },
            other => other,
        }
    }

    /// Whether the error names a missing record rather than a failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, JournalError::UserNotFound(_) | JournalError::EventNotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, JournalError>;
