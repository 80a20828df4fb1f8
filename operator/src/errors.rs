//! Error types for the stack operator

use thiserror::Error;

/// Broad class of a failure, used to decide rollback and exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Aborted before anything was mutated
    FatalPrecondition,

    /// Aborted while the descriptor was being mutated; rollback was attempted
    FatalDuringMutation,

    /// The container runtime never became ready
    Timeout,

    /// Any other failure of an external collaborator
    Fatal,
}

/// Main error type for the stack operator
#[derive(Error, Debug)]
pub enum OpsError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Update failed during mutation: {0}")]
    Mutation(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Command error: {0}")]
    CommandError(String),

    #[error("Fetch error: {0}")]
    FetchError(String),

    #[error("Version control error: {0}")]
    VcsError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl OpsError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OpsError::Precondition(_) => ErrorKind::FatalPrecondition,
            OpsError::Mutation(_) => ErrorKind::FatalDuringMutation,
            OpsError::Timeout(_) => ErrorKind::Timeout,
            _ => ErrorKind::Fatal,
        }
    }

    /// Process exit status for this error. Every fatal outcome maps to 1.
    pub fn exit_code(&self) -> u8 {
        1
    }
}
