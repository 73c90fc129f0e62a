//! Error types shared by the dispatcher and its handlers.
//!
//! Every failure is terminal for the command that triggered it. The
//! dispatcher renders the `Display` text back to the sender verbatim.

use reqwest::StatusCode;
use thiserror::Error;

/// An external command failed to launch or exited non-zero.
#[derive(Debug, Error)]
#[error("Error executing command {command}: {reason}")]
pub struct ExecutionError {
    pub command: String,
    pub reason: String,
}

impl ExecutionError {
    pub fn new(command: impl Into<String>, reason: impl ToString) -> Self {
        Self {
            command: command.into(),
            reason: reason.to_string(),
        }
    }
}

/// Failure while reading the monitored service's status.
#[derive(Debug, Error)]
pub enum StatusError {
    #[error("Status request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Status endpoint returned HTTP {0}")]
    Http(StatusCode),

    #[error("Invalid status payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Last fetch time out of range: {0}")]
    Timestamp(i64),
}

/// Failure while streaming an archive to object storage.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Upload failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Upload request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Upload rejected (HTTP {status}): {body}")]
    Status { status: StatusCode, body: String },

    #[error("Storage credentials unavailable: {0}")]
    Token(String),
}

/// Category of a [`BotError`], for callers that must not match on text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Authorization,
    Execution,
    Status,
    Configuration,
    Upload,
    UnknownCommand,
    Busy,
}

#[derive(Debug, Error)]
pub enum BotError {
    #[error("Unauthorized user: {user_id}")]
    Unauthorized { user_id: u64 },

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error(transparent)]
    Status(#[from] StatusError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error("Unknown command: /{0}")]
    UnknownCommand(String),

    #[error("A backup is already in progress")]
    BackupInProgress,
}

impl BotError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BotError::Unauthorized { .. } => ErrorKind::Authorization,
            BotError::Execution(_) => ErrorKind::Execution,
            BotError::Status(_) => ErrorKind::Status,
            BotError::Configuration(_) => ErrorKind::Configuration,
            BotError::Upload(_) => ErrorKind::Upload,
            BotError::UnknownCommand(_) => ErrorKind::UnknownCommand,
            BotError::BackupInProgress => ErrorKind::Busy,
        }
    }
}
