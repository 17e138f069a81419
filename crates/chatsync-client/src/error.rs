use std::path::PathBuf;

use chatsync_core::CoreError;
use thiserror::Error;

/// Failure of a request/response call to the chat backend.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("http transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("{endpoint} returned HTTP {status}: {body}")]
    Status {
        endpoint: &'static str,
        status: u16,
        body: String,
    },
    #[error("invalid response from {endpoint}: {reason}")]
    Decode {
        endpoint: &'static str,
        reason: String,
    },
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

impl BackendError {
    /// HTTP status code, when the backend answered with one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Errors surfaced to callers of the conversation session.
///
/// Connectivity failures never appear here: they are retried by the
/// supervisor and only reported through the snapshot.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("message is empty")]
    EmptyMessage,
    #[error("send failed: {0}")]
    Backend(#[from] BackendError),
    #[error("conversation session is closed")]
    SessionClosed,
    #[error("invalid config: {0}")]
    Config(#[from] CoreError),
    #[error("config file {}: {reason}", path.display())]
    ConfigFile { path: PathBuf, reason: String },
}
