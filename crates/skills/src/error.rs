use std::path::{Path, PathBuf};

use thiserror::Error;

/// A user-supplied repository reference could not be understood.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("repository reference is empty")]
    Empty,

    #[error("unsupported host '{0}': only github.com references are accepted")]
    UnsupportedHost(String),

    #[error("invalid reference '{input}': {reason}")]
    Malformed { input: String, reason: String },
}

impl ParseError {
    #[must_use]
    pub fn malformed(input: &str, reason: impl Into<String>) -> Self {
        Self::Malformed {
            input: input.to_string(),
            reason: reason.into(),
        }
    }
}

/// Failure talking to the remote host.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("rate limited by remote host")]
    RateLimited,

    #[error("network error: {0}")]
    Network(String),

    #[error("unexpected response: {0}")]
    Parse(String),
}

impl FetchError {
    /// Whether a later attempt may succeed without user intervention.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited | Self::Network(_))
    }
}

/// Failure installing, removing, or creating a skill directory.
#[derive(Debug, Error)]
pub enum InstallError {
    #[error("skill not found: {0}")]
    NotFound(String),

    #[error("skill already installed: {0}")]
    AlreadyInstalled(String),

    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid skill name: {0:?}")]
    InvalidName(String),

    #[error("invalid relative path: {0}")]
    InvalidPath(String),

    #[error(transparent)]
    Fetch(#[from] FetchError),
}

impl InstallError {
    #[must_use]
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Failure surfaced by the client state layer.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("a mutation for '{0}' is already in flight")]
    Busy(String),

    #[error(transparent)]
    Service(#[from] Error),
}

/// Crate-wide error.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Install(#[from] InstallError),

    #[error(transparent)]
    Config(#[from] myskills_config::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("{message}")]
    Message { message: String },
}

impl Error {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }
}

impl myskills_common::FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message { message }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

myskills_common::impl_context!();
