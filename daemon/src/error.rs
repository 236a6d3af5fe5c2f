//! Daemon error types

/// Result type alias for daemon operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced to callers of the daemon API.
///
/// Per-process read failures never show up here; they are absorbed by the
/// collector and normalizer (see [`crate::collector::ProcessError`]).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A request argument failed validation before any work started.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration could not be read or written.
    #[error("config error: {0}")]
    Config(String),

    /// A blocking collection task panicked or was cancelled.
    #[error("collection task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Creates an invalid-argument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Creates a config error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(err: toml::ser::Error) -> Self {
        Self::Config(err.to_string())
    }
}
