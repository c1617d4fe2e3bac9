//! Error types for the command-line front end.

use mpyrepl_session::{RemoteFsError, SessionError};
use thiserror::Error;

/// Errors raised by the runner.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// Local file access failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The profile file is not valid YAML or has unknown fields.
    #[error("invalid profile: {0}")]
    Profile(#[from] serde_yaml::Error),

    /// Result serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The session failed.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A filesystem operation failed.
    #[error(transparent)]
    Fs(#[from] RemoteFsError),

    /// Neither a profile nor connection flags were given.
    #[error("no connection given: pass --port, --url, --board, --sim or --profile")]
    NoConnection,

    /// `--board` names a board missing from the registry.
    #[error("unknown board '{name}' in {registry}")]
    UnknownBoard {
        /// Requested board name.
        name: String,
        /// Registry file searched.
        registry: String,
    },

    /// The code raised on the device. The traceback was already printed.
    #[error("remote exception: {0}")]
    RemoteException(String),

    /// The Ctrl-C handler could not be installed.
    #[error("signal handler error: {0}")]
    Signal(#[from] ctrlc::Error),
}

/// Result type alias for runner operations.
pub type RunnerResult<T> = Result<T, RunnerError>;
