//! Error types for the session driver.

use mpyrepl_protocol::ProtocolError;
use mpyrepl_transport::TransportError;
use thiserror::Error;

/// Errors raised by a [`crate::Session`].
#[derive(Debug, Error)]
pub enum SessionError {
    /// The transport failed while the driver was using it.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// An expected sentinel did not arrive within its budget.
    #[error("timed out waiting for {sentinel:?}")]
    ReadTimeout {
        /// The sentinel being scanned for.
        sentinel: String,
    },

    /// The handshake never saw the raw REPL banner.
    #[error("raw REPL handshake failed after {attempts} attempts")]
    HandshakeExhausted {
        /// Attempts made before giving up.
        attempts: usize,
    },

    /// The code cannot be framed as a single submission.
    #[error("invalid code: {0}")]
    InvalidCode(#[source] ProtocolError),

    /// The session was closed.
    #[error("session closed")]
    Closed,

    /// The evaluated code raised on the device.
    #[error("remote exception: {0}")]
    Remote(String),

    /// No session is connected.
    #[error("not connected")]
    NotConnected,

    /// The background task driving a stream panicked or was aborted.
    #[error("stream task failed: {0}")]
    Task(String),
}

impl SessionError {
    /// True if the failure may have left the device mid-protocol, so the
    /// driver must re-synchronize before the next operation.
    pub fn triggers_recovery(&self) -> bool {
        matches!(self, SessionError::Transport(_) | SessionError::ReadTimeout { .. })
    }

    /// True if retrying the handshake cannot help.
    pub(crate) fn is_fatal(&self) -> bool {
        match self {
            SessionError::Closed => true,
            SessionError::Transport(err) => err.is_closed(),
            _ => false,
        }
    }
}

/// Result type alias for session operations.
pub type SessionResult<T> = Result<T, SessionError>;
