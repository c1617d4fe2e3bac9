//! Error types for transports.

use thiserror::Error;

/// Errors raised by a [`crate::Transport`].
#[derive(Debug, Error)]
pub enum TransportError {
    /// Underlying socket or file I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The serial port could not be opened or configured.
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// The WebSocket upgrade or a frame exchange failed.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The requested bytes did not arrive within the timeout.
    #[error("read timed out")]
    ReadTimeout,

    /// The transport was closed, locally or by the peer.
    #[error("transport closed")]
    Closed,

    /// The endpoint rejected or never completed the login exchange.
    #[error("login failed: {0}")]
    Login(String),

    /// A fault injected by the simulated device.
    #[error("injected fault: {0}")]
    Injected(String),
}

impl TransportError {
    /// True if the failure means the channel is gone for good.
    pub fn is_closed(&self) -> bool {
        matches!(self, TransportError::Closed)
    }
}

/// Result type alias for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;
