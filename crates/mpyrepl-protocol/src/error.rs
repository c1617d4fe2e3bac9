//! Error types for the raw REPL protocol.

use thiserror::Error;

/// Errors that can occur when encoding submissions or parsing device output.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProtocolError {
    /// The code contains the `Ctrl-D` terminator, which the protocol cannot carry.
    #[error("code contains the end-of-transmission byte at offset {offset}")]
    EmbeddedTerminator {
        /// Byte offset of the first terminator.
        offset: usize,
    },

    /// Failed to parse output printed by a helper snippet.
    #[error("failed to parse device output: {0}")]
    ParseError(String),

    /// WebREPL only accepts passwords of 4 to 9 characters.
    #[error("WebREPL password must be 4-9 characters, got {length}")]
    InvalidWebReplPassword {
        /// Length of the rejected password in characters.
        length: usize,
    },

    /// The WebREPL daemon did not report a reachable address.
    #[error("WebREPL is not started (no network address)")]
    WebReplNotStarted,

    /// A hex dump from the device was malformed.
    #[error("invalid hex dump: {0}")]
    InvalidHex(#[from] hex::FromHexError),
}

/// Result type alias for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;
