//! Transports for the MicroPython raw REPL driver.
//!
//! A transport is a plain byte pipe to the device. It carries no protocol
//! state; the session driver owns one exclusively and does all framing.
//!
//! Implementations:
//!
//! - [`SerialTransport`]: a serial line, read by a blocking pump thread
//! - [`WebSocketTransport`]: a WebREPL endpoint at a `ws://` URL, with the
//!   password login
//! - [`SimTransport`]: an in-memory simulated raw REPL device for tests and demos
//!
//! All of them buffer received bytes in an [`Inbound`] queue so reads of any
//! size can wait on arrival with a timeout.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

mod error;
mod inbound;
mod profile;
mod serial;
pub mod sim;
mod websocket;

pub use error::*;
pub use inbound::Inbound;
pub use profile::{AnyTransport, ConnectionProfile, DEFAULT_BAUD_RATE, DEFAULT_LOGIN_TIMEOUT_MS};
pub use serial::SerialTransport;
pub use sim::{SimDevice, SimResponse, SimTransport, WireEvent};
pub use websocket::WebSocketTransport;

/// What kind of channel a transport runs over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionKind {
    /// A serial line.
    Serial,
    /// A WebREPL WebSocket.
    Socket,
    /// The in-memory simulated device.
    Memory,
}

impl ConnectionKind {
    /// Human readable label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionKind::Serial => "serial",
            ConnectionKind::Socket => "socket",
            ConnectionKind::Memory => "memory",
        }
    }
}

impl fmt::Display for ConnectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Byte-stream capability consumed by the session driver.
///
/// Methods take `&self` so an out-of-band write (an interrupt) can be issued
/// while another task is blocked in [`read`](Self::read).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Stable display string for the endpoint.
    fn address(&self) -> &str;

    /// Kind of channel.
    fn kind(&self) -> ConnectionKind;

    /// Bytes that can be read right now without waiting.
    fn available_bytes(&self) -> usize;

    /// Read exactly `n` bytes.
    ///
    /// Fails with [`TransportError::ReadTimeout`] if they do not arrive within
    /// `timeout`; `None` waits indefinitely.
    async fn read(&self, n: usize, timeout: Option<Duration>) -> TransportResult<Vec<u8>>;

    /// Write all bytes. Resolves once they have been flushed.
    async fn write(&self, data: &[u8]) -> TransportResult<()>;

    /// Release the underlying resource. Pending and later reads fail with
    /// [`TransportError::Closed`] once buffered bytes are exhausted.
    async fn close(&self) -> TransportResult<()>;
}
