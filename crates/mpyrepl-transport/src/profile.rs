//! Connection profiles and transport dispatch.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::TransportResult;
use crate::serial::SerialTransport;
use crate::sim::{SimDevice, SimTransport};
use crate::websocket::WebSocketTransport;
use crate::{ConnectionKind, Transport};

/// Baud rate used when a serial profile does not name one.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Login budget used when a WebREPL profile does not name one.
pub const DEFAULT_LOGIN_TIMEOUT_MS: u64 = 5_000;

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_login_timeout_ms() -> u64 {
    DEFAULT_LOGIN_TIMEOUT_MS
}

/// Where and how to reach a device.
///
/// ```yaml
/// kind: serial
/// path: /dev/ttyUSB0
/// baud_rate: 115200
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConnectionProfile {
    /// A serial line.
    Serial {
        /// Device path, e.g. `/dev/ttyUSB0` or `COM3`.
        path: String,
        /// Line speed.
        #[serde(default = "default_baud_rate")]
        baud_rate: u32,
    },
    /// A WebREPL endpoint, optionally password protected.
    #[serde(rename = "websocket")]
    WebSocket {
        /// `ws://host:port` URL.
        url: String,
        /// Login password, if the endpoint asks for one.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        password: Option<String>,
        /// Budget for the login exchange.
        #[serde(default = "default_login_timeout_ms")]
        login_timeout_ms: u64,
    },
    /// A fresh simulated device.
    Simulated,
}

impl ConnectionProfile {
    /// Serial profile at the default baud rate.
    pub fn serial(path: impl Into<String>) -> Self {
        ConnectionProfile::Serial {
            path: path.into(),
            baud_rate: DEFAULT_BAUD_RATE,
        }
    }

    /// WebREPL profile without a password.
    pub fn websocket(url: impl Into<String>) -> Self {
        ConnectionProfile::WebSocket {
            url: url.into(),
            password: None,
            login_timeout_ms: DEFAULT_LOGIN_TIMEOUT_MS,
        }
    }

    /// Kind of transport this profile opens.
    pub fn kind(&self) -> ConnectionKind {
        match self {
            ConnectionProfile::Serial { .. } => ConnectionKind::Serial,
            ConnectionProfile::WebSocket { .. } => ConnectionKind::Socket,
            ConnectionProfile::Simulated => ConnectionKind::Memory,
        }
    }

    /// Open the transport: open the line, or connect and log in.
    pub async fn open(&self) -> TransportResult<AnyTransport> {
        match self {
            ConnectionProfile::Serial { path, baud_rate } => {
                Ok(AnyTransport::Serial(SerialTransport::open(path, *baud_rate)?))
            }
            ConnectionProfile::WebSocket {
                url,
                password,
                login_timeout_ms,
            } => {
                let transport = WebSocketTransport::connect(
                    url,
                    password.as_deref(),
                    Duration::from_millis(*login_timeout_ms),
                )
                .await?;
                Ok(AnyTransport::WebSocket(transport))
            }
            ConnectionProfile::Simulated => Ok(AnyTransport::Sim(SimDevice::new().transport())),
        }
    }
}

/// Any of the built-in transports behind one concrete type.
pub enum AnyTransport {
    /// Serial line.
    Serial(SerialTransport),
    /// WebREPL WebSocket.
    WebSocket(WebSocketTransport),
    /// Simulated device.
    Sim(SimTransport),
}

impl From<SerialTransport> for AnyTransport {
    fn from(transport: SerialTransport) -> Self {
        AnyTransport::Serial(transport)
    }
}

impl From<WebSocketTransport> for AnyTransport {
    fn from(transport: WebSocketTransport) -> Self {
        AnyTransport::WebSocket(transport)
    }
}

impl From<SimTransport> for AnyTransport {
    fn from(transport: SimTransport) -> Self {
        AnyTransport::Sim(transport)
    }
}

impl AnyTransport {
    fn inner(&self) -> &dyn Transport {
        match self {
            AnyTransport::Serial(transport) => transport,
            AnyTransport::WebSocket(transport) => transport,
            AnyTransport::Sim(transport) => transport,
        }
    }
}

#[async_trait]
impl Transport for AnyTransport {
    fn address(&self) -> &str {
        self.inner().address()
    }

    fn kind(&self) -> ConnectionKind {
        self.inner().kind()
    }

    fn available_bytes(&self) -> usize {
        self.inner().available_bytes()
    }

    async fn read(&self, n: usize, timeout: Option<Duration>) -> TransportResult<Vec<u8>> {
        self.inner().read(n, timeout).await
    }

    async fn write(&self, data: &[u8]) -> TransportResult<()> {
        self.inner().write(data).await
    }

    async fn close(&self) -> TransportResult<()> {
        self.inner().close().await
    }
}
