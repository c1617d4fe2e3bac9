//! WebREPL transport.
//!
//! MicroPython's WebREPL serves the REPL over a WebSocket. REPL text travels
//! in text frames; binary frames are reserved by the device for its file
//! transfer protocol, so everything written here goes out as text when it
//! is valid UTF-8. A spawned task pumps received frames into an [`Inbound`]
//! queue, which hides frame boundaries from the driver.
//!
//! The device asks for a password before the REPL is usable:
//!
//! ```text
//! device: "Password: "
//! host:   "<password>\r\n"
//! device: "\r\nWebREPL connected\r\n>>> "
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use mpyrepl_protocol::{
    SentinelMatcher, WEBREPL_CONNECTED, WEBREPL_LINE_END, WEBREPL_PASSWORD_PROMPT,
};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace, warn};

use crate::error::{TransportError, TransportResult};
use crate::inbound::Inbound;
use crate::{ConnectionKind, Transport};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A raw REPL reached through WebREPL at a `ws://` URL.
pub struct WebSocketTransport {
    url: String,
    inbound: Arc<Inbound>,
    sink: Mutex<Option<SplitSink<WsStream, Message>>>,
    pump: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl WebSocketTransport {
    /// Open `url` and, if a password is given, complete the login exchange.
    /// Both the upgrade and the login must finish within `login_timeout`.
    pub async fn connect(
        url: &str,
        password: Option<&str>,
        login_timeout: Duration,
    ) -> TransportResult<Self> {
        let deadline = Instant::now() + login_timeout;
        let (stream, _response) = tokio::time::timeout_at(deadline, connect_async(url))
            .await
            .map_err(|_| TransportError::Login(format!("timed out connecting to {}", url)))??;
        let (sink, stream) = stream.split();

        let inbound = Arc::new(Inbound::new());
        let pump = tokio::spawn(pump_frames(stream, inbound.clone(), url.to_string()));

        let transport = WebSocketTransport {
            url: url.to_string(),
            inbound,
            sink: Mutex::new(Some(sink)),
            pump: parking_lot::Mutex::new(Some(pump)),
        };

        if let Some(password) = password {
            if let Err(err) = transport.login(password, deadline).await {
                let _ = transport.close().await;
                return Err(err);
            }
        }
        debug!(url, "websocket transport connected");
        Ok(transport)
    }

    async fn login(&self, password: &str, deadline: Instant) -> TransportResult<()> {
        self.wait_for(WEBREPL_PASSWORD_PROMPT, deadline).await?;
        let line = format!("{}{}", password, WEBREPL_LINE_END);
        self.write(line.as_bytes()).await?;
        self.wait_for(WEBREPL_CONNECTED, deadline).await
    }

    async fn wait_for(&self, sentinel: &str, deadline: Instant) -> TransportResult<()> {
        let mut matcher = SentinelMatcher::new(sentinel);
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let byte = match self.inbound.read(1, Some(remaining)).await {
                Ok(byte) => byte[0],
                Err(TransportError::ReadTimeout) => {
                    return Err(TransportError::Login(format!(
                        "timed out waiting for {:?}",
                        sentinel
                    )))
                }
                Err(TransportError::Closed) => {
                    return Err(TransportError::Login(
                        "connection closed during login (wrong password?)".to_string(),
                    ))
                }
                Err(err) => return Err(err),
            };
            if matcher.push(byte).is_some() {
                return Ok(());
            }
        }
    }
}

/// Pump frame payloads into the queue until the peer closes.
async fn pump_frames(mut stream: SplitStream<WsStream>, inbound: Arc<Inbound>, url: String) {
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                trace!(url = %url, len = text.len(), "websocket rx");
                inbound.push(text.as_bytes());
            }
            Ok(Message::Binary(data)) => {
                trace!(url = %url, len = data.len(), "websocket rx (binary)");
                inbound.push(&data);
            }
            Ok(Message::Close(_)) => {
                debug!(url = %url, "websocket closed by peer");
                break;
            }
            // Pings are answered by the protocol layer.
            Ok(_) => {}
            Err(err) => {
                warn!(url = %url, error = %err, "websocket read failed");
                break;
            }
        }
    }
    inbound.close();
}

/// Text frame when the bytes allow it.
fn frame(data: &[u8]) -> Message {
    match std::str::from_utf8(data) {
        Ok(text) => Message::Text(text.to_string()),
        Err(_) => Message::Binary(data.to_vec()),
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    fn address(&self) -> &str {
        &self.url
    }

    fn kind(&self) -> ConnectionKind {
        ConnectionKind::Socket
    }

    fn available_bytes(&self) -> usize {
        self.inbound.len()
    }

    async fn read(&self, n: usize, timeout: Option<Duration>) -> TransportResult<Vec<u8>> {
        self.inbound.read(n, timeout).await
    }

    async fn write(&self, data: &[u8]) -> TransportResult<()> {
        let mut sink = self.sink.lock().await;
        let sink = sink.as_mut().ok_or(TransportError::Closed)?;
        // `send` flushes before resolving.
        sink.send(frame(data)).await?;
        trace!(url = %self.url, len = data.len(), "websocket tx");
        Ok(())
    }

    async fn close(&self) -> TransportResult<()> {
        self.inbound.close();
        if let Some(pump) = self.pump.lock().take() {
            pump.abort();
        }
        let sink = self.sink.lock().await.take();
        if let Some(mut sink) = sink {
            if let Err(err) = sink.close().await {
                debug!(url = %self.url, error = %err, "websocket close handshake failed");
            }
        }
        debug!(url = %self.url, "websocket transport closed");
        Ok(())
    }
}
