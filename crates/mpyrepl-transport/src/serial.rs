//! Serial line transport.
//!
//! `serialport` is blocking, so a dedicated thread polls the port with a
//! short timeout and pushes what it reads into an [`Inbound`] queue. Writes
//! run on the blocking pool and flush before returning.

use std::io::{self, Read, Write};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serialport::SerialPort;
use tracing::{debug, trace, warn};

use crate::error::{TransportError, TransportResult};
use crate::inbound::Inbound;
use crate::{ConnectionKind, Transport};

/// How long the pump thread blocks in one read before re-checking for close.
const POLL_TIMEOUT: Duration = Duration::from_millis(10);

type SharedPort = Arc<Mutex<Option<Box<dyn SerialPort>>>>;

/// A raw REPL reached over a serial line.
pub struct SerialTransport {
    address: String,
    inbound: Arc<Inbound>,
    port: SharedPort,
}

impl SerialTransport {
    /// Open `path` at `baud_rate` and start the receive pump.
    pub fn open(path: &str, baud_rate: u32) -> TransportResult<Self> {
        let port = serialport::new(path, baud_rate).timeout(POLL_TIMEOUT).open()?;
        let reader = port.try_clone()?;

        let inbound = Arc::new(Inbound::new());
        let pump_inbound = inbound.clone();
        let pump_path = path.to_string();
        thread::Builder::new()
            .name(format!("serial-rx {}", path))
            .spawn(move || pump_serial(reader, pump_inbound, pump_path))?;

        debug!(path, baud_rate, "serial transport opened");
        Ok(SerialTransport {
            address: path.to_string(),
            inbound,
            port: Arc::new(Mutex::new(Some(port))),
        })
    }
}

/// Pump bytes from the port into the queue until the queue is closed or the
/// port fails.
fn pump_serial(mut port: Box<dyn SerialPort>, inbound: Arc<Inbound>, path: String) {
    let mut read_buf = [0u8; 1024];
    while !inbound.is_closed() {
        match port.read(&mut read_buf) {
            Ok(0) => continue,
            Ok(n) => {
                trace!(path, len = n, "serial rx");
                inbound.push(&read_buf[..n]);
            }
            Err(e) if e.kind() == io::ErrorKind::TimedOut => continue,
            Err(e) => {
                warn!(path, error = %e, "serial read failed");
                break;
            }
        }
    }
    inbound.close();
}

#[async_trait]
impl Transport for SerialTransport {
    fn address(&self) -> &str {
        &self.address
    }

    fn kind(&self) -> ConnectionKind {
        ConnectionKind::Serial
    }

    fn available_bytes(&self) -> usize {
        self.inbound.len()
    }

    async fn read(&self, n: usize, timeout: Option<Duration>) -> TransportResult<Vec<u8>> {
        self.inbound.read(n, timeout).await
    }

    async fn write(&self, data: &[u8]) -> TransportResult<()> {
        let port = self.port.clone();
        let data = data.to_vec();
        let len = data.len();
        tokio::task::spawn_blocking(move || -> TransportResult<()> {
            let mut guard = port.lock();
            let port = guard.as_mut().ok_or(TransportError::Closed)?;
            port.write_all(&data)?;
            port.flush()?;
            Ok(())
        })
        .await
        .map_err(|e| TransportError::Io(io::Error::new(io::ErrorKind::Other, e)))??;
        trace!(address = %self.address, len, "serial tx");
        Ok(())
    }

    async fn close(&self) -> TransportResult<()> {
        self.inbound.close();
        // Dropping the handle releases the device; the pump thread exits on
        // its next poll.
        self.port.lock().take();
        debug!(address = %self.address, "serial transport closed");
        Ok(())
    }
}
