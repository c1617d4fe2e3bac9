//! Receive queue shared by a transport and its pump.
//!
//! Pumps (a socket task, a serial thread, the simulated device) push whatever
//! they receive; readers wait for a given number of bytes. Arrival is
//! signalled with a [`Notify`], so waiting readers wake as soon as data lands.

use std::time::Duration;

use bytes::BytesMut;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::error::{TransportError, TransportResult};

#[derive(Debug, Default)]
struct InboundState {
    buffer: BytesMut,
    closed: bool,
}

/// Buffered bytes received from the device.
#[derive(Debug, Default)]
pub struct Inbound {
    state: Mutex<InboundState>,
    arrived: Notify,
}

impl Inbound {
    /// Create an empty, open queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append received bytes and wake readers. Ignored once closed.
    pub fn push(&self, data: &[u8]) {
        {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            state.buffer.extend_from_slice(data);
        }
        self.arrived.notify_waiters();
    }

    /// Mark the queue closed and wake readers.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.arrived.notify_waiters();
    }

    /// True once [`close`](Self::close) was called.
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Number of buffered bytes.
    pub fn len(&self) -> usize {
        self.state.lock().buffer.len()
    }

    /// True if nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait for `n` bytes and take them.
    ///
    /// Buffered bytes are still handed out after close; only an exhausted,
    /// closed queue reports [`TransportError::Closed`].
    pub async fn read(&self, n: usize, timeout: Option<Duration>) -> TransportResult<Vec<u8>> {
        let deadline = timeout.map(|timeout| Instant::now() + timeout);
        loop {
            // Register before checking so a push between the check and the
            // await is not missed.
            let notified = self.arrived.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock();
                if state.buffer.len() >= n {
                    return Ok(state.buffer.split_to(n).to_vec());
                }
                if state.closed {
                    return Err(TransportError::Closed);
                }
            }

            match deadline {
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        return Err(TransportError::ReadTimeout);
                    }
                }
                None => notified.await,
            }
        }
    }
}
