//! Read-until-sentinel scanning.
//!
//! The device's replies carry no lengths. Every protocol boundary is found by
//! pulling one byte at a time from the transport until the accumulated bytes
//! end with the expected sentinel, within a time budget.

use std::time::Duration;

use mpyrepl_metrics::{metric_defs, MetricLabels};
use mpyrepl_protocol::{decode_text, SentinelMatcher};
use mpyrepl_transport::{Transport, TransportError};
use tokio::time::Instant;
use tracing::trace;

use crate::error::{SessionError, SessionResult};

/// Byte-at-a-time reader over a borrowed transport.
pub struct Scanner<'a, T: ?Sized> {
    transport: &'a T,
    labels: &'a MetricLabels,
}

impl<'a, T: Transport + ?Sized> Scanner<'a, T> {
    /// Create a scanner reporting metrics under `labels`.
    pub fn new(transport: &'a T, labels: &'a MetricLabels) -> Self {
        Scanner { transport, labels }
    }

    /// Read until the received bytes end with `sentinel` and return what came
    /// before it, decoded lossily.
    ///
    /// With a budget, fails with [`SessionError::ReadTimeout`] once it runs
    /// out; without one, waits as long as the transport stays open.
    pub async fn read_until(&self, sentinel: &str, budget: Option<Duration>) -> SessionResult<String> {
        let deadline = budget.map(|budget| Instant::now() + budget);
        let mut matcher = SentinelMatcher::new(sentinel);
        loop {
            let byte = self.next_byte(sentinel, deadline).await?;
            if let Some(prefix) = matcher.push(byte) {
                let consumed = prefix.len() + sentinel.len();
                metrics::counter!(metric_defs::BYTES_READ.name, &self.labels.to_labels())
                    .increment(consumed as u64);
                trace!(sentinel = ?sentinel, len = prefix.len(), "sentinel found");
                return Ok(decode_text(&prefix));
            }
        }
    }

    /// Read a single byte before `deadline`.
    ///
    /// `sentinel` names what the caller is waiting for, for the timeout error.
    pub async fn next_byte(&self, sentinel: &str, deadline: Option<Instant>) -> SessionResult<u8> {
        let timeout = deadline.map(|deadline| deadline.saturating_duration_since(Instant::now()));
        match self.transport.read(1, timeout).await {
            Ok(bytes) => bytes
                .first()
                .copied()
                .ok_or(SessionError::Transport(TransportError::Closed)),
            Err(TransportError::ReadTimeout) => Err(SessionError::ReadTimeout {
                sentinel: sentinel.to_string(),
            }),
            Err(err) => Err(err.into()),
        }
    }

    /// Discard whatever is already buffered.
    pub async fn drain(&self) -> SessionResult<usize> {
        let available = self.transport.available_bytes();
        if available == 0 {
            return Ok(0);
        }
        let discarded = self.transport.read(available, Some(Duration::ZERO)).await?;
        trace!(len = discarded.len(), "drained stale input");
        Ok(discarded.len())
    }
}
