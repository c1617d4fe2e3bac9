//! The session driver.
//!
//! A [`Session`] owns one transport and drives the raw REPL protocol over it.
//! Every exchange that reads from the transport runs under the session's
//! [`SingleFlight`] lock; a failed exchange leaves the lock and then
//! re-synchronizes the device before reporting the failure.
//!
//! ```text
//! host                          device
//!  |  code + 0x04          ->    |
//!  |                       <-    |  OK
//!  |                       <-    |  stdout 0x04
//!  |                       <-    |  stderr 0x04
//!  |                       <-    |  >
//! ```

use std::fmt;
use std::time::Duration;

use mpyrepl_metrics::{metric_defs, MetricLabels};
use mpyrepl_protocol::{
    encode_submission, trim_printed, ExecutionResult, RemoteCommand, END_OF_TRANSMISSION,
    INTERRUPT_SEQUENCE, RAW_PROMPT, SUBMISSION_ACK,
};
use mpyrepl_transport::{ConnectionKind, Transport};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::config::SessionConfig;
use crate::error::{SessionError, SessionResult};
use crate::lock::{FlightGuard, SingleFlight};
use crate::scanner::Scanner;

/// Protocol synchronization state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// The device state is unknown.
    Unsynced,
    /// Interrupt and raw-mode request sent, waiting for the banner.
    HandshakeSent,
    /// The device is in raw mode and between submissions.
    Ready,
    /// The session was closed.
    Closed,
}

impl SyncState {
    /// Lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Unsynced => "unsynced",
            SyncState::HandshakeSent => "handshake_sent",
            SyncState::Ready => "ready",
            SyncState::Closed => "closed",
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw REPL driver over one transport.
pub struct Session<T> {
    pub(crate) transport: T,
    pub(crate) config: SessionConfig,
    pub(crate) lock: SingleFlight,
    pub(crate) labels: MetricLabels,
    kind: ConnectionKind,
    state: Mutex<SyncState>,
}

impl<T: Transport> fmt::Debug for Session<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("address", &self.address())
            .field("kind", &self.kind)
            .field("state", &self.state())
            .finish()
    }
}

impl<T: Transport> Session<T> {
    /// Take ownership of `transport` with the default configuration.
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, SessionConfig::default())
    }

    /// Take ownership of `transport`.
    ///
    /// The session starts [`SyncState::Unsynced`]; call
    /// [`initialize`](Self::initialize) before executing code.
    pub fn with_config(transport: T, config: SessionConfig) -> Self {
        let kind = transport.kind();
        let labels = MetricLabels::new(transport.address(), kind.as_str());
        Session {
            transport,
            config,
            lock: SingleFlight::new(),
            labels,
            kind,
            state: Mutex::new(SyncState::Unsynced),
        }
    }

    /// Display address of the endpoint.
    pub fn address(&self) -> &str {
        self.transport.address()
    }

    /// Kind of connection, fixed at construction.
    pub fn kind(&self) -> ConnectionKind {
        self.kind
    }

    /// Current synchronization state.
    pub fn state(&self) -> SyncState {
        *self.state.lock()
    }

    /// Configuration in use.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// True while an operation holds the lock.
    pub fn is_busy(&self) -> bool {
        self.lock.is_busy()
    }

    /// True once [`close`](Self::close) was called.
    pub fn is_closed(&self) -> bool {
        self.state() == SyncState::Closed
    }

    pub(crate) fn set_state(&self, next: SyncState) {
        let mut state = self.state.lock();
        // Closed is terminal.
        if *state != SyncState::Closed && *state != next {
            trace!(address = %self.address(), from = %*state, to = %next, "state change");
            *state = next;
        }
    }

    pub(crate) fn ensure_open(&self) -> SessionResult<()> {
        if self.is_closed() {
            return Err(SessionError::Closed);
        }
        Ok(())
    }

    pub(crate) fn scanner(&self) -> Scanner<'_, T> {
        Scanner::new(&self.transport, &self.labels)
    }

    pub(crate) async fn write(&self, data: &[u8]) -> SessionResult<()> {
        self.transport.write(data).await?;
        metrics::counter!(metric_defs::BYTES_WRITTEN.name, &self.labels.to_labels())
            .increment(data.len() as u64);
        Ok(())
    }

    // ========================================================================
    // Execution
    // ========================================================================

    /// Run `code` and return what it printed on each channel.
    ///
    /// Empty code returns an empty result without touching the transport.
    /// A session that is not [`SyncState::Ready`] (never initialized, or left
    /// unsynced by a failed recovery) handshakes first.
    /// Code containing `0x04` is rejected with [`SessionError::InvalidCode`].
    /// A transport failure or timeout re-synchronizes the device and is then
    /// returned; an exception raised by the code is returned as data in
    /// [`ExecutionResult::error`].
    pub async fn execute(&self, code: &str) -> SessionResult<ExecutionResult> {
        self.ensure_open()?;
        if code.is_empty() {
            return Ok(ExecutionResult::default());
        }
        let frame = encode_submission(code).map_err(SessionError::InvalidCode)?;

        let started = Instant::now();
        let outcome = {
            let _guard = self.lock.acquire(&self.labels).await;
            match self.resync_locked().await {
                Ok(()) => self.execute_locked(&frame).await,
                Err(err) => Err(err),
            }
        };
        metrics::histogram!(metric_defs::EXECUTION_TIME.name, &self.labels.to_labels())
            .record(started.elapsed().as_micros() as f64);
        self.settle(outcome).await
    }

    /// Handshake again unless the device is known to be in raw mode.
    /// Caller holds the lock.
    pub(crate) async fn resync_locked(&self) -> SessionResult<()> {
        let state = self.state();
        if state == SyncState::Ready {
            return Ok(());
        }
        debug!(address = %self.address(), %state, "not synchronized, handshaking first");
        self.handshake_locked().await
    }

    /// Batch exchange for one framed submission. Caller holds the lock.
    pub(crate) async fn execute_locked(&self, frame: &[u8]) -> SessionResult<ExecutionResult> {
        self.execute_locked_within(frame, self.config.output_timeout)
            .await
    }

    /// [`execute_locked`](Self::execute_locked) with an explicit budget for
    /// each output channel.
    pub(crate) async fn execute_locked_within(
        &self,
        frame: &[u8],
        output_timeout: Option<Duration>,
    ) -> SessionResult<ExecutionResult> {
        self.submit(frame).await?;
        let scanner = self.scanner();
        let output = scanner.read_until(END_OF_TRANSMISSION, output_timeout).await?;
        let error = scanner.read_until(END_OF_TRANSMISSION, output_timeout).await?;

        let result = ExecutionResult::new(output, error);
        if !result.is_success() {
            metrics::counter!(metric_defs::REMOTE_EXCEPTIONS.name, &self.labels.to_labels())
                .increment(1);
            debug!(
                address = %self.address(),
                exception = result.exception_summary().unwrap_or_default(),
                "remote code raised"
            );
        }
        Ok(result)
    }

    /// Wait for the prompt, send the frame and wait for the acknowledgement.
    pub(crate) async fn submit(&self, frame: &[u8]) -> SessionResult<()> {
        self.ensure_open()?;
        metrics::counter!(metric_defs::EXECUTIONS.name, &self.labels.to_labels()).increment(1);
        let scanner = self.scanner();
        scanner.read_until(RAW_PROMPT, self.config.prompt_timeout).await?;
        self.write(frame).await?;
        scanner.read_until(SUBMISSION_ACK, self.config.ack_timeout).await?;
        trace!(address = %self.address(), len = frame.len(), "submission accepted");
        Ok(())
    }

    /// Apply the recovery policy to the outcome of a locked exchange.
    ///
    /// Must be called after the lock is released.
    pub(crate) async fn settle<R>(&self, outcome: SessionResult<R>) -> SessionResult<R> {
        match outcome {
            Ok(value) => Ok(value),
            Err(_) if self.is_closed() => Err(SessionError::Closed),
            Err(err) => {
                metrics::counter!(metric_defs::EXECUTION_FAILURES.name, &self.labels.to_labels())
                    .increment(1);
                if err.triggers_recovery() {
                    self.recover(&err).await;
                }
                Err(err)
            }
        }
    }

    /// Force the device back into raw mode after `cause`. Never fails; a
    /// failed handshake is logged and left for the next operation.
    pub(crate) async fn recover(&self, cause: &(dyn fmt::Display + Sync)) {
        warn!(address = %self.address(), error = %cause, "re-synchronizing after failure");
        metrics::counter!(metric_defs::RECOVERIES.name, &self.labels.to_labels()).increment(1);
        self.set_state(SyncState::Unsynced);
        if let Err(err) = self.initialize().await {
            warn!(address = %self.address(), error = %err, "recovery handshake failed");
        }
    }

    /// Evaluate an expression and return its printed value.
    ///
    /// Fails with [`SessionError::Remote`] if evaluation raised.
    pub async fn eval(&self, expr: &str) -> SessionResult<String> {
        let code = RemoteCommand::Eval {
            expr: expr.to_string(),
        }
        .to_code();
        let result = self.execute(&code).await?;
        if !result.is_success() {
            let summary = result.exception_summary().unwrap_or_default().to_string();
            return Err(SessionError::Remote(summary));
        }
        Ok(trim_printed(&result.output).to_string())
    }

    // ========================================================================
    // Out-of-band access
    // ========================================================================

    /// Write bytes straight to the transport, bypassing the lock and all
    /// protocol checks.
    ///
    /// Meant for interrupts while a streaming run is in flight; anything else
    /// may desynchronize the session.
    pub async fn dangerously_write(&self, data: &[u8]) -> SessionResult<()> {
        self.ensure_open()?;
        debug!(address = %self.address(), len = data.len(), "raw write");
        self.write(data).await
    }

    /// Send the interrupt sequence out of band.
    pub async fn interrupt(&self) -> SessionResult<()> {
        self.dangerously_write(INTERRUPT_SEQUENCE).await
    }

    /// Close the transport regardless of any operation in flight.
    ///
    /// Terminal: every later operation fails with [`SessionError::Closed`].
    pub async fn close(&self) -> SessionResult<()> {
        {
            let mut state = self.state.lock();
            if *state == SyncState::Closed {
                return Ok(());
            }
            *state = SyncState::Closed;
        }
        debug!(address = %self.address(), "closing session");
        self.transport.close().await?;
        Ok(())
    }

    /// Hold the lock across several submissions.
    ///
    /// Nothing else runs on the session until the section is released. Call
    /// [`ExclusiveSection::release`] so a failure inside the section can
    /// re-synchronize the device. Handshakes first if the session is not
    /// [`SyncState::Ready`].
    pub async fn exclusive(&self) -> SessionResult<ExclusiveSection<'_, T>> {
        self.ensure_open()?;
        let guard = self.lock.acquire(&self.labels).await;
        self.resync_locked().await?;
        Ok(ExclusiveSection {
            session: self,
            guard: Some(guard),
            failure: None,
        })
    }
}

/// Several submissions under one lock acquisition.
pub struct ExclusiveSection<'a, T: Transport> {
    session: &'a Session<T>,
    guard: Option<FlightGuard<'a>>,
    failure: Option<String>,
}

impl<'a, T: Transport> ExclusiveSection<'a, T> {
    /// Run `code` inside the section. No recovery happens here; it is
    /// deferred to [`release`](Self::release).
    pub async fn execute(&mut self, code: &str) -> SessionResult<ExecutionResult> {
        self.session.ensure_open()?;
        if code.is_empty() {
            return Ok(ExecutionResult::default());
        }
        let frame = encode_submission(code).map_err(SessionError::InvalidCode)?;
        match self.session.execute_locked(&frame).await {
            Ok(result) => Ok(result),
            Err(err) => {
                if err.triggers_recovery() && self.failure.is_none() {
                    self.failure = Some(err.to_string());
                }
                Err(err)
            }
        }
    }

    /// Release the lock and re-synchronize if anything inside failed.
    pub async fn release(mut self) {
        self.guard.take();
        if let Some(cause) = self.failure.take() {
            if !self.session.is_closed() {
                self.session.recover(&cause).await;
            }
        }
    }
}

impl<'a, T: Transport> Drop for ExclusiveSection<'a, T> {
    fn drop(&mut self) {
        if self.failure.is_some() {
            warn!(
                address = %self.session.address(),
                "exclusive section dropped after a failure without release"
            );
            self.session.set_state(SyncState::Unsynced);
        }
    }
}
