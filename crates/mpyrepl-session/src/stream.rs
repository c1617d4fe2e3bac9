//! Streaming execution.
//!
//! Output is forwarded byte by byte as it arrives instead of being collected.
//! Two front ends share one driver loop:
//!
//! - [`Session::execute_interactive`] calls a closure for every [`Output`]
//! - [`Session::execute_stream`] returns an [`ExecStream`], a bounded channel
//!   of [`Output`] events filled by a spawned task
//!
//! Dropping an [`ExecStream`] before it finishes detaches the consumer: the
//! driver sends the interrupt sequence, drains the rest of the run so the
//! protocol stays framed, and releases the lock.

use std::sync::Arc;

use async_trait::async_trait;
use mpyrepl_metrics::metric_defs;
use mpyrepl_protocol::{
    decode_text, encode_submission, ExecutionResult, CTRL_D, END_OF_TRANSMISSION,
    INTERRUPT_SEQUENCE,
};
use mpyrepl_transport::Transport;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{SessionError, SessionResult};
use crate::session::Session;

/// One event of a streaming run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "byte", rename_all = "snake_case")]
pub enum Output {
    /// The run was accepted for streaming; sent before any transport access.
    Started,
    /// One byte of stdout.
    Stdout(u8),
    /// One byte of stderr.
    Stderr(u8),
    /// Both channels ended. Only sent through an [`ExecStream`].
    Finished,
}

impl Output {
    /// The carried byte, if any.
    pub fn byte(&self) -> Option<u8> {
        match self {
            Output::Stdout(byte) | Output::Stderr(byte) => Some(*byte),
            Output::Started | Output::Finished => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Channel {
    Stdout,
    Stderr,
}

impl Channel {
    fn wrap(self, byte: u8) -> Output {
        match self {
            Channel::Stdout => Output::Stdout(byte),
            Channel::Stderr => Output::Stderr(byte),
        }
    }
}

/// Receiver of streamed output.
#[async_trait]
pub trait OutputSink: Send {
    /// Deliver one event. Returns `false` once the consumer has gone away.
    async fn deliver(&mut self, output: Output) -> bool;
}

/// Sink calling a closure.
pub struct CallbackSink<F> {
    callback: F,
}

impl<F: FnMut(Output) + Send> CallbackSink<F> {
    /// Wrap `callback`.
    pub fn new(callback: F) -> Self {
        CallbackSink { callback }
    }
}

#[async_trait]
impl<F: FnMut(Output) + Send> OutputSink for CallbackSink<F> {
    async fn deliver(&mut self, output: Output) -> bool {
        (self.callback)(output);
        true
    }
}

/// Sink feeding a bounded channel. Waits when the channel is full.
pub struct ChannelSink {
    tx: mpsc::Sender<Output>,
}

impl ChannelSink {
    /// Wrap `tx`.
    pub fn new(tx: mpsc::Sender<Output>) -> Self {
        ChannelSink { tx }
    }
}

#[async_trait]
impl OutputSink for ChannelSink {
    async fn deliver(&mut self, output: Output) -> bool {
        self.tx.send(output).await.is_ok()
    }
}

/// Output of a run started with [`Session::execute_stream`].
pub struct ExecStream {
    rx: mpsc::Receiver<Output>,
    task: Option<JoinHandle<SessionResult<()>>>,
}

impl ExecStream {
    /// Next event, or `None` once the run is over.
    pub async fn next(&mut self) -> Option<Output> {
        self.rx.recv().await
    }

    /// Consume the remaining events and wait for the run to end.
    ///
    /// Returns the output not yet taken with [`next`](Self::next), or the
    /// error that ended the run.
    pub async fn finish(mut self) -> SessionResult<ExecutionResult> {
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        while let Some(output) = self.rx.recv().await {
            match output {
                Output::Stdout(byte) => stdout.push(byte),
                Output::Stderr(byte) => stderr.push(byte),
                Output::Started | Output::Finished => {}
            }
        }
        if let Some(task) = self.task.take() {
            task.await
                .map_err(|err| SessionError::Task(err.to_string()))??;
        }
        Ok(ExecutionResult::new(decode_text(&stdout), decode_text(&stderr)))
    }
}

impl<T: Transport> Session<T> {
    /// Run `code`, handing every output byte to `on_output` as it arrives.
    ///
    /// `on_output` first receives [`Output::Started`], then every stdout byte
    /// and every stderr byte in arrival order. Synchronization and recovery
    /// follow [`execute`](Self::execute).
    pub async fn execute_interactive<F>(&self, code: &str, on_output: F) -> SessionResult<()>
    where
        F: FnMut(Output) + Send,
    {
        self.ensure_open()?;
        let frame = if code.is_empty() {
            None
        } else {
            Some(encode_submission(code).map_err(SessionError::InvalidCode)?)
        };
        let mut sink = CallbackSink::new(on_output);
        sink.deliver(Output::Started).await;
        let frame = match frame {
            Some(frame) => frame,
            None => return Ok(()),
        };

        let outcome = {
            let _guard = self.lock.acquire(&self.labels).await;
            match self.resync_locked().await {
                Ok(()) => self.stream_locked(&frame, &mut sink).await,
                Err(err) => Err(err),
            }
        };
        self.settle(outcome).await
    }

    /// Run `code` on a background task and stream its output.
    ///
    /// The stream yields [`Output::Started`], the output bytes and finally
    /// [`Output::Finished`]. The driver waits while the stream is full.
    pub fn execute_stream(self: &Arc<Self>, code: &str) -> SessionResult<ExecStream>
    where
        T: 'static,
    {
        self.ensure_open()?;
        let frame = if code.is_empty() {
            None
        } else {
            Some(encode_submission(code).map_err(SessionError::InvalidCode)?)
        };

        let (tx, rx) = mpsc::channel(self.config.stream_capacity.max(1));
        let session = Arc::clone(self);
        let task = tokio::spawn(async move {
            let mut sink = ChannelSink::new(tx);
            if !sink.deliver(Output::Started).await {
                return Ok(());
            }
            let frame = match frame {
                Some(frame) => frame,
                None => {
                    sink.deliver(Output::Finished).await;
                    return Ok(());
                }
            };

            let outcome = {
                let _guard = session.lock.acquire(&session.labels).await;
                match session.resync_locked().await {
                    Ok(()) => session.stream_locked(&frame, &mut sink).await,
                    Err(err) => Err(err),
                }
            };
            match session.settle(outcome).await {
                Ok(()) => {
                    sink.deliver(Output::Finished).await;
                    Ok(())
                }
                Err(err) => {
                    debug!(address = %session.address(), error = %err, "stream ended with error");
                    Err(err)
                }
            }
        });

        Ok(ExecStream {
            rx,
            task: Some(task),
        })
    }

    /// Streaming exchange for one framed submission. Caller holds the lock.
    async fn stream_locked<S: OutputSink>(&self, frame: &[u8], sink: &mut S) -> SessionResult<()> {
        self.submit(frame).await?;
        let scanner = self.scanner();
        let mut attached = true;

        for channel in [Channel::Stdout, Channel::Stderr] {
            let mut deadline = self
                .config
                .output_timeout
                .map(|timeout| Instant::now() + timeout);
            let mut received = 0u64;
            loop {
                let byte = scanner.next_byte(END_OF_TRANSMISSION, deadline).await?;
                received += 1;
                if byte == CTRL_D {
                    break;
                }
                if attached && !sink.deliver(channel.wrap(byte)).await {
                    attached = false;
                    debug!(address = %self.address(), "output consumer detached, interrupting run");
                    self.write(INTERRUPT_SEQUENCE).await?;
                    deadline = self
                        .config
                        .drain_timeout()
                        .map(|timeout| Instant::now() + timeout);
                }
            }
            metrics::counter!(metric_defs::BYTES_READ.name, &self.labels.to_labels())
                .increment(received);
        }
        Ok(())
    }
}
