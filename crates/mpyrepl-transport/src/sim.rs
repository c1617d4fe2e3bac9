//! In-memory simulated raw REPL device.
//!
//! [`SimDevice`] is a cloneable handle to a scripted interpreter that speaks
//! the raw REPL wire protocol: `0x01` enters raw mode and prints the banner,
//! `0x04` runs the buffered submission and answers with
//! `OK<stdout>\x04<stderr>\x04>`, `0x03` interrupts. [`SimTransport`] is the
//! [`Transport`] end handed to a session.
//!
//! Responses are scripted per submission; unscripted code succeeds with empty
//! output. Fault controls let tests suppress the banner, stall a run before
//! its terminators, fail writes, inject read timeouts and add latency. Every
//! byte written and every read handed out is recorded as a [`WireEvent`].

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mpyrepl_protocol::{
    CTRL_A, CTRL_B, CTRL_C, CTRL_D, END_OF_TRANSMISSION, RAW_PROMPT, RAW_REPL_BANNER,
    SUBMISSION_ACK,
};
use parking_lot::Mutex;
use tracing::trace;

use crate::error::{TransportError, TransportResult};
use crate::inbound::Inbound;
use crate::{ConnectionKind, Transport};

/// Address reported by simulated transports unless overridden.
pub const SIM_ADDRESS: &str = "sim://device";

/// Traceback printed on the error channel when a stalled run is interrupted.
pub const KEYBOARD_INTERRUPT: &str =
    "Traceback (most recent call last):\r\n  File \"<stdin>\", line 1, in <module>\r\nKeyboardInterrupt: \r\n";

/// Friendly-mode greeting printed when raw mode is left.
const FRIENDLY_PROMPT: &str = "\r\nMicroPython sim\r\n>>> ";

/// Output of one scripted submission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimResponse {
    /// Text written before the first terminator.
    pub stdout: String,
    /// Text written before the second terminator.
    pub stderr: String,
}

impl SimResponse {
    /// A run that prints `stdout` and raises nothing.
    pub fn stdout(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// A run that prints nothing and raises with `stderr`.
    pub fn stderr(stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// One observed transfer on the simulated wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireEvent {
    /// Bytes the host wrote.
    Write(Vec<u8>),
    /// Bytes the host read.
    Read(Vec<u8>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Friendly,
    Raw,
}

type Handler = Arc<dyn Fn(&str) -> Option<SimResponse> + Send + Sync>;

struct DeviceState {
    mode: Mode,
    banner_enabled: bool,
    responses: HashMap<String, VecDeque<SimResponse>>,
    handler: Option<Handler>,
    pending: Vec<u8>,
    stall_next: bool,
    stalled: bool,
    fail_writes: usize,
    fail_reads: usize,
    latency: Duration,
    raw_mode_requests: usize,
    interrupts: usize,
    submissions: Vec<String>,
    events: Vec<WireEvent>,
    inbound: Arc<Inbound>,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            mode: Mode::Friendly,
            banner_enabled: true,
            responses: HashMap::new(),
            handler: None,
            pending: Vec::new(),
            stall_next: false,
            stalled: false,
            fail_writes: 0,
            fail_reads: 0,
            latency: Duration::ZERO,
            raw_mode_requests: 0,
            interrupts: 0,
            submissions: Vec::new(),
            events: Vec::new(),
            inbound: Arc::new(Inbound::new()),
        }
    }
}

impl DeviceState {
    /// Feed host bytes through the interpreter and collect its reply.
    fn consume(&mut self, data: &[u8]) -> Vec<u8> {
        let mut reply = Vec::new();
        for &byte in data {
            match byte {
                CTRL_C => {
                    self.interrupts += 1;
                    self.pending.clear();
                    if self.stalled {
                        self.stalled = false;
                        reply.extend_from_slice(END_OF_TRANSMISSION.as_bytes());
                        reply.extend_from_slice(KEYBOARD_INTERRUPT.as_bytes());
                        reply.extend_from_slice(END_OF_TRANSMISSION.as_bytes());
                        reply.extend_from_slice(RAW_PROMPT.as_bytes());
                    } else if self.mode == Mode::Friendly {
                        reply.extend_from_slice(b"\r\n>>> ");
                    }
                }
                CTRL_A => {
                    self.raw_mode_requests += 1;
                    self.mode = Mode::Raw;
                    self.pending.clear();
                    if self.banner_enabled {
                        reply.extend_from_slice(RAW_REPL_BANNER.as_bytes());
                        reply.extend_from_slice(RAW_PROMPT.as_bytes());
                    }
                }
                CTRL_B => {
                    self.mode = Mode::Friendly;
                    self.pending.clear();
                    reply.extend_from_slice(FRIENDLY_PROMPT.as_bytes());
                }
                CTRL_D if self.mode == Mode::Raw && !self.stalled => {
                    let code = String::from_utf8_lossy(&self.pending).into_owned();
                    self.pending.clear();
                    let response = self.respond_to(&code);
                    self.submissions.push(code);

                    reply.extend_from_slice(SUBMISSION_ACK.as_bytes());
                    reply.extend_from_slice(response.stdout.as_bytes());
                    if self.stall_next {
                        self.stall_next = false;
                        self.stalled = true;
                        continue;
                    }
                    reply.extend_from_slice(END_OF_TRANSMISSION.as_bytes());
                    reply.extend_from_slice(response.stderr.as_bytes());
                    reply.extend_from_slice(END_OF_TRANSMISSION.as_bytes());
                    reply.extend_from_slice(RAW_PROMPT.as_bytes());
                }
                _ if self.mode == Mode::Raw && !self.stalled => self.pending.push(byte),
                _ => {}
            }
        }
        reply
    }

    fn respond_to(&mut self, code: &str) -> SimResponse {
        if let Some(queue) = self.responses.get_mut(code) {
            // The last scripted response keeps answering once the queue is
            // down to one entry.
            if queue.len() > 1 {
                if let Some(response) = queue.pop_front() {
                    return response;
                }
            } else if let Some(response) = queue.front() {
                return response.clone();
            }
        }
        self.handler
            .as_ref()
            .and_then(|handler| handler(code))
            .unwrap_or_default()
    }
}

/// Handle to a simulated raw REPL interpreter.
#[derive(Clone, Default)]
pub struct SimDevice {
    state: Arc<Mutex<DeviceState>>,
}

impl SimDevice {
    /// Create a device in friendly mode that prints its banner on request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new transport to this device.
    ///
    /// Each transport gets a fresh receive queue, so a device can be
    /// reconnected after a previous transport was closed.
    pub fn transport(&self) -> SimTransport {
        self.transport_at(SIM_ADDRESS)
    }

    /// Like [`transport`](Self::transport) with a custom address.
    pub fn transport_at(&self, address: &str) -> SimTransport {
        let inbound = Arc::new(Inbound::new());
        self.state.lock().inbound = inbound.clone();
        SimTransport {
            address: address.to_string(),
            device: self.clone(),
            inbound,
        }
    }

    // ========================================================================
    // Scripting
    // ========================================================================

    /// Answer `code` with `response`.
    ///
    /// Repeated calls for the same code queue responses in order; the last
    /// one keeps answering.
    pub fn respond(&self, code: &str, response: SimResponse) {
        self.state
            .lock()
            .responses
            .entry(code.to_string())
            .or_default()
            .push_back(response);
    }

    /// Answer unscripted code through `handler`; `None` means empty output.
    pub fn set_handler<F>(&self, handler: F)
    where
        F: Fn(&str) -> Option<SimResponse> + Send + Sync + 'static,
    {
        self.state.lock().handler = Some(Arc::new(handler));
    }

    /// Enable or suppress the raw REPL banner.
    pub fn set_banner_enabled(&self, enabled: bool) {
        self.state.lock().banner_enabled = enabled;
    }

    /// Make the next run print its stdout and then hang until interrupted.
    pub fn stall_next_submission(&self) {
        self.state.lock().stall_next = true;
    }

    /// Fail the next `count` writes.
    pub fn fail_next_writes(&self, count: usize) {
        self.state.lock().fail_writes = count;
    }

    /// Fail the next `count` reads with a read timeout.
    pub fn fail_next_reads(&self, count: usize) {
        self.state.lock().fail_reads = count;
    }

    /// Delay every reply by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.state.lock().latency = latency;
    }

    /// Push unsolicited bytes to the host.
    pub fn emit(&self, data: &[u8]) {
        let inbound = self.state.lock().inbound.clone();
        inbound.push(data);
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    /// Times `0x01` was received.
    pub fn raw_mode_requests(&self) -> usize {
        self.state.lock().raw_mode_requests
    }

    /// Times `0x03` was received.
    pub fn interrupts(&self) -> usize {
        self.state.lock().interrupts
    }

    /// Submissions run so far, in order.
    pub fn submissions(&self) -> Vec<String> {
        self.state.lock().submissions.clone()
    }

    /// Everything observed on the wire, in order.
    pub fn events(&self) -> Vec<WireEvent> {
        self.state.lock().events.clone()
    }

    /// All bytes the host wrote, concatenated.
    pub fn written(&self) -> Vec<u8> {
        self.state
            .lock()
            .events
            .iter()
            .filter_map(|event| match event {
                WireEvent::Write(data) => Some(data.as_slice()),
                WireEvent::Read(_) => None,
            })
            .flatten()
            .copied()
            .collect()
    }

    /// True while in raw mode.
    pub fn is_raw(&self) -> bool {
        self.state.lock().mode == Mode::Raw
    }
}

/// Transport end of a [`SimDevice`].
pub struct SimTransport {
    address: String,
    device: SimDevice,
    inbound: Arc<Inbound>,
}

impl SimTransport {
    /// The device behind this transport.
    pub fn device(&self) -> &SimDevice {
        &self.device
    }
}

#[async_trait]
impl Transport for SimTransport {
    fn address(&self) -> &str {
        &self.address
    }

    fn kind(&self) -> ConnectionKind {
        ConnectionKind::Memory
    }

    fn available_bytes(&self) -> usize {
        self.inbound.len()
    }

    async fn read(&self, n: usize, timeout: Option<Duration>) -> TransportResult<Vec<u8>> {
        {
            let mut state = self.device.state.lock();
            if state.fail_reads > 0 {
                state.fail_reads -= 1;
                return Err(TransportError::ReadTimeout);
            }
        }
        let data = self.inbound.read(n, timeout).await?;
        self.device
            .state
            .lock()
            .events
            .push(WireEvent::Read(data.clone()));
        Ok(data)
    }

    async fn write(&self, data: &[u8]) -> TransportResult<()> {
        if self.inbound.is_closed() {
            return Err(TransportError::Closed);
        }
        let (reply, latency) = {
            let mut state = self.device.state.lock();
            if state.fail_writes > 0 {
                state.fail_writes -= 1;
                return Err(TransportError::Injected("write failed".to_string()));
            }
            state.events.push(WireEvent::Write(data.to_vec()));
            (state.consume(data), state.latency)
        };
        trace!(len = data.len(), reply = reply.len(), "sim write");

        if !reply.is_empty() {
            if latency.is_zero() {
                self.inbound.push(&reply);
            } else {
                let inbound = self.inbound.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(latency).await;
                    inbound.push(&reply);
                });
            }
        }
        Ok(())
    }

    async fn close(&self) -> TransportResult<()> {
        self.inbound.close();
        Ok(())
    }
}
