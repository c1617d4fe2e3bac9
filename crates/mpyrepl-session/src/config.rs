//! Session timing and behaviour configuration.

use std::time::Duration;

/// Configuration for a [`crate::Session`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Budget for the banner after each raw-mode request.
    pub handshake_timeout: Duration,

    /// Handshake attempts before `initialize` gives up.
    /// `None` retries until the banner appears or the session is closed.
    pub max_handshake_attempts: Option<usize>,

    /// Pause between failed handshake attempts.
    pub handshake_retry_delay: Duration,

    /// Budget for the `>` prompt before a submission.
    /// `None` waits for as long as the transport stays open.
    pub prompt_timeout: Option<Duration>,

    /// Budget for the `OK` acknowledgement after a submission.
    pub ack_timeout: Option<Duration>,

    /// Budget for each output channel terminator.
    /// Programs may legitimately run for a long time, so this is unbounded by
    /// default.
    pub output_timeout: Option<Duration>,

    /// Import `os` right after entering raw mode so filesystem helpers work.
    pub prime_import: bool,

    /// Events buffered by an [`crate::ExecStream`] before the driver waits
    /// for the consumer.
    pub stream_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            handshake_timeout: Duration::from_millis(1000),
            max_handshake_attempts: Some(1000),
            handshake_retry_delay: Duration::from_millis(50),
            prompt_timeout: Some(Duration::from_secs(5)),
            ack_timeout: Some(Duration::from_secs(5)),
            output_timeout: None,
            prime_import: true,
            stream_capacity: 256,
        }
    }
}

impl SessionConfig {
    /// Set the banner budget.
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Set the attempt bound (`None` for unbounded).
    pub fn with_max_handshake_attempts(mut self, attempts: Option<usize>) -> Self {
        self.max_handshake_attempts = attempts;
        self
    }

    /// Set the pause between handshake attempts.
    pub fn with_handshake_retry_delay(mut self, delay: Duration) -> Self {
        self.handshake_retry_delay = delay;
        self
    }

    /// Set the prompt budget.
    pub fn with_prompt_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.prompt_timeout = timeout;
        self
    }

    /// Set the acknowledgement budget.
    pub fn with_ack_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.ack_timeout = timeout;
        self
    }

    /// Set the per-channel output budget.
    pub fn with_output_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.output_timeout = timeout;
        self
    }

    /// Enable or disable the `import os` priming step.
    pub fn with_prime_import(mut self, prime: bool) -> Self {
        self.prime_import = prime;
        self
    }

    /// Set the stream buffer size. Zero is raised to one.
    pub fn with_stream_capacity(mut self, capacity: usize) -> Self {
        self.stream_capacity = capacity.max(1);
        self
    }

    /// Budget used when draining a detached stream or an interrupted run.
    pub(crate) fn drain_timeout(&self) -> Option<Duration> {
        self.prompt_timeout.or(Some(Duration::from_secs(5)))
    }

    /// Output budget for the priming import; never unbounded.
    pub(crate) fn prime_timeout(&self) -> Option<Duration> {
        let drain = self.drain_timeout();
        match self.output_timeout {
            Some(output) => drain.map(|drain| drain.min(output)),
            None => drain,
        }
    }
}
