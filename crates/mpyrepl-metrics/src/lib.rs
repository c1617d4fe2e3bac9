//! Metrics infrastructure for the raw REPL session driver.
//!
//! This crate declares every metric the driver emits as a structured
//! [`Metric`] constant and re-exports the `metrics` crate. No recorder is
//! installed here; without one the facade calls are no-ops.
//!
//! # Example
//!
//! ```rust,ignore
//! use mpyrepl_metrics::{metric_defs, MetricLabels};
//!
//! let labels = MetricLabels::new("/dev/ttyUSB0", "serial");
//! metrics::counter!(metric_defs::EXECUTIONS.name, &labels.to_labels()).increment(1);
//! ```

pub use metrics;

use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};

/// The kind of metric (counter, gauge, or histogram).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// A monotonically increasing counter.
    Counter,
    /// A gauge that can go up and down.
    Gauge,
    /// A histogram for recording distributions.
    Histogram,
}

impl MetricKind {
    /// Returns the kind as a lowercase string.
    pub const fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Histogram => "histogram",
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A metric declaration with its metadata.
///
/// ```rust
/// use mpyrepl_metrics::{Metric, MetricKind};
/// use metrics::Unit;
///
/// const WRITES: Metric = Metric::counter("mpyrepl.transport.writes")
///     .with_description("Writes issued")
///     .with_unit(Unit::Count)
///     .with_labels(&["address"]);
///
/// assert_eq!(WRITES.kind, MetricKind::Counter);
/// ```
#[derive(Debug, Clone)]
pub struct Metric {
    /// The metric name (e.g., "mpyrepl.session.executions").
    pub name: &'static str,
    /// The kind of metric (counter, gauge, histogram).
    pub kind: MetricKind,
    /// Human-readable description of the metric.
    pub description: &'static str,
    /// The unit of measurement (optional).
    pub unit: Option<Unit>,
    /// Expected label keys for this metric.
    pub labels: &'static [&'static str],
}

impl Metric {
    /// Creates a new counter metric with the given name.
    pub const fn counter(name: &'static str) -> Self {
        Self {
            name,
            kind: MetricKind::Counter,
            description: "",
            unit: None,
            labels: &[],
        }
    }

    /// Creates a new gauge metric with the given name.
    pub const fn gauge(name: &'static str) -> Self {
        Self {
            name,
            kind: MetricKind::Gauge,
            description: "",
            unit: None,
            labels: &[],
        }
    }

    /// Creates a new histogram metric with the given name.
    pub const fn histogram(name: &'static str) -> Self {
        Self {
            name,
            kind: MetricKind::Histogram,
            description: "",
            unit: None,
            labels: &[],
        }
    }

    /// Sets the description for the metric.
    pub const fn with_description(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    /// Sets the unit for the metric.
    pub const fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = Some(unit);
        self
    }

    /// Sets the expected label keys for the metric.
    pub const fn with_labels(mut self, labels: &'static [&'static str]) -> Self {
        self.labels = labels;
        self
    }

    /// Registers this metric's description with the metrics recorder.
    pub fn describe(&self) {
        match (self.kind, self.unit) {
            (MetricKind::Counter, Some(unit)) => {
                describe_counter!(self.name, unit, self.description);
            }
            (MetricKind::Counter, None) => {
                describe_counter!(self.name, self.description);
            }
            (MetricKind::Gauge, Some(unit)) => {
                describe_gauge!(self.name, unit, self.description);
            }
            (MetricKind::Gauge, None) => {
                describe_gauge!(self.name, self.description);
            }
            (MetricKind::Histogram, Some(unit)) => {
                describe_histogram!(self.name, unit, self.description);
            }
            (MetricKind::Histogram, None) => {
                describe_histogram!(self.name, self.description);
            }
        }
    }
}

/// All metric definitions for the driver.
pub mod metric_defs {
    use super::{Metric, Unit};

    /// Labels present on every session metric.
    pub const STANDARD_LABELS: &[&str] = &["address", "kind"];

    // ========================================================================
    // Handshake
    // ========================================================================

    /// Interrupt + raw-mode sequences sent.
    pub const HANDSHAKE_ATTEMPTS: Metric = Metric::counter("mpyrepl.handshake.attempts")
        .with_description("Interrupt and raw-mode sequences sent")
        .with_unit(Unit::Count)
        .with_labels(STANDARD_LABELS);

    /// Handshakes that saw the raw REPL banner.
    pub const HANDSHAKE_COMPLETED: Metric = Metric::counter("mpyrepl.handshake.completed")
        .with_description("Handshakes that reached raw mode")
        .with_unit(Unit::Count)
        .with_labels(STANDARD_LABELS);

    // ========================================================================
    // Execution
    // ========================================================================

    /// Code submissions that reached the device.
    pub const EXECUTIONS: Metric = Metric::counter("mpyrepl.session.executions")
        .with_description("Code submissions sent to the device")
        .with_unit(Unit::Count)
        .with_labels(STANDARD_LABELS);

    /// Submissions that failed at the transport or protocol level.
    pub const EXECUTION_FAILURES: Metric = Metric::counter("mpyrepl.session.execution_failures")
        .with_description("Submissions that failed at the transport or protocol level")
        .with_unit(Unit::Count)
        .with_labels(STANDARD_LABELS);

    /// Submissions whose code raised on the device.
    pub const REMOTE_EXCEPTIONS: Metric = Metric::counter("mpyrepl.session.remote_exceptions")
        .with_description("Submissions that raised an exception on the device")
        .with_unit(Unit::Count)
        .with_labels(STANDARD_LABELS);

    /// Re-synchronizations triggered by a failure.
    pub const RECOVERIES: Metric = Metric::counter("mpyrepl.session.recoveries")
        .with_description("Re-synchronizations triggered by a failed operation")
        .with_unit(Unit::Count)
        .with_labels(STANDARD_LABELS);

    /// Time spent waiting for the single-flight lock.
    pub const LOCK_WAIT: Metric = Metric::histogram("mpyrepl.session.lock_wait_us")
        .with_description("Time spent waiting for the session lock")
        .with_unit(Unit::Microseconds)
        .with_labels(STANDARD_LABELS);

    /// Wall time of a full submission.
    pub const EXECUTION_TIME: Metric = Metric::histogram("mpyrepl.session.execution_time_us")
        .with_description("Wall time of one submission")
        .with_unit(Unit::Microseconds)
        .with_labels(STANDARD_LABELS);

    // ========================================================================
    // Transport
    // ========================================================================

    /// Bytes written to the transport.
    pub const BYTES_WRITTEN: Metric = Metric::counter("mpyrepl.transport.bytes_written")
        .with_description("Bytes written to the transport")
        .with_unit(Unit::Bytes)
        .with_labels(STANDARD_LABELS);

    /// Bytes read from the transport.
    pub const BYTES_READ: Metric = Metric::counter("mpyrepl.transport.bytes_read")
        .with_description("Bytes read from the transport")
        .with_unit(Unit::Bytes)
        .with_labels(STANDARD_LABELS);

    /// All metric definitions.
    pub const ALL: &[&Metric] = &[
        &HANDSHAKE_ATTEMPTS,
        &HANDSHAKE_COMPLETED,
        &EXECUTIONS,
        &EXECUTION_FAILURES,
        &REMOTE_EXCEPTIONS,
        &RECOVERIES,
        &LOCK_WAIT,
        &EXECUTION_TIME,
        &BYTES_WRITTEN,
        &BYTES_READ,
    ];
}

/// Labels identifying one session.
#[derive(Debug, Clone)]
pub struct MetricLabels {
    /// Endpoint address (serial path or socket address).
    pub address: String,
    /// Connection kind (serial, socket, memory).
    pub kind: String,
}

impl MetricLabels {
    /// Creates labels for the given endpoint.
    pub fn new(address: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            kind: kind.into(),
        }
    }

    /// Converts the labels to the metrics crate label format.
    pub fn to_labels(&self) -> Vec<(&'static str, String)> {
        vec![("address", self.address.clone()), ("kind", self.kind.clone())]
    }
}

/// Describes all metrics used by the driver.
///
/// Call once at startup after installing a recorder.
pub fn describe_metrics() {
    for metric in metric_defs::ALL {
        metric.describe();
    }
}
