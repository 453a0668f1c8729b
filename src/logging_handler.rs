//! Reference [`HttpLogWriter`] implementations.
//!
//! [`TracingWriter`] emits every record as a `tracing` event, and
//! [`ChannelWriter`] relays records to a background consumer over an unbounded
//! channel, for integrators who ship logs asynchronously.

use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, Level};

use crate::correlation::{Correlation, CorrelationId, Precorrelation};
use crate::error::{Phase, WriteError};
use crate::sink::HttpLogWriter;
use crate::types::HttpMessage;

/// Writes records as `info` events on the `sightline::http` target.
///
/// The writer reports itself inactive whenever that level is disabled for the
/// target, so no filtering or formatting happens for exchanges that would be
/// discarded anyway.
///
/// The logged fields are:
/// - `correlation_id` for matching requests with responses
/// - `duration_ms` for responses
/// - the rendered record as the event message
///
/// # Examples
///
/// ```rust
/// use sightline::{Logbook, TracingWriter};
/// use sightline::formatter::DefaultHttpLogFormatter;
/// use sightline::sink::DefaultSink;
///
/// let logbook = Logbook::builder()
///     .sink(DefaultSink::new(DefaultHttpLogFormatter, TracingWriter))
///     .build();
/// # let _ = logbook;
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingWriter;

impl HttpLogWriter for TracingWriter {
    fn is_active(&self) -> bool {
        tracing::enabled!(target: "sightline::http", Level::INFO)
    }

    fn write_request(&self, precorrelation: &Precorrelation, record: &str) -> Result<(), WriteError> {
        info!(
            target: "sightline::http",
            correlation_id = %precorrelation.id(),
            "{record}"
        );
        Ok(())
    }

    fn write_response(&self, correlation: &Correlation, record: &str) -> Result<(), WriteError> {
        info!(
            target: "sightline::http",
            correlation_id = %correlation.id(),
            duration_ms = u64::try_from(correlation.duration().as_millis()).unwrap_or(u64::MAX),
            "{record}"
        );
        Ok(())
    }
}

/// One rendered record as delivered by a [`ChannelWriter`].
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub correlation_id: CorrelationId,
    pub phase: Phase,
    /// The filtered message the record was rendered from.
    pub message: HttpMessage,
    /// Time between request and response; `None` for request records.
    pub duration: Option<Duration>,
    pub text: String,
}

/// Relays records to a background consumer.
///
/// The writer stays active while the receiving half is alive. Once it is dropped,
/// [`is_active`](HttpLogWriter::is_active) turns false and writes fail with
/// [`WriteError::Closed`].
///
/// # Examples
///
/// ```rust
/// use sightline::{ChannelWriter, Logbook};
/// use sightline::formatter::DefaultHttpLogFormatter;
/// use sightline::sink::DefaultSink;
/// use sightline::types::HttpRequest;
///
/// let (writer, mut records) = ChannelWriter::new();
/// let logbook = Logbook::builder()
///     .sink(DefaultSink::new(DefaultHttpLogFormatter, writer))
///     .build();
///
/// logbook.on_request(HttpRequest::new("GET", "http://localhost/hello"));
///
/// let record = records.try_recv().unwrap();
/// assert!(record.text.starts_with("Incoming Request:"));
/// ```
#[derive(Debug, Clone)]
pub struct ChannelWriter {
    tx: mpsc::UnboundedSender<LogRecord>,
}

impl ChannelWriter {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<LogRecord>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, record: LogRecord) -> Result<(), WriteError> {
        self.tx.send(record).map_err(|_| WriteError::Closed)
    }
}

impl HttpLogWriter for ChannelWriter {
    fn is_active(&self) -> bool {
        !self.tx.is_closed()
    }

    fn write_request(&self, precorrelation: &Precorrelation, record: &str) -> Result<(), WriteError> {
        self.send(LogRecord {
            correlation_id: precorrelation.id(),
            phase: Phase::Request,
            message: HttpMessage::Request(precorrelation.request().clone()),
            duration: None,
            text: record.to_owned(),
        })
    }

    fn write_response(&self, correlation: &Correlation, record: &str) -> Result<(), WriteError> {
        self.send(LogRecord {
            correlation_id: correlation.id(),
            phase: Phase::Response,
            message: HttpMessage::Response(correlation.response().clone()),
            duration: Some(correlation.duration()),
            text: record.to_owned(),
        })
    }
}
