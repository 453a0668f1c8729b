//! Final consumers of log records.
//!
//! A [`Sink`] receives a precorrelation or correlation whose messages are already
//! filtered and turns it into output. [`DefaultSink`] pairs an
//! [`HttpLogFormatter`] with an [`HttpLogWriter`]; [`CompositeSink`] fans out to
//! several sinks.
//!
//! # Example
//!
//! ```rust
//! use sightline::formatter::{DefaultHttpLogFormatter, JsonHttpLogFormatter};
//! use sightline::sink::{CompositeSink, DefaultSink};
//! use sightline::{ChannelWriter, TracingWriter};
//!
//! let (writer, _records) = ChannelWriter::new();
//! let sink = CompositeSink::new()
//!     .with(DefaultSink::new(DefaultHttpLogFormatter, TracingWriter))
//!     .with(DefaultSink::new(JsonHttpLogFormatter, writer));
//!
//! assert_eq!(sink.len(), 2);
//! ```

use std::sync::Arc;

use crate::correlation::{Correlation, Precorrelation};
use crate::error::{LogbookError, Phase, WriteError};
use crate::formatter::HttpLogFormatter;

/// Destination for rendered records.
pub trait HttpLogWriter: Send + Sync + 'static {
    /// Whether records would be written at all. When this returns `false` no
    /// filtering or formatting happens for the exchange.
    fn is_active(&self) -> bool {
        true
    }

    fn write_request(&self, precorrelation: &Precorrelation, record: &str) -> Result<(), WriteError>;

    fn write_response(&self, correlation: &Correlation, record: &str) -> Result<(), WriteError>;
}

impl<W: HttpLogWriter + ?Sized> HttpLogWriter for Arc<W> {
    fn is_active(&self) -> bool {
        (**self).is_active()
    }

    fn write_request(&self, precorrelation: &Precorrelation, record: &str) -> Result<(), WriteError> {
        (**self).write_request(precorrelation, record)
    }

    fn write_response(&self, correlation: &Correlation, record: &str) -> Result<(), WriteError> {
        (**self).write_response(correlation, record)
    }
}

/// Gatekeeper and final consumer of filtered exchanges.
pub trait Sink: Send + Sync + 'static {
    fn is_active(&self) -> bool;

    fn write_request(&self, precorrelation: &Precorrelation) -> Result<(), LogbookError>;

    fn write_response(&self, correlation: &Correlation) -> Result<(), LogbookError>;
}

/// Formats with `F` and writes with `W`. Nothing is retried or buffered.
#[derive(Debug, Clone)]
pub struct DefaultSink<F, W> {
    formatter: F,
    writer: W,
}

impl<F, W> DefaultSink<F, W>
where
    F: HttpLogFormatter,
    W: HttpLogWriter,
{
    pub fn new(formatter: F, writer: W) -> Self {
        Self { formatter, writer }
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }
}

impl<F, W> Sink for DefaultSink<F, W>
where
    F: HttpLogFormatter,
    W: HttpLogWriter,
{
    fn is_active(&self) -> bool {
        self.writer.is_active()
    }

    fn write_request(&self, precorrelation: &Precorrelation) -> Result<(), LogbookError> {
        let record = self
            .formatter
            .format_request(precorrelation)
            .map_err(|source| LogbookError::Format {
                phase: Phase::Request,
                source,
            })?;
        self.writer
            .write_request(precorrelation, &record)
            .map_err(|source| LogbookError::Write {
                phase: Phase::Request,
                source,
            })
    }

    fn write_response(&self, correlation: &Correlation) -> Result<(), LogbookError> {
        let record = self
            .formatter
            .format_response(correlation)
            .map_err(|source| LogbookError::Format {
                phase: Phase::Response,
                source,
            })?;
        self.writer
            .write_response(correlation, &record)
            .map_err(|source| LogbookError::Write {
                phase: Phase::Response,
                source,
            })
    }
}

/// A sink that delegates to multiple inner sinks.
///
/// It is active as soon as one member is. Records go to active members only, in
/// the order they were added; every active member is tried and the first
/// failure is reported.
#[derive(Clone, Default)]
pub struct CompositeSink {
    sinks: Vec<Arc<dyn Sink>>,
}

impl CompositeSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sink to the chain. Returns self for builder pattern.
    pub fn with<S: Sink>(mut self, sink: S) -> Self {
        self.sinks.push(Arc::new(sink));
        self
    }

    /// Returns true if no sinks have been added.
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Returns the number of sinks in the chain.
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    fn each_active<F>(&self, mut write: F) -> Result<(), LogbookError>
    where
        F: FnMut(&dyn Sink) -> Result<(), LogbookError>,
    {
        let mut first_error = None;
        for sink in self.sinks.iter().filter(|sink| sink.is_active()) {
            if let Err(e) = write(sink.as_ref()) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl Sink for CompositeSink {
    fn is_active(&self) -> bool {
        self.sinks.iter().any(|sink| sink.is_active())
    }

    fn write_request(&self, precorrelation: &Precorrelation) -> Result<(), LogbookError> {
        self.each_active(|sink| sink.write_request(precorrelation))
    }

    fn write_response(&self, correlation: &Correlation) -> Result<(), LogbookError> {
        self.each_active(|sink| sink.write_response(correlation))
    }
}

impl std::fmt::Debug for CompositeSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeSink")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}
