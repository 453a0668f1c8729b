//! Error types raised while recording an exchange.
//!
//! None of these ever reach the traffic itself: the [`Logbook`](crate::Logbook)
//! reports them on the diagnostic target and carries on, except for response
//! writes in strict mode.

/// Failure reported by an [`HttpLogWriter`](crate::sink::HttpLogWriter).
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("I/O error while writing log record: {0}")]
    Io(#[from] std::io::Error),
    #[error("log writer is closed")]
    Closed,
    #[error("{0}")]
    Other(String),
}

/// Failure while rendering a record.
#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Anything that can go wrong inside the logging pipeline for one phase.
#[derive(Debug, thiserror::Error)]
pub enum LogbookError {
    #[error("failed to format {phase} record: {source}")]
    Format {
        phase: Phase,
        #[source]
        source: FormatError,
    },
    #[error("failed to write {phase} record: {source}")]
    Write {
        phase: Phase,
        #[source]
        source: WriteError,
    },
    #[error("{phase} logging panicked: {message}")]
    Panicked { phase: Phase, message: String },
}

impl LogbookError {
    /// The phase of the exchange the error happened in.
    pub fn phase(&self) -> Phase {
        match self {
            Self::Format { phase, .. } | Self::Write { phase, .. } | Self::Panicked { phase, .. } => {
                *phase
            }
        }
    }
}

/// Which half of an exchange is being processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Request,
    Response,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Request => f.write_str("request"),
            Self::Response => f.write_str("response"),
        }
    }
}
