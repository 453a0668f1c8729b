//! Correlation of requests with their responses.
//!
//! Every exchange opens with a [`Precorrelation`] once its request is captured
//! and closes with a [`Correlation`] once its response is. Closing consumes the
//! precorrelation, so an exchange can be closed at most once. The engine never
//! searches for the pairing itself: whoever observes the response hands back the
//! precorrelation produced for that same exchange.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant, SystemTime};

use crate::types::{HttpRequest, HttpResponse};

/// Global atomic counter for correlation IDs and process start timestamp
static CORRELATION_COUNTER: AtomicU64 = AtomicU64::new(1);
static PROCESS_START_TIME: OnceLock<u64> = OnceLock::new();

/// Opaque identifier shared by both halves of an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CorrelationId(u64);

impl CorrelationId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl serde::Serialize for CorrelationId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Source of correlation identifiers.
///
/// Implementations are shared by every exchange and must never hand out the same
/// identifier to two exchanges alive at the same time.
pub trait IdGenerator: Send + Sync + 'static {
    fn generate(&self) -> CorrelationId;
}

/// Default generator: process start time in the high 32 bits, a process-wide
/// counter in the low 32 bits.
///
/// Past 2^32 exchanges the counter carries into the start-time bits instead of
/// wrapping, so ids stay unique within the process. They may then collide with
/// those of a process started later, which only matters to sinks that merge the
/// logs of several processes by id alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialIdGenerator;

impl IdGenerator for SequentialIdGenerator {
    fn generate(&self) -> CorrelationId {
        let start_time = *PROCESS_START_TIME.get_or_init(|| {
            SystemTime::now()
                .duration_since(SystemTime::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs()
        });

        let counter = CORRELATION_COUNTER.fetch_add(1, Ordering::Relaxed);

        compose_id(start_time, counter)
    }
}

fn compose_id(start_time: u64, counter: u64) -> CorrelationId {
    CorrelationId((start_time << 32).wrapping_add(counter))
}

/// The request half of an exchange.
#[derive(Debug, Clone)]
pub struct Precorrelation {
    id: CorrelationId,
    request: HttpRequest,
    observed_at: SystemTime,
    started: Instant,
}

impl Precorrelation {
    pub fn new(id: CorrelationId, request: HttpRequest) -> Self {
        Self {
            id,
            request,
            observed_at: SystemTime::now(),
            started: Instant::now(),
        }
    }

    pub fn id(&self) -> CorrelationId {
        self.id
    }

    /// The request as it was recorded, after filtering when it was logged.
    pub fn request(&self) -> &HttpRequest {
        &self.request
    }

    /// When the request was fully captured.
    pub fn observed_at(&self) -> SystemTime {
        self.observed_at
    }

    /// Close the exchange with its response.
    pub fn correlate(self, response: HttpResponse) -> Correlation {
        let duration = self.started.elapsed();
        Correlation {
            precorrelation: self,
            response,
            observed_at: SystemTime::now(),
            duration,
        }
    }
}

/// A completed exchange: request, response and the time between them.
#[derive(Debug, Clone)]
pub struct Correlation {
    precorrelation: Precorrelation,
    response: HttpResponse,
    observed_at: SystemTime,
    duration: Duration,
}

impl Correlation {
    /// Always the id of the embedded precorrelation.
    pub fn id(&self) -> CorrelationId {
        self.precorrelation.id
    }

    pub fn precorrelation(&self) -> &Precorrelation {
        &self.precorrelation
    }

    pub fn request(&self) -> &HttpRequest {
        &self.precorrelation.request
    }

    pub fn response(&self) -> &HttpResponse {
        &self.response
    }

    /// When the response was fully captured.
    pub fn observed_at(&self) -> SystemTime {
        self.observed_at
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }
}
