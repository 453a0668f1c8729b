//! The core of the pipeline.
//!
//! A [`Logbook`] is invoked synchronously at each transport event. For the
//! request phase an adapter calls [`Logbook::request`] with the request head,
//! asks the returned [`RequestStage`] whether the body should be captured, and
//! hands the captured body to [`RequestStage::write`]. The response phase works
//! the same way through [`Logbook::response`] and [`ResponseStage::write`], which
//! closes the exchange.
//!
//! Per phase the order is fixed:
//! 1. the sink is asked whether it is active; if not, nothing else happens
//! 2. the strategy decides once, before any body byte is read
//! 3. headers, query and body are filtered
//! 4. the sink formats and writes the record
//!
//! Failures anywhere in steps 2-4, panics included, are reported on the
//! `sightline::diagnostics` target and never reach the traffic. The only
//! exception is a response-phase write failure in strict mode.

use std::any::Any;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{error, warn};

use crate::correlation::{Correlation, CorrelationId, IdGenerator, Precorrelation, SequentialIdGenerator};
use crate::error::{LogbookError, Phase};
use crate::filter::{self, BodyFilter, HeaderFilter, QueryFilter};
use crate::formatter::DefaultHttpLogFormatter;
use crate::logging_handler::TracingWriter;
use crate::sink::{DefaultSink, Sink};
use crate::strategy::{Decision, DefaultStrategy, Strategy};
use crate::types::{HttpRequest, HttpResponse, MessageBody};

/// Bodies are captured up to this many bytes unless configured otherwise.
pub const DEFAULT_BODY_LIMIT: usize = 1024 * 1024;

/// Entry point of the logging pipeline. Cheap to clone.
///
/// # Examples
///
/// ```rust
/// use sightline::{ChannelWriter, Logbook};
/// use sightline::filter::cookie::replace_cookies;
/// use sightline::formatter::DefaultHttpLogFormatter;
/// use sightline::sink::DefaultSink;
/// use sightline::types::{Headers, HttpRequest, HttpResponse};
///
/// let (writer, mut records) = ChannelWriter::new();
/// let logbook = Logbook::builder()
///     .header_filter(replace_cookies(|name| name == "sessionToken", "XXX"))
///     .sink(DefaultSink::new(DefaultHttpLogFormatter, writer))
///     .build();
///
/// let request = HttpRequest::new("GET", "http://localhost/")
///     .with_headers(Headers::new().with("Cookie", "theme=light; sessionToken=abc123"));
///
/// let precorrelation = logbook.on_request(request);
/// let correlation = logbook.on_response(precorrelation, HttpResponse::new(200)).unwrap();
///
/// let request_record = records.try_recv().unwrap();
/// assert!(request_record.text.contains("Cookie: theme=light; sessionToken=XXX"));
/// assert_eq!(records.try_recv().unwrap().correlation_id, correlation.id());
/// ```
#[derive(Clone)]
pub struct Logbook {
    inner: Arc<Inner>,
}

struct Inner {
    header_filter: HeaderFilter,
    query_filter: QueryFilter,
    body_filter: BodyFilter,
    strategy: Arc<dyn Strategy>,
    sink: Arc<dyn Sink>,
    id_generator: Arc<dyn IdGenerator>,
    body_limit: usize,
    strict: bool,
}

impl Logbook {
    pub fn builder() -> LogbookBuilder {
        LogbookBuilder::default()
    }

    /// Maximum number of body bytes captured per message.
    pub fn body_limit(&self) -> usize {
        self.inner.body_limit
    }

    /// Whether records would be written at all right now.
    pub fn is_active(&self) -> bool {
        self.inner.sink.is_active()
    }

    /// Open the request phase for `request`, a head whose body is not captured yet.
    pub fn request(&self, request: HttpRequest) -> RequestStage {
        let active = self.inner.sink.is_active();
        let decision = if active {
            self.inner.decide(Phase::Request, request, |strategy, request| {
                strategy.decide_request(request)
            })
        } else {
            Decision::skip(request)
        };

        RequestStage {
            logbook: self.clone(),
            active,
            decision,
        }
    }

    /// Open the response phase for `response`. `request` is the request head of
    /// the same exchange, as given to [`request`](Self::request).
    pub fn response(&self, request: &HttpRequest, response: HttpResponse) -> ResponseStage {
        let decision = if self.inner.sink.is_active() {
            self.inner.decide(Phase::Response, response, |strategy, response| {
                strategy.decide_response(request, response)
            })
        } else {
            Decision::skip(response)
        };

        ResponseStage {
            logbook: self.clone(),
            decision,
        }
    }

    /// Log a request whose body, if any, is already captured.
    pub fn on_request(&self, mut request: HttpRequest) -> Precorrelation {
        let body = mem::take(&mut request.body);
        self.request(request).write(body)
    }

    /// Log a response whose body, if any, is already captured, closing the
    /// exchange opened by `precorrelation`.
    pub fn on_response(
        &self,
        precorrelation: Precorrelation,
        mut response: HttpResponse,
    ) -> Result<Correlation, LogbookError> {
        let body = mem::take(&mut response.body);
        let stage = self.response(precorrelation.request(), response);
        stage.write(precorrelation, body)
    }
}

impl Default for Logbook {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl std::fmt::Debug for Logbook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logbook")
            .field("header_filter", &self.inner.header_filter)
            .field("query_filter", &self.inner.query_filter)
            .field("body_filter", &self.inner.body_filter)
            .field("body_limit", &self.inner.body_limit)
            .field("strict", &self.inner.strict)
            .finish_non_exhaustive()
    }
}

impl Inner {
    /// Consult the strategy. A panicking strategy vetoes the phase.
    fn decide<M, F>(&self, phase: Phase, message: M, decide: F) -> Decision<M>
    where
        M: Clone,
        F: FnOnce(&dyn Strategy, M) -> Decision<M>,
    {
        let fallback = message.clone();
        match guard(phase, || Ok(decide(self.strategy.as_ref(), message))) {
            Ok(decision) => decision,
            Err(e) => {
                error!(target: "sightline::diagnostics", phase = %phase, error = %e, "Strategy failed, not logging this phase");
                Decision::skip(fallback)
            }
        }
    }

    fn filter_request(&self, request: HttpRequest) -> HttpRequest {
        let content_type = request.content_type().map(str::to_owned);
        let query = self.query_filter.filter(&request.query);
        let headers = self.header_filter.filter(request.headers);
        let body = request
            .body
            .map_bytes(|bytes| self.body_filter.filter(content_type.as_deref(), bytes));
        HttpRequest {
            headers,
            query,
            body,
            ..request
        }
    }

    fn filter_response(&self, response: HttpResponse) -> HttpResponse {
        let content_type = response.content_type().map(str::to_owned);
        let headers = self.header_filter.filter(response.headers);
        let body = response
            .body
            .map_bytes(|bytes| self.body_filter.filter(content_type.as_deref(), bytes));
        HttpResponse {
            headers,
            body,
            ..response
        }
    }

    /// Filter `request` for storage in its precorrelation. Nothing unfiltered is
    /// kept: when filtering fails the request is stripped instead.
    fn redact_request(&self, id: CorrelationId, request: HttpRequest) -> HttpRequest {
        let stripped = request.stripped();
        match guard(Phase::Request, || Ok(self.filter_request(request))) {
            Ok(request) => request,
            Err(e) => {
                self.report(id, &e);
                stripped
            }
        }
    }

    fn report(&self, id: CorrelationId, error: &LogbookError) {
        warn!(
            target: "sightline::diagnostics",
            correlation_id = %id,
            phase = %error.phase(),
            error = %error,
            "Logging failed, exchange continues unlogged"
        );
    }
}

/// Run `f`, turning a panic into [`LogbookError::Panicked`].
fn guard<T, F>(phase: Phase, f: F) -> Result<T, LogbookError>
where
    F: FnOnce() -> Result<T, LogbookError>,
{
    panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| {
        Err(LogbookError::Panicked {
            phase,
            message: panic_message(payload.as_ref()),
        })
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_owned()
    }
}

/// The request phase of one exchange, between the strategy's decision and
/// the captured body.
#[derive(Debug)]
pub struct RequestStage {
    logbook: Logbook,
    active: bool,
    decision: Decision<HttpRequest>,
}

impl RequestStage {
    /// Whether the body should be captured for this request.
    pub fn capture_body(&self) -> bool {
        self.decision.log && self.decision.include_body
    }

    pub fn body_limit(&self) -> usize {
        self.logbook.body_limit()
    }

    /// The request head as returned by the strategy.
    pub fn request(&self) -> &HttpRequest {
        &self.decision.message
    }

    /// Filter and write the request record, opening the exchange.
    ///
    /// `body` is ignored, and recorded as omitted, unless
    /// [`capture_body`](Self::capture_body) was true. Bodies longer than the
    /// body limit are truncated. The returned precorrelation carries the
    /// filtered request, even when the strategy skipped this phase; if
    /// filtering fails it carries the request without headers, query or body.
    pub fn write(self, body: MessageBody) -> Precorrelation {
        let inner = &self.logbook.inner;
        let id = inner.id_generator.generate();
        let Decision {
            log,
            include_body,
            message: request,
        } = self.decision;

        if !log {
            let request = request.with_body(body.omit());
            let request = if self.active {
                inner.redact_request(id, request)
            } else {
                request.stripped()
            };
            return Precorrelation::new(id, request);
        }

        let body = if include_body {
            body.capped(inner.body_limit)
        } else {
            body.omit()
        };
        let request = request.with_body(body);

        let stripped = request.stripped();
        let precorrelation = match guard(Phase::Request, || {
            Ok(Precorrelation::new(id, inner.filter_request(request)))
        }) {
            Ok(precorrelation) => precorrelation,
            Err(e) => {
                inner.report(id, &e);
                return Precorrelation::new(id, stripped);
            }
        };

        if let Err(e) = guard(Phase::Request, || inner.sink.write_request(&precorrelation)) {
            inner.report(id, &e);
        }
        precorrelation
    }
}

/// The response phase of one exchange.
#[derive(Debug)]
pub struct ResponseStage {
    logbook: Logbook,
    decision: Decision<HttpResponse>,
}

impl ResponseStage {
    /// Whether the body should be captured for this response.
    pub fn capture_body(&self) -> bool {
        self.decision.log && self.decision.include_body
    }

    pub fn body_limit(&self) -> usize {
        self.logbook.body_limit()
    }

    pub fn response(&self) -> &HttpResponse {
        &self.decision.message
    }

    /// Filter and write the response record, closing the exchange.
    ///
    /// Bodies longer than the body limit are truncated. Only fails in strict
    /// mode, when the writer could not write the record.
    pub fn write(
        self,
        precorrelation: Precorrelation,
        body: MessageBody,
    ) -> Result<Correlation, LogbookError> {
        let inner = &self.logbook.inner;
        let id = precorrelation.id();
        let Decision {
            log,
            include_body,
            message: response,
        } = self.decision;

        if !log {
            return Ok(precorrelation.correlate(response.with_body(body.omit())));
        }

        let body = if include_body {
            body.capped(inner.body_limit)
        } else {
            body.omit()
        };
        let response = response.with_body(body);
        let stripped = response.stripped();

        let response = match guard(Phase::Response, || Ok(inner.filter_response(response))) {
            Ok(response) => response,
            Err(e) => {
                inner.report(id, &e);
                return Ok(precorrelation.correlate(stripped));
            }
        };

        let correlation = precorrelation.correlate(response);
        match guard(Phase::Response, || inner.sink.write_response(&correlation)) {
            Ok(()) => Ok(correlation),
            Err(e @ LogbookError::Write { .. }) if inner.strict => Err(e),
            Err(e) => {
                inner.report(id, &e);
                Ok(correlation)
            }
        }
    }
}

/// Builder for [`Logbook`].
///
/// Filters of each kind run in the order they were added. When none of a kind
/// is added, the defaults apply: authorization headers and `access_token`
/// query parameters are masked, binary bodies replaced. Add
/// [`HeaderFilter::identity`] (and friends) to log messages unfiltered.
#[derive(Default)]
pub struct LogbookBuilder {
    header_filters: Vec<HeaderFilter>,
    query_filters: Vec<QueryFilter>,
    body_filters: Vec<BodyFilter>,
    strategy: Option<Arc<dyn Strategy>>,
    sink: Option<Arc<dyn Sink>>,
    id_generator: Option<Arc<dyn IdGenerator>>,
    body_limit: Option<usize>,
    strict: bool,
}

impl LogbookBuilder {
    pub fn header_filter(mut self, filter: HeaderFilter) -> Self {
        self.header_filters.push(filter);
        self
    }

    pub fn query_filter(mut self, filter: QueryFilter) -> Self {
        self.query_filters.push(filter);
        self
    }

    pub fn body_filter(mut self, filter: BodyFilter) -> Self {
        self.body_filters.push(filter);
        self
    }

    pub fn strategy<S: Strategy>(mut self, strategy: S) -> Self {
        self.strategy = Some(Arc::new(strategy));
        self
    }

    pub fn sink<S: Sink>(mut self, sink: S) -> Self {
        self.sink = Some(Arc::new(sink));
        self
    }

    pub fn id_generator<G: IdGenerator>(mut self, generator: G) -> Self {
        self.id_generator = Some(Arc::new(generator));
        self
    }

    /// Cap on captured body bytes; larger bodies are logged truncated.
    pub fn body_limit(mut self, limit: usize) -> Self {
        self.body_limit = Some(limit);
        self
    }

    /// Return response-phase write failures to the caller instead of only
    /// reporting them.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn build(self) -> Logbook {
        let header_filter = if self.header_filters.is_empty() {
            filter::header::defaults()
        } else {
            HeaderFilter::compose(self.header_filters)
        };
        let query_filter = if self.query_filters.is_empty() {
            filter::query::defaults()
        } else {
            QueryFilter::compose(self.query_filters)
        };
        let body_filter = if self.body_filters.is_empty() {
            filter::body::defaults()
        } else {
            BodyFilter::compose(self.body_filters)
        };

        Logbook {
            inner: Arc::new(Inner {
                header_filter,
                query_filter,
                body_filter,
                strategy: self
                    .strategy
                    .unwrap_or_else(|| Arc::new(DefaultStrategy::new())),
                sink: self.sink.unwrap_or_else(|| {
                    Arc::new(DefaultSink::new(DefaultHttpLogFormatter, TracingWriter))
                }),
                id_generator: self
                    .id_generator
                    .unwrap_or_else(|| Arc::new(SequentialIdGenerator)),
                body_limit: self.body_limit.unwrap_or(DEFAULT_BODY_LIMIT),
                strict: self.strict,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WriteError;
    use crate::filter::cookie::replace_cookies;
    use crate::logging_handler::{ChannelWriter, LogRecord};
    use crate::sink::HttpLogWriter;
    use crate::types::{Headers, HttpMessage, Origin};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::mpsc::UnboundedReceiver;

    /// Test writer that counts calls
    #[derive(Default)]
    struct RecordingWriter {
        inactive: AtomicBool,
        fail: bool,
        calls: AtomicUsize,
        records: Mutex<Vec<String>>,
    }

    impl RecordingWriter {
        fn record(&self, record: &str) -> Result<(), WriteError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(WriteError::Other("disk full".into()));
            }
            self.records.lock().unwrap().push(record.to_owned());
            Ok(())
        }
    }

    impl HttpLogWriter for RecordingWriter {
        fn is_active(&self) -> bool {
            !self.inactive.load(Ordering::SeqCst)
        }

        fn write_request(&self, _: &Precorrelation, record: &str) -> Result<(), WriteError> {
            self.record(record)
        }

        fn write_response(&self, _: &Correlation, record: &str) -> Result<(), WriteError> {
            self.record(record)
        }
    }

    /// Strategy that counts how often it is consulted.
    #[derive(Default)]
    struct CountingStrategy {
        calls: Arc<AtomicUsize>,
    }

    impl Strategy for CountingStrategy {
        fn decide_request(&self, request: HttpRequest) -> Decision<HttpRequest> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Decision::log(request)
        }

        fn decide_response(&self, _: &HttpRequest, response: HttpResponse) -> Decision<HttpResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Decision::log(response)
        }
    }

    fn channel_logbook(builder: LogbookBuilder) -> (Logbook, UnboundedReceiver<LogRecord>) {
        let (writer, rx) = ChannelWriter::new();
        let logbook = builder
            .sink(DefaultSink::new(DefaultHttpLogFormatter, writer))
            .build();
        (logbook, rx)
    }

    #[test]
    fn inactive_writer_gets_no_calls_in_either_phase() {
        let writer = Arc::new(RecordingWriter::default());
        writer.inactive.store(true, Ordering::SeqCst);
        let strategy = CountingStrategy::default();
        let strategy_calls = strategy.calls.clone();
        let filter_calls = Arc::new(AtomicUsize::new(0));
        let counted = filter_calls.clone();

        let logbook = Logbook::builder()
            .header_filter(HeaderFilter::new(move |headers| {
                counted.fetch_add(1, Ordering::SeqCst);
                headers
            }))
            .strategy(strategy)
            .sink(DefaultSink::new(DefaultHttpLogFormatter, writer.clone()))
            .build();

        let precorrelation = logbook.on_request(HttpRequest::new("GET", "/"));
        logbook
            .on_response(precorrelation, HttpResponse::new(200))
            .unwrap();

        assert_eq!(writer.calls.load(Ordering::SeqCst), 0);
        assert_eq!(strategy_calls.load(Ordering::SeqCst), 0);
        assert_eq!(filter_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn strategy_is_consulted_once_per_phase() {
        let strategy = CountingStrategy::default();
        let calls = strategy.calls.clone();
        let (logbook, _rx) = channel_logbook(Logbook::builder().strategy(strategy));

        let stage = logbook.request(HttpRequest::new("POST", "/"));
        assert!(stage.capture_body());
        let precorrelation = stage.write(MessageBody::from("body"));
        let response = HttpResponse::new(200);
        let stage = logbook.response(precorrelation.request(), response);
        stage.write(precorrelation, MessageBody::Absent).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn request_without_body_renders_without_body_section() {
        let (logbook, mut rx) = channel_logbook(Logbook::builder());

        logbook.on_request(
            HttpRequest::new("GET", "http://localhost/discard").with_origin(Origin::Local),
        );

        let record = rx.try_recv().unwrap();
        let lines: Vec<_> = record.text.lines().collect();
        assert!(lines[0].starts_with("Outgoing Request:"));
        assert_eq!(lines[1], "GET http://localhost/discard HTTP/1.1");
        assert!(!record.text.contains("\n\n"));
    }

    #[test]
    fn cookie_values_are_redacted_before_writing() {
        let (logbook, mut rx) = channel_logbook(
            Logbook::builder().header_filter(replace_cookies(|name| name == "sessionToken", "XXX")),
        );

        let precorrelation = logbook.on_request(HttpRequest::new("GET", "/").with_headers(
            Headers::new().with("Cookie", "theme=light; sessionToken=abc123"),
        ));

        assert_eq!(
            precorrelation.request().headers.first("Cookie"),
            Some("theme=light; sessionToken=XXX")
        );
        let record = rx.try_recv().unwrap();
        assert!(record.text.contains("Cookie: theme=light; sessionToken=XXX"));
        assert!(!record.text.contains("abc123"));
    }

    #[test]
    fn ignore_header_leaves_out_response_body() {
        let (logbook, mut rx) = channel_logbook(
            Logbook::builder().strategy(DefaultStrategy::ignoring_bodies_on("Ignore")),
        );

        let request = HttpRequest::new("GET", "/").with_headers(Headers::new().with("Ignore", "true"));
        let precorrelation = logbook.on_request(request);
        let stage = logbook.response(
            precorrelation.request(),
            HttpResponse::new(200).with_headers(Headers::new().with("Content-Type", "text/plain")),
        );
        assert!(!stage.capture_body());
        let correlation = stage
            .write(precorrelation, MessageBody::from("Hello, world!"))
            .unwrap();

        assert_eq!(correlation.response().body, MessageBody::Omitted);
        let _request = rx.try_recv().unwrap();
        let response = rx.try_recv().unwrap();
        assert!(response.text.contains("Content-Type: text/plain"));
        assert!(!response.text.contains("Hello, world!"));
    }

    #[test]
    fn interleaved_exchanges_keep_their_ids() {
        let (logbook, _rx) = channel_logbook(Logbook::builder());

        let first = logbook.on_request(HttpRequest::new("GET", "/first"));
        let second = logbook.on_request(HttpRequest::new("GET", "/second"));
        let (first_id, second_id) = (first.id(), second.id());
        assert_ne!(first_id, second_id);

        let second = logbook.on_response(second, HttpResponse::new(201)).unwrap();
        let first = logbook.on_response(first, HttpResponse::new(200)).unwrap();

        assert_eq!(first.id(), first_id);
        assert_eq!(first.precorrelation().id(), first.id());
        assert_eq!(first.request().path, "/first");
        assert_eq!(second.id(), second_id);
        assert_eq!(second.request().path, "/second");
    }

    #[test]
    fn default_filters_mask_credentials() {
        let (logbook, mut rx) = channel_logbook(Logbook::builder());

        logbook.on_request(
            HttpRequest::new("GET", "http://localhost/?access_token=secret&page=2")
                .with_headers(Headers::new().with("Authorization", "Bearer secret")),
        );

        let record = rx.try_recv().unwrap();
        assert!(!record.text.contains("secret"));
        match record.message {
            HttpMessage::Request(request) => {
                assert_eq!(request.query, "access_token=XXX&page=2");
                assert_eq!(request.headers.first("authorization"), Some("XXX"));
            }
            HttpMessage::Response(_) => panic!("expected a request record"),
        }
    }

    #[test]
    fn panicking_filter_is_contained() {
        let (logbook, mut rx) = channel_logbook(
            Logbook::builder().header_filter(HeaderFilter::new(|_| panic!("broken filter"))),
        );

        let request = HttpRequest::new("GET", "/?page=1")
            .with_headers(Headers::new().with("X-Secret", "value"))
            .with_body("payload");
        let precorrelation = logbook.on_request(request);

        assert!(rx.try_recv().is_err());
        assert!(precorrelation.request().headers.is_empty());
        assert!(precorrelation.request().query.is_empty());
        assert_eq!(precorrelation.request().body, MessageBody::Omitted);

        let correlation = logbook
            .on_response(precorrelation, HttpResponse::new(200))
            .unwrap();
        assert_eq!(correlation.response().status, 200);
    }

    #[test]
    fn panicking_strategy_skips_the_phase() {
        struct Panicking;
        impl Strategy for Panicking {
            fn decide_request(&self, _: HttpRequest) -> Decision<HttpRequest> {
                panic!("broken strategy")
            }
        }

        let (logbook, mut rx) = channel_logbook(Logbook::builder().strategy(Panicking));
        let stage = logbook.request(HttpRequest::new("GET", "/"));
        assert!(!stage.capture_body());
        let precorrelation = stage.write(MessageBody::Absent);

        let _ = logbook.on_response(precorrelation, HttpResponse::new(200)).unwrap();
        let record = rx.try_recv().unwrap();
        assert_eq!(record.phase, Phase::Response);
    }

    #[test]
    fn writer_failures_are_swallowed_by_default() {
        let writer = Arc::new(RecordingWriter {
            fail: true,
            ..Default::default()
        });
        let logbook = Logbook::builder()
            .sink(DefaultSink::new(DefaultHttpLogFormatter, writer.clone()))
            .build();

        let precorrelation = logbook.on_request(HttpRequest::new("GET", "/"));
        assert!(logbook.on_response(precorrelation, HttpResponse::new(200)).is_ok());
        assert_eq!(writer.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn strict_mode_propagates_response_write_failures() {
        let writer = Arc::new(RecordingWriter {
            fail: true,
            ..Default::default()
        });
        let logbook = Logbook::builder()
            .sink(DefaultSink::new(DefaultHttpLogFormatter, writer))
            .strict(true)
            .build();

        // request-phase failures are never propagated
        let precorrelation = logbook.on_request(HttpRequest::new("GET", "/"));
        let error = logbook
            .on_response(precorrelation, HttpResponse::new(200))
            .unwrap_err();

        assert!(matches!(
            error,
            LogbookError::Write {
                phase: Phase::Response,
                ..
            }
        ));
    }

    #[test]
    fn body_filters_see_the_content_type() {
        let (logbook, mut rx) = channel_logbook(Logbook::builder().body_filter(
            filter::body::replace_json_string_properties(["password"], "XXX"),
        ));

        logbook.on_request(
            HttpRequest::new("POST", "/login")
                .with_headers(Headers::new().with("Content-Type", "application/json"))
                .with_body(r#"{"user":"alice","password":"hunter2"}"#),
        );

        let record = rx.try_recv().unwrap();
        assert!(record.text.ends_with(r#"{"user":"alice","password":"XXX"}"#));
    }

    #[test]
    fn strategy_veto_omits_body_even_when_given() {
        let (logbook, mut rx) = channel_logbook(
            Logbook::builder().strategy(crate::strategy::BodyOnlyIfStatusAtLeastStrategy::new(500)),
        );

        let precorrelation = logbook.on_request(HttpRequest::new("POST", "/").with_body("request"));
        assert_eq!(precorrelation.request().body, MessageBody::Omitted);

        let correlation = logbook
            .on_response(precorrelation, HttpResponse::new(503).with_body("failure"))
            .unwrap();
        assert_eq!(correlation.response().body, MessageBody::from("failure"));

        let request = rx.try_recv().unwrap();
        assert!(!request.text.contains("\n\nrequest"));
        let response = rx.try_recv().unwrap();
        assert!(response.text.ends_with("\n\nfailure"));
    }

    #[test]
    fn skipped_request_is_stored_filtered() {
        /// Keeps the authorization header of the request each response record belongs to.
        #[derive(Default)]
        struct RequestHeaderWriter {
            seen: Mutex<Vec<Option<String>>>,
        }

        impl HttpLogWriter for RequestHeaderWriter {
            fn write_request(&self, _: &Precorrelation, _: &str) -> Result<(), WriteError> {
                Ok(())
            }

            fn write_response(&self, correlation: &Correlation, _: &str) -> Result<(), WriteError> {
                let authorization = correlation.request().headers.first("Authorization");
                self.seen.lock().unwrap().push(authorization.map(str::to_owned));
                Ok(())
            }
        }

        let writer = Arc::new(RequestHeaderWriter::default());
        let logbook = Logbook::builder()
            .strategy(crate::strategy::StatusAtLeastStrategy::new(400))
            .sink(DefaultSink::new(DefaultHttpLogFormatter, writer.clone()))
            .build();

        let precorrelation = logbook.on_request(
            HttpRequest::new("GET", "http://localhost/?access_token=secret")
                .with_headers(Headers::new().with("Authorization", "Bearer secret")),
        );
        assert_eq!(precorrelation.request().query, "access_token=XXX");

        let correlation = logbook
            .on_response(precorrelation, HttpResponse::new(500))
            .unwrap();

        assert_eq!(correlation.request().headers.first("Authorization"), Some("XXX"));
        assert_eq!(*writer.seen.lock().unwrap(), vec![Some("XXX".to_owned())]);
    }

    #[test]
    fn bodies_handed_in_directly_are_capped() {
        let (logbook, mut rx) = channel_logbook(Logbook::builder().body_limit(4));

        let precorrelation = logbook.on_request(HttpRequest::new("POST", "/").with_body("abcdefgh"));
        assert_eq!(
            precorrelation.request().body,
            MessageBody::Truncated(bytes::Bytes::from_static(b"abcd"))
        );

        let correlation = logbook
            .on_response(precorrelation, HttpResponse::new(200).with_body("abcd"))
            .unwrap();
        assert_eq!(correlation.response().body, MessageBody::from("abcd"));

        let request = rx.try_recv().unwrap();
        assert!(request.text.ends_with("\n\nabcd..."));
    }

    #[test]
    fn secrets_in_truncated_json_are_redacted() {
        let (logbook, mut rx) = channel_logbook(
            Logbook::builder()
                .body_filter(filter::body::replace_json_string_properties(["password"], "XXX"))
                .body_limit(47),
        );

        logbook.on_request(
            HttpRequest::new("POST", "/login")
                .with_headers(Headers::new().with("Content-Type", "application/json"))
                .with_body(r#"{"user":"alice","password":"hunter2","pad":"xxxxxxxx"}"#),
        );

        let record = rx.try_recv().unwrap();
        assert!(!record.text.contains("hunter2"));
        assert!(record.text.ends_with(r#"{"user":"alice","password":"XXX","pad":"xxx..."#));
    }

    #[test]
    fn builder_defaults() {
        let logbook = Logbook::default();
        assert_eq!(logbook.body_limit(), DEFAULT_BODY_LIMIT);

        let logbook = Logbook::builder().body_limit(16).build();
        assert_eq!(logbook.request(HttpRequest::new("GET", "/")).body_limit(), 16);
    }
}
