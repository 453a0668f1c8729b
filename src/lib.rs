//! # Sightline
//!
//! HTTP request and response logging for axum and tower: messages are captured,
//! correlated, filtered, formatted and written, without ever getting in the way
//! of the traffic itself.
//!
//! ## Features
//!
//! - **Stream-aware**: bodies are teed while they stream to their real consumer, never buffered in front of it
//! - **Redaction**: ordered header, query and body filters, with cookie, authorization and JSON helpers
//! - **Correlation**: every response record carries the id of its request record
//! - **Pluggable**: strategies decide what gets logged, sinks decide where records go
//! - **Safe**: failures and panics in the logging pipeline are contained and reported
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use axum::{routing::get, Router};
//! use sightline::{Logbook, LogbookLayer};
//! use sightline::filter::cookie::replace_cookies;
//! use sightline::filter::header;
//! use sightline::strategy::DefaultStrategy;
//! use tower::ServiceBuilder;
//!
//! async fn hello() -> &'static str {
//!     "Hello, World!"
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     tracing_subscriber::fmt::init();
//!
//!     let logbook = Logbook::builder()
//!         .header_filter(header::authorization())
//!         .header_filter(replace_cookies(|name| name == "session", "XXX"))
//!         .strategy(DefaultStrategy::ignoring_bodies_on("X-Ignore-Body"))
//!         .build();
//!
//!     let app = Router::new()
//!         .route("/hello", get(hello))
//!         .layer(ServiceBuilder::new().layer(LogbookLayer::new(logbook)));
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
//!     axum::serve(listener, app).await.unwrap();
//! }
//! ```
//!
//! ## Using the core directly
//!
//! Transports other than tower drive a [`Logbook`] through its two stages; see
//! [`logbook`] for the details.
//!
//! ```rust
//! use sightline::Logbook;
//! use sightline::types::{HttpRequest, HttpResponse, MessageBody};
//!
//! let logbook = Logbook::default();
//!
//! let stage = logbook.request(HttpRequest::new("POST", "http://localhost/echo"));
//! let body = if stage.capture_body() { MessageBody::from("ping") } else { MessageBody::Omitted };
//! let precorrelation = stage.write(body);
//!
//! let stage = logbook.response(precorrelation.request(), HttpResponse::new(200));
//! let correlation = stage.write(precorrelation, MessageBody::from("pong")).unwrap();
//! assert_eq!(correlation.precorrelation().id(), correlation.id());
//! ```

use axum::{body::Body, extract::Request, response::Response};
use http_body::Body as _;
use std::{
    mem,
    pin::Pin,
    task::{Context, Poll},
};
use tokio::task::JoinHandle;
use tower::{Layer, Service};
use tracing::{debug, error, instrument};

pub mod types;
use types::{HttpRequest, HttpResponse, MessageBody, Origin};

pub mod body_wrapper;
use body_wrapper::{declares_body, tee_body, CapturedBody};

pub mod correlation;
pub use correlation::{Correlation, CorrelationId, Precorrelation};

pub mod error;
pub use error::LogbookError;

pub mod filter;
pub mod formatter;

pub mod logbook;
pub use logbook::{Logbook, LogbookBuilder, RequestStage, ResponseStage};

pub mod logging_handler;
pub use logging_handler::{ChannelWriter, LogRecord, TracingWriter};

pub mod sink;
pub mod strategy;

/// Which side of the exchange the wrapped service is on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Role {
    /// The layer wraps a server: requests come in, responses go out.
    #[default]
    Server,
    /// The layer wraps an HTTP client: requests go out, responses come in.
    Client,
}

impl Role {
    /// Origins of the request and of the response.
    fn origins(self) -> (Origin, Origin) {
        match self {
            Self::Server => (Origin::Remote, Origin::Local),
            Self::Client => (Origin::Local, Origin::Remote),
        }
    }
}

/// Configuration for the logging middleware.
///
/// Body capture is additionally subject to the strategy of the [`Logbook`]: a
/// body is only teed when both allow it.
///
/// # Examples
///
/// ```rust
/// use sightline::{LogbookLayerConfig, Role};
///
/// // Default configuration
/// let config = LogbookLayerConfig::default();
///
/// // Wrapping an HTTP client, without response bodies
/// let config = LogbookLayerConfig {
///     role: Role::Client,
///     capture_request_body: true,
///     capture_response_body: false,
/// };
/// ```
#[derive(Clone, Debug)]
pub struct LogbookLayerConfig {
    pub role: Role,
    /// Whether to capture request bodies
    pub capture_request_body: bool,
    /// Whether to capture response bodies
    pub capture_response_body: bool,
}

impl Default for LogbookLayerConfig {
    fn default() -> Self {
        Self {
            role: Role::Server,
            capture_request_body: true,
            capture_response_body: true,
        }
    }
}

/// Tower layer for the logging middleware.
///
/// Request and response heads go through the [`Logbook`] synchronously. Bodies
/// the strategy wants are teed; their records are written from spawned tasks
/// once the bodies have been streamed, and the response record of an exchange
/// is always written after its request record.
///
/// # Examples
///
/// ```rust,no_run
/// use sightline::{Logbook, LogbookLayer};
/// use axum::{routing::get, Router};
/// use tower::ServiceBuilder;
///
/// # async fn hello() -> &'static str { "Hello" }
/// # #[tokio::main]
/// # async fn main() {
/// let layer = LogbookLayer::new(Logbook::default());
///
/// let app = Router::new()
///     .route("/hello", get(hello))
///     .layer(ServiceBuilder::new().layer(layer));
///
/// let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
/// axum::serve(listener, app).await.unwrap();
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct LogbookLayer {
    logbook: Logbook,
    config: LogbookLayerConfig,
}

impl LogbookLayer {
    /// Log a server with the default configuration.
    pub fn new(logbook: Logbook) -> Self {
        Self::with_config(logbook, LogbookLayerConfig::default())
    }

    pub fn with_config(logbook: Logbook, config: LogbookLayerConfig) -> Self {
        Self { logbook, config }
    }
}

impl<S> Layer<S> for LogbookLayer {
    type Service = LogbookService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        LogbookService {
            inner,
            logbook: self.logbook.clone(),
            config: self.config.clone(),
        }
    }
}

/// Tower service implementation for the logging middleware.
///
/// Users typically don't interact with this type directly - it's created by [`LogbookLayer`].
#[derive(Clone, Debug)]
pub struct LogbookService<S> {
    inner: S,
    logbook: Logbook,
    config: LogbookLayerConfig,
}

/// The request record of an exchange, written already or pending body capture.
enum PendingRequest {
    Written(Precorrelation),
    Capturing(JoinHandle<Precorrelation>),
}

impl PendingRequest {
    async fn resolve(self) -> Option<Precorrelation> {
        match self {
            Self::Written(precorrelation) => Some(precorrelation),
            Self::Capturing(handle) => match handle.await {
                Ok(precorrelation) => Some(precorrelation),
                Err(e) => {
                    error!(error = %e, "Error retrieving request data");
                    None
                }
            },
        }
    }
}

async fn captured_or_omitted(capture_future: CapturedBody) -> MessageBody {
    match capture_future.await {
        Ok(body) => body,
        Err(e) => {
            error!(error = %e, "Error capturing body");
            MessageBody::Omitted
        }
    }
}

fn uncaptured(declared: bool) -> MessageBody {
    if declared {
        MessageBody::Omitted
    } else {
        MessageBody::Absent
    }
}

impl<S> Service<Request> for LogbookService<S>
where
    S: Service<Request, Response = Response> + Send + 'static,
    S::Future: Send + 'static,
    S::Error: std::error::Error + Send + Sync + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future =
        Pin<Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    #[instrument(skip_all)]
    fn call(&mut self, mut request: Request) -> Self::Future {
        let (request_origin, response_origin) = self.config.role.origins();
        let request_head = HttpRequest::from_http(request_origin, &request);

        debug!(method = %request_head.method, uri = %request_head.url(), "Extracted request metadata");

        let stage = self.logbook.request(request_head);
        // The response phase sees the request as the request-phase strategy returned it
        let decided_request = stage.request().clone();
        let request_declared = declares_body(request.headers(), &request.body().size_hint());

        let pending_request = if request_declared && stage.capture_body() && self.config.capture_request_body {
            debug!("Wrapping request body for capture");
            let body = mem::replace(request.body_mut(), Body::empty());
            let (body_stream, capture_future) = tee_body(body, stage.body_limit());
            *request.body_mut() = body_stream;

            PendingRequest::Capturing(tokio::spawn(async move {
                stage.write(captured_or_omitted(capture_future).await)
            }))
        } else {
            PendingRequest::Written(stage.write(uncaptured(request_declared)))
        };

        let future = self.inner.call(request);
        let logbook = self.logbook.clone();
        let config = self.config.clone();

        Box::pin(async move {
            debug!("Awaiting inner service response");
            let mut response = future.await?;
            debug!("Inner service response received");

            let stage = logbook.response(
                &decided_request,
                HttpResponse::from_http(response_origin, &response),
            );
            let response_declared =
                declares_body(response.headers(), &response.body().size_hint());

            let capture_future =
                if response_declared && stage.capture_body() && config.capture_response_body {
                    debug!("Wrapping response body for capture");
                    let body = mem::replace(response.body_mut(), Body::empty());
                    let (body_stream, capture_future) = tee_body(body, stage.body_limit());
                    *response.body_mut() = body_stream;
                    Some(capture_future)
                } else {
                    None
                };

            // The future that outlives the request/response lifecycle
            tokio::spawn(async move {
                // The request record always goes first
                let Some(precorrelation) = pending_request.resolve().await else {
                    return;
                };
                let correlation_id = precorrelation.id();

                let body = match capture_future {
                    Some(capture_future) => captured_or_omitted(capture_future).await,
                    None => uncaptured(response_declared),
                };

                if let Err(e) = stage.write(precorrelation, body) {
                    error!(correlation_id = %correlation_id, error = %e, "Failed to write response record");
                }
            });

            Ok(response)
        })
    }
}
