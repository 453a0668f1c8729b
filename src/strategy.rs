//! Policies deciding whether, and how much of, an exchange gets logged.
//!
//! A [`Strategy`] is consulted once per phase, before any body byte is read, so
//! its body decision also decides whether the body is captured at all. What it
//! returns is final for that phase.

use crate::types::{HttpRequest, HttpResponse};

/// Outcome of a strategy for one phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision<M> {
    /// Whether a record is written for this phase.
    pub log: bool,
    /// Whether the body is captured and rendered.
    pub include_body: bool,
    /// The message to continue with, possibly a filtered replacement.
    pub message: M,
}

impl<M> Decision<M> {
    /// Log the message including its body.
    pub fn log(message: M) -> Self {
        Self {
            log: true,
            include_body: true,
            message,
        }
    }

    /// Do not log this phase.
    pub fn skip(message: M) -> Self {
        Self {
            log: false,
            include_body: false,
            message,
        }
    }

    pub fn without_body(mut self) -> Self {
        self.include_body = false;
        self
    }
}

/// Trait for deciding what gets logged.
///
/// The request passed to [`decide_request`](Strategy::decide_request) and, as
/// context, to [`decide_response`](Strategy::decide_response) is the request
/// head of the exchange; its body is not captured yet.
///
/// # Examples
///
/// ```rust
/// use sightline::strategy::{Decision, Strategy};
/// use sightline::types::{HttpRequest, HttpResponse};
///
/// /// Only log exchanges on the API, never health checks.
/// struct ApiOnly;
///
/// impl Strategy for ApiOnly {
///     fn decide_request(&self, request: HttpRequest) -> Decision<HttpRequest> {
///         if request.path.starts_with("/api/") {
///             Decision::log(request)
///         } else {
///             Decision::skip(request)
///         }
///     }
///
///     fn decide_response(&self, request: &HttpRequest, response: HttpResponse) -> Decision<HttpResponse> {
///         if request.path.starts_with("/api/") {
///             Decision::log(response)
///         } else {
///             Decision::skip(response)
///         }
///     }
/// }
/// ```
pub trait Strategy: Send + Sync + 'static {
    fn decide_request(&self, request: HttpRequest) -> Decision<HttpRequest> {
        Decision::log(request)
    }

    fn decide_response(
        &self,
        request: &HttpRequest,
        response: HttpResponse,
    ) -> Decision<HttpResponse> {
        let _ = request;
        Decision::log(response)
    }
}

/// Log everything with bodies, unless the request carries the configured
/// ignore-body header; then both bodies of the exchange are left out.
///
/// ```rust
/// use sightline::strategy::{DefaultStrategy, Strategy};
/// use sightline::types::{Headers, HttpRequest};
///
/// let strategy = DefaultStrategy::ignoring_bodies_on("Ignore");
/// let request = HttpRequest::new("POST", "/echo")
///     .with_headers(Headers::new().with("Ignore", "true"));
///
/// let decision = strategy.decide_request(request);
/// assert!(decision.log);
/// assert!(!decision.include_body);
/// ```
#[derive(Debug, Clone, Default)]
pub struct DefaultStrategy {
    ignore_body_header: Option<String>,
}

impl DefaultStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Leave bodies out whenever the request has a header named `header`.
    pub fn ignoring_bodies_on(header: impl Into<String>) -> Self {
        Self {
            ignore_body_header: Some(header.into()),
        }
    }

    fn ignores_body(&self, request: &HttpRequest) -> bool {
        self.ignore_body_header
            .as_deref()
            .is_some_and(|name| request.headers.contains(name))
    }
}

impl Strategy for DefaultStrategy {
    fn decide_request(&self, request: HttpRequest) -> Decision<HttpRequest> {
        if self.ignores_body(&request) {
            Decision::log(request).without_body()
        } else {
            Decision::log(request)
        }
    }

    fn decide_response(
        &self,
        request: &HttpRequest,
        response: HttpResponse,
    ) -> Decision<HttpResponse> {
        if self.ignores_body(request) {
            Decision::log(response).without_body()
        } else {
            Decision::log(response)
        }
    }
}

/// Only log responses whose status is at least `min_status`; requests are never
/// logged.
#[derive(Debug, Clone, Copy)]
pub struct StatusAtLeastStrategy {
    min_status: u16,
}

impl StatusAtLeastStrategy {
    pub fn new(min_status: u16) -> Self {
        Self { min_status }
    }
}

impl Strategy for StatusAtLeastStrategy {
    fn decide_request(&self, request: HttpRequest) -> Decision<HttpRequest> {
        Decision::skip(request)
    }

    fn decide_response(
        &self,
        _request: &HttpRequest,
        response: HttpResponse,
    ) -> Decision<HttpResponse> {
        if response.status >= self.min_status {
            Decision::log(response)
        } else {
            Decision::skip(response)
        }
    }
}

/// Log every exchange, but only keep response bodies for statuses of at least
/// `min_status`. Request bodies are always left out.
#[derive(Debug, Clone, Copy)]
pub struct BodyOnlyIfStatusAtLeastStrategy {
    min_status: u16,
}

impl BodyOnlyIfStatusAtLeastStrategy {
    pub fn new(min_status: u16) -> Self {
        Self { min_status }
    }
}

impl Strategy for BodyOnlyIfStatusAtLeastStrategy {
    fn decide_request(&self, request: HttpRequest) -> Decision<HttpRequest> {
        Decision::log(request).without_body()
    }

    fn decide_response(
        &self,
        _request: &HttpRequest,
        response: HttpResponse,
    ) -> Decision<HttpResponse> {
        if response.status >= self.min_status {
            Decision::log(response)
        } else {
            Decision::log(response).without_body()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Headers;

    fn request_with(header: &str) -> HttpRequest {
        HttpRequest::new("POST", "/echo").with_headers(Headers::new().with(header, "true"))
    }

    #[test]
    fn default_strategy_logs_everything() {
        let strategy = DefaultStrategy::new();

        let request = strategy.decide_request(request_with("Ignore"));
        assert!(request.log && request.include_body);

        let response = strategy.decide_response(&request.message, HttpResponse::new(200));
        assert!(response.log && response.include_body);
    }

    #[test]
    fn ignore_header_drops_both_bodies() {
        let strategy = DefaultStrategy::ignoring_bodies_on("ignore");
        let request = request_with("Ignore");

        let decision = strategy.decide_request(request.clone());
        assert!(decision.log);
        assert!(!decision.include_body);
        assert_eq!(decision.message, request);

        let decision = strategy.decide_response(&request, HttpResponse::new(200));
        assert!(decision.log);
        assert!(!decision.include_body);
    }

    #[test]
    fn ignore_header_requires_presence() {
        let strategy = DefaultStrategy::ignoring_bodies_on("Ignore");
        let decision = strategy.decide_request(request_with("X-Other"));
        assert!(decision.include_body);
    }

    #[test]
    fn status_at_least_only_logs_errors() {
        let strategy = StatusAtLeastStrategy::new(400);
        let request = HttpRequest::new("GET", "/");

        assert!(!strategy.decide_request(request.clone()).log);
        assert!(!strategy.decide_response(&request, HttpResponse::new(200)).log);
        assert!(strategy.decide_response(&request, HttpResponse::new(503)).log);
    }

    #[test]
    fn body_only_if_status_at_least() {
        let strategy = BodyOnlyIfStatusAtLeastStrategy::new(500);
        let request = HttpRequest::new("GET", "/");

        let decision = strategy.decide_request(request.clone());
        assert!(decision.log && !decision.include_body);

        let ok = strategy.decide_response(&request, HttpResponse::new(200));
        assert!(ok.log && !ok.include_body);

        let failed = strategy.decide_response(&request, HttpResponse::new(500));
        assert!(failed.log && failed.include_body);
    }
}
