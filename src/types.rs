//! Data types for captured HTTP request and response information.
//!
//! This module contains the message model shared by every stage of the pipeline:
//! ordered [`Headers`], the [`MessageBody`] capture state and the request/response
//! snapshots. Snapshots are plain values; filters and strategies hand back new
//! values instead of mutating the ones they were given.

use axum::http::{self, uri::Authority, HeaderMap, StatusCode, Uri, Version};
use bytes::Bytes;
use serde::ser::{Serialize, SerializeMap, Serializer};

/// HTTP headers as an ordered list of names, each with its ordered values.
///
/// Lookups are ASCII case-insensitive. Appending a value under a name that is
/// already present (in any case) extends that entry, so duplicates keep their
/// relative order and the first-seen spelling of the name is retained.
///
/// # Examples
///
/// ```rust
/// use sightline::types::Headers;
///
/// let headers = Headers::new()
///     .with("Accept", "text/plain")
///     .with("accept", "application/json");
///
/// assert_eq!(headers.len(), 1);
/// assert_eq!(
///     headers.get("ACCEPT").unwrap(),
///     &["text/plain".to_string(), "application/json".to_string()]
/// );
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, Vec<String>)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a copy of these headers with `value` appended under `name`.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.append(name.into(), value.into());
        self
    }

    fn append(&mut self, name: String, value: String) {
        match self.position(&name) {
            Some(index) => self.entries[index].1.push(value),
            None => self.entries.push((name, vec![value])),
        }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(existing, _)| existing.eq_ignore_ascii_case(name))
    }

    /// All values stored under `name`, in insertion order.
    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.position(name)
            .map(|index| self.entries[index].1.as_slice())
    }

    /// The first value stored under `name`.
    pub fn first(&self, name: &str) -> Option<&str> {
        self.get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.first("content-type")
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(name, values)| (name.as_str(), values.as_slice()))
    }

    /// Number of distinct header names.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rewrite the values of every entry. Names and their order are kept.
    pub fn map_values<F>(self, mut f: F) -> Self
    where
        F: FnMut(&str, Vec<String>) -> Vec<String>,
    {
        Self {
            entries: self
                .entries
                .into_iter()
                .map(|(name, values)| {
                    let values = f(&name, values);
                    (name, values)
                })
                .collect(),
        }
    }

    /// Keep only the entries whose name satisfies `keep`.
    pub fn retain<F>(mut self, mut keep: F) -> Self
    where
        F: FnMut(&str) -> bool,
    {
        self.entries.retain(|(name, _)| keep(name));
        self
    }
}

impl From<&HeaderMap> for Headers {
    fn from(map: &HeaderMap) -> Self {
        let mut headers = Headers::new();
        for (name, value) in map {
            headers.append(
                name.as_str().to_owned(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            );
        }
        headers
    }
}

impl<K, V> FromIterator<(K, V)> for Headers
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (name, value) in iter {
            headers.append(name.into(), value.into());
        }
        headers
    }
}

impl Serialize for Headers {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, values) in &self.entries {
            map.serialize_entry(name, values)?;
        }
        map.end()
    }
}

/// What is known about the body of a message.
///
/// `Absent` and an empty `Complete` body are different things: the first means
/// the transport declared no body at all, the second a body of length zero.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum MessageBody {
    /// The transport declared no body.
    #[default]
    Absent,
    /// A body exists but was deliberately not captured.
    Omitted,
    /// The whole body.
    Complete(Bytes),
    /// A prefix of the body; capture stopped at the size cap or the reader went away.
    Truncated(Bytes),
}

impl MessageBody {
    /// The captured bytes, if any were captured.
    pub fn bytes(&self) -> Option<&Bytes> {
        match self {
            Self::Complete(bytes) | Self::Truncated(bytes) => Some(bytes),
            Self::Absent | Self::Omitted => None,
        }
    }

    pub fn is_truncated(&self) -> bool {
        matches!(self, Self::Truncated(_))
    }

    pub(crate) fn map_bytes(self, f: impl FnOnce(Bytes) -> Bytes) -> Self {
        match self {
            Self::Complete(bytes) => Self::Complete(f(bytes)),
            Self::Truncated(bytes) => Self::Truncated(f(bytes)),
            other => other,
        }
    }

    /// Cut captured bytes beyond `limit`, marking the body as truncated.
    pub(crate) fn capped(self, limit: usize) -> Self {
        match self {
            Self::Complete(bytes) | Self::Truncated(bytes) if bytes.len() > limit => {
                Self::Truncated(bytes.slice(..limit))
            }
            other => other,
        }
    }

    /// Drop the captured bytes while remembering whether there was a body.
    pub(crate) fn omit(self) -> Self {
        match self {
            Self::Absent => Self::Absent,
            _ => Self::Omitted,
        }
    }
}

impl From<Bytes> for MessageBody {
    fn from(bytes: Bytes) -> Self {
        Self::Complete(bytes)
    }
}

impl From<&'static str> for MessageBody {
    fn from(text: &'static str) -> Self {
        Self::Complete(Bytes::from_static(text.as_bytes()))
    }
}

impl From<String> for MessageBody {
    fn from(text: String) -> Self {
        Self::Complete(Bytes::from(text))
    }
}

impl From<Vec<u8>> for MessageBody {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Complete(Bytes::from(bytes))
    }
}

/// Which side of the connection produced a message.
///
/// A server sees `Remote` requests and sends `Local` responses; a client the
/// other way round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Local,
    Remote,
}

/// Snapshot of an HTTP request.
///
/// Method and protocol version are kept as the strings the transport reported,
/// so construction never fails on unusual input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub origin: Origin,
    pub protocol_version: String,
    pub method: String,
    pub scheme: String,
    pub host: String,
    pub port: Option<u16>,
    pub path: String,
    /// Raw query string without the leading `?`; empty when there is none.
    pub query: String,
    pub headers: Headers,
    pub body: MessageBody,
}

impl HttpRequest {
    /// Build a remote-origin `HTTP/1.1` request from a method and request target.
    ///
    /// The target may be absolute (`http://host:8080/a?b=c`) or origin-form
    /// (`/a?b=c`). A target that does not parse as a URI is kept verbatim as the
    /// path.
    ///
    /// ```rust
    /// use sightline::types::HttpRequest;
    ///
    /// let request = HttpRequest::new("GET", "http://localhost:8080/echo?a=b");
    /// assert_eq!(request.host, "localhost");
    /// assert_eq!(request.port, Some(8080));
    /// assert_eq!(request.query, "a=b");
    /// assert_eq!(request.url(), "http://localhost:8080/echo?a=b");
    /// ```
    pub fn new(method: impl Into<String>, target: &str) -> Self {
        let mut request = Self {
            origin: Origin::Remote,
            protocol_version: format!("{:?}", Version::HTTP_11),
            method: method.into(),
            scheme: "http".to_owned(),
            host: String::new(),
            port: None,
            path: String::new(),
            query: String::new(),
            headers: Headers::new(),
            body: MessageBody::Absent,
        };

        match target.parse::<Uri>() {
            Ok(uri) => request.apply_uri(&uri),
            Err(_) => {
                let (path, query) = target.split_once('?').unwrap_or((target, ""));
                request.path = path.to_owned();
                request.query = query.to_owned();
            }
        }
        request
    }

    /// Snapshot the head of an `http` request. The body is left `Absent`; the
    /// caller attaches the captured body later.
    pub fn from_http<B>(origin: Origin, request: &http::Request<B>) -> Self {
        let mut snapshot = Self::new(request.method().as_str(), "")
            .with_origin(origin)
            .with_protocol_version(format!("{:?}", request.version()))
            .with_headers(Headers::from(request.headers()));
        snapshot.apply_uri(request.uri());

        if snapshot.host.is_empty() {
            if let Some(authority) = request
                .headers()
                .get(http::header::HOST)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.parse::<Authority>().ok())
            {
                snapshot.host = authority.host().to_owned();
                snapshot.port = authority.port_u16();
            }
        }
        snapshot
    }

    fn apply_uri(&mut self, uri: &Uri) {
        if let Some(scheme) = uri.scheme_str() {
            self.scheme = scheme.to_owned();
        }
        if let Some(host) = uri.host() {
            self.host = host.to_owned();
        }
        if uri.port_u16().is_some() {
            self.port = uri.port_u16();
        }
        self.path = uri.path().to_owned();
        self.query = uri.query().unwrap_or_default().to_owned();
    }

    pub fn with_origin(mut self, origin: Origin) -> Self {
        self.origin = origin;
        self
    }

    pub fn with_protocol_version(mut self, version: impl Into<String>) -> Self {
        self.protocol_version = version.into();
        self
    }

    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }

    pub fn with_body(mut self, body: impl Into<MessageBody>) -> Self {
        self.body = body.into();
        self
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.content_type()
    }

    /// The full request URL. Default ports for `http` and `https` are omitted.
    pub fn url(&self) -> String {
        let mut url = String::with_capacity(self.host.len() + self.path.len() + 16);
        if !self.host.is_empty() {
            url.push_str(&self.scheme);
            url.push_str("://");
            url.push_str(&self.host);
            match (self.scheme.as_str(), self.port) {
                ("http", Some(80)) | ("https", Some(443)) | (_, None) => {}
                (_, Some(port)) => {
                    url.push(':');
                    url.push_str(&port.to_string());
                }
            }
        }
        url.push_str(&self.path);
        if !self.query.is_empty() {
            url.push('?');
            url.push_str(&self.query);
        }
        url
    }

    /// A copy carrying no headers, query or body.
    pub(crate) fn stripped(&self) -> Self {
        Self {
            origin: self.origin,
            protocol_version: self.protocol_version.clone(),
            method: self.method.clone(),
            scheme: self.scheme.clone(),
            host: self.host.clone(),
            port: self.port,
            path: self.path.clone(),
            query: String::new(),
            headers: Headers::new(),
            body: self.body.clone().omit(),
        }
    }
}

/// Snapshot of an HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub origin: Origin,
    pub protocol_version: String,
    pub status: u16,
    /// Reason phrase as reported by the transport, if any.
    pub reason: Option<String>,
    pub headers: Headers,
    pub body: MessageBody,
}

impl HttpResponse {
    /// Build a local-origin `HTTP/1.1` response with the given status.
    pub fn new(status: u16) -> Self {
        Self {
            origin: Origin::Local,
            protocol_version: format!("{:?}", Version::HTTP_11),
            status,
            reason: None,
            headers: Headers::new(),
            body: MessageBody::Absent,
        }
    }

    /// Snapshot the head of an `http` response. The body is left `Absent`.
    pub fn from_http<B>(origin: Origin, response: &http::Response<B>) -> Self {
        Self::new(response.status().as_u16())
            .with_origin(origin)
            .with_protocol_version(format!("{:?}", response.version()))
            .with_headers(Headers::from(response.headers()))
    }

    pub fn with_origin(mut self, origin: Origin) -> Self {
        self.origin = origin;
        self
    }

    pub fn with_protocol_version(mut self, version: impl Into<String>) -> Self {
        self.protocol_version = version.into();
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_body(mut self, body: impl Into<MessageBody>) -> Self {
        self.body = body.into();
        self
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.content_type()
    }

    /// A copy carrying no headers or body.
    pub(crate) fn stripped(&self) -> Self {
        Self {
            origin: self.origin,
            protocol_version: self.protocol_version.clone(),
            status: self.status,
            reason: self.reason.clone(),
            headers: Headers::new(),
            body: self.body.clone().omit(),
        }
    }

    /// The reason phrase, falling back to the canonical one for the status code.
    pub fn reason(&self) -> &str {
        match &self.reason {
            Some(reason) => reason.as_str(),
            None => StatusCode::from_u16(self.status)
                .ok()
                .and_then(|status| status.canonical_reason())
                .unwrap_or_default(),
        }
    }
}

/// Either half of an exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpMessage {
    Request(HttpRequest),
    Response(HttpResponse),
}

impl HttpMessage {
    pub fn origin(&self) -> Origin {
        match self {
            Self::Request(request) => request.origin,
            Self::Response(response) => response.origin,
        }
    }

    pub fn protocol_version(&self) -> &str {
        match self {
            Self::Request(request) => &request.protocol_version,
            Self::Response(response) => &response.protocol_version,
        }
    }

    pub fn headers(&self) -> &Headers {
        match self {
            Self::Request(request) => &request.headers,
            Self::Response(response) => &response.headers,
        }
    }

    pub fn body(&self) -> &MessageBody {
        match self {
            Self::Request(request) => &request.body,
            Self::Response(response) => &response.body,
        }
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers().content_type()
    }
}

impl From<HttpRequest> for HttpMessage {
    fn from(request: HttpRequest) -> Self {
        Self::Request(request)
    }
}

impl From<HttpResponse> for HttpMessage {
    fn from(response: HttpResponse) -> Self {
        Self::Response(response)
    }
}
