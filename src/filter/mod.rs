//! Redaction filters for headers, query strings and bodies.
//!
//! A filter is a pure function value. Filters of the same flavor compose left to
//! right with [`HeaderFilter::compose`] (and friends); composing nothing yields
//! the identity filter. Because filters never mutate their input and hold no
//! mutable state, one chain can be shared by every exchange in flight.
//!
//! # Example
//!
//! ```rust
//! use sightline::filter::{cookie::replace_cookies, header::authorization, HeaderFilter};
//! use sightline::types::Headers;
//!
//! let filter = HeaderFilter::compose([
//!     authorization(),
//!     replace_cookies(|name| name == "sessionToken", "XXX"),
//! ]);
//!
//! let headers = Headers::new()
//!     .with("Authorization", "Bearer s3cr3t")
//!     .with("Cookie", "theme=light; sessionToken=abc123");
//!
//! let filtered = filter.filter(headers);
//! assert_eq!(filtered.first("authorization"), Some("XXX"));
//! assert_eq!(filtered.first("cookie"), Some("theme=light; sessionToken=XXX"));
//! ```

use bytes::Bytes;
use std::fmt;
use std::sync::Arc;

use crate::types::Headers;

pub mod body;
pub mod cookie;
pub mod header;
pub mod query;

/// Replacement used by the built-in redaction filters.
pub const DEFAULT_REPLACEMENT: &str = "XXX";

type HeaderFn = dyn Fn(Headers) -> Headers + Send + Sync;
type QueryFn = dyn Fn(&str) -> String + Send + Sync;
type BodyFn = dyn Fn(Option<&str>, Bytes) -> Bytes + Send + Sync;

/// Filter over a full set of headers.
#[derive(Clone)]
pub struct HeaderFilter {
    f: Arc<HeaderFn>,
}

impl HeaderFilter {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Headers) -> Headers + Send + Sync + 'static,
    {
        Self { f: Arc::new(f) }
    }

    pub fn identity() -> Self {
        Self::new(|headers| headers)
    }

    /// Run `self`, then `next` on its output.
    pub fn and_then(self, next: HeaderFilter) -> Self {
        Self::new(move |headers| next.filter(self.filter(headers)))
    }

    /// Chain `filters` in iteration order.
    pub fn compose<I>(filters: I) -> Self
    where
        I: IntoIterator<Item = HeaderFilter>,
    {
        let filters: Vec<_> = filters.into_iter().collect();
        match filters.len() {
            0 => Self::identity(),
            1 => filters.into_iter().next().unwrap_or_default(),
            _ => Self::new(move |headers| {
                filters
                    .iter()
                    .fold(headers, |headers, filter| filter.filter(headers))
            }),
        }
    }

    pub fn filter(&self, headers: Headers) -> Headers {
        (self.f)(headers)
    }
}

impl Default for HeaderFilter {
    fn default() -> Self {
        Self::identity()
    }
}

impl fmt::Debug for HeaderFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("HeaderFilter")
    }
}

/// Filter over a raw query string (without the leading `?`).
#[derive(Clone)]
pub struct QueryFilter {
    f: Arc<QueryFn>,
}

impl QueryFilter {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        Self { f: Arc::new(f) }
    }

    pub fn identity() -> Self {
        Self::new(|query| query.to_owned())
    }

    pub fn and_then(self, next: QueryFilter) -> Self {
        Self::new(move |query| next.filter(&self.filter(query)))
    }

    pub fn compose<I>(filters: I) -> Self
    where
        I: IntoIterator<Item = QueryFilter>,
    {
        let filters: Vec<_> = filters.into_iter().collect();
        match filters.len() {
            0 => Self::identity(),
            1 => filters.into_iter().next().unwrap_or_default(),
            _ => Self::new(move |query| {
                filters
                    .iter()
                    .fold(query.to_owned(), |query, filter| filter.filter(&query))
            }),
        }
    }

    pub fn filter(&self, query: &str) -> String {
        (self.f)(query)
    }
}

impl Default for QueryFilter {
    fn default() -> Self {
        Self::identity()
    }
}

impl fmt::Debug for QueryFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("QueryFilter")
    }
}

/// Filter over body bytes, given the message's content type.
#[derive(Clone)]
pub struct BodyFilter {
    f: Arc<BodyFn>,
}

impl BodyFilter {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Option<&str>, Bytes) -> Bytes + Send + Sync + 'static,
    {
        Self { f: Arc::new(f) }
    }

    pub fn identity() -> Self {
        Self::new(|_, body| body)
    }

    pub fn and_then(self, next: BodyFilter) -> Self {
        Self::new(move |content_type, body| {
            next.filter(content_type, self.filter(content_type, body))
        })
    }

    pub fn compose<I>(filters: I) -> Self
    where
        I: IntoIterator<Item = BodyFilter>,
    {
        let filters: Vec<_> = filters.into_iter().collect();
        match filters.len() {
            0 => Self::identity(),
            1 => filters.into_iter().next().unwrap_or_default(),
            _ => Self::new(move |content_type, body| {
                filters
                    .iter()
                    .fold(body, |body, filter| filter.filter(content_type, body))
            }),
        }
    }

    pub fn filter(&self, content_type: Option<&str>, body: Bytes) -> Bytes {
        (self.f)(content_type, body)
    }
}

impl Default for BodyFilter {
    fn default() -> Self {
        Self::identity()
    }
}

impl fmt::Debug for BodyFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BodyFilter")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_headers() -> Headers {
        Headers::new()
            .with("Accept", "text/plain")
            .with("Cookie", "a=1; b=2")
            .with("accept", "application/json")
    }

    fn tag(value: &'static str) -> HeaderFilter {
        HeaderFilter::new(move |headers| headers.with("X-Order", value))
    }

    #[test]
    fn composed_identities_are_identity() {
        let composed = HeaderFilter::compose([HeaderFilter::identity(), HeaderFilter::identity()]);
        assert_eq!(composed.filter(sample_headers()), sample_headers());
        assert_eq!(
            composed.filter(Headers::new()),
            HeaderFilter::identity().filter(Headers::new())
        );
    }

    #[test]
    fn empty_composition_is_identity() {
        assert_eq!(
            HeaderFilter::compose(Vec::new()).filter(sample_headers()),
            sample_headers()
        );
        assert_eq!(QueryFilter::compose(Vec::new()).filter("a=b&c"), "a=b&c");
        assert_eq!(
            BodyFilter::compose(Vec::new()).filter(None, Bytes::from_static(b"body")),
            Bytes::from_static(b"body")
        );
    }

    #[test]
    fn composition_applies_left_to_right() {
        let filtered = HeaderFilter::compose([tag("first"), tag("second"), tag("third")])
            .filter(Headers::new());
        assert_eq!(
            filtered.get("x-order").unwrap(),
            &["first".to_string(), "second".to_string(), "third".to_string()]
        );

        let chained = tag("one").and_then(tag("two")).filter(Headers::new());
        assert_eq!(
            chained.get("x-order").unwrap(),
            &["one".to_string(), "two".to_string()]
        );
    }

    #[test]
    fn query_composition_feeds_previous_output() {
        let upper = QueryFilter::new(|query| query.to_uppercase());
        let suffix = QueryFilter::new(|query| format!("{query}&z=1"));

        assert_eq!(
            QueryFilter::compose([upper.clone(), suffix.clone()]).filter("a=b"),
            "A=B&z=1"
        );
        assert_eq!(QueryFilter::compose([suffix, upper]).filter("a=b"), "A=B&Z=1");
    }

    #[test]
    fn body_composition_sees_content_type() {
        let seen = BodyFilter::new(|content_type, body| {
            let mut out = body.to_vec();
            out.extend_from_slice(content_type.unwrap_or("none").as_bytes());
            Bytes::from(out)
        });

        let filtered = BodyFilter::compose([seen.clone(), seen])
            .filter(Some("text/plain"), Bytes::from_static(b">"));
        assert_eq!(filtered, Bytes::from_static(b">text/plaintext/plain"));
    }
}
