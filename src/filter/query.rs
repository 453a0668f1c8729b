//! Built-in query string filters.

use std::borrow::Cow;

use super::{QueryFilter, DEFAULT_REPLACEMENT};

/// Replace the value of every `&`-separated parameter whose name matches
/// `predicate`. Parameters without a value are kept as they are.
///
/// ```rust
/// use sightline::filter::query::replace_query;
///
/// let filter = replace_query(|name| name == "password", "XXX");
/// assert_eq!(filter.filter("user=me&password=hunter2"), "user=me&password=XXX");
/// ```
pub fn replace_query<P>(predicate: P, replacement: impl Into<String>) -> QueryFilter
where
    P: Fn(&str) -> bool + Send + Sync + 'static,
{
    let replacement = replacement.into();
    QueryFilter::new(move |query| {
        query
            .split('&')
            .map(|parameter| match parameter.split_once('=') {
                Some((name, _)) if predicate(name) => {
                    Cow::Owned(format!("{name}={replacement}"))
                }
                _ => Cow::Borrowed(parameter),
            })
            .collect::<Vec<_>>()
            .join("&")
    })
}

/// Redact OAuth `access_token` parameters.
pub fn access_token() -> QueryFilter {
    replace_query(|name| name == "access_token", DEFAULT_REPLACEMENT)
}

/// Filter used when none is configured.
pub fn defaults() -> QueryFilter {
    access_token()
}
