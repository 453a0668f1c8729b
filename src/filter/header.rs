//! Built-in header filters.

use super::{HeaderFilter, DEFAULT_REPLACEMENT};

/// Replace every value of the headers whose name matches `predicate`. The
/// header names themselves stay in place.
pub fn replace_headers<P>(predicate: P, replacement: impl Into<String>) -> HeaderFilter
where
    P: Fn(&str) -> bool + Send + Sync + 'static,
{
    let replacement = replacement.into();
    HeaderFilter::new(move |headers| {
        headers.map_values(|name, values| {
            if predicate(name) {
                vec![replacement.clone(); values.len()]
            } else {
                values
            }
        })
    })
}

/// Drop the headers whose name matches `predicate` entirely.
pub fn remove_headers<P>(predicate: P) -> HeaderFilter
where
    P: Fn(&str) -> bool + Send + Sync + 'static,
{
    HeaderFilter::new(move |headers| headers.retain(|name| !predicate(name)))
}

/// Redact `Authorization` and `Proxy-Authorization` values.
pub fn authorization() -> HeaderFilter {
    replace_headers(
        |name| {
            name.eq_ignore_ascii_case("authorization")
                || name.eq_ignore_ascii_case("proxy-authorization")
        },
        DEFAULT_REPLACEMENT,
    )
}

/// Filter used when none is configured.
pub fn defaults() -> HeaderFilter {
    authorization()
}
