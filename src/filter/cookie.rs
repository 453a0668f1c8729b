//! Cookie value redaction for `Cookie` and `Set-Cookie` headers.

use std::borrow::Cow;

use super::HeaderFilter;

const SEPARATOR: &str = "; ";

/// Replace the value of every cookie whose name matches `predicate`.
///
/// Only `Cookie` and `Set-Cookie` are touched. A `Cookie` value is a list of
/// `name=value` pairs separated by `"; "`; every pair is a candidate. A
/// `Set-Cookie` value is one cookie followed by its attributes; only the leading
/// `name=value` is a candidate and the attributes are copied verbatim. Pairs
/// without `=`, the empty string included, are left alone.
///
/// ```rust
/// use sightline::filter::cookie::replace_cookies;
/// use sightline::types::Headers;
///
/// let filter = replace_cookies(|name| name == "sessionToken", "XXX");
/// let headers = Headers::new()
///     .with("Set-Cookie", "sessionToken=abc123; Path=/; HttpOnly");
///
/// assert_eq!(
///     filter.filter(headers).first("set-cookie"),
///     Some("sessionToken=XXX; Path=/; HttpOnly")
/// );
/// ```
pub fn replace_cookies<P>(predicate: P, replacement: impl Into<String>) -> HeaderFilter
where
    P: Fn(&str) -> bool + Send + Sync + 'static,
{
    let replacement = replacement.into();
    HeaderFilter::new(move |headers| {
        if !headers.contains("cookie") && !headers.contains("set-cookie") {
            return headers;
        }

        headers.map_values(|name, values| {
            if name.eq_ignore_ascii_case("cookie") {
                values
                    .iter()
                    .map(|value| replace_in_cookie(value, &predicate, &replacement))
                    .collect()
            } else if name.eq_ignore_ascii_case("set-cookie") {
                values
                    .iter()
                    .map(|value| replace_in_set_cookie(value, &predicate, &replacement))
                    .collect()
            } else {
                values
            }
        })
    })
}

fn replace_in_cookie<P>(value: &str, predicate: &P, replacement: &str) -> String
where
    P: Fn(&str) -> bool,
{
    value
        .split(SEPARATOR)
        .map(|pair| replace_pair(pair, predicate, replacement))
        .collect::<Vec<_>>()
        .join(SEPARATOR)
}

fn replace_in_set_cookie<P>(value: &str, predicate: &P, replacement: &str) -> String
where
    P: Fn(&str) -> bool,
{
    match value.split_once(SEPARATOR) {
        Some((cookie, attributes)) => format!(
            "{}{SEPARATOR}{attributes}",
            replace_pair(cookie, predicate, replacement)
        ),
        None => replace_pair(value, predicate, replacement).into_owned(),
    }
}

fn replace_pair<'a, P>(pair: &'a str, predicate: &P, replacement: &str) -> Cow<'a, str>
where
    P: Fn(&str) -> bool,
{
    match pair.split_once('=') {
        Some((name, _)) if predicate(name) => Cow::Owned(format!("{name}={replacement}")),
        _ => Cow::Borrowed(pair),
    }
}
