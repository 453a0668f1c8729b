//! Built-in body filters.
//!
//! Body filters receive the content type of the message they belong to, so most
//! of them only act on the media types they understand and pass everything else
//! through untouched.

use bytes::Bytes;
use serde_json::Value;
use std::collections::HashSet;

use super::BodyFilter;

/// Placeholder for bodies that cannot be rendered as text.
pub const BINARY_PLACEHOLDER: &str = "<binary>";

/// Apply `filter` only when the message has a content type matching `predicate`.
pub fn for_content_type<P>(predicate: P, filter: BodyFilter) -> BodyFilter
where
    P: Fn(&str) -> bool + Send + Sync + 'static,
{
    BodyFilter::new(move |content_type, body| match content_type {
        Some(media_type) if predicate(media_type) => filter.filter(content_type, body),
        _ => body,
    })
}

/// Replace string values of JSON object properties named in `names`, at any depth.
///
/// Only JSON content types are considered. Bodies containing none of the
/// properties are returned byte for byte. Bodies that do not parse, such as a
/// prefix cut at the capture limit, are redacted by scanning their tokens, so a
/// value is replaced even when its document is incomplete.
pub fn replace_json_string_properties<I, S>(names: I, replacement: impl Into<String>) -> BodyFilter
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let names: HashSet<String> = names.into_iter().map(Into::into).collect();
    let replacement = replacement.into();

    for_content_type(
        is_json,
        BodyFilter::new(move |_, body| {
            let Ok(mut document) = serde_json::from_slice::<Value>(&body) else {
                return replace_string_tokens(&body, &names, &replacement)
                    .map(Bytes::from)
                    .unwrap_or(body);
            };
            if !replace_strings(&mut document, &names, &replacement) {
                return body;
            }
            match serde_json::to_vec(&document) {
                Ok(filtered) => Bytes::from(filtered),
                Err(_) => replace_string_tokens(&body, &names, &replacement)
                    .map(Bytes::from)
                    .unwrap_or(body),
            }
        }),
    )
}

fn replace_strings(value: &mut Value, names: &HashSet<String>, replacement: &str) -> bool {
    match value {
        Value::Object(map) => {
            let mut replaced = false;
            for (key, value) in map.iter_mut() {
                if names.contains(key) && value.is_string() {
                    *value = Value::String(replacement.to_owned());
                    replaced = true;
                } else {
                    replaced |= replace_strings(value, names, replacement);
                }
            }
            replaced
        }
        Value::Array(items) => items.iter_mut().fold(false, |replaced, item| {
            replace_strings(item, names, replacement) | replaced
        }),
        _ => false,
    }
}

/// Token level redaction for bodies that are not a complete JSON document.
///
/// Every string literal followed by `:` is a property name; when it is one of
/// `names` and its value starts as a string, the value is replaced up to its
/// closing quote, or up to the end of the input when the value was cut.
/// Returns `None` when nothing was replaced.
fn replace_string_tokens(body: &[u8], names: &HashSet<String>, replacement: &str) -> Option<Vec<u8>> {
    let quoted = serde_json::to_vec(replacement).ok()?;
    let mut out = Vec::with_capacity(body.len());
    let mut replaced = false;
    let mut i = 0;

    while i < body.len() {
        if body[i] != b'"' {
            out.push(body[i]);
            i += 1;
            continue;
        }

        let end = string_end(body, i);
        let literal = &body[i..end];
        out.extend_from_slice(literal);
        i = end;

        let colon = skip_whitespace(body, i);
        if colon >= body.len() || body[colon] != b':' {
            continue;
        }
        let is_redacted = serde_json::from_slice::<String>(literal)
            .map(|name| names.contains(&name))
            .unwrap_or(false);
        let value = skip_whitespace(body, colon + 1);
        if is_redacted && value < body.len() && body[value] == b'"' {
            out.extend_from_slice(&body[i..value]);
            out.extend_from_slice(&quoted);
            i = string_end(body, value);
            replaced = true;
        }
    }

    replaced.then_some(out)
}

/// Index just past the string literal opening at `start`, or the input length
/// when it is never closed.
fn string_end(body: &[u8], start: usize) -> usize {
    let mut i = start + 1;
    while i < body.len() {
        match body[i] {
            b'\\' => i += 2,
            b'"' => return i + 1,
            _ => i += 1,
        }
    }
    body.len()
}

fn skip_whitespace(body: &[u8], mut i: usize) -> usize {
    while i < body.len() && body[i].is_ascii_whitespace() {
        i += 1;
    }
    i
}

/// Replace bodies with non-textual content types by [`BINARY_PLACEHOLDER`].
/// Bodies without a content type are kept.
pub fn replace_binary() -> BodyFilter {
    BodyFilter::new(|content_type, body| match content_type {
        Some(media_type) if !is_textual(media_type) => Bytes::from_static(BINARY_PLACEHOLDER.as_bytes()),
        _ => body,
    })
}

/// Cut bodies longer than `max` bytes and mark the cut with `...`.
pub fn truncate(max: usize) -> BodyFilter {
    BodyFilter::new(move |_, body| {
        if body.len() <= max {
            return body;
        }
        let mut truncated = Vec::with_capacity(max + 3);
        truncated.extend_from_slice(&body[..max]);
        truncated.extend_from_slice(b"...");
        Bytes::from(truncated)
    })
}

/// Filter used when none is configured.
pub fn defaults() -> BodyFilter {
    replace_binary()
}

fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// `application/json` and any `+json` structured syntax suffix.
pub fn is_json(content_type: &str) -> bool {
    let essence = essence(content_type);
    essence == "application/json" || essence.ends_with("+json")
}

/// Media types whose bodies render as text.
pub fn is_textual(content_type: &str) -> bool {
    let essence = essence(content_type);
    essence.starts_with("text/")
        || is_json(&essence)
        || essence.ends_with("+xml")
        || matches!(
            essence.as_str(),
            "application/xml"
                | "application/javascript"
                | "application/x-www-form-urlencoded"
                | "application/graphql"
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_nested_json_strings() {
        let filter = replace_json_string_properties(["password", "token"], "XXX");
        let body = Bytes::from_static(
            br#"{"user":"me","password":"hunter2","nested":[{"token":"t"},{"token":7}]}"#,
        );

        let filtered = filter.filter(Some("application/json; charset=utf-8"), body);
        let value: Value = serde_json::from_slice(&filtered).unwrap();

        assert_eq!(value["user"], "me");
        assert_eq!(value["password"], "XXX");
        assert_eq!(value["nested"][0]["token"], "XXX");
        assert_eq!(value["nested"][1]["token"], 7);
    }

    #[test]
    fn keeps_property_order() {
        let filter = replace_json_string_properties(["password"], "XXX");
        let body = Bytes::from_static(br#"{"user":"alice","password":"hunter2","age":3}"#);

        assert_eq!(
            filter.filter(Some("application/json"), body),
            Bytes::from_static(br#"{"user":"alice","password":"XXX","age":3}"#)
        );
    }

    #[test]
    fn redacts_json_cut_at_the_capture_limit() {
        let filter = replace_json_string_properties(["password"], "XXX");

        let cut_after_value = Bytes::from_static(br#"{"user":"alice","password":"hunter2","pad":"xxxx"#);
        assert_eq!(
            filter.filter(Some("application/json"), cut_after_value),
            Bytes::from_static(br#"{"user":"alice","password":"XXX","pad":"xxxx"#)
        );

        let cut_inside_value = Bytes::from_static(br#"{"user":"alice", "password" : "hun"#);
        assert_eq!(
            filter.filter(Some("application/json"), cut_inside_value),
            Bytes::from_static(br#"{"user":"alice", "password" : "XXX""#)
        );

        let escaped = Bytes::from_static(br#"[{"password":"a\"b","note":"#);
        assert_eq!(
            filter.filter(Some("application/json"), escaped),
            Bytes::from_static(br#"[{"password":"XXX","note":"#)
        );
    }

    #[test]
    fn leaves_unparseable_or_untouched_json_alone() {
        let filter = replace_json_string_properties(["password"], "XXX");

        let broken = Bytes::from_static(b"{\"password\": ");
        assert_eq!(filter.filter(Some("application/json"), broken.clone()), broken);

        let no_secrets = Bytes::from_static(br#"{"user":"alice","#);
        assert_eq!(filter.filter(Some("application/json"), no_secrets.clone()), no_secrets);

        let spaced = Bytes::from_static(b"{ \"user\" : \"me\" }");
        assert_eq!(filter.filter(Some("application/json"), spaced.clone()), spaced);
    }

    #[test]
    fn json_filter_ignores_other_content_types() {
        let filter = replace_json_string_properties(["password"], "XXX");
        let body = Bytes::from_static(br#"{"password":"hunter2"}"#);
        assert_eq!(filter.filter(Some("text/plain"), body.clone()), body);
        assert_eq!(filter.filter(None, body.clone()), body);
    }

    #[test]
    fn binary_bodies_become_placeholder() {
        let filter = replace_binary();
        let body = Bytes::from_static(&[0x89, 0x50, 0x4e, 0x47]);

        assert_eq!(
            filter.filter(Some("image/png"), body.clone()),
            Bytes::from_static(BINARY_PLACEHOLDER.as_bytes())
        );
        assert_eq!(filter.filter(None, body.clone()), body);
        assert_eq!(
            filter.filter(Some("application/problem+json"), body.clone()),
            body
        );
    }

    #[test]
    fn truncates_long_bodies() {
        let filter = truncate(4);
        assert_eq!(
            filter.filter(None, Bytes::from_static(b"abcdefgh")),
            Bytes::from_static(b"abcd...")
        );
        assert_eq!(
            filter.filter(None, Bytes::from_static(b"abcd")),
            Bytes::from_static(b"abcd")
        );
    }

    #[test]
    fn content_type_predicate_gates_filter() {
        let filter = for_content_type(
            |media_type| media_type.starts_with("text/"),
            BodyFilter::new(|_, _| Bytes::from_static(b"gone")),
        );
        assert_eq!(
            filter.filter(Some("text/html"), Bytes::from_static(b"<p>")),
            Bytes::from_static(b"gone")
        );
        assert_eq!(
            filter.filter(Some("application/json"), Bytes::from_static(b"{}")),
            Bytes::from_static(b"{}")
        );
    }
}
