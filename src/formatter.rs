//! Rendering of filtered exchanges into log records.
//!
//! Two formatters are provided: [`DefaultHttpLogFormatter`], a plain text layout
//! close to the HTTP/1.1 wire format, and [`JsonHttpLogFormatter`], one JSON
//! object per record. The first line of every text record is one of
//! `Incoming Request:`, `Outgoing Request:`, `Incoming Response:` or
//! `Outgoing Response:`, followed by the correlation id.

use serde::Serialize;
use std::borrow::Cow;

use crate::correlation::{Correlation, CorrelationId, Precorrelation};
use crate::error::FormatError;
use crate::filter::body::is_json;
use crate::types::{Headers, MessageBody, Origin};

/// Turns precorrelations and correlations into text.
pub trait HttpLogFormatter: Send + Sync + 'static {
    fn format_request(&self, precorrelation: &Precorrelation) -> Result<String, FormatError>;

    fn format_response(&self, correlation: &Correlation) -> Result<String, FormatError>;
}

fn direction(origin: Origin) -> &'static str {
    match origin {
        Origin::Remote => "Incoming",
        Origin::Local => "Outgoing",
    }
}

/// Plain text records.
///
/// ```text
/// Outgoing Request: 65f2a1c000000001
/// POST http://localhost:3000/echo HTTP/1.1
/// Content-Type: text/plain
///
/// Hello, world!
/// ```
///
/// Headers are written one line per value. The blank line and the body follow
/// only when a body was captured; an empty captured body still gets its blank
/// line, a body that is absent or omitted gets neither.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultHttpLogFormatter;

impl DefaultHttpLogFormatter {
    fn write_message(lines: &mut Vec<String>, headers: &Headers, body: &MessageBody) {
        for (name, values) in headers.iter() {
            for value in values {
                lines.push(format!("{name}: {value}"));
            }
        }

        if let Some(bytes) = body.bytes() {
            lines.push(String::new());
            let mut text = String::from_utf8_lossy(bytes).into_owned();
            if body.is_truncated() {
                text.push_str("...");
            }
            lines.push(text);
        }
    }
}

impl HttpLogFormatter for DefaultHttpLogFormatter {
    fn format_request(&self, precorrelation: &Precorrelation) -> Result<String, FormatError> {
        let request = precorrelation.request();
        let mut lines = vec![
            format!("{} Request: {}", direction(request.origin), precorrelation.id()),
            format!(
                "{} {} {}",
                request.method,
                request.url(),
                request.protocol_version
            ),
        ];
        Self::write_message(&mut lines, &request.headers, &request.body);
        Ok(lines.join("\n"))
    }

    fn format_response(&self, correlation: &Correlation) -> Result<String, FormatError> {
        let response = correlation.response();
        let mut lines = vec![
            format!("{} Response: {}", direction(response.origin), correlation.id()),
            format!("Duration: {} ms", correlation.duration().as_millis()),
            format!(
                "{} {} {}",
                response.protocol_version,
                response.status,
                response.reason()
            )
            .trim_end()
            .to_owned(),
        ];
        Self::write_message(&mut lines, &response.headers, &response.body);
        Ok(lines.join("\n"))
    }
}

/// One JSON object per record.
///
/// ```json
/// {"origin":"remote","type":"request","correlation":"65f2a1c000000001",
///  "protocol":"HTTP/1.1","method":"GET","uri":"http://localhost/hello",
///  "headers":{"accept":["*/*"]}}
/// ```
///
/// Bodies with a JSON content type are embedded as JSON when they parse; any
/// other body is embedded as a string.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonHttpLogFormatter;

#[derive(Serialize)]
#[serde(untagged)]
enum JsonBody<'a> {
    Json(serde_json::Value),
    Text(Cow<'a, str>),
}

fn json_body<'a>(content_type: Option<&str>, body: &'a MessageBody) -> Option<JsonBody<'a>> {
    let bytes = body.bytes()?;
    if content_type.is_some_and(is_json) && !body.is_truncated() {
        if let Ok(value) = serde_json::from_slice(bytes) {
            return Some(JsonBody::Json(value));
        }
    }
    Some(JsonBody::Text(String::from_utf8_lossy(bytes)))
}

fn is_false(value: &bool) -> bool {
    !*value
}

#[derive(Serialize)]
struct RequestRecord<'a> {
    origin: Origin,
    #[serde(rename = "type")]
    kind: &'static str,
    correlation: CorrelationId,
    protocol: &'a str,
    method: &'a str,
    uri: String,
    headers: &'a Headers,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<JsonBody<'a>>,
    #[serde(skip_serializing_if = "is_false")]
    truncated: bool,
}

#[derive(Serialize)]
struct ResponseRecord<'a> {
    origin: Origin,
    #[serde(rename = "type")]
    kind: &'static str,
    correlation: CorrelationId,
    duration: u64,
    protocol: &'a str,
    status: u16,
    headers: &'a Headers,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<JsonBody<'a>>,
    #[serde(skip_serializing_if = "is_false")]
    truncated: bool,
}

impl HttpLogFormatter for JsonHttpLogFormatter {
    fn format_request(&self, precorrelation: &Precorrelation) -> Result<String, FormatError> {
        let request = precorrelation.request();
        let record = RequestRecord {
            origin: request.origin,
            kind: "request",
            correlation: precorrelation.id(),
            protocol: &request.protocol_version,
            method: &request.method,
            uri: request.url(),
            headers: &request.headers,
            body: json_body(request.content_type(), &request.body),
            truncated: request.body.is_truncated(),
        };
        Ok(serde_json::to_string(&record)?)
    }

    fn format_response(&self, correlation: &Correlation) -> Result<String, FormatError> {
        let response = correlation.response();
        let record = ResponseRecord {
            origin: response.origin,
            kind: "response",
            correlation: correlation.id(),
            duration: u64::try_from(correlation.duration().as_millis()).unwrap_or(u64::MAX),
            protocol: &response.protocol_version,
            status: response.status,
            headers: &response.headers,
            body: json_body(response.content_type(), &response.body),
            truncated: response.body.is_truncated(),
        };
        Ok(serde_json::to_string(&record)?)
    }
}
