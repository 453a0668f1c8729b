//! Body streaming and capture utilities.
//!
//! This module provides the tee used to capture HTTP request and response bodies
//! while they continue streaming, unchanged, to their real consumer.

use axum::body::Body;
use axum::http::{header, HeaderMap};
use bytes::{Bytes, BytesMut};
use http_body::{Body as _, Frame, SizeHint};
use pin_project_lite::pin_project;
use std::future::Future;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use tokio::sync::mpsc;
use tracing::error;

use crate::types::MessageBody;

/// Error type for body capture operations
#[derive(Debug, thiserror::Error)]
pub enum BodyCaptureError {
    #[error("Body stream error: {0}")]
    StreamError(String),
}

/// Future resolving to the mirrored copy of a teed body.
pub type CapturedBody = Pin<Box<dyn Future<Output = Result<MessageBody, BodyCaptureError>> + Send>>;

enum Mirror {
    Data(Bytes),
    Truncated,
    End,
    Failed(String),
}

pin_project! {
    /// Body wrapper that forwards every frame of `inner` untouched and mirrors
    /// data frames, up to a byte limit, to a [`CapturedBody`].
    ///
    /// Size hints and end-of-stream signals are delegated to the inner body, so
    /// framing such as `Content-Length` is preserved.
    pub struct TeeBody<B> {
        #[pin]
        inner: B,
        remaining: usize,
        tx: Option<mpsc::UnboundedSender<Mirror>>,
    }
}

impl<B> http_body::Body for TeeBody<B>
where
    B: http_body::Body<Data = Bytes>,
    B::Error: std::fmt::Display,
{
    type Data = Bytes;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let mut this = self.project();
        let result = ready!(this.inner.as_mut().poll_frame(cx));

        match &result {
            Some(Ok(frame)) => {
                if let Some(data) = frame.data_ref() {
                    mirror_data(this.tx, this.remaining, data);
                }
                // Consumers may stop polling as soon as the body reports its end.
                if this.inner.is_end_stream() {
                    finish(this.tx, Mirror::End);
                }
            }
            Some(Err(e)) => {
                error!(error = %e, "Stream error during body capture");
                finish(this.tx, Mirror::Failed(e.to_string()));
            }
            None => finish(this.tx, Mirror::End),
        }

        Poll::Ready(result)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

fn mirror_data(tx: &mut Option<mpsc::UnboundedSender<Mirror>>, remaining: &mut usize, data: &Bytes) {
    let Some(sender) = tx.as_ref() else {
        return;
    };

    if data.len() <= *remaining {
        *remaining -= data.len();
        let _ = sender.send(Mirror::Data(data.clone()));
    } else {
        let _ = sender.send(Mirror::Data(data.slice(..*remaining)));
        *remaining = 0;
        finish(tx, Mirror::Truncated);
    }
}

fn finish(tx: &mut Option<mpsc::UnboundedSender<Mirror>>, last: Mirror) {
    if let Some(sender) = tx.take() {
        let _ = sender.send(last);
    }
}

/// Tee `body` so it can be consumed normally while a copy of up to `limit` bytes
/// is collected.
///
/// The returned body yields exactly the frames of the original. The capture
/// future resolves to:
/// - [`MessageBody::Complete`] once the stream ends within the limit,
/// - [`MessageBody::Truncated`] when the limit is hit, or when the consumer drops
///   the body before its end (the bytes read so far are kept),
/// - [`BodyCaptureError`] when the stream fails.
///
/// # Examples
///
/// ```rust
/// use sightline::body_wrapper::tee_body;
/// use sightline::types::MessageBody;
/// use axum::body::Body;
/// use http_body_util::BodyExt;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let (body, captured) = tee_body(Body::from("Hello, World!"), 1024);
///
/// let delivered = body.collect().await?.to_bytes();
/// assert_eq!(delivered, "Hello, World!");
/// assert_eq!(captured.await?, MessageBody::from("Hello, World!"));
/// # Ok(())
/// # }
/// ```
pub fn tee_body<B>(body: B, limit: usize) -> (Body, CapturedBody)
where
    B: http_body::Body<Data = Bytes> + Send + 'static,
    B::Error: Into<axum::BoxError> + std::fmt::Display,
{
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut tx = Some(tx);
    if body.is_end_stream() {
        finish(&mut tx, Mirror::End);
    }

    let new_body = Body::new(TeeBody {
        inner: body,
        remaining: limit,
        tx,
    });

    // Resolves when the stream is finished, truncated, abandoned or failed.
    let capture_future: CapturedBody = Box::pin(async move {
        let mut buffer = BytesMut::new();
        while let Some(mirror) = rx.recv().await {
            match mirror {
                Mirror::Data(chunk) => buffer.extend_from_slice(&chunk),
                Mirror::End => return Ok(MessageBody::Complete(buffer.freeze())),
                Mirror::Truncated => return Ok(MessageBody::Truncated(buffer.freeze())),
                Mirror::Failed(message) => return Err(BodyCaptureError::StreamError(message)),
            }
        }
        Ok(MessageBody::Truncated(buffer.freeze()))
    });

    (new_body, capture_future)
}

/// Whether a message declares a body at all: an explicit `Content-Length` or
/// `Transfer-Encoding`, or a body that is not known to be empty.
pub fn declares_body(headers: &HeaderMap, size_hint: &SizeHint) -> bool {
    headers.contains_key(header::CONTENT_LENGTH)
        || headers.contains_key(header::TRANSFER_ENCODING)
        || size_hint.exact() != Some(0)
}
