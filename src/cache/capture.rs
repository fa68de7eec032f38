//! Response capture.
//!
//! Wraps a downstream response body so every data frame is forwarded to the
//! client unchanged while also being copied into a buffer. Once the body has
//! been fully produced the buffered bytes are handed to a completion callback.

use std::pin::Pin;
use std::task::{Context, Poll};

use axum::body::Body;
use bytes::{Bytes, BytesMut};
use http_body::{Body as HttpBody, Frame, SizeHint};
use tracing::debug;

type OnComplete = Box<dyn FnOnce(Bytes) + Send + 'static>;

/// Tee body: forwards frames and records their data.
///
/// The callback runs at most once, and only when the inner body reaches its
/// end without error and within `limit` bytes. A body dropped before its end
/// never completes.
pub struct CaptureBody {
    inner: Body,
    buffer: BytesMut,
    limit: usize,
    on_complete: Option<OnComplete>,
}

impl CaptureBody {
    pub fn new<F>(inner: Body, limit: usize, on_complete: F) -> Self
    where
        F: FnOnce(Bytes) + Send + 'static,
    {
        let mut body = Self {
            inner,
            buffer: BytesMut::new(),
            limit,
            on_complete: Some(Box::new(on_complete)),
        };

        // An empty body may never be polled.
        if body.inner.is_end_stream() {
            body.finish();
        }
        body
    }

    /// Whether the capture is still collecting.
    pub fn is_capturing(&self) -> bool {
        self.on_complete.is_some()
    }

    fn record(&mut self, data: &Bytes) {
        if !self.is_capturing() {
            return;
        }
        if self.buffer.len().saturating_add(data.len()) > self.limit {
            self.abandon("body exceeds capture limit");
            return;
        }
        self.buffer.extend_from_slice(data);
    }

    fn finish(&mut self) {
        if let Some(on_complete) = self.on_complete.take() {
            on_complete(std::mem::take(&mut self.buffer).freeze());
        }
    }

    fn abandon(&mut self, reason: &'static str) {
        if self.on_complete.take().is_some() {
            self.buffer = BytesMut::new();
            debug!(reason, limit = self.limit, "response capture abandoned");
        }
    }
}

impl HttpBody for CaptureBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        let polled = Pin::new(&mut this.inner).poll_frame(cx);

        match &polled {
            Poll::Ready(Some(Ok(frame))) => {
                if let Some(data) = frame.data_ref() {
                    this.record(data);
                }
                if this.inner.is_end_stream() {
                    this.finish();
                }
            }
            Poll::Ready(Some(Err(_))) => this.abandon("downstream body error"),
            Poll::Ready(None) => this.finish(),
            Poll::Pending => {}
        }

        polled
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}
