//! Live response body for logs and watches
//!
//! The stream owns the cancellation token bound to the request that
//! produced it. Closing the stream, dropping it, or reaching the end of the
//! body cancels the token once and drops the body, which releases the
//! connection.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::json::JsonObjectStream;
use crate::errors::KubewireError;

/// Byte stream over a streamed response body
pub struct ResponseStream {
    inner: Option<BoxStream<'static, Result<Bytes, KubewireError>>>,
    cancel: CancellationToken,
    status: StatusCode,
    headers: HeaderMap,
}

impl std::fmt::Debug for ResponseStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseStream")
            .field("status", &self.status)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl ResponseStream {
    /// Wrap `response` without reading its body
    pub fn new(response: reqwest::Response, cancel: CancellationToken) -> Self {
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes_stream().map(|chunk| chunk.map_err(KubewireError::from));
        Self::from_parts(status, headers, body, cancel)
    }

    /// Build from any byte stream
    pub fn from_parts<S>(status: StatusCode, headers: HeaderMap, body: S, cancel: CancellationToken) -> Self
    where
        S: Stream<Item = Result<Bytes, KubewireError>> + Send + 'static,
    {
        // An external cancel ends the body even while a read is pending
        let body = body.take_until(cancel.clone().cancelled_owned()).boxed();
        Self {
            inner: Some(body),
            cancel,
            status,
            headers,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Token bound to the underlying request
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }

    /// Stop reading and release the connection. Idempotent.
    pub fn close(&mut self) {
        if self.inner.take().is_some() {
            debug!(status = self.status.as_u16(), "Closing response stream");
            self.cancel.cancel();
        }
    }

    /// Decode the body as a sequence of JSON values
    pub fn into_json_objects(self) -> JsonObjectStream<Self> {
        JsonObjectStream::new(self)
    }
}

impl Stream for ResponseStream {
    type Item = Result<Bytes, KubewireError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let Some(inner) = this.inner.as_mut() else {
            return Poll::Ready(None);
        };

        match inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => Poll::Ready(Some(Ok(chunk))),
            Poll::Ready(Some(Err(e))) => {
                this.close();
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.close();
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for ResponseStream {
    fn drop(&mut self) {
        self.close();
    }
}
