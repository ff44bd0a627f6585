//! Incremental JSON object framing for watch responses
//!
//! Watch bodies are a sequence of top-level JSON values with no framing
//! other than whitespace. Chunks from the network split values at arbitrary
//! byte positions, so incomplete tails are kept until the next chunk.

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use bytes::Bytes;
use futures::Stream;
use serde_json::Value as JsonValue;

use super::bytes::ResponseStream;
use crate::errors::KubewireError;

/// Splits a byte stream into complete top-level JSON values.
///
/// Each byte is scanned once to find value boundaries; a value is parsed
/// only after its last byte has arrived.
#[derive(Debug, Default)]
pub struct JsonObjectDecoder {
    buf: Vec<u8>,
    /// Next byte of `buf` to scan
    pos: usize,
    /// Start of the value being scanned
    start: Option<usize>,
    depth: usize,
    in_string: bool,
    escaped: bool,
}

impl JsonObjectDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes held back waiting for the rest of a value
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Feed one chunk, returning every value it completes
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<JsonValue>, KubewireError> {
        self.buf.extend_from_slice(chunk);

        let mut bounds = Vec::new();
        while self.pos < self.buf.len() {
            let i = self.pos;
            let b = self.buf[i];

            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if b == b'\\' {
                    self.escaped = true;
                } else if b == b'"' {
                    self.in_string = false;
                    if self.depth == 0 {
                        bounds.push(self.complete(i + 1));
                    }
                }
                self.pos += 1;
                continue;
            }

            match self.start {
                None => match b {
                    b if b.is_ascii_whitespace() => {}
                    b'{' | b'[' => {
                        self.start = Some(i);
                        self.depth = 1;
                    }
                    b'"' => {
                        self.start = Some(i);
                        self.in_string = true;
                    }
                    // Stray closer: handed to the parser, which rejects it
                    b'}' | b']' => {
                        self.start = Some(i);
                        bounds.push(self.complete(i + 1));
                    }
                    _ => self.start = Some(i),
                },
                Some(_) if self.depth > 0 => match b {
                    b'"' => self.in_string = true,
                    b'{' | b'[' => self.depth += 1,
                    b'}' | b']' => {
                        self.depth -= 1;
                        if self.depth == 0 {
                            bounds.push(self.complete(i + 1));
                        }
                    }
                    _ => {}
                },
                // Top-level scalar ends at the first delimiter; rescan it
                Some(_) => {
                    if b.is_ascii_whitespace() || matches!(b, b'{' | b'[' | b'"' | b'}' | b']') {
                        bounds.push(self.complete(i));
                        continue;
                    }
                }
            }
            self.pos += 1;
        }

        let mut values = Vec::with_capacity(bounds.len());
        for (from, to) in bounds {
            values.push(serde_json::from_slice(&self.buf[from..to])?);
        }

        let consumed = self.start.unwrap_or(self.pos);
        self.buf.drain(..consumed);
        self.pos -= consumed;
        self.start = self.start.map(|s| s - consumed);
        Ok(values)
    }

    /// Flush at end of input. A non-whitespace remainder must be one
    /// complete value.
    pub fn finish(&mut self) -> Result<Option<JsonValue>, KubewireError> {
        let rest = std::mem::take(&mut self.buf);
        *self = Self::default();
        if rest.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        Ok(Some(serde_json::from_slice(&rest)?))
    }

    fn complete(&mut self, end: usize) -> (usize, usize) {
        let start = self.start.take().unwrap_or(end);
        self.depth = 0;
        (start, end)
    }
}

/// Stream of JSON values decoded from a byte stream
pub struct JsonObjectStream<S> {
    inner: S,
    decoder: JsonObjectDecoder,
    pending: VecDeque<JsonValue>,
    done: bool,
}

impl<S> JsonObjectStream<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            decoder: JsonObjectDecoder::new(),
            pending: VecDeque::new(),
            done: false,
        }
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl JsonObjectStream<ResponseStream> {
    /// Stop the watch and release its connection
    pub fn close(&mut self) {
        self.pending.clear();
        self.done = true;
        self.inner.close();
    }
}

impl<S> Stream for JsonObjectStream<S>
where
    S: Stream<Item = Result<Bytes, KubewireError>> + Unpin,
{
    type Item = Result<JsonValue, KubewireError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if let Some(value) = this.pending.pop_front() {
                return Poll::Ready(Some(Ok(value)));
            }
            if this.done {
                return Poll::Ready(None);
            }

            match ready!(Pin::new(&mut this.inner).poll_next(cx)) {
                Some(Ok(chunk)) => match this.decoder.push(&chunk) {
                    Ok(values) => this.pending.extend(values),
                    Err(e) => {
                        this.done = true;
                        return Poll::Ready(Some(Err(e)));
                    }
                },
                Some(Err(e)) => {
                    this.done = true;
                    return Poll::Ready(Some(Err(e)));
                }
                None => {
                    this.done = true;
                    match this.decoder.finish() {
                        Ok(Some(value)) => return Poll::Ready(Some(Ok(value))),
                        Ok(None) => return Poll::Ready(None),
                        Err(e) => return Poll::Ready(Some(Err(e))),
                    }
                }
            }
        }
    }
}
