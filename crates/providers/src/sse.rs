//! Server-sent-events plumbing for streaming adapters.
//!
//! The response body arrives in arbitrary chunks; events are `\n\n`
//! delimited blocks whose `data:` lines carry the payloads.  An adapter
//! supplies a stateful parser that turns each payload into zero or more
//! stream events.  No synthetic terminator is appended -- exhaustion of
//! the returned stream is the settle signal.

use ma_domain::error::{Error, Result};
use ma_domain::stream::{BoxStream, StreamEvent};
use ma_domain::CancelToken;

/// Convert a [`reqwest::Error`] into the domain [`Error`] type.
pub(crate) fn from_reqwest(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(e.to_string())
    } else {
        Error::Http(e.to_string())
    }
}

/// Incremental SSE buffer.  Push chunks in, take complete `data:`
/// payloads out; a trailing partial event stays buffered for the next
/// chunk.
#[derive(Default)]
pub(crate) struct SseBuffer {
    pending: String,
}

impl SseBuffer {
    pub(crate) fn push(&mut self, chunk: &str) {
        self.pending.push_str(chunk);
    }

    /// Pop the `data:` payloads of every complete event block.
    pub(crate) fn take_payloads(&mut self) -> Vec<String> {
        let mut payloads = Vec::new();

        while let Some(end) = self.pending.find("\n\n") {
            let remainder = self.pending.split_off(end + 2);
            let block = std::mem::replace(&mut self.pending, remainder);

            for line in block.lines() {
                if let Some(payload) = line.trim().strip_prefix("data:") {
                    let payload = payload.trim();
                    if !payload.is_empty() {
                        payloads.push(payload.to_string());
                    }
                }
            }
        }

        payloads
    }

    /// Force out whatever is still buffered (body closed mid-event).
    pub(crate) fn flush(&mut self) -> Vec<String> {
        if self.pending.trim().is_empty() {
            self.pending.clear();
            return Vec::new();
        }
        self.pending.push_str("\n\n");
        self.take_payloads()
    }
}

/// Wrap an SSE response into a [`BoxStream`] of parsed events.
///
/// Every body read races the cancellation token, so an aborted run
/// interrupts a stalled network read instead of waiting for the next
/// chunk.  `parse` is `FnMut` because adapters keep assembly state
/// across payloads (text accumulation, tool-call argument buffers).
pub(crate) fn sse_event_stream<F>(
    response: reqwest::Response,
    cancel: CancelToken,
    mut parse: F,
) -> BoxStream<'static, Result<StreamEvent>>
where
    F: FnMut(&str) -> Vec<Result<StreamEvent>> + Send + 'static,
{
    Box::pin(async_stream::stream! {
        let mut response = response;
        let mut buffer = SseBuffer::default();

        loop {
            let read = tokio::select! {
                chunk = response.chunk() => Some(chunk),
                _ = cancel.cancelled() => None,
            };
            let Some(read) = read else {
                yield Err(Error::Cancelled);
                return;
            };

            let chunk = match read {
                Ok(Some(bytes)) => bytes,
                Ok(None) => {
                    for payload in buffer.flush() {
                        for event in parse(&payload) {
                            yield event;
                        }
                    }
                    break;
                }
                Err(e) => {
                    yield Err(from_reqwest(e));
                    break;
                }
            };

            buffer.push(&String::from_utf8_lossy(&chunk));
            for payload in buffer.take_payloads() {
                for event in parse(&payload) {
                    yield event;
                }
            }
        }
    })
}
