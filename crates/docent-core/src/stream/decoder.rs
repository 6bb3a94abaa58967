use std::fmt::Display;

use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::event::StreamEvent;
use crate::error::{ChatError, ChatResult};

const EVENT_DELIMITER: &[u8] = b"\n\n";

/// Lazy sequence of decoded events, ending after the first terminal event.
pub type EventStream = BoxStream<'static, ChatResult<StreamEvent>>;

/// Incremental `data: <json>\n\n` decoder.
///
/// Bytes are buffered until a full event delimiter arrives, so events split
/// across chunks (including inside a UTF-8 sequence or inside the delimiter
/// itself) decode exactly as if they had arrived in one piece.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every event it completed, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = find_delimiter(&self.buffer) {
            let block: Vec<u8> = self.buffer.drain(..pos + EVENT_DELIMITER.len()).collect();
            if let Some(event) = parse_event(&block[..pos]) {
                events.push(event);
            }
        }
        events
    }

    /// Flush whatever is left once the transport is exhausted.
    pub fn finish(&mut self) -> Option<StreamEvent> {
        let rest = std::mem::take(&mut self.buffer);
        if rest.iter().all(u8::is_ascii_whitespace) {
            return None;
        }
        debug!(bytes = rest.len(), "Parsing unterminated trailing event");
        parse_event(&rest)
    }

    /// Bytes held back waiting for a delimiter.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

fn find_delimiter(buffer: &[u8]) -> Option<usize> {
    buffer
        .windows(EVENT_DELIMITER.len())
        .position(|window| window == EVENT_DELIMITER)
}

fn parse_event(block: &[u8]) -> Option<StreamEvent> {
    let text = String::from_utf8_lossy(block);

    let data: Vec<&str> = text
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|rest| rest.strip_prefix(' ').unwrap_or(rest))
        .collect();

    if data.is_empty() {
        // Comments (": keepalive") and bare `event:` / `id:` fields
        trace!(block = %text, "Ignoring event without data line");
        return None;
    }

    let payload = data.join("\n");
    match serde_json::from_str::<StreamEvent>(&payload) {
        Ok(event) => Some(event),
        Err(e) => {
            warn!(error = %e, payload = %payload, "Dropping malformed stream payload");
            None
        }
    }
}

/// Decode a chunked response body into protocol events.
///
/// The body is read one chunk at a time. Reading stops right after a `done`
/// or `error` event, on a transport error, or once `cancel` fires. A pending
/// read is abandoned as soon as the token is cancelled, and nothing read
/// after that point is yielded. When the body ends without a terminal event
/// the sequence simply ends; the caller decides how to finalize whatever
/// tokens it received.
pub fn decode_stream<S, B, E>(url: String, body: S, cancel: CancellationToken) -> EventStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: Into<Bytes> + Send,
    E: Display + Send,
{
    Box::pin(async_stream::stream! {
        let mut body = Box::pin(body);
        let mut decoder = SseDecoder::new();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                next = body.next() => Some(next),
            };
            let Some(next) = next else {
                debug!(url = %url, "Stream cancelled, releasing body");
                return;
            };

            match next {
                Some(Ok(chunk)) => {
                    let chunk: Bytes = chunk.into();
                    for event in decoder.push(&chunk) {
                        if cancel.is_cancelled() {
                            debug!(url = %url, "Stream cancelled, dropping decoded events");
                            return;
                        }
                        let terminal = event.is_terminal();
                        yield Ok(event);
                        if terminal {
                            return;
                        }
                    }
                }
                Some(Err(e)) => {
                    if cancel.is_cancelled() {
                        return;
                    }
                    warn!(url = %url, error = %e, "Stream transport failed");
                    yield Err(ChatError::Connection { url: url.clone(), message: e.to_string() });
                    return;
                }
                None => {
                    if cancel.is_cancelled() {
                        return;
                    }
                    if let Some(event) = decoder.finish() {
                        yield Ok(event);
                    }
                    debug!(url = %url, "Stream body ended");
                    return;
                }
            }
        }
    })
}
