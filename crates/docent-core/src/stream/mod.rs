//! Server-sent event decoding for `POST /api/chat/stream`.

mod decoder;
mod event;

pub use decoder::{EventStream, SseDecoder, decode_stream};
pub use event::StreamEvent;
