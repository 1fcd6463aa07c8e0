use axum::body::Body;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::Stream;
use serde::Serialize;

/// A translated SSE byte stream, already framed as `data: ...\n\n` lines.
/// Adapters yield raw bytes rather than axum `Event`s so both the
/// pass-through and translating adapters share one wire representation
/// regardless of how many intermediate JSON objects they build per
/// backend frame — ported from `app/utils/sse.py::sse_format`/`sse_done`.
pub type ByteStream = std::pin::Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

/// Compact-JSON `data: <json>\n\n` frame — spec §6, "Streaming format".
pub fn format_event<T: Serialize>(value: &T) -> Bytes {
	let json = serde_json::to_string(value).expect("event must serialize");
	Bytes::from(format!("data: {json}\n\n"))
}

/// The terminal `[DONE]` sentinel every stream must emit exactly once.
pub fn done_event() -> Bytes {
	Bytes::from_static(b"data: [DONE]\n\n")
}

/// Wraps an already-framed byte stream as a `text/event-stream` response.
pub fn response_from_bytes(stream: ByteStream) -> Response {
	let body = Body::from_stream(stream);
	let mut response = body.into_response();
	response
		.headers_mut()
		.insert(header::CONTENT_TYPE, header::HeaderValue::from_static("text/event-stream"));
	response
}
