use axum::extract::Request;
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;
use tracing::Instrument;

use crate::error::GatewayError;
use crate::state::GatewayState;

/// Request-scoped identifier, propagated as `X-Request-ID` on the
/// response and attached to every tracing event emitted while handling
/// the request — ported from `app/middleware/request_id.py`.
#[derive(Clone, Copy)]
pub struct RequestId(pub u128);

impl RequestId {
	fn generate() -> Self {
		Self(rand::random())
	}

	pub fn as_hex(&self) -> String {
		format!("{:032x}", self.0)
	}
}

/// Rejects requests whose declared `Content-Length` exceeds the
/// configured ceiling before the body is ever read — spec §6,
/// `enforce_body_limit` in the original.
pub async fn body_size_guard(
	axum::extract::State(state): axum::extract::State<GatewayState>,
	request: Request,
	next: Next,
) -> Response {
	if let Some(len) = request
		.headers()
		.get(axum::http::header::CONTENT_LENGTH)
		.and_then(|v| v.to_str().ok())
		.and_then(|v| v.parse::<u64>().ok())
	{
		if len > state.settings.max_body_bytes {
			return axum::response::IntoResponse::into_response(GatewayError::body_too_large());
		}
	}
	next.run(request).await
}

/// Extracts the caller's address from `X-Forwarded-For` (first hop) or
/// the socket peer, stamps a request id, and emits a structured access
/// log line once the response is ready — ported from
/// `app/middleware/forwarded_ip.py` and `app/middleware/logging.py`,
/// expressed as `tracing` spans rather than hand-rolled JSON lines since
/// that's how this stack does structured logging everywhere else.
pub async fn access_log(request: Request, next: Next) -> Response {
	let request_id = RequestId::generate();
	let remote_ip = remote_ip(&request);
	let method = request.method().clone();
	let path = request.uri().path().to_string();

	let span = tracing::info_span!(
		"request",
		request_id = %request_id.as_hex(),
		remote_ip = %remote_ip.unwrap_or_else(|| "unknown".to_string()),
		method = %method,
		path = %path,
	);

	async move {
		let start = std::time::Instant::now();
		let mut response = next.run(request).await;
		let latency_ms = start.elapsed().as_millis();

		tracing::info!(
			status = response.status().as_u16(),
			latency_ms,
			"request completed"
		);

		if let Ok(value) = HeaderValue::from_str(&request_id.as_hex()) {
			response.headers_mut().insert("X-Request-ID", value);
		}
		response
	}
	.instrument(span)
	.await
}

fn remote_ip(request: &Request) -> Option<String> {
	if let Some(header) = request
		.headers()
		.get("x-forwarded-for")
		.and_then(|v| v.to_str().ok())
	{
		if let Some(first) = header.split(',').next() {
			let trimmed = first.trim();
			if !trimmed.is_empty() {
				return Some(trimmed.to_string());
			}
		}
	}
	request
		.extensions()
		.get::<axum::extract::ConnectInfo<std::net::SocketAddr>>()
		.map(|info| info.0.ip().to_string())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn request_id_formats_as_32_hex_chars() {
		let id = RequestId::generate();
		assert_eq!(id.as_hex().len(), 32);
	}
}
