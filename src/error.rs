use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// The four error kinds the gateway ever reports to a client, per the
/// `type` field of the error envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
	Authentication,
	InvalidRequest,
	RateLimitExceeded,
	Backend,
}

impl ErrorKind {
	fn as_str(self) -> &'static str {
		match self {
			ErrorKind::Authentication => "authentication_error",
			ErrorKind::InvalidRequest => "invalid_request_error",
			ErrorKind::RateLimitExceeded => "rate_limit_exceeded",
			ErrorKind::Backend => "backend_error",
		}
	}
}

/// A request-path error, carrying everything needed to render the
/// standard `{"error": {...}}` envelope.
#[derive(Debug)]
pub struct GatewayError {
	pub kind: ErrorKind,
	pub status: StatusCode,
	pub message: String,
	pub code: Option<u16>,
	pub www_authenticate: bool,
}

impl GatewayError {
	fn new(kind: ErrorKind, status: StatusCode, message: impl Into<String>) -> Self {
		Self {
			kind,
			status,
			message: message.into(),
			code: None,
			www_authenticate: false,
		}
	}

	pub fn missing_token() -> Self {
		let mut e = Self::new(
			ErrorKind::Authentication,
			StatusCode::UNAUTHORIZED,
			"missing bearer token",
		);
		e.www_authenticate = true;
		e
	}

	pub fn invalid_token() -> Self {
		let mut e = Self::new(
			ErrorKind::Authentication,
			StatusCode::UNAUTHORIZED,
			"invalid bearer token",
		);
		e.www_authenticate = true;
		e
	}

	pub fn body_too_large() -> Self {
		Self::new(
			ErrorKind::InvalidRequest,
			StatusCode::PAYLOAD_TOO_LARGE,
			"request body too large",
		)
	}

	pub fn invalid_request(message: impl Into<String>) -> Self {
		Self::new(ErrorKind::InvalidRequest, StatusCode::BAD_REQUEST, message)
	}

	pub fn unprocessable(message: impl Into<String>) -> Self {
		Self::new(
			ErrorKind::InvalidRequest,
			StatusCode::UNPROCESSABLE_ENTITY,
			message,
		)
	}

	pub fn rate_limited(message: impl Into<String>) -> Self {
		Self::new(
			ErrorKind::RateLimitExceeded,
			StatusCode::TOO_MANY_REQUESTS,
			message,
		)
	}

	pub fn backend_unavailable(message: impl Into<String>) -> Self {
		Self::new(ErrorKind::Backend, StatusCode::INTERNAL_SERVER_ERROR, message)
	}

	pub fn bad_gateway(message: impl Into<String>) -> Self {
		let mut e = Self::new(ErrorKind::Backend, StatusCode::BAD_GATEWAY, message);
		e.code = Some(502);
		e
	}
}

#[derive(Serialize)]
struct ErrorBody {
	error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
	message: String,
	#[serde(rename = "type")]
	kind: &'static str,
	#[serde(skip_serializing_if = "Option::is_none")]
	code: Option<u16>,
}

impl IntoResponse for GatewayError {
	fn into_response(self) -> Response {
		let body = ErrorBody {
			error: ErrorDetail {
				message: self.message,
				kind: self.kind.as_str(),
				code: self.code,
			},
		};
		let mut response = (self.status, Json(body)).into_response();
		if self.www_authenticate {
			response
				.headers_mut()
				.insert("WWW-Authenticate", http::HeaderValue::from_static("Bearer"));
		}
		response
	}
}
