use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue};
use axum::response::{IntoResponse, Response};
use serde_json::Value;

use crate::backend::AdapterResponse;
use crate::error::GatewayError;
use crate::ratelimit::RateSnapshot;
use crate::schemas::{ChatCompletionRequest, CompletionRequest, EmbeddingRequest, build_backend_payload};
use crate::sse::response_from_bytes;
use crate::state::GatewayState;

async fn authenticate<'s>(
	state: &'s GatewayState,
	headers: &HeaderMap,
) -> Result<&'s crate::config::TokenConfig, GatewayError> {
	let header = headers
		.get(axum::http::header::AUTHORIZATION)
		.and_then(|v| v.to_str().ok());
	state.tokens.authenticate(header)
}

async fn admit_rate_limit(
	state: &GatewayState,
	token: &crate::config::TokenConfig,
) -> Result<RateSnapshot, GatewayError> {
	match state.rate_limiter.consume_or_deny(&token.token, token.rpm, token.rpd).await {
		Some(snapshot) => Ok(snapshot),
		None => {
			state
				.metrics
				.rate_limited_total
				.get_or_create(&crate::metrics::RateLimitLabels {
					token_label: token.label.clone(),
				})
				.inc();
			Err(GatewayError::rate_limited("rate limit exceeded"))
		},
	}
}

fn attach_headers(response: &mut Response, backend: &str, snapshot: RateSnapshot) {
	let headers = response.headers_mut();
	headers.insert("X-Proxy-Backend", HeaderValue::from_str(backend).unwrap());
	headers.insert(
		"X-RateLimit-Limit-Minute",
		HeaderValue::from_str(&snapshot.limit_minute.to_string()).unwrap(),
	);
	headers.insert(
		"X-RateLimit-Remaining-Minute",
		HeaderValue::from_str(&snapshot.remaining_minute.to_string()).unwrap(),
	);
	headers.insert(
		"X-RateLimit-Limit-Day",
		HeaderValue::from_str(&snapshot.limit_day.to_string()).unwrap(),
	);
	headers.insert(
		"X-RateLimit-Remaining-Day",
		HeaderValue::from_str(&snapshot.remaining_day.to_string()).unwrap(),
	);
}

fn record(state: &GatewayState, backend: &str, route: &str, status: u16) {
	state.metrics.requests_total.get_or_create(&crate::metrics::RequestLabels {
		backend: backend.to_string(),
		route: route.to_string(),
		status,
	}).inc();
}

/// Builds the error response for a failure that occurred after rate-limit
/// admission — the unit was already consumed at that point, so the
/// response still carries the admission snapshot's headers (spec §2, §3).
fn post_admission_error(
	state: &GatewayState,
	backend: &str,
	route: &str,
	snapshot: RateSnapshot,
	e: GatewayError,
) -> Response {
	record(state, backend, route, e.status.as_u16());
	let mut response = e.into_response();
	attach_headers(&mut response, backend, snapshot);
	response
}

pub async fn healthz() -> impl IntoResponse {
	Json(serde_json::json!({ "ok": true }))
}

pub async fn list_models(
	State(state): State<GatewayState>,
	headers: HeaderMap,
) -> Result<Response, GatewayError> {
	authenticate(&state, &headers).await?;
	let models = state.models.list(&state.adapters).await;
	Ok(Json(serde_json::json!({ "data": models })).into_response())
}

pub async fn chat_completions(
	State(state): State<GatewayState>,
	headers: HeaderMap,
	Json(body): Json<ChatCompletionRequest>,
) -> Result<Response, GatewayError> {
	let token = authenticate(&state, &headers).await?;
	body.validate()?;
	let snapshot = admit_rate_limit(&state, token).await?;

	let (backend_name, backend_model) = state.resolve_backend(&body.model);
	let adapter = match state.adapters.get(backend_name) {
		Some(adapter) => adapter,
		None => {
			let e = GatewayError::backend_unavailable("backend not available");
			return Ok(post_admission_error(
				&state,
				backend_name,
				"/v1/chat/completions",
				snapshot,
				e,
			));
		},
	};

	let value = serde_json::to_value(&body).expect("validated request must serialize");
	let payload = build_backend_payload(value, backend_model, &body.model);
	let stream = body.stream;

	let result = adapter.chat_completions(payload, stream).await;
	let mut response = match result {
		Ok(AdapterResponse::Json(data)) => {
			record(&state, backend_name, "/v1/chat/completions", 200);
			Json(data).into_response()
		},
		Ok(AdapterResponse::Stream(bytes)) => {
			record(&state, backend_name, "/v1/chat/completions", 200);
			response_from_bytes(bytes)
		},
		Err(e) => {
			return Ok(post_admission_error(
				&state,
				backend_name,
				"/v1/chat/completions",
				snapshot,
				e,
			));
		},
	};

	attach_headers(&mut response, backend_name, snapshot);
	Ok(response)
}

pub async fn completions(
	State(state): State<GatewayState>,
	headers: HeaderMap,
	Json(body): Json<CompletionRequest>,
) -> Result<Response, GatewayError> {
	let token = authenticate(&state, &headers).await?;
	body.validate()?;
	let snapshot = admit_rate_limit(&state, token).await?;

	let (backend_name, backend_model) = state.resolve_backend(&body.model);
	let adapter = match state.adapters.get(backend_name) {
		Some(adapter) => adapter,
		None => {
			let e = GatewayError::backend_unavailable("backend not available");
			return Ok(post_admission_error(
				&state,
				backend_name,
				"/v1/completions",
				snapshot,
				e,
			));
		},
	};

	let value = serde_json::to_value(&body).expect("validated request must serialize");
	let payload = build_backend_payload(value, backend_model, &body.model);
	let stream = body.stream;

	let result = adapter.completions(payload, stream).await;
	let mut response = match result {
		Ok(AdapterResponse::Json(data)) => {
			record(&state, backend_name, "/v1/completions", 200);
			Json(data).into_response()
		},
		Ok(AdapterResponse::Stream(bytes)) => {
			record(&state, backend_name, "/v1/completions", 200);
			response_from_bytes(bytes)
		},
		Err(e) => {
			return Ok(post_admission_error(
				&state,
				backend_name,
				"/v1/completions",
				snapshot,
				e,
			));
		},
	};

	attach_headers(&mut response, backend_name, snapshot);
	Ok(response)
}

pub async fn embeddings(
	State(state): State<GatewayState>,
	headers: HeaderMap,
	Json(body): Json<EmbeddingRequest>,
) -> Result<Response, GatewayError> {
	let token = authenticate(&state, &headers).await?;
	body.validate()?;
	let snapshot = admit_rate_limit(&state, token).await?;

	let (backend_name, backend_model) = state.resolve_backend(&body.model);
	let adapter = match state.adapters.get(backend_name) {
		Some(adapter) => adapter,
		None => {
			let e = GatewayError::backend_unavailable("backend not available");
			return Ok(post_admission_error(
				&state,
				backend_name,
				"/v1/embeddings",
				snapshot,
				e,
			));
		},
	};

	let value = serde_json::to_value(&body).expect("validated request must serialize");
	let payload = build_backend_payload(value, backend_model, &body.model);

	let data: Value = match adapter.embeddings(payload).await {
		Ok(data) => {
			record(&state, backend_name, "/v1/embeddings", 200);
			data
		},
		Err(e) => {
			return Ok(post_admission_error(
				&state,
				backend_name,
				"/v1/embeddings",
				snapshot,
				e,
			));
		},
	};

	let mut response = Json(data).into_response();
	attach_headers(&mut response, backend_name, snapshot);
	Ok(response)
}
