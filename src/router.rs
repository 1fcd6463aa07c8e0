use axum::Router;
use axum::routing::{get, post};

use crate::handlers;
use crate::middleware::{access_log, body_size_guard};
use crate::state::GatewayState;

/// Builds the gateway's authenticated API surface. `/metrics` is mounted
/// separately by the caller (spec §9: scraping never shares a router
/// with the token-gated API).
pub fn app(state: GatewayState) -> Router {
	Router::new()
		.route("/healthz", get(handlers::healthz))
		.route("/v1/models", get(handlers::list_models))
		.route("/v1/chat/completions", post(handlers::chat_completions))
		.route("/v1/completions", post(handlers::completions))
		.route("/v1/embeddings", post(handlers::embeddings))
		.layer(axum::middleware::from_fn(access_log))
		.layer(axum::middleware::from_fn_with_state(state.clone(), body_size_guard))
		.with_state(state)
}
