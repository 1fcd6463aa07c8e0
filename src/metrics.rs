use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::registry::Registry;

/// Labels distinguishing one request-count observation from another —
/// the dimensions the gateway cares about for `/metrics` scraping.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RequestLabels {
	pub backend: String,
	pub route: String,
	pub status: u16,
}

/// Labels for per-token rate-limit rejections.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RateLimitLabels {
	pub token_label: String,
}

/// Prometheus counters the dispatcher updates as it handles requests —
/// ported in spirit from the teacher's `mtrcs.rs` sub-registry pattern,
/// scoped down to this gateway's own request/rate-limit dimensions.
#[derive(Clone)]
pub struct GatewayMetrics {
	pub requests_total: Family<RequestLabels, Counter>,
	pub rate_limited_total: Family<RateLimitLabels, Counter>,
}

impl GatewayMetrics {
	pub fn new(registry: &mut Registry) -> Self {
		let sub = registry.sub_registry_with_prefix("llm_gateway");
		let requests_total = Family::<RequestLabels, Counter>::default();
		sub.register(
			"requests",
			"Total requests handled, by backend/route/status",
			requests_total.clone(),
		);
		let rate_limited_total = Family::<RateLimitLabels, Counter>::default();
		sub.register(
			"rate_limited",
			"Total requests denied by the rate limiter, by token label",
			rate_limited_total.clone(),
		);
		Self {
			requests_total,
			rate_limited_total,
		}
	}
}

#[derive(Clone)]
struct MetricsApp {
	registry: Arc<Registry>,
}

/// A standalone `/metrics` sub-app, mounted alongside the main router so
/// scraping the registry never touches the authenticated API surface.
pub fn router(registry: Arc<Registry>) -> Router {
	Router::new()
		.route("/metrics", get(metrics_handler))
		.with_state(MetricsApp { registry })
}

async fn metrics_handler(State(app): State<MetricsApp>) -> Result<String, StatusCode> {
	let mut buffer = String::new();
	encode(&mut buffer, &app.registry).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
	Ok(buffer)
}
