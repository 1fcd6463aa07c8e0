use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;

use crate::authn::TokenRegistry;
use crate::backend::AdapterRegistry;
use crate::backend::ollama::OllamaAdapter;
use crate::backend::openai::OpenAiAdapter;
use crate::config::{Backend, RateLimitStore, Settings};
use crate::metrics::GatewayMetrics;
use crate::models::ModelCache;
use crate::ratelimit::{MemoryRateLimiter, RateLimiter, SharedRateLimiter};

/// Everything a request handler needs, threaded through explicitly as
/// axum `State` rather than reached for via a process-wide singleton —
/// the dispatcher's context is assembled once at startup and cloned
/// cheaply (every field is an `Arc`) per request.
#[derive(Clone)]
pub struct GatewayState {
	pub settings: Arc<Settings>,
	pub tokens: Arc<TokenRegistry>,
	pub rate_limiter: Arc<dyn RateLimiter>,
	pub adapters: Arc<AdapterRegistry>,
	pub models: Arc<ModelCache>,
	pub metrics: GatewayMetrics,
}

impl GatewayState {
	pub async fn build(settings: Settings, metrics: GatewayMetrics) -> anyhow::Result<Self> {
		let client = Client::builder().timeout(settings.backend_timeout).build()?;

		let mut adapters = AdapterRegistry::new();
		if let Some(base_url) = &settings.ollama_base_url {
			adapters.insert(
				Backend::Ollama.as_str(),
				Arc::new(OllamaAdapter::new(client.clone(), base_url.clone())) as Arc<_>,
			);
		}
		if let Some(base_url) = &settings.vllm_base_url {
			adapters.insert(
				Backend::Vllm.as_str(),
				Arc::new(OpenAiAdapter::new(client.clone(), base_url.clone())) as Arc<_>,
			);
		}

		let rate_limiter: Arc<dyn RateLimiter> = match settings.rate_limit_store {
			RateLimitStore::Memory => Arc::new(MemoryRateLimiter::new()),
			RateLimitStore::Shared => {
				let redis_url = settings
					.redis_url
					.as_deref()
					.ok_or_else(|| anyhow::anyhow!("REDIS_URL must be set for shared rate limiter"))?;
				Arc::new(SharedRateLimiter::connect(redis_url).await?)
			},
		};

		let model_cache_ttl: Duration = settings.model_cache_ttl;
		let tokens = TokenRegistry::new(settings.tokens.clone());

		Ok(Self {
			settings: Arc::new(settings),
			tokens: Arc::new(tokens),
			rate_limiter,
			adapters: Arc::new(adapters),
			models: Arc::new(ModelCache::new(model_cache_ttl)),
			metrics,
		})
	}

	/// Resolves a client-supplied model string to `(backend_name,
	/// backend_model)`, honoring the `ollama:`/`vllm:` prefix override —
	/// spec §4.1 step 5, `resolve_backend` in the original.
	pub fn resolve_backend<'a>(&self, model: &'a str) -> (&'static str, &'a str) {
		if let Some(rest) = model.strip_prefix("ollama:") {
			return (Backend::Ollama.as_str(), rest);
		}
		if let Some(rest) = model.strip_prefix("vllm:") {
			return (Backend::Vllm.as_str(), rest);
		}
		(self.settings.default_backend.as_str(), model)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn settings() -> Settings {
		Settings {
			host: "0.0.0.0".to_string(),
			port: 8080,
			default_backend: Backend::Ollama,
			ollama_base_url: Some("http://localhost:11434".to_string()),
			vllm_base_url: Some("http://localhost:8000".to_string()),
			tokens: vec![],
			rate_limit_store: RateLimitStore::Memory,
			redis_url: None,
			max_body_bytes: 1024,
			model_cache_ttl: Duration::from_secs(1),
			backend_timeout: Duration::from_secs(1),
		}
	}

	#[tokio::test]
	async fn resolve_backend_honors_prefix_override() {
		let mut registry = prometheus_client::registry::Registry::default();
		let metrics = GatewayMetrics::new(&mut registry);
		let state = GatewayState::build(settings(), metrics).await.unwrap();
		assert_eq!(state.resolve_backend("ollama:llama3"), ("ollama", "llama3"));
		assert_eq!(state.resolve_backend("vllm:mistral"), ("vllm", "mistral"));
		assert_eq!(state.resolve_backend("llama3"), ("ollama", "llama3"));
	}
}
