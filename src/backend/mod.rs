pub mod ollama;
pub mod openai;

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::error::GatewayError;
use crate::sse::ByteStream;

/// The result of invoking an adapter method that may stream: either a
/// fully-buffered JSON object (non-streaming) or a byte stream already
/// framed as SSE (streaming) — spec §4.1 step 8.
pub enum AdapterResponse {
	Json(Value),
	Stream(ByteStream),
}

/// One model-listing entry as surfaced by `GET /v1/models`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ModelEntry {
	pub id: String,
	pub object: String,
	pub owned_by: String,
}

/// Capability every backend exposes, dispatched by name from the
/// dispatcher's adapter registry (spec §9, "dynamic dispatch over
/// adapters" — a small interface with concrete implementations rather
/// than reflection over a generic protocol object).
#[async_trait::async_trait]
pub trait BackendAdapter: Send + Sync {
	async fn chat_completions(
		&self,
		payload: Map<String, Value>,
		stream: bool,
	) -> Result<AdapterResponse, GatewayError>;

	async fn completions(
		&self,
		payload: Map<String, Value>,
		stream: bool,
	) -> Result<AdapterResponse, GatewayError>;

	async fn embeddings(&self, payload: Map<String, Value>) -> Result<Value, GatewayError>;

	async fn list_models(&self) -> Result<Vec<ModelEntry>, GatewayError>;
}

/// Backend-name → adapter registry, built once at startup from whichever
/// base URLs are configured (spec §4.1 step 5, §6 "OLLAMA_BASE_URL /
/// VLLM_BASE_URL: presence enables that backend").
#[derive(Clone, Default)]
pub struct AdapterRegistry {
	adapters: HashMap<String, Arc<dyn BackendAdapter>>,
	order: Vec<String>,
}

impl AdapterRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn insert(&mut self, name: impl Into<String>, adapter: Arc<dyn BackendAdapter>) {
		let name = name.into();
		if !self.adapters.contains_key(&name) {
			self.order.push(name.clone());
		}
		self.adapters.insert(name, adapter);
	}

	pub fn get(&self, name: &str) -> Option<Arc<dyn BackendAdapter>> {
		self.adapters.get(name).cloned()
	}

	/// Iterates adapters in a deterministic order (insertion/config order)
	/// for the model-list aggregator's refresh pass — spec §4.4.
	pub fn iter_ordered(&self) -> impl Iterator<Item = (&str, &Arc<dyn BackendAdapter>)> {
		self.order.iter().filter_map(move |name| {
			self
				.adapters
				.get(name)
				.map(|adapter| (name.as_str(), adapter))
		})
	}
}
