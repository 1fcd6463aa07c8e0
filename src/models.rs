use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::backend::{AdapterRegistry, ModelEntry};

struct Cache {
	expires_at: Instant,
	data: Vec<ModelEntry>,
}

/// TTL-cached, deduplicated `/v1/models` listing aggregated across every
/// configured backend — ported from `app/main.py::proxy_models`.
///
/// vLLM (and any other plain OpenAI-compatible backend) entries are
/// namespaced with a `vllm:` prefix unless the backend already returned
/// one; Ollama's adapter namespaces its own entries at the source.
pub struct ModelCache {
	ttl: Duration,
	cache: Mutex<Option<Cache>>,
}

impl ModelCache {
	pub fn new(ttl: Duration) -> Self {
		Self {
			ttl,
			cache: Mutex::new(None),
		}
	}

	/// Returns the cached listing if still fresh, otherwise queries every
	/// registered adapter and rebuilds it. A backend that errors simply
	/// contributes nothing to this refresh — no stale entries are carried
	/// over from the previous cache generation.
	pub async fn list(&self, adapters: &AdapterRegistry) -> Vec<ModelEntry> {
		{
			let guard = self.cache.lock().expect("model cache mutex poisoned");
			if let Some(cache) = guard.as_ref() {
				if cache.expires_at > Instant::now() {
					return cache.data.clone();
				}
			}
		}

		let mut data = Vec::new();
		for (name, adapter) in adapters.iter_ordered() {
			match adapter.list_models().await {
				Ok(entries) => {
					for entry in entries {
						data.push(namespace(name, entry));
					}
				},
				Err(e) => {
					tracing::warn!(backend = name, error = %e.message, "failed to list models");
				},
			}
		}

		let mut guard = self.cache.lock().expect("model cache mutex poisoned");
		*guard = Some(Cache {
			expires_at: Instant::now() + self.ttl,
			data: data.clone(),
		});
		data
	}
}

fn namespace(backend: &str, entry: ModelEntry) -> ModelEntry {
	if backend == "ollama" || entry.id.starts_with(&format!("{backend}:")) {
		return entry;
	}
	ModelEntry {
		id: format!("{backend}:{}", entry.id),
		..entry
	}
}
